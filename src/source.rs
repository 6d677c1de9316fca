//! Interface for authentication sources.

use async_trait::async_trait;

use crate::error::Result;
use crate::ldap::{DirectoryAuthenticator, ResolvedIdentity, Transport};

/// Port the application authenticates users through.
#[async_trait]
pub trait AuthSource: Send + Sync {
    /// Display name of the method, e.g. `LDAP`.
    fn auth_method_name(&self) -> &'static str;

    /// `Ok(None)` when credentials are rejected or the user is unknown.
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<ResolvedIdentity>>;

    /// Check the source is reachable with its configured identity.
    async fn test_connection(&self) -> Result<()>;
}

#[async_trait]
impl<T: Transport> AuthSource for DirectoryAuthenticator<T> {
    fn auth_method_name(&self) -> &'static str {
        DirectoryAuthenticator::auth_method_name(self)
    }

    async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<ResolvedIdentity>> {
        DirectoryAuthenticator::authenticate(self, login, password).await
    }

    async fn test_connection(&self) -> Result<()> {
        DirectoryAuthenticator::test_connection(self).await
    }
}
