//! LDAP support.

pub mod connection;

use std::sync::Arc;
use std::time::Instant;

use ldap3::{dn_escape, ldap_escape};
use serde::Serialize;
use validator::Validate;

use crate::config::{DirectoryConfig, LOGIN_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::telemetry::{self, Outcome};

pub use connection::{
    Connection, Credentials, DirectoryEntry, LdapSession, LdapTransport,
    Session, Transport,
};

/// Identifier of this authentication method.
pub const AUTH_METHOD_NAME: &str = "LDAP";

/// Profile attributes used to provision an account on first login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserAttributes {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub mail: Option<String>,
    pub auth_source_id: Option<i64>,
}

/// Directory entry a login resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    pub dn: String,
    /// Only set with on-the-fly registration.
    pub attributes: Option<UserAttributes>,
}

enum Attempt {
    Authenticated(ResolvedIdentity),
    NotFound,
    Rejected,
}

/// Authenticates logins against an LDAP directory.
///
/// Holds no connection: every call opens its own and closes it before
/// returning, so a single instance can be shared between tasks.
#[derive(Debug, Clone)]
pub struct DirectoryAuthenticator<T = LdapTransport> {
    config: Arc<DirectoryConfig>,
    transport: T,
}

impl DirectoryAuthenticator<LdapTransport> {
    /// Create a new [`DirectoryAuthenticator`] over TCP.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        Self::with_transport(config, LdapTransport)
    }
}

impl<T: Transport> DirectoryAuthenticator<T> {
    /// Create a new [`DirectoryAuthenticator`] using a custom [`Transport`].
    pub fn with_transport(
        config: DirectoryConfig,
        transport: T,
    ) -> Result<Self> {
        let config = config.normalize();
        config.validate()?;

        if config.attr_login.is_empty() {
            return Err(Error::Configuration(
                "missing login attribute".into(),
            ));
        }

        // Surface a malformed host/port now rather than on first login.
        Connection::new(&config, Credentials::Anonymous)?;

        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn auth_method_name(&self) -> &'static str {
        AUTH_METHOD_NAME
    }

    /// Build a [`Connection`] bound as `bind_dn`, or anonymous when both
    /// `bind_dn` and `bind_password` are blank.
    pub fn open_connection(
        &self,
        bind_dn: &str,
        bind_password: &str,
    ) -> Result<Connection> {
        let credentials =
            if bind_dn.trim().is_empty() && bind_password.trim().is_empty() {
                Credentials::Anonymous
            } else {
                Credentials::Simple {
                    dn: bind_dn.to_owned(),
                    password: bind_password.to_owned(),
                }
            };

        Connection::new(&self.config, credentials)
    }

    /// Check `login` and `password` against the directory.
    ///
    /// `Ok(None)` means either the login is unknown or the password is
    /// wrong; both are reported the same way. `Err` is kept for
    /// infrastructure failures.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<ResolvedIdentity>> {
        let start = Instant::now();

        if login.trim().is_empty() || password.trim().is_empty() {
            telemetry::record_authentication(Outcome::Skipped, start);
            return Ok(None);
        }

        match self.attempt(login, password).await {
            Ok(Attempt::Authenticated(identity)) => {
                tracing::debug!(login, "authentication successful");
                telemetry::record_authentication(Outcome::Success, start);
                Ok(Some(identity))
            },
            Ok(Attempt::NotFound) => {
                telemetry::record_authentication(Outcome::NotFound, start);
                Ok(None)
            },
            Ok(Attempt::Rejected) => {
                telemetry::record_authentication(Outcome::Rejected, start);
                Ok(None)
            },
            Err(err) => {
                tracing::error!(
                    error = %err,
                    host = %self.config.host,
                    "directory authentication failed"
                );
                telemetry::record_authentication(Outcome::Error, start);
                Err(err)
            },
        }
    }

    /// Open a connection as the search identity.
    ///
    /// Succeeds once the transport is open, whether or not the bind is
    /// accepted.
    pub async fn test_connection(&self) -> Result<()> {
        let connection = if self.config.is_direct_bind() {
            // A template is not an identity; only check the transport.
            self.open_connection("", "")?
        } else {
            self.open_connection(self.account(), self.account_password())?
        };

        // Only transport or protocol failures count: a rejected bind still
        // proves the directory is reachable.
        match self.establish(&connection).await? {
            Some(mut session) => close(&mut session).await,
            None => tracing::warn!(
                host = %self.config.host,
                "directory is reachable but rejected the search identity"
            ),
        }

        Ok(())
    }

    async fn attempt(&self, login: &str, password: &str) -> Result<Attempt> {
        let direct_bind = self.config.is_direct_bind();
        let search = if direct_bind {
            tracing::debug!(login, "binding as user for directory search");
            self.open_connection(&self.direct_bind_dn(login), password)?
        } else {
            self.open_connection(self.account(), self.account_password())?
        };

        let Some(mut session) = self.establish(&search).await? else {
            if direct_bind {
                return Ok(Attempt::Rejected);
            }
            return Err(Error::Directory(
                "search identity rejected by directory".into(),
            ));
        };

        let identity = self.find_identity(&mut session, login).await;
        close(&mut session).await;

        let Some(identity) = identity? else {
            return Ok(Attempt::NotFound);
        };
        tracing::debug!(login, dn = %identity.dn, "directory entry found");

        let connection = self.open_connection(&identity.dn, password)?;
        match self.establish(&connection).await? {
            Some(mut session) => {
                close(&mut session).await;
                Ok(Attempt::Authenticated(identity))
            },
            None => Ok(Attempt::Rejected),
        }
    }

    /// Connect and bind. `None` when the directory rejects the credentials.
    async fn establish(
        &self,
        connection: &Connection,
    ) -> Result<Option<T::Session>> {
        let mut session = self.transport.connect(connection).await?;

        if let Credentials::Simple { dn, password } = connection.credentials() {
            if !session.bind(dn, password).await? {
                close(&mut session).await;
                return Ok(None);
            }
        }

        Ok(Some(session))
    }

    async fn find_identity(
        &self,
        session: &mut T::Session,
        login: &str,
    ) -> Result<Option<ResolvedIdentity>> {
        let filter = self.login_filter(login);
        let attributes = self.requested_attributes();

        let mut entries = session
            .search(&self.config.base_dn, &filter, &attributes)
            .await?
            .into_iter();

        // First match wins.
        let Some(entry) = entries.next() else {
            return Ok(None);
        };
        let ignored = entries.count();
        if ignored > 0 {
            tracing::warn!(
                login,
                ignored,
                dn = %entry.dn,
                "login matches several directory entries, using the first one"
            );
        }

        if entry.dn.is_empty() {
            return Ok(None);
        }

        let attributes = self.config.onthefly_register.then(|| UserAttributes {
            firstname: attribute_value(&entry, &self.config.attr_firstname),
            lastname: attribute_value(&entry, &self.config.attr_lastname),
            mail: attribute_value(&entry, &self.config.attr_mail),
            auth_source_id: self.config.id,
        });

        Ok(Some(ResolvedIdentity {
            dn: entry.dn,
            attributes,
        }))
    }

    fn login_filter(&self, login: &str) -> String {
        format!(
            "(&(objectClass=*)({}={}))",
            self.config.attr_login,
            ldap_escape(login)
        )
    }

    fn requested_attributes(&self) -> Vec<&str> {
        if self.config.onthefly_register {
            vec![
                "dn",
                self.config.attr_firstname.as_str(),
                self.config.attr_lastname.as_str(),
                self.config.attr_mail.as_str(),
            ]
        } else {
            vec!["dn"]
        }
    }

    /// Substitute the first `$login` of the account template.
    fn direct_bind_dn(&self, login: &str) -> String {
        self.account()
            .replacen(LOGIN_PLACEHOLDER, &dn_escape(login), 1)
    }

    fn account(&self) -> &str {
        self.config.account.as_deref().unwrap_or_default()
    }

    fn account_password(&self) -> &str {
        self.config.account_password.as_deref().unwrap_or_default()
    }
}

/// First value of `name` on `entry`.
///
/// `None` when the attribute name is blank, when the entry lacks the
/// attribute or when its first value is empty.
pub fn attribute_value(entry: &DirectoryEntry, name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }

    entry
        .values(name)?
        .first()
        .filter(|value| !value.is_empty())
        .cloned()
}

async fn close<S: Session>(session: &mut S) {
    if let Err(err) = session.unbind().await {
        tracing::debug!(error = %err, "unbind failed");
    }
}
