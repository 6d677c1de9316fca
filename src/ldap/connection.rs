//! Connection descriptor and transport to the directory.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    Ldap as Ldap3, LdapConnAsync, LdapConnSettings, LdapResult, Scope,
    SearchEntry,
};
use url::Url;

use crate::config::DirectoryConfig;
use crate::error::{Error, Result};

/// Bind result codes meaning "these credentials are not accepted".
///
/// 48 inappropriateAuthentication, 49 invalidCredentials,
/// 50 insufficientAccessRights, 53 unwillingToPerform.
const REJECTED_BIND_CODES: [u32; 4] = [48, 49, 50, 53];
const NO_SUCH_OBJECT: u32 = 32;
const SIZE_LIMIT_EXCEEDED: u32 = 4;

/// Identity a connection binds as.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Simple { dn: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Anonymous => f.write_str("Anonymous"),
            Credentials::Simple { dn, .. } => f
                .debug_struct("Simple")
                .field("dn", dn)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything needed to reach and bind to the directory.
///
/// Building one performs no network I/O.
#[derive(Debug, Clone)]
pub struct Connection {
    url: Url,
    credentials: Credentials,
    connect_timeout: Duration,
    operation_timeout: Duration,
    verify_certificates: bool,
}

impl Connection {
    /// Create a new [`Connection`] for `config`.
    ///
    /// Fails only when host or port cannot form a valid URL.
    pub fn new(
        config: &DirectoryConfig,
        credentials: Credentials,
    ) -> Result<Self> {
        let host = config.host.trim();
        if host.is_empty() || config.port == 0 {
            return Err(Error::Configuration(format!(
                "malformed address {:?}:{}",
                config.host, config.port
            )));
        }

        let scheme = if config.tls { "ldaps" } else { "ldap" };
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };

        let url = Url::parse(&format!("{scheme}://{host}:{}", config.port))
            .map_err(|err| {
                Error::Configuration(format!(
                    "malformed address {host:?}: {err}"
                ))
            })?;

        if url.host_str().is_none() || url.port() != Some(config.port) {
            return Err(Error::Configuration(format!(
                "malformed address {host:?}:{}",
                config.port
            )));
        }

        Ok(Self {
            url,
            credentials,
            connect_timeout: config.connect_timeout(),
            operation_timeout: config.operation_timeout(),
            verify_certificates: config.verify_certificates,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_encrypted(&self) -> bool {
        self.url.scheme() == "ldaps"
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

/// Directory entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Create a new [`DirectoryEntry`].
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    /// Add values for an attribute.
    pub fn with_attr<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .entry(name.to_owned())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Values of `name`, matched case-insensitively.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs,
        }
    }
}

/// Opens sessions to a directory.
#[async_trait]
pub trait Transport: Send + Sync {
    type Session: Session;

    /// Open a transport connection. Does not bind.
    async fn connect(&self, connection: &Connection) -> Result<Self::Session>;
}

/// An open connection to a directory.
#[async_trait]
pub trait Session: Send {
    /// Simple bind. `Ok(false)` when the directory rejects the credentials.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool>;

    /// Subtree search under `base`.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>>;

    async fn unbind(&mut self) -> Result<()>;
}

/// [`Transport`] backed by `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapTransport;

/// [`Session`] backed by `ldap3`.
#[derive(Debug)]
pub struct LdapSession {
    conn: Ldap3,
    timeout: Duration,
}

#[async_trait]
impl Transport for LdapTransport {
    type Session = LdapSession;

    async fn connect(&self, connection: &Connection) -> Result<LdapSession> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(connection.connect_timeout)
            .set_no_tls_verify(!connection.verify_certificates);

        let (handle, conn) =
            LdapConnAsync::from_url_with_settings(settings, &connection.url)
                .await?;
        ldap3::drive!(handle);

        Ok(LdapSession {
            conn,
            timeout: connection.operation_timeout,
        })
    }
}

/// `Ok(false)` for codes meaning the credentials are not accepted.
fn bind_outcome(result: LdapResult) -> Result<bool> {
    if REJECTED_BIND_CODES.contains(&result.rc) {
        return Ok(false);
    }

    result.success()?;
    Ok(true)
}

/// Entries to keep from a search that ended with `result`.
fn search_outcome<E>(entries: Vec<E>, result: LdapResult) -> Result<Vec<E>> {
    match result.rc {
        0 | SIZE_LIMIT_EXCEEDED => Ok(entries),
        NO_SUCH_OBJECT => Ok(Vec::new()),
        _ => {
            result.success()?;
            Ok(entries)
        },
    }
}

#[async_trait]
impl Session for LdapSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool> {
        let result = self
            .conn
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await?;

        bind_outcome(result)
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        let ldap3::SearchResult(entries, result) = self
            .conn
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attributes.to_vec())
            .await?;

        Ok(search_outcome(entries, result)?
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).into())
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.conn.unbind().await?;
        Ok(())
    }
}
