//! Error handler for autha-ldap.

use ldap3::LdapError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport or protocol failure while talking to the directory.
    Directory,
    /// Unusable or incomplete configuration.
    Configuration,
}

/// Errors surfaced to callers.
///
/// A rejected password or an unknown login is never an error: see
/// [`crate::ldap::DirectoryAuthenticator::authenticate`].
#[derive(Debug, Error)]
pub enum Error {
    /// Connect refused, TLS failure, timeout, malformed response, etc.
    #[error("LdapError: {0}")]
    Directory(String),

    #[error("invalid configuration, {0}")]
    Configuration(String),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Get the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Directory(_) => ErrorKind::Directory,
            _ => ErrorKind::Configuration,
        }
    }
}

// Keep `ldap3` types out of the public API; only the diagnostic survives.
impl From<LdapError> for Error {
    fn from(err: LdapError) -> Self {
        Error::Directory(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_error_is_tagged() {
        let err = Error::from(LdapError::FilterParsing);

        assert_eq!(err.kind(), ErrorKind::Directory);
        assert!(err.to_string().starts_with("LdapError: "));
    }

    #[test]
    fn test_configuration_kind() {
        let err = Error::Configuration("missing host".into());
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Error::from(ValidationErrors::new());
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
