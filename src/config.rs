//! Configuration manager for autha-ldap.

use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Standard LDAP port.
pub const DEFAULT_PORT: u16 = 389;
const DEFAULT_TIMEOUT: u64 = 5;
const DEFAULT_OPERATION_TIMEOUT: u64 = 10;

/// Placeholder replaced by the user login in a direct-bind `account`.
pub const LOGIN_PLACEHOLDER: &str = "$login";

/// Configuration file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Related to LDAP authentication source.
    pub ldap: Option<DirectoryConfig>,
    #[serde(skip)]
    path: PathBuf,
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Self> {
        let file_path = if self.path.is_file() {
            self.path.as_path()
        } else {
            Path::new(DEFAULT_CONFIG_PATH)
        };

        let file = File::open(file_path)?;
        let mut config: Configuration = serde_yaml::from_reader(file)?;
        config.path = file_path.to_path_buf();
        config.ldap = config.ldap.map(DirectoryConfig::normalize);

        Ok(config)
    }
}

/// LDAP authentication source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_registration_attributes"))]
pub struct DirectoryConfig {
    /// Identifier of this source, reported to provisioned accounts.
    #[serde(default)]
    pub id: Option<i64>,
    /// Display name.
    #[serde(default)]
    #[validate(length(max = 60))]
    pub name: String,
    /// Hostname (or IP) of the directory.
    #[validate(length(min = 1, max = 60))]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Implicit TLS (`ldaps://`).
    #[serde(default)]
    pub tls: bool,
    /// Reject invalid server certificates when `tls` is set.
    #[serde(default = "default_true")]
    pub verify_certificates: bool,
    /// Search identity. Anonymous when empty, direct bind when it contains
    /// `$login`.
    #[serde(default)]
    #[validate(length(max = 255))]
    pub account: Option<String>,
    #[serde(default, skip_serializing)]
    #[validate(length(max = 60))]
    pub account_password: Option<String>,
    /// Search root.
    #[serde(default)]
    #[validate(length(max = 255))]
    pub base_dn: String,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub attr_login: String,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub attr_firstname: String,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub attr_lastname: String,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub attr_mail: String,
    /// Return profile attributes on success to create the account.
    #[serde(default)]
    pub onthefly_register: bool,
    /// Connect timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Timeout for each bind or search, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_operation_timeout() -> u64 {
    DEFAULT_OPERATION_TIMEOUT
}

fn validate_registration_attributes(
    config: &DirectoryConfig,
) -> std::result::Result<(), ValidationError> {
    if !config.onthefly_register {
        return Ok(());
    }

    let missing = [
        &config.attr_login,
        &config.attr_firstname,
        &config.attr_lastname,
        &config.attr_mail,
    ]
    .iter()
    .any(|attr| attr.trim().is_empty());

    if missing {
        return Err(ValidationError::new("registration_attributes")
            .with_message(Cow::from(concat!(
                "login, firstname, lastname and mail attributes are ",
                "required for on-the-fly registration",
            ))));
    }

    Ok(())
}

impl DirectoryConfig {
    /// Create a new [`DirectoryConfig`] with default port and timeouts.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            id: None,
            name: String::default(),
            host: host.into(),
            port: DEFAULT_PORT,
            tls: false,
            verify_certificates: true,
            account: None,
            account_password: None,
            base_dn: String::default(),
            attr_login: String::default(),
            attr_firstname: String::default(),
            attr_lastname: String::default(),
            attr_mail: String::default(),
            onthefly_register: false,
            timeout: DEFAULT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Update `port` of [`DirectoryConfig`].
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable implicit TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Update `base_dn` of [`DirectoryConfig`].
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = base_dn.into();
        self
    }

    /// Set the search identity.
    pub fn with_account(
        mut self,
        account: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.account = Some(account.into());
        self.account_password = password;
        self
    }

    /// Update `attr_login` of [`DirectoryConfig`].
    pub fn with_login_attribute(mut self, attr: impl Into<String>) -> Self {
        self.attr_login = attr.into();
        self
    }

    /// Enable on-the-fly registration with the given attribute mapping.
    pub fn with_registration(
        mut self,
        firstname: impl Into<String>,
        lastname: impl Into<String>,
        mail: impl Into<String>,
    ) -> Self {
        self.onthefly_register = true;
        self.attr_firstname = firstname.into();
        self.attr_lastname = lastname.into();
        self.attr_mail = mail.into();
        self
    }

    /// Update `id` of [`DirectoryConfig`].
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Trim attribute names.
    pub fn normalize(mut self) -> Self {
        for attr in [
            &mut self.attr_login,
            &mut self.attr_firstname,
            &mut self.attr_lastname,
            &mut self.attr_mail,
        ] {
            *attr = attr.trim().to_owned();
        }
        self
    }

    /// Whether `account` is a `$login` template.
    pub fn is_direct_bind(&self) -> bool {
        self.account
            .as_deref()
            .is_some_and(|account| account.contains(LOGIN_PLACEHOLDER))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = DirectoryConfig::new("ldap.example.com");

        assert_eq!(config.port, 389);
        assert!(!config.tls);
        assert!(config.verify_certificates);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_defaults() {
        let config: DirectoryConfig = serde_yaml::from_str(concat!(
            "host: ldap.example.com\n",
            "base_dn: dc=example,dc=com\n",
            "attr_login: uid\n",
        ))
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.timeout, 5);
        assert!(config.account.is_none());
        assert!(!config.onthefly_register);
    }

    #[test]
    fn test_normalize() {
        let config = DirectoryConfig::new("ldap.example.com")
            .with_login_attribute(" uid\t")
            .with_registration("givenName ", " sn", " mail ")
            .normalize();

        assert_eq!(config.attr_login, "uid");
        assert_eq!(config.attr_firstname, "givenName");
        assert_eq!(config.attr_lastname, "sn");
        assert_eq!(config.attr_mail, "mail");
    }

    #[test]
    fn test_validation() {
        let config = DirectoryConfig::new("");
        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("host"));

        let config = DirectoryConfig::new("ldap.example.com")
            .with_login_attribute("a".repeat(31));
        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("attr_login"));

        let config = DirectoryConfig::new("ldap.example.com")
            .with_account("x".repeat(256), Some("p".repeat(61)));
        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("account"));
        assert!(errors.field_errors().contains_key("account_password"));
    }

    #[test]
    fn test_registration_requires_attributes() {
        let config = DirectoryConfig::new("ldap.example.com")
            .with_login_attribute("uid")
            .with_registration("givenName", "  ", "mail");
        assert!(config.validate().is_err());

        let config = DirectoryConfig::new("ldap.example.com")
            .with_login_attribute("uid")
            .with_registration("givenName", "sn", "mail");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_direct_bind() {
        let config = DirectoryConfig::new("ldap.example.com")
            .with_account("uid=$login,ou=people,dc=example,dc=com", None);
        assert!(config.is_direct_bind());

        let config = DirectoryConfig::new("ldap.example.com")
            .with_account("cn=admin,dc=example,dc=com", Some("admin".into()));
        assert!(!config.is_direct_bind());
        assert!(!DirectoryConfig::new("ldap.example.com").is_direct_bind());
    }

    #[test]
    fn test_read() {
        let path = std::env::temp_dir()
            .join(format!("autha-ldap-{}.yaml", std::process::id()));
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            concat!(
                "ldap:\n",
                "  host: ldap.example.com\n",
                "  base_dn: dc=example,dc=com\n",
                "  attr_login: ' uid '\n",
                "  tls: true",
            )
        )
        .unwrap();

        let config =
            Configuration::default().path(path.clone()).read().unwrap();
        let ldap = config.ldap.unwrap();
        assert_eq!(ldap.attr_login, "uid");
        assert_eq!(ldap.port, 389);
        assert!(ldap.tls);

        std::fs::remove_file(path).unwrap();
    }
}
