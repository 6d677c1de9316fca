//! Autha LDAP authenticates logins against a directory and extracts the
//! profile attributes needed to provision accounts on first login.
//!
//! ```no_run
//! use autha_ldap::config::DirectoryConfig;
//! use autha_ldap::ldap::DirectoryAuthenticator;
//!
//! # async fn run() -> autha_ldap::error::Result<()> {
//! let config = DirectoryConfig::new("ldap.example.com")
//!     .with_base_dn("dc=example,dc=com")
//!     .with_login_attribute("uid")
//!     .with_registration("givenName", "sn", "mail");
//! let ldap = DirectoryAuthenticator::new(config)?;
//!
//! match ldap.authenticate("jdoe", "secret").await? {
//!     Some(identity) => println!("welcome {}", identity.dn),
//!     None => println!("authentication failed"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ldap;
pub mod source;
pub mod telemetry;

pub use error::{Error, ErrorKind, Result};
pub use ldap::{DirectoryAuthenticator, ResolvedIdentity, UserAttributes};
pub use source::AuthSource;
