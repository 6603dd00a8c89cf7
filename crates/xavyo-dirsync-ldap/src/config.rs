//! LDAP transport configuration
//!
//! Connection settings for a standard LDAP server or an Active Directory
//! domain controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use xavyo_dirsync::config::{TransportConfig, REDACTED};
use xavyo_dirsync::error::{DirectoryError, DirectoryResult};

/// Kind of directory server behind the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryFlavor {
    /// OpenLDAP, 389-DS and other RFC 4511 servers.
    #[default]
    Standard,
    /// Microsoft Active Directory.
    ActiveDirectory,
}

/// Attributes Active Directory always returns as raw octets.
const AD_BINARY_ATTRIBUTES: &[&str] = &["objectGUID", "objectSid"];

/// Configuration for the LDAP transport.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapTransportConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Timeout for establishing a connection, in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Timeout for a single request, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Directory server kind.
    #[serde(default)]
    pub flavor: DirectoryFlavor,

    /// Attributes whose values are carried base64-encoded.
    #[serde(default)]
    pub binary_attributes: Vec<String>,
}

impl std::fmt::Debug for LdapTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapTransportConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| REDACTED))
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("flavor", &self.flavor)
            .field("binary_attributes", &self.binary_attributes)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    30
}

impl LdapTransportConfig {
    /// Create a config for a standard LDAP server.
    pub fn new(host: impl Into<String>, bind_dn: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            bind_dn: bind_dn.into(),
            bind_password: None,
            connection_timeout_secs: default_connection_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            flavor: DirectoryFlavor::Standard,
            binary_attributes: Vec::new(),
        }
    }

    /// Create a config for an Active Directory domain controller.
    pub fn active_directory(host: impl Into<String>, bind_dn: impl Into<String>) -> Self {
        Self {
            flavor: DirectoryFlavor::ActiveDirectory,
            ..Self::new(host, bind_dn)
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connection and request timeouts, in seconds.
    #[must_use]
    pub fn with_timeouts(mut self, connection_secs: u64, operation_secs: u64) -> Self {
        self.connection_timeout_secs = connection_secs;
        self.operation_timeout_secs = operation_secs;
        self
    }

    /// Treat an attribute as binary.
    pub fn with_binary_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.binary_attributes.push(attribute.into());
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whether the connection is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.use_ssl || self.use_starttls
    }

    /// Whether values of `attribute` are binary (compared case-insensitively).
    ///
    /// Active Directory adds its own binary attributes to the configured ones.
    pub fn is_binary_attribute(&self, attribute: &str) -> bool {
        let configured = self
            .binary_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(attribute));
        configured
            || (self.flavor == DirectoryFlavor::ActiveDirectory
                && AD_BINARY_ATTRIBUTES
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(attribute)))
    }
}

impl TransportConfig for LdapTransportConfig {
    fn validate(&self) -> DirectoryResult<()> {
        if self.host.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration("host is required"));
        }

        if self.port == 0 {
            return Err(DirectoryError::invalid_configuration("port must be non-zero"));
        }

        if self.bind_dn.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration("bind_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if self.connection_timeout_secs == 0 || self.operation_timeout_secs == 0 {
            return Err(DirectoryError::invalid_configuration(
                "timeouts must be at least one second",
            ));
        }

        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some(REDACTED.to_string());
        }
        config
    }
}
