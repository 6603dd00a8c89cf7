//! # LDAP Transport
//!
//! `ldap3`-backed [`DirectoryTransport`](xavyo_dirsync::traits::DirectoryTransport)
//! for the directory synchronization engine, covering standard LDAP servers
//! and Active Directory.
//!
//! ## Features
//!
//! - LDAP v3 over plain TCP, LDAPS or STARTTLS
//! - One lazily bound connection, re-established after protocol errors
//! - Result codes mapped to transient, conflicting and permanent errors
//! - Binary attributes carried as base64
//! - AD `unicodePwd` encoding
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use xavyo_dirsync::prelude::*;
//! use xavyo_dirsync_ldap::{LdapTransport, LdapTransportConfig};
//!
//! let config = LdapTransportConfig::active_directory(
//!     "dc01.corp.example.com",
//!     "CN=svc-sync,OU=Service,DC=corp,DC=example,DC=com",
//! )
//! .with_password("secret")
//! .with_ssl();
//!
//! let transport = Arc::new(LdapTransport::new(config)?);
//! let engine = SyncEngine::new(transport, DynamicAttributeRegistry::with_builtins());
//! ```

pub mod config;
mod convert;
pub mod password;
pub mod transport;

// Re-exports
pub use config::{DirectoryFlavor, LdapTransportConfig};
pub use transport::LdapTransport;
