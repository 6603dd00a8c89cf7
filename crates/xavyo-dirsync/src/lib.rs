//! # Directory Synchronization
//!
//! Reconciles a desired attribute set for one identity object against an
//! LDAP-compatible directory (standard LDAP or Active Directory).
//!
//! The engine finds the object's canonical entry (by global identifier, then
//! by primary key), picks one entry when several share the primary key,
//! computes dynamic attribute values, diffs, writes, and finally applies
//! group membership changes on the group entries themselves.
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_dirsync::prelude::*;
//!
//! let definition = ObjectDefinition::new(
//!     "person",
//!     "ou=people,dc=example,dc=edu",
//!     "person",
//!     "uid",
//!     "uid",
//! )
//! .with_global_identifier("entryUUID", IdentifierFormat::Text);
//!
//! let engine = SyncEngine::new(transport, DynamicAttributeRegistry::with_builtins());
//! engine.prepare(&definition)?;
//!
//! let desired = DesiredAttributeSet::new()
//!     .with("uid", "jdoe")
//!     .with("cn", "J Doe")
//!     .with_group_add("cn=staff,dc=example,dc=edu");
//!
//! let result = engine.synchronize(&definition, &desired).await?;
//! assert_eq!(result.outcome, SyncOutcome::Created);
//! ```
//!
//! ## Crate Organization
//!
//! - [`definition`] - Per-object-type policy
//! - [`desired`] - Desired state and group directives
//! - [`entry`] - Directory entries and attribute maps
//! - [`operation`] - Filters, searches and modifications
//! - [`traits`] - The transport seam
//! - [`query`] - Identifier and primary-key lookups
//! - [`duplicates`] - Canonical entry selection
//! - [`dynamic`] - Dynamic attribute callbacks
//! - [`groups`] - Group directive translation
//! - [`diff`] - Attribute diffing
//! - [`engine`] - The synchronization state machine
//! - [`dn`] - DN and filter escaping helpers

pub mod config;
pub mod definition;
pub mod desired;
pub mod diff;
pub mod dn;
pub mod duplicates;
pub mod dynamic;
pub mod engine;
pub mod entry;
pub mod error;
pub mod groups;
pub mod operation;
pub mod query;
pub mod result;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use xavyo_dirsync::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{EngineConfig, TransportConfig};
    pub use crate::definition::{DnAcceptance, IdentifierFormat, ObjectDefinition};
    pub use crate::desired::{DesiredAttributeSet, DesiredValue, GroupDirectives};
    pub use crate::dynamic::{DynamicAttributeRegistry, DynamicContext};
    pub use crate::engine::SyncEngine;
    pub use crate::entry::{AttributeMap, DirectoryEntry};
    pub use crate::error::{DirectoryError, DirectoryResult, EngineResult, SyncError};
    pub use crate::groups::{GroupModification, GroupOperation, GroupOperationStatus};
    pub use crate::operation::{Filter, Modification, SearchRequest, SearchScope};
    pub use crate::result::{SyncOutcome, SyncResult, SyncWarning};
    pub use crate::traits::DirectoryTransport;
}

// Re-export async_trait for transport implementors
pub use async_trait::async_trait;
