//! Directory transport trait
//!
//! The engine talks to the directory only through [`DirectoryTransport`].
//! Connection pooling, TLS and timeouts live behind it.

use async_trait::async_trait;

use crate::entry::{AttributeMap, DirectoryEntry};
use crate::error::DirectoryResult;
use crate::operation::{Modification, SearchRequest};

/// Access to an LDAP-compatible directory.
///
/// Implementations report failures as [`DirectoryError`](crate::error::DirectoryError)
/// values classified as transient, conflicting or permanent; the engine
/// relies on that classification for its single retry.
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    /// Human-readable name for logs.
    fn display_name(&self) -> &str;

    /// Run a search. A base that does not exist yields no entries.
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>>;

    /// Create an entry.
    async fn add(&self, dn: &str, attributes: &AttributeMap) -> DirectoryResult<()>;

    /// Apply modifications to an entry atomically.
    async fn modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()>;

    /// Rename an entry, deleting the old RDN value.
    ///
    /// # Arguments
    /// * `dn` - Current DN
    /// * `new_rdn` - New RDN, already escaped
    /// * `new_superior` - New parent DN, or `None` to keep the current parent
    async fn rename(
        &self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()>;

    /// Delete an entry.
    async fn delete(&self, dn: &str) -> DirectoryResult<()>;
}
