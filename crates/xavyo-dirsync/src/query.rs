//! Query abstraction
//!
//! Builds and runs the two lookups the engine uses to find an object's entry:
//! by directory-assigned global identifier (authoritative) and by business
//! primary key (fallback).

use base64::Engine;
use tracing::{debug, instrument};

use crate::definition::{IdentifierFormat, ObjectDefinition};
use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{Filter, SearchRequest};
use crate::traits::DirectoryTransport;

/// Search for entries of the policy's class whose primary key equals `value`.
pub fn primary_key_request(definition: &ObjectDefinition, value: &str) -> SearchRequest {
    let filter = Filter::and(vec![
        Filter::eq("objectClass", &definition.object_class_filter),
        Filter::eq(&definition.primary_key_attribute, value),
    ]);
    with_identifier(
        definition,
        SearchRequest::subtree(&definition.base_dn, filter),
    )
}

/// Search for the entry carrying global identifier `value`.
///
/// Returns `None` when the policy has no global identifier.
pub fn global_identifier_request(
    definition: &ObjectDefinition,
    value: &str,
) -> DirectoryResult<Option<SearchRequest>> {
    let Some(attribute) = definition.global_identifier_attribute.as_deref() else {
        return Ok(None);
    };

    let identifier = match definition.global_identifier_format {
        IdentifierFormat::Text => Filter::eq(attribute, value),
        IdentifierFormat::Binary => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(value)
                .map_err(|e| DirectoryError::InvalidData {
                    message: format!("global identifier '{value}' is not valid base64: {e}"),
                })?;
            Filter::eq_bytes(attribute, bytes)
        }
    };

    let filter = Filter::and(vec![
        Filter::eq("objectClass", &definition.object_class_filter),
        identifier,
    ]);
    Ok(Some(with_identifier(
        definition,
        SearchRequest::subtree(&definition.base_dn, filter),
    )))
}

/// Read one entry by DN, including its global identifier.
pub fn read_request(definition: &ObjectDefinition, dn: &str) -> SearchRequest {
    with_identifier(definition, SearchRequest::read(dn))
}

fn with_identifier(definition: &ObjectDefinition, request: SearchRequest) -> SearchRequest {
    match &definition.global_identifier_attribute {
        Some(attribute) => request.with_attribute(attribute),
        None => request,
    }
}

/// Lookups against a transport for one object type.
pub struct DirectoryQuery<'a> {
    transport: &'a dyn DirectoryTransport,
    definition: &'a ObjectDefinition,
}

impl<'a> DirectoryQuery<'a> {
    /// Create a query helper.
    pub fn new(transport: &'a dyn DirectoryTransport, definition: &'a ObjectDefinition) -> Self {
        Self {
            transport,
            definition,
        }
    }

    /// Find the entry with the given global identifier.
    ///
    /// `primary_key_hint` only annotates logs; a hit is canonical even when
    /// its primary key no longer matches. Returns no entries when the policy
    /// has no global identifier.
    #[instrument(skip(self), fields(object_type = %self.definition.name))]
    pub async fn by_global_identifier(
        &self,
        primary_key_hint: Option<&str>,
        identifier: &str,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let Some(request) = global_identifier_request(self.definition, identifier)? else {
            return Ok(Vec::new());
        };
        let entries = self.transport.search(&request).await?;
        debug!(filter = %request.filter, found = entries.len(), "Global identifier lookup");
        Ok(entries)
    }

    /// Find all entries sharing the primary key, in directory order.
    #[instrument(skip(self), fields(object_type = %self.definition.name))]
    pub async fn by_primary_key(&self, value: &str) -> DirectoryResult<Vec<DirectoryEntry>> {
        let request = primary_key_request(self.definition, value);
        let entries = self.transport.search(&request).await?;
        debug!(filter = %request.filter, found = entries.len(), "Primary key lookup");
        Ok(entries)
    }

    /// Re-read an entry by DN.
    pub async fn read(&self, dn: &str) -> DirectoryResult<Option<DirectoryEntry>> {
        let entries = self
            .transport
            .search(&read_request(self.definition, dn))
            .await?;
        Ok(entries.into_iter().next())
    }
}
