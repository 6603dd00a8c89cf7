//! Synchronization engine
//!
//! `synchronize` walks one object through
//! RESOLVE → DUPLICATE_CHECK → DIFF → APPLY (or CREATE) and reports what it
//! did. Entry-level failures abort the invocation; duplicate deletions, the
//! identifier re-read and group modifications run only after the entry write
//! committed and are reported, never raised.
//!
//! A retryable directory failure (connectivity or a write conflict) restarts
//! the invocation from RESOLVE exactly once.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, field, info, instrument, warn, Span};
use uuid::Uuid;

use crate::config::{EngineConfig, MAX_ATTEMPTS};
use crate::definition::ObjectDefinition;
use crate::desired::DesiredAttributeSet;
use crate::diff::compute_delta;
use crate::dn;
use crate::duplicates::{resolve_duplicates, DuplicateResolution};
use crate::dynamic::{DynamicAttributeRegistry, ResolvedAttributes};
use crate::entry::{AttributeMap, DirectoryEntry};
use crate::error::{DirectoryError, EngineResult, SyncError};
use crate::groups::{GroupDirectiveTranslator, GroupModification, ResolvedGroupDirectives};
use crate::query::DirectoryQuery;
use crate::result::{SyncOutcome, SyncResult, SyncWarning};
use crate::traits::DirectoryTransport;

/// Reconciles desired attribute sets against a directory.
///
/// The transport, callback registry and config are injected once and only
/// read afterwards; the engine keeps no state between invocations, so one
/// instance may serve concurrent callers.
pub struct SyncEngine {
    transport: Arc<dyn DirectoryTransport>,
    registry: Arc<DynamicAttributeRegistry>,
    config: EngineConfig,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("transport", &self.transport.display_name())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// What the entry-level phase changed, before side effects.
struct EntryWrite {
    dn: String,
    previous_dn: Option<String>,
    global_identifier: Option<String>,
    modified_attributes: Vec<String>,
    created: bool,
}

/// Everything one attempt produced.
struct Applied {
    outcome: SyncOutcome,
    entry: EntryWrite,
    removed_duplicates: Vec<String>,
    group_modifications: Vec<GroupModification>,
    warnings: Vec<SyncWarning>,
}

impl SyncEngine {
    /// Create an engine with default settings.
    pub fn new(
        transport: Arc<dyn DirectoryTransport>,
        registry: impl Into<Arc<DynamicAttributeRegistry>>,
    ) -> Self {
        Self {
            transport,
            registry: registry.into(),
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine settings.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Callback registry.
    pub fn registry(&self) -> &DynamicAttributeRegistry {
        &self.registry
    }

    /// Validate a policy and its declared dynamic attributes up front.
    ///
    /// Call at startup so a missing callback fails deployment instead of the
    /// first synchronization.
    pub fn prepare(&self, definition: &ObjectDefinition) -> EngineResult<()> {
        definition.validate()?;
        self.registry.validate(definition)?;
        debug!(
            object_type = %definition.name,
            transport = %self.transport.display_name(),
            "Object definition prepared"
        );
        Ok(())
    }

    /// Reconcile one object with the directory.
    #[instrument(
        skip_all,
        fields(
            object_type = %definition.name,
            sync_id = field::Empty,
            primary_key = field::Empty,
        )
    )]
    pub async fn synchronize(
        &self,
        definition: &ObjectDefinition,
        desired: &DesiredAttributeSet,
    ) -> EngineResult<SyncResult> {
        let sync_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = Span::current();
        span.record("sync_id", field::display(sync_id));

        definition.validate()?;
        let primary_key = primary_key_value(definition, desired)?;
        span.record("primary_key", field::display(&primary_key));

        let mut attempts = 0;
        let applied = loop {
            attempts += 1;
            match self.attempt(definition, desired, &primary_key).await {
                Ok(applied) => break applied,
                Err(e) if attempts < MAX_ATTEMPTS && e.is_retryable_within_invocation() => {
                    warn!(attempt = attempts, error = %e, "Retryable directory failure, restarting from RESOLVE");
                    let delay = self.config.retry_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(SyncError::Directory(source)) if source.is_retryable() => {
                    warn!(attempts, error = %source, "Giving up after retry");
                    return Err(SyncError::TransientDirectory { attempts, source });
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            outcome = %applied.outcome,
            dn = %applied.entry.dn,
            attempts,
            "Synchronization finished"
        );

        Ok(SyncResult {
            sync_id,
            object_type: definition.name.clone(),
            outcome: applied.outcome,
            dn: applied.entry.dn,
            previous_dn: applied.entry.previous_dn,
            global_identifier: applied.entry.global_identifier,
            modified_attributes: applied.entry.modified_attributes,
            removed_duplicates: applied.removed_duplicates,
            group_modifications: applied.group_modifications,
            warnings: applied.warnings,
            attempts,
            started_at,
            completed_at: Utc::now(),
        })
    }

    async fn attempt(
        &self,
        definition: &ObjectDefinition,
        desired: &DesiredAttributeSet,
        primary_key: &str,
    ) -> EngineResult<Applied> {
        let query = DirectoryQuery::new(self.transport.as_ref(), definition);

        let resolution = self.locate(&query, definition, desired, primary_key).await?;
        if resolution.canonical.is_none() && resolution.has_duplicates() && !definition.remove_duplicates {
            return Err(SyncError::AmbiguousState {
                primary_key: primary_key.to_string(),
                candidates: resolution.duplicates.len(),
                dns: resolution.duplicate_dns(),
            });
        }

        // All callbacks run before the first write.
        debug!(state = "DIFF", "Resolving desired attributes");
        let resolved = self
            .registry
            .resolve(definition, desired, resolution.canonical.as_ref())?;
        let translator = GroupDirectiveTranslator::new(definition, &self.registry);
        let groups = translator.resolve(desired.group_directives())?;

        let mut warnings = Vec::new();
        let entry = match &resolution.canonical {
            Some(canonical) => self.update(definition, canonical, &resolved).await?,
            None => {
                self.create(&query, definition, &resolved, &mut warnings)
                    .await?
            }
        };

        let removed_duplicates = self
            .settle_duplicates(definition, &resolution.duplicates, &mut warnings)
            .await;

        let group_modifications = if groups.is_empty() {
            Vec::new()
        } else {
            translator
                .apply(self.transport.as_ref(), &entry.dn, &groups)
                .await
        };

        let outcome = classify(&entry, &removed_duplicates, &groups);
        Ok(Applied {
            outcome,
            entry,
            removed_duplicates,
            group_modifications,
            warnings,
        })
    }

    /// RESOLVE and DUPLICATE_CHECK.
    async fn locate(
        &self,
        query: &DirectoryQuery<'_>,
        definition: &ObjectDefinition,
        desired: &DesiredAttributeSet,
        primary_key: &str,
    ) -> EngineResult<DuplicateResolution> {
        debug!(state = "RESOLVE", "Looking up canonical entry");

        if let Some(identifier) = desired.global_identifier() {
            let entries = query
                .by_global_identifier(Some(primary_key), identifier)
                .await?;
            if entries.len() > 1 {
                warn!(found = entries.len(), "Global identifier matched several entries, using the first");
            }
            if let Some(entry) = entries.into_iter().next() {
                debug!(dn = %entry.dn, "Matched by global identifier");
                return Ok(DuplicateResolution {
                    canonical: Some(entry),
                    duplicates: Vec::new(),
                });
            }
        }

        let entries = query.by_primary_key(primary_key).await?;
        debug!(state = "DUPLICATE_CHECK", matches = entries.len(), "Classifying primary key matches");
        Ok(resolve_duplicates(definition, entries))
    }

    /// DIFF and APPLY against the canonical entry.
    async fn update(
        &self,
        definition: &ObjectDefinition,
        canonical: &DirectoryEntry,
        resolved: &ResolvedAttributes,
    ) -> EngineResult<EntryWrite> {
        let delta = compute_delta(definition, &resolved.attributes, canonical);
        let modified_attributes = delta.affected_attributes();

        if !delta.is_empty() {
            debug!(state = "APPLY", dn = %canonical.dn, attributes = ?modified_attributes, "Modifying entry");
            self.transport
                .modify(&canonical.dn, &delta.modifications)
                .await?;
            info!(dn = %canonical.dn, changes = delta.modifications.len(), "Modified entry");
        }

        let mut dn = canonical.dn.clone();
        let mut previous_dn = None;

        if let Some(value) = naming_value(definition, &resolved.attributes)? {
            let new_rdn = dn::build_rdn(&definition.naming_attribute, &value);
            let current_rdn = dn::rdn(&canonical.dn).unwrap_or_default();

            if !dn::dn_eq(current_rdn, &new_rdn, definition.case_sensitive_dn) {
                if resolved.suppress_rename {
                    debug!(dn = %canonical.dn, "Naming value changed, rename suppressed by dn.ONCREATE");
                } else {
                    let new_dn = match dn::parent(&canonical.dn) {
                        Some(parent) => format!("{new_rdn},{parent}"),
                        None => new_rdn.clone(),
                    };
                    debug!(state = "APPLY", dn = %canonical.dn, new_dn = %new_dn, "Renaming entry");
                    self.transport.rename(&canonical.dn, &new_rdn, None).await?;
                    info!(previous_dn = %canonical.dn, dn = %new_dn, "Renamed entry");
                    previous_dn = Some(std::mem::replace(&mut dn, new_dn));
                }
            }
        }

        let global_identifier = definition
            .global_identifier_attribute
            .as_deref()
            .and_then(|attribute| canonical.get_first(attribute))
            .map(str::to_string);

        Ok(EntryWrite {
            dn,
            previous_dn,
            global_identifier,
            modified_attributes,
            created: false,
        })
    }

    /// CREATE a new entry in the policy's creation container.
    async fn create(
        &self,
        query: &DirectoryQuery<'_>,
        definition: &ObjectDefinition,
        resolved: &ResolvedAttributes,
        warnings: &mut Vec<SyncWarning>,
    ) -> EngineResult<EntryWrite> {
        let value = naming_value(definition, &resolved.attributes)?.ok_or_else(|| {
            SyncError::invalid_data(format!(
                "cannot create {} entry without a value for naming attribute '{}'",
                definition.name, definition.naming_attribute
            ))
        })?;
        let dn = dn::build_dn(
            &definition.naming_attribute,
            &value,
            definition.creation_parent(),
        );
        if !definition.accepts(&dn) {
            return Err(SyncError::configuration(format!(
                "invalid naming rule for {}: new entry '{dn}' would not be accepted as canonical",
                definition.name
            )));
        }

        let mut attributes = AttributeMap::new();
        for attribute in resolved.attributes.iter() {
            if attribute.values.is_empty() || definition.is_meta_attribute(&attribute.name) {
                continue;
            }
            attributes.set(attribute.name.clone(), attribute.values.clone());
        }
        if !attributes.has("objectClass") {
            attributes.set("objectClass", definition.creation_object_classes());
        }
        let mut modified_attributes: Vec<String> = attributes.names().map(str::to_string).collect();
        modified_attributes.sort_by_key(|n| n.to_lowercase());

        debug!(state = "CREATE", dn = %dn, attributes = ?modified_attributes, "Adding entry");
        self.transport.add(&dn, &attributes).await?;
        info!(dn = %dn, "Created entry");

        let global_identifier = match &definition.global_identifier_attribute {
            Some(attribute) if self.config.fetch_identifier_after_create => {
                match read_identifier(query, &dn, attribute).await {
                    Ok(identifier) => Some(identifier),
                    Err(message) => {
                        warn!(dn = %dn, reason = %message, "Global identifier of created entry unavailable");
                        warnings.push(SyncWarning::IdentifierUnavailable {
                            dn: dn.clone(),
                            message,
                        });
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(EntryWrite {
            dn,
            previous_dn: None,
            global_identifier,
            modified_attributes,
            created: true,
        })
    }

    /// Delete or report duplicates once the canonical entry is written.
    async fn settle_duplicates(
        &self,
        definition: &ObjectDefinition,
        duplicates: &[DirectoryEntry],
        warnings: &mut Vec<SyncWarning>,
    ) -> Vec<String> {
        let mut removed = Vec::new();

        if !definition.remove_duplicates {
            for duplicate in duplicates {
                warn!(dn = %duplicate.dn, "Duplicate entry retained");
                warnings.push(SyncWarning::DuplicateRetained {
                    dn: duplicate.dn.clone(),
                });
            }
            return removed;
        }

        for duplicate in duplicates {
            match self.transport.delete(&duplicate.dn).await {
                Ok(()) => {
                    info!(dn = %duplicate.dn, "Deleted duplicate entry");
                    removed.push(duplicate.dn.clone());
                }
                Err(DirectoryError::NoSuchObject { .. }) => {
                    debug!(dn = %duplicate.dn, "Duplicate entry already gone");
                }
                Err(e) => {
                    warn!(dn = %duplicate.dn, error = %e, "Failed to delete duplicate entry");
                    warnings.push(SyncWarning::DuplicateRemovalFailed {
                        dn: duplicate.dn.clone(),
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        removed
    }
}

fn classify(
    entry: &EntryWrite,
    removed_duplicates: &[String],
    groups: &ResolvedGroupDirectives,
) -> SyncOutcome {
    if entry.created {
        SyncOutcome::Created
    } else if entry.previous_dn.is_some() {
        SyncOutcome::Renamed
    } else if !entry.modified_attributes.is_empty()
        || !removed_duplicates.is_empty()
        || !groups.is_empty()
    {
        SyncOutcome::Updated
    } else {
        SyncOutcome::Noop
    }
}

fn primary_key_value(
    definition: &ObjectDefinition,
    desired: &DesiredAttributeSet,
) -> EngineResult<String> {
    let attribute = &definition.primary_key_attribute;
    match desired.literal(attribute) {
        Some([value]) if !value.trim().is_empty() => Ok(value.clone()),
        Some(values) if values.len() > 1 => Err(SyncError::invalid_data(format!(
            "primary key '{attribute}' must be single-valued, got {} values",
            values.len()
        ))),
        _ => Err(SyncError::invalid_data(format!(
            "desired attributes carry no literal value for primary key '{attribute}'"
        ))),
    }
}

fn naming_value(definition: &ObjectDefinition, attributes: &AttributeMap) -> EngineResult<Option<String>> {
    match attributes.get(&definition.naming_attribute) {
        None | Some([]) => Ok(None),
        Some([value]) if value.trim().is_empty() => Ok(None),
        Some([value]) => Ok(Some(value.clone())),
        Some(values) => Err(SyncError::invalid_data(format!(
            "naming attribute '{}' must be single-valued, got {} values",
            definition.naming_attribute,
            values.len()
        ))),
    }
}

async fn read_identifier(
    query: &DirectoryQuery<'_>,
    dn: &str,
    attribute: &str,
) -> Result<String, String> {
    let entry = query
        .read(dn)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "entry not found after create".to_string())?;
    entry
        .get_first(attribute)
        .map(str::to_string)
        .ok_or_else(|| format!("'{attribute}' not returned"))
}
