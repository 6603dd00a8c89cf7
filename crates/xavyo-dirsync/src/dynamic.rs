//! Dynamic attribute resolution
//!
//! Callbacks are registered under `attribute.INDICATOR` (one attribute) or a
//! bare `INDICATOR` (every attribute). Lookup tries the exact pair first.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::definition::{
    split_dynamic_key, ObjectDefinition, DN_ONCREATE, DN_PSEUDO_ATTRIBUTE, ONCREATE_INDICATOR,
};
use crate::desired::{DesiredAttributeSet, DesiredValue};
use crate::entry::{AttributeMap, DirectoryEntry};
use crate::error::{EngineResult, SyncError};

/// Input handed to a dynamic attribute callback.
#[derive(Debug, Clone, Copy)]
pub struct DynamicContext<'a> {
    /// Attribute being computed.
    pub attribute: &'a str,
    /// Indicator that selected the callback.
    pub indicator: &'a str,
    /// Current values on the canonical entry; `None` when creating.
    pub existing: Option<&'a [String]>,
    /// Seed values supplied by the caller.
    pub seed: &'a [String],
    /// Policy of the object being synchronized.
    pub definition: &'a ObjectDefinition,
}

impl DynamicContext<'_> {
    /// Whether the entry is being created.
    pub fn is_create(&self) -> bool {
        self.existing.is_none()
    }
}

/// Computes the values to write. An empty result clears the attribute.
pub type DynamicCallback =
    Arc<dyn Fn(&DynamicContext<'_>) -> Result<Vec<String>, String> + Send + Sync>;

/// Registry of dynamic attribute callbacks.
///
/// Treated as read-only once the engine is built.
#[derive(Clone, Default)]
pub struct DynamicAttributeRegistry {
    callbacks: HashMap<String, DynamicCallback>,
}

impl std::fmt::Debug for DynamicAttributeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.callbacks.keys().collect();
        keys.sort();
        f.debug_struct("DynamicAttributeRegistry")
            .field("keys", &keys)
            .finish()
    }
}

impl DynamicAttributeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `ONCREATE` callback.
    ///
    /// `ONCREATE` keeps the existing value when there is one and writes the
    /// seed otherwise.
    pub fn with_builtins() -> Self {
        Self::new().with(ONCREATE_INDICATOR, |ctx: &DynamicContext<'_>| {
            Ok(match ctx.existing {
                Some(existing) if !existing.is_empty() => existing.to_vec(),
                _ => ctx.seed.to_vec(),
            })
        })
    }

    /// Register a callback, replacing any previous one for the key.
    pub fn register<F>(&mut self, key: &str, callback: F)
    where
        F: Fn(&DynamicContext<'_>) -> Result<Vec<String>, String> + Send + Sync + 'static,
    {
        self.callbacks.insert(normalize_key(key), Arc::new(callback));
    }

    /// Register a callback using builder pattern.
    pub fn with<F>(mut self, key: &str, callback: F) -> Self
    where
        F: Fn(&DynamicContext<'_>) -> Result<Vec<String>, String> + Send + Sync + 'static,
    {
        self.register(key, callback);
        self
    }

    /// Find the callback for an attribute/indicator pair.
    pub fn lookup(&self, attribute: &str, indicator: &str) -> Option<&DynamicCallback> {
        self.callbacks
            .get(&normalize_key(&format!("{attribute}.{indicator}")))
            .or_else(|| self.callbacks.get(indicator))
    }

    /// Check that every dynamic attribute declared by a policy has a callback.
    pub fn validate(&self, definition: &ObjectDefinition) -> EngineResult<()> {
        for key in &definition.dynamic_attributes {
            if key.eq_ignore_ascii_case(DN_ONCREATE) {
                continue;
            }
            let (attribute, indicator) = split_dynamic_key(key).ok_or_else(|| {
                SyncError::configuration(format!("malformed dynamic attribute '{key}'"))
            })?;
            if self.lookup(attribute, indicator).is_none() {
                return Err(missing_callback(&definition.name, attribute, indicator));
            }
        }
        Ok(())
    }

    /// Run one callback.
    pub fn evaluate(&self, ctx: &DynamicContext<'_>) -> EngineResult<Vec<String>> {
        let callback = self
            .lookup(ctx.attribute, ctx.indicator)
            .ok_or_else(|| missing_callback(&ctx.definition.name, ctx.attribute, ctx.indicator))?;
        callback(ctx).map_err(|message| SyncError::dynamic_attribute(ctx.attribute, message))
    }

    /// Resolve every literal and dynamic attribute of a desired set.
    ///
    /// All callbacks run before anything is written, so a missing callback
    /// fails the whole synchronization.
    #[instrument(skip_all, fields(object_type = %definition.name, create = existing.is_none()))]
    pub fn resolve(
        &self,
        definition: &ObjectDefinition,
        desired: &DesiredAttributeSet,
        existing: Option<&DirectoryEntry>,
    ) -> EngineResult<ResolvedAttributes> {
        let mut attributes = AttributeMap::new();
        let mut suppress_rename = definition.suppresses_rename() || desired.suppresses_rename();

        for attribute in desired.attributes() {
            if definition.is_global_identifier(&attribute.name) {
                continue;
            }
            match &attribute.value {
                DesiredValue::Literal { values } => {
                    attributes.set(attribute.name.clone(), values.clone());
                }
                DesiredValue::Dynamic { indicator, seed } => {
                    if attribute.name.eq_ignore_ascii_case(DN_PSEUDO_ATTRIBUTE) {
                        if indicator.eq_ignore_ascii_case(ONCREATE_INDICATOR) {
                            suppress_rename = true;
                            continue;
                        }
                        return Err(SyncError::configuration(format!(
                            "'dn.{indicator}' is not supported; only dn.ONCREATE is reserved"
                        )));
                    }
                    let ctx = DynamicContext {
                        attribute: &attribute.name,
                        indicator,
                        existing: existing.and_then(|e| e.get(&attribute.name)),
                        seed,
                        definition,
                    };
                    let values = self.evaluate(&ctx)?;
                    debug!(attribute = %attribute.name, indicator = %indicator, "Resolved dynamic attribute");
                    attributes.set(attribute.name.clone(), values);
                }
            }
        }

        // Declared dynamics the caller did not mention run with an empty seed.
        for key in &definition.dynamic_attributes {
            if key.eq_ignore_ascii_case(DN_ONCREATE) {
                continue;
            }
            let Some((name, indicator)) = split_dynamic_key(key) else {
                continue;
            };
            if desired.get(name).is_some() || definition.is_global_identifier(name) {
                continue;
            }
            let ctx = DynamicContext {
                attribute: name,
                indicator,
                existing: existing.and_then(|e| e.get(name)),
                seed: &[],
                definition,
            };
            let values = self.evaluate(&ctx)?;
            debug!(attribute = %name, indicator = %indicator, "Resolved declared dynamic attribute");
            attributes.set(name, values);
        }

        Ok(ResolvedAttributes {
            attributes,
            suppress_rename,
        })
    }
}

/// Desired attributes with every dynamic value computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttributes {
    /// Literal values to converge to. Empty value lists mean "clear".
    pub attributes: AttributeMap,
    /// `dn.ONCREATE` was requested.
    pub suppress_rename: bool,
}

fn normalize_key(key: &str) -> String {
    match split_dynamic_key(key) {
        Some((attribute, indicator)) => format!("{}.{}", attribute.to_lowercase(), indicator),
        None => key.to_string(),
    }
}

fn missing_callback(object_type: &str, attribute: &str, indicator: &str) -> SyncError {
    SyncError::configuration(format!(
        "object definition '{object_type}': no callback registered for '{attribute}.{indicator}' or '{indicator}'"
    ))
}
