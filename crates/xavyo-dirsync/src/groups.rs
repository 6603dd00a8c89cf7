//! Group directive translation
//!
//! Group membership lives on the group entries, not on the object. Each ADD
//! or REMOVE directive becomes one modify request against a group entry. No
//! membership pre-check is made; the server decides what a redundant add or
//! remove means, and each outcome is recorded on its own.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::definition::ObjectDefinition;
use crate::desired::GroupDirectives;
use crate::dynamic::{DynamicAttributeRegistry, DynamicContext};
use crate::error::EngineResult;
use crate::operation::Modification;
use crate::traits::DirectoryTransport;

/// Indicator used for dynamic group lists.
pub const DYNAMIC_INDICATOR: &str = "DYNAMIC";

/// Kind of group modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupOperation {
    Add,
    Remove,
}

impl std::fmt::Display for GroupOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupOperation::Add => write!(f, "add"),
            GroupOperation::Remove => write!(f, "remove"),
        }
    }
}

/// Outcome of one group modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOperationStatus {
    Succeeded,
    Failed { code: String, message: String },
}

/// One group modification and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupModification {
    /// Group entry that was modified.
    pub group_dn: String,
    /// Whether the member was added or removed.
    pub operation: GroupOperation,
    /// Result reported by the directory.
    pub status: GroupOperationStatus,
}

impl GroupModification {
    /// Whether the directory accepted the modification.
    pub fn succeeded(&self) -> bool {
        matches!(self.status, GroupOperationStatus::Succeeded)
    }
}

/// Group DNs to join and leave, with dynamic lists already computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGroupDirectives {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl ResolvedGroupDirectives {
    /// Check if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Translates group directives into group entry modifications.
pub struct GroupDirectiveTranslator<'a> {
    definition: &'a ObjectDefinition,
    registry: &'a DynamicAttributeRegistry,
}

impl<'a> GroupDirectiveTranslator<'a> {
    /// Create a translator for one object type.
    pub fn new(definition: &'a ObjectDefinition, registry: &'a DynamicAttributeRegistry) -> Self {
        Self {
            definition,
            registry,
        }
    }

    /// Compute the final ADD/REMOVE group lists.
    ///
    /// Dynamic lists are evaluated here, before any write, so a missing
    /// callback fails the synchronization as a whole.
    pub fn resolve(&self, directives: &GroupDirectives) -> EngineResult<ResolvedGroupDirectives> {
        let keys = self.definition.group_directive_keys();
        let mut resolved = ResolvedGroupDirectives {
            add: directives.add.clone(),
            remove: directives.remove.clone(),
        };

        if let Some(seed) = &directives.dynamic_add {
            resolved.add.extend(self.evaluate(&keys.add, seed)?);
        }
        if let Some(seed) = &directives.dynamic_remove {
            resolved.remove.extend(self.evaluate(&keys.remove, seed)?);
        }

        resolved.add.retain(|dn| !dn.trim().is_empty());
        resolved.remove.retain(|dn| !dn.trim().is_empty());
        Ok(resolved)
    }

    fn evaluate(&self, attribute: &str, seed: &[String]) -> EngineResult<Vec<String>> {
        self.registry.evaluate(&DynamicContext {
            attribute,
            indicator: DYNAMIC_INDICATOR,
            existing: None,
            seed,
            definition: self.definition,
        })
    }

    /// Issue one modify per group; failures are collected, never raised.
    #[instrument(skip(self, transport, directives), fields(adds = directives.add.len(), removes = directives.remove.len()))]
    pub async fn apply(
        &self,
        transport: &dyn DirectoryTransport,
        member_dn: &str,
        directives: &ResolvedGroupDirectives,
    ) -> Vec<GroupModification> {
        let mut outcomes = Vec::with_capacity(directives.add.len() + directives.remove.len());

        let planned = directives
            .add
            .iter()
            .map(|dn| (dn, GroupOperation::Add))
            .chain(directives.remove.iter().map(|dn| (dn, GroupOperation::Remove)));

        for (group_dn, operation) in planned {
            let attribute = self.definition.group_member_attribute.clone();
            let values = vec![member_dn.to_string()];
            let modification = match operation {
                GroupOperation::Add => Modification::Add { attribute, values },
                GroupOperation::Remove => Modification::Delete { attribute, values },
            };

            let status = match transport.modify(group_dn, &[modification]).await {
                Ok(()) => {
                    debug!(group_dn = %group_dn, operation = %operation, "Group membership updated");
                    GroupOperationStatus::Succeeded
                }
                Err(e) => {
                    warn!(group_dn = %group_dn, operation = %operation, error = %e, "Group membership update failed");
                    GroupOperationStatus::Failed {
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    }
                }
            };

            outcomes.push(GroupModification {
                group_dn: group_dn.clone(),
                operation,
                status,
            });
        }

        outcomes
    }
}
