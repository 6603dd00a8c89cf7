//! Synchronization results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::groups::GroupModification;

/// What `synchronize` did to the object's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOutcome {
    /// A new entry was added.
    Created,
    /// The canonical entry was modified in place, or only side effects ran.
    Updated,
    /// Nothing needed to change.
    Noop,
    /// The canonical entry moved to a new DN (and may also have been modified).
    Renamed,
}

impl SyncOutcome {
    /// Whether the directory was written to.
    pub fn is_change(&self) -> bool {
        !matches!(self, SyncOutcome::Noop)
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Created => write!(f, "CREATED"),
            SyncOutcome::Updated => write!(f, "UPDATED"),
            SyncOutcome::Noop => write!(f, "NOOP"),
            SyncOutcome::Renamed => write!(f, "RENAMED"),
        }
    }
}

/// Non-fatal condition reported alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// A duplicate entry was left in place because removal is disabled.
    DuplicateRetained { dn: String },
    /// Deleting a duplicate entry failed.
    DuplicateRemovalFailed {
        dn: String,
        code: String,
        message: String,
    },
    /// The created entry could not be re-read for its global identifier.
    IdentifierUnavailable { dn: String, message: String },
}

/// Result of one `synchronize` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Invocation id, also recorded on the tracing span.
    pub sync_id: Uuid,
    /// Object type the policy describes.
    pub object_type: String,
    pub outcome: SyncOutcome,
    /// DN of the canonical entry after the sync.
    pub dn: String,
    /// DN before a rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_dn: Option<String>,
    /// Directory-assigned identifier of the canonical entry, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_identifier: Option<String>,
    /// Names of attributes written on the canonical entry.
    #[serde(default)]
    pub modified_attributes: Vec<String>,
    /// Duplicate entries deleted after the canonical write.
    #[serde(default)]
    pub removed_duplicates: Vec<String>,
    #[serde(default)]
    pub group_modifications: Vec<GroupModification>,
    #[serde(default)]
    pub warnings: Vec<SyncWarning>,
    /// 1, or 2 when the first attempt hit a retryable failure.
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SyncResult {
    /// DNs this invocation touched on the object itself.
    pub fn affected_dns(&self) -> Vec<&str> {
        let mut dns = Vec::with_capacity(2 + self.removed_duplicates.len());
        if let Some(previous) = &self.previous_dn {
            dns.push(previous.as_str());
        }
        if self.outcome.is_change() {
            dns.push(self.dn.as_str());
        }
        dns.extend(self.removed_duplicates.iter().map(String::as_str));
        dns
    }

    /// Group modifications the directory rejected.
    pub fn failed_group_modifications(&self) -> impl Iterator<Item = &GroupModification> {
        self.group_modifications.iter().filter(|g| !g.succeeded())
    }

    /// Whether every group modification succeeded.
    pub fn groups_succeeded(&self) -> bool {
        self.failed_group_modifications().next().is_none()
    }

    /// DNs of duplicates left in place.
    pub fn retained_duplicates(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                SyncWarning::DuplicateRetained { dn } => Some(dn.as_str()),
                SyncWarning::DuplicateRemovalFailed { dn, .. } => Some(dn.as_str()),
                SyncWarning::IdentifierUnavailable { .. } => None,
            })
            .collect()
    }

    /// Wall-clock duration of the invocation.
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::{GroupOperation, GroupOperationStatus};

    fn result(outcome: SyncOutcome) -> SyncResult {
        let now = Utc::now();
        SyncResult {
            sync_id: Uuid::new_v4(),
            object_type: "person".to_string(),
            outcome,
            dn: "uid=jsmith,ou=people,dc=example,dc=edu".to_string(),
            previous_dn: None,
            global_identifier: None,
            modified_attributes: vec![],
            removed_duplicates: vec![],
            group_modifications: vec![],
            warnings: vec![],
            attempts: 1,
            started_at: now,
            completed_at: now,
        }
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_string(&SyncOutcome::Created).unwrap(),
            "\"CREATED\""
        );
        assert_eq!(SyncOutcome::Noop.to_string(), "NOOP");
        assert!(!SyncOutcome::Noop.is_change());
        assert!(SyncOutcome::Renamed.is_change());
    }

    #[test]
    fn test_affected_dns() {
        let mut renamed = result(SyncOutcome::Renamed);
        renamed.previous_dn = Some("uid=jdoe,ou=people,dc=example,dc=edu".to_string());
        renamed.removed_duplicates = vec!["uid=jdoe,ou=legacy,dc=example,dc=edu".to_string()];
        assert_eq!(
            renamed.affected_dns(),
            vec![
                "uid=jdoe,ou=people,dc=example,dc=edu",
                "uid=jsmith,ou=people,dc=example,dc=edu",
                "uid=jdoe,ou=legacy,dc=example,dc=edu"
            ]
        );

        assert!(result(SyncOutcome::Noop).affected_dns().is_empty());
    }

    #[test]
    fn test_group_failures_and_warnings() {
        let mut r = result(SyncOutcome::Updated);
        r.group_modifications = vec![
            GroupModification {
                group_dn: "cn=staff,dc=example,dc=edu".to_string(),
                operation: GroupOperation::Add,
                status: GroupOperationStatus::Succeeded,
            },
            GroupModification {
                group_dn: "cn=gone,dc=example,dc=edu".to_string(),
                operation: GroupOperation::Remove,
                status: GroupOperationStatus::Failed {
                    code: "NO_SUCH_OBJECT".to_string(),
                    message: "no such object".to_string(),
                },
            },
        ];
        r.warnings = vec![
            SyncWarning::DuplicateRetained {
                dn: "uid=jdoe,ou=legacy,dc=example,dc=edu".to_string(),
            },
            SyncWarning::IdentifierUnavailable {
                dn: r.dn.clone(),
                message: "timeout".to_string(),
            },
        ];

        assert!(!r.groups_succeeded());
        assert_eq!(r.failed_group_modifications().count(), 1);
        assert_eq!(
            r.retained_duplicates(),
            vec!["uid=jdoe,ou=legacy,dc=example,dc=edu"]
        );
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(result(SyncOutcome::Created)).unwrap();
        assert_eq!(json["outcome"], "CREATED");
        assert!(json.get("previous_dn").is_none());
        assert_eq!(json["attempts"], 1);
    }
}
