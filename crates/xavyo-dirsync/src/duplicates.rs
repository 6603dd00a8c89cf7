//! Duplicate resolution
//!
//! Picks the canonical entry among several primary-key matches.

use tracing::{debug, warn};

use crate::definition::ObjectDefinition;
use crate::entry::DirectoryEntry;

/// Classification of primary-key matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateResolution {
    /// First entry, in directory order, accepted by the policy.
    pub canonical: Option<DirectoryEntry>,
    /// Every other match, in directory order.
    pub duplicates: Vec<DirectoryEntry>,
}

impl DuplicateResolution {
    /// DNs of the duplicate entries.
    pub fn duplicate_dns(&self) -> Vec<String> {
        self.duplicates.iter().map(|e| e.dn.clone()).collect()
    }

    /// Whether more than one entry matched.
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Split primary-key matches into canonical and duplicate entries.
///
/// The first entry satisfying the policy's acceptance predicate becomes
/// canonical. Entries are never reordered.
pub fn resolve_duplicates(
    definition: &ObjectDefinition,
    entries: Vec<DirectoryEntry>,
) -> DuplicateResolution {
    let mut resolution = DuplicateResolution::default();

    for entry in entries {
        if resolution.canonical.is_none() && definition.accepts(&entry.dn) {
            debug!(dn = %entry.dn, "Selected canonical entry");
            resolution.canonical = Some(entry);
        } else {
            resolution.duplicates.push(entry);
        }
    }

    if resolution.has_duplicates() {
        warn!(
            object_type = %definition.name,
            canonical = resolution.canonical.as_ref().map(|e| e.dn.as_str()).unwrap_or("<none>"),
            duplicates = resolution.duplicates.len(),
            "Multiple entries share the primary key"
        );
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AttributeMap;

    fn definition() -> ObjectDefinition {
        ObjectDefinition::new(
            "person",
            "ou=people,dc=example,dc=edu",
            "person",
            "uid",
            "uid",
        )
        .accept_under(["ou=people,dc=example,dc=edu"])
    }

    fn entry(dn: &str) -> DirectoryEntry {
        DirectoryEntry::new(dn, AttributeMap::new().with_value("uid", "jdoe"))
    }

    #[test]
    fn test_first_accepted_entry_is_canonical() {
        let entries = vec![
            entry("uid=jdoe,ou=legacy,dc=example,dc=edu"),
            entry("uid=jdoe,ou=people,dc=example,dc=edu"),
            entry("uid=jdoe,ou=sub,ou=people,dc=example,dc=edu"),
        ];

        let resolution = resolve_duplicates(&definition(), entries);
        assert_eq!(
            resolution.canonical.map(|e| e.dn),
            Some("uid=jdoe,ou=people,dc=example,dc=edu".to_string())
        );
        assert_eq!(
            resolution.duplicates.iter().map(|e| e.dn.as_str()).collect::<Vec<_>>(),
            vec![
                "uid=jdoe,ou=legacy,dc=example,dc=edu",
                "uid=jdoe,ou=sub,ou=people,dc=example,dc=edu"
            ]
        );
    }

    #[test]
    fn test_k_th_entry_canonical_for_any_position() {
        for k in 0..4 {
            let entries: Vec<DirectoryEntry> = (0..4)
                .map(|i| {
                    if i == k {
                        entry(&format!("uid=jdoe{i},ou=people,dc=example,dc=edu"))
                    } else {
                        entry(&format!("uid=jdoe{i},ou=other,dc=example,dc=edu"))
                    }
                })
                .collect();

            let resolution = resolve_duplicates(&definition(), entries);
            let canonical = resolution.canonical.clone().unwrap();
            assert_eq!(canonical.dn, format!("uid=jdoe{k},ou=people,dc=example,dc=edu"));
            assert_eq!(resolution.duplicates.len(), 3);
        }
    }

    #[test]
    fn test_no_accepted_entry() {
        let entries = vec![entry("uid=jdoe,ou=legacy,dc=example,dc=edu")];
        let resolution = resolve_duplicates(&definition(), entries);
        assert!(resolution.canonical.is_none());
        assert_eq!(
            resolution.duplicate_dns(),
            vec!["uid=jdoe,ou=legacy,dc=example,dc=edu"]
        );
    }

    #[test]
    fn test_single_match_has_no_duplicates() {
        let entries = vec![entry("uid=jdoe,ou=people,dc=example,dc=edu")];
        let resolution = resolve_duplicates(&definition(), entries);
        assert!(resolution.canonical.is_some());
        assert!(!resolution.has_duplicates());
    }
}
