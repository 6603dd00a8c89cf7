//! In-memory directory used by the integration tests.
//!
//! Entries keep insertion order, which stands in for directory-returned
//! order. Every request is recorded, and faults can be queued per operation.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use xavyo_dirsync::dn;
use xavyo_dirsync::entry::{AttributeMap, DirectoryEntry};
use xavyo_dirsync::error::{DirectoryError, DirectoryResult};
use xavyo_dirsync::operation::{Filter, Modification, SearchRequest, SearchScope};
use xavyo_dirsync::traits::DirectoryTransport;

// =============================================================================
// Call log and fault injection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Search,
    Add,
    Modify,
    Rename,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search { base_dn: String, filter: String },
    Add { dn: String, attributes: AttributeMap },
    Modify { dn: String, modifications: Vec<Modification> },
    Rename { dn: String, new_rdn: String },
    Delete { dn: String },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Search { .. } => Op::Search,
            Call::Add { .. } => Op::Add,
            Call::Modify { .. } => Op::Modify,
            Call::Rename { .. } => Op::Rename,
            Call::Delete { .. } => Op::Delete,
        }
    }

    pub fn dn(&self) -> &str {
        match self {
            Call::Search { base_dn, .. } => base_dn,
            Call::Add { dn, .. }
            | Call::Modify { dn, .. }
            | Call::Rename { dn, .. }
            | Call::Delete { dn } => dn,
        }
    }
}

struct Fault {
    op: Op,
    dn: Option<String>,
    remaining: usize,
    make: fn(&str) -> DirectoryError,
}

// =============================================================================
// In-memory directory
// =============================================================================

pub struct InMemoryDirectory {
    entries: Mutex<Vec<DirectoryEntry>>,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<VecDeque<Fault>>,
    identifier_attribute: Option<String>,
    next_identifier: AtomicUsize,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(VecDeque::new()),
            identifier_attribute: None,
            next_identifier: AtomicUsize::new(1),
        }
    }

    /// Assign `attribute` to every added entry, as entryUUID servers do.
    pub fn with_identifier_attribute(mut self, attribute: &str) -> Self {
        self.identifier_attribute = Some(attribute.to_string());
        self
    }

    /// Seed an entry without recording a call.
    pub fn with_entry(self, entry: DirectoryEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn insert(&self, entry: DirectoryEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    /// Fail the next request of `op` with the given error.
    pub fn fail_next(&self, op: Op, make: fn(&str) -> DirectoryError) {
        self.push_fault(op, None, 1, make);
    }

    /// Fail every request of `op`.
    pub fn fail_always(&self, op: Op, make: fn(&str) -> DirectoryError) {
        self.push_fault(op, None, usize::MAX, make);
    }

    /// Fail every request of `op` that targets `dn`.
    pub fn fail_dn(&self, op: Op, dn: &str, make: fn(&str) -> DirectoryError) {
        self.push_fault(op, Some(dn.to_string()), usize::MAX, make);
    }

    fn push_fault(&self, op: Op, dn: Option<String>, remaining: usize, make: fn(&str) -> DirectoryError) {
        self.faults.lock().unwrap().push_back(Fault {
            op,
            dn,
            remaining,
            make,
        });
    }

    fn check_fault(&self, op: Op, target: &str) -> DirectoryResult<()> {
        let mut faults = self.faults.lock().unwrap();
        let position = faults.iter().position(|f| {
            f.op == op
                && f.remaining > 0
                && f.dn.as_deref().map_or(true, |d| dn::dn_eq(d, target, false))
        });
        if let Some(index) = position {
            let fault = &mut faults[index];
            fault.remaining -= 1;
            let err = (fault.make)(target);
            if fault.remaining == 0 {
                faults.remove(index);
            }
            return Err(err);
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    // Inspection

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op() == op).count()
    }

    pub fn calls_for(&self, op: Op) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn entry(&self, target: &str) -> Option<DirectoryEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| dn::dn_eq(&e.dn, target, false))
            .cloned()
    }

    pub fn entries_with(&self, attribute: &str, value: &str) -> Vec<DirectoryEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| has_value(e, attribute, value))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

fn has_value(entry: &DirectoryEntry, attribute: &str, value: &str) -> bool {
    entry
        .get(attribute)
        .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
}

fn matches(entry: &DirectoryEntry, filter: &Filter) -> bool {
    match filter {
        Filter::Equals { attribute, value } => {
            if attribute.eq_ignore_ascii_case("objectClass") && value == "*" {
                return true;
            }
            has_value(entry, attribute, value)
        }
        Filter::EqualsBytes { attribute, value } => entry
            .get(attribute)
            .is_some_and(|values| values.iter().any(|v| v.as_bytes() == value.as_slice())),
        Filter::Present { attribute } => {
            attribute.eq_ignore_ascii_case("objectClass") || entry.get(attribute).is_some()
        }
        Filter::And { filters } => filters.iter().all(|f| matches(entry, f)),
        Filter::Or { filters } => filters.iter().any(|f| matches(entry, f)),
        Filter::Not { filter } => !matches(entry, filter),
    }
}

fn in_scope(entry_dn: &str, request: &SearchRequest) -> bool {
    match request.scope {
        SearchScope::Base => dn::dn_eq(entry_dn, &request.base_dn, false),
        SearchScope::OneLevel => dn::parent(entry_dn)
            .is_some_and(|parent| dn::dn_eq(&parent, &request.base_dn, false)),
        SearchScope::Subtree => dn::is_under(entry_dn, &request.base_dn, false),
    }
}

fn apply(entry: &mut DirectoryEntry, modification: &Modification) -> DirectoryResult<()> {
    match modification {
        Modification::Add { attribute, values } => {
            for value in values {
                if has_value(entry, attribute, value) {
                    return Err(DirectoryError::AttributeOrValueExists {
                        dn: entry.dn.clone(),
                        attribute: attribute.clone(),
                    });
                }
            }
            entry.attributes.append(attribute.clone(), values.clone());
        }
        Modification::Replace { attribute, values } => {
            if values.is_empty() {
                entry.attributes.remove(attribute);
            } else {
                entry.attributes.set(attribute.clone(), values.clone());
            }
        }
        Modification::Delete { attribute, values } => {
            let Some(current) = entry.get(attribute).map(<[String]>::to_vec) else {
                return Err(DirectoryError::NoSuchAttribute {
                    dn: entry.dn.clone(),
                    attribute: attribute.clone(),
                });
            };
            if values.is_empty() {
                entry.attributes.remove(attribute);
                return Ok(());
            }
            for value in values {
                if !current.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                    return Err(DirectoryError::NoSuchAttribute {
                        dn: entry.dn.clone(),
                        attribute: attribute.clone(),
                    });
                }
            }
            let remaining: Vec<String> = current
                .into_iter()
                .filter(|v| !values.iter().any(|d| d.eq_ignore_ascii_case(v)))
                .collect();
            if remaining.is_empty() {
                entry.attributes.remove(attribute);
            } else {
                entry.attributes.set(attribute.clone(), remaining);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DirectoryTransport for InMemoryDirectory {
    fn display_name(&self) -> &str {
        "in-memory"
    }

    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        self.record(Call::Search {
            base_dn: request.base_dn.clone(),
            filter: request.filter.to_ldap_string(),
        });
        self.check_fault(Op::Search, &request.base_dn)?;

        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| in_scope(&e.dn, request) && matches(e, &request.filter))
            .cloned()
            .collect())
    }

    async fn add(&self, target: &str, attributes: &AttributeMap) -> DirectoryResult<()> {
        self.record(Call::Add {
            dn: target.to_string(),
            attributes: attributes.clone(),
        });
        self.check_fault(Op::Add, target)?;

        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| dn::dn_eq(&e.dn, target, false)) {
            return Err(DirectoryError::AlreadyExists {
                dn: target.to_string(),
            });
        }
        let mut attributes = attributes.clone();
        if let Some(identifier) = &self.identifier_attribute {
            let n = self.next_identifier.fetch_add(1, Ordering::SeqCst);
            attributes.set(identifier.clone(), [format!("00000000-0000-4000-8000-{n:012}")]);
        }
        entries.push(DirectoryEntry::new(target, attributes));
        Ok(())
    }

    async fn modify(&self, target: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        self.record(Call::Modify {
            dn: target.to_string(),
            modifications: modifications.to_vec(),
        });
        self.check_fault(Op::Modify, target)?;

        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| dn::dn_eq(&e.dn, target, false))
            .ok_or_else(|| DirectoryError::NoSuchObject {
                dn: target.to_string(),
            })?;

        // Modify is atomic: work on a copy.
        let mut updated = entry.clone();
        for modification in modifications {
            apply(&mut updated, modification)?;
        }
        *entry = updated;
        Ok(())
    }

    async fn rename(
        &self,
        target: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()> {
        self.record(Call::Rename {
            dn: target.to_string(),
            new_rdn: new_rdn.to_string(),
        });
        self.check_fault(Op::Rename, target)?;

        let mut entries = self.entries.lock().unwrap();
        let parent = match new_superior {
            Some(superior) => superior.to_string(),
            None => dn::parent(target).unwrap_or_default(),
        };
        let new_dn = if parent.is_empty() {
            new_rdn.to_string()
        } else {
            format!("{new_rdn},{parent}")
        };
        if entries.iter().any(|e| dn::dn_eq(&e.dn, &new_dn, false)) {
            return Err(DirectoryError::AlreadyExists { dn: new_dn });
        }
        let entry = entries
            .iter_mut()
            .find(|e| dn::dn_eq(&e.dn, target, false))
            .ok_or_else(|| DirectoryError::NoSuchObject {
                dn: target.to_string(),
            })?;

        if let Some((attribute, value)) = dn::split_rdn(new_rdn) {
            entry
                .attributes
                .set(attribute.to_string(), [dn::unescape_dn_value(value)]);
        }
        entry.dn = new_dn;
        Ok(())
    }

    async fn delete(&self, target: &str) -> DirectoryResult<()> {
        self.record(Call::Delete {
            dn: target.to_string(),
        });
        self.check_fault(Op::Delete, target)?;

        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !dn::dn_eq(&e.dn, target, false));
        if entries.len() == before {
            return Err(DirectoryError::NoSuchObject {
                dn: target.to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub const PEOPLE: &str = "ou=people,dc=example,dc=edu";
pub const STAFF: &str = "cn=staff,ou=groups,dc=example,dc=edu";
pub const ALUMNI: &str = "cn=alumni,ou=groups,dc=example,dc=edu";

pub fn person(dn: &str, uid: &str) -> DirectoryEntry {
    DirectoryEntry::new(
        dn,
        AttributeMap::new()
            .with("objectClass", ["top", "person"])
            .with_value("uid", uid)
            .with_value("cn", "J Doe"),
    )
}

pub fn group(dn: &str, members: &[&str]) -> DirectoryEntry {
    let cn = dn::rdn(dn)
        .and_then(dn::split_rdn)
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();
    DirectoryEntry::new(
        dn,
        AttributeMap::new()
            .with("objectClass", ["top", "groupOfNames"])
            .with_value("cn", cn)
            .with("member", members.iter().copied()),
    )
}

pub fn network_error(_dn: &str) -> DirectoryError {
    DirectoryError::network("connection reset by peer")
}

pub fn no_such_attribute(target: &str) -> DirectoryError {
    DirectoryError::NoSuchAttribute {
        dn: target.to_string(),
        attribute: "mail".to_string(),
    }
}

pub fn insufficient_access(target: &str) -> DirectoryError {
    DirectoryError::InsufficientAccess {
        operation: "modify".to_string(),
        dn: target.to_string(),
    }
}
