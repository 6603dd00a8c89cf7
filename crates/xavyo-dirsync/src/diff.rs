//! Attribute diffing between a canonical entry and the resolved desired state.

use std::collections::BTreeSet;

use crate::definition::ObjectDefinition;
use crate::entry::{AttributeMap, DirectoryEntry};
use crate::operation::{AttributeDelta, Modification};

/// Compute the modifications that turn `existing` into `desired`.
///
/// Changed attributes are replaced wholesale; an empty desired value list
/// deletes the attribute. Unless the policy keeps existing attributes, every
/// unprotected attribute missing from `desired` is deleted as well.
///
/// The naming attribute only changes through a rename and the global
/// identifier is never written, so neither appears in the delta. Write-only
/// attributes the directory does not return are left out as well.
pub fn compute_delta(
    definition: &ObjectDefinition,
    desired: &AttributeMap,
    existing: &DirectoryEntry,
) -> AttributeDelta {
    let mut delta = AttributeDelta::new();

    for attribute in desired.iter() {
        if is_excluded(definition, &attribute.name) {
            continue;
        }

        let current = existing.get(&attribute.name).unwrap_or(&[]);
        // Nothing to compare against; such values are only written on create.
        if current.is_empty() && definition.is_write_only(&attribute.name) {
            continue;
        }
        if attribute.values.is_empty() {
            if !current.is_empty() {
                delta.push(Modification::delete_attribute(&attribute.name));
            }
        } else if !same_values(current, &attribute.values) {
            delta.push(Modification::replace(
                &attribute.name,
                attribute.values.clone(),
            ));
        }
    }

    if !definition.keep_existing_attributes {
        for attribute in existing.attributes.iter() {
            if desired.has(&attribute.name)
                || attribute.values.is_empty()
                || definition.is_protected(&attribute.name)
            {
                continue;
            }
            delta.push(Modification::delete_attribute(&attribute.name));
        }
    }

    delta
}

fn is_excluded(definition: &ObjectDefinition, name: &str) -> bool {
    name.eq_ignore_ascii_case(&definition.naming_attribute)
        || definition.is_global_identifier(name)
        || definition.is_meta_attribute(name)
}

/// Value sets are compared exactly, ignoring order and repeats.
fn same_values(current: &[String], desired: &[String]) -> bool {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();
    current == desired
}
