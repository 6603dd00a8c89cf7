//! Desired state for one object
//!
//! A [`DesiredAttributeSet`] is built by the caller for a single invocation.
//! Literal and dynamic attributes are kept apart from group directives, which
//! never land on the object's own entry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::definition::{split_dynamic_key, ObjectDefinition, DN_PSEUDO_ATTRIBUTE};

/// Desired value of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DesiredValue {
    /// Write these values as given. An empty list clears the attribute.
    Literal { values: Vec<String> },
    /// Compute the values with the callback registered for `indicator`.
    Dynamic {
        indicator: String,
        #[serde(default)]
        seed: Vec<String>,
    },
}

/// A named desired attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAttribute {
    pub name: String,
    pub value: DesiredValue,
}

/// Group membership side effects requested for the object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDirectives {
    /// Group DNs the object should be added to.
    #[serde(default)]
    pub add: Vec<String>,
    /// Group DNs the object should be removed from.
    #[serde(default)]
    pub remove: Vec<String>,
    /// Seeds for a dynamically computed list of groups to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_add: Option<Vec<String>>,
    /// Seeds for a dynamically computed list of groups to leave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_remove: Option<Vec<String>>,
}

impl GroupDirectives {
    /// Check if no directive is present.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.remove.is_empty()
            && self.dynamic_add.is_none()
            && self.dynamic_remove.is_none()
    }
}

/// Attributes to persist for one object, plus group directives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAttributeSet {
    #[serde(default)]
    attributes: BTreeMap<String, DesiredAttribute>,

    /// Global identifier recorded by the caller from an earlier sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    global_identifier: Option<String>,

    #[serde(default)]
    group_directives: GroupDirectives,
}

impl DesiredAttributeSet {
    /// Create a new empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a desired attribute.
    pub fn set(&mut self, name: impl Into<String>, value: DesiredValue) {
        let name = name.into();
        self.attributes
            .insert(name.to_lowercase(), DesiredAttribute { name, value });
    }

    /// Set a literal multi-valued attribute.
    pub fn with_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set(
            name,
            DesiredValue::Literal {
                values: values.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Set a literal single-valued attribute.
    pub fn with(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_values(name, [value.into()])
    }

    /// Set a dynamic attribute.
    pub fn with_dynamic<I, V>(
        mut self,
        name: impl Into<String>,
        indicator: impl Into<String>,
        seed: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set(
            name,
            DesiredValue::Dynamic {
                indicator: indicator.into(),
                seed: seed.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Record the object's known global identifier.
    pub fn with_global_identifier(mut self, value: impl Into<String>) -> Self {
        self.global_identifier = Some(value.into());
        self
    }

    /// Request membership in a group.
    pub fn with_group_add(mut self, group_dn: impl Into<String>) -> Self {
        self.group_directives.add.push(group_dn.into());
        self
    }

    /// Request removal from a group.
    pub fn with_group_remove(mut self, group_dn: impl Into<String>) -> Self {
        self.group_directives.remove.push(group_dn.into());
        self
    }

    /// Request membership in groups computed from `seed`.
    pub fn with_dynamic_group_add<I, V>(mut self, seed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.group_directives
            .dynamic_add
            .get_or_insert_with(Vec::new)
            .extend(seed.into_iter().map(Into::into));
        self
    }

    /// Request removal from groups computed from `seed`.
    pub fn with_dynamic_group_remove<I, V>(mut self, seed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.group_directives
            .dynamic_remove
            .get_or_insert_with(Vec::new)
            .extend(seed.into_iter().map(Into::into));
        self
    }

    /// Get a desired attribute.
    pub fn get(&self, name: &str) -> Option<&DesiredAttribute> {
        self.attributes.get(&name.to_lowercase())
    }

    /// Literal values of an attribute, if it is literal.
    pub fn literal(&self, name: &str) -> Option<&[String]> {
        match self.get(name).map(|a| &a.value) {
            Some(DesiredValue::Literal { values }) => Some(values),
            _ => None,
        }
    }

    /// Iterate over desired attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &DesiredAttribute> {
        self.attributes.values()
    }

    /// Known global identifier, if any.
    pub fn global_identifier(&self) -> Option<&str> {
        self.global_identifier.as_deref()
    }

    /// Group directives.
    pub fn group_directives(&self) -> &GroupDirectives {
        &self.group_directives
    }

    /// Whether the caller asked for `dn.ONCREATE`.
    pub fn suppresses_rename(&self) -> bool {
        matches!(
            self.get(DN_PSEUDO_ATTRIBUTE).map(|a| &a.value),
            Some(DesiredValue::Dynamic { indicator, .. })
                if indicator.eq_ignore_ascii_case(crate::definition::ONCREATE_INDICATOR)
        )
    }

    /// Build the typed form from the flat attribute-map contract.
    ///
    /// Keys are interpreted as follows:
    /// - `<prefix>.ADD` / `<prefix>.REMOVE`: group DNs
    /// - `<prefix>.ADD.DYNAMIC` / `<prefix>.REMOVE.DYNAMIC`: seeds for dynamic group lists
    /// - the global identifier attribute: the known identifier value
    /// - `attribute.INDICATOR` declared by the policy, or whose indicator is
    ///   upper case: a dynamic attribute seeded with the values
    /// - anything else: a literal attribute
    pub fn from_flat(
        definition: &ObjectDefinition,
        map: HashMap<String, Vec<String>>,
    ) -> Self {
        let keys = definition.group_directive_keys();
        let mut set = DesiredAttributeSet::new();

        let mut entries: Vec<(String, Vec<String>)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, values) in entries {
            if key.eq_ignore_ascii_case(&keys.add) {
                set.group_directives.add.extend(values);
            } else if key.eq_ignore_ascii_case(&keys.remove) {
                set.group_directives.remove.extend(values);
            } else if key.eq_ignore_ascii_case(&keys.add_dynamic) {
                set = set.with_dynamic_group_add(values);
            } else if key.eq_ignore_ascii_case(&keys.remove_dynamic) {
                set = set.with_dynamic_group_remove(values);
            } else if definition.is_global_identifier(&key) {
                set.global_identifier = values.into_iter().next();
            } else if let Some((attribute, indicator)) = dynamic_key(definition, &key) {
                set = set.with_dynamic(attribute, indicator, values);
            } else {
                set = set.with_values(key, values);
            }
        }

        set
    }
}

fn dynamic_key<'a>(definition: &ObjectDefinition, key: &'a str) -> Option<(&'a str, &'a str)> {
    let (attribute, indicator) = split_dynamic_key(key)?;
    let declared = definition
        .dynamic_attributes
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key));
    let looks_dynamic = indicator
        .chars()
        .all(|c| c.is_ascii_uppercase() || c == '_')
        && !attribute.chars().all(|c| c.is_ascii_digit() || c == '.');
    (declared || looks_dynamic).then_some((attribute, indicator))
}
