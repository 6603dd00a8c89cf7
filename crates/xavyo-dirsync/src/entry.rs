//! Directory entries and attribute maps
//!
//! LDAP attribute descriptions are case-insensitive (RFC 4512), so lookups in
//! [`AttributeMap`] ignore case while the spelling first written is kept for
//! requests sent back to the directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute description as spelled by whoever set it.
    pub name: String,
    /// Values in directory order.
    pub values: Vec<String>,
}

/// Multi-valued attributes keyed case-insensitively by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMap {
    #[serde(flatten)]
    entries: BTreeMap<String, Attribute>,
}

impl AttributeMap {
    /// Create a new empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set all values of an attribute, replacing any previous values.
    pub fn set<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values = values.into_iter().map(Into::into).collect();
        self.entries
            .insert(name.to_lowercase(), Attribute { name, values });
    }

    /// Set an attribute using builder pattern.
    pub fn with<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set(name, values);
        self
    }

    /// Set a single-valued attribute using builder pattern.
    pub fn with_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, [value.into()])
    }

    /// Append values to an attribute, creating it if missing.
    pub fn append<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let key = name.to_lowercase();
        let entry = self.entries.entry(key).or_insert_with(|| Attribute {
            name,
            values: Vec::new(),
        });
        entry.values.extend(values.into_iter().map(Into::into));
    }

    /// Get all values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .get(&name.to_lowercase())
            .map(|a| a.values.as_slice())
    }

    /// Get the first value of an attribute.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Check if an attribute is present with at least one value.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|values| !values.is_empty())
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.entries.remove(&name.to_lowercase())
    }

    /// Get all attribute names with their stored spelling.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|a| a.name.as_str())
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.values()
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        let mut map = AttributeMap::new();
        for (name, values) in iter {
            map.set(name, values);
        }
        map
    }
}

/// An entry as read from the directory.
///
/// The DN belongs to the directory; the engine only ever observes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Attributes returned by the search.
    pub attributes: AttributeMap,
}

impl DirectoryEntry {
    /// Create an entry from a DN and its attributes.
    pub fn new(dn: impl Into<String>, attributes: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Get all values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name)
    }

    /// Get the first value of an attribute.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.attributes.get_first(name)
    }
}
