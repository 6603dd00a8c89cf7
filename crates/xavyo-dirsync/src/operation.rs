//! Directory operation types
//!
//! Search requests, filters and entry modifications handed to a transport.

use serde::{Deserialize, Serialize};

use crate::dn::{escape_filter_bytes, escape_filter_value};

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match entries where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match entries where a binary attribute equals the given octets.
    EqualsBytes { attribute: String, value: Vec<u8> },

    /// Match entries where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a binary equals filter.
    pub fn eq_bytes(attribute: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Filter::EqualsBytes {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Render as an RFC 4515 filter string.
    pub fn to_ldap_string(&self) -> String {
        match self {
            Filter::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Self::to_ldap_string).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Or { filters } => {
                let inner: Vec<String> = filters.iter().map(Self::to_ldap_string).collect();
                format!("(|{})", inner.join(""))
            }
            Filter::Not { filter } => format!("(!{})", filter.to_ldap_string()),
            Filter::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_filter_value(value))
            }
            Filter::EqualsBytes { attribute, value } => {
                format!("({}={})", attribute, escape_filter_bytes(value))
            }
            Filter::Present { attribute } => format!("({attribute}=*)"),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_ldap_string())
    }
}

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Immediate children of the base.
    OneLevel,
    /// The base and everything beneath it.
    Subtree,
}

/// A search handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search base DN.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Search filter.
    pub filter: Filter,
    /// Attributes to return (`*` for all user attributes).
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Subtree search returning all user attributes.
    pub fn subtree(base_dn: impl Into<String>, filter: Filter) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope: SearchScope::Subtree,
            filter,
            attributes: vec!["*".to_string()],
        }
    }

    /// Read a single entry by DN.
    pub fn read(dn: impl Into<String>) -> Self {
        Self {
            base_dn: dn.into(),
            scope: SearchScope::Base,
            filter: Filter::present("objectClass"),
            attributes: vec!["*".to_string()],
        }
    }

    /// Also request an attribute `*` does not cover (operational attributes).
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        if !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&attribute))
        {
            self.attributes.push(attribute);
        }
        self
    }
}

/// A single change within a modify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Modification {
    /// Add values to an attribute.
    Add {
        attribute: String,
        values: Vec<String>,
    },
    /// Replace all values of an attribute (creating it if missing).
    Replace {
        attribute: String,
        values: Vec<String>,
    },
    /// Delete the given values, or the whole attribute if `values` is empty.
    Delete {
        attribute: String,
        values: Vec<String>,
    },
}

impl Modification {
    /// Replace an attribute entirely.
    pub fn replace(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Modification::Replace {
            attribute: attribute.into(),
            values,
        }
    }

    /// Remove an attribute with all its values.
    pub fn delete_attribute(attribute: impl Into<String>) -> Self {
        Modification::Delete {
            attribute: attribute.into(),
            values: Vec::new(),
        }
    }

    /// Name of the attribute this change targets.
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add { attribute, .. }
            | Modification::Replace { attribute, .. }
            | Modification::Delete { attribute, .. } => attribute,
        }
    }
}

/// The changes needed to bring an entry to its desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDelta {
    /// Modifications in the order they should be sent.
    pub modifications: Vec<Modification>,
}

impl AttributeDelta {
    /// Create a new empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a modification.
    pub fn push(&mut self, modification: Modification) -> &mut Self {
        self.modifications.push(modification);
        self
    }

    /// Check if this delta has any changes.
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Get all affected attribute names.
    pub fn affected_attributes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modifications
            .iter()
            .map(|m| m.attribute().to_string())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        names
    }
}
