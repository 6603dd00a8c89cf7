//! Object type policy
//!
//! An [`ObjectDefinition`] is the immutable, data-driven policy for one object
//! type (people, groups, ...). It is usually deserialized from JSON and
//! validated once when the deployment starts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::dn;
use crate::error::{EngineResult, SyncError};

/// Attribute/indicator pair reserved to suppress DN renames.
pub const DN_ONCREATE: &str = "dn.ONCREATE";

/// Pseudo-attribute name used by [`DN_ONCREATE`].
pub const DN_PSEUDO_ATTRIBUTE: &str = "dn";

/// Indicator for an attribute that is only written when the entry is created.
pub const ONCREATE_INDICATOR: &str = "ONCREATE";

/// Closure deciding whether an entry DN may become canonical.
pub type AcceptanceFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Predicate deciding which primary-key matches may become canonical.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DnAcceptance {
    /// Every entry is acceptable.
    #[default]
    Any,
    /// Only entries at or beneath one of the listed DNs.
    UnderBase { base_dns: Vec<String> },
    /// Injected predicate; cannot be loaded from configuration.
    #[serde(skip)]
    Custom(AcceptanceFn),
}

impl std::fmt::Debug for DnAcceptance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnAcceptance::Any => f.write_str("Any"),
            DnAcceptance::UnderBase { base_dns } => f
                .debug_struct("UnderBase")
                .field("base_dns", base_dns)
                .finish(),
            DnAcceptance::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// How the directory represents the global identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierFormat {
    /// Plain string value (e.g. OpenLDAP `entryUUID`).
    #[default]
    Text,
    /// Octets reported as base64 (e.g. AD `objectGUID`).
    Binary,
}

/// Policy for synchronizing one object type.
#[derive(Clone, Serialize, Deserialize)]
pub struct ObjectDefinition {
    /// Object type name, used in logs and results.
    pub name: String,

    /// Base of all searches; new entries go here unless `create_container` is set.
    pub base_dn: String,

    /// Container for new entries, at or beneath `base_dn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_container: Option<String>,

    /// Structural class used to filter searches (e.g. "person").
    pub object_class_filter: String,

    /// Classes written on create; defaults to `["top", object_class_filter]`.
    #[serde(default)]
    pub object_classes: Vec<String>,

    /// Attribute forming the RDN of new entries.
    pub naming_attribute: String,

    /// Business key used for fallback lookups.
    pub primary_key_attribute: String,

    /// Directory-assigned immutable identifier, if the type supports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_identifier_attribute: Option<String>,

    /// Representation of the global identifier.
    #[serde(default)]
    pub global_identifier_format: IdentifierFormat,

    /// Delete non-canonical primary-key matches after a successful write.
    #[serde(default)]
    pub remove_duplicates: bool,

    /// Never remove attributes missing from the desired set.
    #[serde(default)]
    pub keep_existing_attributes: bool,

    /// Compare DN values case-sensitively.
    #[serde(default)]
    pub case_sensitive_dn: bool,

    /// Prefix of the group directive meta-attributes (`<prefix>.ADD`, ...).
    #[serde(default = "default_group_directive_prefix")]
    pub group_directive_prefix: String,

    /// Attribute on group entries holding member DNs.
    #[serde(default = "default_group_member_attribute")]
    pub group_member_attribute: String,

    /// Attribute/indicator pairs (`mail.GENERATE`) computed by callbacks.
    #[serde(default)]
    pub dynamic_attributes: Vec<String>,

    /// Attributes the removal diff never touches, in addition to the fixed set.
    #[serde(default = "default_protected_attributes")]
    pub protected_attributes: Vec<String>,

    /// Attributes the directory never returns on read (passwords).
    #[serde(default = "default_write_only_attributes")]
    pub write_only_attributes: Vec<String>,

    /// Which primary-key matches may become canonical.
    #[serde(default)]
    pub acceptance: DnAcceptance,

    /// Never accept AD replication-conflict (`CNF:`) entries.
    #[serde(default = "default_true")]
    pub reject_replication_conflicts: bool,
}

fn default_group_directive_prefix() -> String {
    "GROUPS".to_string()
}

fn default_group_member_attribute() -> String {
    "member".to_string()
}

fn default_protected_attributes() -> Vec<String> {
    [
        "createTimestamp",
        "modifyTimestamp",
        "creatorsName",
        "modifiersName",
        "entryCSN",
        "entryDN",
        "structuralObjectClass",
        "hasSubordinates",
        "pwdChangedTime",
        "pwdAccountLockedTime",
        "pwdFailureTime",
        "whenCreated",
        "whenChanged",
        "uSNCreated",
        "uSNChanged",
        "objectSid",
        "objectCategory",
        "distinguishedName",
        "instanceType",
        "dSCorePropagationData",
        "objectGUID",
        "name",
        "sAMAccountType",
        "primaryGroupID",
        "pwdLastSet",
        "userAccountControl",
        "accountExpires",
        "badPwdCount",
        "badPasswordTime",
        "logonCount",
        "lastLogon",
        "lastLogoff",
        "lastLogonTimestamp",
        "lockoutTime",
        "codePage",
        "countryCode",
        "isCriticalSystemObject",
        "systemFlags",
        "showInAdvancedViewOnly",
        "msDS-UserPasswordExpiryTimeComputed",
        "msDS-User-Account-Control-Computed",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_write_only_attributes() -> Vec<String> {
    vec!["unicodePwd".to_string(), "userPassword".to_string()]
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for ObjectDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDefinition")
            .field("name", &self.name)
            .field("base_dn", &self.base_dn)
            .field("create_container", &self.create_container)
            .field("object_class_filter", &self.object_class_filter)
            .field("naming_attribute", &self.naming_attribute)
            .field("primary_key_attribute", &self.primary_key_attribute)
            .field(
                "global_identifier_attribute",
                &self.global_identifier_attribute,
            )
            .field("remove_duplicates", &self.remove_duplicates)
            .field("keep_existing_attributes", &self.keep_existing_attributes)
            .field("case_sensitive_dn", &self.case_sensitive_dn)
            .field("group_directive_prefix", &self.group_directive_prefix)
            .field("dynamic_attributes", &self.dynamic_attributes)
            .field("acceptance", &self.acceptance)
            .finish_non_exhaustive()
    }
}

impl ObjectDefinition {
    /// Create a definition with required fields and defaults for the rest.
    pub fn new(
        name: impl Into<String>,
        base_dn: impl Into<String>,
        object_class: impl Into<String>,
        naming_attribute: impl Into<String>,
        primary_key_attribute: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_dn: base_dn.into(),
            create_container: None,
            object_class_filter: object_class.into(),
            object_classes: Vec::new(),
            naming_attribute: naming_attribute.into(),
            primary_key_attribute: primary_key_attribute.into(),
            global_identifier_attribute: None,
            global_identifier_format: IdentifierFormat::Text,
            remove_duplicates: false,
            keep_existing_attributes: false,
            case_sensitive_dn: false,
            group_directive_prefix: default_group_directive_prefix(),
            group_member_attribute: default_group_member_attribute(),
            dynamic_attributes: Vec::new(),
            protected_attributes: default_protected_attributes(),
            write_only_attributes: default_write_only_attributes(),
            acceptance: DnAcceptance::Any,
            reject_replication_conflicts: true,
        }
    }

    /// Load and validate a definition from JSON.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let definition: Self = serde_json::from_str(json).map_err(|e| {
            SyncError::configuration(format!("invalid object definition: {e}"))
        })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load and validate a definition from a JSON value.
    pub fn from_value(value: serde_json::Value) -> EngineResult<Self> {
        let definition: Self = serde_json::from_value(value).map_err(|e| {
            SyncError::configuration(format!("invalid object definition: {e}"))
        })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Set the object classes written on create.
    pub fn with_object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Create new entries in `container` instead of `base_dn`.
    pub fn with_create_container(mut self, container: impl Into<String>) -> Self {
        self.create_container = Some(container.into());
        self
    }

    /// Enable global identifier lookups.
    pub fn with_global_identifier(
        mut self,
        attribute: impl Into<String>,
        format: IdentifierFormat,
    ) -> Self {
        self.global_identifier_attribute = Some(attribute.into());
        self.global_identifier_format = format;
        self
    }

    /// Enable or disable duplicate removal.
    #[must_use]
    pub fn with_remove_duplicates(mut self, enabled: bool) -> Self {
        self.remove_duplicates = enabled;
        self
    }

    /// Enable or disable keep-existing-attributes.
    #[must_use]
    pub fn with_keep_existing_attributes(mut self, enabled: bool) -> Self {
        self.keep_existing_attributes = enabled;
        self
    }

    /// Enable or disable case-sensitive DN comparison.
    #[must_use]
    pub fn with_case_sensitive_dn(mut self, enabled: bool) -> Self {
        self.case_sensitive_dn = enabled;
        self
    }

    /// Set the group directive prefix and member attribute.
    pub fn with_group_directives(
        mut self,
        prefix: impl Into<String>,
        member_attribute: impl Into<String>,
    ) -> Self {
        self.group_directive_prefix = prefix.into();
        self.group_member_attribute = member_attribute.into();
        self
    }

    /// Declare a dynamic attribute (`attribute.INDICATOR`).
    pub fn with_dynamic_attribute(mut self, key: impl Into<String>) -> Self {
        self.dynamic_attributes.push(key.into());
        self
    }

    /// Set the acceptance predicate.
    pub fn with_acceptance(mut self, acceptance: DnAcceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Accept only entries beneath the given DNs.
    pub fn accept_under<I, S>(self, base_dns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_acceptance(DnAcceptance::UnderBase {
            base_dns: base_dns.into_iter().map(Into::into).collect(),
        })
    }

    /// Accept entries using a custom predicate.
    pub fn accept_with<F>(self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.with_acceptance(DnAcceptance::Custom(Arc::new(predicate)))
    }

    /// Add attributes the removal diff must never touch.
    pub fn with_protected_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Parent DN of newly created entries.
    pub fn creation_parent(&self) -> &str {
        self.create_container.as_deref().unwrap_or(&self.base_dn)
    }

    /// Classes to write on create.
    pub fn creation_object_classes(&self) -> Vec<String> {
        if self.object_classes.is_empty() {
            vec!["top".to_string(), self.object_class_filter.clone()]
        } else {
            self.object_classes.clone()
        }
    }

    /// Check whether an entry DN may become canonical.
    pub fn accepts(&self, entry_dn: &str) -> bool {
        if self.reject_replication_conflicts && dn::is_replication_conflict(entry_dn) {
            return false;
        }
        match &self.acceptance {
            DnAcceptance::Any => true,
            DnAcceptance::UnderBase { base_dns } => base_dns
                .iter()
                .any(|base| dn::is_under(entry_dn, base, self.case_sensitive_dn)),
            DnAcceptance::Custom(predicate) => predicate(entry_dn),
        }
    }

    /// Whether `dn.ONCREATE` is declared by this policy.
    pub fn suppresses_rename(&self) -> bool {
        self.dynamic_attributes
            .iter()
            .any(|key| key.eq_ignore_ascii_case(DN_ONCREATE))
    }

    /// Names of the four group directive meta-attributes.
    pub fn group_directive_keys(&self) -> GroupDirectiveKeys {
        GroupDirectiveKeys::new(&self.group_directive_prefix)
    }

    /// Whether an attribute is a group/meta attribute of this policy.
    pub fn is_meta_attribute(&self, name: &str) -> bool {
        let prefix = format!("{}.", self.group_directive_prefix.to_lowercase());
        let lower = name.to_lowercase();
        lower == DN_PSEUDO_ATTRIBUTE || lower.starts_with(&prefix) || lower.starts_with("dn.")
    }

    /// Whether reads never return the attribute, so it cannot be compared.
    pub fn is_write_only(&self, name: &str) -> bool {
        self.write_only_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Whether the removal diff must leave an attribute alone.
    pub fn is_protected(&self, name: &str) -> bool {
        if name.contains(';') || self.is_meta_attribute(name) || self.is_write_only(name) {
            return true;
        }
        let fixed = ["objectClass", "memberOf", self.naming_attribute.as_str()];
        if fixed.iter().any(|a| a.eq_ignore_ascii_case(name)) {
            return true;
        }
        if self
            .global_identifier_attribute
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(name))
        {
            return true;
        }
        self.protected_attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Whether `name` is the global identifier attribute.
    pub fn is_global_identifier(&self, name: &str) -> bool {
        self.global_identifier_attribute
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(name))
    }

    /// Validate the policy.
    pub fn validate(&self) -> EngineResult<()> {
        let required = [
            ("name", &self.name),
            ("base_dn", &self.base_dn),
            ("object_class_filter", &self.object_class_filter),
            ("naming_attribute", &self.naming_attribute),
            ("primary_key_attribute", &self.primary_key_attribute),
            ("group_directive_prefix", &self.group_directive_prefix),
            ("group_member_attribute", &self.group_member_attribute),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::configuration(format!(
                    "object definition '{}': {field} is required",
                    self.name
                )));
            }
        }

        if self.naming_attribute.contains('.') || self.naming_attribute.contains('=') {
            return Err(SyncError::configuration(format!(
                "object definition '{}': invalid naming rule '{}'",
                self.name, self.naming_attribute
            )));
        }

        if self.is_global_identifier(&self.naming_attribute)
            || self.is_global_identifier(&self.primary_key_attribute)
        {
            return Err(SyncError::configuration(format!(
                "object definition '{}': the global identifier cannot be the naming or primary key attribute",
                self.name
            )));
        }

        if let Some(container) = &self.create_container {
            if !dn::is_under(container, &self.base_dn, self.case_sensitive_dn) {
                return Err(SyncError::configuration(format!(
                    "object definition '{}': create_container '{container}' is not beneath base_dn '{}'",
                    self.name, self.base_dn
                )));
            }
        }

        if let DnAcceptance::UnderBase { base_dns } = &self.acceptance {
            if base_dns.is_empty() {
                return Err(SyncError::configuration(format!(
                    "object definition '{}': under_base acceptance needs at least one base DN",
                    self.name
                )));
            }
            // Entries created here must be found as canonical on the next run.
            let parent = self.creation_parent();
            if !base_dns
                .iter()
                .any(|base| dn::is_under(parent, base, self.case_sensitive_dn))
            {
                return Err(SyncError::configuration(format!(
                    "object definition '{}': new entries under '{parent}' would not be accepted; set create_container beneath one of {base_dns:?}",
                    self.name
                )));
            }
        }

        for key in &self.dynamic_attributes {
            if split_dynamic_key(key).is_none() {
                return Err(SyncError::configuration(format!(
                    "object definition '{}': dynamic attribute '{key}' must have the form attribute.INDICATOR",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// Split `attribute.INDICATOR` at the last dot.
pub fn split_dynamic_key(key: &str) -> Option<(&str, &str)> {
    let (attribute, indicator) = key.rsplit_once('.')?;
    if attribute.is_empty() || indicator.is_empty() {
        return None;
    }
    Some((attribute, indicator))
}

/// The four meta-attribute names derived from a directive prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDirectiveKeys {
    pub add: String,
    pub remove: String,
    pub add_dynamic: String,
    pub remove_dynamic: String,
}

impl GroupDirectiveKeys {
    fn new(prefix: &str) -> Self {
        Self {
            add: format!("{prefix}.ADD"),
            remove: format!("{prefix}.REMOVE"),
            add_dynamic: format!("{prefix}.ADD.DYNAMIC"),
            remove_dynamic: format!("{prefix}.REMOVE.DYNAMIC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> ObjectDefinition {
        ObjectDefinition::new(
            "person",
            "ou=people,dc=example,dc=edu",
            "person",
            "uid",
            "uid",
        )
    }

    #[test]
    fn test_defaults_from_json() {
        let definition = ObjectDefinition::from_value(json!({
            "name": "person",
            "base_dn": "ou=people,dc=example,dc=edu",
            "object_class_filter": "inetOrgPerson",
            "naming_attribute": "uid",
            "primary_key_attribute": "employeeNumber",
            "global_identifier_attribute": "entryUUID"
        }))
        .unwrap();

        assert_eq!(definition.group_directive_prefix, "GROUPS");
        assert_eq!(definition.group_member_attribute, "member");
        assert!(!definition.remove_duplicates);
        assert!(definition.reject_replication_conflicts);
        assert_eq!(
            definition.creation_object_classes(),
            vec!["top", "inetOrgPerson"]
        );
        assert!(matches!(definition.acceptance, DnAcceptance::Any));
    }

    #[test]
    fn test_under_base_acceptance_from_json() {
        let definition = ObjectDefinition::from_value(json!({
            "name": "person",
            "base_dn": "ou=people,dc=example,dc=edu",
            "object_class_filter": "person",
            "naming_attribute": "uid",
            "primary_key_attribute": "uid",
            "acceptance": { "type": "under_base", "base_dns": ["ou=people,dc=example,dc=edu"] }
        }))
        .unwrap();

        assert!(definition.accepts("uid=jdoe,ou=people,dc=example,dc=edu"));
        assert!(!definition.accepts("uid=jdoe,ou=legacy,dc=example,dc=edu"));
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let err = ObjectDefinition::from_json("{\"name\": 1}").unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION");
    }

    #[test]
    fn test_validate_rejects_bad_naming_rule() {
        let mut definition = people();
        definition.naming_attribute = "uid.x".to_string();
        assert!(matches!(
            definition.validate(),
            Err(SyncError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_dynamic_key() {
        let definition = people().with_dynamic_attribute("mail");
        assert!(definition.validate().is_err());

        let definition = people().with_dynamic_attribute("mail.GENERATE");
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_under_base() {
        let definition = people().accept_under(Vec::<String>::new());
        assert!(definition.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_under_base_missing_creation_parent() {
        let active = "ou=active,ou=people,dc=example,dc=edu";

        let err = people().accept_under([active]).validate().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION");

        let definition = people().with_create_container(active).accept_under([active]);
        assert!(definition.validate().is_ok());
        assert_eq!(definition.creation_parent(), active);
        assert_eq!(people().creation_parent(), "ou=people,dc=example,dc=edu");
    }

    #[test]
    fn test_validate_rejects_container_outside_base() {
        let definition = people().with_create_container("ou=staff,dc=example,dc=edu");
        assert!(definition.validate().is_err());

        let definition = ObjectDefinition::from_value(json!({
            "name": "person",
            "base_dn": "ou=people,dc=example,dc=edu",
            "create_container": "OU=Active,ou=people,dc=example,dc=edu",
            "object_class_filter": "person",
            "naming_attribute": "uid",
            "primary_key_attribute": "uid",
            "acceptance": { "type": "under_base", "base_dns": ["ou=active,ou=people,dc=example,dc=edu"] }
        }))
        .unwrap();
        assert_eq!(
            definition.creation_parent(),
            "OU=Active,ou=people,dc=example,dc=edu"
        );
    }

    #[test]
    fn test_custom_acceptance_and_conflicts() {
        let definition = people().accept_with(|dn| dn.contains("ou=people"));
        assert!(definition.accepts("uid=a,ou=people,dc=example,dc=edu"));
        assert!(!definition.accepts("uid=a,ou=staff,dc=example,dc=edu"));
        assert!(!definition.accepts("uid=a\\0ACNF:1234,ou=people,dc=example,dc=edu"));
    }

    #[test]
    fn test_protected_attributes() {
        let definition =
            people().with_global_identifier("entryUUID", IdentifierFormat::Text);
        assert!(definition.is_protected("objectclass"));
        assert!(definition.is_protected("UID"));
        assert!(definition.is_protected("entryuuid"));
        assert!(definition.is_protected("modifyTimestamp"));
        assert!(definition.is_protected("member;range=0-1499"));
        assert!(definition.is_protected("GROUPS.ADD"));
        assert!(definition.is_protected("userAccountControl"));
        assert!(definition.is_protected("objectGUID"));
        assert!(definition.is_protected("unicodePwd"));
        assert!(!definition.is_protected("mail"));
    }

    #[test]
    fn test_bare_dn_is_meta() {
        let definition = people();
        assert!(definition.is_meta_attribute("dn"));
        assert!(definition.is_meta_attribute("DN"));
        assert!(definition.is_meta_attribute("dn.ONCREATE"));
        assert!(!definition.is_meta_attribute("dnQualifier"));
    }

    #[test]
    fn test_write_only_attributes() {
        let definition = people();
        assert!(definition.is_write_only("unicodepwd"));
        assert!(definition.is_write_only("userPassword"));
        assert!(!definition.is_write_only("mail"));
    }

    #[test]
    fn test_suppresses_rename() {
        assert!(!people().suppresses_rename());
        assert!(people()
            .with_dynamic_attribute("dn.ONCREATE")
            .suppresses_rename());
    }

    #[test]
    fn test_split_dynamic_key() {
        assert_eq!(split_dynamic_key("mail.GENERATE"), Some(("mail", "GENERATE")));
        assert_eq!(
            split_dynamic_key("GROUPS.ADD.DYNAMIC"),
            Some(("GROUPS.ADD", "DYNAMIC"))
        );
        assert_eq!(split_dynamic_key("mail"), None);
        assert_eq!(split_dynamic_key(".X"), None);
    }
}
