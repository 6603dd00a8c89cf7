//! Conversion between engine values and `ldap3` wire values.
//!
//! Binary attributes travel through the engine as standard base64. They are
//! decoded to raw octets on the way out and always re-encoded on the way in,
//! even when the octets happen to be valid UTF-8.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ldap3::{Mod, Scope, SearchEntry};

use xavyo_dirsync::entry::{AttributeMap, DirectoryEntry};
use xavyo_dirsync::error::{DirectoryError, DirectoryResult};
use xavyo_dirsync::operation::{Modification, SearchScope};

use crate::config::{DirectoryFlavor, LdapTransportConfig};
use crate::password::{encode_ad_password, is_password_attribute, validate_password_connection};

/// Map the engine's search scope onto ldap3's.
pub(crate) fn scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Convert an ldap3 search entry into a [`DirectoryEntry`].
pub(crate) fn entry_from_search(config: &LdapTransportConfig, entry: SearchEntry) -> DirectoryEntry {
    let mut attributes = AttributeMap::new();

    for (name, values) in entry.attrs {
        if config.is_binary_attribute(&name) {
            let encoded: Vec<String> = values.iter().map(|v| STANDARD.encode(v)).collect();
            attributes.append(name, encoded);
        } else {
            attributes.append(name, values);
        }
    }

    // ldap3 puts any attribute with a non-UTF-8 value here.
    for (name, values) in entry.bin_attrs {
        let encoded: Vec<String> = values.iter().map(|v| STANDARD.encode(v)).collect();
        attributes.append(name, encoded);
    }

    DirectoryEntry::new(entry.dn, attributes)
}

/// Encode the values of one attribute for the wire.
pub(crate) fn encode_values(
    config: &LdapTransportConfig,
    attribute: &str,
    values: &[String],
) -> DirectoryResult<HashSet<Vec<u8>>> {
    if config.flavor == DirectoryFlavor::ActiveDirectory && is_password_attribute(attribute) {
        validate_password_connection(config.is_encrypted())?;
        return values.iter().map(|v| encode_ad_password(v)).collect();
    }

    if config.is_binary_attribute(attribute) {
        return values
            .iter()
            .map(|v| {
                STANDARD.decode(v).map_err(|e| DirectoryError::InvalidData {
                    message: format!("value of binary attribute '{attribute}' is not base64: {e}"),
                })
            })
            .collect();
    }

    Ok(values.iter().map(|v| v.as_bytes().to_vec()).collect())
}

/// Build the attribute list of an add request. Attributes without values are skipped.
pub(crate) fn add_attributes(
    config: &LdapTransportConfig,
    attributes: &AttributeMap,
) -> DirectoryResult<Vec<(Vec<u8>, HashSet<Vec<u8>>)>> {
    let mut ldap_attrs = Vec::with_capacity(attributes.len());

    for attribute in attributes.iter() {
        if attribute.values.is_empty() {
            continue;
        }
        let values = encode_values(config, &attribute.name, &attribute.values)?;
        ldap_attrs.push((attribute.name.as_bytes().to_vec(), values));
    }

    Ok(ldap_attrs)
}

/// Build the modification list of a modify request, preserving order.
pub(crate) fn modifications(
    config: &LdapTransportConfig,
    modifications: &[Modification],
) -> DirectoryResult<Vec<Mod<Vec<u8>>>> {
    modifications
        .iter()
        .map(|modification| {
            let (attribute, values) = match modification {
                Modification::Add { attribute, values }
                | Modification::Replace { attribute, values }
                | Modification::Delete { attribute, values } => (attribute, values),
            };
            let name = attribute.as_bytes().to_vec();
            let values = encode_values(config, attribute, values)?;

            Ok(match modification {
                Modification::Add { .. } => Mod::Add(name, values),
                Modification::Replace { .. } => Mod::Replace(name, values),
                Modification::Delete { .. } => Mod::Delete(name, values),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> LdapTransportConfig {
        LdapTransportConfig::new("ldap.example.edu", "cn=admin,dc=example,dc=edu")
            .with_binary_attribute("jpegPhoto")
    }

    fn search_entry(
        attrs: &[(&str, &[&str])],
        bin_attrs: &[(&str, &[&[u8]])],
    ) -> SearchEntry {
        SearchEntry {
            dn: "uid=jdoe,ou=people,dc=example,dc=edu".to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect::<HashMap<_, _>>(),
            bin_attrs: bin_attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|b| b.to_vec()).collect()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_entry_from_search_text_attributes() {
        let entry = entry_from_search(
            &config(),
            search_entry(
                &[("uid", &["jdoe"]), ("mail", &["a@example.edu", "b@example.edu"])],
                &[],
            ),
        );

        assert_eq!(entry.dn, "uid=jdoe,ou=people,dc=example,dc=edu");
        assert_eq!(entry.get_first("UID"), Some("jdoe"));
        assert_eq!(entry.get("mail").unwrap().len(), 2);
    }

    #[test]
    fn test_binary_attribute_always_base64() {
        // Valid UTF-8 octets still come back encoded.
        let entry = entry_from_search(&config(), search_entry(&[("jpegPhoto", &["abc"])], &[]));
        assert_eq!(entry.get_first("jpegPhoto"), Some("YWJj"));
    }

    #[test]
    fn test_non_utf8_values_are_base64() {
        let guid: &[u8] = &[0x01, 0xff, 0x00, 0x80];
        let entry = entry_from_search(&config(), search_entry(&[], &[("objectGUID", &[guid])]));
        assert_eq!(entry.get_first("objectGUID"), Some(STANDARD.encode(guid).as_str()));
    }

    #[test]
    fn test_add_attributes_skips_empty() {
        let attributes = AttributeMap::new()
            .with("uid", ["jdoe"])
            .with("description", Vec::<String>::new());

        let ldap_attrs = add_attributes(&config(), &attributes).unwrap();
        assert_eq!(ldap_attrs.len(), 1);
        assert_eq!(ldap_attrs[0].0, b"uid".to_vec());
        assert!(ldap_attrs[0].1.contains(b"jdoe".as_slice()));
    }

    #[test]
    fn test_binary_values_decoded_on_write() {
        let values = encode_values(&config(), "jpegphoto", &["AQID".to_string()]).unwrap();
        assert!(values.contains([1u8, 2, 3].as_slice()));
    }

    #[test]
    fn test_invalid_base64_is_invalid_data() {
        let err = encode_values(&config(), "jpegPhoto", &["not base64!".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_modifications_keep_order_and_kind() {
        let mods = modifications(
            &config(),
            &[
                Modification::replace("cn", vec!["J Doe".to_string()]),
                Modification::Add {
                    attribute: "member".to_string(),
                    values: vec!["uid=jdoe,dc=example,dc=edu".to_string()],
                },
                Modification::delete_attribute("description"),
            ],
        )
        .unwrap();

        assert_eq!(mods.len(), 3);
        assert!(matches!(&mods[0], Mod::Replace(name, _) if name == b"cn"));
        assert!(matches!(&mods[1], Mod::Add(name, _) if name == b"member"));
        assert!(matches!(&mods[2], Mod::Delete(name, values) if name == b"description" && values.is_empty()));
    }

    #[test]
    fn test_ad_password_encoded_over_tls() {
        let config = LdapTransportConfig::active_directory("dc01", "CN=svc").with_ssl();
        let values = encode_values(&config, "unicodePwd", &["Secret1!".to_string()]).unwrap();
        assert!(values.contains(&encode_ad_password("Secret1!").unwrap()));
    }

    #[test]
    fn test_ad_password_rejected_without_tls() {
        let config = LdapTransportConfig::active_directory("dc01", "CN=svc");
        let err = encode_values(&config, "unicodePwd", &["Secret1!".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn test_unicode_pwd_is_plain_on_standard_servers() {
        let values = encode_values(&config(), "unicodePwd", &["x".to_string()]).unwrap();
        assert!(values.contains(b"x".as_slice()));
    }

    #[test]
    fn test_scope_mapping() {
        assert!(matches!(scope(SearchScope::Base), Scope::Base));
        assert!(matches!(scope(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(scope(SearchScope::Subtree), Scope::Subtree));
    }
}
