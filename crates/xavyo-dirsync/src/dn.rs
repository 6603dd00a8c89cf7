//! Distinguished name helpers
//!
//! Escaping per RFC 4514 (DN values) and RFC 4515 (filter values), splitting
//! that respects escaped separators, and comparison that honours the policy's
//! case-sensitive-DN flag.

/// Escape special characters in a DN attribute value per RFC 4514.
///
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len() * 2);
    let last = value.chars().count().saturating_sub(1);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if i == 0 || i == last => result.push_str("\\20"),
            '#' if i == 0 => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Reverse [`escape_dn_value`], including `\xx` hex pairs.
pub fn unescape_dn_value(value: &str) -> String {
    let raw = value.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    bytes.push(byte);
                    i += 3;
                }
                None => {
                    bytes.push(raw[i + 1]);
                    i += 2;
                }
            }
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Render raw octets as an escaped filter value (`\01\ab...`).
pub fn escape_filter_bytes(value: &[u8]) -> String {
    value.iter().map(|b| format!("\\{b:02x}")).collect()
}

/// Split a DN into its RDN components, honouring backslash escapes.
pub fn components(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    let tail = dn[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Split an RDN into attribute type and raw (still escaped) value.
pub fn split_rdn(rdn: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, ch) in rdn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' => return Some((rdn[..i].trim(), rdn[i + 1..].trim())),
            _ => {}
        }
    }
    None
}

/// The leftmost RDN of a DN.
pub fn rdn(dn: &str) -> Option<&str> {
    components(dn).into_iter().next()
}

/// Everything after the leftmost RDN.
pub fn parent(dn: &str) -> Option<String> {
    let parts = components(dn);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[1..].join(","))
}

/// Build `attr=escaped(value),parent`.
pub fn build_dn(attribute: &str, value: &str, parent: &str) -> String {
    let rdn = build_rdn(attribute, value);
    if parent.is_empty() {
        rdn
    } else {
        format!("{rdn},{parent}")
    }
}

/// Build `attr=escaped(value)`.
pub fn build_rdn(attribute: &str, value: &str) -> String {
    format!("{}={}", attribute, escape_dn_value(value))
}

/// Canonical form of one RDN: lower-case type, unescaped value.
fn normalize_rdn(component: &str, case_sensitive: bool) -> String {
    match split_rdn(component) {
        Some((attr, value)) => {
            let value = unescape_dn_value(value);
            let value = if case_sensitive {
                value
            } else {
                value.to_lowercase()
            };
            format!("{}={}", attr.to_lowercase(), value)
        }
        None => component.to_lowercase(),
    }
}

/// Canonical RDN list used for comparisons.
///
/// Attribute types are always case-insensitive; values are folded unless the
/// directory treats DNs case-sensitively. Values stay separate so an escaped
/// comma can never pass for a component boundary.
pub fn normalize(dn: &str, case_sensitive: bool) -> Vec<String> {
    components(dn)
        .into_iter()
        .map(|component| normalize_rdn(component, case_sensitive))
        .collect()
}

/// Compare two DNs.
pub fn dn_eq(a: &str, b: &str, case_sensitive: bool) -> bool {
    normalize(a, case_sensitive) == normalize(b, case_sensitive)
}

/// Check whether `dn` equals `base` or lies beneath it.
pub fn is_under(dn: &str, base: &str, case_sensitive: bool) -> bool {
    let dn = normalize(dn, case_sensitive);
    let base = normalize(base, case_sensitive);
    dn.len() >= base.len() && dn[dn.len() - base.len()..] == base[..]
}

/// Detect Active Directory replication-conflict entries.
///
/// AD renames the loser of a replication collision to `CN=name\0ACNF:<guid>`,
/// which surfaces as either a literal `\0A` escape or a newline.
pub fn is_replication_conflict(dn: &str) -> bool {
    rdn(dn).is_some_and(|rdn| {
        let upper = rdn.to_uppercase();
        upper.contains("\\0ACNF:") || upper.contains("\nCNF:")
    })
}
