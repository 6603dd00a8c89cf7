//! AD password encoding for the `unicodePwd` attribute.
//!
//! Active Directory only accepts passwords written to `unicodePwd` as the
//! password surrounded with double quotes and encoded as UTF-16LE, and only
//! over an encrypted connection.

use xavyo_dirsync::error::{DirectoryError, DirectoryResult};

/// Attribute carrying the password of an AD account.
pub const UNICODE_PWD: &str = "unicodePwd";

/// Whether `attribute` is the AD password attribute.
pub fn is_password_attribute(attribute: &str) -> bool {
    attribute.eq_ignore_ascii_case(UNICODE_PWD)
}

/// Encode a plaintext password for AD's unicodePwd attribute.
///
/// # Errors
/// Returns an error if the password is empty.
pub fn encode_ad_password(password: &str) -> DirectoryResult<Vec<u8>> {
    if password.is_empty() {
        return Err(DirectoryError::InvalidData {
            message: "password cannot be empty".to_string(),
        });
    }

    let quoted = format!("\"{password}\"");
    Ok(quoted.encode_utf16().flat_map(u16::to_le_bytes).collect())
}

/// AD rejects unicodePwd modifications over non-encrypted connections.
pub fn validate_password_connection(encrypted: bool) -> DirectoryResult<()> {
    if !encrypted {
        return Err(DirectoryError::invalid_configuration(
            "LDAPS or STARTTLS is required to write unicodePwd",
        ));
    }
    Ok(())
}
