//! LDAP transport implementation
//!
//! Implements [`DirectoryTransport`] for standard LDAP servers and Active
//! Directory on top of `ldap3`.

use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, SearchEntry, SearchResult};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use xavyo_dirsync::config::TransportConfig;
use xavyo_dirsync::entry::{AttributeMap, DirectoryEntry};
use xavyo_dirsync::error::{DirectoryError, DirectoryResult};
use xavyo_dirsync::operation::{Modification, SearchRequest};
use xavyo_dirsync::traits::DirectoryTransport;

use crate::config::LdapTransportConfig;
use crate::convert;

/// LDAP result codes (RFC 4511, appendix A).
pub mod rc {
    pub const SUCCESS: u32 = 0;
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    pub const CONSTRAINT_VIOLATION: u32 = 19;
    pub const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    pub const BUSY: u32 = 51;
    pub const UNAVAILABLE: u32 = 52;
    pub const UNWILLING_TO_PERFORM: u32 = 53;
    pub const OBJECT_CLASS_VIOLATION: u32 = 65;
    pub const NOT_ALLOWED_ON_RDN: u32 = 67;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
    pub const OTHER: u32 = 80;
}

/// What a failed request was doing, for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestContext<'a> {
    pub operation: &'static str,
    pub dn: &'a str,
    pub attribute: &'a str,
}

impl<'a> RequestContext<'a> {
    fn new(operation: &'static str, dn: &'a str) -> Self {
        Self {
            operation,
            dn,
            attribute: "",
        }
    }

    fn with_attribute(mut self, attribute: &'a str) -> Self {
        self.attribute = attribute;
        self
    }
}

/// Map a non-success LDAP result code onto a [`DirectoryError`].
pub(crate) fn map_result_code(code: u32, text: &str, ctx: RequestContext<'_>) -> DirectoryError {
    let dn = ctx.dn.to_string();
    match code {
        rc::NO_SUCH_ATTRIBUTE => DirectoryError::NoSuchAttribute {
            dn,
            attribute: ctx.attribute.to_string(),
        },
        rc::ATTRIBUTE_OR_VALUE_EXISTS => DirectoryError::AttributeOrValueExists {
            dn,
            attribute: ctx.attribute.to_string(),
        },
        rc::CONSTRAINT_VIOLATION | rc::OBJECT_CLASS_VIOLATION => {
            DirectoryError::ConstraintViolation {
                dn,
                message: text.to_string(),
            }
        }
        rc::NO_SUCH_OBJECT => DirectoryError::NoSuchObject { dn },
        rc::INVALID_CREDENTIALS => DirectoryError::AuthenticationFailed,
        rc::INSUFFICIENT_ACCESS_RIGHTS => DirectoryError::InsufficientAccess {
            operation: ctx.operation.to_string(),
            dn,
        },
        rc::BUSY | rc::UNAVAILABLE => DirectoryError::Unavailable {
            message: format!("{} on {}: {}", ctx.operation, dn, text),
        },
        rc::NOT_ALLOWED_ON_RDN => DirectoryError::NotAllowedOnRdn { dn },
        rc::ENTRY_ALREADY_EXISTS => DirectoryError::AlreadyExists { dn },
        rc::UNWILLING_TO_PERFORM | rc::OTHER => DirectoryError::operation_failed(code, text),
        _ => DirectoryError::operation_failed(
            code,
            format!("LDAP {} failed for {}: {}", ctx.operation, dn, text),
        ),
    }
}

fn check_result(result: LdapResult, ctx: RequestContext<'_>) -> DirectoryResult<()> {
    if result.rc == rc::SUCCESS {
        Ok(())
    } else {
        Err(map_result_code(result.rc, &result.text, ctx))
    }
}

/// Joined attribute names of a modify request, for error reporting.
fn modified_attributes(modifications: &[Modification]) -> String {
    modifications
        .iter()
        .map(Modification::attribute)
        .collect::<Vec<_>>()
        .join(",")
}

/// LDAP transport for standard LDAP servers and Active Directory.
pub struct LdapTransport {
    /// Configuration.
    config: LdapTransportConfig,

    /// Display name for this transport instance.
    display_name: String,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapTransport {
    /// Create a new LDAP transport. No connection is made until the first request.
    pub fn new(config: LdapTransportConfig) -> DirectoryResult<Self> {
        config.validate()?;

        let display_name = format!("LDAP: {}", config.host);

        Ok(Self {
            config,
            display_name,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &LdapTransportConfig {
        &self.config
    }

    /// Unbind and drop the cached connection. The next request reconnects.
    pub async fn close(&self) {
        let mut conn_guard = self.connection.write().await;
        if let Some(mut ldap) = conn_guard.take() {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "Error during LDAP unbind");
            }
        }
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> DirectoryResult<Ldap> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;
        // Another request may have connected while we waited for the lock.
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let conn = self.create_connection().await?;
        *conn_guard = Some(conn.clone());

        Ok(conn)
    }

    /// Create a new bound LDAP connection.
    async fn create_connection(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection_timeout())
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .with_timeout(self.config.operation_timeout())
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("LDAP bind failed for {bind_dn}"),
                    e,
                )
            })?;

        if result.rc != rc::SUCCESS {
            return Err(match result.rc {
                rc::INVALID_CREDENTIALS => DirectoryError::AuthenticationFailed,
                code => DirectoryError::connection_failed(format!(
                    "LDAP bind failed with code {}: {}",
                    code, result.text
                )),
            });
        }

        info!(host = %self.config.host, "LDAP connection established");

        Ok(ldap)
    }

    /// Convert a protocol-level failure and drop the cached connection.
    async fn protocol_error(&self, error: LdapError, ctx: RequestContext<'_>) -> DirectoryError {
        warn!(
            operation = ctx.operation,
            dn = %ctx.dn,
            error = %error,
            "LDAP request failed, discarding connection"
        );
        self.connection.write().await.take();

        match error {
            LdapError::Timeout { .. } => DirectoryError::Timeout {
                timeout_secs: self.config.operation_timeout_secs,
            },
            other => DirectoryError::network_with_source(
                format!("LDAP {} failed for {}", ctx.operation, ctx.dn),
                other,
            ),
        }
    }
}

#[async_trait]
impl DirectoryTransport for LdapTransport {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self, request), fields(base_dn = %request.base_dn, filter = %request.filter))]
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let mut ldap = self.get_connection().await?;
        let ctx = RequestContext::new("search", &request.base_dn);

        let outcome = ldap
            .with_timeout(self.config.operation_timeout())
            .search(
                &request.base_dn,
                convert::scope(request.scope),
                &request.filter.to_ldap_string(),
                request.attributes.clone(),
            )
            .await;

        let SearchResult(entries, result) = match outcome {
            Ok(search) => search,
            Err(e) => return Err(self.protocol_error(e, ctx).await),
        };

        match result.rc {
            rc::SUCCESS => {}
            rc::NO_SUCH_OBJECT => {
                debug!("Search base does not exist");
                return Ok(Vec::new());
            }
            code => return Err(map_result_code(code, &result.text, ctx)),
        }

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| convert::entry_from_search(&self.config, entry))
            .collect();

        debug!(found = entries.len(), "LDAP search completed");

        Ok(entries)
    }

    #[instrument(skip(self, attributes))]
    async fn add(&self, dn: &str, attributes: &AttributeMap) -> DirectoryResult<()> {
        let ldap_attrs = convert::add_attributes(&self.config, attributes)?;
        let mut ldap = self.get_connection().await?;
        let ctx = RequestContext::new("add", dn);

        let result = match ldap
            .with_timeout(self.config.operation_timeout())
            .add(dn, ldap_attrs)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.protocol_error(e, ctx).await),
        };
        check_result(result, ctx)?;

        info!(dn = %dn, "LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self, modifications))]
    async fn modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        if modifications.is_empty() {
            return Ok(());
        }

        let mods = convert::modifications(&self.config, modifications)?;
        let mut ldap = self.get_connection().await?;
        let attributes = modified_attributes(modifications);
        let ctx = RequestContext::new("modify", dn).with_attribute(&attributes);

        let result = match ldap
            .with_timeout(self.config.operation_timeout())
            .modify(dn, mods)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.protocol_error(e, ctx).await),
        };
        check_result(result, ctx)?;

        info!(dn = %dn, attributes = %attributes, "LDAP entry modified");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename(
        &self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        let ctx = RequestContext::new("rename", dn);

        let result = match ldap
            .with_timeout(self.config.operation_timeout())
            .modifydn(dn, new_rdn, true, new_superior)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.protocol_error(e, ctx).await),
        };
        check_result(result, ctx)?;

        info!(dn = %dn, new_rdn = %new_rdn, "LDAP entry renamed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        let ctx = RequestContext::new("delete", dn);

        let result = match ldap
            .with_timeout(self.config.operation_timeout())
            .delete(dn)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.protocol_error(e, ctx).await),
        };
        check_result(result, ctx)?;

        info!(dn = %dn, "LDAP entry deleted");
        Ok(())
    }
}

impl std::fmt::Debug for LdapTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapTransport")
            .field("display_name", &self.display_name)
            .field("config", &self.config.redacted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext<'static> {
        RequestContext::new("modify", "uid=jdoe,dc=example,dc=edu").with_attribute("member")
    }

    fn config() -> LdapTransportConfig {
        LdapTransportConfig::new("ldap.example.edu", "cn=admin,dc=example,dc=edu")
            .with_password("secret")
    }

    #[test]
    fn test_conflict_codes() {
        for code in [16, 20, 32, 68] {
            let err = map_result_code(code, "", ctx());
            assert!(err.is_conflict(), "code {code} should be a conflict");
            assert!(!err.is_transient());
        }

        assert!(matches!(
            map_result_code(16, "", ctx()),
            DirectoryError::NoSuchAttribute { ref attribute, .. } if attribute == "member"
        ));
        assert_eq!(map_result_code(20, "", ctx()).error_code(), "ATTRIBUTE_OR_VALUE_EXISTS");
        assert_eq!(map_result_code(32, "", ctx()).error_code(), "NO_SUCH_OBJECT");
        assert_eq!(map_result_code(68, "", ctx()).error_code(), "ALREADY_EXISTS");
    }

    #[test]
    fn test_transient_codes() {
        for code in [51, 52] {
            let err = map_result_code(code, "busy", ctx());
            assert!(err.is_transient());
            assert_eq!(err.error_code(), "UNAVAILABLE");
        }
    }

    #[test]
    fn test_permanent_codes() {
        let cases = [
            (19, "CONSTRAINT_VIOLATION"),
            (65, "CONSTRAINT_VIOLATION"),
            (49, "AUTH_FAILED"),
            (50, "INSUFFICIENT_ACCESS"),
            (53, "OPERATION_FAILED"),
            (67, "NOT_ALLOWED_ON_RDN"),
            (80, "OPERATION_FAILED"),
            (64, "OPERATION_FAILED"),
        ];
        for (code, expected) in cases {
            let err = map_result_code(code, "text", ctx());
            assert_eq!(err.error_code(), expected, "code {code}");
            assert!(!err.is_retryable(), "code {code}");
        }
    }

    #[test]
    fn test_generic_failure_keeps_code() {
        assert!(matches!(
            map_result_code(64, "naming violation", ctx()),
            DirectoryError::OperationFailed { code: 64, ref message } if message.contains("naming violation")
        ));
    }

    #[test]
    fn test_check_result_success() {
        let ok = LdapResult {
            rc: 0,
            matched: String::new(),
            text: String::new(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        };
        assert!(check_result(ok, ctx()).is_ok());
    }

    #[test]
    fn test_modified_attributes() {
        let mods = vec![
            Modification::replace("cn", vec!["J Doe".to_string()]),
            Modification::delete_attribute("description"),
        ];
        assert_eq!(modified_attributes(&mods), "cn,description");
    }

    #[test]
    fn test_new_validates_config() {
        let err = LdapTransport::new(LdapTransportConfig::new("", "cn=admin")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn test_display_name_and_debug() {
        let transport = LdapTransport::new(config()).unwrap();
        assert_eq!(transport.display_name(), "LDAP: ldap.example.edu");

        let debug = format!("{transport:?}");
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn test_empty_modify_needs_no_connection() {
        // Nothing listens on this port; an empty modify must not try to connect.
        let transport = LdapTransport::new(config().with_port(1)).unwrap();
        assert!(transport.modify("uid=jdoe,dc=example,dc=edu", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_without_connection() {
        let transport = LdapTransport::new(config()).unwrap();
        transport.close().await;
        assert!(transport.connection.read().await.is_none());
    }
}
