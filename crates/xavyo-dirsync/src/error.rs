//! Directory synchronization error types
//!
//! Two layers: [`DirectoryError`] is what a transport reports for a single
//! directory request, [`SyncError`] is what `synchronize` returns to its caller.

use thiserror::Error;

/// Error reported by a directory transport for a single request.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Connectivity (transient)
    /// Failed to establish or bind a connection.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request did not complete in time.
    #[error("directory request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Server reported itself busy or unavailable.
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },

    /// Protocol or socket failure during a request.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Configuration (permanent)
    /// Transport settings are unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Authorization (permanent)
    /// Bind credentials rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Bound identity may not perform the request.
    #[error("insufficient access for {operation} on {dn}")]
    InsufficientAccess { operation: String, dn: String },

    // Entry state (conflicts)
    /// Target entry does not exist.
    #[error("no such object: {dn}")]
    NoSuchObject { dn: String },

    /// An entry with the same DN already exists.
    #[error("entry already exists: {dn}")]
    AlreadyExists { dn: String },

    /// A value to delete is not present.
    #[error("no such attribute '{attribute}' on {dn}")]
    NoSuchAttribute { dn: String, attribute: String },

    /// A value to add is already present.
    #[error("attribute or value exists: '{attribute}' on {dn}")]
    AttributeOrValueExists { dn: String, attribute: String },

    // Data (permanent)
    /// Server-side constraint or schema violation.
    #[error("constraint violation on {dn}: {message}")]
    ConstraintViolation { dn: String, message: String },

    /// Modification of the RDN attribute outside of a rename.
    #[error("operation not allowed on RDN of {dn}")]
    NotAllowedOnRdn { dn: String },

    /// Request could not be encoded for the directory.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Any other non-success result.
    #[error("directory operation failed with code {code}: {message}")]
    OperationFailed { code: u32, message: String },
}

impl DirectoryError {
    /// Check if this error is caused by connectivity rather than the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. }
                | DirectoryError::Timeout { .. }
                | DirectoryError::Unavailable { .. }
                | DirectoryError::NetworkError { .. }
        )
    }

    /// Check if this error means the entry changed since it was read.
    ///
    /// Another writer deleted or renamed the entry, created one with the same
    /// DN, or changed the values a modification was computed against.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DirectoryError::NoSuchObject { .. }
                | DirectoryError::AlreadyExists { .. }
                | DirectoryError::NoSuchAttribute { .. }
                | DirectoryError::AttributeOrValueExists { .. }
        )
    }

    /// Whether a fresh attempt from RESOLVE may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || self.is_conflict()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::Timeout { .. } => "TIMEOUT",
            DirectoryError::Unavailable { .. } => "UNAVAILABLE",
            DirectoryError::NetworkError { .. } => "NETWORK_ERROR",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            DirectoryError::AuthenticationFailed => "AUTH_FAILED",
            DirectoryError::InsufficientAccess { .. } => "INSUFFICIENT_ACCESS",
            DirectoryError::NoSuchObject { .. } => "NO_SUCH_OBJECT",
            DirectoryError::AlreadyExists { .. } => "ALREADY_EXISTS",
            DirectoryError::NoSuchAttribute { .. } => "NO_SUCH_ATTRIBUTE",
            DirectoryError::AttributeOrValueExists { .. } => "ATTRIBUTE_OR_VALUE_EXISTS",
            DirectoryError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            DirectoryError::NotAllowedOnRdn { .. } => "NOT_ALLOWED_ON_RDN",
            DirectoryError::InvalidData { .. } => "INVALID_DATA",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        DirectoryError::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a generic operation failure.
    pub fn operation_failed(code: u32, message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            code,
            message: message.into(),
        }
    }
}

/// Result type for transport requests.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Error returned by the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Policy or callback registry is unusable. Never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Primary-key matches exist but none is acceptable, and removing
    /// duplicates is disabled.
    #[error("ambiguous directory state for {primary_key}: {candidates} entries match but none is acceptable")]
    AmbiguousState {
        primary_key: String,
        candidates: usize,
        dns: Vec<String>,
    },

    /// Connectivity failure or write conflict that survived the retry.
    #[error("transient directory error after {attempts} attempt(s): {source}")]
    TransientDirectory {
        attempts: u32,
        #[source]
        source: DirectoryError,
    },

    /// Permanent failure reported by the directory.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// A dynamic attribute callback rejected its input.
    #[error("dynamic attribute '{attribute}' failed: {message}")]
    DynamicAttribute { attribute: String, message: String },

    /// The desired attribute set cannot be synchronized as given.
    #[error("invalid data: {message}")]
    InvalidData { message: String },
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a dynamic attribute error.
    pub fn dynamic_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DynamicAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from a request the engine may repeat from RESOLVE.
    pub(crate) fn is_retryable_within_invocation(&self) -> bool {
        matches!(self, SyncError::Directory(e) if e.is_retryable())
    }

    /// Whether an upstream scheduler may re-invoke the synchronization later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::TransientDirectory { .. } => true,
            SyncError::Directory(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Configuration { .. } => "CONFIGURATION",
            SyncError::AmbiguousState { .. } => "AMBIGUOUS_STATE",
            SyncError::TransientDirectory { .. } => "TRANSIENT_DIRECTORY",
            SyncError::Directory(e) => e.error_code(),
            SyncError::DynamicAttribute { .. } => "DYNAMIC_ATTRIBUTE",
            SyncError::InvalidData { .. } => "INVALID_DATA",
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;
