//! Engine and transport configuration
//!
//! [`EngineConfig`] tunes the synchronization engine. Transports implement
//! [`TransportConfig`] for their own settings.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{DirectoryResult, EngineResult, SyncError};

/// Placeholder written over secrets by [`TransportConfig::redacted`].
pub const REDACTED: &str = "***REDACTED***";

/// Trait for transport-specific configuration.
///
/// Each transport implements this trait to define its validation rules and
/// how it is shown in logs.
pub trait TransportConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Validate the configuration.
    ///
    /// Returns an error if the configuration is invalid.
    fn validate(&self) -> DirectoryResult<()>;

    /// Create a redacted version of this config (for logging/display).
    ///
    /// Sensitive fields should be replaced with [`REDACTED`].
    fn redacted(&self) -> Self;
}

/// Number of attempts `synchronize` makes before surfacing a transient error.
pub const MAX_ATTEMPTS: u32 = 2;

/// Settings for the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause before retrying from RESOLVE, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Re-read a created entry to report its global identifier.
    #[serde(default = "default_true")]
    pub fetch_identifier_after_create: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 0,
            fetch_identifier_after_create: true,
        }
    }
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SyncError::configuration(format!("invalid engine configuration: {e}")))
    }

    /// Set the retry delay.
    pub fn with_retry_delay_ms(mut self, millis: u64) -> Self {
        self.retry_delay_ms = millis;
        self
    }

    /// Enable or disable the identifier read after create.
    pub fn with_fetch_identifier_after_create(mut self, enabled: bool) -> Self {
        self.fetch_identifier_after_create = enabled;
        self
    }

    /// Get the retry delay as Duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
