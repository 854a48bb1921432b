use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the supervisor
#[derive(Error, Debug)]
pub enum WardenError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // Registry errors
    #[error("Service not found: {0}")]
    NotFound(String),

    // Cycle coordination errors
    #[error("Another monitoring cycle is still running")]
    CycleInProgress,

    // State store errors
    #[error("State store error: {0}")]
    StateStore(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// True for errors caused by bad configuration (fatal before any probing)
    pub fn is_config(&self) -> bool {
        matches!(self, WardenError::Config(_) | WardenError::ConfigInvalid(_))
    }
}

/// Result type alias for WardenError
pub type Result<T> = std::result::Result<T, WardenError>;

/// Failure of a single alert channel send
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel {channel} timed out after {elapsed_ms}ms")]
    Timeout { channel: String, elapsed_ms: u64 },

    #[error("Channel {channel} delivery failed: {reason}")]
    Delivery { channel: String, reason: String },
}

/// Outcome of a remediation that did not run or did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationError {
    #[error("Rate limited: {attempts} attempts within {window_secs}s cool-down")]
    RateLimited { attempts: u32, window_secs: u64 },

    #[error("Remediation invocation failed: {0}")]
    Invocation(String),

    #[error("Remediation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("No remediation configured")]
    NotConfigured,
}

impl RemediationError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemediationError::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_flagged() {
        assert!(WardenError::ConfigInvalid("dup".into()).is_config());
        assert!(!WardenError::CycleInProgress.is_config());
        assert!(!WardenError::NotFound("api".into()).is_config());
    }

    #[test]
    fn test_rate_limited_message() {
        let err = RemediationError::RateLimited {
            attempts: 2,
            window_secs: 60,
        };
        assert!(err.is_rate_limited());
        assert_eq!(
            err.to_string(),
            "Rate limited: 2 attempts within 60s cool-down"
        );
        assert!(!RemediationError::NotConfigured.is_rate_limited());
    }
}
