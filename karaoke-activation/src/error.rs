//! Error types for the activation module.

use thiserror::Error;

/// Activation-specific errors.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Key does not have the `XXXX-XXXX-XXXX-XXXX` shape. Never reaches the network.
    #[error("malformed activation key: {0}")]
    MalformedKey(String),

    /// Key does not exist on the server or was already consumed.
    #[error("activation key not found")]
    InvalidKey,

    /// Key is bound to a different machine.
    #[error("activation key already activated on another machine")]
    AlreadyActivatedElsewhere,

    /// Key exists but has lapsed or was disabled on the server.
    #[error("activation key expired or inactive")]
    Inactive,

    /// Authority unreachable, timed out, or answered with something unusable.
    #[error("network error: {0}")]
    Network(String),

    /// Local persistence unavailable or corrupt.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ActivationError {
    /// Returns true if the failure is transient and offline evaluation applies.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<rusqlite::Error> for ActivationError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for activation operations.
pub type ActivationResult<T> = Result<T, ActivationError>;
