//! Error types for GymPulse operations

use thiserror::Error;

/// Errors reported by the hosted backend (database, auth, storage).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend request failed: {message}")]
    RequestFailed { message: String },

    #[error("Backend unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Backend request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },
}

impl BackendError {
    /// The bare message without the variant prefix, suitable for UI display.
    pub fn message(&self) -> String {
        match self {
            Self::RequestFailed { message } => message.clone(),
            Self::Unreachable { reason } | Self::Unauthorized { reason } => reason.clone(),
            Self::Timeout { elapsed_ms } => format!("timed out after {}ms", elapsed_ms),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Master error type for all GymPulse errors.
#[derive(Debug, Clone, Error)]
pub enum GymPulseError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for GymPulse operations.
pub type GymPulseResult<T> = Result<T, GymPulseError>;

// =============================================================================
// TESTS
// =============================================================================
