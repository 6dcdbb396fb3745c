//! Error types for the client layer.

use gympulse_cache::CacheError;
use gympulse_core::{BackendError, GymPulseError};

use crate::config::ConfigLoadError;
use crate::preferences::PreferenceError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Preference(#[from] PreferenceError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Core(#[from] GymPulseError),
    #[error("Failed to initialize telemetry: {reason}")]
    Telemetry { reason: String },
    #[error("No gym resolved for the current principal")]
    NoGym,
}

impl From<BackendError> for ClientError {
    fn from(err: BackendError) -> Self {
        Self::Core(GymPulseError::Backend(err))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Failure reported by a refresh callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Refresh failed: {message}")]
pub struct RefreshFailed {
    message: String,
}

impl RefreshFailed {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CacheError> for RefreshFailed {
    fn from(err: CacheError) -> Self {
        Self::new(err.message())
    }
}

impl From<BackendError> for RefreshFailed {
    fn from(err: BackendError) -> Self {
        Self::new(err.message())
    }
}
