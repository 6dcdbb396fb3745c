//! Cache error types.
//!
//! Errors are `Clone` because a single load result is shared by every caller
//! that coalesced onto it.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Load failed for {key} after {attempts} attempt(s): {message}")]
    LoadFailed {
        key: String,
        attempts: u32,
        message: String,
    },

    #[error("Cached value for {key} is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Load for {key} was cancelled")]
    LoadCancelled { key: String },

    #[error("Cache store has been disposed")]
    Disposed,
}

impl CacheError {
    /// Underlying loader message for `LoadFailed`, the display string otherwise.
    pub fn message(&self) -> String {
        match self {
            Self::LoadFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
