//! GymPulse Core - Shared Types
//!
//! Identity newtypes, tenant entities, the error taxonomy and the freshness
//! configuration shared by the cache and client crates. No runtime behavior
//! lives here beyond validation.

pub mod config;
pub mod constants;
pub mod directory;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::{
    CacheSettings, FreshnessConfig, NavigationSettings, PreferenceSettings, RefreshSettings,
    RetryConfig,
};
pub use directory::GymDirectory;
pub use entities::{Gym, Principal};
pub use error::{BackendError, ConfigError, GymPulseError, GymPulseResult};
pub use identity::{EntityIdType, GymId, PrincipalId, Timestamp};
