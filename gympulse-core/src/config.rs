//! Freshness configuration
//!
//! Every section has defaults matching the shipped policy, so an empty TOML
//! document is a valid configuration. `validate()` rejects values that would
//! disable a timer by accident or make entries evictable before going stale.

use crate::constants::*;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retry configuration for cache loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first failure (0 disables retrying).
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_COUNT,
            initial_backoff_ms: DEFAULT_RETRY_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_RETRY_MAX_BACKOFF_MS,
            backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

/// Cache store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub stale_window_ms: u64,
    pub gc_window_ms: u64,
    pub gc_sweep_interval_ms: u64,
    pub retry: RetryConfig,
    pub refetch_on_window_focus: bool,
    pub refetch_on_reconnect: bool,
    pub refetch_on_mount: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_window_ms: DEFAULT_STALE_WINDOW_MS,
            gc_window_ms: DEFAULT_GC_WINDOW_MS,
            gc_sweep_interval_ms: DEFAULT_GC_SWEEP_INTERVAL_MS,
            retry: RetryConfig::default(),
            refetch_on_window_focus: false,
            refetch_on_reconnect: true,
            refetch_on_mount: false,
        }
    }
}

impl CacheSettings {
    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_ms)
    }

    pub fn gc_window(&self) -> Duration {
        Duration::from_millis(self.gc_window_ms)
    }

    pub fn gc_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.gc_sweep_interval_ms)
    }
}

/// Auto-refresh settings shared by data screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshSettings {
    pub enabled: bool,
    pub interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            debounce_ms: DEFAULT_REFRESH_DEBOUNCE_MS,
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Navigation watchdog settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NavigationSettings {
    pub timeout_ms: u64,
    pub auth_wait_ceiling_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            auth_wait_ceiling_ms: DEFAULT_AUTH_WAIT_CEILING_MS,
        }
    }
}

impl NavigationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn auth_wait_ceiling(&self) -> Duration {
        Duration::from_millis(self.auth_wait_ceiling_ms)
    }
}

/// Where UI preferences are persisted. `None` keeps them in memory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreferenceSettings {
    pub path: Option<PathBuf>,
}

/// Master configuration for the freshness layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreshnessConfig {
    pub cache: CacheSettings,
    pub refresh: RefreshSettings,
    pub navigation: NavigationSettings,
    pub preferences: PreferenceSettings,
}

impl FreshnessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("cache.stale_window_ms", self.cache.stale_window_ms)?;
        require_positive("cache.gc_window_ms", self.cache.gc_window_ms)?;
        require_positive("cache.gc_sweep_interval_ms", self.cache.gc_sweep_interval_ms)?;
        require_positive("refresh.interval_ms", self.refresh.interval_ms)?;
        require_positive("navigation.timeout_ms", self.navigation.timeout_ms)?;

        if self.cache.gc_window_ms < self.cache.stale_window_ms {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "cache.gc_window_ms".to_string(),
                option_b: "cache.stale_window_ms".to_string(),
            });
        }
        let multiplier = self.cache.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.retry.backoff_multiplier".to_string(),
                value: self.cache.retry.backoff_multiplier.to_string(),
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.cache.retry.max_backoff_ms < self.cache.retry.initial_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "cache.retry.max_backoff_ms".to_string(),
                value: self.cache.retry.max_backoff_ms.to_string(),
                reason: "must be >= initial_backoff_ms".to_string(),
            });
        }
        if self.refresh.debounce_ms > self.refresh.interval_ms {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "refresh.debounce_ms".to_string(),
                option_b: "refresh.interval_ms".to_string(),
            });
        }
        if let Some(path) = &self.preferences.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "preferences.path".to_string(),
                    value: String::new(),
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be > 0".to_string(),
        });
    }
    Ok(())
}
