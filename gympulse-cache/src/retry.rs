//! Retry policy for cache loads.

use gympulse_core::RetryConfig;
use std::time::Duration;

/// How many times a failed load is retried and how long to wait between tries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            retry_count: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            retry_count: 0,
            ..Self::default()
        }
    }

    /// Same retry count with no waiting between attempts.
    pub fn immediate(retry_count: u32) -> Self {
        Self {
            retry_count,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based), never above `max_backoff`.
    ///
    /// A multiplier below 1.0 or NaN is treated as 1.0.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = if self.multiplier >= 1.0 {
            f64::from(self.multiplier)
        } else {
            1.0
        };
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * multiplier.powi(exponent);
        Duration::try_from_secs_f64(scaled)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}
