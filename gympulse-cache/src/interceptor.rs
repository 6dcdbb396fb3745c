//! Fetch interceptors.
//!
//! Interceptors observe every load attempt the store makes. They are injected
//! at construction time; the store never patches the networking layer.

use crate::key::QueryKey;
use std::time::Duration;

/// Result of one load attempt, as seen by interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Success,
    Failure,
}

/// Hook called around each load attempt.
pub trait FetchInterceptor: Send + Sync {
    fn on_load_start(&self, _key: &QueryKey, _attempt: u32) {}

    fn on_load_finish(&self, key: &QueryKey, attempt: u32, elapsed: Duration, outcome: LoadOutcome);
}

/// Development diagnostic that warns about slow loads.
#[derive(Debug, Clone)]
pub struct SlowFetchLogger {
    threshold: Duration,
}

impl SlowFetchLogger {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed >= self.threshold
    }
}

impl FetchInterceptor for SlowFetchLogger {
    fn on_load_finish(&self, key: &QueryKey, attempt: u32, elapsed: Duration, outcome: LoadOutcome) {
        if self.is_slow(elapsed) {
            tracing::warn!(
                key = %key,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                outcome = ?outcome,
                "Slow cache load"
            );
        }
    }
}
