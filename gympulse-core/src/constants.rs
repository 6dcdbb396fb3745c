//! Default values for freshness and refresh policy.

/// How long a cached value counts as fresh.
pub const DEFAULT_STALE_WINDOW_MS: u64 = 5 * 60 * 1000;

/// How long an unobserved entry survives before it may be evicted.
pub const DEFAULT_GC_WINDOW_MS: u64 = 10 * 60 * 1000;

/// Retries after the first failed load.
pub const DEFAULT_RETRY_COUNT: u32 = 1;

pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f32 = 2.0;

/// How often the cache sweeps for evictable entries.
pub const DEFAULT_GC_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Auto-refresh period for data screens.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// Manual refresh requests closer together than this collapse into one.
pub const DEFAULT_REFRESH_DEBOUNCE_MS: u64 = 2_000;

/// Navigation watchdog timeout.
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 4_000;

/// Watchdog timeouts above this are treated as data waits and may be
/// force-cleared even without a data hint.
pub const DEFAULT_AUTH_WAIT_CEILING_MS: u64 = 5_000;

/// Preference key holding the sidebar state.
pub const SIDEBAR_STATE_KEY: &str = "sidebar_state";
