//! Query cache with explicit freshness and request coalescing.
//!
//! One [`CacheStore`] is built at startup and shared by every screen. Each
//! entry carries a staleness deadline and an eviction deadline, and reads hand
//! back a [`CacheRead<T>`] that says how old the value is instead of hiding it.
//!
//! # Stale-while-revalidate
//!
//! A stale entry is still returned immediately; the store starts a single
//! background load and swaps in a new immutable snapshot when it lands. A load
//! in flight never discards the previous successful value.
//!
//! # Tenant Isolation
//!
//! [`QueryKey`] for gym data cannot be constructed without a [`GymId`], so a
//! screen cannot accidentally read another tenant's cached rows.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheStore::new(CacheConfig::from_settings(&settings));
//! cache.init();
//!
//! let key = QueryKey::scoped(gym_id, Resource::Expenses).with_param("month", "2024-05");
//! let read = cache
//!     .fetch(&key, move || api.list_expenses(gym_id), cache.default_options())
//!     .await?;
//!
//! if read.is_stale() {
//!     tracing::debug!(age_ms = read.age().as_millis() as u64, "showing stale expenses");
//! }
//! ```
//!
//! [`GymId`]: gympulse_core::GymId

pub mod error;
pub mod freshness;
pub mod interceptor;
pub mod key;
pub mod retry;
pub mod stats;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use freshness::{CacheRead, EntryStatus};
pub use interceptor::{FetchInterceptor, LoadOutcome, SlowFetchLogger};
pub use key::{QueryKey, Resource};
pub use retry::RetryPolicy;
pub use stats::CacheStats;
pub use store::{CacheConfig, CacheObserver, CacheStore, FetchOptions, RefetchPolicy};
