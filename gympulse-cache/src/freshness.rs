//! Freshness metadata returned with every cache read.
//!
//! Callers never get a bare value: they get a [`CacheRead<T>`] that says how
//! old the value is, whether it is past its staleness deadline, whether a
//! revalidation is running and what the last load error was.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug)]
pub struct CacheRead<T> {
    value: Arc<T>,
    fetched_at: DateTime<Utc>,
    age: Duration,
    is_stale: bool,
    was_cache_hit: bool,
    is_fetching: bool,
    last_error: Option<CacheError>,
}

impl<T> Clone for CacheRead<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            age: self.age,
            is_stale: self.is_stale,
            was_cache_hit: self.was_cache_hit,
            is_fetching: self.is_fetching,
            last_error: self.last_error.clone(),
        }
    }
}

impl<T> CacheRead<T> {
    pub(crate) fn new(
        value: Arc<T>,
        fetched_at: DateTime<Utc>,
        age: Duration,
        is_stale: bool,
        was_cache_hit: bool,
    ) -> Self {
        Self {
            value,
            fetched_at,
            age,
            is_stale,
            was_cache_hit,
            is_fetching: false,
            last_error: None,
        }
    }

    pub(crate) fn fetching(mut self, is_fetching: bool) -> Self {
        self.is_fetching = is_fetching;
        self
    }

    pub(crate) fn with_error(mut self, last_error: Option<CacheError>) -> Self {
        self.last_error = last_error;
        self
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Shared handle to the value; cheap to clone into view state.
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    pub fn into_shared(self) -> Arc<T> {
        self.value
    }

    /// Wall-clock time the value was loaded, for "last updated" labels.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// How long ago the value was loaded, measured when the read was taken.
    pub fn age(&self) -> Duration {
        self.age
    }

    /// True if the value is past its staleness deadline.
    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// True if a load for this key was running when the read was taken.
    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    /// Error from the most recent failed load, if it failed after this value
    /// was stored.
    pub fn last_error(&self) -> Option<&CacheError> {
        self.last_error.as_ref()
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Type-independent view of an entry, for screens that need to know whether
/// a value exists at all (e.g. to show an empty/error state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    pub has_value: bool,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub observers: usize,
    pub error_count: u32,
    pub last_error: Option<CacheError>,
}

impl EntryStatus {
    /// Nothing has ever loaded and the last attempt failed.
    pub fn is_failed_without_data(&self) -> bool {
        !self.has_value && self.last_error.is_some()
    }
}
