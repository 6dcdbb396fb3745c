//! What a data screen should render for a cached query.
//!
//! Last good data always wins over an error: a failed background refetch is a
//! non-blocking indicator next to the data. A blocking error or empty state is
//! shown only when nothing was ever loaded.

use gympulse_cache::{CacheRead, CacheResult, CacheStore, EntryStatus, QueryKey};
use std::sync::Arc;

/// Lets [`ScreenData`] tell "loaded, but nothing to show" apart from data.
pub trait ScreenContent {
    fn is_empty_content(&self) -> bool;
}

impl<T> ScreenContent for Vec<T> {
    fn is_empty_content(&self) -> bool {
        self.is_empty()
    }
}

impl<T> ScreenContent for Option<T> {
    fn is_empty_content(&self) -> bool {
        self.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenData<T> {
    /// Nothing loaded yet and no error.
    Loading,
    Ready(Arc<T>),
    /// Data from an earlier load plus the error from the latest refetch.
    ReadyWithError { data: Arc<T>, error: String },
    /// Nothing was ever loaded and the last attempt failed.
    Failed(String),
    /// Loaded successfully, but there is nothing to show.
    Empty,
}

impl<T: ScreenContent> ScreenData<T> {
    /// Combine a cache read with the entry status.
    pub fn from_parts(read: Option<CacheRead<T>>, status: Option<&EntryStatus>) -> Self {
        if let Some(read) = read {
            if read.value().is_empty_content() {
                return Self::Empty;
            }
            return match read.last_error() {
                Some(error) => Self::ReadyWithError {
                    data: read.shared(),
                    error: error.message(),
                },
                None => Self::Ready(read.into_shared()),
            };
        }
        match status.and_then(|status| status.last_error.as_ref()) {
            Some(error) => Self::Failed(error.message()),
            None => Self::Loading,
        }
    }
}

impl<T: ScreenContent + Send + Sync + 'static> ScreenData<T> {
    /// Build the view state for `key` from what the cache holds right now.
    pub fn from_cache(store: &CacheStore, key: &QueryKey) -> CacheResult<Self> {
        let read = store.get::<T>(key)?;
        let status = store.status(key);
        Ok(Self::from_parts(read, status.as_ref()))
    }
}

impl<T> ScreenData<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Ready(data) | Self::ReadyWithError { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::ReadyWithError { error, .. } | Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// True when the error replaces the content instead of sitting beside it.
    pub fn is_blocking_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
