//! Cache usage statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache activity since the store was built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a fresh entry.
    pub hits: u64,
    /// Reads served from a stale entry while revalidating.
    pub stale_hits: u64,
    /// Reads that had nothing to show and waited for a load.
    pub misses: u64,
    /// Loads actually started.
    pub loads: u64,
    /// Callers that attached to a load already in flight.
    pub coalesced: u64,
    /// Retry attempts made after a failure.
    pub retries: u64,
    /// Loads that failed after exhausting retries.
    pub failures: u64,
    /// Entries removed by garbage collection.
    pub evictions: u64,
    /// Entries currently held.
    pub entry_count: u64,
}

impl CacheStats {
    /// Fraction of reads answered without waiting (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let answered = self.hits + self.stale_hits;
        let total = answered + self.misses;
        if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub stale_hits: AtomicU64,
    pub misses: AtomicU64,
    pub loads: AtomicU64,
    pub coalesced: AtomicU64,
    pub retries: AtomicU64,
    pub failures: AtomicU64,
    pub evictions: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count,
        }
    }
}
