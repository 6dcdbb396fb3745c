//! Process-wide query cache.
//!
//! The store routes every read through the entry's staleness deadline:
//!
//! - fresh entry: returned as-is, the loader is not called;
//! - stale entry: returned immediately, one background revalidation starts;
//! - missing entry: the caller waits for the (single) in-flight load.
//!
//! Concurrent callers for the same key attach to one shared load. Entries are
//! immutable snapshots behind an `Arc`; a finished load swaps in a new
//! snapshot, so readers never observe a half-updated entry and a failing
//! refetch never removes the last good value.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use gympulse_core::{CacheSettings, GymId};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{CacheError, CacheResult};
use crate::freshness::{CacheRead, EntryStatus};
use crate::interceptor::{FetchInterceptor, LoadOutcome};
use crate::key::{QueryKey, Resource};
use crate::retry::RetryPolicy;
use crate::stats::{CacheStats, StatsCounters};

type ErasedValue = Arc<dyn Any + Send + Sync>;
type ErasedLoader =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ErasedValue, String>> + Send + Sync>;
type LoadResult = Result<LoadedValue, CacheError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Per-fetch freshness options.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// How long a loaded value counts as fresh.
    pub stale_window: Duration,
    /// How long an unobserved entry is kept after its last access.
    pub gc_window: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

impl FetchOptions {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            stale_window: settings.stale_window(),
            gc_window: settings.gc_window(),
            retry: RetryPolicy::from_config(&settings.retry),
        }
    }

    pub fn with_stale_window(mut self, stale_window: Duration) -> Self {
        self.stale_window = stale_window;
        self
    }

    pub fn with_gc_window(mut self, gc_window: Duration) -> Self {
        self.gc_window = gc_window;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Which environment events trigger refetching of stale, observed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchPolicy {
    pub on_window_focus: bool,
    pub on_reconnect: bool,
    pub on_mount: bool,
}

impl Default for RefetchPolicy {
    fn default() -> Self {
        Self {
            on_window_focus: false,
            on_reconnect: true,
            on_mount: false,
        }
    }
}

/// Configuration for the cache store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Options used when a caller does not supply its own.
    pub defaults: FetchOptions,
    pub policy: RefetchPolicy,
    /// How often the GC task looks for evictable entries.
    pub gc_sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

impl CacheConfig {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            defaults: FetchOptions::from_settings(settings),
            policy: RefetchPolicy {
                on_window_focus: settings.refetch_on_window_focus,
                on_reconnect: settings.refetch_on_reconnect,
                on_mount: settings.refetch_on_mount,
            },
            gc_sweep_interval: settings.gc_sweep_interval(),
        }
    }

    pub fn with_defaults(mut self, defaults: FetchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_policy(mut self, policy: RefetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_gc_sweep_interval(mut self, interval: Duration) -> Self {
        self.gc_sweep_interval = interval;
        self
    }
}

// ============================================================================
// ENTRIES
// ============================================================================

/// A successfully loaded value and its deadlines.
#[derive(Clone)]
struct LoadedValue {
    value: ErasedValue,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
    stale_at: Instant,
}

impl LoadedValue {
    fn is_stale(&self, now: Instant) -> bool {
        now >= self.stale_at
    }

    fn read<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        now: Instant,
        was_cache_hit: bool,
    ) -> CacheResult<CacheRead<T>> {
        let value = Arc::clone(&self.value)
            .downcast::<T>()
            .map_err(|_| CacheError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })?;
        Ok(CacheRead::new(
            value,
            self.fetched_at_utc,
            now.saturating_duration_since(self.fetched_at),
            self.is_stale(now),
            was_cache_hit,
        ))
    }
}

/// Immutable view of an entry. Replaced wholesale, never mutated.
#[derive(Clone, Default)]
struct EntrySnapshot {
    loaded: Option<LoadedValue>,
    last_error: Option<CacheError>,
    error_count: u32,
}

impl EntrySnapshot {
    fn from_loaded(loaded: LoadedValue) -> Self {
        Self {
            loaded: Some(loaded),
            last_error: None,
            error_count: 0,
        }
    }

    fn with_error(&self, error: CacheError) -> Self {
        Self {
            loaded: self.loaded.clone(),
            last_error: Some(error),
            error_count: self.error_count.saturating_add(1),
        }
    }

    fn invalidated(&self, now: Instant) -> Option<Self> {
        let mut loaded = self.loaded.clone()?;
        loaded.stale_at = loaded.stale_at.min(now);
        Some(Self {
            loaded: Some(loaded),
            ..self.clone()
        })
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.loaded.as_ref().map_or(true, |loaded| loaded.is_stale(now))
    }
}

struct InFlight {
    load_id: u64,
    shared: SharedLoad,
    abort: AbortHandle,
}

#[derive(Clone)]
struct StoredLoader {
    load: ErasedLoader,
    options: FetchOptions,
}

struct Slot {
    /// Distinguishes this slot from earlier slots stored under the same key.
    epoch: u64,
    snapshot: Arc<EntrySnapshot>,
    in_flight: Option<InFlight>,
    observers: usize,
    last_access: Instant,
    gc_window: Duration,
    /// Last loader used for this key, kept for reconnect/focus refetches.
    loader: Option<StoredLoader>,
}

impl Slot {
    fn new(epoch: u64, now: Instant, gc_window: Duration) -> Self {
        Self {
            epoch,
            snapshot: Arc::new(EntrySnapshot::default()),
            in_flight: None,
            observers: 0,
            last_access: now,
            gc_window,
            loader: None,
        }
    }

    fn touch(&mut self, now: Instant, gc_window: Duration) {
        self.last_access = now;
        self.gc_window = gc_window;
    }

    fn evict_at(&self) -> Instant {
        self.last_access + self.gc_window
    }

    fn is_evictable(&self, now: Instant) -> bool {
        self.observers == 0 && self.in_flight.is_none() && now >= self.evict_at()
    }

    fn status(&self, now: Instant) -> EntryStatus {
        EntryStatus {
            has_value: self.snapshot.loaded.is_some(),
            is_stale: self.snapshot.is_stale(now),
            is_fetching: self.in_flight.is_some(),
            observers: self.observers,
            error_count: self.snapshot.error_count,
            last_error: self.snapshot.last_error.clone(),
        }
    }

    fn abort_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort.abort();
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Default)]
struct Lifecycle {
    gc_task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

struct StoreInner {
    config: CacheConfig,
    slots: Mutex<HashMap<QueryKey, Slot>>,
    stats: StatsCounters,
    interceptors: Vec<Arc<dyn FetchInterceptor>>,
    lifecycle: Mutex<Lifecycle>,
    disposed: AtomicBool,
    next_load_id: AtomicU64,
    next_slot_epoch: AtomicU64,
}

/// Shared query cache. Cloning is cheap and yields a handle to the same store.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_interceptors(config, Vec::new())
    }

    pub fn with_interceptors(
        config: CacheConfig,
        interceptors: Vec<Arc<dyn FetchInterceptor>>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                slots: Mutex::new(HashMap::new()),
                stats: StatsCounters::default(),
                interceptors,
                lifecycle: Mutex::new(Lifecycle::default()),
                disposed: AtomicBool::new(false),
                next_load_id: AtomicU64::new(1),
                next_slot_epoch: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn default_options(&self) -> FetchOptions {
        self.inner.config.defaults.clone()
    }

    /// Start the background GC sweep. Calling it again is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(&self) {
        if self.is_disposed() {
            tracing::warn!("Cache init called after dispose, ignoring");
            return;
        }
        let mut lifecycle = self.inner.lock_lifecycle();
        if lifecycle.gc_task.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let period = self.inner.config.gc_sweep_interval;
        lifecycle.gc_task = Some(tokio::spawn(gc_sweep_task(
            Arc::downgrade(&self.inner),
            period,
            shutdown_rx,
        )));
        lifecycle.shutdown = Some(shutdown_tx);
        tracing::info!(
            gc_sweep_interval_ms = period.as_millis() as u64,
            stale_window_ms = self.inner.config.defaults.stale_window.as_millis() as u64,
            "Cache store initialized"
        );
    }

    /// Stop the GC sweep, cancel in-flight loads and drop every entry.
    ///
    /// Later fetches fail with [`CacheError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut lifecycle = self.inner.lock_lifecycle();
            if let Some(shutdown) = lifecycle.shutdown.take() {
                let _ = shutdown.send(true);
            }
            if let Some(task) = lifecycle.gc_task.take() {
                task.abort();
            }
        }
        let dropped = self.inner.clear();
        tracing::info!(dropped, "Cache store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Read whatever is cached for `key`, stale or not. Never starts a load.
    pub fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> CacheResult<Option<CacheRead<T>>> {
        let now = Instant::now();
        let (snapshot, is_fetching) = {
            let mut slots = self.inner.lock_slots();
            let Some(slot) = slots.get_mut(key) else {
                return Ok(None);
            };
            slot.last_access = now;
            (Arc::clone(&slot.snapshot), slot.in_flight.is_some())
        };
        let Some(loaded) = snapshot.loaded.as_ref() else {
            return Ok(None);
        };
        let read = loaded
            .read::<T>(key, now, true)?
            .fetching(is_fetching)
            .with_error(snapshot.last_error.clone());
        Ok(Some(read))
    }

    /// Type-independent status of an entry.
    pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
        let now = Instant::now();
        self.inner.lock_slots().get(key).map(|slot| slot.status(now))
    }

    /// Read through the cache.
    ///
    /// Fresh entries are returned without calling `loader`. Stale entries are
    /// returned immediately while one background revalidation runs. Missing
    /// entries wait for the single shared load for `key`.
    pub async fn fetch<T, F, Fut, E>(
        &self,
        key: &QueryKey,
        loader: F,
        options: FetchOptions,
    ) -> CacheResult<CacheRead<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.ensure_live()?;
        let loader = erase_loader(loader);
        let now = Instant::now();

        let pending = {
            let mut slots = self.inner.lock_slots();
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| self.inner.new_slot(now, options.gc_window));
            slot.touch(now, options.gc_window);
            slot.loader = Some(StoredLoader {
                load: Arc::clone(&loader),
                options: options.clone(),
            });

            let snapshot = Arc::clone(&slot.snapshot);
            if let Some(loaded) = snapshot.loaded.as_ref() {
                if !loaded.is_stale(now) {
                    StatsCounters::bump(&self.inner.stats.hits);
                    tracing::trace!(key = %key, "Cache hit");
                    return Ok(loaded
                        .read::<T>(key, now, true)?
                        .fetching(slot.in_flight.is_some())
                        .with_error(snapshot.last_error.clone()));
                }

                StatsCounters::bump(&self.inner.stats.stale_hits);
                tracing::debug!(key = %key, "Serving stale value while revalidating");
                // The shared handle is intentionally not awaited: the load
                // runs on its own task and commits into the slot.
                let _ = start_load(&self.inner, key, slot, loader, options);
                return Ok(loaded
                    .read::<T>(key, now, true)?
                    .fetching(true)
                    .with_error(snapshot.last_error.clone()));
            }

            StatsCounters::bump(&self.inner.stats.misses);
            tracing::debug!(key = %key, "Cache miss");
            start_load(&self.inner, key, slot, loader, options)
        };

        let loaded = pending.await?;
        loaded.read::<T>(key, Instant::now(), false)
    }

    /// Load `key` regardless of freshness and wait for the result.
    ///
    /// Joins a load already in flight instead of starting a second one. On
    /// failure the previous value stays readable through [`get`](Self::get).
    pub async fn refetch<T, F, Fut, E>(
        &self,
        key: &QueryKey,
        loader: F,
        options: FetchOptions,
    ) -> CacheResult<CacheRead<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.ensure_live()?;
        let loader = erase_loader(loader);
        let now = Instant::now();

        let pending = {
            let mut slots = self.inner.lock_slots();
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| self.inner.new_slot(now, options.gc_window));
            slot.touch(now, options.gc_window);
            slot.loader = Some(StoredLoader {
                load: Arc::clone(&loader),
                options: options.clone(),
            });
            start_load(&self.inner, key, slot, loader, options)
        };

        let loaded = pending.await?;
        loaded.read::<T>(key, Instant::now(), false)
    }

    /// Register a consumer of `key` for as long as the returned guard lives.
    ///
    /// Observed entries are never evicted. Observing does not load anything
    /// unless the refetch-on-mount policy is enabled and the entry is stale.
    pub fn observe(&self, key: &QueryKey) -> CacheObserver {
        let now = Instant::now();
        let mut slots = self.inner.lock_slots();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| self.inner.new_slot(now, self.inner.config.defaults.gc_window));
        slot.observers += 1;
        slot.last_access = now;

        if self.inner.config.policy.on_mount
            && !self.is_disposed()
            && slot.in_flight.is_none()
            && slot.snapshot.loaded.is_some()
            && slot.snapshot.is_stale(now)
        {
            if let Some(stored) = slot.loader.clone() {
                tracing::debug!(key = %key, "Refetching stale entry on mount");
                let _ = start_load(&self.inner, key, slot, stored.load, stored.options);
            }
        }

        CacheObserver {
            inner: Arc::downgrade(&self.inner),
            key: key.clone(),
            epoch: slot.epoch,
        }
    }

    /// Store a value directly, e.g. the row returned by a successful write.
    pub fn seed<T: Send + Sync + 'static>(&self, key: &QueryKey, value: T, options: &FetchOptions) {
        let now = Instant::now();
        let loaded = LoadedValue {
            value: Arc::new(value),
            fetched_at: now,
            fetched_at_utc: Utc::now(),
            stale_at: now + options.stale_window,
        };
        let mut slots = self.inner.lock_slots();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| self.inner.new_slot(now, options.gc_window));
        slot.touch(now, options.gc_window);
        slot.snapshot = Arc::new(EntrySnapshot::from_loaded(loaded));
    }

    /// Mark one entry stale so the next fetch revalidates it.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.inner.invalidate_where(|candidate| candidate == key) > 0
    }

    /// Mark every entry of a gym stale.
    pub fn invalidate_gym(&self, gym_id: GymId) -> usize {
        self.inner.invalidate_where(|key| key.is_for_gym(gym_id))
    }

    /// Mark every entry of one resource within a gym stale, whatever its params.
    pub fn invalidate_resource(&self, gym_id: GymId, resource: Resource) -> usize {
        self.inner
            .invalidate_where(|key| key.is_for_gym(gym_id) && key.resource() == resource)
    }

    /// Drop one entry and cancel its load.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.inner.lock_slots().remove(key);
        match removed {
            Some(mut slot) => {
                slot.abort_in_flight();
                true
            }
            None => false,
        }
    }

    /// Drop every entry and cancel every load. Used when the principal changes.
    pub fn clear(&self) -> usize {
        let cleared = self.inner.clear();
        tracing::debug!(cleared, "Cache cleared");
        cleared
    }

    /// Remove unobserved, idle entries past their eviction deadline.
    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired()
    }

    /// Window regained focus. Refetches only if the policy allows it.
    pub fn on_window_focus(&self) -> usize {
        let enabled = self.inner.config.policy.on_window_focus;
        self.inner.refetch_stale_observed("window_focus", enabled)
    }

    /// Network came back. Refetches stale, observed entries if the policy allows it.
    pub fn on_reconnect(&self) -> usize {
        let enabled = self.inner.config.policy.on_reconnect;
        self.inner.refetch_stale_observed("reconnect", enabled)
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self.len() as u64;
        self.inner.stats.snapshot(entry_count)
    }

    pub fn len(&self) -> usize {
        self.inner.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_live(&self) -> CacheResult<()> {
        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }
}

impl StoreInner {
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_slot(&self, now: Instant, gc_window: Duration) -> Slot {
        let epoch = self.next_slot_epoch.fetch_add(1, Ordering::Relaxed);
        Slot::new(epoch, now, gc_window)
    }

    fn invalidate_where(&self, matches: impl Fn(&QueryKey) -> bool) -> usize {
        let now = Instant::now();
        let mut slots = self.lock_slots();
        let mut invalidated = 0;
        for (key, slot) in slots.iter_mut() {
            if !matches(key) {
                continue;
            }
            if let Some(snapshot) = slot.snapshot.invalidated(now) {
                slot.snapshot = Arc::new(snapshot);
                invalidated += 1;
            }
        }
        if invalidated > 0 {
            tracing::debug!(invalidated, "Cache entries invalidated");
        }
        invalidated
    }

    fn clear(&self) -> usize {
        let mut slots = self.lock_slots();
        let cleared = slots.len();
        for (_, mut slot) in slots.drain() {
            slot.abort_in_flight();
        }
        cleared
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.lock_slots();
        let before = slots.len();
        slots.retain(|key, slot| {
            let evict = slot.is_evictable(now);
            if evict {
                tracing::trace!(key = %key, "Evicting idle cache entry");
            }
            !evict
        });
        let evicted = before - slots.len();
        for _ in 0..evicted {
            StatsCounters::bump(&self.stats.evictions);
        }
        evicted
    }

    fn refetch_stale_observed(self: &Arc<Self>, reason: &'static str, enabled: bool) -> usize {
        if !enabled {
            tracing::debug!(reason, "Refetch skipped by policy");
            return 0;
        }
        if self.disposed.load(Ordering::SeqCst) {
            return 0;
        }
        let now = Instant::now();
        let mut slots = self.lock_slots();
        let mut started = 0;
        for (key, slot) in slots.iter_mut() {
            if slot.observers == 0
                || slot.in_flight.is_some()
                || slot.snapshot.loaded.is_none()
                || !slot.snapshot.is_stale(now)
            {
                continue;
            }
            if let Some(stored) = slot.loader.clone() {
                let _ = start_load(self, key, slot, stored.load, stored.options);
                started += 1;
            }
        }
        tracing::debug!(reason, started, "Refetched stale observed entries");
        started
    }

    fn commit_success(
        &self,
        key: &QueryKey,
        load_id: u64,
        value: ErasedValue,
        options: &FetchOptions,
    ) -> LoadedValue {
        let now = Instant::now();
        let loaded = LoadedValue {
            value,
            fetched_at: now,
            fetched_at_utc: Utc::now(),
            stale_at: now + options.stale_window,
        };
        let mut slots = self.lock_slots();
        match slots.get_mut(key) {
            Some(slot) if slot.in_flight.as_ref().map(|f| f.load_id) == Some(load_id) => {
                slot.in_flight = None;
                slot.snapshot = Arc::new(EntrySnapshot::from_loaded(loaded.clone()));
                slot.touch(now, options.gc_window);
                tracing::debug!(key = %key, load_id, "Cache entry refreshed");
            }
            _ => {
                tracing::debug!(key = %key, load_id, "Discarding load result for removed entry");
            }
        }
        loaded
    }

    fn commit_failure(&self, key: &QueryKey, load_id: u64, error: CacheError) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(key) {
            if slot.in_flight.as_ref().map(|f| f.load_id) == Some(load_id) {
                slot.in_flight = None;
                slot.snapshot = Arc::new(slot.snapshot.with_error(error));
            }
        }
    }
}

/// Keeps an entry alive while a screen is showing it.
pub struct CacheObserver {
    inner: Weak<StoreInner>,
    key: QueryKey,
    epoch: u64,
}

impl CacheObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for CacheObserver {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let now = Instant::now();
        let mut slots = inner.lock_slots();
        // A slot recreated after remove/clear keeps its own observer count.
        if let Some(slot) = slots.get_mut(&self.key).filter(|slot| slot.epoch == self.epoch) {
            slot.observers = slot.observers.saturating_sub(1);
            slot.last_access = now;
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

fn erase_loader<T, F, Fut, E>(loader: F) -> ErasedLoader
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Arc::new(move || {
        let pending = loader();
        async move {
            pending
                .await
                .map(|value| Arc::new(value) as ErasedValue)
                .map_err(|err| err.to_string())
        }
        .boxed()
    })
}

/// Start a load for `slot` or join the one already running.
///
/// The load runs on its own task so it completes (and commits) even if every
/// caller stops waiting.
fn start_load(
    inner: &Arc<StoreInner>,
    key: &QueryKey,
    slot: &mut Slot,
    loader: ErasedLoader,
    options: FetchOptions,
) -> SharedLoad {
    if let Some(in_flight) = &slot.in_flight {
        StatsCounters::bump(&inner.stats.coalesced);
        tracing::trace!(key = %key, load_id = in_flight.load_id, "Joining in-flight load");
        return in_flight.shared.clone();
    }

    let load_id = inner.next_load_id.fetch_add(1, Ordering::Relaxed);
    StatsCounters::bump(&inner.stats.loads);

    let handle = tokio::spawn(run_load(
        Arc::clone(inner),
        key.clone(),
        load_id,
        loader,
        options,
    ));
    let abort = handle.abort_handle();
    let cancelled_key = key.to_string();
    let shared = async move {
        match handle.await {
            Ok(result) => result,
            Err(_) => Err(CacheError::LoadCancelled { key: cancelled_key }),
        }
    }
    .boxed()
    .shared();

    slot.in_flight = Some(InFlight {
        load_id,
        shared: shared.clone(),
        abort,
    });
    shared
}

async fn run_load(
    inner: Arc<StoreInner>,
    key: QueryKey,
    load_id: u64,
    loader: ErasedLoader,
    options: FetchOptions,
) -> LoadResult {
    let max_attempts = options.retry.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        for interceptor in &inner.interceptors {
            interceptor.on_load_start(&key, attempt);
        }

        let started = Instant::now();
        let result = (*loader)().await;
        let elapsed = started.elapsed();

        let outcome = if result.is_ok() {
            LoadOutcome::Success
        } else {
            LoadOutcome::Failure
        };
        for interceptor in &inner.interceptors {
            interceptor.on_load_finish(&key, attempt, elapsed, outcome);
        }

        match result {
            Ok(value) => return Ok(inner.commit_success(&key, load_id, value, &options)),
            Err(message) if attempt < max_attempts => {
                StatsCounters::bump(&inner.stats.retries);
                let delay = options.retry.delay_for(attempt - 1);
                tracing::debug!(
                    key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Cache load failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(message) => {
                StatsCounters::bump(&inner.stats.failures);
                let error = CacheError::LoadFailed {
                    key: key.to_string(),
                    attempts: attempt,
                    message,
                };
                tracing::warn!(key = %key, attempts = attempt, error = %error, "Cache load failed");
                inner.commit_failure(&key, load_id, error.clone());
                return Err(error);
            }
        }
    }
}

async fn gc_sweep_task(
    inner: Weak<StoreInner>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("Cache GC sweep shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let evicted = inner.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "Cache GC sweep evicted entries");
                } else {
                    tracing::trace!("Cache GC sweep found nothing to evict");
                }
            }
        }
    }
}
