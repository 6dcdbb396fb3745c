//! Watchdog for screen loading flags.
//!
//! Each time a guarded flag goes `false -> true` a single-shot timer is armed.
//! When it fires the flag is forced back to `false` only if the screen already
//! has data to show, or if the timeout is longer than the auth wait ceiling.
//! Otherwise the flag is left alone: the screen is most likely waiting for the
//! session to resolve, and clearing it would flash an empty state.
//!
//! The guard never sets the flag to `true` on its own.

use gympulse_core::NavigationSettings;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Watchdog state for the guarded flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Not loading, or loading finished.
    Disarmed,
    /// Loading; the timer will fire at `armed_at + timeout`.
    Armed { armed_at: Instant },
    /// The timer fired but loading was left on (auth-dependent wait).
    Deferred,
}

struct GuardInner {
    watchdog: WatchdogState,
    has_data_hint: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl GuardInner {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct GuardShared {
    timeout: Duration,
    auth_wait_ceiling: Duration,
    inner: Mutex<GuardInner>,
    loading: watch::Sender<bool>,
    forced_clears: AtomicU64,
    torn_down: AtomicBool,
}

impl GuardShared {
    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_loading(&self) -> bool {
        self.loading.send_if_modified(|loading| std::mem::replace(loading, false))
    }

    fn fire(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        inner.timer = None;

        // Cleared under the lock so a newer load cannot slip in between.
        if inner.has_data_hint || self.timeout > self.auth_wait_ceiling {
            inner.watchdog = WatchdogState::Disarmed;
            if self.clear_loading() {
                self.forced_clears.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Navigation loading timed out, forcing it off"
                );
            }
        } else {
            inner.watchdog = WatchdogState::Deferred;
            tracing::debug!(
                timeout_ms = self.timeout.as_millis() as u64,
                "Navigation loading timed out without data, leaving it for auth"
            );
        }
    }
}

/// Watchdog over one loading flag.
pub struct NavigationTimeoutGuard {
    shared: Arc<GuardShared>,
}

impl NavigationTimeoutGuard {
    pub fn new(settings: &NavigationSettings) -> Self {
        Self::with_timeout(settings.timeout(), settings.auth_wait_ceiling())
    }

    pub fn with_timeout(timeout: Duration, auth_wait_ceiling: Duration) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            shared: Arc::new(GuardShared {
                timeout,
                auth_wait_ceiling,
                inner: Mutex::new(GuardInner {
                    watchdog: WatchdogState::Disarmed,
                    has_data_hint: false,
                    generation: 0,
                    timer: None,
                }),
                loading,
                forced_clears: AtomicU64::new(0),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    pub fn is_loading(&self) -> bool {
        *self.shared.loading.borrow()
    }

    /// Receiver for the guarded flag, including forced clears.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.loading.subscribe()
    }

    pub fn watchdog_state(&self) -> WatchdogState {
        self.shared.lock().watchdog
    }

    /// Number of times the watchdog forced loading off.
    pub fn forced_clears(&self) -> u64 {
        self.shared.forced_clears.load(Ordering::Relaxed)
    }

    /// Whether the screen already has something to show. Read when the timer
    /// fires, so it may change while armed.
    pub fn set_has_data_hint(&self, has_data: bool) {
        self.shared.lock().has_data_hint = has_data;
    }

    /// Report the screen's loading flag.
    ///
    /// `false -> true` arms the timer; `true -> false` disarms it. Repeating
    /// the current value does nothing. Must be called within a tokio runtime.
    pub fn set_loading(&self, loading: bool) {
        if self.shared.torn_down.load(Ordering::SeqCst) {
            return;
        }
        let mut inner = self.shared.lock();
        let was_loading = self.shared.loading.send_replace(loading);
        if was_loading == loading {
            return;
        }

        inner.cancel_timer();
        if !loading {
            inner.watchdog = WatchdogState::Disarmed;
            tracing::trace!("Loading finished, watchdog disarmed");
            return;
        }

        let generation = inner.generation;
        let armed_at = Instant::now();
        let shared = Arc::clone(&self.shared);
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(armed_at + shared.timeout).await;
            shared.fire(generation);
        }));
        inner.watchdog = WatchdogState::Armed { armed_at };
        tracing::trace!(
            timeout_ms = self.shared.timeout.as_millis() as u64,
            "Loading started, watchdog armed"
        );
    }

    /// The user left the screen: loading is cleared whatever the timer says.
    pub fn navigate_away(&self) {
        let mut inner = self.shared.lock();
        inner.cancel_timer();
        inner.watchdog = WatchdogState::Disarmed;
        if self.shared.clear_loading() {
            tracing::debug!("Navigated away, loading cleared");
        }
    }

    /// Cancel the timer and ignore further signals. Returns false if already
    /// torn down.
    pub fn teardown(&self) -> bool {
        if self.shared.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut inner = self.shared.lock();
        inner.cancel_timer();
        inner.watchdog = WatchdogState::Disarmed;
        true
    }
}

impl Drop for NavigationTimeoutGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}
