//! Interval-driven, visibility-gated refresh for one screen.
//!
//! A coordinator owns one background task that:
//!
//! - ticks every `interval` and refreshes only while the page is visible;
//! - skips ticks that land while a refresh is still running;
//! - on a hidden -> visible transition, runs one catch-up refresh if at least
//!   `interval` has passed since the last successful refresh.
//!
//! Manual refreshes go through [`AutoRefresh::debounced_refresh`]. Dropping the
//! coordinator tears it down.

use async_trait::async_trait;
use gympulse_core::RefreshSettings;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::RefreshFailed;
use crate::visibility::{Visibility, VisibilityTracker};

// ============================================================================
// REFRESH SOURCE
// ============================================================================

/// The fetch a screen wants re-run. Must tolerate repeated calls.
#[async_trait]
pub trait RefreshSource: Send + Sync {
    async fn refresh(&self) -> Result<(), RefreshFailed>;
}

#[async_trait]
impl<F, Fut> RefreshSource for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RefreshFailed>> + Send + 'static,
{
    async fn refresh(&self) -> Result<(), RefreshFailed> {
        (self)().await
    }
}

// ============================================================================
// SCHEDULE AND STATE
// ============================================================================

/// Timing policy for one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub interval: Duration,
    pub debounce_window: Duration,
    pub enabled: bool,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self::from_settings(&RefreshSettings::default())
    }
}

impl RefreshSchedule {
    pub fn from_settings(settings: &RefreshSettings) -> Self {
        Self {
            interval: settings.interval(),
            debounce_window: settings.debounce_window(),
            enabled: settings.enabled,
        }
    }

    /// A zero interval leaves nothing to tick on, so the coordinator treats
    /// it as a disabled schedule.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn ticks(&self) -> bool {
        self.enabled && !self.interval.is_zero()
    }

    pub fn with_debounce_window(mut self, debounce_window: Duration) -> Self {
        self.debounce_window = debounce_window;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Not scheduled (disabled); manual refreshes still work.
    Idle,
    /// Timer armed, page visible.
    Scheduled,
    /// A refresh is running.
    Fetching,
    /// Timer armed, page hidden; ticks are skipped.
    Waiting,
    /// Torn down.
    Stopped,
}

/// Result of asking for a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Failed(RefreshFailed),
    /// Manual request inside the debounce window; nothing ran.
    Debounced,
    /// Another refresh was already running; nothing new ran.
    AlreadyRunning,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tick,
    CatchUp,
    Manual,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::CatchUp => "catch_up",
            Self::Manual => "manual",
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
struct RefreshCounters {
    ticks: AtomicU64,
    skipped_hidden: AtomicU64,
    skipped_busy: AtomicU64,
    catch_ups: AtomicU64,
    manual: AtomicU64,
    debounced: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of coordinator activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub ticks: u64,
    pub skipped_hidden: u64,
    /// Ticks that came due while the loop was busy with an earlier refresh.
    pub skipped_busy: u64,
    pub catch_ups: u64,
    pub manual: u64,
    pub debounced: u64,
    pub completed: u64,
    pub failed: u64,
}

impl RefreshCounters {
    fn snapshot(&self) -> RefreshStats {
        RefreshStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped_hidden: self.skipped_hidden.load(Ordering::Relaxed),
            skipped_busy: self.skipped_busy.load(Ordering::Relaxed),
            catch_ups: self.catch_ups.load(Ordering::Relaxed),
            manual: self.manual.load(Ordering::Relaxed),
            debounced: self.debounced.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// COORDINATOR
// ============================================================================

struct Runtime {
    state: RefreshState,
    in_progress: bool,
    last_manual_refresh_at: Option<Instant>,
    last_success_at: Instant,
}

struct Shared {
    schedule: RefreshSchedule,
    source: Arc<dyn RefreshSource>,
    visibility: VisibilityTracker,
    runtime: Mutex<Runtime>,
    counters: RefreshCounters,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resting_state(&self, visibility: Visibility) -> RefreshState {
        if !self.schedule.ticks() {
            RefreshState::Idle
        } else if visibility.is_visible() {
            RefreshState::Scheduled
        } else {
            RefreshState::Waiting
        }
    }

    fn settle(&self, visibility: Visibility) {
        let mut runtime = self.lock();
        if runtime.state != RefreshState::Stopped && !runtime.in_progress {
            runtime.state = self.resting_state(visibility);
        }
    }

    fn catch_up_due(&self, now: Instant) -> bool {
        let runtime = self.lock();
        now.saturating_duration_since(runtime.last_success_at) >= self.schedule.interval
    }

    /// Claim the single refresh slot. Returns the outcome to report instead
    /// when nothing may run.
    fn try_begin(&self, runtime: &mut Runtime, trigger: Trigger) -> Option<RefreshOutcome> {
        if runtime.state == RefreshState::Stopped {
            return Some(RefreshOutcome::Stopped);
        }
        if runtime.in_progress {
            tracing::debug!(trigger = trigger.as_str(), "Refresh already running, skipping");
            return Some(RefreshOutcome::AlreadyRunning);
        }
        runtime.in_progress = true;
        runtime.state = RefreshState::Fetching;
        None
    }

    async fn run(&self, trigger: Trigger) -> RefreshOutcome {
        let refused = self.try_begin(&mut self.lock(), trigger);
        if let Some(outcome) = refused {
            return outcome;
        }
        self.execute(trigger).await
    }

    /// Call the source. The caller must have claimed the slot.
    async fn execute(&self, trigger: Trigger) -> RefreshOutcome {
        tracing::debug!(trigger = trigger.as_str(), "Refreshing");
        let result = self.source.refresh().await;

        let visibility = self.visibility.current();
        let mut runtime = self.lock();
        runtime.in_progress = false;
        if runtime.state != RefreshState::Stopped {
            runtime.state = self.resting_state(visibility);
        }
        match result {
            Ok(()) => {
                runtime.last_success_at = Instant::now();
                bump(&self.counters.completed);
                RefreshOutcome::Refreshed
            }
            Err(err) => {
                bump(&self.counters.failed);
                tracing::warn!(trigger = trigger.as_str(), error = %err, "Refresh failed");
                RefreshOutcome::Failed(err)
            }
        }
    }
}

/// Auto-refresh coordinator for one screen.
pub struct AutoRefresh {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl AutoRefresh {
    /// Arm the coordinator. With `schedule.enabled == false` or a zero
    /// interval no timer is started and the state stays [`RefreshState::Idle`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        schedule: RefreshSchedule,
        visibility: VisibilityTracker,
        source: Arc<dyn RefreshSource>,
    ) -> Self {
        let now = Instant::now();
        let initial = visibility.current();
        let shared = Arc::new(Shared {
            schedule,
            source,
            visibility: visibility.clone(),
            runtime: Mutex::new(Runtime {
                state: RefreshState::Idle,
                in_progress: false,
                last_manual_refresh_at: None,
                last_success_at: now,
            }),
            counters: RefreshCounters::default(),
        });
        shared.settle(initial);

        let task = if schedule.ticks() {
            tracing::debug!(
                interval_ms = schedule.interval.as_millis() as u64,
                debounce_ms = schedule.debounce_window.as_millis() as u64,
                "Auto-refresh armed"
            );
            Some(tokio::spawn(refresh_loop(
                Arc::clone(&shared),
                visibility.subscribe(),
            )))
        } else {
            if schedule.enabled {
                tracing::warn!("Auto-refresh interval is zero, timer not started");
            } else {
                tracing::debug!("Auto-refresh disabled");
            }
            None
        };

        Self {
            shared,
            task: Mutex::new(task),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn schedule(&self) -> RefreshSchedule {
        self.shared.schedule
    }

    pub fn state(&self) -> RefreshState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> RefreshStats {
        self.shared.counters.snapshot()
    }

    /// Manual refresh, suppressed if the previous accepted manual request was
    /// less than `debounce_window` ago. Only a request that actually runs the
    /// source moves the window; debounced and `AlreadyRunning` calls do not.
    pub async fn debounced_refresh(&self) -> RefreshOutcome {
        let now = Instant::now();
        {
            let mut runtime = self.shared.lock();
            if runtime.state == RefreshState::Stopped {
                return RefreshOutcome::Stopped;
            }
            if let Some(last) = runtime.last_manual_refresh_at {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.shared.schedule.debounce_window {
                    bump(&self.shared.counters.debounced);
                    tracing::debug!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Manual refresh debounced"
                    );
                    return RefreshOutcome::Debounced;
                }
            }
            if let Some(outcome) = self.shared.try_begin(&mut runtime, Trigger::Manual) {
                return outcome;
            }
            runtime.last_manual_refresh_at = Some(now);
        }
        bump(&self.shared.counters.manual);
        self.shared.execute(Trigger::Manual).await
    }

    /// Cancel the timer and detach from visibility changes.
    ///
    /// Returns false if already torn down.
    pub fn teardown(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.lock().state = RefreshState::Stopped;
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        tracing::debug!("Auto-refresh torn down");
        true
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn refresh_loop(shared: Arc<Shared>, mut visibility_rx: watch::Receiver<Visibility>) {
    let period = shared.schedule.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // End of the last refresh this loop ran; ticks due before it overlapped.
    let mut busy_until: Option<Instant> = None;

    loop {
        tokio::select! {
            due = ticker.tick() => {
                bump(&shared.counters.ticks);
                if busy_until.is_some_and(|until| due < until) {
                    bump(&shared.counters.skipped_busy);
                    tracing::trace!("Refresh tick landed during a refresh, skipped");
                    continue;
                }
                let visible = visibility_rx.borrow().is_visible();
                if visible {
                    shared.run(Trigger::Tick).await;
                    busy_until = Some(Instant::now());
                } else {
                    bump(&shared.counters.skipped_hidden);
                    tracing::trace!("Refresh tick skipped while hidden");
                }
            }
            changed = visibility_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let visibility = *visibility_rx.borrow_and_update();
                if visibility.is_visible() && shared.catch_up_due(Instant::now()) {
                    bump(&shared.counters.catch_ups);
                    tracing::debug!("Page visible again after a full interval, catching up");
                    shared.run(Trigger::CatchUp).await;
                    busy_until = Some(Instant::now());
                } else {
                    shared.settle(visibility);
                }
            }
        }
    }
}
