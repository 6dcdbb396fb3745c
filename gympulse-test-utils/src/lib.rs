//! GymPulse Test Utilities
//!
//! Shared test infrastructure for the GymPulse workspace:
//! - An in-memory gym directory with injectable failures and latency
//! - A scripted loader that counts how often the cache calls it
//! - Proptest generators for identities, entities and configuration
//! - Fixtures and assertions for common scenarios

pub use gympulse_core::{
    BackendError, CacheSettings, ConfigError, EntityIdType, FreshnessConfig, Gym, GymDirectory,
    GymId, GymPulseError, GymPulseResult, NavigationSettings, Principal, PrincipalId,
    RefreshSettings, RetryConfig, Timestamp,
};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK DIRECTORY
// ============================================================================

#[derive(Debug, Default)]
struct DirectoryState {
    gyms: Vec<Gym>,
    failure: Option<BackendError>,
    delay: Duration,
}

/// In-memory [`GymDirectory`] keyed by owner.
///
/// Clones share state, so a test can keep one handle while the resolver owns
/// another and flip failures on and off mid-test.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGymDirectory {
    state: Arc<Mutex<DirectoryState>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryGymDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gyms(gyms: impl IntoIterator<Item = Gym>) -> Self {
        let directory = Self::new();
        for gym in gyms {
            directory.insert(gym);
        }
        directory
    }

    pub fn insert(&self, gym: Gym) {
        self.lock().gyms.push(gym);
    }

    pub fn remove_owned_by(&self, owner_id: PrincipalId) {
        self.lock().gyms.retain(|gym| gym.owner_id != owner_id);
    }

    /// Make every subsequent lookup fail with `error`.
    pub fn fail_with(&self, error: BackendError) {
        self.lock().failure = Some(error);
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    /// Simulated backend latency for every lookup.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Number of lookups served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GymDirectory for InMemoryGymDirectory {
    async fn gyms_owned_by(&self, principal: &Principal) -> Result<Vec<Gym>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        Ok(state
            .gyms
            .iter()
            .filter(|gym| gym.owner_id == principal.principal_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SCRIPTED LOADER
// ============================================================================

struct LoaderState<T> {
    script: VecDeque<Result<T, String>>,
    fallback: Result<T, String>,
    delay: Duration,
}

/// Loader for cache tests.
///
/// Each call takes the next scripted response; once the script runs out it
/// keeps answering with the fallback. Every call is counted.
pub struct ScriptedLoader<T> {
    state: Arc<Mutex<LoaderState<T>>>,
    calls: Arc<AtomicUsize>,
}

impl<T> Clone for ScriptedLoader<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T: Clone + Send + 'static> ScriptedLoader<T> {
    /// Always succeeds with `value`.
    pub fn returning(value: T) -> Self {
        Self::with_fallback(Ok(value))
    }

    /// Always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_fallback(Err(message.into()))
    }

    fn with_fallback(fallback: Result<T, String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoaderState {
                script: VecDeque::new(),
                fallback,
                delay: Duration::ZERO,
            })),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a successful response ahead of the fallback.
    pub fn then_ok(self, value: T) -> Self {
        self.lock().script.push_back(Ok(value));
        self
    }

    /// Queue a failure ahead of the fallback.
    pub fn then_err(self, message: impl Into<String>) -> Self {
        self.lock().script.push_back(Err(message.into()));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = delay;
        self
    }

    /// Replace the fallback response, e.g. when the backend "recovers".
    pub fn set_fallback(&self, response: Result<T, String>) {
        self.lock().fallback = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Closure suitable for `CacheStore::fetch`.
    pub fn loader(&self) -> impl Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync + 'static {
        let this = self.clone();
        move || {
            let this = this.clone();
            async move { this.call().await }.boxed()
        }
    }

    /// Run one load.
    pub async fn call(&self) -> Result<T, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (response, delay) = {
            let mut state = self.lock();
            let response = match state.script.pop_front() {
                Some(response) => response,
                None => state.fallback.clone(),
            };
            (response, state.delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoaderState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for GymPulse types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_gym_id() -> impl Strategy<Value = GymId> {
        arb_uuid().prop_map(GymId::new)
    }

    pub fn arb_principal_id() -> impl Strategy<Value = PrincipalId> {
        arb_uuid().prop_map(PrincipalId::new)
    }

    /// Generate a principal with a plausible token and optional email.
    pub fn arb_principal() -> impl Strategy<Value = Principal> {
        (
            arb_principal_id(),
            "[a-zA-Z0-9]{16,48}",
            proptest::option::of("[a-z]{3,10}@[a-z]{3,8}\\.com"),
        )
            .prop_map(|(principal_id, token, email)| Principal {
                principal_id,
                email,
                access_token: token,
            })
    }

    /// Generate a gym owned by `owner_id`.
    pub fn arb_gym(owner_id: PrincipalId) -> impl Strategy<Value = Gym> {
        (arb_gym_id(), "[A-Z][a-z]{2,12}( Fitness| Gym| Box)?")
            .prop_map(move |(gym_id, name)| Gym::new(gym_id, name, owner_id))
    }

    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (0u32..5, 1u64..2_000, 2_000u64..60_000, 1.0f32..4.0f32).prop_map(
            |(max_retries, initial_backoff_ms, max_backoff_ms, backoff_multiplier)| RetryConfig {
                max_retries,
                initial_backoff_ms,
                max_backoff_ms,
                backoff_multiplier,
            },
        )
    }

    /// Generate a configuration that passes `FreshnessConfig::validate`.
    pub fn arb_valid_config() -> impl Strategy<Value = FreshnessConfig> {
        (
            1u64..600_000,
            0u64..600_000,
            1u64..120_000,
            arb_retry_config(),
            1_000u64..120_000,
            1u64..4000,
            any::<bool>(),
        )
            .prop_map(
                |(stale, gc_extra, sweep, retry, interval, timeout, refetch_on_focus)| {
                    let mut config = FreshnessConfig::default();
                    config.cache.stale_window_ms = stale;
                    config.cache.gc_window_ms = stale + gc_extra;
                    config.cache.gc_sweep_interval_ms = sweep;
                    config.cache.retry = retry;
                    config.cache.refetch_on_window_focus = refetch_on_focus;
                    config.refresh.interval_ms = interval;
                    config.refresh.debounce_ms = interval / 15;
                    config.navigation.timeout_ms = timeout;
                    config
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// A signed-in principal with a deterministic token.
    pub fn principal() -> Principal {
        Principal::new(PrincipalId::now_v7(), "test-access-token").with_email("owner@example.com")
    }

    /// A gym owned by `owner`.
    pub fn gym_for(owner: &Principal) -> Gym {
        Gym::new(GymId::now_v7(), "Iron Temple", owner.principal_id)
    }

    /// A principal plus a directory that knows exactly one gym for them.
    pub fn owner_with_gym() -> (Principal, Gym, InMemoryGymDirectory) {
        let owner = principal();
        let gym = gym_for(&owner);
        let directory = InMemoryGymDirectory::with_gyms([gym.clone()]);
        (owner, gym, directory)
    }

    /// Defaults with retries disabled so failure tests do not wait on backoff.
    pub fn no_retry_config() -> FreshnessConfig {
        let mut config = FreshnessConfig::default();
        config.cache.retry.max_retries = 0;
        config
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for GymPulse-specific results.

    use super::*;

    #[track_caller]
    pub fn assert_config_valid(config: &FreshnessConfig) {
        if let Err(err) = config.validate() {
            panic!("Expected valid config, got: {}", err);
        }
    }

    /// Assert that validation fails and names `field`.
    #[track_caller]
    pub fn assert_config_rejects(config: &FreshnessConfig, field: &str) {
        match config.validate() {
            Err(ConfigError::InvalidValue { field: f, .. }) if f == field => {}
            Err(ConfigError::IncompatibleOptions { option_a, option_b })
                if option_a == field || option_b == field => {}
            other => panic!("Expected config error for {}, got: {:?}", field, other),
        }
    }

    #[track_caller]
    pub fn assert_backend_error<T: std::fmt::Debug>(result: &GymPulseResult<T>) {
        match result {
            Err(GymPulseError::Backend(_)) => {}
            other => panic!("Expected Backend error, got: {:?}", other),
        }
    }
}
