//! Application-wide context.
//!
//! [`AppContext`] is built once by the host, initialized, and handed to every
//! screen. It owns the cache, the visibility signal, the gym resolver and the
//! sidebar preference, and hands out per-screen coordinators and guards that
//! share them.

use gympulse_cache::{CacheConfig, CacheStore, FetchInterceptor, FetchOptions, QueryKey, Resource};
use gympulse_core::{FreshnessConfig, GymDirectory, GymPulseError, Principal};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auto_refresh::{AutoRefresh, RefreshSchedule, RefreshSource};
use crate::error::{ClientError, ClientResult};
use crate::gym_context::{GymContextState, GymResolver};
use crate::nav_guard::NavigationTimeoutGuard;
use crate::preferences::{
    FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, SidebarPreference, SidebarState,
};
use crate::visibility::VisibilityTracker;

pub struct AppContext<D> {
    config: FreshnessConfig,
    cache: CacheStore,
    visibility: VisibilityTracker,
    gym_context: Arc<GymResolver<D>>,
    sidebar: Mutex<SidebarPreference>,
}

impl<D: GymDirectory + 'static> AppContext<D> {
    pub fn new(config: FreshnessConfig, directory: Arc<D>) -> ClientResult<Self> {
        Self::with_interceptors(config, directory, Vec::new())
    }

    /// Build the context with fetch interceptors installed on the cache.
    pub fn with_interceptors(
        config: FreshnessConfig,
        directory: Arc<D>,
        interceptors: Vec<Arc<dyn FetchInterceptor>>,
    ) -> ClientResult<Self> {
        config.validate().map_err(GymPulseError::from)?;

        let cache_config = CacheConfig::from_settings(&config.cache);
        let preferences: Arc<dyn PreferenceStore> = match &config.preferences.path {
            Some(path) => Arc::new(FilePreferenceStore::new(path)),
            None => Arc::new(MemoryPreferenceStore::new()),
        };

        Ok(Self {
            cache: CacheStore::with_interceptors(cache_config, interceptors),
            visibility: VisibilityTracker::new(),
            gym_context: Arc::new(GymResolver::new(directory)),
            sidebar: Mutex::new(SidebarPreference::load(preferences)),
            config,
        })
    }

    /// Start background maintenance. Must be called within a tokio runtime.
    pub fn init(&self) {
        self.cache.init();
        tracing::info!(
            refresh_interval_ms = self.config.refresh.interval_ms,
            navigation_timeout_ms = self.config.navigation.timeout_ms,
            "Client context initialized"
        );
    }

    /// Stop background work and drop cached data.
    pub fn dispose(&self) {
        self.cache.dispose();
        tracing::info!("Client context disposed");
    }

    pub fn config(&self) -> &FreshnessConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    pub fn gym_context(&self) -> &Arc<GymResolver<D>> {
        &self.gym_context
    }

    /// Forward an auth change to the resolver.
    ///
    /// A different principal (or sign-out) drops every cached entry first, so
    /// the next screen never renders the previous tenant's rows.
    pub async fn set_principal(&self, principal: Option<Principal>) -> GymContextState {
        let previous = self.gym_context.current().principal_id;
        let next = principal.as_ref().map(|p| p.principal_id);
        if previous.is_some() && previous != next {
            let dropped = self.cache.clear();
            tracing::info!(dropped, "Principal changed, cache cleared");
        }
        self.gym_context.set_principal(principal).await
    }

    /// The window regained focus. Returns the number of refetches started.
    pub fn on_window_focus(&self) -> usize {
        self.cache.on_window_focus()
    }

    /// Network connectivity came back. Returns the number of refetches started.
    pub fn on_reconnect(&self) -> usize {
        self.cache.on_reconnect()
    }

    /// Feed the host's document visibility state (`"visible"`, `"hidden"`).
    pub fn observe_document_state(&self, state: Option<&str>) -> bool {
        self.visibility.observe_document_state(state)
    }

    /// Auto-refresh coordinator for one screen, using the configured schedule.
    pub fn auto_refresh(&self, source: Arc<dyn RefreshSource>) -> AutoRefresh {
        AutoRefresh::start(
            RefreshSchedule::from_settings(&self.config.refresh),
            self.visibility.clone(),
            source,
        )
    }

    /// Loading watchdog for one screen, using the configured timeout.
    pub fn navigation_guard(&self) -> NavigationTimeoutGuard {
        NavigationTimeoutGuard::new(&self.config.navigation)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        self.cache.default_options()
    }

    /// Cache key for `resource` under the resolved gym.
    pub fn query_key(&self, resource: Resource) -> ClientResult<QueryKey> {
        let gym_id = self.gym_context.current().gym_id().ok_or(ClientError::NoGym)?;
        Ok(QueryKey::scoped(gym_id, resource))
    }

    pub fn sidebar(&self) -> SidebarState {
        self.lock_sidebar().state()
    }

    /// Persist a new sidebar state; returns whether anything was written.
    pub fn set_sidebar(&self, state: SidebarState) -> ClientResult<bool> {
        Ok(self.lock_sidebar().set(state)?)
    }

    pub fn toggle_sidebar(&self) -> ClientResult<SidebarState> {
        Ok(self.lock_sidebar().toggle()?)
    }

    fn lock_sidebar(&self) -> MutexGuard<'_, SidebarPreference> {
        self.sidebar.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
