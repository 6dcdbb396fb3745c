//! GymPulse client coordination layer.
//!
//! Decides when screens refresh, when they stop waiting for a load, and which
//! gym every query is scoped to. Data itself lives in `gympulse-cache`; this
//! crate drives it from page visibility, timers and the signed-in principal.

pub mod auto_refresh;
pub mod config;
pub mod error;
pub mod gym_context;
pub mod nav_guard;
pub mod preferences;
pub mod runtime;
pub mod screen;
pub mod telemetry;
pub mod visibility;

pub use auto_refresh::{
    AutoRefresh, RefreshOutcome, RefreshSchedule, RefreshSource, RefreshState, RefreshStats,
};
pub use error::{ClientError, ClientResult, RefreshFailed};
pub use gym_context::{GymContextState, GymResolver, Resolution, NO_GYM_MESSAGE};
pub use nav_guard::{NavigationTimeoutGuard, WatchdogState};
pub use preferences::{
    FilePreferenceStore, MemoryPreferenceStore, PreferenceError, PreferenceStore,
    SidebarPreference, SidebarState,
};
pub use runtime::AppContext;
pub use screen::{ScreenContent, ScreenData};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use visibility::{Visibility, VisibilityTracker};
