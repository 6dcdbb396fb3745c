//! Persisted UI preferences.
//!
//! Only the sidebar state is persisted, under [`SIDEBAR_STATE_KEY`]. It is read
//! once when the layout mounts and written whenever it changes.

use gympulse_core::constants::SIDEBAR_STATE_KEY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidebarState {
    #[default]
    Expanded,
    Collapsed,
}

impl SidebarState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expanded => "expanded",
            Self::Collapsed => "collapsed",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Expanded => Self::Collapsed,
            Self::Collapsed => Self::Expanded,
        }
    }
}

impl fmt::Display for SidebarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SidebarState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expanded" => Ok(Self::Expanded),
            "collapsed" => Ok(Self::Collapsed),
            other => Err(format!("unknown sidebar state: {}", other)),
        }
    }
}

/// String key/value storage for preferences.
pub trait PreferenceStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

/// Preferences kept in a JSON object on disk.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, PreferenceError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn read(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }
}

/// Preferences that live only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn read(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The sidebar preference, loaded once and written through on change.
pub struct SidebarPreference {
    store: Arc<dyn PreferenceStore>,
    state: SidebarState,
}

impl SidebarPreference {
    /// Read the persisted state. Missing, unknown or unreadable values fall
    /// back to expanded.
    pub fn load(store: Arc<dyn PreferenceStore>) -> Self {
        let state = match store.read(SIDEBAR_STATE_KEY) {
            Ok(Some(raw)) => raw.parse::<SidebarState>().unwrap_or_else(|err: String| {
                tracing::warn!(error = %err, "Ignoring persisted sidebar state");
                SidebarState::default()
            }),
            Ok(None) => SidebarState::default(),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read sidebar state");
                SidebarState::default()
            }
        };
        Self { store, state }
    }

    pub fn state(&self) -> SidebarState {
        self.state
    }

    /// Change the state; returns whether anything was written.
    pub fn set(&mut self, state: SidebarState) -> Result<bool, PreferenceError> {
        if state == self.state {
            return Ok(false);
        }
        self.store.write(SIDEBAR_STATE_KEY, state.as_str())?;
        self.state = state;
        tracing::debug!(state = %state, "Sidebar state saved");
        Ok(true)
    }

    pub fn toggle(&mut self) -> Result<SidebarState, PreferenceError> {
        self.set(self.state.toggled())?;
        Ok(self.state)
    }
}
