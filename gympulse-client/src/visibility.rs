//! Page visibility tracking.
//!
//! The host adapter feeds document visibility signals in; refresh loops read
//! the current value and subscribe to transitions. Anything that is not
//! clearly "hidden" counts as visible.

use std::sync::Arc;
use tokio::sync::watch;

/// Whether the document is the active, visible tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    /// Map a document visibility state string (`"visible"`, `"hidden"`, ...).
    pub fn from_document_state(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "hidden" => Self::Hidden,
            _ => Self::Visible,
        }
    }

    pub fn is_visible(self) -> bool {
        self == Self::Visible
    }
}

/// Shared visibility signal. Clones observe and update the same value.
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    sender: Arc<watch::Sender<Visibility>>,
}

impl Default for VisibilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::with_initial(Visibility::Visible)
    }

    pub fn with_initial(visibility: Visibility) -> Self {
        let (sender, _) = watch::channel(visibility);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Visibility {
        *self.sender.borrow()
    }

    pub fn is_visible(&self) -> bool {
        self.current().is_visible()
    }

    /// Record a visibility signal. Returns true if it was a transition;
    /// repeated identical signals notify nobody.
    pub fn set_visibility(&self, visibility: Visibility) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == visibility {
                return false;
            }
            *current = visibility;
            true
        });
        if changed {
            tracing::debug!(visibility = ?visibility, "Visibility changed");
        }
        changed
    }

    /// Record a raw document state; a missing state counts as visible.
    pub fn observe_document_state(&self, state: Option<&str>) -> bool {
        let visibility = state.map_or(Visibility::Visible, Visibility::from_document_state);
        self.set_visibility(visibility)
    }

    /// Receiver that is notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.sender.subscribe()
    }
}
