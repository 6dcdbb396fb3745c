//! Gym context: the tenant every data query is scoped by.
//!
//! Resolution is keyed on the authenticated principal only. Switching
//! principals always re-queries the directory, and a lookup that finishes
//! after the principal changed is dropped instead of published.

use gympulse_core::{Gym, GymDirectory, GymId, Principal, PrincipalId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Error shown when the principal owns no gym.
pub const NO_GYM_MESSAGE: &str = "no entity found for current user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nobody is signed in.
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// What dependents see: the gym (if any) and how it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GymContextState {
    pub gym: Option<Gym>,
    pub principal_id: Option<PrincipalId>,
    pub resolution: Resolution,
}

impl GymContextState {
    fn idle() -> Self {
        Self {
            gym: None,
            principal_id: None,
            resolution: Resolution::Idle,
        }
    }

    pub fn gym_id(&self) -> Option<GymId> {
        self.gym.as_ref().map(|gym| gym.gym_id)
    }

    pub fn is_loading(&self) -> bool {
        self.resolution == Resolution::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Error(message) => Some(message),
            _ => None,
        }
    }
}

struct ResolverInner {
    principal: Option<Principal>,
    generation: u64,
}

/// Resolves and publishes the gym owned by the current principal.
pub struct GymResolver<D> {
    directory: Arc<D>,
    state: watch::Sender<GymContextState>,
    inner: Mutex<ResolverInner>,
}

impl<D: GymDirectory> GymResolver<D> {
    pub fn new(directory: Arc<D>) -> Self {
        let (state, _) = watch::channel(GymContextState::idle());
        Self {
            directory,
            state,
            inner: Mutex::new(ResolverInner {
                principal: None,
                generation: 0,
            }),
        }
    }

    pub fn current(&self) -> GymContextState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GymContextState> {
        self.state.subscribe()
    }

    /// The signed-in principal changed (login, logout, switch, token refresh).
    ///
    /// Reporting the same principal id again only swaps in the new token.
    pub async fn set_principal(&self, principal: Option<Principal>) -> GymContextState {
        let generation = {
            let mut inner = self.lock();
            let same_principal = match (&inner.principal, &principal) {
                (Some(current), Some(next)) => current.principal_id == next.principal_id,
                _ => false,
            };
            if same_principal {
                inner.principal = principal;
                return self.current();
            }

            inner.generation += 1;
            inner.principal = principal.clone();
            inner.generation
        };

        match principal {
            None => {
                tracing::debug!("Principal signed out, clearing gym context");
                self.state.send_replace(GymContextState::idle());
                self.current()
            }
            Some(principal) => self.resolve(generation, principal).await,
        }
    }

    /// Re-run resolution for the current principal.
    pub async fn refresh(&self) -> GymContextState {
        let pending = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.principal.clone().map(|principal| (inner.generation, principal))
        };
        match pending {
            Some((generation, principal)) => self.resolve(generation, principal).await,
            None => self.current(),
        }
    }

    async fn resolve(&self, generation: u64, principal: Principal) -> GymContextState {
        let principal_id = principal.principal_id;
        self.state.send_replace(GymContextState {
            gym: None,
            principal_id: Some(principal_id),
            resolution: Resolution::Loading,
        });
        tracing::debug!(principal_id = %principal_id, "Resolving gym");

        let result = self.directory.gyms_owned_by(&principal).await;
        let next = match result {
            Ok(gyms) => {
                if gyms.len() > 1 {
                    tracing::warn!(
                        principal_id = %principal_id,
                        count = gyms.len(),
                        "Principal owns several gyms, using the first row"
                    );
                }
                match gyms.into_iter().next() {
                    Some(gym) => GymContextState {
                        gym: Some(gym),
                        principal_id: Some(principal_id),
                        resolution: Resolution::Ready,
                    },
                    None => GymContextState {
                        gym: None,
                        principal_id: Some(principal_id),
                        resolution: Resolution::Error(NO_GYM_MESSAGE.to_string()),
                    },
                }
            }
            Err(err) => {
                tracing::warn!(principal_id = %principal_id, error = %err, "Gym lookup failed");
                GymContextState {
                    gym: None,
                    principal_id: Some(principal_id),
                    resolution: Resolution::Error(err.message()),
                }
            }
        };

        let inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(principal_id = %principal_id, "Discarding gym resolution for a previous principal");
            return self.current();
        }
        if let Some(gym_id) = next.gym_id() {
            tracing::info!(principal_id = %principal_id, gym_id = %gym_id, "Gym context ready");
        }
        self.state.send_replace(next.clone());
        drop(inner);
        next
    }

    fn lock(&self) -> MutexGuard<'_, ResolverInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
