//! Backing query used to resolve the gym owned by a principal.

use async_trait::async_trait;

use crate::entities::{Gym, Principal};
use crate::error::BackendError;

/// Lookup of gyms owned by a principal.
///
/// Implementations forward the principal's access token and rely on the
/// backend's row-level policies to enforce ownership. The data model expects
/// at most one row. Rows come back in the backend's order and the resolver
/// takes the first, so an implementation that wants a particular gym to win
/// must sort before returning.
#[async_trait]
pub trait GymDirectory: Send + Sync {
    async fn gyms_owned_by(&self, principal: &Principal) -> Result<Vec<Gym>, BackendError>;
}
