//! Tenant entities resolved by the client.

use crate::identity::{GymId, PrincipalId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A gym record as returned by the backing store.
///
/// All member, expense and membership queries are filtered by `gym_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gym {
    pub gym_id: GymId,
    pub name: String,
    pub owner_id: PrincipalId,
    pub created_at: Option<Timestamp>,
}

impl Gym {
    pub fn new(gym_id: GymId, name: impl Into<String>, owner_id: PrincipalId) -> Self {
        Self {
            gym_id,
            name: name.into(),
            owner_id,
            created_at: None,
        }
    }
}

/// An authenticated principal.
///
/// The access token is forwarded to the backend so row-level policies can
/// enforce ownership; it never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub email: Option<String>,
    pub access_token: String,
}

impl Principal {
    pub fn new(principal_id: PrincipalId, access_token: impl Into<String>) -> Self {
        Self {
            principal_id,
            email: None,
            access_token: access_token.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("principal_id", &self.principal_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .finish()
    }
}
