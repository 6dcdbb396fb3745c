//! Tenant-scoped query keys.
//!
//! A key identifies one fetch: which gym it belongs to, which resource it
//! reads and the parameters it was called with. Keys can only be
//! built through [`QueryKey::scoped`], which requires a gym id.

use gympulse_core::GymId;
use std::collections::BTreeMap;
use std::fmt;

/// Resources the client fetches and caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Members,
    Memberships,
    MembershipPlans,
    Expenses,
    Payments,
    Analytics,
    Notifications,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Members => "members",
            Resource::Memberships => "memberships",
            Resource::MembershipPlans => "membership_plans",
            Resource::Expenses => "expenses",
            Resource::Payments => "payments",
            Resource::Analytics => "analytics",
            Resource::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cached fetch.
///
/// Parameters are kept sorted so `with_param` order never produces two keys
/// for the same query.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey {
    gym_id: GymId,
    resource: Resource,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    /// Key for gym-scoped data.
    pub fn scoped(gym_id: GymId, resource: Resource) -> Self {
        Self {
            gym_id,
            resource,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn gym_id(&self) -> GymId {
        self.gym_id
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// True if this key belongs to the given gym.
    pub fn is_for_gym(&self, gym_id: GymId) -> bool {
        self.gym_id == gym_id
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gym:{}/{}", self.gym_id, self.resource)?;
        let mut separator = '?';
        for (name, value) in &self.params {
            write!(f, "{}{}={}", separator, name, value)?;
            separator = '&';
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gympulse_core::EntityIdType;
    use proptest::prelude::*;

    #[test]
    fn test_scoped_key_reports_gym() {
        let gym_id = GymId::now_v7();
        let key = QueryKey::scoped(gym_id, Resource::Members);
        assert_eq!(key.gym_id(), gym_id);
        assert!(key.is_for_gym(gym_id));
        assert!(!key.is_for_gym(GymId::now_v7()));
    }

    #[test]
    fn test_display_includes_sorted_params() {
        let gym_id = GymId::nil();
        let key = QueryKey::scoped(gym_id, Resource::Expenses)
            .with_param("year", 2024)
            .with_param("month", 5);
        assert_eq!(
            key.to_string(),
            "gym:00000000-0000-0000-0000-000000000000/expenses?month=5&year=2024"
        );
    }

    #[test]
    fn test_same_resource_different_gym_differs() {
        let a = QueryKey::scoped(GymId::now_v7(), Resource::Payments);
        let b = QueryKey::scoped(GymId::now_v7(), Resource::Payments);
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn param_order_does_not_change_identity(
            a in "[a-z]{1,8}",
            b in "[A-Z]{1,8}",
            va in 0u32..1000,
            vb in 0u32..1000,
        ) {
            let gym_id = GymId::nil();
            let first = QueryKey::scoped(gym_id, Resource::Analytics)
                .with_param(a.clone(), va)
                .with_param(b.clone(), vb);
            let second = QueryKey::scoped(gym_id, Resource::Analytics)
                .with_param(b, vb)
                .with_param(a, va);
            prop_assert_eq!(first.to_string(), second.to_string());
            prop_assert_eq!(first, second);
        }
    }
}
