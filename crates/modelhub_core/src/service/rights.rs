//! Access decisions for CRUD requests.
//!
//! # Responsibility
//! - Describe who asks (`Actor`) and what for (`Action`).
//! - Let each model plug a policy answering with a `Grant`.
//!
//! # Invariants
//! - A model without a policy denies every action.
//! - In a per-field grant, names without an entry are allowed and an
//!   explicit `FieldRight::Unset` denies.

use crate::model::Instance;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub const ROLE_MEMBER: &str = "MEMBER";
pub const ROLE_ADMIN: &str = "ADMIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    SoftDelete,
    HardDelete,
    Restore,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::SoftDelete => "soft delete",
            Self::HardDelete => "hard delete",
            Self::Restore => "restore",
        }
    }
}

/// Caller identity as seen by rights policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub uid: Option<u64>,
    pub role: Option<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(uid: u64) -> Self {
        Self {
            uid: Some(uid),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.uid.is_none()
    }

    /// True when `resource` is the actor's own entity of `user_model`.
    pub fn is_self(&self, resource: Option<&Instance>, user_model: &str) -> bool {
        match (self.uid, resource) {
            (Some(uid), Some(resource)) => resource.model() == user_model && resource.uid() == uid,
            _ => false,
        }
    }

    pub fn is_member(&self) -> bool {
        self.has_role(ROLE_MEMBER)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    fn has_role(&self, role: &str) -> bool {
        !self.is_unknown() && self.role.as_deref() == Some(role)
    }
}

/// Right attached to one attribute name.
#[derive(Clone)]
pub enum FieldRight {
    Allow(bool),
    /// Allowed when the client value is one of these.
    OneOf(Vec<Json>),
    Predicate(Rc<dyn Fn(&Json) -> bool>),
    Unset,
}

impl FieldRight {
    pub fn predicate(f: impl Fn(&Json) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(f))
    }

    pub fn permits(&self, value: &Json) -> bool {
        match self {
            Self::Allow(allowed) => *allowed,
            Self::OneOf(values) => values.contains(value),
            Self::Predicate(f) => f(value),
            Self::Unset => false,
        }
    }
}

impl Debug for FieldRight {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow(allowed) => write!(f, "Allow({allowed})"),
            Self::OneOf(values) => write!(f, "OneOf({values:?})"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Unset => f.write_str("Unset"),
        }
    }
}

/// Outcome of a rights policy.
#[derive(Debug, Clone)]
pub enum Grant {
    Deny,
    Allow,
    Fields(BTreeMap<String, FieldRight>),
}

impl Grant {
    /// Builds a per-field grant from `(name, right)` pairs.
    pub fn fields<I, S>(rights: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldRight)>,
        S: Into<String>,
    {
        Self::Fields(
            rights
                .into_iter()
                .map(|(name, right)| (name.into(), right))
                .collect(),
        )
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }

    /// Whether attribute `name` may carry `value` under this grant.
    pub fn permits(&self, name: &str, value: &Json) -> bool {
        match self {
            Self::Deny => false,
            Self::Allow => true,
            Self::Fields(rights) => rights.get(name).map_or(true, |right| right.permits(value)),
        }
    }
}

impl From<bool> for Grant {
    fn from(value: bool) -> Self {
        if value {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

/// Per-model access policy. `resource` is `None` for creation.
pub trait Rights {
    fn can(&self, actor: &Actor, action: Action, resource: Option<&Instance>) -> Grant;
}

impl<F> Rights for F
where
    F: Fn(&Actor, Action, Option<&Instance>) -> Grant,
{
    fn can(&self, actor: &Actor, action: Action, resource: Option<&Instance>) -> Grant {
        self(actor, action, resource)
    }
}

/// Policy granting everything to everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Rights for AllowAll {
    fn can(&self, _actor: &Actor, _action: Action, _resource: Option<&Instance>) -> Grant {
        Grant::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, FieldRight, Grant};
    use serde_json::json;

    #[test]
    fn field_grant_checks_only_listed_names() {
        let grant = Grant::fields([
            ("email", FieldRight::Allow(false)),
            ("role", FieldRight::OneOf(vec![json!("MEMBER")])),
            ("age", FieldRight::predicate(|value| value.as_i64().is_some_and(|age| age >= 18))),
            ("secret", FieldRight::Unset),
        ]);

        assert!(grant.permits("name", &json!("Ada")));
        assert!(!grant.permits("email", &json!("ada@example.com")));
        assert!(grant.permits("role", &json!("MEMBER")));
        assert!(!grant.permits("role", &json!("ADMIN")));
        assert!(grant.permits("age", &json!(30)));
        assert!(!grant.permits("age", &json!(12)));
        assert!(!grant.permits("secret", &json!(1)));
        assert!(!Grant::Deny.permits("name", &json!("Ada")));
    }

    #[test]
    fn roles_require_a_known_actor() {
        let anonymous = Actor {
            uid: None,
            role: Some("ADMIN".to_string()),
        };
        assert!(anonymous.is_unknown());
        assert!(!anonymous.is_admin());
        assert!(Actor::new(3).with_role("MEMBER").is_member());
    }
}
