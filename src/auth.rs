//! Permission checks for rack, device, and reservation changes.
//!
//! The coordinator only asks "may this subject do X to Y?" through
//! [`Authorizer`]. [`GrantTable`] answers from grants declared in the
//! configuration file.
//!
//! Grant semantics:
//! - A kind-level query ([`Resource::Kind`]) succeeds if the subject holds
//!   any grant for that action and kind, constrained or not
//! - An instance query succeeds only if some grant's constraint matches the
//!   instance; an unconstrained grant matches every instance

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Device, Rack, Reservation};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    /// User name as asserted by the authentication layer.
    pub username: String,
}

impl Subject {
    /// Creates a subject.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// Permission action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read access
    View,
    /// Modify access
    Change,
}

/// Object kinds grants can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Racks
    Rack,
    /// Devices
    Device,
    /// Unit reservations
    Reservation,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rack => write!(f, "rack"),
            Self::Device => write!(f, "device"),
            Self::Reservation => write!(f, "reservation"),
        }
    }
}

/// What a permission check is about.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// The kind as a whole
    Kind(ObjectKind),
    /// A specific rack
    Rack(&'a Rack),
    /// A specific device
    Device(&'a Device),
    /// A specific reservation
    Reservation(&'a Reservation),
}

impl Resource<'_> {
    /// Kind of the resource.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Kind(kind) => *kind,
            Self::Rack(_) => ObjectKind::Rack,
            Self::Device(_) => ObjectKind::Device,
            Self::Reservation(_) => ObjectKind::Reservation,
        }
    }
}

/// Capability interface for permission checks.
pub trait Authorizer: Send + Sync {
    /// Whether `subject` may perform `action` on `resource`.
    fn has_perm(&self, subject: &Subject, action: Action, resource: Resource<'_>) -> bool;

    /// Shorthand for [`Action::View`].
    fn can_view(&self, subject: &Subject, resource: Resource<'_>) -> bool {
        self.has_perm(subject, Action::View, resource)
    }

    /// Shorthand for [`Action::Change`].
    fn can_modify(&self, subject: &Subject, resource: Resource<'_>) -> bool {
        self.has_perm(subject, Action::Change, resource)
    }
}

/// Restricts a grant to matching instances.
///
/// Each populated field must match. Racks and devices match on name,
/// reservations on description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Allowed primary keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<u64>>,
    /// Allowed names (descriptions for reservations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

impl Constraint {
    fn matches(&self, id: u64, name: &str) -> bool {
        let id_ok = self.ids.as_ref().is_none_or(|ids| ids.contains(&id));
        let name_ok = self
            .names
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == name));
        id_ok && name_ok
    }
}

/// A permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Kind the grant applies to
    pub kind: ObjectKind,
    /// Actions allowed
    pub actions: Vec<Action>,
    /// Optional instance constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

impl Grant {
    /// Unconstrained grant.
    pub fn new(kind: ObjectKind, actions: &[Action]) -> Self {
        Self {
            kind,
            actions: actions.to_vec(),
            constraint: None,
        }
    }

    /// Restricts the grant to instances matching `constraint`.
    #[must_use]
    pub fn constrained(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    fn covers(&self, action: Action, resource: &Resource<'_>) -> bool {
        if self.kind != resource.kind() || !self.actions.contains(&action) {
            return false;
        }

        let Some(constraint) = &self.constraint else {
            return true;
        };

        match resource {
            Resource::Kind(_) => true,
            Resource::Rack(rack) => constraint.matches(rack.id, &rack.name),
            Resource::Device(device) => constraint.matches(device.id, &device.name),
            Resource::Reservation(reservation) => {
                constraint.matches(reservation.id, &reservation.description)
            }
        }
    }
}

/// Grants held by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrants {
    /// User name
    pub name: String,
    /// Bypasses every check
    #[serde(default)]
    pub superuser: bool,
    /// Grants held
    #[serde(default)]
    pub grants: Vec<Grant>,
}

/// [`Authorizer`] backed by configured per-user grants.
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    users: HashMap<String, UserGrants>,
}

impl GrantTable {
    /// Builds a table from user grant lists. Later entries for the same user
    /// replace earlier ones.
    pub fn new(users: impl IntoIterator<Item = UserGrants>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.name.clone(), u)).collect(),
        }
    }
}

impl Authorizer for GrantTable {
    fn has_perm(&self, subject: &Subject, action: Action, resource: Resource<'_>) -> bool {
        let Some(user) = self.users.get(&subject.username) else {
            return false;
        };
        user.superuser || user.grants.iter().any(|g| g.covers(action, &resource))
    }
}
