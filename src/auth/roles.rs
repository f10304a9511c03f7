//! Role hierarchy and store-scoped access checks

use crate::auth::context::AuthorizationContext;
use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Store identifier
pub type StoreId = i64;

/// Staff roles, declared in ascending order of privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Works in the stores they are granted; no staff management
    Stylist,
    /// Runs one or more stores
    Manager,
    /// Manages managers and stylists within granted stores
    Admin,
    /// Unscoped; implicitly granted every active store
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Stylist, Role::Manager, Role::Admin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Stylist => "STYLIST",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// True if this role is `floor` or more privileged
    pub fn is_at_least(&self, floor: Role) -> bool {
        *self >= floor
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STYLIST" => Ok(Role::Stylist),
            "MANAGER" => Ok(Role::Manager),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// The set of stores a principal has been granted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreList {
    stores: BTreeSet<StoreId>,
}

impl StoreList {
    pub fn new() -> Self {
        Self { stores: BTreeSet::new() }
    }

    pub fn add(&mut self, store_id: StoreId) {
        self.stores.insert(store_id);
    }

    pub fn remove(&mut self, store_id: StoreId) {
        self.stores.remove(&store_id);
    }

    pub fn contains(&self, store_id: StoreId) -> bool {
        self.stores.contains(&store_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = StoreId> + '_ {
        self.stores.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl FromIterator<StoreId> for StoreList {
    fn from_iter<T: IntoIterator<Item = StoreId>>(iter: T) -> Self {
        Self {
            stores: iter.into_iter().collect(),
        }
    }
}

/// Which roles an operation admits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Exactly one of these roles
    AnyOf(Vec<Role>),
    /// This role or anything above it
    AtLeast(Role),
}

impl RoleRequirement {
    pub fn admits(&self, role: Role) -> bool {
        match self {
            RoleRequirement::AnyOf(roles) => roles.contains(&role),
            RoleRequirement::AtLeast(floor) => role.is_at_least(*floor),
        }
    }
}

impl fmt::Display for RoleRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleRequirement::AnyOf(roles) => {
                let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
                write!(f, "one of [{}]", names.join(", "))
            }
            RoleRequirement::AtLeast(floor) => write!(f, "{} or above", floor),
        }
    }
}

/// A role requirement plus an optional target store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequirement {
    pub roles: RoleRequirement,
    pub store_id: Option<StoreId>,
}

impl AccessRequirement {
    pub fn at_least(role: Role) -> Self {
        Self {
            roles: RoleRequirement::AtLeast(role),
            store_id: None,
        }
    }

    pub fn any_of(roles: impl Into<Vec<Role>>) -> Self {
        Self {
            roles: RoleRequirement::AnyOf(roles.into()),
            store_id: None,
        }
    }

    /// Additionally require access to `store_id`
    pub fn in_store(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }
}

/// Whether `caller` may create, modify or deactivate staff holding `target`
pub fn can_manage_role(caller: Role, target: Role) -> bool {
    match caller {
        Role::SuperAdmin => !matches!(target, Role::SuperAdmin),
        Role::Admin => matches!(target, Role::Manager | Role::Stylist),
        Role::Manager | Role::Stylist => false,
    }
}

/// Whether `caller` may act on `store_id`
pub fn can_access_store(caller: Role, caller_stores: &StoreList, store_id: StoreId) -> bool {
    match caller {
        Role::SuperAdmin => true,
        Role::Admin | Role::Manager | Role::Stylist => caller_stores.contains(store_id),
    }
}

/// Whether `caller` may act on every store in `store_ids`
///
/// Fails closed: a single store outside the caller's grants rejects the batch.
pub fn can_access_all_stores(
    caller: Role,
    caller_stores: &StoreList,
    store_ids: &[StoreId],
) -> bool {
    store_ids
        .iter()
        .all(|id| can_access_store(caller, caller_stores, *id))
}

/// Check a context against a requirement
///
/// Principals without a role (customers) never satisfy a requirement.
pub fn authorize(
    context: &AuthorizationContext,
    requirement: &AccessRequirement,
) -> Result<(), AuthError> {
    let Some(role) = context.role else {
        return Err(AuthError::PermissionDenied(
            "principal has no staff role".to_string(),
        ));
    };

    if !requirement.roles.admits(role) {
        return Err(AuthError::PermissionDenied(format!(
            "role {} does not satisfy {}",
            role, requirement.roles
        )));
    }

    if let Some(store_id) = requirement.store_id {
        if !can_access_store(role, &context.store_list, store_id) {
            return Err(AuthError::PermissionDenied(format!(
                "no access to store {}",
                store_id
            )));
        }
    }

    Ok(())
}
