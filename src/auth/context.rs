//! Authorization context: who the caller is and what they may touch

use crate::auth::roles::{Role, StoreList};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two kinds of principal that hold sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    Staff,
    Customer,
}

impl PrincipalKind {
    pub const ALL: [PrincipalKind; 2] = [PrincipalKind::Staff, PrincipalKind::Customer];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Staff => "staff",
            PrincipalKind::Customer => "customer",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staff" => Ok(PrincipalKind::Staff),
            "customer" => Ok(PrincipalKind::Customer),
            _ => Err(format!("unknown principal kind: {}", s)),
        }
    }
}

/// Resolved authorization state for one principal
///
/// Derived from the principal row plus its store grants; never stored durably.
/// Customers carry no role and an empty store list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationContext {
    pub principal_id: i64,
    pub kind: PrincipalKind,
    pub username: String,
    pub role: Option<Role>,
    pub store_list: StoreList,
}

impl AuthorizationContext {
    pub fn is(&self, kind: PrincipalKind, principal_id: i64) -> bool {
        self.kind == kind && self.principal_id == principal_id
    }

    /// The staff role, if this is a staff context
    pub fn staff_role(&self) -> Option<Role> {
        match self.kind {
            PrincipalKind::Staff => self.role,
            PrincipalKind::Customer => None,
        }
    }
}
