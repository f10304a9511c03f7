//! Authentication and authorization
//!
//! Token types:
//! - access token: stateless, HS256-signed, carries a role/store snapshot
//! - refresh token: opaque random lookup key, revocable server-side
//!
//! Roles (ascending): `STYLIST < MANAGER < ADMIN < SUPER_ADMIN`. Every role
//! except `SUPER_ADMIN` is scoped to the stores it has been granted.

mod context;
mod identity;
mod password;
mod roles;
mod tokens;

pub use context::{AuthorizationContext, PrincipalKind};
pub use identity::{ExternalIdentity, IdentityVerifier, LineIdentityVerifier};
pub use password::{Argon2Hasher, PasswordHasher};
pub use roles::{
    authorize, can_access_all_stores, can_access_store, can_manage_role, AccessRequirement,
    Role, RoleRequirement, StoreId, StoreList,
};
pub use tokens::{AccessClaims, IssuedAccessToken, TokenError, TokenIssuer};
