//! salon-auth - authentication and session lifecycle for the salon booking backend
//!
//! Issues and verifies access/refresh tokens for staff and customers, evaluates
//! the store-scoped role hierarchy, caches authorization contexts and sweeps
//! dead refresh sessions under a distributed lock.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod server;
pub mod service;
pub mod storage;
pub mod sweeper;

pub use auth::{AuthorizationContext, PrincipalKind, Role, StoreList, TokenIssuer};
pub use cache::ContextCache;
pub use config::AuthConfig;
pub use error::{AuthError, ErrorCatalog};
pub use service::AuthService;
pub use sweeper::{DistributedLock, RevocationSweeper};
