//! Storage backends
//!
//! - Postgres: durable refresh sessions, staff/customer rows, and an unlogged
//!   key-value table for the context cache and sweep lock
//! - Memory: process-local equivalents for tests and single-node runs

mod memory;
mod postgres;

pub use memory::{MemoryDirectory, MemoryKvStore, MemorySessionStore};
pub use postgres::{PostgresConfig, PostgresStore};

use crate::auth::{ExternalIdentity, PrincipalKind, Role, StoreId, StoreList};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type SessionId = i64;

/// A staff account as the auth subsystem sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

/// A customer account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub id: i64,
    pub line_uid: Option<String>,
    pub name: String,
    pub email: Option<String>,
}

/// Input for `SessionStore::create_session`
#[derive(Debug, Clone)]
pub struct NewSession {
    pub principal_id: i64,
    pub kind: PrincipalKind,
    pub token: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub ttl: Duration,
}

/// A persisted refresh session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: SessionId,
    pub principal_id: i64,
    pub kind: PrincipalKind,
    pub token: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshSession {
    /// Neither revoked nor past its expiry
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Eligible for physical deletion
    pub fn is_sweepable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_live_at(now)
    }
}

/// Expiry instant for a session created at `issued_at` with `ttl`
pub(crate) fn expiry_after(issued_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    issued_at
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Refresh-session persistence, one logical table per principal kind
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session row, returns its id
    async fn create_session(&self, session: NewSession) -> Result<SessionId, StorageError>;

    /// Look up a live session by token
    ///
    /// Unknown, expired and revoked tokens all fail with `NotFound`.
    async fn get_valid_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<RefreshSession, StorageError>;

    /// Mark a session revoked; idempotent
    ///
    /// Returns the owning principal id if a live session was revoked by this call.
    async fn revoke_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<Option<i64>, StorageError>;

    /// Number of revoked or expired rows
    async fn count_sweepable(&self, kind: PrincipalKind) -> Result<u64, StorageError>;

    /// Delete up to `batch_size` revoked or expired rows
    async fn delete_sweepable_batch(
        &self,
        kind: PrincipalKind,
        batch_size: u32,
    ) -> Result<u64, StorageError>;
}

/// Principal and store-grant reads, plus the few writes auth flows own
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_staff_by_username(&self, username: &str)
        -> Result<Option<StaffRecord>, StorageError>;

    async fn get_staff(&self, staff_id: i64) -> Result<Option<StaffRecord>, StorageError>;

    /// Stores the staff member may act on; `SUPER_ADMIN` gets every active store
    async fn staff_store_list(&self, staff_id: i64, role: Role)
        -> Result<StoreList, StorageError>;

    async fn update_password_hash(&self, staff_id: i64, hash: &str) -> Result<(), StorageError>;

    async fn update_role(&self, staff_id: i64, role: Role) -> Result<(), StorageError>;

    async fn set_active(&self, staff_id: i64, active: bool) -> Result<(), StorageError>;

    async fn grant_stores(&self, staff_id: i64, store_ids: &[StoreId])
        -> Result<(), StorageError>;

    async fn revoke_stores(&self, staff_id: i64, store_ids: &[StoreId])
        -> Result<(), StorageError>;

    async fn get_customer(&self, customer_id: i64)
        -> Result<Option<CustomerRecord>, StorageError>;

    /// Find the customer linked to this LINE identity, creating it if needed
    async fn upsert_line_customer(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<CustomerRecord, StorageError>;
}

/// Shared key-value store with per-entry TTL
///
/// Backs the context cache and the distributed sweep lock.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StorageError>;

    /// Atomically set `key` unless a live entry exists; true if this call set it
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Physically drop expired entries, returns how many
    async fn purge_expired(&self) -> Result<u64, StorageError>;
}
