//! In-memory storage backends

use crate::auth::{ExternalIdentity, PrincipalKind, Role, StoreId, StoreList};
use crate::storage::{
    expiry_after, CustomerRecord, KvStore, NewSession, PrincipalDirectory, RefreshSession,
    SessionId, SessionStore, StaffRecord, StorageError,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Refresh sessions keyed by (kind, token)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<(PrincipalKind, String), RefreshSession>,
    next_id: AtomicI64,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows of `kind`, live or not
    pub fn len(&self, kind: PrincipalKind) -> usize {
        self.sessions.iter().filter(|e| e.key().0 == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Raw row lookup, ignoring liveness
    pub fn get_raw(&self, kind: PrincipalKind, token: &str) -> Option<RefreshSession> {
        self.sessions
            .get(&(kind, token.to_string()))
            .map(|e| e.value().clone())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let issued_at = Utc::now();

        let row = RefreshSession {
            id,
            principal_id: session.principal_id,
            kind: session.kind,
            token: session.token.clone(),
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            issued_at,
            expires_at: expiry_after(issued_at, session.ttl),
            revoked_at: None,
        };

        match self.sessions.entry((session.kind, session.token)) {
            Entry::Occupied(_) => Err(StorageError::Database(
                "duplicate refresh token".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(row);
                Ok(id)
            }
        }
    }

    async fn get_valid_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<RefreshSession, StorageError> {
        let now = Utc::now();
        self.sessions
            .get(&(kind, token.to_string()))
            .map(|e| e.value().clone())
            .filter(|s| s.is_live_at(now))
            .ok_or_else(|| StorageError::NotFound("refresh session".to_string()))
    }

    async fn revoke_session(
        &self,
        kind: PrincipalKind,
        token: &str,
    ) -> Result<Option<i64>, StorageError> {
        let now = Utc::now();
        let Some(mut row) = self.sessions.get_mut(&(kind, token.to_string())) else {
            return Ok(None);
        };

        if !row.is_live_at(now) {
            return Ok(None);
        }

        row.revoked_at = Some(now);
        Ok(Some(row.principal_id))
    }

    async fn count_sweepable(&self, kind: PrincipalKind) -> Result<u64, StorageError> {
        let now = Utc::now();
        let count = self
            .sessions
            .iter()
            .filter(|e| e.key().0 == kind && e.value().is_sweepable_at(now))
            .count();
        Ok(count as u64)
    }

    async fn delete_sweepable_batch(
        &self,
        kind: PrincipalKind,
        batch_size: u32,
    ) -> Result<u64, StorageError> {
        let now = Utc::now();
        let victims: Vec<(PrincipalKind, String)> = self
            .sessions
            .iter()
            .filter(|e| e.key().0 == kind && e.value().is_sweepable_at(now))
            .take(batch_size as usize)
            .map(|e| e.key().clone())
            .collect();

        let mut deleted = 0;
        for key in victims {
            // Another sweeper may have raced us to it
            if self.sessions.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[derive(Default)]
struct DirectoryState {
    staff: BTreeMap<i64, StaffRecord>,
    /// store id -> active
    stores: BTreeMap<StoreId, bool>,
    grants: BTreeSet<(i64, StoreId)>,
    customers: BTreeMap<i64, CustomerRecord>,
    next_id: i64,
}

impl DirectoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn staff_mut(&mut self, staff_id: i64) -> Result<&mut StaffRecord, StorageError> {
        self.staff
            .get_mut(&staff_id)
            .ok_or_else(|| StorageError::NotFound(format!("staff {}", staff_id)))
    }
}

/// Staff, stores, grants and customers held in memory
#[derive(Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_store(&self, store_id: StoreId, active: bool) {
        self.state.write().stores.insert(store_id, active);
    }

    /// Insert a staff member, returns the new id
    pub fn add_staff(&self, username: &str, email: &str, password_hash: &str, role: Role) -> i64 {
        let mut state = self.state.write();
        let id = state.next_id();
        state.staff.insert(
            id,
            StaffRecord {
                id,
                username: username.to_string(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role,
                is_active: true,
            },
        );
        id
    }

    pub fn customer_count(&self) -> usize {
        self.state.read().customers.len()
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryDirectory {
    async fn find_staff_by_username(
        &self,
        username: &str,
    ) -> Result<Option<StaffRecord>, StorageError> {
        Ok(self
            .state
            .read()
            .staff
            .values()
            .find(|s| s.username == username)
            .cloned())
    }

    async fn get_staff(&self, staff_id: i64) -> Result<Option<StaffRecord>, StorageError> {
        Ok(self.state.read().staff.get(&staff_id).cloned())
    }

    async fn staff_store_list(
        &self,
        staff_id: i64,
        role: Role,
    ) -> Result<StoreList, StorageError> {
        let state = self.state.read();
        let list = match role {
            Role::SuperAdmin => state
                .stores
                .iter()
                .filter(|(_, active)| **active)
                .map(|(id, _)| *id)
                .collect(),
            Role::Admin | Role::Manager | Role::Stylist => state
                .grants
                .iter()
                .filter(|(sid, _)| *sid == staff_id)
                .map(|(_, store)| *store)
                .collect(),
        };
        Ok(list)
    }

    async fn update_password_hash(&self, staff_id: i64, hash: &str) -> Result<(), StorageError> {
        self.state.write().staff_mut(staff_id)?.password_hash = hash.to_string();
        Ok(())
    }

    async fn update_role(&self, staff_id: i64, role: Role) -> Result<(), StorageError> {
        self.state.write().staff_mut(staff_id)?.role = role;
        Ok(())
    }

    async fn set_active(&self, staff_id: i64, active: bool) -> Result<(), StorageError> {
        self.state.write().staff_mut(staff_id)?.is_active = active;
        Ok(())
    }

    async fn grant_stores(
        &self,
        staff_id: i64,
        store_ids: &[StoreId],
    ) -> Result<(), StorageError> {
        let mut state = self.state.write();
        state.staff_mut(staff_id)?;
        if let Some(missing) = store_ids.iter().find(|id| !state.stores.contains_key(id)) {
            return Err(StorageError::NotFound(format!("store {}", missing)));
        }
        for store_id in store_ids {
            state.grants.insert((staff_id, *store_id));
        }
        Ok(())
    }

    async fn revoke_stores(
        &self,
        staff_id: i64,
        store_ids: &[StoreId],
    ) -> Result<(), StorageError> {
        let mut state = self.state.write();
        for store_id in store_ids {
            state.grants.remove(&(staff_id, *store_id));
        }
        Ok(())
    }

    async fn get_customer(&self, customer_id: i64) -> Result<Option<CustomerRecord>, StorageError> {
        Ok(self.state.read().customers.get(&customer_id).cloned())
    }

    async fn upsert_line_customer(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<CustomerRecord, StorageError> {
        let mut state = self.state.write();

        let existing = state
            .customers
            .values()
            .find(|c| c.line_uid.as_deref() == Some(identity.provider_uid.as_str()))
            .map(|c| c.id);

        let id = match existing {
            Some(id) => id,
            None => state.next_id(),
        };

        let previous_email = state.customers.get(&id).and_then(|c| c.email.clone());
        let record = CustomerRecord {
            id,
            line_uid: Some(identity.provider_uid.clone()),
            name: identity.name.clone(),
            email: identity.email.clone().or(previous_email),
        };
        state.customers.insert(id, record.clone());
        Ok(record)
    }
}

/// Key-value entries with expiry, process-local
///
/// Uses tokio's clock so paused-time tests can advance past TTLs.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.value().1 > now => Some(entry.value().0.clone()),
            _ => None,
        };
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StorageError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check-and-set is atomic
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().1 > now {
                    Ok(false)
                } else {
                    slot.insert((value, now + ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((value, now + ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
