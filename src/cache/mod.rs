//! Read-through cache of authorization contexts
//!
//! Entries live in the shared `KvStore` under `auth_ctx:<kind>:<id>` as JSON.
//! The cache is advisory: a broken backend or an undecodable entry degrades to
//! a directory read, never to a failed request.

use crate::auth::{AuthorizationContext, PrincipalKind, StoreList};
use crate::error::AuthError;
use crate::storage::{KvStore, PrincipalDirectory, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "auth_ctx";

pub struct ContextCache {
    kv: Arc<dyn KvStore>,
    directory: Arc<dyn PrincipalDirectory>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(kv: Arc<dyn KvStore>, directory: Arc<dyn PrincipalDirectory>, ttl: Duration) -> Self {
        Self { kv, directory, ttl }
    }

    pub fn key_for(kind: PrincipalKind, principal_id: i64) -> String {
        format!("{}:{}:{}", KEY_PREFIX, kind, principal_id)
    }

    /// Default entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached context, if a decodable one exists
    pub async fn get(&self, kind: PrincipalKind, principal_id: i64) -> Option<AuthorizationContext> {
        let key = Self::key_for(kind, principal_id);

        let raw = match self.kv.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Context cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<AuthorizationContext>(&raw) {
            Ok(context) if context.is(kind, principal_id) => Some(context),
            Ok(_) | Err(_) => {
                warn!(key = %key, "Dropping corrupt context cache entry");
                if let Err(e) = self.kv.delete(&key).await {
                    warn!(key = %key, error = %e, "Failed to delete corrupt cache entry");
                }
                None
            }
        }
    }

    pub async fn set(
        &self,
        kind: PrincipalKind,
        principal_id: i64,
        context: &AuthorizationContext,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let value =
            serde_json::to_vec(context).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.kv
            .set(&Self::key_for(kind, principal_id), value, ttl)
            .await
    }

    /// Cache `context` under its own principal with the default TTL; failures are logged
    pub async fn prime(&self, context: &AuthorizationContext) {
        if let Err(e) = self
            .set(context.kind, context.principal_id, context, self.ttl)
            .await
        {
            warn!(
                kind = %context.kind,
                principal_id = context.principal_id,
                error = %e,
                "Failed to populate context cache"
            );
        }
    }

    pub async fn invalidate(&self, kind: PrincipalKind, principal_id: i64) -> Result<(), StorageError> {
        self.kv.delete(&Self::key_for(kind, principal_id)).await?;
        debug!(kind = %kind, principal_id, "Invalidated cached context");
        Ok(())
    }

    /// Cached context, or one rebuilt from the directory and written back
    pub async fn resolve(
        &self,
        kind: PrincipalKind,
        principal_id: i64,
    ) -> Result<AuthorizationContext, AuthError> {
        if let Some(context) = self.get(kind, principal_id).await {
            return Ok(context);
        }

        let context = self.load(kind, principal_id).await?;
        self.prime(&context).await;
        Ok(context)
    }

    /// Build a context straight from the directory, bypassing the cache
    ///
    /// Missing and deactivated principals fail with `PrincipalNotFound`.
    pub async fn load(
        &self,
        kind: PrincipalKind,
        principal_id: i64,
    ) -> Result<AuthorizationContext, AuthError> {
        match kind {
            PrincipalKind::Staff => {
                let staff = self
                    .directory
                    .get_staff(principal_id)
                    .await?
                    .filter(|s| s.is_active)
                    .ok_or(AuthError::PrincipalNotFound)?;

                let store_list = self
                    .directory
                    .staff_store_list(staff.id, staff.role)
                    .await?;

                Ok(AuthorizationContext {
                    principal_id: staff.id,
                    kind,
                    username: staff.username,
                    role: Some(staff.role),
                    store_list,
                })
            }
            PrincipalKind::Customer => {
                let customer = self
                    .directory
                    .get_customer(principal_id)
                    .await?
                    .ok_or(AuthError::PrincipalNotFound)?;

                Ok(AuthorizationContext {
                    principal_id: customer.id,
                    kind,
                    username: customer.name,
                    role: None,
                    store_list: StoreList::new(),
                })
            }
        }
    }
}
