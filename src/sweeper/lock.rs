//! Cross-process mutual exclusion on top of `KvStore`

use crate::storage::{KvStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const LOCK_VALUE: &[u8] = b"locked";

/// Proof of a held lock
///
/// Dropping it without `release` leaves the key in place until its TTL runs out.
#[derive(Debug)]
#[must_use = "a lock guard should be released"]
pub struct LockGuard {
    key: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Named, TTL-bounded lock shared by every instance using the same `KvStore`
#[derive(Clone)]
pub struct DistributedLock {
    kv: Arc<dyn KvStore>,
}

impl DistributedLock {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn key_for(job_name: &str) -> String {
        format!("{}_lock", job_name)
    }

    /// Take the lock for `job_name` unless another holder has it
    pub async fn try_acquire(
        &self,
        job_name: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, StorageError> {
        let key = Self::key_for(job_name);
        if self.kv.set_if_absent(&key, LOCK_VALUE.to_vec(), ttl).await? {
            debug!(key = %key, ttl_secs = ttl.as_secs(), "Lock acquired");
            Ok(Some(LockGuard { key }))
        } else {
            Ok(None)
        }
    }

    pub async fn release(&self, guard: LockGuard) -> Result<(), StorageError> {
        self.kv.delete(&guard.key).await?;
        debug!(key = %guard.key, "Lock released");
        Ok(())
    }
}
