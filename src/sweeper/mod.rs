//! Revoked/expired refresh-session sweeper
//!
//! One run takes the job lock, then for each principal kind counts sweepable
//! rows and deletes them in fixed-size batches with a pause in between. Runs
//! on other instances that find the lock held are skipped. When given a
//! `KvStore`, the run also drops its expired cache and lock entries. Errors
//! are logged and reported, never returned.

mod lock;

pub use lock::{DistributedLock, LockGuard};

use crate::auth::PrincipalKind;
use crate::storage::{KvStore, SessionStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_JOB_NAME: &str = "revoked_token_sweeper";

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Lock key is `<job_name>_lock`
    pub job_name: String,
    pub batch_size: u32,
    pub batch_pause: Duration,
    /// Upper bound on how long a crashed holder blocks other instances
    pub lock_ttl: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            batch_size: 200,
            batch_pause: Duration::from_millis(100),
            lock_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Result of sweeping one principal kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSweep {
    pub kind: PrincipalKind,
    /// Sweepable rows counted at the start
    pub found: u64,
    pub deleted: u64,
    pub batches: u32,
    pub error: Option<String>,
}

impl KindSweep {
    fn new(kind: PrincipalKind) -> Self {
        Self {
            kind,
            found: 0,
            deleted: 0,
            batches: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub kinds: Vec<KindSweep>,
    /// Expired key-value entries dropped
    pub kv_purged: u64,
}

impl SweepReport {
    pub fn total_deleted(&self) -> u64 {
        self.kinds.iter().map(|k| k.deleted).sum()
    }

    pub fn for_kind(&self, kind: PrincipalKind) -> Option<&KindSweep> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.kinds.iter().any(|k| k.error.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Lock held elsewhere, or the lock backend was unreachable
    Skipped,
    Completed(SweepReport),
}

pub struct RevocationSweeper {
    sessions: Arc<dyn SessionStore>,
    lock: DistributedLock,
    config: SweeperConfig,
    kv_purge: Option<Arc<dyn KvStore>>,
}

impl RevocationSweeper {
    pub fn new(sessions: Arc<dyn SessionStore>, lock: DistributedLock, config: SweeperConfig) -> Self {
        Self {
            sessions,
            lock,
            config,
            kv_purge: None,
        }
    }

    /// Also purge expired entries from `kv` on every run
    pub fn with_kv_purge(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv_purge = Some(kv);
        self
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    pub async fn run_once(&self) -> SweepOutcome {
        let job = self.config.job_name.as_str();

        let guard = match self.lock.try_acquire(job, self.config.lock_ttl).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(job, "Sweep skipped, lock held by another instance");
                return SweepOutcome::Skipped;
            }
            Err(e) => {
                warn!(job, error = %e, "Sweep skipped, lock backend unavailable");
                return SweepOutcome::Skipped;
            }
        };

        let started = Instant::now();
        info!(job, batch_size = self.config.batch_size, "Sweep started");

        let mut report = SweepReport::default();
        for kind in PrincipalKind::ALL {
            report.kinds.push(self.sweep_kind(kind).await);
        }

        if let Some(kv) = &self.kv_purge {
            match kv.purge_expired().await {
                Ok(n) => {
                    report.kv_purged = n;
                    debug!(job, purged = n, "Expired key-value entries purged");
                }
                Err(e) => warn!(job, error = %e, "Failed to purge expired key-value entries"),
            }
        }

        if let Err(e) = self.lock.release(guard).await {
            warn!(job, error = %e, "Failed to release sweep lock; it will expire on its own");
        }

        info!(
            job,
            deleted = report.total_deleted(),
            kv_purged = report.kv_purged,
            errors = report.has_errors(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sweep finished"
        );
        SweepOutcome::Completed(report)
    }

    async fn sweep_kind(&self, kind: PrincipalKind) -> KindSweep {
        let mut result = KindSweep::new(kind);

        let found = match self.sessions.count_sweepable(kind).await {
            Ok(n) => n,
            Err(e) => {
                error!(kind = %kind, error = %e, "Failed to count sweepable sessions");
                result.error = Some(e.to_string());
                return result;
            }
        };
        result.found = found;
        if found == 0 {
            debug!(kind = %kind, "Nothing to sweep");
            return result;
        }

        let mut remaining = found;
        while remaining > 0 {
            let deleted = match self
                .sessions
                .delete_sweepable_batch(kind, self.config.batch_size)
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    error!(kind = %kind, deleted = result.deleted, error = %e, "Sweep batch failed");
                    result.error = Some(e.to_string());
                    break;
                }
            };

            // Someone else got there first
            if deleted == 0 {
                break;
            }

            result.batches += 1;
            result.deleted += deleted;
            remaining = remaining.saturating_sub(deleted);
            debug!(kind = %kind, batch = result.batches, deleted, remaining, "Sweep batch done");

            if remaining > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        info!(kind = %kind, found, deleted = result.deleted, batches = result.batches, "Swept sessions");
        result
    }

    /// Run `run_once` every `interval` until `shutdown` flips to true
    ///
    /// The first run happens one interval after spawning. A run in progress
    /// finishes before shutdown is observed.
    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval() fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(job = %self.config.job_name, "Sweeper stopped");
        })
    }
}
