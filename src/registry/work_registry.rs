use super::operation::{ClaimIfFree, ReleaseExpired, ReleaseWorker};
use super::session::ShardProcessingSession;
use super::session_storage::{SessionStorage, UpdateOutcome};
use crate::config::RegistryConfig;
use crate::core::{
    Clock, NodeId, RegistryError, Result, ShardIndex, ShardSessionRecord, SystemClock, WorkerId,
};
use crate::storage::TransactionalStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, Level, event, info_span};

/// Coordinates which worker processes which shard.
///
/// Shards are claimed optimistically: a pick-up reads the shard's session
/// record, claims it if free, and commits; if another node commits first the
/// pick-up simply yields nothing. Within one process, pick-ups and releases
/// of all clones of a registry are serialized by a shared lock.
#[derive(Clone)]
pub struct ShardedWorkRegistry {
    storage: Arc<SessionStorage>,
    clock: Arc<dyn Clock>,
    lock: Arc<Mutex<()>>,
    session_expiry: Duration,
}

impl ShardedWorkRegistry {
    pub fn new(store: Arc<dyn TransactionalStore>, config: RegistryConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn TransactionalStore>,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage: Arc::new(SessionStorage::new(store, &config)),
            clock,
            lock: Arc::new(Mutex::new(())),
            session_expiry: config.session_expiry,
        })
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Configured inactivity period used by [`release_expired`](Self::release_expired).
    pub fn session_expiry(&self) -> Duration {
        self.session_expiry
    }

    /// Try to claim `index` for the calling thread of `node`.
    ///
    /// `None` means the shard is already being processed elsewhere.
    pub async fn pick_up(
        &self,
        index: ShardIndex,
        node: &NodeId,
    ) -> Result<Option<ShardProcessingSession>> {
        let worker = WorkerId::current(node);
        self.pick_up_as(index, worker).await
    }

    /// Try to claim `index` for an explicitly identified worker.
    pub async fn pick_up_as(
        &self,
        index: ShardIndex,
        worker: WorkerId,
    ) -> Result<Option<ShardProcessingSession>> {
        let span = info_span!("registry.pick_up", shard = %index, worker = %worker);
        async move {
            let _guard = self.lock.lock().await;
            let claim = ClaimIfFree::new(worker.clone(), self.clock.now());
            let outcome = self
                .storage
                .update_transactionally(index, &claim)
                .await
                .inspect_err(|err| event!(Level::ERROR, error = %err, "shard pick-up failed"))?;

            match outcome {
                UpdateOutcome::Updated(record) => {
                    event!(Level::DEBUG, "shard picked up");
                    Ok(Some(ShardProcessingSession::new(record, worker, self.clone())))
                }
                UpdateOutcome::Declined => {
                    event!(Level::DEBUG, "shard is already claimed");
                    Ok(None)
                }
                UpdateOutcome::Conflict => {
                    event!(Level::DEBUG, "shard claimed concurrently by another node");
                    Ok(None)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Release the shard held by `session`.
    ///
    /// Only clears the record while the session's worker still owns it.
    pub async fn clear_node(&self, session: &ShardProcessingSession) -> Result<bool> {
        let index = session.index();
        let worker = session.worker().clone();
        let span = info_span!("registry.release", shard = %index, worker = %worker);
        async move {
            let _guard = self.lock.lock().await;
            let release = ReleaseWorker::owned_by(worker);
            let outcome = self
                .storage
                .update_transactionally(index, &release)
                .await
                .inspect_err(|err| event!(Level::ERROR, error = %err, "shard release failed"))?;

            match outcome {
                UpdateOutcome::Updated(_) => {
                    event!(Level::INFO, "shard released");
                    Ok(true)
                }
                UpdateOutcome::Declined => {
                    event!(Level::WARN, "session no longer owns the shard");
                    Ok(false)
                }
                UpdateOutcome::Conflict => {
                    event!(Level::WARN, "shard release raced with another update");
                    Ok(false)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Free every shard whose worker has not picked it up for longer than
    /// `inactivity`, returning the shards that were freed.
    ///
    /// Each shard is freed in its own transaction. If a backend fault stops
    /// the sweep, the shards freed before it stay free; they are logged but
    /// not returned.
    pub async fn release_expired_sessions(&self, inactivity: Duration) -> Result<Vec<ShardIndex>> {
        let span = info_span!("registry.release_expired", inactivity = ?inactivity);
        async move {
            let _guard = self.lock.lock().await;
            let cutoff = self.cutoff(inactivity)?;
            let expire = ReleaseExpired::new(cutoff);

            let mut released = Vec::new();
            for record in self.storage.all_records().await? {
                if record.is_free() || !record.picked_before(cutoff) {
                    continue;
                }
                let outcome = self
                    .storage
                    .update_transactionally(record.index, &expire)
                    .await
                    .inspect_err(|err| {
                        event!(
                            Level::ERROR,
                            shard = %record.index,
                            released = ?released,
                            error = %err,
                            "session expiry failed, sweep aborted"
                        )
                    })?;
                match outcome {
                    UpdateOutcome::Updated(_) => {
                        if let Some(worker) = &record.worker {
                            event!(Level::INFO, shard = %record.index, worker = %worker, "expired session released");
                        }
                        released.push(record.index);
                    }
                    UpdateOutcome::Declined => {}
                    UpdateOutcome::Conflict => {
                        event!(Level::WARN, shard = %record.index, "session expiry raced with another update");
                    }
                }
            }
            released.sort();
            Ok(released)
        }
        .instrument(span)
        .await
    }

    /// [`release_expired_sessions`](Self::release_expired_sessions) with the
    /// configured session expiry.
    pub async fn release_expired(&self) -> Result<Vec<ShardIndex>> {
        self.release_expired_sessions(self.session_expiry).await
    }

    /// Current record of one shard, `None` if it was never picked up.
    pub async fn find(&self, index: ShardIndex) -> Result<Option<ShardSessionRecord>> {
        self.storage.read(index).await
    }

    /// Every shard session record, in no particular order.
    pub async fn all_records(&self) -> Result<Vec<ShardSessionRecord>> {
        self.storage.all_records().await
    }

    fn cutoff(&self, inactivity: Duration) -> Result<DateTime<Utc>> {
        let inactivity = chrono::Duration::from_std(inactivity).map_err(|e| {
            RegistryError::Config(format!("inactivity period out of range: {}", e))
        })?;
        Ok(self
            .clock
            .now()
            .checked_sub_signed(inactivity)
            .unwrap_or(DateTime::<Utc>::MIN_UTC))
    }
}
