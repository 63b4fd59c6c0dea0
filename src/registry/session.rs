use super::ShardedWorkRegistry;
use crate::core::{Result, ShardIndex, ShardSessionRecord, WorkerId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Exclusive right of one worker to process one shard.
///
/// Obtained from [`ShardedWorkRegistry::pick_up`]. Call
/// [`complete`](Self::complete) when done; a session that is simply dropped
/// keeps the shard claimed until the registry expires it.
pub struct ShardProcessingSession {
    record: ShardSessionRecord,
    worker: WorkerId,
    registry: ShardedWorkRegistry,
}

impl ShardProcessingSession {
    pub(crate) fn new(
        record: ShardSessionRecord,
        worker: WorkerId,
        registry: ShardedWorkRegistry,
    ) -> Self {
        Self {
            record,
            worker,
            registry,
        }
    }

    pub fn index(&self) -> ShardIndex {
        self.record.index
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn picked_at(&self) -> Option<DateTime<Utc>> {
        self.record.when_last_picked
    }

    /// The record as it was committed when the shard was picked up
    pub fn record(&self) -> &ShardSessionRecord {
        &self.record
    }

    /// Release the shard.
    ///
    /// Returns `false` if the shard was no longer held by this session's
    /// worker, e.g. because it expired and was picked up by someone else.
    pub async fn complete(self) -> Result<bool> {
        self.registry.clear_node(&self).await
    }
}

impl fmt::Debug for ShardProcessingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardProcessingSession")
            .field("index", &self.record.index)
            .field("worker", &self.worker)
            .field("picked_at", &self.record.when_last_picked)
            .finish()
    }
}
