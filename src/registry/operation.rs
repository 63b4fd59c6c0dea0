// ============================================================================
// Conditional Update Operations
// ============================================================================
//
// Pure decisions taken inside a session-record transaction. Each one looks
// at the record as it is now (absent for a never-seen shard) and either
// produces the record to write or declines.
//
// ============================================================================

use crate::core::{ShardIndex, ShardSessionRecord, WorkerId};
use chrono::{DateTime, Utc};

/// Decides the next state of a shard session record.
pub trait UpdateOperation: Send + Sync {
    /// Short verb used in logs and error messages
    fn name(&self) -> &'static str;

    /// `None` declines the update; the transaction then commits nothing.
    fn apply(
        &self,
        index: ShardIndex,
        previous: Option<&ShardSessionRecord>,
    ) -> Option<ShardSessionRecord>;
}

/// Claims the shard for `worker` unless someone already holds it.
#[derive(Debug, Clone)]
pub struct ClaimIfFree {
    worker: WorkerId,
    now: DateTime<Utc>,
}

impl ClaimIfFree {
    pub fn new(worker: WorkerId, now: DateTime<Utc>) -> Self {
        Self { worker, now }
    }
}

impl UpdateOperation for ClaimIfFree {
    fn name(&self) -> &'static str {
        "pick up"
    }

    fn apply(
        &self,
        index: ShardIndex,
        previous: Option<&ShardSessionRecord>,
    ) -> Option<ShardSessionRecord> {
        if previous.is_some_and(|record| !record.is_free()) {
            return None;
        }
        let mut record = previous
            .cloned()
            .unwrap_or_else(|| ShardSessionRecord::new(index));
        record.worker = Some(self.worker.clone());
        record.when_last_picked = Some(self.now);
        Some(record)
    }
}

/// Frees a claimed shard, optionally only if `expected` is the one holding it.
#[derive(Debug, Clone, Default)]
pub struct ReleaseWorker {
    expected: Option<WorkerId>,
}

impl ReleaseWorker {
    pub fn owned_by(worker: WorkerId) -> Self {
        Self {
            expected: Some(worker),
        }
    }

    pub fn any_owner() -> Self {
        Self { expected: None }
    }
}

impl UpdateOperation for ReleaseWorker {
    fn name(&self) -> &'static str {
        "release"
    }

    fn apply(
        &self,
        _index: ShardIndex,
        previous: Option<&ShardSessionRecord>,
    ) -> Option<ShardSessionRecord> {
        let record = previous?;
        let current = record.worker.as_ref()?;
        if let Some(expected) = &self.expected
            && expected != current
        {
            return None;
        }
        let mut released = record.clone();
        released.worker = None;
        Some(released)
    }
}

/// Frees a claimed shard whose last pick-up happened before `cutoff`.
#[derive(Debug, Clone)]
pub struct ReleaseExpired {
    cutoff: DateTime<Utc>,
}

impl ReleaseExpired {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }
}

impl UpdateOperation for ReleaseExpired {
    fn name(&self) -> &'static str {
        "expire"
    }

    fn apply(
        &self,
        _index: ShardIndex,
        previous: Option<&ShardSessionRecord>,
    ) -> Option<ShardSessionRecord> {
        let record = previous?;
        if record.is_free() || !record.picked_before(self.cutoff) {
            return None;
        }
        let mut released = record.clone();
        released.worker = None;
        Some(released)
    }
}
