use super::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One shard of a partition space of `of_total` shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardIndex {
    index: u32,
    of_total: u32,
}

impl ShardIndex {
    pub fn new(index: u32, of_total: u32) -> Result<Self> {
        if of_total == 0 {
            return Err(RegistryError::InvalidShardIndex(
                "shard count must be positive".to_string(),
            ));
        }
        if index >= of_total {
            return Err(RegistryError::InvalidShardIndex(format!(
                "index {} is out of range for {} shards",
                index, of_total
            )));
        }
        Ok(Self { index, of_total })
    }

    /// All shards of a partition space, in index order.
    pub fn all(of_total: u32) -> Result<Vec<Self>> {
        (0..of_total).map(|index| Self::new(index, of_total)).collect()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn of_total(&self) -> u32 {
        self.of_total
    }

    /// Name of the backend record holding this shard's session.
    pub fn key_name(&self) -> String {
        format!("{}-of-{}", self.index, self.of_total)
    }
}

impl fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.of_total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    value: String,
}

impl NodeId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(RegistryError::InvalidIdentifier(
                "node id must not be empty".to_string(),
            ));
        }
        Ok(Self { value })
    }

    /// A fresh random node identity.
    pub fn generate() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A worker on a particular node: the node plus a worker-local discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId {
    node_id: NodeId,
    value: String,
}

impl WorkerId {
    pub fn new(node_id: NodeId, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(RegistryError::InvalidIdentifier(
                "worker id must not be empty".to_string(),
            ));
        }
        Ok(Self { node_id, value })
    }

    /// The worker identity of the calling thread on `node_id`.
    pub fn current(node_id: &NodeId) -> Self {
        let thread_id = format!("{:?}", std::thread::current().id());
        Self {
            node_id: node_id.clone(),
            value: thread_id,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.value)
    }
}

/// Persisted processing state of one shard.
///
/// A record without a worker is free; a record with a worker is claimed by
/// it until released or expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSessionRecord {
    pub index: ShardIndex,
    #[serde(default)]
    pub worker: Option<WorkerId>,
    #[serde(default)]
    pub when_last_picked: Option<DateTime<Utc>>,
}

impl ShardSessionRecord {
    pub fn new(index: ShardIndex) -> Self {
        Self {
            index,
            worker: None,
            when_last_picked: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.worker.is_none()
    }

    pub fn is_claimed_by(&self, worker: &WorkerId) -> bool {
        self.worker.as_ref() == Some(worker)
    }

    /// True if the shard was last picked strictly before `cutoff`.
    ///
    /// A record that was never picked has nothing to compare and is not
    /// considered stale.
    pub fn picked_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.when_last_picked.is_some_and(|picked| picked < cutoff)
    }
}
