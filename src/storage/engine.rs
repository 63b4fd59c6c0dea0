use crate::core::StoreResult;
use crate::transaction::TransactionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Address of a record in a transactional store.
///
/// Records are grouped by `namespace` (tenant) and `kind`, and identified by
/// `name` within the group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn belongs_to(&self, namespace: &str, kind: &str) -> bool {
        self.namespace == namespace && self.kind == kind
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}:{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}:{}", self.namespace, self.kind, self.name)
        }
    }
}

/// A record returned by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordKey,
    pub value: Value,
}

/// Backend contract - a key/value store with serializable transactions.
///
/// Implementations must report a commit invalidated by a concurrent
/// modification as `StoreError::Conflict`, and only that.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Open a new read-write transaction
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// One open transaction.
///
/// Dropping the handle without committing discards every buffered write.
#[async_trait]
pub trait StoreTransaction: Send {
    fn id(&self) -> TransactionId;

    /// Read a record, `None` if it does not exist
    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Value>>;

    /// Create or overwrite a record
    async fn put(&mut self, key: RecordKey, value: Value) -> StoreResult<()>;

    /// Remove a record; removing an absent record is not an error
    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()>;

    /// Read every record of one kind in one namespace
    async fn scan(&mut self, namespace: &str, kind: &str) -> StoreResult<Vec<StoredRecord>>;

    /// Make the buffered writes visible atomically
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard the buffered writes
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_display_and_grouping() {
        let plain = RecordKey::new("", "shard_session", "0-of-4");
        assert_eq!(plain.to_string(), "shard_session:0-of-4");
        assert!(plain.belongs_to("", "shard_session"));
        assert!(!plain.belongs_to("tenant-a", "shard_session"));

        let tenant = RecordKey::new("tenant-a", "shard_session", "0-of-4");
        assert_eq!(tenant.to_string(), "tenant-a/shard_session:0-of-4");
    }
}
