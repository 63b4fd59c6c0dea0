use super::persistence::{SnapshotManager, SnapshotRecord, StoreSnapshot};
use super::{RecordKey, StoreTransaction, StoredRecord, TransactionalStore};
use crate::core::{StoreError, StoreResult};
use crate::transaction::{Change, Transaction, TransactionId, TransactionManager, TransactionStats};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};

#[derive(Debug, Clone, PartialEq)]
struct VersionedValue {
    value: Value,
    version: u64,
}

#[derive(Debug, Default)]
struct StoreData {
    records: BTreeMap<RecordKey, VersionedValue>,
    /// Version stamped on the most recent committed write
    last_version: u64,
}

/// Transactional key/value store held in process memory.
///
/// Transactions are optimistic: reads remember the version they saw, writes
/// are buffered, and commit fails with `StoreError::Conflict` if anything the
/// transaction read has been committed over in the meantime. Clones share the
/// same data.
#[derive(Clone)]
pub struct InMemoryStore {
    data: Arc<RwLock<StoreData>>,
    manager: Arc<TransactionManager>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(StoreData::default())),
            manager: Arc::new(TransactionManager::new()),
        }
    }

    /// Open a store from a snapshot file, empty if the file does not exist.
    pub async fn open<P: AsRef<Path>>(snapshot_path: P) -> StoreResult<Self> {
        let store = Self::new();
        if let Some(snapshot) = SnapshotManager::new(snapshot_path).load()? {
            store.restore(snapshot).await;
        }
        Ok(store)
    }

    pub fn stats(&self) -> TransactionStats {
        self.manager.stats()
    }

    pub async fn record_count(&self) -> usize {
        self.data.read().await.records.len()
    }

    /// Committed version of a record, `None` if absent
    pub async fn version_of(&self, key: &RecordKey) -> Option<u64> {
        self.data.read().await.records.get(key).map(|v| v.version)
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let data = self.data.read().await;
        let records = data
            .records
            .iter()
            .map(|(key, versioned)| SnapshotRecord {
                key: key.clone(),
                value: versioned.value.clone(),
                version: versioned.version,
            })
            .collect();
        StoreSnapshot::new(records, data.last_version)
    }

    /// Replace the whole content with a snapshot.
    pub async fn restore(&self, snapshot: StoreSnapshot) {
        let mut data = self.data.write().await;
        let newest = snapshot
            .records
            .iter()
            .map(|r| r.version)
            .max()
            .unwrap_or(0);
        data.records = snapshot
            .records
            .into_iter()
            .map(|r| {
                (
                    r.key,
                    VersionedValue {
                        value: r.value,
                        version: r.version,
                    },
                )
            })
            .collect();
        data.last_version = snapshot.last_version.max(newest);
        event!(
            Level::INFO,
            records = data.records.len(),
            "in-memory store restored from snapshot"
        );
    }

    pub async fn save_to<P: AsRef<Path>>(&self, snapshot_path: P) -> StoreResult<()> {
        let snapshot = self.snapshot().await;
        SnapshotManager::new(snapshot_path).save(&snapshot)
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let txn = self.manager.begin()?;
        Ok(Box::new(InMemoryTransaction {
            txn,
            data: self.data.clone(),
            manager: self.manager.clone(),
        }))
    }
}

pub struct InMemoryTransaction {
    txn: Transaction,
    data: Arc<RwLock<StoreData>>,
    manager: Arc<TransactionManager>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    fn id(&self) -> TransactionId {
        self.txn.id()
    }

    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Value>> {
        self.txn.ensure_active()?;
        if let Some(pending) = self.txn.pending(key) {
            return Ok(pending.cloned());
        }

        let data = self.data.read().await;
        let current = data.records.get(key);
        self.txn.record_read(key, current.map(|v| v.version));
        Ok(current.map(|v| v.value.clone()))
    }

    async fn put(&mut self, key: RecordKey, value: Value) -> StoreResult<()> {
        self.txn.record_change(Change::Put { key, value })
    }

    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()> {
        self.txn.record_change(Change::Delete { key: key.clone() })
    }

    async fn scan(&mut self, namespace: &str, kind: &str) -> StoreResult<Vec<StoredRecord>> {
        self.txn.ensure_active()?;

        let mut found = BTreeMap::new();
        {
            let data = self.data.read().await;
            for (key, versioned) in data
                .records
                .iter()
                .filter(|(key, _)| key.belongs_to(namespace, kind))
            {
                self.txn.record_read(key, Some(versioned.version));
                found.insert(key.clone(), versioned.value.clone());
            }
        }

        // Own writes are visible to the transaction that made them.
        for change in self.txn.changes() {
            if !change.key().belongs_to(namespace, kind) {
                continue;
            }
            match change {
                Change::Put { key, value } => {
                    found.insert(key.clone(), value.clone());
                }
                Change::Delete { key } => {
                    found.remove(key);
                }
            }
        }

        Ok(found
            .into_iter()
            .map(|(key, value)| StoredRecord { key, value })
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.txn.ensure_active()?;

        let mut data = this.data.write().await;
        let stale_key = this
            .txn
            .read_versions()
            .iter()
            .find(|(key, observed)| data.records.get(*key).map(|v| v.version) != **observed)
            .map(|(key, _)| key.clone());

        if let Some(key) = stale_key {
            drop(data);
            this.txn.rollback()?;
            this.manager.finish_conflicted(&this.txn);
            event!(
                Level::DEBUG,
                txn = %this.txn.id(),
                key = %key,
                "in-memory commit rejected"
            );
            return Err(StoreError::Conflict(format!(
                "{} read {} which was modified before commit",
                this.txn.id(),
                key
            )));
        }

        for change in this.txn.changes() {
            data.last_version += 1;
            let version = data.last_version;
            match change {
                Change::Put { key, value } => {
                    data.records.insert(
                        key.clone(),
                        VersionedValue {
                            value: value.clone(),
                            version,
                        },
                    );
                }
                Change::Delete { key } => {
                    data.records.remove(key);
                }
            }
        }
        drop(data);

        this.txn.commit()?;
        this.manager.finish_committed(&this.txn);
        event!(
            Level::TRACE,
            txn = %this.txn.id(),
            changes = this.txn.change_count(),
            elapsed = ?this.txn.duration(),
            "in-memory commit applied"
        );
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.txn.rollback()?;
        this.manager.finish_aborted(&this.txn);
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.txn.state().is_active() && self.txn.rollback().is_ok() {
            self.manager.finish_aborted(&self.txn);
        }
    }
}
