use super::operation::UpdateOperation;
use crate::config::RegistryConfig;
use crate::core::{RegistryError, Result, ShardIndex, ShardSessionRecord};
use crate::storage::{RecordKey, StoreTransaction, StoredRecord, TransactionalStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Level, event};

/// Result of a transactional read-decide-write on one session record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The operation produced a new record and it was committed
    Updated(ShardSessionRecord),
    /// The operation declined to change the record
    Declined,
    /// Another transaction modified the record first
    Conflict,
}

impl UpdateOutcome {
    pub fn into_record(self) -> Option<ShardSessionRecord> {
        match self {
            UpdateOutcome::Updated(record) => Some(record),
            UpdateOutcome::Declined | UpdateOutcome::Conflict => None,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }
}

/// Durable store of shard session records, one per shard index.
///
/// Every call runs in its own backend transaction; nothing is cached.
pub struct SessionStorage {
    store: Arc<dyn TransactionalStore>,
    namespace: String,
    kind: String,
}

impl SessionStorage {
    pub fn new(store: Arc<dyn TransactionalStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            kind: config.kind.clone(),
        }
    }

    pub fn key_for(&self, index: ShardIndex) -> RecordKey {
        RecordKey::new(self.namespace.as_str(), self.kind.as_str(), index.key_name())
    }

    /// Read the record of `index`, `None` if the shard was never picked.
    pub async fn read(&self, index: ShardIndex) -> Result<Option<ShardSessionRecord>> {
        let key = self.key_for(index);
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| RegistryError::storage("read", index, e))?;

        let value = match tx.get(&key).await {
            Ok(value) => value,
            Err(err) => {
                abandon(tx).await;
                return Err(RegistryError::storage("read", index, err));
            }
        };
        abandon(tx).await;

        value.map(|value| decode(index, value)).transpose()
    }

    /// Create or overwrite the record of `record.index`.
    pub async fn write(&self, record: &ShardSessionRecord) -> Result<()> {
        let index = record.index;
        let value = encode(record)?;
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| RegistryError::storage("write", index, e))?;

        if let Err(err) = tx.put(self.key_for(index), value).await {
            abandon(tx).await;
            return Err(RegistryError::storage("write", index, err));
        }
        tx.commit().await.map_err(|err| {
            event!(Level::ERROR, shard = %index, error = %err, "session record write failed");
            RegistryError::storage("write", index, err)
        })
    }

    /// Read, decide and write the record of `index` in one transaction.
    ///
    /// A conflict reported by the backend is an expected outcome, not an
    /// error. Any other backend failure is returned with the shard index.
    pub async fn update_transactionally(
        &self,
        index: ShardIndex,
        operation: &dyn UpdateOperation,
    ) -> Result<UpdateOutcome> {
        let name = operation.name();
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| RegistryError::storage(name, index, e))?;

        let decided = match self.decide(tx.as_mut(), index, operation).await {
            Ok(decided) => decided,
            Err(RegistryError::Storage { source, .. }) if source.is_conflict() => {
                abandon(tx).await;
                event!(Level::WARN, shard = %index, operation = name, error = %source, "session update conflicted");
                return Ok(UpdateOutcome::Conflict);
            }
            Err(err) => {
                abandon(tx).await;
                return Err(err);
            }
        };

        match tx.commit().await {
            Ok(()) => Ok(match decided {
                Some(record) => UpdateOutcome::Updated(record),
                None => UpdateOutcome::Declined,
            }),
            Err(err) if err.is_conflict() => {
                event!(Level::WARN, shard = %index, operation = name, error = %err, "session update conflicted");
                Ok(UpdateOutcome::Conflict)
            }
            Err(err) => {
                event!(Level::ERROR, shard = %index, operation = name, error = %err, "session update failed");
                Err(RegistryError::storage(name, index, err))
            }
        }
    }

    /// Every stored session record, in no particular order.
    pub async fn all_records(&self) -> Result<Vec<ShardSessionRecord>> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| RegistryError::scan("scan", e))?;
        let scanned = match tx.scan(&self.namespace, &self.kind).await {
            Ok(scanned) => scanned,
            Err(err) => {
                abandon(tx).await;
                return Err(RegistryError::scan("scan", err));
            }
        };
        abandon(tx).await;

        scanned.into_iter().map(decode_stored).collect()
    }

    async fn decide(
        &self,
        tx: &mut dyn StoreTransaction,
        index: ShardIndex,
        operation: &dyn UpdateOperation,
    ) -> Result<Option<ShardSessionRecord>> {
        let name = operation.name();
        let key = self.key_for(index);
        let previous = tx
            .get(&key)
            .await
            .map_err(|e| RegistryError::storage(name, index, e))?
            .map(|value| decode(index, value))
            .transpose()?;

        let Some(updated) = operation.apply(index, previous.as_ref()) else {
            return Ok(None);
        };
        tx.put(key, encode(&updated)?)
            .await
            .map_err(|e| RegistryError::storage(name, index, e))?;
        Ok(Some(updated))
    }
}

/// Close a transaction that must not apply anything.
async fn abandon(tx: Box<dyn StoreTransaction>) {
    let txn_id = tx.id();
    if let Err(err) = tx.rollback().await {
        event!(Level::WARN, txn = %txn_id, error = %err, "rollback failed");
    }
}

fn encode(record: &ShardSessionRecord) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| RegistryError::Codec(format!("shard {}: {}", record.index, e)))
}

fn decode_stored(stored: StoredRecord) -> Result<ShardSessionRecord> {
    let record: ShardSessionRecord = serde_json::from_value(stored.value)
        .map_err(|e| RegistryError::Codec(format!("record {}: {}", stored.key, e)))?;
    if record.index.key_name() != stored.key.name {
        return Err(RegistryError::Codec(format!(
            "record {} describes shard {}",
            stored.key, record.index
        )));
    }
    Ok(record)
}

fn decode(index: ShardIndex, value: Value) -> Result<ShardSessionRecord> {
    let record: ShardSessionRecord = serde_json::from_value(value)
        .map_err(|e| RegistryError::Codec(format!("shard {}: {}", index, e)))?;
    if record.index != index {
        return Err(RegistryError::Codec(format!(
            "record stored for shard {} describes shard {}",
            index, record.index
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeId, WorkerId};
    use crate::registry::operation::{ClaimIfFree, ReleaseWorker};
    use crate::storage::InMemoryStore;
    use chrono::Utc;
    use serde_json::json;

    fn storage_over(store: &InMemoryStore) -> SessionStorage {
        SessionStorage::new(Arc::new(store.clone()), &RegistryConfig::default())
    }

    fn worker(node: &str) -> WorkerId {
        WorkerId::new(NodeId::new(node).unwrap(), "1").unwrap()
    }

    #[tokio::test]
    async fn test_read_absent_record() {
        let storage = storage_over(&InMemoryStore::new());
        let index = ShardIndex::new(0, 2).unwrap();
        assert_eq!(storage.read(index).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_declined_update_writes_nothing() {
        let store = InMemoryStore::new();
        let storage = storage_over(&store);
        let index = ShardIndex::new(0, 2).unwrap();

        let outcome = storage
            .update_transactionally(index, &ReleaseWorker::any_owner())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Declined);
        assert_eq!(store.record_count().await, 0);
        assert_eq!(store.stats().committed, 1);
    }

    #[tokio::test]
    async fn test_update_outcome_carries_written_record() {
        let storage = storage_over(&InMemoryStore::new());
        let index = ShardIndex::new(1, 2).unwrap();

        let outcome = storage
            .update_transactionally(index, &ClaimIfFree::new(worker("node-a"), Utc::now()))
            .await
            .unwrap();
        assert!(outcome.is_updated());
        let record = outcome.into_record().unwrap();
        assert_eq!(storage.read(index).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = InMemoryStore::new();
        let tenant_a = SessionStorage::new(
            Arc::new(store.clone()),
            &RegistryConfig::new().namespace("tenant-a"),
        );
        let tenant_b = SessionStorage::new(
            Arc::new(store.clone()),
            &RegistryConfig::new().namespace("tenant-b"),
        );
        let index = ShardIndex::new(0, 1).unwrap();

        tenant_a
            .update_transactionally(index, &ClaimIfFree::new(worker("node-a"), Utc::now()))
            .await
            .unwrap();

        assert!(tenant_b.read(index).await.unwrap().is_none());
        assert!(tenant_b.all_records().await.unwrap().is_empty());
        assert_eq!(tenant_a.all_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_a_codec_error() {
        let store = InMemoryStore::new();
        let storage = storage_over(&store);
        let index = ShardIndex::new(0, 1).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.put(storage.key_for(index), json!({"worker": 42}))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(
            storage.read(index).await,
            Err(RegistryError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_record_under_wrong_key_is_rejected() {
        let store = InMemoryStore::new();
        let storage = storage_over(&store);
        let stored_under = ShardIndex::new(0, 2).unwrap();
        let described = ShardIndex::new(1, 2).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.put(
            storage.key_for(stored_under),
            serde_json::to_value(ShardSessionRecord::new(described)).unwrap(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(
            storage.read(stored_under).await,
            Err(RegistryError::Codec(_))
        ));
        assert!(matches!(
            storage.all_records().await,
            Err(RegistryError::Codec(_))
        ));
    }
}
