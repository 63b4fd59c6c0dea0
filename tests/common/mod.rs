#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use shardwork::{
    InMemoryStore, NodeId, RecordKey, ShardIndex, ShardSessionRecord, StoreError, StoreResult,
    StoreTransaction, StoredRecord, TransactionId, TransactionalStore, WorkerId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn worker(node: &str, thread: &str) -> WorkerId {
    WorkerId::new(NodeId::new(node).unwrap(), thread).unwrap()
}

pub fn shard(index: u32, of_total: u32) -> ShardIndex {
    ShardIndex::new(index, of_total).unwrap()
}

/// Store operation at which [`FaultyStore`] fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    Get,
    Put,
    Scan,
    Commit,
}

/// Wraps an in-memory store and fails one kind of operation while armed.
#[derive(Clone)]
pub struct FaultyStore {
    inner: InMemoryStore,
    point: FaultPoint,
    error: StoreError,
    armed: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new(inner: InMemoryStore, point: FaultPoint, error: StoreError) -> Self {
        Self {
            inner,
            point,
            error,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn check(&self, point: FaultPoint) -> StoreResult<()> {
        if self.point == point && self.armed.load(Ordering::SeqCst) {
            return Err(self.error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for FaultyStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.check(FaultPoint::Begin)?;
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin().await?,
            store: self.clone(),
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn StoreTransaction>,
    store: FaultyStore,
}

#[async_trait]
impl StoreTransaction for FaultyTransaction {
    fn id(&self) -> TransactionId {
        self.inner.id()
    }

    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Value>> {
        self.store.check(FaultPoint::Get)?;
        self.inner.get(key).await
    }

    async fn put(&mut self, key: RecordKey, value: Value) -> StoreResult<()> {
        self.store.check(FaultPoint::Put)?;
        self.inner.put(key, value).await
    }

    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn scan(&mut self, namespace: &str, kind: &str) -> StoreResult<Vec<StoredRecord>> {
        self.store.check(FaultPoint::Scan)?;
        self.inner.scan(namespace, kind).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.store.check(FaultPoint::Commit)?;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

/// Wraps an in-memory store so that the next commit loses a race.
///
/// Right before that commit, every key the transaction read is overwritten
/// with `competing` by a separate transaction, the way another node would.
#[derive(Clone)]
pub struct InterferingStore {
    inner: InMemoryStore,
    competing: Value,
    pending: Arc<AtomicBool>,
}

impl InterferingStore {
    pub fn new(inner: InMemoryStore, competing: Value) -> Self {
        Self {
            inner,
            competing,
            pending: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Interferes with the commit of a claim made by `winner`.
    pub fn claimed_by(inner: InMemoryStore, winner: WorkerId, index: ShardIndex) -> Self {
        let mut record = ShardSessionRecord::new(index);
        record.worker = Some(winner);
        record.when_last_picked = Some(chrono::Utc::now());
        Self::new(inner, serde_json::to_value(record).unwrap())
    }

    pub fn has_interfered(&self) -> bool {
        !self.pending.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionalStore for InterferingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(InterferingTransaction {
            inner: self.inner.begin().await?,
            store: self.clone(),
            read_keys: Vec::new(),
        }))
    }
}

struct InterferingTransaction {
    inner: Box<dyn StoreTransaction>,
    store: InterferingStore,
    read_keys: Vec<RecordKey>,
}

#[async_trait]
impl StoreTransaction for InterferingTransaction {
    fn id(&self) -> TransactionId {
        self.inner.id()
    }

    async fn get(&mut self, key: &RecordKey) -> StoreResult<Option<Value>> {
        self.read_keys.push(key.clone());
        self.inner.get(key).await
    }

    async fn put(&mut self, key: RecordKey, value: Value) -> StoreResult<()> {
        self.inner.put(key, value).await
    }

    async fn delete(&mut self, key: &RecordKey) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn scan(&mut self, namespace: &str, kind: &str) -> StoreResult<Vec<StoredRecord>> {
        self.inner.scan(namespace, kind).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if !self.read_keys.is_empty() && self.store.pending.swap(false, Ordering::SeqCst) {
            let mut rival = self.store.inner.begin().await?;
            for key in &self.read_keys {
                rival.put(key.clone(), self.store.competing.clone()).await?;
            }
            rival.commit().await?;
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
