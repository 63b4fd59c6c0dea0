// ============================================================================
// shardwork Library
// ============================================================================

pub mod config;
pub mod core;
pub mod registry;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use config::{RegistryConfig, StoreConfig};
pub use core::{
    Clock, ManualClock, NodeId, RegistryError, Result, ShardIndex, ShardSessionRecord,
    StoreError, StoreResult, SystemClock, WorkerId,
};
pub use registry::{
    SessionStorage, ShardProcessingSession, ShardedWorkRegistry, UpdateOperation, UpdateOutcome,
};
pub use storage::{InMemoryStore, RecordKey, StoreTransaction, StoredRecord, TransactionalStore};
pub use transaction::{TransactionId, TransactionStats};

/// Open the store described by `store_url` and a work registry over it.
///
/// The store handle is returned as well so callers can snapshot it or share
/// it with further registries.
///
/// # Examples
///
/// ```
/// use shardwork::{NodeId, RegistryConfig, ShardIndex};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (_store, registry) = shardwork::open("memory://", RegistryConfig::default()).await?;
/// let node = NodeId::new("node-a")?;
/// let shard = ShardIndex::new(0, 4)?;
///
/// let session = registry.pick_up(shard, &node).await?.expect("shard is free");
/// assert!(registry.pick_up(shard, &NodeId::new("node-b")?).await?.is_none());
///
/// session.complete().await?;
/// assert!(registry.find(shard).await?.unwrap().is_free());
/// # Ok(())
/// # }
/// ```
pub async fn open(
    store_url: &str,
    config: RegistryConfig,
) -> Result<(InMemoryStore, ShardedWorkRegistry)> {
    let store = StoreConfig::from_url(store_url)?.open().await?;
    let registry = ShardedWorkRegistry::new(std::sync::Arc::new(store.clone()), config)?;
    Ok((store, registry))
}
