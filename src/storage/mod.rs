pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::{RecordKey, StoreTransaction, StoredRecord, TransactionalStore};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use persistence::{SnapshotManager, StoreSnapshot};
