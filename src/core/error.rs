use super::ShardIndex;
use thiserror::Error;

/// Failures reported by a transactional backend.
///
/// `Conflict` is the optimistic-concurrency signal: another transaction
/// modified something this transaction read before it could commit. Every
/// other variant is a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Transaction closed: {0}")]
    TransactionClosed(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid shard index: {0}")]
    InvalidShardIndex(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Failed to {operation} session of shard {index}: {source}")]
    Storage {
        operation: &'static str,
        index: ShardIndex,
        #[source]
        source: StoreError,
    },

    #[error("Failed to {operation} shard sessions: {source}")]
    Scan {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Malformed shard session record: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    pub(crate) fn storage(operation: &'static str, index: ShardIndex, source: StoreError) -> Self {
        Self::Storage {
            operation,
            index,
            source,
        }
    }

    pub(crate) fn scan(operation: &'static str, source: StoreError) -> Self {
        Self::Scan { operation, source }
    }

    /// Shard the failed operation was working on, if known.
    pub fn shard_index(&self) -> Option<ShardIndex> {
        match self {
            RegistryError::Storage { index, .. } => Some(*index),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Result type of the backend contract.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_names_operation_and_shard() {
        let index = ShardIndex::new(3, 8).unwrap();
        let err = RegistryError::storage(
            "update",
            index,
            StoreError::Unavailable("connection reset".into()),
        );
        assert_eq!(
            err.to_string(),
            "Failed to update session of shard 3/8: Backend unavailable: connection reset"
        );
        assert_eq!(err.shard_index(), Some(index));
    }

    #[test]
    fn test_scan_error_names_operation() {
        let err = RegistryError::scan("scan", StoreError::Unavailable("down".into()));
        assert_eq!(
            err.to_string(),
            "Failed to scan shard sessions: Backend unavailable: down"
        );
        assert_eq!(err.shard_index(), None);
    }

    #[test]
    fn test_only_conflict_is_conflict() {
        assert!(StoreError::Conflict("k".into()).is_conflict());
        assert!(!StoreError::IoError("disk".into()).is_conflict());
        assert!(!StoreError::TransactionClosed("txn_1".into()).is_conflict());
    }
}
