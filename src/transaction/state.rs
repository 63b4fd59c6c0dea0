// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through defined states: Active -> Committed/Aborted
//
// Optimistic concurrency control:
// - Every read records the version of the record it observed
// - Writes are buffered and invisible to other transactions
// - At commit the store re-checks the observed versions; any mismatch
//   aborts the transaction with a conflict
//
// ============================================================================

use super::Change;
use crate::core::{StoreError, StoreResult};
use crate::storage::RecordKey;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub(crate) fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback/conflict──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Read set and write buffer of one optimistic transaction
#[derive(Debug)]
pub struct Transaction {
    /// Unique transaction identifier
    id: TransactionId,

    /// Current state (Active, Committed, Aborted)
    state: TransactionState,

    /// Version observed for every key read; `None` means "was absent"
    read_versions: HashMap<RecordKey, Option<u64>>,

    /// Buffered writes, applied in order on commit
    changes: Vec<Change>,

    /// Start time, reported when the transaction commits
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            read_versions: HashMap::new(),
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn read_versions(&self) -> &HashMap<RecordKey, Option<u64>> {
        &self.read_versions
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Fail unless the transaction can still execute operations
    pub fn ensure_active(&self) -> StoreResult<()> {
        if !self.state.is_active() {
            return Err(StoreError::TransactionClosed(format!(
                "transaction {} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Remember the version of `key` this transaction observed.
    ///
    /// Only the first observation counts: re-reading a key must not hide a
    /// concurrent modification that happened between the two reads.
    pub fn record_read(&mut self, key: &RecordKey, version: Option<u64>) {
        self.read_versions.entry(key.clone()).or_insert(version);
    }

    /// The transaction's own pending write for `key`, if any.
    ///
    /// `Some(None)` means the key was deleted in this transaction.
    pub fn pending(&self, key: &RecordKey) -> Option<Option<&Value>> {
        self.changes
            .iter()
            .rev()
            .find(|change| change.key() == key)
            .map(Change::value)
    }

    /// Record a change in this transaction
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_change(&mut self, change: Change) -> StoreResult<()> {
        self.ensure_active()?;
        self.changes.push(change);
        Ok(())
    }

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn commit(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard changes
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.changes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
