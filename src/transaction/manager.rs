// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId, TransactionState};
use crate::core::StoreResult;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues transactions and keeps lifecycle counters for one store.
#[derive(Debug, Default)]
pub struct TransactionManager {
    active_ids: Mutex<HashSet<TransactionId>>,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicted: AtomicU64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> StoreResult<Transaction> {
        let transaction_id = TransactionId::new();
        self.active_ids.lock()?.insert(transaction_id);
        self.begun.fetch_add(1, Ordering::Relaxed);
        Ok(Transaction::new(transaction_id))
    }

    pub fn finish_committed(&self, txn: &Transaction) {
        debug_assert_eq!(txn.state(), TransactionState::Committed);
        self.deactivate(txn.id());
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a rollback, an explicit one or an abandoned handle.
    pub fn finish_aborted(&self, txn: &Transaction) {
        self.deactivate(txn.id());
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a commit rejected by version validation.
    pub fn finish_conflicted(&self, txn: &Transaction) {
        self.deactivate(txn.id());
        self.aborted.fetch_add(1, Ordering::Relaxed);
        self.conflicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransactionStats {
        let active = self.active_ids.lock().map(|ids| ids.len()).unwrap_or(0);
        TransactionStats {
            active,
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            conflicted: self.conflicted.load(Ordering::Relaxed),
        }
    }

    fn deactivate(&self, txn_id: TransactionId) {
        // A poisoned set only skews the active counter.
        if let Ok(mut ids) = self.active_ids.lock() {
            ids.remove(&txn_id);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub active: usize,
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub conflicted: u64,
}
