// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Optimistic transactions for the in-memory backend:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Buffered writes: nothing is visible to others before commit
// - Version validation at commit: read set must be unchanged
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
