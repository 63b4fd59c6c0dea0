// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Writes made inside a transaction are buffered as Changes and only applied
// to the store when the transaction commits. Rollback discards them.
//
// ============================================================================

use crate::storage::RecordKey;
use serde_json::Value;

/// A single buffered write of a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create or overwrite a record
    Put { key: RecordKey, value: Value },

    /// Remove a record
    Delete { key: RecordKey },
}

impl Change {
    /// Get the record key affected by this change
    pub fn key(&self) -> &RecordKey {
        match self {
            Change::Put { key, .. } => key,
            Change::Delete { key } => key,
        }
    }

    /// Value the record will hold after this change, `None` for a delete
    pub fn value(&self) -> Option<&Value> {
        match self {
            Change::Put { value, .. } => Some(value),
            Change::Delete { .. } => None,
        }
    }
}
