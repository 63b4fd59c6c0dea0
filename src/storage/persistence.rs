//! Snapshot persistence for the in-memory store

use super::RecordKey;
use crate::core::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Store Snapshot
// ============================================================================

/// One record with the version it carried when the snapshot was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub key: RecordKey,
    pub value: Value,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub last_version: u64,
    pub records: Vec<SnapshotRecord>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
}

impl StoreSnapshot {
    pub fn new(records: Vec<SnapshotRecord>, last_version: u64) -> Self {
        let record_count = records.len();
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            last_version,
            records,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                record_count,
            },
        }
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Write the snapshot next to its destination, then move it into place.
    pub fn save(&self, snapshot: &StoreSnapshot) -> StoreResult<()> {
        let parent = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            StoreError::IoError(format!("Failed to create snapshot directory: {}", e))
        })?;

        let serialized = rmp_serde::to_vec(snapshot).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;

        let temp_file = NamedTempFile::new_in(&parent)
            .map_err(|e| StoreError::IoError(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp_file.as_file());
            writer
                .write_all(&serialized)
                .map_err(|e| StoreError::IoError(format!("Failed to write snapshot: {}", e)))?;
            writer
                .flush()
                .map_err(|e| StoreError::IoError(format!("Failed to flush snapshot: {}", e)))?;
        }
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StoreError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp_file
            .persist(&self.snapshot_path)
            .map_err(|e| StoreError::IoError(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> StoreResult<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| StoreError::IoError(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| StoreError::IoError(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            StoreError::Serialization(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "Unsupported snapshot format version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

}
