//! Configuration for the persistence layer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Base directory for persistence files
    pub data_dir: PathBuf,

    /// Progress journal configuration
    pub journal: JournalConfig,

    /// Snapshot configuration
    pub snapshot: SnapshotConfig,
}

/// Append-only journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Whether to fsync on every append (for maximum durability)
    pub fsync_every_write: bool,

    /// Number of appended entries after which the owner should compact
    pub compact_after_entries: u64,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Maximum number of snapshots to keep per journal
    pub max_snapshots: usize,

    /// Whether to gzip snapshots
    pub compress: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            journal: JournalConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { fsync_every_write: true, compact_after_entries: 5_000 }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { max_snapshots: 3, compress: true }
    }
}

impl PersistenceConfig {
    /// Create a new configuration with custom data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Directory holding one JSON document per entity
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    /// Directory holding progress journals
    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("progress")
    }

    /// Directory holding progress snapshots
    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }

        if self.journal.compact_after_entries == 0 {
            return Err("journal compact_after_entries must be greater than 0".to_string());
        }

        if self.snapshot.max_snapshots == 0 {
            return Err("snapshot max_snapshots must be greater than 0".to_string());
        }

        Ok(())
    }
}
