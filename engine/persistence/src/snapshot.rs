//! Compaction snapshots
//!
//! A snapshot captures the full folded state of a journal at a given
//! sequence number. Recovery loads the newest snapshot and replays only the
//! journal entries written after it.

use crate::config::SnapshotConfig;
use crate::error::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A snapshot of folded state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// Unique identifier for this snapshot
    pub id: Uuid,

    /// Timestamp when the snapshot was created
    pub timestamp: DateTime<Utc>,

    /// Last journal sequence folded into `state`
    pub sequence: u64,

    pub state: S,

    pub metadata: SnapshotMetadata,
}

/// Snapshot metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Snapshot format version
    pub version: String,

    /// Compression used
    pub compression: Option<String>,
}

/// Snapshot file information
#[derive(Debug, Clone)]
pub struct SnapshotFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub sequence: u64,
}

/// Snapshot manager for one named state
pub struct SnapshotManager<S> {
    config: SnapshotConfig,
    snapshots_dir: PathBuf,
    name: String,
    _state: PhantomData<fn() -> S>,
}

impl<S> SnapshotManager<S>
where
    S: Serialize + DeserializeOwned,
{
    /// Create a new snapshot manager
    pub fn new(config: SnapshotConfig, snapshots_dir: PathBuf, name: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(&snapshots_dir)?;

        Ok(Self { config, snapshots_dir, name: name.into(), _state: PhantomData })
    }

    /// Write a snapshot of `state` covering the journal through `sequence`
    pub fn create_snapshot(&self, state: &S, sequence: u64) -> Result<Uuid> {
        let start_time = std::time::Instant::now();
        let id = Uuid::new_v4();

        let snapshot = Snapshot {
            id,
            timestamp: Utc::now(),
            sequence,
            state,
            metadata: SnapshotMetadata {
                version: "1.0".to_string(),
                compression: self.config.compress.then(|| "gzip".to_string()),
            },
        };

        let path = self.snapshots_dir.join(format!("{}_{sequence:016x}.snapshot", self.name));
        let temp_path = path.with_extension("snapshot.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            if self.config.compress {
                let mut encoder = GzEncoder::new(&mut writer, Compression::default());
                serde_json::to_writer(&mut encoder, &snapshot)?;
                encoder.finish()?;
            } else {
                serde_json::to_writer(&mut writer, &snapshot)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&temp_path, &path)?;

        tracing::info!(
            "Created snapshot {} for {} at sequence {} ({}ms)",
            id,
            self.name,
            sequence,
            start_time.elapsed().as_millis()
        );

        self.cleanup_old_snapshots()?;

        Ok(id)
    }

    /// Load the most recent snapshot, if any
    pub fn load_latest_snapshot(&self) -> Result<Option<Snapshot<S>>> {
        let snapshots = self.list_snapshots()?;

        let Some(latest) = snapshots.last() else {
            tracing::debug!("No snapshots found for {}", self.name);
            return Ok(None);
        };

        let snapshot = Self::load_snapshot(&latest.path)?;
        tracing::info!("Loaded snapshot {} for {} at sequence {}", snapshot.id, self.name, snapshot.sequence);

        Ok(Some(snapshot))
    }

    /// Snapshots for this name, oldest first
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotFileInfo>> {
        let prefix = format!("{}_", self.name);
        let mut snapshots = Vec::new();

        for entry in std::fs::read_dir(&self.snapshots_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("snapshot") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Some(hex) = stem.strip_prefix(&prefix) else { continue };
            let Ok(sequence) = u64::from_str_radix(hex, 16) else { continue };

            snapshots.push(SnapshotFileInfo { size: entry.metadata()?.len(), path, sequence });
        }

        snapshots.sort_by_key(|s| s.sequence);

        Ok(snapshots)
    }

    /// Remove all but the newest `max_snapshots` snapshots
    pub fn cleanup_old_snapshots(&self) -> Result<()> {
        let snapshots = self.list_snapshots()?;
        if snapshots.len() <= self.config.max_snapshots {
            return Ok(());
        }

        let to_remove = snapshots.len() - self.config.max_snapshots;
        for snapshot in snapshots.iter().take(to_remove) {
            std::fs::remove_file(&snapshot.path)?;
            tracing::debug!("Removed old snapshot: {:?}", snapshot.path);
        }

        Ok(())
    }

    fn load_snapshot(path: &Path) -> Result<Snapshot<S>> {
        let mut bytes = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

        let snapshot = if bytes.starts_with(&GZIP_MAGIC) {
            let mut json = Vec::new();
            GzDecoder::new(bytes.as_slice()).read_to_end(&mut json).map_err(|e| {
                PersistenceError::corruption(format!("{}: {e}", path.display()))
            })?;
            serde_json::from_slice(&json)?
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    type State = BTreeMap<String, String>;

    fn state(pairs: &[(&str, &str)]) -> State {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_compressed_snapshot_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let manager =
            SnapshotManager::<State>::new(SnapshotConfig::default(), temp_dir.path().to_path_buf(), "p")
                .unwrap();

        manager.create_snapshot(&state(&[("league/1", "done")]), 7).unwrap();

        let loaded = manager.load_latest_snapshot().unwrap().unwrap();
        assert_eq!(loaded.sequence, 7);
        assert_eq!(loaded.state.get("league/1").map(String::as_str), Some("done"));
        assert_eq!(loaded.metadata.compression.as_deref(), Some("gzip"));

        let raw = std::fs::read(&manager.list_snapshots().unwrap()[0].path).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));
    }

    #[test]
    fn test_latest_wins_and_old_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let config = SnapshotConfig { max_snapshots: 2, compress: false };
        let manager =
            SnapshotManager::<State>::new(config, temp_dir.path().to_path_buf(), "p").unwrap();

        for sequence in [3, 9, 12] {
            manager.create_snapshot(&state(&[("seq", &sequence.to_string())]), sequence).unwrap();
        }

        let listed = manager.list_snapshots().unwrap();
        assert_eq!(listed.iter().map(|s| s.sequence).collect::<Vec<_>>(), vec![9, 12]);
        assert_eq!(manager.load_latest_snapshot().unwrap().unwrap().sequence, 12);
    }

    #[test]
    fn test_names_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let a = SnapshotManager::<State>::new(SnapshotConfig::default(), dir.clone(), "a").unwrap();
        let ab = SnapshotManager::<State>::new(SnapshotConfig::default(), dir, "a-b").unwrap();

        ab.create_snapshot(&state(&[]), 1).unwrap();
        assert!(a.load_latest_snapshot().unwrap().is_none());
    }
}
