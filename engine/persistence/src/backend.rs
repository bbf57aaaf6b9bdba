//! Record sink trait and implementations

use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};
use crate::record::{EntityKey, StoredRecord, UpsertOutcome};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Keyed, idempotent store for collected entities
///
/// Writing the same data under the same key twice leaves the store unchanged
/// and reports [`UpsertOutcome::Unchanged`]. Implementations must tolerate
/// concurrent writers on distinct keys.
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    /// Prepare the backing storage
    async fn initialize(&self) -> Result<()>;

    /// Insert or replace the record stored under `key`
    async fn upsert(
        &self,
        key: &EntityKey,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<UpsertOutcome>;

    /// Whether a record exists under `key`
    async fn exists(&self, key: &EntityKey) -> Result<bool>;

    /// Load the record stored under `key`
    async fn get(&self, key: &EntityKey) -> Result<Option<StoredRecord>>;

    /// All keys at or below `prefix`, sorted
    async fn keys(&self, prefix: &str) -> Result<Vec<EntityKey>>;
}

fn next_record(
    previous: Option<&StoredRecord>,
    key: &EntityKey,
    kind: &str,
    data: serde_json::Value,
) -> Option<(StoredRecord, UpsertOutcome)> {
    match previous {
        Some(existing) if existing.data == data && existing.kind == kind => None,
        Some(existing) => Some((
            StoredRecord {
                key: key.clone(),
                kind: kind.to_string(),
                revision: existing.revision + 1,
                updated_at: Utc::now(),
                data,
            },
            UpsertOutcome::Updated,
        )),
        None => Some((
            StoredRecord {
                key: key.clone(),
                kind: kind.to_string(),
                revision: 1,
                updated_at: Utc::now(),
                data,
            },
            UpsertOutcome::Inserted,
        )),
    }
}

/// Local file-based record store, one JSON document per entity
pub struct LocalRecordStore {
    config: PersistenceConfig,
    records_dir: PathBuf,
    write_lock: Mutex<()>,
    initialized: AtomicBool,
}

impl LocalRecordStore {
    /// Create a new local record store
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        config.validate().map_err(PersistenceError::config)?;
        let records_dir = config.records_dir();

        Ok(Self { config, records_dir, write_lock: Mutex::new(()), initialized: AtomicBool::new(false) })
    }

    /// Create a new local record store with default config
    pub fn with_default_config(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(PersistenceConfig::new(data_dir))
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(PersistenceError::invalid_operation("Record store not initialized"));
        }
        Ok(())
    }

    fn read_record(path: &Path) -> Result<Option<StoredRecord>> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    PersistenceError::corruption(format!("{}: {e}", path.display()))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    /// Write through a uniquely named temp file so readers never see a torn document
    fn write_atomically(path: &Path, record: &StoredRecord) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| PersistenceError::invalid_operation("record path has no parent"))?;
        std::fs::create_dir_all(parent)?;

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&temp_path)?;
            serde_json::to_writer_pretty(&mut file, record)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }

        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(PersistenceError::Io(e));
        }

        Ok(())
    }

    fn collect_keys(root: &Path, dir: &Path, out: &mut Vec<EntityKey>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PersistenceError::Io(e)),
        };

        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_keys(root, &path, out)?;
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let relative = path.strip_prefix(root).map_err(|_| {
                PersistenceError::corruption(format!("{} escapes records dir", path.display()))
            })?;
            let segments: Vec<String> = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();

            match EntityKey::from_segments(segments) {
                Ok(key) => out.push(key),
                Err(e) => tracing::warn!("Skipping unrecognised record file {:?}: {}", path, e),
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordSink for LocalRecordStore {
    async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        std::fs::create_dir_all(&self.records_dir)?;
        self.initialized.store(true, Ordering::Release);

        tracing::info!("Local record store initialized at: {:?}", self.records_dir);

        Ok(())
    }

    async fn upsert(
        &self,
        key: &EntityKey,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<UpsertOutcome> {
        self.ensure_initialized()?;
        let path = self.records_dir.join(key.relative_path());

        let _guard = self.write_lock.lock().await;
        let previous = Self::read_record(&path)?;

        match next_record(previous.as_ref(), key, kind, data) {
            None => {
                tracing::debug!("Record {} unchanged", key);
                Ok(UpsertOutcome::Unchanged)
            }
            Some((record, outcome)) => {
                Self::write_atomically(&path, &record)?;
                tracing::debug!("Record {} {:?} (revision {})", key, outcome, record.revision);
                Ok(outcome)
            }
        }
    }

    async fn exists(&self, key: &EntityKey) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(self.records_dir.join(key.relative_path()).is_file())
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<StoredRecord>> {
        self.ensure_initialized()?;
        Self::read_record(&self.records_dir.join(key.relative_path()))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<EntityKey>> {
        self.ensure_initialized()?;

        let mut keys = Vec::new();
        Self::collect_keys(&self.records_dir, &self.records_dir, &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();

        Ok(keys)
    }
}

/// In-memory record store (for testing)
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<EntityKey, StoredRecord>>>,
}

impl InMemoryRecordStore {
    /// Create a new in-memory record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordSink for InMemoryRecordStore {
    async fn initialize(&self) -> Result<()> {
        tracing::info!("In-memory record store initialized");
        Ok(())
    }

    async fn upsert(
        &self,
        key: &EntityKey,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<UpsertOutcome> {
        let mut records = self.records.write().await;

        match next_record(records.get(key), key, kind, data) {
            None => Ok(UpsertOutcome::Unchanged),
            Some((record, outcome)) => {
                records.insert(key.clone(), record);
                Ok(outcome)
            }
        }
    }

    async fn exists(&self, key: &EntityKey) -> Result<bool> {
        Ok(self.records.read().await.contains_key(key))
    }

    async fn get(&self, key: &EntityKey) -> Result<Option<StoredRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<EntityKey>> {
        let records = self.records.read().await;
        Ok(records.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }
}
