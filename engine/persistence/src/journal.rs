//! Append-only JSON-lines journal
//!
//! Every state transition is appended to the journal before it is considered
//! durable. A journal is replayed on startup and compacted into a snapshot
//! once it grows past the configured threshold.

use crate::config::JournalConfig;
use crate::error::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// A single entry in the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry<E> {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// Timestamp when the entry was created
    pub timestamp: DateTime<Utc>,

    /// Sequence number for ordering
    pub sequence: u64,

    pub payload: E,
}

struct JournalFile {
    writer: BufWriter<File>,
    sequence: u64,
    appended_since_open: u64,
}

/// Journal of `E` payloads stored in `<dir>/<name>.journal`
pub struct Journal<E> {
    config: JournalConfig,
    path: PathBuf,
    file: Mutex<JournalFile>,
    _payload: PhantomData<fn() -> E>,
}

impl<E> Journal<E>
where
    E: Serialize + DeserializeOwned + Send,
{
    /// Open (or create) the named journal
    pub fn open(config: JournalConfig, dir: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.journal"));

        let (entries, torn) = Self::read_entries(&path)?;
        if torn {
            let lines = entries
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Self::rewrite(&path, lines.iter())?;
        }
        let sequence = entries.last().map(|e| e.sequence).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            config,
            path,
            file: Mutex::new(JournalFile {
                writer: BufWriter::new(file),
                sequence,
                appended_since_open: 0,
            }),
            _payload: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it
    pub async fn append(&self, payload: E) -> Result<u64> {
        let mut file = self.file.lock().await;
        file.sequence += 1;

        let entry = JournalEntry { id: Uuid::new_v4(), timestamp: Utc::now(), sequence: file.sequence, payload };
        let json = serde_json::to_string(&entry)?;

        writeln!(file.writer, "{json}")?;
        file.writer.flush()?;
        if self.config.fsync_every_write {
            file.writer.get_ref().sync_data()?;
        }
        file.appended_since_open += 1;

        Ok(entry.sequence)
    }

    /// Highest sequence number written so far
    pub async fn last_sequence(&self) -> u64 {
        self.file.lock().await.sequence
    }

    /// Continue numbering after `floor` if the journal is behind it
    ///
    /// A journal truncated down to nothing restarts at zero on reopen; the
    /// owner raises it back to the sequence its snapshot covers.
    pub async fn advance_to(&self, floor: u64) {
        let mut file = self.file.lock().await;
        if file.sequence < floor {
            file.sequence = floor;
        }
    }

    /// Whether enough entries have accumulated to warrant compaction
    pub async fn needs_compaction(&self) -> bool {
        self.file.lock().await.appended_since_open >= self.config.compact_after_entries
    }

    /// All entries with a sequence greater than `after`
    pub async fn replay(&self, after: u64) -> Result<Vec<JournalEntry<E>>> {
        let _file = self.file.lock().await;
        let (mut entries, _) = Self::read_entries(&self.path)?;
        entries.retain(|e| e.sequence > after);
        Ok(entries)
    }

    /// Drop every entry up to and including `through`
    pub async fn truncate_through(&self, through: u64) -> Result<()> {
        let mut file = self.file.lock().await;
        file.writer.flush()?;

        let keep: Vec<String> = BufReader::new(File::open(&self.path)?)
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|line| {
                serde_json::from_str::<JournalEntry<serde::de::IgnoredAny>>(line)
                    .map(|e| e.sequence > through)
                    .unwrap_or(false)
            })
            .collect();

        Self::rewrite(&self.path, keep.iter())?;

        let reopened = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.writer = BufWriter::new(reopened);
        file.appended_since_open = keep.len() as u64;

        tracing::info!(
            "Compacted journal {:?} through sequence {} ({} entries kept)",
            self.path,
            through,
            keep.len()
        );

        Ok(())
    }

    /// Replace the journal contents with `lines` through a temp file
    fn rewrite<'a>(path: &Path, lines: impl Iterator<Item = &'a String>) -> Result<()> {
        let temp_path = path.with_extension("journal.tmp");
        {
            let mut temp = BufWriter::new(File::create(&temp_path)?);
            for line in lines {
                writeln!(temp, "{line}")?;
            }
            temp.flush()?;
            temp.get_ref().sync_all()?;
        }
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Read all entries, tolerating a torn final line from an interrupted append
    ///
    /// The flag reports whether such a line was dropped.
    fn read_entries(path: &Path) -> Result<(Vec<JournalEntry<E>>, bool)> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
            Err(e) => return Err(PersistenceError::Io(e)),
        };

        let lines: Vec<String> =
            BufReader::new(file).lines().collect::<std::io::Result<Vec<_>>>()?;
        let last_index = lines.len().saturating_sub(1);
        let mut entries = Vec::with_capacity(lines.len());
        let mut torn = false;

        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry<E>>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if index == last_index => {
                    tracing::warn!("Ignoring torn journal tail in {:?}: {}", path, e);
                    torn = true;
                }
                Err(e) => {
                    return Err(PersistenceError::corruption(format!(
                        "{} line {}: {e}",
                        path.display(),
                        index + 1
                    )));
                }
            }
        }

        Ok((entries, torn))
    }
}
