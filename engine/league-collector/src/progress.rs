//! Persistent crawl progress
//!
//! Progress is a map from target path to [`ProgressEntry`]. Every change is
//! appended to a journal before it takes effect in memory, and the journal
//! is folded into a snapshot once it grows long. A progress partition is
//! written by exactly one planner.

use crate::error::{FailureReason, FatalStepError};
use crate::target::{CrawlTarget, TargetKey, TargetKind};
use chrono::{DateTime, Utc};
use persistence::{Journal, PersistenceConfig, SnapshotManager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Why a target failed, as remembered across runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: FailureReason,
    pub message: String,
    pub attempts: u32,
    pub fatal: bool,
}

impl From<FatalStepError> for Failure {
    fn from(err: FatalStepError) -> Self {
        Self { fatal: err.reason.is_fatal(), reason: err.reason, message: err.message, attempts: err.attempts }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    InProgress,
    Done,
    Failed(Failure),
}

impl TargetStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub target: CrawlTarget,
    pub status: TargetStatus,
    /// Targets discovered when this one completed, in visit order
    #[serde(default)]
    pub children: Vec<CrawlTarget>,
    pub updated_at: DateTime<Utc>,
}

type ProgressState = BTreeMap<String, ProgressEntry>;

struct ProgressStore {
    journal: Journal<ProgressEntry>,
    snapshots: SnapshotManager<ProgressState>,
}

/// Status of every target seen by one progress partition
pub struct CrawlProgress {
    partition: String,
    entries: ProgressState,
    store: Option<ProgressStore>,
}

impl CrawlProgress {
    /// Progress that lives only as long as the value
    pub fn in_memory(partition: impl Into<String>) -> Self {
        Self { partition: partition.into(), entries: BTreeMap::new(), store: None }
    }

    /// Load the named partition from the progress directory
    pub async fn open(config: &PersistenceConfig, partition: impl Into<String>) -> persistence::Result<Self> {
        let partition = partition.into();
        let snapshots = SnapshotManager::new(config.snapshot.clone(), config.snapshots_dir(), partition.clone())?;
        let journal: Journal<ProgressEntry> = Journal::open(config.journal.clone(), &config.journal_dir(), &partition)?;

        let (mut entries, through) = match snapshots.load_latest_snapshot()? {
            Some(snapshot) => (snapshot.state, snapshot.sequence),
            None => (BTreeMap::new(), 0),
        };
        journal.advance_to(through).await;

        let replayed = journal.replay(through).await?;
        let replayed_count = replayed.len();
        for entry in replayed {
            entries.insert(entry.payload.target.path(), entry.payload);
        }

        // A target left InProgress was interrupted mid-step
        let mut interrupted = 0;
        for entry in entries.values_mut() {
            if entry.status == TargetStatus::InProgress {
                entry.status = TargetStatus::Pending;
                interrupted += 1;
            }
        }

        info!(
            "Loaded progress {} ({} targets, {} journal entries replayed, {} interrupted)",
            partition,
            entries.len(),
            replayed_count,
            interrupted
        );

        Ok(Self { partition, entries, store: Some(ProgressStore { journal, snapshots }) })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn status(&self, key: &TargetKey) -> TargetStatus {
        self.entries.get(&key.path()).map(|e| e.status.clone()).unwrap_or(TargetStatus::Pending)
    }

    pub fn entry(&self, key: &TargetKey) -> Option<&ProgressEntry> {
        self.entries.get(&key.path())
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `Done` targets of `kind`
    pub fn done_count(&self, kind: TargetKind) -> usize {
        self.entries.values().filter(|e| e.target.kind() == kind && e.status.is_done()).count()
    }

    pub async fn mark_in_progress(&mut self, target: &CrawlTarget) -> persistence::Result<()> {
        let children = self.entry(&target.key).map(|e| e.children.clone()).unwrap_or_default();
        self.record(target, TargetStatus::InProgress, children).await
    }

    /// Mark `target` done; `children` are re-materialized by later runs
    pub async fn mark_done(&mut self, target: &CrawlTarget, children: Vec<CrawlTarget>) -> persistence::Result<()> {
        self.record(target, TargetStatus::Done, children).await
    }

    pub async fn mark_failed(&mut self, target: &CrawlTarget, failure: Failure) -> persistence::Result<()> {
        self.record(target, TargetStatus::Failed(failure), Vec::new()).await
    }

    async fn record(
        &mut self,
        target: &CrawlTarget,
        status: TargetStatus,
        children: Vec<CrawlTarget>,
    ) -> persistence::Result<()> {
        let entry = ProgressEntry { target: target.clone(), status, children, updated_at: Utc::now() };
        debug!("Progress {}: {} -> {:?}", self.partition, target, entry.status);

        if let Some(store) = &self.store {
            store.journal.append(entry.clone()).await?;
        }
        self.entries.insert(target.path(), entry);

        if let Some(store) = &self.store {
            if store.journal.needs_compaction().await {
                self.compact().await?;
            }
        }

        Ok(())
    }

    /// Fold the journal into a snapshot
    pub async fn compact(&self) -> persistence::Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let through = store.journal.last_sequence().await;
        store.snapshots.create_snapshot(&self.entries, through)?;
        store.journal.truncate_through(through).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LeagueId, SeasonId};
    use persistence::JournalConfig;
    use tempfile::TempDir;

    fn root() -> CrawlTarget {
        CrawlTarget::league(LeagueId::new("42"))
    }

    fn season(year: u16) -> CrawlTarget {
        CrawlTarget::child_of(&root(), TargetKey::Season { league: LeagueId::new("42"), season: SeasonId(year) })
    }

    fn config(dir: &TempDir, compact_after_entries: u64) -> PersistenceConfig {
        let mut config = PersistenceConfig::new(dir.path());
        config.journal = JournalConfig { fsync_every_write: false, compact_after_entries };
        config
    }

    #[tokio::test]
    async fn test_unknown_target_is_pending() {
        let progress = CrawlProgress::in_memory("42");
        assert_eq!(progress.status(&root().key), TargetStatus::Pending);
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn test_done_survives_reopen_with_children() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut progress = CrawlProgress::open(&config(&temp_dir, 1000), "42").await.unwrap();
            progress.mark_in_progress(&root()).await.unwrap();
            progress.mark_done(&root(), vec![season(2020), season(2021)]).await.unwrap();
        }

        let progress = CrawlProgress::open(&config(&temp_dir, 1000), "42").await.unwrap();
        let entry = progress.entry(&root().key).unwrap();
        assert!(entry.status.is_done());
        assert_eq!(entry.children, vec![season(2020), season(2021)]);
    }

    #[tokio::test]
    async fn test_in_progress_reloads_as_pending() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut progress = CrawlProgress::open(&config(&temp_dir, 1000), "42").await.unwrap();
            progress.mark_in_progress(&season(2021)).await.unwrap();
        }

        let progress = CrawlProgress::open(&config(&temp_dir, 1000), "42").await.unwrap();
        assert_eq!(progress.status(&season(2021).key), TargetStatus::Pending);
    }

    #[tokio::test]
    async fn test_journal_replays_after_compaction() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut progress = CrawlProgress::open(&config(&temp_dir, 3), "42").await.unwrap();
            for year in 2018..2023 {
                progress.mark_in_progress(&season(year)).await.unwrap();
                progress.mark_done(&season(year), Vec::new()).await.unwrap();
            }
            let failure = Failure {
                reason: FailureReason::UnexpectedLayout,
                message: "owner missing".into(),
                attempts: 3,
                fatal: true,
            };
            progress.mark_failed(&season(2023), failure).await.unwrap();
        }

        let snapshots = std::fs::read_dir(temp_dir.path().join("snapshots")).unwrap().count();
        assert!(snapshots > 0);

        let mut progress = CrawlProgress::open(&config(&temp_dir, 3), "42").await.unwrap();
        assert_eq!(progress.done_count(TargetKind::Season), 5);
        assert!(matches!(progress.status(&season(2023).key), TargetStatus::Failed(f) if f.fatal));

        // Sequence keeps increasing past the snapshot
        progress.mark_done(&season(2023), Vec::new()).await.unwrap();
        drop(progress);
        let progress = CrawlProgress::open(&config(&temp_dir, 3), "42").await.unwrap();
        assert!(progress.status(&season(2023).key).is_done());
    }

    #[test]
    fn test_failure_from_fatal_step_error() {
        let failure = Failure::from(FatalStepError {
            reason: FailureReason::Timeout,
            message: "slow".into(),
            attempts: 3,
        });
        assert!(!failure.fatal);
    }
}
