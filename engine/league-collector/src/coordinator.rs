//! Run coordination
//!
//! The league root keeps its progress in the `{league}` partition and each
//! season in `{league}-{season}`, whatever the mode. A single-session run
//! walks the seasons in turn on one session; a sharded run gives each season
//! its own session. No two planners ever write the same progress.

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::planner::{Expansion, Planner};
use crate::progress::{CrawlProgress, TargetStatus};
use crate::report::RunReport;
use crate::session::{with_session, Connector};
use crate::target::CrawlTarget;
use crate::writer::RecordWriter;
use futures::FutureExt;
use persistence::{PersistenceConfig, RecordSink};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Progress partition of one season, shared by single and sharded runs
fn season_partition(league: &str, season: &CrawlTarget) -> Result<String> {
    match season.key.season() {
        Some(year) => Ok(format!("{league}-{year}")),
        None => Err(CollectorError::internal(format!("{season} is not a season"))),
    }
}

/// Owns everything a run needs
pub struct Coordinator {
    config: Arc<CollectorConfig>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn RecordSink>,
    persistence: PersistenceConfig,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        config: CollectorConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn RecordSink>,
        persistence: PersistenceConfig,
    ) -> Result<Self> {
        config.validate().map_err(CollectorError::config)?;
        persistence.validate().map_err(CollectorError::config)?;

        Ok(Self {
            config: Arc::new(config),
            connector,
            sink,
            persistence,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `cancel` to stop the run at the next target boundary
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Run the crawl as configured
    pub async fn run(&self) -> Result<RunReport> {
        self.sink.initialize().await?;

        if self.config.sharding.enabled {
            self.run_sharded().await
        } else {
            self.run_single().await
        }
    }

    fn planner(&self, cancel: CancellationToken) -> Planner {
        Planner::new(Arc::clone(&self.config), RecordWriter::new(Arc::clone(&self.sink)), cancel)
    }

    fn root(&self) -> CrawlTarget {
        CrawlTarget::league(self.config.league())
    }

    /// Crawl `root` on a fresh session against one progress partition
    async fn crawl_partition(
        &self,
        partition: String,
        root: CrawlTarget,
        expansion: Expansion,
        cancel: CancellationToken,
    ) -> Result<(RunReport, CrawlProgress)> {
        let mut progress = CrawlProgress::open(&self.persistence, partition).await?;
        let planner = self.planner(cancel);

        with_session(self.connector.as_ref(), &self.config, move |session| {
            async move {
                let report = planner.crawl(session, &mut progress, root, expansion).await?;
                Ok((report, progress))
            }
            .boxed()
        })
        .await
    }

    /// Progress partition holding the league root
    fn league_partition(&self) -> String {
        self.config.league_id.clone()
    }

    /// League root, then every season in turn, all on one session
    pub async fn run_single(&self) -> Result<RunReport> {
        let root = self.root();
        let mut league = CrawlProgress::open(&self.persistence, self.league_partition()).await?;
        let planner = self.planner(self.cancel.clone());
        let persistence = self.persistence.clone();
        let league_id = self.config.league_id.clone();

        with_session(self.connector.as_ref(), &self.config, move |session| {
            async move {
                let mut page = None;
                let mut report = planner
                    .crawl_from(session, &mut page, &mut league, root.clone(), Expansion::RootOnly)
                    .await?;

                let Some(entry) = league.entry(&root.key).filter(|e| e.status == TargetStatus::Done) else {
                    warn!("League {} was not collected, no seasons to crawl", root.key);
                    return Ok(report);
                };

                for season in planner.scheduled_children(&entry.children) {
                    let partition = season_partition(&league_id, &season)?;
                    let mut progress = CrawlProgress::open(&persistence, partition).await?;
                    let shard = planner
                        .crawl_from(session, &mut page, &mut progress, season, Expansion::Full)
                        .await?;
                    report.merge(shard);
                }
                Ok(report)
            }
            .boxed()
        })
        .await
    }

    /// League root first, then one session per season
    pub async fn run_sharded(&self) -> Result<RunReport> {
        let root = self.root();
        let (mut report, progress) = self
            .crawl_partition(self.league_partition(), root.clone(), Expansion::RootOnly, self.cancel.clone())
            .await?;

        let entry = progress.entry(&root.key).filter(|e| e.status == TargetStatus::Done);
        let Some(entry) = entry else {
            warn!("League {} was not collected, no seasons to shard", root.key);
            return Ok(report);
        };

        let planner = self.planner(self.cancel.clone());
        let seasons = planner.scheduled_children(&entry.children);
        let max_sessions = self.config.sharding.max_sessions.max(1);
        info!("Sharding {} season(s) over at most {} session(s)", seasons.len(), max_sessions);

        let semaphore = Arc::new(Semaphore::new(max_sessions));
        let shard_cancel = self.cancel.child_token();

        let shards = seasons.into_iter().map(|season| {
            let semaphore = Arc::clone(&semaphore);
            let cancel = shard_cancel.clone();
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| CollectorError::internal(format!("shard semaphore closed: {e}")))?;

                let partition = season_partition(&self.config.league_id, &season)?;

                let result = self.crawl_partition(partition, season, Expansion::Full, cancel.clone()).await;
                if let Err(CollectorError::Connection(_)) = &result {
                    // Stop the other shards at their next boundary
                    cancel.cancel();
                }
                result.map(|(report, _)| report)
            }
        });

        let mut first_error = None;
        for result in futures::future::join_all(shards).await {
            match result {
                Ok(shard) => report.merge(shard),
                Err(e) => {
                    warn!("Shard failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
