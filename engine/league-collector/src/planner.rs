//! Navigation planner
//!
//! Walks the target tree depth-first in pre-order. A target's children are
//! materialized only once the target is `Done`, either from the record just
//! collected or from the progress entry of an earlier run. Children are
//! pushed in site order, so seasons and weeks are visited ascending and
//! teams in listing order.

use crate::config::{CollectorConfig, Credentials};
use crate::error::{CollectorError, Result, StepError};
use crate::extraction;
use crate::pages::{Page, PageObject};
use crate::progress::{CrawlProgress, Failure, TargetStatus};
use crate::report::RunReport;
use crate::retry::{RetryController, Step, StepFailure};
use crate::session::Session;
use crate::target::{CrawlTarget, TargetKey, TargetKind};
use crate::types::DomainRecord;
use crate::writer::RecordWriter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How far below the root a crawl descends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// The whole subtree
    Full,
    /// The root only; its children are recorded but not visited
    RootOnly,
}

/// Targets to visit after `target` produced `record`, in visit order
pub fn children_of(target: &CrawlTarget, record: &DomainRecord) -> Vec<CrawlTarget> {
    let child = |key| CrawlTarget::child_of(target, key);

    match record {
        DomainRecord::League(r) => r
            .seasons
            .iter()
            .map(|season| child(TargetKey::Season { league: r.league.clone(), season: *season }))
            .collect(),
        DomainRecord::Season(r) => {
            let mut children = Vec::with_capacity(r.teams.len() + 2);
            children.push(child(TargetKey::Standings { league: r.league.clone(), season: r.season }));
            children.extend(r.teams.iter().map(|team| {
                child(TargetKey::TeamRoster { league: r.league.clone(), season: r.season, team: team.id.clone() })
            }));
            children.push(child(TargetKey::Schedule { league: r.league.clone(), season: r.season }));
            children
        }
        DomainRecord::Schedule(r) => r
            .weeks
            .iter()
            .map(|week| child(TargetKey::Week { league: r.league.clone(), season: r.season, week: *week }))
            .collect(),
        DomainRecord::Week(r) => r
            .matchups
            .iter()
            .map(|m| {
                child(TargetKey::Matchup {
                    league: r.league.clone(),
                    season: r.season,
                    week: r.week,
                    matchup: m.id.clone(),
                    home: m.home.clone(),
                    away: m.away.clone(),
                })
            })
            .collect(),
        DomainRecord::Standings(_) | DomainRecord::Team(_) | DomainRecord::Matchup(_) => Vec::new(),
    }
}

/// One navigate, extract, parse, persist step for a target
struct TargetStep<'p> {
    session: &'p mut Session,
    page: &'p mut Option<Page>,
    target: &'p CrawlTarget,
    writer: &'p RecordWriter,
    credentials: Option<&'p Credentials>,
}

#[async_trait::async_trait]
impl Step for TargetStep<'_> {
    type Output = DomainRecord;

    async fn attempt(&mut self, _attempt: u32) -> std::result::Result<DomainRecord, StepError> {
        let current = match self.page.take() {
            Some(page) => page,
            None => Page::entry(self.session, self.credentials).await.map_err(StepError::navigation)?,
        };

        let next = match current.navigate_to(self.session, self.target).await {
            Ok(next) => next,
            Err(e) => {
                *self.page = Some(current);
                return Err(StepError::navigation(e));
            }
        };
        let page = self.page.insert(next);

        let raw = page.extract(self.session).await.map_err(StepError::extraction)?;
        let record = extraction::parse(raw, self.target)?;
        self.writer.write(&record).await?;

        Ok(record)
    }
}

/// Drives one session through a target tree
#[derive(Clone)]
pub struct Planner {
    config: Arc<CollectorConfig>,
    retry: RetryController,
    writer: RecordWriter,
    cancel: CancellationToken,
}

impl Planner {
    pub fn new(config: Arc<CollectorConfig>, writer: RecordWriter, cancel: CancellationToken) -> Self {
        let retry = RetryController::new(config.retry.clone());
        Self { config, retry, writer, cancel }
    }

    /// Whether a discovered target is within the configured crawl
    fn in_scope(&self, target: &CrawlTarget) -> bool {
        match target.kind() {
            TargetKind::Season => target.key.season().is_some_and(|s| self.config.seasons.contains(s)),
            _ => true,
        }
    }

    /// Children to visit below a `Done` target
    pub fn scheduled_children(&self, children: &[CrawlTarget]) -> Vec<CrawlTarget> {
        children.iter().filter(|child| self.in_scope(child)).cloned().collect()
    }

    /// Crawl from `root`, resuming from `progress`
    ///
    /// Returns an error only when the run must stop as a whole: a lost
    /// connection or a progress write that failed.
    pub async fn crawl(
        &self,
        session: &mut Session,
        progress: &mut CrawlProgress,
        root: CrawlTarget,
        expansion: Expansion,
    ) -> Result<RunReport> {
        let mut page = None;
        self.crawl_from(session, &mut page, progress, root, expansion).await
    }

    /// Crawl from `root`, continuing from the page the session is on
    pub async fn crawl_from(
        &self,
        session: &mut Session,
        page: &mut Option<Page>,
        progress: &mut CrawlProgress,
        root: CrawlTarget,
        expansion: Expansion,
    ) -> Result<RunReport> {
        let mut report = RunReport::start();
        let mut stack = vec![root.clone()];
        let mut visited: HashSet<TargetKey> = HashSet::new();

        info!("Crawling {} in progress partition {}", root, progress.partition());

        while let Some(target) = stack.pop() {
            if !visited.insert(target.key.clone()) {
                continue;
            }

            if self.cancel.is_cancelled() {
                let remaining = stack.iter().filter(|t| !visited.contains(&t.key)).count();
                info!("Run cancelled before {}, {} target(s) left pending", target, remaining + 1);
                report.record_cancelled(remaining + 1);
                break;
            }

            let children = match progress.status(&target.key) {
                TargetStatus::Done => {
                    report.record_skipped(&target);
                    progress.entry(&target.key).map(|e| e.children.clone()).unwrap_or_default()
                }
                TargetStatus::Failed(failure) if failure.fatal && !self.config.retry_fatal_failures => {
                    warn!("Skipping {}, failed earlier: {}", target, failure.message);
                    report.record_failure(&target, &failure);
                    continue;
                }
                _ => match self.collect(session, page, progress, &target).await? {
                    Some(children) => {
                        report.record_collected(&target);
                        children
                    }
                    None => {
                        if let Some(TargetStatus::Failed(failure)) =
                            progress.entry(&target.key).map(|e| e.status.clone())
                        {
                            report.record_failure(&target, &failure);
                        }
                        continue;
                    }
                },
            };

            if target.key == root.key && expansion == Expansion::RootOnly {
                continue;
            }
            for child in self.scheduled_children(&children).into_iter().rev() {
                if !visited.contains(&child.key) {
                    stack.push(child);
                }
            }
        }

        let report = report.finish();
        info!(
            "Crawl of {} finished: {} done ({} collected, {} skipped), {} failed, {} pending",
            root,
            report.done,
            report.collected,
            report.skipped,
            report.failed.len(),
            report.pending
        );
        Ok(report)
    }

    /// Collect one target; `None` when it ended `Failed`
    async fn collect(
        &self,
        session: &mut Session,
        page: &mut Option<Page>,
        progress: &mut CrawlProgress,
        target: &CrawlTarget,
    ) -> Result<Option<Vec<CrawlTarget>>> {
        progress.mark_in_progress(target).await?;

        let mut step = TargetStep {
            session,
            page,
            target,
            writer: &self.writer,
            credentials: self.config.credentials.as_ref(),
        };

        match self.retry.execute(&target.to_string(), &mut step).await {
            Ok(record) => {
                let children = children_of(target, &record);
                progress.mark_done(target, children.clone()).await?;
                info!("Collected {} ({} children)", target, children.len());
                Ok(Some(children))
            }
            Err(StepFailure::Failed(err)) => {
                warn!("{} failed: {}", target, err);
                progress.mark_failed(target, Failure::from(err)).await?;
                Ok(None)
            }
            Err(StepFailure::Aborted(msg)) => {
                warn!("Connection lost at {}, stopping run", target);
                Err(CollectorError::Connection(msg))
            }
        }
    }
}
