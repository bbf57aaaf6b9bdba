//! Run report

use crate::error::FailureReason;
use crate::progress::Failure;
use crate::target::{CrawlTarget, TargetKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub done: usize,
    pub failed: usize,
}

/// A target that ended the run `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTarget {
    pub target: String,
    pub kind: TargetKind,
    pub reason: FailureReason,
    pub message: String,
    pub attempts: u32,
    pub fatal: bool,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Targets reached by the walk, in any state
    pub targets_total: usize,
    /// Targets `Done` at the end of the run
    pub done: usize,
    /// Targets collected by this run
    pub collected: usize,
    /// Targets already `Done` from an earlier run
    pub skipped: usize,
    /// Targets discovered but not attempted
    pub pending: usize,
    pub cancelled: bool,
    pub failed: Vec<FailedTarget>,
    pub by_kind: BTreeMap<TargetKind, KindCounts>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn start() -> Self {
        let now = Utc::now();
        Self {
            targets_total: 0,
            done: 0,
            collected: 0,
            skipped: 0,
            pending: 0,
            cancelled: false,
            failed: Vec::new(),
            by_kind: BTreeMap::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record_collected(&mut self, target: &CrawlTarget) {
        self.collected += 1;
        self.done += 1;
        self.by_kind.entry(target.kind()).or_default().done += 1;
    }

    pub fn record_skipped(&mut self, target: &CrawlTarget) {
        self.skipped += 1;
        self.done += 1;
        self.by_kind.entry(target.kind()).or_default().done += 1;
    }

    pub fn record_failure(&mut self, target: &CrawlTarget, failure: &Failure) {
        self.by_kind.entry(target.kind()).or_default().failed += 1;
        self.failed.push(FailedTarget {
            target: target.path(),
            kind: target.kind(),
            reason: failure.reason,
            message: failure.message.clone(),
            attempts: failure.attempts,
            fatal: failure.fatal,
        });
    }

    pub fn record_cancelled(&mut self, pending: usize) {
        self.cancelled = true;
        self.pending += pending;
    }

    pub fn finish(mut self) -> Self {
        self.targets_total = self.done + self.failed.len() + self.pending;
        self.finished_at = Utc::now();
        self
    }

    /// Fold a shard's report into this one
    pub fn merge(&mut self, other: RunReport) {
        self.done += other.done;
        self.collected += other.collected;
        self.skipped += other.skipped;
        self.pending += other.pending;
        self.cancelled |= other.cancelled;
        self.failed.extend(other.failed);
        for (kind, counts) in other.by_kind {
            let entry = self.by_kind.entry(kind).or_default();
            entry.done += counts.done;
            entry.failed += counts.failed;
        }
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = self.finished_at.max(other.finished_at);
        self.targets_total = self.done + self.failed.len() + self.pending;
    }

    pub fn has_fatal_failures(&self) -> bool {
        self.failed.iter().any(|f| f.fatal)
    }

    /// Whether every reached target is `Done`
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.pending == 0 && !self.cancelled
    }

    /// 0 when complete, 1 on any fatal failure, 2 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.has_fatal_failures() {
            1
        } else if !self.is_complete() {
            2
        } else {
            0
        }
    }

    pub fn failed_of(&self, kind: TargetKind) -> usize {
        self.by_kind.get(&kind).map(|c| c.failed).unwrap_or(0)
    }

    pub fn done_of(&self, kind: TargetKind) -> usize {
        self.by_kind.get(&kind).map(|c| c.done).unwrap_or(0)
    }
}
