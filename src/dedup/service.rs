//! The duplicate engine facade.
//!
//! [`Deduplicator`] bundles the pool, tunables, and the shared progress
//! handle behind one API: start or run a detection pass, poll its progress,
//! inspect groups, and resolve them by merge or ignore. Callers (currently
//! the CLI) go through this type rather than the individual modules.

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::config::DedupConfig;
use crate::dedup::groups::{self, DedupStats, GroupDetail, GroupSummary};
use crate::dedup::merge::{self, MergeOutcome};
use crate::dedup::progress::{DetectionProgress, ProgressHandle};
use crate::dedup::quality;
use crate::dedup::scan::{self, DetectionSummary};
use crate::error::{DedupError, Result, ResultExt};
use crate::model::GroupStatus;

/// Outcome of [`Deduplicator::start_detection`].
pub enum DetectionStart {
    /// A pass was started; the handle resolves to its summary.
    Started(JoinHandle<std::result::Result<DetectionSummary, DedupError>>),
    /// A pass was already in flight; here is where it stood.
    AlreadyRunning(DetectionProgress),
}

/// Recommended resolution for a set of duplicate candidates.
#[derive(Debug, Clone, Serialize)]
pub struct BestSelection {
    pub keep_entry_id: i64,
    pub discard_entry_ids: Vec<i64>,
    pub scores: Vec<ScoredEntry>,
}

/// One candidate with its quality score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    pub entry_id: i64,
    pub quality_score: f64,
}

/// One failed item from a bulk merge.
#[derive(Debug, Serialize)]
pub struct BulkMergeFailure {
    pub group_id: i64,
    pub error: String,
}

/// Result of a bulk merge: successes and per-group failures, side by side.
#[derive(Debug, Default, Serialize)]
pub struct BulkMergeOutcome {
    pub merged: Vec<MergeOutcome>,
    pub failed: Vec<BulkMergeFailure>,
}

/// The duplicate detection and resolution engine.
#[derive(Clone)]
pub struct Deduplicator {
    pool: SqlitePool,
    config: DedupConfig,
    progress: ProgressHandle,
}

impl Deduplicator {
    pub fn new(pool: SqlitePool, config: DedupConfig) -> Self {
        Self {
            pool,
            config,
            progress: ProgressHandle::new(),
        }
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> DetectionProgress {
        self.progress.snapshot()
    }

    /// Request cancellation of a running pass.
    pub fn cancel_detection(&self) {
        self.progress.cancel();
    }

    /// Start a detection pass in the background.
    ///
    /// If a pass is already running, returns its current progress instead
    /// of starting a second one.
    pub fn start_detection(&self) -> DetectionStart {
        if !self.progress.try_begin() {
            return DetectionStart::AlreadyRunning(self.progress.snapshot());
        }

        let pool = self.pool.clone();
        let config = self.config.clone();
        let progress = self.progress.clone();
        DetectionStart::Started(tokio::spawn(async move {
            scan::find_all_duplicates(&pool, &config, &progress).await
        }))
    }

    /// Run a detection pass to completion on the current task.
    ///
    /// # Errors
    ///
    /// [`DedupError::DetectionRunning`] if a pass is already in flight.
    pub async fn run_detection(&self) -> Result<DetectionSummary> {
        if !self.progress.try_begin() {
            return Err(DedupError::DetectionRunning.into());
        }
        Ok(scan::find_all_duplicates(&self.pool, &self.config, &self.progress).await?)
    }

    /// List groups in a lifecycle state.
    pub async fn list_groups(&self, status: GroupStatus) -> Result<Vec<GroupSummary>> {
        groups::list_groups(&self.pool, status)
            .await
            .with_context("listing duplicate groups")
    }

    /// Load one group with its members.
    pub async fn get_group(&self, group_id: i64) -> Result<GroupDetail> {
        groups::get_group(&self.pool, group_id)
            .await?
            .ok_or_else(|| DedupError::GroupNotFound(group_id).into())
    }

    /// Merge a group, keeping the given entry. With `delete_files` set,
    /// the discarded files are removed from disk after commit.
    pub async fn merge(
        &self,
        group_id: i64,
        keep_entry_id: i64,
        delete_files: bool,
    ) -> Result<MergeOutcome> {
        Ok(merge::merge_group(&self.pool, group_id, keep_entry_id, delete_files).await?)
    }

    /// Merge several groups, collecting failures instead of stopping.
    ///
    /// Each request is a `(group_id, keep_entry_id)` pair. Requests are
    /// processed in order; one failing merge never blocks the rest.
    pub async fn bulk_merge(&self, requests: &[(i64, i64)], delete_files: bool) -> BulkMergeOutcome {
        let mut outcome = BulkMergeOutcome::default();
        for &(group_id, keep_entry_id) in requests {
            match merge::merge_group(&self.pool, group_id, keep_entry_id, delete_files).await {
                Ok(merged) => outcome.merged.push(merged),
                Err(e) => {
                    tracing::warn!(target: "dedup", group_id, error = %e, "Bulk merge item failed");
                    outcome.failed.push(BulkMergeFailure {
                        group_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Mark a group ignored.
    pub async fn ignore(&self, group_id: i64) -> Result<()> {
        Ok(merge::ignore_group(&self.pool, group_id).await?)
    }

    /// Score a set of entries and recommend which to keep.
    ///
    /// Pure recommendation: nothing is merged or deleted. The entry with
    /// the highest quality score wins; on a tie, the first of the tied
    /// entries in the given order.
    ///
    /// # Errors
    ///
    /// [`DedupError::EntryNotFound`] if any id does not exist; a config
    /// error when called with no ids.
    pub async fn auto_select_best(&self, entry_ids: &[i64]) -> Result<BestSelection> {
        if entry_ids.is_empty() {
            return Err(crate::error::Error::config("no entries to compare"));
        }
        let entries = crate::db::get_entries_by_ids(&self.pool, entry_ids).await?;

        let mut scores = Vec::with_capacity(entry_ids.len());
        for &id in entry_ids {
            let entry = entries
                .iter()
                .find(|e| e.id == id)
                .ok_or(DedupError::EntryNotFound(id))?;
            scores.push(ScoredEntry {
                entry_id: id,
                quality_score: quality::quality_score(entry, &self.config),
            });
        }

        // Highest score wins; ties go to the first in the given order
        let mut keep_entry_id = scores[0].entry_id;
        let mut best_score = scores[0].quality_score;
        for scored in &scores[1..] {
            if scored.quality_score > best_score {
                best_score = scored.quality_score;
                keep_entry_id = scored.entry_id;
            }
        }

        Ok(BestSelection {
            keep_entry_id,
            discard_entry_ids: entry_ids
                .iter()
                .copied()
                .filter(|id| *id != keep_entry_id)
                .collect(),
            scores,
        })
    }

    /// Library-wide duplicate statistics.
    pub async fn stats(&self) -> Result<DedupStats> {
        groups::stats(&self.pool)
            .await
            .with_context("computing duplicate statistics")
    }
}
