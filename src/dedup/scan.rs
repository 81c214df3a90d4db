//! The full duplicate detection pass.
//!
//! Runs the three partitioners in precedence order over the whole library,
//! persisting each confirmed cluster as it is found. An entry claimed by an
//! earlier pass is invisible to later ones, so the most reliable evidence
//! (identical content) always wins over weaker signals.
//!
//! Detection is not incremental: every pass clears the unresolved groups
//! from the previous run and recomputes. Resolved and ignored groups are
//! kept, and a recomputed cluster whose member set matches one of them is
//! silently skipped by the group builder.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::DedupConfig;
use crate::dedup::groups;
use crate::dedup::partition::{self, Cluster, Clusterer, GreedyClusterer};
use crate::dedup::progress::{DetectionPhase, ProgressHandle};
use crate::error::DedupError;
use crate::model::{DetectionType, LibraryEntry};

/// Portions of the overall progress bar assigned to each phase.
const HASH_PHASE_END: u64 = 30;
const FUZZY_PHASE_END: u64 = 80;

/// Result of a completed detection pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionSummary {
    pub total_entries: u64,
    pub groups_found: u64,
    /// Redundant copies found (per group, member count minus one)
    pub duplicates_found: u64,
    pub exact_groups: u64,
    pub fuzzy_groups: u64,
    pub duration_groups: u64,
}

/// Run a full detection pass over the library.
///
/// Progress and cancellation flow through `progress`; the caller is
/// expected to have claimed it with
/// [`try_begin`](ProgressHandle::try_begin) and to release it afterwards.
///
/// # Errors
///
/// Returns [`DedupError::Cancelled`] when cancellation was requested, or a
/// database error. Either way the progress handle is left in a terminal
/// state (idle after cancellation, error after failure).
pub async fn find_all_duplicates(
    pool: &SqlitePool,
    config: &DedupConfig,
    progress: &ProgressHandle,
) -> Result<DetectionSummary, DedupError> {
    match run_detection(pool, config, progress).await {
        Ok(summary) => {
            progress.finish();
            tracing::info!(
                target: "dedup",
                entries = summary.total_entries,
                groups = summary.groups_found,
                duplicates = summary.duplicates_found,
                "Detection pass complete"
            );
            Ok(summary)
        }
        Err(DedupError::Cancelled) => {
            progress.reset();
            tracing::info!(target: "dedup", "Detection pass cancelled");
            Err(DedupError::Cancelled)
        }
        Err(e) => {
            progress.fail(&e.to_string());
            Err(e)
        }
    }
}

async fn run_detection(
    pool: &SqlitePool,
    config: &DedupConfig,
    progress: &ProgressHandle,
) -> Result<DetectionSummary, DedupError> {
    let cleared = groups::clear_unresolved(pool).await?;
    if cleared > 0 {
        tracing::debug!(target: "dedup", cleared, "Cleared unresolved groups from previous pass");
    }

    let entries = crate::db::get_all_entries(pool).await?;
    let total = entries.len() as u64;
    progress.set_total(total);

    let mut summary = DetectionSummary {
        total_entries: total,
        ..Default::default()
    };
    if entries.len() < 2 {
        return Ok(summary);
    }

    let mut claimed: HashSet<i64> = HashSet::new();

    // Phase 1: exact content hash
    check_cancelled(progress)?;
    progress.set_phase(DetectionPhase::HashMatching);
    let clusters = partition::partition_by_hash(&entries);
    persist_clusters(
        pool,
        config,
        progress,
        &entries,
        clusters,
        DetectionType::ExactHash,
        &mut claimed,
        &mut summary,
    )
    .await?;
    progress.set_processed(total * HASH_PHASE_END / 100, "");

    // Phase 2: fuzzy metadata over whatever phase 1 left unclaimed
    check_cancelled(progress)?;
    progress.set_phase(DetectionPhase::FuzzyMatching);
    let remaining = unclaimed(&entries, &claimed);
    let span = FUZZY_PHASE_END - HASH_PHASE_END;
    let len = remaining.len().max(1) as u64;
    let clusters = GreedyClusterer.cluster(&remaining, config, &mut |index, label| {
        let pct = HASH_PHASE_END + index as u64 * span / len;
        progress.set_processed(total * pct / 100, label);
    });
    persist_clusters(
        pool,
        config,
        progress,
        &remaining,
        clusters,
        DetectionType::FuzzyMetadata,
        &mut claimed,
        &mut summary,
    )
    .await?;
    progress.set_processed(total * FUZZY_PHASE_END / 100, "");

    // Phase 3: duration buckets as the catch-all
    check_cancelled(progress)?;
    progress.set_phase(DetectionPhase::DurationMatching);
    let remaining = unclaimed(&entries, &claimed);
    let clusters = partition::partition_by_duration(&remaining, config);
    persist_clusters(
        pool,
        config,
        progress,
        &remaining,
        clusters,
        DetectionType::DurationMatch,
        &mut claimed,
        &mut summary,
    )
    .await?;

    Ok(summary)
}

fn check_cancelled(progress: &ProgressHandle) -> Result<(), DedupError> {
    if progress.is_cancelled() {
        Err(DedupError::Cancelled)
    } else {
        Ok(())
    }
}

fn unclaimed(entries: &[LibraryEntry], claimed: &HashSet<i64>) -> Vec<LibraryEntry> {
    entries
        .iter()
        .filter(|e| !claimed.contains(&e.id))
        .cloned()
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn persist_clusters(
    pool: &SqlitePool,
    config: &DedupConfig,
    progress: &ProgressHandle,
    entries: &[LibraryEntry],
    clusters: Vec<Cluster>,
    detection_type: DetectionType,
    claimed: &mut HashSet<i64>,
    summary: &mut DetectionSummary,
) -> Result<(), DedupError> {
    for cluster in clusters {
        check_cancelled(progress)?;

        // A cluster touching an already-claimed entry is stale evidence
        if cluster
            .members
            .iter()
            .any(|m| claimed.contains(&entries[m.index].id))
        {
            continue;
        }

        let members: Vec<(&LibraryEntry, f64)> = cluster
            .members
            .iter()
            .map(|m| (&entries[m.index], m.similarity))
            .collect();

        for (entry, _) in &members {
            claimed.insert(entry.id);
        }

        if let Some(group) = groups::create_group(pool, config, &members, detection_type).await? {
            summary.groups_found += 1;
            summary.duplicates_found += group.member_count as u64 - 1;
            match detection_type {
                DetectionType::ExactHash => summary.exact_groups += 1,
                DetectionType::FuzzyMetadata => summary.fuzzy_groups += 1,
                DetectionType::DurationMatch => summary.duration_groups += 1,
            }
            progress.set_found(summary.groups_found, summary.duplicates_found);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, NewEntry};
    use crate::model::GroupStatus;
    use crate::test_utils::temp_db;

    fn begin() -> ProgressHandle {
        let progress = ProgressHandle::new();
        assert!(progress.try_begin());
        progress
    }

    async fn insert(
        pool: &SqlitePool,
        path: &str,
        title: &str,
        artist: Option<&str>,
        duration_ms: Option<i64>,
        file_hash: Option<&str>,
    ) -> i64 {
        db::insert_entry(
            pool,
            &NewEntry {
                path: path.to_string(),
                title: title.to_string(),
                artist: artist.map(String::from),
                duration_ms,
                file_hash: file_hash.map(String::from),
                format: Some("MP3".into()),
                bitrate: Some(192),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_library_finds_nothing() {
        let (pool, _dir) = temp_db().await;
        let progress = begin();
        let summary = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();
        assert_eq!(summary.groups_found, 0);
        assert_eq!(progress.snapshot().phase, DetectionPhase::Complete);
        assert!(!progress.is_running());
    }

    #[tokio::test]
    async fn test_exact_hash_takes_precedence_over_fuzzy() {
        let (pool, _dir) = temp_db().await;
        // Identical hashes and identical metadata: only an exact group forms
        insert(&pool, "/a.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;
        insert(&pool, "/b.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;

        let progress = begin();
        let summary = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();
        assert_eq!(summary.groups_found, 1);
        assert_eq!(summary.exact_groups, 1);
        assert_eq!(summary.fuzzy_groups, 0);
        assert_eq!(summary.duplicates_found, 1);
    }

    #[tokio::test]
    async fn test_three_phase_pass_finds_each_kind() {
        let (pool, _dir) = temp_db().await;
        // Exact pair
        insert(&pool, "/a1.mp3", "Alpha", Some("X"), Some(100_000), Some("h1")).await;
        insert(&pool, "/a2.mp3", "Alpha", Some("X"), Some(100_000), Some("h1")).await;
        // Fuzzy pair, distinct hashes
        insert(&pool, "/b1.mp3", "Beta Song", Some("Y"), Some(150_000), Some("h2")).await;
        insert(&pool, "/b2.mp3", "Beta  Song", Some("Y"), Some(150_500), Some("h3")).await;
        // Duration pair: titles match but artists differ enough to fail
        // fuzzy, durations land in the same bucket
        insert(&pool, "/c1.mp3", "Gamma", Some("Completely Unrelated"), Some(200_000), Some("h4"))
            .await;
        insert(&pool, "/c2.mp3", "Gamma", Some("Somebody Else Entirely"), Some(201_000), Some("h5"))
            .await;

        let progress = begin();
        let summary = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();
        assert_eq!(summary.exact_groups, 1);
        assert_eq!(summary.fuzzy_groups, 1);
        assert_eq!(summary.duration_groups, 1);
        assert_eq!(summary.groups_found, 3);
        assert_eq!(summary.duplicates_found, 3);
    }

    #[tokio::test]
    async fn test_hash_pair_with_fuzzy_boundary_third_entry() {
        let (pool, _dir) = temp_db().await;
        // a and b share a content hash; c has no hash but matches a on
        // normalized title and duration, with an artist only on c's side
        let a = insert(&pool, "/a.mp3", "Song", None, Some(200_000), Some("H1")).await;
        insert(&pool, "/b.mp3", "Song (copy)", None, Some(200_000), Some("H1")).await;
        let c = insert(&pool, "/c.mp3", "song", Some("X"), Some(199_500), None).await;

        // Pairwise, a-c clears the threshold: identical normalized titles
        // and the absent-vs-present artist term is skipped, not penalized
        let entry_a = db::get_entry_by_id(&pool, a).await.unwrap().unwrap();
        let entry_c = db::get_entry_by_id(&pool, c).await.unwrap().unwrap();
        let similarity = crate::dedup::partition::metadata_similarity(&entry_a, &entry_c);
        assert!(similarity >= DedupConfig::default().fuzzy_threshold);

        // But the hash pass claims a first, so only {a, b} forms
        let progress = begin();
        let summary = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();
        assert_eq!(summary.groups_found, 1);
        assert_eq!(summary.exact_groups, 1);
        assert_eq!(summary.fuzzy_groups, 0);
        assert_eq!(summary.duration_groups, 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (pool, _dir) = temp_db().await;
        insert(&pool, "/a.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;
        insert(&pool, "/b.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;

        let progress = begin();
        find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();

        assert!(progress.try_begin());
        let summary = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();

        assert_eq!(summary.groups_found, 1);
        let unresolved = groups::list_groups(&pool, GroupStatus::Unresolved)
            .await
            .unwrap();
        assert_eq!(unresolved.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_respects_ignored_groups() {
        let (pool, _dir) = temp_db().await;
        insert(&pool, "/a.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;
        insert(&pool, "/b.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;

        let progress = begin();
        find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();
        let group = &groups::list_groups(&pool, GroupStatus::Unresolved).await.unwrap()[0];
        crate::dedup::merge::ignore_group(&pool, group.id).await.unwrap();

        // Re-detection recognizes the ignored member set and does not
        // resurrect it
        assert!(progress.try_begin());
        let summary = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();
        assert_eq!(summary.groups_found, 0);
        assert!(
            groups::list_groups(&pool, GroupStatus::Unresolved)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            groups::list_groups(&pool, GroupStatus::Ignored)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancellation_before_start() {
        let (pool, _dir) = temp_db().await;
        insert(&pool, "/a.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;
        insert(&pool, "/b.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;

        let progress = begin();
        progress.cancel();
        let err = find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, DedupError::Cancelled));
        assert_eq!(progress.snapshot().phase, DetectionPhase::Idle);
        assert!(!progress.is_running());
    }

    #[tokio::test]
    async fn test_progress_reports_terminal_state() {
        let (pool, _dir) = temp_db().await;
        insert(&pool, "/a.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;
        insert(&pool, "/b.mp3", "Song", Some("Artist"), Some(200_000), Some("h1")).await;

        let progress = begin();
        find_all_duplicates(&pool, &DedupConfig::default(), &progress)
            .await
            .unwrap();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.phase, DetectionPhase::Complete);
        assert_eq!(snapshot.percent(), 100.0);
        assert_eq!(snapshot.groups_found, 1);
        assert_eq!(snapshot.duplicates_found, 1);
    }
}
