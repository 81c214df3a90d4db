//! Transactional merge of a duplicate group into a single kept entry.
//!
//! A merge re-points everything that references the discarded copies at the
//! kept entry (play history, collection memberships, favorites), folds their
//! play counts and any metadata the kept entry is missing into it, deletes
//! the discarded rows, and marks the group resolved. All database work runs
//! in one transaction so a crash mid-merge leaves the library untouched.
//!
//! File deletion happens strictly after commit and is best-effort: a file
//! that cannot be removed becomes a warning on the [`MergeOutcome`], never
//! a rolled-back merge. The database is the source of truth; an orphaned
//! file on disk is recoverable, a half-merged library is not.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DedupError;
use crate::model::GroupStatus;

/// Result of a completed merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub group_id: i64,
    pub kept_entry_id: i64,
    pub discarded_entry_ids: Vec<i64>,
    /// Files removed from disk after commit
    pub deleted_files: Vec<String>,
    pub play_history_transferred: u64,
    pub collections_transferred: u64,
    pub favorites_transferred: u64,
    /// Non-fatal problems, currently only failed file deletions
    pub warnings: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    status: String,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    entry_id: i64,
    quality_score: f64,
}

/// Merge a duplicate group, keeping `keep_entry_id` and discarding the rest.
///
/// With `delete_files` set, the discarded entries' backing files are
/// removed from disk after the merge commits.
///
/// # Errors
///
/// - [`DedupError::GroupNotFound`] if the group does not exist
/// - [`DedupError::InvalidState`] if it is already resolved or ignored
/// - [`DedupError::NotAMember`] if the kept entry is not in the group
/// - [`DedupError::EntryNotFound`] if a member row points at a missing entry
pub async fn merge_group(
    pool: &SqlitePool,
    group_id: i64,
    keep_entry_id: i64,
    delete_files: bool,
) -> Result<MergeOutcome, DedupError> {
    let mut tx = pool.begin().await?;

    // Validate inside the transaction so concurrent merges serialize
    let group: Option<GroupRow> =
        sqlx::query_as("SELECT status FROM duplicate_groups WHERE id = ?")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
    let group = group.ok_or(DedupError::GroupNotFound(group_id))?;

    match GroupStatus::parse(&group.status) {
        Some(GroupStatus::Unresolved) => {}
        Some(status) => return Err(DedupError::InvalidState { group_id, status }),
        None => return Err(DedupError::GroupNotFound(group_id)),
    }

    let members: Vec<MemberRow> = sqlx::query_as(
        "SELECT entry_id, quality_score FROM duplicate_group_members
         WHERE group_id = ? ORDER BY quality_score DESC, id ASC",
    )
    .bind(group_id)
    .fetch_all(&mut *tx)
    .await?;

    if !members.iter().any(|m| m.entry_id == keep_entry_id) {
        return Err(DedupError::NotAMember {
            group_id,
            entry_id: keep_entry_id,
        });
    }

    let keep_exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM entries WHERE id = ?")
        .bind(keep_entry_id)
        .fetch_optional(&mut *tx)
        .await?;
    if keep_exists.is_none() {
        return Err(DedupError::EntryNotFound(keep_entry_id));
    }

    // Discards stay in stored-quality order so metadata fill prefers the
    // best remaining copy
    let discard_ids: Vec<i64> = members
        .iter()
        .map(|m| m.entry_id)
        .filter(|id| *id != keep_entry_id)
        .collect();

    let mut outcome = MergeOutcome {
        group_id,
        kept_entry_id: keep_entry_id,
        discarded_entry_ids: discard_ids.clone(),
        deleted_files: Vec::new(),
        play_history_transferred: 0,
        collections_transferred: 0,
        favorites_transferred: 0,
        warnings: Vec::new(),
    };

    let mut paths_to_delete = Vec::new();
    for &discard_id in &discard_ids {
        let path: Option<(String,)> = sqlx::query_as("SELECT path FROM entries WHERE id = ?")
            .bind(discard_id)
            .fetch_optional(&mut *tx)
            .await?;
        let (path,) = path.ok_or(DedupError::EntryNotFound(discard_id))?;
        paths_to_delete.push(path);

        outcome.play_history_transferred +=
            transfer_play_history(&mut tx, discard_id, keep_entry_id).await?;
        outcome.collections_transferred +=
            transfer_collections(&mut tx, discard_id, keep_entry_id).await?;
        outcome.favorites_transferred +=
            transfer_favorite(&mut tx, discard_id, keep_entry_id).await?;
    }

    fill_missing_metadata(&mut tx, keep_entry_id, &discard_ids).await?;
    accumulate_play_counts(&mut tx, keep_entry_id, &discard_ids).await?;

    for &discard_id in &discard_ids {
        // Cascades remove the discard's group membership rows
        sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(discard_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "UPDATE duplicate_groups
         SET status = 'resolved', master_entry_id = ?, resolved_at = ?
         WHERE id = ?",
    )
    .bind(keep_entry_id)
    .bind(Utc::now().to_rfc3339())
    .bind(group_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    // Disk cleanup only after the merge is durable
    if delete_files {
        for path in paths_to_delete {
            match std::fs::remove_file(Path::new(&path)) {
                Ok(()) => outcome.deleted_files.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(target: "dedup", path = %path, "File already gone");
                }
                Err(e) => {
                    tracing::warn!(target: "dedup", path = %path, error = %e, "Could not delete file");
                    outcome.warnings.push(format!("could not delete {path}: {e}"));
                }
            }
        }
    }

    tracing::info!(
        target: "dedup",
        group_id,
        kept = keep_entry_id,
        discarded = outcome.discarded_entry_ids.len(),
        "Merged duplicate group"
    );
    Ok(outcome)
}

/// Mark a group ignored without touching its entries.
///
/// # Errors
///
/// Fails with [`DedupError::GroupNotFound`] or [`DedupError::InvalidState`]
/// when the group is missing or already in a terminal state.
pub async fn ignore_group(pool: &SqlitePool, group_id: i64) -> Result<(), DedupError> {
    // One conditional statement so racing ignores cannot both succeed
    let result = sqlx::query(
        "UPDATE duplicate_groups SET status = 'ignored', resolved_at = ?
         WHERE id = ? AND status = 'unresolved'",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(group_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let group: Option<GroupRow> =
            sqlx::query_as("SELECT status FROM duplicate_groups WHERE id = ?")
                .bind(group_id)
                .fetch_optional(pool)
                .await?;
        let group = group.ok_or(DedupError::GroupNotFound(group_id))?;
        return match GroupStatus::parse(&group.status) {
            Some(status) => Err(DedupError::InvalidState { group_id, status }),
            None => Err(DedupError::GroupNotFound(group_id)),
        };
    }

    tracing::info!(target: "dedup", group_id, "Ignored duplicate group");
    Ok(())
}

/// Re-key the discard's play history onto the kept entry.
async fn transfer_play_history(
    tx: &mut Transaction<'_, Sqlite>,
    discard_id: i64,
    keep_id: i64,
) -> sqlx::Result<u64> {
    let result = sqlx::query("UPDATE play_history SET entry_id = ? WHERE entry_id = ?")
        .bind(keep_id)
        .bind(discard_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Move the discard's collection memberships to the kept entry, dropping
/// any that would duplicate an existing membership.
async fn transfer_collections(
    tx: &mut Transaction<'_, Sqlite>,
    discard_id: i64,
    keep_id: i64,
) -> sqlx::Result<u64> {
    sqlx::query(
        "DELETE FROM collection_entries WHERE entry_id = ? AND collection_id IN
         (SELECT collection_id FROM collection_entries WHERE entry_id = ?)",
    )
    .bind(discard_id)
    .bind(keep_id)
    .execute(&mut **tx)
    .await?;

    let result = sqlx::query("UPDATE collection_entries SET entry_id = ? WHERE entry_id = ?")
        .bind(keep_id)
        .bind(discard_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Carry a favorite over to the kept entry, preserving the earliest
/// favorited timestamp when both sides are favorited.
async fn transfer_favorite(
    tx: &mut Transaction<'_, Sqlite>,
    discard_id: i64,
    keep_id: i64,
) -> sqlx::Result<u64> {
    let discard_at: Option<(String,)> =
        sqlx::query_as("SELECT favorited_at FROM favorites WHERE entry_id = ?")
            .bind(discard_id)
            .fetch_optional(&mut **tx)
            .await?;
    let Some((discard_at,)) = discard_at else {
        return Ok(0);
    };

    sqlx::query("DELETE FROM favorites WHERE entry_id = ?")
        .bind(discard_id)
        .execute(&mut **tx)
        .await?;

    let keep_at: Option<(String,)> =
        sqlx::query_as("SELECT favorited_at FROM favorites WHERE entry_id = ?")
            .bind(keep_id)
            .fetch_optional(&mut **tx)
            .await?;

    match keep_at {
        None => {
            sqlx::query("INSERT INTO favorites (entry_id, favorited_at) VALUES (?, ?)")
                .bind(keep_id)
                .bind(&discard_at)
                .execute(&mut **tx)
                .await?;
            Ok(1)
        }
        Some((keep_at,)) if discard_at < keep_at => {
            // RFC 3339 timestamps order lexicographically
            sqlx::query("UPDATE favorites SET favorited_at = ? WHERE entry_id = ?")
                .bind(&discard_at)
                .bind(keep_id)
                .execute(&mut **tx)
                .await?;
            Ok(0)
        }
        Some(_) => Ok(0),
    }
}

/// Fill tag fields the kept entry is missing from the discards, best
/// quality first. Display values only; normalized columns follow suit.
/// Artist is never filled: the kept copy's attribution stands even
/// when absent.
async fn fill_missing_metadata(
    tx: &mut Transaction<'_, Sqlite>,
    keep_id: i64,
    discard_ids: &[i64],
) -> sqlx::Result<()> {
    for &discard_id in discard_ids {
        sqlx::query(
            r#"
            UPDATE entries SET
                album = COALESCE(album, (SELECT album FROM entries WHERE id = ?1)),
                genre = COALESCE(genre, (SELECT genre FROM entries WHERE id = ?1)),
                year = COALESCE(year, (SELECT year FROM entries WHERE id = ?1)),
                track_number = COALESCE(track_number,
                    (SELECT track_number FROM entries WHERE id = ?1)),
                artwork_path = COALESCE(artwork_path,
                    (SELECT artwork_path FROM entries WHERE id = ?1))
            WHERE id = ?2
            "#,
        )
        .bind(discard_id)
        .bind(keep_id)
        .execute(&mut **tx)
        .await?;
    }

    // Recompute the derived columns from whatever was filled in
    let row: Option<(String, Option<String>, Option<String>, Option<i64>, Option<String>,
        Option<String>, Option<i64>, Option<i64>)> = sqlx::query_as(
        "SELECT title, artist, album, year, genre, artwork_path, track_number, bitrate
         FROM entries WHERE id = ?",
    )
    .bind(keep_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((title, artist, album, year, genre, artwork_path, track_number, bitrate)) = row {
        use crate::dedup::normalizer;
        sqlx::query(
            "UPDATE entries SET title_normalized = ?, artist_normalized = ?,
             album_normalized = ?, metadata_completeness = ? WHERE id = ?",
        )
        .bind(normalizer::normalize_title(Some(&title)))
        .bind(normalizer::normalize_artist(artist.as_deref()))
        .bind(normalizer::normalize_album(album.as_deref()))
        .bind(normalizer::completeness_of(
            Some(&title),
            artist.as_deref(),
            album.as_deref(),
            year,
            genre.as_deref(),
            artwork_path.as_deref(),
            track_number,
            bitrate,
        ))
        .bind(keep_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Fold the discards' play counts into the kept entry.
async fn accumulate_play_counts(
    tx: &mut Transaction<'_, Sqlite>,
    keep_id: i64,
    discard_ids: &[i64],
) -> sqlx::Result<()> {
    for &discard_id in discard_ids {
        sqlx::query(
            "UPDATE entries SET play_count = play_count +
             (SELECT play_count FROM entries WHERE id = ?) WHERE id = ?",
        )
        .bind(discard_id)
        .bind(keep_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
