//! Duplicate group persistence and lifecycle queries.
//!
//! The group builder turns a confirmed cluster into a persisted
//! [`DuplicateGroup`](crate::model::DuplicateGroup) with scored members and
//! a designated master. Everything else here is read-side: listing groups,
//! loading one with its members, and library-wide statistics.
//!
//! Groups carry a `group_hash` - a digest of the sorted member id set - so
//! the same cluster re-detected on a later scan is recognized instead of
//! duplicated. A cluster whose hash already exists (typically a previously
//! ignored group) is skipped by the builder.

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::config::DedupConfig;
use crate::dedup::quality;
use crate::model::{
    DetectionType, DuplicateGroup, DuplicateGroupMember, GroupStatus, LibraryEntry,
};

/// Deterministic digest of a member id set.
///
/// Ids are sorted first, so member order never changes the hash.
pub fn group_hash(entry_ids: &[i64]) -> String {
    let mut sorted = entry_ids.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Delete all unresolved groups and their members.
///
/// Detection is not incremental: every pass starts from a clean slate and
/// recomputes. Resolved and ignored groups are history and stay put.
///
/// Returns the number of groups deleted.
pub async fn clear_unresolved(pool: &SqlitePool) -> sqlx::Result<u64> {
    sqlx::query(
        "DELETE FROM duplicate_group_members WHERE group_id IN
         (SELECT id FROM duplicate_groups WHERE status = 'unresolved')",
    )
    .execute(pool)
    .await?;

    let result = sqlx::query("DELETE FROM duplicate_groups WHERE status = 'unresolved'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// A freshly persisted group, as returned by [`create_group`].
#[derive(Debug, Clone, Serialize)]
pub struct PersistedGroup {
    pub id: i64,
    pub detection_type: &'static str,
    pub master_entry_id: i64,
    pub member_count: usize,
}

/// Persist a confirmed cluster as a duplicate group.
///
/// Members are quality-scored at detection time and sorted best-first; the
/// highest scorer becomes the master (ties broken by position in the sorted
/// order). Returns `None` when a group with the same member-set hash
/// already exists.
pub async fn create_group(
    pool: &SqlitePool,
    config: &DedupConfig,
    members: &[(&LibraryEntry, f64)],
    detection_type: DetectionType,
) -> sqlx::Result<Option<PersistedGroup>> {
    debug_assert!(members.len() >= 2, "a duplicate group needs two members");

    let ids: Vec<i64> = members.iter().map(|(e, _)| e.id).collect();
    let hash = group_hash(&ids);

    let mut scored: Vec<(&LibraryEntry, f64, f64)> = members
        .iter()
        .map(|(entry, similarity)| (*entry, *similarity, quality::quality_score(entry, config)))
        .collect();
    // Best first; stable sort keeps first occurrence ahead on ties
    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let master_entry_id = scored[0].0.id;

    let mut tx = pool.begin().await?;

    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO duplicate_groups
            (group_hash, detection_type, detection_reason, status, master_entry_id, created_at)
        VALUES (?, ?, ?, 'unresolved', ?, ?)
        ON CONFLICT(group_hash) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&hash)
    .bind(detection_type.as_str())
    .bind(detection_type.reason())
    .bind(master_entry_id)
    .bind(Utc::now().to_rfc3339())
    .fetch_optional(&mut *tx)
    .await?;

    let Some((group_id,)) = inserted else {
        // Same member set was grouped before (e.g. then ignored); honor it
        tx.rollback().await?;
        tracing::debug!(target: "dedup", hash = %hash, "Skipping already-known group");
        return Ok(None);
    };

    for (i, (entry, similarity, score)) in scored.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO duplicate_group_members
                (group_id, entry_id, quality_score, similarity_score, is_master)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(group_id)
        .bind(entry.id)
        .bind(score)
        .bind(similarity)
        .bind(i == 0)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(Some(PersistedGroup {
        id: group_id,
        detection_type: detection_type.as_str(),
        master_entry_id,
        member_count: members.len(),
    }))
}

/// Summary row for group listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GroupSummary {
    pub id: i64,
    pub detection_type: String,
    pub detection_reason: Option<String>,
    pub status: String,
    pub master_entry_id: Option<i64>,
    pub member_count: i64,
    pub created_at: String,
}

/// List groups in the given lifecycle state, newest first.
pub async fn list_groups(
    pool: &SqlitePool,
    status: GroupStatus,
) -> sqlx::Result<Vec<GroupSummary>> {
    sqlx::query_as::<_, GroupSummary>(
        r#"
        SELECT
            g.id, g.detection_type, g.detection_reason, g.status,
            g.master_entry_id, g.created_at,
            (SELECT COUNT(*) FROM duplicate_group_members m WHERE m.group_id = g.id)
                AS member_count
        FROM duplicate_groups g
        WHERE g.status = ?
        ORDER BY g.id DESC
        "#,
    )
    .bind(status.as_str())
    .fetch_all(pool)
    .await
}

/// One member of a group detail view, joined with its entry where the
/// entry still exists (merged-away entries are gone).
#[derive(Debug, Clone, Serialize)]
pub struct MemberDetail {
    pub entry_id: i64,
    pub quality_score: f64,
    pub similarity_score: f64,
    pub is_master: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub path: Option<String>,
    pub file_size: Option<i64>,
}

/// Full view of one duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupDetail {
    pub id: i64,
    pub detection_type: String,
    pub detection_reason: Option<String>,
    pub status: String,
    pub master_entry_id: Option<i64>,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub members: Vec<MemberDetail>,
}

/// Load a group with its members, best quality first.
///
/// Returns `None` when the group does not exist.
pub async fn get_group(pool: &SqlitePool, group_id: i64) -> sqlx::Result<Option<GroupDetail>> {
    let group: Option<DuplicateGroup> = sqlx::query_as(
        "SELECT id, group_hash, detection_type, detection_reason, status, master_entry_id,
                created_at, resolved_at
         FROM duplicate_groups WHERE id = ?",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?;

    let Some(group) = group else {
        return Ok(None);
    };

    #[derive(sqlx::FromRow)]
    struct MemberRow {
        entry_id: i64,
        quality_score: f64,
        similarity_score: f64,
        is_master: bool,
        title: Option<String>,
        artist: Option<String>,
        path: Option<String>,
        file_size: Option<i64>,
    }

    let members: Vec<MemberRow> = sqlx::query_as(
        r#"
        SELECT
            m.entry_id, m.quality_score, m.similarity_score, m.is_master,
            e.title, e.artist, e.path, e.file_size
        FROM duplicate_group_members m
        LEFT JOIN entries e ON e.id = m.entry_id
        WHERE m.group_id = ?
        ORDER BY m.quality_score DESC, m.id ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(GroupDetail {
        id: group.id,
        detection_type: group.detection_type,
        detection_reason: group.detection_reason,
        status: group.status,
        master_entry_id: group.master_entry_id,
        created_at: group.created_at,
        resolved_at: group.resolved_at,
        members: members
            .into_iter()
            .map(|m| MemberDetail {
                entry_id: m.entry_id,
                quality_score: m.quality_score,
                similarity_score: m.similarity_score,
                is_master: m.is_master,
                title: m.title,
                artist: m.artist,
                path: m.path,
                file_size: m.file_size,
            })
            .collect(),
    }))
}

/// Raw member rows for a group, in insertion order.
pub async fn get_members(
    pool: &SqlitePool,
    group_id: i64,
) -> sqlx::Result<Vec<DuplicateGroupMember>> {
    sqlx::query_as::<_, DuplicateGroupMember>(
        "SELECT id, group_id, entry_id, quality_score, similarity_score, is_master
         FROM duplicate_group_members WHERE group_id = ? ORDER BY id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
}

/// Library-wide duplicate statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupStats {
    pub total_groups: i64,
    pub unresolved: i64,
    pub resolved: i64,
    pub ignored: i64,
    /// Bytes reclaimable by resolving every unresolved group down to its
    /// largest member (sum of sizes minus max size, per group)
    pub potential_space_savings_bytes: i64,
}

/// Compute duplicate statistics across the whole library.
pub async fn stats(pool: &SqlitePool) -> sqlx::Result<DedupStats> {
    let counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM duplicate_groups GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut stats = DedupStats::default();
    for (status, count) in counts {
        stats.total_groups += count;
        match GroupStatus::parse(&status) {
            Some(GroupStatus::Unresolved) => stats.unresolved = count,
            Some(GroupStatus::Resolved) => stats.resolved = count,
            Some(GroupStatus::Ignored) => stats.ignored = count,
            None => {}
        }
    }

    let savings: Option<(Option<i64>,)> = sqlx::query_as(
        r#"
        SELECT SUM(group_savings) FROM (
            SELECT SUM(COALESCE(e.file_size, 0)) - MAX(COALESCE(e.file_size, 0))
                AS group_savings
            FROM duplicate_groups g
            JOIN duplicate_group_members m ON m.group_id = g.id
            JOIN entries e ON e.id = m.entry_id
            WHERE g.status = 'unresolved'
            GROUP BY g.id
        )
        "#,
    )
    .fetch_optional(pool)
    .await?;

    stats.potential_space_savings_bytes = savings.and_then(|(s,)| s).unwrap_or(0);
    Ok(stats)
}
