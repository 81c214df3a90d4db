//! Shared helpers for tests.
//!
//! Only compiled for test builds. Provides a temp-file-backed database with
//! migrations applied, plus canned library entries for exercising the
//! detection and merge paths.

use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::db::{self, NewEntry};
use crate::model::LibraryEntry;

/// Create a migrated database in a fresh temp directory.
///
/// The directory handle must be kept alive for the duration of the test;
/// dropping it deletes the database file.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite:{}", db_path.display());
    let pool = db::init_db(&url).await.expect("init test db");
    (pool, dir)
}

/// An in-memory entry with plausible values for every field, for tests
/// that never touch the database. Override fields with struct update
/// syntax.
pub fn mock_entry(id: i64) -> LibraryEntry {
    LibraryEntry {
        id,
        path: format!("/music/test-{id}.mp3"),
        title: "Test Song".into(),
        artist: Some("Test Artist".into()),
        album: Some("Test Album".into()),
        genre: Some("Rock".into()),
        year: Some(2001),
        track_number: Some(1),
        duration_ms: Some(200_000),
        bitrate: Some(192),
        sample_rate: Some(44_100),
        format: Some("MP3".into()),
        file_size: Some(5_000_000),
        artwork_path: None,
        file_hash: None,
        play_count: 0,
        metadata_completeness: None,
        title_normalized: None,
        artist_normalized: None,
        album_normalized: None,
    }
}

/// Insert a plain entry at the given path and return its id.
pub async fn insert_mock_entry(pool: &SqlitePool, path: &str) -> i64 {
    db::insert_entry(
        pool,
        &NewEntry {
            path: path.to_string(),
            title: "Test Song".into(),
            artist: Some("Test Artist".into()),
            album: Some("Test Album".into()),
            genre: Some("Rock".into()),
            year: Some(2001),
            duration_ms: Some(200_000),
            bitrate: Some(192),
            format: Some("MP3".into()),
            file_size: Some(5_000_000),
            ..Default::default()
        },
    )
    .await
    .expect("insert mock entry")
}

/// Insert an entry with specific quality signals, for tests that compare
/// scores across copies.
pub async fn insert_sized_entry(
    pool: &SqlitePool,
    path: &str,
    format: Option<&str>,
    bitrate: Option<i64>,
    file_size: Option<i64>,
) -> i64 {
    db::insert_entry(
        pool,
        &NewEntry {
            path: path.to_string(),
            title: "Test Song".into(),
            artist: Some("Test Artist".into()),
            duration_ms: Some(200_000),
            format: format.map(String::from),
            bitrate,
            file_size,
            ..Default::default()
        },
    )
    .await
    .expect("insert sized entry")
}
