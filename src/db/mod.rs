//! Database module for library entry and dependent-record persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Library entry reads (the bulk load the detection pass runs on)
//! - Entry insertion (used by the catalog pipeline and tests)
//! - Play history, collection membership, and favorite records
//!
//! The duplicate engine itself lives in [`crate::dedup`]; this module is the
//! storage collaborator it talks to.

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::dedup::normalizer;
use crate::model::LibraryEntry;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_curator.db";

/// Columns selected for [`LibraryEntry`] reads.
const ENTRY_COLUMNS: &str = "id, path, title, artist, album, genre, year, track_number, \
     duration_ms, bitrate, sample_rate, format, file_size, artwork_path, file_hash, \
     play_count, metadata_completeness, title_normalized, artist_normalized, album_normalized";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Get all library entries.
///
/// This is the single bulk load the detection pass operates on.
pub async fn get_all_entries(pool: &SqlitePool) -> sqlx::Result<Vec<LibraryEntry>> {
    sqlx::query_as::<_, LibraryEntry>(&format!("SELECT {ENTRY_COLUMNS} FROM entries"))
        .fetch_all(pool)
        .await
}

/// Get a library entry by its database ID.
pub async fn get_entry_by_id(
    pool: &SqlitePool,
    entry_id: i64,
) -> sqlx::Result<Option<LibraryEntry>> {
    sqlx::query_as::<_, LibraryEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"
    ))
    .bind(entry_id)
    .fetch_optional(pool)
    .await
}

/// Get a set of library entries by id, in no particular order.
pub async fn get_entries_by_ids(
    pool: &SqlitePool,
    ids: &[i64],
) -> sqlx::Result<Vec<LibraryEntry>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id IN ({placeholders})");
    let mut query = sqlx::query_as::<_, LibraryEntry>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    query.fetch_all(pool).await
}

/// Fields for inserting a new library entry.
///
/// Everything except path and title is optional, mirroring what a tag
/// extraction pass may or may not produce.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub path: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub track_number: Option<i64>,
    pub duration_ms: Option<i64>,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub format: Option<String>,
    pub file_size: Option<i64>,
    pub artwork_path: Option<String>,
    pub file_hash: Option<String>,
    pub play_count: i64,
}

/// Insert a library entry, computing its normalized fields and metadata
/// completeness on the way in.
///
/// # Returns
///
/// The database ID of the inserted entry.
pub async fn insert_entry(pool: &SqlitePool, entry: &NewEntry) -> sqlx::Result<i64> {
    let title_normalized = normalizer::normalize_title(Some(&entry.title));
    let artist_normalized = normalizer::normalize_artist(entry.artist.as_deref());
    let album_normalized = normalizer::normalize_album(entry.album.as_deref());
    let completeness = normalizer::completeness_of(
        Some(&entry.title),
        entry.artist.as_deref(),
        entry.album.as_deref(),
        entry.year,
        entry.genre.as_deref(),
        entry.artwork_path.as_deref(),
        entry.track_number,
        entry.bitrate,
    );

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO entries (
            path, title, artist, album, genre, year, track_number, duration_ms,
            bitrate, sample_rate, format, file_size, artwork_path, file_hash,
            play_count, metadata_completeness,
            title_normalized, artist_normalized, album_normalized
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&entry.path)
    .bind(&entry.title)
    .bind(&entry.artist)
    .bind(&entry.album)
    .bind(&entry.genre)
    .bind(entry.year)
    .bind(entry.track_number)
    .bind(entry.duration_ms)
    .bind(entry.bitrate)
    .bind(entry.sample_rate)
    .bind(&entry.format)
    .bind(entry.file_size)
    .bind(&entry.artwork_path)
    .bind(&entry.file_hash)
    .bind(entry.play_count)
    .bind(completeness)
    .bind(title_normalized)
    .bind(artist_normalized)
    .bind(album_normalized)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

// ============================================================================
// Dependent records (play history, collections, favorites)
// ============================================================================

/// Record a play of an entry at the given timestamp (RFC3339), with how
/// long it was actually listened to, if known.
pub async fn add_play(
    pool: &SqlitePool,
    entry_id: i64,
    played_at: &str,
    play_duration_ms: Option<i64>,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO play_history (entry_id, played_at, play_duration_ms) VALUES (?, ?, ?)")
        .bind(entry_id)
        .bind(played_at)
        .bind(play_duration_ms)
        .execute(pool)
        .await?;
    Ok(())
}

/// Count history-of-play records for an entry.
pub async fn count_plays(pool: &SqlitePool, entry_id: i64) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM play_history WHERE entry_id = ?")
        .bind(entry_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Get or create a collection by name.
pub async fn get_or_create_collection(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM collections WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if let Some((id,)) = row {
        Ok(id)
    } else {
        let result = sqlx::query("INSERT INTO collections (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Add an entry to a collection. Idempotent - re-adding is a no-op.
pub async fn add_to_collection(
    pool: &SqlitePool,
    collection_id: i64,
    entry_id: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO collection_entries (collection_id, entry_id) VALUES (?, ?)
         ON CONFLICT(collection_id, entry_id) DO NOTHING",
    )
    .bind(collection_id)
    .bind(entry_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Count collection memberships for an entry.
pub async fn count_collection_memberships(
    pool: &SqlitePool,
    entry_id: i64,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM collection_entries WHERE entry_id = ?")
        .bind(entry_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Mark an entry as a favorite at the given timestamp (RFC3339).
///
/// A no-op if the entry is already favorited.
pub async fn add_favorite(
    pool: &SqlitePool,
    entry_id: i64,
    favorited_at: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO favorites (entry_id, favorited_at) VALUES (?, ?)
         ON CONFLICT(entry_id) DO NOTHING",
    )
    .bind(entry_id)
    .bind(favorited_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Get the favorite timestamp for an entry, if it is favorited.
pub async fn get_favorite(pool: &SqlitePool, entry_id: i64) -> sqlx::Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT favorited_at FROM favorites WHERE entry_id = ?")
            .bind(entry_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(at,)| at))
}

/// Count all favorite records. Used by merge tests to assert no duplicates.
pub async fn count_favorites(pool: &SqlitePool) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM favorites")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Count all entries in the catalog.
pub async fn count_entries(pool: &SqlitePool) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite:{}", db_path.display());

        let pool = init_db(&db_url).await.expect("Failed to init db");
        assert!(db_path.exists());

        // Verify we can query the tables
        let entries = get_all_entries(&pool).await.expect("Failed to query");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_insert_entry_computes_normalized_fields() {
        let (pool, _dir) = crate::test_utils::temp_db().await;

        let entry = NewEntry {
            path: "/music/song.flac".into(),
            title: "The  Song".into(),
            artist: Some("The Beatles".into()),
            album: Some("Abbey Road".into()),
            ..Default::default()
        };
        let id = insert_entry(&pool, &entry).await.unwrap();
        let stored = get_entry_by_id(&pool, id).await.unwrap().unwrap();

        // Titles keep their leading article, artists move it to the end
        assert_eq!(stored.title_normalized.as_deref(), Some("the song"));
        assert_eq!(stored.artist_normalized.as_deref(), Some("beatles, the"));
        assert_eq!(stored.album_normalized.as_deref(), Some("abbey road"));
        // title 20 + artist 25 + album 15
        assert_eq!(stored.metadata_completeness, Some(60));
    }

    #[tokio::test]
    async fn test_get_entries_by_ids() {
        let (pool, _dir) = crate::test_utils::temp_db().await;

        let a = crate::test_utils::insert_mock_entry(&pool, "/a.mp3").await;
        let b = crate::test_utils::insert_mock_entry(&pool, "/b.mp3").await;
        let _c = crate::test_utils::insert_mock_entry(&pool, "/c.mp3").await;

        let entries = get_entries_by_ids(&pool, &[a, b]).await.unwrap();
        assert_eq!(entries.len(), 2);

        let empty = get_entries_by_ids(&pool, &[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_play_history_and_collections() {
        let (pool, _dir) = crate::test_utils::temp_db().await;
        let id = crate::test_utils::insert_mock_entry(&pool, "/a.mp3").await;

        add_play(&pool, id, "2024-01-01T08:00:00Z", Some(180_000))
            .await
            .unwrap();
        add_play(&pool, id, "2024-01-02T08:00:00Z", None).await.unwrap();
        assert_eq!(count_plays(&pool, id).await.unwrap(), 2);

        let coll = get_or_create_collection(&pool, "Road Trip").await.unwrap();
        let coll_again = get_or_create_collection(&pool, "Road Trip").await.unwrap();
        assert_eq!(coll, coll_again);

        add_to_collection(&pool, coll, id).await.unwrap();
        add_to_collection(&pool, coll, id).await.unwrap(); // idempotent
        assert_eq!(count_collection_memberships(&pool, id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_favorites_are_unique_per_entry() {
        let (pool, _dir) = crate::test_utils::temp_db().await;
        let id = crate::test_utils::insert_mock_entry(&pool, "/a.mp3").await;

        add_favorite(&pool, id, "2024-01-01T00:00:00Z").await.unwrap();
        add_favorite(&pool, id, "2024-06-01T00:00:00Z").await.unwrap();

        assert_eq!(count_favorites(&pool).await.unwrap(), 1);
        assert_eq!(
            get_favorite(&pool, id).await.unwrap().as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }
}
