//! Core data models for the media library.
//!
//! Defines the primary entities: [`LibraryEntry`], [`DuplicateGroup`], and
//! [`DuplicateGroupMember`]. These are derived from SQLx for database mapping.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `entries` - Catalogued playable files with extracted tags
//! - `duplicate_groups` - Clusters of entries believed to be duplicates
//! - `duplicate_group_members` - Group membership with per-entry scores

use sqlx::FromRow;

/// A catalogued playable file in the library.
///
/// Most quality signals are nullable - the scanning pipeline that fills
/// them is a separate subsystem, and older catalogs may lack them.
#[derive(Debug, Clone, FromRow)]
pub struct LibraryEntry {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Absolute file path (unique identifier)
    pub path: String,
    /// Track title (from metadata or filename)
    pub title: String,
    /// Artist name
    pub artist: Option<String>,
    /// Album name
    pub album: Option<String>,
    /// Genre
    pub genre: Option<String>,
    /// Release year
    pub year: Option<i64>,
    /// Track number on album
    pub track_number: Option<i64>,
    /// Duration in milliseconds
    pub duration_ms: Option<i64>,
    /// Bitrate in kbps
    pub bitrate: Option<i64>,
    /// Sample rate in Hz
    pub sample_rate: Option<i64>,
    /// Container format (e.g. "FLAC", "MP3")
    pub format: Option<String>,
    /// File size in bytes
    pub file_size: Option<i64>,
    /// Path to extracted artwork, if any
    pub artwork_path: Option<String>,
    /// Content hash of the backing file
    pub file_hash: Option<String>,
    /// Accumulated play count
    pub play_count: i64,
    /// Metadata completeness score (0-100), if assessed
    pub metadata_completeness: Option<i64>,
    /// Pre-computed normalized title (lowercase, cleaned)
    pub title_normalized: Option<String>,
    /// Pre-computed normalized artist
    pub artist_normalized: Option<String>,
    /// Pre-computed normalized album
    pub album_normalized: Option<String>,
}

/// How a duplicate group was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionType {
    /// Identical file content hash
    ExactHash,
    /// Fuzzy similarity on normalized metadata
    FuzzyMetadata,
    /// Same normalized title and duration bucket
    DurationMatch,
}

impl DetectionType {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactHash => "exact_hash",
            Self::FuzzyMetadata => "fuzzy_metadata",
            Self::DurationMatch => "duration_match",
        }
    }

    /// Human-readable reason attached to groups of this type.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ExactHash => "Identical file content",
            Self::FuzzyMetadata => "Similar metadata",
            Self::DurationMatch => "Same duration and similar title",
        }
    }
}

/// Lifecycle state of a duplicate group.
///
/// `Resolved` and `Ignored` are terminal - a group never returns to
/// `Unresolved` once it leaves that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupStatus {
    #[default]
    Unresolved,
    Resolved,
    Ignored,
}

impl GroupStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unresolved" => Some(Self::Unresolved),
            "resolved" => Some(Self::Resolved),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// A detected cluster of duplicate entries.
#[derive(Debug, Clone, FromRow)]
pub struct DuplicateGroup {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Digest of the sorted member id set, for idempotent re-identification
    pub group_hash: String,
    /// Detection method (see [`DetectionType`])
    pub detection_type: String,
    /// Human-readable reason
    pub detection_reason: Option<String>,
    /// Lifecycle state (see [`GroupStatus`])
    pub status: String,
    /// The recommended best copy (null once resolved entries are gone)
    pub master_entry_id: Option<i64>,
    /// Creation timestamp (RFC3339)
    pub created_at: String,
    /// Resolution timestamp (RFC3339), set on merge or ignore
    pub resolved_at: Option<String>,
}

/// Membership of one entry in a duplicate group.
#[derive(Debug, Clone, FromRow)]
pub struct DuplicateGroupMember {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Owning group
    pub group_id: i64,
    /// Referenced library entry
    pub entry_id: i64,
    /// Quality score computed at detection time (0-100)
    pub quality_score: f64,
    /// Similarity that triggered inclusion (1.0 for exact matches)
    pub similarity_score: f64,
    /// Whether this member is the recommended keeper
    pub is_master: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_type_strings() {
        assert_eq!(DetectionType::ExactHash.as_str(), "exact_hash");
        assert_eq!(DetectionType::FuzzyMetadata.as_str(), "fuzzy_metadata");
        assert_eq!(DetectionType::DurationMatch.as_str(), "duration_match");
        for t in [
            DetectionType::ExactHash,
            DetectionType::FuzzyMetadata,
            DetectionType::DurationMatch,
        ] {
            assert!(!t.reason().is_empty());
        }
    }

    #[test]
    fn test_group_status_roundtrip() {
        for s in [
            GroupStatus::Unresolved,
            GroupStatus::Resolved,
            GroupStatus::Ignored,
        ] {
            assert_eq!(GroupStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(GroupStatus::parse(""), None);
    }
}
