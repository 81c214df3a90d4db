//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - [`DedupError`]: Domain errors from the duplicate engine, surfaced as
//!   typed results so batch operations can collect per-item failures
//! - All errors implement `std::error::Error` for compatibility

use crate::model::GroupStatus;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Duplicate engine domain error
    #[error(transparent)]
    Dedup(#[from] DedupError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Domain errors from the duplicate detection and merge engine.
///
/// `GroupNotFound`, `EntryNotFound`, and `NotAMember` are client-correctable
/// (stale ids); `InvalidState` means the caller is looking at a group that
/// has already left the `unresolved` state and should refresh. Storage
/// failures pass through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    /// Duplicate group does not exist
    #[error("Duplicate group {0} not found")]
    GroupNotFound(i64),

    /// Library entry does not exist
    #[error("Library entry {0} not found")]
    EntryNotFound(i64),

    /// The selected keep entry is not a member of the group
    #[error("Entry {entry_id} is not a member of duplicate group {group_id}")]
    NotAMember { group_id: i64, entry_id: i64 },

    /// The group is not in the state the operation requires
    #[error("Duplicate group {group_id} is already {status}", status = .status.as_str())]
    InvalidState { group_id: i64, status: GroupStatus },

    /// The detection pass was cancelled cooperatively
    #[error("Detection pass cancelled")]
    Cancelled,

    /// A detection pass is already in flight on this library
    #[error("A detection pass is already running")]
    DetectionRunning,

    /// Underlying storage failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_error_display() {
        let err = DedupError::GroupNotFound(42);
        assert!(err.to_string().contains("42"));

        let err = DedupError::NotAMember {
            group_id: 7,
            entry_id: 13,
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("13"));
    }

    #[test]
    fn test_invalid_state_names_status() {
        let err = DedupError::InvalidState {
            group_id: 1,
            status: GroupStatus::Ignored,
        };
        assert!(err.to_string().contains("ignored"));
    }

    #[test]
    fn test_error_with_context() {
        let err: Error = DedupError::GroupNotFound(1).into();
        let msg = err.context("while merging").to_string();
        assert!(msg.contains("while merging"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::PoolClosed);
        let with_ctx = result.with_context("additional context");
        assert!(
            with_ctx
                .unwrap_err()
                .to_string()
                .contains("additional context")
        );
    }
}
