//! Duplicate detection and resolution engine.
//!
//! Detection runs in three passes of decreasing confidence: exact content
//! hash, fuzzy metadata similarity, then duration buckets as a catch-all.
//! Confirmed clusters are persisted as duplicate groups with quality-scored
//! members and a recommended master; groups are resolved by merging down to
//! one entry or marked ignored.
//!
//! [`Deduplicator`] is the entry point; the submodules carry the pieces:
//!
//! - [`normalizer`] - metadata string canonicalization
//! - [`quality`] - per-entry quality scoring
//! - [`partition`] - the three clustering passes
//! - [`groups`] - group persistence and queries
//! - [`merge`] - transactional group resolution
//! - [`scan`] - the full detection pass
//! - [`progress`] - shared progress state and cancellation
//! - [`service`] - the facade tying it together

pub mod groups;
pub mod merge;
pub mod normalizer;
pub mod partition;
pub mod progress;
pub mod quality;
pub mod scan;
pub mod service;

pub use groups::{DedupStats, GroupDetail, GroupSummary};
pub use merge::MergeOutcome;
pub use progress::{DetectionPhase, DetectionProgress, ProgressHandle};
pub use scan::DetectionSummary;
pub use service::{BestSelection, Deduplicator, DetectionStart};
