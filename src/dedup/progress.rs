//! Shared progress state for a running detection pass.
//!
//! The detection pass is long-running and executes off the request path;
//! callers poll a [`ProgressHandle`] for phase and counter updates instead
//! of blocking on the scan. The handle is the sole synchronization point
//! between the scanning task and its pollers: all field access goes through
//! a `parking_lot::RwLock`, so pollers always see a consistent snapshot and
//! never a torn read of the counters.
//!
//! Handles are cheap to clone and independent of each other - tests build a
//! fresh handle per scan rather than sharing process-wide state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Phase of the detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPhase {
    #[default]
    Idle,
    Initializing,
    HashMatching,
    FuzzyMatching,
    DurationMatching,
    Complete,
    Error,
}

impl DetectionPhase {
    /// Display string (matches the serialized form).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::HashMatching => "hash_matching",
            Self::FuzzyMatching => "fuzzy_matching",
            Self::DurationMatching => "duration_matching",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// Snapshot of detection progress, safe to hand to pollers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionProgress {
    /// Whether a pass is currently running
    pub running: bool,
    /// Current phase
    pub phase: DetectionPhase,
    /// Total entries in this pass
    pub total_entries: u64,
    /// Entries processed so far
    pub processed_entries: u64,
    /// Label for the entry being examined
    pub current_entry: String,
    /// Groups persisted so far
    pub groups_found: u64,
    /// Duplicates found so far (sum over groups of member_count - 1)
    pub duplicates_found: u64,
    /// Error message if the pass failed
    pub error: Option<String>,
}

impl DetectionProgress {
    /// Percent complete (0.0 when nothing is loaded yet).
    pub fn percent(&self) -> f64 {
        if self.total_entries == 0 {
            0.0
        } else {
            self.processed_entries as f64 / self.total_entries as f64 * 100.0
        }
    }
}

/// Cloneable handle to shared detection progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<RwLock<DetectionProgress>>,
    cancelled: Arc<AtomicBool>,
}

impl ProgressHandle {
    /// Create a fresh handle in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the running flag for a new pass.
    ///
    /// Returns `false` if a pass is already running on this handle; the
    /// caller must not start a second one (it would race on the shared
    /// unresolved-groups table). On success the state is reset and the
    /// phase moves to `Initializing`.
    pub fn try_begin(&self) -> bool {
        let mut state = self.inner.write();
        if state.running {
            return false;
        }
        *state = DetectionProgress {
            running: true,
            phase: DetectionPhase::Initializing,
            ..Default::default()
        };
        self.cancelled.store(false, Ordering::SeqCst);
        true
    }

    /// Read a consistent snapshot of the current state.
    pub fn snapshot(&self) -> DetectionProgress {
        self.inner.read().clone()
    }

    /// Whether a pass is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.read().running
    }

    /// Request cooperative cancellation of the running pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Enter a new phase.
    pub fn set_phase(&self, phase: DetectionPhase) {
        self.inner.write().phase = phase;
    }

    /// Set the total entry count for this pass.
    pub fn set_total(&self, total: u64) {
        self.inner.write().total_entries = total;
    }

    /// Update the processed counter and current entry label.
    pub fn set_processed(&self, processed: u64, current: &str) {
        let mut state = self.inner.write();
        state.processed_entries = processed.min(state.total_entries);
        current.clone_into(&mut state.current_entry);
    }

    /// Update the group and duplicate counters.
    pub fn set_found(&self, groups: u64, duplicates: u64) {
        let mut state = self.inner.write();
        state.groups_found = groups;
        state.duplicates_found = duplicates;
    }

    /// Mark the pass complete.
    pub fn finish(&self) {
        let mut state = self.inner.write();
        state.phase = DetectionPhase::Complete;
        state.processed_entries = state.total_entries;
        state.running = false;
    }

    /// Record a failure and stop running.
    pub fn fail(&self, message: &str) {
        let mut state = self.inner.write();
        state.phase = DetectionPhase::Error;
        state.error = Some(message.to_string());
        state.running = false;
    }

    /// Return to idle after a cancelled pass.
    pub fn reset(&self) {
        *self.inner.write() = DetectionProgress::default();
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let progress = DetectionProgress {
            total_entries: 200,
            processed_entries: 50,
            ..Default::default()
        };
        assert_eq!(progress.percent(), 25.0);

        // No division by zero on an empty library
        assert_eq!(DetectionProgress::default().percent(), 0.0);
    }

    #[test]
    fn test_try_begin_claims_exclusively() {
        let handle = ProgressHandle::new();
        assert!(handle.try_begin());
        assert!(!handle.try_begin());

        handle.finish();
        assert!(handle.try_begin());
    }

    #[test]
    fn test_begin_resets_previous_state() {
        let handle = ProgressHandle::new();
        assert!(handle.try_begin());
        handle.set_total(10);
        handle.set_found(3, 7);
        handle.fail("boom");

        assert!(handle.try_begin());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.groups_found, 0);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.phase, DetectionPhase::Initializing);
    }

    #[test]
    fn test_processed_never_exceeds_total() {
        let handle = ProgressHandle::new();
        assert!(handle.try_begin());
        handle.set_total(5);
        handle.set_processed(12, "entry");
        assert_eq!(handle.snapshot().processed_entries, 5);
    }

    #[test]
    fn test_cancellation_flag() {
        let handle = ProgressHandle::new();
        assert!(handle.try_begin());
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!handle.is_cancelled());
        assert_eq!(handle.snapshot().phase, DetectionPhase::Idle);
    }

    #[test]
    fn test_concurrent_pollers_see_consistent_snapshots() {
        let handle = ProgressHandle::new();
        assert!(handle.try_begin());
        handle.set_total(1000);

        let writer = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for i in 0..1000u64 {
                    handle.set_processed(i, "entry");
                }
                handle.finish();
            })
        };
        let reader = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                loop {
                    let snapshot = handle.snapshot();
                    assert!(snapshot.processed_entries <= snapshot.total_entries);
                    if !snapshot.running {
                        break;
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
