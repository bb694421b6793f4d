// Classification counters
//
// Lock-free anomaly counters shared by every producer thread/task

use std::sync::atomic::{AtomicU64, Ordering};

/// Anomaly counters for the current run.
///
/// Uses atomic operations so samplers, the log ingestion task and the
/// orchestrator can all record events without contending on a lock. Counters only
/// grow during a run; [`reset`](Self::reset) is reserved for the start of a new one.
#[derive(Debug, Default)]
pub struct ClassificationCounters {
    /// Warning-severity log events seen
    pub warnings: AtomicU64,

    /// Error-severity log events seen
    pub errors: AtomicU64,

    /// Log lines or sensor readings that matched a failure signature
    pub flagged_events: AtomicU64,

    /// Joint poses with non-finite coordinates
    pub invalid_pose_events: AtomicU64,
}

/// Plain copy of [`ClassificationCounters`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub warnings: u64,
    pub errors: u64,
    pub flagged_events: u64,
    pub invalid_pose_events: u64,
}

impl ClassificationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag(&self) {
        self.flagged_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_pose(&self) {
        self.invalid_pose_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            warnings: self.warnings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            flagged_events: self.flagged_events.load(Ordering::Relaxed),
            invalid_pose_events: self.invalid_pose_events.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter. Only called when a new run starts.
    pub fn reset(&self) {
        self.warnings.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.flagged_events.store(0, Ordering::Relaxed);
        self.invalid_pose_events.store(0, Ordering::Relaxed);
    }

    /// Log counters summary
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        tracing::info!("=== Classification Summary ===");
        tracing::info!(
            "Warnings: {}, errors: {}",
            snapshot.warnings,
            snapshot.errors
        );
        tracing::info!(
            "Flagged events: {}, invalid poses: {}",
            snapshot.flagged_events,
            snapshot.invalid_pose_events
        );
    }
}
