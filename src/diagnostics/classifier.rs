// Anomaly classifier
//
// Single home for failure-signature detection. Every producer (log ingestion,
// pose guard) routes through here so the flagged pattern list exists exactly once.

use crate::device::{Handedness, JointId, Vec3};
use crate::diagnostics::LogSink;
use crate::metrics::{ClassificationCounters, CounterSnapshot};
use crate::orchestrator::clock::Clock;
use arc_swap::ArcSwapOption;
use regex::RegexSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Known failure signatures (case-sensitive substrings).
pub const FLAGGED_PATTERNS: [&str; 7] = [
    "FrameSetCollator",
    "deadlineMissed",
    "muxModeMisMatch",
    "releasing incomplete frame set",
    "onFrameSetAvailable",
    "HANDTRACKING NaN",
    "[HAND_NaN]",
];

/// Longest last-flag message kept for the summary (including the ellipsis).
pub const LAST_FLAG_MAX_CHARS: usize = 140;

/// Severity of an ingested log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Most recent flagged event.
#[derive(Debug, Clone, PartialEq)]
pub struct LastFlag {
    pub message: String,
    /// Elapsed time since the classifier session started
    pub at: Duration,
}

/// Counters plus last flag at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassifierSnapshot {
    pub counters: CounterSnapshot,
    pub last_flag: Option<LastFlag>,
}

/// Turns raw log lines and joint poses into counted, timestamped anomalies.
///
/// All methods take `&self`; counters are atomics and the last flag is swapped
/// in atomically, so the classifier can be shared as `Arc<Classifier>`.
pub struct Classifier {
    patterns: RegexSet,
    counters: ClassificationCounters,
    last_flag: ArcSwapOption<LastFlag>,
    session_start_nanos: AtomicU64,
    clock: Arc<dyn Clock>,
    sink: Arc<LogSink>,
}

impl Classifier {
    /// Create a classifier whose session starts now on `clock`.
    pub fn new(sink: Arc<LogSink>, clock: Arc<dyn Clock>) -> Self {
        let escaped = FLAGGED_PATTERNS.iter().map(|p| regex::escape(p));
        let start = clock.now();
        Self {
            patterns: RegexSet::new(escaped).expect("Invalid flagged pattern set"),
            counters: ClassificationCounters::new(),
            last_flag: ArcSwapOption::empty(),
            session_start_nanos: AtomicU64::new(duration_to_nanos(start)),
            clock,
            sink,
        }
    }

    /// True if `message` contains any known failure signature.
    pub fn is_flagged(&self, message: &str) -> bool {
        self.patterns.is_match(message)
    }

    /// Count a log event by severity and flag it if it matches a signature.
    ///
    /// A message matching several signatures is still one flagged event.
    /// Returns whether the message was flagged.
    pub fn classify_log_event(&self, severity: Severity, message: &str) -> bool {
        match severity {
            Severity::Warning => self.counters.record_warning(),
            Severity::Error => self.counters.record_error(),
            Severity::Info => {}
        }

        let flagged = self.is_flagged(message);
        if flagged {
            self.record_flag(message);
        }
        flagged
    }

    /// Check a joint position for NaN/inf components.
    ///
    /// An invalid pose is written to the diagnostic log as
    /// `[HAND_NaN] {hand} {joint} pos=(x,y,z)` and counted as both an invalid
    /// pose and a flagged event. Returns whether the pose was invalid.
    pub fn classify_pose(&self, hand: Handedness, joint: JointId, position: Vec3) -> bool {
        if position.is_finite() {
            return false;
        }

        let message = format!(
            "[HAND_NaN] {} {} pos=({},{},{})",
            hand, joint, position.x, position.y, position.z
        );
        self.counters.record_invalid_pose();
        self.sink.write_line(&message);
        tracing::warn!("{}", message);
        self.record_flag(&message);
        true
    }

    fn record_flag(&self, message: &str) {
        self.counters.record_flag();
        self.last_flag.store(Some(Arc::new(LastFlag {
            message: trim_message(message, LAST_FLAG_MAX_CHARS),
            at: self.elapsed(),
        })));
    }

    /// Elapsed time since the session started.
    pub fn elapsed(&self) -> Duration {
        let start = Duration::from_nanos(self.session_start_nanos.load(Ordering::Relaxed));
        self.clock.now().saturating_sub(start)
    }

    /// Start a new session: zero counters, forget the last flag.
    pub fn reset(&self) {
        self.counters.reset();
        self.last_flag.store(None);
        self.session_start_nanos
            .store(duration_to_nanos(self.clock.now()), Ordering::Relaxed);
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn last_flag(&self) -> Option<Arc<LastFlag>> {
        self.last_flag.load_full()
    }

    pub fn snapshot(&self) -> ClassifierSnapshot {
        ClassifierSnapshot {
            counters: self.counters(),
            last_flag: self.last_flag().map(|flag| (*flag).clone()),
        }
    }

    pub fn log_summary(&self) {
        self.counters.log_summary();
        if let Some(flag) = self.last_flag() {
            tracing::info!("Last flag at {:.2}s: {}", flag.at.as_secs_f64(), flag.message);
        }
    }
}

/// Trim whitespace and cap to `max` characters, ending in `...` when cut.
///
/// Empty input becomes `-`.
pub fn trim_message(message: &str, max: usize) -> String {
    let message = message.trim();
    if message.is_empty() {
        return "-".to_string();
    }
    if message.chars().count() <= max {
        return message.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut trimmed: String = message.chars().take(keep).collect();
    trimmed.push_str("...");
    trimmed
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::clock::ManualClock;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn classifier() -> (Classifier, Arc<ManualClock>, Arc<LogSink>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let sink = Arc::new(LogSink::new(dir));
        let clock = Arc::new(ManualClock::new());
        let classifier = Classifier::new(Arc::clone(&sink), clock.clone());
        (classifier, clock, sink, temp_dir)
    }

    #[test]
    fn test_severity_counting() {
        let (classifier, _clock, _sink, _tmp) = classifier();

        classifier.classify_log_event(Severity::Info, "all good");
        classifier.classify_log_event(Severity::Warning, "slow frame");
        classifier.classify_log_event(Severity::Error, "camera lost");
        classifier.classify_log_event(Severity::Error, "camera lost again");

        let counters = classifier.counters();
        assert_eq!(counters.warnings, 1);
        assert_eq!(counters.errors, 2);
        assert_eq!(counters.flagged_events, 0);
        assert!(classifier.last_flag().is_none());
    }

    #[test]
    fn test_every_pattern_flags() {
        let (classifier, _clock, _sink, _tmp) = classifier();

        for pattern in FLAGGED_PATTERNS {
            let message = format!("xrRuntime: {} seen", pattern);
            assert!(classifier.classify_log_event(Severity::Info, &message));
        }

        assert_eq!(
            classifier.counters().flagged_events,
            FLAGGED_PATTERNS.len() as u64
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let (classifier, _clock, _sink, _tmp) = classifier();
        assert!(!classifier.classify_log_event(Severity::Warning, "framesetcollator stalled"));
        assert!(!classifier.classify_log_event(Severity::Warning, "DEADLINEMISSED"));
        assert_eq!(classifier.counters().flagged_events, 0);
    }

    #[test]
    fn test_multiple_patterns_count_once() {
        let (classifier, clock, _sink, _tmp) = classifier();
        clock.set(Duration::from_secs(12));

        classifier.classify_log_event(
            Severity::Warning,
            "FrameSetCollator: deadlineMissed, muxModeMisMatch",
        );

        assert_eq!(classifier.counters().flagged_events, 1);
        assert_eq!(classifier.counters().warnings, 1);
        let flag = classifier.last_flag().unwrap();
        assert_eq!(flag.at, Duration::from_secs(12));
        assert_eq!(flag.message, "FrameSetCollator: deadlineMissed, muxModeMisMatch");
    }

    #[test]
    fn test_invalid_pose_is_counted_once_and_logged() {
        let (classifier, clock, sink, _tmp) = classifier();
        clock.set(Duration::from_secs(42));

        let invalid = classifier.classify_pose(
            Handedness::Left,
            JointId::Wrist,
            Vec3::new(f64::NAN, 0.1, 0.2),
        );

        assert!(invalid);
        let counters = classifier.counters();
        assert_eq!(counters.invalid_pose_events, 1);
        assert_eq!(counters.flagged_events, 1);

        let flag = classifier.last_flag().unwrap();
        assert_eq!(flag.at, Duration::from_secs(42));
        assert_eq!(flag.message, "[HAND_NaN] Left Wrist pos=(NaN,0.1,0.2)");

        let content = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        assert!(content.contains("[HAND_NaN] Left Wrist pos=(NaN,0.1,0.2)"));
    }

    #[test]
    fn test_infinite_component_is_invalid() {
        let (classifier, _clock, _sink, _tmp) = classifier();
        assert!(classifier.classify_pose(
            Handedness::Right,
            JointId::ThumbTip,
            Vec3::new(0.0, f64::INFINITY, 0.0)
        ));
    }

    #[test]
    fn test_finite_pose_is_ignored() {
        let (classifier, _clock, sink, _tmp) = classifier();
        assert!(!classifier.classify_pose(
            Handedness::Right,
            JointId::IndexTip,
            Vec3::new(0.1, 1.2, -0.3)
        ));
        assert_eq!(classifier.counters(), CounterSnapshot::default());
        assert!(sink.current_path().is_none());
    }

    #[test]
    fn test_reset_restarts_session() {
        let (classifier, clock, _sink, _tmp) = classifier();
        classifier.classify_log_event(Severity::Error, "deadlineMissed");

        clock.set(Duration::from_secs(100));
        classifier.reset();
        assert_eq!(classifier.snapshot(), ClassifierSnapshot::default());

        clock.set(Duration::from_secs(103));
        classifier.classify_log_event(Severity::Info, "onFrameSetAvailable late");
        assert_eq!(classifier.last_flag().unwrap().at, Duration::from_secs(3));
    }

    #[test]
    fn test_trim_message() {
        assert_eq!(trim_message("  short  ", 140), "short");
        assert_eq!(trim_message("   ", 140), "-");

        let long = "x".repeat(200);
        let trimmed = trim_message(&long, 140);
        assert_eq!(trimmed.chars().count(), 140);
        assert!(trimmed.ends_with("..."));

        let exact = "y".repeat(140);
        assert_eq!(trim_message(&exact, 140), exact);
    }

    #[test]
    fn test_trim_message_is_char_safe() {
        let long = "é".repeat(150);
        let trimmed = trim_message(&long, 140);
        assert_eq!(trimmed.chars().count(), 140);
    }
}
