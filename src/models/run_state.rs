use crate::models::Scenario;
use std::fmt;
use std::time::Duration;

/// Lifecycle phase of a soak run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Warmup,
    Running,
    /// Inline soft reset sub-sequence of `Running`
    Resetting,
    Completed,
}

impl RunPhase {
    /// True while a run owns the device (a new run must be rejected).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunPhase::Warmup | RunPhase::Running | RunPhase::Resetting
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "Idle",
            RunPhase::Warmup => "Warmup",
            RunPhase::Running => "Running",
            RunPhase::Resetting => "Resetting",
            RunPhase::Completed => "Completed",
        };
        f.write_str(name)
    }
}

/// Mutable state of the active soak run.
///
/// Owned by the orchestrator through [`crate::state::RunStateManager`]; everyone
/// else only sees cloned snapshots.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RunState {
    pub phase: RunPhase,
    pub scenario: Scenario,

    /// Elapsed time of the main run (zero until `Running`)
    pub elapsed: Duration,
    pub run_duration: Duration,

    pub reset_count: u64,
    /// Main-run elapsed time of the most recently completed soft reset
    pub last_reset_at: Option<Duration>,
    /// `None` means no further reset is scheduled (soft reset disabled)
    pub next_reset_at: Option<Duration>,
    pub reset_interval: Option<Duration>,
}

impl RunState {
    /// Reset all run bookkeeping for a fresh run.
    pub fn reset_run_state(&mut self) {
        self.phase = RunPhase::Idle;
        self.elapsed = Duration::ZERO;
        self.run_duration = Duration::ZERO;
        self.reset_count = 0;
        self.last_reset_at = None;
        self.next_reset_at = None;
        self.reset_interval = None;
    }

    /// Time left until the next scheduled soft reset.
    pub fn next_reset_eta(&self) -> Option<Duration> {
        self.next_reset_at
            .map(|deadline| deadline.saturating_sub(self.elapsed))
    }

    /// Time left in the main run.
    pub fn remaining(&self) -> Duration {
        self.run_duration.saturating_sub(self.elapsed)
    }

    /// Record a completed soft reset at `at` (main-run elapsed).
    pub fn record_reset(&mut self, at: Duration) {
        self.reset_count += 1;
        // lastResetAt never moves backwards even if a caller passes a stale time
        let at = self.last_reset_at.map_or(at, |last| last.max(at));
        self.last_reset_at = Some(at);
    }
}
