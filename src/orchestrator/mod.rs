// Soak test orchestrator
//
// Idle -> Warmup -> Running (-> Resetting -> Running)* -> Completed
//
// All waits are one host tick at a time against an injectable monotonic clock.
// Missed reset deadlines are caught up back-to-back. Teardown lives in a drop
// guard so it also runs when the run task is aborted.

pub mod clock;
pub mod schedule;

pub use clock::{
    Clock, MAX_TICK_PERIOD, MIN_TICK_PERIOD, ManualClock, MonotonicClock, Ticker, wait_cancelled,
};
pub use schedule::ResetSchedule;

use crate::device::{HandTracking, PassthroughController};
use crate::diagnostics::{Classifier, LogSink};
use crate::models::{RunConfig, RunPhase};
use crate::state::RunStateManager;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Wait after shutting passthrough down before reapplying the scenario.
pub const TEARDOWN_GRACE: Duration = Duration::from_millis(250);

/// Default host tick (~90 Hz).
pub const DEFAULT_TICK: Duration = Duration::from_millis(11);

#[derive(Error, Debug)]
pub enum RunError {
    #[error("A soak run is already active (phase {0})")]
    AlreadyActive(RunPhase),

    #[error("Soak run task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { resets: u64 },
    Cancelled { resets: u64 },
}

impl RunOutcome {
    pub fn resets(&self) -> u64 {
        match self {
            RunOutcome::Completed { resets } | RunOutcome::Cancelled { resets } => *resets,
        }
    }
}

/// Drives one device through warmup, the main run and periodic soft resets.
///
/// Only one run can be active per [`RunStateManager`]; share the manager (or the
/// runner itself behind an `Arc`) to enforce that across callers.
pub struct SoakRunner {
    config: RunConfig,
    sink: Arc<LogSink>,
    classifier: Arc<Classifier>,
    state: RunStateManager,
    hands: Option<Arc<dyn HandTracking>>,
    passthrough: PassthroughController,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl SoakRunner {
    /// Runner with no device attached, a monotonic clock and the default tick.
    ///
    /// Attach collaborators with the `with_*` builders.
    pub fn new(config: RunConfig, sink: Arc<LogSink>, classifier: Arc<Classifier>) -> Self {
        Self {
            config,
            sink,
            classifier,
            state: RunStateManager::new(),
            hands: None,
            passthrough: PassthroughController::unavailable(),
            clock: Arc::new(MonotonicClock::new()),
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_hand_tracking(mut self, hands: Arc<dyn HandTracking>) -> Self {
        self.hands = Some(hands);
        self
    }

    pub fn with_passthrough(mut self, passthrough: PassthroughController) -> Self {
        self.passthrough = passthrough;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_state(mut self, state: RunStateManager) -> Self {
        self.state = state;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> &RunStateManager {
        &self.state
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn passthrough(&self) -> &PassthroughController {
        &self.passthrough
    }

    pub fn hands_running(&self) -> bool {
        self.hands.as_deref().is_some_and(|hands| hands.is_running())
    }

    /// Spawn the run on the current runtime.
    pub fn start(self: Arc<Self>) -> RunHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(cancel_rx).await });
        RunHandle { cancel_tx, task }
    }

    /// Execute a full run.
    ///
    /// Returns once the main run completed or `cancel` turned `true`. Teardown
    /// (passthrough off, termination line, phase released) always happens, also
    /// when the returned future is dropped mid-run.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) -> Result<RunOutcome, RunError> {
        if let Err(phase) = self.state.begin_run(&self.config) {
            tracing::warn!("Soak run requested while a run is {}; request ignored", phase);
            self.sink
                .write_line(format!("[TEST] Run request ignored: a run is already {}.", phase));
            return Err(RunError::AlreadyActive(phase));
        }

        let _teardown = TeardownGuard { runner: self };
        let mut ticker = Ticker::new(self.tick);

        let completed = self.warmup(&mut ticker, &mut cancel).await
            && self.main_run(&mut ticker, &mut cancel).await;

        let resets = self.state.read(|state| state.reset_count);
        if completed {
            Ok(RunOutcome::Completed { resets })
        } else {
            tracing::info!("Soak run cancelled after {} soft resets", resets);
            Ok(RunOutcome::Cancelled { resets })
        }
    }

    async fn warmup(&self, ticker: &mut Ticker, cancel: &mut watch::Receiver<bool>) -> bool {
        let description = self.config.describe();
        tracing::info!("Starting soak run: {}", description);
        self.sink.write_line(format!("[TEST] {}", description));

        self.classifier.reset();

        self.sink.write_line("[TEST] Applying scenario & warmup...");
        match self.hands.as_deref() {
            Some(hands) if !hands.is_running() => {
                self.sink.write_line("[TEST] Starting hand tracking...");
                hands.start();
            }
            Some(_) => {}
            None => tracing::warn!("Hand tracking unavailable; running without it"),
        }
        self.passthrough.apply_scenario(self.config.scenario);

        if !ticker.hold(&*self.clock, self.config.warmup, cancel).await {
            return false;
        }

        self.sink.write_line("[TEST] Warmup complete.");
        tracing::info!("Warmup complete");
        true
    }

    async fn main_run(&self, ticker: &mut Ticker, cancel: &mut watch::Receiver<bool>) -> bool {
        self.sink.write_line("[TEST] Entering main run...");
        tracing::info!("Entering main run ({:?})", self.config.run);

        let start = self.clock.now();
        let mut schedule = ResetSchedule::new(self.config.effective_reset_interval());
        self.state.update(|state| {
            state.phase = RunPhase::Running;
            state.elapsed = Duration::ZERO;
            state.next_reset_at = schedule.next_deadline();
        });

        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            self.state.set_progress(elapsed, schedule.next_deadline());

            // Catch up every missed deadline against this iteration's elapsed time
            while schedule.is_due(elapsed) {
                schedule.advance();
                if !self
                    .soft_reset(elapsed, schedule.next_deadline(), ticker, cancel)
                    .await
                {
                    return false;
                }
            }

            if elapsed >= self.config.run {
                break;
            }

            if !ticker.tick_unless_cancelled(cancel).await {
                return false;
            }
        }

        self.state.set_phase(RunPhase::Completed);
        self.sink.write_line("[TEST] Completed run.");
        tracing::info!(
            "Soak run completed with {} soft resets",
            self.state.read(|state| state.reset_count)
        );
        true
    }

    async fn soft_reset(
        &self,
        elapsed: Duration,
        next_deadline: Option<Duration>,
        ticker: &mut Ticker,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        self.state.set_phase(RunPhase::Resetting);
        self.sink.write_line(format!(
            "[RESET] Initiating soft reset (hands={}, passthrough={}) at {:.2}s...",
            self.config.reset_hands,
            self.config.reset_passthrough,
            elapsed.as_secs_f64()
        ));
        tracing::debug!("Soft reset begin at {:?}", elapsed);

        let hands = self.hands.as_deref().filter(|_| self.config.reset_hands);
        if let Some(hands) = hands {
            self.sink.write_line("[RESET] Stopping hand tracking...");
            hands.stop();
            if !ticker.tick_unless_cancelled(cancel).await {
                return false;
            }
            self.sink.write_line("[RESET] Starting hand tracking...");
            hands.start();
        }

        if self.config.reset_passthrough && self.passthrough.is_available() {
            self.sink.write_line("[RESET] Toggling passthrough off...");
            self.passthrough.shutdown_all();
            if !ticker.hold(&*self.clock, TEARDOWN_GRACE, cancel).await {
                return false;
            }
            self.passthrough.apply_scenario(self.config.scenario);
            self.sink.write_line("[RESET] Passthrough restored to scenario.");
        }

        self.state.record_reset(elapsed, next_deadline);
        let count = self.state.read(|state| state.reset_count);
        self.sink.write_line(format!(
            "[RESET] Complete. count={} lastAt={:.2}s",
            count,
            elapsed.as_secs_f64()
        ));
        tracing::info!("Soft reset {} complete", count);

        self.state.set_phase(RunPhase::Running);
        true
    }
}

/// Runs teardown when the run future finishes or is dropped.
struct TeardownGuard<'a> {
    runner: &'a SoakRunner,
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        let runner = self.runner;
        runner.passthrough.shutdown_all();

        let (phase, resets) = runner.state.read(|state| (state.phase, state.reset_count));
        runner.sink.write_line(format!(
            "[TEST] Soak runner stopped (phase={}, resets={}).",
            phase, resets
        ));
        tracing::info!("Soak runner stopped in phase {}", phase);

        runner.state.release();
    }
}

/// A run spawned with [`SoakRunner::start`].
pub struct RunHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<Result<RunOutcome, RunError>>,
}

impl RunHandle {
    /// Ask the run to stop; it finishes within one tick and still tears down.
    pub fn cancel(&self) {
        // The task may already be gone
        let _ = self.cancel_tx.send(true);
    }

    /// Abort the task outright. Teardown still runs as the future is dropped.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<RunOutcome, RunError> {
        self.task.await?
    }
}
