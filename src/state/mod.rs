// Run state management
//
// This module provides the RunStateManager which publishes RunState snapshots
// lock-free and emits change events for summary/CLI consumers.

use crate::models::{RunConfig, RunPhase, RunState};
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// Change events emitted when run state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// Run bookkeeping was cleared for a new run
    RunReset,

    /// The orchestrator moved to another phase
    PhaseChanged { from: RunPhase, to: RunPhase },

    /// A soft reset cycle finished
    ResetCompleted { count: u64, at: Duration },
}

/// Thread-safe run state holder with event emission
///
/// - Readers get snapshots without taking any lock ([`snapshot()`](Self::snapshot),
///   [`read()`](Self::read)); the aggregator polls this at display rate
/// - Writers go through [`update()`](Self::update), which serializes mutations,
///   publishes the new state atomically and emits [`RunEvent`]s
/// - Only the orchestrator writes
///
/// # Related Types
///
/// - [`crate::models::RunState`]: The underlying state structure
/// - [`crate::orchestrator::SoakRunner`]: The only writer
/// - [`crate::summary::SummaryAggregator`]: Primary reader
pub struct RunStateManager {
    /// Current state, swapped wholesale on every update
    state: Arc<ArcSwap<RunState>>,

    /// Serializes read-modify-write cycles so concurrent updates are not lost
    write_lock: Arc<Mutex<()>>,

    /// Broadcast channel for emitting state change events
    event_tx: broadcast::Sender<RunEvent>,
}

impl RunStateManager {
    /// Create a new RunStateManager with an idle state
    ///
    /// The broadcast channel buffers 100 events.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(ArcSwap::from_pointee(RunState::default())),
            write_lock: Arc::new(Mutex::new(())),
            event_tx,
        }
    }

    /// Get a copy of the current state
    pub fn snapshot(&self) -> RunState {
        RunState::clone(&self.state.load())
    }

    /// Execute a function against the current state without copying it
    ///
    /// # Example
    /// ```ignore
    /// let active = run_state.read(|state| state.phase.is_active());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        f(&self.state.load())
    }

    /// Update the state and emit change events
    ///
    /// 1. Copies the current state
    /// 2. Applies the update function to the copy
    /// 3. Publishes the copy
    /// 4. Emits the detected changes
    ///
    /// Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<RunEvent>
    where
        F: FnOnce(&mut RunState),
    {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let old_state = self.state.load_full();
        let mut new_state = RunState::clone(&old_state);

        update_fn(&mut new_state);

        let changes = detect_changes(&old_state, &new_state);
        self.state.store(Arc::new(new_state));

        for change in &changes {
            // Nobody listening is fine
            let _ = self.event_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    // Convenience methods used by the orchestrator

    /// Claim the state for a new run and move it to `Warmup`
    ///
    /// Fails with the phase of the run in progress if one is already active.
    /// Check and claim happen under the writer lock, so two callers can never
    /// both succeed.
    pub fn begin_run(&self, config: &RunConfig) -> Result<Vec<RunEvent>, RunPhase> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let old_state = self.state.load_full();
        if old_state.phase.is_active() {
            return Err(old_state.phase);
        }

        let mut new_state = RunState::clone(&old_state);
        new_state.reset_run_state();
        new_state.scenario = config.scenario;
        new_state.run_duration = config.run;
        new_state.reset_interval = config.effective_reset_interval();
        new_state.phase = RunPhase::Warmup;

        let mut changes = vec![RunEvent::RunReset];
        changes.extend(detect_changes(&old_state, &new_state));
        self.state.store(Arc::new(new_state));

        for change in &changes {
            let _ = self.event_tx.send(change.clone());
        }
        Ok(changes)
    }

    pub fn set_phase(&self, phase: RunPhase) -> Vec<RunEvent> {
        self.update(|state| state.phase = phase)
    }

    /// Publish main-run progress
    pub fn set_progress(&self, elapsed: Duration, next_reset_at: Option<Duration>) -> Vec<RunEvent> {
        self.update(|state| {
            state.elapsed = elapsed;
            state.next_reset_at = next_reset_at;
        })
    }

    /// Record a completed soft reset at main-run time `at`
    pub fn record_reset(&self, at: Duration, next_reset_at: Option<Duration>) -> Vec<RunEvent> {
        self.update(|state| {
            state.record_reset(at);
            state.next_reset_at = next_reset_at;
        })
    }

    /// Leave any active phase (used by teardown on cancellation)
    pub fn release(&self) -> Vec<RunEvent> {
        self.update(|state| {
            if state.phase.is_active() {
                state.phase = RunPhase::Idle;
            }
        })
    }

    pub fn is_active(&self) -> bool {
        self.read(|state| state.phase.is_active())
    }
}

/// Detect what changed between two states and generate events
fn detect_changes(old: &RunState, new: &RunState) -> Vec<RunEvent> {
    let mut changes = Vec::new();

    if old.phase != new.phase {
        changes.push(RunEvent::PhaseChanged {
            from: old.phase,
            to: new.phase,
        });
    }

    if new.reset_count > old.reset_count {
        changes.push(RunEvent::ResetCompleted {
            count: new.reset_count,
            at: new.last_reset_at.unwrap_or_default(),
        });
    }

    changes
}

impl Default for RunStateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same underlying state and channel
impl Clone for RunStateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            write_lock: Arc::clone(&self.write_lock),
            event_tx: self.event_tx.clone(),
        }
    }
}
