// Live summary
//
// Read-only, rate-limited status record for operators. Everything here reads
// snapshots (ArcSwap loads and atomics); nothing takes a lock held by a producer.

use crate::device::HandTracking;
use crate::diagnostics::{Classifier, LastFlag};
use crate::metrics::CounterSnapshot;
use crate::models::{RunPhase, Scenario};
use crate::orchestrator::clock::Clock;
use crate::samplers::{MemorySample, ResourceCache};
use crate::state::RunStateManager;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// One composed status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub scenario: Scenario,
    pub phase: RunPhase,
    pub elapsed: Duration,
    pub run_duration: Duration,
    pub reset_interval: Option<Duration>,
    pub reset_count: u64,
    pub next_reset_eta: Option<Duration>,
    pub counters: CounterSnapshot,
    pub last_flag: Option<LastFlag>,
    pub memory: Option<MemorySample>,
    /// `None` when no hand tracker is attached
    pub hands_running: Option<bool>,
}

impl StatusRecord {
    /// Ordered `label -> value` pairs, as shown to the operator.
    pub fn fields(&self) -> IndexMap<&'static str, String> {
        let mut fields = IndexMap::new();
        fields.insert("Scenario", self.scenario.to_string());
        fields.insert("Phase", self.phase.to_string());
        fields.insert(
            "Elapsed",
            format!("{} / {}", format_hms(self.elapsed), format_hms(self.run_duration)),
        );

        let soft_reset = match (self.reset_interval, self.next_reset_eta) {
            (Some(interval), Some(eta)) => format!(
                "every {} | next in {} | count {}",
                format_hms(interval),
                format_hms(eta),
                self.reset_count
            ),
            (Some(interval), None) => {
                format!("every {} | count {}", format_hms(interval), self.reset_count)
            }
            (None, _) => "disabled".to_string(),
        };
        fields.insert("Soft Reset", soft_reset);

        let hands = match self.hands_running {
            Some(true) => "running",
            Some(false) => "stopped",
            None => "not found",
        };
        fields.insert("Hand Tracking", hands.to_string());

        fields.insert("Warnings", self.counters.warnings.to_string());
        fields.insert("Errors", self.counters.errors.to_string());
        fields.insert("Flags", self.counters.flagged_events.to_string());
        fields.insert("NaN Poses", self.counters.invalid_pose_events.to_string());

        match &self.last_flag {
            Some(flag) => {
                fields.insert("Last Flag", flag.message.clone());
                fields.insert("Last Flag At", format_hms(flag.at));
            }
            None => {
                fields.insert("Last Flag", "-".to_string());
            }
        }

        let memory = self.memory.map_or_else(
            || "n/a".to_string(),
            |m| {
                format!(
                    "alloc {:.1} | reserved {:.1} | unused {:.1}",
                    m.allocated_mb, m.reserved_mb, m.unused_mb
                )
            },
        );
        fields.insert("Mem(MB)", memory);

        fields
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in self.fields() {
            writeln!(f, "{}: {}", label, value)?;
        }
        Ok(())
    }
}

/// Builds [`StatusRecord`]s at most once per refresh interval.
pub struct SummaryAggregator {
    state: RunStateManager,
    classifier: Arc<Classifier>,
    resources: Option<ResourceCache>,
    hands: Option<Arc<dyn HandTracking>>,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    last_refresh: Option<Duration>,
}

impl SummaryAggregator {
    pub fn new(
        state: RunStateManager,
        classifier: Arc<Classifier>,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            state,
            classifier,
            resources: None,
            hands: None,
            clock,
            refresh_interval,
            last_refresh: None,
        }
    }

    pub fn with_resources(mut self, cache: ResourceCache) -> Self {
        self.resources = Some(cache);
        self
    }

    pub fn with_hand_tracking(mut self, hands: Arc<dyn HandTracking>) -> Self {
        self.hands = Some(hands);
        self
    }

    /// A fresh record, or `None` if the last one is younger than the interval.
    pub fn refresh(&mut self) -> Option<StatusRecord> {
        let now = self.clock.now();
        let too_soon = self
            .last_refresh
            .is_some_and(|last| now.saturating_sub(last) < self.refresh_interval);
        if too_soon {
            return None;
        }
        self.last_refresh = Some(now);
        Some(self.build())
    }

    /// Compose a record now, ignoring the rate limit.
    pub fn build(&self) -> StatusRecord {
        let run = self.state.snapshot();
        let classified = self.classifier.snapshot();
        let memory = self
            .resources
            .as_ref()
            .and_then(|cache| cache.load_full())
            .map(|sample| *sample);

        StatusRecord {
            scenario: run.scenario,
            phase: run.phase,
            elapsed: run.elapsed,
            run_duration: run.run_duration,
            reset_interval: run.reset_interval,
            reset_count: run.reset_count,
            next_reset_eta: run.next_reset_eta(),
            counters: classified.counters,
            last_flag: classified.last_flag,
            memory,
            hands_running: self.hands.as_deref().map(|hands| hands.is_running()),
        }
    }
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
