// Time sources and the cooperative host tick
//
// Every wait in the harness is "yield one tick, then compare a monotonic clock",
// never a blocking sleep. The clock is injectable so catch-up behaviour can be
// exercised deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Monotonic, unscaled time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Real-time clock backed by tokio's monotonic `Instant`.
///
/// Under a paused tokio runtime this follows the virtual timer, which is what the
/// end-to-end tests rely on.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for simulating stalls.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.nanos.store(duration_to_nanos(now), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Shortest tick a [`Ticker`] will run at.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Longest tick a [`Ticker`] will run at. Saturated settings (`.inf`) land here
/// instead of overflowing the timer deadline.
pub const MAX_TICK_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// The host update cadence.
///
/// `tick()` always suspends until the next period boundary (the first tick is not
/// immediate), so "yield one tick" really hands control back to the scheduler.
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    /// `period` is bounded to `[1 ms, MAX_TICK_PERIOD]`.
    pub fn new(period: Duration) -> Self {
        let period = period.clamp(MIN_TICK_PERIOD, MAX_TICK_PERIOD);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Suspend for exactly one tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Suspend for one tick unless `cancel` fires first.
    ///
    /// Returns `false` when cancelled. A cancel that is already pending wins
    /// over a ready tick.
    pub async fn tick_unless_cancelled(&mut self, cancel: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => false,
            _ = self.interval.tick() => true,
        }
    }

    /// Suspend tick by tick until `duration` has passed on `clock`.
    ///
    /// A zero duration returns without yielding. Returns `false` when cancelled.
    pub async fn hold(
        &mut self,
        clock: &dyn Clock,
        duration: Duration,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        let start = clock.now();
        while clock.now().saturating_sub(start) < duration {
            if !self.tick_unless_cancelled(cancel).await {
                return false;
            }
        }
        true
    }
}

/// Resolve once `cancel` holds `true`.
///
/// If the sender is gone the signal can never fire, so this never resolves.
pub async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
