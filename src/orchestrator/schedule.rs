use std::time::Duration;

/// Soft reset deadlines for the main run.
///
/// Deadlines are relative to the start of the main run and advance by exactly one
/// interval per completed reset, so a stall that skips several intervals produces
/// the same number of resets as an uninterrupted run (they are caught up
/// back-to-back instead of silently dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    interval: Option<Duration>,
    next_deadline: Option<Duration>,
}

impl ResetSchedule {
    /// `None` disables soft reset for the whole run (deadline = infinity).
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            next_deadline: interval,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.next_deadline
    }

    pub fn is_due(&self, elapsed: Duration) -> bool {
        matches!(self.next_deadline, Some(deadline) if elapsed >= deadline)
    }

    /// Move the deadline forward by one interval after a reset completed.
    pub fn advance(&mut self) {
        if let (Some(interval), Some(deadline)) = (self.interval, self.next_deadline) {
            self.next_deadline = Some(deadline.saturating_add(interval));
        }
    }

    /// Number of resets that are due at `elapsed`.
    pub fn pending(&self, elapsed: Duration) -> u64 {
        match (self.interval, self.next_deadline) {
            (Some(interval), Some(deadline)) if elapsed >= deadline => {
                let behind = (elapsed - deadline).as_nanos() / interval.as_nanos().max(1);
                u64::try_from(behind).unwrap_or(u64::MAX).saturating_add(1)
            }
            _ => 0,
        }
    }
}
