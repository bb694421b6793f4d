//! Periodic samplers.
//!
//! Each sampler is an independent task on its own ticker. They share nothing but
//! the log sink and the classifier, and all stop when their cancel channel flips
//! to `true` (or its sender is dropped). Stopping performs no final action.

pub mod heartbeat;
pub mod pose_guard;
pub mod resource;

pub use heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, Heartbeat};
pub use pose_guard::PoseGuard;
pub use resource::{
    DEFAULT_RESOURCE_INTERVAL, MemoryProbe, MemorySample, ProcMemoryProbe, ResourceCache,
    ResourceSampler,
};

use crate::orchestrator::clock::Ticker;
use std::time::Duration;
use tokio::sync::watch;

/// Call `on_tick` once per `period` until cancelled.
pub(crate) async fn run_periodic<F>(period: Duration, mut cancel: watch::Receiver<bool>, mut on_tick: F)
where
    F: FnMut(),
{
    let mut ticker = Ticker::new(period);
    loop {
        if *cancel.borrow() {
            break;
        }
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => on_tick(),
        }
    }
}
