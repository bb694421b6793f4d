use crate::device::{HandTracking, Handedness, JointId};
use crate::diagnostics::Classifier;
use crate::samplers::run_periodic;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Per-tick sanity check of the wrist and fingertips of both hands.
///
/// Every resolvable joint goes through [`Classifier::classify_pose`]; hands that
/// are untracked (or a tracker that is absent or stopped) are skipped.
pub struct PoseGuard {
    classifier: Arc<Classifier>,
    hands: Option<Arc<dyn HandTracking>>,
    tick: Duration,
}

impl PoseGuard {
    pub fn new(
        classifier: Arc<Classifier>,
        hands: Option<Arc<dyn HandTracking>>,
        tick: Duration,
    ) -> Self {
        Self {
            classifier,
            hands,
            tick,
        }
    }

    /// Inspect every checked joint once. Returns the number of invalid poses.
    pub fn check_once(&self) -> usize {
        let Some(hands) = self.hands.as_deref() else {
            return 0;
        };
        if !hands.is_running() {
            return 0;
        }

        let mut invalid = 0;
        for hand in Handedness::BOTH {
            if !hands.is_tracked(hand) {
                continue;
            }
            for joint in JointId::CHECKED {
                let Some(position) = hands.joint_position(hand, joint) else {
                    continue;
                };
                if self.classifier.classify_pose(hand, joint, position) {
                    invalid += 1;
                }
            }
        }
        invalid
    }

    pub async fn run(self, cancel: watch::Receiver<bool>) {
        if self.hands.is_none() {
            tracing::warn!("Hand tracking unavailable; pose guard disabled");
            return;
        }
        run_periodic(self.tick, cancel, || {
            self.check_once();
        })
        .await;
    }

    pub fn spawn(self, cancel: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
