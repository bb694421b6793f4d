// In-process simulated device
//
// Used by the CLI for dry runs and by the tests. Both halves can share a
// CallLog so cross-subsystem ordering (stop -> start, shutdown -> reapply) is
// observable.

use crate::device::{HandTracking, Handedness, JointId, PassthroughCapability, Vec3};
use crate::models::PassthroughMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// One device mutation, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    HandStart,
    HandStop,
    SetRgb(bool),
    SetDepth(bool),
}

/// Shared, ordered record of device mutations.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<DeviceCall>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: DeviceCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Simulated hand tracker with both hands always in view.
#[derive(Debug)]
pub struct SimulatedHandTracking {
    running: AtomicBool,
    left_tracked: AtomicBool,
    right_tracked: AtomicBool,
    invalid_joint: Mutex<Option<(Handedness, JointId)>>,
    log: Arc<CallLog>,
}

impl SimulatedHandTracking {
    pub fn new() -> Self {
        Self::with_call_log(Arc::new(CallLog::new()))
    }

    pub fn with_call_log(log: Arc<CallLog>) -> Self {
        Self {
            running: AtomicBool::new(false),
            left_tracked: AtomicBool::new(true),
            right_tracked: AtomicBool::new(true),
            invalid_joint: Mutex::new(None),
            log,
        }
    }

    pub fn call_log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.log.calls()
    }

    pub fn set_tracked(&self, hand: Handedness, tracked: bool) {
        self.tracked_flag(hand).store(tracked, Ordering::SeqCst);
    }

    /// Make `joint` report `(NaN, 0.1, 0.2)` until cleared with `None`.
    pub fn set_invalid_joint(&self, joint: Option<(Handedness, JointId)>) {
        *self
            .invalid_joint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = joint;
    }

    fn tracked_flag(&self, hand: Handedness) -> &AtomicBool {
        match hand {
            Handedness::Left => &self.left_tracked,
            Handedness::Right => &self.right_tracked,
        }
    }
}

impl Default for SimulatedHandTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl HandTracking for SimulatedHandTracking {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.log.record(DeviceCall::HandStart);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.log.record(DeviceCall::HandStop);
    }

    fn is_tracked(&self, hand: Handedness) -> bool {
        self.is_running() && self.tracked_flag(hand).load(Ordering::SeqCst)
    }

    fn joint_position(&self, hand: Handedness, joint: JointId) -> Option<Vec3> {
        if !self.is_tracked(hand) {
            return None;
        }

        let invalid = *self
            .invalid_joint
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if invalid == Some((hand, joint)) {
            return Some(Vec3::new(f64::NAN, 0.1, 0.2));
        }

        let side = match hand {
            Handedness::Left => -1.0,
            Handedness::Right => 1.0,
        };
        let finger = JointId::CHECKED
            .iter()
            .position(|candidate| *candidate == joint)
            .unwrap_or(0) as f64;
        Some(Vec3::new(side * (0.15 + 0.02 * finger), 1.2, 0.35 + 0.01 * finger))
    }
}

/// Simulated passthrough layer recording every mutation.
#[derive(Debug)]
pub struct SimulatedPassthrough {
    available: bool,
    rgb: AtomicBool,
    depth: AtomicBool,
    log: Arc<CallLog>,
}

impl SimulatedPassthrough {
    pub fn new() -> Self {
        Self::with_call_log(Arc::new(CallLog::new()))
    }

    pub fn with_call_log(log: Arc<CallLog>) -> Self {
        Self {
            available: true,
            rgb: AtomicBool::new(false),
            depth: AtomicBool::new(false),
            log,
        }
    }

    /// A backend whose feature could not be located.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.log.calls()
    }

    pub fn mode(&self) -> PassthroughMode {
        PassthroughMode::new(
            self.rgb.load(Ordering::SeqCst),
            self.depth.load(Ordering::SeqCst),
        )
    }
}

impl Default for SimulatedPassthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl PassthroughCapability for SimulatedPassthrough {
    fn name(&self) -> &str {
        "Simulated"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn set_rgb(&self, enabled: bool) {
        self.rgb.store(enabled, Ordering::SeqCst);
        self.log.record(DeviceCall::SetRgb(enabled));
    }

    fn set_depth(&self, enabled: bool) {
        self.depth.store(enabled, Ordering::SeqCst);
        self.log.record(DeviceCall::SetDepth(enabled));
    }
}
