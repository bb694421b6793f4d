use std::fmt;

/// Which hand a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub const BOTH: [Handedness; 2] = [Handedness::Left, Handedness::Right];
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        })
    }
}

/// Skeleton joints the pose guard inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointId {
    Wrist,
    ThumbTip,
    IndexTip,
    MiddleTip,
    RingTip,
    LittleTip,
}

impl JointId {
    /// Wrist plus the five fingertips.
    pub const CHECKED: [JointId; 6] = [
        JointId::Wrist,
        JointId::ThumbTip,
        JointId::IndexTip,
        JointId::MiddleTip,
        JointId::RingTip,
        JointId::LittleTip,
    ];
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JointId::Wrist => "Wrist",
            JointId::ThumbTip => "ThumbTip",
            JointId::IndexTip => "IndexTip",
            JointId::MiddleTip => "MiddleTip",
            JointId::RingTip => "RingTip",
            JointId::LittleTip => "LittleTip",
        })
    }
}

/// Joint position in tracking space (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// The device's hand-tracking subsystem.
///
/// Implementations use interior mutability; the orchestrator and the pose guard
/// share one instance as `Arc<dyn HandTracking>`.
pub trait HandTracking: Send + Sync {
    fn is_running(&self) -> bool;

    fn start(&self);

    fn stop(&self);

    fn is_tracked(&self, hand: Handedness) -> bool;

    /// Current position of `joint`, or `None` when the skeleton has no pose for it.
    fn joint_position(&self, hand: Handedness, joint: JointId) -> Option<Vec3>;
}
