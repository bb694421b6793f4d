//! Device collaborators: hand tracking, passthrough backends and an in-process
//! simulation of both.

pub mod hand_tracking;
pub mod passthrough;
pub mod sim;

pub use hand_tracking::{HandTracking, Handedness, JointId, Vec3};
pub use passthrough::{PassthroughCapability, PassthroughController, PassthroughRegistry};
pub use sim::{CallLog, DeviceCall, SimulatedHandTracking, SimulatedPassthrough};
