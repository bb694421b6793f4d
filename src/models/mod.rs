//! Data models for the soak harness.
//!
//! - [`Scenario`]: which passthrough modes accompany hand tracking for a run
//! - [`PassthroughMode`]: the (rgb, depth) pair a scenario maps to
//! - [`SoakSettings`]: operator settings loaded from `Soak Config.yaml`
//! - [`RunConfig`]: clamped, read-only configuration for a single run
//! - [`RunState`] / [`RunPhase`]: orchestrator bookkeeping, shared as snapshots
//!   through [`RunStateManager`](crate::state::RunStateManager)

pub mod config;
pub mod run_state;

pub use config::{
    MIN_SOFT_RESET_INTERVAL, PassthroughBackendKind, PassthroughMode, RunConfig, Scenario,
    SoakSettings, clamp_minutes, clamp_secs,
};
pub use run_state::{RunPhase, RunState};
