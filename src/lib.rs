// hps-soak - Long-duration soak harness for hand tracking + passthrough devices
//
// This is the library crate containing the orchestrator, the diagnostic pipeline
// and the device abstractions. The binary crate (main.rs) provides the CLI.

pub mod config;
pub mod device;
pub mod diagnostics;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod samplers;
pub mod state;
pub mod summary;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use diagnostics::{Classifier, LogIngest, LogSink, Severity};
pub use models::{RunConfig, RunPhase, RunState, Scenario, SoakSettings};
pub use orchestrator::{RunError, RunHandle, RunOutcome, SoakRunner};
pub use state::{RunEvent, RunStateManager};
pub use summary::{StatusRecord, SummaryAggregator};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
