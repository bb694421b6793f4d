use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Soft reset intervals below this are treated as "soft reset disabled".
///
/// Guards against zero/denormal intervals turning into a reset storm; a 1 ms
/// interval (effectively every tick) is still honored.
pub const MIN_SOFT_RESET_INTERVAL: Duration = Duration::from_micros(500);

/// Which passthrough modes run alongside hand tracking for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Scenario {
    HandOnly,
    HandPlusDepth,
    HandPlusRGB,
    #[default]
    HandPlusRGBAndDepth,
}

/// A concrete (rgb, depth) passthrough configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PassthroughMode {
    pub rgb: bool,
    pub depth: bool,
}

impl PassthroughMode {
    pub const OFF: Self = Self {
        rgb: false,
        depth: false,
    };

    pub const fn new(rgb: bool, depth: bool) -> Self {
        Self { rgb, depth }
    }
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::HandOnly,
        Scenario::HandPlusDepth,
        Scenario::HandPlusRGB,
        Scenario::HandPlusRGBAndDepth,
    ];

    /// Passthrough mode required by this scenario.
    pub const fn passthrough_mode(self) -> PassthroughMode {
        match self {
            Scenario::HandOnly => PassthroughMode::new(false, false),
            Scenario::HandPlusDepth => PassthroughMode::new(false, true),
            Scenario::HandPlusRGB => PassthroughMode::new(true, false),
            Scenario::HandPlusRGBAndDepth => PassthroughMode::new(true, true),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Scenario::HandOnly => "HandOnly",
            Scenario::HandPlusDepth => "HandPlusDepth",
            Scenario::HandPlusRGB => "HandPlusRGB",
            Scenario::HandPlusRGBAndDepth => "HandPlusRGBAndDepth",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown scenario '{}', expected one of: HandOnly, HandPlusDepth, HandPlusRGB, HandPlusRGBAndDepth",
                    s
                )
            })
    }
}

/// Selects which passthrough capability implementation backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PassthroughBackendKind {
    /// Meta OpenXR passthrough feature
    #[default]
    OpenXrMeta,
    /// Legacy Oculus Integration passthrough layer
    OculusIntegration,
    /// In-process simulated device (dry runs and tests)
    Simulated,
}

impl fmt::Display for PassthroughBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassthroughBackendKind::OpenXrMeta => "OpenXrMeta",
            PassthroughBackendKind::OculusIntegration => "OculusIntegration",
            PassthroughBackendKind::Simulated => "Simulated",
        };
        f.write_str(name)
    }
}

/// Soak settings from `Soak Config.yaml` (plus `HPS_SOAK_*` environment overrides).
///
/// Durations are stored the way operators write them (minutes / seconds) and are
/// only converted and clamped when a [`RunConfig`] is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoakSettings {
    pub scenario: Scenario,
    pub warmup_minutes: f64,
    pub run_minutes: f64,
    pub soft_reset_enabled: bool,
    pub soft_reset_interval_minutes: f64,
    pub reset_hands: bool,
    pub reset_passthrough: bool,
    pub passthrough_backend: PassthroughBackendKind,

    // Diagnostics
    pub log_dir: String,
    pub log_prefix: String,
    pub heartbeat_interval_secs: f64,
    pub resource_sample_interval_secs: f64,
    pub summary_refresh_secs: f64,
    pub tick_interval_ms: u64,
    pub debug_mode: bool,
}

impl Default for SoakSettings {
    fn default() -> Self {
        Self {
            scenario: Scenario::HandPlusRGBAndDepth,
            warmup_minutes: 2.0,
            run_minutes: 90.0,
            soft_reset_enabled: true,
            soft_reset_interval_minutes: 30.0,
            reset_hands: true,
            reset_passthrough: true,
            passthrough_backend: PassthroughBackendKind::OpenXrMeta,

            log_dir: "logs".to_string(),
            log_prefix: "quest_hand_passthrough".to_string(),
            heartbeat_interval_secs: 10.0,
            resource_sample_interval_secs: 5.0,
            summary_refresh_secs: 0.25,
            tick_interval_ms: 11,
            debug_mode: false,
        }
    }
}

impl SoakSettings {
    /// Host tick period, never shorter than 1 ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        clamp_secs(self.heartbeat_interval_secs)
    }

    pub fn resource_sample_interval(&self) -> Duration {
        clamp_secs(self.resource_sample_interval_secs)
    }

    pub fn summary_refresh_interval(&self) -> Duration {
        clamp_secs(self.summary_refresh_secs)
    }
}

/// Clamp a duration in seconds to `max(0, secs)`.
///
/// NaN clamps to zero and +inf saturates to [`Duration::MAX`].
pub fn clamp_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Clamp a duration in minutes to `max(0, minutes)`.
pub fn clamp_minutes(minutes: f64) -> Duration {
    clamp_secs(minutes * 60.0)
}

/// Read-only configuration for one soak run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub scenario: Scenario,
    pub warmup: Duration,
    pub run: Duration,
    pub soft_reset_enabled: bool,
    pub soft_reset_interval: Duration,
    pub reset_hands: bool,
    pub reset_passthrough: bool,
    pub passthrough_backend: PassthroughBackendKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_settings(&SoakSettings::default())
    }
}

impl RunConfig {
    pub fn from_settings(settings: &SoakSettings) -> Self {
        Self {
            scenario: settings.scenario,
            warmup: clamp_minutes(settings.warmup_minutes),
            run: clamp_minutes(settings.run_minutes),
            soft_reset_enabled: settings.soft_reset_enabled,
            soft_reset_interval: clamp_minutes(settings.soft_reset_interval_minutes),
            reset_hands: settings.reset_hands,
            reset_passthrough: settings.reset_passthrough,
            passthrough_backend: settings.passthrough_backend,
        }
    }

    /// The interval soft resets actually fire at, or `None` when they never fire.
    pub fn effective_reset_interval(&self) -> Option<Duration> {
        (self.soft_reset_enabled && self.soft_reset_interval >= MIN_SOFT_RESET_INTERVAL)
            .then_some(self.soft_reset_interval)
    }

    /// One-line description written to the diagnostic log at run start.
    pub fn describe(&self) -> String {
        format!(
            "Scenario={} warmup={:.1}s run={:.1}s softReset={} every={:.3}s resetHands={} resetPT={} backend={}",
            self.scenario,
            self.warmup.as_secs_f64(),
            self.run.as_secs_f64(),
            self.soft_reset_enabled,
            self.soft_reset_interval.as_secs_f64(),
            self.reset_hands,
            self.reset_passthrough,
            self.passthrough_backend
        )
    }
}
