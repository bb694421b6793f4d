// Passthrough mode control
//
// The controller is the single owner of the passthrough capability for a run.
// Everything above it talks in scenarios; everything below it is a backend adapter.

use crate::models::{PassthroughBackendKind, PassthroughMode, Scenario};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A passthrough rendering backend.
///
/// Adapters must tolerate every call even when the underlying feature is gone;
/// the controller additionally never calls mutators on an unavailable backend.
pub trait PassthroughCapability: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn set_rgb(&self, enabled: bool);

    fn set_depth(&self, enabled: bool);

    /// RGB first, then depth.
    fn set_both(&self, rgb: bool, depth: bool) {
        self.set_rgb(rgb);
        self.set_depth(depth);
    }

    fn shutdown_all(&self) {
        self.set_both(false, false);
    }
}

/// Backends the host knows about, keyed by selector.
#[derive(Default, Clone)]
pub struct PassthroughRegistry {
    backends: IndexMap<PassthroughBackendKind, Arc<dyn PassthroughCapability>>,
}

impl PassthroughRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under `kind`, replacing any previous registration.
    pub fn register(
        &mut self,
        kind: PassthroughBackendKind,
        backend: Arc<dyn PassthroughCapability>,
    ) -> &mut Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn get(&self, kind: PassthroughBackendKind) -> Option<Arc<dyn PassthroughCapability>> {
        self.backends.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = PassthroughBackendKind> + '_ {
        self.backends.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl fmt::Debug for PassthroughRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.backends.keys()).finish()
    }
}

/// Maps scenarios onto a passthrough backend.
///
/// When no usable backend was located, every mutator is a silent no-op (the
/// unavailability is logged once, when the controller is built).
pub struct PassthroughController {
    backend: Option<Arc<dyn PassthroughCapability>>,
    current: Mutex<PassthroughMode>,
}

impl PassthroughController {
    /// Controller over whatever `registry` holds for `kind`.
    pub fn select(kind: PassthroughBackendKind, registry: &PassthroughRegistry) -> Self {
        match registry.get(kind) {
            Some(backend) => Self::with_backend(backend),
            None => {
                tracing::warn!(
                    "Passthrough backend {} is not registered; passthrough control disabled",
                    kind
                );
                Self::unavailable()
            }
        }
    }

    /// Like [`select`](Self::select), but fall back to `fallback` when `kind` is
    /// not registered. The substitution is logged as a warning.
    pub fn select_with_fallback(
        kind: PassthroughBackendKind,
        fallback: PassthroughBackendKind,
        registry: &PassthroughRegistry,
    ) -> Self {
        if registry.get(kind).is_some() || kind == fallback {
            return Self::select(kind, registry);
        }
        tracing::warn!(
            "Passthrough backend {} is not registered; falling back to {}",
            kind,
            fallback
        );
        Self::select(fallback, registry)
    }

    pub fn with_backend(backend: Arc<dyn PassthroughCapability>) -> Self {
        if backend.is_available() {
            tracing::info!("Passthrough backend selected: {}", backend.name());
        } else {
            tracing::warn!(
                "Passthrough backend {} reports the feature unavailable; passthrough control disabled",
                backend.name()
            );
        }
        Self {
            backend: Some(backend),
            current: Mutex::new(PassthroughMode::OFF),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            backend: None,
            current: Mutex::new(PassthroughMode::OFF),
        }
    }

    pub fn is_available(&self) -> bool {
        self.usable().is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|backend| backend.name())
    }

    /// Last mode pushed to the backend.
    pub fn current_mode(&self) -> PassthroughMode {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_rgb(&self, enabled: bool) {
        if let Some(backend) = self.usable() {
            backend.set_rgb(enabled);
            self.update_current(|mode| mode.rgb = enabled);
        }
    }

    pub fn set_depth(&self, enabled: bool) {
        if let Some(backend) = self.usable() {
            backend.set_depth(enabled);
            self.update_current(|mode| mode.depth = enabled);
        }
    }

    pub fn set_both(&self, rgb: bool, depth: bool) {
        self.set_rgb(rgb);
        self.set_depth(depth);
    }

    pub fn shutdown_all(&self) {
        self.set_both(false, false);
    }

    /// Push the mode `scenario` requires.
    pub fn apply_scenario(&self, scenario: Scenario) {
        let mode = scenario.passthrough_mode();
        tracing::debug!(
            "Applying passthrough for {}: rgb={} depth={}",
            scenario,
            mode.rgb,
            mode.depth
        );
        self.set_both(mode.rgb, mode.depth);
    }

    fn usable(&self) -> Option<&dyn PassthroughCapability> {
        self.backend
            .as_deref()
            .filter(|backend| backend.is_available())
    }

    fn update_current(&self, f: impl FnOnce(&mut PassthroughMode)) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut current);
    }
}

impl fmt::Debug for PassthroughController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughController")
            .field("backend", &self.backend_name())
            .field("available", &self.is_available())
            .field("current", &self.current_mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{DeviceCall, SimulatedPassthrough};

    #[test]
    fn test_apply_scenario_pushes_mapping() {
        let backend = Arc::new(SimulatedPassthrough::new());
        let controller = PassthroughController::with_backend(backend.clone());

        controller.apply_scenario(Scenario::HandPlusDepth);

        assert_eq!(controller.current_mode(), PassthroughMode::new(false, true));
        assert_eq!(
            backend.calls(),
            vec![DeviceCall::SetRgb(false), DeviceCall::SetDepth(true)]
        );
    }

    #[test]
    fn test_shutdown_all_turns_everything_off() {
        let backend = Arc::new(SimulatedPassthrough::new());
        let controller = PassthroughController::with_backend(backend.clone());
        controller.apply_scenario(Scenario::HandPlusRGBAndDepth);

        controller.shutdown_all();

        assert_eq!(controller.current_mode(), PassthroughMode::OFF);
        assert_eq!(backend.mode(), PassthroughMode::OFF);
    }

    #[test]
    fn test_select_missing_backend_is_unavailable() {
        let registry = PassthroughRegistry::new();
        let controller =
            PassthroughController::select(PassthroughBackendKind::OculusIntegration, &registry);

        assert!(!controller.is_available());
        assert!(controller.backend_name().is_none());
        controller.apply_scenario(Scenario::HandPlusRGB);
        assert_eq!(controller.current_mode(), PassthroughMode::OFF);
    }

    #[test]
    fn test_select_registered_backend() {
        let backend = Arc::new(SimulatedPassthrough::new());
        let mut registry = PassthroughRegistry::new();
        registry.register(PassthroughBackendKind::Simulated, backend.clone());

        let controller = PassthroughController::select(PassthroughBackendKind::Simulated, &registry);

        assert!(controller.is_available());
        assert_eq!(controller.backend_name(), Some("Simulated"));
        assert_eq!(
            registry.kinds().collect::<Vec<_>>(),
            vec![PassthroughBackendKind::Simulated]
        );
    }

    #[test]
    fn test_fallback_used_when_configured_backend_missing() {
        let mut registry = PassthroughRegistry::new();
        registry.register(
            PassthroughBackendKind::Simulated,
            Arc::new(SimulatedPassthrough::new()),
        );

        let controller = PassthroughController::select_with_fallback(
            PassthroughBackendKind::OpenXrMeta,
            PassthroughBackendKind::Simulated,
            &registry,
        );

        assert!(controller.is_available());
        assert_eq!(controller.backend_name(), Some("Simulated"));
    }

    #[test]
    fn test_fallback_prefers_configured_backend() {
        let configured = Arc::new(SimulatedPassthrough::new());
        let fallback = Arc::new(SimulatedPassthrough::new());
        let mut registry = PassthroughRegistry::new();
        registry
            .register(PassthroughBackendKind::OculusIntegration, configured.clone())
            .register(PassthroughBackendKind::Simulated, fallback.clone());

        let controller = PassthroughController::select_with_fallback(
            PassthroughBackendKind::OculusIntegration,
            PassthroughBackendKind::Simulated,
            &registry,
        );
        controller.apply_scenario(Scenario::HandPlusRGB);

        assert_eq!(configured.mode(), PassthroughMode::new(true, false));
        assert!(fallback.calls().is_empty());
    }

    #[test]
    fn test_fallback_missing_too_is_unavailable() {
        let controller = PassthroughController::select_with_fallback(
            PassthroughBackendKind::OpenXrMeta,
            PassthroughBackendKind::Simulated,
            &PassthroughRegistry::new(),
        );
        assert!(!controller.is_available());
    }

    #[test]
    fn test_backend_reporting_unavailable_is_never_called() {
        let backend = Arc::new(SimulatedPassthrough::unavailable());
        let controller = PassthroughController::with_backend(backend.clone());

        controller.set_rgb(true);
        controller.set_depth(true);
        controller.shutdown_all();

        assert!(backend.calls().is_empty());
    }
}
