//! Capture system selection.
//!
//! Picks one installed capture system, allocates it, and remembers both the
//! winner and any failure so repeated calls stay cheap.

use std::sync::Arc;

use super::api::{Lease, MilApi};
use super::error::{GrabberError, Result};
use super::types::{AppId, DeviceDescriptor, SystemClass, SystemId, SYSTEM_SLOT_COUNT};

/// The allocated capture system.
pub struct SelectedSystem {
    pub descriptor: String,
    pub slot: u32,
    lease: Lease<SystemId>,
}

impl SelectedSystem {
    pub fn id(&self) -> SystemId {
        self.lease.id()
    }
}

/// Outcome of a successful [`SystemSelector::ensure_selected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A system was already allocated.
    Existing,
    /// A system was allocated by this call; discovery results are stale.
    Fresh,
}

/// Owns the application context and the capture system.
#[derive(Default)]
pub struct SystemSelector {
    // Field order is drop order: the system goes before the app context.
    system: Option<SelectedSystem>,
    app: Option<Lease<AppId>>,
    /// Last winning `(descriptor, slot)`; survives `release`.
    preferred: Option<(String, u32)>,
    failure: Option<GrabberError>,
}

impl SystemSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a capture system is allocated.
    ///
    /// A failed attempt is cached and returned as-is until [`release`] is
    /// called, without touching the vendor library again.
    ///
    /// [`release`]: SystemSelector::release
    pub fn ensure_selected(&mut self, api: &Arc<dyn MilApi>) -> Result<Selection> {
        if self.system.is_some() {
            return Ok(Selection::Existing);
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        match self.select(api) {
            Ok(system) => {
                tracing::info!(
                    "Selected capture system {} on slot {}",
                    system.descriptor,
                    system.slot
                );
                self.preferred = Some((system.descriptor.clone(), system.slot));
                self.system = Some(system);
                self.failure = None;
                Ok(Selection::Fresh)
            }
            Err(e) => {
                tracing::warn!("Capture system selection failed: {e}");
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    fn select(&mut self, api: &Arc<dyn MilApi>) -> Result<SelectedSystem> {
        if !api.hardware_support() {
            return Err(GrabberError::Unsupported(
                "this build cannot reach digitizer hardware".to_string(),
            ));
        }

        let app = self.ensure_app(api)?;

        if let Some((descriptor, slot)) = self.preferred.clone() {
            match api.sys_alloc(app, &descriptor, slot) {
                Ok(id) => return Ok(self.wrap(api, descriptor, slot, id)),
                Err(e) => {
                    tracing::debug!("Cached system {descriptor} on slot {slot} failed: {e}")
                }
            }
        }

        let installed = api.installed_systems(app).map_err(|e| {
            GrabberError::SystemUnavailable(format!("cannot list installed systems: {e}"))
        })?;
        if installed.is_empty() {
            return Err(GrabberError::SystemUnavailable(
                "no capture systems installed".to_string(),
            ));
        }

        let candidates = rank_candidates(&installed);
        if candidates.is_empty() {
            return Err(GrabberError::SystemUnavailable(format!(
                "only software systems installed ({})",
                installed.join(", ")
            )));
        }

        for candidate in &candidates {
            for slot in 0..SYSTEM_SLOT_COUNT {
                match api.sys_alloc(app, &candidate.name, slot) {
                    Ok(id) => return Ok(self.wrap(api, candidate.name.clone(), slot, id)),
                    Err(e) => tracing::debug!("{} on slot {slot}: {e}", candidate.name),
                }
            }
        }

        let tried: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        Err(GrabberError::SystemUnavailable(format!(
            "no system allocated on slots 0..{} (tried {})",
            SYSTEM_SLOT_COUNT - 1,
            tried.join(", ")
        )))
    }

    fn ensure_app(&mut self, api: &Arc<dyn MilApi>) -> Result<AppId> {
        if let Some(app) = &self.app {
            return Ok(app.id());
        }
        let id = api.app_alloc().map_err(|e| {
            GrabberError::SystemUnavailable(format!("application context unavailable: {e}"))
        })?;
        api.disable_error_prints(id);
        self.app = Some(Lease::new(Arc::clone(api), id));
        Ok(id)
    }

    fn wrap(
        &self,
        api: &Arc<dyn MilApi>,
        descriptor: String,
        slot: u32,
        id: SystemId,
    ) -> SelectedSystem {
        SelectedSystem {
            descriptor,
            slot,
            lease: Lease::new(Arc::clone(api), id),
        }
    }

    pub fn system_id(&self) -> Option<SystemId> {
        self.system.as_ref().map(SelectedSystem::id)
    }

    pub fn selected(&self) -> Option<&SelectedSystem> {
        self.system.as_ref()
    }

    pub fn has_app(&self) -> bool {
        self.app.is_some()
    }

    pub fn cached_failure(&self) -> Option<&GrabberError> {
        self.failure.as_ref()
    }

    /// Free the system, then the application context, and forget any cached
    /// failure. The preferred descriptor is kept.
    pub fn release(&mut self) {
        self.system = None;
        self.app = None;
        self.failure = None;
    }
}

/// Drop software fallbacks and order the rest by preference, keeping the
/// vendor enumeration order among equals.
pub fn rank_candidates(installed: &[String]) -> Vec<DeviceDescriptor> {
    let mut candidates: Vec<DeviceDescriptor> = installed
        .iter()
        .map(DeviceDescriptor::new)
        .filter(|d| d.class() != SystemClass::SoftwareFallback)
        .collect();
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::mock::SimulatedMil;

    fn api(sim: &Arc<SimulatedMil>) -> Arc<dyn MilApi> {
        Arc::clone(sim) as Arc<dyn MilApi>
    }

    #[test]
    fn ranks_hardware_before_gentl_before_gige() {
        let installed = vec![
            "M_SYSTEM_HOST".to_string(),
            "M_SYSTEM_GIGE_VISION".to_string(),
            "M_SYSTEM_GENTL".to_string(),
            "M_SYSTEM_RAPIXOCXP".to_string(),
        ];
        let ranked: Vec<String> = rank_candidates(&installed)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            ranked,
            vec!["M_SYSTEM_RAPIXOCXP", "M_SYSTEM_GENTL", "M_SYSTEM_GIGE_VISION"]
        );
    }

    #[test]
    fn ranking_is_stable_among_equals() {
        let installed = vec!["M_SYSTEM_SOLIOS".to_string(), "M_SYSTEM_RADIENT".to_string()];
        let ranked = rank_candidates(&installed);
        assert_eq!(ranked[0].name, "M_SYSTEM_SOLIOS");
        assert_eq!(ranked[1].name, "M_SYSTEM_RADIENT");
    }

    #[test]
    fn selects_best_candidate() {
        let sim = Arc::new(
            SimulatedMil::new()
                .with_system("M_SYSTEM_GIGE_VISION")
                .with_system("M_SYSTEM_GENTL"),
        );
        let mut selector = SystemSelector::new();
        assert_eq!(
            selector.ensure_selected(&api(&sim)).unwrap(),
            Selection::Fresh
        );
        assert_eq!(selector.selected().unwrap().descriptor, "M_SYSTEM_GENTL");
        assert_eq!(sim.call_count("disable_error_prints"), 1);
    }

    #[test]
    fn probes_slots_until_one_allocates() {
        let sim = Arc::new(SimulatedMil::new().with_system_on_slots("M_SYSTEM_GIGE_VISION", &[5]));
        let mut selector = SystemSelector::new();
        selector.ensure_selected(&api(&sim)).unwrap();
        assert_eq!(selector.selected().unwrap().slot, 5);
        assert_eq!(sim.call_count("sys_alloc"), 6);
    }

    #[test]
    fn second_call_returns_existing() {
        let sim = Arc::new(SimulatedMil::demo());
        let mut selector = SystemSelector::new();
        selector.ensure_selected(&api(&sim)).unwrap();
        assert_eq!(
            selector.ensure_selected(&api(&sim)).unwrap(),
            Selection::Existing
        );
        assert_eq!(sim.call_count("sys_alloc"), 1);
        assert_eq!(sim.call_count("installed_systems"), 1);
    }

    #[test]
    fn failure_is_cached_until_release() {
        let sim = Arc::new(SimulatedMil::new());
        let mut selector = SystemSelector::new();

        let first = selector.ensure_selected(&api(&sim)).unwrap_err();
        assert!(first.to_string().contains("no capture systems installed"));
        let second = selector.ensure_selected(&api(&sim)).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(sim.call_count("installed_systems"), 1);
        assert_eq!(sim.call_count("app_alloc"), 1);

        selector.release();
        assert!(selector.cached_failure().is_none());
        assert!(selector.ensure_selected(&api(&sim)).is_err());
        assert_eq!(sim.call_count("installed_systems"), 2);
    }

    #[test]
    fn software_only_installation_fails() {
        let sim = Arc::new(SimulatedMil::new().with_system("M_SYSTEM_HOST"));
        let mut selector = SystemSelector::new();
        let err = selector.ensure_selected(&api(&sim)).unwrap_err();
        assert!(err.to_string().contains("only software systems"));
        assert_eq!(sim.call_count("sys_alloc"), 0);
    }

    #[test]
    fn missing_runtime_fails_without_enumeration() {
        let sim = Arc::new(SimulatedMil::new().without_app());
        let mut selector = SystemSelector::new();
        let err = selector.ensure_selected(&api(&sim)).unwrap_err();
        assert!(matches!(err, GrabberError::SystemUnavailable(_)));
        assert_eq!(sim.call_count("installed_systems"), 0);
        assert!(!selector.has_app());
    }

    #[test]
    fn no_hardware_support_is_environment_error() {
        let sim = Arc::new(SimulatedMil::demo().without_hardware());
        let mut selector = SystemSelector::new();
        let err = selector.ensure_selected(&api(&sim)).unwrap_err();
        assert!(matches!(err, GrabberError::Unsupported(_)));
        assert_eq!(sim.call_count("app_alloc"), 0);
    }

    #[test]
    fn preferred_system_is_retried_first_after_release() {
        let sim = Arc::new(
            SimulatedMil::new()
                .with_system("M_SYSTEM_GIGE_VISION")
                .with_system_on_slots("M_SYSTEM_GENTL", &[3]),
        );
        let mut selector = SystemSelector::new();
        selector.ensure_selected(&api(&sim)).unwrap();
        assert_eq!(sim.call_count("installed_systems"), 1);

        selector.release();
        assert_eq!(sim.live_systems(), 0);
        assert_eq!(sim.live_apps(), 0);

        selector.ensure_selected(&api(&sim)).unwrap();
        let selected = selector.selected().unwrap();
        assert_eq!(selected.descriptor, "M_SYSTEM_GENTL");
        assert_eq!(selected.slot, 3);
        assert_eq!(sim.call_count("installed_systems"), 1);
    }

    #[test]
    fn preferred_system_falls_back_to_enumeration() {
        let sim = Arc::new(SimulatedMil::new().with_system("M_SYSTEM_GIGE_VISION"));
        let mut selector = SystemSelector::new();
        selector.ensure_selected(&api(&sim)).unwrap();
        selector.release();

        sim.fail_slot("sys_alloc", 0);
        let err = selector.ensure_selected(&api(&sim)).unwrap_err();
        assert!(err.to_string().contains("no system allocated"));
        assert_eq!(sim.call_count("installed_systems"), 2);
    }

    #[test]
    fn drop_frees_system_before_app_context() {
        let sim = Arc::new(SimulatedMil::demo());
        {
            let mut selector = SystemSelector::new();
            selector.ensure_selected(&api(&sim)).unwrap();
        }
        let order: Vec<&str> = sim.free_log().into_iter().map(|(op, _)| op).collect();
        assert_eq!(order, vec!["sys_free", "app_free"]);
        assert_eq!(sim.live_systems(), 0);
        assert_eq!(sim.live_apps(), 0);
    }
}
