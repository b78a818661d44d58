//! `DigitizerManager`: the shared service that owns the capture system, the
//! digitizer registry and the cached discovery results.
//!
//! Every public method takes the state lock exactly once and then works on
//! the locked state. The lock is held across selection, discovery,
//! allocation and the blocking grab, so concurrent callers serialize.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::acquisition::{acquire_into, validate_request};
use super::api::MilApi;
use super::discovery::{discover_digitizers, DiscoveryReport, ValidDeviceSlots};
use super::error::{GrabberError, Result};
use super::grid::{compose, GridLayout, GridReport};
use super::registry::DigitizerRegistry;
use super::selector::{Selection, SystemSelector};
use super::types::{
    CapabilityProfile, FrameShape, SystemId, DIGITIZER_SLOT_COUNT, MAX_DUMP_SLOTS,
};
use crate::diagnostics::probe::{self, DumpFacts, HandleFacts, SummaryFacts};
use crate::diagnostics::stats::{GrabSnapshot, GrabStats};

/// Operation kinds tracked by [`DigitizerManager::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Select,
    Discover,
    EnsureDigitizer,
    Grab,
    GrabGrid,
    Dump,
}

/// Most recent failure, tagged with the operation that produced it.
#[derive(Debug, Default)]
struct LastError {
    entry: Option<(Operation, String)>,
}

impl LastError {
    fn record<T>(&mut self, op: Operation, result: &Result<T>) {
        match result {
            Ok(_) => {
                if matches!(&self.entry, Some((kind, _)) if *kind == op) {
                    self.entry = None;
                }
            }
            Err(e) => self.entry = Some((op, e.to_string())),
        }
    }

    fn message(&self) -> String {
        self.entry
            .as_ref()
            .map(|(_, msg)| msg.clone())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct State {
    // Field order is drop order: digitizers go before the system.
    registry: DigitizerRegistry,
    selector: SystemSelector,
    discovery: DiscoveryReport,
    profile: CapabilityProfile,
    last_error: LastError,
    stats: GrabStats,
}

impl State {
    /// Select a system if needed. A fresh selection reruns discovery.
    ///
    /// Returns the system and whether discovery already ran in this call.
    fn ensure_system(&mut self, api: &Arc<dyn MilApi>) -> Result<(SystemId, bool)> {
        let selection = self.selector.ensure_selected(api);
        self.last_error.record(Operation::Select, &selection);
        let selection = selection?;

        let system = self.selector.system_id().ok_or_else(|| {
            GrabberError::SystemUnavailable("capture system missing after selection".into())
        })?;

        if selection == Selection::Fresh {
            self.discovery = DiscoveryReport::default();
            // Zero digitizers is reported but does not fail selection.
            let _ = self.run_discovery(api, system);
            return Ok((system, true));
        }
        Ok((system, false))
    }

    fn run_discovery(&mut self, api: &Arc<dyn MilApi>, system: SystemId) -> Result<usize> {
        let claimed = self.registry.claimed_slots();
        self.discovery = discover_digitizers(api, system, DIGITIZER_SLOT_COUNT, &claimed);
        let result = self.discovered();
        if let Err(e) = &result {
            tracing::warn!("Digitizer discovery: {e}");
        }
        self.last_error.record(Operation::Discover, &result);
        result
    }

    /// Number of mapped slots, or an error when discovery found none.
    fn discovered(&self) -> Result<usize> {
        if self.discovery.slots.is_empty() {
            return Err(GrabberError::NoDigitizers(format!(
                "no digitizer allocated on devices 0..{}",
                DIGITIZER_SLOT_COUNT - 1
            )));
        }
        Ok(self.discovery.slots.len())
    }

    /// Make sure `index` has a digitizer. `may_discover` is cleared once
    /// discovery has run, so a caller can bound it across several indices.
    fn ensure_digitizer(
        &mut self,
        api: &Arc<dyn MilApi>,
        index: usize,
        may_discover: &mut bool,
    ) -> Result<SystemId> {
        let (system, discovered) = self.ensure_system(api)?;
        if discovered {
            *may_discover = false;
        }
        if self.registry.contains(index) {
            return Ok(system);
        }

        if *may_discover && !self.discovery.slots.covers(index) {
            *may_discover = false;
            let _ = self.run_discovery(api, system);
        }

        self.registry.ensure(
            api,
            system,
            &self.discovery.slots,
            index,
            &self.profile,
        )?;
        Ok(system)
    }

    /// Grab `index` into `dst`, which has already been validated for `shape`.
    fn grab_into(
        &mut self,
        api: &Arc<dyn MilApi>,
        index: usize,
        shape: FrameShape,
        dst: &mut [u8],
        may_discover: &mut bool,
    ) -> Result<()> {
        let system = self.ensure_digitizer(api, index, may_discover)?;
        let handle = self.registry.get_mut(index).ok_or_else(|| {
            GrabberError::Acquisition(format!("camera {index} has no digitizer"))
        })?;

        let started = Instant::now();
        match acquire_into(api, system, handle, shape, dst) {
            Ok(()) => {
                self.stats.record_grab(shape.rgba_len(), started.elapsed());
                Ok(())
            }
            Err(e) => {
                if handle.buffer_id().is_none() {
                    tracing::debug!("Camera {index} lost its grab buffer; releasing digitizer");
                    self.registry.remove(index);
                }
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    fn release_all(&mut self) {
        let released = self.registry.allocated_count();
        self.registry.clear();
        self.selector.release();
        self.discovery = DiscoveryReport::default();
        if released > 0 {
            tracing::info!("Released {released} digitizer(s)");
        }
    }
}

/// Shared digitizer pool over one vendor adapter.
///
/// Construct one per process and share it by reference or `Arc`.
pub struct DigitizerManager {
    state: Mutex<State>,
    api: Arc<dyn MilApi>,
}

impl DigitizerManager {
    pub fn new(api: Arc<dyn MilApi>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            api,
        }
    }

    /// Whether the adapter can reach digitizer hardware.
    pub fn built_with_hardware_support(&self) -> bool {
        self.api.hardware_support()
    }

    /// One-line status: app, system and allocation counts.
    pub fn summary_line(&self) -> String {
        let state = self.state.lock();
        probe::summary_line(&SummaryFacts {
            hardware: self.api.hardware_support(),
            app: state.selector.has_app(),
            system: state
                .selector
                .selected()
                .map(|s| (s.descriptor.clone(), s.slot)),
            allocated: state.registry.allocated_count(),
            mapped: state.discovery.slots.len(),
            profile: state.profile.to_string(),
        })
    }

    /// Probe `max_slots` device slots (clamped to `1..=256`) and report.
    pub fn dump_devices(&self, max_slots: u32, verbose: bool) -> String {
        let max_slots = max_slots.clamp(1, MAX_DUMP_SLOTS);
        if !self.api.hardware_support() {
            return "Cannot dump devices: hardware support disabled in this build".to_string();
        }

        let mut state = self.state.lock();
        let system = match state.ensure_system(&self.api) {
            Ok((system, _)) => system,
            Err(e) => {
                let message = format!("Capture system not available: {e}");
                state.last_error.record::<()>(Operation::Dump, &Err(e));
                return message;
            }
        };

        let claimed = state.registry.claimed_slots();
        let report = discover_digitizers(&self.api, system, max_slots, &claimed);
        state.last_error.record(Operation::Dump, &Ok(()));

        let (descriptor, slot) = state
            .selector
            .selected()
            .map(|s| (s.descriptor.clone(), s.slot))
            .unwrap_or_default();
        let handles = state
            .registry
            .iter()
            .map(|h| HandleFacts {
                logical_index: h.logical_index,
                physical_slot: h.physical_slot,
                native: h.native,
                buffer: h.buffer_shape(),
                profile: h.profile.to_string(),
            })
            .collect();

        probe::render_dump(
            &DumpFacts {
                system: &descriptor,
                system_slot: slot,
                probes: &report.probes,
                mapping: &state.discovery.slots,
                handles,
                stats: state.stats.snapshot(),
            },
            verbose,
        )
    }

    /// Most recent failure message, empty when none is pending.
    pub fn last_error(&self) -> String {
        self.state.lock().last_error.message()
    }

    /// Select and allocate a capture system if none is held.
    ///
    /// A failure is sticky until [`shutdown`](Self::shutdown).
    pub fn ensure_system_selected(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_system(&self.api).map(|_| ())
    }

    /// Rerun digitizer discovery and return the logical to physical mapping.
    pub fn discover_digitizers(&self) -> Result<ValidDeviceSlots> {
        let mut state = self.state.lock();
        let (system, discovered) = state.ensure_system(&self.api)?;
        if discovered {
            state.discovered()?;
        } else {
            state.run_discovery(&self.api, system)?;
        }
        Ok(state.discovery.slots.clone())
    }

    /// Current logical to physical mapping, without touching hardware.
    pub fn valid_slots(&self) -> ValidDeviceSlots {
        self.state.lock().discovery.slots.clone()
    }

    /// Allocate the digitizer for `index` if it has none.
    pub fn ensure_digitizer(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        let result = state
            .ensure_digitizer(&self.api, index, &mut true)
            .map(|_| ());
        state.last_error.record(Operation::EnsureDigitizer, &result);
        result
    }

    /// Native frame geometry of camera `index`, allocating it if needed.
    pub fn native_shape(&self, index: usize) -> Result<FrameShape> {
        let mut state = self.state.lock();
        let result = state
            .ensure_digitizer(&self.api, index, &mut true)
            .and_then(|_| {
                state.registry.get(index).map(|h| h.native).ok_or_else(|| {
                    GrabberError::Acquisition(format!("camera {index} has no digitizer"))
                })
            });
        state.last_error.record(Operation::EnsureDigitizer, &result);
        result
    }

    /// Grab one `width x height` RGBA8 frame from camera `index`.
    pub fn grab(&self, index: usize, width: u32, height: u32) -> Result<Vec<u8>> {
        let shape = match validate_request(width, height, usize::MAX) {
            Ok(shape) => shape,
            Err(e) => {
                self.state
                    .lock()
                    .last_error
                    .record::<()>(Operation::Grab, &Err(e.clone()));
                return Err(e);
            }
        };
        let mut frame = vec![0u8; shape.rgba_len()];
        self.grab_into(index, width, height, &mut frame)?;
        Ok(frame)
    }

    /// Grab one frame into `dst`, which must hold `width * height * 4` bytes.
    ///
    /// Without hardware support the frame region of `dst` is zero-filled.
    pub fn grab_into(&self, index: usize, width: u32, height: u32, dst: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        let result = self.grab_locked(&mut state, index, width, height, dst);
        state.last_error.record(Operation::Grab, &result);
        result
    }

    fn grab_locked(
        &self,
        state: &mut State,
        index: usize,
        width: u32,
        height: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        let shape = validate_request(width, height, dst.len())?;
        if !self.api.hardware_support() {
            dst[..shape.rgba_len()].fill(0);
            return Err(GrabberError::Unsupported(
                "this build cannot reach digitizer hardware".into(),
            ));
        }
        state.grab_into(&self.api, index, shape, &mut dst[..shape.rgba_len()], &mut true)
    }

    /// Compose a grid of cameras into a freshly allocated canvas.
    pub fn grab_grid(&self, layout: &GridLayout) -> Result<(Vec<u8>, GridReport)> {
        let canvas = match layout.canvas_shape() {
            Ok(canvas) => canvas,
            Err(e) => {
                self.state
                    .lock()
                    .last_error
                    .record::<()>(Operation::GrabGrid, &Err(e.clone()));
                return Err(e);
            }
        };
        let mut data = vec![0u8; canvas.rgba_len()];
        let report = self.grab_grid_into(layout, &mut data)?;
        Ok((data, report))
    }

    /// Compose a grid of cameras into `dst`.
    ///
    /// Per-tile failures leave black cells and are listed in the report;
    /// they do not fail the call.
    pub fn grab_grid_into(&self, layout: &GridLayout, dst: &mut [u8]) -> Result<GridReport> {
        let mut state = self.state.lock();
        let result = self.grid_locked(&mut state, layout, dst);
        state.last_error.record(Operation::GrabGrid, &result);
        result
    }

    fn grid_locked(
        &self,
        state: &mut State,
        layout: &GridLayout,
        dst: &mut [u8],
    ) -> Result<GridReport> {
        let canvas = layout.validate(dst.len())?;
        if !self.api.hardware_support() {
            dst[..canvas.rgba_len()].fill(0);
            return Err(GrabberError::Unsupported(
                "this build cannot reach digitizer hardware".into(),
            ));
        }

        let mut may_discover = match state.ensure_system(&self.api) {
            Ok((_, discovered)) => !discovered,
            Err(e) => {
                dst[..canvas.rgba_len()].fill(0);
                return Err(e);
            }
        };

        let tile_shape = layout.tile_shape();
        let report = compose(layout, dst, |index, tile| {
            state.grab_into(&self.api, index, tile_shape, tile, &mut may_discover)
        })?;

        state.stats.record_grid();
        if !report.failed.is_empty() {
            tracing::debug!(
                "Grid filled {} of {} cells",
                report.filled.len(),
                report.filled.len() + report.failed.len()
            );
        }
        Ok(report)
    }

    /// Use `profile` for future digitizer allocations.
    ///
    /// A change releases every allocated digitizer so the next request
    /// reallocates with the new profile.
    pub fn set_capability_profile(&self, profile: CapabilityProfile) {
        let mut state = self.state.lock();
        if state.profile == profile {
            return;
        }
        let released = state.registry.allocated_count();
        state.registry.clear();
        tracing::info!("Capability profile set to {profile}; released {released} digitizer(s)");
        state.profile = profile;
    }

    pub fn capability_profile(&self) -> CapabilityProfile {
        self.state.lock().profile.clone()
    }

    /// Number of cameras holding a digitizer.
    pub fn allocated_count(&self) -> usize {
        self.state.lock().registry.allocated_count()
    }

    pub fn stats(&self) -> GrabSnapshot {
        self.state.lock().stats.snapshot()
    }

    /// Release every grab buffer and digitizer, then the system and the
    /// application context. Clears any cached selection failure.
    pub fn shutdown(&self) {
        self.state.lock().release_all();
    }
}

impl Drop for DigitizerManager {
    fn drop(&mut self) {
        self.state.get_mut().release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::mock::SimulatedMil;
    use std::path::PathBuf;

    fn manager(sim: SimulatedMil) -> (Arc<SimulatedMil>, DigitizerManager) {
        let sim = Arc::new(sim);
        let manager = DigitizerManager::new(sim.clone());
        (sim, manager)
    }

    #[test]
    fn grab_returns_opaque_rgba_frame() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        let frame = manager.grab(1, 64, 48).unwrap();
        assert_eq!(frame.len(), 64 * 48 * 4);
        assert!(frame.chunks_exact(4).all(|px| px[3] == 255));
        let g = SimulatedMil::pattern_value(1, 5, 7);
        let offset = (7 * 64 + 5) * 4;
        assert_eq!(&frame[offset..offset + 4], &[g, g, g, 255]);
    }

    #[test]
    fn first_selection_runs_discovery() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.ensure_system_selected().unwrap();
        assert_eq!(manager.valid_slots().as_slice(), &[0, 1, 2, 3]);
        assert_eq!(sim.call_count("dig_alloc"), DIGITIZER_SLOT_COUNT);
        assert!(sim.live_digitizer_slots().is_empty());
    }

    #[test]
    fn ensure_digitizer_twice_allocates_once() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.ensure_digitizer(2).unwrap();
        let after_first = sim.call_count("dig_alloc");
        manager.ensure_digitizer(2).unwrap();
        assert_eq!(sim.call_count("dig_alloc"), after_first);
        assert_eq!(sim.live_digitizer_slots(), vec![2]);
        assert_eq!(manager.allocated_count(), 1);
    }

    #[test]
    fn shape_change_reallocates_buffer() {
        let (sim, manager) = manager(SimulatedMil::demo());
        let small = manager.grab(0, 64, 48).unwrap();
        let frees_before = sim.call_count("buf_free");
        let large = manager.grab(0, 128, 96).unwrap();
        assert_eq!(small.len(), 64 * 48 * 4);
        assert_eq!(large.len(), 128 * 96 * 4);
        assert_eq!(sim.call_count("buf_free"), frees_before + 1);
        assert_eq!(sim.live_buffers(), 1);

        let g = SimulatedMil::pattern_value(0, 100, 90);
        let offset = (90 * 128 + 100) * 4;
        assert_eq!(&large[offset..offset + 4], &[g, g, g, 255]);
    }

    #[test]
    fn undersized_destination_touches_nothing() {
        let (sim, manager) = manager(SimulatedMil::demo());
        let mut dst = vec![0xAA; 64 * 48 * 4 - 1];
        let err = manager.grab_into(0, 64, 48, &mut dst).unwrap_err();
        assert!(matches!(err, GrabberError::InvalidRequest(_)));
        assert!(dst.iter().all(|&b| b == 0xAA));
        assert_eq!(sim.call_count("app_alloc"), 0);
        assert_eq!(sim.call_count("dig_alloc"), 0);
        assert!(!manager.last_error().is_empty());
    }

    #[test]
    fn zero_size_is_caller_error() {
        let (sim, manager) = manager(SimulatedMil::demo());
        let err = manager.grab(0, 0, 48).unwrap_err();
        assert_eq!(err.kind(), crate::grabber::error::ErrorKind::Caller);
        assert_eq!(sim.call_count("app_alloc"), 0);
    }

    #[test]
    fn no_hardware_zero_fills_destination() {
        let (sim, manager) = manager(SimulatedMil::demo().without_hardware());
        assert!(!manager.built_with_hardware_support());
        let mut dst = vec![0xAA; 4 * 4 * 4];
        let err = manager.grab_into(0, 4, 4, &mut dst).unwrap_err();
        assert!(matches!(err, GrabberError::Unsupported(_)));
        assert!(dst.iter().all(|&b| b == 0));
        assert_eq!(sim.call_count("app_alloc"), 0);
    }

    #[test]
    fn failed_selection_is_not_retried_until_shutdown() {
        let (sim, manager) = manager(SimulatedMil::new());
        assert!(manager.grab(0, 4, 4).is_err());
        assert!(manager.grab(0, 4, 4).is_err());
        assert_eq!(sim.call_count("installed_systems"), 1);
        assert!(manager.last_error().contains("no capture systems installed"));

        manager.shutdown();
        assert!(manager.ensure_system_selected().is_err());
        assert_eq!(sim.call_count("installed_systems"), 2);
    }

    #[test]
    fn discovery_twice_is_identical() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        let first = manager.discover_digitizers().unwrap();
        let second = manager.discover_digitizers().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rediscovery_keeps_held_slots() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.ensure_digitizer(1).unwrap();
        let slots = manager.discover_digitizers().unwrap();
        assert_eq!(slots.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(sim.live_digitizer_slots(), vec![1]);
    }

    #[test]
    fn no_digitizers_fails_discovery_but_not_selection() {
        let (_sim, manager) =
            manager(SimulatedMil::new().with_system("M_SYSTEM_GIGE_VISION"));
        manager.ensure_system_selected().unwrap();
        assert!(manager.last_error().contains("no digitizer allocated"));
        assert!(matches!(
            manager.discover_digitizers(),
            Err(GrabberError::NoDigitizers(_))
        ));
    }

    #[test]
    fn uncovered_index_uses_degraded_mapping() {
        let (sim, manager) = manager(
            SimulatedMil::new()
                .with_system("M_SYSTEM_GIGE_VISION")
                .with_digitizer(3, 16, 16)
                .with_digitizer(5, 16, 16),
        );
        // Discovery maps 0->3 and 1->5. Index 5 is not covered and falls
        // back to slot 5, which camera 1 already holds.
        manager.ensure_digitizer(1).unwrap();
        assert_eq!(sim.live_digitizer_slots(), vec![5]);
        let err = manager.ensure_digitizer(5).unwrap_err();
        assert!(err.to_string().contains("already held by camera 1"));
    }

    #[test]
    fn last_error_clears_on_success_of_same_kind() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.ensure_system_selected().unwrap();
        sim.fail_slot("grab", 0);
        assert!(manager.grab(0, 8, 8).is_err());
        assert!(manager.last_error().contains("grab on device 0"));

        // A different kind of success leaves the grab failure visible.
        manager.ensure_digitizer(1).unwrap();
        assert!(!manager.last_error().is_empty());

        manager.grab(1, 8, 8).unwrap();
        assert_eq!(manager.last_error(), "");
    }

    #[test]
    fn grid_places_each_camera() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        let (canvas, report) = manager.grab_grid(&GridLayout::new(2, 2, 4, 3)).unwrap();
        assert_eq!(canvas.len(), 8 * 6 * 4);
        assert_eq!(report.filled, vec![0, 1, 2, 3]);

        for y in 0..6u32 {
            for x in 0..8u32 {
                let camera = (y / 3) * 2 + x / 4;
                let g = SimulatedMil::pattern_value(camera, x % 4, y % 3);
                let offset = ((y * 8 + x) * 4) as usize;
                assert_eq!(&canvas[offset..offset + 4], &[g, g, g, 255], "({x}, {y})");
            }
        }
    }

    #[test]
    fn grid_failure_leaves_black_quadrant() {
        let (sim, manager) = manager(SimulatedMil::demo());
        sim.fail_slot("grab", 2);
        let (canvas, report) = manager.grab_grid(&GridLayout::new(2, 2, 4, 3)).unwrap();
        assert_eq!(report.filled, vec![0, 1, 3]);
        assert_eq!(report.failed[0].0, 2);
        for y in 3..6usize {
            for x in 0..4usize {
                let offset = (y * 8 + x) * 4;
                assert_eq!(&canvas[offset..offset + 4], &[0, 0, 0, 0]);
            }
        }
        assert_eq!(manager.last_error(), "");
    }

    #[test]
    fn grid_runs_discovery_at_most_once() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.ensure_system_selected().unwrap();
        let probes_after_select = sim.call_count("dig_alloc");

        let layout = GridLayout::new(3, 2, 2, 2);
        let (_canvas, report) = manager.grab_grid(&layout).unwrap();
        assert_eq!(report.filled, vec![0, 1, 2, 3]);
        assert_eq!(report.failed.len(), 2);
        // One rediscovery (16 probes minus 4 held slots) plus 4 real
        // allocations and 2 degraded attempts on slots 4 and 5.
        assert_eq!(
            sim.call_count("dig_alloc") - probes_after_select,
            (DIGITIZER_SLOT_COUNT - 4) + 4 + 2
        );
    }

    #[test]
    fn grid_undersized_destination_is_untouched() {
        let (sim, manager) = manager(SimulatedMil::demo());
        let mut dst = vec![0xAA; 10];
        assert!(manager
            .grab_grid_into(&GridLayout::new(2, 2, 4, 3), &mut dst)
            .is_err());
        assert!(dst.iter().all(|&b| b == 0xAA));
        assert_eq!(sim.call_count("app_alloc"), 0);
    }

    #[test]
    fn grid_without_hardware_is_black_and_fails() {
        let (_sim, manager) = manager(SimulatedMil::demo().without_hardware());
        let mut dst = vec![0xAA; 8 * 6 * 4];
        let err = manager
            .grab_grid_into(&GridLayout::new(2, 2, 4, 3), &mut dst)
            .unwrap_err();
        assert!(matches!(err, GrabberError::Unsupported(_)));
        assert!(dst.iter().all(|&b| b == 0));
    }

    #[test]
    fn profile_change_releases_digitizers() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.ensure_digitizer(0).unwrap();
        manager.set_capability_profile(CapabilityProfile::File(PathBuf::from("cam.dcf")));
        assert_eq!(manager.allocated_count(), 0);
        assert!(sim.live_digitizer_slots().is_empty());

        manager.ensure_digitizer(0).unwrap();
        assert_eq!(sim.live_digitizer_slots(), vec![0]);
    }

    #[test]
    fn bad_profile_reports_allocation_error() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        manager.set_capability_profile(CapabilityProfile::File(PathBuf::from("cam.txt")));
        let err = manager.ensure_digitizer(0).unwrap_err();
        assert!(matches!(err, GrabberError::Allocation { slot: 0, .. }));
    }

    #[test]
    fn native_shape_reports_digitizer_geometry() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        assert_eq!(manager.native_shape(3).unwrap(), FrameShape::mono(640, 480));
    }

    #[test]
    fn shutdown_releases_everything_in_order() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.grab(0, 8, 8).unwrap();
        manager.grab(1, 8, 8).unwrap();
        let before = sim.free_log().len();
        manager.shutdown();

        let order: Vec<&str> = sim.free_log()[before..].iter().map(|(op, _)| *op).collect();
        assert_eq!(
            order,
            vec!["buf_free", "dig_free", "buf_free", "dig_free", "sys_free", "app_free"]
        );
        assert!(sim.live_digitizer_slots().is_empty());
        assert_eq!(sim.live_buffers(), 0);
        assert_eq!(sim.live_systems(), 0);
        assert_eq!(sim.live_apps(), 0);
        assert_eq!(manager.allocated_count(), 0);

        // The pool comes back on demand.
        manager.grab(0, 8, 8).unwrap();
        assert_eq!(sim.live_systems(), 1);
    }

    #[test]
    fn unplugged_camera_fails_grab_without_affecting_others() {
        let (sim, manager) = manager(SimulatedMil::demo());
        manager.grab(2, 8, 8).unwrap();
        sim.unplug(2);

        let err = manager.grab(2, 8, 8).unwrap_err();
        assert_eq!(err.kind(), crate::grabber::error::ErrorKind::Acquisition);
        assert!(manager.last_error().contains("camera disconnected"));

        // Other cameras keep working.
        manager.grab(1, 8, 8).unwrap();
        assert!(manager.last_error().is_empty());
    }

    #[test]
    fn drop_releases_hardware() {
        let sim = Arc::new(SimulatedMil::demo());
        {
            let manager = DigitizerManager::new(sim.clone());
            manager.grab(2, 8, 8).unwrap();
        }
        assert!(sim.live_digitizer_slots().is_empty());
        assert_eq!(sim.live_systems(), 0);
        assert_eq!(sim.live_apps(), 0);
    }

    #[test]
    fn summary_and_dump_describe_state() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        assert!(manager.summary_line().contains("sys=no"));
        manager.ensure_digitizer(0).unwrap();
        let summary = manager.summary_line();
        assert!(summary.contains("sys=M_SYSTEM_GIGE_VISION@0"));
        assert!(summary.contains("digs_allocated=1"));

        let dump = manager.dump_devices(6, true);
        assert!(dump.contains("[IN USE] dev=0 camera=0"));
        assert!(dump.contains("[OK] dev=1 size=640x480 bands=1"));
        assert!(dump.contains("[--] dev=5"));
        assert!(dump.contains("Mapping: 0->0 1->1 2->2 3->3"));
        assert!(dump.contains("camera 0 -> dev 0"));
    }

    #[test]
    fn dump_clamps_slot_count() {
        let (_sim, manager) = manager(SimulatedMil::demo());
        assert!(manager.dump_devices(0, false).contains("Probing devices 0..0"));
        assert!(manager.dump_devices(1000, false).contains("Probing devices 0..255"));
    }

    #[test]
    fn dump_reports_missing_system() {
        let (_sim, manager) = manager(SimulatedMil::new());
        let dump = manager.dump_devices(4, false);
        assert!(dump.starts_with("Capture system not available"));
    }

    #[test]
    fn concurrent_grabs_serialize() {
        let sim = Arc::new(SimulatedMil::demo());
        let manager = Arc::new(DigitizerManager::new(sim.clone()));
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        manager.grab(i, 16, 8).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(manager.stats().grab_count, 20);
        assert_eq!(sim.live_digitizer_slots(), vec![0, 1, 2, 3]);
    }
}
