//! Simulated vendor library for tests and hardware-free runs.
//!
//! Uses a builder pattern to configure installed systems, digitizer slots,
//! fill patterns and error injection. Every call is counted so tests can
//! assert which vendor paths ran.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;

use super::api::MilApi;
use super::error::{GrabberError, Result};
use super::types::{AppId, BufferId, CapabilityProfile, DigitizerId, FrameShape, SystemId};

/// How a simulated digitizer fills its grab buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Deterministic per-slot gradient, see [`SimulatedMil::pattern_value`].
    Pattern,
    /// Every pixel has the same gray value.
    Constant(u8),
}

/// A simulated camera channel.
#[derive(Debug, Clone)]
struct SimChannel {
    shape: FrameShape,
    present: Option<bool>,
    fill: Fill,
}

/// A simulated grab buffer.
#[derive(Debug, Clone)]
struct SimBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Configurable one-shot error for a specific operation.
#[derive(Debug, Clone)]
struct ErrorInjection {
    operation: &'static str,
    error: GrabberError,
}

#[derive(Debug)]
struct SimState {
    hardware: bool,
    app_available: bool,
    /// Installed descriptors with the physical slots each allocates on.
    systems: Vec<(String, Vec<u32>)>,
    channels: BTreeMap<u32, SimChannel>,
    /// Persistent `(operation, slot)` failures.
    failing: HashSet<(&'static str, u32)>,
    error_injections: Vec<ErrorInjection>,
    calls: HashMap<&'static str, u32>,
    /// Every `*_free` call in order, with the freed id.
    frees: Vec<(&'static str, i64)>,
    next_id: i64,
    live_apps: HashSet<i64>,
    live_systems: HashMap<i64, String>,
    live_digitizers: HashMap<i64, u32>,
    live_buffers: HashMap<i64, SimBuffer>,
}

/// Simulated vendor library.
///
/// All state is behind a `Mutex` so the simulator satisfies `Send + Sync`.
pub struct SimulatedMil {
    state: Mutex<SimState>,
}

impl Default for SimulatedMil {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMil {
    /// Create an empty simulator: application context available, no systems.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                hardware: true,
                app_available: true,
                systems: Vec::new(),
                channels: BTreeMap::new(),
                failing: HashSet::new(),
                error_injections: Vec::new(),
                calls: HashMap::new(),
                frees: Vec::new(),
                next_id: 1,
                live_apps: HashSet::new(),
                live_systems: HashMap::new(),
                live_digitizers: HashMap::new(),
                live_buffers: HashMap::new(),
            }),
        }
    }

    /// A GigE system with four 640x480 cameras on slots 0..4.
    pub fn demo() -> Self {
        Self::new()
            .with_system("M_SYSTEM_GIGE_VISION")
            .with_digitizers(4, 640, 480)
    }

    /// Install a system that allocates on slot 0.
    pub fn with_system(self, descriptor: &str) -> Self {
        self.with_system_on_slots(descriptor, &[0])
    }

    /// Install a system that allocates only on the given physical slots.
    pub fn with_system_on_slots(self, descriptor: &str, slots: &[u32]) -> Self {
        self.state
            .lock()
            .systems
            .push((descriptor.to_string(), slots.to_vec()));
        self
    }

    /// Attach a camera to a physical digitizer slot.
    pub fn with_digitizer(self, slot: u32, width: u32, height: u32) -> Self {
        self.state.lock().channels.insert(
            slot,
            SimChannel {
                shape: FrameShape::mono(width, height),
                present: Some(true),
                fill: Fill::Pattern,
            },
        );
        self
    }

    /// Attach `count` identical cameras on slots `0..count`.
    pub fn with_digitizers(self, count: u32, width: u32, height: u32) -> Self {
        let mut result = self;
        for slot in 0..count {
            result = result.with_digitizer(slot, width, height);
        }
        result
    }

    /// Override the advisory presence answer of a slot.
    pub fn with_presence(self, slot: u32, present: Option<bool>) -> Self {
        if let Some(channel) = self.state.lock().channels.get_mut(&slot) {
            channel.present = present;
        }
        self
    }

    /// Make a slot produce a uniform gray frame.
    pub fn with_constant_gray(self, slot: u32, value: u8) -> Self {
        if let Some(channel) = self.state.lock().channels.get_mut(&slot) {
            channel.fill = Fill::Constant(value);
        }
        self
    }

    /// Make `operation` fail every time it targets `slot`.
    ///
    /// Operations keyed by slot: `"sys_alloc"`, `"dig_alloc"`, `"buf_alloc"`
    /// (slot of the owning system), `"grab"` (slot of the digitizer).
    pub fn with_failing(self, operation: &'static str, slot: u32) -> Self {
        self.fail_slot(operation, slot);
        self
    }

    /// Inject a one-shot error for a specific operation name.
    pub fn with_error(self, operation: &'static str, error: GrabberError) -> Self {
        self.state
            .lock()
            .error_injections
            .push(ErrorInjection { operation, error });
        self
    }

    /// Application context allocation always fails (runtime missing).
    pub fn without_app(self) -> Self {
        self.state.lock().app_available = false;
        self
    }

    /// Report no hardware support, like a build without the vendor library.
    pub fn without_hardware(self) -> Self {
        self.state.lock().hardware = false;
        self
    }

    /// Start failing `operation` on `slot` from now on.
    pub fn fail_slot(&self, operation: &'static str, slot: u32) {
        self.state.lock().failing.insert((operation, slot));
    }

    /// Remove a camera from a slot (already allocated handles stay live).
    pub fn unplug(&self, slot: u32) {
        self.state.lock().channels.remove(&slot);
    }

    /// Number of times `operation` was called.
    pub fn call_count(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// `*_free` calls in the order they happened, with the freed id.
    pub fn free_log(&self) -> Vec<(&'static str, i64)> {
        self.state.lock().frees.clone()
    }

    /// Physical slots with a live digitizer allocation, ascending.
    pub fn live_digitizer_slots(&self) -> Vec<u32> {
        let state = self.state.lock();
        let mut slots: Vec<u32> = state.live_digitizers.values().copied().collect();
        slots.sort_unstable();
        slots
    }

    /// Number of live grab buffers.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().live_buffers.len()
    }

    /// Number of live capture systems.
    pub fn live_systems(&self) -> usize {
        self.state.lock().live_systems.len()
    }

    /// Number of live application contexts.
    pub fn live_apps(&self) -> usize {
        self.state.lock().live_apps.len()
    }

    /// Gray value the `Pattern` fill writes at `(x, y)` for `slot`.
    pub fn pattern_value(slot: u32, x: u32, y: u32) -> u8 {
        (slot
            .wrapping_mul(61)
            .wrapping_add(x.wrapping_mul(3))
            .wrapping_add(y.wrapping_mul(17))
            % 256) as u8
    }
}

impl SimState {
    /// Count the call and fire any injected error for it.
    fn enter(&mut self, operation: &'static str) -> Result<()> {
        *self.calls.entry(operation).or_insert(0) += 1;
        if let Some(pos) = self
            .error_injections
            .iter()
            .position(|e| e.operation == operation)
        {
            let injection = self.error_injections.remove(pos);
            return Err(injection.error);
        }
        Ok(())
    }

    /// Count and log a `*_free` call.
    fn freed(&mut self, operation: &'static str, id: i64) {
        *self.calls.entry(operation).or_insert(0) += 1;
        self.frees.push((operation, id));
    }

    fn is_failing(&self, operation: &'static str, slot: u32) -> bool {
        self.failing.contains(&(operation, slot))
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn require_system(&self, system: SystemId, call: &'static str) -> Result<()> {
        if self.live_systems.contains_key(&system.0) {
            Ok(())
        } else {
            Err(GrabberError::driver(call, format!("invalid system {}", system.0)))
        }
    }

    fn digitizer_slot(&self, digitizer: DigitizerId, call: &'static str) -> Result<u32> {
        self.live_digitizers.get(&digitizer.0).copied().ok_or_else(|| {
            GrabberError::driver(call, format!("invalid digitizer {}", digitizer.0))
        })
    }

    /// Slot the currently live system was allocated on.
    fn system_slot(&self, system: SystemId) -> u32 {
        self.live_systems
            .get(&system.0)
            .and_then(|name| {
                self.systems
                    .iter()
                    .find(|(d, _)| d == name)
                    .and_then(|(_, slots)| slots.first().copied())
            })
            .unwrap_or(0)
    }
}

impl MilApi for SimulatedMil {
    fn hardware_support(&self) -> bool {
        self.state.lock().hardware
    }

    fn app_alloc(&self) -> Result<AppId> {
        let mut state = self.state.lock();
        state.enter("app_alloc")?;
        if !state.app_available {
            return Err(GrabberError::driver(
                "MappAlloc",
                "acquisition runtime not installed",
            ));
        }
        let id = state.next_id();
        state.live_apps.insert(id);
        Ok(AppId(id))
    }

    fn app_free(&self, app: AppId) {
        let mut state = self.state.lock();
        state.freed("app_free", app.0);
        state.live_apps.remove(&app.0);
    }

    fn disable_error_prints(&self, _app: AppId) {
        let mut state = self.state.lock();
        *state.calls.entry("disable_error_prints").or_insert(0) += 1;
    }

    fn installed_systems(&self, _app: AppId) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.enter("installed_systems")?;
        Ok(state.systems.iter().map(|(d, _)| d.clone()).collect())
    }

    fn sys_alloc(&self, _app: AppId, descriptor: &str, slot: u32) -> Result<SystemId> {
        let mut state = self.state.lock();
        state.enter("sys_alloc")?;
        let installed = state
            .systems
            .iter()
            .any(|(d, slots)| d == descriptor && slots.contains(&slot));
        if !installed || state.is_failing("sys_alloc", slot) {
            return Err(GrabberError::driver(
                "MsysAlloc",
                format!("{descriptor} not available on slot {slot}"),
            ));
        }
        let id = state.next_id();
        state.live_systems.insert(id, descriptor.to_string());
        Ok(SystemId(id))
    }

    fn sys_free(&self, system: SystemId) {
        let mut state = self.state.lock();
        state.freed("sys_free", system.0);
        state.live_systems.remove(&system.0);
    }

    fn dig_alloc(
        &self,
        system: SystemId,
        slot: u32,
        profile: &CapabilityProfile,
    ) -> Result<DigitizerId> {
        let mut state = self.state.lock();
        state.enter("dig_alloc")?;
        state.require_system(system, "MdigAlloc")?;
        if let CapabilityProfile::File(path) = profile {
            if path.extension().and_then(|e| e.to_str()) != Some("dcf") {
                return Err(GrabberError::driver(
                    "MdigAlloc",
                    format!("cannot load DCF '{}'", path.display()),
                ));
            }
        }
        if !state.channels.contains_key(&slot) || state.is_failing("dig_alloc", slot) {
            return Err(GrabberError::driver(
                "MdigAlloc",
                format!("no digitizer on device {slot}"),
            ));
        }
        if state.live_digitizers.values().any(|s| *s == slot) {
            return Err(GrabberError::driver(
                "MdigAlloc",
                format!("device {slot} already allocated"),
            ));
        }
        let id = state.next_id();
        state.live_digitizers.insert(id, slot);
        Ok(DigitizerId(id))
    }

    fn dig_shape(&self, digitizer: DigitizerId) -> Result<FrameShape> {
        let mut state = self.state.lock();
        state.enter("dig_shape")?;
        let slot = state.digitizer_slot(digitizer, "MdigInquire")?;
        state
            .channels
            .get(&slot)
            .map(|c| c.shape)
            .ok_or_else(|| GrabberError::driver("MdigInquire", "camera disconnected"))
    }

    fn dig_camera_present(&self, digitizer: DigitizerId) -> Option<bool> {
        let mut state = self.state.lock();
        *state.calls.entry("dig_camera_present").or_insert(0) += 1;
        let slot = state.live_digitizers.get(&digitizer.0).copied()?;
        state.channels.get(&slot).and_then(|c| c.present)
    }

    fn dig_free(&self, digitizer: DigitizerId) {
        let mut state = self.state.lock();
        state.freed("dig_free", digitizer.0);
        state.live_digitizers.remove(&digitizer.0);
    }

    fn buf_alloc(&self, system: SystemId, width: u32, height: u32) -> Result<BufferId> {
        let mut state = self.state.lock();
        state.enter("buf_alloc")?;
        state.require_system(system, "MbufAlloc2d")?;
        let slot = state.system_slot(system);
        if width == 0 || height == 0 || state.is_failing("buf_alloc", slot) {
            return Err(GrabberError::driver(
                "MbufAlloc2d",
                format!("cannot allocate {width}x{height} buffer"),
            ));
        }
        let id = state.next_id();
        state.live_buffers.insert(
            id,
            SimBuffer {
                width,
                height,
                data: vec![0; width as usize * height as usize],
            },
        );
        Ok(BufferId(id))
    }

    fn buf_free(&self, buffer: BufferId) {
        let mut state = self.state.lock();
        state.freed("buf_free", buffer.0);
        state.live_buffers.remove(&buffer.0);
    }

    fn grab(&self, digitizer: DigitizerId, buffer: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("grab")?;
        let slot = state.digitizer_slot(digitizer, "MdigGrab")?;
        if state.is_failing("grab", slot) {
            return Err(GrabberError::driver(
                "MdigGrab",
                format!("grab timeout on device {slot}"),
            ));
        }
        let fill = state
            .channels
            .get(&slot)
            .map(|c| c.fill)
            .ok_or_else(|| GrabberError::driver("MdigGrab", "camera disconnected"))?;
        let buf = state
            .live_buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| GrabberError::driver("MdigGrab", "invalid buffer"))?;
        let width = buf.width;
        for (i, px) in buf.data.iter_mut().enumerate() {
            let x = i as u32 % width;
            let y = i as u32 / width;
            *px = match fill {
                Fill::Pattern => Self::pattern_value(slot, x, y),
                Fill::Constant(v) => v,
            };
        }
        Ok(())
    }

    fn read_plane(&self, buffer: BufferId, dst: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("read_plane")?;
        let buf = state
            .live_buffers
            .get(&buffer.0)
            .ok_or_else(|| GrabberError::driver("MbufGet2d", "invalid buffer"))?;
        if dst.len() != buf.data.len() {
            return Err(GrabberError::driver(
                "MbufGet2d",
                format!(
                    "destination holds {} bytes, buffer is {}x{}",
                    dst.len(),
                    buf.width,
                    buf.height
                ),
            ));
        }
        dst.copy_from_slice(&buf.data);
        Ok(())
    }
}
