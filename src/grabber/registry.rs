//! Per-camera digitizer handles.
//!
//! Each logical camera index owns at most one digitizer and its grab buffer.
//! Handles free their vendor resources when dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::api::{Lease, MilApi};
use super::discovery::ValidDeviceSlots;
use super::error::{GrabberError, Result};
use super::types::{BufferId, CapabilityProfile, DigitizerId, FrameShape, SystemId};

/// An 8-bit single-plane grab buffer.
struct GrabBuffer {
    lease: Lease<BufferId>,
    width: u32,
    height: u32,
}

/// A digitizer allocated for one logical camera.
pub struct DigitizerHandle {
    // Declared before `digitizer`: the buffer is released first.
    buffer: Option<GrabBuffer>,
    digitizer: Lease<DigitizerId>,
    pub logical_index: usize,
    pub physical_slot: u32,
    /// Geometry the digitizer reported at allocation.
    pub native: FrameShape,
    pub profile: CapabilityProfile,
}

impl DigitizerHandle {
    /// Allocate a digitizer on `slot` plus a grab buffer of its native shape.
    ///
    /// Any failure releases what was already allocated and reports the slot.
    pub fn allocate(
        api: &Arc<dyn MilApi>,
        system: SystemId,
        logical_index: usize,
        slot: u32,
        profile: &CapabilityProfile,
    ) -> Result<Self> {
        let alloc_err = |reason: String| GrabberError::Allocation { slot, reason };

        let id = api
            .dig_alloc(system, slot, profile)
            .map_err(|e| alloc_err(e.to_string()))?;
        let digitizer = Lease::new(Arc::clone(api), id);

        let native = api
            .dig_shape(id)
            .map_err(|e| alloc_err(format!("shape inquiry failed: {e}")))?;
        if native.is_empty() {
            return Err(alloc_err(format!(
                "digitizer reports an empty frame ({native})"
            )));
        }

        let buffer = api
            .buf_alloc(system, native.width, native.height)
            .map_err(|e| alloc_err(e.to_string()))?;

        tracing::info!(
            "Allocated digitizer for camera {logical_index} on device {slot} \
             ({native}, profile {profile})"
        );

        Ok(Self {
            buffer: Some(GrabBuffer {
                lease: Lease::new(Arc::clone(api), buffer),
                width: native.width,
                height: native.height,
            }),
            digitizer,
            logical_index,
            physical_slot: slot,
            native,
            profile: profile.clone(),
        })
    }

    pub fn digitizer_id(&self) -> DigitizerId {
        self.digitizer.id()
    }

    pub fn buffer_id(&self) -> Option<BufferId> {
        self.buffer.as_ref().map(|b| b.lease.id())
    }

    /// Shape of the current grab buffer.
    pub fn buffer_shape(&self) -> Option<FrameShape> {
        self.buffer
            .as_ref()
            .map(|b| FrameShape::mono(b.width, b.height))
    }

    /// Make sure the grab buffer is exactly `width x height`.
    ///
    /// On a shape change the old buffer is freed before the new one is
    /// allocated. Returns whether a reallocation happened. After an error the
    /// handle has no buffer and must be dropped by the caller.
    pub fn ensure_buffer(
        &mut self,
        api: &Arc<dyn MilApi>,
        system: SystemId,
        width: u32,
        height: u32,
    ) -> Result<bool> {
        if let Some(buf) = &self.buffer {
            if buf.width == width && buf.height == height {
                return Ok(false);
            }
        }

        self.buffer = None;
        let id = api
            .buf_alloc(system, width, height)
            .map_err(|e| GrabberError::Allocation {
                slot: self.physical_slot,
                reason: e.to_string(),
            })?;
        self.buffer = Some(GrabBuffer {
            lease: Lease::new(Arc::clone(api), id),
            width,
            height,
        });
        tracing::debug!(
            "Camera {} grab buffer reallocated to {width}x{height}",
            self.logical_index
        );
        Ok(true)
    }
}

/// Whether [`DigitizerRegistry::ensure`] allocated anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Existing,
    Allocated,
}

/// Logical camera index → digitizer handle. Grows on demand.
#[derive(Default)]
pub struct DigitizerRegistry {
    handles: Vec<Option<DigitizerHandle>>,
}

impl DigitizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for `index` unless one exists.
    ///
    /// The physical slot comes from `slots`, or the index itself when
    /// discovery did not cover it. A slot held by another index is refused.
    /// On failure the registry is left untouched.
    pub fn ensure(
        &mut self,
        api: &Arc<dyn MilApi>,
        system: SystemId,
        slots: &ValidDeviceSlots,
        index: usize,
        profile: &CapabilityProfile,
    ) -> Result<Ensured> {
        if self.contains(index) {
            return Ok(Ensured::Existing);
        }

        let slot = slots.resolve(index);
        if let Some(other) = self.claimant_of(slot) {
            return Err(GrabberError::Allocation {
                slot,
                reason: format!("device already held by camera {other}"),
            });
        }

        let handle = DigitizerHandle::allocate(api, system, index, slot, profile)?;
        self.insert(handle);
        Ok(Ensured::Allocated)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&DigitizerHandle> {
        self.handles.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DigitizerHandle> {
        self.handles.get_mut(index).and_then(Option::as_mut)
    }

    fn insert(&mut self, handle: DigitizerHandle) {
        let index = handle.logical_index;
        if self.handles.len() <= index {
            self.handles.resize_with(index + 1, || None);
        }
        self.handles[index] = Some(handle);
    }

    /// Drop the handle for `index`, freeing its buffer and digitizer.
    pub fn remove(&mut self, index: usize) -> Option<DigitizerHandle> {
        self.handles.get_mut(index).and_then(Option::take)
    }

    /// Logical index currently holding physical `slot`.
    pub fn claimant_of(&self, slot: u32) -> Option<usize> {
        self.iter()
            .find(|h| h.physical_slot == slot)
            .map(|h| h.logical_index)
    }

    /// Physical slot → logical index for every live handle.
    pub fn claimed_slots(&self) -> BTreeMap<u32, usize> {
        self.iter()
            .map(|h| (h.physical_slot, h.logical_index))
            .collect()
    }

    pub fn allocated_count(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DigitizerHandle> {
        self.handles.iter().filter_map(Option::as_ref)
    }

    /// Release every handle in index order.
    pub fn clear(&mut self) {
        for slot in self.handles.iter_mut() {
            slot.take();
        }
        self.handles.clear();
    }
}
