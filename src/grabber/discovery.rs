//! Digitizer discovery.
//!
//! Probes physical device slots on the selected system and records every
//! slot whose digitizer allocates. Presence answers are kept for the report
//! only; some boards report presence unreliably.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::api::{Lease, MilApi};
use super::types::{CapabilityProfile, FrameShape, SystemId};

/// Logical camera index → physical device slot, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidDeviceSlots(Vec<u32>);

impl ValidDeviceSlots {
    pub fn new(slots: Vec<u32>) -> Self {
        Self(slots)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether `index` has a discovered slot.
    pub fn covers(&self, index: usize) -> bool {
        index < self.0.len()
    }

    /// Physical slot for a logical index; falls back to the index itself.
    pub fn resolve(&self, index: usize) -> u32 {
        self.0.get(index).copied().unwrap_or(index as u32)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

/// What happened when a slot was probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The digitizer allocated; shape and presence as inquired.
    Accepted {
        shape: Option<FrameShape>,
        present: Option<bool>,
    },
    /// Held by the registry for a logical camera; not re-probed.
    InUse { logical_index: usize },
    /// Allocation failed.
    Rejected(String),
}

impl ProbeOutcome {
    pub fn is_valid(&self) -> bool {
        !matches!(self, ProbeOutcome::Rejected(_))
    }
}

/// Result of probing one physical slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotProbe {
    pub slot: u32,
    pub outcome: ProbeOutcome,
}

/// Slots accepted by discovery plus the per-slot probe details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub slots: ValidDeviceSlots,
    pub probes: Vec<SlotProbe>,
}

/// Probe a single slot with the auto-configuration profile.
///
/// Slots in `claimed` (physical slot → logical index) are reported as in
/// use without calling the vendor library. A successful probe allocation is
/// released before returning.
pub fn probe_slot(
    api: &Arc<dyn MilApi>,
    system: SystemId,
    slot: u32,
    claimed: &BTreeMap<u32, usize>,
) -> SlotProbe {
    if let Some(&logical_index) = claimed.get(&slot) {
        return SlotProbe {
            slot,
            outcome: ProbeOutcome::InUse { logical_index },
        };
    }

    let outcome = match api.dig_alloc(system, slot, &CapabilityProfile::Auto) {
        Ok(id) => {
            let lease = Lease::new(Arc::clone(api), id);
            let shape = api.dig_shape(lease.id()).ok();
            let present = api.dig_camera_present(lease.id());
            ProbeOutcome::Accepted { shape, present }
        }
        Err(e) => ProbeOutcome::Rejected(e.to_string()),
    };
    SlotProbe { slot, outcome }
}

/// Probe slots `0..slot_count` and collect the ones that allocate.
pub fn discover_digitizers(
    api: &Arc<dyn MilApi>,
    system: SystemId,
    slot_count: u32,
    claimed: &BTreeMap<u32, usize>,
) -> DiscoveryReport {
    let mut slots = Vec::new();
    let mut probes = Vec::with_capacity(slot_count as usize);

    for slot in 0..slot_count {
        let probe = probe_slot(api, system, slot, claimed);
        match &probe.outcome {
            ProbeOutcome::Accepted { shape, present } => {
                if *present == Some(false) {
                    tracing::debug!("Device {slot} allocated but reports no camera; keeping it");
                }
                tracing::debug!("Device {slot} accepted (shape {shape:?})");
                slots.push(slot);
            }
            ProbeOutcome::InUse { logical_index } => {
                tracing::debug!("Device {slot} in use by camera {logical_index}");
                slots.push(slot);
            }
            ProbeOutcome::Rejected(reason) => {
                tracing::trace!("Device {slot} rejected: {reason}");
            }
        }
        probes.push(probe);
    }

    tracing::info!("Discovered {} digitizer(s): {:?}", slots.len(), slots);
    DiscoveryReport {
        slots: ValidDeviceSlots::new(slots),
        probes,
    }
}
