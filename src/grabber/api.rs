//! `MilApi` trait: abstracts the vendor acquisition library for testability.
//!
//! The real `MilSdk`, the `SimulatedMil` and the `DisabledMil` adapters all
//! implement this trait, so `DigitizerManager` can pick one at startup.

use std::sync::Arc;

use super::error::Result;
use super::types::{AppId, BufferId, CapabilityProfile, DigitizerId, FrameShape, SystemId};

/// Abstraction over the vendor acquisition library.
///
/// All methods take `&self`; implementations manage their own interior
/// mutability. Free calls cannot fail.
pub trait MilApi: Send + Sync {
    /// Whether this adapter can reach real (or simulated) hardware.
    fn hardware_support(&self) -> bool;

    /// Allocate the application context.
    fn app_alloc(&self) -> Result<AppId>;

    /// Release the application context.
    fn app_free(&self, app: AppId);

    /// Stop the vendor layer from raising interactive error dialogs.
    fn disable_error_prints(&self, app: AppId);

    /// List the installed system descriptors, in vendor enumeration order.
    fn installed_systems(&self, app: AppId) -> Result<Vec<String>>;

    /// Allocate a capture system by descriptor on a physical slot.
    fn sys_alloc(&self, app: AppId, descriptor: &str, slot: u32) -> Result<SystemId>;

    /// Release a capture system.
    fn sys_free(&self, system: SystemId);

    /// Allocate a digitizer on a physical device slot.
    fn dig_alloc(
        &self,
        system: SystemId,
        slot: u32,
        profile: &CapabilityProfile,
    ) -> Result<DigitizerId>;

    /// Native frame geometry of a digitizer.
    fn dig_shape(&self, digitizer: DigitizerId) -> Result<FrameShape>;

    /// Advisory camera-presence query. `None` when the board cannot tell.
    fn dig_camera_present(&self, digitizer: DigitizerId) -> Option<bool>;

    /// Release a digitizer.
    fn dig_free(&self, digitizer: DigitizerId);

    /// Allocate an 8-bit unsigned single-plane grab buffer.
    fn buf_alloc(&self, system: SystemId, width: u32, height: u32) -> Result<BufferId>;

    /// Release a buffer.
    fn buf_free(&self, buffer: BufferId);

    /// Blocking single-frame grab into `buffer`.
    fn grab(&self, digitizer: DigitizerId, buffer: BufferId) -> Result<()>;

    /// Copy the buffer's 8-bit plane into `dst` (exactly `width * height`).
    fn read_plane(&self, buffer: BufferId, dst: &mut [u8]) -> Result<()>;
}

/// A vendor handle that knows how to release itself.
pub trait Release: Copy + std::fmt::Debug {
    fn release(self, api: &dyn MilApi);
}

impl Release for AppId {
    fn release(self, api: &dyn MilApi) {
        api.app_free(self);
    }
}

impl Release for SystemId {
    fn release(self, api: &dyn MilApi) {
        api.sys_free(self);
    }
}

impl Release for DigitizerId {
    fn release(self, api: &dyn MilApi) {
        api.dig_free(self);
    }
}

impl Release for BufferId {
    fn release(self, api: &dyn MilApi) {
        api.buf_free(self);
    }
}

/// Owning wrapper around a vendor handle; frees it on drop.
pub struct Lease<H: Release> {
    api: Arc<dyn MilApi>,
    id: H,
}

impl<H: Release> Lease<H> {
    /// Take ownership of a freshly allocated handle.
    pub fn new(api: Arc<dyn MilApi>, id: H) -> Self {
        Self { api, id }
    }

    pub fn id(&self) -> H {
        self.id
    }
}

impl<H: Release> std::fmt::Debug for Lease<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lease").field(&self.id).finish()
    }
}

impl<H: Release> Drop for Lease<H> {
    fn drop(&mut self) {
        tracing::trace!("releasing {:?}", self.id);
        self.id.release(&*self.api);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::mock::SimulatedMil;

    #[test]
    fn trait_is_object_safe() {
        fn _accepts_dyn(_api: &dyn MilApi) {}
    }

    #[test]
    fn trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn MilApi>>();
    }

    #[test]
    fn lease_frees_on_drop() {
        let sim = Arc::new(SimulatedMil::new().with_system("M_SYSTEM_GIGE_VISION"));
        let api: Arc<dyn MilApi> = sim.clone();
        let app = api.app_alloc().unwrap();
        {
            let _lease = Lease::new(Arc::clone(&api), app);
            assert_eq!(sim.call_count("app_free"), 0);
        }
        assert_eq!(sim.call_count("app_free"), 1);
    }

    #[test]
    fn lease_exposes_id() {
        let sim: Arc<dyn MilApi> = Arc::new(SimulatedMil::new());
        let lease = Lease::new(sim, BufferId(42));
        assert_eq!(lease.id(), BufferId(42));
        assert_eq!(format!("{lease:?}"), "Lease(BufferId(42))");
    }
}
