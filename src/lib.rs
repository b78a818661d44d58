pub mod diagnostics;
pub mod grabber;
pub mod operator;
pub mod settings;

use std::str::FromStr;
use std::sync::Arc;

use grabber::api::MilApi;
use grabber::error::{GrabberError, Result};
use grabber::mock::SimulatedMil;
use grabber::types::{AppId, BufferId, CapabilityProfile, DigitizerId, FrameShape, SystemId};

/// Environment variable that picks the vendor adapter at startup.
pub const BACKEND_ENV: &str = "DIGITIZER_BACKEND";

/// Which [`MilApi`] implementation backs the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    /// Four simulated 640x480 cameras.
    Simulated,
    /// The vendor library (needs the `mil` feature).
    Mil,
    /// No hardware; every acquisition fails with an environment error.
    Disabled,
}

impl FromStr for BackendChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" | "simulated" => Ok(Self::Simulated),
            "mil" => Ok(Self::Mil),
            "none" | "disabled" => Ok(Self::Disabled),
            other => Err(format!(
                "unknown backend '{other}' (expected sim, mil or none)"
            )),
        }
    }
}

impl BackendChoice {
    /// The vendor library when compiled in, otherwise disabled.
    pub fn default_for_build() -> Self {
        if cfg!(feature = "mil") {
            Self::Mil
        } else {
            Self::Disabled
        }
    }
}

/// Build the vendor adapter for `choice`.
pub fn create_api(choice: BackendChoice) -> Arc<dyn MilApi> {
    match choice {
        BackendChoice::Simulated => {
            tracing::info!("Using simulated digitizers");
            Arc::new(SimulatedMil::demo())
        }
        BackendChoice::Mil => {
            #[cfg(feature = "mil")]
            {
                Arc::new(grabber::sdk::MilSdk::new())
            }
            #[cfg(not(feature = "mil"))]
            {
                tracing::warn!("Built without the `mil` feature; digitizer hardware disabled");
                Arc::new(DisabledMil)
            }
        }
        BackendChoice::Disabled => Arc::new(DisabledMil),
    }
}

/// Adapter used when no vendor library is available.
pub struct DisabledMil;

fn disabled(call: &'static str) -> GrabberError {
    GrabberError::driver(call, "hardware support disabled")
}

impl MilApi for DisabledMil {
    fn hardware_support(&self) -> bool {
        false
    }
    fn app_alloc(&self) -> Result<AppId> {
        Err(disabled("MappAlloc"))
    }
    fn app_free(&self, _app: AppId) {}
    fn disable_error_prints(&self, _app: AppId) {}
    fn installed_systems(&self, _app: AppId) -> Result<Vec<String>> {
        Ok(vec![])
    }
    fn sys_alloc(&self, _app: AppId, _descriptor: &str, _slot: u32) -> Result<SystemId> {
        Err(disabled("MsysAlloc"))
    }
    fn sys_free(&self, _system: SystemId) {}
    fn dig_alloc(
        &self,
        _system: SystemId,
        _slot: u32,
        _profile: &CapabilityProfile,
    ) -> Result<DigitizerId> {
        Err(disabled("MdigAlloc"))
    }
    fn dig_shape(&self, _digitizer: DigitizerId) -> Result<FrameShape> {
        Err(disabled("MdigInquire"))
    }
    fn dig_camera_present(&self, _digitizer: DigitizerId) -> Option<bool> {
        None
    }
    fn dig_free(&self, _digitizer: DigitizerId) {}
    fn buf_alloc(&self, _system: SystemId, _width: u32, _height: u32) -> Result<BufferId> {
        Err(disabled("MbufAlloc2d"))
    }
    fn buf_free(&self, _buffer: BufferId) {}
    fn grab(&self, _digitizer: DigitizerId, _buffer: BufferId) -> Result<()> {
        Err(disabled("MdigGrab"))
    }
    fn read_plane(&self, _buffer: BufferId, _dst: &mut [u8]) -> Result<()> {
        Err(disabled("MbufGet2d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grabber::manager::DigitizerManager;

    #[test]
    fn parses_backend_names() {
        assert_eq!("sim".parse::<BackendChoice>(), Ok(BackendChoice::Simulated));
        assert_eq!(" MIL ".parse::<BackendChoice>(), Ok(BackendChoice::Mil));
        assert_eq!("none".parse::<BackendChoice>(), Ok(BackendChoice::Disabled));
        assert!("gpu".parse::<BackendChoice>().is_err());
    }

    #[test]
    fn disabled_backend_reports_no_hardware() {
        let manager = DigitizerManager::new(create_api(BackendChoice::Disabled));
        assert!(!manager.built_with_hardware_support());
        assert!(manager.summary_line().contains("disabled"));
        let err = manager.grab(0, 4, 4).unwrap_err();
        assert_eq!(err.kind(), grabber::error::ErrorKind::Environment);
        assert!(manager
            .dump_devices(4, false)
            .starts_with("Cannot dump devices"));
    }

    #[test]
    fn simulated_backend_grabs() {
        let manager = DigitizerManager::new(create_api(BackendChoice::Simulated));
        assert_eq!(manager.grab(3, 8, 8).unwrap().len(), 8 * 8 * 4);
    }
}
