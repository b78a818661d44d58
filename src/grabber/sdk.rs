//! Safe MIL wrapper.
//!
//! Only compiled with the `mil` feature. Production code uses this; tests
//! use `SimulatedMil` instead.

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};

use parking_lot::Mutex;

use super::api::MilApi;
use super::error::{GrabberError, Result};
use super::ffi::{self, MilId, MilInt, M_DEFAULT, M_NULL};
use super::types::{AppId, BufferId, CapabilityProfile, DigitizerId, FrameShape, SystemId};

/// The vendor library behind [`MilApi`].
///
/// Remembers buffer geometry so `read_plane` can check the destination size
/// before handing a raw pointer to the library.
#[derive(Default)]
pub struct MilSdk {
    buffers: Mutex<HashMap<BufferId, (u32, u32)>>,
}

impl MilSdk {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Error raised by the most recent vendor call on this thread, if any.
fn pending_error(call: &'static str) -> Option<GrabberError> {
    let mut message = vec![0u8; ffi::M_ERROR_MESSAGE_SIZE];
    let code = unsafe {
        ffi::MappGetError(
            M_DEFAULT,
            ffi::M_CURRENT + ffi::M_MESSAGE,
            message.as_mut_ptr().cast::<c_void>(),
        )
    };
    if code == ffi::M_NULL_ERROR {
        return None;
    }
    let text = CStr::from_bytes_until_nul(&message)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("error code {code}"));
    Some(GrabberError::driver(call, text))
}

fn check(call: &'static str) -> Result<()> {
    match pending_error(call) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Turn an allocation result into an id, picking up the vendor message.
fn allocated(call: &'static str, id: MilId) -> Result<MilId> {
    if id == M_NULL {
        return Err(pending_error(call)
            .unwrap_or_else(|| GrabberError::driver(call, "returned a null id")));
    }
    Ok(id)
}

fn c_string(call: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| GrabberError::driver(call, format!("'{value}' contains NUL")))
}

fn dig_inquire(digitizer: DigitizerId, inquire_type: MilInt) -> Result<MilInt> {
    let mut value: MilInt = 0;
    unsafe {
        ffi::MdigInquire(
            digitizer.0,
            inquire_type,
            (&mut value as *mut MilInt).cast::<c_void>(),
        );
    }
    check("MdigInquire")?;
    Ok(value)
}

impl MilApi for MilSdk {
    fn hardware_support(&self) -> bool {
        true
    }

    fn app_alloc(&self) -> Result<AppId> {
        let server = c_string("MappAlloc", "M_DEFAULT")?;
        let mut id: MilId = M_NULL;
        unsafe {
            ffi::MappAlloc(server.as_ptr(), M_DEFAULT, &mut id);
        }
        allocated("MappAlloc", id).map(AppId)
    }

    fn app_free(&self, app: AppId) {
        unsafe { ffi::MappFree(app.0) }
    }

    fn disable_error_prints(&self, app: AppId) {
        unsafe { ffi::MappControl(app.0, ffi::M_ERROR, ffi::M_PRINT_DISABLE) }
    }

    fn installed_systems(&self, app: AppId) -> Result<Vec<String>> {
        let mut count: MilInt = 0;
        unsafe {
            ffi::MappInquire(
                app.0,
                ffi::M_INSTALLED_SYSTEM_COUNT,
                (&mut count as *mut MilInt).cast::<c_void>(),
            );
        }
        check("MappInquire")?;

        let mut names = Vec::with_capacity(count.max(0) as usize);
        for i in 0..count.max(0) {
            let mut name = vec![0u8; ffi::M_SYSTEM_DESCRIPTOR_SIZE];
            unsafe {
                ffi::MappInquire(
                    app.0,
                    ffi::M_INSTALLED_SYSTEM_DESCRIPTOR + i,
                    name.as_mut_ptr().cast::<c_void>(),
                );
            }
            check("MappInquire")?;
            if let Ok(s) = CStr::from_bytes_until_nul(&name) {
                names.push(s.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn sys_alloc(&self, app: AppId, descriptor: &str, slot: u32) -> Result<SystemId> {
        let descriptor = c_string("MsysAlloc", descriptor)?;
        let mut id: MilId = M_NULL;
        unsafe {
            ffi::MsysAlloc(
                app.0,
                descriptor.as_ptr(),
                MilInt::from(slot),
                M_DEFAULT,
                &mut id,
            );
        }
        allocated("MsysAlloc", id).map(SystemId)
    }

    fn sys_free(&self, system: SystemId) {
        unsafe { ffi::MsysFree(system.0) }
    }

    fn dig_alloc(
        &self,
        system: SystemId,
        slot: u32,
        profile: &CapabilityProfile,
    ) -> Result<DigitizerId> {
        let format = c_string("MdigAlloc", &profile.data_format())?;
        let mut id: MilId = M_NULL;
        unsafe {
            ffi::MdigAlloc(
                system.0,
                MilInt::from(slot),
                format.as_ptr(),
                M_DEFAULT,
                &mut id,
            );
        }
        allocated("MdigAlloc", id).map(DigitizerId)
    }

    fn dig_shape(&self, digitizer: DigitizerId) -> Result<FrameShape> {
        let to_u32 = |v: MilInt| u32::try_from(v).unwrap_or(0);
        Ok(FrameShape {
            width: to_u32(dig_inquire(digitizer, ffi::M_SIZE_X)?),
            height: to_u32(dig_inquire(digitizer, ffi::M_SIZE_Y)?),
            bands: to_u32(dig_inquire(digitizer, ffi::M_SIZE_BAND)?),
        })
    }

    fn dig_camera_present(&self, digitizer: DigitizerId) -> Option<bool> {
        dig_inquire(digitizer, ffi::M_CAMERA_PRESENT)
            .ok()
            .map(|v| v != 0)
    }

    fn dig_free(&self, digitizer: DigitizerId) {
        unsafe { ffi::MdigFree(digitizer.0) }
    }

    fn buf_alloc(&self, system: SystemId, width: u32, height: u32) -> Result<BufferId> {
        let mut id: MilId = M_NULL;
        unsafe {
            ffi::MbufAlloc2d(
                system.0,
                MilInt::from(width),
                MilInt::from(height),
                8 + ffi::M_UNSIGNED,
                ffi::M_IMAGE + ffi::M_GRAB + ffi::M_PROC,
                &mut id,
            );
        }
        let buffer = BufferId(allocated("MbufAlloc2d", id)?);
        self.buffers.lock().insert(buffer, (width, height));
        Ok(buffer)
    }

    fn buf_free(&self, buffer: BufferId) {
        self.buffers.lock().remove(&buffer);
        unsafe { ffi::MbufFree(buffer.0) }
    }

    fn grab(&self, digitizer: DigitizerId, buffer: BufferId) -> Result<()> {
        unsafe { ffi::MdigGrab(digitizer.0, buffer.0) }
        check("MdigGrab")
    }

    fn read_plane(&self, buffer: BufferId, dst: &mut [u8]) -> Result<()> {
        let (width, height) = self
            .buffers
            .lock()
            .get(&buffer)
            .copied()
            .ok_or_else(|| GrabberError::driver("MbufGet2d", "unknown buffer"))?;
        if dst.len() != width as usize * height as usize {
            return Err(GrabberError::driver(
                "MbufGet2d",
                format!(
                    "destination holds {} bytes, buffer is {width}x{height}",
                    dst.len()
                ),
            ));
        }
        unsafe {
            ffi::MbufGet2d(
                buffer.0,
                0,
                0,
                MilInt::from(width),
                MilInt::from(height),
                dst.as_mut_ptr().cast::<c_void>(),
            );
        }
        check("MbufGet2d")
    }
}
