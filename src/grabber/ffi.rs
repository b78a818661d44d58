//! Raw MIL FFI declarations.
//!
//! Only compiled with the `mil` feature, which links against the vendor
//! library. All access goes through the safe `MilSdk` wrapper; never call
//! these directly.
//!
//! Strings use the ANSI entry points (`M_MIL_UNICODE_API` off).

#![allow(non_snake_case)]

use std::ffi::{c_char, c_void};

pub type MilId = i64;
pub type MilInt = i64;

pub const M_NULL: MilId = 0;
pub const M_DEFAULT: MilInt = 0x1000_0000;

// MappControl / MappGetError
pub const M_ERROR: MilInt = 0x4000_0000;
pub const M_PRINT_DISABLE: MilInt = 0;
pub const M_CURRENT: MilInt = 2;
pub const M_NULL_ERROR: MilInt = 0;
pub const M_MESSAGE: MilInt = 0x2000_0000;
pub const M_ERROR_MESSAGE_SIZE: usize = 1024;

// MappInquire
pub const M_INSTALLED_SYSTEM_COUNT: MilInt = 147;
pub const M_INSTALLED_SYSTEM_DESCRIPTOR: MilInt = 0x0001_0000;
pub const M_SYSTEM_DESCRIPTOR_SIZE: usize = 128;

// MdigInquire
pub const M_SIZE_X: MilInt = 1536;
pub const M_SIZE_Y: MilInt = 1537;
pub const M_SIZE_BAND: MilInt = 1005;
pub const M_CAMERA_PRESENT: MilInt = 5362;

// MbufAlloc2d
pub const M_UNSIGNED: MilInt = 0;
pub const M_IMAGE: MilInt = 0x4;
pub const M_GRAB: MilInt = 0x80;
pub const M_PROC: MilInt = 0x200;

#[link(name = "mil")]
extern "C" {
    /// Allocate the application context.
    pub fn MappAlloc(server: *const c_char, init_flag: MilInt, app_id: *mut MilId) -> MilId;

    pub fn MappFree(app_id: MilId);

    /// Change application-wide behavior, e.g. error printing.
    pub fn MappControl(app_id: MilId, control_type: MilInt, control_value: MilInt);

    /// Query application-wide values, including installed systems.
    pub fn MappInquire(app_id: MilId, inquire_type: MilInt, user_var: *mut c_void) -> MilInt;

    /// Fetch the error raised by the most recent call on this thread.
    pub fn MappGetError(app_id: MilId, error_type: MilInt, error: *mut c_void) -> MilInt;

    pub fn MsysAlloc(
        app_id: MilId,
        system_descriptor: *const c_char,
        system_num: MilInt,
        init_flag: MilInt,
        sys_id: *mut MilId,
    ) -> MilId;

    pub fn MsysFree(sys_id: MilId);

    /// Allocate a digitizer. `data_format` is a DCF path or "M_DEFAULT".
    pub fn MdigAlloc(
        sys_id: MilId,
        dev_num: MilInt,
        data_format: *const c_char,
        init_flag: MilInt,
        dig_id: *mut MilId,
    ) -> MilId;

    pub fn MdigInquire(dig_id: MilId, inquire_type: MilInt, user_var: *mut c_void) -> MilInt;

    pub fn MdigFree(dig_id: MilId);

    /// Blocking single-frame grab.
    pub fn MdigGrab(dig_id: MilId, dest_buf_id: MilId);

    pub fn MbufAlloc2d(
        sys_id: MilId,
        size_x: MilInt,
        size_y: MilInt,
        type_: MilInt,
        attribute: MilInt,
        buf_id: *mut MilId,
    ) -> MilId;

    pub fn MbufFree(buf_id: MilId);

    /// Copy a region of a buffer into user memory.
    pub fn MbufGet2d(
        buf_id: MilId,
        off_x: MilInt,
        off_y: MilInt,
        size_x: MilInt,
        size_y: MilInt,
        user_array: *mut c_void,
    );
}
