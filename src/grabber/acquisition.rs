//! Single-frame acquisition and RGBA8 packing.

use std::sync::Arc;

use super::api::MilApi;
use super::error::{GrabberError, Result};
use super::registry::DigitizerHandle;
use super::types::{FrameShape, SystemId};

/// Check a grab request before any hardware is touched.
///
/// Both dimensions must be positive and `dst_len` must hold the RGBA8
/// packing of the frame.
pub fn validate_request(width: u32, height: u32, dst_len: usize) -> Result<FrameShape> {
    if width == 0 || height == 0 {
        return Err(GrabberError::InvalidRequest(format!(
            "frame size must be positive, got {width}x{height}"
        )));
    }
    let required = (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(4))
        .ok_or_else(|| {
            GrabberError::InvalidRequest(format!("frame size {width}x{height} overflows"))
        })?;
    if dst_len < required {
        return Err(GrabberError::InvalidRequest(format!(
            "destination holds {dst_len} bytes, {width}x{height} RGBA8 needs {required}"
        )));
    }
    Ok(FrameShape::mono(width, height))
}

/// Expand an 8-bit gray plane into RGBA8: (g, g, g, 255) per pixel.
///
/// Writes exactly `gray.len() * 4` bytes at the start of `dst`.
pub fn gray_to_rgba8(gray: &[u8], dst: &mut [u8]) {
    for (px, &g) in dst.chunks_exact_mut(4).zip(gray) {
        px.copy_from_slice(&[g, g, g, 255]);
    }
}

/// Grab one frame through `handle` into `dst` as RGBA8.
///
/// Reallocates the grab buffer when the requested shape differs. Blocks for
/// the duration of the vendor grab; no retries.
pub fn acquire_into(
    api: &Arc<dyn MilApi>,
    system: SystemId,
    handle: &mut DigitizerHandle,
    shape: FrameShape,
    dst: &mut [u8],
) -> Result<()> {
    handle.ensure_buffer(api, system, shape.width, shape.height)?;
    let buffer = handle.buffer_id().ok_or_else(|| GrabberError::Allocation {
        slot: handle.physical_slot,
        reason: "grab buffer missing".to_string(),
    })?;

    let slot = handle.physical_slot;
    api.grab(handle.digitizer_id(), buffer)
        .map_err(|e| GrabberError::Acquisition(format!("grab on device {slot}: {e}")))?;

    let mut gray = vec![0u8; shape.pixels()];
    api.read_plane(buffer, &mut gray)
        .map_err(|e| GrabberError::Acquisition(format!("read on device {slot}: {e}")))?;

    gray_to_rgba8(&gray, &mut dst[..shape.rgba_len()]);
    Ok(())
}
