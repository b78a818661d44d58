//! Per-frame "cook": turns operator parameters into an output frame plus
//! the warning, error and info text a host shows next to it.

use std::sync::Arc;

use crate::grabber::error::Result;
use crate::grabber::grid::{GridLayout, GridReport};
use crate::grabber::manager::DigitizerManager;
use crate::grabber::types::{Frame, FrameShape};
use crate::settings::types::{DebugLevel, OperatorParams, OutputMode};

/// Frame emitted while the operator is disabled.
pub const DISABLED_FRAME: (u32, u32) = (64, 64);

/// Frame emitted when acquisition fails outright.
pub const ERROR_FRAME: (u32, u32) = (320, 64);

pub const ERROR_COLOR: [u8; 4] = [255, 0, 255, 255];

/// Slots probed by the dump pulse.
pub const DUMP_PULSE_SLOTS: u32 = 64;

/// Everything one cook produces.
#[derive(Debug, Clone)]
pub struct CookOutput {
    pub frame: Frame,
    pub warning: String,
    pub error: String,
    pub info: String,
    /// Present after a grid cook that reached the compositor.
    pub grid: Option<GridReport>,
    /// Whether `frame` holds acquired data rather than a fallback.
    pub captured: bool,
}

impl CookOutput {
    fn new(frame: Frame) -> Self {
        Self {
            frame,
            warning: String::new(),
            error: String::new(),
            info: String::new(),
            grid: None,
            captured: false,
        }
    }
}

/// Text produced by the device dump pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPulse {
    pub info: String,
    pub warning: String,
}

/// Host-agnostic frame operator over a shared [`DigitizerManager`].
pub struct FrameOperator {
    manager: Arc<DigitizerManager>,
}

impl FrameOperator {
    pub fn new(manager: Arc<DigitizerManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &DigitizerManager {
        &self.manager
    }

    /// Produce one output frame for `params`.
    pub fn cook(&self, params: &OperatorParams) -> CookOutput {
        let params = params.clone().normalized();

        if !params.enable {
            let (w, h) = DISABLED_FRAME;
            return CookOutput::new(Frame::solid(w, h, [0, 0, 0, 0]));
        }

        self.manager.set_capability_profile(params.profile());

        let mut error = String::new();
        if !self.manager.built_with_hardware_support() {
            error = "hardware support disabled in this build; set DIGITIZER_BACKEND=sim \
                     or build with the `mil` feature"
                .to_string();
        }

        let result = match params.output_mode {
            OutputMode::Single => self.cook_single(&params).map(|frame| (frame, None)),
            OutputMode::Grid => self
                .cook_grid(&params)
                .map(|(frame, report)| (frame, Some(report))),
        };

        let (mut out, failure) = match result {
            Ok((frame, report)) => {
                let mut out = CookOutput::new(frame);
                out.grid = report;
                out.captured = true;
                (out, None)
            }
            Err(e) => {
                let (w, h) = ERROR_FRAME;
                (CookOutput::new(Frame::solid(w, h, ERROR_COLOR)), Some(e))
            }
        };
        out.info = self.manager.summary_line();

        if params.debug_level >= DebugLevel::Basic {
            out.warning = self.status_line(&params, failure.is_some());
            if params.debug_level >= DebugLevel::Verbose {
                out.info.push_str("\n\nLastError: ");
                out.info.push_str(&self.manager.last_error());
                if let Some(report) = &out.grid {
                    let failed: Vec<usize> = report.failed.iter().map(|(i, _)| *i).collect();
                    out.info.push_str(&format!(
                        "\nGrid: filled {:?} failed {failed:?}",
                        report.filled
                    ));
                }
                out.info
                    .push_str("\nNote: use the device dump to probe digitizer indices.");
            }
        } else if let Some(e) = &failure {
            if error.is_empty() {
                error = e.to_string();
            }
        }

        if let Some(e) = &failure {
            tracing::debug!("Cook failed: {e}");
        }
        out.error = error;
        out
    }

    fn cook_single(&self, params: &OperatorParams) -> Result<Frame> {
        let index = params.device_index();
        let shape = self.requested_shape(params, index)?;
        let data = self.manager.grab(index, shape.width, shape.height)?;
        Ok(Frame {
            data,
            width: shape.width,
            height: shape.height,
        })
    }

    fn cook_grid(&self, params: &OperatorParams) -> Result<(Frame, GridReport)> {
        let first = params.device_offset as usize;
        let tile = self.requested_shape(params, first)?;
        let layout = GridLayout::for_cameras(
            params.camera_count as usize,
            params.grid_cols,
            tile.width,
            tile.height,
        )
        .starting_at(first);
        let canvas = layout.canvas_shape()?;
        let (data, report) = self.manager.grab_grid(&layout)?;
        Ok((
            Frame {
                data,
                width: canvas.width,
                height: canvas.height,
            },
            report,
        ))
    }

    /// Explicit resolution, else the native size of camera `index`.
    fn requested_shape(&self, params: &OperatorParams, index: usize) -> Result<FrameShape> {
        match params.resolution {
            Some(r) => Ok(FrameShape::mono(r.width, r.height)),
            None => self.manager.native_shape(index),
        }
    }

    fn status_line(&self, params: &OperatorParams, failed: bool) -> String {
        let mode = match params.output_mode {
            OutputMode::Single => "Single",
            OutputMode::Grid => "Grid",
        };
        let mut s = format!(
            "camIdx={} devNum={} mode={mode} dcf='{}' | {}",
            params.camera_index,
            params.device_index(),
            params.profile(),
            self.manager.summary_line()
        );
        if failed {
            s.push_str(" | lastError: ");
            s.push_str(&self.manager.last_error());
        }
        s
    }

    /// Probe the first 64 device slots for the info panel.
    pub fn dump_devices(&self, params: &OperatorParams) -> DumpPulse {
        let verbose = params.debug_level >= DebugLevel::Verbose;
        DumpPulse {
            info: self.manager.dump_devices(DUMP_PULSE_SLOTS, verbose),
            warning: "Dumped digitizer probe to the info panel.".to_string(),
        }
    }
}
