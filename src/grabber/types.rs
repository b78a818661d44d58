//! Handle IDs, shapes, capability profiles and subsystem descriptors.

use std::fmt;
use std::path::{Path, PathBuf};

/// Maximum number of cameras addressed by the operator.
pub const MAX_CAMERAS: usize = 24;

/// Physical slot numbers tried for each candidate capture system.
pub const SYSTEM_SLOT_COUNT: u32 = 8;

/// Physical device slots probed by digitizer discovery.
pub const DIGITIZER_SLOT_COUNT: u32 = 16;

/// Upper bound on slots probed by a diagnostic device dump.
pub const MAX_DUMP_SLOTS: u32 = 256;

/// Application context handle returned by the vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(pub i64);

/// Capture system handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub i64);

/// Digitizer (acquisition channel) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigitizerId(pub i64);

/// Image buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub i64);

/// Frame geometry reported by a digitizer or requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
}

impl FrameShape {
    /// Single-plane 8-bit shape.
    pub fn mono(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bands: 1,
        }
    }

    /// Number of pixels in one plane.
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether `width * height * bands` is zero.
    pub fn is_empty(&self) -> bool {
        self.pixels() == 0 || self.bands == 0
    }

    /// Byte length of the RGBA8 packing of this shape.
    pub fn rgba_len(&self) -> usize {
        self.pixels() * 4
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} bands={}", self.width, self.height, self.bands)
    }
}

/// Camera configuration profile ("DCF") passed at digitizer allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum CapabilityProfile {
    /// Let the vendor layer auto-configure the channel.
    #[default]
    Auto,
    /// A DCF file on disk.
    File(PathBuf),
}

impl CapabilityProfile {
    /// Build a profile from an optional path; empty strings mean `Auto`.
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(p) if !p.as_os_str().is_empty() => Self::File(p.to_path_buf()),
            _ => Self::Auto,
        }
    }

    /// The data-format string handed to the vendor library.
    pub fn data_format(&self) -> String {
        match self {
            Self::Auto => "M_DEFAULT".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "<M_DEFAULT>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Preference class of an installed capture system.
///
/// Ordering is the selection preference: later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemClass {
    /// Host/default systems with no acquisition hardware behind them.
    SoftwareFallback,
    /// Generic GigE Vision transport.
    GenericGige,
    /// Vendor GenTL producer.
    VendorGenTl,
    /// Dedicated frame-grabber board.
    DedicatedHardware,
}

impl SystemClass {
    /// Classify a system descriptor string such as `M_SYSTEM_GIGE_VISION`.
    pub fn classify(descriptor: &str) -> Self {
        let upper = descriptor.to_ascii_uppercase();
        if upper.contains("HOST") || upper.contains("DEFAULT") || upper.contains("SOFTWARE") {
            Self::SoftwareFallback
        } else if upper.contains("GIGE") {
            Self::GenericGige
        } else if upper.contains("GENTL") {
            Self::VendorGenTl
        } else {
            Self::DedicatedHardware
        }
    }

    pub fn score(&self) -> u32 {
        match self {
            Self::SoftwareFallback => 0,
            Self::GenericGige => 100,
            Self::VendorGenTl => 200,
            Self::DedicatedHardware => 300,
        }
    }
}

/// An installed capture system candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub score: u32,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let score = SystemClass::classify(&name).score();
        Self { name, score }
    }

    pub fn class(&self) -> SystemClass {
        SystemClass::classify(&self.name)
    }
}

/// An RGBA8 frame produced for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Row-major RGBA8 pixels, `width * height * 4` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
