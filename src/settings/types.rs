use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::grabber::types::{CapabilityProfile, MAX_CAMERAS};

/// Highest accepted device-index offset.
pub const MAX_DEVICE_OFFSET: u32 = 1024;

/// A menu parameter as written by a host: its index or its lowercase name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MenuValue {
    Index(u64),
    Name(String),
}

/// What the operator outputs each cook.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "MenuValue")]
pub enum OutputMode {
    /// One camera, chosen by `camera_index`.
    #[default]
    Single,
    /// A composite of `camera_count` cameras.
    Grid,
}

impl TryFrom<MenuValue> for OutputMode {
    type Error = String;

    fn try_from(value: MenuValue) -> Result<Self, Self::Error> {
        match value {
            MenuValue::Index(0) => Ok(Self::Single),
            MenuValue::Index(1) => Ok(Self::Grid),
            MenuValue::Name(name) => match name.to_ascii_lowercase().as_str() {
                "single" => Ok(Self::Single),
                "grid" => Ok(Self::Grid),
                _ => Err(format!("unknown output mode '{name}'")),
            },
            MenuValue::Index(other) => Err(format!("output mode {other} out of range 0..=1")),
        }
    }
}

/// How much diagnostic text accompanies each cook.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase", try_from = "MenuValue")]
pub enum DebugLevel {
    #[default]
    Off,
    Basic,
    Verbose,
}

impl DebugLevel {
    /// Map the `0 | 1 | 2` parameter value; larger values saturate.
    pub fn from_index(value: u8) -> Self {
        match value {
            0 => Self::Off,
            1 => Self::Basic,
            _ => Self::Verbose,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "basic" => Some(Self::Basic),
            "verbose" => Some(Self::Verbose),
            _ => None,
        }
    }

    /// Log level a front end should run at for this debug level.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Warn,
            Self::Basic => log::LevelFilter::Info,
            Self::Verbose => log::LevelFilter::Debug,
        }
    }
}

impl TryFrom<MenuValue> for DebugLevel {
    type Error = String;

    fn try_from(value: MenuValue) -> Result<Self, Self::Error> {
        match value {
            MenuValue::Index(index) => Ok(Self::from_index(index.min(u64::from(u8::MAX)) as u8)),
            MenuValue::Name(name) => {
                Self::from_name(&name).ok_or_else(|| format!("unknown debug level '{name}'"))
            }
        }
    }
}

/// Explicit output size requested instead of the camera's native size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Parameters the frame operator reads every cook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorParams {
    pub enable: bool,
    /// Logical camera for single mode, `0..=23`.
    pub camera_index: u32,
    pub output_mode: OutputMode,
    /// Grid columns, `1..=24`.
    pub grid_cols: u32,
    /// DCF capability profile; `None` auto-configures.
    pub dcf_path: Option<PathBuf>,
    /// Added to every logical index before it reaches the pool.
    pub device_offset: u32,
    pub debug_level: DebugLevel,
    pub resolution: Option<Resolution>,
    /// Cameras shown in grid mode, `1..=24`.
    pub camera_count: u32,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            enable: true,
            camera_index: 0,
            output_mode: OutputMode::Single,
            grid_cols: 6,
            dcf_path: None,
            device_offset: 0,
            debug_level: DebugLevel::Off,
            resolution: None,
            camera_count: MAX_CAMERAS as u32,
        }
    }
}

impl OperatorParams {
    /// Clamp every value into its accepted range.
    pub fn normalized(mut self) -> Self {
        let max_index = MAX_CAMERAS as u32;
        self.camera_index = self.camera_index.min(max_index - 1);
        self.grid_cols = self.grid_cols.clamp(1, max_index);
        self.device_offset = self.device_offset.min(MAX_DEVICE_OFFSET);
        self.camera_count = self.camera_count.clamp(1, max_index);
        if self
            .dcf_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.dcf_path = None;
        }
        if self
            .resolution
            .is_some_and(|r| r.width == 0 || r.height == 0)
        {
            self.resolution = None;
        }
        self
    }

    pub fn profile(&self) -> CapabilityProfile {
        CapabilityProfile::from_path(self.dcf_path.as_deref())
    }

    /// Pool index for single mode: offset plus camera index.
    pub fn device_index(&self) -> usize {
        self.device_offset as usize + self.camera_index as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operator_defaults() {
        let p = OperatorParams::default();
        assert!(p.enable);
        assert_eq!(p.camera_index, 0);
        assert_eq!(p.output_mode, OutputMode::Single);
        assert_eq!(p.grid_cols, 6);
        assert_eq!(p.device_offset, 0);
        assert_eq!(p.debug_level, DebugLevel::Off);
        assert_eq!(p.camera_count, 24);
        assert_eq!(p.profile(), CapabilityProfile::Auto);
    }

    #[test]
    fn deserialises_partial_json_with_defaults() {
        let json = r#"{ "outputMode": "grid", "gridCols": 4, "debugLevel": "verbose" }"#;
        let p: OperatorParams = serde_json::from_str(json).unwrap();
        assert_eq!(p.output_mode, OutputMode::Grid);
        assert_eq!(p.grid_cols, 4);
        assert_eq!(p.debug_level, DebugLevel::Verbose);
        assert!(p.enable);
        assert_eq!(p.camera_count, 24);
    }

    #[test]
    fn menu_parameters_accept_indices() {
        let json = r#"{ "outputMode": 1, "debugLevel": 2 }"#;
        let p: OperatorParams = serde_json::from_str(json).unwrap();
        assert_eq!(p.output_mode, OutputMode::Grid);
        assert_eq!(p.debug_level, DebugLevel::Verbose);

        let p: OperatorParams = serde_json::from_str(r#"{ "debugLevel": 9 }"#).unwrap();
        assert_eq!(p.debug_level, DebugLevel::Verbose);
        assert!(serde_json::from_str::<OperatorParams>(r#"{ "outputMode": 2 }"#).is_err());
        assert!(serde_json::from_str::<OperatorParams>(r#"{ "debugLevel": "loud" }"#).is_err());
    }

    #[test]
    fn serialises_to_camelcase() {
        let p = OperatorParams {
            dcf_path: Some(PathBuf::from("cam.dcf")),
            resolution: Some(Resolution {
                width: 320,
                height: 240,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["cameraIndex"], 0);
        assert_eq!(json["outputMode"], "single");
        assert_eq!(json["dcfPath"], "cam.dcf");
        assert_eq!(json["resolution"]["width"], 320);
    }

    #[test]
    fn normalized_clamps_ranges() {
        let p = OperatorParams {
            camera_index: 99,
            grid_cols: 0,
            device_offset: 5000,
            camera_count: 0,
            dcf_path: Some(PathBuf::new()),
            resolution: Some(Resolution {
                width: 0,
                height: 10,
            }),
            ..Default::default()
        }
        .normalized();
        assert_eq!(p.camera_index, 23);
        assert_eq!(p.grid_cols, 1);
        assert_eq!(p.device_offset, 1024);
        assert_eq!(p.camera_count, 1);
        assert_eq!(p.dcf_path, None);
        assert_eq!(p.resolution, None);
    }

    #[test]
    fn device_index_adds_offset() {
        let p = OperatorParams {
            camera_index: 3,
            device_offset: 8,
            ..Default::default()
        };
        assert_eq!(p.device_index(), 11);
    }

    #[test]
    fn debug_level_maps_to_log_filter() {
        assert_eq!(DebugLevel::from_index(0), DebugLevel::Off);
        assert_eq!(DebugLevel::from_index(1), DebugLevel::Basic);
        assert_eq!(DebugLevel::from_index(7), DebugLevel::Verbose);
        assert_eq!(DebugLevel::Off.level_filter(), log::LevelFilter::Warn);
        assert_eq!(DebugLevel::Verbose.level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn dcf_path_becomes_file_profile() {
        let p = OperatorParams {
            dcf_path: Some(PathBuf::from("/opt/cams/line.dcf")),
            ..Default::default()
        };
        assert_eq!(
            p.profile(),
            CapabilityProfile::File(PathBuf::from("/opt/cams/line.dcf"))
        );
    }
}
