use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::settings::types::OperatorParams;

/// Parameter file errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot access parameter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parameter file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Operator parameters persisted as JSON.
pub struct ParamsStore {
    path: PathBuf,
    data: Mutex<OperatorParams>,
}

impl ParamsStore {
    /// Create a store, loading from disk if the file exists.
    ///
    /// An unreadable file is logged and replaced by defaults.
    pub fn new(path: PathBuf) -> Self {
        let data = Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Using default parameters, {}: {e}", path.display());
            OperatorParams::default()
        });
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    /// Load parameters from a JSON file, returning defaults on missing file.
    pub fn load(path: &Path) -> Result<OperatorParams, SettingsError> {
        if !path.exists() {
            return Ok(OperatorParams::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let params: OperatorParams = serde_json::from_str(&contents)?;
        Ok(params.normalized())
    }

    /// Save current parameters to disk atomically (write .tmp then rename).
    pub fn save(&self) -> Result<(), SettingsError> {
        let data = self.data.lock().clone();
        let json = serde_json::to_string_pretty(&data)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current parameters.
    pub fn get(&self) -> OperatorParams {
        self.data.lock().clone()
    }

    /// Modify the parameters in memory; values are clamped afterwards.
    pub fn update(&self, f: impl FnOnce(&mut OperatorParams)) {
        let mut data = self.data.lock();
        f(&mut data);
        *data = data.clone().normalized();
    }
}
