//! Settings persistence.
//!
//! Settings are read once at process start and written back at stop; nothing
//! in between touches the file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::errors::{Error, Result};
use crate::settings::Settings;

/// Load/save boundary for [`Settings`].
pub trait SettingsStore: Send + Sync {
    /// Loads settings, falling back to defaults when nothing was saved yet.
    fn load(&self) -> Result<Settings>;

    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Stores settings as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(Error::ConfigIO(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let settings: Settings = serde_json::from_str(&raw).map_err(|e| {
            Error::ConfigIO(format!("{} is not valid settings JSON: {}", self.path.display(), e))
        })?;
        settings.validate()?;
        info!("Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        let body = serde_json::to_string_pretty(settings)
            .map_err(|e| Error::ConfigIO(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigIO(format!("{}: {}", parent.display(), e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| Error::ConfigIO(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::ConfigIO(format!("{}: {}", self.path.display(), e)))?;
        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
