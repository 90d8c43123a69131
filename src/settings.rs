use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

use crate::files::{read_json, write_json, FileError};

/// Application-level settings stored in the OS config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct AppSettings {
    pub version: u32,
    /// Descriptor workbook used when none is given on the command line.
    #[serde(default)]
    #[ts(type = "string | null")]
    pub workbook_path: Option<PathBuf>,
    /// Write every sent command to the JSONL command log.
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
}

const SETTINGS_VERSION: u32 = 1;

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            workbook_path: None,
            audit_enabled: true,
        }
    }
}

impl AppSettings {
    pub fn with_workbook(workbook_path: PathBuf) -> Self {
        Self {
            workbook_path: Some(workbook_path),
            ..Self::default()
        }
    }
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be read.
pub fn load_settings(app_config_dir: &Path) -> Option<AppSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<AppSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("ignoring unreadable settings {}: {e}", path.display());
            None
        }
    }
}

/// Save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &AppSettings) -> Result<(), FileError> {
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}
