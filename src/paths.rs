//! Centralized path definitions for config files and log directories.
//!
//! No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.scpi-console.app";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const HISTORY_EXPORT_FILE: &str = "history.py";

// ── Directory names ──────────────────────────────────────────────

pub const COMMAND_LOGS_DIR: &str = "command-logs";

// ── Config-dir functions (take app_config_dir) ───────────────────

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn command_logs_dir(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(COMMAND_LOGS_DIR)
}

pub fn history_export_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(HISTORY_EXPORT_FILE)
}

