//! JSONL audit logging for instrument commands.
//!
//! Every command sent to an instrument, successful or not, is logged as a
//! single line in `{app_config_dir}/command-logs/YYYY-MM-DD.jsonl`.
//! Best-effort: never panics or fails the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use crate::descriptor::Direction;

#[derive(Serialize)]
struct CommandAuditEntry<'a> {
    ts_ms: u64,
    resource: &'a str,
    direction: Direction,
    command: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}

/// Log one command to today's JSONL audit file.
///
/// `result` is the query response (or `None` for writes) on success and the
/// error message on failure.
pub fn log_command(
    app_config_dir: &Path,
    resource: &str,
    direction: Direction,
    command: &str,
    result: Result<Option<&str>, &str>,
) {
    let ts_ms = now_millis();
    let (ok, response, error) = match result {
        Ok(response) => (true, response, None),
        Err(e) => (false, None, Some(e)),
    };
    let entry = CommandAuditEntry {
        ts_ms,
        resource,
        direction,
        command,
        ok,
        response,
        error,
    };

    let dir = crate::paths::command_logs_dir(app_config_dir);
    let _ = fs::create_dir_all(&dir);
    let path = dir.join(format!("{}.jsonl", date_from_epoch(ts_ms / 1000)));

    if let Ok(json) = serde_json::to_string(&entry) {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{json}");
            }
            Err(e) => debug!("audit log {} unavailable: {e}", path.display()),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` (UTC) for a millisecond timestamp.
pub fn format_timestamp(epoch_ms: u64) -> String {
    let secs = epoch_ms / 1000;
    let day_secs = secs % 86_400;
    format!(
        "{} {:02}:{:02}:{:02}",
        date_from_epoch(secs),
        day_secs / 3600,
        day_secs % 3600 / 60,
        day_secs % 60
    )
}

/// Format epoch seconds as `YYYY-MM-DD` without external deps.
#[allow(clippy::unreadable_literal, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn date_from_epoch(epoch_secs: u64) -> String {
    // Civil date from day count (Howard Hinnant)
    let days = (epoch_secs / 86400) as i64;
    let z = days + 719468;
    let era = (if z >= 0 { z } else { z - 146096 }) / 146097;
    let doe = (z - era * 146097) as u64; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02}")
}
