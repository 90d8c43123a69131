//! The session's record of executed commands.
//!
//! A [`HistoryRecorder`] is owned by whoever drives a session and passed to
//! the code that sends commands; there is no process-wide history. Only
//! commands that actually reached the instrument are appended.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::audit::{format_timestamp, now_millis};
use crate::descriptor::Direction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HistoryEntry {
    #[ts(type = "number")]
    pub timestamp_ms: u64,
    pub direction: Direction,
    /// Alias or VISA resource name the command was sent to.
    pub resource: String,
    /// The literal text sent, after substitution.
    pub sent_text: String,
    pub response: Option<String>,
}

impl HistoryEntry {
    /// An entry stamped with the current time.
    pub fn new(
        direction: Direction,
        resource: impl Into<String>,
        sent_text: impl Into<String>,
        response: Option<String>,
    ) -> Self {
        Self::with_timestamp(now_millis(), direction, resource, sent_text, response)
    }

    pub fn with_timestamp(
        timestamp_ms: u64,
        direction: Direction,
        resource: impl Into<String>,
        sent_text: impl Into<String>,
        response: Option<String>,
    ) -> Self {
        Self {
            timestamp_ms,
            direction,
            resource: resource.into(),
            sent_text: sent_text.into(),
            response,
        }
    }

    /// `[2025-02-24 01:02:03] dmm GET: MEAS:VOLT? --> 1.234`
    pub fn audit_line(&self) -> String {
        let mut line = format!(
            "[{}] {} {}: {}",
            format_timestamp(self.timestamp_ms),
            self.resource,
            self.direction,
            single_line(&self.sent_text)
        );
        if let Some(response) = &self.response {
            line.push_str(" --> ");
            line.push_str(&single_line(response));
        }
        line
    }
}

fn single_line(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

#[derive(Debug, Default)]
pub struct HistoryRecorder {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: HistoryEntry) {
        self.entries.lock().push(entry);
    }

    /// Stamp and append in one step. The stamp is taken under the lock and
    /// never precedes the previous entry's, so timestamps follow list order.
    pub fn record(
        &self,
        direction: Direction,
        resource: impl Into<String>,
        sent_text: impl Into<String>,
        response: Option<String>,
    ) -> HistoryEntry {
        let mut entries = self.entries.lock();
        let floor = entries.last().map_or(0, |e| e.timestamp_ms);
        let entry = HistoryEntry::with_timestamp(now_millis().max(floor), direction, resource, sent_text, response);
        entries.push(entry.clone());
        entry
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// The full history as a PyVISA replay script.
    pub fn export(&self) -> String {
        crate::script::emit(&self.entries.lock())
    }

    /// One [`HistoryEntry::audit_line`] per entry.
    pub fn audit_log(&self) -> Vec<String> {
        self.entries.lock().iter().map(HistoryEntry::audit_line).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::script::parse_script;

    #[test]
    fn append_keeps_order_and_duplicates() {
        let history = HistoryRecorder::new();
        assert!(history.is_empty());
        history.append(HistoryEntry::new(Direction::Set, "psu", "OUTP ON", None));
        history.append(HistoryEntry::new(Direction::Set, "psu", "OUTP ON", None));
        history.append(HistoryEntry::new(Direction::Get, "dmm", "READ?", Some("1".into())));
        let texts: Vec<_> = history.snapshot().into_iter().map(|e| e.sent_text).collect();
        assert_eq!(texts, ["OUTP ON", "OUTP ON", "READ?"]);
    }

    #[test]
    fn snapshot_is_detached() {
        let history = HistoryRecorder::new();
        history.append(HistoryEntry::new(Direction::Set, "psu", "*RST", None));
        let before = history.snapshot();
        history.append(HistoryEntry::new(Direction::Set, "psu", "*CLS", None));
        assert_eq!(before.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn clear_empties_and_export_has_no_steps() {
        let history = HistoryRecorder::new();
        history.append(HistoryEntry::new(Direction::Set, "psu", "*RST", None));
        history.clear();
        assert!(history.is_empty());
        assert!(parse_script(&history.export()).unwrap().is_empty());
    }

    #[test]
    fn audit_line_strips_line_breaks() {
        let entry = HistoryEntry::with_timestamp(
            1_740_355_200_000,
            Direction::Get,
            "dmm",
            "MEAS:VOLT?",
            Some("+1.23400000E+00\r\n".into()),
        );
        assert_eq!(
            entry.audit_line(),
            "[2025-02-24 00:00:00] dmm GET: MEAS:VOLT? --> +1.23400000E+00"
        );
        let write = HistoryEntry::with_timestamp(0, Direction::Set, "psu", "OUTP ON", None);
        assert_eq!(write.audit_line(), "[1970-01-01 00:00:00] psu SET: OUTP ON");
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let history = Arc::new(HistoryRecorder::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        history.append(HistoryEntry::new(Direction::Set, "psu", format!("{t}:{i}"), None));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entries = history.snapshot();
        assert_eq!(entries.len(), 200);
        // Per-thread order is preserved.
        for t in 0..4 {
            let prefix = format!("{t}:");
            let seq: Vec<usize> = entries
                .iter()
                .filter_map(|e| e.sent_text.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn recorded_timestamps_follow_list_order() {
        let history = Arc::new(HistoryRecorder::new());
        history.append(HistoryEntry::with_timestamp(u64::MAX - 1, Direction::Set, "psu", "*RST", None));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        history.record(Direction::Set, "psu", format!("{t}:{i}"), None);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entries = history.snapshot();
        assert_eq!(entries.len(), 201);
        assert!(entries.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
        assert_eq!(entries[1].timestamp_ms, u64::MAX - 1);
    }

    #[test]
    fn export_round_trips() {
        let history = HistoryRecorder::new();
        history.append(HistoryEntry::new(Direction::Set, "awg", "C1:BSWV FRQ,1000", None));
        history.append(HistoryEntry::new(Direction::Get, "dmm", r#"SYST:ERR? "x""#, Some("0".into())));
        let steps = parse_script(&history.export()).unwrap();
        let entries = history.snapshot();
        assert_eq!(steps.len(), 2);
        for (step, entry) in steps.iter().zip(&entries) {
            assert_eq!(step.resource, entry.resource);
            assert_eq!(step.text, entry.sent_text);
        }
        assert_eq!(history.audit_log().len(), 2);
    }
}
