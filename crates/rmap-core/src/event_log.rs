//! Bounded, per-PID record of resolution outcomes.
//!
//! Every `status()` call appends one [`LogEntry`] to the log of the PID it is
//! about. Each log keeps at most `max_events` entries (oldest dropped first)
//! and the event log keeps at most `max_logs` PIDs (oldest log dropped first).
//! Entries at or above the configured [`ConsoleLevel`] are mirrored to
//! `tracing`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ConsoleLevel, DEFAULT_MAX_EVENTS, DEFAULT_MAX_LOGS};
use crate::status::StatusLabel;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn reaches(&self, threshold: ConsoleLevel) -> bool {
        let as_console = match self {
            LogLevel::Info => ConsoleLevel::Info,
            LogLevel::Warning => ConsoleLevel::Warning,
            LogLevel::Error => ConsoleLevel::Error,
        };
        threshold != ConsoleLevel::Off && as_console >= threshold
    }
}

/// A single recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub label: StatusLabel,
    pub rm: Option<String>,
    /// Diagnostic fields; `Null` when there were none.
    pub meta: Value,
}

/// All entries recorded for one PID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionLog {
    pub pid: String,
    pub start_time: DateTime<Utc>,
    pub entries: VecDeque<LogEntry>,
}

impl ResolutionLog {
    fn new(pid: &str) -> Self {
        Self {
            pid: pid.to_string(),
            start_time: Utc::now(),
            entries: VecDeque::new(),
        }
    }

    /// Whether any attempt recorded here was refused access to sysmeta.
    pub fn check_for_unauth(&self) -> bool {
        self.entries.iter().any(|e| {
            e.label == StatusLabel::Unauthorized
                || flag(&e.meta, "/unauthorized")
                || flag(&e.meta, "/sysmeta/unauthorized")
        })
    }

    /// Whether the index listed several resource maps that could not be
    /// narrowed to a single current one.
    pub fn check_for_multiple_rms(&self) -> bool {
        self.entries.iter().any(|e| {
            flag(&e.meta, "/multi_rm/not_versions") || flag(&e.meta, "/multi_rm/all_obsoleted")
        })
    }

    pub fn labels(&self) -> Vec<StatusLabel> {
        self.entries.iter().map(|e| e.label).collect()
    }
}

fn flag(meta: &Value, pointer: &str) -> bool {
    meta.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
}

/// Drop null and empty-string fields so logs stay small; an object left with
/// no fields becomes `Null`.
fn clean_meta(meta: Value) -> Value {
    match meta {
        Value::Object(map) => {
            let kept: serde_json::Map<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null() && v.as_str() != Some(""))
                .collect();
            if kept.is_empty() {
                Value::Null
            } else {
                Value::Object(kept)
            }
        }
        other => other,
    }
}

/// Flags derived from a PID's log right after an entry is appended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFlags {
    pub unauthorized: bool,
    pub multiple_rms: bool,
}

#[derive(Debug, Default)]
struct LogState {
    logs: HashMap<String, ResolutionLog>,
    order: VecDeque<String>,
}

/// Thread-safe event log shared by every resolution on a resolver.
#[derive(Debug)]
pub struct EventLog {
    state: Mutex<LogState>,
    max_events: usize,
    max_logs: usize,
    console_level: ConsoleLevel,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS, DEFAULT_MAX_LOGS, ConsoleLevel::default())
    }
}

impl EventLog {
    pub fn new(max_events: usize, max_logs: usize, console_level: ConsoleLevel) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            max_events: max_events.max(1),
            max_logs: max_logs.max(1),
            console_level,
        }
    }

    pub fn console_level(&self) -> ConsoleLevel {
        self.console_level
    }

    /// Append an entry to `pid`'s log, creating the log if needed.
    pub fn record(
        &self,
        pid: &str,
        label: StatusLabel,
        rm: Option<&str>,
        meta: Value,
    ) -> LogFlags {
        let level = label.level();
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            label,
            rm: rm.map(str::to_string),
            meta: clean_meta(meta),
        };

        if level.reaches(self.console_level) {
            mirror(pid, &entry);
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.logs.contains_key(pid) {
            while state.order.len() >= self.max_logs {
                if let Some(oldest) = state.order.pop_front() {
                    state.logs.remove(&oldest);
                }
            }
            state.order.push_back(pid.to_string());
        }

        let log = state
            .logs
            .entry(pid.to_string())
            .or_insert_with(|| ResolutionLog::new(pid));
        if log.entries.len() >= self.max_events {
            log.entries.pop_front();
        }
        log.entries.push_back(entry);

        LogFlags {
            unauthorized: log.check_for_unauth(),
            multiple_rms: log.check_for_multiple_rms(),
        }
    }

    /// Snapshot of `pid`'s log.
    pub fn get_log(&self, pid: &str) -> Option<ResolutionLog> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.logs.get(pid).cloned()
    }

    /// Remove every entry for `pid` and reset its start time.
    pub fn clear_log(&self, pid: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(log) = state.logs.get_mut(pid) {
            log.entries.clear();
            log.start_time = Utc::now();
        }
    }

    /// Number of PIDs with a log.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .logs
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn mirror(pid: &str, entry: &LogEntry) {
    let message = entry.label.message();
    match entry.level {
        LogLevel::Info => tracing::info!(
            log = %pid,
            status = %entry.label,
            rm = ?entry.rm,
            meta = %entry.meta,
            "Status: {message}"
        ),
        LogLevel::Warning => tracing::warn!(
            log = %pid,
            status = %entry.label,
            rm = ?entry.rm,
            meta = %entry.meta,
            "Status: {message}"
        ),
        LogLevel::Error => tracing::error!(
            log = %pid,
            status = %entry.label,
            rm = ?entry.rm,
            meta = %entry.meta,
            "Status: {message}"
        ),
    }
}
