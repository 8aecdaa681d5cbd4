//! Translation of journal entries into CloudWatch log events.
//!
//! The message payload is an indented JSON [`Record`]. Field names are stable
//! for downstream consumers. Common journal fields are documented in
//! `systemd.journal-fields(7)`.

use crate::batch::LogEvent;
use crate::source::JournalEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Journal `PRIORITY` values, same names as `journalctl --priority`.
const PRIORITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

pub fn priority_name(priority: &str) -> Option<&'static str> {
    let level: usize = priority.parse().ok()?;
    PRIORITY_NAMES.get(level).copied()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instance_id: String,
    #[serde(rename = "realTimestamp", skip_serializing_if = "is_zero_u64")]
    pub realtime_timestamp: u64,
    pub pid: i64,
    pub uid: i64,
    pub gid: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cmd_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub exe: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub systemd_unit: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub boot_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub machine_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub transport: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<&'static str>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub err_no: i64,
    #[serde(skip_serializing_if = "RecordSyslog::is_empty")]
    pub syslog: RecordSyslog,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordSyslog {
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub facility: i64,
    #[serde(rename = "ident", skip_serializing_if = "String::is_empty")]
    pub identifier: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub pid: i64,
}

impl RecordSyslog {
    pub fn is_empty(&self) -> bool {
        self.facility == 0 && self.identifier.is_empty() && self.pid == 0
    }
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

impl Record {
    /// Build a record from journal fields. Unparsable numbers become zero.
    pub fn from_entry(entry: &JournalEntry) -> Self {
        let text = |name: &str| entry.field(name).unwrap_or_default().to_string();
        let number = |name: &str| -> i64 {
            entry
                .field(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        };

        Self {
            instance_id: String::new(),
            realtime_timestamp: entry.realtime_timestamp,
            pid: number("_PID"),
            uid: number("_UID"),
            gid: number("_GID"),
            cmd_name: text("_COMM"),
            exe: text("_EXE"),
            systemd_unit: text("_SYSTEMD_UNIT"),
            boot_id: text("_BOOT_ID"),
            machine_id: text("_MACHINE_ID"),
            hostname: text("_HOSTNAME"),
            transport: text("_TRANSPORT"),
            priority: entry.field("PRIORITY").and_then(priority_name),
            message: text("MESSAGE"),
            message_id: text("MESSAGE_ID"),
            err_no: number("ERRNO"),
            syslog: RecordSyslog {
                facility: number("SYSLOG_FACILITY"),
                identifier: text("SYSLOG_IDENTIFIER"),
                pid: number("SYSLOG_PID"),
            },
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Converts journal entries to log events. Never fails: a record that cannot
/// be serialized produces a diagnostic message instead of no event.
#[derive(Clone)]
pub struct EntryConverter {
    instance_id: String,
    clock: Clock,
}

impl EntryConverter {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self::with_clock(instance_id, Arc::new(Utc::now))
    }

    /// Event timestamps come from `clock`, not from the entry. The entry's own
    /// time is kept in the record's `realTimestamp`.
    pub fn with_clock(instance_id: impl Into<String>, clock: Clock) -> Self {
        Self {
            instance_id: instance_id.into(),
            clock,
        }
    }

    pub fn convert(&self, entry: &JournalEntry) -> LogEvent {
        let mut record = Record::from_entry(entry);
        record.instance_id = self.instance_id.clone();

        let timestamp = (self.clock)().timestamp_millis();
        let message = match serde_json::to_string_pretty(&record) {
            Ok(json) => json,
            Err(e) => format!("cannot marshal record, {}", e),
        };

        LogEvent { message, timestamp }
    }
}

impl std::fmt::Debug for EntryConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryConverter")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}
