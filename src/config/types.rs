use crate::batch::batcher::{
    DEFAULT_MAX_EVENTS, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_MAX_WAIT,
    DEFAULT_TRUNCATED_MESSAGE_BYTES,
};
use crate::batch::BatchConfig;
use crate::pipeline::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::sink::DEFAULT_THROTTLE_BACKOFF;
use crate::source::reader::DEFAULT_WAIT_TIMEOUT;
use crate::source::{JournalctlReader, StartPosition};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOG_GROUP: &str = "journal-logs";
pub const DEFAULT_STATE_FILE: &str = "/var/lib/journald-cwl/state";

/// Every section is optional; a missing file means all defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cloudwatch: CloudWatchSection,
    /// Overrides the instance metadata lookup.
    pub instance_id: Option<String>,
    pub state_file: PathBuf,
    pub reader: ReaderConfig,
    pub batch: BatchSection,
    pub writer: WriterConfig,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cloudwatch: CloudWatchSection::default(),
            instance_id: None,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            reader: ReaderConfig::default(),
            batch: BatchSection::default(),
            writer: WriterConfig::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudWatchSection {
    pub log_group: String,
    /// Defaults to the instance id.
    pub log_stream: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl Default for CloudWatchSection {
    fn default() -> Self {
        Self {
            log_group: DEFAULT_LOG_GROUP.to_string(),
            log_stream: None,
            region: None,
            endpoint_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
    /// Where to begin when there is no checkpoint.
    pub start: StartPosition,
    pub journalctl_path: PathBuf,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            start: StartPosition::Head,
            journalctl_path: JournalctlReader::default_binary(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    pub max_payload_bytes: usize,
    pub max_events: usize,
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    pub truncated_message_bytes: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_events: DEFAULT_MAX_EVENTS,
            max_wait: DEFAULT_MAX_WAIT,
            truncated_message_bytes: DEFAULT_TRUNCATED_MESSAGE_BYTES,
        }
    }
}

impl BatchSection {
    pub fn to_batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_payload_bytes: self.max_payload_bytes,
            max_events: self.max_events,
            max_wait: self.max_wait,
            truncated_message_bytes: self.truncated_message_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    #[serde(with = "humantime_serde")]
    pub throttle_backoff: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            throttle_backoff: DEFAULT_THROTTLE_BACKOFF,
        }
    }
}
