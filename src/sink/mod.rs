pub mod cloudwatch;
pub mod writer;

use crate::batch::LogEvent;
use async_trait::async_trait;
use thiserror::Error;

pub use cloudwatch::{CloudWatchConfig, CloudWatchSink};
pub use writer::{SinkWriter, WriterError, DEFAULT_THROTTLE_BACKOFF};

/// Remote failures, classified by how the sink writer recovers from them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Request rate exceeded. Recovered by one backoff and retry.
    #[error("throttled: {0}")]
    Throttled(String),

    /// The target log stream does not exist. Recovered by creating it.
    #[error("destination missing: {0}")]
    DestinationMissing(String),

    #[error("{0}")]
    Other(String),
}

/// Remote log destination.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn put_events(&self, events: &[LogEvent]) -> Result<(), SinkError>;

    async fn create_stream(&self) -> Result<(), SinkError>;
}
