use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed journal entry: {0}")]
    Malformed(String),

    #[error("no current entry, advance() has not moved the read position")]
    NoCurrentEntry,

    #[error("journal closed: {0}")]
    Closed(String),
}

/// One journal entry as handed from the source reader to the batcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Opaque position token. Later entries compare "after" earlier ones
    /// within the same journal.
    pub cursor: String,
    /// Source timestamp in microseconds since the epoch.
    pub realtime_timestamp: u64,
    pub fields: HashMap<String, String>,
}

impl JournalEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Read capability over the journal.
///
/// Mirrors the sd-journal cursor model: `advance` moves the read position by
/// one entry, `entry` returns the entry under the read position and `wait`
/// blocks until the journal changes or the timeout elapses.
#[async_trait]
pub trait JournalApi: Send {
    /// Returns `Ok(false)` when there is no entry after the current position.
    async fn advance(&mut self) -> Result<bool, SourceError>;

    async fn entry(&mut self) -> Result<JournalEntry, SourceError>;

    async fn wait(&mut self, timeout: Duration);
}
