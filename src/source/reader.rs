use crate::source::journal::{JournalApi, JournalEntry, SourceError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Reads journal entries one at a time and hands them downstream.
pub struct SourceReader<J> {
    journal: J,
    wait_timeout: Duration,
}

impl<J: JournalApi> SourceReader<J> {
    pub fn new(journal: J) -> Self {
        Self {
            journal,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Advance and fetch the next entry. `None` means the journal has no new data.
    async fn next_entry(&mut self) -> Result<Option<JournalEntry>, SourceError> {
        if !self.journal.advance().await? {
            return Ok(None);
        }
        self.journal.entry().await.map(Some)
    }

    /// Run until cancelled or the downstream receiver goes away.
    ///
    /// Any journal error is unrecoverable and returned to the caller; there is
    /// no retry here because a corrupt or inaccessible journal has no defined repair.
    pub async fn run(
        mut self,
        output: mpsc::Sender<JournalEntry>,
        cancel: CancellationToken,
    ) -> Result<(), SourceError> {
        info!(wait_timeout = ?self.wait_timeout, "Source reader started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let entry = match self.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.journal.wait(self.wait_timeout) => continue,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Cannot read journal");
                    return Err(e);
                }
            };

            debug!(cursor = %entry.cursor, "Read journal entry");

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = output.send(entry) => {
                    if sent.is_err() {
                        info!("Entry channel closed");
                        break;
                    }
                }
            }
        }

        info!("Source reader stopped");
        Ok(())
    }
}
