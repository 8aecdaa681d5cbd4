use crate::batch::Batch;
use crate::sink::{LogSink, SinkError};
use crate::storage::{CursorError, CursorStore};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wait after a throttled request before the single retry.
pub const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("cannot deliver batch ending at {cursor}: {source}")]
    Delivery {
        cursor: String,
        #[source]
        source: SinkError,
    },

    #[error("retry after {recovery} failed for batch ending at {cursor}: {source}")]
    Retry {
        cursor: String,
        recovery: &'static str,
        #[source]
        source: SinkError,
    },

    #[error("cannot create log stream: {0}")]
    CreateStream(#[source] SinkError),

    #[error("cannot save cursor {cursor}: {source}")]
    Checkpoint {
        cursor: String,
        #[source]
        source: CursorError,
    },
}

/// Delivers batches one at a time and checkpoints each delivered batch.
pub struct SinkWriter<S, C> {
    sink: S,
    cursor_store: C,
    throttle_backoff: Duration,
}

impl<S: LogSink, C: CursorStore> SinkWriter<S, C> {
    pub fn new(sink: S, cursor_store: C) -> Self {
        Self {
            sink,
            cursor_store,
            throttle_backoff: DEFAULT_THROTTLE_BACKOFF,
        }
    }

    pub fn with_throttle_backoff(mut self, backoff: Duration) -> Self {
        self.throttle_backoff = backoff;
        self
    }

    /// Deliver one batch, then persist its cursor.
    ///
    /// Throttling and a missing log stream each get exactly one recovery
    /// attempt. Anything else, including a failed recovery or a failed cursor
    /// write, is returned as fatal. The cursor is written only after the
    /// remote confirmed the batch.
    pub async fn deliver(&self, batch: &Batch) -> Result<(), WriterError> {
        match self.sink.put_events(&batch.events).await {
            Ok(()) => {}
            Err(SinkError::Throttled(reason)) => {
                warn!(
                    reason = %reason,
                    backoff = ?self.throttle_backoff,
                    "PutLogEvents throttled, retrying once after backoff"
                );
                tokio::time::sleep(self.throttle_backoff).await;
                self.retry(batch, "throttling").await?;
            }
            Err(SinkError::DestinationMissing(reason)) => {
                warn!(reason = %reason, "Log stream missing, creating it");
                self.sink
                    .create_stream()
                    .await
                    .map_err(WriterError::CreateStream)?;
                info!("Log stream created");
                self.retry(batch, "stream creation").await?;
            }
            Err(source) => {
                return Err(WriterError::Delivery {
                    cursor: batch.cursor.clone(),
                    source,
                });
            }
        }

        self.cursor_store
            .set(&batch.cursor)
            .await
            .map_err(|source| WriterError::Checkpoint {
                cursor: batch.cursor.clone(),
                source,
            })?;

        debug!(events = batch.len(), cursor = %batch.cursor, "Batch delivered");
        Ok(())
    }

    async fn retry(&self, batch: &Batch, recovery: &'static str) -> Result<(), WriterError> {
        self.sink
            .put_events(&batch.events)
            .await
            .map_err(|source| WriterError::Retry {
                cursor: batch.cursor.clone(),
                recovery,
                source,
            })
    }

    /// Run until the batch channel closes.
    ///
    /// After cancellation no new work is awaited from a live batcher, but every
    /// batch it still hands over (its final flush) is delivered before returning.
    pub async fn run(
        self,
        mut input: mpsc::Receiver<Batch>,
        cancel: CancellationToken,
    ) -> Result<(), WriterError> {
        info!(throttle_backoff = ?self.throttle_backoff, "Sink writer started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                batch = input.recv() => {
                    let Some(batch) = batch else {
                        info!("Batch channel closed");
                        return Ok(());
                    };
                    self.deliver_or_log(&batch).await?;
                }
            }
        }

        info!("Sink writer cancelled, draining batches still in flight");
        while let Some(batch) = input.recv().await {
            self.deliver_or_log(&batch).await?;
        }

        info!("Sink writer stopped");
        Ok(())
    }

    async fn deliver_or_log(&self, batch: &Batch) -> Result<(), WriterError> {
        self.deliver(batch).await.map_err(|e| {
            error!(error = %e, events = batch.len(), "Fatal delivery failure");
            e
        })
    }
}
