use crate::batch::{Batch, Batcher, BatcherError};
use crate::pipeline::channel::handoff_channel;
use crate::sink::{LogSink, SinkWriter, WriterError};
use crate::source::{JournalApi, JournalEntry, SourceError, SourceReader};
use crate::storage::CursorStore;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the writer's error after the batcher reports that
/// the batch channel closed under it.
const ROOT_CAUSE_GRACE: Duration = Duration::from_secs(1);

/// Errors that end the pipeline. Any of them should end the process.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source reader error: {0}")]
    Source(#[from] SourceError),

    #[error("batcher error: {0}")]
    Batcher(#[from] BatcherError),

    #[error("sink writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("task join error: {0}")]
    Join(#[from] JoinError),

    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Source reader → batcher → sink writer, one task per stage.
pub struct Pipeline<J, S, C> {
    reader: SourceReader<J>,
    batcher: Batcher,
    writer: SinkWriter<S, C>,
    shutdown_timeout: Duration,
}

impl<J, S, C> Pipeline<J, S, C>
where
    J: JournalApi + 'static,
    S: LogSink + 'static,
    C: CursorStore + 'static,
{
    pub fn new(reader: SourceReader<J>, batcher: Batcher, writer: SinkWriter<S, C>) -> Self {
        Self {
            reader,
            batcher,
            writer,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Run until `cancel` fires or a stage stops.
    ///
    /// The first stage error is returned at once and the remaining stages are
    /// aborted. On cooperative shutdown the stages get `shutdown_timeout` to
    /// flush and deliver the final batch.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let (entry_tx, entry_rx) = handoff_channel::<JournalEntry>();
        let (batch_tx, batch_rx) = handoff_channel::<Batch>();

        let mut tasks: JoinSet<Result<(), PipelineError>> = JoinSet::new();

        let reader_cancel = cancel.clone();
        let reader = self.reader;
        tasks.spawn(async move {
            reader
                .run(entry_tx, reader_cancel)
                .await
                .map_err(PipelineError::from)
        });

        let batcher_cancel = cancel.clone();
        let batcher = self.batcher;
        tasks.spawn(async move {
            batcher
                .run(entry_rx, batch_tx, batcher_cancel)
                .await
                .map_err(PipelineError::from)
        });

        let writer_cancel = cancel.clone();
        let writer = self.writer;
        tasks.spawn(async move {
            writer
                .run(batch_rx, writer_cancel)
                .await
                .map_err(PipelineError::from)
        });

        info!("Pipeline started");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown requested");
            }
            Some(joined) = tasks.join_next() => {
                if let Err(mut e) = flatten(joined) {
                    cancel.cancel();
                    if matches!(e, PipelineError::Batcher(_)) {
                        if let Some(writer_error) = writer_failure(&mut tasks).await {
                            e = writer_error;
                        }
                    }
                    error!(error = %e, "Pipeline stage failed, stopping");
                    tasks.abort_all();
                    return Err(e);
                }
                warn!("Pipeline stage stopped, shutting down the others");
                cancel.cancel();
            }
        }

        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                flatten(joined)?;
            }
            Ok::<(), PipelineError>(())
        };

        let result = match tokio::time::timeout(self.shutdown_timeout, drain).await {
            Ok(Ok(())) => {
                info!("Pipeline shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Pipeline stage failed during shutdown");
                Err(e)
            }
            Err(_) => {
                warn!(timeout = ?self.shutdown_timeout, "Pipeline shutdown timed out");
                Err(PipelineError::ShutdownTimeout(self.shutdown_timeout))
            }
        };

        tasks.abort_all();
        result
    }
}

fn flatten(joined: Result<Result<(), PipelineError>, JoinError>) -> Result<(), PipelineError> {
    joined?
}

/// The batcher only fails when the writer has dropped its end of the batch
/// channel. Look for the writer's own error among the remaining stages.
async fn writer_failure(
    tasks: &mut JoinSet<Result<(), PipelineError>>,
) -> Option<PipelineError> {
    let search = async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e @ PipelineError::Writer(_)) = flatten(joined) {
                return Some(e);
            }
        }
        None
    };
    tokio::time::timeout(ROOT_CAUSE_GRACE, search)
        .await
        .ok()
        .flatten()
}
