use crate::batch::{Batcher, EntryConverter};
use crate::config::{load_or_default, Config, ConfigError};
use crate::pipeline::{Pipeline, PipelineError};
use crate::sink::{CloudWatchConfig, CloudWatchSink, SinkWriter};
use crate::source::{JournalctlReader, Seek, SourceError, SourceReader};
use crate::storage::{CursorError, CursorStore, FileCursorStore};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
const IMDS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CursorError),

    #[error("journal error: {0}")]
    Source(#[from] SourceError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("failed to install signal handler: {0}")]
    Signal(std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_or_default(config_path.as_deref())?;
    run_agent(config).await.map_err(|e| e.into())
}

/// Bootstrap the pipeline from `config` and run it until a signal or a fatal error.
pub async fn run_agent(config: Config) -> Result<(), RunError> {
    let cursor_store = FileCursorStore::new(&config.state_file);
    cursor_store.prepare().await?;

    let checkpoint = match cursor_store.get().await {
        Ok(checkpoint) => checkpoint,
        Err(e) => {
            error!(
                path = %cursor_store.path().display(),
                error = %e,
                "Cannot read checkpoint, starting without one"
            );
            None
        }
    };

    let instance_id = resolve_instance_id(config.instance_id.as_deref()).await;
    let log_stream = config
        .cloudwatch
        .log_stream
        .clone()
        .unwrap_or_else(|| instance_id.clone());

    let sink = CloudWatchSink::connect(&CloudWatchConfig {
        log_group: config.cloudwatch.log_group.clone(),
        log_stream,
        region: config.cloudwatch.region.clone(),
        endpoint_url: config.cloudwatch.endpoint_url.clone(),
    })
    .await;

    let seek = Seek::from_checkpoint(checkpoint, config.reader.start);
    match &seek {
        Seek::AfterCursor(cursor) => info!(cursor = %cursor, "Resuming after checkpoint"),
        Seek::Start(start) => info!(start = ?start, "No checkpoint, starting fresh"),
    }
    let journal =
        JournalctlReader::open(&config.reader.journalctl_path, &seek, config.reader.start).await?;

    let reader = SourceReader::new(journal).with_wait_timeout(config.reader.wait_timeout);
    let batcher = Batcher::new(
        EntryConverter::new(instance_id),
        config.batch.to_batch_config(),
    );
    let writer = SinkWriter::new(sink, cursor_store)
        .with_throttle_backoff(config.writer.throttle_backoff);
    let pipeline =
        Pipeline::new(reader, batcher, writer).with_shutdown_timeout(config.shutdown_timeout);

    let cancel = CancellationToken::new();
    let sigterm = signal(SignalKind::terminate()).map_err(RunError::Signal)?;
    let sigint = signal(SignalKind::interrupt()).map_err(RunError::Signal)?;
    let signal_task = tokio::spawn(cancel_on_signal(sigterm, sigint, cancel.clone()));

    let result = pipeline.run(cancel).await;
    signal_task.abort();

    result?;
    Ok(())
}

async fn cancel_on_signal(mut sigterm: Signal, mut sigint: Signal, cancel: CancellationToken) {
    tokio::select! {
        _ = sigterm.recv() => info!(signal = "SIGTERM", "Exit signal received"),
        _ = sigint.recv() => info!(signal = "SIGINT", "Exit signal received"),
        _ = cancel.cancelled() => return,
    }
    cancel.cancel();
}

/// Configured id, else instance metadata, else the hostname.
async fn resolve_instance_id(configured: Option<&str>) -> String {
    if let Some(id) = configured {
        return id.to_string();
    }

    match fetch_instance_id().await {
        Ok(id) => {
            info!(instance_id = %id, "Instance id from metadata");
            id
        }
        Err(reason) => {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.to_str().map(|s| s.to_string()))
                .unwrap_or_else(|| "localhost".to_string());
            warn!(reason = %reason, instance_id = %host, "Instance metadata unavailable, using hostname");
            host
        }
    }
}

async fn fetch_instance_id() -> Result<String, String> {
    let client = aws_config::imds::Client::builder().build();
    match tokio::time::timeout(IMDS_TIMEOUT, client.get(INSTANCE_ID_PATH)).await {
        Ok(Ok(id)) => {
            let id: String = id.into();
            let id = id.trim().to_string();
            if id.is_empty() {
                Err("empty instance id".to_string())
            } else {
                Ok(id)
            }
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", IMDS_TIMEOUT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_instance_id_skips_metadata() {
        assert_eq!(resolve_instance_id(Some("i-abc")).await, "i-abc");
    }
}
