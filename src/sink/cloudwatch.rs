//! CloudWatch Logs destination.
//!
//! Uses the official AWS SDK, so SigV4 signing, credential refresh and the
//! SDK's own transport retries are handled by the client.

use crate::batch::LogEvent;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatchlogs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_cloudwatchlogs::Client;
use tracing::{debug, info, warn};

const THROTTLING_CODE: &str = "ThrottlingException";
const RESOURCE_NOT_FOUND_CODE: &str = "ResourceNotFoundException";

#[derive(Debug, Clone)]
pub struct CloudWatchConfig {
    pub log_group: String,
    pub log_stream: String,
    /// Explicit region. Falls back to the SDK provider chain, then instance metadata.
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Writes batches to a single log stream.
#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: Client,
    log_group: String,
    log_stream: String,
}

impl CloudWatchSink {
    pub fn new(client: Client, log_group: impl Into<String>, log_stream: impl Into<String>) -> Self {
        Self {
            client,
            log_group: log_group.into(),
            log_stream: log_stream.into(),
        }
    }

    /// Build the SDK client (resolves region and credentials).
    pub async fn connect(config: &CloudWatchConfig) -> Self {
        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(aws_config::imds::region::ImdsRegionProvider::builder().build());

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        info!(
            region = ?sdk_config.region(),
            log_group = %config.log_group,
            log_stream = %config.log_stream,
            "CloudWatch Logs client initialized"
        );

        Self::new(Client::new(&sdk_config), &config.log_group, &config.log_stream)
    }
}

#[async_trait]
impl LogSink for CloudWatchSink {
    async fn put_events(&self, events: &[LogEvent]) -> Result<(), SinkError> {
        let log_events = events
            .iter()
            .map(|e| {
                InputLogEvent::builder()
                    .timestamp(e.timestamp)
                    .message(e.message.clone())
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SinkError::Other(format!("invalid log event: {}", e)))?;

        let output = self
            .client
            .put_log_events()
            .log_group_name(&self.log_group)
            .log_stream_name(&self.log_stream)
            .set_log_events(Some(log_events))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        if let Some(rejected) = output.rejected_log_events_info() {
            warn!(rejected = ?rejected, "CloudWatch rejected some log events");
        }
        debug!(events = events.len(), "PutLogEvents succeeded");
        Ok(())
    }

    async fn create_stream(&self) -> Result<(), SinkError> {
        self.client
            .create_log_stream()
            .log_group_name(&self.log_group)
            .log_stream_name(&self.log_stream)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }
}

fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> SinkError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    classify(code.as_deref(), message)
}

/// Map a service error code to the recovery class.
pub fn classify(code: Option<&str>, message: String) -> SinkError {
    match code {
        Some(THROTTLING_CODE) => SinkError::Throttled(message),
        Some(RESOURCE_NOT_FOUND_CODE) => SinkError::DestinationMissing(message),
        _ => SinkError::Other(message),
    }
}
