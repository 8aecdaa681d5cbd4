use crate::batch::convert::EntryConverter;
use crate::batch::{Batch, LogEvent};
use crate::source::JournalEntry;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// PutLogEvents accepts at most 1,048,576 bytes per request, counted as the sum
/// of UTF-8 message lengths plus 26 bytes per event. Only message bytes are
/// counted here, so keep 10% headroom for the per-event overhead.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024 * 9 / 10;

pub const DEFAULT_MAX_EVENTS: usize = 1000;

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

/// Prefix kept from a single message that is too big to fit any batch.
pub const DEFAULT_TRUNCATED_MESSAGE_BYTES: usize = 500;

#[derive(Debug, Error)]
pub enum BatcherError {
    #[error("batch channel closed with {events} undelivered events")]
    ChannelSend { events: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_payload_bytes: usize,
    pub max_events: usize,
    pub max_wait: Duration,
    pub truncated_message_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_events: DEFAULT_MAX_EVENTS,
            max_wait: DEFAULT_MAX_WAIT,
            truncated_message_bytes: DEFAULT_TRUNCATED_MESSAGE_BYTES,
        }
    }
}

/// Size and count bounded accumulator. Time bounds are applied by [`Batcher::run`].
#[derive(Debug)]
pub struct BatchBuilder {
    config: BatchConfig,
    current: Batch,
    payload_bytes: usize,
}

impl BatchBuilder {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            current: Batch::with_capacity(config.max_events),
            config,
            payload_bytes: 0,
        }
    }

    /// Append an event from the entry at `cursor`.
    ///
    /// Returns the previous batch when the event did not fit in it. The event
    /// then opens the next batch.
    pub fn push(&mut self, mut event: LogEvent, cursor: String) -> Option<Batch> {
        if event.message.len() > self.config.max_payload_bytes {
            warn!(
                cursor = %cursor,
                bytes = event.message.len(),
                keep = self.config.truncated_message_bytes,
                "Truncating oversized log event"
            );
            truncate_message(&mut event.message, self.config.truncated_message_bytes);
        }

        let size = event.message.len();
        let completed = if self.payload_bytes + size > self.config.max_payload_bytes
            || self.current.len() >= self.config.max_events
        {
            self.take()
        } else {
            None
        };

        self.current.events.push(event);
        self.current.cursor = cursor;
        self.payload_bytes += size;

        completed
    }

    /// Hand out the current batch and start a new one. Empty batches are never returned.
    pub fn take(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }
        let fresh = Batch::with_capacity(self.config.max_events);
        self.payload_bytes = 0;
        Some(std::mem::replace(&mut self.current, fresh))
    }

    pub fn pending_events(&self) -> usize {
        self.current.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.payload_bytes
    }
}

/// Cut `message` to at most `max` bytes without splitting a character.
fn truncate_message(message: &mut String, max: usize) {
    if message.len() <= max {
        return;
    }
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.truncate(end);
}

/// Converts entries to events and groups them into batches.
pub struct Batcher {
    converter: EntryConverter,
    builder: BatchBuilder,
    max_wait: Duration,
}

impl Batcher {
    pub fn new(converter: EntryConverter, config: BatchConfig) -> Self {
        Self {
            converter,
            builder: BatchBuilder::new(config),
            max_wait: config.max_wait,
        }
    }

    /// Run until cancelled or the entry channel closes, then flush what is left.
    ///
    /// The final flush is a blocking send: it relies on the sink writer draining
    /// its channel during shutdown.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<JournalEntry>,
        output: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> Result<(), BatcherError> {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.max_wait, self.max_wait);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(max_wait = ?self.max_wait, "Batcher started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Batcher cancelled, flushing current batch");
                    break;
                }

                _ = ticker.tick() => {
                    if let Some(batch) = self.builder.take() {
                        debug!(events = batch.len(), cursor = %batch.cursor, "Max wait reached");
                        send(&output, batch).await?;
                    }
                }

                entry = input.recv() => {
                    let Some(entry) = entry else {
                        info!("Entry channel closed, flushing current batch");
                        break;
                    };

                    let event = self.converter.convert(&entry);
                    if let Some(batch) = self.builder.push(event, entry.cursor) {
                        debug!(events = batch.len(), cursor = %batch.cursor, "Batch full");
                        send(&output, batch).await?;
                        ticker.reset();
                    }
                }
            }
        }

        if let Some(batch) = self.builder.take() {
            info!(events = batch.len(), cursor = %batch.cursor, "Final batch flush");
            send(&output, batch).await?;
        }

        info!("Batcher stopped");
        Ok(())
    }
}

async fn send(output: &mpsc::Sender<Batch>, batch: Batch) -> Result<(), BatcherError> {
    output.send(batch).await.map_err(|e| BatcherError::ChannelSend {
        events: e.0.len(),
    })
}
