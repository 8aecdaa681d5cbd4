pub mod batcher;
pub mod convert;

pub use batcher::{BatchBuilder, BatchConfig, Batcher, BatcherError};
pub use convert::{EntryConverter, Record, RecordSyslog};

/// A converted journal entry, ready to be sent as one CloudWatch log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Never empty: conversion failures carry a diagnostic message instead.
    pub message: String,

    /// Ingestion time in milliseconds since the epoch.
    pub timestamp: i64,
}

/// A group of log events that fits in a single PutLogEvents request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Never empty once handed downstream.
    pub events: Vec<LogEvent>,

    /// Journal cursor of the last event. Persisting it means every entry up to
    /// and including this one has been delivered.
    pub cursor: String,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            cursor: String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sum of message lengths in bytes.
    pub fn payload_bytes(&self) -> usize {
        self.events.iter().map(|e| e.message.len()).sum()
    }
}
