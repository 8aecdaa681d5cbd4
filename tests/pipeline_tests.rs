use async_trait::async_trait;
use journald_cwl::batch::{BatchConfig, Batcher, EntryConverter, LogEvent};
use journald_cwl::pipeline::{Pipeline, PipelineError};
use journald_cwl::sink::{LogSink, SinkError, SinkWriter};
use journald_cwl::source::{JournalApi, JournalEntry, SourceError, SourceReader};
use journald_cwl::storage::{CursorError, CursorStore};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type CallLog = Arc<Mutex<Vec<String>>>;

fn entry(i: usize) -> JournalEntry {
    JournalEntry {
        cursor: format!("c{}", i),
        realtime_timestamp: 1_700_000_000_000_000 + i as u64,
        fields: HashMap::from([
            ("MESSAGE".to_string(), format!("m{}", i)),
            ("_PID".to_string(), "42".to_string()),
        ]),
    }
}

struct ScriptedJournal {
    entries: VecDeque<JournalEntry>,
    current: Option<JournalEntry>,
    fail_when_empty: bool,
    waits: Arc<AtomicUsize>,
}

impl ScriptedJournal {
    fn new(count: usize) -> Self {
        Self {
            entries: (0..count).map(entry).collect(),
            current: None,
            fail_when_empty: false,
            waits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl JournalApi for ScriptedJournal {
    async fn advance(&mut self) -> Result<bool, SourceError> {
        match self.entries.pop_front() {
            Some(e) => {
                self.current = Some(e);
                Ok(true)
            }
            None if self.fail_when_empty => {
                Err(SourceError::Malformed("journal file corrupted".to_string()))
            }
            None => Ok(false),
        }
    }

    async fn entry(&mut self) -> Result<JournalEntry, SourceError> {
        self.current.take().ok_or(SourceError::NoCurrentEntry)
    }

    async fn wait(&mut self, timeout: Duration) {
        self.waits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(timeout).await;
    }
}

#[derive(Clone, Copy)]
enum SinkMode {
    Accept,
    Reject,
    Hang,
}

#[derive(Clone)]
struct RecordingSink {
    mode: SinkMode,
    log: CallLog,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingSink {
    fn new(mode: SinkMode, log: CallLog) -> Self {
        Self {
            mode,
            log,
            batches: Arc::default(),
        }
    }

    fn messages(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn put_events(&self, events: &[LogEvent]) -> Result<(), SinkError> {
        match self.mode {
            SinkMode::Accept => {
                let messages = events
                    .iter()
                    .map(|e| {
                        let record: serde_json::Value = serde_json::from_str(&e.message).unwrap();
                        record["message"].as_str().unwrap().to_string()
                    })
                    .collect();
                self.log.lock().unwrap().push(format!("put:{}", events.len()));
                self.batches.lock().unwrap().push(messages);
                Ok(())
            }
            SinkMode::Reject => Err(SinkError::Other("AccessDeniedException".to_string())),
            SinkMode::Hang => std::future::pending().await,
        }
    }

    async fn create_stream(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Clone)]
struct RecordingStore {
    log: CallLog,
    cursors: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            cursors: Arc::default(),
        }
    }

    fn cursors(&self) -> Vec<String> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl CursorStore for RecordingStore {
    async fn get(&self) -> Result<Option<String>, CursorError> {
        Ok(self.cursors.lock().unwrap().last().cloned())
    }

    async fn set(&self, cursor: &str) -> Result<(), CursorError> {
        self.log.lock().unwrap().push(format!("set:{}", cursor));
        self.cursors.lock().unwrap().push(cursor.to_string());
        Ok(())
    }
}

fn batch_config(max_events: usize) -> BatchConfig {
    BatchConfig {
        max_events,
        max_wait: Duration::from_secs(3600),
        ..BatchConfig::default()
    }
}

fn pipeline(
    journal: ScriptedJournal,
    sink: RecordingSink,
    store: RecordingStore,
    config: BatchConfig,
) -> Pipeline<ScriptedJournal, RecordingSink, RecordingStore> {
    Pipeline::new(
        SourceReader::new(journal).with_wait_timeout(Duration::from_millis(10)),
        Batcher::new(EntryConverter::new("i-0123456789"), config),
        SinkWriter::new(sink, store),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_entries_delivered_in_order_with_checkpoint_per_batch() {
    let log = CallLog::default();
    let sink = RecordingSink::new(SinkMode::Accept, log.clone());
    let store = RecordingStore::new(log.clone());
    let journal = ScriptedJournal::new(10);
    let waits = journal.waits.clone();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        pipeline(journal, sink.clone(), store.clone(), batch_config(2)).run(cancel.clone()),
    );

    // Four batches fill up on their own; the last pair only goes out on shutdown
    wait_until(|| store.cursors().len() == 4 && waits.load(Ordering::SeqCst) >= 2).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(store.cursors(), vec!["c1", "c3", "c5", "c7", "c9"]);

    let batches = sink.messages();
    assert!(batches.iter().all(|b| b.len() == 2));
    let delivered: Vec<String> = batches.into_iter().flatten().collect();
    let expected: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
    assert_eq!(delivered, expected);

    let calls = log.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            "put:2", "set:c1", "put:2", "set:c3", "put:2", "set:c5", "put:2", "set:c7", "put:2",
            "set:c9"
        ]
    );
}

#[tokio::test]
async fn test_shutdown_delivers_partial_batch() {
    let log = CallLog::default();
    let sink = RecordingSink::new(SinkMode::Accept, log.clone());
    let store = RecordingStore::new(log.clone());
    let journal = ScriptedJournal::new(3);
    let waits = journal.waits.clone();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        pipeline(journal, sink.clone(), store.clone(), batch_config(1000)).run(cancel.clone()),
    );

    // The reader has gone idle twice, so every entry is with the batcher
    wait_until(|| waits.load(Ordering::SeqCst) >= 2).await;
    assert!(store.cursors().is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(sink.messages(), vec![vec!["m0", "m1", "m2"]]);
    assert_eq!(store.cursors(), vec!["c2"]);
}

#[tokio::test]
async fn test_rejected_delivery_stops_pipeline_without_checkpoint() {
    let log = CallLog::default();
    let sink = RecordingSink::new(SinkMode::Reject, log.clone());
    let store = RecordingStore::new(log.clone());

    // The second entry opens a batch that stays pending, so only the writer stops
    let result = pipeline(ScriptedJournal::new(2), sink, store.clone(), batch_config(1))
        .run(CancellationToken::new())
        .await;

    assert!(matches!(result, Err(PipelineError::Writer(_))));
    assert!(store.cursors().is_empty());
}

#[tokio::test]
async fn test_writer_error_reported_when_batcher_blocked_on_send() {
    let log = CallLog::default();
    let sink = RecordingSink::new(SinkMode::Reject, log.clone());
    let store = RecordingStore::new(log.clone());

    // Enough entries that the batcher is mid-send when the writer gives up
    for _ in 0..20 {
        let result = pipeline(
            ScriptedJournal::new(10),
            sink.clone(),
            store.clone(),
            batch_config(1),
        )
        .run(CancellationToken::new())
        .await;

        assert!(
            matches!(result, Err(PipelineError::Writer(_))),
            "unexpected result {:?}",
            result
        );
    }
    assert!(store.cursors().is_empty());
}

#[tokio::test]
async fn test_journal_failure_stops_pipeline() {
    let log = CallLog::default();
    let sink = RecordingSink::new(SinkMode::Accept, log.clone());
    let store = RecordingStore::new(log);
    let mut journal = ScriptedJournal::new(1);
    journal.fail_when_empty = true;
    let cancel = CancellationToken::new();

    let result = pipeline(journal, sink, store, batch_config(10))
        .run(cancel.clone())
        .await;

    assert!(matches!(result, Err(PipelineError::Source(_))));
    assert!(cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_stuck_delivery_bounded_by_shutdown_timeout() {
    let log = CallLog::default();
    let sink = RecordingSink::new(SinkMode::Hang, log.clone());
    let store = RecordingStore::new(log.clone());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(
        pipeline(ScriptedJournal::new(4), sink, store.clone(), batch_config(1))
            .with_shutdown_timeout(Duration::from_secs(2))
            .run(cancel.clone()),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(PipelineError::ShutdownTimeout(_))));
    assert!(store.cursors().is_empty());
}
