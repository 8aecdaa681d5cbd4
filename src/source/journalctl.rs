use crate::source::journal::{JournalApi, JournalEntry, SourceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

const CURSOR_FIELD: &str = "__CURSOR";
const REALTIME_FIELD: &str = "__REALTIME_TIMESTAMP";

/// How long `open` waits for journalctl to either produce output or exit
/// after seeking to a cursor.
pub const SEEK_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Where to start reading when there is no stored checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Oldest entry still in the journal.
    Head,
    /// Only entries written after startup.
    Tail,
}

/// Journal read position decided at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seek {
    /// Resume strictly after a checkpointed cursor.
    AfterCursor(String),
    Start(StartPosition),
}

impl Seek {
    pub fn from_checkpoint(checkpoint: Option<String>, fallback: StartPosition) -> Self {
        match checkpoint {
            Some(cursor) if !cursor.is_empty() => Seek::AfterCursor(cursor),
            _ => Seek::Start(fallback),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["--output=json".to_string(), "--follow".to_string()];
        match self {
            Seek::AfterCursor(cursor) => {
                args.push(format!("--after-cursor={}", cursor));
                args.push("--no-tail".to_string());
            }
            Seek::Start(StartPosition::Head) => args.push("--no-tail".to_string()),
            Seek::Start(StartPosition::Tail) => args.push("--lines=0".to_string()),
        }
        args
    }
}

/// [`JournalApi`] over a `journalctl --output=json --follow` child process.
///
/// A background task forwards stdout lines through a capacity-1 channel, so the
/// child is paused by pipe backpressure whenever the pipeline stalls.
pub struct JournalctlReader {
    _child: Child,
    lines: mpsc::Receiver<String>,
    pending: Option<String>,
    current: Option<String>,
    closed: bool,
}

impl JournalctlReader {
    pub fn spawn(journalctl: &Path, seek: &Seek) -> Result<Self, SourceError> {
        let args = seek.args();
        info!(journalctl = %journalctl.display(), args = ?args, "Spawning journalctl");

        let mut child = Command::new(journalctl)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Closed("journalctl stdout not captured".to_string()))?;

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        warn!("journalctl output ended");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Cannot read journalctl output");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _child: child,
            lines: rx,
            pending: None,
            current: None,
            closed: false,
        })
    }

    /// Spawn at `seek`. If journalctl rejects the cursor and exits, spawn
    /// again at `fallback`.
    pub async fn open(
        journalctl: &Path,
        seek: &Seek,
        fallback: StartPosition,
    ) -> Result<Self, SourceError> {
        let mut reader = Self::spawn(journalctl, seek)?;

        if let Seek::AfterCursor(cursor) = seek {
            reader.wait(SEEK_CHECK_TIMEOUT).await;
            if reader.closed {
                error!(
                    cursor = %cursor,
                    start = ?fallback,
                    "Cannot seek to cursor, starting from the fallback position instead"
                );
                return Self::spawn(journalctl, &Seek::Start(fallback));
            }
        }

        Ok(reader)
    }

    pub fn default_binary() -> PathBuf {
        PathBuf::from("journalctl")
    }
}

#[async_trait]
impl JournalApi for JournalctlReader {
    async fn advance(&mut self) -> Result<bool, SourceError> {
        if let Some(line) = self.pending.take() {
            self.current = Some(line);
            return Ok(true);
        }
        if self.closed {
            return Err(SourceError::Closed("journalctl exited".to_string()));
        }
        match self.lines.try_recv() {
            Ok(line) => {
                self.current = Some(line);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Err(SourceError::Closed("journalctl exited".to_string()))
            }
        }
    }

    async fn entry(&mut self) -> Result<JournalEntry, SourceError> {
        let line = self.current.take().ok_or(SourceError::NoCurrentEntry)?;
        parse_entry(&line)
    }

    async fn wait(&mut self, timeout: Duration) {
        if self.pending.is_some() || self.closed {
            return;
        }
        match tokio::time::timeout(timeout, self.lines.recv()).await {
            Ok(Some(line)) => self.pending = Some(line),
            Ok(None) => self.closed = true,
            Err(_) => debug!("No new journal data"),
        }
    }
}

/// Decode one line of `journalctl --output=json`.
///
/// Field values are strings, byte arrays for binary data, or arrays when a
/// field is repeated; repeated fields keep their first value.
pub fn parse_entry(line: &str) -> Result<JournalEntry, SourceError> {
    let object: serde_json::Map<String, Value> = serde_json::from_str(line)
        .map_err(|e| SourceError::Malformed(format!("invalid json: {}", e)))?;

    let mut fields = HashMap::with_capacity(object.len());
    for (name, value) in object {
        if let Some(text) = field_text(&value) {
            fields.insert(name, text);
        }
    }

    let cursor = fields
        .remove(CURSOR_FIELD)
        .ok_or_else(|| SourceError::Malformed(format!("missing {}", CURSOR_FIELD)))?;
    let realtime_timestamp = fields
        .get(REALTIME_FIELD)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    Ok(JournalEntry {
        cursor,
        realtime_timestamp,
        fields,
    })
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if items.iter().all(Value::is_u64) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(Value::as_u64)
                .map(|b| b as u8)
                .collect();
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Value::Array(items) => items.first().and_then(field_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_string_fields() {
        let line = r#"{"__CURSOR":"s=abc;i=1","__REALTIME_TIMESTAMP":"1700000000123456","MESSAGE":"hello","_PID":"42"}"#;
        let entry = parse_entry(line).unwrap();
        assert_eq!(entry.cursor, "s=abc;i=1");
        assert_eq!(entry.realtime_timestamp, 1_700_000_000_123_456);
        assert_eq!(entry.field("MESSAGE"), Some("hello"));
        assert_eq!(entry.field("_PID"), Some("42"));
        assert_eq!(entry.field("__CURSOR"), None);
    }

    #[test]
    fn test_parse_entry_binary_and_repeated_fields() {
        let line = r#"{"__CURSOR":"c","MESSAGE":[104,105],"TAG":["first","second"],"NULLED":null}"#;
        let entry = parse_entry(line).unwrap();
        assert_eq!(entry.field("MESSAGE"), Some("hi"));
        assert_eq!(entry.field("TAG"), Some("first"));
        assert_eq!(entry.field("NULLED"), None);
        assert_eq!(entry.realtime_timestamp, 0);
    }

    #[test]
    fn test_parse_entry_requires_cursor() {
        let err = parse_entry(r#"{"MESSAGE":"x"}"#).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));

        let err = parse_entry("not json").unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn test_seek_from_checkpoint() {
        assert_eq!(
            Seek::from_checkpoint(Some("c9".to_string()), StartPosition::Tail),
            Seek::AfterCursor("c9".to_string())
        );
        assert_eq!(
            Seek::from_checkpoint(Some(String::new()), StartPosition::Head),
            Seek::Start(StartPosition::Head)
        );
        assert_eq!(
            Seek::from_checkpoint(None, StartPosition::Tail),
            Seek::Start(StartPosition::Tail)
        );
    }

    #[test]
    fn test_seek_args() {
        let args = Seek::AfterCursor("s=1".to_string()).args();
        assert!(args.contains(&"--after-cursor=s=1".to_string()));
        assert!(args.contains(&"--no-tail".to_string()));

        let args = Seek::Start(StartPosition::Tail).args();
        assert!(args.contains(&"--lines=0".to_string()));
        assert!(!args.contains(&"--no-tail".to_string()));
    }

    /// Write an executable shell script standing in for journalctl.
    #[cfg(unix)]
    fn fake_journalctl(dir: &Path, body: &str) -> PathBuf {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-journalctl");
        {
            let mut f = std::fs::File::create(&script).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            write!(f, "{}", body).unwrap();
        }
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    async fn drain_cursors(reader: &mut JournalctlReader) -> Vec<String> {
        let mut cursors = Vec::new();
        for _ in 0..20 {
            match reader.advance().await {
                Ok(true) => cursors.push(reader.entry().await.unwrap().cursor),
                Ok(false) => reader.wait(Duration::from_millis(200)).await,
                Err(SourceError::Closed(_)) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        cursors
    }

    /// Exits with an error for any cursor other than `good`, like journalctl
    /// does for a cursor it cannot parse.
    #[cfg(unix)]
    const CURSOR_CHECKING_SCRIPT: &str = r#"case "$*" in
  *--after-cursor=good*) echo '{"__CURSOR":"after-good","MESSAGE":"resumed"}' ;;
  *--after-cursor=*) echo "Failed to seek to cursor: Invalid argument" >&2; exit 1 ;;
  *) echo '{"__CURSOR":"c0","MESSAGE":"first"}' ;;
esac
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reader_over_child_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = fake_journalctl(
            dir.path(),
            "echo '{\"__CURSOR\":\"c0\",\"MESSAGE\":\"one\"}'\n\
             echo '{\"__CURSOR\":\"c1\",\"MESSAGE\":\"two\"}'\n",
        );

        let mut reader = JournalctlReader::spawn(&script, &Seek::Start(StartPosition::Head)).unwrap();
        assert_eq!(drain_cursors(&mut reader).await, vec!["c0", "c1"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_falls_back_when_cursor_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = fake_journalctl(dir.path(), CURSOR_CHECKING_SCRIPT);

        let seek = Seek::AfterCursor("garbage".to_string());
        let mut reader = JournalctlReader::open(&script, &seek, StartPosition::Head)
            .await
            .unwrap();
        assert_eq!(drain_cursors(&mut reader).await, vec!["c0"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_resumes_after_accepted_cursor() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = fake_journalctl(dir.path(), CURSOR_CHECKING_SCRIPT);

        let seek = Seek::AfterCursor("good".to_string());
        let mut reader = JournalctlReader::open(&script, &seek, StartPosition::Head)
            .await
            .unwrap();
        assert_eq!(drain_cursors(&mut reader).await, vec!["after-good"]);
    }
}
