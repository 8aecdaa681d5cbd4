use super::traits::{CursorError, CursorStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub type Result<T> = std::result::Result<T, CursorError>;

/// Keeps the checkpoint cursor as plain text in a single file.
///
/// Writes go to a sibling temp file which is synced and renamed over the
/// original, so a crash leaves either the old or the new cursor on disk.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
    fsync: bool,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync: true,
        }
    }

    /// Skip fsync. Only meant for tests.
    pub fn without_fsync(mut self) -> Self {
        self.fsync = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory if needed.
    pub async fn prepare(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Forget the checkpoint. Returns whether one existed.
    pub async fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let cursor = content.trim();
                if cursor.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(cursor.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, cursor: &str) -> Result<()> {
        if cursor.is_empty() || cursor.contains('\n') {
            return Err(CursorError::Invalid(format!("{:?}", cursor)));
        }

        let temp_path = self.temp_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await?;
        file.write_all(cursor.as_bytes()).await?;
        if self.fsync {
            file.sync_all().await?;
        }
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        tracing::debug!(cursor = %cursor, "Cursor saved");
        Ok(())
    }
}
