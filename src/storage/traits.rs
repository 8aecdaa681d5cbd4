use async_trait::async_trait;

/// Durable home of the checkpoint cursor.
///
/// Only the sink writer calls `set`; `get` is used once at startup to pick
/// the journal read position.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// `Ok(None)` means no checkpoint has been written yet.
    async fn get(&self) -> Result<Option<String>, CursorError>;

    async fn set(&self, cursor: &str) -> Result<(), CursorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cursor: {0}")]
    Invalid(String),
}
