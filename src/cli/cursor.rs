use crate::config::load_or_default;
use crate::storage::{CursorStore, FileCursorStore};
use std::path::Path;

/// Print the stored checkpoint cursor.
pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_or_default(config_path)?;
    let store = FileCursorStore::new(&config.state_file);

    match store.get().await? {
        Some(cursor) => println!("{}", cursor),
        None => eprintln!("No checkpoint stored at {}", store.path().display()),
    }
    Ok(())
}

/// Remove the stored checkpoint so the next run starts at `reader.start`.
pub async fn reset(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_or_default(config_path)?;
    let store = FileCursorStore::new(&config.state_file);

    if store.clear().await? {
        println!("Checkpoint removed: {}", store.path().display());
    } else {
        println!("No checkpoint stored at {}", store.path().display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reset_removes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");
        let config_path = dir.path().join("config.yml");
        fs::write(&config_path, format!("state_file: {}\n", state.display())).unwrap();
        fs::write(&state, "s=1;i=2").unwrap();

        show(Some(&config_path)).await.unwrap();
        reset(Some(&config_path)).await.unwrap();
        assert!(!state.exists());

        // Nothing left to remove
        reset(Some(&config_path)).await.unwrap();
    }
}
