//! Local filesystem listing backend

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use offline_replay_core::{Result, StorageBackend};

/// Lists checkpoint files straight off the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}
