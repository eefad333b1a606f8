//! Directory-listing seam over the storage backend

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Minimal listing interface the checkpoint catalog consumes.
///
/// Backends surface their own errors unchanged; a missing directory is not
/// retried here.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// File names (not full paths) present under `dir`
    async fn list(&self, dir: &Path) -> Result<Vec<String>>;
}
