//! Checkpoint discovery over a storage listing

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use offline_replay_core::{Result, StorageBackend};

/// Minimum number of per-field files for a checkpoint suffix to count as
/// complete. A full shard persists at least observation, action, reward,
/// terminal, add_count and invalid_range arrays.
pub const MIN_FILES_PER_CHECKPOINT: usize = 6;

/// Lists checkpoint suffixes with a complete file set at a storage location.
///
/// Checkpoint files are path-encoded as `<field>.<suffix>.<ext>`; the suffix
/// is the second-to-last dot-delimited component. Completeness here is only a
/// hint: a concurrent writer can still leave a listed suffix unloadable.
pub struct CheckpointCatalog {
    backend: Arc<dyn StorageBackend>,
}

impl CheckpointCatalog {
    /// Create a catalog over the given storage backend
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Complete checkpoint suffixes under `dir`, ascending numeric order.
    ///
    /// An empty result means no suffix qualified; a listing failure surfaces
    /// the backend error unchanged.
    pub async fn list_complete(&self, dir: &Path) -> Result<Vec<u64>> {
        let entries = self.backend.list(dir).await?;

        let mut file_counts: HashMap<u64, usize> = HashMap::new();
        for name in &entries {
            match suffix_component(name) {
                Some(suffix) => *file_counts.entry(suffix).or_default() += 1,
                None => debug!(file = %name, "entry carries no numeric checkpoint suffix"),
            }
        }

        let mut suffixes: Vec<u64> = file_counts
            .into_iter()
            .filter(|&(_, count)| count >= MIN_FILES_PER_CHECKPOINT)
            .map(|(suffix, _)| suffix)
            .collect();
        suffixes.sort_unstable();
        Ok(suffixes)
    }
}

/// Second-to-last dot-delimited component of a file name, parsed as a
/// checkpoint suffix
fn suffix_component(name: &str) -> Option<u64> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return None;
    }
    parts[parts.len() - 2].parse().ok()
}
