//! Partial-failure-tolerant parallel shard loading

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use offline_replay_core::{LoadFlags, ReplayError, ReplayShard, Result, ShardStore};

/// Result of one parallel load pass
pub struct LoadOutcome {
    /// Successfully loaded shards, one per surviving candidate
    pub shards: Vec<Arc<dyn ReplayShard>>,
    /// Suffixes of the shards that loaded, in completion order
    pub suffixes: Vec<u64>,
    /// Max over the loaded shards' insert counters
    pub add_count: u64,
}

impl std::fmt::Debug for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOutcome")
            .field("shards", &self.shards.len())
            .field("suffixes", &self.suffixes)
            .field("add_count", &self.add_count)
            .finish()
    }
}

impl LoadOutcome {
    pub(crate) fn empty() -> Self {
        Self {
            shards: Vec::new(),
            suffixes: Vec::new(),
            add_count: 0,
        }
    }
}

/// Loads candidate shards concurrently, tolerating missing checkpoints.
///
/// Catalog completeness is only a hint: a race with a concurrent writer or a
/// truncated file can still fail a load after the candidate was listed. Such
/// `NotFound` failures drop the candidate; the pass proceeds with whatever
/// succeeded.
pub struct ParallelLoader {
    store: Arc<dyn ShardStore>,
}

impl ParallelLoader {
    /// Create a loader over the given shard store
    pub fn new(store: Arc<dyn ShardStore>) -> Self {
        Self { store }
    }

    /// Load every candidate concurrently and collect the successes.
    ///
    /// One task is spawned per candidate and every task is joined before
    /// control returns; there is no streaming, early return, or per-shard
    /// timeout. A `NotFound` result drops its candidate with a warning. Any
    /// other failure is fatal, but only reported after all dispatched loads
    /// settle. The aggregate `add_count` is the max over successes, computed
    /// after the last task finishes.
    pub async fn load_many(
        &self,
        dir: &Path,
        suffixes: &[u64],
        flags: &LoadFlags,
    ) -> Result<LoadOutcome> {
        let mut tasks = JoinSet::new();
        for &suffix in suffixes {
            let store = Arc::clone(&self.store);
            let dir: PathBuf = dir.to_path_buf();
            let flags = flags.clone();
            tasks.spawn(async move { (suffix, store.load(&dir, suffix, &flags).await) });
        }

        let mut outcome = LoadOutcome::empty();
        let mut fatal: Option<ReplayError> = None;
        while let Some(joined) = tasks.join_next().await {
            let (suffix, loaded) = joined.map_err(anyhow::Error::from)?;
            match loaded {
                Ok(shard) => {
                    info!(suffix, dir = %dir.display(), "loaded replay checkpoint");
                    outcome.add_count = outcome.add_count.max(shard.add_count());
                    outcome.suffixes.push(suffix);
                    outcome.shards.push(shard);
                }
                Err(err) if err.is_not_found() => {
                    warn!(suffix, dir = %dir.display(), "dropping missing replay checkpoint");
                }
                Err(err) => {
                    // Keep joining the remaining tasks; report the first
                    // fatal error once everything has settled.
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }
}
