//! Pool construction parameters

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use offline_replay_core::{LoadFlags, QualityMode, ShardParams, ShardStore, StorageBackend};

/// Bounded retry applied while waiting for the first loadable checkpoint.
///
/// Construction retries discovery and loading until a shard loads or the
/// attempt cap is hit, then fails with `EmptyPool` instead of blocking
/// forever on storage that never produces a valid checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

/// Everything needed to open a [`crate::ReplayBufferPool`].
///
/// The shard store and storage backend are external collaborators supplied
/// by the caller; the rest defaults to a single-shard initial load over the
/// full quality band.
#[derive(Clone)]
pub struct PoolConfig {
    /// Storage location holding the checkpoint files
    pub data_dir: PathBuf,
    /// Load exactly this checkpoint, bypassing discovery and selection.
    /// Must be non-negative.
    pub replay_suffix: Option<i64>,
    /// Quality band shards are drawn from
    pub quality_mode: QualityMode,
    /// Shards fetched at construction
    pub initial_buffers: usize,
    /// Flags threaded to every shard load at construction
    pub load_flags: LoadFlags,
    /// Construction retry bounds
    pub retry: RetryPolicy,
    /// Pass-through parameters describing the persisted shards
    pub shard_params: ShardParams,
    /// Loads one shard per checkpoint suffix
    pub store: Arc<dyn ShardStore>,
    /// Lists checkpoint files at the storage location
    pub backend: Arc<dyn StorageBackend>,
}

impl PoolConfig {
    /// Config with defaults: no fixed suffix, `ALL` band, one initial shard
    pub fn new(
        data_dir: impl Into<PathBuf>,
        store: Arc<dyn ShardStore>,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            replay_suffix: None,
            quality_mode: QualityMode::default(),
            initial_buffers: 1,
            load_flags: LoadFlags::default(),
            retry: RetryPolicy::default(),
            shard_params: ShardParams::default(),
            store,
            backend,
        }
    }
}
