//! Training-loop-facing wrapper over the shard pool

use std::sync::{Arc, Mutex};

use offline_replay_core::{Result, SampleMode, ShardParams, TransitionBatch};

use crate::config::PoolConfig;
use crate::pool::ReplayBufferPool;

/// Construction parameters for [`WrappedReplayPool`]
#[derive(Clone)]
pub struct WrappedPoolConfig {
    /// Backing pool construction parameters, including the pass-through
    /// shard parameter set
    pub pool: PoolConfig,
    /// Keep a one-batch prefetch slot filled between calls
    pub use_staging: bool,
}

impl WrappedPoolConfig {
    /// Wrap the given pool config with staging enabled
    #[must_use]
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            pool,
            use_staging: true,
        }
    }
}

/// Adapts [`ReplayBufferPool`] to the replay-buffer contract a training loop
/// expects.
///
/// Construction mirrors a single-shard buffer: the full parameter set
/// (observation/action/reward shapes and dtypes, stacking depth, capacity,
/// batch size, update horizon, discount) is threaded through unchanged and
/// the pool is supplied as the backing memory. Batch assembly beyond shard
/// delegation belongs to the downstream batching layer; this type only adds
/// an optional one-batch staging slot.
pub struct WrappedReplayPool {
    memory: Arc<ReplayBufferPool>,
    params: ShardParams,
    use_staging: bool,
    /// Prefetched batch; mode-agnostic, so callers that interleave sampling
    /// variants should disable staging
    staged: Mutex<Option<TransitionBatch>>,
}

impl WrappedReplayPool {
    /// Build the backing pool and thread the parameter set into the wrapper
    pub async fn build(config: WrappedPoolConfig) -> Result<Self> {
        let params = config.pool.shard_params.clone();
        let memory = Arc::new(ReplayBufferPool::open(config.pool).await?);
        Ok(Self {
            memory,
            params,
            use_staging: config.use_staging,
            staged: Mutex::new(None),
        })
    }

    /// Handle to the backing pool
    #[must_use]
    pub fn memory(&self) -> Arc<ReplayBufferPool> {
        Arc::clone(&self.memory)
    }

    /// The threaded-through shard parameter set
    #[must_use]
    pub fn params(&self) -> &ShardParams {
        &self.params
    }

    /// Whether the prefetch slot is in use
    #[must_use]
    pub fn use_staging(&self) -> bool {
        self.use_staging
    }

    /// Next training batch in the default variant, sized by the configured
    /// batch size
    pub fn next_batch(&self) -> Result<TransitionBatch> {
        self.next_batch_with_mode(SampleMode::Standard)
    }

    /// Next training batch in the given variant.
    ///
    /// With staging on, serves the prefetched batch and refills the slot
    /// before returning; the first call fills the slot on demand.
    pub fn next_batch_with_mode(&self, mode: SampleMode) -> Result<TransitionBatch> {
        let batch_size = Some(self.params.batch_size);
        if !self.use_staging {
            return self.memory.sample_with_mode(batch_size, None, mode);
        }

        let mut slot = self.staged.lock().unwrap();
        let serve = match slot.take() {
            Some(batch) => batch,
            None => self.memory.sample_with_mode(batch_size, None, mode)?,
        };
        *slot = Some(self.memory.sample_with_mode(batch_size, None, mode)?);
        Ok(serve)
    }
}
