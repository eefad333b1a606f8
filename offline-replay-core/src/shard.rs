//! Shard and shard-store contracts

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::element::{ElementDtype, ElementSpec, TransitionBatch};
use crate::error::Result;
use crate::mode::SampleMode;

/// Flags threaded to every shard load.
///
/// They tell the store which derived arrays to materialize alongside the raw
/// transitions; the pool forwards them verbatim and never inspects the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadFlags {
    /// Materialize per-transition returns
    pub with_return: bool,
    /// Materialize behavior-cloning annotations
    pub with_bc: bool,
    /// Materialize estimated-return annotations
    pub with_estimated_return: bool,
    /// Return threshold separating accepted from rejected transitions
    pub border: Option<f64>,
    /// Training regime hint forwarded to the store
    pub train_mode: Option<String>,
}

/// Pass-through construction parameters for the underlying shards.
///
/// The pool does not interpret these; they describe the transition arrays a
/// shard was written with and must match the persisted data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardParams {
    /// Shape of a single observation
    pub observation_shape: Vec<usize>,
    /// Number of stacked observations per state
    pub stack_size: usize,
    /// Capacity the shard was written with
    pub replay_capacity: usize,
    /// Default sampling batch size
    pub batch_size: usize,
    /// n-step update horizon
    pub update_horizon: usize,
    /// Discount factor
    pub gamma: f64,
    /// Bound on resampling attempts for invalid transitions
    pub max_sample_attempts: usize,
    /// Extra per-transition elements beyond the standard set
    pub extra_storage_types: Vec<ElementSpec>,
    /// Observation scalar type
    pub observation_dtype: ElementDtype,
    /// Shape of a single action
    pub action_shape: Vec<usize>,
    /// Action scalar type
    pub action_dtype: ElementDtype,
    /// Shape of a single reward
    pub reward_shape: Vec<usize>,
    /// Reward scalar type
    pub reward_dtype: ElementDtype,
}

impl Default for ShardParams {
    fn default() -> Self {
        Self {
            observation_shape: Vec::new(),
            stack_size: 1,
            replay_capacity: 1_000_000,
            batch_size: 32,
            update_horizon: 1,
            gamma: 0.99,
            max_sample_attempts: 1000,
            extra_storage_types: Vec::new(),
            observation_dtype: ElementDtype::U8,
            action_shape: Vec::new(),
            action_dtype: ElementDtype::I32,
            reward_shape: Vec::new(),
            reward_dtype: ElementDtype::F32,
        }
    }
}

/// One loaded, immutable slice of persisted experience.
///
/// A shard owns its transition arrays; the pool only ever reads from it.
pub trait ReplayShard: Send + Sync {
    /// Monotonic insert counter recorded when the shard was checkpointed
    fn add_count(&self) -> u64;

    /// Schema of the batches this shard produces for the given variant
    fn transition_elements(&self, mode: Option<SampleMode>) -> Result<Vec<ElementSpec>>;

    /// Build a batch, either of `batch_size` uniform draws or of exactly the
    /// given `indices`, annotated per the requested variant
    fn sample_transition_batch(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
        mode: SampleMode,
    ) -> Result<TransitionBatch>;
}

/// Persists and retrieves one shard's transition arrays by checkpoint suffix.
///
/// Implementations fail with [`crate::ReplayError::NotFound`] when a suffix's
/// file set is incomplete or unreadable; the caller treats that as a dropped
/// candidate, not a fatal error.
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// Load the shard persisted under `suffix` in `dir`
    async fn load(&self, dir: &Path, suffix: u64, flags: &LoadFlags) -> Result<Arc<dyn ReplayShard>>;
}
