//! Aggregation of loaded shards behind one sampling surface

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

use offline_replay_core::{
    ElementSpec, LoadFlags, ReplayError, ReplayShard, Result, SampleMode, ShardParams,
    TransitionBatch,
};

use crate::catalog::CheckpointCatalog;
use crate::config::PoolConfig;
use crate::loader::{LoadOutcome, ParallelLoader};
use crate::policy::SelectionPolicy;

/// Shard set plus aggregate counters; replaced wholesale on reload
struct PoolState {
    shards: Vec<Arc<dyn ReplayShard>>,
    suffixes: Vec<u64>,
    add_count: u64,
    loaded_at: DateTime<Utc>,
}

impl PoolState {
    fn from_outcome(outcome: LoadOutcome) -> Self {
        let mut suffixes = outcome.suffixes;
        suffixes.sort_unstable();
        Self {
            shards: outcome.shards,
            suffixes,
            add_count: outcome.add_count,
            loaded_at: Utc::now(),
        }
    }
}

/// Snapshot of the pool's aggregate state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of loaded shards
    pub shard_count: usize,
    /// Max over the loaded shards' insert counters
    pub add_count: u64,
    /// Suffixes of the loaded shards, ascending
    pub suffixes: Vec<u64>,
    /// When the current shard set was installed
    pub loaded_at: DateTime<Utc>,
}

/// A read-only aggregate of persisted replay shards.
///
/// Construction discovers checkpoints at the configured location, selects a
/// quality-band subset and loads it in parallel; sampling picks one shard
/// uniformly at random per call and delegates batch construction to it.
/// Reload replaces the shard set wholesale under a write lock, so samplers
/// observe either the old set or the new one, never a mix.
pub struct ReplayBufferPool {
    data_dir: PathBuf,
    catalog: CheckpointCatalog,
    policy: SelectionPolicy,
    loader: ParallelLoader,
    shard_params: ShardParams,
    state: RwLock<PoolState>,
}

impl std::fmt::Debug for ReplayBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayBufferPool")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl ReplayBufferPool {
    /// Discover, select and load the initial shard set.
    ///
    /// An explicit `replay_suffix` bypasses discovery and selection and loads
    /// exactly that checkpoint. Either way the attempt is retried under the
    /// configured [`crate::RetryPolicy`] until at least one shard loads,
    /// failing with `EmptyPool` when the attempts are exhausted.
    pub async fn open(config: PoolConfig) -> Result<Self> {
        let PoolConfig {
            data_dir,
            replay_suffix,
            quality_mode,
            initial_buffers,
            load_flags,
            retry,
            shard_params,
            store,
            backend,
        } = config;

        let fixed_suffix = match replay_suffix {
            Some(suffix) => Some(u64::try_from(suffix).map_err(|_| {
                ReplayError::InvalidArgument(format!(
                    "replay suffix must be non-negative, got {suffix}"
                ))
            })?),
            None => None,
        };

        let catalog = CheckpointCatalog::new(backend);
        let policy = SelectionPolicy::new(quality_mode);
        let loader = ParallelLoader::new(store);

        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            let outcome = match fixed_suffix {
                Some(suffix) => loader.load_many(&data_dir, &[suffix], &load_flags).await?,
                None => {
                    let listed = catalog.list_complete(&data_dir).await?;
                    if listed.is_empty() {
                        LoadOutcome::empty()
                    } else {
                        let chosen = policy.draw(&listed, initial_buffers)?;
                        loader.load_many(&data_dir, &chosen, &load_flags).await?
                    }
                }
            };

            if !outcome.shards.is_empty() {
                break outcome;
            }
            if attempt >= retry.max_attempts {
                warn!(
                    attempts = attempt,
                    dir = %data_dir.display(),
                    "no replay checkpoint became loadable"
                );
                return Err(ReplayError::EmptyPool);
            }
            debug!(attempt, dir = %data_dir.display(), "no loadable checkpoint yet; retrying");
            tokio::time::sleep(retry.delay).await;
        };

        Ok(Self {
            data_dir,
            catalog,
            policy,
            loader,
            shard_params,
            state: RwLock::new(PoolState::from_outcome(outcome)),
        })
    }

    /// Replace the shard set from a fresh discovery pass.
    ///
    /// Runs discovery, selection and loading once. When at least one shard
    /// loads, the new set is swapped in atomically; when none does, the
    /// previous set is kept serving and `EmptyPool` is returned.
    pub async fn reload(&self, num_buffers: usize, flags: LoadFlags) -> Result<()> {
        let listed = self.catalog.list_complete(&self.data_dir).await?;
        let chosen = self.policy.draw(&listed, num_buffers)?;
        let outcome = self.loader.load_many(&self.data_dir, &chosen, &flags).await?;

        if outcome.shards.is_empty() {
            warn!(dir = %self.data_dir.display(), "reload produced no shards; keeping previous set");
            return Err(ReplayError::EmptyPool);
        }

        let mut state = self.state.write().unwrap();
        *state = PoolState::from_outcome(outcome);
        Ok(())
    }

    /// Uniform-random batch in the default variant
    pub fn sample_transition_batch(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
    ) -> Result<TransitionBatch> {
        self.sample_with_mode(batch_size, indices, SampleMode::Standard)
    }

    /// Batch annotated for behavior cloning
    pub fn sample_transition_batch_bc(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
    ) -> Result<TransitionBatch> {
        self.sample_with_mode(batch_size, indices, SampleMode::BehaviorCloning)
    }

    /// Batch annotated for batch-constrained off-policy correction
    pub fn sample_transition_batch_bcq(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
    ) -> Result<TransitionBatch> {
        self.sample_with_mode(batch_size, indices, SampleMode::BatchConstrained)
    }

    /// Batch annotated for the upper-envelope return objective
    pub fn sample_transition_batch_ue(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
    ) -> Result<TransitionBatch> {
        self.sample_with_mode(batch_size, indices, SampleMode::UpperEnvelope)
    }

    /// Pick one shard uniformly at random and delegate batch construction.
    ///
    /// Every call may pick a different shard; the pick is independent of
    /// shard size and load recency.
    pub fn sample_with_mode(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
        mode: SampleMode,
    ) -> Result<TransitionBatch> {
        let shard = self.pick_shard()?;
        shard.sample_transition_batch(batch_size, indices, mode)
    }

    /// Batch schema, taken from a representative shard.
    ///
    /// The schema is assumed uniform across shards of one storage location.
    pub fn transition_elements(&self, mode: Option<SampleMode>) -> Result<Vec<ElementSpec>> {
        let state = self.state.read().unwrap();
        let shard = state.shards.first().ok_or(ReplayError::EmptyPool)?;
        shard.transition_elements(mode)
    }

    /// Max over the loaded shards' insert counters
    #[must_use]
    pub fn add_count(&self) -> u64 {
        self.state.read().unwrap().add_count
    }

    /// Number of loaded shards
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().shards.len()
    }

    /// Whether the pool holds no shards
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current aggregate state
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.read().unwrap();
        PoolStats {
            shard_count: state.shards.len(),
            add_count: state.add_count,
            suffixes: state.suffixes.clone(),
            loaded_at: state.loaded_at,
        }
    }

    /// Pass-through parameters describing the persisted shards
    #[must_use]
    pub fn shard_params(&self) -> &ShardParams {
        &self.shard_params
    }

    /// Inserting new experience is a no-op; the pool is a read-only aggregate
    pub fn add(&self, _batch: &TransitionBatch) {}

    /// Persisting is a no-op; the shards already live on storage
    pub fn save(&self, _checkpoint_dir: &Path, _suffix: u64) {}

    fn pick_shard(&self) -> Result<Arc<dyn ReplayShard>> {
        let state = self.state.read().unwrap();
        if state.shards.is_empty() {
            return Err(ReplayError::EmptyPool);
        }
        let index = rand::thread_rng().gen_range(0..state.shards.len());
        Ok(Arc::clone(&state.shards[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MIN_FILES_PER_CHECKPOINT;
    use crate::config::RetryPolicy;
    use crate::testutil::{MemoryBackend, StubStore};
    use offline_replay_core::{ElementData, QualityMode, ShardStore, StorageBackend};
    use std::collections::HashSet;
    use std::time::Duration;

    fn dir() -> PathBuf {
        PathBuf::from("/logs/replay")
    }

    /// Backend with `n` complete checkpoints 1..=n and a store that serves
    /// them with add_count = suffix * 10
    fn seeded(n: u64) -> (Arc<MemoryBackend>, Arc<StubStore>) {
        let backend = MemoryBackend::new();
        let store = StubStore::new();
        for suffix in 1..=n {
            backend.add_checkpoint(&dir(), suffix, MIN_FILES_PER_CHECKPOINT);
            store.insert(suffix, suffix * 10);
        }
        (Arc::new(backend), Arc::new(store))
    }

    fn config(backend: &Arc<MemoryBackend>, store: &Arc<StubStore>) -> PoolConfig {
        let mut config = PoolConfig::new(
            dir(),
            store.clone() as Arc<dyn ShardStore>,
            backend.clone() as Arc<dyn StorageBackend>,
        );
        config.retry = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        };
        config
    }

    fn state_values(batch: &TransitionBatch) -> Vec<f32> {
        match batch.column("state").unwrap() {
            ElementData::F32(a) => a.iter().copied().collect(),
            other => panic!("unexpected dtype: {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_suffix_bypasses_discovery() {
        let (backend, store) = seeded(10);
        let mut config = config(&backend, &store);
        config.replay_suffix = Some(7);

        let pool = ReplayBufferPool::open(config).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().suffixes, vec![7]);
        assert_eq!(pool.add_count(), 70);
        // Discovery never ran
        assert_eq!(backend.list_calls(), 0);
    }

    #[tokio::test]
    async fn negative_suffix_fails_before_any_io() {
        let (backend, store) = seeded(3);
        let mut config = config(&backend, &store);
        config.replay_suffix = Some(-4);

        let err = ReplayBufferPool::open(config).await.unwrap_err();
        assert!(matches!(err, ReplayError::InvalidArgument(_)));
        assert_eq!(backend.list_calls(), 0);
        assert_eq!(store.load_attempts(), 0);
    }

    #[tokio::test]
    async fn poor_band_loads_only_lowest_suffixes() {
        let (backend, store) = seeded(10);
        let mut config = config(&backend, &store);
        config.quality_mode = QualityMode::Poor;
        config.initial_buffers = 2;

        let pool = ReplayBufferPool::open(config).await.unwrap();
        assert_eq!(pool.len(), 2);
        let loaded: HashSet<u64> = pool.stats().suffixes.into_iter().collect();
        assert!(loaded.is_subset(&HashSet::from([1, 2])));
    }

    #[tokio::test]
    async fn corrupt_candidate_is_dropped_and_add_count_is_max_of_rest() {
        let (backend, store) = seeded(3);
        store.mark_missing(2);
        let mut config = config(&backend, &store);
        config.initial_buffers = 3;

        let pool = ReplayBufferPool::open(config).await.unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stats().suffixes, vec![1, 3]);
        assert_eq!(pool.add_count(), 30);
    }

    #[tokio::test]
    async fn empty_directory_exhausts_bounded_retry() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_dir(&dir());
        let store = Arc::new(StubStore::new());
        let mut config = config(&backend, &store);
        config.retry = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };

        let err = ReplayBufferPool::open(config).await.unwrap_err();
        assert!(matches!(err, ReplayError::EmptyPool));
        assert_eq!(backend.list_calls(), 3);
    }

    #[tokio::test]
    async fn construction_retries_until_a_checkpoint_loads() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_checkpoint(&dir(), 1, MIN_FILES_PER_CHECKPOINT);
        let store = Arc::new(StubStore::new());
        store.mark_missing(1);

        let mut config = config(&backend, &store);
        config.retry = RetryPolicy {
            max_attempts: 50,
            delay: Duration::from_millis(5),
        };

        let store_for_writer = Arc::clone(&store);
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            store_for_writer.insert(1, 40);
        });

        let pool = ReplayBufferPool::open(config).await.unwrap();
        writer.await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.add_count(), 40);
    }

    #[tokio::test]
    async fn requesting_more_than_the_band_holds_is_fatal() {
        let (backend, store) = seeded(10);
        let mut config = config(&backend, &store);
        config.quality_mode = QualityMode::Poor;
        // Poor band of 10 suffixes holds 2
        config.initial_buffers = 3;

        let err = ReplayBufferPool::open(config).await.unwrap_err();
        assert!(matches!(err, ReplayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn explicit_indices_return_exactly_those_transitions() {
        let (backend, store) = seeded(10);
        let mut config = config(&backend, &store);
        config.replay_suffix = Some(7);

        let pool = ReplayBufferPool::open(config).await.unwrap();
        let batch = pool
            .sample_transition_batch(None, Some(&[3, 5]))
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(state_values(&batch), vec![7003.0, 7005.0]);
    }

    #[tokio::test]
    async fn omitting_indices_returns_requested_batch_size() {
        let (backend, store) = seeded(1);
        let pool = ReplayBufferPool::open(config(&backend, &store)).await.unwrap();
        let batch = pool.sample_transition_batch(Some(4), None).unwrap();
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn sampling_rotates_over_loaded_shards() {
        let (backend, store) = seeded(2);
        let mut config = config(&backend, &store);
        config.initial_buffers = 2;

        let pool = ReplayBufferPool::open(config).await.unwrap();
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let batch = pool.sample_transition_batch(Some(1), None).unwrap();
            match batch.column("suffix").unwrap() {
                ElementData::F32(a) => {
                    seen.insert(a.iter().next().copied().unwrap() as u64);
                }
                other => panic!("unexpected dtype: {other:?}"),
            }
        }
        assert_eq!(seen, HashSet::from([1, 2]));
    }

    #[tokio::test]
    async fn named_variants_reach_the_shard() {
        let (backend, store) = seeded(1);
        let pool = ReplayBufferPool::open(config(&backend, &store)).await.unwrap();

        let batch = pool.sample_transition_batch_bc(Some(2), None).unwrap();
        assert!(batch.column("bc").is_some());
        let batch = pool.sample_transition_batch_bcq(Some(2), None).unwrap();
        assert!(batch.column("bcq").is_some());
        let batch = pool.sample_transition_batch_ue(Some(2), None).unwrap();
        assert!(batch.column("ue").is_some());
        let batch = pool.sample_transition_batch(Some(2), None).unwrap();
        assert!(batch.column("bc").is_none());
    }

    #[tokio::test]
    async fn schema_comes_from_a_representative_shard() {
        let (backend, store) = seeded(1);
        let pool = ReplayBufferPool::open(config(&backend, &store)).await.unwrap();

        let elements = pool.transition_elements(None).unwrap();
        assert!(elements.iter().any(|e| e.name == "state"));
        let elements = pool
            .transition_elements(Some(SampleMode::UpperEnvelope))
            .unwrap();
        assert!(elements.iter().any(|e| e.name == "ue"));
    }

    #[tokio::test]
    async fn reload_replaces_the_shard_set_wholesale() {
        let (backend, store) = seeded(3);
        let pool = ReplayBufferPool::open(config(&backend, &store)).await.unwrap();
        assert_eq!(pool.len(), 1);

        pool.reload(3, LoadFlags::default()).await.unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.stats().suffixes, vec![1, 2, 3]);
        assert_eq!(pool.add_count(), 30);
    }

    #[tokio::test]
    async fn reload_with_zero_successes_keeps_the_previous_set() {
        let (backend, store) = seeded(2);
        let pool = ReplayBufferPool::open(config(&backend, &store)).await.unwrap();
        let before = pool.stats();

        store.mark_missing(1);
        store.mark_missing(2);
        let err = pool.reload(2, LoadFlags::default()).await.unwrap_err();
        assert!(matches!(err, ReplayError::EmptyPool));

        let after = pool.stats();
        assert_eq!(after, before);
        // The stale set still serves samples
        assert!(pool.sample_transition_batch(Some(1), None).is_ok());
    }

    #[tokio::test]
    async fn medium_band_is_stable_across_reloads() {
        let (backend, store) = seeded(20);
        let mut config = config(&backend, &store);
        config.quality_mode = QualityMode::Medium;
        config.initial_buffers = 4;

        let pool = ReplayBufferPool::open(config).await.unwrap();
        let mut seen: HashSet<u64> = pool.stats().suffixes.into_iter().collect();
        for _ in 0..10 {
            pool.reload(4, LoadFlags::default()).await.unwrap();
            seen.extend(pool.stats().suffixes);
        }
        // Every loaded suffix across reloads stays inside one frozen
        // 20%-of-20 subset
        assert!(seen.len() <= 4);
    }

    #[tokio::test]
    async fn add_and_save_are_no_ops() {
        let (backend, store) = seeded(1);
        let pool = ReplayBufferPool::open(config(&backend, &store)).await.unwrap();
        let before = pool.stats();

        pool.add(&TransitionBatch::new());
        pool.save(&dir(), 99);

        assert_eq!(pool.stats(), before);
    }
}
