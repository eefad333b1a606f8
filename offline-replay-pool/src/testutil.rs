//! Shared in-memory doubles for the storage and shard seams

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};

use offline_replay_core::{
    ElementData, ElementDtype, ElementSpec, LoadFlags, ReplayError, ReplayShard, Result,
    SampleMode, ShardStore, StorageBackend, TransitionBatch,
};

/// Install a test subscriber once; later calls are no-ops.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

const CHECKPOINT_FIELDS: [&str; 8] = [
    "observation",
    "action",
    "reward",
    "terminal",
    "add_count",
    "invalid_range",
    "return",
    "estimated_return",
];

/// Directory-listing backend over an in-memory map of file names
pub(crate) struct MemoryBackend {
    dirs: Mutex<HashMap<PathBuf, Vec<String>>>,
    list_calls: AtomicUsize,
}

impl MemoryBackend {
    pub(crate) fn new() -> Self {
        Self {
            dirs: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Register an empty directory so listing it succeeds
    pub(crate) fn add_dir(&self, dir: &Path) {
        self.dirs.lock().unwrap().entry(dir.to_path_buf()).or_default();
    }

    pub(crate) fn add_file(&self, dir: &Path, name: &str) {
        self.dirs
            .lock()
            .unwrap()
            .entry(dir.to_path_buf())
            .or_default()
            .push(name.to_string());
    }

    /// Add `file_count` per-field files for one checkpoint suffix
    pub(crate) fn add_checkpoint(&self, dir: &Path, suffix: u64, file_count: usize) {
        for field in CHECKPOINT_FIELDS.iter().take(file_count) {
            self.add_file(dir, &format!("{field}.{suffix}.gz"));
        }
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list(&self, dir: &Path) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.dirs.lock().unwrap().get(dir).cloned().ok_or_else(|| {
            ReplayError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such directory: {}", dir.display()),
            ))
        })
    }
}

/// Deterministic shard double.
///
/// Its `state` column encodes `suffix * 1000 + transition index`, so tests
/// can tell which shard served a batch and which transitions it returned.
pub(crate) struct StubShard {
    suffix: u64,
    add_count: u64,
    num_transitions: usize,
    samples: Arc<AtomicUsize>,
}

impl StubShard {
    fn base_elements() -> Vec<ElementSpec> {
        vec![
            ElementSpec::new("state", vec![], ElementDtype::F32),
            ElementSpec::new("action", vec![], ElementDtype::I32),
            ElementSpec::new("reward", vec![], ElementDtype::F32),
            ElementSpec::new("terminal", vec![], ElementDtype::U8),
        ]
    }
}

impl ReplayShard for StubShard {
    fn add_count(&self) -> u64 {
        self.add_count
    }

    fn transition_elements(&self, mode: Option<SampleMode>) -> Result<Vec<ElementSpec>> {
        let mut elements = Self::base_elements();
        if let Some(mode) = mode {
            if mode != SampleMode::Standard {
                elements.push(ElementSpec::new(mode.as_str(), vec![], ElementDtype::F32));
            }
        }
        Ok(elements)
    }

    fn sample_transition_batch(
        &self,
        batch_size: Option<usize>,
        indices: Option<&[usize]>,
        mode: SampleMode,
    ) -> Result<TransitionBatch> {
        self.samples.fetch_add(1, Ordering::SeqCst);

        let picked: Vec<usize> = match indices {
            Some(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= self.num_transitions) {
                    return Err(ReplayError::InvalidArgument(format!(
                        "index {bad} out of range for shard of {}",
                        self.num_transitions
                    )));
                }
                indices.to_vec()
            }
            None => (0..batch_size.unwrap_or(32).min(self.num_transitions)).collect(),
        };

        let states: Vec<f32> = picked
            .iter()
            .map(|&i| (self.suffix * 1000 + i as u64) as f32)
            .collect();
        let len = states.len();

        let mut batch = TransitionBatch::new();
        batch.push(
            "state",
            ElementData::F32(ArrayD::from_shape_vec(IxDyn(&[len]), states).unwrap()),
        );
        batch.push(
            "suffix",
            ElementData::F32(ArrayD::from_elem(IxDyn(&[len]), self.suffix as f32)),
        );
        if mode != SampleMode::Standard {
            batch.push(
                mode.as_str(),
                ElementData::F32(ArrayD::zeros(IxDyn(&[len]))),
            );
        }
        Ok(batch)
    }
}

/// Shard store double with scriptable per-suffix outcomes
pub(crate) struct StubStore {
    add_counts: Mutex<HashMap<u64, u64>>,
    missing: Mutex<HashSet<u64>>,
    broken: Mutex<HashSet<u64>>,
    seen_flags: Mutex<Vec<LoadFlags>>,
    load_attempts: AtomicUsize,
    samples: Arc<AtomicUsize>,
}

impl StubStore {
    pub(crate) fn new() -> Self {
        Self {
            add_counts: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            broken: Mutex::new(HashSet::new()),
            seen_flags: Mutex::new(Vec::new()),
            load_attempts: AtomicUsize::new(0),
            samples: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `suffix` loadable with the given insert counter
    pub(crate) fn insert(&self, suffix: u64, add_count: u64) {
        self.add_counts.lock().unwrap().insert(suffix, add_count);
        self.missing.lock().unwrap().remove(&suffix);
    }

    /// Make `suffix` fail with `NotFound`
    pub(crate) fn mark_missing(&self, suffix: u64) {
        self.add_counts.lock().unwrap().remove(&suffix);
        self.missing.lock().unwrap().insert(suffix);
    }

    /// Make `suffix` fail with a non-recoverable error
    pub(crate) fn mark_broken(&self, suffix: u64) {
        self.broken.lock().unwrap().insert(suffix);
    }

    pub(crate) fn seen_flags(&self) -> Vec<LoadFlags> {
        self.seen_flags.lock().unwrap().clone()
    }

    pub(crate) fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Total `sample_transition_batch` calls across every shard this store
    /// has handed out
    pub(crate) fn sample_calls(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardStore for StubStore {
    async fn load(&self, dir: &Path, suffix: u64, flags: &LoadFlags) -> Result<Arc<dyn ReplayShard>> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        self.seen_flags.lock().unwrap().push(flags.clone());

        if self.broken.lock().unwrap().contains(&suffix) {
            return Err(anyhow::anyhow!("checkpoint {suffix} is corrupt").into());
        }
        match self.add_counts.lock().unwrap().get(&suffix) {
            Some(&add_count) => Ok(Arc::new(StubShard {
                suffix,
                add_count,
                num_transitions: 100,
                samples: Arc::clone(&self.samples),
            })),
            None => Err(ReplayError::NotFound {
                dir: dir.to_path_buf(),
                suffix,
            }),
        }
    }
}
