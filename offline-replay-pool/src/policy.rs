//! Quality-band selection over complete checkpoint suffixes

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use tracing::info;

use offline_replay_core::{QualityMode, ReplayError, Result};

/// Draws load candidates from a quality band of the sorted suffix list.
///
/// `All`, `Poor` and `High` recompute their band from the catalog on every
/// call. `Medium` freezes a random 20% subset of the first catalog it sees
/// and draws from that same subset for the lifetime of this policy instance,
/// so the medium-quality sampling universe stays stable across reloads.
pub struct SelectionPolicy {
    mode: QualityMode,
    /// Frozen subset backing the MEDIUM band; initialized exactly once
    medium_pool: OnceLock<Vec<u64>>,
}

impl SelectionPolicy {
    /// Create a policy for the given quality band
    #[must_use]
    pub fn new(mode: QualityMode) -> Self {
        Self {
            mode,
            medium_pool: OnceLock::new(),
        }
    }

    /// Quality band this policy selects from
    #[must_use]
    pub fn mode(&self) -> QualityMode {
        self.mode
    }

    /// Suffixes eligible under this policy's band.
    ///
    /// `suffixes` must be sorted ascending; band boundaries are positional.
    pub fn candidate_pool(&self, suffixes: &[u64]) -> Vec<u64> {
        let n = suffixes.len();
        let band = n / 5;
        match self.mode {
            QualityMode::All => suffixes.to_vec(),
            QualityMode::Poor => suffixes[..band].to_vec(),
            QualityMode::High => suffixes[n - band..].to_vec(),
            QualityMode::Medium => self.frozen_medium_pool(suffixes).to_vec(),
        }
    }

    /// Draw `k` suffixes without replacement from the candidate pool.
    ///
    /// Fails with `InvalidArgument` when `k` exceeds the pool size; the
    /// request is never silently clamped.
    pub fn draw(&self, suffixes: &[u64], k: usize) -> Result<Vec<u64>> {
        let pool = self.candidate_pool(suffixes);
        if k > pool.len() {
            return Err(ReplayError::InvalidArgument(format!(
                "requested {k} buffers but the {} candidate pool holds {}",
                self.mode,
                pool.len()
            )));
        }

        let mut rng = rand::thread_rng();
        let chosen: Vec<u64> = pool.choose_multiple(&mut rng, k).copied().collect();
        info!(mode = %self.mode, ?chosen, "selected checkpoint suffixes");
        Ok(chosen)
    }

    fn frozen_medium_pool(&self, suffixes: &[u64]) -> &[u64] {
        self.medium_pool.get_or_init(|| {
            let mut rng = rand::thread_rng();
            let mut pool: Vec<u64> = suffixes
                .choose_multiple(&mut rng, suffixes.len() / 5)
                .copied()
                .collect();
            pool.sort_unstable();
            pool
        })
    }
}
