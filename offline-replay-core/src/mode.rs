//! Quality and sampling mode selectors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReplayError;

/// Quality band used to choose which checkpoint suffixes are eligible for loading.
///
/// Checkpoint suffixes are a proxy for data quality: later checkpoints come
/// from a better-trained policy. Each band restricts the candidate pool to a
/// slice of the sorted suffix list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityMode {
    /// Every complete checkpoint is eligible
    #[default]
    All,
    /// The lowest 20% of suffixes by sort position
    Poor,
    /// The highest 20% of suffixes by sort position
    High,
    /// A random 20% subset, frozen for the lifetime of the selection policy
    Medium,
}

impl FromStr for QualityMode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "POOR" => Ok(Self::Poor),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            _ => Err(ReplayError::UnsupportedMode(s.to_string())),
        }
    }
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "ALL",
            Self::Poor => "POOR",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
        };
        write!(f, "{name}")
    }
}

/// Named batch variant forwarded to the shard when sampling.
///
/// Beyond the default uniform batch, shards can annotate batches for
/// behavior cloning, batch-constrained (off-policy-corrected) training, or a
/// return-conditioned upper-envelope objective. The variants are opaque to
/// the pool; it only forwards the name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    /// Plain uniform transition batch
    #[default]
    Standard,
    /// Batch annotated for behavior cloning
    #[serde(rename = "bc")]
    BehaviorCloning,
    /// Batch annotated for batch-constrained off-policy correction
    #[serde(rename = "bcq")]
    BatchConstrained,
    /// Batch annotated for the upper-envelope return objective
    #[serde(rename = "ue")]
    UpperEnvelope,
}

impl SampleMode {
    /// Short wire name understood by shard implementations
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::BehaviorCloning => "bc",
            Self::BatchConstrained => "bcq",
            Self::UpperEnvelope => "ue",
        }
    }
}

impl FromStr for SampleMode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "bc" => Ok(Self::BehaviorCloning),
            "bcq" => Ok(Self::BatchConstrained),
            "ue" => Ok(Self::UpperEnvelope),
            _ => Err(ReplayError::UnsupportedMode(s.to_string())),
        }
    }
}

impl fmt::Display for SampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
