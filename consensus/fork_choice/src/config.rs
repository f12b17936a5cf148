use proto_array::DEFAULT_PRUNE_THRESHOLD;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForkChoiceConfig {
    /// Pruning is skipped while fewer than this many nodes sit below the finalized block.
    pub prune_threshold: usize,
}

impl Default for ForkChoiceConfig {
    fn default() -> Self {
        Self {
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }
}
