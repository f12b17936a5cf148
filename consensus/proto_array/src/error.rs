use types::{Epoch, Hash256};

#[derive(Clone, PartialEq, Debug)]
pub enum Error {
    /// A block was supplied with a parent that has not been imported.
    ParentUnknown {
        block_root: Hash256,
        parent_root: Hash256,
    },
    /// A parentless block was supplied after the anchor was already set.
    MissingParentRoot(Hash256),
    /// A validator's latest vote references a block that is not in the tree.
    UnknownVoteTarget {
        validator_index: usize,
        block_root: Hash256,
    },
    /// A balance that does not fit in a signed delta.
    BalanceOutOfRange {
        validator_index: usize,
        balance: u64,
    },
    /// A vote already folded into the weights references a block that is not in the tree.
    AppliedVoteUnknown {
        validator_index: usize,
        block_root: Hash256,
    },
    JustifiedNodeUnknown(Hash256),
    PruneTargetUnknown(Hash256),
    BestNodeNotViableForHead(Box<InvalidBestNodeInfo>),
    DeltaOverflow(usize),
    InvalidNodeIndex(usize),
    InvalidJustifiedIndex(usize),
    InvalidBestDescendant(usize),
    InvalidParentDelta(usize),
    InvalidNodeDelta(usize),
    IndexOverflow(&'static str),
    InvalidDeltaLen {
        deltas: usize,
        indices: usize,
    },
    InvalidIndices {
        nodes: usize,
        indices: usize,
    },
    InvalidSszBytes(String),
}

impl Error {
    /// Returns `true` if the error indicates corrupted internal bookkeeping rather than a caller
    /// that is ahead of (or behind) the blocks known to fork choice.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DeltaOverflow(_)
                | Error::AppliedVoteUnknown { .. }
                | Error::InvalidNodeIndex(_)
                | Error::InvalidJustifiedIndex(_)
                | Error::InvalidBestDescendant(_)
                | Error::InvalidParentDelta(_)
                | Error::InvalidNodeDelta(_)
                | Error::IndexOverflow(_)
                | Error::InvalidDeltaLen { .. }
        )
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct InvalidBestNodeInfo {
    pub start_root: Hash256,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub head_root: Hash256,
    pub head_justified_epoch: Epoch,
    pub head_finalized_epoch: Epoch,
}
