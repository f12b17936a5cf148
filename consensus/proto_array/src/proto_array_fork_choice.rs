use crate::error::Error;
use crate::proto_array::ProtoArray;
use crate::ssz_container::SszContainer;
use serde::{Deserialize, Serialize};
use ssz::{Decode, Encode};
use ssz_derive::{Decode, Encode};
use std::collections::{HashMap, HashSet};
use types::{Epoch, Hash256, Slot};

pub const DEFAULT_PRUNE_THRESHOLD: usize = 256;

/// The latest vote of a single validator.
///
/// `next_root` is the most recent attestation target observed, `current_root` is the target
/// whose weight is currently applied to the tree. The two only converge in `compute_deltas`.
#[derive(Default, PartialEq, Clone, Debug, Encode, Decode)]
pub struct VoteTracker {
    pub(crate) current_root: Hash256,
    pub(crate) next_root: Hash256,
    pub(crate) next_epoch: Epoch,
}

/// A Vec-wrapper which will grow to match any request.
///
/// E.g., a `get` or `insert` to an out-of-bounds element will cause the Vec to grow (using
/// Default) to the smallest size required to fulfill the request.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct ElasticList<T>(pub Vec<T>);

impl<T> ElasticList<T>
where
    T: Default,
{
    fn ensure(&mut self, i: usize) {
        if self.0.len() <= i {
            self.0.resize_with(i + 1, Default::default);
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut T {
        self.ensure(i);
        &mut self.0[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.iter_mut()
    }
}

/// A block that is to be applied to the fork choice.
///
/// A simplified version of `types::BeaconBlock`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub slot: Slot,
    pub root: Hash256,
    /// Only `None` for the anchor block.
    pub parent_root: Option<Hash256>,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
}

#[derive(PartialEq, Debug)]
pub struct ProtoArrayForkChoice {
    pub(crate) proto_array: ProtoArray,
    pub(crate) votes: ElasticList<VoteTracker>,
    pub(crate) balances: Vec<u64>,
}

impl ProtoArrayForkChoice {
    /// Create a new fork choice rooted at the given anchor (usually the finalized block).
    pub fn new(
        anchor_slot: Slot,
        anchor_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<Self, Error> {
        let mut proto_array =
            ProtoArray::new(DEFAULT_PRUNE_THRESHOLD, justified_epoch, finalized_epoch);

        proto_array.on_block(Block {
            slot: anchor_slot,
            root: anchor_root,
            parent_root: None,
            justified_epoch,
            finalized_epoch,
        })?;

        Ok(Self {
            proto_array,
            votes: ElasticList::default(),
            balances: vec![],
        })
    }

    /// Record the latest vote of `validator_index`.
    ///
    /// Votes that are not newer than the one already known are ignored. The vote is not reflected
    /// in block weights until the next call to `Self::find_head`.
    pub fn process_attestation(
        &mut self,
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), Error> {
        let vote = self.votes.get_mut(validator_index);

        if target_epoch > vote.next_epoch || *vote == VoteTracker::default() {
            vote.next_root = block_root;
            vote.next_epoch = target_epoch;
        }

        Ok(())
    }

    pub fn process_block(&mut self, block: Block) -> Result<(), Error> {
        self.proto_array.on_block(block)
    }

    /// Apply all outstanding votes and balance changes to the tree, then return the head as seen
    /// from `justified_root`.
    pub fn find_head(
        &mut self,
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: &[u64],
    ) -> Result<Hash256, Error> {
        let deltas = compute_deltas(
            &self.proto_array.indices,
            &mut self.votes,
            &self.balances,
            justified_state_balances,
        )?;

        self.proto_array
            .apply_score_changes(deltas, justified_epoch, finalized_epoch)?;

        self.balances = justified_state_balances.to_vec();

        self.proto_array.find_head(&justified_root)
    }

    /// Prune the tree below `finalized_root`, if enough nodes have accumulated.
    ///
    /// Votes pointing at pruned blocks are reset: the weight they carried left the tree along
    /// with those blocks. Returns the number of pruned nodes.
    pub fn maybe_prune(&mut self, finalized_root: Hash256) -> Result<usize, Error> {
        let removed = self.proto_array.maybe_prune(finalized_root)?;

        if removed.is_empty() {
            return Ok(0);
        }

        let removed: HashSet<Hash256> = removed.into_iter().collect();
        for vote in self.votes.iter_mut() {
            if removed.contains(&vote.current_root) {
                vote.current_root = Hash256::zero();
            }
            if removed.contains(&vote.next_root) {
                vote.next_root = Hash256::zero();
            }
        }

        Ok(removed.len())
    }

    pub fn set_prune_threshold(&mut self, prune_threshold: usize) {
        self.proto_array.prune_threshold = prune_threshold;
    }

    pub fn prune_threshold(&self) -> usize {
        self.proto_array.prune_threshold
    }

    pub fn len(&self) -> usize {
        self.proto_array.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proto_array.nodes.is_empty()
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.indices.contains_key(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<Block> {
        let node = self.proto_array.get_node(block_root)?;
        let parent_root = node
            .parent
            .and_then(|i| self.proto_array.nodes.get(i))
            .map(|parent| parent.root);

        Some(Block {
            slot: node.slot,
            root: node.root,
            parent_root,
            justified_epoch: node.justified_epoch,
            finalized_epoch: node.finalized_epoch,
        })
    }

    pub fn block_slot(&self, block_root: &Hash256) -> Option<Slot> {
        self.proto_array.get_node(block_root).map(|node| node.slot)
    }

    /// Returns the weight of the given block as of the last call to `Self::find_head`.
    pub fn get_weight(&self, block_root: &Hash256) -> Option<u64> {
        self.proto_array.get_node(block_root).map(|node| node.weight)
    }

    /// See `ProtoArray::is_descendant`.
    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.proto_array
            .is_descendant(ancestor_root, descendant_root)
    }

    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        let vote = self.votes.0.get(validator_index)?;

        // A zero `next_root` is either an unused slot or a vote retired by pruning.
        if vote.next_root == Hash256::zero() {
            None
        } else {
            Some((vote.next_root, vote.next_epoch))
        }
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        SszContainer::from(self).as_ssz_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let container = SszContainer::from_ssz_bytes(bytes)
            .map_err(|e| Error::InvalidSszBytes(format!("{:?}", e)))?;
        Self::try_from(container)
    }

    /// Returns a reference to the core `ProtoArray` struct.
    ///
    /// Should only be used when encoding/decoding during troubleshooting.
    pub fn core_proto_array(&self) -> &ProtoArray {
        &self.proto_array
    }
}

/// Returns a list of `deltas`, where there is one delta for each of the indices in
/// `0..indices.len()`.
///
/// The deltas are formed by a change between `old_balances` and `new_balances`, and/or a change of
/// vote in `votes`. On success every vote has `current_root == next_root`.
///
/// ## Errors
///
/// Nothing in `votes` is modified when an error is returned.
///
/// - `UnknownVoteTarget` if some non-zero `next_root` is not a key in `indices`. The call can be
///   repeated once the block arrives.
/// - `BalanceOutOfRange` if a balance that needs to be moved does not fit in an `i64`.
/// - `AppliedVoteUnknown` if some non-zero `current_root` is not a key in `indices`.
/// - `InvalidNodeDelta` if a value in `indices` is not below `indices.len()`.
pub fn compute_deltas(
    indices: &HashMap<Hash256, usize>,
    votes: &mut ElasticList<VoteTracker>,
    old_balances: &[u64],
    new_balances: &[u64],
) -> Result<Vec<i64>, Error> {
    let mut deltas = vec![0_i64; indices.len()];

    for (val_index, vote) in votes.iter().enumerate() {
        // The zero hash means "no vote", a validator that never voted is skipped.
        if vote.current_root.is_zero() && vote.next_root.is_zero() {
            continue;
        }

        // Validators missing from a balances list (e.g. not yet on-boarded in that state) have a
        // balance of zero.
        let old_balance = old_balances.get(val_index).copied().unwrap_or(0);
        let new_balance = new_balances.get(val_index).copied().unwrap_or(0);

        if vote.current_root == vote.next_root && old_balance == new_balance {
            continue;
        }

        let as_delta = |balance: u64| {
            i64::try_from(balance).map_err(|_| Error::BalanceOutOfRange {
                validator_index: val_index,
                balance,
            })
        };

        // Pruning retires votes for removed blocks, so an applied root is always indexed.
        if !vote.current_root.is_zero() {
            let current_delta_index = indices.get(&vote.current_root).copied().ok_or(
                Error::AppliedVoteUnknown {
                    validator_index: val_index,
                    block_root: vote.current_root,
                },
            )?;
            let delta = deltas
                .get_mut(current_delta_index)
                .ok_or(Error::InvalidNodeDelta(current_delta_index))?;
            *delta = delta
                .checked_sub(as_delta(old_balance)?)
                .ok_or(Error::DeltaOverflow(current_delta_index))?;
        }

        if !vote.next_root.is_zero() {
            let next_delta_index = indices.get(&vote.next_root).copied().ok_or(
                Error::UnknownVoteTarget {
                    validator_index: val_index,
                    block_root: vote.next_root,
                },
            )?;
            let delta = deltas
                .get_mut(next_delta_index)
                .ok_or(Error::InvalidNodeDelta(next_delta_index))?;
            *delta = delta
                .checked_add(as_delta(new_balance)?)
                .ok_or(Error::DeltaOverflow(next_delta_index))?;
        }
    }

    for vote in votes.iter_mut() {
        vote.current_root = vote.next_root;
    }

    Ok(deltas)
}

#[cfg(test)]
mod test_compute_deltas {
    use super::*;

    const BALANCE: u64 = 42;

    /// Block root for test index `i`, offset by one to stay clear of the zero hash.
    fn hash_from_index(i: usize) -> Hash256 {
        Hash256::from_low_u64_be(i as u64 + 1)
    }

    fn vote(current_root: Hash256, next_root: Hash256) -> VoteTracker {
        VoteTracker {
            current_root,
            next_root,
            next_epoch: Epoch::new(0),
        }
    }

    /// `block_count` blocks, the n'th block has index n.
    fn indices(block_count: usize) -> HashMap<Hash256, usize> {
        (0..block_count).map(|i| (hash_from_index(i), i)).collect()
    }

    fn assert_votes_applied(votes: &ElasticList<VoteTracker>) {
        for vote in votes.iter() {
            assert_eq!(
                vote.current_root, vote.next_root,
                "the vote should have been applied"
            );
        }
    }

    #[test]
    fn no_votes_no_deltas() {
        let mut votes = ElasticList(vec![vote(Hash256::zero(), Hash256::zero()); 16]);

        let deltas = compute_deltas(&indices(16), &mut votes, &[BALANCE; 16], &[BALANCE; 16])
            .expect("should compute deltas");

        assert_eq!(deltas, vec![0; 16]);
        assert_votes_applied(&votes);
    }

    #[test]
    fn everyone_votes_for_one_block() {
        let mut votes = ElasticList(vec![vote(Hash256::zero(), hash_from_index(0)); 16]);

        let deltas = compute_deltas(&indices(16), &mut votes, &[BALANCE; 16], &[BALANCE; 16])
            .expect("should compute deltas");

        assert_eq!(deltas[0], BALANCE as i64 * 16);
        assert!(deltas[1..].iter().all(|delta| *delta == 0));
        assert_votes_applied(&votes);
    }

    #[test]
    fn everyone_votes_for_their_own_block() {
        let mut votes = ElasticList(
            (0..16)
                .map(|i| vote(Hash256::zero(), hash_from_index(i)))
                .collect(),
        );

        let deltas = compute_deltas(&indices(16), &mut votes, &[BALANCE; 16], &[BALANCE; 16])
            .expect("should compute deltas");

        assert_eq!(deltas, vec![BALANCE as i64; 16]);
        assert_votes_applied(&votes);
    }

    #[test]
    fn votes_move_between_blocks() {
        let mut votes = ElasticList(vec![vote(hash_from_index(0), hash_from_index(1)); 16]);

        let deltas = compute_deltas(&indices(16), &mut votes, &[BALANCE; 16], &[BALANCE; 16])
            .expect("should compute deltas");

        let total = BALANCE as i64 * 16;
        assert_eq!(deltas[0], -total);
        assert_eq!(deltas[1], total);
        assert!(deltas[2..].iter().all(|delta| *delta == 0));
        assert_votes_applied(&votes);
    }

    #[test]
    fn applied_votes_are_not_counted_twice() {
        let mut votes = ElasticList(vec![vote(Hash256::zero(), hash_from_index(3)); 4]);

        compute_deltas(&indices(4), &mut votes, &[], &[BALANCE; 4]).unwrap();
        let deltas = compute_deltas(&indices(4), &mut votes, &[BALANCE; 4], &[BALANCE; 4]).unwrap();

        assert_eq!(deltas, vec![0; 4]);
    }

    #[test]
    fn vote_withdrawn_to_zero_hash() {
        let mut votes = ElasticList(vec![vote(hash_from_index(0), Hash256::zero()); 2]);

        let deltas = compute_deltas(&indices(1), &mut votes, &[BALANCE; 2], &[BALANCE; 2])
            .expect("should compute deltas");

        assert_eq!(deltas, vec![-(BALANCE as i64) * 2]);
        assert_votes_applied(&votes);
    }

    #[test]
    fn unknown_target_fails_without_side_effects() {
        let mut votes = ElasticList(vec![
            vote(Hash256::zero(), hash_from_index(0)),
            vote(hash_from_index(0), Hash256::from_low_u64_be(1337)),
        ]);
        let before = votes.clone();

        assert_eq!(
            compute_deltas(&indices(1), &mut votes, &[BALANCE; 2], &[BALANCE; 2]),
            Err(Error::UnknownVoteTarget {
                validator_index: 1,
                block_root: Hash256::from_low_u64_be(1337),
            })
        );
        assert_eq!(votes, before, "no vote should have been applied");
    }

    #[test]
    fn balance_beyond_i64_is_rejected() {
        let mut votes = ElasticList(vec![vote(Hash256::zero(), hash_from_index(0))]);
        let before = votes.clone();

        assert_eq!(
            compute_deltas(&indices(1), &mut votes, &[], &[1 << 63]),
            Err(Error::BalanceOutOfRange {
                validator_index: 0,
                balance: 1 << 63,
            })
        );
        assert_eq!(votes, before);

        let deltas = compute_deltas(&indices(1), &mut votes, &[], &[i64::MAX as u64]).unwrap();
        assert_eq!(deltas, vec![i64::MAX]);
    }

    #[test]
    fn unindexed_applied_vote_is_an_error() {
        let mut votes = ElasticList(vec![vote(
            Hash256::from_low_u64_be(1337),
            hash_from_index(0),
        )]);
        let before = votes.clone();

        let result = compute_deltas(&indices(1), &mut votes, &[BALANCE], &[BALANCE]);

        assert_eq!(
            result,
            Err(Error::AppliedVoteUnknown {
                validator_index: 0,
                block_root: Hash256::from_low_u64_be(1337),
            })
        );
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(votes, before);
    }

    #[test]
    fn balances_change_without_vote_change() {
        const NEW_BALANCE: u64 = BALANCE * 2;

        let mut votes = ElasticList(vec![vote(hash_from_index(0), hash_from_index(0)); 16]);

        let deltas = compute_deltas(
            &indices(16),
            &mut votes,
            &[BALANCE; 16],
            &[NEW_BALANCE; 16],
        )
        .expect("should compute deltas");

        assert_eq!(deltas[0], (NEW_BALANCE - BALANCE) as i64 * 16);
        assert!(deltas[1..].iter().all(|delta| *delta == 0));
    }

    #[test]
    fn balances_and_votes_change_together() {
        const NEW_BALANCE: u64 = BALANCE * 2;

        let mut votes = ElasticList(vec![vote(hash_from_index(0), hash_from_index(1)); 16]);

        let deltas = compute_deltas(
            &indices(16),
            &mut votes,
            &[BALANCE; 16],
            &[NEW_BALANCE; 16],
        )
        .expect("should compute deltas");

        assert_eq!(deltas[0], -(BALANCE as i64) * 16);
        assert_eq!(deltas[1], NEW_BALANCE as i64 * 16);
        assert!(deltas[2..].iter().all(|delta| *delta == 0));
        assert_votes_applied(&votes);
    }

    #[test]
    fn validator_appears() {
        // Both validators move from block 0 to block 1 but only the first had a balance before.
        let mut votes = ElasticList(vec![vote(hash_from_index(0), hash_from_index(1)); 2]);

        let deltas = compute_deltas(&indices(2), &mut votes, &[BALANCE; 1], &[BALANCE; 2])
            .expect("should compute deltas");

        assert_eq!(deltas, vec![-(BALANCE as i64), 2 * BALANCE as i64]);
        assert_votes_applied(&votes);
    }

    #[test]
    fn validator_disappears() {
        // Both validators move from block 0 to block 1 but only the first has a balance after.
        let mut votes = ElasticList(vec![vote(hash_from_index(0), hash_from_index(1)); 2]);

        let deltas = compute_deltas(&indices(2), &mut votes, &[BALANCE; 2], &[BALANCE; 1])
            .expect("should compute deltas");

        assert_eq!(deltas, vec![-2 * BALANCE as i64, BALANCE as i64]);
        assert_votes_applied(&votes);
    }
}
