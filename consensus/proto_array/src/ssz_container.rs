use crate::{
    proto_array::{ProtoArray, ProtoNode},
    proto_array_fork_choice::{ElasticList, ProtoArrayForkChoice, VoteTracker},
    Error,
};
use ssz_derive::{Decode, Encode};
use std::collections::HashMap;
use types::{Epoch, Hash256};

/// The byte layout a storage collaborator persists for `ProtoArrayForkChoice`.
#[derive(Encode, Decode)]
pub struct SszContainer {
    pub votes: Vec<VoteTracker>,
    pub balances: Vec<u64>,
    pub prune_threshold: usize,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub nodes: Vec<ProtoNode>,
    pub indices: Vec<(Hash256, usize)>,
}

impl From<&ProtoArrayForkChoice> for SszContainer {
    fn from(from: &ProtoArrayForkChoice) -> Self {
        let proto_array = &from.proto_array;

        Self {
            votes: from.votes.0.clone(),
            balances: from.balances.clone(),
            prune_threshold: proto_array.prune_threshold,
            justified_epoch: proto_array.justified_epoch,
            finalized_epoch: proto_array.finalized_epoch,
            nodes: proto_array.nodes.clone(),
            indices: proto_array.indices.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}

impl TryFrom<SszContainer> for ProtoArrayForkChoice {
    type Error = Error;

    fn try_from(from: SszContainer) -> Result<Self, Error> {
        let indices = from.indices.into_iter().collect::<HashMap<_, _>>();

        // The map must be a bijection over the nodes or every index-based walk is suspect.
        let is_bijection = indices.len() == from.nodes.len()
            && indices.iter().all(|(root, index)| {
                from.nodes
                    .get(*index)
                    .map_or(false, |node| node.root == *root)
            });
        if !is_bijection {
            return Err(Error::InvalidIndices {
                nodes: from.nodes.len(),
                indices: indices.len(),
            });
        }

        // Applied votes carry weight inside the tree, so their blocks must be present.
        let unknown_applied_vote = from.votes.iter().enumerate().find(|(_, vote)| {
            !vote.current_root.is_zero() && !indices.contains_key(&vote.current_root)
        });
        if let Some((validator_index, vote)) = unknown_applied_vote {
            return Err(Error::AppliedVoteUnknown {
                validator_index,
                block_root: vote.current_root,
            });
        }

        let proto_array = ProtoArray {
            prune_threshold: from.prune_threshold,
            justified_epoch: from.justified_epoch,
            finalized_epoch: from.finalized_epoch,
            nodes: from.nodes,
            indices,
        };

        Ok(Self {
            proto_array,
            votes: ElasticList(from.votes),
            balances: from.balances,
        })
    }
}
