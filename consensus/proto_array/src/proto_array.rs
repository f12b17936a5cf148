use crate::error::{Error, InvalidBestNodeInfo};
use crate::Block;
use serde::{Deserialize, Serialize};
use ssz::four_byte_option_impl;
use ssz_derive::{Decode, Encode};
use std::collections::HashMap;
use types::{Epoch, Hash256, Slot, GENESIS_EPOCH};

// `Option<usize>` links are persisted with a four byte union selector.
four_byte_option_impl!(four_byte_option_usize, usize);

/// A block in the tree. All links are indices into `ProtoArray::nodes`.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct ProtoNode {
    pub slot: Slot,
    pub root: Hash256,
    /// `None` for the anchor and for nodes whose parent has been pruned.
    #[ssz(with = "four_byte_option_usize")]
    pub parent: Option<usize>,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    /// Total balance of the applied votes for this node or any of its descendants.
    pub weight: u64,
    #[ssz(with = "four_byte_option_usize")]
    pub best_child: Option<usize>,
    /// Head of the subtree below this node, `None` when nothing below it is viable.
    #[ssz(with = "four_byte_option_usize")]
    pub best_descendant: Option<usize>,
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct ProtoArray {
    /// Minimum number of nodes before the finalized node for `maybe_prune` to do anything.
    pub prune_threshold: usize,
    /// Checkpoints of the last `apply_score_changes`, viability is judged against them.
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    /// Insertion ordered, so every parent sits at a lower index than its children.
    pub nodes: Vec<ProtoNode>,
    pub indices: HashMap<Hash256, usize>,
}

impl ProtoArray {
    pub fn new(prune_threshold: usize, justified_epoch: Epoch, finalized_epoch: Epoch) -> Self {
        Self {
            prune_threshold,
            justified_epoch,
            finalized_epoch,
            nodes: vec![],
            indices: HashMap::new(),
        }
    }

    /// Adds `deltas[i]` to node `i` and all of its ancestors, then re-evaluates every
    /// parent/child pair against the new checkpoints.
    ///
    /// A reverse walk over `nodes` finishes a whole subtree before reaching its root, so each
    /// node's delta is complete by the time it is folded into the parent.
    pub fn apply_score_changes(
        &mut self,
        mut deltas: Vec<i64>,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    ) -> Result<(), Error> {
        if deltas.len() != self.indices.len() {
            return Err(Error::InvalidDeltaLen {
                deltas: deltas.len(),
                indices: self.indices.len(),
            });
        }

        self.justified_epoch = justified_epoch;
        self.finalized_epoch = finalized_epoch;

        for index in (0..self.nodes.len()).rev() {
            let delta = *deltas.get(index).ok_or(Error::InvalidNodeDelta(index))?;
            let node = self
                .nodes
                .get_mut(index)
                .ok_or(Error::InvalidNodeIndex(index))?;

            // Going below zero means some balance was removed twice.
            node.weight = node
                .weight
                .checked_add_signed(delta)
                .ok_or(Error::DeltaOverflow(index))?;

            if let Some(parent) = node.parent {
                let parent_delta = deltas
                    .get_mut(parent)
                    .ok_or(Error::InvalidParentDelta(parent))?;
                *parent_delta = parent_delta
                    .checked_add(delta)
                    .ok_or(Error::DeltaOverflow(parent))?;
            }
        }

        // Children are only compared once every weight is final.
        for index in (0..self.nodes.len()).rev() {
            let parent = self
                .nodes
                .get(index)
                .ok_or(Error::InvalidNodeIndex(index))?
                .parent;

            if let Some(parent) = parent {
                self.maybe_update_best_child_and_descendant(parent, index)?;
            }
        }

        Ok(())
    }

    /// Appends `block` as a new leaf. A root that is already known is ignored.
    ///
    /// Only the first block may come without a parent. The leaf is offered to its parent right
    /// away, so it can be returned as head before the next score update.
    pub fn on_block(&mut self, block: Block) -> Result<(), Error> {
        if self.indices.contains_key(&block.root) {
            return Ok(());
        }

        let parent = match block.parent_root {
            Some(parent_root) => Some(self.indices.get(&parent_root).copied().ok_or(
                Error::ParentUnknown {
                    block_root: block.root,
                    parent_root,
                },
            )?),
            None if self.nodes.is_empty() => None,
            None => return Err(Error::MissingParentRoot(block.root)),
        };

        let node_index = self.nodes.len();

        self.indices.insert(block.root, node_index);
        self.nodes.push(ProtoNode {
            slot: block.slot,
            root: block.root,
            parent,
            justified_epoch: block.justified_epoch,
            finalized_epoch: block.finalized_epoch,
            weight: 0,
            best_child: None,
            best_descendant: None,
        });

        if let Some(parent_index) = parent {
            self.maybe_update_best_child_and_descendant(parent_index, node_index)?;
        }

        Ok(())
    }

    /// Returns the head of the subtree rooted at `justified_root`.
    ///
    /// Only follows the best-descendant links, which reflect the last `apply_score_changes`
    /// and any leaves added since.
    pub fn find_head(&self, justified_root: &Hash256) -> Result<Hash256, Error> {
        let justified_index = *self
            .indices
            .get(justified_root)
            .ok_or(Error::JustifiedNodeUnknown(*justified_root))?;
        let justified_node = self
            .nodes
            .get(justified_index)
            .ok_or(Error::InvalidJustifiedIndex(justified_index))?;

        let head_index = justified_node.best_descendant.unwrap_or(justified_index);
        let head = self
            .nodes
            .get(head_index)
            .ok_or(Error::InvalidBestDescendant(head_index))?;

        if self.node_is_viable_for_head(head) {
            Ok(head.root)
        } else {
            Err(Error::BestNodeNotViableForHead(Box::new(
                InvalidBestNodeInfo {
                    start_root: *justified_root,
                    justified_epoch: self.justified_epoch,
                    finalized_epoch: self.finalized_epoch,
                    head_root: head.root,
                    head_justified_epoch: head.justified_epoch,
                    head_finalized_epoch: head.finalized_epoch,
                },
            )))
        }
    }

    /// Drops every node stored before `finalized_root` once at least `prune_threshold` of them
    /// have built up, returning their roots in storage order.
    ///
    /// The finalized node moves to index zero. Later nodes whose parent was dropped (branches
    /// that forked off before it) stay in the tree without a parent.
    pub fn maybe_prune(&mut self, finalized_root: Hash256) -> Result<Vec<Hash256>, Error> {
        let finalized_index = *self
            .indices
            .get(&finalized_root)
            .ok_or(Error::PruneTargetUnknown(finalized_root))?;

        if finalized_index < self.prune_threshold {
            return Ok(vec![]);
        }
        if finalized_index >= self.nodes.len() {
            return Err(Error::InvalidNodeIndex(finalized_index));
        }

        let removed = self
            .nodes
            .drain(..finalized_index)
            .map(|node| node.root)
            .collect::<Vec<_>>();

        let rebase = |index: usize, link: &'static str| {
            index
                .checked_sub(finalized_index)
                .ok_or(Error::IndexOverflow(link))
        };
        for node in self.nodes.iter_mut() {
            node.parent = node
                .parent
                .and_then(|parent| parent.checked_sub(finalized_index));
            node.best_child = node
                .best_child
                .map(|index| rebase(index, "best_child"))
                .transpose()?;
            node.best_descendant = node
                .best_descendant
                .map(|index| rebase(index, "best_descendant"))
                .transpose()?;
        }

        self.indices = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.root, index))
            .collect();

        Ok(removed)
    }

    /// Offers the node at `child_index` to its parent as best child.
    ///
    /// Children that lead to a viable head rank above those that do not, then the heavier child
    /// ranks higher, then the greater root. A best child that stops leading to a viable head is
    /// cleared and the parent waits for another child to be offered.
    fn maybe_update_best_child_and_descendant(
        &mut self,
        parent_index: usize,
        child_index: usize,
    ) -> Result<(), Error> {
        let child = self
            .nodes
            .get(child_index)
            .ok_or(Error::InvalidNodeIndex(child_index))?;
        let parent = self
            .nodes
            .get(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;

        let child_leads_to_head = self.node_leads_to_viable_head(child)?;
        let via_child = (
            Some(child_index),
            Some(child.best_descendant.unwrap_or(child_index)),
        );
        let unchanged = (parent.best_child, parent.best_descendant);

        let (best_child, best_descendant) = match parent.best_child {
            Some(current) if current == child_index => {
                if child_leads_to_head {
                    via_child
                } else {
                    (None, None)
                }
            }
            Some(current) => {
                let current_node = self
                    .nodes
                    .get(current)
                    .ok_or(Error::InvalidNodeIndex(current))?;
                let current_leads_to_head = self.node_leads_to_viable_head(current_node)?;
                let child_ranks_higher = match (child_leads_to_head, current_leads_to_head) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => {
                        (child.weight, child.root) >= (current_node.weight, current_node.root)
                    }
                };
                if child_ranks_higher {
                    via_child
                } else {
                    unchanged
                }
            }
            None if child_leads_to_head => via_child,
            None => unchanged,
        };

        let parent = self
            .nodes
            .get_mut(parent_index)
            .ok_or(Error::InvalidNodeIndex(parent_index))?;
        parent.best_child = best_child;
        parent.best_descendant = best_descendant;

        Ok(())
    }

    fn node_leads_to_viable_head(&self, node: &ProtoNode) -> Result<bool, Error> {
        if self.node_is_viable_for_head(node) {
            return Ok(true);
        }

        match node.best_descendant {
            Some(index) => self
                .nodes
                .get(index)
                .map(|descendant| self.node_is_viable_for_head(descendant))
                .ok_or(Error::InvalidBestDescendant(index)),
            None => Ok(false),
        }
    }

    /// A node may only be head if its epochs equal the checkpoints of the last score update.
    /// A checkpoint at the genesis epoch places no constraint on the matching node epoch.
    pub fn node_is_viable_for_head(&self, node: &ProtoNode) -> bool {
        let accepts =
            |checkpoint: Epoch, epoch: Epoch| checkpoint == GENESIS_EPOCH || checkpoint == epoch;

        accepts(self.justified_epoch, node.justified_epoch)
            && accepts(self.finalized_epoch, node.finalized_epoch)
    }

    pub fn get_node(&self, block_root: &Hash256) -> Option<&ProtoNode> {
        self.indices
            .get(block_root)
            .and_then(|index| self.nodes.get(*index))
    }

    /// Walks from `block_root` up to the oldest retained ancestor, starting with `block_root`.
    pub fn ancestors(&self, block_root: &Hash256) -> Ancestors<'_> {
        Ancestors {
            proto_array: self,
            next: self.indices.get(block_root).copied(),
        }
    }

    /// `true` if `ancestor_root` is `descendant_root` itself or lies on its chain. Unknown roots
    /// are never related.
    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        let ancestor_slot = match self.get_node(&ancestor_root) {
            Some(ancestor) => ancestor.slot,
            None => return false,
        };

        self.ancestors(&descendant_root)
            .take_while(|node| node.slot >= ancestor_slot)
            .any(|node| node.root == ancestor_root)
    }
}

pub struct Ancestors<'a> {
    proto_array: &'a ProtoArray,
    next: Option<usize>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ProtoNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.proto_array.nodes.get(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(i: u64) -> Hash256 {
        Hash256::from_low_u64_be(i + 1)
    }

    fn block(slot: u64, i: u64, parent: Option<u64>) -> Block {
        Block {
            slot: Slot::new(slot),
            root: root(i),
            parent_root: parent.map(root),
            justified_epoch: Epoch::new(0),
            finalized_epoch: Epoch::new(0),
        }
    }

    /// Builds `0 <- 1 <- 2 ... <- n` with an anchor at index zero.
    fn linear_chain(n: u64) -> ProtoArray {
        let mut proto_array = ProtoArray::new(0, Epoch::new(0), Epoch::new(0));
        proto_array.on_block(block(0, 0, None)).unwrap();
        for i in 1..=n {
            proto_array.on_block(block(i, i, Some(i - 1))).unwrap();
        }
        proto_array
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut proto_array = linear_chain(1);

        assert_eq!(
            proto_array.on_block(block(5, 5, Some(4))),
            Err(Error::ParentUnknown {
                block_root: root(5),
                parent_root: root(4),
            })
        );
        assert_eq!(proto_array.nodes.len(), 2);
        assert!(!proto_array.indices.contains_key(&root(5)));
    }

    #[test]
    fn second_anchor_is_rejected() {
        let mut proto_array = linear_chain(1);

        assert_eq!(
            proto_array.on_block(block(5, 5, None)),
            Err(Error::MissingParentRoot(root(5)))
        );
    }

    #[test]
    fn duplicate_block_is_ignored() {
        let mut proto_array = linear_chain(2);
        let before = proto_array.clone();

        proto_array.on_block(block(2, 2, Some(1))).unwrap();

        assert_eq!(proto_array, before);
    }

    #[test]
    fn parent_always_precedes_child() {
        let proto_array = linear_chain(8);

        for (index, node) in proto_array.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                assert!(parent < index);
            }
        }
    }

    #[test]
    fn deltas_propagate_to_ancestors() {
        let mut proto_array = linear_chain(3);

        proto_array
            .apply_score_changes(vec![0, 0, 0, 7], Epoch::new(0), Epoch::new(0))
            .unwrap();

        for node in &proto_array.nodes {
            assert_eq!(node.weight, 7);
        }

        proto_array
            .apply_score_changes(vec![0, 0, 5, -7], Epoch::new(0), Epoch::new(0))
            .unwrap();

        let weights: Vec<u64> = proto_array.nodes.iter().map(|n| n.weight).collect();
        assert_eq!(weights, vec![5, 5, 5, 0]);
    }

    #[test]
    fn negative_weight_is_an_overflow() {
        let mut proto_array = linear_chain(1);

        assert_eq!(
            proto_array.apply_score_changes(vec![0, -1], Epoch::new(0), Epoch::new(0)),
            Err(Error::DeltaOverflow(1))
        );
    }

    #[test]
    fn delta_len_must_match() {
        let mut proto_array = linear_chain(1);

        assert_eq!(
            proto_array.apply_score_changes(vec![0], Epoch::new(0), Epoch::new(0)),
            Err(Error::InvalidDeltaLen {
                deltas: 1,
                indices: 2
            })
        );
    }

    #[test]
    fn equal_weights_prefer_greater_root() {
        let mut proto_array = linear_chain(0);
        proto_array.on_block(block(1, 1, Some(0))).unwrap();
        proto_array.on_block(block(1, 2, Some(0))).unwrap();

        proto_array
            .apply_score_changes(vec![0, 0, 0], Epoch::new(0), Epoch::new(0))
            .unwrap();
        assert_eq!(proto_array.find_head(&root(0)), Ok(root(2)));

        proto_array
            .apply_score_changes(vec![0, 1, 0], Epoch::new(0), Epoch::new(0))
            .unwrap();
        assert_eq!(proto_array.find_head(&root(0)), Ok(root(1)));
    }

    #[test]
    fn viable_child_beats_heavier_child() {
        let mut proto_array = linear_chain(0);
        proto_array
            .on_block(Block {
                justified_epoch: Epoch::new(1),
                ..block(1, 1, Some(0))
            })
            .unwrap();
        proto_array
            .on_block(Block {
                justified_epoch: Epoch::new(2),
                ..block(1, 2, Some(0))
            })
            .unwrap();

        proto_array
            .apply_score_changes(vec![0, 1, 100], Epoch::new(1), Epoch::new(0))
            .unwrap();

        assert_eq!(proto_array.find_head(&root(0)), Ok(root(1)));
    }

    #[test]
    fn genesis_epochs_are_wildcards() {
        let mut proto_array = linear_chain(0);
        proto_array
            .on_block(Block {
                justified_epoch: Epoch::new(3),
                finalized_epoch: Epoch::new(2),
                ..block(1, 1, Some(0))
            })
            .unwrap();

        let node = proto_array.nodes[1].clone();

        proto_array.justified_epoch = Epoch::new(0);
        proto_array.finalized_epoch = Epoch::new(0);
        assert!(proto_array.node_is_viable_for_head(&node));

        proto_array.justified_epoch = Epoch::new(3);
        proto_array.finalized_epoch = Epoch::new(0);
        assert!(proto_array.node_is_viable_for_head(&node));

        proto_array.justified_epoch = Epoch::new(0);
        proto_array.finalized_epoch = Epoch::new(1);
        assert!(!proto_array.node_is_viable_for_head(&node));

        proto_array.justified_epoch = Epoch::new(4);
        proto_array.finalized_epoch = Epoch::new(2);
        assert!(!proto_array.node_is_viable_for_head(&node));
    }

    #[test]
    fn unknown_justified_root() {
        let proto_array = linear_chain(1);

        assert_eq!(
            proto_array.find_head(&root(9)),
            Err(Error::JustifiedNodeUnknown(root(9)))
        );
    }

    #[test]
    fn prune_below_threshold_is_noop() {
        let mut proto_array = linear_chain(4);
        proto_array.prune_threshold = 3;
        let before = proto_array.clone();

        assert_eq!(proto_array.maybe_prune(root(2)), Ok(vec![]));
        assert_eq!(proto_array, before);
    }

    #[test]
    fn prune_unknown_root() {
        let mut proto_array = linear_chain(1);

        assert_eq!(
            proto_array.maybe_prune(root(7)),
            Err(Error::PruneTargetUnknown(root(7)))
        );
    }

    #[test]
    fn prune_shifts_indices() {
        let mut proto_array = linear_chain(4);
        // Side branch off node 1. It is stored after the finalized node, so it survives the
        // prune and loses its parent link.
        proto_array.on_block(block(2, 10, Some(1))).unwrap();
        proto_array
            .apply_score_changes(vec![0; 6], Epoch::new(0), Epoch::new(0))
            .unwrap();

        let removed = proto_array.maybe_prune(root(2)).unwrap();

        assert_eq!(removed, vec![root(0), root(1)]);
        assert_eq!(proto_array.nodes.len(), 4);
        assert_eq!(proto_array.indices.len(), 4);
        assert_eq!(proto_array.nodes[0].root, root(2));
        assert_eq!(proto_array.nodes[0].parent, None);
        assert_eq!(proto_array.nodes[1].parent, Some(0));
        assert_eq!(proto_array.nodes[3].root, root(10));
        assert_eq!(proto_array.nodes[3].parent, None);

        for (root, index) in &proto_array.indices {
            assert_eq!(proto_array.nodes[*index].root, *root);
        }

        assert_eq!(proto_array.find_head(&root(2)), Ok(root(4)));
        assert_eq!(
            proto_array.find_head(&root(1)),
            Err(Error::JustifiedNodeUnknown(root(1)))
        );
    }

    #[test]
    fn descendants() {
        let mut proto_array = linear_chain(3);
        proto_array.on_block(block(2, 10, Some(1))).unwrap();

        assert!(proto_array.is_descendant(root(1), root(3)));
        assert!(proto_array.is_descendant(root(1), root(10)));
        assert!(proto_array.is_descendant(root(3), root(3)));
        assert!(!proto_array.is_descendant(root(2), root(10)));
        assert!(!proto_array.is_descendant(root(3), root(1)));
        assert!(!proto_array.is_descendant(root(42), root(1)));
    }
}
