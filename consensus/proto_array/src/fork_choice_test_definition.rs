mod ffg_updates;
mod no_votes;
mod votes;

use crate::proto_array_fork_choice::{Block, ProtoArrayForkChoice};
use serde::{Deserialize, Serialize};
use types::{Epoch, Hash256, Slot};

pub use ffg_updates::*;
pub use no_votes::*;
pub use votes::*;

/// One step of a scripted fork choice scenario.
///
/// Steps that carry an expectation (`FindHead`, `InvalidFindHead`, `Prune`, `AssertWeight`)
/// check it against the state left behind by every earlier step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    FindHead {
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: Vec<u64>,
        expected_head: Hash256,
    },
    /// `find_head` is expected to fail, for any reason.
    InvalidFindHead {
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: Vec<u64>,
    },
    ProcessBlock {
        slot: Slot,
        root: Hash256,
        parent_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    },
    ProcessAttestation {
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    },
    /// Sets the prune threshold, prunes to `finalized_root` and checks the remaining node count.
    Prune {
        finalized_root: Hash256,
        prune_threshold: usize,
        expected_len: usize,
    },
    AssertWeight {
        block_root: Hash256,
        weight: u64,
    },
}

impl Operation {
    /// Applies `self` to `fork_choice`, describing the first mismatch or error in the `Err`.
    fn apply(&self, fork_choice: &mut ProtoArrayForkChoice) -> Result<(), String> {
        match self {
            Operation::FindHead {
                justified_epoch,
                justified_root,
                finalized_epoch,
                justified_state_balances,
                expected_head,
            } => {
                let head = fork_choice
                    .find_head(
                        *justified_epoch,
                        *justified_root,
                        *finalized_epoch,
                        justified_state_balances,
                    )
                    .map_err(|e| format!("find_head failed: {:?}", e))?;
                if head != *expected_head {
                    return Err(format!("head is {:?}, wanted {:?}", head, expected_head));
                }
            }
            Operation::InvalidFindHead {
                justified_epoch,
                justified_root,
                finalized_epoch,
                justified_state_balances,
            } => {
                if let Ok(head) = fork_choice.find_head(
                    *justified_epoch,
                    *justified_root,
                    *finalized_epoch,
                    justified_state_balances,
                ) {
                    return Err(format!("find_head succeeded with {:?}", head));
                }
            }
            Operation::ProcessBlock {
                slot,
                root,
                parent_root,
                justified_epoch,
                finalized_epoch,
            } => fork_choice
                .process_block(Block {
                    slot: *slot,
                    root: *root,
                    parent_root: Some(*parent_root),
                    justified_epoch: *justified_epoch,
                    finalized_epoch: *finalized_epoch,
                })
                .map_err(|e| format!("process_block failed: {:?}", e))?,
            Operation::ProcessAttestation {
                validator_index,
                block_root,
                target_epoch,
            } => fork_choice
                .process_attestation(*validator_index, *block_root, *target_epoch)
                .map_err(|e| format!("process_attestation failed: {:?}", e))?,
            Operation::Prune {
                finalized_root,
                prune_threshold,
                expected_len,
            } => {
                fork_choice.set_prune_threshold(*prune_threshold);
                fork_choice
                    .maybe_prune(*finalized_root)
                    .map_err(|e| format!("maybe_prune failed: {:?}", e))?;
                if fork_choice.len() != *expected_len {
                    return Err(format!(
                        "{} nodes left after pruning, wanted {}",
                        fork_choice.len(),
                        expected_len
                    ));
                }
            }
            Operation::AssertWeight { block_root, weight } => {
                let actual = fork_choice.get_weight(block_root);
                if actual != Some(*weight) {
                    return Err(format!("weight is {:?}, wanted {}", actual, weight));
                }
            }
        }

        Ok(())
    }
}

/// A scripted scenario: an anchor block followed by a list of operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkChoiceTestDefinition {
    pub finalized_block_slot: Slot,
    pub finalized_root: Hash256,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub operations: Vec<Operation>,
}

impl ForkChoiceTestDefinition {
    /// Replays every operation in order, panicking on the first failure.
    ///
    /// After each step the persisted bytes must decode back to an identical instance.
    pub fn run(self) {
        let mut fork_choice = ProtoArrayForkChoice::new(
            self.finalized_block_slot,
            self.finalized_root,
            self.justified_epoch,
            self.finalized_epoch,
        )
        .expect("anchor should be accepted");

        for (step, op) in self.operations.iter().enumerate() {
            if let Err(msg) = op.apply(&mut fork_choice) {
                panic!("step {} ({:?}): {}", step, op, msg);
            }
            assert_bytes_round_trip(&fork_choice, step);
        }
    }
}

/// Maps a small scenario label to a block root. Label `n` becomes `n + 1` so that no label maps
/// to the zero hash.
fn get_root(i: u64) -> Hash256 {
    Hash256::from_low_u64_be(i + 1)
}

fn assert_bytes_round_trip(fork_choice: &ProtoArrayForkChoice, step: usize) {
    let restored = ProtoArrayForkChoice::from_bytes(&fork_choice.as_bytes())
        .unwrap_or_else(|e| panic!("step {}: persisted bytes rejected: {:?}", step, e));
    assert_eq!(
        &restored, fork_choice,
        "step {}: persisted bytes decode to a different fork choice",
        step
    );
}
