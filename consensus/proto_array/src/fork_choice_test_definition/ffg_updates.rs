use super::*;

fn find_head(
    justified_epoch: u64,
    justified_root: u64,
    finalized_epoch: u64,
    balances: &[u64],
    expected_head: u64,
) -> Operation {
    Operation::FindHead {
        justified_epoch: Epoch::new(justified_epoch),
        justified_root: get_root(justified_root),
        finalized_epoch: Epoch::new(finalized_epoch),
        justified_state_balances: balances.to_vec(),
        expected_head: get_root(expected_head),
    }
}

/// A single chain where each block advances the justified and finalized epochs.
pub fn get_ffg_case_01_test_definition() -> ForkChoiceTestDefinition {
    let balances: [u64; 2] = [1, 1];
    let mut ops = vec![];

    // Build the following chain:
    //
    //     0 <- just: 0, fin: 0
    //     |
    //     1 <- just: 0, fin: 0
    //     |
    //     2 <- just: 1, fin: 0
    //     |
    //     3 <- just: 2, fin: 1
    for (root, justified_epoch, finalized_epoch) in [(1, 0, 0), (2, 1, 0), (3, 2, 1)] {
        ops.push(Operation::ProcessBlock {
            slot: Slot::new(root),
            root: get_root(root),
            parent_root: get_root(root - 1),
            justified_epoch: Epoch::new(justified_epoch),
            finalized_epoch: Epoch::new(finalized_epoch),
        });
    }

    // With the genesis checkpoints every block is viable, the tip is the head.
    ops.push(find_head(0, 0, 0, &balances, 3));
    // Justified at epoch 1 with block 2: block 3 carries the wrong justified epoch.
    ops.push(find_head(1, 2, 0, &balances, 2));
    // The same checkpoints starting from the anchor still stop at block 2.
    ops.push(find_head(1, 0, 0, &balances, 2));
    // Justified at epoch 2, finalized at epoch 1: block 3 is the head.
    ops.push(find_head(2, 3, 1, &balances, 3));
    // Block 3 is a leaf whose epochs do not match, there is no viable head below it.
    ops.push(Operation::InvalidFindHead {
        justified_epoch: Epoch::new(1),
        justified_root: get_root(3),
        finalized_epoch: Epoch::new(1),
        justified_state_balances: balances.to_vec(),
    });

    ForkChoiceTestDefinition {
        finalized_block_slot: Slot::new(0),
        finalized_root: get_root(0),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
        operations: ops,
    }
}

/// Two five-block branches from a common root, decided first by root tie-break, then by
/// votes, then by viability.
pub fn get_ffg_case_02_test_definition() -> ForkChoiceTestDefinition {
    let mut ops = vec![];

    // Build the following tree:
    //
    //        0
    //       / \
    //      1   2
    //      |   |
    //      3   4
    //      |   |
    //      5   6
    //      |   |
    //      7   8
    //      |   |
    //      9   10
    for depth in 1..=5 {
        for root in [2 * depth - 1, 2 * depth] {
            let parent = if depth == 1 { 0 } else { root - 2 };
            ops.push(Operation::ProcessBlock {
                slot: Slot::new(depth),
                root: get_root(root),
                parent_root: get_root(parent),
                justified_epoch: Epoch::new(0),
                finalized_epoch: Epoch::new(0),
            });
        }
    }

    // No votes: the right branch wins the tie at the fork since root 2 > root 1.
    ops.push(find_head(0, 0, 0, &[1, 1], 10));

    // A single vote on the left branch flips the head to its tip.
    ops.push(Operation::ProcessAttestation {
        validator_index: 0,
        block_root: get_root(1),
        target_epoch: Epoch::new(1),
    });
    ops.push(find_head(0, 0, 0, &[1, 1], 9));

    // A matching vote on the right branch restores the tie.
    ops.push(Operation::ProcessAttestation {
        validator_index: 1,
        block_root: get_root(8),
        target_epoch: Epoch::new(1),
    });
    ops.push(find_head(0, 0, 0, &[1, 1], 10));
    ops.push(Operation::AssertWeight {
        block_root: get_root(2),
        weight: 1,
    });
    ops.push(Operation::AssertWeight {
        block_root: get_root(0),
        weight: 2,
    });

    // Validator 0's balance grows, the left branch is heavier again.
    ops.push(find_head(0, 0, 0, &[2, 1], 9));
    ops.push(Operation::AssertWeight {
        block_root: get_root(0),
        weight: 3,
    });

    // Extend the lighter right branch with a block justified at epoch 1.
    //
    //      9   10
    //          |
    //          11 <- just: 1
    ops.push(Operation::ProcessBlock {
        slot: Slot::new(6),
        root: get_root(11),
        parent_root: get_root(10),
        justified_epoch: Epoch::new(1),
        finalized_epoch: Epoch::new(0),
    });

    // Only block 11 is viable at justified epoch 1, weight does not matter.
    ops.push(find_head(1, 0, 0, &[2, 1], 11));

    // Back to the genesis checkpoints the heavier left branch wins again.
    ops.push(find_head(0, 0, 0, &[2, 1], 9));

    ForkChoiceTestDefinition {
        finalized_block_slot: Slot::new(0),
        finalized_root: get_root(0),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
        operations: ops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffg_case_01() {
        let test = get_ffg_case_01_test_definition();
        test.run();
    }

    #[test]
    fn test_ffg_case_02() {
        let test = get_ffg_case_02_test_definition();
        test.run();
    }
}
