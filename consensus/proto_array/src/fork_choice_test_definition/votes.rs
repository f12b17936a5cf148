use super::*;

fn block(slot: u64, root: u64, parent: u64) -> Operation {
    Operation::ProcessBlock {
        slot: Slot::new(slot),
        root: get_root(root),
        parent_root: get_root(parent),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
    }
}

fn vote(validator_index: usize, root: u64, target_epoch: u64) -> Operation {
    Operation::ProcessAttestation {
        validator_index,
        block_root: get_root(root),
        target_epoch: Epoch::new(target_epoch),
    }
}

fn find_head(justified_root: u64, balances: &[u64], expected_head: u64) -> Operation {
    Operation::FindHead {
        justified_epoch: Epoch::new(0),
        justified_root: get_root(justified_root),
        finalized_epoch: Epoch::new(0),
        justified_state_balances: balances.to_vec(),
        expected_head: get_root(expected_head),
    }
}

fn weight(root: u64, weight: u64) -> Operation {
    Operation::AssertWeight {
        block_root: get_root(root),
        weight,
    }
}

pub fn get_votes_test_definition() -> ForkChoiceTestDefinition {
    let balances: [u64; 2] = [1, 1];

    let operations = vec![
        // Two competing children, no votes: the higher root wins.
        //
        //         0
        //        / \
        //        2  1
        block(1, 2, 0),
        block(1, 1, 0),
        find_head(0, &balances, 2),
        // Validator 0 votes for block 1.
        vote(0, 1, 2),
        find_head(0, &balances, 1),
        // Validator 1 votes for block 2, the tie goes to the higher root.
        vote(1, 2, 2),
        find_head(0, &balances, 2),
        // Add block 3 under block 1. Weights are unchanged so the head is unchanged.
        //
        //         0
        //        / \
        //        2  1
        //           |
        //           3
        block(2, 3, 1),
        find_head(0, &balances, 2),
        // Validator 0 moves to block 3. The vote stays within block 1's subtree.
        vote(0, 3, 3),
        find_head(0, &balances, 2),
        weight(1, 1),
        weight(3, 1),
        // Validator 1 moves to block 1, which now carries both votes.
        vote(1, 1, 3),
        find_head(0, &balances, 3),
        weight(1, 2),
        weight(2, 0),
        // A vote from an older epoch is ignored.
        vote(1, 2, 2),
        find_head(0, &balances, 3),
        // Validator 2 appears with a large balance and votes for block 2.
        vote(2, 2, 3),
        find_head(0, &[1, 1, 3], 2),
        weight(0, 5),
        weight(2, 3),
        // Validator 2 disappears from the balances, its weight leaves the tree.
        find_head(0, &balances, 3),
        weight(0, 2),
        weight(2, 0),
        // Extend the chain past block 3.
        //
        //         0
        //        / \
        //        2  1
        //           |
        //           3
        //           |
        //           4
        //           |
        //           5
        block(3, 4, 3),
        block(4, 5, 4),
        find_head(0, &balances, 5),
        // Prune at block 3. Insertion order is 0, 2, 1, 3, 4, 5 so three nodes are dropped.
        Operation::Prune {
            finalized_root: get_root(3),
            prune_threshold: 1,
            expected_len: 3,
        },
        find_head(3, &balances, 5),
        weight(3, 1),
        // Pruned blocks can no longer be used as the justified root.
        Operation::InvalidFindHead {
            justified_epoch: Epoch::new(0),
            justified_root: get_root(1),
            finalized_epoch: Epoch::new(0),
            justified_state_balances: balances.to_vec(),
        },
        // A vote for a block that has not arrived yet stalls the head until it does.
        vote(0, 6, 4),
        Operation::InvalidFindHead {
            justified_epoch: Epoch::new(0),
            justified_root: get_root(3),
            finalized_epoch: Epoch::new(0),
            justified_state_balances: balances.to_vec(),
        },
        block(5, 6, 5),
        find_head(3, &balances, 6),
        weight(6, 1),
        weight(3, 1),
    ];

    ForkChoiceTestDefinition {
        finalized_block_slot: Slot::new(0),
        finalized_root: get_root(0),
        justified_epoch: Epoch::new(0),
        finalized_epoch: Epoch::new(0),
        operations,
    }
}
