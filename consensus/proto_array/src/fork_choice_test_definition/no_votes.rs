use super::*;

pub fn get_no_votes_test_definition() -> ForkChoiceTestDefinition {
    let balances = vec![0; 16];
    let block = |slot: u64, root: u64, parent: u64, justified_epoch: u64| {
        Operation::ProcessBlock {
            slot: Slot::new(slot),
            root: get_root(root),
            parent_root: get_root(parent),
            justified_epoch: Epoch::new(justified_epoch),
            finalized_epoch: Epoch::new(1),
        }
    };
    let find_head = |justified_epoch: u64, justified_root: u64, expected_head: u64| {
        Operation::FindHead {
            justified_epoch: Epoch::new(justified_epoch),
            justified_root: get_root(justified_root),
            finalized_epoch: Epoch::new(1),
            justified_state_balances: balances.clone(),
            expected_head: get_root(expected_head),
        }
    };

    let operations = vec![
        // Check that the head is the anchor when there are no other blocks.
        find_head(1, 0, 0),
        // Add block 2
        //
        //         0
        //        /
        //        2
        block(1, 2, 0, 1),
        find_head(1, 0, 2),
        // Add block 1
        //
        //         0
        //        / \
        //        2  1
        //
        // With equal (zero) weights the higher root wins, the head stays at 2.
        block(1, 1, 0, 1),
        find_head(1, 0, 2),
        // Add block 3
        //
        //         0
        //        / \
        //        2  1
        //           |
        //           3
        //
        // The tie is decided at the fork, not at the leaves.
        block(2, 3, 1, 1),
        find_head(1, 0, 2),
        // Add block 4
        //
        //         0
        //        / \
        //        2  1
        //        |  |
        //        4  3
        block(2, 4, 2, 1),
        find_head(1, 0, 4),
        // Add block 5 with a justified epoch of 2
        //
        //         0
        //        / \
        //        2  1
        //        |  |
        //        4  3
        //        |
        //        5 <- justified epoch = 2
        //
        // Block 5 is not viable whilst the justified epoch is 1.
        block(3, 5, 4, 2),
        find_head(1, 0, 4),
        // Once the justified epoch is 2 and block 5 is the justified block, it becomes the head.
        find_head(2, 5, 5),
        // Add block 6
        //
        //        5 <- justified root
        //        |
        //        6
        block(4, 6, 5, 2),
        find_head(2, 5, 6),
        // Reverting to justified epoch 1 whilst starting at block 5 leaves no viable head.
        Operation::InvalidFindHead {
            justified_epoch: Epoch::new(1),
            justified_root: get_root(5),
            finalized_epoch: Epoch::new(1),
            justified_state_balances: balances.clone(),
        },
        // Starting from the anchor again finds block 4.
        find_head(1, 0, 4),
    ];

    ForkChoiceTestDefinition {
        finalized_block_slot: Slot::new(0),
        finalized_root: get_root(0),
        justified_epoch: Epoch::new(1),
        finalized_epoch: Epoch::new(1),
        operations,
    }
}
