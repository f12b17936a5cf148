mod error;
pub mod fork_choice_test_definition;
mod proto_array;
mod proto_array_fork_choice;
mod ssz_container;

pub use crate::proto_array_fork_choice::{Block, ProtoArrayForkChoice, DEFAULT_PRUNE_THRESHOLD};
pub use error::{Error, InvalidBestNodeInfo};

pub mod core {
    pub use super::proto_array::{Ancestors, ProtoArray, ProtoNode};
    pub use super::proto_array_fork_choice::{compute_deltas, ElasticList, VoteTracker};
    pub use super::ssz_container::SszContainer;
}
