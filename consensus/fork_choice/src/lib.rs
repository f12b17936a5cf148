mod config;
mod fork_choice;
pub mod metrics;

pub use crate::config::ForkChoiceConfig;
pub use crate::fork_choice::{Error, ForkChoice};
pub use proto_array::{Block as ProtoBlock, DEFAULT_PRUNE_THRESHOLD};
