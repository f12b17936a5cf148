//! Primitive types shared by the fork choice crates.
#[macro_use]
mod slot_epoch_macros;
mod slot_epoch;

pub use crate::slot_epoch::{Epoch, Slot};
pub use ethereum_types::H256;

pub type Hash256 = H256;

/// The epoch of the genesis block. Used as a wildcard by fork choice viability checks.
pub const GENESIS_EPOCH: Epoch = Epoch::new(0);
