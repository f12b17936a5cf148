use crate::{metrics, ForkChoiceConfig};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use proto_array::{Block as ProtoBlock, ProtoArrayForkChoice};
use slog::{crit, debug, warn, Logger};
use types::{Epoch, Hash256, Slot};

#[derive(Debug, PartialEq)]
pub enum Error {
    ProtoArrayError(proto_array::Error),
    InvalidProtoArrayBytes(proto_array::Error),
    InvalidAnchor(proto_array::Error),
}

impl From<proto_array::Error> for Error {
    fn from(e: proto_array::Error) -> Self {
        Error::ProtoArrayError(e)
    }
}

impl Error {
    /// Returns `true` if fork choice can no longer be trusted and should be rebuilt from the
    /// finalized anchor.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::ProtoArrayError(e) => e.is_fatal(),
            Error::InvalidProtoArrayBytes(_) | Error::InvalidAnchor(_) => false,
        }
    }
}

struct Inner {
    proto_array: ProtoArrayForkChoice,
    /// The result of the last successful `get_head`.
    head_block_root: Option<Hash256>,
}

/// The fork choice handle shared between the components that import blocks, import
/// attestations and ask for the head.
///
/// All mutations go through a single write lock so they are applied one at a time, in the order
/// the lock is acquired. Queries only take the read lock.
pub struct ForkChoice {
    inner: RwLock<Inner>,
    log: Logger,
}

impl ForkChoice {
    /// Instantiates `Self` from an anchor block, usually the latest finalized block.
    ///
    /// The `parent_root` of `anchor` is ignored, the anchor becomes the root of the tree.
    pub fn new(anchor: &ProtoBlock, config: &ForkChoiceConfig, log: Logger) -> Result<Self, Error> {
        let mut proto_array = ProtoArrayForkChoice::new(
            anchor.slot,
            anchor.root,
            anchor.justified_epoch,
            anchor.finalized_epoch,
        )
        .map_err(Error::InvalidAnchor)?;
        proto_array.set_prune_threshold(config.prune_threshold);

        debug!(
            log,
            "Initialized fork choice";
            "anchor_root" => ?anchor.root,
            "anchor_slot" => %anchor.slot,
            "justified_epoch" => %anchor.justified_epoch,
            "finalized_epoch" => %anchor.finalized_epoch,
        );

        Ok(Self::from_proto_array(proto_array, log))
    }

    /// Restores `Self` from bytes produced by `Self::to_bytes`.
    ///
    /// The prune threshold is taken from `config` rather than the persisted value.
    pub fn from_bytes(bytes: &[u8], config: &ForkChoiceConfig, log: Logger) -> Result<Self, Error> {
        let mut proto_array =
            ProtoArrayForkChoice::from_bytes(bytes).map_err(Error::InvalidProtoArrayBytes)?;
        proto_array.set_prune_threshold(config.prune_threshold);

        debug!(
            log,
            "Restoring fork choice from persisted";
            "nodes" => proto_array.len(),
            "prune_threshold" => config.prune_threshold,
        );

        Ok(Self::from_proto_array(proto_array, log))
    }

    fn from_proto_array(proto_array: ProtoArrayForkChoice, log: Logger) -> Self {
        let fork_choice = Self {
            inner: RwLock::new(Inner {
                proto_array,
                head_block_root: None,
            }),
            log,
        };
        metrics::scrape_for_metrics(&fork_choice);
        fork_choice
    }

    /// Adds `block` to the tree.
    ///
    /// Importing a known block is a no-op. Fails with `ParentUnknown` if the parent has not been
    /// imported (or was pruned); the caller should fetch the parent and retry.
    pub fn on_block(&self, block: ProtoBlock) -> Result<(), Error> {
        let _timer = metrics::start_timer(&metrics::FORK_CHOICE_ON_BLOCK_TIMES);

        let block_root = block.root;
        let block_slot = block.slot;
        let result = self.inner.write().proto_array.process_block(block);

        if let Err(e) = &result {
            debug!(
                self.log,
                "Fork choice rejected block";
                "block_root" => ?block_root,
                "slot" => %block_slot,
                "error" => ?e,
            );
        }

        result.map_err(Into::into)
    }

    /// Records the latest vote of `validator_index` for `block_root`.
    ///
    /// The vote does not need to reference a known block, but `get_head` fails until it does.
    /// Votes with a `target_epoch` that is not newer than the last one seen are ignored.
    pub fn on_attestation(
        &self,
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), Error> {
        let _timer = metrics::start_timer(&metrics::FORK_CHOICE_ON_ATTESTATION_TIMES);

        self.inner
            .write()
            .proto_array
            .process_attestation(validator_index, block_root, target_epoch)
            .map_err(Into::into)
    }

    /// Applies all pending votes and balance changes, then returns the head of the canonical
    /// chain as seen from `justified_root`.
    pub fn get_head(
        &self,
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: &[u64],
    ) -> Result<Hash256, Error> {
        let timer = metrics::start_timer(&metrics::FORK_CHOICE_FIND_HEAD_TIMES);

        let (result, previous_head) = {
            let mut inner = self.inner.write();
            let result = inner.proto_array.find_head(
                justified_epoch,
                justified_root,
                finalized_epoch,
                justified_state_balances,
            );
            let previous_head = match &result {
                Ok(head) => inner.head_block_root.replace(*head),
                Err(_) => inner.head_block_root,
            };
            (result, previous_head)
        };

        metrics::stop_timer(timer);

        match result {
            Ok(head) => {
                if previous_head != Some(head) {
                    metrics::inc_counter_by(&metrics::FORK_CHOICE_HEAD_CHANGES, 1);
                    debug!(
                        self.log,
                        "Fork choice updated head";
                        "previous_head" => ?previous_head,
                        "new_head" => ?head,
                        "justified_root" => ?justified_root,
                        "justified_epoch" => %justified_epoch,
                        "finalized_epoch" => %finalized_epoch,
                    );
                }
                Ok(head)
            }
            Err(e) => {
                if e.is_fatal() {
                    crit!(
                        self.log,
                        "Fork choice weights are inconsistent";
                        "error" => ?e,
                        "msg" => "fork choice should be rebuilt from the finalized block",
                    );
                } else {
                    warn!(
                        self.log,
                        "Unable to find head";
                        "error" => ?e,
                        "justified_root" => ?justified_root,
                        "justified_epoch" => %justified_epoch,
                        "finalized_epoch" => %finalized_epoch,
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Removes every block imported before `finalized_root`, provided there are at least
    /// `prune_threshold` of them. Returns the number of removed blocks.
    ///
    /// Votes for removed blocks are forgotten, see `ProtoArrayForkChoice::maybe_prune`.
    pub fn prune(&self, finalized_root: Hash256) -> Result<usize, Error> {
        let result = {
            let mut inner = self.inner.write();
            let result = inner.proto_array.maybe_prune(finalized_root);

            if let Some(head) = inner.head_block_root {
                if !inner.proto_array.contains_block(&head) {
                    inner.head_block_root = None;
                }
            }

            result
        };

        match result {
            Ok(0) => Ok(0),
            Ok(pruned) => {
                metrics::inc_counter_by(&metrics::FORK_CHOICE_PRUNED_NODES, pruned as u64);
                metrics::scrape_for_metrics(self);
                debug!(
                    self.log,
                    "Pruned fork choice";
                    "finalized_root" => ?finalized_root,
                    "pruned_nodes" => pruned,
                    "remaining_nodes" => self.len(),
                );
                Ok(pruned)
            }
            Err(e) => {
                warn!(
                    self.log,
                    "Unable to prune fork choice";
                    "finalized_root" => ?finalized_root,
                    "error" => ?e,
                );
                Err(e.into())
            }
        }
    }

    pub fn set_prune_threshold(&self, prune_threshold: usize) {
        self.inner
            .write()
            .proto_array
            .set_prune_threshold(prune_threshold)
    }

    /// Returns the head found by the last successful call to `Self::get_head`.
    pub fn cached_head(&self) -> Option<Hash256> {
        self.inner.read().head_block_root
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.inner.read().proto_array.contains_block(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<ProtoBlock> {
        self.inner.read().proto_array.get_block(block_root)
    }

    pub fn block_slot(&self, block_root: &Hash256) -> Option<Slot> {
        self.inner.read().proto_array.block_slot(block_root)
    }

    pub fn get_weight(&self, block_root: &Hash256) -> Option<u64> {
        self.inner.read().proto_array.get_weight(block_root)
    }

    pub fn is_descendant(&self, ancestor_root: Hash256, descendant_root: Hash256) -> bool {
        self.inner
            .read()
            .proto_array
            .is_descendant(ancestor_root, descendant_root)
    }

    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        self.inner.read().proto_array.latest_message(validator_index)
    }

    pub fn len(&self) -> usize {
        self.inner.read().proto_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().proto_array.is_empty()
    }

    /// Returns a read guard over the underlying `ProtoArrayForkChoice`.
    ///
    /// Every mutation of `self` blocks until the guard is dropped.
    pub fn proto_array(&self) -> MappedRwLockReadGuard<'_, ProtoArrayForkChoice> {
        RwLockReadGuard::map(self.inner.read(), |inner| &inner.proto_array)
    }

    /// Returns bytes that can be passed to `Self::from_bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.read().proto_array.as_bytes()
    }
}
