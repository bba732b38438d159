//! A single partition-local unit of work belonging to one transaction.
//!
//! Grounded on `range_action_impl` in
//! `examples/original_source/include/dora/tpcc/dora_mbench.h`: each
//! action carries the key it touches (so the router can place it) and
//! a closure capturing everything the action needs from the storage
//! manager. Unlike the original's virtual `calc_keys()`/`trx_exec()`
//! pair, Rust closures let a caller build one without a new type per
//! action kind.

use std::sync::Arc;

use crate::error::Result;

use super::rvp::Rvp;

/// Which partition an action targets, assigned by a
/// [`super::router::PartitionRouter`].
pub type PartitionId = u32;

/// A not-yet-scheduled action: target partition, the key it touches
/// (for logging/diagnostics), and the body to run on that partition's
/// worker thread.
pub struct ActionSpec {
    pub partition: PartitionId,
    pub key: Vec<u8>,
    pub body: Box<dyn FnOnce() -> Result<()> + Send>,
}

impl ActionSpec {
    pub fn new(
        partition: PartitionId,
        key: Vec<u8>,
        body: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            partition,
            key,
            body: Box::new(body),
        }
    }
}

/// An [`ActionSpec`] wired up to the rendezvous point it reports to.
/// Built only by [`super::router::PartitionRouter::submit`], since the
/// `Rvp` must exist (with the transaction's full action count) before
/// any action can be constructed.
pub(crate) struct Action {
    #[allow(dead_code)]
    pub(crate) xct_id: u64,
    #[allow(dead_code)]
    pub(crate) key: Vec<u8>,
    pub(crate) body: Box<dyn FnOnce() -> Result<()> + Send>,
    pub(crate) rvp: Arc<Rvp>,
}

impl Action {
    /// Run the body and report the outcome to the rendezvous point.
    /// Called from exactly one thread: the owning partition's worker.
    pub(crate) fn execute(self) {
        let outcome = (self.body)();
        self.rvp.post(&outcome);
    }
}
