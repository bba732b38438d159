//! Partition router: decides which partition owns a key and submits a
//! transaction's decomposed actions as one logical group.
//!
//! Grounded on the `calc_keys()` / `down`/`up` range bounds used
//! throughout `examples/original_source/include/dora/tpcc/dora_mbench.h`
//! to place an action; this crate uses a flat hash-partitioning scheme
//! instead of the original's range-partitioned warehouse/district
//! bounds, since nothing in scope here models a range-partitioned
//! catalog. A range-partitioned table can bypass `decide_partition`
//! and supply `PartitionId`s directly in each [`ActionSpec`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{DbError, Result};

use super::action::{Action, ActionSpec, PartitionId};
use super::partition::Partition;
use super::rvp::Rvp;

/// Owns every partition's worker thread and routes keys/actions to them.
pub struct PartitionRouter {
    partitions: Vec<Arc<Partition>>,
}

impl PartitionRouter {
    /// Spawn `partition_count` worker threads, one per partition.
    pub fn new(partition_count: u32) -> Self {
        let partitions = (0..partition_count).map(Partition::spawn).collect();
        Self { partitions }
    }

    /// Spawn one partition per available CPU core, the sizing a
    /// deployment without a hand-tuned partition count should start
    /// from — DORA's whole premise is one serialized worker per core.
    pub fn new_with_default_parallelism() -> Self {
        Self::new(num_cpus::get() as u32)
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn partition(&self, id: PartitionId) -> &Arc<Partition> {
        &self.partitions[id as usize]
    }

    /// Hash a key into `[0, partition_count)`. Tables that are
    /// range-partitioned at a higher layer should compute their own
    /// `PartitionId` instead of calling this.
    pub fn decide_partition(&self, key: &[u8]) -> PartitionId {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as PartitionId
    }

    /// Submit every action of one transaction as a single logical
    /// group. The rendezvous point is constructed with the full
    /// action count before any action is enqueued, so no action can
    /// ever observe a countdown that hasn't accounted for all of its
    /// siblings yet. Actions are then enqueued to their target
    /// partitions in ascending partition-id order, so two concurrently
    /// submitted transactions that touch overlapping partition sets
    /// always acquire those partitions' queue locks in the same
    /// relative order.
    pub fn submit(
        &self,
        xct_id: u64,
        mut specs: Vec<ActionSpec>,
        on_terminal: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<Arc<Rvp>> {
        if specs.is_empty() {
            return Err(DbError::Internal(
                "transaction submitted with zero actions".into(),
            ));
        }
        specs.sort_by_key(|s| s.partition);

        let rvp = Arc::new(Rvp::new(specs.len(), on_terminal));
        for spec in specs {
            let action = Action {
                xct_id,
                key: spec.key,
                body: spec.body,
                rvp: rvp.clone(),
            };
            self.partition(spec.partition).enqueue(action)?;
        }
        Ok(rvp)
    }

    pub fn shutdown(&self) {
        for partition in &self.partitions {
            partition.shutdown();
        }
    }
}
