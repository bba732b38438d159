//! Data-ORiented Architecture: per-partition action queues, rendezvous
//! points, and transaction decomposition.
//!
//! Instead of locking the keys a transaction touches, each key belongs
//! to exactly one partition, and a transaction is split into one
//! [`action::ActionSpec`] per partition it touches. A
//! [`router::PartitionRouter`] submits all of a transaction's actions
//! together, wiring them to a single [`rvp::Rvp`] so the transaction's
//! completion callback fires exactly once, after every action has run.
//!
//! # Module Organization
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`action`] | `ActionSpec` (caller-facing) and the wired-up `Action` a partition runs |
//! | [`rvp`] | Rendezvous point: countdown + terminal callback |
//! | [`partition`] | One partition's queue and dedicated worker thread |
//! | [`router`] | Key-to-partition routing and transaction submission |
//! | [`transaction`] | Transaction decomposition, e.g. [`transaction::update_account`] |

pub mod action;
pub mod partition;
pub mod router;
pub mod rvp;
pub mod transaction;

pub use action::{ActionSpec, PartitionId};
pub use partition::Partition;
pub use router::PartitionRouter;
pub use rvp::Rvp;
pub use transaction::{update_account, AccountStorage};
