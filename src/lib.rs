//! Core subsystems for a hybrid OLTP/OLAP storage engine: a bounded
//! tuple-FIFO with disk spill, a staged group-commit log flusher, and a
//! DORA-style (Data-ORiented Architecture) partitioned transaction router.
//!
//! # Module Organization
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`sync`] | Countdown latch, notifier, CAS backoff — shared by every subsystem |
//! | [`config`] | Process-wide `Config`, loaded once at startup |
//! | [`fifo`] | Page-oriented tuple-FIFO with automatic spill to disk |
//! | [`flusher`] | Staged group-commit log flusher |
//! | [`dora`] | Per-partition action queues, rendezvous points, transaction routing |
//! | [`error`] | Crate-wide `DbError`/`Result` |
//! | [`pool`] | Lock-free scratch-buffer free list used on the spill hot path |

pub mod config;
pub mod dora;
pub mod error;
pub mod fifo;
pub mod flusher;
pub mod pool;
pub mod sync;

pub use config::Config;
pub use error::{DbError, Result};
