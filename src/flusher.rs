//! Staged group-commit log flusher.
//!
//! Transactions that need their commit durable hand a `(xct_id, lsn)`
//! pair to [`Flusher::request_commit`] and block on the returned
//! [`Notifier`]. A single background thread drains the incoming
//! `toflush` queue into an internal `flushing` queue and decides,
//! independently of any one caller, when to pay for an actual
//! `sync_log()`: once enough requests have piled up, once the
//! undurable log tail has grown past a byte threshold, or once enough
//! time has passed since the last sync. Every request in `flushing` at
//! that point rides the same sync call, which is the entire point —
//! fsync cost is amortized across a batch instead of paid per commit.
//!
//! Grounded on `flusher_t` (examples/original_source/src/sm/shore/shore_flusher.cpp):
//! `_work_ACTIVE_impl`'s three-threshold decision and `_log_diff`'s
//! byte-distance computation across log partitions carry over
//! directly; `_pre_STOP_impl`'s "drain both queues, wake without
//! syncing" shutdown behavior is preserved in [`Flusher::shutdown`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::FlusherConfig;
use crate::error::{DbError, Result};
use crate::sync::Notifier;

/// A log position: which partition file, and the byte offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn {
    pub partition: u32,
    pub offset: u64,
}

impl Lsn {
    pub fn new(partition: u32, offset: u64) -> Self {
        Self { partition, offset }
    }

    /// Bytes from `self` to `other`, assuming fixed-size partitions of
    /// `partition_bytes` each. Zero if `other` does not follow `self`.
    pub fn distance_to(&self, other: Lsn, partition_bytes: u64) -> u64 {
        use std::cmp::Ordering::*;
        match self.partition.cmp(&other.partition) {
            Equal => other.offset.saturating_sub(self.offset),
            Less => {
                let full_partitions_between = (other.partition - self.partition - 1) as u64;
                let tail_of_self = partition_bytes.saturating_sub(self.offset);
                tail_of_self + full_partitions_between * partition_bytes + other.offset
            }
            Greater => 0,
        }
    }
}

/// The durable log a [`Flusher`] syncs on the caller's behalf.
///
/// Implemented by the storage manager's write-ahead log in production;
/// tests supply an in-memory fake.
pub trait DurableLog: Send + Sync {
    /// The LSN of the most recently synced byte.
    fn durable_lsn(&self) -> Lsn;

    /// Force all log bytes up to the current tail to disk.
    fn sync_log(&self) -> Result<()>;

    /// Best-effort sync with no durability guarantee; used only when a
    /// caller explicitly opts out of waiting (not exercised by
    /// `Flusher` itself, but part of the contract callers rely on).
    fn sync_log_lazy(&self) -> Result<()> {
        Ok(())
    }

    /// Byte span of one log partition, for [`Lsn::distance_to`]. A log
    /// with a single unbounded partition can leave this at `u64::MAX`.
    fn partition_bytes(&self) -> u64 {
        u64::MAX
    }
}

/// One transaction's request to have its commit LSN made durable.
struct CommitRequest {
    #[allow(dead_code)]
    xct_id: u64,
    lsn: Lsn,
    notifier: Notifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Xcts,
    Size,
    Timeout,
    Shutdown,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FlusherStats {
    /// Commit requests that have been synced and notified.
    pub served: u64,
    /// Number of `sync_log` calls issued.
    pub flushes: u64,
    /// Requests counted into `waiting` at least once (queue admissions).
    pub waiting: u64,
    /// Flushes triggered by the group-size threshold.
    pub triggered_by_xcts: u64,
    /// Flushes triggered by the log-byte-size threshold.
    pub triggered_by_size: u64,
    /// Flushes triggered by the timeout threshold.
    pub triggered_by_timeout: u64,
}

struct Inner {
    toflush: VecDeque<CommitRequest>,
    flushing: VecDeque<CommitRequest>,
    stats: FlusherStats,
    shutdown: bool,
}

/// A background thread that group-commits pending log syncs.
pub struct Flusher {
    config: FlusherConfig,
    log: Arc<dyn DurableLog>,
    inner: Mutex<Inner>,
    work_cv: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
    next_xct_id: AtomicU64,
}

impl Flusher {
    pub fn new(config: FlusherConfig, log: Arc<dyn DurableLog>) -> Arc<Self> {
        let flusher = Arc::new(Self {
            config,
            log,
            inner: Mutex::new(Inner {
                toflush: VecDeque::new(),
                flushing: VecDeque::new(),
                stats: FlusherStats::default(),
                shutdown: false,
            }),
            work_cv: Condvar::new(),
            handle: Mutex::new(None),
            next_xct_id: AtomicU64::new(1),
        });

        let worker = Arc::clone(&flusher);
        let mut builder = thread::Builder::new().name("dora-flusher".to_string());
        if let Some(cpu) = flusher.config.binding {
            builder = builder.name(format!("dora-flusher-cpu{cpu}"));
        }
        let handle = builder
            .spawn(move || {
                tracing::debug!("flusher worker starting");
                worker.run();
                tracing::debug!("flusher worker exiting");
            })
            .expect("failed to spawn flusher thread");
        *flusher.handle.lock() = Some(handle);
        flusher
    }

    /// Auto-assign a transaction id and request its `lsn` be made
    /// durable. Returns a [`Notifier`] the caller should `wait()` on.
    pub fn request_commit(&self, lsn: Lsn) -> Result<Notifier> {
        let xct_id = self.next_xct_id.fetch_add(1, Ordering::Relaxed);
        self.request_commit_for(xct_id, lsn)
    }

    pub fn request_commit_for(&self, xct_id: u64, lsn: Lsn) -> Result<Notifier> {
        let mut guard = self.inner.lock();
        if guard.shutdown {
            return Err(DbError::Internal(
                "flusher is shutting down, no new commit requests accepted".into(),
            ));
        }
        let notifier = Notifier::new();
        guard.toflush.push_back(CommitRequest {
            xct_id,
            lsn,
            notifier: notifier.clone(),
        });
        self.work_cv.notify_one();
        Ok(notifier)
    }

    pub fn stats(&self) -> FlusherStats {
        self.inner.lock().stats
    }

    /// Stop accepting new requests, drain whatever is pending without
    /// a final sync (those requests are cancelled, not notified as
    /// durable), and join the worker thread.
    pub fn shutdown(&self) {
        {
            let mut guard = self.inner.lock();
            guard.shutdown = true;
        }
        self.work_cv.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn pending_log_bytes(&self, guard: &Inner) -> u64 {
        let durable = self.log.durable_lsn();
        let partition_bytes = self.log.partition_bytes();
        guard
            .flushing
            .iter()
            .map(|r| durable.distance_to(r.lsn, partition_bytes))
            .max()
            .unwrap_or(0)
    }

    /// Worker thread body. Blocks on `work_cv` whenever no trigger
    /// threshold is currently met, waking early on a new request and
    /// otherwise no later than the timeout threshold would fire —
    /// this never busy-spins waiting for a timeout to elapse.
    fn run(&self) {
        let mut last_flush_at = Instant::now();
        'outer: loop {
            let (trigger, batch) = loop {
                let mut guard = self.inner.lock();

                if !guard.toflush.is_empty() {
                    let drained: Vec<_> = guard.toflush.drain(..).collect();
                    guard.stats.waiting += drained.len() as u64;
                    let durable = self.log.durable_lsn();
                    let partition_bytes = self.log.partition_bytes();
                    for req in drained {
                        // Already durable (e.g. piggybacked on a sync some
                        // other request already triggered): notify now
                        // instead of waiting a full group/timeout cycle
                        // and forcing an otherwise-unneeded sync.
                        if durable.distance_to(req.lsn, partition_bytes) == 0 {
                            guard.stats.served += 1;
                            req.notifier.notify();
                        } else {
                            guard.flushing.push_back(req);
                        }
                    }
                }

                if guard.shutdown && guard.flushing.is_empty() {
                    break 'outer;
                }

                let pending = guard.flushing.len();
                let trigger = if pending == 0 {
                    None
                } else if guard.shutdown {
                    Some(Trigger::Shutdown)
                } else if pending >= self.config.group_size {
                    Some(Trigger::Xcts)
                } else if self.pending_log_bytes(&guard) >= self.config.log_size {
                    Some(Trigger::Size)
                } else if last_flush_at.elapsed() >= self.config.timeout {
                    Some(Trigger::Timeout)
                } else {
                    None
                };

                if let Some(trigger) = trigger {
                    let batch: Vec<_> = guard.flushing.drain(..).collect();
                    break (trigger, batch);
                }

                let wait = if pending == 0 {
                    self.config.timeout
                } else {
                    self.config
                        .timeout
                        .saturating_sub(last_flush_at.elapsed())
                        .max(Duration::from_millis(1))
                };
                self.work_cv.wait_for(&mut guard, wait);
            };

            if trigger != Trigger::Shutdown {
                if let Err(e) = self.log.sync_log() {
                    tracing::warn!(error = %e, "log sync failed, requeuing batch for retry");
                    let mut guard = self.inner.lock();
                    for req in batch.into_iter().rev() {
                        guard.flushing.push_front(req);
                    }
                    continue 'outer;
                }
            }
            last_flush_at = Instant::now();
            tracing::debug!(?trigger, batch_len = batch.len(), "group commit flushed");

            {
                let mut guard = self.inner.lock();
                guard.stats.flushes += 1;
                guard.stats.served += batch.len() as u64;
                match trigger {
                    Trigger::Xcts => guard.stats.triggered_by_xcts += 1,
                    Trigger::Size => guard.stats.triggered_by_size += 1,
                    Trigger::Timeout => guard.stats.triggered_by_timeout += 1,
                    Trigger::Shutdown => {}
                }
            }

            for req in batch {
                if trigger == Trigger::Shutdown {
                    req.notifier.cancel();
                } else {
                    req.notifier.notify();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::notifier::WaitOutcome;
    use std::time::Duration;

    struct FakeLog {
        durable: Mutex<Lsn>,
        sync_count: AtomicU64,
    }

    impl FakeLog {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                durable: Mutex::new(Lsn::new(0, 0)),
                sync_count: AtomicU64::new(0),
            })
        }

        fn advance(&self, to: Lsn) {
            *self.durable.lock() = to;
        }
    }

    impl DurableLog for FakeLog {
        fn durable_lsn(&self) -> Lsn {
            *self.durable.lock()
        }

        fn sync_log(&self) -> Result<()> {
            self.sync_count.fetch_add(1, Ordering::SeqCst);
            let tip = *self.durable.lock();
            *self.durable.lock() = Lsn::new(tip.partition, tip.offset + 1);
            Ok(())
        }
    }

    fn cfg(group_size: usize) -> FlusherConfig {
        FlusherConfig {
            group_size,
            log_size: u64::MAX,
            timeout: Duration::from_secs(3600),
            binding: None,
        }
    }

    #[test]
    fn group_size_threshold_flushes_a_batch() {
        let log = FakeLog::new();
        let flusher = Flusher::new(cfg(3), log.clone());
        let notifiers: Vec<_> = (0..3)
            .map(|i| flusher.request_commit(Lsn::new(0, i)).unwrap())
            .collect();
        for n in notifiers {
            assert_eq!(n.wait(), WaitOutcome::Notified);
        }
        assert_eq!(flusher.stats().flushes, 1);
        assert_eq!(flusher.stats().triggered_by_xcts, 1);
        flusher.shutdown();
    }

    #[test]
    fn timeout_threshold_flushes_a_lone_request() {
        let log = FakeLog::new();
        let mut config = cfg(1000);
        config.timeout = Duration::from_millis(20);
        let flusher = Flusher::new(config, log);
        let notifier = flusher.request_commit(Lsn::new(0, 1)).unwrap();
        assert_eq!(notifier.wait(), WaitOutcome::Notified);
        assert_eq!(flusher.stats().triggered_by_timeout, 1);
        flusher.shutdown();
    }

    #[test]
    fn shutdown_cancels_undurable_requests() {
        let log = FakeLog::new();
        let flusher = Flusher::new(cfg(1000), log);
        let notifier = flusher.request_commit(Lsn::new(0, 1)).unwrap();
        flusher.shutdown();
        assert_eq!(notifier.wait(), WaitOutcome::Cancelled);
    }

    #[test]
    fn already_durable_request_is_notified_without_a_sync() {
        let log = FakeLog::new();
        log.advance(Lsn::new(0, 10));
        let flusher = Flusher::new(cfg(1000), log.clone());

        // This LSN is already behind the log's durable tip, so it should
        // be notified on sight rather than waiting a full group/timeout
        // cycle and forcing a sync nothing actually needed.
        let notifier = flusher.request_commit(Lsn::new(0, 5)).unwrap();
        assert_eq!(notifier.wait(), WaitOutcome::Notified);

        assert_eq!(flusher.stats().served, 1);
        assert_eq!(flusher.stats().flushes, 0);
        assert_eq!(log.sync_count.load(Ordering::SeqCst), 0);
        flusher.shutdown();
    }

    #[test]
    fn lsn_distance_within_one_partition() {
        let a = Lsn::new(2, 100);
        let b = Lsn::new(2, 150);
        assert_eq!(a.distance_to(b, 1000), 50);
        assert_eq!(b.distance_to(a, 1000), 0);
    }

    #[test]
    fn lsn_distance_crosses_partitions() {
        let a = Lsn::new(0, 900);
        let b = Lsn::new(2, 50);
        // 100 bytes left in partition 0, all of partition 1 (1000), plus 50.
        assert_eq!(a.distance_to(b, 1000), 100 + 1000 + 50);
    }
}
