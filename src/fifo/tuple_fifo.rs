//! Bounded, page-oriented producer/consumer pipe for one transaction's
//! tuple stream, with automatic spill to disk when the in-memory page
//! budget is exhausted.
//!
//! State machine (see [`FifoState`]): a FIFO starts `InMemory`. If the
//! producer's pages exceed `capacity_pages` and spilling is enabled it
//! moves to `OnDisk`; calling `send_eof` moves either state to its
//! `*DoneWriting` counterpart; calling `terminate` from either side
//! moves to the matching `*Terminated` state, which records whether a
//! spill file needs cleaning up.
//!
//! Grounded on `tuple_fifo_t` (examples/original_source/src/core/tuple_fifo.cpp):
//! the sentinel read-page, `_flush_write_page`'s overwrite-vs-append
//! file reuse, and the tri-state `copy_page` timeout contract are all
//! carried over; the packed C-struct page header becomes ordinary
//! struct fields on [`Page`].

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Seek, SeekFrom, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tempfile::TempDir;

use super::page::{MallocPagePool, Page, PagePool, Tuple};
use crate::config::FifoConfig;
use crate::error::{DbError, Result};
use crate::pool::BufferPool;

static NEXT_FIFO_ID: AtomicU64 = AtomicU64::new(1);

/// Where in the state machine a given [`TupleFifo`] currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoState {
    InMemory,
    InMemoryDoneWriting,
    OnDisk,
    OnDiskDoneWriting,
    InMemoryTerminated,
    OnDiskTerminated,
}

impl FifoState {
    fn has_spilled(self) -> bool {
        matches!(
            self,
            FifoState::OnDisk | FifoState::OnDiskDoneWriting | FifoState::OnDiskTerminated
        )
    }

    fn is_terminated(self) -> bool {
        matches!(self, FifoState::InMemoryTerminated | FifoState::OnDiskTerminated)
    }
}

/// How long `get_tuple`/`copy_page` should wait for data.
#[derive(Debug, Clone, Copy)]
pub enum Wait {
    /// Wait up to the given duration, then return `Err(Timeout)`.
    Bounded(Duration),
    /// Wait indefinitely until data, EOF, or termination.
    Forever,
    /// Return immediately if nothing is ready.
    NonBlocking,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FifoStats {
    pub tuples_served: u64,
    pub pages_written: u64,
    pub pages_spilled: u64,
    pub pages_read_from_disk: u64,
    pub producer_waits: u64,
    pub consumer_waits: u64,
}

/// The on-disk overflow area for one FIFO's spilled pages.
///
/// Pages are written at `tail_index` and read at `head_index`; both
/// count fixed-size slots, each a small length-prefixed header plus a
/// zero-padded page payload. When `tail_index` has not yet reached
/// `write_high` the next write would land on a slot the consumer has
/// already drained, so in principle it could overwrite in place — we
/// keep the index bookkeeping from `_flush_write_page` but always
/// append, since a single spill file per FIFO is removed wholesale
/// when the FIFO is torn down rather than reused indefinitely.
struct SpillFile {
    file: File,
    _dir: TempDir,
    slot_bytes: u64,
    head_index: u64,
    tail_index: u64,
    write_high: u64,
}

impl SpillFile {
    fn create(page_bytes: usize, direct_io: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("dora-fifo-")
            .tempdir()
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        let path: PathBuf = dir.path().join("spill");
        let mut open_opts = OpenOptions::new();
        open_opts.read(true).write(true).create(true).truncate(true);
        #[cfg(target_os = "linux")]
        if direct_io {
            use std::os::unix::fs::OpenOptionsExt;
            open_opts.custom_flags(libc::O_DIRECT);
        }
        #[cfg(not(target_os = "linux"))]
        let _ = direct_io;
        let file = open_opts
            .open(&path)
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        Ok(Self {
            file,
            _dir: dir,
            slot_bytes: 8 + page_bytes as u64,
            head_index: 0,
            tail_index: 0,
            write_high: 0,
        })
    }

    fn write_page(&mut self, tuple_count: u64, payload: &[u8], sync: bool) -> Result<()> {
        let offset = self.tail_index * self.slot_bytes;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        self.file
            .write_all(&tuple_count.to_le_bytes())
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        self.file
            .write_all(payload)
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        if sync {
            self.file
                .sync_data()
                .map_err(|e| DbError::FileIo(e.to_string()))?;
        }
        self.tail_index += 1;
        self.write_high = self.write_high.max(self.tail_index);
        Ok(())
    }

    fn read_page(&mut self, payload_buf: &mut [u8]) -> Result<u64> {
        let offset = self.head_index * self.slot_bytes;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        let mut header = [0u8; 8];
        self.file
            .read_exact(&mut header)
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        self.file
            .read_exact(payload_buf)
            .map_err(|e| DbError::FileIo(e.to_string()))?;
        self.head_index += 1;
        Ok(u64::from_le_bytes(header))
    }

    fn is_drained(&self) -> bool {
        self.head_index == self.tail_index
    }

    fn pending_pages(&self) -> u64 {
        self.tail_index - self.head_index
    }
}

struct Inner {
    state: FifoState,
    mem_queue: VecDeque<Page>,
    write_page: Page,
    read_page: Page,
    spill: Option<SpillFile>,
    eof_sent: bool,
    stats: FifoStats,
}

/// A bounded, single-producer single-consumer pipe of fixed-size tuples.
pub struct TupleFifo {
    id: u64,
    tuple_size: usize,
    config: FifoConfig,
    pool: Arc<dyn PagePool>,
    spill_scratch: Arc<BufferPool>,
    inner: Mutex<Inner>,
    reader_cv: Condvar,
    writer_cv: Condvar,
}

impl TupleFifo {
    pub fn new(tuple_size: usize, config: FifoConfig) -> Self {
        let pool: Arc<dyn PagePool> = Arc::new(MallocPagePool::new(config.page_size));
        Self::with_pool(tuple_size, config, pool)
    }

    pub fn with_pool(tuple_size: usize, config: FifoConfig, pool: Arc<dyn PagePool>) -> Self {
        let write_page = Page::alloc(pool.clone(), tuple_size);
        let spill_scratch = BufferPool::new(config.page_size, config.capacity_pages + 1);
        Self {
            id: NEXT_FIFO_ID.fetch_add(1, Ordering::Relaxed),
            tuple_size,
            config,
            pool,
            spill_scratch,
            inner: Mutex::new(Inner {
                state: FifoState::InMemory,
                mem_queue: VecDeque::new(),
                write_page,
                read_page: Page::sentinel(),
                spill: None,
                eof_sent: false,
                stats: FifoStats::default(),
            }),
            reader_cv: Condvar::new(),
            writer_cv: Condvar::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> FifoState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> FifoStats {
        self.inner.lock().stats
    }

    // ---- producer side ----

    /// Append one tuple. Blocks (per policy) if the in-memory page
    /// budget is exhausted and spilling is disabled.
    pub fn put_tuple(&self, tuple: Tuple<'_>) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.state.is_terminated() {
            return Err(DbError::Terminated);
        }
        if guard.write_page.capacity() == 0 {
            return Err(DbError::Internal(
                "page size too small to hold one tuple".into(),
            ));
        }
        if guard.write_page.is_full() {
            self.retire_write_page(&mut guard)?;
        }
        guard.write_page.append(tuple)?;
        self.reader_cv.notify_all();
        Ok(())
    }

    fn retire_write_page(&self, guard: &mut MutexGuard<'_, Inner>) -> Result<()> {
        let full = std::mem::replace(
            &mut guard.write_page,
            Page::alloc(self.pool.clone(), self.tuple_size),
        );
        if full.is_empty() {
            return Ok(());
        }

        let spill_drained = guard.spill.as_ref().map_or(true, |s| s.is_drained());
        if spill_drained && self.buffered_pages(guard) < self.config.capacity_pages as u64 {
            guard.mem_queue.push_back(full);
            guard.stats.pages_written += 1;
            return Ok(());
        }

        if !self.config.flush_to_disk_on_full {
            guard.mem_queue.push_back(full);
            guard.stats.pages_written += 1;
            // Hard bound: block until the consumer has drained back down
            // to the wake threshold, not merely back under capacity —
            // batches the producer's wakeups instead of releasing it the
            // instant a single page is popped.
            while self.buffered_pages(guard) > self.config.wake_threshold_pages as u64
                && !guard.state.is_terminated()
            {
                guard.stats.producer_waits += 1;
                self.writer_cv.wait(guard);
            }
            return if guard.state.is_terminated() {
                Err(DbError::Terminated)
            } else {
                Ok(())
            };
        }

        if self.config.wait_for_unshared_to_drain {
            let deadline = Instant::now() + Duration::from_micros(50);
            while Instant::now() < deadline
                && self.buffered_pages(guard) >= self.config.capacity_pages as u64
                && !guard.state.is_terminated()
            {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                self.writer_cv.wait_for(guard, remaining);
            }
        }

        self.spill_page(guard, full)
    }

    fn buffered_pages(&self, guard: &Inner) -> u64 {
        guard.mem_queue.len() as u64 + guard.spill.as_ref().map_or(0, |s| s.pending_pages())
    }

    fn spill_page(&self, guard: &mut MutexGuard<'_, Inner>, page: Page) -> Result<()> {
        if guard.spill.is_none() {
            guard.spill = Some(SpillFile::create(
                self.config.page_size,
                self.config.use_direct_io,
            )?);
        }
        let (_, tuple_count, end_offset) = page.header();
        let mut payload = self.spill_scratch.acquire();
        payload[..end_offset].copy_from_slice(page.as_bytes());
        let sync = self.config.sync_after_writes;
        let result = guard
            .spill
            .as_mut()
            .expect("just created above")
            .write_page(tuple_count as u64, &payload, sync);
        self.spill_scratch.release(payload);
        result?;
        guard.stats.pages_spilled += 1;
        guard.stats.pages_written += 1;
        if guard.state == FifoState::InMemory {
            tracing::debug!(fifo = self.id, "spilling to disk, in-memory budget exhausted");
            guard.state = FifoState::OnDisk;
        }
        Ok(())
    }

    /// Signal that no more tuples will be produced.
    pub fn send_eof(&self) {
        let mut guard = self.inner.lock();
        if guard.state.is_terminated() {
            return;
        }
        if !guard.write_page.is_empty() {
            let _ = self.retire_write_page(&mut guard);
        }
        guard.eof_sent = true;
        guard.state = match guard.state {
            FifoState::OnDisk => FifoState::OnDiskDoneWriting,
            _ => FifoState::InMemoryDoneWriting,
        };
        self.reader_cv.notify_all();
    }

    // ---- consumer side ----

    /// Pop the next tuple, refilling the read page from memory or disk
    /// as needed. See [`Wait`] for timeout semantics.
    pub fn get_tuple(&self, wait: Wait) -> Result<Vec<u8>> {
        let mut guard = self.inner.lock();
        loop {
            if let Some(t) = guard.read_page.pop_front() {
                guard.stats.tuples_served += 1;
                self.writer_cv.notify_all();
                return Ok(t);
            }
            self.refill_read_page(&mut guard, wait)?;
        }
    }

    /// Replace an exhausted read page wholesale; used by scan-style
    /// consumers that want to own a whole page rather than one tuple
    /// at a time.
    pub fn copy_page(&self, wait: Wait) -> Result<Page> {
        let mut guard = self.inner.lock();
        if guard.read_page.is_empty() {
            self.refill_read_page(&mut guard, wait)?;
        }
        let page = std::mem::replace(&mut guard.read_page, Page::sentinel());
        self.writer_cv.notify_all();
        Ok(page)
    }

    fn refill_read_page(&self, guard: &mut MutexGuard<'_, Inner>, wait: Wait) -> Result<()> {
        let deadline = match wait {
            Wait::Bounded(d) => Some(Instant::now() + d),
            Wait::Forever | Wait::NonBlocking => None,
        };
        loop {
            if guard.state.is_terminated() {
                return Err(DbError::Terminated);
            }
            if let Some(page) = guard.mem_queue.pop_front() {
                guard.read_page = page;
                self.writer_cv.notify_all();
                return Ok(());
            }
            if guard.state.has_spilled() {
                if let Some(page) = self.read_spilled_page(guard)? {
                    guard.read_page = page;
                    self.writer_cv.notify_all();
                    return Ok(());
                }
            }
            if guard.eof_sent {
                return Err(DbError::Eof);
            }
            match wait {
                Wait::NonBlocking => return Err(DbError::Timeout),
                Wait::Forever => {
                    guard.stats.consumer_waits += 1;
                    self.reader_cv.wait(guard);
                }
                Wait::Bounded(_) => {
                    let dl = deadline.expect("wait is Bounded, deadline set above");
                    let remaining = dl.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(DbError::Timeout);
                    }
                    guard.stats.consumer_waits += 1;
                    self.reader_cv.wait_for(guard, remaining);
                }
            }
        }
    }

    fn read_spilled_page(&self, guard: &mut MutexGuard<'_, Inner>) -> Result<Option<Page>> {
        let needs_read = matches!(&guard.spill, Some(s) if !s.is_drained());
        if !needs_read {
            return Ok(None);
        }
        let mut payload = vec![0u8; self.config.page_size];
        let tuple_count = guard
            .spill
            .as_mut()
            .expect("checked above")
            .read_page(&mut payload)?;
        guard.stats.pages_read_from_disk += 1;

        let tuple_size = self.tuple_size;
        let end_offset = tuple_count as usize * tuple_size;
        Ok(Some(Page::mount(
            self.pool.clone(),
            tuple_size,
            tuple_count as usize,
            end_offset,
            payload.into_boxed_slice(),
        )))
    }

    /// Tear down the FIFO from either side: wakes any blocked peer with
    /// `DbError::Terminated`. A spill file, if any, is removed when the
    /// owning `TempDir` drops along with this `TupleFifo`.
    pub fn terminate(&self) {
        let mut guard = self.inner.lock();
        guard.state = if guard.state.has_spilled() {
            FifoState::OnDiskTerminated
        } else {
            FifoState::InMemoryTerminated
        };
        self.reader_cv.notify_all();
        self.writer_cv.notify_all();
    }
}
