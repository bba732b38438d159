//! Process-wide configuration, read once at startup.
//!
//! Mirrors the plain `Config`-struct-with-`Default` style this crate's
//! lineage uses for its top-level settings, expanded with `from_env()` so
//! the four FIFO policy flags and the Flusher thresholds (spec.md §6) can
//! be overridden without a recompile. Per spec.md §9's explicit guidance,
//! this is an injected struct passed into each `TupleFifo`/`Flusher` at
//! construction, not hidden process-wide mutable state.

use std::env;
use std::time::Duration;

use crate::error::{DbError, Result};

/// Policy flags and sizing knobs for a tuple-FIFO.
#[derive(Debug, Clone, Copy)]
pub struct FifoConfig {
    /// Hard in-memory page bound before either blocking the producer or
    /// spilling to disk, depending on `flush_to_disk_on_full`.
    pub capacity_pages: usize,
    /// Number of drained pages that wakes a blocked producer.
    pub wake_threshold_pages: usize,
    /// Bytes per page.
    pub page_size: usize,
    /// `false`: hard bound, producer blocks until the consumer drains.
    /// `true`: producer may spill full pages to a temporary file.
    pub flush_to_disk_on_full: bool,
    /// Attempt to open the spill file with platform direct I/O.
    pub use_direct_io: bool,
    /// Even under the spilling policy, wait for an *unshared* FIFO to
    /// drain before spilling, since no deadlock risk exists there.
    pub wait_for_unshared_to_drain: bool,
    /// Call `fsync` after each write to the spill file.
    pub sync_after_writes: bool,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            capacity_pages: 100,
            wake_threshold_pages: 4,
            page_size: 4096,
            flush_to_disk_on_full: true,
            use_direct_io: false,
            wait_for_unshared_to_drain: true,
            sync_after_writes: false,
        }
    }
}

/// Thresholds governing when the log flusher issues a sync.
#[derive(Debug, Clone, Copy)]
pub struct FlusherConfig {
    /// Sync once this many requests are pending durability.
    pub group_size: usize,
    /// Sync once the undurable log tail grows past this many bytes.
    pub log_size: u64,
    /// Sync once this long has elapsed since the last sync.
    pub timeout: Duration,
    /// Optional CPU to pin the flusher thread to.
    pub binding: Option<usize>,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            group_size: 100,
            log_size: 200_000,
            timeout: Duration::from_micros(1_000),
            binding: None,
        }
    }
}

/// Top-level engine configuration, loaded once at process start.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub fifo: FifoConfig,
    pub flusher: FlusherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fifo: FifoConfig::default(),
            flusher: FlusherConfig::default(),
        }
    }
}

impl Config {
    /// Build a `Config` from environment variables, falling back to
    /// defaults for anything unset. A variable that is set but cannot be
    /// parsed is a configuration error, not a silent fallback.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            fifo: FifoConfig {
                capacity_pages: env_parse(
                    "DORA_DB_FIFO_CAPACITY_PAGES",
                    defaults.fifo.capacity_pages,
                )?,
                wake_threshold_pages: env_parse(
                    "DORA_DB_FIFO_WAKE_THRESHOLD_PAGES",
                    defaults.fifo.wake_threshold_pages,
                )?,
                page_size: env_parse("DORA_DB_FIFO_PAGE_SIZE", defaults.fifo.page_size)?,
                flush_to_disk_on_full: env_parse(
                    "DORA_DB_FIFO_FLUSH_TO_DISK_ON_FULL",
                    defaults.fifo.flush_to_disk_on_full,
                )?,
                use_direct_io: env_parse(
                    "DORA_DB_FIFO_USE_DIRECT_IO",
                    defaults.fifo.use_direct_io,
                )?,
                wait_for_unshared_to_drain: env_parse(
                    "DORA_DB_FIFO_WAIT_FOR_UNSHARED_TO_DRAIN",
                    defaults.fifo.wait_for_unshared_to_drain,
                )?,
                sync_after_writes: env_parse(
                    "DORA_DB_FIFO_SYNC_AFTER_WRITES",
                    defaults.fifo.sync_after_writes,
                )?,
            },
            flusher: FlusherConfig {
                group_size: env_parse("DORA_DB_FLUSHER_GROUP_SIZE", defaults.flusher.group_size)?,
                log_size: env_parse("DORA_DB_FLUSHER_LOG_SIZE", defaults.flusher.log_size)?,
                timeout: Duration::from_micros(env_parse(
                    "DORA_DB_FLUSHER_TIMEOUT_US",
                    defaults.flusher.timeout.as_micros() as u64,
                )?),
                binding: env_parse_optional("DORA_DB_FLUSHER_BINDING")?,
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| DbError::Config(format!("{key}: invalid value {raw:?}"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(DbError::Config(format!("{key}: not valid unicode")))
        }
    }
}

fn env_parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| DbError::Config(format!("{key}: invalid value {raw:?}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(DbError::Config(format!("{key}: not valid unicode")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.fifo.capacity_pages, 100);
        assert!(cfg.fifo.flush_to_disk_on_full);
        assert!(cfg.fifo.wait_for_unshared_to_drain);
        assert!(!cfg.fifo.use_direct_io);
        assert_eq!(cfg.flusher.group_size, 100);
        assert_eq!(cfg.flusher.log_size, 200_000);
        assert_eq!(cfg.flusher.timeout, Duration::from_micros(1_000));
        assert!(cfg.flusher.binding.is_none());
    }

    #[test]
    fn env_parse_falls_back_when_unset() {
        let value: usize = env_parse("DORA_DB_TEST_UNSET_KEY_XYZ", 7).unwrap();
        assert_eq!(value, 7);
    }
}
