//! Crate-wide error type.
//!
//! Kept deliberately small: the core subsystems in this crate (tuple-FIFO,
//! log flusher, DORA partition router) raise a fixed, closed set of error
//! kinds. Anything outside that set is either an `Io` passthrough or an
//! `Internal` invariant violation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The peer side of a tuple-FIFO has called `terminate()`.
    #[error("tuple-fifo terminated by peer")]
    Terminated,

    /// The producer has sent EOF and no pages remain.
    #[error("tuple-fifo at end of stream")]
    Eof,

    /// A bounded wait (copy_page, Notifier::wait) elapsed.
    #[error("operation timed out")]
    Timeout,

    /// A partition's internal action queue refused an enqueue.
    #[error("partition enqueue failed: {0}")]
    Enqueue(String),

    /// Spill-to-disk or log I/O failed.
    #[error("file I/O error: {0}")]
    FileIo(String),

    /// Error surfaced from the underlying storage manager during action
    /// execution or final commit.
    #[error("storage manager error: {0}")]
    StorageManager(String),

    /// Ambient passthrough for `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed or missing configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// An invariant that should be structurally impossible was violated.
    /// `debug_assert!` catches these in debug builds; in release builds
    /// this variant lets the caller fail the operation instead of
    /// continuing past a broken invariant.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
