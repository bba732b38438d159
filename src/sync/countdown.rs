//! Atomic countdown latch.
//!
//! Replaces a per-transaction mutex + condition variable with a single
//! atomic word. `post` is the only operation: every action belonging to a
//! transaction posts exactly once, and whichever post drives the count to
//! zero (or is the first to report an error) is the terminal caller,
//! responsible for running the rendezvous-point callback.
//!
//! Ported from `countdown_t` in the Shore-kits util library
//! (`examples/original_source/src/util/countdown.cpp`), restated with a
//! compare_exchange loop over a signed atomic instead of the original's
//! `NUMBER`-scaled packing — the same CAS-retry shape the teacher's
//! lock-free structures use (`concurrent::queue`), ending on a terminal
//! `ERROR` sentinel rather than a numeric encoding trick.

use std::sync::atomic::{AtomicI64, Ordering};

use super::Backoff;

const ERROR: i64 = i64::MIN;

/// An atomic N-way join/error barrier.
pub struct Countdown {
    state: AtomicI64,
}

impl Countdown {
    /// Create a latch that requires `count` posts before reaching zero.
    ///
    /// # Panics
    /// Panics if `count` is zero; a zero-action transaction has no caller
    /// to post and would never become terminal.
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "countdown latch requires count > 0");
        Self {
            state: AtomicI64::new(count as i64),
        }
    }

    /// Post one unit of progress. Returns `true` if this call was the
    /// terminal one: either it drove the remaining count to zero, or it
    /// was the first call to report `is_error = true`.
    ///
    /// Once any caller posts `is_error = true`, the latch is permanently
    /// in the errored state; later posts (error or not) return `false`
    /// without decrementing further.
    pub fn post(&self, is_error: bool) -> bool {
        let mut backoff = Backoff::new();
        loop {
            let old = self.state.load(Ordering::Acquire);
            if old == ERROR {
                return false;
            }

            let new = if is_error { ERROR } else { old - 1 };
            match self.state.compare_exchange_weak(
                old,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return is_error || new == 0,
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Remaining count, or `-1` if the latch has entered the errored state.
    /// For diagnostics only; do not branch production logic on this value
    /// since it may change the instant it is read.
    pub fn remaining(&self) -> i64 {
        let v = self.state.load(Ordering::Acquire);
        if v == ERROR {
            -1
        } else {
            v
        }
    }

    /// Whether the latch has entered the permanently-errored terminal
    /// state. Like `remaining`, this is a snapshot for diagnostics.
    pub fn is_errored(&self) -> bool {
        self.state.load(Ordering::Acquire) == ERROR
    }
}
