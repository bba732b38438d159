//! Rendezvous point: the per-transaction join barrier every one of its
//! partition actions reports back to.
//!
//! Grounded on `terminal_rvp_t` / `final_mb_rvp` in
//! `examples/original_source/include/dora/tpcc/dora_mbench.h`: a fixed
//! action count known up front, an object that runs exactly once when
//! the count reaches zero (or the first action reports an error), and
//! a sticky error slot so the terminal callback can distinguish commit
//! from abort.

use parking_lot::Mutex;

use crate::error::{DbError, Result};
use crate::sync::Countdown;

type TerminalCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Join barrier for one transaction's decomposed actions.
pub struct Rvp {
    countdown: Countdown,
    error: Mutex<Option<DbError>>,
    on_terminal: Mutex<Option<TerminalCallback>>,
}

impl Rvp {
    /// `action_count` must equal the number of actions that will call
    /// [`Rvp::post`] for this transaction; `on_terminal` runs exactly
    /// once, from whichever thread's `post` call is terminal.
    pub fn new(action_count: usize, on_terminal: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Self {
            countdown: Countdown::new(action_count),
            error: Mutex::new(None),
            on_terminal: Mutex::new(Some(Box::new(on_terminal))),
        }
    }

    /// Record one action's outcome. Runs the terminal callback if this
    /// call completed the barrier.
    pub fn post(&self, outcome: &Result<()>) {
        if let Err(e) = outcome {
            let mut guard = self.error.lock();
            if guard.is_none() {
                *guard = Some(e.clone());
            }
        }
        if self.countdown.post(outcome.is_err()) {
            self.fire_terminal();
        }
    }

    fn fire_terminal(&self) {
        let result = match self.error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        if let Some(cb) = self.on_terminal.lock().take() {
            cb(result);
        }
    }

    pub fn remaining(&self) -> i64 {
        self.countdown.remaining()
    }
}
