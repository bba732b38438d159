//! Single-bit wait/notify/cancel event.
//!
//! Used to wake a worker thread blocked on a commit request: the Flusher
//! calls `notify()` once the request's LSN is durable, or `cancel()` if
//! the request is being torn down without ever becoming durable. Multiple
//! notifications before a waiter arrives are coalesced into one flag.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct State {
    notified: bool,
    cancelled: bool,
}

/// A single-bit event with an optional cancellation signal.
///
/// `Notifier` is cheap to clone (it is reference-counted internally via
/// `Arc`), so the same handle can be held by both the waiter and whichever
/// thread will eventually call `notify`/`cancel`.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    condvar: Condvar,
}

/// Outcome of a `wait()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Notified,
    Cancelled,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Block until either `notify()` or `cancel()` has been called.
    /// Infallible: this primitive has no error kind of its own.
    pub fn wait(&self) -> WaitOutcome {
        let mut state = self.inner.state.lock();
        while !state.notified && !state.cancelled {
            self.inner.condvar.wait(&mut state);
        }
        if state.cancelled {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::Notified
        }
    }

    /// Signal successful completion and wake any waiter.
    pub fn notify(&self) {
        let mut state = self.inner.state.lock();
        state.notified = true;
        self.inner.condvar.notify_all();
    }

    /// Signal cancellation and wake any waiter.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.cancelled = true;
        self.inner.condvar.notify_all();
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn notify_before_wait_is_not_lost() {
        let n = Notifier::new();
        n.notify();
        assert_eq!(n.wait(), WaitOutcome::Notified);
    }

    #[test]
    fn cancel_before_wait_is_not_lost() {
        let n = Notifier::new();
        n.cancel();
        assert_eq!(n.wait(), WaitOutcome::Cancelled);
    }

    #[test]
    fn waiter_is_woken_by_notify_from_another_thread() {
        let n = Notifier::new();
        let n2 = n.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            n2.notify();
        });
        assert_eq!(n.wait(), WaitOutcome::Notified);
        handle.join().unwrap();
    }

    #[test]
    fn repeated_notifications_coalesce() {
        let n = Notifier::new();
        n.notify();
        n.notify();
        assert_eq!(n.wait(), WaitOutcome::Notified);
        assert_eq!(n.wait(), WaitOutcome::Notified);
    }
}
