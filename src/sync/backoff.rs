//! Spin/yield backoff for CAS retry loops.
//!
//! Grounded on `concurrent::Backoff` in the wider pack this crate was
//! extracted from: a small exponential spin that escalates to
//! `thread::yield_now` once it has spun long enough to suspect
//! contention rather than a transient race.

/// Backoff strategy for compare-and-swap retry loops.
pub struct Backoff {
    step: u32,
    max_step: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            step: 0,
            max_step: 10,
        }
    }

    /// Spin for a short, exponentially increasing number of iterations.
    pub fn spin(&mut self) {
        for _ in 0..(1u32 << self.step.min(self.max_step)) {
            std::hint::spin_loop();
        }
        self.step = self.step.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    pub fn should_yield(&self) -> bool {
        self.step > 6
    }

    /// Spin or yield to the scheduler, whichever the current step calls for.
    pub fn snooze(&mut self) {
        if self.should_yield() {
            std::thread::yield_now();
        } else {
            self.spin();
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_advances_step() {
        let mut b = Backoff::new();
        assert_eq!(b.step, 0);
        b.spin();
        assert_eq!(b.step, 1);
        b.reset();
        assert_eq!(b.step, 0);
    }

    #[test]
    fn yields_after_enough_steps() {
        let mut b = Backoff::new();
        assert!(!b.should_yield());
        for _ in 0..7 {
            b.spin();
        }
        assert!(b.should_yield());
    }
}
