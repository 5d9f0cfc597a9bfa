//! Cycle clock.
use std::{
    thread,
    time::{Duration, Instant},
};

/// Timer to synchronize the scheduling loop with the cycle rate of the virtual CPU.
///
/// It is designed to work with the yielding cooperative pattern
/// of the interpreter. Between cycles control is back with the
/// scheduler, and time elapses while it polls devices and draws.
/// That elapsed time is taken into account when waiting for the
/// next cycle.
pub struct Clock {
    period: Duration,
    last: Instant,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    ///
    /// A zero period never waits.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last: Instant::now(),
        }
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.last = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    pub fn wait(&mut self) {
        if self.period.is_zero() {
            return;
        }

        loop {
            if self.last.elapsed() < self.period {
                // Sleep does not have enough resolution at high
                // cycle rates.
                //
                // Spinning a loop causes high CPU usage and fan madness.
                //
                // Yielding in a loop is the best alternative.
                thread::yield_now();
            } else {
                // Reset back to zero, rather than trying to catch up.
                //
                // If the terminal was suspended, and a large amount of
                // time has elapsed until it is resumed, the VM should
                // simply continue at the next cycle running at its usual speed.
                self.reset();
                return;
            }
        }
    }
}
