//! Motion loop cadence.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Source of time for the motion loop.
pub trait Ticker {
    /// Time since an arbitrary origin fixed at construction.
    fn now(&self) -> Duration;

    /// Block until `deadline`, as measured by `now`. Returns straight away if
    /// the deadline has already passed.
    fn sleep_until(&mut self, deadline: Duration);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Wall clock ticker, sleeping the thread for the remainder of each tick.
///
/// Overruns are logged and not caught up.
#[derive(Debug)]
pub struct SystemTicker {
    origin: Instant,
    num_consec_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SystemTicker {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            num_consec_overruns: 0,
        }
    }

    /// Number of consecutive ticks which overran their period.
    pub fn num_consec_overruns(&self) -> u64 {
        self.num_consec_overruns
    }
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for SystemTicker {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&mut self, deadline: Duration) {
        let now = self.now();

        match deadline.checked_sub(now) {
            Some(d) => {
                self.num_consec_overruns = 0;
                thread::sleep(d);
            }
            None => {
                self.num_consec_overruns += 1;
                warn!(
                    "Motion tick overran by {:.06} s",
                    (now - deadline).as_secs_f64()
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_system_ticker() {
        let mut ticker = SystemTicker::new();

        let deadline = ticker.now() + Duration::from_millis(20);
        ticker.sleep_until(deadline);
        assert!(ticker.now() >= deadline);
        assert_eq!(ticker.num_consec_overruns(), 0);

        ticker.sleep_until(Duration::from_millis(0));
        assert_eq!(ticker.num_consec_overruns(), 1);
    }
}
