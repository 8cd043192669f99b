//! A single PID loop, shared by all controllers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use std::time::Duration;

// Internal
use super::PidGains;
use util::{maths::abs_cap, time::std_duration_to_millis};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID loop with a millisecond time base.
#[derive(Debug, Serialize, Clone)]
pub struct Pid {
    gains: PidGains,

    /// Previous error, `None` until the first update after a reset
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pid {
    /// Create a new loop with the given gains. The gains must already have
    /// been validated.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            prev_error: None,
            integral: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.prev_error = None;
        self.integral = 0.0;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn limit(&self) -> f64 {
        self.gains.limit
    }

    /// Get the output of the loop for the given error, `dt` after the previous
    /// update.
    pub fn update(&mut self, error: f64, dt: Duration) -> f64 {
        let dt_ms = std_duration_to_millis(dt);
        let g = &self.gains;

        // Accumulate the integral only close to the target, so the large
        // initial error of a motion does not wind it up
        let in_band = g.integral_threshold.map_or(true, |t| error.abs() < t);
        if in_band && dt_ms > 0.0 {
            self.integral += error * dt_ms;
        }

        // Bound the integral term to the loop saturation
        if g.k_i > 0.0 {
            let i_max = g.limit / g.k_i;
            self.integral = abs_cap(self.integral, i_max);
        }

        // No derivative on the first tick or without a time difference
        let deriv = match self.prev_error {
            Some(e) if dt_ms > 0.0 => (error - e) / dt_ms,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        let out = g.k_p * error + g.k_i * self.integral + g.k_d * deriv;

        abs_cap(out, g.limit)
    }
}
