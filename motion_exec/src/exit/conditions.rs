//! Primitive exit conditions.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Duration;

// Internal
use super::{AbortCause, ExitStatus, SettleParams, TickInput, ToleranceParams};
use crate::ctrl::MotionKind;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A primitive exit condition.
#[derive(Debug, Clone)]
pub enum ExitCondition {
    Settle(Settle),
    Tolerance(Tolerance),
    Timeout(Timeout),
    ThruSmoothness(ThruSmoothness),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Settles once the error has stayed within tolerance for an unbroken dwell
/// time.
#[derive(Debug, Clone)]
pub struct Settle {
    dwell: Duration,
    initial_delay: Duration,

    /// Units: inches
    linear: Option<f64>,

    /// Units: radians
    angular: Option<f64>,

    /// Motion time at which the error last entered tolerance.
    inside_since: Option<Duration>,
}

/// Settles the first tick the error is within tolerance.
#[derive(Debug, Clone)]
pub struct Tolerance {
    /// Units: inches
    linear: Option<f64>,

    /// Units: radians
    angular: Option<f64>,
}

/// Aborts once the motion has run for too long.
#[derive(Debug, Clone)]
pub struct Timeout {
    bound: Duration,
}

/// Settles THRU motions as soon as they are roughly at the target.
#[derive(Debug, Clone)]
pub struct ThruSmoothness {
    /// Units: inches for moves, degrees for turns
    smoothness: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ExitCondition {
    pub fn evaluate(&mut self, input: &TickInput) -> ExitStatus {
        match self {
            ExitCondition::Settle(c) => c.evaluate(input),
            ExitCondition::Tolerance(c) => c.evaluate(input),
            ExitCondition::Timeout(c) => c.evaluate(input),
            ExitCondition::ThruSmoothness(c) => c.evaluate(input),
        }
    }

    pub fn reset(&mut self) {
        if let ExitCondition::Settle(c) = self {
            c.reset();
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCondition::Settle(_) => "Settle",
            ExitCondition::Tolerance(_) => "Tolerance",
            ExitCondition::Timeout(_) => "Timeout",
            ExitCondition::ThruSmoothness(_) => "ThruSmoothness",
        }
    }
}

impl Settle {
    /// Create a new settle condition. Angular tolerance in radians.
    pub fn new(dwell: Duration, linear: Option<f64>, angular: Option<f64>) -> Self {
        Self {
            dwell,
            initial_delay: Duration::from_secs(0),
            linear,
            angular,
            inside_since: None,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn from_params(params: &SettleParams) -> Self {
        Self::new(
            Duration::from_millis(params.dwell_ms),
            params.linear_tolerance,
            params.angular_tolerance_deg.map(f64::to_radians),
        )
        .with_initial_delay(Duration::from_millis(params.initial_delay_ms))
    }

    pub fn reset(&mut self) {
        self.inside_since = None;
    }

    pub fn evaluate(&mut self, input: &TickInput) -> ExitStatus {
        if input.elapsed < self.initial_delay {
            return ExitStatus::Continue;
        }

        if !within(self.linear, self.angular, input) {
            self.inside_since = None;
            return ExitStatus::Continue;
        }

        let since = *self.inside_since.get_or_insert(input.elapsed);
        let dwelt = input.elapsed.checked_sub(since).unwrap_or_default();
        if dwelt >= self.dwell {
            ExitStatus::Settled
        } else {
            ExitStatus::Continue
        }
    }
}

impl Tolerance {
    /// Create a new tolerance condition. Angular tolerance in radians.
    pub fn new(linear: Option<f64>, angular: Option<f64>) -> Self {
        Self { linear, angular }
    }

    pub fn from_params(params: &ToleranceParams) -> Self {
        Self::new(params.linear, params.angular_deg.map(f64::to_radians))
    }

    pub fn evaluate(&mut self, input: &TickInput) -> ExitStatus {
        if within(self.linear, self.angular, input) {
            ExitStatus::Settled
        } else {
            ExitStatus::Continue
        }
    }
}

impl Timeout {
    pub fn new(bound: Duration) -> Self {
        Self { bound }
    }

    pub fn evaluate(&mut self, input: &TickInput) -> ExitStatus {
        if input.elapsed >= self.bound {
            ExitStatus::Aborted(AbortCause::Timeout)
        } else {
            ExitStatus::Continue
        }
    }
}

impl ThruSmoothness {
    pub fn new(smoothness: f64) -> Self {
        Self { smoothness }
    }

    pub fn evaluate(&mut self, input: &TickInput) -> ExitStatus {
        if !input.target.is_thru() {
            return ExitStatus::Continue;
        }

        let error = match input.target.kind {
            MotionKind::Move => input.error.linear,
            MotionKind::Turn => input.error.angular.to_degrees(),
        };

        if error < self.smoothness {
            ExitStatus::Settled
        } else {
            ExitStatus::Continue
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// True if every configured tolerance holds. A tolerance which is not
/// configured always holds.
fn within(linear: Option<f64>, angular: Option<f64>, input: &TickInput) -> bool {
    linear.map_or(true, |t| input.error.linear <= t)
        && angular.map_or(true, |t| input.error.angular <= t)
}
