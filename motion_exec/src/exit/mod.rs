//! # Exit condition engine
//!
//! Decides when a motion terminates. Each motion carries an
//! [`ExitConditions`] composite which is evaluated once per tick after the
//! command has been issued. A motion is `Continue` until it either settles on
//! the target or is aborted, both of which are terminal.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod conditions;
mod params;

pub use conditions::*;
pub use params::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::Serialize;
use std::time::Duration;

// Internal
use crate::ctrl::{MotionKind, MotionTarget};
use crate::params::ConfigError;
use crate::pose::Pose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything an exit condition may look at on one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub pose: &'a Pose,
    pub target: &'a MotionTarget,

    /// Time since the start of the motion.
    pub elapsed: Duration,

    pub error: TickError,
}

/// Unsigned errors to the target on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TickError {
    /// Distance to the target point, zero for turns.
    ///
    /// Units: inches
    pub linear: f64,

    /// Heading error magnitude, zero if the target has no heading.
    ///
    /// Units: radians
    pub angular: f64,
}

/// An ordered set of exit conditions plus an optional abort predicate.
#[derive(Default)]
pub struct ExitConditions {
    conditions: Vec<ExitCondition>,

    abort: Option<Box<dyn FnMut() -> bool + Send>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// State of a motion after an exit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitStatus {
    Continue,
    Settled,
    Aborted(AbortCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortCause {
    /// The motion ran out of time.
    Timeout,

    /// The abort predicate fired.
    Interrupted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TickError {
    /// Measure the error between `pose` and an absolute target.
    pub fn measure(pose: &Pose, target: &MotionTarget) -> Self {
        let linear = match target.kind {
            MotionKind::Move => pose.distance_to(target.pose.x, target.pose.y),
            MotionKind::Turn => 0.0,
        };

        Self {
            linear,
            angular: target.heading_error(pose).abs(),
        }
    }
}

impl ExitStatus {
    pub fn is_terminal(&self) -> bool {
        *self != ExitStatus::Continue
    }
}

impl ExitConditions {
    /// An empty set, which never terminates on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set described by `params`, in the order settle, tolerance,
    /// thru smoothness, timeout.
    pub fn from_params(params: &ExitParams) -> Result<Self, ConfigError> {
        params.validate()?;

        let mut set = Self::new();

        if let Some(p) = &params.settle {
            set.push(ExitCondition::Settle(Settle::from_params(p)));
        }
        if let Some(p) = &params.tolerance {
            set.push(ExitCondition::Tolerance(Tolerance::from_params(p)));
        }
        if let Some(s) = params.thru_smoothness {
            set.push(ExitCondition::ThruSmoothness(ThruSmoothness::new(s)));
        }
        match params.timeout_ms {
            Some(t) => set.push(ExitCondition::Timeout(Timeout::new(Duration::from_millis(t)))),
            None => warn!("Exit conditions built without a timeout, motions may never end"),
        }

        Ok(set)
    }

    /// Append a condition, builder style.
    pub fn with(mut self, condition: ExitCondition) -> Self {
        self.push(condition);
        self
    }

    pub fn push(&mut self, condition: ExitCondition) {
        self.conditions.push(condition);
    }

    /// Install a predicate checked every tick, aborting the motion when it
    /// returns true.
    pub fn exit_if<F>(mut self, predicate: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.abort = Some(Box::new(predicate));
        self
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Clear the state of every condition, called at the start of a motion.
    pub fn reset(&mut self) {
        for c in self.conditions.iter_mut() {
            c.reset();
        }
    }

    /// Evaluate the set for one tick.
    ///
    /// Every condition is evaluated so their internal timers stay current.
    /// The abort predicate takes precedence, otherwise the first condition
    /// in order reporting a terminal status decides.
    pub fn evaluate(&mut self, input: &TickInput) -> ExitStatus {
        let mut status = ExitStatus::Continue;

        for c in self.conditions.iter_mut() {
            let s = c.evaluate(input);
            if s.is_terminal() && !status.is_terminal() {
                debug!("Exit condition {} reported {:?}", c.name(), s);
                status = s;
            }
        }

        if let Some(abort) = self.abort.as_mut() {
            if abort() {
                debug!("Abort predicate fired");
                return ExitStatus::Aborted(AbortCause::Interrupted);
            }
        }

        status
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ctrl::MotionFlags;
    use crate::pose::PoseRequest;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn input<'a>(pose: &'a Pose, target: &'a MotionTarget, ms: u64) -> TickInput<'a> {
        TickInput {
            pose,
            target,
            elapsed: Duration::from_millis(ms),
            error: TickError::measure(pose, target),
        }
    }

    #[test]
    fn test_tick_error() {
        let target = MotionTarget::move_to(PoseRequest::degrees(3.0, 4.0, 90.0), MotionFlags::empty());
        let err = TickError::measure(&Pose::new(0.0, 0.0, 0.0), &target);
        assert!((err.linear - 5.0).abs() < 1e-12);
        assert!((err.angular - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        let turn = MotionTarget::turn(-0.5, MotionFlags::empty());
        let err = TickError::measure(&Pose::new(10.0, 10.0, 0.0), &turn);
        assert_eq!(err.linear, 0.0);
        assert!((err.angular - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_abort_predicate_takes_precedence() {
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();

        let mut set = ExitConditions::new()
            .with(ExitCondition::Tolerance(Tolerance::new(Some(1.0), None)))
            .exit_if(move || f.load(Ordering::SeqCst));

        let target = MotionTarget::move_to(PoseRequest::point(10.0, 0.0), MotionFlags::empty());
        let far = Pose::origin();
        let near = Pose::new(10.0, 0.0, 0.0);

        assert_eq!(set.evaluate(&input(&far, &target, 10)), ExitStatus::Continue);
        assert_eq!(set.evaluate(&input(&near, &target, 20)), ExitStatus::Settled);

        flag.store(true, Ordering::SeqCst);
        assert_eq!(
            set.evaluate(&input(&near, &target, 30)),
            ExitStatus::Aborted(AbortCause::Interrupted)
        );
    }

    #[test]
    fn test_empty_set_never_ends() {
        let mut set = ExitConditions::new();
        let target = MotionTarget::turn(0.0, MotionFlags::empty());
        let pose = Pose::origin();

        assert_eq!(
            set.evaluate(&input(&pose, &target, 3_600_000)),
            ExitStatus::Continue
        );
    }

    #[test]
    fn test_from_params() {
        let params = ExitParams {
            settle: Some(SettleParams {
                dwell_ms: 200,
                initial_delay_ms: 0,
                linear_tolerance: Some(1.0),
                angular_tolerance_deg: Some(1.0),
            }),
            timeout_ms: Some(5000),
            ..Default::default()
        };
        let mut set = ExitConditions::from_params(&params).unwrap();
        assert_eq!(set.len(), 2);

        let target = MotionTarget::move_to(PoseRequest::point(48.0, 0.0), MotionFlags::empty());
        let pose = Pose::origin();
        assert_eq!(set.evaluate(&input(&pose, &target, 4990)), ExitStatus::Continue);
        assert_eq!(
            set.evaluate(&input(&pose, &target, 5000)),
            ExitStatus::Aborted(AbortCause::Timeout)
        );

        let mut bad = params.clone();
        bad.thru_smoothness = Some(-1.0);
        assert!(ExitConditions::from_params(&bad).is_err());
    }
}
