//! # Differential drive chassis
//!
//! The chassis ties the pose estimate, a controller, an exit condition set
//! and the drivetrain together. A motion runs synchronously in the calling
//! thread:
//!
//! 1. resolve the target and reset the controller and exit conditions,
//! 2. every tick read the pose, compute the controller output, convert it to
//!    wheel velocities, issue them and evaluate the exit conditions,
//! 3. on termination apply the brake (unless THRU) and report the outcome.
//!
//! The chassis owns a default controller and exit condition set. The `_with`
//! motions take another controller (and optionally exit conditions) for that
//! one motion. Every motion carries a speed in percent of
//! `max_wheel_speed`, which caps both sides for its duration.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod ticker;

pub use params::*;
pub use ticker::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace};
use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;

// Internal
use crate::ctrl::{Controller, ControllerOutput, MotionFlags, MotionKind, MotionTarget};
use crate::exit::{ExitConditions, ExitStatus, TickError, TickInput};
use crate::loc::LocMgr;
use crate::params::ConfigError;
use crate::pose::{Pose, PoseRequest};
use util::maths::{abs_cap, lin_map, wrap_angle};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The drive actuators. A pure sink, nothing is read back.
pub trait Drivetrain {
    /// Command both sides of the drivetrain.
    fn set_velocity(&mut self, wheels: WheelVelocities);

    /// Stop the drivetrain with the given brake behaviour.
    fn brake(&mut self, mode: BrakeMode);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-side wheel velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WheelVelocities {
    /// Units: inches/second
    pub left: f64,

    /// Units: inches/second
    pub right: f64,
}

/// Outcome of one motion.
#[derive(Debug, Clone, Serialize)]
pub struct MotionReport {
    /// Absolute target the motion ran towards.
    pub target: MotionTarget,

    pub status: ExitStatus,

    /// Time from the first to the last tick.
    pub elapsed: Duration,

    /// Number of ticks run.
    pub ticks: u64,

    pub final_pose: Pose,
}

/// Differential drive chassis.
pub struct DiffChassis<D, T> {
    base: MotionLoop<D, T>,

    /// Used by motions which do not name a controller.
    controller: Box<dyn Controller>,

    /// Used by motions which do not name exit conditions.
    exit: ExitConditions,
}

/// Everything a motion needs apart from its controller and exit conditions.
struct MotionLoop<D, T> {
    params: ChassisParams,
    drive: D,
    ticker: T,
    loc: LocMgr,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Drivetrain behaviour at the end of a motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrakeMode {
    /// Let the wheels spin freely.
    Coast,

    /// Short the motors.
    Brake,

    /// Actively hold position.
    Hold,
}

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("The {controller} controller cannot execute {kind:?} motions")]
    UnsupportedMotion {
        controller: &'static str,
        kind: MotionKind,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for BrakeMode {
    fn default() -> Self {
        BrakeMode::Coast
    }
}

impl WheelVelocities {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Convert a controller output into wheel velocities, clamping each side
    /// to `max_speed`.
    pub fn from_output(out: ControllerOutput, track_width: f64, max_speed: f64) -> Self {
        let half = out.angular * track_width / 2.0;

        Self {
            left: abs_cap(out.linear - half, max_speed),
            right: abs_cap(out.linear + half, max_speed),
        }
    }
}

impl MotionReport {
    pub fn is_settled(&self) -> bool {
        self.status == ExitStatus::Settled
    }
}

impl<D, T> DiffChassis<D, T>
where
    D: Drivetrain,
    T: Ticker,
{
    pub fn new(
        params: ChassisParams,
        drive: D,
        ticker: T,
        loc: LocMgr,
        controller: Box<dyn Controller>,
        exit: ExitConditions,
    ) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            base: MotionLoop {
                params,
                drive,
                ticker,
                loc,
            },
            controller,
            exit,
        })
    }

    pub fn params(&self) -> &ChassisParams {
        &self.base.params
    }

    pub fn loc(&self) -> &LocMgr {
        &self.base.loc
    }

    pub fn drive(&self) -> &D {
        &self.base.drive
    }

    pub fn ticker(&self) -> &T {
        &self.base.ticker
    }

    /// Drive to `target` with the default controller and exit conditions, at
    /// most at `max_speed` percent.
    ///
    /// With RELATIVE the target is given in the robot frame at the start of
    /// the motion, X forwards and Y to the left, and its heading is added to
    /// the current one.
    pub fn move_to(
        &mut self,
        target: PoseRequest,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        self.motion(MotionTarget::move_to(target, flags), None, None, max_speed)
    }

    /// Drive to `target` with `controller` and the default exit conditions.
    pub fn move_with(
        &mut self,
        target: PoseRequest,
        controller: &mut dyn Controller,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        self.motion(
            MotionTarget::move_to(target, flags),
            Some(controller),
            None,
            max_speed,
        )
    }

    /// Drive to `target` with `controller`, ending on `exit`.
    pub fn move_with_exit(
        &mut self,
        target: PoseRequest,
        controller: &mut dyn Controller,
        exit: &mut ExitConditions,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        self.motion(
            MotionTarget::move_to(target, flags),
            Some(controller),
            Some(exit),
            max_speed,
        )
    }

    /// Turn on the spot to `heading` (radians) with the default controller
    /// and exit conditions. With RELATIVE the heading is added to the current
    /// one.
    pub fn turn(
        &mut self,
        heading: f64,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        self.motion(MotionTarget::turn(heading, flags), None, None, max_speed)
    }

    pub fn turn_with(
        &mut self,
        heading: f64,
        controller: &mut dyn Controller,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        self.motion(
            MotionTarget::turn(heading, flags),
            Some(controller),
            None,
            max_speed,
        )
    }

    pub fn turn_with_exit(
        &mut self,
        heading: f64,
        controller: &mut dyn Controller,
        exit: &mut ExitConditions,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        self.motion(
            MotionTarget::turn(heading, flags),
            Some(controller),
            Some(exit),
            max_speed,
        )
    }

    /// Turn on the spot to face a point, or to face away from it with
    /// REVERSE, using the default controller and exit conditions.
    pub fn turn_to_point(
        &mut self,
        x: f64,
        y: f64,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        let target = self.point_turn(x, y, flags);
        self.motion(target, None, None, max_speed)
    }

    pub fn turn_to_point_with(
        &mut self,
        x: f64,
        y: f64,
        controller: &mut dyn Controller,
        max_speed: f64,
        flags: MotionFlags,
    ) -> Result<MotionReport, MotionError> {
        let target = self.point_turn(x, y, flags);
        self.motion(target, Some(controller), None, max_speed)
    }

    /// Teleop pass-through. Inputs range from -100 to 100, a positive
    /// `angular` turns clockwise.
    pub fn arcade(&mut self, linear: f64, angular: f64) {
        let lin = self.scale_input(linear);
        let ang = self.scale_input(angular);
        let max = self.base.params.max_wheel_speed;

        self.base.drive.set_velocity(WheelVelocities::new(
            abs_cap(lin + ang, max),
            abs_cap(lin - ang, max),
        ));
    }

    /// Teleop pass-through of each side. Inputs range from -100 to 100.
    pub fn tank(&mut self, left: f64, right: f64) {
        let vel = WheelVelocities::new(self.scale_input(left), self.scale_input(right));
        self.base.drive.set_velocity(vel);
    }

    fn scale_input(&self, input: f64) -> f64 {
        let max = self.base.params.max_wheel_speed;
        lin_map((-100.0, 100.0), (-max, max), abs_cap(input, 100.0))
    }

    /// Absolute turn target facing the point `(x, y)`.
    fn point_turn(&self, x: f64, y: f64, flags: MotionFlags) -> MotionTarget {
        let pose = self.base.loc.get_pose();
        let point = resolve(
            &pose,
            &MotionTarget::move_to(PoseRequest::point(x, y), flags),
        )
        .pose;

        let mut heading = pose.bearing_to(point.x, point.y);
        if flags.contains(MotionFlags::REVERSE) {
            heading = wrap_angle(heading + PI);
        }

        // The point is already resolved, the heading is absolute
        let mut abs_flags = MotionFlags::empty();
        for f in &[MotionFlags::THRU, MotionFlags::REVERSE] {
            if flags.contains(*f) {
                abs_flags |= *f;
            }
        }

        MotionTarget::turn(heading, abs_flags)
    }

    /// Run a motion, falling back on the defaults.
    fn motion(
        &mut self,
        target: MotionTarget,
        controller: Option<&mut dyn Controller>,
        exit: Option<&mut ExitConditions>,
        max_speed: f64,
    ) -> Result<MotionReport, MotionError> {
        let controller: &mut dyn Controller = match controller {
            Some(c) => c,
            None => self.controller.as_mut(),
        };
        let exit: &mut ExitConditions = match exit {
            Some(e) => e,
            None => &mut self.exit,
        };

        self.base.run(target, controller, exit, max_speed)
    }
}

impl<D, T> MotionLoop<D, T>
where
    D: Drivetrain,
    T: Ticker,
{
    /// Wheel speed limit of a motion run at `max_speed` percent. The
    /// percentage is clamped to [0, 100], NaN counts as 0.
    fn speed_limit(&self, max_speed: f64) -> f64 {
        self.params.max_wheel_speed * max_speed.max(0.0).min(100.0) / 100.0
    }

    /// Run one motion to completion.
    fn run(
        &mut self,
        target: MotionTarget,
        controller: &mut dyn Controller,
        exit: &mut ExitConditions,
        max_speed: f64,
    ) -> Result<MotionReport, MotionError> {
        if !controller.supports(target.kind) {
            return Err(MotionError::UnsupportedMotion {
                controller: controller.name(),
                kind: target.kind,
            });
        }

        let target = resolve(&self.loc.get_pose(), &target);
        let speed_limit = self.speed_limit(max_speed);

        controller.reset();
        exit.reset();

        info!(
            "{} {:?} to ({:.2}, {:.2}, {:?} deg) at {:.1} in/s [{:?}]",
            controller.name(),
            target.kind,
            target.pose.x,
            target.pose.y,
            target.pose.heading.map(f64::to_degrees),
            speed_limit,
            target.flags
        );

        let period = self.params.tick_period();
        let start = self.ticker.now();
        let mut prev_tick = start;
        let mut ticks = 0u64;

        let (status, elapsed) = loop {
            let tick_start = self.ticker.now();
            let dt = tick_start - prev_tick;
            prev_tick = tick_start;

            let pose = self.loc.get_pose();
            let out = controller.compute(&pose, &target, dt);
            let wheels =
                WheelVelocities::from_output(out, self.params.track_width, speed_limit);
            self.drive.set_velocity(wheels);
            ticks += 1;

            let elapsed = tick_start - start;
            let status = exit.evaluate(&TickInput {
                pose: &pose,
                target: &target,
                elapsed,
                error: TickError::measure(&pose, &target),
            });

            trace!(
                "Tick {}: pose ({:.2}, {:.2}, {:.2} deg), wheels ({:.2}, {:.2})",
                ticks,
                pose.x,
                pose.y,
                pose.heading_deg(),
                wheels.left,
                wheels.right
            );

            if status.is_terminal() {
                break (status, elapsed);
            }

            self.ticker.sleep_until(tick_start + period);
        };

        if target.is_thru() {
            debug!("THRU motion, drivetrain left running");
        } else {
            self.drive.brake(self.params.brake_mode);
        }

        let report = MotionReport {
            target,
            status,
            elapsed,
            ticks,
            final_pose: self.loc.get_pose(),
        };

        info!(
            "Motion ended {:?} after {:.3} s, pose ({:.2}, {:.2}, {:.2} deg)",
            report.status,
            report.elapsed.as_secs_f64(),
            report.final_pose.x,
            report.final_pose.y,
            report.final_pose.heading_deg()
        );

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Turn a RELATIVE target into an absolute one using `pose`. Other targets
/// are returned unchanged.
pub fn resolve(pose: &Pose, target: &MotionTarget) -> MotionTarget {
    if !target.flags.contains(MotionFlags::RELATIVE) {
        return *target;
    }

    let mut abs = *target;
    abs.pose.heading = target.pose.heading.map(|h| wrap_angle(pose.heading + h));

    if target.kind == MotionKind::Move {
        let offset = Rotation2::new(pose.heading) * Vector2::new(target.pose.x, target.pose.y);
        abs.pose.x = pose.x + offset.x;
        abs.pose.y = pose.y + offset.y;
    }

    abs
}
