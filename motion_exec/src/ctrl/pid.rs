//! Point-to-point PID controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use std::f64::consts::{FRAC_PI_2, PI};
use std::time::Duration;

// Internal
use super::{Controller, ControllerOutput, MotionKind, MotionTarget, Pid, PidParams};
use crate::params::ConfigError;
use crate::pose::Pose;
use util::maths::{floor_magnitude, get_ang_dist, wrap_angle};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Independent distance and heading PID loops.
///
/// Far from the target the heading loop tracks the bearing to the target.
/// Inside `min_error` the bearing is no longer tracked: the heading loop
/// turns to the final heading if one was given, and the distance loop only
/// sees the distance projected onto the robot's heading. Between `min_error`
/// and twice `min_error` the bearing correction fades out.
pub struct PidController {
    params: PidParams,
    linear: Pid,
    angular: Pid,

    /// Set once the robot has been inside `min_error` during this motion.
    can_reverse: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    pub fn new(params: PidParams) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            linear: Pid::new(params.linear),
            angular: Pid::new(params.angular),
            params,
            can_reverse: false,
        })
    }

    fn compute_move(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput {
        let (tx, ty) = (target.pose.x, target.pose.y);
        let distance = pose.distance_to(tx, ty);
        let reverse = target.is_reverse();

        // Direction the robot has to travel in, accounting for reverse
        let mut bearing = pose.bearing_to(tx, ty);
        if reverse {
            bearing = wrap_angle(bearing + PI);
        }
        let mut bearing_error = get_ang_dist(pose.heading, bearing);

        let min_error = self.params.min_error;
        let (linear_error, angular_error) = if distance < min_error {
            self.can_reverse = true;

            let direction = if reverse { -1.0 } else { 1.0 };
            let projected = distance * bearing_error.cos() * direction;

            (projected, target.heading_error(pose))
        } else {
            let mut direction = if reverse { -1.0 } else { 1.0 };

            // After an overshoot drive back instead of turning round
            if self.can_reverse && bearing_error.abs() > FRAC_PI_2 {
                bearing_error = wrap_angle(bearing_error + PI);
                direction = -direction;
            }

            let fade = if distance < 2.0 * min_error {
                (distance - min_error) / min_error
            } else {
                1.0
            };

            (distance * direction, bearing_error * fade)
        };

        let mut linear = self.linear.update(linear_error, dt);
        let angular = self.angular.update(angular_error, dt);

        if target.is_thru() {
            let floor = self.params.min_vel_for_thru;
            linear = if reverse {
                -floor_magnitude(-linear, floor)
            } else {
                floor_magnitude(linear, floor)
            };
        }

        trace!(
            "PID move: dist {:.2} in, lin_err {:.2}, ang_err {:.3} rad",
            distance,
            linear_error,
            angular_error
        );

        ControllerOutput::new(linear, angular)
    }
}

impl Controller for PidController {
    fn reset(&mut self) {
        self.linear.reset();
        self.angular.reset();
        self.can_reverse = false;
    }

    fn compute(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput {
        match target.kind {
            MotionKind::Move => self.compute_move(pose, target, dt),
            MotionKind::Turn => {
                let angular = self.angular.update(target.heading_error(pose), dt);
                ControllerOutput::new(0.0, angular)
            }
        }
    }

    fn supports(&self, _kind: MotionKind) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "PID"
    }
}
