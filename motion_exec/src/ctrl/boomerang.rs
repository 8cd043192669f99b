//! Boomerang controller, lead point pursuit towards a posed target.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::Vector2;
use std::f64::consts::PI;
use std::time::Duration;

// Internal
use super::{BoomerangParams, Controller, ControllerOutput, MotionKind, MotionTarget, Pid};
use crate::params::ConfigError;
use crate::pose::Pose;
use util::maths::{floor_magnitude, get_ang_dist, wrap_angle};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lead point pursuit controller.
///
/// The heading loop chases a carry point placed behind the target along the
/// target heading, at `lead_pct` of the current distance. The distance loop
/// tracks the literal target. As the robot closes in the carry point slides
/// onto the target, giving a curved approach that ends on the target
/// heading.
pub struct BoomerangController {
    params: BoomerangParams,
    linear: Pid,
    angular: Pid,

    /// Time spent inside both exit errors.
    settled_for: Duration,

    /// Output is held at zero until the next reset.
    done: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BoomerangController {
    pub fn new(params: BoomerangParams) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            linear: Pid::new(params.linear),
            angular: Pid::new(params.angular),
            params,
            settled_for: Duration::from_secs(0),
            done: false,
        })
    }

    /// The point the heading loop steers towards.
    ///
    /// For a target without a heading this is the target itself.
    pub fn carry_point(&self, pose: &Pose, target: &MotionTarget) -> Vector2<f64> {
        let goal = Vector2::new(target.pose.x, target.pose.y);

        match target.pose.heading {
            Some(h) => {
                let distance = (goal - pose.position()).norm();
                let along = Vector2::new(h.cos(), h.sin());

                // Reversing into a pose approaches it from the front
                let sign = if target.is_reverse() { -1.0 } else { 1.0 };

                goal - along * (sign * self.params.lead_pct * distance)
            }
            None => goal,
        }
    }

    /// Track the controller's own notion of being finished.
    fn update_settle(&mut self, linear_error: f64, heading_error: f64, dt: Duration) {
        let inside = linear_error.abs() < self.params.exit_error
            && heading_error.abs().to_degrees() < self.params.angular_exit_error_deg;

        if inside {
            self.settled_for += dt;
            if self.settled_for >= self.params.settle_time() {
                debug!("Boomerang settled, holding zero output");
                self.done = true;
            }
        } else {
            self.settled_for = Duration::from_secs(0);
        }
    }

    fn compute_move(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput {
        let distance = pose.distance_to(target.pose.x, target.pose.y);
        let reverse = target.is_reverse();
        let direction = if reverse { -1.0 } else { 1.0 };

        let (linear_error, angular_error) = if distance < self.params.min_error {
            // Close enough, finish on the target heading
            let bearing = pose.bearing_to(target.pose.x, target.pose.y);
            let projected = distance * (bearing - pose.heading).cos();

            (projected, target.heading_error(pose))
        } else {
            let carry = self.carry_point(pose, target);
            let mut bearing = pose.bearing_to(carry.x, carry.y);
            if reverse {
                bearing = wrap_angle(bearing + PI);
            }

            (distance * direction, get_ang_dist(pose.heading, bearing))
        };

        self.update_settle(distance, target.heading_error(pose), dt);

        let mut linear = self.linear.update(linear_error, dt);
        let angular = self.angular.update(angular_error, dt);

        if target.is_thru() {
            linear = direction * floor_magnitude(linear * direction, self.params.min_vel_for_thru);
        }

        trace!(
            "Boomerang: dist {:.2} in, ang_err {:.3} rad",
            distance,
            angular_error
        );

        ControllerOutput::new(linear, angular)
    }
}

impl Controller for BoomerangController {
    fn reset(&mut self) {
        self.linear.reset();
        self.angular.reset();
        self.settled_for = Duration::from_secs(0);
        self.done = false;
    }

    fn compute(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput {
        if self.done {
            return ControllerOutput::zero();
        }

        match target.kind {
            MotionKind::Move => self.compute_move(pose, target, dt),
            MotionKind::Turn => {
                let error = target.heading_error(pose);
                self.update_settle(0.0, error, dt);
                ControllerOutput::new(0.0, self.angular.update(error, dt))
            }
        }
    }

    fn supports(&self, _kind: MotionKind) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Boomerang"
    }
}
