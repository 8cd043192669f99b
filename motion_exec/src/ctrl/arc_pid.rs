//! Arc-constrained PID controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use std::f64::consts::{FRAC_PI_2, PI};
use std::time::Duration;

// Internal
use super::{ArcPidParams, Controller, ControllerOutput, MotionKind, MotionTarget, Pid};
use crate::params::{positive, ConfigError};
use crate::pose::Pose;
use util::maths::{floor_magnitude, get_ang_dist, slew, wrap_angle};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drives the constant curvature arc which joins the current pose to the
/// target, tangent to the current direction of travel.
///
/// Only the distance along the arc is closed-loop. The angular rate is
/// derived from the arc curvature and the linear speed, so the wheel speed
/// differential always matches the arc geometry.
///
/// A target more than a quarter turn off the direction of travel is reached
/// by flipping the direction of travel, so overshoots are recovered by
/// backing onto the target.
pub struct ArcPidController {
    params: ArcPidParams,
    linear: Pid,

    /// Units: inches
    track_width: f64,

    /// Linear command of the previous tick, for the slew limit.
    prev_linear: f64,
}

/// Geometry of the arc to the target.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Arc {
    /// Signed curvature in the direction of travel.
    ///
    /// Units: 1/inches
    curvature: f64,

    /// Signed length of the path still to travel.
    ///
    /// Units: inches
    length: f64,

    /// The arc is driven against the requested direction of travel.
    flipped: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArcPidController {
    pub fn new(params: ArcPidParams, track_width: f64) -> Result<Self, ConfigError> {
        params.validate()?;
        positive("track_width", track_width)?;

        Ok(Self {
            linear: Pid::new(params.linear),
            params,
            track_width,
            prev_linear: 0.0,
        })
    }

    /// Compute the arc from `pose` to the target point.
    ///
    /// For a chord of length `d` making an angle `alpha` with the direction of
    /// travel, the tangent arc has curvature `2 sin(alpha) / d` and length
    /// `d alpha / sin(alpha)`.
    fn arc(&self, pose: &Pose, target: &MotionTarget) -> Arc {
        let d = pose.distance_to(target.pose.x, target.pose.y);

        let mut travel = pose.heading;
        if target.is_reverse() {
            travel = wrap_angle(travel + PI);
        }
        let mut alpha = get_ang_dist(travel, pose.bearing_to(target.pose.x, target.pose.y));

        // Target behind the direction of travel
        let flipped = alpha.abs() > FRAC_PI_2;
        if flipped {
            alpha -= PI.copysign(alpha);
        }

        if d < self.params.min_error {
            // Too close for a meaningful arc, close the projected distance
            return Arc {
                curvature: 0.0,
                length: d * alpha.cos(),
                flipped,
            };
        }

        let sin_a = alpha.sin();
        let length = if sin_a.abs() < 1e-9 {
            d
        } else {
            d * alpha / sin_a
        };

        Arc {
            curvature: 2.0 * sin_a / d,
            length,
            flipped,
        }
    }
}

impl Controller for ArcPidController {
    fn reset(&mut self) {
        self.linear.reset();
        self.prev_linear = 0.0;
    }

    fn compute(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput {
        let arc = self.arc(pose, target);

        // Speed along the direction of travel
        let mut speed = self.linear.update(arc.length, dt);

        // Keep the outer wheel within the limit without bending the arc
        let speed_limit =
            self.params.max_speed / (1.0 + arc.curvature.abs() * self.track_width / 2.0);
        speed = speed.max(-speed_limit).min(speed_limit);

        if target.is_thru() {
            speed = floor_magnitude(speed, self.params.min_vel_for_thru.min(speed_limit));
        }

        let backwards = target.is_reverse() != arc.flipped;
        let linear = if backwards { -speed } else { speed };
        let linear = slew(self.prev_linear, linear, self.params.slew);
        self.prev_linear = linear;

        // Heading follows the arc at whatever speed the robot is moving
        let angular = linear.abs() * arc.curvature;

        trace!(
            "Arc PID: length {:.2} in, curvature {:.4} 1/in, flipped {}",
            arc.length,
            arc.curvature,
            arc.flipped
        );

        ControllerOutput::new(linear, angular)
    }

    fn supports(&self, kind: MotionKind) -> bool {
        kind == MotionKind::Move
    }

    fn name(&self) -> &'static str {
        "Arc PID"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ctrl::{MotionFlags, PidGains};
    use crate::pose::PoseRequest;

    const TICK: Duration = Duration::from_millis(10);
    const TW: f64 = 12.0;

    fn params(slew: f64) -> ArcPidParams {
        ArcPidParams {
            linear: PidGains::new(6.0, 0.0, 30.0, 48.0),
            min_error: 3.0,
            slew,
            max_speed: 48.0,
            min_vel_for_thru: 0.0,
        }
    }

    fn wheels(out: ControllerOutput) -> (f64, f64) {
        (
            out.linear - out.angular * TW / 2.0,
            out.linear + out.angular * TW / 2.0,
        )
    }

    #[test]
    fn test_straight_ahead_has_no_turn() {
        let mut ctrl = ArcPidController::new(params(0.0), TW).unwrap();
        let target = MotionTarget::move_to(PoseRequest::point(48.0, 0.0), MotionFlags::empty());

        for x in &[0.0, 10.0, 30.0, 46.0] {
            let out = ctrl.compute(&Pose::new(*x, 0.0, 0.0), &target, TICK);
            assert_eq!(out.angular, 0.0);

            let (l, r) = wheels(out);
            assert_eq!(l, r);
        }
    }

    #[test]
    fn test_arc_geometry() {
        let ctrl = ArcPidController::new(params(0.0), TW).unwrap();

        // Quarter circle of radius 10 to the left
        let target = MotionTarget::move_to(PoseRequest::point(10.0, 10.0), MotionFlags::empty());
        let arc = ctrl.arc(&Pose::origin(), &target);
        assert!((arc.curvature - 0.1).abs() < 1e-9);
        assert!((arc.length - 5.0 * PI).abs() < 1e-9);

        // Same arc driven backwards
        let target = MotionTarget::move_to(PoseRequest::point(-10.0, 10.0), MotionFlags::REVERSE);
        let arc = ctrl.arc(&Pose::origin(), &target);
        assert!((arc.curvature + 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_outer_wheel_limited_and_ratio_kept() {
        let mut ctrl = ArcPidController::new(params(0.0), TW).unwrap();
        let target = MotionTarget::move_to(PoseRequest::point(10.0, 10.0), MotionFlags::empty());

        let out = ctrl.compute(&Pose::origin(), &target, TICK);
        let (l, r) = wheels(out);

        assert!((r - 48.0).abs() < 1e-9);
        // Radius 10, wheels at radius 4 and 16
        assert!((l / r - 4.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_slew_limits_linear_change() {
        let mut ctrl = ArcPidController::new(params(4.0), TW).unwrap();
        let target = MotionTarget::move_to(PoseRequest::point(48.0, 0.0), MotionFlags::empty());

        let first = ctrl.compute(&Pose::origin(), &target, TICK);
        let second = ctrl.compute(&Pose::origin(), &target, TICK);
        assert_eq!(first.linear, 4.0);
        assert_eq!(second.linear, 8.0);

        ctrl.reset();
        assert_eq!(ctrl.compute(&Pose::origin(), &target, TICK).linear, 4.0);
    }

    #[test]
    fn test_target_behind_is_reversed_onto() {
        let mut ctrl = ArcPidController::new(params(0.0), TW).unwrap();
        let target = MotionTarget::move_to(PoseRequest::point(-24.0, 0.0), MotionFlags::empty());

        let arc = ctrl.arc(&Pose::origin(), &target);
        assert!(arc.flipped);
        assert_eq!(arc.length, 24.0);

        let out = ctrl.compute(&Pose::origin(), &target, TICK);
        assert_eq!(out.linear, -48.0);
        assert_eq!(out.angular, 0.0);

        // Behind a REVERSE motion means driving forwards
        let target = MotionTarget::move_to(PoseRequest::point(24.0, 0.0), MotionFlags::REVERSE);
        ctrl.reset();
        assert_eq!(ctrl.compute(&Pose::origin(), &target, TICK).linear, 48.0);
    }

    #[test]
    fn test_overshoot_backs_onto_target() {
        let mut ctrl = ArcPidController::new(params(0.0), TW).unwrap();
        let target = MotionTarget::move_to(PoseRequest::point(48.0, 0.0), MotionFlags::empty());

        // 6 inches past the target, beyond min_error
        let out = ctrl.compute(&Pose::new(54.0, 0.0, 0.0), &target, TICK);
        assert!((out.linear + 36.0).abs() < 1e-9);
        assert_eq!(out.angular, 0.0);

        // Just inside min_error the projection drives back as well
        ctrl.reset();
        let out = ctrl.compute(&Pose::new(50.0, 0.0, 0.0), &target, TICK);
        assert!((out.linear + 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_loop_for_target_nearly_behind() {
        let ctrl = ArcPidController::new(params(0.0), TW).unwrap();
        let a = 170f64.to_radians();
        let target = MotionTarget::move_to(
            PoseRequest::point(24.0 * a.cos(), 24.0 * a.sin()),
            MotionFlags::empty(),
        );

        let arc = ctrl.arc(&Pose::origin(), &target);
        assert!(arc.flipped);
        // Short reversing arc instead of a loop of about 410 in
        assert!(arc.length > 24.0 && arc.length < 24.2);

        // Backing up with the tail swinging towards the target turns clockwise
        assert!(arc.curvature < 0.0);
    }

    #[test]
    fn test_moves_only() {
        let ctrl = ArcPidController::new(params(0.0), TW).unwrap();
        assert!(ctrl.supports(MotionKind::Move));
        assert!(!ctrl.supports(MotionKind::Turn));
    }
}
