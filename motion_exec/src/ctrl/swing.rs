//! Swing turns, pivoting about one side of the drivetrain.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Duration;

// Internal
use super::{Controller, ControllerOutput, MotionKind, MotionTarget, Pid, SwingParams, SwingSide};
use crate::params::{positive, ConfigError};
use crate::pose::Pose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Angular-only PID which keeps one side of the drivetrain still.
///
/// The linear component of the output is chosen so that, after the
/// differential drive conversion, the stationary side gets exactly zero.
pub struct SwingController {
    params: SwingParams,
    angular: Pid,

    /// Units: inches
    track_width: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwingController {
    pub fn new(params: SwingParams, track_width: f64) -> Result<Self, ConfigError> {
        params.validate()?;
        positive("track_width", track_width)?;

        Ok(Self {
            angular: Pid::new(params.angular),
            params,
            track_width,
        })
    }

    /// The side kept still for the given angular command.
    fn stationary_side(&self, angular: f64, reverse: bool) -> SwingSide {
        match self.params.side {
            SwingSide::Auto => {
                // Anticlockwise forwards pivots about the left wheel
                if (angular >= 0.0) != reverse {
                    SwingSide::Left
                } else {
                    SwingSide::Right
                }
            }
            side => side,
        }
    }
}

impl Controller for SwingController {
    fn reset(&mut self) {
        self.angular.reset();
    }

    fn compute(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput {
        let angular = self.angular.update(target.heading_error(pose), dt);
        let half_track = self.track_width / 2.0;

        let linear = match self.stationary_side(angular, target.is_reverse()) {
            SwingSide::Right => -angular * half_track,
            _ => angular * half_track,
        };

        ControllerOutput::new(linear, angular)
    }

    fn supports(&self, kind: MotionKind) -> bool {
        kind == MotionKind::Turn
    }

    fn name(&self) -> &'static str {
        "Swing"
    }
}
