//! Controller parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Internal
use crate::params::{in_range, non_negative, positive, ConfigError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains and limits of a single PID loop.
///
/// The derivative and integral terms use a millisecond time base.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// The integral only accumulates while the error magnitude is below this
    /// value. If not given the integral always accumulates.
    #[serde(default)]
    pub integral_threshold: Option<f64>,

    /// Saturation bound of the loop output, also bounding the integral term.
    pub limit: f64,
}

/// Parameters for the point-to-point PID controller.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PidParams {
    /// Distance loop, output in inches/second.
    pub linear: PidGains,

    /// Heading loop, output in radians/second.
    pub angular: PidGains,

    /// Radius around the target inside which the bearing to the target is no
    /// longer tracked.
    ///
    /// Units: inches
    pub min_error: f64,

    /// Minimum linear speed magnitude for THRU motions.
    ///
    /// Units: inches/second
    #[serde(default)]
    pub min_vel_for_thru: f64,
}

/// Parameters for the boomerang (lead point pursuit) controller.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BoomerangParams {
    pub linear: PidGains,
    pub angular: PidGains,

    /// Fraction of the distance to the target by which the carry point is
    /// pulled back along the target heading. Within [0, 1].
    pub lead_pct: f64,

    /// Distance inside which the carry point is dropped: the distance loop
    /// closes the distance projected on the current heading and the heading
    /// loop turns to the target heading.
    ///
    /// Units: inches
    pub min_error: f64,

    /// Distance below which the controller may consider itself finished,
    /// together with `angular_exit_error_deg`.
    ///
    /// Units: inches
    pub exit_error: f64,

    /// Heading error below which the controller considers itself finished.
    ///
    /// Units: degrees
    pub angular_exit_error_deg: f64,

    /// Time spent inside both exit errors before the output is held at zero.
    ///
    /// Units: milliseconds
    pub settle_time_ms: u64,

    /// Units: inches/second
    #[serde(default)]
    pub min_vel_for_thru: f64,
}

/// Parameters for the swing (pivot) controller.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SwingParams {
    /// Heading loop, output in radians/second.
    pub angular: PidGains,

    /// Which side of the drivetrain stays still.
    #[serde(default)]
    pub side: SwingSide,
}

/// Parameters for the arc-constrained PID controller.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ArcPidParams {
    /// Arc length loop, output in inches/second.
    pub linear: PidGains,

    /// Radius inside which the arc curvature is dropped.
    ///
    /// Units: inches
    pub min_error: f64,

    /// Maximum change of the linear command per tick, zero disables.
    ///
    /// Units: inches/second
    #[serde(default)]
    pub slew: f64,

    /// Maximum speed of the faster wheel.
    ///
    /// Units: inches/second
    pub max_speed: f64,

    /// Units: inches/second
    #[serde(default)]
    pub min_vel_for_thru: f64,
}

/// Collection of all controller parameters, as found in `controllers.toml`.
#[derive(Deserialize, Debug, Clone)]
pub struct ControllerParams {
    pub pid: PidParams,
    pub boomerang: BoomerangParams,
    pub swing: SwingParams,
    pub arc_pid: ArcPidParams,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The stationary side of a swing turn.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingSide {
    /// Chosen from the direction of the turn so the moving side drives
    /// forwards (backwards for REVERSE motions).
    Auto,
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SwingSide {
    fn default() -> Self {
        SwingSide::Auto
    }
}

impl PidGains {
    pub fn new(k_p: f64, k_i: f64, k_d: f64, limit: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral_threshold: None,
            limit,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("k_p", self.k_p)?;
        non_negative("k_i", self.k_i)?;
        non_negative("k_d", self.k_d)?;
        positive("limit", self.limit)?;
        if let Some(t) = self.integral_threshold {
            positive("integral_threshold", t)?;
        }
        Ok(())
    }
}

impl PidParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.linear.validate()?;
        self.angular.validate()?;
        non_negative("min_error", self.min_error)?;
        non_negative("min_vel_for_thru", self.min_vel_for_thru)?;
        if self.min_vel_for_thru > self.linear.limit {
            return Err(ConfigError::Invalid(
                "min_vel_for_thru exceeds the linear output limit".into(),
            ));
        }
        Ok(())
    }
}

impl BoomerangParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.linear.validate()?;
        self.angular.validate()?;
        in_range("lead_pct", self.lead_pct, 0.0, 1.0)?;
        non_negative("min_error", self.min_error)?;
        non_negative("exit_error", self.exit_error)?;
        non_negative("angular_exit_error_deg", self.angular_exit_error_deg)?;
        non_negative("min_vel_for_thru", self.min_vel_for_thru)?;
        Ok(())
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }
}

impl SwingParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.angular.validate()
    }
}

impl ArcPidParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.linear.validate()?;
        non_negative("min_error", self.min_error)?;
        non_negative("slew", self.slew)?;
        positive("max_speed", self.max_speed)?;
        non_negative("min_vel_for_thru", self.min_vel_for_thru)?;
        Ok(())
    }
}

impl ControllerParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pid.validate()?;
        self.boomerang.validate()?;
        self.swing.validate()?;
        self.arc_pid.validate()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_from_toml() {
        let params: ControllerParams = util::params::from_str(
            r#"
            [pid]
            min_error = 5.0
            linear = { k_p = 7.0, k_i = 0.02, k_d = 40.0, integral_threshold = 3.0, limit = 48.0 }
            angular = { k_p = 20.0, k_i = 0.0, k_d = 100.0, limit = 6.0 }

            [boomerang]
            lead_pct = 0.5
            min_error = 5.0
            exit_error = 4.0
            angular_exit_error_deg = 2.0
            settle_time_ms = 150
            linear = { k_p = 6.0, k_i = 0.0, k_d = 30.0, limit = 48.0 }
            angular = { k_p = 20.0, k_i = 0.0, k_d = 100.0, limit = 6.0 }

            [swing]
            side = "Left"
            angular = { k_p = 15.0, k_i = 0.0, k_d = 80.0, limit = 5.0 }

            [arc_pid]
            min_error = 3.0
            slew = 4.0
            max_speed = 55.0
            linear = { k_p = 6.0, k_i = 0.0, k_d = 30.0, limit = 48.0 }
            "#,
        )
        .unwrap();

        assert!(params.validate().is_ok());
        assert_eq!(params.pid.linear.integral_threshold, Some(3.0));
        assert_eq!(params.pid.angular.integral_threshold, None);
        assert_eq!(params.swing.side, SwingSide::Left);
        assert_eq!(params.pid.min_vel_for_thru, 0.0);
    }

    #[test]
    fn test_invalid_params() {
        let mut gains = PidGains::new(1.0, 0.0, 0.0, 10.0);
        gains.k_i = -0.1;
        assert!(matches!(
            gains.validate(),
            Err(ConfigError::Negative("k_i", _))
        ));

        let boomerang = BoomerangParams {
            linear: PidGains::new(1.0, 0.0, 0.0, 10.0),
            angular: PidGains::new(1.0, 0.0, 0.0, 10.0),
            lead_pct: 1.5,
            min_error: 1.0,
            exit_error: 1.0,
            angular_exit_error_deg: 1.0,
            settle_time_ms: 0,
            min_vel_for_thru: 0.0,
        };
        assert!(matches!(
            boomerang.validate(),
            Err(ConfigError::OutOfRange { name: "lead_pct", .. })
        ));
    }
}
