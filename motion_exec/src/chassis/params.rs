//! Chassis parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use std::time::Duration;

// Internal
use super::BrakeMode;
use crate::params::{positive, ConfigError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the differential drive chassis
#[derive(Deserialize, Debug, Clone)]
pub struct ChassisParams {
    /// Distance between the left and right wheels.
    ///
    /// Units: inches
    pub track_width: f64,

    /// Maximum speed of either side of the drivetrain.
    ///
    /// Units: inches/second
    pub max_wheel_speed: f64,

    /// Period of the motion loop.
    ///
    /// Units: milliseconds
    pub tick_period_ms: u64,

    /// Brake applied when a motion which is not THRU ends.
    #[serde(default)]
    pub brake_mode: BrakeMode,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChassisParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("track_width", self.track_width)?;
        positive("max_wheel_speed", self.max_wheel_speed)?;
        positive("tick_period_ms", self.tick_period_ms as f64)?;
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}
