//! Localisation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use std::time::Duration;

// Internal
use crate::params::{finite, positive, ConfigError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Contents of `loc.toml`, the manager and an encoder/inertial localizer.
#[derive(Deserialize, Debug, Clone)]
pub struct LocConfig {
    pub manager: LocParams,
    pub imu_encoder: ImuEncoderParams,
}

/// Parameters for the localisation manager
#[derive(Deserialize, Debug, Clone)]
pub struct LocParams {
    /// Period of the background localisation task.
    ///
    /// Units: milliseconds
    pub update_period_ms: u64,

    /// Maximum time calibration may block for.
    ///
    /// Units: milliseconds
    pub calibration_timeout_ms: u64,
}

/// Parameters for fusing drive encoders with an inertial sensor.
#[derive(Deserialize, Debug, Clone)]
pub struct ImuEncoderParams {
    /// Drive encoder ticks per inch of travel, identical for both sides.
    pub ticks_per_inch: f64,

    /// Distance between the left and right wheels. Only used for heading
    /// when no inertial sensor is fitted.
    ///
    /// Units: inches
    pub track_width: f64,
}

/// Parameters for unpowered tracking wheels.
#[derive(Deserialize, Debug, Clone)]
pub struct TrackingWheelParams {
    /// Left/right tracking wheel ticks per inch of travel.
    pub lr_ticks_per_inch: f64,

    /// Middle (perpendicular) tracking wheel ticks per inch of travel.
    #[serde(default)]
    pub mid_ticks_per_inch: Option<f64>,

    /// Distance between the left and right tracking wheels.
    ///
    /// Units: inches
    pub track_width: f64,

    /// Distance of the middle wheel behind the tracking centre.
    ///
    /// Units: inches
    #[serde(default)]
    pub middle_offset: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LocParams {
    fn default() -> Self {
        Self {
            update_period_ms: 10,
            calibration_timeout_ms: 3000,
        }
    }
}

impl LocConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.manager.validate()?;
        self.imu_encoder.validate()
    }
}

impl LocParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("update_period_ms", self.update_period_ms as f64)?;
        Ok(())
    }

    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }
}

impl ImuEncoderParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("ticks_per_inch", self.ticks_per_inch)?;
        positive("track_width", self.track_width)?;
        Ok(())
    }
}

impl TrackingWheelParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("lr_ticks_per_inch", self.lr_ticks_per_inch)?;
        positive("track_width", self.track_width)?;
        finite("middle_offset", self.middle_offset)?;
        if let Some(tpi) = self.mid_ticks_per_inch {
            positive("mid_ticks_per_inch", tpi)?;
        }
        Ok(())
    }
}
