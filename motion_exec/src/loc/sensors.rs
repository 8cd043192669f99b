//! Sensor collaborators used by the localisers.
//!
//! Hardware drivers implement these traits. Each sensor is polled once per
//! localisation tick, from the localisation task only.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error raised by a sensor driver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("The sensor is not connected")]
    NotConnected,

    #[error("The sensor did not finish calibrating within {0:?}")]
    CalibrationTimeout(Duration),

    #[error("The sensor has no new reading")]
    NoReading,

    #[error("The sensor reported a fault: {0}")]
    Fault(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// An incremental or absolute encoder.
pub trait Encoder: Send {
    /// Accumulated position in ticks since the encoder was reset.
    fn position_ticks(&mut self) -> Result<f64, SensorError>;
}

/// An inertial sensor providing the robot's rotation about the vertical axis.
pub trait Inertial: Send {
    /// Zero the sensor, blocking for at most `timeout`.
    fn calibrate(&mut self, timeout: Duration) -> Result<(), SensorError>;

    /// Rotation since calibration, positive anticlockwise.
    ///
    /// Units: radians. The value may be continuous or wrapped, localisers
    /// only use the shortest difference between consecutive readings.
    fn rotation(&mut self) -> Result<f64, SensorError>;
}
