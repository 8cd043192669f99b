//! # Localisation module
//!
//! Localisation continuously estimates the robot's pose from its
//! proprioceptive sensors. A [`Localizer`] fuses raw sensor samples into pose
//! deltas, and the [`LocMgr`] runs it in a periodic background task and
//! serves the resulting pose to everyone else through a [`SharedPose`].
//!
//! The background task is the only writer of the pose during normal
//! operation, apart from explicit [`LocMgr::set_pose`] overrides. Both go
//! through the same critical section, so a pose override can never be
//! half-merged with a sensor update.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod imu_encoder;
mod params;
mod sensors;
mod tracking_wheel;

pub use imu_encoder::ImuEncoderLocalizer;
pub use params::*;
pub use sensors::*;
pub use tracking_wheel::TrackingWheelLocalizer;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::{Rotation2, Vector2};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use crate::params::ConfigError;
use crate::pose::{Pose, PoseRequest, SharedPose};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A sensor fusion strategy producing pose updates.
pub trait Localizer: Send + 'static {
    /// Zero the sensors. Called once, before the first `update`.
    ///
    /// Must fail with [`LocError::SensorUnavailable`] if any required sensor
    /// cannot be initialised.
    fn calibrate(&mut self, timeout: Duration) -> Result<(), LocError>;

    /// Read one sample from each sensor and merge the resulting delta into
    /// `pose`.
    ///
    /// Sensor read failures must not be propagated: the last known value is
    /// held for this tick and [`SampleStatus::Stale`] is returned.
    fn update(&mut self, pose: &SharedPose) -> SampleStatus;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Provides an interface for the Localisation system of the robot.
///
/// Cloning the manager is cheap, all clones share the same pose and task.
#[derive(Clone)]
pub struct LocMgr {
    pose: Arc<SharedPose>,
    health: Arc<Mutex<SensorHealth>>,
    params: LocParams,

    bg_run: Arc<AtomicBool>,
    bg_jh: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Counters describing how many sensor samples have been missed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct SensorHealth {
    /// Number of stale samples since the last fresh one.
    pub consecutive_stale: u64,

    /// Number of stale samples since the manager was created.
    pub total_stale: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Quality of the sample used by one localiser update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    Fresh,

    /// At least one sensor could not be read, its last value was held.
    Stale,
}

/// Errors associated with starting localisation.
#[derive(Debug, thiserror::Error)]
pub enum LocError {
    #[error("The {sensor} sensor is unavailable: {source}")]
    SensorUnavailable {
        sensor: &'static str,
        source: SensorError,
    },

    #[error("Localisation has already been started")]
    AlreadyRunning,

    #[error("Could not spawn the localisation task: {0}")]
    SpawnFailed(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocMgr {
    /// Create a new manager with the robot at the origin.
    pub fn new(params: LocParams) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            pose: Arc::new(SharedPose::new(Pose::origin())),
            health: Arc::new(Mutex::new(SensorHealth::default())),
            params,
            bg_run: Arc::new(AtomicBool::new(false)),
            bg_jh: Arc::new(Mutex::new(None)),
        })
    }

    /// Calibrate the localiser and start the background localisation task.
    ///
    /// If calibration fails the task is not started and the error is
    /// returned. Starting a second task returns
    /// [`LocError::AlreadyRunning`] and leaves the running one untouched.
    pub fn begin_localization<L: Localizer>(&self, mut localizer: L) -> Result<(), LocError> {
        // Hold the handle lock for the whole start-up so two concurrent calls
        // cannot both spawn.
        let mut jh = lock(&self.bg_jh);
        if jh.is_some() {
            return Err(LocError::AlreadyRunning);
        }

        if let Err(e) = localizer.calibrate(self.params.calibration_timeout()) {
            log::error!("Localiser calibration failed: {}", e);
            return Err(e);
        }
        info!("Localiser calibrated");

        self.bg_run.store(true, Ordering::SeqCst);

        let mgr = self.clone();
        let period = self.params.update_period();
        let handle = thread::Builder::new()
            .name("localisation".into())
            .spawn(move || mgr.localisation_task(localizer, period))
            .map_err(|e| {
                self.bg_run.store(false, Ordering::SeqCst);
                LocError::SpawnFailed(e)
            })?;

        *jh = Some(handle);

        info!(
            "Localisation task started with a {} ms period",
            self.params.update_period_ms
        );

        Ok(())
    }

    /// Stop the background task and wait for it to exit.
    ///
    /// Only needed at teardown, the task otherwise runs for the life of the
    /// process.
    pub fn shutdown(&self) {
        self.bg_run.store(false, Ordering::SeqCst);

        if let Some(jh) = lock(&self.bg_jh).take() {
            if jh.join().is_err() {
                warn!("Localisation task panicked");
            }
            info!("Localisation task stopped");
        }
    }

    /// True if the background task is running.
    pub fn is_running(&self) -> bool {
        self.bg_run.load(Ordering::SeqCst)
    }

    /// The shared pose cell, for localisers driven outside the background
    /// task.
    pub fn shared_pose(&self) -> &SharedPose {
        &self.pose
    }

    pub fn get_pose(&self) -> Pose {
        self.pose.read()
    }

    pub fn get_x(&self) -> f64 {
        self.pose.read().x
    }

    pub fn get_y(&self) -> f64 {
        self.pose.read().y
    }

    pub fn get_position(&self) -> Vector2<f64> {
        self.pose.read().position()
    }

    pub fn get_orientation_rad(&self) -> f64 {
        self.pose.read().heading
    }

    pub fn get_orientation_deg(&self) -> f64 {
        self.pose.read().heading_deg()
    }

    /// Override the current pose, for example when the robot is placed at a
    /// known position. A request without a heading keeps the current one.
    pub fn set_pose(&self, pose: PoseRequest) {
        self.pose.write_partial(pose.x, pose.y, pose.heading);
        info!(
            "Pose set to ({:.2}, {:.2}, {:?})",
            pose.x,
            pose.y,
            pose.heading.map(f64::to_degrees)
        );
    }

    /// Snapshot of the sensor health counters.
    pub fn sensor_health(&self) -> SensorHealth {
        *lock(&self.health)
    }

    /// Record the outcome of one localiser update.
    pub fn record_sample(&self, status: SampleStatus) {
        let mut health = lock(&self.health);

        match status {
            SampleStatus::Fresh => {
                if health.consecutive_stale > 0 {
                    info!(
                        "Sensor readings recovered after {} stale samples",
                        health.consecutive_stale
                    );
                }
                health.consecutive_stale = 0;
            }
            SampleStatus::Stale => {
                if health.consecutive_stale == 0 {
                    warn!("Stale sensor reading, holding last known values");
                }
                health.consecutive_stale += 1;
                health.total_stale += 1;
            }
        }
    }

    /// Body of the background localisation task.
    ///
    /// Runs `update` then sleeps the remainder of the period. Overruns are
    /// not caught up.
    fn localisation_task<L: Localizer>(self, mut localizer: L, period: Duration) {
        while self.bg_run.load(Ordering::SeqCst) {
            let start = Instant::now();

            let status = localizer.update(&self.pose);
            self.record_sample(status);

            if let Some(d) = period.checked_sub(start.elapsed()) {
                thread::sleep(d);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply one odometry step to `pose`.
///
/// `forward` and `lateral` are the arc lengths travelled along and to the
/// left of the robot's X axis during the tick, `d_heading` the rotation over
/// the tick. The arcs are converted to chords and rotated into the field
/// frame by the average heading over the tick.
pub(crate) fn integrate_arc(pose: &mut Pose, forward: f64, lateral: f64, d_heading: f64) {
    let chord_scale = if d_heading.abs() < 1e-9 {
        1.0
    } else {
        2.0 * (d_heading / 2.0).sin() / d_heading
    };

    let local = Vector2::new(forward, lateral) * chord_scale;
    let global = Rotation2::new(pose.heading + d_heading / 2.0) * local;

    pose.x += global.x;
    pose.y += global.y;
    pose.heading += d_heading;
}

/// Use a sensor reading if there is one, otherwise hold `prev` and flag the
/// sample as stale.
pub(crate) fn hold_on_error(
    sensor: &'static str,
    reading: Result<f64, SensorError>,
    prev: f64,
    stale: &mut bool,
) -> f64 {
    match reading {
        Ok(v) if v.is_finite() => v,
        Ok(v) => {
            log::trace!("{} returned a non-finite reading ({})", sensor, v);
            *stale = true;
            prev
        }
        Err(e) => {
            log::trace!("{} read failed: {}", sensor, e);
            *stale = true;
            prev
        }
    }
}

/// Read a sensor during calibration, where a failure is fatal.
pub(crate) fn initial_reading(
    sensor: &'static str,
    reading: Result<f64, SensorError>,
) -> Result<f64, LocError> {
    reading.map_err(|source| LocError::SensorUnavailable { sensor, source })
}
