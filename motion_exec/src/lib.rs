//! # Motion library.
//!
//! Pose estimation, motion controllers and exit conditions for a
//! differential drive robot, and the chassis driver tying them to the
//! drivetrain.
//!
//! Two execution contexts exist: the localisation task started by
//! [`loc::LocMgr::begin_localization`], which owns the sensors and publishes
//! the pose, and whichever thread calls the [`chassis::DiffChassis`] motion
//! functions. The pose is the only state they share.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Chassis driver - runs motions and teleop commands on the drivetrain
pub mod chassis;

/// Controllers - turn pose errors into velocity commands
pub mod ctrl;

/// Exit conditions - decide when a motion has finished
pub mod exit;

/// Localisation - keeps track of where the robot is
pub mod loc;

/// Parameter validation
pub mod params;

/// Pose primitives and the shared pose cell
pub mod pose;

/// Simulated robot, used by the executable and the end-to-end tests
#[cfg(feature = "sim")]
pub mod sim;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::ConfigError;
pub use pose::{Pose, PoseRequest, SharedPose};
