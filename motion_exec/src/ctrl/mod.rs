//! # Motion controllers
//!
//! A controller turns the error between the current pose and a motion target
//! into a linear and angular velocity command. All controllers share the
//! [`Controller`] contract: `reset` at the start of every motion, then one
//! `compute` per tick. `compute` never blocks and only depends on its inputs
//! and the controller's own state.
//!
//! Four strategies are provided:
//! - [`PidController`]: independent distance and heading loops.
//! - [`BoomerangController`]: heading loop chasing a carry point pulled back
//!   along the target heading, for curved approaches.
//! - [`SwingController`]: pivot turns about one side of the drivetrain.
//! - [`ArcPidController`]: constant curvature arcs towards the target.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod arc_pid;
mod boomerang;
mod params;
mod pid;
mod pid_loop;
mod swing;

pub use arc_pid::ArcPidController;
pub use boomerang::BoomerangController;
pub use params::*;
pub use pid::PidController;
pub use pid_loop::Pid;
pub use swing::SwingController;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

// Internal
use crate::pose::{Pose, PoseRequest};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A motion control strategy.
pub trait Controller {
    /// Clear all feedback state (integrals, previous errors, timers).
    fn reset(&mut self);

    /// Compute the command for this tick.
    ///
    /// `target` is always absolute, relative motions are resolved by the
    /// caller before the first tick. `dt` is the time since the previous
    /// tick of the same motion.
    fn compute(&mut self, pose: &Pose, target: &MotionTarget, dt: Duration) -> ControllerOutput;

    /// True if this controller can execute motions of the given kind.
    fn supports(&self, kind: MotionKind) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity command produced by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ControllerOutput {
    /// Units: inches/second
    pub linear: f64,

    /// Units: radians/second, positive anticlockwise
    pub angular: f64,
}

/// Modifiers of a motion.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotionFlags(u8);

/// A motion target as seen by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionTarget {
    /// For `Move` the target position and optional final heading, for `Turn`
    /// only the heading is used.
    pub pose: PoseRequest,

    pub flags: MotionFlags,

    pub kind: MotionKind,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionKind {
    Move,
    Turn,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControllerOutput {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

impl MotionFlags {
    /// Do not slow down at the target, used to chain motions.
    pub const THRU: Self = Self(0b001);

    /// Drive backwards.
    pub const REVERSE: Self = Self(0b010);

    /// The target is given relative to the pose at the start of the motion.
    pub const RELATIVE: Self = Self(0b100);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MotionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MotionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for MotionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::THRU, "THRU"),
            (Self::REVERSE, "REVERSE"),
            (Self::RELATIVE, "RELATIVE"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

impl MotionTarget {
    /// Drive to a point, with an optional final heading.
    pub fn move_to(pose: PoseRequest, flags: MotionFlags) -> Self {
        Self {
            pose,
            flags,
            kind: MotionKind::Move,
        }
    }

    /// Turn on the spot to a heading in radians.
    pub fn turn(heading: f64, flags: MotionFlags) -> Self {
        Self {
            pose: PoseRequest::new(0.0, 0.0, Some(heading)),
            flags,
            kind: MotionKind::Turn,
        }
    }

    pub fn is_thru(&self) -> bool {
        self.flags.contains(MotionFlags::THRU)
    }

    pub fn is_reverse(&self) -> bool {
        self.flags.contains(MotionFlags::REVERSE)
    }

    /// Heading error of a turn, zero if no heading was given.
    pub fn heading_error(&self, pose: &Pose) -> f64 {
        self.pose
            .heading
            .map(|h| util::maths::get_ang_dist(pose.heading, h))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = MotionFlags::THRU | MotionFlags::REVERSE;
        assert!(flags.contains(MotionFlags::THRU));
        assert!(flags.contains(MotionFlags::REVERSE));
        assert!(!flags.contains(MotionFlags::RELATIVE));
        assert!(flags.contains(MotionFlags::empty()));
        assert!(MotionFlags::empty().is_empty());
        assert_eq!(format!("{:?}", flags), "THRU | REVERSE");
        assert_eq!(format!("{:?}", MotionFlags::default()), "NONE");

        let mut flags = MotionFlags::empty();
        flags |= MotionFlags::RELATIVE;
        assert!(flags.contains(MotionFlags::RELATIVE));
    }
}
