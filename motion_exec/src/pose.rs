//! # Pose primitives
//!
//! The robot's planar pose, the user-facing pose request with an optional
//! heading, and the [`SharedPose`] cell through which the localisation task
//! publishes its estimate to the motion loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

// Internal
use util::maths::wrap_angle;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A resolved robot pose on the field.
///
/// Units: inches for position, radians for heading. The heading is always
/// normalised to (-pi, pi], with zero along the field X axis and positive
/// anticlockwise.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// A requested pose, used when setting the pose of the localiser or giving a
/// motion target.
///
/// A `None` heading means "keep the current heading" when setting a pose, and
/// "no final heading" when used as a motion target.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseRequest {
    pub x: f64,
    pub y: f64,

    /// Units: radians
    pub heading: Option<f64>,
}

/// The single pose record shared between the localisation task (the only
/// writer during normal operation) and any number of readers.
///
/// The whole record sits behind one mutex, so a reader always observes the
/// x, y and heading of the same write.
#[derive(Debug, Default)]
pub struct SharedPose {
    inner: Mutex<Pose>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, normalising the heading.
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: wrap_angle(heading),
        }
    }

    /// The origin with zero heading.
    pub fn origin() -> Self {
        Self::default()
    }

    /// Position as a vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Heading in degrees.
    pub fn heading_deg(&self) -> f64 {
        self.heading.to_degrees()
    }

    /// Unit vector pointing along the heading.
    pub fn forward(&self) -> Vector2<f64> {
        Vector2::new(self.heading.cos(), self.heading.sin())
    }

    /// Euclidian distance to the given point.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (Vector2::new(x, y) - self.position()).norm()
    }

    /// Absolute bearing from this pose's position to the given point.
    pub fn bearing_to(&self, x: f64, y: f64) -> f64 {
        (y - self.y).atan2(x - self.x)
    }
}

impl PoseRequest {
    pub fn new(x: f64, y: f64, heading: Option<f64>) -> Self {
        Self { x, y, heading }
    }

    /// A point request with no heading.
    pub fn point(x: f64, y: f64) -> Self {
        Self { x, y, heading: None }
    }

    /// A request with the heading given in degrees.
    pub fn degrees(x: f64, y: f64, heading_deg: f64) -> Self {
        Self {
            x,
            y,
            heading: Some(heading_deg.to_radians()),
        }
    }

    /// Resolve into a full pose, using `fallback_heading` if no heading was
    /// requested.
    pub fn resolve(&self, fallback_heading: f64) -> Pose {
        Pose::new(self.x, self.y, self.heading.unwrap_or(fallback_heading))
    }
}

impl From<Pose> for PoseRequest {
    fn from(pose: Pose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            heading: Some(pose.heading),
        }
    }
}

impl SharedPose {
    pub fn new(pose: Pose) -> Self {
        Self {
            inner: Mutex::new(pose),
        }
    }

    /// Read a consistent snapshot of the pose.
    pub fn read(&self) -> Pose {
        *self.lock()
    }

    /// Replace the whole pose.
    pub fn write(&self, x: f64, y: f64, heading: f64) {
        *self.lock() = Pose::new(x, y, heading);
    }

    /// Replace the position and, if given, the heading. An absent heading is
    /// kept from the current pose, read under the same lock.
    pub fn write_partial(&self, x: f64, y: f64, heading: Option<f64>) {
        let mut pose = self.lock();
        let heading = heading.unwrap_or(pose.heading);
        *pose = Pose::new(x, y, heading);
    }

    /// Apply `f` to the pose inside the critical section.
    ///
    /// This is how localisers merge a delta into the current estimate without
    /// racing a concurrent `write` or `write_partial`. The heading is
    /// re-normalised after `f` returns.
    pub fn merge<F>(&self, f: F)
    where
        F: FnOnce(&mut Pose),
    {
        let mut pose = self.lock();
        f(&mut pose);
        pose.heading = wrap_angle(pose.heading);
    }

    /// Lock the pose, recovering the data if a previous holder panicked.
    ///
    /// Every critical section in this module leaves the pose fully written,
    /// so a poisoned value is still consistent.
    fn lock(&self) -> MutexGuard<'_, Pose> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pose_heading_normalised() {
        let pose = Pose::new(1.0, 2.0, 3.0 * PI / 2.0);
        assert!((pose.heading + PI / 2.0).abs() < 1e-12);

        let pose = Pose::new(0.0, 0.0, -PI);
        assert!((pose.heading - PI).abs() < 1e-12);
    }

    #[test]
    fn test_pose_geometry() {
        let pose = Pose::new(1.0, 1.0, 0.0);
        assert!((pose.distance_to(4.0, 5.0) - 5.0).abs() < 1e-12);
        assert!((pose.bearing_to(1.0, 3.0) - PI / 2.0).abs() < 1e-12);
        assert!((pose.forward() - Vector2::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_write_partial_keeps_heading() {
        let shared = SharedPose::new(Pose::new(0.0, 0.0, 1.0));

        shared.write_partial(5.0, 6.0, None);
        assert_eq!(shared.read(), Pose::new(5.0, 6.0, 1.0));

        shared.write_partial(7.0, 8.0, Some(-0.5));
        assert_eq!(shared.read(), Pose::new(7.0, 8.0, -0.5));
    }

    #[test]
    fn test_merge_renormalises_heading() {
        let shared = SharedPose::new(Pose::new(0.0, 0.0, PI - 0.1));

        shared.merge(|p| {
            p.x += 1.0;
            p.heading += 0.2;
        });

        let pose = shared.read();
        assert_eq!(pose.x, 1.0);
        assert!((pose.heading - (-PI + 0.1)).abs() < 1e-12);
    }

    /// Readers racing a writer must only ever see whole writes.
    #[test]
    fn test_no_torn_reads() {
        let shared = Arc::new(SharedPose::new(Pose::origin()));
        let done = Arc::new(AtomicBool::new(false));

        // Every written pose satisfies y == 2x and heading == f(x)
        fn heading_for(k: u64) -> f64 {
            ((k % 1000) as f64) * 1e-3
        }

        let writer = {
            let shared = shared.clone();
            let done = done.clone();
            thread::spawn(move || {
                for k in 0..20_000u64 {
                    if k % 2 == 0 {
                        shared.write(k as f64, 2.0 * k as f64, heading_for(k));
                    } else {
                        shared.merge(|p| {
                            p.x = k as f64;
                            p.y = 2.0 * k as f64;
                            p.heading = heading_for(k);
                        });
                    }
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut last_x = 0.0;
                    while !done.load(Ordering::SeqCst) {
                        let p = shared.read();
                        assert_eq!(p.y, 2.0 * p.x);
                        assert_eq!(p.heading, heading_for(p.x as u64));
                        // A single writer means reads never go backwards
                        assert!(p.x >= last_x);
                        last_x = p.x;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
