//! Drive encoder and inertial sensor fusion.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Duration;

// Internal
use super::{
    hold_on_error, initial_reading, integrate_arc, Encoder, ImuEncoderParams, Inertial, LocError,
    Localizer, SampleStatus,
};
use crate::params::ConfigError;
use crate::pose::SharedPose;
use util::maths::get_ang_dist;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Localiser using the drive encoders for displacement and, when fitted, an
/// inertial sensor for heading.
///
/// The inertial rotation is consumed as a delta between consecutive samples,
/// so a heading given through `set_pose` is kept.
pub struct ImuEncoderLocalizer {
    params: ImuEncoderParams,

    left: Box<dyn Encoder>,
    right: Box<dyn Encoder>,
    imu: Option<Box<dyn Inertial>>,

    /// Previous left/right readings.
    ///
    /// Units: ticks
    prev_ticks: (f64, f64),

    /// Previous inertial rotation.
    ///
    /// Units: radians
    prev_rotation: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ImuEncoderLocalizer {
    pub fn new(
        params: ImuEncoderParams,
        left: Box<dyn Encoder>,
        right: Box<dyn Encoder>,
        imu: Option<Box<dyn Inertial>>,
    ) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            params,
            left,
            right,
            imu,
            prev_ticks: (0.0, 0.0),
            prev_rotation: 0.0,
        })
    }
}

impl Localizer for ImuEncoderLocalizer {
    fn calibrate(&mut self, timeout: Duration) -> Result<(), LocError> {
        if let Some(imu) = self.imu.as_mut() {
            imu.calibrate(timeout)
                .map_err(|source| LocError::SensorUnavailable {
                    sensor: "inertial",
                    source,
                })?;
            self.prev_rotation = initial_reading("inertial", imu.rotation())?;
        }

        self.prev_ticks = (
            initial_reading("left encoder", self.left.position_ticks())?,
            initial_reading("right encoder", self.right.position_ticks())?,
        );

        Ok(())
    }

    fn update(&mut self, pose: &SharedPose) -> SampleStatus {
        let mut stale = false;

        let left = hold_on_error(
            "left encoder",
            self.left.position_ticks(),
            self.prev_ticks.0,
            &mut stale,
        );
        let right = hold_on_error(
            "right encoder",
            self.right.position_ticks(),
            self.prev_ticks.1,
            &mut stale,
        );

        let d_left = (left - self.prev_ticks.0) / self.params.ticks_per_inch;
        let d_right = (right - self.prev_ticks.1) / self.params.ticks_per_inch;
        self.prev_ticks = (left, right);

        let d_heading = match self.imu.as_mut() {
            Some(imu) => {
                let rotation =
                    hold_on_error("inertial", imu.rotation(), self.prev_rotation, &mut stale);
                let d = get_ang_dist(self.prev_rotation, rotation);
                self.prev_rotation = rotation;
                d
            }
            None => (d_right - d_left) / self.params.track_width,
        };

        let forward = (d_left + d_right) / 2.0;
        pose.merge(|p| integrate_arc(p, forward, 0.0, d_heading));

        if stale {
            SampleStatus::Stale
        } else {
            SampleStatus::Fresh
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loc::SensorError;
    use crate::pose::Pose;
    use std::f64::consts::FRAC_PI_2;
    use std::sync::{Arc, Mutex};

    /// A sensor value shared between the test and the mock, `None` meaning
    /// the next read fails.
    #[derive(Clone, Default)]
    struct Channel(Arc<Mutex<Option<f64>>>);

    impl Channel {
        fn new(v: f64) -> Self {
            Self(Arc::new(Mutex::new(Some(v))))
        }

        fn set(&self, v: Option<f64>) {
            *self.0.lock().unwrap() = v;
        }

        fn get(&self) -> Result<f64, SensorError> {
            self.0.lock().unwrap().ok_or(SensorError::NoReading)
        }
    }

    impl Encoder for Channel {
        fn position_ticks(&mut self) -> Result<f64, SensorError> {
            self.get()
        }
    }

    struct Imu {
        rotation: Channel,
        connected: bool,
    }

    impl Inertial for Imu {
        fn calibrate(&mut self, _timeout: Duration) -> Result<(), SensorError> {
            if self.connected {
                Ok(())
            } else {
                Err(SensorError::NotConnected)
            }
        }

        fn rotation(&mut self) -> Result<f64, SensorError> {
            self.rotation.get()
        }
    }

    const TPI: f64 = 100.0;

    fn params() -> ImuEncoderParams {
        ImuEncoderParams {
            ticks_per_inch: TPI,
            track_width: 10.0,
        }
    }

    fn rig(with_imu: bool) -> (ImuEncoderLocalizer, Channel, Channel, Channel) {
        let l = Channel::new(0.0);
        let r = Channel::new(0.0);
        let rot = Channel::new(0.0);
        let imu: Option<Box<dyn Inertial>> = if with_imu {
            Some(Box::new(Imu {
                rotation: rot.clone(),
                connected: true,
            }))
        } else {
            None
        };

        let mut loc =
            ImuEncoderLocalizer::new(params(), Box::new(l.clone()), Box::new(r.clone()), imu)
                .unwrap();
        loc.calibrate(Duration::from_millis(10)).unwrap();

        (loc, l, r, rot)
    }

    #[test]
    fn test_straight_line() {
        let (mut loc, l, r, _) = rig(true);
        let pose = SharedPose::default();

        for i in 1..=10 {
            l.set(Some(i as f64 * TPI));
            r.set(Some(i as f64 * TPI));
            assert_eq!(loc.update(&pose), SampleStatus::Fresh);
        }

        let p = pose.read();
        assert!((p.x - 10.0).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
        assert!(p.heading.abs() < 1e-12);
    }

    #[test]
    fn test_heading_from_inertial_is_relative() {
        let (mut loc, _l, _r, rot) = rig(true);
        let pose = SharedPose::new(Pose::new(0.0, 0.0, FRAC_PI_2));

        // The inertial sensor is at 1 rad, but only the change matters
        rot.set(Some(1.0));
        loc.update(&pose);
        rot.set(Some(1.1));
        loc.update(&pose);

        assert!((pose.read().heading - (FRAC_PI_2 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_heading_from_encoders_without_inertial() {
        let (mut loc, l, r, _) = rig(false);
        let pose = SharedPose::default();

        // Turn on the spot: wheels travel tw/2 * angle in opposite directions
        let arc = 5.0 * FRAC_PI_2;
        l.set(Some(-arc * TPI));
        r.set(Some(arc * TPI));
        loc.update(&pose);

        let p = pose.read();
        assert!((p.heading - FRAC_PI_2).abs() < 1e-9);
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
    }

    #[test]
    fn test_stale_reading_held_then_caught_up() {
        let (mut loc, l, r, _) = rig(true);
        let pose = SharedPose::default();

        l.set(None);
        r.set(Some(2.0 * TPI));
        assert_eq!(loc.update(&pose), SampleStatus::Stale);
        assert!((pose.read().x - 1.0).abs() < 1e-9);

        // The left wheel reports everything it travelled in the meantime
        l.set(Some(2.0 * TPI));
        assert_eq!(loc.update(&pose), SampleStatus::Fresh);
        assert!((pose.read().x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_inertial_init_failure() {
        let mut loc = ImuEncoderLocalizer::new(
            params(),
            Box::new(Channel::new(0.0)),
            Box::new(Channel::new(0.0)),
            Some(Box::new(Imu {
                rotation: Channel::new(0.0),
                connected: false,
            })),
        )
        .unwrap();

        assert!(matches!(
            loc.calibrate(Duration::from_millis(10)),
            Err(LocError::SensorUnavailable {
                sensor: "inertial",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_params() {
        let res = ImuEncoderLocalizer::new(
            ImuEncoderParams {
                ticks_per_inch: 0.0,
                track_width: 10.0,
            },
            Box::new(Channel::new(0.0)),
            Box::new(Channel::new(0.0)),
            None,
        );
        assert!(res.is_err());
    }
}
