//! Unpowered tracking wheel odometry.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Duration;

// Internal
use super::{
    hold_on_error, initial_reading, integrate_arc, Encoder, LocError, Localizer, SampleStatus,
    TrackingWheelParams,
};
use crate::params::ConfigError;
use crate::pose::SharedPose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Localiser for deadwheel geometries without an inertial sensor.
///
/// Heading comes from the difference between the left and right wheels. An
/// optional middle wheel, mounted perpendicular to the others, measures
/// lateral slip.
pub struct TrackingWheelLocalizer {
    params: TrackingWheelParams,

    left: Box<dyn Encoder>,
    right: Box<dyn Encoder>,
    middle: Option<Box<dyn Encoder>>,

    prev_left: f64,
    prev_right: f64,
    prev_middle: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrackingWheelLocalizer {
    pub fn new(
        params: TrackingWheelParams,
        left: Box<dyn Encoder>,
        right: Box<dyn Encoder>,
        middle: Option<Box<dyn Encoder>>,
    ) -> Result<Self, ConfigError> {
        params.validate()?;

        if middle.is_some() && params.mid_ticks_per_inch.is_none() {
            return Err(ConfigError::Invalid(
                "a middle tracking wheel needs mid_ticks_per_inch".into(),
            ));
        }

        Ok(Self {
            params,
            left,
            right,
            middle,
            prev_left: 0.0,
            prev_right: 0.0,
            prev_middle: 0.0,
        })
    }
}

impl Localizer for TrackingWheelLocalizer {
    fn calibrate(&mut self, _timeout: Duration) -> Result<(), LocError> {
        self.prev_left = initial_reading("left tracking wheel", self.left.position_ticks())?;
        self.prev_right = initial_reading("right tracking wheel", self.right.position_ticks())?;
        if let Some(middle) = self.middle.as_mut() {
            self.prev_middle = initial_reading("middle tracking wheel", middle.position_ticks())?;
        }

        Ok(())
    }

    fn update(&mut self, pose: &SharedPose) -> SampleStatus {
        let mut stale = false;
        let lr_tpi = self.params.lr_ticks_per_inch;

        let left = hold_on_error(
            "left tracking wheel",
            self.left.position_ticks(),
            self.prev_left,
            &mut stale,
        );
        let right = hold_on_error(
            "right tracking wheel",
            self.right.position_ticks(),
            self.prev_right,
            &mut stale,
        );

        let d_left = (left - self.prev_left) / lr_tpi;
        let d_right = (right - self.prev_right) / lr_tpi;
        self.prev_left = left;
        self.prev_right = right;

        let d_heading = (d_right - d_left) / self.params.track_width;
        let forward = (d_left + d_right) / 2.0;

        // A wheel behind the centre is swept right by an anticlockwise turn,
        // remove that from the measured slip
        let lateral = match (self.middle.as_mut(), self.params.mid_ticks_per_inch) {
            (Some(middle), Some(mid_tpi)) => {
                let m = hold_on_error(
                    "middle tracking wheel",
                    middle.position_ticks(),
                    self.prev_middle,
                    &mut stale,
                );
                let d_middle = (m - self.prev_middle) / mid_tpi;
                self.prev_middle = m;
                d_middle + self.params.middle_offset * d_heading
            }
            _ => 0.0,
        };

        pose.merge(|p| integrate_arc(p, forward, lateral, d_heading));

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
    use std::f64::consts::FRAC_PI_2;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct Wheel(Arc<Mutex<Result<f64, SensorError>>>);

    impl Wheel {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Ok(0.0))))
        }

        fn set(&self, v: Result<f64, SensorError>) {
            *self.0.lock().unwrap() = v;
        }
    }

    impl Encoder for Wheel {
        fn position_ticks(&mut self) -> Result<f64, SensorError> {
            self.0.lock().unwrap().clone()
        }
    }

    fn params() -> TrackingWheelParams {
        TrackingWheelParams {
            lr_ticks_per_inch: 50.0,
            mid_ticks_per_inch: Some(50.0),
            track_width: 8.0,
            middle_offset: 2.0,
        }
    }

    fn rig() -> (TrackingWheelLocalizer, Wheel, Wheel, Wheel) {
        let (l, r, m) = (Wheel::new(), Wheel::new(), Wheel::new());
        let mut loc = TrackingWheelLocalizer::new(
            params(),
            Box::new(l.clone()),
            Box::new(r.clone()),
            Some(Box::new(m.clone())),
        )
        .unwrap();
        loc.calibrate(Duration::from_millis(10)).unwrap();

        (loc, l, r, m)
    }

    #[test]
    fn test_turn_on_spot_cancels_middle_wheel_sweep() {
        let (mut loc, l, r, m) = rig();
        let pose = SharedPose::default();

        // Quarter turn on the spot, the middle wheel is swept to the right
        let arc = 4.0 * FRAC_PI_2;
        l.set(Ok(-arc * 50.0));
        r.set(Ok(arc * 50.0));
        m.set(Ok(-2.0 * FRAC_PI_2 * 50.0));
        assert_eq!(loc.update(&pose), SampleStatus::Fresh);

        let p = pose.read();
        assert!((p.heading - FRAC_PI_2).abs() < 1e-9);
        assert!(p.x.abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn test_pure_strafe() {
        let (mut loc, _l, _r, m) = rig();
        let pose = SharedPose::default();

        m.set(Ok(3.0 * 50.0));
        loc.update(&pose);

        let p = pose.read();
        assert!(p.x.abs() < 1e-9);
        assert!((p.y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_middle_wheel() {
        let (mut loc, l, r, m) = rig();
        let pose = SharedPose::default();

        l.set(Ok(100.0));
        r.set(Ok(100.0));
        m.set(Err(SensorError::Fault("brownout".into())));
        assert_eq!(loc.update(&pose), SampleStatus::Stale);
        assert!((pose.read().x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_middle_wheel_needs_scale() {
        let mut p = params();
        p.mid_ticks_per_inch = None;
        let res = TrackingWheelLocalizer::new(
            p,
            Box::new(Wheel::new()),
            Box::new(Wheel::new()),
            Some(Box::new(Wheel::new())),
        );
        assert!(matches!(res, Err(ConfigError::Invalid(_))));
    }
}
