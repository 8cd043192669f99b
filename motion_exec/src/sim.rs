//! # Simulated robot
//!
//! An ideal differential drive with encoders and an inertial sensor, used by
//! the executable and the end-to-end tests. The commanded wheel velocities
//! are integrated exactly, there is no motor lag or wheel slip.
//!
//! Faults can be injected to exercise the degraded paths: a stalled
//! drivetrain, an inertial sensor which fails to initialise, and dropped
//! sensor readings.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// Internal
use crate::chassis::{BrakeMode, Drivetrain, Ticker, WheelVelocities};
use crate::loc::{Encoder, Inertial, LocError, LocMgr, Localizer, SensorError};
use crate::pose::Pose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// True state of the simulated robot.
#[derive(Debug, Clone)]
pub struct SimWorld {
    pose: Pose,
    wheels: WheelVelocities,

    /// Units: inches
    track_width: f64,

    ticks_per_inch: f64,

    left_ticks: f64,
    right_ticks: f64,

    /// Continuous inertial rotation, radians
    rotation: f64,

    faults: SimFaults,
}

/// Faults injected into the simulation.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// The wheels do not turn whatever is commanded.
    pub stalled: bool,

    /// The inertial sensor fails to calibrate.
    pub imu_disconnected: bool,

    /// Number of upcoming sensor reads which will fail.
    pub dropped_reads: u32,
}

/// Handle to a simulated world shared between the collaborators.
#[derive(Debug, Clone)]
pub struct Sim {
    world: Arc<Mutex<SimWorld>>,
}

/// Encoder on one side of the simulated drivetrain.
pub struct SimEncoder {
    sim: Sim,
    side: Side,
}

pub struct SimInertial {
    sim: Sim,
}

pub struct SimDrivetrain {
    sim: Sim,
}

/// Lock-step ticker: sleeping advances the simulation and runs one
/// localiser update, all in virtual time.
pub struct SimTicker<L> {
    sim: Sim,
    localizer: L,
    loc: LocMgr,

    now: Duration,

    /// Largest physics step.
    step: Duration,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimWorld {
    pub fn new(start: Pose, track_width: f64, ticks_per_inch: f64) -> Self {
        Self {
            pose: start,
            wheels: WheelVelocities::default(),
            track_width,
            ticks_per_inch,
            left_ticks: 0.0,
            right_ticks: 0.0,
            rotation: 0.0,
            faults: SimFaults::default(),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn wheels(&self) -> WheelVelocities {
        self.wheels
    }

    pub fn faults_mut(&mut self) -> &mut SimFaults {
        &mut self.faults
    }

    /// Advance the world by `dt` at the commanded wheel velocities.
    pub fn step(&mut self, dt: Duration) {
        if self.faults.stalled {
            return;
        }

        let t = dt.as_secs_f64();
        let (l, r) = (self.wheels.left * t, self.wheels.right * t);

        let d_heading = (r - l) / self.track_width;
        let distance = (l + r) / 2.0;
        let h = self.pose.heading;

        // Exact integration along the arc
        let (dx, dy) = if d_heading.abs() < 1e-12 {
            (distance * h.cos(), distance * h.sin())
        } else {
            let radius = distance / d_heading;
            (
                radius * ((h + d_heading).sin() - h.sin()),
                -radius * ((h + d_heading).cos() - h.cos()),
            )
        };

        self.pose = Pose::new(self.pose.x + dx, self.pose.y + dy, h + d_heading);
        self.left_ticks += l * self.ticks_per_inch;
        self.right_ticks += r * self.ticks_per_inch;
        self.rotation += d_heading;
    }

    /// Consume one read, failing it if reads are being dropped.
    fn read(&mut self) -> Result<(), SensorError> {
        if self.faults.dropped_reads > 0 {
            self.faults.dropped_reads -= 1;
            Err(SensorError::NoReading)
        } else {
            Ok(())
        }
    }
}

impl Sim {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world: Arc::new(Mutex::new(world)),
        }
    }

    /// Lock the world for inspection or fault injection.
    pub fn world(&self) -> MutexGuard<'_, SimWorld> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn encoder(&self, side: Side) -> SimEncoder {
        SimEncoder {
            sim: self.clone(),
            side,
        }
    }

    pub fn inertial(&self) -> SimInertial {
        SimInertial { sim: self.clone() }
    }

    pub fn drivetrain(&self) -> SimDrivetrain {
        SimDrivetrain { sim: self.clone() }
    }
}

impl Encoder for SimEncoder {
    fn position_ticks(&mut self) -> Result<f64, SensorError> {
        let mut world = self.sim.world();
        world.read()?;

        Ok(match self.side {
            Side::Left => world.left_ticks,
            Side::Right => world.right_ticks,
        })
    }
}

impl Inertial for SimInertial {
    fn calibrate(&mut self, _timeout: Duration) -> Result<(), SensorError> {
        if self.sim.world().faults.imu_disconnected {
            Err(SensorError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn rotation(&mut self) -> Result<f64, SensorError> {
        let mut world = self.sim.world();
        if world.faults.imu_disconnected {
            return Err(SensorError::NotConnected);
        }
        world.read()?;

        Ok(world.rotation)
    }
}

impl Drivetrain for SimDrivetrain {
    fn set_velocity(&mut self, wheels: WheelVelocities) {
        self.sim.world().wheels = wheels;
    }

    fn brake(&mut self, _mode: BrakeMode) {
        // The ideal drivetrain stops dead whatever the mode
        self.sim.world().wheels = WheelVelocities::default();
    }
}

impl<L: Localizer> SimTicker<L> {
    /// Calibrate `localizer` and build a ticker which runs it against `loc`'s
    /// pose.
    pub fn new(
        sim: Sim,
        mut localizer: L,
        loc: LocMgr,
        step: Duration,
    ) -> Result<Self, LocError> {
        localizer.calibrate(Duration::from_millis(0))?;

        Ok(Self {
            sim,
            localizer,
            loc,
            now: Duration::from_secs(0),
            step,
        })
    }
}

impl<L: Localizer> Ticker for SimTicker<L> {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep_until(&mut self, deadline: Duration) {
        if deadline <= self.now {
            return;
        }

        {
            let mut world = self.sim.world();
            while self.now < deadline {
                let dt = self.step.min(deadline - self.now);
                world.step(dt);
                self.now += dt;
            }
        }

        let status = self.localizer.update(self.loc.shared_pose());
        self.loc.record_sample(status);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chassis::{ChassisParams, DiffChassis};
    use crate::ctrl::{
        ArcPidController, ArcPidParams, BoomerangController, BoomerangParams, MotionFlags,
        PidController, PidGains, PidParams,
    };
    use crate::exit::{AbortCause, ExitCondition, ExitConditions, ExitStatus, Settle, Timeout};
    use crate::loc::{ImuEncoderLocalizer, ImuEncoderParams, LocParams};
    use crate::pose::PoseRequest;
    use std::f64::consts::FRAC_PI_2;

    const TW: f64 = 12.0;
    const TPI: f64 = 300.0;

    type SimChassis = DiffChassis<SimDrivetrain, SimTicker<ImuEncoderLocalizer>>;

    fn localizer(sim: &Sim) -> ImuEncoderLocalizer {
        ImuEncoderLocalizer::new(
            ImuEncoderParams {
                ticks_per_inch: TPI,
                track_width: TW,
            },
            Box::new(sim.encoder(Side::Left)),
            Box::new(sim.encoder(Side::Right)),
            Some(Box::new(sim.inertial())),
        )
        .unwrap()
    }

    fn rig() -> (Sim, SimChassis) {
        let sim = Sim::new(SimWorld::new(Pose::origin(), TW, TPI));
        let loc = LocMgr::new(LocParams::default()).unwrap();
        let ticker =
            SimTicker::new(sim.clone(), localizer(&sim), loc.clone(), Duration::from_millis(1))
                .unwrap();

        let chassis = DiffChassis::new(
            ChassisParams {
                track_width: TW,
                max_wheel_speed: 60.0,
                tick_period_ms: 10,
                brake_mode: BrakeMode::Brake,
            },
            sim.drivetrain(),
            ticker,
            loc,
            Box::new(pid()),
            settle_exit(),
        )
        .unwrap();

        (sim, chassis)
    }

    fn pid() -> PidController {
        PidController::new(PidParams {
            linear: PidGains::new(7.0, 0.02, 40.0, 48.0),
            angular: PidGains::new(20.0, 0.0, 100.0, 6.0),
            min_error: 5.0,
            min_vel_for_thru: 20.0,
        })
        .unwrap()
    }

    fn settle_exit() -> ExitConditions {
        ExitConditions::new()
            .with(ExitCondition::Settle(Settle::new(
                Duration::from_millis(200),
                Some(1.0),
                Some(1f64.to_radians()),
            )))
            .with(ExitCondition::Timeout(Timeout::new(Duration::from_millis(5000))))
    }

    #[test]
    fn test_pid_move_settles_on_target() {
        let (sim, mut chassis) = rig();

        let report = chassis
            .move_to(PoseRequest::degrees(48.0, 0.0, 0.0), 100.0, MotionFlags::empty())
            .unwrap();

        assert_eq!(report.status, ExitStatus::Settled);
        assert!(report.elapsed < Duration::from_millis(5000));
        assert!((report.final_pose.x - 48.0).abs() < 1.0);
        assert!(report.final_pose.y.abs() < 1.0);
        assert!(report.final_pose.heading_deg().abs() < 1.0);

        // The estimate tracks the true pose
        let truth = sim.world().pose();
        assert!((truth.x - report.final_pose.x).abs() < 1e-6);
        assert_eq!(sim.world().wheels(), WheelVelocities::default());
    }

    #[test]
    fn test_stalled_drive_times_out() {
        let (sim, mut chassis) = rig();
        sim.world().faults_mut().stalled = true;

        let report = chassis
            .move_to(PoseRequest::degrees(48.0, 0.0, 0.0), 100.0, MotionFlags::empty())
            .unwrap();

        assert_eq!(report.status, ExitStatus::Aborted(AbortCause::Timeout));
        assert!(report.elapsed >= Duration::from_millis(5000));
        assert!(report.elapsed <= Duration::from_millis(5010));
        assert_eq!(report.final_pose, Pose::origin());
    }

    #[test]
    fn test_inertial_failure_stops_localisation_start() {
        let sim = Sim::new(SimWorld::new(Pose::origin(), TW, TPI));
        sim.world().faults_mut().imu_disconnected = true;

        let loc = LocMgr::new(LocParams::default()).unwrap();
        let res = loc.begin_localization(localizer(&sim));

        assert!(matches!(
            res,
            Err(LocError::SensorUnavailable {
                sensor: "inertial",
                ..
            })
        ));
        assert!(!loc.is_running());
    }

    #[test]
    fn test_dropped_readings_recover() {
        let (sim, mut chassis) = rig();

        // The first few reads of the run fail
        sim.world().faults_mut().dropped_reads = 6;

        let report = chassis
            .move_to(PoseRequest::degrees(24.0, 0.0, 0.0), 100.0, MotionFlags::empty())
            .unwrap();

        assert!(report.is_settled());
        assert!((report.final_pose.x - sim.world().pose().x).abs() < 1e-6);

        let health = chassis.loc().sensor_health();
        assert_eq!(health.consecutive_stale, 0);
        assert!(health.total_stale > 0);
    }

    #[test]
    fn test_turn_and_relative_move() {
        let (sim, mut chassis) = rig();

        let report = chassis
            .turn(FRAC_PI_2, 100.0, MotionFlags::empty())
            .unwrap();
        assert!(report.is_settled());
        assert!((report.final_pose.heading_deg() - 90.0).abs() < 1.0);

        // 24 inches forwards from facing +Y
        let report = chassis
            .move_to(PoseRequest::point(24.0, 0.0), 100.0, MotionFlags::RELATIVE)
            .unwrap();
        assert!(report.is_settled());

        let truth = sim.world().pose();
        assert!(truth.x.abs() < 1.5);
        assert!((truth.y - 24.0).abs() < 1.0);
    }

    fn arc_pid() -> ArcPidController {
        ArcPidController::new(
            ArcPidParams {
                linear: PidGains::new(7.0, 0.0, 40.0, 48.0),
                min_error: 3.0,
                slew: 2.0,
                max_speed: 60.0,
                min_vel_for_thru: 0.0,
            },
            TW,
        )
        .unwrap()
    }

    fn position_exit() -> ExitConditions {
        ExitConditions::new()
            .with(ExitCondition::Settle(Settle::new(
                Duration::from_millis(100),
                Some(1.0),
                None,
            )))
            .with(ExitCondition::Timeout(Timeout::new(Duration::from_millis(5000))))
    }

    #[test]
    fn test_arc_backs_onto_target_behind() {
        let (sim, mut chassis) = rig();

        let report = chassis
            .move_with_exit(
                PoseRequest::point(-24.0, 0.0),
                &mut arc_pid(),
                &mut position_exit(),
                100.0,
                MotionFlags::empty(),
            )
            .unwrap();

        assert!(report.is_settled());
        assert!(report.final_pose.distance_to(-24.0, 0.0) < 1.0);

        // Straight back, no turn on the way
        assert!(sim.world().pose().heading.abs() < 1e-6);
    }

    #[test]
    fn test_arc_and_boomerang_reach_target() {
        let (_sim, mut chassis) = rig();

        let mut arc = arc_pid();
        let mut exit = position_exit();

        let report = chassis
            .move_with_exit(
                PoseRequest::point(24.0, 24.0),
                &mut arc,
                &mut exit,
                100.0,
                MotionFlags::empty(),
            )
            .unwrap();
        assert!(report.is_settled());

        let mut boomerang = BoomerangController::new(BoomerangParams {
            linear: PidGains::new(7.0, 0.0, 40.0, 48.0),
            angular: PidGains::new(20.0, 0.0, 100.0, 6.0),
            lead_pct: 0.4,
            min_error: 3.0,
            exit_error: 3.0,
            angular_exit_error_deg: 1.0,
            settle_time_ms: 500,
            min_vel_for_thru: 0.0,
        })
        .unwrap();

        let report = chassis
            .move_with_exit(
                PoseRequest::degrees(48.0, 0.0, -90.0),
                &mut boomerang,
                &mut exit,
                100.0,
                MotionFlags::empty(),
            )
            .unwrap();
        assert!(report.is_settled());
        assert!(report.final_pose.distance_to(48.0, 0.0) < 1.0);
    }
}
