//! Motion executable entry point.
//!
//! Drives a simulated robot through a chained demonstration sequence in real
//! time, exercising the localisation task, every controller and the exit
//! conditions exactly as they would run on hardware.
//!
//! # Architecture
//!
//!     - Load parameters
//!     - Start the simulation thread, which integrates the commanded wheel
//!       velocities
//!     - Start the localisation task on the simulated sensors
//!     - Run the motion sequence from the main thread, archiving a report of
//!       every motion in the session directory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use motion_lib::{
    chassis::{ChassisParams, DiffChassis, MotionError, MotionReport, SystemTicker},
    ctrl::{
        ArcPidController, BoomerangController, ControllerParams, MotionFlags as F,
        PidController, SwingController,
    },
    exit::{ExitConditions, ExitParams},
    loc::{ImuEncoderLocalizer, LocConfig, LocMgr},
    sim::{Side, Sim, SimDrivetrain, SimWorld},
    Pose, PoseRequest,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest step of the simulation thread.
const SIM_STEP: Duration = Duration::from_millis(2);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Real time simulation thread.
struct SimThread {
    run: Arc<AtomicBool>,
    jh: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("motion_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(
        LevelFilter::Debug,
        &[("motion_lib::loc", LevelFilter::Info)],
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    info!("Motion Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let chassis_params: ChassisParams =
        util::params::load("chassis.toml").wrap_err("Could not load chassis params")?;
    let loc_params: LocConfig =
        util::params::load("loc.toml").wrap_err("Could not load localisation params")?;
    let ctrl_params: ControllerParams =
        util::params::load("controllers.toml").wrap_err("Could not load controller params")?;
    let exit_params: ExitParams =
        util::params::load("exit.toml").wrap_err("Could not load exit condition params")?;

    info!("Parameters loaded");

    // ---- SIMULATION ----

    let sim = Sim::new(SimWorld::new(
        Pose::origin(),
        chassis_params.track_width,
        loc_params.imu_encoder.ticks_per_inch,
    ));
    let sim_thread = spawn_sim(sim.clone()).wrap_err("Failed to start the simulation")?;
    info!("Simulation started");

    // ---- LOCALISATION ----

    let loc = LocMgr::new(loc_params.manager).wrap_err("Invalid localisation params")?;
    let localizer = ImuEncoderLocalizer::new(
        loc_params.imu_encoder,
        Box::new(sim.encoder(Side::Left)),
        Box::new(sim.encoder(Side::Right)),
        Some(Box::new(sim.inertial())),
    )
    .wrap_err("Invalid localiser params")?;

    loc.begin_localization(localizer)
        .wrap_err("Failed to start localisation")?;

    // ---- CONTROLLERS ----

    let track_width = chassis_params.track_width;

    let pid = PidController::new(ctrl_params.pid)?;
    let mut boomerang = BoomerangController::new(ctrl_params.boomerang)?;
    let mut swing = SwingController::new(ctrl_params.swing, track_width)?;
    let mut arc = ArcPidController::new(ctrl_params.arc_pid, track_width)?;

    // Abort every motion if the simulation dies
    let sim_alive = sim_thread.run.clone();
    let exit = ExitConditions::from_params(&exit_params)
        .wrap_err("Invalid exit condition params")?
        .exit_if(move || !sim_alive.load(Ordering::SeqCst));

    // PID and the configured exit conditions are the defaults of every motion
    let mut chassis = DiffChassis::new(
        chassis_params,
        sim.drivetrain(),
        SystemTicker::new(),
        loc.clone(),
        Box::new(pid),
        exit,
    )
    .wrap_err("Invalid chassis params")?;

    // ---- MOTION SEQUENCE ----

    info!("Beginning motion sequence\n");

    loc.set_pose(PoseRequest::degrees(0.0, 0.0, 270.0));

    let mut reports = Vec::new();

    reports.push(chassis.move_with(
        PoseRequest::degrees(24.0, 24.0, 45.0),
        &mut boomerang,
        100.0,
        F::THRU | F::REVERSE,
    ));
    reports.push(chassis.turn(90f64.to_radians(), 100.0, F::THRU));
    reports.push(chassis.move_with(
        PoseRequest::degrees(-10.0, 60.0, 180.0),
        &mut boomerang,
        100.0,
        F::THRU,
    ));
    reports.push(chassis.turn_with(
        270f64.to_radians(),
        &mut swing,
        100.0,
        F::REVERSE | F::THRU,
    ));
    reports.push(chassis.move_to(PoseRequest::point(10.0, 30.0), 100.0, F::THRU));
    reports.push(chassis.turn(0.0, 100.0, F::empty()));
    reports.push(chassis.move_with(
        PoseRequest::point(24.0, 24.0),
        &mut arc,
        60.0,
        F::RELATIVE,
    ));
    reports.push(chassis.turn_to_point(0.0, 0.0, 100.0, F::empty()));

    archive(&session, reports)?;

    // Short teleop burst: forwards while turning right, then stop
    teleop(&mut chassis);

    info!(
        "Final pose {:?}, sensor health {:?}",
        loc.get_pose(),
        loc.sensor_health()
    );

    // ---- SHUTDOWN ----

    loc.shutdown();
    sim_thread.run.store(false, Ordering::SeqCst);
    if sim_thread.jh.join().is_err() {
        warn!("Simulation thread panicked");
    }

    info!("End of execution");
    session.exit();

    Ok(())
}

/// Start the real time simulation thread.
fn spawn_sim(sim: Sim) -> Result<SimThread, std::io::Error> {
    let run = Arc::new(AtomicBool::new(true));
    let run_clone = run.clone();

    let jh = thread::Builder::new()
        .name("simulation".into())
        .spawn(move || {
            let mut last = Instant::now();

            while run_clone.load(Ordering::SeqCst) {
                thread::sleep(SIM_STEP);

                let now = Instant::now();
                sim.world().step(now - last);
                last = now;
            }
        })?;

    Ok(SimThread { run, jh })
}

/// Save every motion report in the session, failing on the first motion
/// which could not be run.
fn archive(
    session: &Session,
    reports: Vec<Result<MotionReport, MotionError>>,
) -> Result<(), Report> {
    for (i, report) in reports.into_iter().enumerate() {
        let report = report.wrap_err_with(|| format!("Motion {} could not be run", i))?;

        if !report.is_settled() {
            warn!("Motion {} ended with {:?}", i, report.status);
        }
        session.save(format!("motion_{:02}.json", i), report);
    }

    Ok(())
}

fn teleop(chassis: &mut DiffChassis<SimDrivetrain, SystemTicker>) {
    let start = Instant::now();

    while start.elapsed() < Duration::from_millis(500) {
        chassis.arcade(50.0, 20.0);
        thread::sleep(chassis.params().tick_period());
    }
    chassis.tank(0.0, 0.0);
}
