//! Main control executable entry point.
//!
//! # Architecture
//!
//! The execution consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Initialise the planner and optimizer
//!     - Initialise the network:
//!         - Sensor client, receiving sensor messages in the background
//!         - Control server, publishing commands
//!     - Run the control loop until Ctrl-C is pressed or the loop fails

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::io;
use std::sync::Arc;
use std::thread;

// Internal
use comms_if::net::{zmq, NetParams};
use ctrl_lib::{
    ctrl_loop::{CtrlLoop, ProceedGate, SensorCell, ShutdownSignal},
    ctrl_server::CtrlServer,
    mpc::DoubleIntegratorOptimizer,
    params::CtrlParams,
    plan::JointSpacePlanner,
    sensor_client::SensorClient,
};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("ctrl_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Receding Horizon Control Executable\n");
    info!("Running on: {}", host::get_host_info());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    // An optional argument overrides the default parameter file
    let ctrl_params: CtrlParams = match args.len() {
        1 => params::load("ctrl_exec.toml"),
        2 => {
            info!("Loading parameters from \"{}\"", &args[1]);
            params::load_path(&args[1])
        }
        _ => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                args.len() - 1
            ))
        }
    }
    .wrap_err("Could not load control params")?;

    ctrl_params
        .validate()
        .wrap_err("Invalid control parameters")?;

    let net_params: NetParams = params::load("net.toml").wrap_err("Could not load net params")?;

    session.save("params/ctrl_exec.json", ctrl_params.clone());

    info!("Exec parameters loaded");

    // ---- SHUTDOWN HANDLING ----

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger())
            .wrap_err("Failed to set the Ctrl-C handler")?;
    }

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let robot = &ctrl_params.robot;
    info!(
        "Robot model \"{}\": nq = {}, nv = {}, end effector frame \"{}\"",
        robot.name, robot.nq, robot.nv, robot.ee_frame_name
    );

    let planner = JointSpacePlanner::new(ctrl_params.time_step_s, ctrl_params.max_joint_vel_rads);

    let optimizer = DoubleIntegratorOptimizer::new(
        &ctrl_params.solver_weights,
        robot.nq,
        robot.nv,
        ctrl_params.time_step_s,
    )
    .wrap_err("Failed to initialise the optimizer")?;
    info!("Optimizer initialised, gains (kp, kd) = {:?}", optimizer.gains());

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = zmq::Context::new();
    let cell = Arc::new(SensorCell::new());

    let sensor_client = {
        let c = SensorClient::new(&zmq_ctx, &net_params, cell.clone())
            .wrap_err("Failed to initialise SensorClient")?;
        info!("SensorClient initialised");
        c
    };

    let ctrl_server = {
        let s = CtrlServer::new(&zmq_ctx, &net_params)
            .wrap_err("Failed to initialise CtrlServer")?;
        info!("CtrlServer initialised");
        s
    };

    info!("Network initialisation complete");

    // The driver may start after this executable, so not being connected yet is only a notice
    if !sensor_client.connected() {
        info!("SensorClient not yet connected to the driver");
    }
    if !ctrl_server.connected() {
        info!("CtrlServer has no connected driver yet");
    }

    // ---- INPUTS ----

    // The reference is the goal configuration from the parameters
    cell.latch_reference();

    let gate = Arc::new(ProceedGate::new());
    if ctrl_params.auto_proceed {
        info!("Automatic proceed enabled");
        gate.open();
    } else {
        let gate = gate.clone();
        thread::spawn(move || {
            info!("Press enter to start the control loop once the first solve is done");

            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(_) => gate.open(),
                Err(e) => warn!("Could not read from stdin, the loop will not proceed: {}", e),
            }
        });
    }

    // ---- CONTROL LOOP ----

    let archiver =
        Archiver::from_path(&session, "ctrl_loop.csv").wrap_err("Failed to create the archive")?;

    let mut ctrl_loop = CtrlLoop::new(
        ctrl_params,
        planner,
        optimizer,
        ctrl_server,
        cell,
        gate,
        shutdown,
    )
    .with_archiver(archiver);

    info!("Beginning control loop\n");

    let result = ctrl_loop.run();

    // ---- SHUTDOWN ----

    drop(sensor_client);

    if let Ok(report) = &result {
        session.save("loop_report.json", *report);
    }

    info!("End of execution");

    session.exit();

    result.map(|_| ()).wrap_err("Control loop failed")
}
