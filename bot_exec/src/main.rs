//! Main robot link executable entry point.
//!
//! # Architecture
//!
//! The executable connects to a single robot and reports its state until interrupted:
//!
//!     - Initialise the session and logging
//!     - Load parameters
//!     - Connect to the robot, or replay a telemetry recording when offline
//!     - Main loop:
//!         - Report the pose, distance travelled and live tasks once per second
//!         - Stop if the link is lost
//!
//! Commanding the robot interactively is done with `command_line_bot`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::{path::PathBuf, thread, time::Duration};
use structopt::StructOpt;

// Internal
use bot_lib::{
    arm_ctrl,
    bot_client::{BotClient, ConnectionState},
    nav_ctrl,
    params::BotExecParams,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period of the status report.
const STATUS_PERIOD: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "bot_exec", about = "KUKA youBot link executable")]
struct Opts {
    /// Hostname or IP address of the robot
    #[structopt(default_value = "192.168.88.21")]
    address: String,

    /// Minimum log level, overrides the parameter file
    #[structopt(short, long)]
    log_level: Option<LevelFilter>,

    /// Record lidar and wheel telemetry into the session directory
    #[structopt(long)]
    log: bool,

    /// Replay a telemetry recording instead of connecting
    #[structopt(long, parse(from_os_str))]
    replay: Option<PathBuf>,

    /// Restart the robot's onboard stack before connecting
    #[structopt(long)]
    force_restart: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("bot_exec", "sessions").wrap_err("Failed to create the session")?;

    let mut params: BotExecParams = load_or_default("bot_exec.toml")?;
    if opts.force_restart {
        params.force_restart = true;
    }

    let level = match opts.log_level {
        Some(l) => l,
        None => params
            .log_level
            .parse()
            .map_err(|_| eyre!("Invalid log level \"{}\"", params.log_level))?,
    };
    logger_init(level, &session).wrap_err("Failed to initialise logging")?;

    info!("youBot Link Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let arm_params: arm_ctrl::Params = load_or_default("arm_ctrl.toml")?;
    let nav_params: nav_ctrl::Params = load_or_default("nav_ctrl.toml")?;
    info!("Parameters loaded");

    let client = BotClient::new(params, arm_params, nav_params);

    // ---- CONNECT OR REPLAY ----

    match &opts.replay {
        Some(path) => {
            let n = client
                .replay(path)
                .wrap_err_with(|| format!("Failed to replay {:?}", path))?;
            info!("Replaying {} records", n);
        }
        None => {
            client
                .connect(&opts.address)
                .wrap_err_with(|| format!("Failed to connect to {}", opts.address))?;
        }
    }

    if opts.log {
        let path = client
            .start_telemetry_log(&session.tm_log_root)
            .wrap_err("Failed to start the telemetry log")?;
        info!("Recording telemetry to {:?}", path);
    }

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        let pose = client.get_pose();
        info!(
            "Pose: x = {:.3} m, y = {:.3} m, theta = {:.3} rad, travelled {:.3}, {} tasks",
            pose.x_m,
            pose.y_m,
            pose.theta_rad,
            client.get_distance_travelled(),
            client.num_live_tasks()
        );

        match client.connection_state() {
            ConnectionState::ShuttingDown => {
                warn!("Link to the robot lost, exiting");
                break;
            }
            ConnectionState::Disconnected if opts.replay.is_some() => {
                if client.num_live_tasks() == 0 {
                    info!("Replay complete");
                    break;
                }
            }
            _ => (),
        }

        thread::sleep(STATUS_PERIOD);
    }

    client.disconnect();

    info!("End of execution");

    Ok(())
}

/// Load a parameter file, using the defaults if the file doesn't exist.
fn load_or_default<P>(file: &str) -> Result<P, Report>
where
    P: serde::de::DeserializeOwned + Default,
{
    util::params::load_or_default(file).wrap_err_with(|| format!("Failed to load {}", file))
}
