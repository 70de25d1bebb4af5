//! # Command line robot console
//!
//! Interactive console for a robot: connects with a `BotClient` and turns each line typed into a
//! call on the client.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::path::PathBuf;
use structopt::{clap::AppSettings, StructOpt};

use bot_lib::{
    arm_ctrl::{self, ArmDemand, IkTarget},
    bot_client::BotClient,
    nav_ctrl,
    params::BotExecParams,
};
use comms_if::eqpt::arm::ArmId;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "youBot $ ";
const HISTORY_PATH: &str = "data/history.txt";

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "command_line_bot", about = "Interactive youBot console")]
struct Opts {
    /// Connect to this robot on startup
    address: Option<String>,

    /// Minimum log level
    #[structopt(short, long, default_value = "warn")]
    log_level: LevelFilter,
}

/// A line typed into the console.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "youbot",
    global_settings = &[AppSettings::NoBinaryName, AppSettings::AllowNegativeNumbers, AppSettings::DisableVersion]
)]
enum Cmd {
    /// Connect to a robot
    #[structopt(name = "connect")]
    Connect { address: String },

    /// Stop the robot, fold the arms and disconnect
    #[structopt(name = "disconnect")]
    Disconnect,

    /// Set the base velocity (m/s, m/s, rad/s)
    #[structopt(name = "base")]
    Base {
        forward: f64,
        lateral: f64,
        rotation: f64,
    },

    /// Move all joints of an arm (degrees), optionally setting the gripper
    #[structopt(name = "arm")]
    Arm {
        arm: ArmId,
        m1: f64,
        m2: f64,
        m3: f64,
        m4: f64,
        m5: f64,
        grip: Option<f64>,
    },

    /// Move a single joint of an arm, joints numbered from 1 at the base
    #[structopt(name = "joint")]
    Joint { arm: ArmId, joint: usize, deg: f64 },

    /// Set the joint velocities of an arm (degrees/second)
    #[structopt(name = "vel")]
    Vel {
        arm: ArmId,
        v1: f64,
        v2: f64,
        v3: f64,
        v4: f64,
        v5: f64,
    },

    /// Set the gripper of an arm, 0 to 2
    #[structopt(name = "grip")]
    Grip { arm: ArmId, value: f64 },

    /// Fold an arm
    #[structopt(name = "fold")]
    Fold { arm: ArmId },

    /// Move the gripper of an arm to a planar target (millimeters, wrist in degrees)
    #[structopt(name = "ik")]
    Ik {
        arm: ArmId,
        x_mm: f64,
        y_mm: f64,
        wrist_deg: f64,

        /// Only print the solution
        #[structopt(long)]
        dry_run: bool,
    },

    /// Navigate to a pose in the odometry frame (m, m, rad)
    #[structopt(name = "goto")]
    Goto {
        x_m: f64,
        y_m: f64,
        heading_rad: f64,

        #[structopt(long)]
        precision: Option<f64>,

        #[structopt(long)]
        gain: Option<f64>,

        #[structopt(long)]
        max_speed: Option<f64>,
    },

    /// Stop navigating and stop the base
    #[structopt(name = "stop")]
    Stop,

    /// Print the integrated pose
    #[structopt(name = "pose")]
    Pose,

    /// Print the joint angles reported by an arm
    #[structopt(name = "arm-pose")]
    ArmPose { arm: ArmId },

    /// Summarise the latest lidar scan
    #[structopt(name = "scan")]
    Scan,

    /// Print the state of the link
    #[structopt(name = "status")]
    Status,

    /// Record telemetry to a file or directory
    #[structopt(name = "record")]
    Record { path: PathBuf },

    /// Replay a telemetry recording
    #[structopt(name = "replay")]
    Replay { path: PathBuf },

    /// Exit the console
    #[structopt(name = "quit", alias = "exit")]
    Quit,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    let session = Session::new("command_line_bot", "sessions")
        .wrap_err("Failed to create the session")?;
    logger_init(opts.log_level, &session).wrap_err("Failed to initialise logging")?;

    let params: BotExecParams = util::params::load_or_default("bot_exec.toml")
        .wrap_err("Failed to load bot_exec.toml")?;
    let arm_params: arm_ctrl::Params = util::params::load_or_default("arm_ctrl.toml")
        .wrap_err("Failed to load arm_ctrl.toml")?;
    let nav_params: nav_ctrl::Params = util::params::load_or_default("nav_ctrl.toml")
        .wrap_err("Failed to load nav_ctrl.toml")?;

    let client = BotClient::new(params, arm_params, nav_params);

    if let Some(address) = &opts.address {
        client
            .connect(address)
            .wrap_err_with(|| format!("Failed to connect to {}", address))?;
        println!("Connected to {}", address);
    }

    let mut rl = DefaultEditor::new().wrap_err("Failed to create the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).wrap_err("Failed to read the console"),
        };

        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let cmd = match Cmd::from_iter_safe(line.split_whitespace()) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        match exec(&client, cmd) {
            Ok(true) => (),
            Ok(false) => break,
            Err(e) => println!("Error: {:#}", e),
        }
    }

    println!("Exiting...");
    client.disconnect();

    if let Some(dir) = PathBuf::from(HISTORY_PATH).parent() {
        std::fs::create_dir_all(dir).ok();
    }
    rl.save_history(HISTORY_PATH)
        .wrap_err("Failed to save the console history")?;

    Ok(())
}

/// Execute a console command. Returns `false` if the console should exit.
fn exec(client: &BotClient, cmd: Cmd) -> Result<bool, Report> {
    match cmd {
        Cmd::Connect { address } => {
            client.connect(&address)?;
            println!("Connected to {}", address);
        }
        Cmd::Disconnect => client.disconnect(),
        Cmd::Base {
            forward,
            lateral,
            rotation,
        } => client.move_base(forward, lateral, rotation)?,
        Cmd::Arm {
            arm,
            m1,
            m2,
            m3,
            m4,
            m5,
            grip,
        } => {
            let mut demand = ArmDemand::joints([m1, m2, m3, m4, m5]);
            demand.grip = grip;
            print_limits(&client.move_arm(arm, demand)?);
        }
        Cmd::Joint { arm, joint, deg } => {
            if joint < 1 || joint > 5 {
                return Err(eyre!("Joints are numbered 1 to 5"));
            }
            let demand = ArmDemand::default().with_joint(joint - 1, deg);
            print_limits(&client.move_arm(arm, demand)?);
        }
        Cmd::Vel {
            arm,
            v1,
            v2,
            v3,
            v4,
            v5,
        } => {
            let report = client.set_arm_velocity(arm, [v1, v2, v3, v4, v5])?;
            if report.rate_limited.iter().any(|l| *l) {
                println!("Rate limited joints: {:?}", report.rate_limited);
            }
        }
        Cmd::Grip { arm, value } => {
            client.move_arm(arm, ArmDemand::default().with_grip(value))?;
        }
        Cmd::Fold { arm } => client.fold_arm(arm)?,
        Cmd::Ik {
            arm,
            x_mm,
            y_mm,
            wrist_deg,
            dry_run,
        } => {
            let target = IkTarget {
                x_mm,
                y_mm,
                wrist_rad: wrist_deg.to_radians(),
            };

            if dry_run {
                let solution = client.solve_arm(arm, &target);
                println!("{}", serde_json::to_string(&solution)?);
            } else {
                let report = client.move_arm(
                    arm,
                    ArmDemand {
                        target: Some(target),
                        ..Default::default()
                    },
                )?;
                if report.ik_solved == Some(false) {
                    println!("Target out of reach, arm not moved");
                }
                print_limits(&report);
            }
        }
        Cmd::Goto {
            x_m,
            y_m,
            heading_rad,
            precision,
            gain,
            max_speed,
        } => client.go_to(x_m, y_m, heading_rad, precision, gain, max_speed)?,
        Cmd::Stop => {
            client.cancel_navigation();
            client.move_base(0.0, 0.0, 0.0)?;
        }
        Cmd::Pose => println!("{}", serde_json::to_string(&client.get_pose())?),
        Cmd::ArmPose { arm } => match client.get_arm_pose(arm) {
            Some(p) => println!("{:?}", p),
            None => println!("No reading from arm {} yet", arm),
        },
        Cmd::Scan => match client.get_lidar_scan() {
            Some(s) => {
                let min = s.scan.iter().cloned().fold(f64::INFINITY, f64::min);
                println!(
                    "{} readings, closest {:.3} m, taken at {}",
                    s.scan.len(),
                    min,
                    serde_json::to_string(&s.pose)?
                );
            }
            None => println!("No lidar scan yet"),
        },
        Cmd::Status => {
            println!("Link: {:?}", client.connection_state());
            println!("Navigation: {:?}", client.nav_mode());
            println!("Tasks: {}", client.num_live_tasks());
            println!("Travelled: {:.3}", client.get_distance_travelled());
            for arm in ArmId::ALL.iter() {
                println!(
                    "Arm {}: {}",
                    arm,
                    serde_json::to_string(&client.arm_state(*arm))?
                );
            }
        }
        Cmd::Record { path } => {
            let path = client.start_telemetry_log(&path)?;
            println!("Recording to {:?}", path);
        }
        Cmd::Replay { path } => {
            let n = client.replay(&path)?;
            println!("Replaying {} records", n);
        }
        Cmd::Quit => return Ok(false),
    }

    Ok(true)
}

fn print_limits(report: &arm_ctrl::StatusReport) {
    if report.abs_pos_limited.iter().any(|l| *l) {
        println!("Position limited joints: {:?}", report.abs_pos_limited);
    }
}
