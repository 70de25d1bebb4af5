//! # Bot library.
//!
//! This library allows other crates in the workspace to access items defined inside the robot
//! link crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm control module - converts arm demands into actuator commands, including inverse
/// kinematics
pub mod arm_ctrl;

/// Bot client - the session with a robot, owning the connection and all its tasks
pub mod bot_client;

/// Camera client - consumes the video streams from the robot's cameras
pub mod cam_client;

/// Command multiplexer - the single outbound path for commands to the robot
pub mod cmd_mux;

/// Telemetry store - latest telemetry received from the robot
pub mod data_store;

/// Stack launcher - brings up the robot's onboard software before connecting
pub mod launcher;

/// Localisation module - wheel odometry
pub mod loc;

/// Navigation control module - drives the base to a goal pose
pub mod nav_ctrl;

/// Parameters for the executable and the link
pub mod params;

/// Background task bookkeeping
pub mod task;

/// Telemetry log - recording and replay of lidar and wheel telemetry
pub mod tm_log;
