//! # Bot Executable Parameters
//!
//! This module provides parameters for the robot link, loaded from `bot_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::DEFAULT_CONTROL_PORT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotExecParams {
    // ---- NETWORK ----
    /// Port of the robot's control stream
    pub control_port: u16,

    /// Port of the RGB camera video stream
    pub rgb_video_port: u16,

    /// Port of the depth camera video stream
    pub depth_video_port: u16,

    /// Consume the RGB camera stream
    pub rgb_cam_enabled: bool,

    /// Consume the depth camera stream
    pub depth_cam_enabled: bool,

    /// Time allowed for a stream to connect.
    ///
    /// Units: seconds
    pub connect_timeout_s: f64,

    /// Time without any bytes on the control stream after which the link is considered lost.
    ///
    /// Units: seconds
    pub read_timeout_s: f64,

    /// Number of decoded frames which may be waiting for the decode worker before the receiver
    /// blocks.
    pub frame_queue_len: usize,

    // ---- COMMANDS ----
    /// Frequency at which the command multiplexer writes to the robot.
    ///
    /// Units: Hertz
    pub cmd_freq_hz: f64,

    /// Time allowed for the stop and fold commands to drain when disconnecting.
    ///
    /// Units: seconds
    pub shutdown_drain_timeout_s: f64,

    // ---- ONBOARD STACK ----
    /// Always restart the robot's onboard stack when connecting
    pub force_restart: bool,

    // ---- LOGGING ----
    /// Minimum log level, one of `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub log_level: String,

    /// Frequency at which telemetry is recorded when recording is enabled.
    ///
    /// Units: Hertz
    pub tm_log_freq_hz: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for BotExecParams {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            rgb_video_port: 8080,
            depth_video_port: 8081,
            rgb_cam_enabled: true,
            depth_cam_enabled: false,
            connect_timeout_s: 2.0,
            read_timeout_s: 2.0,
            frame_queue_len: 256,
            cmd_freq_hz: 50.0,
            shutdown_drain_timeout_s: 1.0,
            force_restart: false,
            log_level: String::from("info"),
            tm_log_freq_hz: 10.0,
        }
    }
}

impl BotExecParams {
    pub fn connect_timeout(&self) -> Duration {
        secs_or_default(self.connect_timeout_s, 2.0)
    }

    pub fn read_timeout(&self) -> Duration {
        secs_or_default(self.read_timeout_s, 2.0)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        secs_or_default(self.shutdown_drain_timeout_s, 1.0)
    }

    /// Period of one command multiplexer tick.
    pub fn cmd_period(&self) -> Duration {
        util::time::period_from_freq_hz(self.cmd_freq_hz)
            .unwrap_or_else(|| Duration::from_millis(20))
    }
}

/// Zero or negative timeouts are rejected by the socket API, use the default instead.
fn secs_or_default(secs: f64, default: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(default)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
