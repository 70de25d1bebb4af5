//! # Stack Launcher
//!
//! The robot's onboard software stack must be running before the control stream can be opened.
//! How it is checked and (re)started is site specific, so `BotClient` only sees this trait.

use log::debug;
use std::fmt::Debug;

/// Makes sure the robot's onboard stack is running.
pub trait StackLauncher: Debug + Send + Sync {
    /// Check the stack on the robot at `address`, starting it if it isn't running or restarting
    /// it if `force_restart` is set.
    ///
    /// Returns `false` if the stack could not be brought up.
    fn ensure_running(&self, address: &str, force_restart: bool) -> bool;
}

/// Launcher for robots whose stack is managed externally. Always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLauncher;

impl StackLauncher for NoopLauncher {
    fn ensure_running(&self, address: &str, force_restart: bool) -> bool {
        if force_restart {
            debug!(
                "Restart of the stack on {} requested but the stack is managed externally",
                address
            );
        }
        true
    }
}
