//! Navigation control parameters

use serde::{Deserialize, Serialize};

/// Parameters for the navigation controller, loaded from `nav_ctrl.toml`.
///
/// The first three are defaults for goals which don't give their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Distance and heading error below which a goal is reached.
    ///
    /// Units: meters, radians
    pub precision: f64,

    /// Proportional gain from distance to speed.
    ///
    /// Units: 1/seconds
    pub gain: f64,

    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Lower bound on the time to arrival used to compute the angular velocity.
    ///
    /// Units: seconds
    pub min_arrival_time_s: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            precision: 0.005,
            gain: 1.0,
            max_speed_ms: 0.2,
            min_arrival_time_s: 0.1,
        }
    }
}
