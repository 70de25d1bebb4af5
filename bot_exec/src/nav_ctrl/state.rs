//! # Navigation control step
//!
//! One tick of the proportional controller: from the current pose and the goal produce a base
//! velocity demand, or report that the goal has been reached.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::tc::Tc;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use util::{maths::get_ang_dist_2pi, module::State};

use super::{NavCtrlError, Params};
use crate::loc::Pose;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distances and speeds below this are treated as zero when estimating the time to arrival.
const ARRIVAL_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A navigation goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavTarget {
    /// Units: meters
    pub x_m: f64,

    /// Units: meters
    pub y_m: f64,

    /// Units: radians
    pub heading_rad: f64,

    /// Units: meters, radians
    pub precision: f64,

    pub gain: f64,

    /// Units: meters/second
    pub max_speed_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct NavStep {
    params: Params,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputData {
    pub pose: Pose,
    pub target: NavTarget,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Units: meters
    pub dist_m: f64,

    /// Signed heading error from the current heading to the goal heading.
    ///
    /// Units: radians
    pub heading_err_rad: f64,

    /// Set when the time to arrival was replaced by its minimum.
    pub arrival_time_limited: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavOutput {
    /// Base velocity demand to send this tick.
    Drive(Tc),

    /// The goal is within precision.
    Arrived,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavTarget {
    /// A goal using the precision, gain and speed from `params`.
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64, params: &Params) -> Self {
        Self {
            x_m,
            y_m,
            heading_rad,
            precision: params.precision,
            gain: params.gain,
            max_speed_ms: params.max_speed_ms,
        }
    }

    pub fn is_finite(&self) -> bool {
        [
            self.x_m,
            self.y_m,
            self.heading_rad,
            self.precision,
            self.gain,
            self.max_speed_ms,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

impl State for NavStep {
    type InitData = Params;
    type InitError = NavCtrlError;

    type InputData = InputData;
    type OutputData = NavOutput;
    type StatusReport = StatusReport;
    type ProcError = NavCtrlError;

    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        self.params = init_data;
        Ok(())
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let pose = &input_data.pose;
        let target = &input_data.target;

        if !(pose.x_m.is_finite() && pose.y_m.is_finite() && pose.theta_rad.is_finite()) {
            return Err(NavCtrlError::NonFinitePose);
        }

        let delta = Vector2::new(target.x_m - pose.x_m, target.y_m - pose.y_m);
        let dist = delta.norm();
        let heading_err = get_ang_dist_2pi(pose.theta_rad, target.heading_rad);

        let mut report = StatusReport {
            dist_m: dist,
            heading_err_rad: heading_err,
            arrival_time_limited: false,
        };

        if dist < target.precision && heading_err.abs() < target.precision {
            return Ok((NavOutput::Arrived, report));
        }

        let speed = target.max_speed_ms.min(dist * target.gain);
        let bearing = delta.y.atan2(delta.x) - pose.theta_rad;

        let forward = speed * bearing.cos();
        let lateral = -speed * bearing.sin();
        let total_speed = forward.hypot(lateral);

        let mut t_arrive = self.params.min_arrival_time_s;
        if dist >= ARRIVAL_EPSILON && total_speed >= ARRIVAL_EPSILON {
            t_arrive = dist / total_speed;
        }
        if t_arrive <= self.params.min_arrival_time_s {
            t_arrive = self.params.min_arrival_time_s;
            report.arrival_time_limited = true;
        }

        let rotation = -heading_err / t_arrive;

        Ok((
            NavOutput::Drive(Tc::BaseMove {
                forward,
                lateral,
                rotation,
            }),
            report,
        ))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn step(pose: Pose, target: NavTarget) -> (NavOutput, StatusReport) {
        let mut s = NavStep::default();
        s.init(Params::default()).unwrap();
        s.proc(&InputData { pose, target }).unwrap()
    }

    #[test]
    fn test_arrived() {
        let params = Params::default();
        let (out, report) = step(
            Pose::new(1.0, 2.0, 0.5),
            NavTarget::new(1.001, 2.0, 0.501, &params),
        );
        assert_eq!(out, NavOutput::Arrived);
        assert!(report.dist_m < params.precision);
    }

    #[test]
    fn test_drive_ahead() {
        let (out, report) = step(
            Pose::new(0.0, 0.0, 0.0),
            NavTarget::new(1.0, 0.0, 0.0, &Params::default()),
        );

        match out {
            NavOutput::Drive(Tc::BaseMove {
                forward,
                lateral,
                rotation,
            }) => {
                // Speed limited to the maximum
                assert!((forward - 0.2).abs() < 1e-12);
                assert!(lateral.abs() < 1e-12);
                assert!(rotation.abs() < 1e-12);
            }
            o => panic!("Unexpected output {:?}", o),
        }
        assert!(!report.arrival_time_limited);
    }

    #[test]
    fn test_drive_sideways_in_robot_frame() {
        // Facing +y, target at +x is on the robot's right
        let (out, _) = step(
            Pose::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            NavTarget::new(0.1, 0.0, std::f64::consts::FRAC_PI_2, &Params::default()),
        );

        match out {
            NavOutput::Drive(Tc::BaseMove {
                forward, lateral, ..
            }) => {
                assert!(forward.abs() < 1e-9);
                assert!((lateral - 0.1).abs() < 1e-9);
            }
            o => panic!("Unexpected output {:?}", o),
        }
    }

    #[test]
    fn test_turn_on_the_spot_guarded() {
        // At the goal position but not the heading, speed is zero
        let (out, report) = step(
            Pose::new(0.0, 0.0, 0.0),
            NavTarget::new(0.0, 0.0, 1.0, &Params::default()),
        );

        assert!(report.arrival_time_limited);
        match out {
            NavOutput::Drive(Tc::BaseMove {
                forward,
                lateral,
                rotation,
            }) => {
                assert_eq!(forward, 0.0);
                assert_eq!(lateral, 0.0);
                assert!((rotation + 10.0).abs() < 1e-9);
            }
            o => panic!("Unexpected output {:?}", o),
        }
    }

    #[test]
    fn test_heading_error_wraps() {
        // Shortest way from 0.1 to 2pi - 0.1 is -0.2
        let (_, report) = step(
            Pose::new(0.0, 0.0, 0.1),
            NavTarget::new(0.0, 0.0, 2.0 * std::f64::consts::PI - 0.1, &Params::default()),
        );
        assert!((report.heading_err_rad + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_pose() {
        let mut s = NavStep::default();
        let r = s.proc(&InputData {
            pose: Pose {
                x_m: f64::NAN,
                y_m: 0.0,
                theta_rad: 0.0,
            },
            target: NavTarget::new(0.0, 0.0, 0.0, &Params::default()),
        });
        assert!(matches!(r, Err(NavCtrlError::NonFinitePose)));
    }
}
