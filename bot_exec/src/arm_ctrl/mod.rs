//! # Arm control module
//!
//! Converts arm demands (joint angles, gripper values, planar end effector targets) into the
//! commands sent to the robot, keeping track of the last commanded state of each arm.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod inverse_kinematics;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use inverse_kinematics::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArmCtrlError {
    #[error("The target is outside the reach of the arm")]
    OutOfReach,

    #[error("Neither inverse kinematics solution is within the joint limits")]
    NoValidSolution,

    #[error("Demand for joint {0} is not a finite number")]
    NonFiniteDemand(usize),

    #[error("The gripper demand is not a finite number")]
    NonFiniteGrip,
}
