//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Arm control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- GEOMETRY ----
    /// Length of the link between joints 2 and 3.
    ///
    /// Units: millimeters
    pub upper_arm_length_mm: f64,

    /// Length of the link between joints 3 and 4.
    ///
    /// Units: millimeters
    pub forearm_length_mm: f64,

    /// Length from joint 4 to the gripper.
    ///
    /// Units: millimeters
    pub wrist_length_mm: f64,

    // ---- CAPABILITIES ----
    /// Exclusive limits on joint 2 for inverse kinematics solutions.
    ///
    /// Units: degrees
    pub joint_2_limits_deg: (f64, f64),

    /// Exclusive limits on joint 3 for inverse kinematics solutions.
    ///
    /// Units: degrees
    pub joint_3_limits_deg: (f64, f64),

    /// Exclusive limits on joint 4 for inverse kinematics solutions.
    ///
    /// Units: degrees
    pub joint_4_limits_deg: (f64, f64),
}

impl Default for Params {
    fn default() -> Self {
        Self {
            upper_arm_length_mm: 155.0,
            forearm_length_mm: 135.0,
            wrist_length_mm: 200.0,
            joint_2_limits_deg: (-84.0, 63.0),
            joint_3_limits_deg: (-135.0, 110.0),
            joint_4_limits_deg: (-90.0, 95.0),
        }
    }
}
