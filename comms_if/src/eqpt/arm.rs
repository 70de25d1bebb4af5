//! # Arm Equipment
//!
//! Identifiers and actuator calibration for the robot's two 5-joint arms.
//!
//! The arm controller reports and accepts raw actuator values. Everything above this module works
//! in logical joint angles (degrees), where the folded posture is `(0, 56, -80, -90, 0)`. The
//! mapping between the two is a fixed per-joint affine table, `raw = sign * logical + offset`,
//! and raw values are limited to the actuator's travel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of rotational joints on each arm.
pub const NUM_JOINTS: usize = 5;

/// Number of arms on the robot.
pub const NUM_ARMS: usize = 2;

/// Calibration for each joint, from base to wrist.
pub const JOINT_CALIB: [JointCalib; NUM_JOINTS] = [
    JointCalib {
        sign: -1.0,
        offset: 168.0,
        raw_min: 11.0,
        raw_max: 302.0,
    },
    JointCalib {
        sign: -1.0,
        offset: 66.0,
        raw_min: 3.0,
        raw_max: 150.0,
    },
    JointCalib {
        sign: -1.0,
        offset: -150.0,
        raw_min: -260.0,
        raw_max: -15.0,
    },
    JointCalib {
        sign: -1.0,
        offset: 105.0,
        raw_min: 10.0,
        raw_max: 195.0,
    },
    JointCalib {
        sign: 1.0,
        offset: 166.0,
        raw_min: 21.0,
        raw_max: 292.0,
    },
];

/// Joint angles of the folded (transport) posture.
///
/// Units: degrees
pub const FOLDED_JOINTS_DEG: [f64; NUM_JOINTS] = [0.0, 56.0, -80.0, -90.0, 0.0];

/// Gripper demand used when folding the arm.
pub const FOLDED_GRIP: f64 = 2.0;

/// Gripper demand range, closed to open.
pub const GRIP_RANGE: (f64, f64) = (0.0, 2.0);

/// Maximum magnitude of a joint velocity demand.
pub const MAX_JOINT_VEL: f64 = 90.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Affine calibration of a single joint actuator.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct JointCalib {
    pub sign: f64,
    pub offset: f64,

    /// Minimum raw actuator value
    pub raw_min: f64,

    /// Maximum raw actuator value
    pub raw_max: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifies one of the robot's arms.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArmId {
    Arm0,
    Arm1,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmId {
    /// All arms, in index order.
    pub const ALL: [ArmId; NUM_ARMS] = [ArmId::Arm0, ArmId::Arm1];

    /// Index of the arm, which is also its identifier on the wire.
    pub fn index(self) -> usize {
        match self {
            ArmId::Arm0 => 0,
            ArmId::Arm1 => 1,
        }
    }

    /// Get the arm with the given wire index.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ArmId::Arm0),
            1 => Some(ArmId::Arm1),
            _ => None,
        }
    }
}

impl fmt::Display for ArmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl std::str::FromStr for ArmId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<usize>()
            .ok()
            .and_then(ArmId::from_index)
            .ok_or_else(|| format!("\"{}\" is not an arm index (expected 0 or 1)", s))
    }
}

impl JointCalib {
    /// Convert a logical joint angle into a raw actuator value, limited to the actuator travel.
    pub fn to_raw(&self, logical: f64) -> f64 {
        (self.sign * logical + self.offset).clamp(self.raw_min, self.raw_max)
    }

    /// Convert a raw actuator reading into a logical joint angle.
    pub fn to_logical(&self, raw: f64) -> f64 {
        self.sign * (raw - self.offset)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a raw arm reading into corrected logical joint angles.
pub fn raw_to_logical(raw: &[f64; NUM_JOINTS]) -> [f64; NUM_JOINTS] {
    let mut out = [0.0; NUM_JOINTS];
    for i in 0..NUM_JOINTS {
        out[i] = JOINT_CALIB[i].to_logical(raw[i]);
    }
    out
}

/// Convert logical joint angles into raw actuator demands within the actuator travel.
pub fn logical_to_raw(logical: &[f64; NUM_JOINTS]) -> [f64; NUM_JOINTS] {
    let mut out = [0.0; NUM_JOINTS];
    for i in 0..NUM_JOINTS {
        out[i] = JOINT_CALIB[i].to_raw(logical[i]);
    }
    out
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_raw_to_logical() {
        let corrected = raw_to_logical(&[50.0, 10.0, -100.0, 20.0, 170.0]);
        assert_eq!(corrected, [118.0, 56.0, -50.0, 85.0, 4.0]);
    }

    #[test]
    fn test_logical_to_raw_folded() {
        let raw = logical_to_raw(&FOLDED_JOINTS_DEG);
        assert_eq!(raw, [168.0, 10.0, -70.0, 195.0, 166.0]);

        // Within the actuator travel the mapping inverts exactly
        assert_eq!(raw_to_logical(&raw), FOLDED_JOINTS_DEG);
    }

    #[test]
    fn test_logical_to_raw_clamped() {
        let raw = logical_to_raw(&[1000.0, -1000.0, 1000.0, -1000.0, 1000.0]);
        assert_eq!(raw, [11.0, 150.0, -260.0, 195.0, 292.0]);
    }

    #[test]
    fn test_arm_id() {
        assert_eq!("1".parse::<ArmId>(), Ok(ArmId::Arm1));
        assert!("2".parse::<ArmId>().is_err());
        assert_eq!(ArmId::Arm0.to_string(), "0");
    }
}
