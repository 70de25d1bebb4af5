//! # Telecommand module
//!
//! Outbound commands sent to the robot over the control stream.
//!
//! Every command is a single ASCII frame terminated by `^^^`:
//!
//! - `/base:<forward>;<lateral>;<rotation>^^^`
//! - `/arm:<arm>;<m1>;<m2>;<m3>;<m4>;<m5>^^^`
//! - `/arm_vel:<arm>;<v1>;<v2>;<v3>;<v4>;<v5>^^^`
//! - `/grip:<arm>;<value>^^^`
//!
//! Values are limited to the hardware ranges when the frame is encoded, so no out of range value
//! is ever put on the wire.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::eqpt::arm::{self, ArmId, JOINT_CALIB, NUM_JOINTS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Terminator appended to every outbound command.
pub const CMD_TERMINATOR: &str = "^^^";

/// Limit on the magnitude of each base velocity component.
///
/// Units: meters/second for the linear components, radians/second for rotation
pub const MAX_BASE_VEL: f64 = 1.0;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command for the robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tc {
    /// Base velocity demand.
    BaseMove {
        forward: f64,
        lateral: f64,
        rotation: f64,
    },

    /// Raw actuator position demand for one arm.
    ArmMove { arm: ArmId, raw: [f64; NUM_JOINTS] },

    /// Joint velocity demand for one arm.
    ArmVelocity { arm: ArmId, vel: [f64; NUM_JOINTS] },

    /// Gripper demand for one arm.
    Grip { arm: ArmId, value: f64 },
}

/// Outbound channels. Each channel holds at most one pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Base,
    Arm,
    Grip,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// A command bringing the base to rest.
    pub fn stop_base() -> Self {
        Tc::BaseMove {
            forward: 0.0,
            lateral: 0.0,
            rotation: 0.0,
        }
    }

    /// Build an arm position demand from logical joint angles in degrees.
    pub fn arm_move_from_joints(arm: ArmId, joints_deg: &[f64; NUM_JOINTS]) -> Self {
        Tc::ArmMove {
            arm,
            raw: arm::logical_to_raw(joints_deg),
        }
    }

    /// The channel this command is sent on.
    pub fn channel(&self) -> Channel {
        match self {
            Tc::BaseMove { .. } => Channel::Base,
            Tc::ArmMove { .. } | Tc::ArmVelocity { .. } => Channel::Arm,
            Tc::Grip { .. } => Channel::Grip,
        }
    }

    /// Encode the command into its wire format.
    ///
    /// Non-finite values are treated as zero before limiting.
    pub fn encode(&self) -> String {
        match self {
            Tc::BaseMove {
                forward,
                lateral,
                rotation,
            } => format!(
                "/base:{};{};{}{}",
                limit(*forward, -MAX_BASE_VEL, MAX_BASE_VEL),
                limit(*lateral, -MAX_BASE_VEL, MAX_BASE_VEL),
                limit(*rotation, -MAX_BASE_VEL, MAX_BASE_VEL),
                CMD_TERMINATOR
            ),
            Tc::ArmMove { arm, raw } => {
                let mut values = [0.0; NUM_JOINTS];
                for i in 0..NUM_JOINTS {
                    values[i] = limit(raw[i], JOINT_CALIB[i].raw_min, JOINT_CALIB[i].raw_max);
                }
                format!("/arm:{};{}{}", arm, join(&values), CMD_TERMINATOR)
            }
            Tc::ArmVelocity { arm, vel } => {
                let mut values = [0.0; NUM_JOINTS];
                for i in 0..NUM_JOINTS {
                    values[i] = limit(vel[i], -arm::MAX_JOINT_VEL, arm::MAX_JOINT_VEL);
                }
                format!("/arm_vel:{};{}{}", arm, join(&values), CMD_TERMINATOR)
            }
            Tc::Grip { arm, value } => format!(
                "/grip:{};{}{}",
                arm,
                limit(*value, arm::GRIP_RANGE.0, arm::GRIP_RANGE.1),
                CMD_TERMINATOR
            ),
        }
    }
}

impl Channel {
    /// Order in which channels are serviced.
    pub const ROUND_ROBIN: [Channel; 3] = [Channel::Base, Channel::Arm, Channel::Grip];

    /// Index of the channel's slot.
    pub fn index(self) -> usize {
        match self {
            Channel::Base => 0,
            Channel::Arm => 1,
            Channel::Grip => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn limit(value: f64, min: f64, max: f64) -> f64 {
    let value = if value.is_finite() { value } else { 0.0 };
    value.clamp(min, max)
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encode_base() {
        let tc = Tc::BaseMove {
            forward: 0.2,
            lateral: -0.5,
            rotation: 0.0,
        };
        assert_eq!(tc.encode(), "/base:0.2;-0.5;0^^^");
        assert_eq!(tc.channel(), Channel::Base);

        let tc = Tc::BaseMove {
            forward: 3.0,
            lateral: -7.0,
            rotation: f64::NAN,
        };
        assert_eq!(tc.encode(), "/base:1;-1;0^^^");
    }

    #[test]
    fn test_encode_arm() {
        let tc = Tc::arm_move_from_joints(ArmId::Arm0, &arm::FOLDED_JOINTS_DEG);
        assert_eq!(tc.encode(), "/arm:0;168;10;-70;195;166^^^");
        assert_eq!(tc.channel(), Channel::Arm);

        // Raw values outside the actuator travel are limited
        let tc = Tc::ArmMove {
            arm: ArmId::Arm1,
            raw: [0.0, 500.0, 0.0, 5.0, 300.0],
        };
        assert_eq!(tc.encode(), "/arm:1;11;150;-15;10;292^^^");
    }

    #[test]
    fn test_encode_arm_vel() {
        let tc = Tc::ArmVelocity {
            arm: ArmId::Arm1,
            vel: [10.0, -100.0, 90.0, 0.5, 200.0],
        };
        assert_eq!(tc.encode(), "/arm_vel:1;10;-90;90;0.5;90^^^");
        assert_eq!(tc.channel(), Channel::Arm);
    }

    #[test]
    fn test_encode_grip() {
        let tc = Tc::Grip {
            arm: ArmId::Arm0,
            value: 1.5,
        };
        assert_eq!(tc.encode(), "/grip:0;1.5^^^");
        assert_eq!(tc.channel(), Channel::Grip);

        let tc = Tc::Grip {
            arm: ArmId::Arm0,
            value: 2.5,
        };
        assert_eq!(tc.encode(), "/grip:0;2^^^");
    }
}
