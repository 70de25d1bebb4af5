//! Inverse and forward kinematics of the arm.
//!
//! Joints 2, 3 and 4 move the gripper in the arm's vertical plane. Angles are measured from the
//! upright posture, so the absolute angle of each link from the horizontal is
//!
//! ```text
//! t2 = m2 + pi/2,  t3 = t2 + m3,  t4 = t3 + m4
//! ```
//!
//! and the wrist angle (the angle of the gripper link from horizontal used in targets) is
//! `t4 + pi/2`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

use super::{ArmCtrlError, Params};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distances below this are treated as zero.
const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of solving for a planar target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IkSolution {
    /// Joints 2, 3 and 4.
    ///
    /// Units: degrees
    pub joints_deg: [f64; 3],

    /// `false` if no solution was found, in which case `joints_deg` holds the previously
    /// commanded angles.
    pub solved: bool,
}

/// Result of the experimental cartesian solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianIkSolution {
    /// Joints 1 to 4.
    ///
    /// Units: degrees
    pub joints_deg: [f64; 4],

    pub solved: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Solve joints 2, 3 and 4 placing the gripper at `target` with the given wrist angle.
///
/// Two candidate configurations exist for a reachable target. The first one within the joint
/// limits is returned.
///
/// Units: target in millimeters, wrist angle in radians
pub fn solve_planar(
    params: &Params,
    target: &Point2<f64>,
    wrist_rad: f64,
) -> Result<[f64; 3], ArmCtrlError> {
    let l2 = params.upper_arm_length_mm;
    let l3 = params.forearm_length_mm;
    let l4 = params.wrist_length_mm;

    // Position of joint 4
    let x = target.x - l4 * wrist_rad.sin();
    let y = target.y + l4 * wrist_rad.cos();

    let dist_sq = x * x + y * y;
    let dist = dist_sq.sqrt();
    if !dist.is_finite() || dist < EPSILON {
        return Err(ArmCtrlError::OutOfReach);
    }

    let fi = y.atan2(x);
    let b = checked_acos((l2 * l2 + l3 * l3 - dist_sq) / (2.0 * l2 * l3))?;
    let a = checked_acos((l2 * l2 - l3 * l3 + dist_sq) / (2.0 * l2 * dist))?;

    let primary = [
        fi + a - FRAC_PI_2,
        b - PI,
        wrist_rad - (fi + a - FRAC_PI_2) - (b - PI) - PI,
    ];
    let alternate = [
        fi - a - FRAC_PI_2,
        PI - b,
        wrist_rad + a + b - fi - 3.0 * FRAC_PI_2,
    ];

    [primary, alternate]
        .iter()
        .map(|c| [c[0].to_degrees(), c[1].to_degrees(), c[2].to_degrees()])
        .find(|c| within_limits(params, c))
        .ok_or(ArmCtrlError::NoValidSolution)
}

/// Solve for a 3D target, rotating the base towards it and reducing to the planar problem in the
/// (horizontal reach, height) plane.
///
/// This solver is experimental and has not been verified against the hardware.
pub fn solve_cartesian_experimental(
    params: &Params,
    target: &Point3<f64>,
    wrist_rad: f64,
) -> Result<[f64; 4], ArmCtrlError> {
    let reach = (target.x * target.x + target.y * target.y).sqrt();
    if !reach.is_finite() || reach < EPSILON {
        return Err(ArmCtrlError::OutOfReach);
    }

    let base_rad = (target.x / reach).asin();
    if !base_rad.is_finite() {
        return Err(ArmCtrlError::OutOfReach);
    }

    let planar = solve_planar(params, &Point2::new(reach, target.z), wrist_rad)?;

    Ok([base_rad.to_degrees(), planar[0], planar[1], planar[2]])
}

/// Gripper position and wrist angle reached by the given joint 2, 3 and 4 angles.
///
/// Units: joints in degrees, returns millimeters and radians
pub fn forward_planar(params: &Params, joints_deg: &[f64; 3]) -> (Point2<f64>, f64) {
    let t2 = joints_deg[0].to_radians() + FRAC_PI_2;
    let t3 = t2 + joints_deg[1].to_radians();
    let t4 = t3 + joints_deg[2].to_radians();

    let x = params.upper_arm_length_mm * t2.cos()
        + params.forearm_length_mm * t3.cos()
        + params.wrist_length_mm * t4.cos();
    let y = params.upper_arm_length_mm * t2.sin()
        + params.forearm_length_mm * t3.sin()
        + params.wrist_length_mm * t4.sin();

    (Point2::new(x, y), t4 + FRAC_PI_2)
}

fn within_limits(params: &Params, joints_deg: &[f64; 3]) -> bool {
    let limits = [
        params.joint_2_limits_deg,
        params.joint_3_limits_deg,
        params.joint_4_limits_deg,
    ];

    joints_deg
        .iter()
        .zip(limits.iter())
        .all(|(j, (min, max))| *min < *j && *j < *max)
}

/// `acos` which rejects arguments outside `[-1, 1]` rather than returning `NAN`.
fn checked_acos(value: f64) -> Result<f64, ArmCtrlError> {
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Ok(value.acos())
    } else {
        Err(ArmCtrlError::OutOfReach)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
