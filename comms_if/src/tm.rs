//! # Telemetry module
//!
//! Decoding of the telemetry frames sent by the robot over the control stream.
//!
//! A telemetry frame is a prefix identifying the source followed by `;` separated decimal
//! values:
//!
//! | Prefix      | Payload                          |
//! |-------------|----------------------------------|
//! | `.laser#`   | lidar ranges, at least 200       |
//! | `.odom#`    | odometry increments              |
//! | `.manip0#`  | raw arm 0 actuator readings (5)  |
//! | `.manip1#`  | raw arm 1 actuator readings (5)  |
//! | `.wheels#`  | cumulative wheel encoders (4)    |

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

use crate::eqpt::arm::{ArmId, NUM_JOINTS};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const LASER_PREFIX: &str = ".laser#";
pub const ODOM_PREFIX: &str = ".odom#";
pub const MANIP0_PREFIX: &str = ".manip0#";
pub const MANIP1_PREFIX: &str = ".manip1#";
pub const WHEELS_PREFIX: &str = ".wheels#";

/// Minimum number of readings in an accepted lidar scan.
pub const LIDAR_MIN_READINGS: usize = 200;

/// Range substituted for lidar readings which cannot be parsed.
///
/// Units: meters
pub const LIDAR_FALLBACK_RANGE_M: f64 = 5.0;

/// Number of wheel encoders on the base.
pub const NUM_WHEELS: usize = 4;

/// Separator between values in a frame payload.
pub const FIELD_SEP: char = ';';

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A decoded telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TmFrame {
    /// Lidar scan ranges in meters
    Lidar(Vec<f64>),

    /// Odometry increments as reported by the robot
    Increment(Vec<f64>),

    /// Raw actuator readings from one arm
    ArmReading(ArmId, [f64; NUM_JOINTS]),

    /// Cumulative wheel encoder values
    Wheels([f64; NUM_WHEELS]),
}

/// Reasons a telemetry frame was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Could not parse \"{0}\" as a number")]
    InvalidNumber(String),

    #[error("Expected {expected} values, found {found}")]
    WrongNumValues { expected: usize, found: usize },

    #[error("Lidar scan has {0} readings, at least {} are required", LIDAR_MIN_READINGS)]
    ShortLidarScan(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmFrame {
    /// Decode a single frame.
    ///
    /// Returns `Ok(None)` if the frame does not carry a known prefix.
    pub fn decode(frame: &str) -> Result<Option<Self>, DecodeError> {
        if let Some(payload) = frame.strip_prefix(LASER_PREFIX) {
            decode_lidar(payload).map(|s| Some(TmFrame::Lidar(s)))
        } else if let Some(payload) = frame.strip_prefix(ODOM_PREFIX) {
            parse_all(payload).map(|v| Some(TmFrame::Increment(v)))
        } else if let Some(payload) = frame.strip_prefix(MANIP0_PREFIX) {
            parse_exact(payload).map(|v| Some(TmFrame::ArmReading(ArmId::Arm0, v)))
        } else if let Some(payload) = frame.strip_prefix(MANIP1_PREFIX) {
            parse_exact(payload).map(|v| Some(TmFrame::ArmReading(ArmId::Arm1, v)))
        } else if let Some(payload) = frame.strip_prefix(WHEELS_PREFIX) {
            parse_exact(payload).map(|v| Some(TmFrame::Wheels(v)))
        } else {
            Ok(None)
        }
    }

    /// Encode the frame in the robot's format, without the terminator.
    ///
    /// Used by simulated robots and recordings.
    pub fn encode(&self) -> String {
        let (prefix, values): (&str, &[f64]) = match self {
            TmFrame::Lidar(v) => (LASER_PREFIX, &v[..]),
            TmFrame::Increment(v) => (ODOM_PREFIX, &v[..]),
            TmFrame::ArmReading(ArmId::Arm0, v) => (MANIP0_PREFIX, &v[..]),
            TmFrame::ArmReading(ArmId::Arm1, v) => (MANIP1_PREFIX, &v[..]),
            TmFrame::Wheels(v) => (WHEELS_PREFIX, &v[..]),
        };

        let mut s = String::from(prefix);
        s.push_str(&join_values(values, ";"));
        s
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Join values with the given separator.
pub fn join_values(values: &[f64], sep: &str) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Parse a single value, ignoring surrounding whitespace.
pub fn parse_value(field: &str) -> Result<f64, DecodeError> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| DecodeError::InvalidNumber(field.to_string()))
}

/// Lidar fields which fail to parse take the fallback range, empty fields are skipped.
fn decode_lidar(payload: &str) -> Result<Vec<f64>, DecodeError> {
    let scan: Vec<f64> = payload
        .split(FIELD_SEP)
        .filter(|f| !f.trim().is_empty())
        .map(|f| parse_value(f).unwrap_or(LIDAR_FALLBACK_RANGE_M))
        .collect();

    if scan.len() < LIDAR_MIN_READINGS {
        return Err(DecodeError::ShortLidarScan(scan.len()));
    }

    Ok(scan)
}

fn parse_all(payload: &str) -> Result<Vec<f64>, DecodeError> {
    payload.split(FIELD_SEP).map(parse_value).collect()
}

fn parse_exact<const N: usize>(payload: &str) -> Result<[f64; N], DecodeError> {
    let values = parse_all(payload)?;

    if values.len() != N {
        return Err(DecodeError::WrongNumValues {
            expected: N,
            found: values.len(),
        });
    }

    let mut out = [0.0; N];
    out.copy_from_slice(&values);
    Ok(out)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
