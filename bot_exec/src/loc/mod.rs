//! # Localisation module
//!
//! Dead reckoning of the robot base from its wheel encoders.
//!
//! The base has four mecanum wheels. Each wheel encoder sample is differenced against the previous
//! sample and the deltas converted into a longitudinal, transverse and rotational motion of the
//! body, which is then rotated into the world frame and accumulated into the pose.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, TryLockError,
};

use comms_if::tm::NUM_WHEELS;
use util::maths::wrap_2pi;

use crate::data_store::TelemetryStore;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Wheel radius divided by the number of wheels.
///
/// Units: meters
pub const WHEEL_RADIUS_PER_WHEEL_M: f64 = 0.0475 / 4.0;

/// Sum of the half wheelbase and half track.
///
/// Units: meters
pub const GEOM_FACTOR_M: f64 = 0.47 / 2.0 + 0.3 / 2.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A sample of the cumulative wheel encoders.
pub type WheelEncoders = [f64; NUM_WHEELS];

/// The pose of the robot base in the odometry frame.
///
/// The odometry frame is fixed at the position the robot was in when integration started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Units: meters
    pub x_m: f64,

    /// Units: meters
    pub y_m: f64,

    /// Heading, always in `[0, 2pi)`.
    ///
    /// Units: radians
    pub theta_rad: f64,
}

/// Odometry integration state: the baseline sample deltas are taken against.
#[derive(Debug, Default, Clone)]
pub struct Odometry {
    baseline: Option<WheelEncoders>,
}

/// Integrates the latest wheel sample in the telemetry store into the store's pose.
///
/// Only one integration runs at a time. A request made while an integration is in progress is
/// coalesced into it: the running integration makes another pass with whatever sample is latest.
#[derive(Debug, Default)]
pub struct OdometryIntegrator {
    odom: Mutex<Odometry>,
    dirty: AtomicBool,
}

/// Outcome of a call to `OdometryIntegrator::integrate_latest`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Integration {
    /// This call performed the integration.
    Done,

    /// Another integration was in progress and will pick up the latest sample.
    Coalesced,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x_m: f64, y_m: f64, theta_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            theta_rad: wrap_2pi(theta_rad),
        }
    }
}

impl Odometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the baseline, the next sample will be used as the new baseline.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Integrate a new wheel sample into the pose.
    ///
    /// Returns the sum of absolute wheel deltas, which is zero for the first sample.
    pub fn update(&mut self, pose: &mut Pose, sample: &WheelEncoders) -> f64 {
        let prev = match self.baseline.replace(*sample) {
            Some(p) => p,
            None => return 0.0,
        };

        let (new_pose, dist) = integrate(pose, &prev, sample);
        *pose = new_pose;
        dist
    }
}

impl OdometryIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the baseline so that the next sample produces no motion.
    pub fn reset(&self) {
        match self.odom.lock() {
            Ok(mut o) => o.reset(),
            Err(p) => p.into_inner().reset(),
        }
    }

    /// Integrate the store's latest wheel sample into its pose.
    pub fn integrate_latest(&self, store: &TelemetryStore) -> Integration {
        self.dirty.store(true, Ordering::SeqCst);

        loop {
            {
                let mut odom = match self.odom.try_lock() {
                    Ok(o) => o,
                    Err(TryLockError::WouldBlock) => return Integration::Coalesced,
                    Err(TryLockError::Poisoned(p)) => p.into_inner(),
                };

                while self.dirty.swap(false, Ordering::SeqCst) {
                    store.integrate_wheels(&mut odom);
                }
            }

            // A request may have arrived between the last pass and releasing the lock
            if !self.dirty.load(Ordering::SeqCst) {
                return Integration::Done;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Advance a pose by the motion between two wheel samples.
///
/// Returns the new pose and the sum of absolute wheel deltas.
pub fn integrate(pose: &Pose, prev: &WheelEncoders, cur: &WheelEncoders) -> (Pose, f64) {
    let d1 = cur[0] - prev[0];
    let d2 = cur[1] - prev[1];
    let d3 = cur[2] - prev[2];
    let d4 = cur[3] - prev[3];

    let r = WHEEL_RADIUS_PER_WHEEL_M;

    let d_long = (d1 + d2 + d3 + d4) * r;
    let d_trans = (-d1 + d2 + d3 - d4) * r;
    let d_theta = -(-d1 + d2 - d3 + d4) * (r / GEOM_FACTOR_M);

    // d_theta already carries the sign of the robot's heading convention, so it is added
    let theta = wrap_2pi(pose.theta_rad + d_theta);
    let (sin, cos) = theta.sin_cos();

    let new_pose = Pose {
        x_m: pose.x_m + d_long * cos + d_trans * sin,
        y_m: pose.y_m + d_long * sin - d_trans * cos,
        theta_rad: theta,
    };

    (new_pose, d1.abs() + d2.abs() + d3.abs() + d4.abs())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
