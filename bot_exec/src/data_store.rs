//! # Data Store
//!
//! Latest telemetry received from the robot, shared between the decode worker, the odometry
//! integrator, the navigation controller and external callers.
//!
//! All telemetry sits behind a single lock so that each update is applied as one unit. In
//! particular the lidar synchronised pose and wheel snapshot are taken in the same critical
//! section as the lidar scan update. Getters return copies.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::arm::{self, ArmId, NUM_ARMS, NUM_JOINTS},
    tm::TmFrame,
};
use std::sync::{Mutex, MutexGuard};

use crate::loc::{Odometry, Pose, WheelEncoders};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Thread safe holder of the latest telemetry.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    inner: Mutex<Telemetry>,
}

/// Telemetry held by the store.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Telemetry {
    /// Latest lidar scan
    pub lidar: Option<Vec<f64>>,

    /// Integrated pose at the moment the latest lidar scan arrived
    pub lidar_pose: Pose,

    /// Wheel encoders at the moment the latest lidar scan arrived
    pub lidar_wheels: Option<WheelEncoders>,

    /// Latest wheel encoder sample
    pub wheels: Option<WheelEncoders>,

    /// Latest odometry increments reported by the robot
    pub increment: Option<Vec<f64>>,

    /// Corrected joint angles of each arm, in degrees
    pub arm_pose: [Option<[f64; NUM_JOINTS]>; NUM_ARMS],

    /// Integrated pose
    pub pose: Pose,

    /// Sum of the absolute wheel encoder deltas integrated so far
    pub wheel_travel: f64,
}

/// A lidar scan with the pose and wheel sample taken when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct LidarSnapshot {
    pub pose: Pose,
    pub wheels: Option<WheelEncoders>,
    pub scan: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded frame.
    ///
    /// Returns `true` if the frame carried a new wheel sample, in which case odometry should be
    /// integrated.
    pub fn apply(&self, frame: TmFrame) -> bool {
        match frame {
            TmFrame::Lidar(scan) => {
                self.set_lidar(scan);
                false
            }
            TmFrame::Increment(inc) => {
                self.lock().increment = Some(inc);
                false
            }
            TmFrame::ArmReading(arm_id, raw) => {
                self.set_arm_reading(arm_id, &raw);
                false
            }
            TmFrame::Wheels(w) => {
                self.set_wheels(w);
                true
            }
        }
    }

    /// Store a lidar scan, snapshotting the pose and wheels.
    pub fn set_lidar(&self, scan: Vec<f64>) {
        let mut tm = self.lock();
        tm.lidar_pose = tm.pose;
        tm.lidar_wheels = tm.wheels;
        tm.lidar = Some(scan);
    }

    pub fn set_wheels(&self, wheels: WheelEncoders) {
        self.lock().wheels = Some(wheels);
    }

    /// Store a raw arm reading, converted to corrected joint angles.
    pub fn set_arm_reading(&self, arm_id: ArmId, raw: &[f64; NUM_JOINTS]) {
        self.lock().arm_pose[arm_id.index()] = Some(arm::raw_to_logical(raw));
    }

    /// Store a recorded wheel sample and lidar scan as if they had just arrived together.
    pub fn set_recorded(&self, wheels: WheelEncoders, scan: Vec<f64>) {
        let mut tm = self.lock();
        tm.wheels = Some(wheels);
        tm.lidar_pose = tm.pose;
        tm.lidar_wheels = Some(wheels);
        tm.lidar = Some(scan);
    }

    /// Integrate the latest wheel sample into the pose using the given odometry state.
    pub fn integrate_wheels(&self, odom: &mut Odometry) {
        let mut tm = self.lock();

        if let Some(wheels) = tm.wheels {
            let mut pose = tm.pose;
            tm.wheel_travel += odom.update(&mut pose, &wheels);
            tm.pose = pose;
        }
    }

    /// Clear telemetry belonging to a link. The integrated pose is kept.
    pub fn reset_link(&self) {
        let mut tm = self.lock();
        let pose = tm.pose;
        let wheel_travel = tm.wheel_travel;

        *tm = Telemetry {
            pose,
            lidar_pose: pose,
            wheel_travel,
            ..Default::default()
        };
    }

    pub fn pose(&self) -> Pose {
        self.lock().pose
    }

    /// Latest lidar scan with the pose at which it was taken.
    pub fn lidar_scan(&self) -> Option<LidarSnapshot> {
        let tm = self.lock();
        tm.lidar.as_ref().map(|scan| LidarSnapshot {
            pose: tm.lidar_pose,
            wheels: tm.lidar_wheels,
            scan: scan.clone(),
        })
    }

    pub fn arm_pose(&self, arm_id: ArmId) -> Option<[f64; NUM_JOINTS]> {
        self.lock().arm_pose[arm_id.index()]
    }

    pub fn wheels(&self) -> Option<WheelEncoders> {
        self.lock().wheels
    }

    pub fn increment(&self) -> Option<Vec<f64>> {
        self.lock().increment.clone()
    }

    pub fn distance_travelled(&self) -> f64 {
        self.lock().wheel_travel
    }

    /// A panic while holding the lock cannot leave the telemetry half written, so poisoning is
    /// ignored.
    fn lock(&self) -> MutexGuard<'_, Telemetry> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_arm_reading_corrected() {
        let store = TelemetryStore::new();
        assert!(!store.apply(TmFrame::ArmReading(
            ArmId::Arm1,
            [50.0, 10.0, -100.0, 20.0, 170.0]
        )));

        assert_eq!(store.arm_pose(ArmId::Arm0), None);
        assert_eq!(
            store.arm_pose(ArmId::Arm1),
            Some([118.0, 56.0, -50.0, 85.0, 4.0])
        );
    }

    #[test]
    fn test_lidar_snapshot() {
        let store = TelemetryStore::new();
        assert!(store.lidar_scan().is_none());

        assert!(store.apply(TmFrame::Wheels([1.0, 2.0, 3.0, 4.0])));
        store.apply(TmFrame::Lidar(vec![2.0; 200]));

        // Moving the wheels afterwards doesn't affect the snapshot
        store.apply(TmFrame::Wheels([5.0, 6.0, 7.0, 8.0]));

        let snap = store.lidar_scan().unwrap();
        assert_eq!(snap.wheels, Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(snap.scan.len(), 200);
        assert_eq!(store.wheels(), Some([5.0, 6.0, 7.0, 8.0]));
    }

    #[test]
    fn test_reset_link_keeps_pose() {
        let store = TelemetryStore::new();
        let mut odom = Odometry::new();

        store.set_wheels([0.0; 4]);
        store.integrate_wheels(&mut odom);
        store.set_wheels([4.0; 4]);
        store.integrate_wheels(&mut odom);
        store.apply(TmFrame::Increment(vec![0.1]));

        let pose = store.pose();
        assert!(pose.x_m > 0.0);

        store.reset_link();
        assert_eq!(store.pose(), pose);
        assert_eq!(store.wheels(), None);
        assert_eq!(store.increment(), None);
        assert_eq!(store.distance_travelled(), 16.0);
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(TelemetryStore::new());

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let v = i as f64;
                    store.set_recorded([v; 4], vec![v; 200]);
                }
            })
        };

        // Every snapshot must be internally consistent
        for _ in 0..500 {
            if let Some(snap) = store.lidar_scan() {
                let w = snap.wheels.unwrap();
                assert!(snap.scan.iter().all(|r| *r == w[0]));
            }
        }

        writer.join().unwrap();
    }
}
