//! Implementations for the ArmCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

// Internal
use super::{
    inverse_kinematics::{self, CartesianIkSolution, IkSolution},
    ArmCtrlError, Params,
};
use comms_if::{
    eqpt::arm::{
        ArmId, FOLDED_GRIP, FOLDED_JOINTS_DEG, GRIP_RANGE, JOINT_CALIB, MAX_JOINT_VEL, NUM_ARMS,
        NUM_JOINTS,
    },
    tc::Tc,
};
use util::{maths::clamp, module::State};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Arm control module state
#[derive(Debug, Clone, Default)]
pub struct ArmCtrl {
    pub(crate) params: Params,

    pub(crate) arms: [ArmState; NUM_ARMS],
}

/// Last commanded state of one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    /// Units: degrees
    pub joints_deg: [f64; NUM_JOINTS],

    /// Gripper demand in `[0, 2]`
    pub grip: f64,

    /// Units: degrees/second
    pub vel_degs: [f64; NUM_JOINTS],
}

/// A planar target for the gripper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IkTarget {
    /// Horizontal distance from joint 2.
    ///
    /// Units: millimeters
    pub x_mm: f64,

    /// Height above joint 2.
    ///
    /// Units: millimeters
    pub y_mm: f64,

    /// Angle of the gripper link from horizontal.
    ///
    /// Units: radians
    pub wrist_rad: f64,
}

/// A position demand for an arm. Joints left as `None` keep their last commanded value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArmDemand {
    /// Units: degrees
    pub joints_deg: [Option<f64>; NUM_JOINTS],

    pub grip: Option<f64>,

    /// Solve joints 2 to 4 for this target, applied after `joints_deg`
    pub target: Option<IkTarget>,
}

/// Input data to Arm Control.
#[derive(Debug, Clone, PartialEq)]
pub struct InputData {
    pub arm: ArmId,
    pub cmd: ArmCmd,
}

/// Status report for ArmCtrl processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Result of inverse kinematics, if a target was given
    pub ik_solved: Option<bool>,

    pub abs_pos_limited: [bool; NUM_JOINTS],
    pub rate_limited: [bool; NUM_JOINTS],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Commands accepted by arm control.
#[derive(Debug, Clone, PartialEq)]
pub enum ArmCmd {
    /// Move to a position.
    Move(ArmDemand),

    /// Set the joint velocities.
    ///
    /// Units: degrees/second
    Velocity([f64; NUM_JOINTS]),

    /// Return to the folded posture with the gripper open.
    Fold,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ArmState {
    fn default() -> Self {
        Self {
            joints_deg: FOLDED_JOINTS_DEG,
            grip: FOLDED_GRIP,
            vel_degs: [0.0; NUM_JOINTS],
        }
    }
}

impl ArmDemand {
    /// Demand all five joints.
    pub fn joints(joints_deg: [f64; NUM_JOINTS]) -> Self {
        let mut d = Self::default();
        for (dem, j) in d.joints_deg.iter_mut().zip(joints_deg.iter()) {
            *dem = Some(*j);
        }
        d
    }

    /// Demand a gripper target.
    pub fn target(x_mm: f64, y_mm: f64, wrist_rad: f64) -> Self {
        Self {
            target: Some(IkTarget {
                x_mm,
                y_mm,
                wrist_rad,
            }),
            ..Default::default()
        }
    }

    /// Also demand a single joint, `index` counting from 0 at the base.
    pub fn with_joint(mut self, index: usize, value_deg: f64) -> Self {
        if let Some(j) = self.joints_deg.get_mut(index) {
            *j = Some(value_deg);
        }
        self
    }

    pub fn with_grip(mut self, grip: f64) -> Self {
        self.grip = Some(grip);
        self
    }
}

impl State for ArmCtrl {
    type InitData = Params;
    type InitError = ArmCtrlError;

    type InputData = InputData;
    type OutputData = Vec<Tc>;
    type StatusReport = StatusReport;
    type ProcError = ArmCtrlError;

    /// Initialise the ArmCtrl module with the given parameters, both arms folded.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        self.params = init_data;
        self.reset();
        Ok(())
    }

    /// Process a command for one arm, returning the commands to send to the robot.
    ///
    /// Gripper commands come before the arm command. The state of the arm is only changed if the
    /// command is valid.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let arm = input_data.arm;
        let mut report = StatusReport::default();
        let mut output = Vec::with_capacity(2);

        match &input_data.cmd {
            ArmCmd::Move(demand) => {
                check_demand(demand)?;

                let mut state = self.arms[arm.index()];

                for (j, dem) in state.joints_deg.iter_mut().zip(demand.joints_deg.iter()) {
                    if let Some(d) = dem {
                        *j = *d;
                    }
                }

                if let Some(target) = demand.target {
                    let solution = solve_or_keep(&self.params, &state, &target);
                    report.ik_solved = Some(solution.solved);
                    state.joints_deg[1..4].copy_from_slice(&solution.joints_deg);
                }

                if let Some(grip) = demand.grip {
                    state.grip = clamp(&grip, &GRIP_RANGE.0, &GRIP_RANGE.1);
                    output.push(Tc::Grip {
                        arm,
                        value: state.grip,
                    });
                }

                report.abs_pos_limited = pos_limited(&state.joints_deg);
                output.push(Tc::arm_move_from_joints(arm, &state.joints_deg));

                self.arms[arm.index()] = state;
            }
            ArmCmd::Velocity(vel) => {
                if let Some(i) = vel.iter().position(|v| !v.is_finite()) {
                    return Err(ArmCtrlError::NonFiniteDemand(i));
                }

                let mut limited = *vel;
                for (i, v) in limited.iter_mut().enumerate() {
                    if v.abs() > MAX_JOINT_VEL {
                        report.rate_limited[i] = true;
                        *v = MAX_JOINT_VEL.copysign(*v);
                    }
                }

                self.arms[arm.index()].vel_degs = limited;
                output.push(Tc::ArmVelocity { arm, vel: limited });
            }
            ArmCmd::Fold => {
                self.arms[arm.index()] = ArmState::default();
                output.push(Tc::Grip {
                    arm,
                    value: FOLDED_GRIP,
                });
                output.push(Tc::arm_move_from_joints(arm, &FOLDED_JOINTS_DEG));
            }
        }

        trace!("ArmCtrl arm {} output: {:?}", arm, output);

        Ok((output, report))
    }
}

impl ArmCtrl {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            arms: Default::default(),
        }
    }

    /// Return both arms to the folded posture.
    pub fn reset(&mut self) {
        self.arms = Default::default();
        debug!("ArmCtrl reset to folded posture");
    }

    /// Last commanded state of an arm.
    pub fn arm_state(&self, arm: ArmId) -> ArmState {
        self.arms[arm.index()]
    }

    /// Solve joints 2 to 4 for a planar target.
    ///
    /// If no solution exists the last commanded joints are returned with `solved = false`.
    pub fn solve_arm(&self, arm: ArmId, target: &IkTarget) -> IkSolution {
        solve_or_keep(&self.params, &self.arms[arm.index()], target)
    }

    /// Solve joints 1 to 4 for a 3D target. Experimental, see
    /// `inverse_kinematics::solve_cartesian_experimental`.
    pub fn solve_cartesian_experimental(
        &self,
        arm: ArmId,
        target: &Point3<f64>,
        wrist_rad: f64,
    ) -> CartesianIkSolution {
        match inverse_kinematics::solve_cartesian_experimental(&self.params, target, wrist_rad) {
            Ok(joints_deg) => CartesianIkSolution {
                joints_deg,
                solved: true,
            },
            Err(e) => {
                debug!("Cartesian solve failed: {}", e);
                let mut joints_deg = [0.0; 4];
                joints_deg.copy_from_slice(&self.arms[arm.index()].joints_deg[0..4]);
                CartesianIkSolution {
                    joints_deg,
                    solved: false,
                }
            }
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn solve_or_keep(params: &Params, state: &ArmState, target: &IkTarget) -> IkSolution {
    match inverse_kinematics::solve_planar(
        params,
        &Point2::new(target.x_mm, target.y_mm),
        target.wrist_rad,
    ) {
        Ok(joints_deg) => IkSolution {
            joints_deg,
            solved: true,
        },
        Err(e) => {
            debug!("No arm solution for {:?}: {}", target, e);
            let mut joints_deg = [0.0; 3];
            joints_deg.copy_from_slice(&state.joints_deg[1..4]);
            IkSolution {
                joints_deg,
                solved: false,
            }
        }
    }
}

fn check_demand(demand: &ArmDemand) -> Result<(), ArmCtrlError> {
    for (i, j) in demand.joints_deg.iter().enumerate() {
        if let Some(v) = j {
            if !v.is_finite() {
                return Err(ArmCtrlError::NonFiniteDemand(i));
            }
        }
    }

    match demand.grip {
        Some(g) if !g.is_finite() => Err(ArmCtrlError::NonFiniteGrip),
        _ => Ok(()),
    }
}

/// Which joints fall outside the actuator travel and will be limited when sent.
fn pos_limited(joints_deg: &[f64; NUM_JOINTS]) -> [bool; NUM_JOINTS] {
    let mut limited = [false; NUM_JOINTS];
    for i in 0..NUM_JOINTS {
        let c = &JOINT_CALIB[i];
        let raw = c.sign * joints_deg[i] + c.offset;
        limited[i] = raw < c.raw_min || raw > c.raw_max;
    }
    limited
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn proc(ctrl: &mut ArmCtrl, arm: ArmId, cmd: ArmCmd) -> (Vec<Tc>, StatusReport) {
        ctrl.proc(&InputData { arm, cmd }).unwrap()
    }

    #[test]
    fn test_partial_move() {
        let mut ctrl = ArmCtrl::new(Params::default());

        let (out, report) = proc(
            &mut ctrl,
            ArmId::Arm1,
            ArmCmd::Move(ArmDemand::default().with_joint(0, 30.0)),
        );

        assert_eq!(
            out,
            vec![Tc::arm_move_from_joints(
                ArmId::Arm1,
                &[30.0, 56.0, -80.0, -90.0, 0.0]
            )]
        );
        assert_eq!(report.ik_solved, None);
        assert_eq!(ctrl.arm_state(ArmId::Arm1).joints_deg[0], 30.0);

        // The other arm is untouched
        assert_eq!(ctrl.arm_state(ArmId::Arm0), ArmState::default());
    }

    #[test]
    fn test_grip_sent_first() {
        let mut ctrl = ArmCtrl::new(Params::default());

        let (out, _) = proc(
            &mut ctrl,
            ArmId::Arm0,
            ArmCmd::Move(ArmDemand::joints([0.0, 0.0, 0.0, 0.0, 0.0]).with_grip(0.5)),
        );

        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            Tc::Grip {
                arm: ArmId::Arm0,
                value: 0.5
            }
        );
        assert_eq!(out[1].encode(), "/arm:0;168;66;-150;105;166^^^");
    }

    #[test]
    fn test_grip_limited() {
        let mut ctrl = ArmCtrl::new(Params::default());

        let (out, _) = proc(
            &mut ctrl,
            ArmId::Arm1,
            ArmCmd::Move(ArmDemand::default().with_grip(3.5)),
        );

        assert_eq!(
            out[0],
            Tc::Grip {
                arm: ArmId::Arm1,
                value: 2.0
            }
        );
        assert_eq!(ctrl.arm_state(ArmId::Arm1).grip, 2.0);
    }

    #[test]
    fn test_target_solved() {
        let mut ctrl = ArmCtrl::new(Params::default());
        let (p, wrist) = inverse_kinematics::forward_planar(ctrl.params(), &[20.0, -70.0, -30.0]);

        let (_, report) = proc(
            &mut ctrl,
            ArmId::Arm0,
            ArmCmd::Move(ArmDemand::target(p.x, p.y, wrist)),
        );

        assert_eq!(report.ik_solved, Some(true));
        let joints = ctrl.arm_state(ArmId::Arm0).joints_deg;
        assert!((joints[1] - 20.0).abs() < 1e-6);
        assert!((joints[2] + 70.0).abs() < 1e-6);
        assert!((joints[3] + 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_keeps_joints() {
        let mut ctrl = ArmCtrl::new(Params::default());
        proc(
            &mut ctrl,
            ArmId::Arm0,
            ArmCmd::Move(ArmDemand::joints([10.0, 20.0, -30.0, 40.0, 50.0])),
        );

        let target = IkTarget {
            x_mm: 2000.0,
            y_mm: 0.0,
            wrist_rad: 0.0,
        };
        let solution = ctrl.solve_arm(ArmId::Arm0, &target);
        assert!(!solution.solved);
        assert_eq!(solution.joints_deg, [20.0, -30.0, 40.0]);

        let (out, report) = proc(
            &mut ctrl,
            ArmId::Arm0,
            ArmCmd::Move(ArmDemand {
                target: Some(target),
                ..Default::default()
            }),
        );
        assert_eq!(report.ik_solved, Some(false));
        assert_eq!(
            out,
            vec![Tc::arm_move_from_joints(
                ArmId::Arm0,
                &[10.0, 20.0, -30.0, 40.0, 50.0]
            )]
        );
    }

    #[test]
    fn test_velocity_limited() {
        let mut ctrl = ArmCtrl::new(Params::default());

        let (out, report) = proc(
            &mut ctrl,
            ArmId::Arm1,
            ArmCmd::Velocity([10.0, -200.0, 0.0, 95.0, 0.0]),
        );

        assert_eq!(
            out,
            vec![Tc::ArmVelocity {
                arm: ArmId::Arm1,
                vel: [10.0, -90.0, 0.0, 90.0, 0.0]
            }]
        );
        assert_eq!(report.rate_limited, [false, true, false, true, false]);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut ctrl = ArmCtrl::new(Params::default());

        let r = ctrl.proc(&InputData {
            arm: ArmId::Arm0,
            cmd: ArmCmd::Move(ArmDemand::default().with_joint(2, f64::NAN)),
        });
        assert_eq!(r, Err(ArmCtrlError::NonFiniteDemand(2)));
        assert_eq!(ctrl.arm_state(ArmId::Arm0), ArmState::default());
    }

    #[test]
    fn test_fold() {
        let mut ctrl = ArmCtrl::new(Params::default());
        proc(
            &mut ctrl,
            ArmId::Arm0,
            ArmCmd::Move(ArmDemand::joints([10.0; 5]).with_grip(0.0)),
        );

        let (out, report) = proc(&mut ctrl, ArmId::Arm0, ArmCmd::Fold);
        assert_eq!(
            out.iter().map(|t| t.encode()).collect::<Vec<_>>(),
            vec!["/grip:0;2^^^", "/arm:0;168;10;-70;195;166^^^"]
        );
        assert_eq!(report, StatusReport::default());
        assert_eq!(ctrl.arm_state(ArmId::Arm0), ArmState::default());
    }

    #[test]
    fn test_pos_limited_report() {
        let mut ctrl = ArmCtrl::new(Params::default());

        let (_, report) = proc(
            &mut ctrl,
            ArmId::Arm0,
            ArmCmd::Move(ArmDemand::joints([200.0, 0.0, 0.0, 0.0, 0.0])),
        );
        assert_eq!(report.abs_pos_limited, [true, false, false, false, false]);
    }
}
