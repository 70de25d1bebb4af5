//! # Equipment Interface
//!
//! This module defines the equipment specific data carried over the robot link: arm actuator
//! calibration and camera video frames.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod arm;
pub mod cam;
