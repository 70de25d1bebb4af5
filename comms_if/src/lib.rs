//! # Communications interface crate.
//!
//! Provides the wire formats used between the youBot link software and the robot.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Outbound commands
pub mod tc;

/// Inbound telemetry
pub mod tm;

/// Equipment definitions (arms and cameras)
pub mod eqpt;

/// Control stream framing
pub mod net;
