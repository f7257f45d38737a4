//! # Control library.
//!
//! This library allows other crates in the workspace to access items defined inside the control
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Control loop - synchronises sensor input with the MPC and publishes commands
pub mod ctrl_loop;

/// Control server - publishes commands and solve times to the robot driver
pub mod ctrl_server;

/// Model predictive control - receding horizon adapter over the optimizer
pub mod mpc;

/// Executable parameters
pub mod params;

/// Horizon plan and planners
pub mod plan;

/// Robot model description
pub mod robot_model;

/// Sensor client - receives sensor messages from the robot driver
pub mod sensor_client;

/// Trajectory buffer - stages planned points before they are consumed
pub mod traj_buffer;
