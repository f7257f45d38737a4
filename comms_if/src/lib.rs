//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the control software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Message definitions exchanged with the robot driver
pub mod msg;

/// Network module
pub mod net;
