//! # Control loop module
//!
//! The control loop synchronises the asynchronous sensor input with the periodic MPC. It runs
//! as a state machine:
//!
//! 1. `AwaitingInput`: wait at the loop rate until the first sensor sample and the reference
//!    have been received.
//! 2. `Planning`: plan from the measured configuration to the goal and build the horizon plan.
//! 3. `SolvingFirst`: perform the first solve of the MPC.
//! 4. `AwaitingProceed`: wait for the proceed gate to open.
//! 5. `SteadyState`: every period read the latest sample, step the MPC and publish the command.
//!
//! Any mode moves to `Shutdown` as soon as the shutdown signal is observed.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod gate;
mod sensor_cell;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::msg::{
    control::{ControlMsg, SolveTimeMsg},
    MsgError,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::{
    mpc::{MpcError, SolveError},
    plan::{PlanError, PlanningError},
    traj_buffer::TrajBufferError,
};

pub use gate::*;
pub use sensor_cell::*;
pub use state::*;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Destination of the loop's output messages.
pub trait ControlSink {
    type Error: Display;

    fn publish_control(&mut self, msg: &ControlMsg) -> Result<(), Self::Error>;

    fn publish_solve_time(&mut self, msg: &SolveTimeMsg) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Record of one steady state cycle, written to the cycle archive.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CycleRecord {
    /// Seconds since the start of the session.
    pub elapsed_s: f64,

    pub cycle: u64,

    /// Cursor after the cycle.
    pub cursor: usize,

    /// NaN if no solve was attempted.
    pub solve_duration_s: f64,

    pub published: bool,

    pub stale: bool,

    pub solve_failed: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Modes of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CtrlMode {
    AwaitingInput,
    Planning,
    SolvingFirst,
    AwaitingProceed,
    SteadyState,
    Shutdown,
}

/// Behaviour of the loop when the solver fails in steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveFailurePolicy {
    /// Publish nothing for the failed cycle, so the driver keeps applying the last command.
    /// The loop stops once the number of consecutive failures exceeds the configured limit.
    HoldLastCommand,

    /// Stop the loop on the first failure.
    Abort,
}

#[derive(Debug, thiserror::Error)]
pub enum CtrlLoopError {
    #[error("Planning failed: {0}")]
    PlanningFailure(PlanningError),

    #[error("Could not stage the planned trajectory: {0}")]
    BufferError(TrajBufferError),

    #[error("Could not build the horizon plan: {0}")]
    PlanError(PlanError),

    #[error("First solve failed: {0}")]
    FirstSolveFailure(MpcError),

    #[error("Solve failure: {0}")]
    SolveFailure(SolveError),

    #[error("{count} consecutive solve failures, last: {last}")]
    TooManySolveFailures { count: u32, last: SolveError },

    #[error("MPC error: {0}")]
    MpcError(MpcError),

    #[error("Sensor sample has {found} {what} but the robot has {expected}")]
    SensorDimension {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("No sensor sample available in mode {0:?}")]
    NoSensorSample(CtrlMode),

    #[error("Could not build the control message: {0}")]
    MessageError(MsgError),

    #[error("The sensor source has stopped, no new samples will arrive")]
    SensorSourceLost,

    #[error("The loop has already planned, it cannot be run again")]
    AlreadyPlanned,
}

impl Default for SolveFailurePolicy {
    fn default() -> Self {
        SolveFailurePolicy::HoldLastCommand
    }
}
