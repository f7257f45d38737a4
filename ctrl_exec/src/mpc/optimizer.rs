//! Optimizer interface

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A receding horizon optimal control solver.
///
/// The optimizer keeps its own copy of the reference window. `step` shifts that window by one
/// node, appending the given reference at the end, and re-solves warm started from the previous
/// solution.
pub trait Optimizer {
    /// Solve over the initial window.
    ///
    /// `x_window` has `horizon_size` rows of `nx` columns and `a_window` has `horizon_size` rows
    /// of `nv` columns.
    fn first_solve(
        &mut self,
        x_window: &DMatrix<f64>,
        a_window: &DMatrix<f64>,
        x0: &DVector<f64>,
        horizon_size: usize,
    ) -> Result<OptimizerOutput, SolveError>;

    /// Shift the window and solve again from the measured state `x0`.
    fn step(
        &mut self,
        x0: &DVector<f64>,
        x_ref: &DVector<f64>,
        a_ref: &DVector<f64>,
    ) -> Result<OptimizerOutput, SolveError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of a single solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerOutput {
    /// Predicted state at the next node of the horizon.
    pub state: DVector<f64>,

    /// Command to apply now, length `nv`.
    pub command: DVector<f64>,

    /// Feedback gain applied to the state error, `nv x nx`.
    pub feedback_gain: DMatrix<f64>,
}

/// Weights of the optimal control cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SolverWeights {
    /// Weight on tracking the planned end effector pose.
    pub end_effector_pose: f64,

    /// Weight on tracking the planned state.
    pub state_regularisation: f64,

    /// Weight on the control effort relative to the planned acceleration.
    pub control_regularisation: f64,

    /// Weight on collision avoidance residuals.
    pub collision_avoidance: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SolveError {
    #[error("Solver did not converge: {0}")]
    NotConverged(String),

    #[error("Solver inputs contain non-finite values")]
    NonFinite,

    #[error("Expected {what} of size {expected} but got {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("The optimizer cannot handle a model with nq = {nq} and nv = {nv}")]
    UnsupportedModel { nq: usize, nv: usize },

    #[error("Invalid solver weights: {0}")]
    InvalidWeights(String),

    #[error("Step requested before the first solve")]
    NotInitialised,
}
