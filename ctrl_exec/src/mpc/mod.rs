//! # Model Predictive Control module
//!
//! This module adapts a receding horizon optimizer to the horizon plan. It owns the plan and a
//! cursor along it: after the first solve over the initial window every cycle feeds the optimizer
//! the measured state and the plan row under the cursor, then advances the cursor. Once the
//! cursor reaches the final row of the plan it stays there, so the final setpoint is held.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod double_integrator;
mod optimizer;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use double_integrator::*;
pub use optimizer::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the [`Mpc`] adapter.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MpcError {
    #[error("The first solve has not been performed yet")]
    NotInitialised,

    #[error("The first solve has already been performed")]
    AlreadySolved,

    #[error("The horizon size must be at least one")]
    ZeroHorizon,

    #[error("Expected a state of length {expected} but got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Solve failure: {0}")]
    SolveFailure(SolveError),
}
