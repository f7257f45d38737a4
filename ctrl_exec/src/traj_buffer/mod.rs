//! # Trajectory buffer module
//!
//! The trajectory buffer stages points produced by the planner before they are consumed by the
//! control loop. Points are consumed strictly from the front, and only while every point up to
//! the requested count is valid for the requested attributes. A point whose fields have not yet
//! been filled in therefore blocks every point behind it, even ones which are complete.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod buffer;
mod point;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use buffer::*;
pub use point::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during trajectory buffer operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrajBufferError {
    #[error("The buffer dimensions have not been set, call initialize first")]
    DimensionUninitialised,

    #[error("Point {attribute:?} has {found} elements but the buffer expects {expected}")]
    DimensionMismatch {
        attribute: PointAttribute,
        expected: usize,
        found: usize,
    },

    #[error("The buffer has {available} usable points but {requested} were requested")]
    InsufficientBuffer { available: usize, requested: usize },
}

/// Possible errors that can occur while filling in a trajectory point.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointError {
    #[error("The {0:?} of this point is already valid and cannot be changed")]
    AttributeAlreadySet(PointAttribute),

    #[error("Expected {expected} elements for {attribute:?} but found {found}")]
    WrongLength {
        attribute: PointAttribute,
        expected: usize,
        found: usize,
    },
}
