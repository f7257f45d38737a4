//! # Control messages

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::{Header, Message, MsgError, SensorMsg};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// A dense row-major array of floats.
///
/// Vectors have a single dimension, matrices have two (rows then columns).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MultiArray {
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

/// Feedback control command sent to the driver.
///
/// The driver applies `feedforward + feedback_gain * (x - x0)` where `x0` is the state in
/// `initial_state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlMsg {
    pub header: Header,

    /// Feedback gain matrix, `nv` rows by `nx` columns.
    pub feedback_gain: MultiArray,

    /// Feedforward command, `nv` elements.
    pub feedforward: MultiArray,

    /// The sensor sample the command was computed from.
    pub initial_state: SensorMsg,
}

/// Duration of one solve of the optimizer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SolveTimeMsg {
    pub header: Header,

    /// Units: seconds
    pub duration_s: f64,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Message for ControlMsg {}
impl Message for SolveTimeMsg {}

impl MultiArray {
    /// Build a one dimensional array.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            dims: vec![data.len()],
            data,
        }
    }

    /// Build a two dimensional array from row-major data.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, MsgError> {
        if data.len() != rows * cols {
            return Err(MsgError::ShapeMismatch {
                expected: rows * cols,
                found: data.len(),
            });
        }

        Ok(Self {
            dims: vec![rows, cols],
            data,
        })
    }

    /// Element at the given row and column of a two dimensional array.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        match self.dims.as_slice() {
            [rows, cols] if row < *rows && col < *cols => self.data.get(row * cols + col).copied(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_matrix_is_row_major() {
        let m = MultiArray::matrix(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        assert_eq!(m.get(0, 2), Some(2.0));
        assert_eq!(m.get(1, 0), Some(3.0));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(MultiArray::vector(vec![1.0]).get(0, 0), None);

        match MultiArray::matrix(2, 2, vec![0.0; 3]) {
            Err(MsgError::ShapeMismatch { expected: 4, found: 3 }) => (),
            r => panic!("Expected shape mismatch, got {:?}", r),
        }
    }
}
