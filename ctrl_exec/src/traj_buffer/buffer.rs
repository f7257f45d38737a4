//! Trajectory buffer implementation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use std::collections::VecDeque;

// Internal
use super::{PointAttribute, TrajBufferError, TrajectoryPoint};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// FIFO queue of trajectory points with fixed dimensions.
///
/// The dimensions are taken from the point passed to [`TrajectoryBuffer::initialize`] and every
/// point added afterwards must match them.
#[derive(Debug, Default, Clone)]
pub struct TrajectoryBuffer {
    buffer: VecDeque<TrajectoryPoint>,

    /// Dimensions `(nq, nv)`, `None` until initialised.
    dims: Option<(usize, usize)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajectoryBuffer {
    /// Create a new empty buffer with no dimensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the buffer, fix its dimensions to those of `start` and seed it with `start`.
    pub fn initialize(&mut self, start: TrajectoryPoint) {
        self.dims = Some((start.q().len(), start.v().len()));
        self.buffer.clear();
        self.buffer.push_back(start);
    }

    /// Append a point to the back of the buffer.
    ///
    /// The point's position and velocity (and acceleration, if valid) must match the buffer's
    /// dimensions, otherwise the buffer is left unchanged.
    pub fn add_trajectory_point(&mut self, point: TrajectoryPoint) -> Result<(), TrajBufferError> {
        let (nq, nv) = self.dims.ok_or(TrajBufferError::DimensionUninitialised)?;

        let mut checks = vec![
            (PointAttribute::Position, nq, point.q().len()),
            (PointAttribute::Velocity, nv, point.v().len()),
        ];
        if point.is_valid(PointAttribute::Acceleration) {
            checks.push((PointAttribute::Acceleration, nv, point.a().len()));
        }

        for (attribute, expected, found) in checks {
            if expected != found {
                return Err(TrajBufferError::DimensionMismatch {
                    attribute,
                    expected,
                    found,
                });
            }
        }

        self.buffer.push_back(point);

        Ok(())
    }

    /// Number of points at the front of the buffer which are valid for all of `attributes`.
    ///
    /// The scan stops at the first point which is not valid, later points are not counted even
    /// if they are valid themselves.
    pub fn get_size(&self, attributes: &[PointAttribute]) -> usize {
        for (idx, point) in self.buffer.iter().enumerate() {
            if let Some(attribute) = attributes.iter().find(|a| !point.is_valid(**a)) {
                debug!(
                    "Buffer point at index {} is not valid for attribute {:?}",
                    idx, attribute
                );
                return idx;
            }
        }

        self.buffer.len()
    }

    /// Remove and return the first `num_points` points of the buffer, in order.
    ///
    /// If fewer than `num_points` points are valid for `attributes` an error is returned and no
    /// points are removed.
    pub fn get_points(
        &mut self,
        num_points: usize,
        attributes: &[PointAttribute],
    ) -> Result<Vec<TrajectoryPoint>, TrajBufferError> {
        if self.dims.is_none() {
            return Err(TrajBufferError::DimensionUninitialised);
        }

        let available = self.get_size(attributes);
        if num_points > available {
            return Err(TrajBufferError::InsufficientBuffer {
                available,
                requested: num_points,
            });
        }

        Ok(self.buffer.drain(..num_points).collect())
    }

    /// Copy of the points currently in the buffer.
    pub fn get_buffer(&self) -> Vec<TrajectoryPoint> {
        self.buffer.iter().cloned().collect()
    }

    /// Total number of points in the buffer, valid or not.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of configuration coordinates, `None` before initialisation.
    pub fn nq(&self) -> Option<usize> {
        self.dims.map(|(nq, _)| nq)
    }

    /// Number of degrees of freedom, `None` before initialisation.
    pub fn nv(&self) -> Option<usize> {
        self.dims.map(|(_, nv)| nv)
    }

    /// Size of the state vector `nq + nv`, `None` before initialisation.
    pub fn nx(&self) -> Option<usize> {
        self.dims.map(|(nq, nv)| nq + nv)
    }
}
