//! # Horizon plan module
//!
//! The horizon plan is the whole trajectory produced by the planner, stored as two dense
//! matrices with one row per time step: the state plan (`nx` columns, positions then velocities)
//! and the acceleration plan (`nv` columns). The MPC consumes it one fixed-size window at a
//! time.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod planner;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

// Internal
use crate::traj_buffer::{PointAttribute, TrajBufferError, TrajectoryBuffer, TrajectoryPoint};
pub use planner::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The whole planned trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct HorizonPlan {
    /// State plan, one row per time step.
    whole_x_plan: DMatrix<f64>,

    /// Acceleration plan, one row per time step.
    whole_a_plan: DMatrix<f64>,

    /// Time between two rows of the plan.
    ///
    /// Units: seconds
    dt: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while building a plan.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("A plan must contain at least one point")]
    Empty,

    #[error("The state plan has {x_rows} rows but the acceleration plan has {a_rows}")]
    InconsistentRows { x_rows: usize, a_rows: usize },

    #[error("A state plan of width {nx} cannot go with an acceleration plan of width {nv}")]
    InconsistentWidths { nx: usize, nv: usize },

    #[error("Point {0} is not valid for all attributes")]
    IncompletePoint(usize),

    #[error("Point {0} does not have the dimensions of the first point")]
    MismatchedPoint(usize),

    #[error("Could not get points from the trajectory buffer: {0}")]
    BufferError(TrajBufferError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HorizonPlan {
    /// Create a new plan from the state and acceleration matrices.
    pub fn new(
        whole_x_plan: DMatrix<f64>,
        whole_a_plan: DMatrix<f64>,
        dt: f64,
    ) -> Result<Self, PlanError> {
        if whole_x_plan.nrows() == 0 {
            return Err(PlanError::Empty);
        }
        if whole_x_plan.nrows() != whole_a_plan.nrows() {
            return Err(PlanError::InconsistentRows {
                x_rows: whole_x_plan.nrows(),
                a_rows: whole_a_plan.nrows(),
            });
        }
        if whole_a_plan.ncols() == 0 || whole_a_plan.ncols() >= whole_x_plan.ncols() {
            return Err(PlanError::InconsistentWidths {
                nx: whole_x_plan.ncols(),
                nv: whole_a_plan.ncols(),
            });
        }

        Ok(Self {
            whole_x_plan,
            whole_a_plan,
            dt,
        })
    }

    /// Build a plan from a sequence of fully valid points.
    pub fn from_points(points: &[TrajectoryPoint], dt: f64) -> Result<Self, PlanError> {
        let first = points.first().ok_or(PlanError::Empty)?;
        let (nq, nv) = (first.q().len(), first.v().len());

        for (i, p) in points.iter().enumerate() {
            if !p.is_valid_for(&PointAttribute::ALL) {
                return Err(PlanError::IncompletePoint(i));
            }
            if p.q().len() != nq || p.v().len() != nv || p.a().len() != nv {
                return Err(PlanError::MismatchedPoint(i));
            }
        }

        let states: Vec<DVector<f64>> = points.iter().map(|p| p.state()).collect();

        Self::new(
            DMatrix::from_fn(points.len(), nq + nv, |r, c| states[r][c]),
            DMatrix::from_fn(points.len(), nv, |r, c| points[r].a()[c]),
            dt,
        )
    }

    /// Build a plan from every point at the front of the buffer which is valid for all
    /// attributes. Those points are removed from the buffer.
    pub fn from_buffer(buffer: &mut TrajectoryBuffer, dt: f64) -> Result<Self, PlanError> {
        let num_points = buffer.get_size(&PointAttribute::ALL);
        let points = buffer
            .get_points(num_points, &PointAttribute::ALL)
            .map_err(PlanError::BufferError)?;

        Self::from_points(&points, dt)
    }

    /// Number of time steps in the plan, always at least one.
    pub fn len(&self) -> usize {
        self.whole_x_plan.nrows()
    }

    pub fn nx(&self) -> usize {
        self.whole_x_plan.ncols()
    }

    pub fn nv(&self) -> usize {
        self.whole_a_plan.ncols()
    }

    pub fn nq(&self) -> usize {
        self.nx() - self.nv()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn whole_x_plan(&self) -> &DMatrix<f64> {
        &self.whole_x_plan
    }

    pub fn whole_a_plan(&self) -> &DMatrix<f64> {
        &self.whole_a_plan
    }

    /// State reference at the given step, clamped to the final step.
    pub fn x_ref(&self, idx: usize) -> DVector<f64> {
        self.whole_x_plan.row(self.clamp(idx)).transpose()
    }

    /// Acceleration reference at the given step, clamped to the final step.
    pub fn a_ref(&self, idx: usize) -> DVector<f64> {
        self.whole_a_plan.row(self.clamp(idx)).transpose()
    }

    /// The first `horizon_size` rows of the state and acceleration plans.
    ///
    /// If the plan is shorter than the horizon the window is padded by repeating the final row.
    pub fn window(&self, horizon_size: usize) -> (DMatrix<f64>, DMatrix<f64>) {
        (
            DMatrix::from_fn(horizon_size, self.nx(), |r, c| {
                self.whole_x_plan[(self.clamp(r), c)]
            }),
            DMatrix::from_fn(horizon_size, self.nv(), |r, c| {
                self.whole_a_plan[(self.clamp(r), c)]
            }),
        )
    }

    fn clamp(&self, idx: usize) -> usize {
        idx.min(self.len() - 1)
    }
}
