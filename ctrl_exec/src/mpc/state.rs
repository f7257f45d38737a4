//! MPC adapter state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use nalgebra::DVector;
use serde::Serialize;

// Internal
use super::{MpcError, Optimizer, OptimizerOutput};
use crate::plan::HorizonPlan;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Receding horizon adapter between the plan and an [`Optimizer`].
pub struct Mpc<O> {
    optimizer: O,

    plan: HorizonPlan,

    horizon_size: usize,

    /// Index of the plan row which will be given to the optimizer on the next step.
    cursor: usize,

    /// Output of the most recent successful solve, `None` before the first solve.
    output: Option<OptimizerOutput>,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// Cursor after processing.
    pub cursor: usize,

    /// True once the cursor has reached the final row of the plan.
    pub plan_exhausted: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<O: Optimizer> Mpc<O> {
    pub fn new(optimizer: O, plan: HorizonPlan, horizon_size: usize) -> Self {
        Self {
            optimizer,
            plan,
            horizon_size,
            cursor: 0,
            output: None,
        }
    }

    /// Solve over the first `horizon_size` rows of the plan from the measured state `x0`.
    ///
    /// Can only be performed once. On success the cursor is placed on the first row after the
    /// window, or on the final row if the plan is shorter than the horizon.
    pub fn first_solve(&mut self, x0: &DVector<f64>) -> Result<(), MpcError> {
        if self.output.is_some() {
            return Err(MpcError::AlreadySolved);
        }
        if self.horizon_size == 0 {
            return Err(MpcError::ZeroHorizon);
        }
        self.check_state(x0)?;

        let (x_window, a_window) = self.plan.window(self.horizon_size);

        let output = self
            .optimizer
            .first_solve(&x_window, &a_window, x0, self.horizon_size)
            .map_err(MpcError::SolveFailure)?;

        self.output = Some(output);
        self.cursor = self.horizon_size.min(self.last_row());

        info!(
            "First solve complete over {} nodes, cursor at {} of {}",
            self.horizon_size,
            self.cursor,
            self.plan.len()
        );

        Ok(())
    }

    /// Perform one receding step with the measured state `x0` and the given references.
    ///
    /// On success the cursor advances by one unless it is already on the final row. On failure
    /// neither the cursor nor the output change.
    pub fn step(
        &mut self,
        x0: &DVector<f64>,
        x_ref: &DVector<f64>,
        a_ref: &DVector<f64>,
    ) -> Result<(), MpcError> {
        if self.output.is_none() {
            return Err(MpcError::NotInitialised);
        }
        self.check_state(x0)?;

        let output = self
            .optimizer
            .step(x0, x_ref, a_ref)
            .map_err(MpcError::SolveFailure)?;

        self.output = Some(output);

        if self.cursor < self.last_row() {
            self.cursor += 1;
        } else {
            debug!("Plan exhausted, holding the final reference");
        }

        Ok(())
    }

    /// State and acceleration references under the cursor.
    pub fn next_reference(&self) -> (DVector<f64>, DVector<f64>) {
        (self.plan.x_ref(self.cursor), self.plan.a_ref(self.cursor))
    }

    /// Output of the most recent solve.
    pub fn get_output(&self) -> Result<&OptimizerOutput, MpcError> {
        self.output.as_ref().ok_or(MpcError::NotInitialised)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn horizon_size(&self) -> usize {
        self.horizon_size
    }

    pub fn plan(&self) -> &HorizonPlan {
        &self.plan
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn is_plan_exhausted(&self) -> bool {
        self.output.is_some() && self.cursor == self.last_row()
    }

    fn last_row(&self) -> usize {
        self.plan.len() - 1
    }

    fn check_state(&self, x0: &DVector<f64>) -> Result<(), MpcError> {
        if x0.len() != self.plan.nx() {
            return Err(MpcError::DimensionMismatch {
                expected: self.plan.nx(),
                found: x0.len(),
            });
        }
        Ok(())
    }
}

impl<O: Optimizer> State for Mpc<O> {
    type InitData = DVector<f64>;
    type InitError = MpcError;

    type InputData = DVector<f64>;
    type OutputData = OptimizerOutput;
    type StatusReport = StatusReport;
    type ProcError = MpcError;

    /// Perform the first solve from the given measured state.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        self.first_solve(&init_data)
    }

    /// Step the MPC from the measured state using the references under the cursor.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let (x_ref, a_ref) = self.next_reference();
        self.step(input_data, &x_ref, &a_ref)?;

        let report = StatusReport {
            cursor: self.cursor,
            plan_exhausted: self.is_plan_exhausted(),
        };

        Ok((self.get_output()?.clone(), report))
    }
}
