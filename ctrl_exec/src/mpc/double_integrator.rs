//! Double integrator reference optimizer
//!
//! Every joint is modelled as a discrete double integrator driven by its acceleration. The
//! infinite horizon LQR gains of that system are obtained once by iterating the discrete Riccati
//! equation, and each solve rolls the resulting policy out over the reference window.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, RowVector2, Vector2};

// Internal
use super::{Optimizer, OptimizerOutput, SolveError, SolverWeights};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const RICCATI_MAX_ITERS: usize = 10_000;

/// Relative tolerance on the change of the Riccati solution between two iterations.
const RICCATI_TOLERANCE: f64 = 1e-10;

/// Any rolled out state coordinate larger than this is treated as divergence.
const DIVERGENCE_LIMIT: f64 = 1e6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DoubleIntegratorOptimizer {
    nv: usize,

    /// Time between two nodes of the horizon.
    ///
    /// Units: seconds
    dt: f64,

    /// Position and velocity gains, identical for every joint.
    gains: RowVector2<f64>,

    /// Reference window and latest solution, `None` until the first solve.
    window: Option<Window>,
}

/// Reference window with the solution computed over it.
#[derive(Debug, Clone)]
struct Window {
    x_ref: DMatrix<f64>,
    a_ref: DMatrix<f64>,

    /// Rolled out states, one more than the number of nodes.
    xs: Vec<DVector<f64>>,

    /// Commands at each node.
    us: Vec<DVector<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DoubleIntegratorOptimizer {
    /// Create a new optimizer, computing the feedback gains from the weights.
    ///
    /// The model must have as many configuration coordinates as degrees of freedom.
    pub fn new(
        weights: &SolverWeights,
        nq: usize,
        nv: usize,
        dt: f64,
    ) -> Result<Self, SolveError> {
        if nq != nv || nv == 0 {
            return Err(SolveError::UnsupportedModel { nq, nv });
        }

        let gains = lqr_gains(weights, dt)?;
        debug!("Double integrator gains: kp = {}, kd = {}", gains[0], gains[1]);

        Ok(Self {
            nv,
            dt,
            gains,
            window: None,
        })
    }

    /// Position and velocity gains `(kp, kd)`.
    pub fn gains(&self) -> (f64, f64) {
        (self.gains[0], self.gains[1])
    }

    /// Rolled out states of the latest solution, empty before the first solve.
    pub fn predicted_states(&self) -> &[DVector<f64>] {
        match self.window {
            Some(ref w) => &w.xs,
            None => &[],
        }
    }

    /// The `nv x nx` gain matrix `-[kp I | kd I]`.
    fn feedback_gain(&self) -> DMatrix<f64> {
        let nv = self.nv;
        DMatrix::from_fn(nv, 2 * nv, |r, c| {
            if c == r {
                -self.gains[0]
            } else if c == r + nv {
                -self.gains[1]
            } else {
                0.0
            }
        })
    }

    fn check_len(
        what: &'static str,
        expected: usize,
        found: usize,
    ) -> Result<(), SolveError> {
        if expected != found {
            return Err(SolveError::DimensionMismatch {
                what,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Roll the policy out over the window from `x0`.
    fn solve(
        &self,
        x_ref: DMatrix<f64>,
        a_ref: DMatrix<f64>,
        x0: &DVector<f64>,
    ) -> Result<Window, SolveError> {
        if x0.iter().chain(x_ref.iter()).chain(a_ref.iter()).any(|v| !v.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let nv = self.nv;
        let (kp, kd) = self.gains();
        let dt = self.dt;

        let mut xs = Vec::with_capacity(x_ref.nrows() + 1);
        let mut us = Vec::with_capacity(x_ref.nrows());
        let mut x = x0.clone();

        for node in 0..x_ref.nrows() {
            let u = DVector::from_fn(nv, |j, _| {
                a_ref[(node, j)]
                    - kp * (x[j] - x_ref[(node, j)])
                    - kd * (x[nv + j] - x_ref[(node, nv + j)])
            });

            let mut x_next = x.clone();
            for j in 0..nv {
                x_next[j] += x[nv + j] * dt + 0.5 * u[j] * dt * dt;
                x_next[nv + j] += u[j] * dt;
            }

            if x_next.iter().any(|v| !v.is_finite() || v.abs() > DIVERGENCE_LIMIT) {
                return Err(SolveError::NotConverged(format!(
                    "rollout diverged at node {}",
                    node
                )));
            }

            xs.push(x);
            us.push(u);
            x = x_next;
        }
        xs.push(x);

        Ok(Window {
            x_ref,
            a_ref,
            xs,
            us,
        })
    }

    fn output(&self, window: &Window) -> OptimizerOutput {
        OptimizerOutput {
            state: window.xs[1].clone(),
            command: window.us[0].clone(),
            feedback_gain: self.feedback_gain(),
        }
    }
}

impl Optimizer for DoubleIntegratorOptimizer {
    fn first_solve(
        &mut self,
        x_window: &DMatrix<f64>,
        a_window: &DMatrix<f64>,
        x0: &DVector<f64>,
        horizon_size: usize,
    ) -> Result<OptimizerOutput, SolveError> {
        if horizon_size == 0 {
            return Err(SolveError::DimensionMismatch {
                what: "horizon",
                expected: 1,
                found: 0,
            });
        }
        Self::check_len("state window rows", horizon_size, x_window.nrows())?;
        Self::check_len("acceleration window rows", horizon_size, a_window.nrows())?;
        Self::check_len("state window columns", 2 * self.nv, x_window.ncols())?;
        Self::check_len("acceleration window columns", self.nv, a_window.ncols())?;
        Self::check_len("initial state", 2 * self.nv, x0.len())?;

        let window = self.solve(x_window.clone(), a_window.clone(), x0)?;
        let output = self.output(&window);
        self.window = Some(window);

        Ok(output)
    }

    fn step(
        &mut self,
        x0: &DVector<f64>,
        x_ref: &DVector<f64>,
        a_ref: &DVector<f64>,
    ) -> Result<OptimizerOutput, SolveError> {
        let prev = self.window.as_ref().ok_or(SolveError::NotInitialised)?;

        Self::check_len("initial state", 2 * self.nv, x0.len())?;
        Self::check_len("state reference", 2 * self.nv, x_ref.len())?;
        Self::check_len("acceleration reference", self.nv, a_ref.len())?;

        // Drop the first node and append the new reference at the end
        let h = prev.x_ref.nrows();
        let shifted_x = DMatrix::from_fn(h, 2 * self.nv, |r, c| {
            if r + 1 < h {
                prev.x_ref[(r + 1, c)]
            } else {
                x_ref[c]
            }
        });
        let shifted_a = DMatrix::from_fn(h, self.nv, |r, c| {
            if r + 1 < h {
                prev.a_ref[(r + 1, c)]
            } else {
                a_ref[c]
            }
        });

        // The stored window only changes if the solve succeeds
        let window = self.solve(shifted_x, shifted_a, x0)?;
        let output = self.output(&window);
        self.window = Some(window);

        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Infinite horizon discrete LQR gains of a single double integrator.
fn lqr_gains(weights: &SolverWeights, dt: f64) -> Result<RowVector2<f64>, SolveError> {
    let q_pos = weights.end_effector_pose + weights.state_regularisation;
    let q_vel = weights.state_regularisation;
    let r = weights.control_regularisation;

    if !(q_pos > 0.0 && q_vel >= 0.0 && r > 0.0) {
        return Err(SolveError::InvalidWeights(format!(
            "position weight {} and control weight {} must be positive, velocity weight {} \
             must not be negative",
            q_pos, r, q_vel
        )));
    }
    if !(dt > 0.0 && dt.is_finite()) {
        return Err(SolveError::InvalidWeights(format!(
            "time step {} must be positive",
            dt
        )));
    }

    let a = Matrix2::new(1.0, dt, 0.0, 1.0);
    let b = Vector2::new(0.5 * dt * dt, dt);
    let q = Matrix2::new(q_pos, 0.0, 0.0, q_vel);

    let mut p = q;
    for _ in 0..RICCATI_MAX_ITERS {
        let gain = (b.transpose() * p * a) / (r + (b.transpose() * p * b)[(0, 0)]);
        let p_next = q + a.transpose() * p * a - a.transpose() * p * b * gain;

        let change = (p_next - p).amax();
        p = p_next;

        if change <= RICCATI_TOLERANCE * p.amax().max(1.0) {
            return Ok((b.transpose() * p * a) / (r + (b.transpose() * p * b)[(0, 0)]));
        }
    }

    Err(SolveError::NotConverged(format!(
        "Riccati iteration did not converge in {} iterations",
        RICCATI_MAX_ITERS
    )))
}

#[cfg(test)]
mod test {
    use super::*;

    fn weights() -> SolverWeights {
        SolverWeights {
            end_effector_pose: 1e4,
            state_regularisation: 1.0,
            control_regularisation: 1e-3,
            collision_avoidance: 0.0,
        }
    }

    /// Window holding the state `q`, at rest, on every node.
    fn rest_window(h: usize, nv: usize, q: f64) -> (DMatrix<f64>, DMatrix<f64>) {
        (
            DMatrix::from_fn(h, 2 * nv, |_, c| if c < nv { q } else { 0.0 }),
            DMatrix::zeros(h, nv),
        )
    }

    #[test]
    fn test_closed_loop_is_stable() {
        let dt = 0.05;
        let opt = DoubleIntegratorOptimizer::new(&weights(), 7, 7, dt).unwrap();
        let (kp, kd) = opt.gains();
        assert!(kp > 0.0 && kd > 0.0);

        // Jury criterion for the closed loop matrix A - B K
        let a = Matrix2::new(1.0, dt, 0.0, 1.0);
        let b = Vector2::new(0.5 * dt * dt, dt);
        let closed = a - b * RowVector2::new(kp, kd);
        let (tr, det) = (closed.trace(), closed.determinant());
        assert!(det.abs() < 1.0);
        assert!(tr.abs() < 1.0 + det);
    }

    #[test]
    fn test_at_rest_on_reference() {
        let mut opt = DoubleIntegratorOptimizer::new(&weights(), 3, 3, 0.05).unwrap();
        let (x_win, a_win) = rest_window(10, 3, 0.5);
        let x0 = x_win.row(0).transpose();

        let out = opt.first_solve(&x_win, &a_win, &x0, 10).unwrap();
        assert!(out.command.amax() < 1e-12);
        assert!((out.state - &x0).amax() < 1e-12);
        assert_eq!(out.feedback_gain.shape(), (3, 6));
        assert_eq!(out.feedback_gain[(1, 1)], -opt.gains().0);
        assert_eq!(out.feedback_gain[(1, 4)], -opt.gains().1);
        assert_eq!(out.feedback_gain[(1, 2)], 0.0);
        assert_eq!(opt.predicted_states().len(), 11);
    }

    #[test]
    fn test_error_gives_restoring_command() {
        let mut opt = DoubleIntegratorOptimizer::new(&weights(), 2, 2, 0.05).unwrap();
        let (x_win, a_win) = rest_window(5, 2, 0.0);
        let x0 = DVector::from_vec(vec![0.1, -0.1, 0.0, 0.0]);

        let out = opt.first_solve(&x_win, &a_win, &x0, 5).unwrap();
        assert!(out.command[0] < 0.0);
        assert!(out.command[1] > 0.0);

        // The rollout converges towards the reference
        let last = opt.predicted_states().last().unwrap();
        assert!(last.amax() < x0.amax());
    }

    #[test]
    fn test_step_shifts_window() {
        let mut opt = DoubleIntegratorOptimizer::new(&weights(), 1, 1, 0.05).unwrap();
        let (x_win, a_win) = rest_window(2, 1, 0.0);
        let x0 = DVector::zeros(2);
        opt.first_solve(&x_win, &a_win, &x0, 2).unwrap();

        let x_ref = DVector::from_vec(vec![1.0, 0.0]);
        let a_ref = DVector::from_vec(vec![0.0]);

        // Failed steps leave the window untouched
        assert_eq!(
            opt.step(&DVector::from_element(2, f64::NAN), &x_ref, &a_ref),
            Err(SolveError::NonFinite)
        );

        // First step: the new reference is only on the last node
        let out = opt.step(&x0, &x_ref, &a_ref).unwrap();
        assert_eq!(out.command[0], 0.0);

        // Second step: the new reference is now on the first node
        let out = opt.step(&x0, &x_ref, &a_ref).unwrap();
        assert!(out.command[0] > 0.0);
    }

    #[test]
    fn test_invalid_use() {
        let mut opt = DoubleIntegratorOptimizer::new(&weights(), 2, 2, 0.05).unwrap();
        let x = DVector::zeros(4);
        let a = DVector::zeros(2);

        assert_eq!(opt.step(&x, &x, &a), Err(SolveError::NotInitialised));

        let (x_win, a_win) = rest_window(4, 2, 0.0);
        assert_eq!(
            opt.first_solve(&x_win, &a_win, &DVector::zeros(3), 4),
            Err(SolveError::DimensionMismatch {
                what: "initial state",
                expected: 4,
                found: 3
            })
        );

        assert_eq!(
            DoubleIntegratorOptimizer::new(&weights(), 7, 6, 0.05).unwrap_err(),
            SolveError::UnsupportedModel { nq: 7, nv: 6 }
        );

        let mut bad = weights();
        bad.control_regularisation = 0.0;
        assert!(matches!(
            DoubleIntegratorOptimizer::new(&bad, 2, 2, 0.05),
            Err(SolveError::InvalidWeights(_))
        ));
    }
}
