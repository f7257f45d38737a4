//! Planner interface and a joint space reference planner

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::DVector;

// Internal
use crate::traj_buffer::TrajectoryPoint;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Peak of the normalised quintic velocity profile, `ds/dtau` at `tau = 0.5`.
const QUINTIC_PEAK_VELOCITY: f64 = 1.875;

/// Upper bound on the number of steps in one planned motion.
const MAX_PLAN_STEPS: usize = 1_000_000;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A planner produces the whole trajectory from the initial configuration to the goal.
///
/// Planning is a one-shot blocking call made before the control loop starts cycling.
pub trait Planner {
    fn plan(
        &mut self,
        q_init: &DVector<f64>,
        q_goal: &DVector<f64>,
    ) -> Result<Vec<TrajectoryPoint>, PlanningError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Straight line joint space planner with quintic time scaling.
///
/// The path starts and finishes at rest with zero acceleration. Its duration is chosen so that
/// the fastest moving joint reaches `max_joint_vel_rads` at the midpoint.
#[derive(Debug, Clone)]
pub struct JointSpacePlanner {
    /// Time between points.
    ///
    /// Units: seconds
    dt: f64,

    /// Units: radians/second
    max_joint_vel_rads: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanningError {
    #[error("Initial configuration has {init} coordinates but the goal has {goal}")]
    DimensionMismatch { init: usize, goal: usize },

    #[error("Configurations contain non-finite values")]
    NonFinite,

    #[error("Invalid planner time step ({0} s), must be positive")]
    InvalidTimeStep(f64),

    #[error("Invalid joint velocity limit ({0} rad/s), must be positive")]
    InvalidVelocityLimit(f64),

    #[error("Planned motion needs {steps} steps, more than the maximum of {max}")]
    TooManySteps { steps: f64, max: usize },

    #[error("Planner failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointSpacePlanner {
    pub fn new(dt: f64, max_joint_vel_rads: f64) -> Self {
        Self {
            dt,
            max_joint_vel_rads,
        }
    }
}

impl Planner for JointSpacePlanner {
    fn plan(
        &mut self,
        q_init: &DVector<f64>,
        q_goal: &DVector<f64>,
    ) -> Result<Vec<TrajectoryPoint>, PlanningError> {
        if q_init.len() != q_goal.len() {
            return Err(PlanningError::DimensionMismatch {
                init: q_init.len(),
                goal: q_goal.len(),
            });
        }
        if q_init.iter().chain(q_goal.iter()).any(|q| !q.is_finite()) {
            return Err(PlanningError::NonFinite);
        }
        if !(self.dt > 0.0) {
            return Err(PlanningError::InvalidTimeStep(self.dt));
        }
        if !(self.max_joint_vel_rads > 0.0) {
            return Err(PlanningError::InvalidVelocityLimit(self.max_joint_vel_rads));
        }

        let delta = q_goal - q_init;
        let max_delta = delta.amax();

        // Round the duration up to a whole number of steps, at least one
        let min_duration = QUINTIC_PEAK_VELOCITY * max_delta / self.max_joint_vel_rads;
        let steps = (min_duration / self.dt).ceil();
        if !(steps <= MAX_PLAN_STEPS as f64) {
            return Err(PlanningError::TooManySteps {
                steps,
                max: MAX_PLAN_STEPS,
            });
        }
        let num_steps = (steps as usize).max(1);
        let duration = num_steps as f64 * self.dt;

        debug!(
            "Planned {} steps over {:.3} s (largest joint motion {:.3} rad)",
            num_steps + 1,
            duration,
            max_delta
        );

        Ok((0..=num_steps)
            .map(|k| {
                let tau = k as f64 / num_steps as f64;
                let (s, s_dot, s_ddot) = quintic(tau);

                TrajectoryPoint::new(
                    k as f64 * self.dt,
                    q_init + &delta * s,
                    &delta * (s_dot / duration),
                    &delta * (s_ddot / (duration * duration)),
                )
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Quintic time scaling and its first two derivatives with respect to `tau`.
fn quintic(tau: f64) -> (f64, f64, f64) {
    let t2 = tau * tau;
    let t3 = t2 * tau;

    (
        t3 * (10.0 - 15.0 * tau + 6.0 * t2),
        30.0 * t2 * (1.0 - 2.0 * tau + t2),
        60.0 * tau * (1.0 - 3.0 * tau + 2.0 * t2),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plan_endpoints_at_rest() {
        let q_init = DVector::from_vec(vec![0.0, 1.0, -1.0]);
        let q_goal = DVector::from_vec(vec![1.0, 1.0, 0.5]);

        let mut planner = JointSpacePlanner::new(0.05, 1.0);
        let points = planner.plan(&q_init, &q_goal).unwrap();

        let first = points.first().unwrap();
        let last = points.last().unwrap();

        assert_eq!(first.time_s, 0.0);
        assert!((first.q() - &q_init).amax() < 1e-12);
        assert!((last.q() - &q_goal).amax() < 1e-12);
        assert!(first.v().amax() < 1e-12);
        assert!(last.v().amax() < 1e-12);
        assert!(last.a().amax() < 1e-9);

        // Peak velocity stays within the limit
        for p in points.iter() {
            assert!(p.v().amax() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_plan_already_at_goal() {
        let q = DVector::from_element(7, 0.3);

        let points = JointSpacePlanner::new(0.05, 1.0).plan(&q, &q).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.q() == &q));
    }

    #[test]
    fn test_plan_failures() {
        let mut planner = JointSpacePlanner::new(0.05, 1.0);

        assert_eq!(
            planner.plan(&DVector::zeros(7), &DVector::zeros(6)),
            Err(PlanningError::DimensionMismatch { init: 7, goal: 6 })
        );
        assert_eq!(
            planner.plan(&DVector::zeros(2), &DVector::from_element(2, f64::NAN)),
            Err(PlanningError::NonFinite)
        );
        assert_eq!(
            JointSpacePlanner::new(0.05, 0.0).plan(&DVector::zeros(2), &DVector::zeros(2)),
            Err(PlanningError::InvalidVelocityLimit(0.0))
        );
    }

    #[test]
    fn test_plan_too_long_is_rejected() {
        let mut planner = JointSpacePlanner::new(0.05, 1.0);

        // Finite but far too large a motion to sample at the time step
        match planner.plan(&DVector::zeros(2), &DVector::from_element(2, 1e300)) {
            Err(PlanningError::TooManySteps { max, .. }) => assert_eq!(max, MAX_PLAN_STEPS),
            r => panic!("Expected too many steps, got {:?}", r),
        }
        match planner.plan(
            &DVector::from_element(1, -f64::MAX),
            &DVector::from_element(1, f64::MAX),
        ) {
            Err(PlanningError::TooManySteps { .. }) => (),
            r => panic!("Expected too many steps, got {:?}", r),
        }
    }
}
