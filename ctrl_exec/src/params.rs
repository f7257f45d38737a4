//! # Control Executable Parameters
//!
//! This module provides the parameters of the control executable, loaded once at startup from
//! `params/ctrl_exec.toml`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{ctrl_loop::SolveFailurePolicy, mpc::SolverWeights, robot_model::RobotModel};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtrlParams {
    /// Period of the control loop.
    ///
    /// Units: seconds
    pub loop_period_s: f64,

    /// Number of nodes in the MPC horizon.
    pub horizon_size: usize,

    /// Time between two nodes of the plan.
    ///
    /// Units: seconds
    pub time_step_s: f64,

    /// Configuration the planner moves to, length `nq`.
    pub goal_configuration: Vec<f64>,

    pub solver_weights: SolverWeights,

    /// Joint velocity limit used by the planner.
    ///
    /// Units: radians/second
    pub max_joint_vel_rads: f64,

    #[serde(default)]
    pub solve_failure_policy: SolveFailurePolicy,

    /// Number of consecutive failures tolerated when holding the last command.
    #[serde(default = "default_max_consec_solve_failures")]
    pub max_consec_solve_failures: u32,

    /// Maximum age of a sensor sample used in a cycle, unlimited if not given.
    ///
    /// Units: seconds
    #[serde(default)]
    pub max_sensor_age_s: Option<f64>,

    /// Start cycling without waiting for the operator.
    #[serde(default)]
    pub auto_proceed: bool,

    /// Period of the notices logged while waiting.
    ///
    /// Units: seconds
    pub wait_notice_period_s: f64,

    pub robot: RobotModel,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsError {
    #[error("Parameter {0} must be positive and finite, got {1}")]
    NotPositive(&'static str, f64),

    #[error("The horizon size must be at least one")]
    ZeroHorizon,

    #[error("The robot model must have at least one coordinate")]
    EmptyModel,

    #[error("The goal configuration has {found} coordinates but the robot has {expected}")]
    GoalDimension { expected: usize, found: usize },

    #[error("The goal configuration contains non-finite values")]
    NonFiniteGoal,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl CtrlParams {
    /// Check the parameters are consistent.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let mut positive = vec![
            ("loop_period_s", self.loop_period_s),
            ("time_step_s", self.time_step_s),
            ("max_joint_vel_rads", self.max_joint_vel_rads),
            ("wait_notice_period_s", self.wait_notice_period_s),
        ];
        if let Some(age) = self.max_sensor_age_s {
            positive.push(("max_sensor_age_s", age));
        }

        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ParamsError::NotPositive(name, value));
            }
        }

        if self.horizon_size == 0 {
            return Err(ParamsError::ZeroHorizon);
        }
        if self.robot.nq == 0 || self.robot.nv == 0 {
            return Err(ParamsError::EmptyModel);
        }
        if self.goal_configuration.len() != self.robot.nq {
            return Err(ParamsError::GoalDimension {
                expected: self.robot.nq,
                found: self.goal_configuration.len(),
            });
        }
        if self.goal_configuration.iter().any(|q| !q.is_finite()) {
            return Err(ParamsError::NonFiniteGoal);
        }

        Ok(())
    }
}

fn default_max_consec_solve_failures() -> u32 {
    10
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> CtrlParams {
        util::params::parse(include_str!("../../params/ctrl_exec.toml")).unwrap()
    }

    #[test]
    fn test_params_file_parses() {
        let p = params();

        assert!(p.validate().is_ok());
        assert_eq!(p.horizon_size, 50);
        assert_eq!(p.robot.nx(), 14);
        assert_eq!(p.goal_configuration.len(), 7);
        assert_eq!(p.solve_failure_policy, SolveFailurePolicy::HoldLastCommand);
        assert_eq!(p.solver_weights.end_effector_pose, 1e4);
        assert_eq!(p.max_sensor_age_s, Some(0.1));
    }

    #[test]
    fn test_optional_params_default() {
        let text = include_str!("../../params/ctrl_exec.toml")
            .lines()
            .filter(|l| {
                !l.starts_with("solve_failure_policy")
                    && !l.starts_with("max_consec_solve_failures")
                    && !l.starts_with("max_sensor_age_s")
                    && !l.starts_with("auto_proceed")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let p: CtrlParams = util::params::parse(&text).unwrap();
        assert_eq!(p.solve_failure_policy, SolveFailurePolicy::HoldLastCommand);
        assert_eq!(p.max_consec_solve_failures, 10);
        assert_eq!(p.max_sensor_age_s, None);
        assert!(!p.auto_proceed);
    }

    #[test]
    fn test_validate() {
        let mut p = params();
        p.goal_configuration.pop();
        assert_eq!(
            p.validate(),
            Err(ParamsError::GoalDimension {
                expected: 7,
                found: 6
            })
        );

        let mut p = params();
        p.loop_period_s = 0.0;
        assert_eq!(
            p.validate(),
            Err(ParamsError::NotPositive("loop_period_s", 0.0))
        );

        let mut p = params();
        p.horizon_size = 0;
        assert_eq!(p.validate(), Err(ParamsError::ZeroHorizon));
    }
}
