//! Robot model description
//!
//! Only the dimensions of the model and the end effector frame are needed by the control loop,
//! the kinematics and dynamics live in the optimizer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotModel {
    /// Name of the robot, only used for logging.
    pub name: String,

    /// Number of configuration coordinates.
    pub nq: usize,

    /// Number of degrees of freedom.
    pub nv: usize,

    /// Name of the end effector frame tracked by the optimizer.
    pub ee_frame_name: String,
}

impl RobotModel {
    /// Size of the state vector.
    pub fn nx(&self) -> usize {
        self.nq + self.nv
    }
}
