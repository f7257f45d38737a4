//! # Sensor messages

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::{Header, Message};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Measured joint positions and velocities.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointState {
    /// Joint positions, one per configuration coordinate.
    ///
    /// Units: radians
    pub position: Vec<f64>,

    /// Joint velocities, one per degree of freedom.
    ///
    /// Units: radians/second
    pub velocity: Vec<f64>,
}

/// A sample of the robot's sensors, published by the driver.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SensorMsg {
    pub header: Header,

    pub joint_state: JointState,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Message for SensorMsg {}

impl SensorMsg {
    /// Build a new sensor message stamped with the current time.
    pub fn new(position: Vec<f64>, velocity: Vec<f64>) -> Self {
        Self {
            header: Header::now(),
            joint_state: JointState { position, velocity },
        }
    }

    /// The state vector `x = [q, v]` of this sample.
    pub fn state(&self) -> Vec<f64> {
        self.joint_state
            .position
            .iter()
            .chain(self.joint_state.velocity.iter())
            .copied()
            .collect()
    }
}
