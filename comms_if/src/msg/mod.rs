//! # Messages
//!
//! Messages exchanged between the control executable and the robot driver. Sensor messages flow
//! in from the driver, control and solve time messages flow out to it. All messages are sent as
//! JSON strings.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod control;
pub mod sensor;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use control::*;
pub use sensor::*;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Header common to all messages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    /// Time at which the message was produced.
    pub stamp: DateTime<Utc>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// Errors associated with converting messages to and from their wire format.
#[derive(Debug, thiserror::Error)]
pub enum MsgError {
    #[error("Could not serialize the message: {0}")]
    SerializeError(serde_json::Error),

    #[error("Could not deserialize the message: {0}")]
    DeserializeError(serde_json::Error),

    #[error("Expected an array of {expected} elements but found {found}")]
    ShapeMismatch { expected: usize, found: usize },
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// A message which can be sent over the network.
pub trait Message: Serialize + DeserializeOwned {
    /// Convert the message into its wire format.
    fn to_json(&self) -> Result<String, MsgError> {
        serde_json::to_string(self).map_err(MsgError::SerializeError)
    }

    /// Parse a message from its wire format.
    fn from_json(s: &str) -> Result<Self, MsgError> {
        serde_json::from_str(s).map_err(MsgError::DeserializeError)
    }
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Header {
    /// Create a header stamped with the current time.
    pub fn now() -> Self {
        Self { stamp: Utc::now() }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::now()
    }
}
