// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::DriveDirection;
use crate::steering::{MovementState, WheelAngles};

// Steering request from teleop/scripts -> runtime
// e.g. {"state": "STRAFE_LEFT"}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SteeringCommand {
    pub state: MovementState,
}

// Drive motor request from teleop/scripts -> runtime
// Speed is a duty cycle percentage (0-100); stop ignores it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DriveCommand {
    pub direction: DriveDirection,
    #[serde(default)]
    pub speed: f32,
}

impl DriveCommand {
    pub fn stop() -> Self {
        Self::default()
    }
}

/// Live steering state published by runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SteeringTelemetry {
    pub state: MovementState,
    pub angles: WheelAngles,
    /// Last actuator fault raised by the steering worker, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Fault,
}
