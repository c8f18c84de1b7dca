// Steering module for the six-wheel rover servo array
//
// Provides:
// - Named movement states and their fixed wheel-angle patterns
// - The ramping steering controller
// - A single-owner worker that serializes steering requests

mod controller;
pub mod pattern;
pub mod worker;

pub use controller::{
    Delay, Result, SteeringController, SteeringError, ThreadDelay, normalize_angle,
};
pub use pattern::{CENTER, MAX_ANGLE, MovementState, PatternTable, WHEEL_COUNT, WheelAngles};
pub use worker::{SteeringHandle, spawn as spawn_worker};
