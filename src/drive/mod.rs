// DC drive motor behind an H-bridge (Ena = PWM, In1/In2 = direction)
//
// Provides:
// - The `HBridge` pin abstraction
// - `DriveMotor`: forward / backward / stop with a duty cycle speed
// - Dry-run and Raspberry Pi GPIO bridges

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actuator::ActuatorError;
use crate::steering::Delay;

#[cfg(feature = "hardware")]
mod gpio;
#[cfg(feature = "hardware")]
pub use gpio::GpioBridge;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Drive speed {0} outside 0-100%")]
    InvalidSpeed(f32),

    #[error("Drive hardware fault: {0}")]
    Hardware(#[from] ActuatorError),
}

pub type Result<T> = std::result::Result<T, DriveError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveDirection {
    Forward,
    Backward,
    #[default]
    Stop,
}

impl DriveDirection {
    /// (In1, In2) levels for this direction
    pub fn pin_levels(self) -> (bool, bool) {
        match self {
            DriveDirection::Forward => (true, false),
            DriveDirection::Backward => (false, true),
            DriveDirection::Stop => (false, false),
        }
    }
}

/// Direction pins plus a PWM enable pin
pub trait HBridge {
    fn set_direction(&mut self, in1: bool, in2: bool) -> std::result::Result<(), ActuatorError>;

    /// Duty cycle on the enable pin, 0-100%
    fn set_duty(&mut self, percent: f32) -> std::result::Result<(), ActuatorError>;
}

impl<T: HBridge + ?Sized> HBridge for Box<T> {
    fn set_direction(&mut self, in1: bool, in2: bool) -> std::result::Result<(), ActuatorError> {
        (**self).set_direction(in1, in2)
    }

    fn set_duty(&mut self, percent: f32) -> std::result::Result<(), ActuatorError> {
        (**self).set_duty(percent)
    }
}

/// Logs pin changes instead of driving them
#[derive(Debug, Default)]
pub struct DryRunBridge;

impl HBridge for DryRunBridge {
    fn set_direction(&mut self, in1: bool, in2: bool) -> std::result::Result<(), ActuatorError> {
        debug!("(dry-run) drive In1={} In2={}", in1, in2);
        Ok(())
    }

    fn set_duty(&mut self, percent: f32) -> std::result::Result<(), ActuatorError> {
        info!("(dry-run) drive duty {:.0}%", percent);
        Ok(())
    }
}

/// DC drive motor
pub struct DriveMotor<H: HBridge> {
    bridge: H,
    direction: DriveDirection,
    speed: f32,
}

impl<H: HBridge> DriveMotor<H> {
    /// Take over the bridge, starting stopped at 0% duty
    pub fn new(bridge: H) -> Result<Self> {
        let mut motor = Self {
            bridge,
            direction: DriveDirection::Stop,
            speed: 0.0,
        };
        motor.stop()?;
        Ok(motor)
    }

    /// Speed in percentage 0 to 100
    pub fn forward(&mut self, speed: f32) -> Result<()> {
        self.drive(DriveDirection::Forward, speed)
    }

    /// Speed in percentage 0 to 100
    pub fn backward(&mut self, speed: f32) -> Result<()> {
        self.drive(DriveDirection::Backward, speed)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.drive(DriveDirection::Stop, 0.0)
    }

    pub fn drive(&mut self, direction: DriveDirection, speed: f32) -> Result<()> {
        if !(0.0..=100.0).contains(&speed) {
            return Err(DriveError::InvalidSpeed(speed));
        }
        let speed = if direction == DriveDirection::Stop {
            0.0
        } else {
            speed
        };

        let (in1, in2) = direction.pin_levels();
        self.bridge.set_direction(in1, in2)?;
        self.bridge.set_duty(speed)?;

        if direction != self.direction {
            info!("Drive {:?} at {:.0}%", direction, speed);
        }
        self.direction = direction;
        self.speed = speed;
        Ok(())
    }

    /// Drive, then hold for `duration`
    pub fn run_for(
        &mut self,
        direction: DriveDirection,
        speed: f32,
        duration: Duration,
        delay: &mut impl Delay,
    ) -> Result<()> {
        self.drive(direction, speed)?;
        delay.delay(duration);
        Ok(())
    }

    /// Forward, stop, backward, stop, each held for `hold`
    pub fn cycle(&mut self, speed: f32, hold: Duration, delay: &mut impl Delay) -> Result<()> {
        self.run_for(DriveDirection::Forward, speed, hold, delay)?;
        self.run_for(DriveDirection::Stop, 0.0, hold, delay)?;
        self.run_for(DriveDirection::Backward, speed, hold, delay)?;
        self.stop()
    }

    pub fn direction(&self) -> DriveDirection {
        self.direction
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

impl<H: HBridge> Drop for DriveMotor<H> {
    fn drop(&mut self) {
        // Try to stop the motor when the driver is dropped
        if let Err(e) = self.stop() {
            warn!("Failed to stop drive motor on drop: {}", e);
        }
    }
}
