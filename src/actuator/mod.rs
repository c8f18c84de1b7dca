// Actuator capability for the steering servo array
//
// Provides:
// - The `Actuator` trait the steering controller drives
// - A dry-run implementation that only logs frames
// - A recording implementation for tests and simulation
// - PCA9685 servo board behind a TCA9548A multiplexer (hardware feature)

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::config::PulseWidthRange;
use crate::steering::{WHEEL_COUNT, WheelAngles};

pub mod pca9685;

#[cfg(feature = "hardware")]
pub use pca9685::Pca9685Actuator;

/// Hardware faults reported by actuator implementations
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("I2C error: {0}")]
    I2c(String),

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Invalid servo channel {channel}")]
    InvalidChannel { channel: u8 },

    #[error("Actuator used before initialization")]
    NotInitialized,

    #[error("Hardware fault: {0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// Something that can hold six servos at given angles
pub trait Actuator {
    /// One-time setup before any frame is applied
    fn initialize(
        &mut self,
        channels: &[u8; WHEEL_COUNT],
        pulse_range: PulseWidthRange,
    ) -> Result<()>;

    /// Drive every wheel to its angle; `angles[i]` goes to `channels[i]`
    fn apply_frame(&mut self, angles: &WheelAngles, channels: &[u8; WHEEL_COUNT]) -> Result<()>;
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn initialize(
        &mut self,
        channels: &[u8; WHEEL_COUNT],
        pulse_range: PulseWidthRange,
    ) -> Result<()> {
        (**self).initialize(channels, pulse_range)
    }

    fn apply_frame(&mut self, angles: &WheelAngles, channels: &[u8; WHEEL_COUNT]) -> Result<()> {
        (**self).apply_frame(angles, channels)
    }
}

/// Logs frames instead of driving hardware
#[derive(Debug, Default)]
pub struct DryRunActuator {
    frames: u64,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames logged so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Actuator for DryRunActuator {
    fn initialize(
        &mut self,
        channels: &[u8; WHEEL_COUNT],
        pulse_range: PulseWidthRange,
    ) -> Result<()> {
        info!(
            "(dry-run) servo channels {:?}, pulse range {}..{} us",
            channels, pulse_range.min_us, pulse_range.max_us
        );
        Ok(())
    }

    fn apply_frame(&mut self, angles: &WheelAngles, _channels: &[u8; WHEEL_COUNT]) -> Result<()> {
        self.frames += 1;
        info!("(dry-run) wheels -> {}", angles);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recording {
    setup: Option<([u8; WHEEL_COUNT], PulseWidthRange)>,
    frames: Vec<(WheelAngles, [u8; WHEEL_COUNT])>,
    fail_after: Option<usize>,
}

/// Keeps every frame in memory
///
/// Clones share the same recording, so a clone kept aside can inspect
/// frames applied through an actuator that was moved into a controller.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault every frame once `frames` frames have been accepted
    pub fn failing_after(frames: usize) -> Self {
        let actuator = Self::default();
        actuator.lock().fail_after = Some(frames);
        actuator
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Angles of every accepted frame, oldest first
    pub fn frames(&self) -> Vec<WheelAngles> {
        self.lock().frames.iter().map(|(angles, _)| *angles).collect()
    }

    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn last_frame(&self) -> Option<(WheelAngles, [u8; WHEEL_COUNT])> {
        self.lock().frames.last().copied()
    }

    pub fn initialized_with(&self) -> Option<([u8; WHEEL_COUNT], PulseWidthRange)> {
        self.lock().setup
    }

    pub fn clear(&self) {
        self.lock().frames.clear();
    }
}

impl Actuator for RecordingActuator {
    fn initialize(
        &mut self,
        channels: &[u8; WHEEL_COUNT],
        pulse_range: PulseWidthRange,
    ) -> Result<()> {
        self.lock().setup = Some((*channels, pulse_range));
        Ok(())
    }

    fn apply_frame(&mut self, angles: &WheelAngles, channels: &[u8; WHEEL_COUNT]) -> Result<()> {
        let mut recording = self.lock();
        if recording.setup.is_none() {
            return Err(ActuatorError::NotInitialized);
        }
        if let Some(limit) = recording.fail_after {
            if recording.frames.len() >= limit {
                return Err(ActuatorError::Fault(format!(
                    "injected fault after {} frames",
                    limit
                )));
            }
        }
        recording.frames.push((*angles, *channels));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_requires_initialize() {
        let mut actuator = RecordingActuator::new();
        let channels = [0, 1, 2, 3, 4, 5];
        assert!(matches!(
            actuator.apply_frame(&WheelAngles::default(), &channels),
            Err(ActuatorError::NotInitialized)
        ));

        actuator.initialize(&channels, PulseWidthRange::default()).unwrap();
        actuator.apply_frame(&WheelAngles::default(), &channels).unwrap();
        assert_eq!(actuator.frame_count(), 1);
    }

    #[test]
    fn test_recording_clones_share_frames() {
        let observer = RecordingActuator::new();
        let mut boxed: Box<dyn Actuator> = Box::new(observer.clone());
        let channels = [5, 4, 3, 2, 1, 0];

        boxed.initialize(&channels, PulseWidthRange::default()).unwrap();
        boxed
            .apply_frame(&WheelAngles::uniform(10), &channels)
            .unwrap();

        assert_eq!(observer.frames(), vec![WheelAngles::uniform(10)]);
        assert_eq!(observer.last_frame().unwrap().1, channels);
        assert_eq!(observer.initialized_with().unwrap().0, channels);
    }

    #[test]
    fn test_injected_fault() {
        let mut actuator = RecordingActuator::failing_after(1);
        let channels = [0, 1, 2, 3, 4, 5];
        actuator.initialize(&channels, PulseWidthRange::default()).unwrap();

        assert!(actuator.apply_frame(&WheelAngles::default(), &channels).is_ok());
        assert!(matches!(
            actuator.apply_frame(&WheelAngles::default(), &channels),
            Err(ActuatorError::Fault(_))
        ));
        assert_eq!(actuator.frame_count(), 1);
    }

    #[test]
    fn test_dry_run_counts_frames() {
        let mut actuator = DryRunActuator::new();
        let channels = [0, 1, 2, 3, 4, 5];
        actuator.initialize(&channels, PulseWidthRange::default()).unwrap();
        actuator.apply_frame(&WheelAngles::default(), &channels).unwrap();
        actuator.apply_frame(&WheelAngles::default(), &channels).unwrap();
        assert_eq!(actuator.frames(), 2);
    }
}
