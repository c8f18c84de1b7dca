// Timeouts, topics, steering and drive configuration
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::steering::{MovementState, PatternTable, WHEEL_COUNT, WheelAngles};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_STEERING: &str = "rover/cmd/steering"; // movement state requests
pub const TOPIC_CMD_DRIVE: &str = "rover/cmd/drive"; // drive motor requests
pub const TOPIC_STEERING: &str = "rover/state/steering"; // live wheel angles
pub const TOPIC_HEALTH: &str = "rover/state/health"; // health status

// Steering smoothing
pub const DEFAULT_SMOOTH_STEP: u16 = 3; // degrees per tick
pub const DEFAULT_SMOOTH_DELAY_MS: u64 = 20; // between ticks

// Servo board wiring
pub const DEFAULT_CHANNELS: [u8; WHEEL_COUNT] = [0, 1, 2, 3, 4, 5];
pub const DEFAULT_PULSE_MIN_US: u16 = 500;
pub const DEFAULT_PULSE_MAX_US: u16 = 2500;
pub const SERVO_CHANNEL_COUNT: u8 = 16; // PCA9685 outputs

// TCA9548A port the PCA9685 hangs off
pub const DEFAULT_TCA_CHANNEL: u8 = 2;
pub const TCA_CHANNEL_COUNT: u8 = 8;

// DC drive motor (BCM pin numbers)
pub const DEFAULT_DRIVE_ENA: u8 = 2;
pub const DEFAULT_DRIVE_IN1: u8 = 3;
pub const DEFAULT_DRIVE_IN2: u8 = 4;
pub const DEFAULT_DRIVE_PWM_HZ: f64 = 100.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Servo pulse width calibration, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseWidthRange {
    pub min_us: u16,
    pub max_us: u16,
}

impl Default for PulseWidthRange {
    fn default() -> Self {
        Self {
            min_us: DEFAULT_PULSE_MIN_US,
            max_us: DEFAULT_PULSE_MAX_US,
        }
    }
}

/// Construction options for the steering controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Servo channel per wheel, in wheel index order
    pub channels: [u8; WHEEL_COUNT],
    pub pulse_range: PulseWidthRange,
    pub smooth_step: u16,
    pub smooth_delay_ms: u64,
    pub initial_state: MovementState,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            pulse_range: PulseWidthRange::default(),
            smooth_step: DEFAULT_SMOOTH_STEP,
            smooth_delay_ms: DEFAULT_SMOOTH_DELAY_MS,
            initial_state: MovementState::Stop,
        }
    }
}

impl ControllerConfig {
    pub fn with_channels(mut self, channels: [u8; WHEEL_COUNT]) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_pulse_range(mut self, pulse_range: PulseWidthRange) -> Self {
        self.pulse_range = pulse_range;
        self
    }

    pub fn with_smooth_step(mut self, step: u16) -> Self {
        self.smooth_step = step;
        self
    }

    /// Rounded up to whole milliseconds, so a nonzero delay never becomes 0
    pub fn with_smooth_delay(mut self, delay: Duration) -> Self {
        self.smooth_delay_ms = u64::try_from(delay.as_micros().div_ceil(1000)).unwrap_or(u64::MAX);
        self
    }

    pub fn with_initial_state(mut self, state: MovementState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn smooth_delay(&self) -> Duration {
        Duration::from_millis(self.smooth_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smooth_step == 0 {
            return Err(ConfigError::Invalid(
                "smoothing step must be at least 1 degree".to_string(),
            ));
        }

        for (i, &channel) in self.channels.iter().enumerate() {
            if channel >= SERVO_CHANNEL_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "servo channel {} out of range (0..{})",
                    channel, SERVO_CHANNEL_COUNT
                )));
            }
            if self.channels[..i].contains(&channel) {
                return Err(ConfigError::Invalid(format!(
                    "servo channel {} assigned to more than one wheel",
                    channel
                )));
            }
        }

        if self.pulse_range.min_us >= self.pulse_range.max_us {
            return Err(ConfigError::Invalid(format!(
                "pulse range {}..{} us is empty",
                self.pulse_range.min_us, self.pulse_range.max_us
            )));
        }

        Ok(())
    }
}

/// H-bridge wiring for the DC drive motor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivePins {
    pub ena: u8,
    pub in1: u8,
    pub in2: u8,
    pub pwm_hz: f64,
}

impl Default for DrivePins {
    fn default() -> Self {
        Self {
            ena: DEFAULT_DRIVE_ENA,
            in1: DEFAULT_DRIVE_IN1,
            in2: DEFAULT_DRIVE_IN2,
            pwm_hz: DEFAULT_DRIVE_PWM_HZ,
        }
    }
}

/// Whole-rover configuration, optionally loaded from a JSON file
///
/// ```json
/// {
///   "controller": { "smooth_step": 5, "channels": [8, 9, 10, 11, 12, 13] },
///   "patterns": { "SPIN_LEFT": [50, 130, 130, 50, 50, 130] },
///   "tca_channel": 2
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub controller: ControllerConfig,
    /// Pattern rows replacing the stock ones, keyed by state name
    pub patterns: HashMap<String, [i32; WHEEL_COUNT]>,
    pub tca_channel: u8,
    pub drive: DrivePins,
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            patterns: HashMap::new(),
            tca_channel: DEFAULT_TCA_CHANNEL,
            drive: DrivePins::default(),
        }
    }
}

impl RoverConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RoverConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        if self.tca_channel >= TCA_CHANNEL_COUNT {
            return Err(ConfigError::Invalid(format!(
                "multiplexer channel {} out of range (0..{})",
                self.tca_channel, TCA_CHANNEL_COUNT
            )));
        }
        if self.drive.pwm_hz <= 0.0 {
            return Err(ConfigError::Invalid(
                "drive PWM frequency must be positive".to_string(),
            ));
        }
        self.pattern_table().map(|_| ())
    }

    /// Stock patterns with the configured overrides applied
    pub fn pattern_table(&self) -> Result<PatternTable, ConfigError> {
        let mut overrides = Vec::with_capacity(self.patterns.len());
        for (name, angles) in &self.patterns {
            let state: MovementState = name
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("patterns: {}", e)))?;
            overrides.push((state, WheelAngles::new(*angles)));
        }
        Ok(PatternTable::default().with_overrides(overrides))
    }
}
