// PCA9685 16-channel PWM board reached through a TCA9548A I2C multiplexer
//
// The multiplexer routes the bus to one downstream port when a single byte
// with that port's bit set is written to it. The PCA9685 then takes a
// 12-bit on/off count per channel over a fixed PWM period.

#[cfg(feature = "hardware")]
use rppal::i2c::I2c;
#[cfg(feature = "hardware")]
use std::thread::sleep;
#[cfg(feature = "hardware")]
use std::time::Duration;
#[cfg(feature = "hardware")]
use tracing::{debug, info};

#[cfg(feature = "hardware")]
use super::{Actuator, ActuatorError, Result};
use crate::config::PulseWidthRange;
#[cfg(feature = "hardware")]
use crate::config::{SERVO_CHANNEL_COUNT, TCA_CHANNEL_COUNT};
use crate::steering::MAX_ANGLE;
#[cfg(feature = "hardware")]
use crate::steering::{WHEEL_COUNT, WheelAngles};

/// Default bus addresses
pub const TCA9548A_ADDRESS: u16 = 0x70;
pub const PCA9685_ADDRESS: u16 = 0x40;

/// Internal oscillator and servo frame rate
pub const OSCILLATOR_HZ: u32 = 25_000_000;
pub const SERVO_FREQUENCY_HZ: u32 = 50;
const PWM_RESOLUTION: u32 = 4096;

/// Register addresses for PCA9685
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    Mode1 = 0x00,
    Mode2 = 0x01,
    Led0OnL = 0x06, // 4 bytes per channel: on_l, on_h, off_l, off_h
    Prescale = 0xFE,
}

/// MODE1 bits
#[cfg(feature = "hardware")]
const MODE1_SLEEP: u8 = 0x10;
#[cfg(feature = "hardware")]
const MODE1_AUTO_INCREMENT: u8 = 0x20;
#[cfg(feature = "hardware")]
const MODE1_RESTART: u8 = 0x80;
/// MODE2: totem-pole outputs
#[cfg(feature = "hardware")]
const MODE2_OUTDRV: u8 = 0x04;

/// Prescaler value for a PWM frequency: round(osc / (4096 * freq)) - 1
pub fn prescale_for(frequency_hz: u32) -> u8 {
    let divisor = PWM_RESOLUTION * frequency_hz;
    let prescale = (OSCILLATOR_HZ + divisor / 2) / divisor;
    prescale.saturating_sub(1).clamp(3, 255) as u8
}

/// Pulse width for an angle, linear across the calibrated range
pub fn angle_to_pulse_us(angle: i32, range: PulseWidthRange) -> u32 {
    let angle = angle.clamp(0, MAX_ANGLE) as u32;
    let min = range.min_us as u32;
    let span = (range.max_us as u32).saturating_sub(min);
    min + (span * angle + MAX_ANGLE as u32 / 2) / MAX_ANGLE as u32
}

/// Off-count for a pulse width within one servo period
pub fn pulse_to_counts(pulse_us: u32) -> u16 {
    let period_us = (1_000_000 / SERVO_FREQUENCY_HZ) as u64;
    let counts = pulse_us as u64 * PWM_RESOLUTION as u64 / period_us;
    counts.min(PWM_RESOLUTION as u64 - 1) as u16
}

/// Register write turning a channel on at count 0 and off at `off`
pub fn channel_write(channel: u8, off: u16) -> [u8; 5] {
    [
        Register::Led0OnL as u8 + 4 * channel,
        0,
        0,
        (off & 0xFF) as u8,
        (off >> 8) as u8,
    ]
}

/// Servo array on a PCA9685 behind a TCA9548A
#[cfg(feature = "hardware")]
pub struct Pca9685Actuator {
    i2c: I2c,
    tca_channel: u8,
    pulse_range: Option<PulseWidthRange>,
}

#[cfg(feature = "hardware")]
impl Pca9685Actuator {
    /// Open the primary I2C bus and probe the board on the given mux port
    pub fn open(tca_channel: u8) -> Result<Self> {
        if tca_channel >= TCA_CHANNEL_COUNT {
            return Err(ActuatorError::InvalidChannel {
                channel: tca_channel,
            });
        }

        info!("Opening I2C bus, PCA9685 on TCA9548A port {}", tca_channel);
        let i2c = I2c::new().map_err(i2c_error)?;
        let mut actuator = Self {
            i2c,
            tca_channel,
            pulse_range: None,
        };

        actuator.select_board()?;
        let mode1 = actuator.i2c.smbus_read_byte(Register::Mode1 as u8).map_err(i2c_error)?;
        debug!("PCA9685 MODE1=0x{:02X}", mode1);
        Ok(actuator)
    }

    /// Route the bus to our mux port and address the PCA9685
    fn select_board(&mut self) -> Result<()> {
        self.i2c
            .set_slave_address(TCA9548A_ADDRESS)
            .map_err(i2c_error)?;
        self.i2c
            .write(&[1 << self.tca_channel])
            .map_err(i2c_error)?;
        self.i2c
            .set_slave_address(PCA9685_ADDRESS)
            .map_err(i2c_error)
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<()> {
        debug!("PCA9685 write reg={:?}, value=0x{:02X}", register, value);
        self.i2c
            .write(&[register as u8, value])
            .map_err(i2c_error)?;
        Ok(())
    }
}

#[cfg(feature = "hardware")]
impl Actuator for Pca9685Actuator {
    fn initialize(
        &mut self,
        channels: &[u8; WHEEL_COUNT],
        pulse_range: PulseWidthRange,
    ) -> Result<()> {
        if let Some(&channel) = channels.iter().find(|&&c| c >= SERVO_CHANNEL_COUNT) {
            return Err(ActuatorError::InvalidChannel { channel });
        }

        self.select_board()?;

        // Prescaler only latches while the oscillator sleeps
        self.write_register(Register::Mode1, MODE1_SLEEP)?;
        self.write_register(Register::Prescale, prescale_for(SERVO_FREQUENCY_HZ))?;
        self.write_register(Register::Mode2, MODE2_OUTDRV)?;
        self.write_register(Register::Mode1, 0)?;
        sleep(Duration::from_micros(500));
        self.write_register(Register::Mode1, MODE1_RESTART | MODE1_AUTO_INCREMENT)?;

        self.pulse_range = Some(pulse_range);
        info!(
            "PCA9685 ready: channels {:?}, pulse range {}..{} us",
            channels, pulse_range.min_us, pulse_range.max_us
        );
        Ok(())
    }

    fn apply_frame(&mut self, angles: &WheelAngles, channels: &[u8; WHEEL_COUNT]) -> Result<()> {
        let range = self.pulse_range.ok_or(ActuatorError::NotInitialized)?;

        // Other devices may have moved the mux since the last frame
        self.select_board()?;

        for (&angle, &channel) in angles.iter().zip(channels) {
            let counts = pulse_to_counts(angle_to_pulse_us(angle, range));
            self.i2c
                .write(&channel_write(channel, counts))
                .map_err(i2c_error)?;
        }
        Ok(())
    }
}

#[cfg(feature = "hardware")]
fn i2c_error(e: rppal::i2c::Error) -> ActuatorError {
    ActuatorError::I2c(e.to_string())
}
