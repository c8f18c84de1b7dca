// Raspberry Pi GPIO H-bridge using software PWM on the enable pin

use rppal::gpio::{Gpio, OutputPin};
use tracing::info;

use super::HBridge;
use crate::actuator::ActuatorError;
use crate::config::DrivePins;

pub struct GpioBridge {
    ena: OutputPin,
    in1: OutputPin,
    in2: OutputPin,
    pwm_hz: f64,
}

impl GpioBridge {
    pub fn new(pins: DrivePins) -> Result<Self, ActuatorError> {
        info!(
            "Opening drive pins: Ena={}, In1={}, In2={} ({} Hz PWM)",
            pins.ena, pins.in1, pins.in2, pins.pwm_hz
        );
        let gpio = Gpio::new().map_err(gpio_error)?;
        let ena = gpio.get(pins.ena).map_err(gpio_error)?.into_output_low();
        let in1 = gpio.get(pins.in1).map_err(gpio_error)?.into_output_low();
        let in2 = gpio.get(pins.in2).map_err(gpio_error)?.into_output_low();

        Ok(Self {
            ena,
            in1,
            in2,
            pwm_hz: pins.pwm_hz,
        })
    }
}

impl HBridge for GpioBridge {
    fn set_direction(&mut self, in1: bool, in2: bool) -> Result<(), ActuatorError> {
        set_level(&mut self.in1, in1);
        set_level(&mut self.in2, in2);
        Ok(())
    }

    fn set_duty(&mut self, percent: f32) -> Result<(), ActuatorError> {
        let duty = (percent as f64 / 100.0).clamp(0.0, 1.0);
        self.ena
            .set_pwm_frequency(self.pwm_hz, duty)
            .map_err(gpio_error)
    }
}

fn set_level(pin: &mut OutputPin, high: bool) {
    if high {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

fn gpio_error(e: rppal::gpio::Error) -> ActuatorError {
    ActuatorError::Gpio(e.to_string())
}
