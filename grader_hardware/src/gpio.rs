//! Servo and conveyor drivers on Raspberry Pi GPIO.

use std::time::Duration;

use grader_traits::{BoxError, Motor, Scale, Servo};

use crate::error::HwError;
use crate::hx711::Hx711;
use crate::util::servo_pulse_width;

const SERVO_PERIOD: Duration = Duration::from_millis(20);

/// HX711-backed scale with bounded retry on data-ready timeouts.
pub struct HardwareScale {
    hx711: Hx711,
    max_retries: u8,
}

impl HardwareScale {
    pub fn new(dt_pin: u8, sck_pin: u8) -> Result<Self, HwError> {
        // 25 pulses: channel A, gain 128
        let hx711 = Hx711::open(dt_pin, sck_pin, 25)?;
        Ok(Self {
            hx711,
            max_retries: 3,
        })
    }
}

impl Scale for HardwareScale {
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        let mut attempts = 0;
        loop {
            match self.hx711.read_with_timeout(timeout) {
                Ok(raw) => {
                    tracing::trace!(raw, "hx711 sample");
                    return Ok(raw);
                }
                Err(HwError::Timeout) if attempts < self.max_retries => {
                    attempts += 1;
                    tracing::debug!(retries = attempts, "scale timeout, retrying");
                }
                Err(e) => return Err(Box::new(e)),
            }
        }
    }
}

/// Hobby servo driven by software PWM on one GPIO line.
pub struct HardwareServo {
    pin: rppal::gpio::OutputPin,
}

impl HardwareServo {
    pub fn new(pin: u8) -> Result<Self, HwError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open servo pin {pin}: {e}")))?
            .into_output_low();
        Ok(Self { pin })
    }
}

impl Servo for HardwareServo {
    fn set_angle(&mut self, degrees: u8) -> Result<(), BoxError> {
        self.pin
            .set_pwm(SERVO_PERIOD, servo_pulse_width(degrees))
            .map_err(|e| Box::new(HwError::Pwm(e.to_string())) as BoxError)
    }
}

/// Conveyor motor behind a driver enable line (high = running).
pub struct HardwareConveyor {
    enable: rppal::gpio::OutputPin,
}

impl HardwareConveyor {
    pub fn new(pin: u8) -> Result<Self, HwError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let enable = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open conveyor pin {pin}: {e}")))?
            .into_output_low();
        Ok(Self { enable })
    }
}

impl Motor for HardwareConveyor {
    fn run(&mut self) -> Result<(), BoxError> {
        self.enable.set_high();
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        self.enable.set_low();
        Ok(())
    }
}

impl Drop for HardwareConveyor {
    fn drop(&mut self) {
        self.enable.set_low();
    }
}
