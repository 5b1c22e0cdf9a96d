use alloc::vec::Vec;
use core::fmt;

use minicbor::{Decode, Encode};

use crate::bump::BumpPolicy;
use crate::duty::MAX_LEDC_BITS;
use crate::{MAX_I2C_MOTORS, MAX_LEDC_MOTORS};

pub const CONFIG_VERSION: u16 = 1;

/// Highest GPIO number that fits in the 32-bit output port mask.
pub const MAX_PORT_PIN: u8 = 31;

/// Motor configuration snapshot. Replaced only at a reinitialization point.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MotorConfig {
    /// GPIO number per LEDC motor, in LEDC-local index order.
    #[n(0)]
    pub ledc_pins: Vec<u8>,
    /// Number of PCA9685 channels in use.
    #[n(1)]
    pub i2c_motors: u16,
    /// How long a kickstart holds full duty, in microseconds.
    #[n(2)]
    pub bump_time_us: u32,
    /// Commands at or below this (and above zero) kickstart from idle.
    #[n(3)]
    pub bump_start_threshold: u16,
    /// Full PWM cycles per second on the LEDC pins.
    #[n(4)]
    pub ledc_frequency_hz: u32,
    #[n(5)]
    pub ledc_resolution_bits: u8,
    #[n(6)]
    pub i2c_scl: u8,
    #[n(7)]
    pub i2c_sda: u8,
    #[n(8)]
    pub i2c_speed_hz: u32,
    #[n(9)]
    pub pca_frequency_hz: u16,
    #[n(10)]
    pub config_version: u16,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            ledc_pins: Vec::new(),
            i2c_motors: 0,
            bump_time_us: 500_000, // half a second
            bump_start_threshold: 20_000, // ~30%
            ledc_frequency_hz: 300,
            ledc_resolution_bits: 8,
            i2c_scl: 9,
            i2c_sda: 8,
            i2c_speed_hz: 400_000,
            pca_frequency_hz: 1500,
            config_version: CONFIG_VERSION,
        }
    }
}

impl MotorConfig {
    pub fn ledc_motor_count(&self) -> usize {
        self.ledc_pins.len()
    }

    /// LEDC duty width in bits, clamped to what the LEDC array can hold.
    pub fn ledc_bits(&self) -> u8 {
        self.ledc_resolution_bits.clamp(1, MAX_LEDC_BITS)
    }

    /// Phase steps per PWM cycle.
    pub fn resolution(&self) -> u16 {
        1u16 << self.ledc_bits()
    }

    /// Interrupt period for the software PWM, in microseconds (at least 1).
    pub fn sub_tick_period_us(&self) -> u32 {
        let steps = self
            .ledc_frequency_hz
            .max(1)
            .saturating_mul(self.resolution() as u32);
        (1_000_000 / steps).max(1)
    }

    pub fn bump_policy(&self) -> BumpPolicy {
        BumpPolicy {
            threshold: self.bump_start_threshold,
            duration_us: self.bump_time_us,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledc_pins.len() > MAX_LEDC_MOTORS {
            return Err(ConfigError::TooManyLedcMotors(self.ledc_pins.len()));
        }
        if self.i2c_motors as usize > MAX_I2C_MOTORS {
            return Err(ConfigError::TooManyI2cMotors(self.i2c_motors as usize));
        }
        for (i, &pin) in self.ledc_pins.iter().enumerate() {
            if pin > MAX_PORT_PIN {
                return Err(ConfigError::PinOutOfRange(pin));
            }
            if self.ledc_pins[..i].contains(&pin) {
                return Err(ConfigError::DuplicatePin(pin));
            }
        }
        if !(1..=MAX_LEDC_BITS).contains(&self.ledc_resolution_bits) {
            return Err(ConfigError::InvalidResolution(self.ledc_resolution_bits));
        }
        if self.ledc_frequency_hz == 0 {
            return Err(ConfigError::InvalidFrequency);
        }
        Ok(())
    }
}

/// Reasons a configuration snapshot is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    TooManyLedcMotors(usize),
    TooManyI2cMotors(usize),
    PinOutOfRange(u8),
    DuplicatePin(u8),
    InvalidResolution(u8),
    InvalidFrequency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooManyLedcMotors(n) => {
                write!(f, "{} LEDC motors exceeds the limit of {}", n, MAX_LEDC_MOTORS)
            }
            ConfigError::TooManyI2cMotors(n) => {
                write!(f, "{} I2C motors exceeds the limit of {}", n, MAX_I2C_MOTORS)
            }
            ConfigError::PinOutOfRange(pin) => {
                write!(f, "GPIO {} is outside the output port (max {})", pin, MAX_PORT_PIN)
            }
            ConfigError::DuplicatePin(pin) => write!(f, "GPIO {} assigned twice", pin),
            ConfigError::InvalidResolution(bits) => {
                write!(f, "LEDC resolution of {} bits is not in 1..=8", bits)
            }
            ConfigError::InvalidFrequency => f.write_str("LEDC frequency must be nonzero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
