//! Split of the global motor index space into per-driver segments.
//!
//! ```text
//! ledc = 2, i2c = 4, six values transmitted
//!
//! global  0  1  2  3  4  5
//!         [0, 1]------------- ledc
//!         ------[0, 1, 2, 3]- i2c
//! ```

use log::warn;

use crate::config::MotorConfig;
use crate::{MAX_I2C_MOTORS, MAX_LEDC_MOTORS};

/// Physical driver kind behind a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorBank {
    Ledc,
    I2c,
}

impl MotorBank {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotorBank::Ledc => "ledc",
            MotorBank::I2c => "i2c",
        }
    }
}

/// Segment sizes. LEDC motors come first in the global index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentLayout {
    ledc: usize,
    i2c: usize,
}

impl SegmentLayout {
    /// Build a layout, capping each segment at its driver's capacity.
    pub fn new(ledc: usize, i2c: usize) -> Self {
        if ledc > MAX_LEDC_MOTORS {
            warn!("{} LEDC motors configured, driving {}", ledc, MAX_LEDC_MOTORS);
        }
        if i2c > MAX_I2C_MOTORS {
            warn!("{} I2C motors configured, driving {}", i2c, MAX_I2C_MOTORS);
        }
        Self {
            ledc: ledc.min(MAX_LEDC_MOTORS),
            i2c: i2c.min(MAX_I2C_MOTORS),
        }
    }

    pub fn from_config(config: &MotorConfig) -> Self {
        Self::new(config.ledc_pins.len(), config.i2c_motors as usize)
    }

    pub fn ledc(&self) -> usize {
        self.ledc
    }

    pub fn i2c(&self) -> usize {
        self.i2c
    }

    pub fn len(&self, bank: MotorBank) -> usize {
        match bank {
            MotorBank::Ledc => self.ledc,
            MotorBank::I2c => self.i2c,
        }
    }

    pub fn total(&self) -> usize {
        self.ledc + self.i2c
    }

    /// Map a global index to its driver and driver-local index.
    pub fn locate(&self, global: usize) -> Option<(MotorBank, usize)> {
        if global < self.ledc {
            Some((MotorBank::Ledc, global))
        } else if global < self.total() {
            Some((MotorBank::I2c, global - self.ledc))
        } else {
            None
        }
    }

    /// Inverse of [`locate`](Self::locate).
    pub fn global_index(&self, bank: MotorBank, local: usize) -> Option<usize> {
        if local >= self.len(bank) {
            return None;
        }
        match bank {
            MotorBank::Ledc => Some(local),
            MotorBank::I2c => Some(self.ledc + local),
        }
    }
}
