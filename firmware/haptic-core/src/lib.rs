#![cfg_attr(not(feature = "std"), no_std)]

//! Motor actuation core for the haptics firmware.
//!
//! Everything here is hardware-free so it can be tested on the host. The
//! controller binary supplies the GPIO port, the analog fallback channels and
//! the PCA9685 writer through the traits in [`waveform`] and [`flush`].

extern crate alloc;

pub mod bump;
pub mod config;
pub mod decode;
pub mod duty;
pub mod flush;
pub mod osc;
pub mod segment;
pub mod store;
pub mod waveform;

pub use bump::{BumpPolicy, BumpState, FULL_DUTY};
pub use config::{ConfigError, MotorConfig};
pub use flush::{DutyScheduler, I2cDutyWriter};
pub use segment::{MotorBank, SegmentLayout};
pub use store::{DutyStore, LedcDuties};
pub use waveform::{GpioPort, PinTable, SoftPwm, WaveformGenerator};

/// Motors reachable through direct GPIO lines.
pub const MAX_LEDC_MOTORS: usize = 64;
/// Motors reachable through PCA9685 channels.
pub const MAX_I2C_MOTORS: usize = 64;
/// Size of the global (network) index space.
pub const MAX_MOTORS: usize = MAX_LEDC_MOTORS + MAX_I2C_MOTORS;

/// Hex characters per motor in an inbound duty payload.
pub const MOTOR_CHAR_NUM: usize = 4;

/// UDP port the controller listens on for OSC traffic.
pub const RECEIVE_PORT: u16 = 1027;
/// OSC address carrying packed duty strings.
pub const MOTOR_ADDRESS: &str = "/h";
/// OSC address carrying a CBOR encoded [`MotorConfig`].
pub const CONFIG_ADDRESS: &str = "/config";
