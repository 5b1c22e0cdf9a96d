use std::thread::sleep;
use std::time::Duration;

use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2c, I2cConfig, I2cDriver};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_sys::EspError;
use haptic_core::duty::to_pca;
use haptic_core::{I2cDutyWriter, MotorConfig};
use log::info;

/// First PCA9685 on the bus; further boards follow at consecutive addresses.
pub const BASE_ADDRESS: u8 = 0x40;
pub const CHANNELS_PER_CHIP: usize = 16;
pub const MAX_CHIPS: usize = 4;

const OSCILLATOR_HZ: u32 = 25_000_000;

const REG_MODE1: u8 = 0x00;
const REG_MODE2: u8 = 0x01;
const REG_LED0_ON_L: u8 = 0x06;
const REG_PRE_SCALE: u8 = 0xFE;

const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;
const MODE2_OUTDRV: u8 = 0x04;

/// Bit 4 of the ON_H/OFF_H registers forces the output fully on/off.
const FULL_BIT: u16 = 0x1000;

const I2C_TIMEOUT_MS: u64 = 10;

/// Prescale for a PWM frequency, clamped to the chip's 3..=255 range.
pub fn prescale_for(frequency_hz: u16) -> u8 {
    let frequency = u32::from(frequency_hz.max(1));
    let divisor = 4096 * frequency;
    let rounded = (OSCILLATOR_HZ + divisor / 2) / divisor;
    rounded.saturating_sub(1).clamp(3, 255) as u8
}

/// ON_L, ON_H, OFF_L, OFF_H for one channel.
pub fn channel_registers(duty: u16) -> [u8; 4] {
    let (on, off) = match duty {
        0 => (0, FULL_BIT),
        u16::MAX => (FULL_BIT, 0),
        d => (0, to_pca(d)),
    };
    let [on_l, on_h] = on.to_le_bytes();
    let [off_l, off_h] = off.to_le_bytes();
    [on_l, on_h, off_l, off_h]
}

pub fn chips_for(motors: usize) -> usize {
    motors.div_ceil(CHANNELS_PER_CHIP).min(MAX_CHIPS)
}

/// PCA9685 boards sharing one I2C bus.
pub struct PcaBank<'d> {
    i2c: I2cDriver<'d>,
    chips: usize,
}

impl<'d> PcaBank<'d> {
    /// Open the bus on the configured pins. Bus settings are fixed for the
    /// lifetime of the bank.
    pub fn new<I: I2c>(
        i2c: impl Peripheral<P = I> + 'd,
        config: &MotorConfig,
    ) -> Result<Self, EspError> {
        let sda = unsafe { AnyIOPin::new(i32::from(config.i2c_sda)) };
        let scl = unsafe { AnyIOPin::new(i32::from(config.i2c_scl)) };
        let bus = I2cConfig::new().baudrate(config.i2c_speed_hz.Hz());
        let i2c = I2cDriver::new(i2c, sda, scl, &bus)?;
        info!(
            "I2C bus on SDA {} SCL {} at {} Hz",
            config.i2c_sda, config.i2c_scl, config.i2c_speed_hz
        );

        let mut bank = Self { i2c, chips: 0 };
        bank.configure(config)?;
        Ok(bank)
    }

    /// Bring up every board needed for the configured motor count.
    pub fn configure(&mut self, config: &MotorConfig) -> Result<(), EspError> {
        let chips = chips_for(config.i2c_motors as usize);
        let prescale = prescale_for(config.pca_frequency_hz);
        for chip in 0..chips {
            let address = BASE_ADDRESS + chip as u8;
            self.write(address, &[REG_MODE1, MODE1_SLEEP | MODE1_AUTO_INCREMENT])?;
            self.write(address, &[REG_PRE_SCALE, prescale])?;
            self.write(address, &[REG_MODE1, MODE1_AUTO_INCREMENT])?;
            // oscillator needs 500 us after wake
            sleep(Duration::from_millis(1));
            self.write(address, &[REG_MODE2, MODE2_OUTDRV])?;
        }
        self.chips = chips;
        info!(
            "PCA9685 x{} at {} Hz (prescale {})",
            chips, config.pca_frequency_hz, prescale
        );
        Ok(())
    }

    /// Switch off every channel on every configured board.
    pub fn all_off(&mut self) -> Result<(), EspError> {
        let zeros = [0u16; CHANNELS_PER_CHIP * MAX_CHIPS];
        let len = self.chips * CHANNELS_PER_CHIP;
        self.write_duties(&zeros[..len])
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), EspError> {
        self.i2c
            .write(address, bytes, TickType::new_millis(I2C_TIMEOUT_MS).ticks())
    }
}

impl I2cDutyWriter for PcaBank<'_> {
    type Error = EspError;

    fn write_duties(&mut self, duties: &[u16]) -> Result<(), EspError> {
        let mut frame = [0u8; 1 + 4 * CHANNELS_PER_CHIP];
        for (chip, chunk) in duties.chunks(CHANNELS_PER_CHIP).take(self.chips).enumerate() {
            frame[0] = REG_LED0_ON_L;
            for (slot, &duty) in frame[1..].chunks_exact_mut(4).zip(chunk) {
                slot.copy_from_slice(&channel_registers(duty));
            }
            let len = 1 + 4 * chunk.len();
            self.write(BASE_ADDRESS + chip as u8, &frame[..len])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescale() {
        assert_eq!(prescale_for(1500), 3);
        assert_eq!(prescale_for(50), 121);
        assert_eq!(prescale_for(1000), 5);
        // clamped at both ends
        assert_eq!(prescale_for(0), 255);
        assert_eq!(prescale_for(u16::MAX), 3);
    }

    #[test]
    fn test_channel_registers() {
        assert_eq!(channel_registers(0), [0, 0, 0, 0x10]);
        assert_eq!(channel_registers(u16::MAX), [0, 0x10, 0, 0]);
        // 0x8000 >> 4 = 0x0800
        assert_eq!(channel_registers(0x8000), [0, 0, 0x00, 0x08]);
        assert_eq!(channel_registers(0x0fff), [0, 0, 0xff, 0x00]);
    }

    #[test]
    fn test_chips_for() {
        assert_eq!(chips_for(0), 0);
        assert_eq!(chips_for(1), 1);
        assert_eq!(chips_for(16), 1);
        assert_eq!(chips_for(17), 2);
        assert_eq!(chips_for(64), 4);
        assert_eq!(chips_for(200), 4);
    }
}
