use esp_idf_hal::gpio::AnyOutputPin;
use esp_idf_hal::ledc::config::TimerConfig;
use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver, Resolution, LEDC, TIMER0};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_sys::{EspError, ESP_ERR_INVALID_ARG, ESP_ERR_INVALID_STATE};
use haptic_core::waveform::AnalogOutput;
use log::debug;

#[cfg(any(esp32, esp32s2, esp32s3))]
const CHANNELS: usize = 8;
#[cfg(not(any(esp32, esp32s2, esp32s3)))]
const CHANNELS: usize = 6;

/// Hardware LEDC channels used as 10-bit analog outputs.
///
/// Owns the whole LEDC block so channels can be re-bound to new pins
/// whenever the motor configuration changes. Dropping a channel driver
/// stops its output.
pub struct LedcChannels {
    ledc: LEDC,
    timer: Option<LedcTimerDriver<'static, TIMER0>>,
    frequency_hz: u32,
    drivers: [Option<LedcDriver<'static>>; CHANNELS],
}

impl LedcChannels {
    pub fn new(ledc: LEDC) -> Self {
        Self {
            ledc,
            timer: None,
            frequency_hz: 0,
            drivers: [const { None }; CHANNELS],
        }
    }
}

impl AnalogOutput for LedcChannels {
    type Error = EspError;

    fn channel_limit(&self) -> usize {
        CHANNELS
    }

    fn configure(&mut self, frequency_hz: u32) -> Result<(), EspError> {
        if self.timer.is_some() && frequency_hz == self.frequency_hz {
            return Ok(());
        }
        // channels must let go of the timer before it is rebuilt
        self.drivers.iter_mut().for_each(|driver| *driver = None);
        self.timer = None;

        let config = TimerConfig::default()
            .frequency(frequency_hz.Hz().into())
            .resolution(Resolution::Bits10);
        let timer = unsafe { self.ledc.timer0.clone_unchecked() };
        self.timer = Some(LedcTimerDriver::new(timer, &config)?);
        self.frequency_hz = frequency_hz;
        debug!("LEDC timer at {} Hz, 10 bit", frequency_hz);
        Ok(())
    }

    fn attach(&mut self, channel: usize, pin: u8) -> Result<(), EspError> {
        let Some(timer) = self.timer.as_ref() else {
            return Err(EspError::from_infallible::<ESP_ERR_INVALID_STATE>());
        };
        let pin = unsafe { AnyOutputPin::new(i32::from(pin)) };
        let ledc = &mut self.ledc;
        let driver = unsafe {
            match channel {
                0 => LedcDriver::new(ledc.channel0.clone_unchecked(), timer, pin),
                1 => LedcDriver::new(ledc.channel1.clone_unchecked(), timer, pin),
                2 => LedcDriver::new(ledc.channel2.clone_unchecked(), timer, pin),
                3 => LedcDriver::new(ledc.channel3.clone_unchecked(), timer, pin),
                4 => LedcDriver::new(ledc.channel4.clone_unchecked(), timer, pin),
                5 => LedcDriver::new(ledc.channel5.clone_unchecked(), timer, pin),
                #[cfg(any(esp32, esp32s2, esp32s3))]
                6 => LedcDriver::new(ledc.channel6.clone_unchecked(), timer, pin),
                #[cfg(any(esp32, esp32s2, esp32s3))]
                7 => LedcDriver::new(ledc.channel7.clone_unchecked(), timer, pin),
                _ => return Err(EspError::from_infallible::<ESP_ERR_INVALID_ARG>()),
            }
        }?;
        self.drivers[channel] = Some(driver);
        Ok(())
    }

    fn detach(&mut self, channel: usize) -> Result<(), EspError> {
        if let Some(slot) = self.drivers.get_mut(channel) {
            *slot = None;
        }
        Ok(())
    }

    fn write(&mut self, channel: usize, value: u16) -> Result<(), EspError> {
        match self.drivers.get_mut(channel) {
            Some(Some(driver)) => driver.set_duty(u32::from(value)),
            _ => Err(EspError::from_infallible::<ESP_ERR_INVALID_ARG>()),
        }
    }
}
