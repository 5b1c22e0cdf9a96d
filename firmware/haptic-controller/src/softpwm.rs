use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::timer::{config::Config as TimerConfig, TimerDriver};
use esp_idf_sys::EspError;
use haptic_core::config::MAX_PORT_PIN;
use haptic_core::{GpioPort, LedcDuties, MotorConfig, PinTable, SoftPwm, WaveformGenerator};
use log::{info, warn};

// GPIO output write-1-to-set / write-1-to-clear registers.
#[cfg(esp32)]
const GPIO_OUT_REGS: Option<(usize, usize)> = Some((0x3FF4_4008, 0x3FF4_400C));
#[cfg(any(esp32c3, esp32s3))]
const GPIO_OUT_REGS: Option<(usize, usize)> = Some((0x6000_4008, 0x6000_400C));
#[cfg(not(any(esp32, esp32c3, esp32s3)))]
const GPIO_OUT_REGS: Option<(usize, usize)> = None;

/// Bulk access to GPIO 0..=31 through the W1TS/W1TC registers.
#[derive(Clone, Copy)]
pub struct DirectPort {
    w1ts: usize,
    w1tc: usize,
}

impl DirectPort {
    /// None on chips whose output registers are not mapped here.
    pub fn for_target() -> Option<Self> {
        GPIO_OUT_REGS.map(|(w1ts, w1tc)| Self { w1ts, w1tc })
    }
}

impl GpioPort for DirectPort {
    #[inline(always)]
    fn set_mask(&mut self, mask: u32) {
        // Single store; the register only acts on the bits that are set.
        unsafe { core::ptr::write_volatile(self.w1ts as *mut u32, mask) }
    }

    #[inline(always)]
    fn clear_mask(&mut self, mask: u32) {
        unsafe { core::ptr::write_volatile(self.w1tc as *mut u32, mask) }
    }
}

/// Software PWM driven from a general purpose timer interrupt.
pub struct TimerPwm<'d> {
    timer: TimerDriver<'d>,
    pins: &'static PinTable,
    port: DirectPort,
    /// Keeps the motor pins configured as outputs; dropping one resets it.
    outputs: Vec<PinDriver<'static, AnyOutputPin, Output>>,
}

impl<'d> TimerPwm<'d> {
    /// Install the interrupt handler. The timer stays stopped until the
    /// first [`reinit`](WaveformGenerator::reinit).
    pub fn new(
        timer: impl esp_idf_hal::peripheral::Peripheral<P = impl esp_idf_hal::timer::Timer> + 'd,
        port: DirectPort,
        pins: &'static PinTable,
        duties: LedcDuties<'static>,
    ) -> Result<Self, EspError> {
        let mut timer = TimerDriver::new(timer, &TimerConfig::new().auto_reload(true))?;

        let mut pwm = SoftPwm::new(pins, duties);
        let mut isr_port = port;
        unsafe {
            timer.subscribe(move || {
                pwm.tick(&mut isr_port);
            })?;
        }
        timer.enable_interrupt()?;

        Ok(Self {
            timer,
            pins,
            port,
            outputs: Vec::new(),
        })
    }

    fn stop(&mut self) -> Result<(), EspError> {
        self.timer.enable_alarm(false)?;
        self.timer.enable(false)?;
        Ok(())
    }
}

impl WaveformGenerator for TimerPwm<'_> {
    type Error = EspError;

    fn name(&self) -> &'static str {
        "timer"
    }

    fn channel_limit(&self) -> usize {
        MAX_PORT_PIN as usize + 1
    }

    fn reinit(&mut self, config: &MotorConfig) -> Result<usize, EspError> {
        // Nothing may tick while the tables change.
        self.stop()?;
        let stale = self.pins.mask();
        self.pins.disarm();
        self.port.clear_mask(stale);

        self.outputs.clear();
        for &pin in config.ledc_pins.iter().filter(|&&pin| pin <= MAX_PORT_PIN) {
            let mut output = PinDriver::output(unsafe { AnyOutputPin::new(i32::from(pin)) })?;
            output.set_low()?;
            self.outputs.push(output);
        }
        let driven = self.pins.rebuild(&config.ledc_pins, config.resolution());
        if driven == 0 {
            info!("Soft PWM idle: no LEDC motors");
            return Ok(0);
        }

        let period_us = config.sub_tick_period_us() as u64;
        let alarm = (self.timer.tick_hz() * period_us / 1_000_000).max(1);
        self.timer.set_counter(0)?;
        self.timer.set_alarm(alarm)?;
        self.timer.enable_alarm(true)?;
        self.timer.enable(true)?;

        info!(
            "Soft PWM on {} pins: {} Hz x {} steps, alarm every {} us",
            driven,
            config.ledc_frequency_hz,
            config.resolution(),
            period_us
        );
        if period_us < 10 {
            warn!("Sub-tick period of {} us leaves little time for the main loop", period_us);
        }
        Ok(driven)
    }

    fn service(&mut self, _duties: LedcDuties<'_>) -> Result<(), EspError> {
        Ok(())
    }
}
