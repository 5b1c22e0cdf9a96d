//! Software PWM for the direct GPIO motors.
//!
//! [`SoftPwm::tick`] runs from a periodic timer interrupt, `resolution` times
//! per PWM cycle. Each tick compares every motor's duty against one shared
//! phase, collects the results into a set-mask and a clear-mask, and writes
//! both to the port in two bulk operations. A motor with duty `d` is high for
//! phases `0..d` and low for the rest of the cycle.
//!
//! Targets without register-level port access use [`AnalogPwm`] instead,
//! which hands each pin to a hardware duty channel and is refreshed from the
//! main loop. Both implement [`WaveformGenerator`].

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use log::{info, warn};

use crate::config::{MotorConfig, MAX_PORT_PIN};
use crate::duty::{ledc_to_analog, MAX_LEDC_BITS};
use crate::store::LedcDuties;
use crate::MAX_LEDC_MOTORS;

/// Bulk write access to a GPIO output port. Must be callable from interrupt
/// context.
pub trait GpioPort {
    /// Drive every pin whose bit is set high.
    fn set_mask(&mut self, mask: u32);
    /// Drive every pin whose bit is set low.
    fn clear_mask(&mut self, mask: u32);
}

/// A waveform strategy, chosen once at startup.
pub trait WaveformGenerator {
    type Error;

    fn name(&self) -> &'static str;

    /// Most channels this generator can drive.
    fn channel_limit(&self) -> usize;

    /// Rebuild driver tables for a new configuration. Main loop only.
    /// Returns how many motors are driven afterwards.
    fn reinit(&mut self, config: &MotorConfig) -> Result<usize, Self::Error>;

    /// Per-pass main loop hook.
    fn service(&mut self, duties: LedcDuties<'_>) -> Result<(), Self::Error>;
}

/// Shared phase counter, cycling `0..resolution`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseAccumulator {
    phase: u16,
}

impl PhaseAccumulator {
    pub const fn new() -> Self {
        Self { phase: 0 }
    }

    #[inline]
    pub fn phase(&self) -> u16 {
        self.phase
    }

    #[inline]
    pub fn advance(&mut self, resolution: u16) {
        self.phase += 1;
        if self.phase >= resolution {
            self.phase = 0;
        }
    }
}

/// Port bit per LEDC motor, read by the interrupt.
///
/// Rebuilt only from the main loop. While disarmed the interrupt does not
/// touch the port, so the rebuild never races a tick.
pub struct PinTable {
    bits: [AtomicU32; MAX_LEDC_MOTORS],
    len: AtomicUsize,
    resolution: AtomicU32,
    armed: AtomicBool,
}

impl PinTable {
    pub const fn new() -> Self {
        Self {
            bits: [const { AtomicU32::new(0) }; MAX_LEDC_MOTORS],
            len: AtomicUsize::new(0),
            resolution: AtomicU32::new(256),
            armed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn bit(&self, motor: usize) -> u32 {
        self.bits
            .get(motor)
            .map_or(0, |bit| bit.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn resolution(&self) -> u16 {
        self.resolution.load(Ordering::Relaxed) as u16
    }

    /// Every pin currently in the table.
    pub fn mask(&self) -> u32 {
        (0..self.len()).fold(0, |mask, motor| mask | self.bit(motor))
    }

    /// Disarm, load a new pin list, re-arm. Pins outside the port keep their
    /// motor slot but are never driven. Returns the number of driven pins.
    pub fn rebuild(&self, pins: &[u8], resolution: u16) -> usize {
        self.disarm();

        let pins = &pins[..pins.len().min(MAX_LEDC_MOTORS)];
        let mut driven = 0;
        for (motor, &pin) in pins.iter().enumerate() {
            let bit = if pin <= MAX_PORT_PIN {
                driven += 1;
                1u32 << pin
            } else {
                warn!("LEDC motor {} on GPIO {} is outside the port, not driven", motor, pin);
                0
            };
            self.bits[motor].store(bit, Ordering::Relaxed);
        }
        for bit in &self.bits[pins.len()..] {
            bit.store(0, Ordering::Relaxed);
        }
        self.len.store(pins.len(), Ordering::Relaxed);
        self.resolution.store(resolution.max(1) as u32, Ordering::Relaxed);

        self.armed.store(true, Ordering::Release);
        driven
    }
}

impl Default for PinTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one comparison pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortMasks {
    pub set: u32,
    pub clear: u32,
}

/// Interrupt-side PWM state. Holds only read-only views of shared tables.
pub struct SoftPwm<'a> {
    pins: &'a PinTable,
    duties: LedcDuties<'a>,
    phase: PhaseAccumulator,
}

impl<'a> SoftPwm<'a> {
    pub fn new(pins: &'a PinTable, duties: LedcDuties<'a>) -> Self {
        Self {
            pins,
            duties,
            phase: PhaseAccumulator::new(),
        }
    }

    pub fn phase(&self) -> u16 {
        self.phase.phase()
    }

    /// Compare every motor against the current phase.
    #[inline]
    pub fn compute(&self) -> PortMasks {
        let phase = self.phase.phase();
        let mut masks = PortMasks::default();
        for motor in 0..self.pins.len() {
            let bit = self.pins.bit(motor);
            if self.duties.get(motor) as u16 > phase {
                masks.set |= bit;
            } else {
                masks.clear |= bit;
            }
        }
        masks
    }

    /// One sub-tick. Returns false (and leaves the port alone) while the pin
    /// table is disarmed.
    #[inline]
    pub fn tick<P: GpioPort>(&mut self, port: &mut P) -> bool {
        if !self.pins.is_armed() {
            return false;
        }
        let masks = self.compute();
        port.set_mask(masks.set);
        port.clear_mask(masks.clear);
        self.phase.advance(self.pins.resolution());
        true
    }
}

/// Hardware duty-to-analog channels used by the fallback generator.
pub trait AnalogOutput {
    type Error;

    /// Number of hardware channels available.
    fn channel_limit(&self) -> usize;
    fn configure(&mut self, frequency_hz: u32) -> Result<(), Self::Error>;
    fn attach(&mut self, channel: usize, pin: u8) -> Result<(), Self::Error>;
    fn detach(&mut self, channel: usize) -> Result<(), Self::Error>;
    /// Write a 10-bit duty.
    fn write(&mut self, channel: usize, value: u16) -> Result<(), Self::Error>;
}

/// Fallback generator: one hardware channel per motor, capped at the
/// platform's channel count.
pub struct AnalogPwm<O> {
    output: O,
    attached: usize,
    /// LEDC duty width the stored duties are expressed in.
    bits: u8,
    last: [Option<u16>; MAX_LEDC_MOTORS],
}

impl<O: AnalogOutput> AnalogPwm<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            attached: 0,
            bits: MAX_LEDC_BITS,
            last: [None; MAX_LEDC_MOTORS],
        }
    }

    pub fn attached(&self) -> usize {
        self.attached
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}

impl<O: AnalogOutput> WaveformGenerator for AnalogPwm<O> {
    type Error = O::Error;

    fn name(&self) -> &'static str {
        "analog"
    }

    fn channel_limit(&self) -> usize {
        self.output.channel_limit().min(MAX_LEDC_MOTORS)
    }

    fn reinit(&mut self, config: &MotorConfig) -> Result<usize, Self::Error> {
        for channel in 0..self.attached {
            self.output.detach(channel)?;
        }
        self.attached = 0;
        self.last = [None; MAX_LEDC_MOTORS];
        self.bits = config.ledc_bits();

        let wanted = config.ledc_pins.len();
        let limit = self.channel_limit();
        if wanted > limit {
            warn!(
                "Analog PWM drives at most {} channels, {} configured; motors {}.. are not driven",
                limit, wanted, limit
            );
        }

        self.output.configure(config.ledc_frequency_hz)?;
        for (channel, &pin) in config.ledc_pins.iter().take(limit).enumerate() {
            self.output.attach(channel, pin)?;
            self.output.write(channel, 0)?;
            self.last[channel] = Some(0);
            self.attached += 1;
        }
        info!("Analog PWM on {} channels", self.attached);
        Ok(self.attached)
    }

    fn service(&mut self, duties: LedcDuties<'_>) -> Result<(), Self::Error> {
        for channel in 0..self.attached {
            let value = ledc_to_analog(duties.get(channel), self.bits);
            if self.last[channel] != Some(value) {
                self.output.write(channel, value)?;
                self.last[channel] = Some(value);
            }
        }
        Ok(())
    }
}
