//! Main-loop side of the pipeline: remap global duties into the per-driver
//! arrays through the bump policy, and push the I2C segment to its driver.

use log::debug;

use crate::bump::{BumpPolicy, BumpState};
use crate::config::MotorConfig;
use crate::duty::to_ledc;
use crate::segment::{MotorBank, SegmentLayout};
use crate::store::DutyStore;
use crate::waveform::WaveformGenerator;
use crate::{MAX_I2C_MOTORS, MAX_MOTORS};

/// Something that accepts a duty for a driver-local index.
pub trait DutySink {
    fn apply(&mut self, local: usize, duty: u16);
}

/// Writes into the LEDC array at the configured duty width, truncating.
pub struct LedcSink<'a> {
    pub store: &'a DutyStore,
    pub bits: u8,
}

impl DutySink for LedcSink<'_> {
    fn apply(&mut self, local: usize, duty: u16) {
        self.store.set_ledc(local, to_ledc(duty, self.bits));
    }
}

/// Writes into the 16-bit I2C array.
pub struct I2cSink<'a>(pub &'a DutyStore);

impl DutySink for I2cSink<'_> {
    fn apply(&mut self, local: usize, duty: u16) {
        self.0.set_i2c(local, duty);
    }
}

/// The PCA9685 side. Receives the whole I2C segment in local index order.
pub trait I2cDutyWriter {
    type Error;

    fn write_duties(&mut self, duties: &[u16]) -> Result<(), Self::Error>;
}

/// Run one motor through the bump policy and hand the result to its driver.
pub fn actuate<S: DutySink>(
    sink: &mut S,
    local: usize,
    value: u16,
    state: &mut BumpState,
    policy: &BumpPolicy,
    now_us: u64,
) {
    let duty = state.resolve(value, policy, now_us);
    sink.apply(local, duty);
}

/// Outcome of [`DutyScheduler::reinit`] once the generator has switched.
#[derive(Debug)]
pub struct Reinit<E> {
    /// LEDC motors the generator drives.
    pub driven: usize,
    pub i2c: Result<(), E>,
}

pub struct DutyScheduler {
    layout: SegmentLayout,
    policy: BumpPolicy,
    ledc_bits: u8,
    bumps: [BumpState; MAX_MOTORS],
    /// Last list handed to the I2C writer; `None` forces the next flush.
    flushed: Option<([u16; MAX_I2C_MOTORS], usize)>,
}

impl DutyScheduler {
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            layout: SegmentLayout::from_config(config),
            policy: config.bump_policy(),
            ledc_bits: config.ledc_bits(),
            bumps: [BumpState::new(); MAX_MOTORS],
            flushed: None,
        }
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn policy(&self) -> &BumpPolicy {
        &self.policy
    }

    pub fn bump_state(&self, global: usize) -> Option<&BumpState> {
        self.bumps.get(global)
    }

    /// Swap in a new configuration. Re-arms every motor and zeroes the
    /// per-driver arrays; the caller remaps afterwards.
    pub fn reconfigure(&mut self, config: &MotorConfig, store: &DutyStore) {
        self.layout = SegmentLayout::from_config(config);
        self.policy = config.bump_policy();
        self.ledc_bits = config.ledc_bits();
        self.bumps = [BumpState::new(); MAX_MOTORS];
        self.flushed = None;
        store.clear_drivers();
        store.mark_updated();
    }

    /// Rebuild the waveform generator, then the scheduler, then the I2C side.
    ///
    /// A generator error leaves everything on the old configuration. Once
    /// the generator has switched, the scheduler always follows it, and an
    /// I2C bring-up error is handed back in [`Reinit::i2c`] instead.
    pub fn reinit<G, E>(
        &mut self,
        config: &MotorConfig,
        store: &DutyStore,
        generator: &mut G,
        i2c: impl FnOnce(&MotorConfig) -> Result<(), E>,
    ) -> Result<Reinit<E>, G::Error>
    where
        G: WaveformGenerator + ?Sized,
    {
        let driven = generator.reinit(config)?;
        self.reconfigure(config, store);
        let i2c = i2c(config);
        Ok(Reinit { driven, i2c })
    }

    /// Forget the last I2C frame so the next flush rewrites it.
    pub fn invalidate_i2c(&mut self) {
        self.flushed = None;
    }

    /// True while any motor has an open bump window.
    pub fn pending_bumps(&self) -> bool {
        self.bumps[..self.layout.total()]
            .iter()
            .any(BumpState::is_bumping)
    }

    /// Remap when new values arrived or a bump window needs re-evaluating.
    /// Returns whether a pass ran.
    pub fn poll(&mut self, store: &DutyStore, now_us: u64) -> bool {
        let updated = store.take_updated();
        if updated || self.pending_bumps() {
            self.remap(store, now_us);
            true
        } else {
            false
        }
    }

    /// Push every global slot through the bump policy into its driver array.
    /// Each slot is written on its own.
    pub fn remap(&mut self, store: &DutyStore, now_us: u64) {
        let mut ledc = LedcSink {
            store,
            bits: self.ledc_bits,
        };
        let mut i2c = I2cSink(store);
        for global in 0..self.layout.total() {
            let value = store.global(global);
            let state = &mut self.bumps[global];
            match self.layout.locate(global) {
                Some((MotorBank::Ledc, local)) => {
                    actuate(&mut ledc, local, value, state, &self.policy, now_us)
                }
                Some((MotorBank::I2c, local)) => {
                    actuate(&mut i2c, local, value, state, &self.policy, now_us)
                }
                None => {}
            }
        }
    }

    /// Hand the I2C segment to the writer if it changed since the last
    /// successful write. Returns whether the writer was called.
    pub fn flush_i2c<W: I2cDutyWriter>(
        &mut self,
        store: &DutyStore,
        writer: &mut W,
    ) -> Result<bool, W::Error> {
        let len = self.layout.i2c();
        if len == 0 {
            return Ok(false);
        }

        let mut duties = [0u16; MAX_I2C_MOTORS];
        for (local, duty) in duties[..len].iter_mut().enumerate() {
            *duty = store.i2c(local);
        }
        if let Some((last, last_len)) = &self.flushed {
            if *last_len == len && last[..len] == duties[..len] {
                return Ok(false);
            }
        }

        writer.write_duties(&duties[..len])?;
        debug!("Flushed {} I2C duties", len);
        self.flushed = Some((duties, len));
        Ok(true)
    }
}
