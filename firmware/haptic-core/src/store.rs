//! Duty store shared between the main loop and the waveform interrupt.
//!
//! The main loop owns every write. The interrupt only ever sees a
//! [`LedcDuties`] view. Each slot is one atomic so a single store is the unit
//! of update; there is no way to swap a whole array.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

use log::debug;

use crate::segment::SegmentLayout;
use crate::{MAX_I2C_MOTORS, MAX_LEDC_MOTORS, MAX_MOTORS};

pub struct DutyStore {
    global: [AtomicU16; MAX_MOTORS],
    ledc: [AtomicU8; MAX_LEDC_MOTORS],
    i2c: [AtomicU16; MAX_I2C_MOTORS],
    updated: AtomicBool,
}

impl DutyStore {
    pub const fn new() -> Self {
        Self {
            global: [const { AtomicU16::new(0) }; MAX_MOTORS],
            ledc: [const { AtomicU8::new(0) }; MAX_LEDC_MOTORS],
            i2c: [const { AtomicU16::new(0) }; MAX_I2C_MOTORS],
            updated: AtomicBool::new(false),
        }
    }

    /// Write one global (network index) slot. Out of range writes are ignored.
    pub fn set_global(&self, index: usize, value: u16) -> bool {
        match self.global.get(index) {
            Some(slot) => {
                slot.store(value, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn global(&self, index: usize) -> u16 {
        self.global
            .get(index)
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    pub fn set_ledc(&self, index: usize, duty: u8) {
        if let Some(slot) = self.ledc.get(index) {
            slot.store(duty, Ordering::Relaxed);
        }
    }

    pub fn ledc(&self, index: usize) -> u8 {
        self.ledc
            .get(index)
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    pub fn set_i2c(&self, index: usize, value: u16) {
        if let Some(slot) = self.i2c.get(index) {
            slot.store(value, Ordering::Relaxed);
        }
    }

    pub fn i2c(&self, index: usize) -> u16 {
        self.i2c
            .get(index)
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    /// Set every LEDC slot to the same duty.
    pub fn fill_ledc(&self, duty: u8) {
        for slot in &self.ledc {
            slot.store(duty, Ordering::Relaxed);
        }
    }

    /// Zero the per-driver arrays. Global slots keep the last command.
    pub fn clear_drivers(&self) {
        self.fill_ledc(0);
        for slot in &self.i2c {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Flag that new global values are waiting to be remapped.
    pub fn mark_updated(&self) {
        self.updated.store(true, Ordering::Release);
    }

    /// Consume the updated flag. Returns true at most once per mark.
    pub fn take_updated(&self) -> bool {
        self.updated.swap(false, Ordering::Acquire)
    }

    /// Read-only view of the LEDC array, handed to the waveform generator.
    pub fn ledc_duties(&self) -> LedcDuties<'_> {
        LedcDuties { slots: &self.ledc }
    }

    /// Dump the global and per-driver arrays at debug level.
    pub fn log_duties(&self, layout: &SegmentLayout) {
        let total = layout.total();
        if total == 0 {
            debug!("No configured motors");
            return;
        }
        debug!("All Duty: {}", Slots(&self.global[..total]));
        if layout.i2c() > 0 {
            debug!("I2C Duty: {}", Slots(&self.i2c[..layout.i2c()]));
        }
        if layout.ledc() > 0 {
            debug!("LEDC Duty: {}", Slots(&self.ledc[..layout.ledc()]));
        }
    }
}

impl Default for DutyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only borrow of the LEDC duty slots.
#[derive(Clone, Copy)]
pub struct LedcDuties<'a> {
    slots: &'a [AtomicU8],
}

impl LedcDuties<'_> {
    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        self.slots
            .get(index)
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

trait Slot {
    fn read(&self) -> u16;
}

impl Slot for AtomicU8 {
    fn read(&self) -> u16 {
        self.load(Ordering::Relaxed) as u16
    }
}

impl Slot for AtomicU16 {
    fn read(&self) -> u16 {
        self.load(Ordering::Relaxed)
    }
}

struct Slots<'a, T>(&'a [T]);

impl<T: Slot> fmt::Display for Slots<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, slot) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", slot.read())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_updated_flag_is_one_shot() {
        let store = DutyStore::new();
        assert!(!store.take_updated());
        store.mark_updated();
        assert!(store.take_updated());
        assert!(!store.take_updated());
    }

    #[test]
    fn test_out_of_range_global_write_ignored() {
        let store = DutyStore::new();
        assert!(store.set_global(MAX_MOTORS - 1, 7));
        assert!(!store.set_global(MAX_MOTORS, 7));
        assert_eq!(store.global(MAX_MOTORS - 1), 7);
        assert_eq!(store.global(MAX_MOTORS), 0);
    }

    #[test]
    fn test_ledc_view_tracks_writes() {
        let store = DutyStore::new();
        let view = store.ledc_duties();
        assert_eq!(view.len(), MAX_LEDC_MOTORS);
        assert_eq!(view.get(3), 0);
        store.set_ledc(3, 200);
        assert_eq!(view.get(3), 200);
        assert_eq!(view.get(MAX_LEDC_MOTORS), 0);
    }

    #[test]
    fn test_clear_drivers_keeps_global() {
        let store = DutyStore::new();
        store.set_global(0, 1000);
        store.set_ledc(0, 10);
        store.set_i2c(0, 1000);
        store.clear_drivers();
        assert_eq!(store.global(0), 1000);
        assert_eq!(store.ledc(0), 0);
        assert_eq!(store.i2c(0), 0);
    }

    #[test]
    fn test_slots_display() {
        let store = DutyStore::new();
        store.set_global(0, 1);
        store.set_global(2, 300);
        assert_eq!(format!("{}", Slots(&store.global[..3])), "[1, 0, 300]");
    }
}
