//! Kickstart ("bump") policy for motors commanded to a low duty.
//!
//! A vibration motor at rest will often not spin up on a low duty because of
//! static friction. When a motor leaves zero for a duty at or below the
//! threshold it is driven at [`FULL_DUTY`] for the configured window, then
//! settles to the commanded value. It is kicked at most once per excursion
//! from zero.

use log::debug;

/// Duty emitted while a bump window is open.
pub const FULL_DUTY: u16 = u16::MAX;

/// Shared by every motor on every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpPolicy {
    pub threshold: u16,
    /// Window length. Zero restarts the window on every pass.
    pub duration_us: u32,
}

/// Per-motor bump bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BumpState {
    has_bumped: bool,
    activated_at: Option<u64>,
}

impl BumpState {
    pub const fn new() -> Self {
        Self {
            has_bumped: false,
            activated_at: None,
        }
    }

    pub fn has_bumped(&self) -> bool {
        self.has_bumped
    }

    /// True while a window is open and still needs re-evaluation.
    pub fn is_bumping(&self) -> bool {
        !self.has_bumped && self.activated_at.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Decide the duty to emit for a commanded `value` at `now_us`.
    pub fn resolve(&mut self, value: u16, policy: &BumpPolicy, now_us: u64) -> u16 {
        if value == 0 {
            self.reset();
            return 0;
        }
        if value > policy.threshold {
            self.has_bumped = true;
            self.activated_at = None;
            return value;
        }
        if self.has_bumped {
            return value;
        }

        match self.activated_at {
            // A zero duration never counts as a started window.
            Some(start) if policy.duration_us != 0 => {
                if now_us.saturating_sub(start) < policy.duration_us as u64 {
                    FULL_DUTY
                } else {
                    debug!("Finished bump to: {}", value);
                    self.has_bumped = true;
                    self.activated_at = None;
                    value
                }
            }
            _ => {
                debug!("Starting bump to: {}", value);
                self.activated_at = Some(now_us);
                FULL_DUTY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: BumpPolicy = BumpPolicy {
        threshold: 20_000,
        duration_us: 500_000,
    };

    #[test]
    fn test_low_duty_from_idle_bumps_then_settles() {
        let mut state = BumpState::new();
        assert_eq!(state.resolve(5000, &POLICY, 1_000), FULL_DUTY);
        assert!(state.is_bumping());
        assert_eq!(state.resolve(5000, &POLICY, 250_000), FULL_DUTY);
        assert_eq!(state.resolve(5000, &POLICY, 500_999), FULL_DUTY);
        // window elapsed
        assert_eq!(state.resolve(5000, &POLICY, 501_000), 5000);
        assert!(state.has_bumped());
        assert!(!state.is_bumping());
        // no re-bump at the same duty
        assert_eq!(state.resolve(5000, &POLICY, 2_000_000), 5000);
        assert_eq!(state.resolve(5000, &POLICY, 9_000_000), 5000);
    }

    #[test]
    fn test_every_low_duty_bumps_once_per_excursion() {
        for duty in [1u16, 100, 5000, 19_999, 20_000] {
            let mut state = BumpState::new();
            let mut now = 0;
            let mut passes = 0;
            while state.resolve(duty, &POLICY, now) == FULL_DUTY {
                passes += 1;
                now += 100_000;
            }
            assert_eq!(passes, 5, "duty {}", duty);
            assert_eq!(now, 500_000);
            assert_eq!(state.resolve(duty, &POLICY, now + 1), duty);
        }
    }

    #[test]
    fn test_high_duty_never_bumps() {
        let mut state = BumpState::new();
        assert_eq!(state.resolve(20_001, &POLICY, 0), 20_001);
        assert!(state.has_bumped());

        // also mid-bump
        let mut state = BumpState::new();
        assert_eq!(state.resolve(100, &POLICY, 0), FULL_DUTY);
        assert_eq!(state.resolve(40_000, &POLICY, 10), 40_000);
        assert!(!state.is_bumping());
        // dropping back low does not kick again
        assert_eq!(state.resolve(100, &POLICY, 20), 100);
    }

    #[test]
    fn test_zero_resets_from_any_state() {
        let mut state = BumpState::new();
        assert_eq!(state.resolve(100, &POLICY, 0), FULL_DUTY);
        assert_eq!(state.resolve(0, &POLICY, 10), 0);
        assert_eq!(state, BumpState::new());

        state.resolve(30_000, &POLICY, 20);
        assert!(state.has_bumped());
        assert_eq!(state.resolve(0, &POLICY, 30), 0);
        assert!(!state.has_bumped());

        // re-armed: the next low command kicks again
        assert_eq!(state.resolve(100, &POLICY, 40), FULL_DUTY);
    }

    #[test]
    fn test_threshold_is_inclusive_for_bump() {
        let mut state = BumpState::new();
        assert_eq!(state.resolve(POLICY.threshold, &POLICY, 0), FULL_DUTY);
    }

    // Pinned behaviour: a zero duration does not disable kickstart. It counts
    // as "no window started", so the window restarts on every pass and the
    // motor is held at full duty until it goes to zero or above the threshold.
    #[test]
    fn test_zero_duration_restarts_window_every_pass() {
        let policy = BumpPolicy {
            threshold: 20_000,
            duration_us: 0,
        };
        let mut state = BumpState::new();
        for now in [0u64, 1, 1_000, 10_000_000] {
            assert_eq!(state.resolve(5000, &policy, now), FULL_DUTY);
            assert!(state.is_bumping());
        }
        assert_eq!(state.resolve(25_000, &policy, 10_000_001), 25_000);
        assert_eq!(state.resolve(5000, &policy, 10_000_002), 5000);
    }

    #[test]
    fn test_clock_going_backwards_keeps_bumping() {
        let mut state = BumpState::new();
        assert_eq!(state.resolve(100, &POLICY, 1_000_000), FULL_DUTY);
        assert_eq!(state.resolve(100, &POLICY, 0), FULL_DUTY);
    }
}
