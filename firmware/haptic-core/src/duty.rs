//! Duty unit conversions between the network, LEDC and PCA9685 ranges.
//!
//! All conversions truncate. None of them round.

/// Largest value of the 10-bit LEDC analog fallback.
pub const ANALOG_MAX: u16 = 1023;

/// Widest LEDC duty; the LEDC array holds one byte per motor.
pub const MAX_LEDC_BITS: u8 = 8;

/// Network duty (16 bit) to an LEDC duty of `bits` bits (1..=8). Keeps the
/// top `bits` bits, so at 8 bits this is the high byte.
#[inline]
pub const fn to_ledc(value: u16, bits: u8) -> u8 {
    (value >> (16 - clamp_bits(bits))) as u8
}

/// LEDC duty of `bits` bits to the 10-bit range used by the analog fallback.
#[inline]
pub const fn ledc_to_analog(duty: u8, bits: u8) -> u16 {
    let max = (1u32 << clamp_bits(bits)) - 1;
    let duty = if duty as u32 > max { max } else { duty as u32 };
    (duty * ANALOG_MAX as u32 / max) as u16
}

const fn clamp_bits(bits: u8) -> u8 {
    if bits == 0 {
        1
    } else if bits > MAX_LEDC_BITS {
        MAX_LEDC_BITS
    } else {
        bits
    }
}

/// Network duty (16 bit) to a PCA9685 12-bit off count.
#[inline]
pub const fn to_pca(value: u16) -> u16 {
    value >> 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ledc_truncates_low_byte() {
        assert_eq!(to_ledc(0, 8), 0);
        assert_eq!(to_ledc(0x00ff, 8), 0);
        assert_eq!(to_ledc(0x0100, 8), 1);
        assert_eq!(to_ledc(0x80ff, 8), 0x80);
        assert_eq!(to_ledc(u16::MAX, 8), 255);
    }

    #[test]
    fn test_to_ledc_follows_resolution() {
        assert_eq!(to_ledc(0x8000, 4), 8);
        assert_eq!(to_ledc(u16::MAX, 4), 15);
        assert_eq!(to_ledc(0x0fff, 4), 0);
        assert_eq!(to_ledc(0x8000, 1), 1);
        assert_eq!(to_ledc(0x7fff, 1), 0);
        // out of range widths are clamped
        assert_eq!(to_ledc(u16::MAX, 12), 255);
        assert_eq!(to_ledc(u16::MAX, 0), 1);
    }

    #[test]
    fn test_ledc_to_analog_endpoints() {
        assert_eq!(ledc_to_analog(0, 8), 0);
        assert_eq!(ledc_to_analog(255, 8), 1023);
        // 128 * 1023 / 255 = 513.5
        assert_eq!(ledc_to_analog(128, 8), 513);
    }

    #[test]
    fn test_ledc_to_analog_at_low_resolution() {
        assert_eq!(ledc_to_analog(15, 4), 1023);
        // 8 * 1023 / 15 = 545.6
        assert_eq!(ledc_to_analog(8, 4), 545);
        // a duty wider than the resolution saturates
        assert_eq!(ledc_to_analog(200, 4), 1023);
    }

    #[test]
    fn test_to_pca_range() {
        assert_eq!(to_pca(0), 0);
        assert_eq!(to_pca(0x0010), 1);
        assert_eq!(to_pca(u16::MAX), 4095);
    }
}
