//! Decoding of packed hexadecimal duty payloads.
//!
//! A payload is a run of [`MOTOR_CHAR_NUM`]-character hex numbers, most
//! significant digit first, one per motor in ascending global index. A
//! trailing partial chunk is dropped without complaint.

use core::slice::ChunksExact;

use crate::store::DutyStore;
use crate::{MAX_MOTORS, MOTOR_CHAR_NUM};

/// Iterator over the duty values packed in a payload.
pub struct HexDuties<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for HexDuties<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        self.chunks.next().map(parse_chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for HexDuties<'_> {}

pub fn decode_duties(payload: &str) -> HexDuties<'_> {
    HexDuties {
        chunks: payload.as_bytes().chunks_exact(MOTOR_CHAR_NUM),
    }
}

/// Parse the leading hex digits of a chunk. Parsing stops at the first
/// non-hex byte; a chunk without a leading digit is zero.
pub fn parse_chunk(chunk: &[u8]) -> u16 {
    let mut value: u16 = 0;
    for &byte in chunk {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => break,
        };
        value = (value << 4) | digit as u16;
    }
    value
}

/// Decode a payload into the global slots and flag the store as updated.
///
/// Values beyond the store's capacity are dropped. Returns how many slots
/// were written.
pub fn store_payload(store: &DutyStore, payload: &str) -> usize {
    let mut written = 0;
    for (index, value) in decode_duties(payload).take(MAX_MOTORS).enumerate() {
        store.set_global(index, value);
        written += 1;
    }
    store.mark_updated();
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec::Vec;

    #[test]
    fn test_decode_big_endian_chunks() {
        let values: Vec<u16> = decode_duties("0000ffff8000").collect();
        assert_eq!(values, [0x0000, 0xffff, 0x8000]);
    }

    #[test]
    fn test_mixed_case_hex() {
        let values: Vec<u16> = decode_duties("AbCd4e20").collect();
        assert_eq!(values, [0xabcd, 0x4e20]);
    }

    #[test]
    fn test_trailing_partial_chunk_dropped() {
        // 9 characters: two whole chunks, one stray character
        let values: Vec<u16> = decode_duties("12345678f").collect();
        assert_eq!(values, [0x1234, 0x5678]);
        assert_eq!(decode_duties("12345678f").len(), 2);
    }

    #[test]
    fn test_short_payload_decodes_nothing() {
        assert_eq!(decode_duties("").count(), 0);
        assert_eq!(decode_duties("fff").count(), 0);
    }

    #[test]
    fn test_chunk_stops_at_invalid_digit() {
        assert_eq!(parse_chunk(b"12G4"), 0x12);
        assert_eq!(parse_chunk(b"zzzz"), 0);
        assert_eq!(parse_chunk(b"00ff"), 0xff);
    }

    #[test]
    fn test_store_payload_writes_and_flags() {
        let store = DutyStore::new();
        let written = store_payload(&store, "0001000200");
        assert_eq!(written, 2);
        assert_eq!(store.global(0), 1);
        assert_eq!(store.global(1), 2);
        assert_eq!(store.global(2), 0);
        assert!(store.take_updated());
    }

    #[test]
    fn test_store_payload_caps_at_capacity() {
        let store = DutyStore::new();
        let payload: String = core::iter::repeat("0101").take(MAX_MOTORS + 3).collect();
        assert_eq!(store_payload(&store, &payload), MAX_MOTORS);
        assert_eq!(store.global(MAX_MOTORS - 1), 0x0101);
    }

    #[test]
    fn test_same_payload_is_idempotent() {
        let store = DutyStore::new();
        store_payload(&store, "00ff1000");
        let first: Vec<u16> = (0..4).map(|i| store.global(i)).collect();
        store_payload(&store, "00ff1000");
        let second: Vec<u16> = (0..4).map(|i| store.global(i)).collect();
        assert_eq!(first, second);
    }
}
