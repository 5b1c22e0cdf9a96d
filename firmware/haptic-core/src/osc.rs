//! Minimal OSC 1.0 message reader for the motor and config addresses.
//!
//! Only single messages with `s`, `b` and `i` arguments are understood.
//! Bundles are rejected.

use alloc::vec::Vec;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscArg<'a> {
    Str(&'a str),
    Blob(&'a [u8]),
    Int(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscMessage<'a> {
    pub address: &'a str,
    pub args: Vec<OscArg<'a>>,
}

impl<'a> OscMessage<'a> {
    pub fn parse(packet: &'a [u8]) -> Result<Self, OscError> {
        if packet.starts_with(b"#bundle") {
            return Err(OscError::Bundle);
        }
        let (address, mut pos) = read_str(packet, 0)?;
        if !address.starts_with('/') {
            return Err(OscError::BadAddress);
        }

        // Old senders may omit the type tag string entirely.
        if pos == packet.len() {
            return Ok(Self {
                address,
                args: Vec::new(),
            });
        }
        let (tags, next) = read_str(packet, pos)?;
        pos = next;
        let tags = tags.strip_prefix(',').ok_or(OscError::BadTypeTags)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.bytes() {
            let arg = match tag {
                b's' => {
                    let (s, next) = read_str(packet, pos)?;
                    pos = next;
                    OscArg::Str(s)
                }
                b'i' => {
                    let value = read_i32(packet, pos)?;
                    pos += 4;
                    OscArg::Int(value)
                }
                b'b' => {
                    let len = read_i32(packet, pos)?;
                    let len = usize::try_from(len).map_err(|_| OscError::Truncated)?;
                    let start = pos + 4;
                    let end = start.checked_add(len).ok_or(OscError::Truncated)?;
                    let blob = packet.get(start..end).ok_or(OscError::Truncated)?;
                    pos = start + padded(len);
                    OscArg::Blob(blob)
                }
                other => return Err(OscError::UnsupportedType(other as char)),
            };
            args.push(arg);
        }
        Ok(Self { address, args })
    }

    pub fn first_str(&self) -> Option<&'a str> {
        self.args.iter().find_map(|arg| match arg {
            OscArg::Str(s) => Some(*s),
            _ => None,
        })
    }

    pub fn first_blob(&self) -> Option<&'a [u8]> {
        self.args.iter().find_map(|arg| match arg {
            OscArg::Blob(b) => Some(*b),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscError {
    Truncated,
    MissingTerminator,
    NotUtf8,
    BadAddress,
    BadTypeTags,
    UnsupportedType(char),
    Bundle,
}

impl fmt::Display for OscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscError::Truncated => f.write_str("packet truncated"),
            OscError::MissingTerminator => f.write_str("string without terminator"),
            OscError::NotUtf8 => f.write_str("string is not UTF-8"),
            OscError::BadAddress => f.write_str("address must start with '/'"),
            OscError::BadTypeTags => f.write_str("type tags must start with ','"),
            OscError::UnsupportedType(tag) => write!(f, "unsupported argument type '{}'", tag),
            OscError::Bundle => f.write_str("bundles are not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OscError {}

/// Size of `len` bytes rounded up to the 4-byte OSC boundary.
fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Read a null-terminated, 4-byte padded string starting at `pos`.
fn read_str(packet: &[u8], pos: usize) -> Result<(&str, usize), OscError> {
    let rest = packet.get(pos..).ok_or(OscError::Truncated)?;
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(OscError::MissingTerminator)?;
    let s = core::str::from_utf8(&rest[..nul]).map_err(|_| OscError::NotUtf8)?;
    let next = pos + padded(nul + 1);
    if next > packet.len() {
        return Err(OscError::Truncated);
    }
    Ok((s, next))
}

fn read_i32(packet: &[u8], pos: usize) -> Result<i32, OscError> {
    let bytes = packet.get(pos..pos + 4).ok_or(OscError::Truncated)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_str(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    #[test]
    fn test_parse_motor_string() {
        let mut packet = Vec::new();
        push_str(&mut packet, "/h");
        push_str(&mut packet, ",s");
        push_str(&mut packet, "0000ffff8000");

        let msg = OscMessage::parse(&packet).unwrap();
        assert_eq!(msg.address, "/h");
        assert_eq!(msg.first_str(), Some("0000ffff8000"));
        assert_eq!(msg.first_blob(), None);
    }

    #[test]
    fn test_parse_string_on_padding_boundary() {
        // "/abc" is exactly 4 bytes so it needs a full word of padding
        let mut packet = Vec::new();
        push_str(&mut packet, "/abc");
        assert_eq!(packet.len(), 8);
        push_str(&mut packet, ",si");
        push_str(&mut packet, "1234");
        packet.extend_from_slice(&(-2i32).to_be_bytes());

        let msg = OscMessage::parse(&packet).unwrap();
        assert_eq!(msg.args, [OscArg::Str("1234"), OscArg::Int(-2)]);
    }

    #[test]
    fn test_parse_blob() {
        let mut packet = Vec::new();
        push_str(&mut packet, "/config");
        push_str(&mut packet, ",b");
        packet.extend_from_slice(&5i32.to_be_bytes());
        packet.extend_from_slice(&[1, 2, 3, 4, 5, 0, 0, 0]);

        let msg = OscMessage::parse(&packet).unwrap();
        assert_eq!(msg.first_blob(), Some(&[1u8, 2, 3, 4, 5][..]));
    }

    #[test]
    fn test_missing_type_tags_means_no_args() {
        let mut packet = Vec::new();
        push_str(&mut packet, "/ping");
        let msg = OscMessage::parse(&packet).unwrap();
        assert!(msg.args.is_empty());
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(OscMessage::parse(b"#bundle\0"), Err(OscError::Bundle));
        assert_eq!(OscMessage::parse(b"h\0\0\0"), Err(OscError::BadAddress));
        assert_eq!(OscMessage::parse(b"/h"), Err(OscError::MissingTerminator));
        assert_eq!(OscMessage::parse(b"/h\0"), Err(OscError::Truncated));

        let mut packet = Vec::new();
        push_str(&mut packet, "/h");
        push_str(&mut packet, ",f");
        packet.extend_from_slice(&[0; 4]);
        assert_eq!(OscMessage::parse(&packet), Err(OscError::UnsupportedType('f')));

        let mut packet = Vec::new();
        push_str(&mut packet, "/h");
        push_str(&mut packet, ",b");
        packet.extend_from_slice(&64i32.to_be_bytes());
        packet.extend_from_slice(&[0; 4]);
        assert_eq!(OscMessage::parse(&packet), Err(OscError::Truncated));
    }
}
