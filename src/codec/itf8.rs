//! ITF8 variable-length integers
//!
//! The number of leading one-bits in the first byte selects the total width:
//!
//! | prefix      | bytes | payload bits |
//! |-------------|-------|--------------|
//! | `0xxxxxxx`  | 1     | 7            |
//! | `10xxxxxx`  | 2     | 14           |
//! | `110xxxxx`  | 3     | 21           |
//! | `1110xxxx`  | 4     | 28           |
//! | `1111xxxx`  | 5     | 32           |
//!
//! The 5-byte form stores the top nibble in the first byte and the bottom
//! nibble in the low 4 bits of the last byte. Signed values are written as
//! their two's-complement bit pattern, so every negative number takes 5 bytes.

use std::io::{ErrorKind, Read, Write};

use crate::error::{CodecError, Result};

/// Largest number of bytes a single value can occupy
pub const MAX_LEN: usize = 5;

/// Number of bytes `value` occupies once encoded
pub fn encoded_len(value: u32) -> usize {
    if value >> 7 == 0 {
        1
    } else if value >> 14 == 0 {
        2
    } else if value >> 21 == 0 {
        3
    } else if value >> 28 == 0 {
        4
    } else {
        5
    }
}

/// Total width of a value announced by its leading byte
fn len_from_prefix(first: u8) -> usize {
    match first.leading_ones() {
        0 => 1,
        1 => 2,
        2 => 3,
        3 => 4,
        _ => 5,
    }
}

/// Appends the encoding of `value` to `buf` and returns the number of bytes written
pub fn encode(value: u32, buf: &mut Vec<u8>) -> usize {
    let len = encoded_len(value);
    match len {
        1 => buf.push(value as u8),
        2 => buf.extend_from_slice(&[((value >> 8) | 0x80) as u8, value as u8]),
        3 => buf.extend_from_slice(&[
            ((value >> 16) | 0xC0) as u8,
            (value >> 8) as u8,
            value as u8,
        ]),
        4 => buf.extend_from_slice(&[
            ((value >> 24) | 0xE0) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]),
        _ => buf.extend_from_slice(&[
            ((value >> 28) | 0xF0) as u8,
            (value >> 20) as u8,
            (value >> 12) as u8,
            (value >> 4) as u8,
            (value & 0x0F) as u8,
        ]),
    }
    len
}

/// Appends the two's-complement encoding of a signed value
#[allow(clippy::cast_sign_loss)]
pub fn encode_signed(value: i32, buf: &mut Vec<u8>) -> usize {
    encode(value as u32, buf)
}

/// Decodes one value from the front of `bytes`
///
/// Returns the value and the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(u32, usize)> {
    let Some(&first) = bytes.first() else {
        return Err(CodecError::MalformedVarInt {
            needed: 1,
            available: 0,
        }
        .into());
    };
    let len = len_from_prefix(first);
    if bytes.len() < len {
        return Err(CodecError::MalformedVarInt {
            needed: len,
            available: bytes.len(),
        }
        .into());
    }
    let b = |i: usize| u32::from(bytes[i]);
    let value = match len {
        1 => b(0),
        2 => ((b(0) & 0x3F) << 8) | b(1),
        3 => ((b(0) & 0x1F) << 16) | (b(1) << 8) | b(2),
        4 => ((b(0) & 0x0F) << 24) | (b(1) << 16) | (b(2) << 8) | b(3),
        _ => ((b(0) & 0x0F) << 28) | (b(1) << 20) | (b(2) << 12) | (b(3) << 4) | (b(4) & 0x0F),
    };
    Ok((value, len))
}

/// Decodes one signed value from the front of `bytes`
#[allow(clippy::cast_possible_wrap)]
pub fn decode_signed(bytes: &[u8]) -> Result<(i32, usize)> {
    let (value, len) = decode(bytes)?;
    Ok((value as i32, len))
}

/// Reads one value from a byte source
///
/// A source that ends inside the value yields [`CodecError::MalformedVarInt`].
pub fn read_itf8<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; MAX_LEN];
    fill(reader, &mut buf[..1], 1, 0)?;
    let len = len_from_prefix(buf[0]);
    fill(reader, &mut buf[1..len], len, 1)?;
    decode(&buf[..len]).map(|(value, _)| value)
}

/// Reads one signed value from a byte source
#[allow(clippy::cast_possible_wrap)]
pub fn read_itf8_signed<R: Read>(reader: &mut R) -> Result<i32> {
    read_itf8(reader).map(|v| v as i32)
}

fn fill<R: Read>(reader: &mut R, buf: &mut [u8], needed: usize, offset: usize) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(CodecError::MalformedVarInt {
            needed,
            available: offset,
        }
        .into()),
        Err(e) => Err(e.into()),
    }
}

/// Reads a byte string prefixed by its ITF8 length
///
/// The buffer only grows with the bytes actually present, so a corrupt length
/// fails with `UnexpectedEof` rather than being allocated up front.
pub fn read_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = u64::from(read_itf8(reader)?);
    let mut bytes = Vec::new();
    (&mut *reader).take(len).read_to_end(&mut bytes)?;
    if (bytes.len() as u64) < len {
        return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
    }
    Ok(bytes)
}

/// Writes one value to a byte sink and returns the number of bytes written
pub fn write_itf8<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    let mut buf = Vec::with_capacity(MAX_LEN);
    let len = encode(value, &mut buf);
    writer.write_all(&buf)?;
    Ok(len)
}

/// Writes one signed value to a byte sink
#[allow(clippy::cast_sign_loss)]
pub fn write_itf8_signed<W: Write>(writer: &mut W, value: i32) -> Result<usize> {
    write_itf8(writer, value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn round_trip(value: u32) -> (u32, usize) {
        let mut buf = Vec::new();
        let written = encode(value, &mut buf);
        assert_eq!(written, buf.len());
        decode(&buf).unwrap()
    }

    #[test]
    fn test_boundaries() {
        let cases = [
            (0u32, 1usize),
            (0x7F, 1),
            (0x80, 2),
            (0x3FFF, 2),
            (0x4000, 3),
            (0x1F_FFFF, 3),
            (0x20_0000, 4),
            (0x0FFF_FFFF, 4),
            (0x1000_0000, 5),
            (u32::MAX, 5),
        ];
        for (value, len) in cases {
            assert_eq!(encoded_len(value), len, "length of {value:#x}");
            assert_eq!(round_trip(value), (value, len), "round trip of {value:#x}");
        }
    }

    #[test]
    fn test_sampled_range() {
        let mut value = 1u64;
        while value <= u64::from(u32::MAX) {
            for v in [value - 1, value, value + 1] {
                if let Ok(v) = u32::try_from(v) {
                    assert_eq!(round_trip(v).0, v);
                }
            }
            value = value * 3 + 7;
        }
    }

    #[test]
    fn test_known_bytes() {
        let mut buf = Vec::new();
        encode(0x1234_5678, &mut buf);
        assert_eq!(buf, [0xF1, 0x23, 0x45, 0x67, 0x08]);

        buf.clear();
        encode(300, &mut buf);
        assert_eq!(buf, [0x81, 0x2C]);
    }

    #[test]
    fn test_prefix_free() {
        let mut buf = Vec::new();
        for v in [5u32, 200, 70_000, 0x0300_0000, 0xFFFF_FFF0] {
            encode(v, &mut buf);
        }
        let mut pos = 0;
        let mut decoded = Vec::new();
        while pos < buf.len() {
            let (v, n) = decode(&buf[pos..]).unwrap();
            decoded.push(v);
            pos += n;
        }
        assert_eq!(decoded, [5, 200, 70_000, 0x0300_0000, 0xFFFF_FFF0]);
    }

    #[test]
    fn test_signed() {
        let mut buf = Vec::new();
        assert_eq!(encode_signed(-1, &mut buf), 5);
        assert_eq!(decode_signed(&buf).unwrap(), (-1, 5));

        let mut cursor = std::io::Cursor::new(Vec::new());
        write_itf8_signed(&mut cursor, i32::MIN).unwrap();
        cursor.set_position(0);
        assert_eq!(read_itf8_signed(&mut cursor).unwrap(), i32::MIN);
    }

    #[test]
    fn test_prefixed_bytes() -> crate::Result<()> {
        let mut buf = Vec::new();
        encode(3, &mut buf);
        buf.extend_from_slice(b"abcde");
        let mut reader = buf.as_slice();
        assert_eq!(read_prefixed(&mut reader)?, b"abc");
        assert_eq!(reader, b"de");

        let mut buf = Vec::new();
        encode(0x0FFF_FFFF, &mut buf);
        buf.extend_from_slice(b"short");
        assert!(matches!(
            read_prefixed(&mut buf.as_slice()),
            Err(Error::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof
        ));
        Ok(())
    }

    #[test]
    fn test_truncated() {
        let mut buf = Vec::new();
        encode(70_000, &mut buf);
        buf.pop();
        assert!(matches!(
            decode(&buf),
            Err(Error::CodecError(CodecError::MalformedVarInt {
                needed: 3,
                available: 2
            }))
        ));
        assert!(decode(&[]).is_err());

        let mut reader = &buf[..];
        assert!(matches!(
            read_itf8(&mut reader),
            Err(Error::CodecError(CodecError::MalformedVarInt { .. }))
        ));
    }
}
