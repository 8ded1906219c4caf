//! MSB-first bit streams
//!
//! [`BitWriter`] accumulates bits into bytes and only byte-aligns when the
//! stream is finished. [`BitReader`] walks the same bytes back and supports
//! pushing bits back onto the front of the stream for one-shot lookahead.

use crate::error::{CodecError, Result};

/// Writes individual bits and bit runs, most significant bit first
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Completed bytes
    buf: Vec<u8>,
    /// Partially filled byte
    current: u8,
    /// Number of bits held in `current`
    filled: u8,
}
impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | u8::from(bit);
        self.filled += 1;
        if self.filled == 8 {
            self.buf.push(self.current);
            self.current = 0;
            self.filled = 0;
        }
    }

    /// Writes the low `n` bits of `value` (`n <= 32`)
    pub fn write_bits(&mut self, value: u32, n: u32) -> Result<()> {
        if n > 32 {
            return Err(CodecError::InvalidBitCount { count: n, max: 32 }.into());
        }
        self.write_long_bits(u64::from(value), n)
    }

    /// Writes the low `n` bits of `value` (`n <= 64`)
    pub fn write_long_bits(&mut self, value: u64, n: u32) -> Result<()> {
        if n > 64 {
            return Err(CodecError::InvalidBitCount { count: n, max: 64 }.into());
        }
        for shift in (0..n).rev() {
            self.write_bit((value >> shift) & 1 == 1);
        }
        Ok(())
    }

    /// Writes `count` one-bits followed by a terminating zero
    pub fn write_unary(&mut self, count: u32) {
        for _ in 0..count {
            self.write_bit(true);
        }
        self.write_bit(false);
    }

    /// Number of bits written so far
    pub fn len_bits(&self) -> u64 {
        self.buf.len() as u64 * 8 + u64::from(self.filled)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.filled == 0
    }

    /// Pads the trailing partial byte with zeros and returns the bytes
    pub fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.buf.push(self.current << (8 - self.filled));
        }
        self.buf
    }
}

/// Reads individual bits and bit runs, most significant bit first
///
/// Bits pushed back with [`BitReader::put_back`] are returned before any
/// further bits from the underlying bytes.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Bit offset of the next unread bit in `data`
    pos: u64,
    /// Pushed-back bits, the next one to read in the highest occupied position
    pending: u64,
    /// Number of valid bits in `pending`
    pending_len: u32,
}
impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            pending: 0,
            pending_len: 0,
        }
    }

    /// Number of bits that can still be read, including any padding
    pub fn remaining(&self) -> u64 {
        self.data.len() as u64 * 8 - self.pos + u64::from(self.pending_len)
    }

    pub fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, n: u32) -> Result<()> {
        let available = self.remaining();
        if u64::from(n) > available {
            return Err(CodecError::BitStreamUnderrun {
                requested: n,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn next_bit(&mut self) -> bool {
        if self.pending_len > 0 {
            self.pending_len -= 1;
            return (self.pending >> self.pending_len) & 1 == 1;
        }
        let byte = self.data[(self.pos / 8) as usize];
        let bit = (byte >> (7 - (self.pos % 8))) & 1 == 1;
        self.pos += 1;
        bit
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        self.ensure(1)?;
        Ok(self.next_bit())
    }

    /// Reads `n` bits (`n <= 32`) into the low bits of the result
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(CodecError::InvalidBitCount { count: n, max: 32 }.into());
        }
        self.read_long_bits(n).map(|v| v as u32)
    }

    /// Reads `n` bits (`n <= 64`) into the low bits of the result
    pub fn read_long_bits(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(CodecError::InvalidBitCount { count: n, max: 64 }.into());
        }
        self.ensure(n)?;
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.next_bit());
        }
        Ok(value)
    }

    /// Counts one-bits up to and including the terminating zero
    pub fn read_unary(&mut self) -> Result<u32> {
        let mut count = 0u32;
        while self.read_bit()? {
            count = count
                .checked_add(1)
                .ok_or(CodecError::ValueOutOfRange(i64::from(u32::MAX) + 1))?;
        }
        Ok(count)
    }

    /// Pushes the low `n` bits of `bits` back onto the front of the stream
    ///
    /// The next `n` bits read are exactly these bits, in their original order.
    pub fn put_back(&mut self, bits: u64, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if n + self.pending_len > 64 {
            return Err(CodecError::PutBackOverflow(n).into());
        }
        let masked = if n == 64 { bits } else { bits & ((1u64 << n) - 1) };
        self.pending = if self.pending_len == 0 {
            masked
        } else {
            (masked << self.pending_len) | self.pending
        };
        self.pending_len += n;
        Ok(())
    }

    /// Returns the next `n` bits without consuming them
    pub fn peek_bits(&mut self, n: u32) -> Result<u32> {
        let value = self.read_bits(n)?;
        self.put_back(u64::from(value), n)?;
        Ok(value)
    }
}
