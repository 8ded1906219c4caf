use super::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Golomb-Rice coding of integers over a bit stream
///
/// A value `v` is shifted by `offset` into the non-negative domain, then split
/// into a quotient `v' >> log2m` and a remainder of `log2m` bits. The quotient is
/// written either in unary (that many one-bits and a terminating zero) or as a
/// fixed-width field of `32 - log2m` bits.
///
/// The encoding is shortest when `2^log2m` is close to the mean of the shifted
/// values, see [`GolombRice::from_mean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GolombRice {
    /// Number of remainder bits
    pub log2m: u32,
    /// Added to every value before encoding
    pub offset: i32,
    /// Unary quotient if true, fixed-width quotient otherwise
    pub quotient_unary: bool,
}
impl Default for GolombRice {
    fn default() -> Self {
        Self {
            log2m: 0,
            offset: 0,
            quotient_unary: true,
        }
    }
}
impl GolombRice {
    pub const MAX_LOG2M: u32 = 31;

    pub fn new(log2m: u32, offset: i32, quotient_unary: bool) -> Result<Self> {
        if log2m > Self::MAX_LOG2M {
            return Err(CodecError::InvalidBitCount {
                count: log2m,
                max: Self::MAX_LOG2M,
            }
            .into());
        }
        Ok(Self {
            log2m,
            offset,
            quotient_unary,
        })
    }

    /// Picks the Rice parameter for values whose shifted mean is `mean`
    ///
    /// `log2m = floor(log2(max(mean, 1)))`, capped at [`Self::MAX_LOG2M`].
    #[allow(clippy::cast_sign_loss)]
    pub fn from_mean(mean: f64, offset: i32) -> Self {
        let log2m = if mean.is_finite() && mean > 1.0 {
            (mean.log2().floor() as u32).min(Self::MAX_LOG2M)
        } else {
            0
        };
        Self {
            log2m,
            offset,
            quotient_unary: true,
        }
    }

    fn quotient_width(&self) -> u32 {
        32 - self.log2m
    }

    fn remainder_mask(&self) -> u32 {
        (1u32 << self.log2m) - 1
    }

    fn shift(&self, value: i32) -> Result<u32> {
        let shifted = i64::from(value) + i64::from(self.offset);
        u32::try_from(shifted).map_err(|_| CodecError::ValueOutOfRange(shifted).into())
    }

    /// Number of bits `value` occupies once encoded
    pub fn encoded_len(&self, value: i32) -> Result<u64> {
        let shifted = self.shift(value)?;
        let quotient_bits = if self.quotient_unary {
            u64::from(shifted >> self.log2m) + 1
        } else {
            u64::from(self.quotient_width())
        };
        Ok(quotient_bits + u64::from(self.log2m))
    }

    /// Writes `value` and returns the number of bits written
    pub fn encode(&self, value: i32, writer: &mut BitWriter) -> Result<u64> {
        let shifted = self.shift(value)?;
        let quotient = shifted >> self.log2m;
        let remainder = shifted & self.remainder_mask();
        let before = writer.len_bits();
        if self.quotient_unary {
            writer.write_unary(quotient);
        } else {
            writer.write_bits(quotient, self.quotient_width())?;
        }
        writer.write_bits(remainder, self.log2m)?;
        Ok(writer.len_bits() - before)
    }

    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<i32> {
        let quotient = if self.quotient_unary {
            reader.read_unary()?
        } else {
            reader.read_bits(self.quotient_width())?
        };
        let remainder = reader.read_bits(self.log2m)?;
        let shifted = (u64::from(quotient) << self.log2m) | u64::from(remainder);
        let value = shifted as i64 - i64::from(self.offset);
        i32::try_from(value).map_err(|_| CodecError::ValueOutOfRange(value).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn round_trip(codec: GolombRice, values: &[i32]) -> crate::Result<()> {
        let mut writer = BitWriter::new();
        let mut expected_bits = 0;
        for &v in values {
            assert_eq!(codec.encoded_len(v)?, codec.encode(v, &mut writer)?);
            expected_bits += codec.encoded_len(v)?;
        }
        assert_eq!(writer.len_bits(), expected_bits);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        for &v in values {
            assert_eq!(codec.decode(&mut reader)?, v, "{codec:?}");
        }
        Ok(())
    }

    #[test]
    fn test_round_trip_grid() -> crate::Result<()> {
        let values = [0, 1, 2, 3, 7, 8, 15, 100, 1023, 4096];
        for log2m in [0, 1, 3, 5, 10] {
            for unary in [true, false] {
                round_trip(GolombRice::new(log2m, 0, unary)?, &values)?;
            }
        }
        Ok(())
    }

    #[test]
    fn test_offset_admits_negatives() -> crate::Result<()> {
        let codec = GolombRice::new(2, 10, true)?;
        round_trip(codec, &[-10, -3, 0, 5, 40])?;
        assert!(matches!(
            codec.encode(-11, &mut BitWriter::new()),
            Err(Error::CodecError(CodecError::ValueOutOfRange(-1)))
        ));
        Ok(())
    }

    #[test]
    fn test_fixed_width_quotient_extremes() -> crate::Result<()> {
        round_trip(GolombRice::new(0, 0, false)?, &[0, i32::MAX])?;
        round_trip(GolombRice::new(31, 0, false)?, &[0, i32::MAX])?;
        round_trip(GolombRice::new(4, i32::MAX, false)?, &[i32::MIN + 1, 0])?;
        Ok(())
    }

    #[test]
    fn test_known_bits() -> crate::Result<()> {
        // 9 with m = 4: quotient 2 -> 110, remainder 1 -> 01
        let mut writer = BitWriter::new();
        GolombRice::new(2, 0, true)?.encode(9, &mut writer)?;
        assert_eq!(writer.finish(), [0b1100_1000]);
        Ok(())
    }

    #[test]
    fn test_log2m_monotonicity() -> crate::Result<()> {
        let small: Vec<u64> = (0..8)
            .map(|k| GolombRice::new(k, 0, true)?.encoded_len(0))
            .collect::<crate::Result<_>>()?;
        assert!(small.windows(2).all(|w| w[0] < w[1]), "{small:?}");

        let large: Vec<u64> = (0..8)
            .map(|k| GolombRice::new(k, 0, true)?.encoded_len(4096))
            .collect::<crate::Result<_>>()?;
        assert!(large.windows(2).all(|w| w[0] > w[1]), "{large:?}");
        Ok(())
    }

    #[test]
    fn test_from_mean() {
        assert_eq!(GolombRice::from_mean(0.0, 0).log2m, 0);
        assert_eq!(GolombRice::from_mean(1.0, 0).log2m, 0);
        assert_eq!(GolombRice::from_mean(5.0, 0).log2m, 2);
        assert_eq!(GolombRice::from_mean(1024.0, 3).log2m, 10);
        assert_eq!(GolombRice::from_mean(f64::MAX, 0).log2m, 31);
        assert_eq!(GolombRice::from_mean(f64::NAN, 0).log2m, 0);
    }

    #[test]
    fn test_invalid_parameter() {
        assert!(GolombRice::new(32, 0, true).is_err());
    }
}
