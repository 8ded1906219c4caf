use super::{SeriesType, StreamId};
use crate::codec::{itf8, GolombRice};
use crate::error::{CodecError, Result};

const ID_RAW_EXTERNAL: u8 = 1;
const ID_GOLOMB_RICE: u8 = 2;
const ID_VARINT: u8 = 3;

/// How one data series is laid out in a slice
///
/// Golomb-Rice values go to the shared core bit stream. The other two write
/// bytes to a dedicated external stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Values stored verbatim in an external stream
    ///
    /// Ints are 4 bytes little-endian, longs 8 bytes, bytes 1 byte, and byte
    /// arrays an ITF8 length followed by the bytes.
    RawExternal { stream: StreamId },
    /// Values Golomb-Rice coded in the core bit stream
    GolombRice(GolombRice),
    /// Values ITF8 encoded in an external stream
    VarInt { stream: StreamId },
}
impl Encoding {
    pub fn id(&self) -> u8 {
        match self {
            Self::RawExternal { .. } => ID_RAW_EXTERNAL,
            Self::GolombRice(_) => ID_GOLOMB_RICE,
            Self::VarInt { .. } => ID_VARINT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RawExternal { .. } => "RawExternal",
            Self::GolombRice(_) => "GolombRice",
            Self::VarInt { .. } => "VarInt",
        }
    }

    /// External stream written by this encoding, if any
    pub fn external_stream(&self) -> Option<StreamId> {
        match self {
            Self::RawExternal { stream } | Self::VarInt { stream } => Some(*stream),
            Self::GolombRice(_) => None,
        }
    }

    pub fn supports(&self, kind: SeriesType) -> bool {
        match self {
            Self::RawExternal { .. } => true,
            Self::GolombRice(_) | Self::VarInt { .. } => {
                matches!(kind, SeriesType::Int | SeriesType::Byte)
            }
        }
    }

    /// Appends the encoding parameters (without the identifier)
    pub fn write_params(&self, buf: &mut Vec<u8>) {
        match self {
            Self::RawExternal { stream } | Self::VarInt { stream } => {
                itf8::encode(*stream, buf);
            }
            Self::GolombRice(codec) => {
                itf8::encode(codec.log2m, buf);
                itf8::encode_signed(codec.offset, buf);
                buf.push(u8::from(codec.quotient_unary));
            }
        }
    }

    /// Rebuilds an encoding from its identifier and serialized parameters
    pub fn from_params(id: u8, params: &[u8]) -> Result<Self> {
        match id {
            ID_RAW_EXTERNAL => {
                let (stream, _) = itf8::decode(params)?;
                Ok(Self::RawExternal { stream })
            }
            ID_VARINT => {
                let (stream, _) = itf8::decode(params)?;
                Ok(Self::VarInt { stream })
            }
            ID_GOLOMB_RICE => {
                let (log2m, a) = itf8::decode(params)?;
                let (offset, b) = itf8::decode_signed(&params[a..])?;
                let unary = params.get(a + b).ok_or(CodecError::MalformedVarInt {
                    needed: a + b + 1,
                    available: params.len(),
                })?;
                Ok(Self::GolombRice(GolombRice::new(log2m, offset, *unary != 0)?))
            }
            _ => Err(CodecError::UnknownEncodingId(id).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_round_trip() -> crate::Result<()> {
        let encodings = [
            Encoding::RawExternal { stream: 7 },
            Encoding::VarInt { stream: 300 },
            Encoding::GolombRice(GolombRice::new(5, -12, false)?),
        ];
        for encoding in encodings {
            let mut buf = Vec::new();
            encoding.write_params(&mut buf);
            assert_eq!(Encoding::from_params(encoding.id(), &buf)?, encoding);
        }
        Ok(())
    }

    #[test]
    fn test_type_support() {
        let golomb = Encoding::GolombRice(GolombRice::default());
        assert!(golomb.supports(SeriesType::Int));
        assert!(!golomb.supports(SeriesType::ByteArray));
        assert!(!Encoding::VarInt { stream: 1 }.supports(SeriesType::Long));
        assert!(Encoding::RawExternal { stream: 1 }.supports(SeriesType::Long));
        assert_eq!(golomb.external_stream(), None);
    }

    #[test]
    fn test_unknown_id() {
        assert!(Encoding::from_params(9, &[0]).is_err());
    }
}
