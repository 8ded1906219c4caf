use std::io::Write;
use std::marker::PhantomData;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Encoding, InputStreams, OutputStreams, SeriesKey, SeriesType};
use crate::codec::itf8;
use crate::error::{CodecError, Result};

/// A value type that can travel through a data series
pub trait SeriesValue: Sized {
    const TYPE: SeriesType;

    fn encode(&self, encoding: &Encoding, out: &mut OutputStreams) -> Result<()>;

    fn decode(encoding: &Encoding, input: &mut InputStreams<'_>) -> Result<Self>;
}

fn unsupported(encoding: &Encoding, kind: SeriesType) -> crate::error::Error {
    CodecError::UnsupportedEncoding {
        encoding: encoding.name(),
        kind,
    }
    .into()
}

impl SeriesValue for i32 {
    const TYPE: SeriesType = SeriesType::Int;

    fn encode(&self, encoding: &Encoding, out: &mut OutputStreams) -> Result<()> {
        match encoding {
            Encoding::GolombRice(codec) => {
                codec.encode(*self, &mut out.core)?;
            }
            Encoding::VarInt { stream } => {
                itf8::encode_signed(*self, out.external_mut(*stream));
            }
            Encoding::RawExternal { stream } => {
                out.external_mut(*stream).write_i32::<LittleEndian>(*self)?;
            }
        }
        Ok(())
    }

    fn decode(encoding: &Encoding, input: &mut InputStreams<'_>) -> Result<Self> {
        match encoding {
            Encoding::GolombRice(codec) => codec.decode(&mut input.core),
            Encoding::VarInt { stream } => itf8::read_itf8_signed(input.external_mut(*stream)?),
            Encoding::RawExternal { stream } => {
                Ok(input.external_mut(*stream)?.read_i32::<LittleEndian>()?)
            }
        }
    }
}

impl SeriesValue for u8 {
    const TYPE: SeriesType = SeriesType::Byte;

    fn encode(&self, encoding: &Encoding, out: &mut OutputStreams) -> Result<()> {
        match encoding {
            Encoding::GolombRice(codec) => {
                codec.encode(i32::from(*self), &mut out.core)?;
            }
            Encoding::VarInt { stream } => {
                itf8::encode(u32::from(*self), out.external_mut(*stream));
            }
            Encoding::RawExternal { stream } => out.external_mut(*stream).push(*self),
        }
        Ok(())
    }

    fn decode(encoding: &Encoding, input: &mut InputStreams<'_>) -> Result<Self> {
        match encoding {
            Encoding::GolombRice(codec) => {
                let value = codec.decode(&mut input.core)?;
                u8::try_from(value).map_err(|_| CodecError::ValueOutOfRange(value.into()).into())
            }
            Encoding::VarInt { stream } => {
                let value = itf8::read_itf8(input.external_mut(*stream)?)?;
                u8::try_from(value).map_err(|_| CodecError::ValueOutOfRange(value.into()).into())
            }
            Encoding::RawExternal { stream } => Ok(input.external_mut(*stream)?.read_u8()?),
        }
    }
}

impl SeriesValue for i64 {
    const TYPE: SeriesType = SeriesType::Long;

    fn encode(&self, encoding: &Encoding, out: &mut OutputStreams) -> Result<()> {
        match encoding {
            Encoding::RawExternal { stream } => {
                out.external_mut(*stream).write_i64::<LittleEndian>(*self)?;
                Ok(())
            }
            _ => Err(unsupported(encoding, Self::TYPE)),
        }
    }

    fn decode(encoding: &Encoding, input: &mut InputStreams<'_>) -> Result<Self> {
        match encoding {
            Encoding::RawExternal { stream } => {
                Ok(input.external_mut(*stream)?.read_i64::<LittleEndian>()?)
            }
            _ => Err(unsupported(encoding, Self::TYPE)),
        }
    }
}

impl SeriesValue for Vec<u8> {
    const TYPE: SeriesType = SeriesType::ByteArray;

    fn encode(&self, encoding: &Encoding, out: &mut OutputStreams) -> Result<()> {
        match encoding {
            Encoding::RawExternal { stream } => {
                let len = u32::try_from(self.len())
                    .map_err(|_| CodecError::ValueOutOfRange(self.len() as i64))?;
                let buf = out.external_mut(*stream);
                itf8::encode(len, buf);
                buf.write_all(self)?;
                Ok(())
            }
            _ => Err(unsupported(encoding, Self::TYPE)),
        }
    }

    fn decode(encoding: &Encoding, input: &mut InputStreams<'_>) -> Result<Self> {
        match encoding {
            Encoding::RawExternal { stream } => {
                itf8::read_prefixed(input.external_mut(*stream)?)
            }
            _ => Err(unsupported(encoding, Self::TYPE)),
        }
    }
}

/// Checks that values of type `T` may flow through `key` under `encoding`
pub(crate) fn check_binding<T: SeriesValue>(key: SeriesKey, encoding: &Encoding) -> Result<()> {
    let expected = key.series_type();
    if expected != T::TYPE {
        return Err(CodecError::SeriesTypeMismatch {
            key,
            expected,
            requested: T::TYPE,
        }
        .into());
    }
    if !encoding.supports(T::TYPE) {
        return Err(unsupported(encoding, T::TYPE));
    }
    Ok(())
}

/// A resolved, typed writer for one data series
#[derive(Debug, Clone, Copy)]
pub struct SeriesWriter<T> {
    key: SeriesKey,
    encoding: Encoding,
    _value: PhantomData<fn(&T)>,
}
impl<T: SeriesValue> SeriesWriter<T> {
    /// Binds `key` to `encoding`, reserving its external stream in `out`
    pub fn new(key: SeriesKey, encoding: Encoding, out: &mut OutputStreams) -> Result<Self> {
        check_binding::<T>(key, &encoding)?;
        if let Some(stream) = encoding.external_stream() {
            out.register(stream);
        }
        Ok(Self {
            key,
            encoding,
            _value: PhantomData,
        })
    }

    pub fn key(&self) -> SeriesKey {
        self.key
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn write(&self, value: &T, out: &mut OutputStreams) -> Result<()> {
        value.encode(&self.encoding, out)
    }
}

/// A resolved, typed reader for one data series
#[derive(Debug, Clone, Copy)]
pub struct SeriesReader<T> {
    encoding: Encoding,
    _value: PhantomData<fn() -> T>,
}
impl<T: SeriesValue> SeriesReader<T> {
    /// Binds `key` to `encoding`, failing if its external stream is absent from `input`
    pub fn new(key: SeriesKey, encoding: Encoding, input: &InputStreams<'_>) -> Result<Self> {
        check_binding::<T>(key, &encoding)?;
        if let Some(stream) = encoding.external_stream() {
            if !input.contains(stream) {
                return Err(CodecError::MissingExternalStream(stream).into());
            }
        }
        Ok(Self {
            encoding,
            _value: PhantomData,
        })
    }

    pub fn read(&self, input: &mut InputStreams<'_>) -> Result<T> {
        T::decode(&self.encoding, input)
    }
}
