use std::collections::BTreeMap;
use std::io::Read;

use auto_impl::auto_impl;

use super::codec::{SeriesReader, SeriesValue, SeriesWriter};
use super::{
    DataSeries, Encoding, InputStreams, OutputStreams, SeriesKey, SeriesStats, StreamId, TagKey,
    FIRST_TAG_STREAM,
};
use crate::codec::{itf8, GolombRice};
use crate::error::{CodecError, Result};

const KEY_CORE: u8 = b'C';
const KEY_TAG: u8 = b'T';

/// Largest quotient an adaptive Golomb-Rice codec writes in unary
const MAX_UNARY_QUOTIENT: i64 = 256;

/// The encoding of every data series in one container
///
/// Core series live in a fixed array indexed by [`DataSeries::index`]; tag value
/// series are keyed by their [`TagKey`]. The table is serialized ahead of the
/// slices so a reader resolves exactly the same codecs before the first record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingTable {
    core: [Option<Encoding>; DataSeries::COUNT],
    tags: BTreeMap<TagKey, Encoding>,
}
impl Default for EncodingTable {
    fn default() -> Self {
        Self::new()
    }
}
impl EncodingTable {
    /// An empty table with no series registered
    pub fn new() -> Self {
        Self {
            core: [None; DataSeries::COUNT],
            tags: BTreeMap::new(),
        }
    }

    /// The external stream a core series uses under the default table
    pub fn default_stream(series: DataSeries) -> StreamId {
        series.index() as StreamId + 1
    }

    /// The static default table
    pub fn defaults() -> Self {
        let mut table = Self::new();
        for series in DataSeries::ALL {
            let stream = Self::default_stream(series);
            let encoding = match series {
                DataSeries::NextFragment => Encoding::GolombRice(GolombRice::from_mean(2.0, 0)),
                DataSeries::FeaturePosition => {
                    Encoding::GolombRice(GolombRice::from_mean(16.0, 0))
                }
                DataSeries::DeletionLength => Encoding::GolombRice(GolombRice::from_mean(2.0, 0)),
                DataSeries::ReadName
                | DataSeries::MateFlags
                | DataSeries::MateStart
                | DataSeries::FeatureCode
                | DataSeries::BaseSubstitution
                | DataSeries::Insertion
                | DataSeries::SoftClip
                | DataSeries::Base
                | DataSeries::QualityScore => Encoding::RawExternal { stream },
                _ => Encoding::VarInt { stream },
            };
            table.set(series, encoding);
        }
        table
    }

    pub fn set(&mut self, key: impl Into<SeriesKey>, encoding: Encoding) {
        match key.into() {
            SeriesKey::Core(series) => self.core[series.index()] = Some(encoding),
            SeriesKey::Tag(tag) => {
                self.tags.insert(tag, encoding);
            }
        }
    }

    pub fn get(&self, key: impl Into<SeriesKey>) -> Result<Encoding> {
        let key = key.into();
        let encoding = match key {
            SeriesKey::Core(series) => self.core[series.index()],
            SeriesKey::Tag(tag) => self.tags.get(&tag).copied(),
        };
        encoding.ok_or_else(|| CodecError::UnregisteredSeries(key).into())
    }

    /// Registered tag value series
    pub fn tag_keys(&self) -> impl Iterator<Item = TagKey> + '_ {
        self.tags.keys().copied()
    }

    fn entries(&self) -> impl Iterator<Item = (SeriesKey, Encoding)> + '_ {
        let core = DataSeries::ALL
            .into_iter()
            .filter_map(|series| self.core[series.index()].map(|e| (SeriesKey::Core(series), e)));
        let tags = self.tags.iter().map(|(k, e)| (SeriesKey::Tag(*k), *e));
        core.chain(tags)
    }

    /// Resolves a typed writer for `key`
    ///
    /// Fails with [`CodecError::UnregisteredSeries`] if the key has no encoding,
    /// or when `T` or the encoding do not fit the series type.
    pub fn build_writer<T: SeriesValue>(
        &self,
        key: impl Into<SeriesKey>,
        out: &mut OutputStreams,
    ) -> Result<SeriesWriter<T>> {
        let key = key.into();
        SeriesWriter::new(key, self.get(key)?, out)
    }

    /// Resolves a typed reader for `key`
    pub fn build_reader<T: SeriesValue>(
        &self,
        key: impl Into<SeriesKey>,
        input: &InputStreams<'_>,
    ) -> Result<SeriesReader<T>> {
        let key = key.into();
        SeriesReader::new(key, self.get(key)?, input)
    }

    /// Appends the serialized table to `buf`
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let entries: Vec<_> = self.entries().collect();
        itf8::encode(entries.len() as u32, buf);
        let mut params = Vec::new();
        for (key, encoding) in entries {
            match key {
                SeriesKey::Core(series) => {
                    buf.push(KEY_CORE);
                    buf.extend_from_slice(&series.code());
                }
                SeriesKey::Tag(tag) => {
                    buf.push(KEY_TAG);
                    buf.extend_from_slice(&tag.to_bytes());
                }
            }
            buf.push(encoding.id());
            params.clear();
            encoding.write_params(&mut params);
            itf8::encode(params.len() as u32, buf);
            buf.extend_from_slice(&params);
        }
    }

    /// Reads a table written by [`EncodingTable::write_to`]
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut table = Self::new();
        let count = itf8::read_itf8(reader)?;
        for _ in 0..count {
            let mut kind = [0u8; 1];
            reader.read_exact(&mut kind)?;
            let key = match kind[0] {
                KEY_CORE => {
                    let mut code = [0u8; 2];
                    reader.read_exact(&mut code)?;
                    let series = DataSeries::from_code(code).ok_or_else(|| {
                        CodecError::UnknownSeriesCode(String::from_utf8_lossy(&code).into_owned())
                    })?;
                    SeriesKey::Core(series)
                }
                KEY_TAG => {
                    let mut bytes = [0u8; 3];
                    reader.read_exact(&mut bytes)?;
                    SeriesKey::Tag(TagKey::from_bytes(bytes))
                }
                other => {
                    return Err(CodecError::UnknownSeriesCode(format!("{other:#04x}")).into())
                }
            };
            let mut id = [0u8; 1];
            reader.read_exact(&mut id)?;
            let params = itf8::read_prefixed(reader)?;
            table.set(key, Encoding::from_params(id[0], &params)?);
        }
        Ok(table)
    }
}

/// Chooses the encoding table of a container from its batch statistics
///
/// Implementations must be deterministic: the chosen table is serialized into the
/// container and the reader never sees the statistics.
#[auto_impl(&, Box, Arc)]
pub trait EncodingStrategy {
    fn select(&self, stats: &SeriesStats) -> EncodingTable;
}

/// Gives every tag seen in the batch its own raw external stream
fn register_tags(table: &mut EncodingTable, stats: &SeriesStats) {
    for (i, key) in stats.tags().enumerate() {
        let stream = FIRST_TAG_STREAM + i as StreamId;
        table.set(key, Encoding::RawExternal { stream });
    }
}

/// Always uses the static default table
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedStrategy;
impl EncodingStrategy for FixedStrategy {
    fn select(&self, stats: &SeriesStats) -> EncodingTable {
        let mut table = EncodingTable::defaults();
        register_tags(&mut table, stats);
        table
    }
}

/// Fits Golomb-Rice parameters to the batch for near-geometric integer series
///
/// For each listed series the offset shifts the batch minimum to zero and
/// `log2m` follows the mean of the shifted values. A series whose range cannot
/// be shifted into 32 bits keeps its default encoding.
#[derive(Debug, Clone)]
pub struct AdaptiveStrategy {
    series: Vec<DataSeries>,
}
impl Default for AdaptiveStrategy {
    fn default() -> Self {
        Self {
            series: vec![
                DataSeries::AlignmentStart,
                DataSeries::NextFragment,
                DataSeries::FeaturePosition,
                DataSeries::DeletionLength,
                DataSeries::ReadLength,
            ],
        }
    }
}
impl AdaptiveStrategy {
    fn fit(stats: &super::ValueStats) -> Option<GolombRice> {
        if stats.is_empty() {
            return None;
        }
        let offset = i32::try_from(stats.min.checked_neg()?).ok()?;
        let range = stats.max - stats.min;
        if range > i64::from(u32::MAX) {
            return None;
        }
        let mut codec = GolombRice::from_mean(stats.shifted_mean(), offset);
        codec.quotient_unary = (range >> codec.log2m) <= MAX_UNARY_QUOTIENT;
        Some(codec)
    }
}
impl EncodingStrategy for AdaptiveStrategy {
    fn select(&self, stats: &SeriesStats) -> EncodingTable {
        let mut table = EncodingTable::defaults();
        for &series in &self.series {
            if let Some(codec) = stats.get(series).and_then(Self::fit) {
                log::debug!("{series}: Golomb-Rice log2m={} offset={}", codec.log2m, codec.offset);
                table.set(series, Encoding::GolombRice(codec));
            }
        }
        register_tags(&mut table, stats);
        table
    }
}
