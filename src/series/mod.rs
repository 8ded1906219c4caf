//! The data-series framework
//!
//! Every logical field of a record is a *data series*, encoded independently of the
//! others with its own [`Encoding`]. An [`EncodingTable`] maps each series to its
//! encoding for one container, and typed [`SeriesWriter`]/[`SeriesReader`] handles
//! are resolved from the table before the first record is written or read.

use std::fmt;

mod codec;
mod encoding;
mod stats;
mod streams;
mod table;

pub use codec::{SeriesReader, SeriesValue, SeriesWriter};
pub use encoding::Encoding;
pub use stats::{SeriesStats, ValueStats};
pub use streams::{InputStreams, OutputStreams};
pub use table::{AdaptiveStrategy, EncodingStrategy, EncodingTable, FixedStrategy};

/// Identifier of an external byte stream within a slice
pub type StreamId = u32;

/// First stream identifier handed out to tag value series
pub const FIRST_TAG_STREAM: StreamId = 64;

/// Semantic type of the values carried by a data series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesType {
    Int,
    Byte,
    ByteArray,
    Long,
}

/// The fixed data series of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataSeries {
    /// Record flags (BF)
    BitFlags,
    /// Compression flags (CF)
    CompressionFlags,
    /// Read length (RL)
    ReadLength,
    /// Alignment start, as a delta from the previous record (AP)
    AlignmentStart,
    /// Read group (RG)
    ReadGroup,
    /// Read name (RN)
    ReadName,
    /// Records to the next fragment of the template (NF)
    NextFragment,
    /// Mate flags of a detached record (MF)
    MateFlags,
    /// Mate reference id (NS)
    MateReference,
    /// Mate alignment start (NP)
    MateStart,
    /// Template size (TS)
    TemplateSize,
    /// Tag count (TC)
    TagCount,
    /// Tag key (TN)
    TagName,
    /// Number of read features (FN)
    FeatureCount,
    /// Feature code (FC)
    FeatureCode,
    /// Feature position, as a delta from the previous feature (FP)
    FeaturePosition,
    /// Base substitution code (BS)
    BaseSubstitution,
    /// Inserted bases (IN)
    Insertion,
    /// Soft-clipped bases (SC)
    SoftClip,
    /// Deletion length (DL)
    DeletionLength,
    /// Single base (BA)
    Base,
    /// Single quality score (QS)
    QualityScore,
    /// Mapping quality (MQ)
    MappingQuality,
}
impl DataSeries {
    pub const COUNT: usize = 23;

    pub const ALL: [DataSeries; Self::COUNT] = [
        Self::BitFlags,
        Self::CompressionFlags,
        Self::ReadLength,
        Self::AlignmentStart,
        Self::ReadGroup,
        Self::ReadName,
        Self::NextFragment,
        Self::MateFlags,
        Self::MateReference,
        Self::MateStart,
        Self::TemplateSize,
        Self::TagCount,
        Self::TagName,
        Self::FeatureCount,
        Self::FeatureCode,
        Self::FeaturePosition,
        Self::BaseSubstitution,
        Self::Insertion,
        Self::SoftClip,
        Self::DeletionLength,
        Self::Base,
        Self::QualityScore,
        Self::MappingQuality,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Two-letter code used on disk
    pub fn code(self) -> [u8; 2] {
        match self {
            Self::BitFlags => *b"BF",
            Self::CompressionFlags => *b"CF",
            Self::ReadLength => *b"RL",
            Self::AlignmentStart => *b"AP",
            Self::ReadGroup => *b"RG",
            Self::ReadName => *b"RN",
            Self::NextFragment => *b"NF",
            Self::MateFlags => *b"MF",
            Self::MateReference => *b"NS",
            Self::MateStart => *b"NP",
            Self::TemplateSize => *b"TS",
            Self::TagCount => *b"TC",
            Self::TagName => *b"TN",
            Self::FeatureCount => *b"FN",
            Self::FeatureCode => *b"FC",
            Self::FeaturePosition => *b"FP",
            Self::BaseSubstitution => *b"BS",
            Self::Insertion => *b"IN",
            Self::SoftClip => *b"SC",
            Self::DeletionLength => *b"DL",
            Self::Base => *b"BA",
            Self::QualityScore => *b"QS",
            Self::MappingQuality => *b"MQ",
        }
    }

    pub fn from_code(code: [u8; 2]) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn series_type(self) -> SeriesType {
        match self {
            Self::ReadName | Self::Insertion | Self::SoftClip => SeriesType::ByteArray,
            Self::MateFlags
            | Self::FeatureCode
            | Self::BaseSubstitution
            | Self::Base
            | Self::QualityScore => SeriesType::Byte,
            Self::MateStart => SeriesType::Long,
            _ => SeriesType::Int,
        }
    }
}
impl fmt::Display for DataSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = self.code();
        write!(f, "{}{}", a as char, b as char)
    }
}

/// Key of an optional tag: two-character name plus a one-character value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagKey {
    pub name: [u8; 2],
    pub kind: u8,
}
impl TagKey {
    pub fn new(name: [u8; 2], kind: u8) -> Self {
        Self { name, kind }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.name[0], self.name[1], self.kind]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new([bytes[0], bytes[1]], bytes[2])
    }

    /// Packs the key into the integer carried by the tag-name series
    pub fn id(self) -> i32 {
        (i32::from(self.name[0]) << 16) | (i32::from(self.name[1]) << 8) | i32::from(self.kind)
    }

    pub fn from_id(id: i32) -> Self {
        Self::new([(id >> 16) as u8, (id >> 8) as u8], id as u8)
    }
}
impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}",
            self.name[0] as char, self.name[1] as char, self.kind as char
        )
    }
}

/// Any series that can be registered in an [`EncodingTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeriesKey {
    Core(DataSeries),
    Tag(TagKey),
}
impl SeriesKey {
    pub fn series_type(self) -> SeriesType {
        match self {
            Self::Core(series) => series.series_type(),
            Self::Tag(_) => SeriesType::ByteArray,
        }
    }
}
impl From<DataSeries> for SeriesKey {
    fn from(series: DataSeries) -> Self {
        Self::Core(series)
    }
}
impl From<TagKey> for SeriesKey {
    fn from(key: TagKey) -> Self {
        Self::Tag(key)
    }
}
impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(series) => series.fmt(f),
            Self::Tag(key) => key.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique_and_indexed() {
        for (i, series) in DataSeries::ALL.iter().enumerate() {
            assert_eq!(series.index(), i);
            assert_eq!(DataSeries::from_code(series.code()), Some(*series));
        }
        assert_eq!(DataSeries::from_code(*b"ZZ"), None);
        assert_eq!(DataSeries::AlignmentStart.to_string(), "AP");
    }

    #[test]
    fn test_tag_key_id() {
        let key = TagKey::new(*b"NM", b'i');
        assert_eq!(TagKey::from_id(key.id()), key);
        assert_eq!(TagKey::from_bytes(key.to_bytes()), key);
        assert_eq!(SeriesKey::from(key).to_string(), "NM:i");
    }
}
