//! Record serialization through the data-series framework
//!
//! Series are written in a fixed order per record:
//!
//! 1. optional debug marker
//! 2. `BF`, `CF`, `RL` (only when it differs from the container default), `AP` delta, `RG`
//! 3. `RN` when read names are preserved
//! 4. detached mate: `MF`, `RN` (when names are not preserved), `NS`, `NP`, `TS`;
//!    otherwise `NF` when the mate follows in the batch
//! 5. `TC`, then `TN` and the value series for each tag
//! 6. mapped: `FN`, per feature `FC`, `FP` delta and its payload, then `MQ`;
//!    unmapped: one `BA` per base
//! 7. one `QS` per base when qualities are preserved
//! 8. optional debug marker

use std::collections::{BTreeMap, HashMap};

use log::warn;

use super::{
    BaseChange, CompressionFlags, Feature, FeatureKind, MateFlags, MateInfo, Record, RecordFlags,
    Tag,
};
use crate::error::{BuildError, CodecError, Result};
use crate::series::{
    DataSeries, Encoding, EncodingTable, InputStreams, OutputStreams, SeriesReader, SeriesStats,
    SeriesWriter, TagKey,
};

/// Sentinel bracketing every record in the core stream when debug markers are on
pub const DEBUG_MARKER: u32 = 0xD1FF_5E0D;

/// Container-level settings shared by writer and reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecConfig {
    /// Read names are stored for every record
    pub read_names: bool,
    /// Every record is bracketed by [`DEBUG_MARKER`]
    pub debug_markers: bool,
    /// Read length assumed when a record does not store one
    pub read_length_default: u32,
}

fn to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| CodecError::ValueOutOfRange(value).into())
}

/// Most frequent read length of a batch, the smallest one on ties
pub fn most_common_read_length(records: &[Record]) -> u32 {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.read_length).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map_or(0, |(len, _)| len)
}

/// Gathers the value distribution the records will produce, slice by slice
pub fn collect_stats(records: &[Record], slice_size: usize, config: &CodecConfig) -> SeriesStats {
    let mut stats = SeriesStats::new();
    for slice in records.chunks(slice_size.max(1)) {
        let mut prev = slice.first().map_or(0, |r| r.alignment_start);
        for record in slice {
            stats.add(
                DataSeries::AlignmentStart,
                i64::from(record.alignment_start) - i64::from(prev),
            );
            prev = record.alignment_start;
            if record.read_length != config.read_length_default {
                stats.add(DataSeries::ReadLength, i64::from(record.read_length));
            }
            if !record.detached {
                if let Some(distance) = record.records_to_next_fragment {
                    stats.add(DataSeries::NextFragment, i64::from(distance));
                }
            }
            for tag in &record.tags {
                stats.add_tag(tag.key);
            }
            if record.is_unmapped() {
                continue;
            }
            let mut prev_pos = 0;
            for feature in &record.features {
                stats.add(
                    DataSeries::FeaturePosition,
                    i64::from(feature.position) - i64::from(prev_pos),
                );
                prev_pos = feature.position;
                if let FeatureKind::Deletion(len) = feature.kind {
                    stats.add(DataSeries::DeletionLength, i64::from(len));
                }
            }
        }
    }
    stats
}

/// Writes records into one slice's streams
pub struct RecordWriter {
    config: CodecConfig,
    bit_flags: SeriesWriter<i32>,
    compression_flags: SeriesWriter<i32>,
    read_length: SeriesWriter<i32>,
    alignment_start: SeriesWriter<i32>,
    read_group: SeriesWriter<i32>,
    read_name: SeriesWriter<Vec<u8>>,
    next_fragment: SeriesWriter<i32>,
    mate_flags: SeriesWriter<u8>,
    mate_reference: SeriesWriter<i32>,
    mate_start: SeriesWriter<i64>,
    template_size: SeriesWriter<i32>,
    tag_count: SeriesWriter<i32>,
    tag_name: SeriesWriter<i32>,
    tags: BTreeMap<TagKey, SeriesWriter<Vec<u8>>>,
    feature_count: SeriesWriter<i32>,
    feature_code: SeriesWriter<u8>,
    feature_position: SeriesWriter<i32>,
    base_substitution: SeriesWriter<u8>,
    insertion: SeriesWriter<Vec<u8>>,
    soft_clip: SeriesWriter<Vec<u8>>,
    deletion_length: SeriesWriter<i32>,
    base: SeriesWriter<u8>,
    quality_score: SeriesWriter<u8>,
    mapping_quality: SeriesWriter<i32>,
}
impl RecordWriter {
    /// Resolves a writer for every series in `table`
    pub fn new(table: &EncodingTable, config: CodecConfig, out: &mut OutputStreams) -> Result<Self> {
        let mut tags = BTreeMap::new();
        for key in table.tag_keys() {
            tags.insert(key, table.build_writer(key, out)?);
        }
        Ok(Self {
            config,
            bit_flags: table.build_writer(DataSeries::BitFlags, out)?,
            compression_flags: table.build_writer(DataSeries::CompressionFlags, out)?,
            read_length: table.build_writer(DataSeries::ReadLength, out)?,
            alignment_start: table.build_writer(DataSeries::AlignmentStart, out)?,
            read_group: table.build_writer(DataSeries::ReadGroup, out)?,
            read_name: table.build_writer(DataSeries::ReadName, out)?,
            next_fragment: table.build_writer(DataSeries::NextFragment, out)?,
            mate_flags: table.build_writer(DataSeries::MateFlags, out)?,
            mate_reference: table.build_writer(DataSeries::MateReference, out)?,
            mate_start: table.build_writer(DataSeries::MateStart, out)?,
            template_size: table.build_writer(DataSeries::TemplateSize, out)?,
            tag_count: table.build_writer(DataSeries::TagCount, out)?,
            tag_name: table.build_writer(DataSeries::TagName, out)?,
            tags,
            feature_count: table.build_writer(DataSeries::FeatureCount, out)?,
            feature_code: table.build_writer(DataSeries::FeatureCode, out)?,
            feature_position: table.build_writer(DataSeries::FeaturePosition, out)?,
            base_substitution: table.build_writer(DataSeries::BaseSubstitution, out)?,
            insertion: table.build_writer(DataSeries::Insertion, out)?,
            soft_clip: table.build_writer(DataSeries::SoftClip, out)?,
            deletion_length: table.build_writer(DataSeries::DeletionLength, out)?,
            base: table.build_writer(DataSeries::Base, out)?,
            quality_score: table.build_writer(DataSeries::QualityScore, out)?,
            mapping_quality: table.build_writer(DataSeries::MappingQuality, out)?,
        })
    }

    /// Writes one record
    ///
    /// `prev_start` holds the alignment start of the previous record in the
    /// slice and is advanced to this record's start.
    pub fn write(&self, record: &Record, prev_start: &mut i32, out: &mut OutputStreams) -> Result<()> {
        if self.config.debug_markers {
            out.core.write_bits(DEBUG_MARKER, 32)?;
        }
        let cf = record.compression_flags(self.config.read_length_default);

        self.bit_flags.write(&i32::from(record.flags.bits()), out)?;
        self.compression_flags.write(&i32::from(cf.bits()), out)?;
        if cf.contains(CompressionFlags::EXPLICIT_READ_LENGTH) {
            self.read_length
                .write(&to_i32(i64::from(record.read_length))?, out)?;
        }
        let delta = to_i32(i64::from(record.alignment_start) - i64::from(*prev_start))?;
        if let Encoding::GolombRice(codec) = self.alignment_start.encoding() {
            if i64::from(delta) + i64::from(codec.offset) < 0 {
                warn!(
                    "record {} moves back {} positions but {} has offset {}",
                    record.index,
                    -i64::from(delta),
                    self.alignment_start.key(),
                    codec.offset
                );
            }
        }
        self.alignment_start.write(&delta, out)?;
        *prev_start = record.alignment_start;
        self.read_group.write(&record.read_group, out)?;
        if self.config.read_names {
            self.write_name(record, out)?;
        }

        if record.detached {
            self.mate_flags.write(&record.mate.flags.bits(), out)?;
            if !self.config.read_names {
                self.write_name(record, out)?;
            }
            self.mate_reference.write(&record.mate.reference_id, out)?;
            self.mate_start.write(&record.mate.alignment_start, out)?;
            self.template_size.write(&record.mate.template_size, out)?;
        } else if let Some(distance) = record.records_to_next_fragment {
            self.next_fragment
                .write(&to_i32(i64::from(distance))?, out)?;
        }

        self.write_tags(&record.tags, out)?;

        if record.is_unmapped() {
            let bases = record.bases.as_deref().unwrap_or_default();
            if bases.len() != record.read_length as usize {
                return Err(BuildError::InvalidAlignment(format!(
                    "unmapped record stores {} of {} bases",
                    bases.len(),
                    record.read_length
                ))
                .into());
            }
            for base in bases {
                self.base.write(base, out)?;
            }
        } else {
            self.write_features(&record.features, out)?;
            self.mapping_quality
                .write(&i32::from(record.mapping_quality), out)?;
        }

        if let Some(qualities) = &record.qualities {
            if qualities.len() != record.read_length as usize {
                return Err(BuildError::InvalidAlignment(format!(
                    "{} quality scores for {} bases",
                    qualities.len(),
                    record.read_length
                ))
                .into());
            }
            for score in qualities {
                self.quality_score.write(score, out)?;
            }
        }

        if self.config.debug_markers {
            out.core.write_bits(DEBUG_MARKER, 32)?;
        }
        Ok(())
    }

    fn write_name(&self, record: &Record, out: &mut OutputStreams) -> Result<()> {
        let name = record.read_name.clone().unwrap_or_default();
        self.read_name.write(&name, out)
    }

    fn write_tags(&self, tags: &[Tag], out: &mut OutputStreams) -> Result<()> {
        self.tag_count.write(&to_i32(tags.len() as i64)?, out)?;
        for tag in tags {
            let writer = self
                .tags
                .get(&tag.key)
                .ok_or(CodecError::UnregisteredSeries(tag.key.into()))?;
            self.tag_name.write(&tag.key.id(), out)?;
            writer.write(&tag.value, out)?;
        }
        Ok(())
    }

    fn write_features(&self, features: &[Feature], out: &mut OutputStreams) -> Result<()> {
        self.feature_count
            .write(&to_i32(features.len() as i64)?, out)?;
        let mut prev_pos = 0u32;
        for feature in features {
            self.feature_code.write(&feature.code(), out)?;
            let delta = i64::from(feature.position) - i64::from(prev_pos);
            self.feature_position.write(&to_i32(delta)?, out)?;
            prev_pos = feature.position;
            match &feature.kind {
                FeatureKind::Substitution(change) => {
                    self.base_substitution.write(&change.code(), out)?;
                }
                FeatureKind::Insertion(bases) => self.insertion.write(bases, out)?,
                FeatureKind::SoftClip(bases) => self.soft_clip.write(bases, out)?,
                FeatureKind::Deletion(len) => {
                    self.deletion_length.write(&to_i32(i64::from(*len))?, out)?;
                }
                FeatureKind::InsertedBase(base) => self.base.write(base, out)?,
                FeatureKind::QualityScore(score) => self.quality_score.write(score, out)?,
            }
        }
        Ok(())
    }
}

/// Reads records back from one slice's streams
pub struct RecordReader {
    config: CodecConfig,
    bit_flags: SeriesReader<i32>,
    compression_flags: SeriesReader<i32>,
    read_length: SeriesReader<i32>,
    alignment_start: SeriesReader<i32>,
    read_group: SeriesReader<i32>,
    read_name: SeriesReader<Vec<u8>>,
    next_fragment: SeriesReader<i32>,
    mate_flags: SeriesReader<u8>,
    mate_reference: SeriesReader<i32>,
    mate_start: SeriesReader<i64>,
    template_size: SeriesReader<i32>,
    tag_count: SeriesReader<i32>,
    tag_name: SeriesReader<i32>,
    tags: BTreeMap<TagKey, SeriesReader<Vec<u8>>>,
    feature_count: SeriesReader<i32>,
    feature_code: SeriesReader<u8>,
    feature_position: SeriesReader<i32>,
    base_substitution: SeriesReader<u8>,
    insertion: SeriesReader<Vec<u8>>,
    soft_clip: SeriesReader<Vec<u8>>,
    deletion_length: SeriesReader<i32>,
    base: SeriesReader<u8>,
    quality_score: SeriesReader<u8>,
    mapping_quality: SeriesReader<i32>,
}
impl RecordReader {
    /// Resolves a reader for every series in `table`
    pub fn new(table: &EncodingTable, config: CodecConfig, input: &InputStreams<'_>) -> Result<Self> {
        let mut tags = BTreeMap::new();
        for key in table.tag_keys() {
            tags.insert(key, table.build_reader(key, input)?);
        }
        Ok(Self {
            config,
            bit_flags: table.build_reader(DataSeries::BitFlags, input)?,
            compression_flags: table.build_reader(DataSeries::CompressionFlags, input)?,
            read_length: table.build_reader(DataSeries::ReadLength, input)?,
            alignment_start: table.build_reader(DataSeries::AlignmentStart, input)?,
            read_group: table.build_reader(DataSeries::ReadGroup, input)?,
            read_name: table.build_reader(DataSeries::ReadName, input)?,
            next_fragment: table.build_reader(DataSeries::NextFragment, input)?,
            mate_flags: table.build_reader(DataSeries::MateFlags, input)?,
            mate_reference: table.build_reader(DataSeries::MateReference, input)?,
            mate_start: table.build_reader(DataSeries::MateStart, input)?,
            template_size: table.build_reader(DataSeries::TemplateSize, input)?,
            tag_count: table.build_reader(DataSeries::TagCount, input)?,
            tag_name: table.build_reader(DataSeries::TagName, input)?,
            tags,
            feature_count: table.build_reader(DataSeries::FeatureCount, input)?,
            feature_code: table.build_reader(DataSeries::FeatureCode, input)?,
            feature_position: table.build_reader(DataSeries::FeaturePosition, input)?,
            base_substitution: table.build_reader(DataSeries::BaseSubstitution, input)?,
            insertion: table.build_reader(DataSeries::Insertion, input)?,
            soft_clip: table.build_reader(DataSeries::SoftClip, input)?,
            deletion_length: table.build_reader(DataSeries::DeletionLength, input)?,
            base: table.build_reader(DataSeries::Base, input)?,
            quality_score: table.build_reader(DataSeries::QualityScore, input)?,
            mapping_quality: table.build_reader(DataSeries::MappingQuality, input)?,
        })
    }

    fn check_marker(input: &mut InputStreams<'_>) -> Result<()> {
        let found = input.core.read_bits(32)?;
        if found != DEBUG_MARKER {
            input.core.put_back(u64::from(found), 32)?;
            return Err(CodecError::DebugMarkerMismatch {
                expected: DEBUG_MARKER,
                found,
            }
            .into());
        }
        Ok(())
    }

    fn read_count(reader: &SeriesReader<i32>, input: &mut InputStreams<'_>) -> Result<usize> {
        let value = reader.read(input)?;
        usize::try_from(value).map_err(|_| CodecError::ValueOutOfRange(value.into()).into())
    }

    /// Reads one record
    ///
    /// `prev_start` mirrors the writer's running alignment start.
    pub fn read(
        &self,
        input: &mut InputStreams<'_>,
        prev_start: &mut i32,
        index: usize,
    ) -> Result<Record> {
        if self.config.debug_markers {
            Self::check_marker(input)?;
        }
        let mut record = Record {
            index,
            ..Default::default()
        };

        let bits = self.bit_flags.read(input)?;
        record.flags = RecordFlags::from_bits(bits as u16);
        let cf = CompressionFlags::from_bits(self.compression_flags.read(input)? as u8);
        record.read_length = if cf.contains(CompressionFlags::EXPLICIT_READ_LENGTH) {
            let len = self.read_length.read(input)?;
            u32::try_from(len).map_err(|_| CodecError::ValueOutOfRange(len.into()))?
        } else {
            self.config.read_length_default
        };
        let delta = self.alignment_start.read(input)?;
        record.alignment_start = to_i32(i64::from(*prev_start) + i64::from(delta))?;
        *prev_start = record.alignment_start;
        record.read_group = self.read_group.read(input)?;
        if self.config.read_names {
            record.read_name = Some(self.read_name.read(input)?);
        }

        if cf.contains(CompressionFlags::DETACHED) {
            record.detached = true;
            let flags = MateFlags::from_bits(self.mate_flags.read(input)?);
            if !self.config.read_names {
                record.read_name = Some(self.read_name.read(input)?);
            }
            record.mate = MateInfo {
                flags,
                reference_id: self.mate_reference.read(input)?,
                alignment_start: self.mate_start.read(input)?,
                template_size: self.template_size.read(input)?,
            };
        } else if cf.contains(CompressionFlags::MATE_DOWNSTREAM) {
            let distance = self.next_fragment.read(input)?;
            record.records_to_next_fragment = Some(
                u32::try_from(distance).map_err(|_| CodecError::ValueOutOfRange(distance.into()))?,
            );
        }

        let tag_count = Self::read_count(&self.tag_count, input)?;
        for _ in 0..tag_count {
            let key = TagKey::from_id(self.tag_name.read(input)?);
            let reader = self
                .tags
                .get(&key)
                .ok_or(CodecError::UnregisteredSeries(key.into()))?;
            record.tags.push(Tag {
                key,
                value: reader.read(input)?,
            });
        }

        let len = record.read_length as usize;
        if record.is_unmapped() {
            let bases = (0..len)
                .map(|_| self.base.read(input))
                .collect::<Result<Vec<_>>>()?;
            record.bases = Some(bases);
        } else {
            record.features = self.read_features(input)?;
            let mq = self.mapping_quality.read(input)?;
            record.mapping_quality =
                u8::try_from(mq).map_err(|_| CodecError::ValueOutOfRange(mq.into()))?;
        }

        if cf.contains(CompressionFlags::FORCE_PRESERVE_QUALITY) {
            let qualities = (0..len)
                .map(|_| self.quality_score.read(input))
                .collect::<Result<Vec<_>>>()?;
            record.qualities = Some(qualities);
        }

        if self.config.debug_markers {
            Self::check_marker(input)?;
        }
        Ok(record)
    }

    fn read_features(&self, input: &mut InputStreams<'_>) -> Result<Vec<Feature>> {
        let count = Self::read_count(&self.feature_count, input)?;
        let mut features = Vec::new();
        let mut position = 0u32;
        for _ in 0..count {
            let code = self.feature_code.read(input)?;
            let delta = self.feature_position.read(input)?;
            position = u32::try_from(i64::from(position) + i64::from(delta))
                .map_err(|_| CodecError::ValueOutOfRange(delta.into()))?;
            let kind = match code {
                Feature::SUBSTITUTION => FeatureKind::Substitution(BaseChange::from_code(
                    self.base_substitution.read(input)?,
                )?),
                Feature::INSERTION => FeatureKind::Insertion(self.insertion.read(input)?),
                Feature::SOFT_CLIP => FeatureKind::SoftClip(self.soft_clip.read(input)?),
                Feature::DELETION => {
                    let len = self.deletion_length.read(input)?;
                    FeatureKind::Deletion(
                        u32::try_from(len).map_err(|_| CodecError::ValueOutOfRange(len.into()))?,
                    )
                }
                Feature::INSERTED_BASE => FeatureKind::InsertedBase(self.base.read(input)?),
                Feature::QUALITY_SCORE => FeatureKind::QualityScore(self.quality_score.read(input)?),
                other => return Err(CodecError::UnknownFeatureCode(other).into()),
            };
            features.push(Feature::new(position, kind));
        }
        Ok(features)
    }
}
