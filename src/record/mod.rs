//! Records and the machinery that builds, links, and serializes them
//!
//! A [`Record`] is one read expressed as a diff against the reference: its
//! position, flags, and an ordered list of [`Feature`]s. Unmapped reads carry
//! their bases verbatim instead.

mod builder;
mod codec;
mod coverage;
mod feature;
mod mate;

pub use builder::{parse_cigar, AlignedRead, CapturePolicy, CigarOp, RecordBuilder, TagFilter};
pub use codec::{
    collect_stats, most_common_read_length, CodecConfig, RecordReader, RecordWriter, DEBUG_MARKER,
};
pub use coverage::CoverageTrack;
pub use feature::{BaseChange, Feature, FeatureKind, BASES};
pub use mate::{link_mates, resolve_mates, template_size};

use crate::error::{BuildError, Result};
use crate::series::TagKey;

/// Quality score reported for positions whose score was not captured
pub const DEFAULT_QUALITY: u8 = b'?';

/// SAM-compatible record flags
///
/// Mate bits are kept out of the record's own flags and live in [`MateFlags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RecordFlags(u16);
impl RecordFlags {
    pub const MULTI_FRAGMENT: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const REVERSE: u16 = 0x10;
    pub const FIRST_SEGMENT: u16 = 0x40;
    pub const LAST_SEGMENT: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const QC_FAIL: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;

    const SAM_MATE_UNMAPPED: u16 = 0x8;
    const SAM_MATE_REVERSE: u16 = 0x20;
    const MATE_BITS: u16 = Self::SAM_MATE_UNMAPPED | Self::SAM_MATE_REVERSE;

    /// Takes the record's own bits from a SAM flag word
    pub fn from_sam(flags: u16) -> Self {
        Self(flags & !Self::MATE_BITS)
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits & !Self::MATE_BITS)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    #[must_use]
    pub fn with(self, flag: u16, value: bool) -> Self {
        if value {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    pub fn is_unmapped(self) -> bool {
        self.contains(Self::UNMAPPED)
    }

    pub fn is_reverse(self) -> bool {
        self.contains(Self::REVERSE)
    }
}

/// Mate-side flags stored for detached records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MateFlags(u8);
impl MateFlags {
    pub const REVERSE: u8 = 0x1;
    pub const UNMAPPED: u8 = 0x2;

    pub fn from_sam(flags: u16) -> Self {
        let mut bits = 0;
        if flags & RecordFlags::SAM_MATE_REVERSE != 0 {
            bits |= Self::REVERSE;
        }
        if flags & RecordFlags::SAM_MATE_UNMAPPED != 0 {
            bits |= Self::UNMAPPED;
        }
        Self(bits)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & (Self::REVERSE | Self::UNMAPPED))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_reverse(self) -> bool {
        self.0 & Self::REVERSE != 0
    }

    pub fn is_unmapped(self) -> bool {
        self.0 & Self::UNMAPPED != 0
    }

    pub fn to_sam(self) -> u16 {
        let mut flags = 0;
        if self.is_reverse() {
            flags |= RecordFlags::SAM_MATE_REVERSE;
        }
        if self.is_unmapped() {
            flags |= RecordFlags::SAM_MATE_UNMAPPED;
        }
        flags
    }
}

/// Compression flags written per record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionFlags(u8);
impl CompressionFlags {
    pub const FORCE_PRESERVE_QUALITY: u8 = 0x1;
    pub const DETACHED: u8 = 0x2;
    pub const MATE_DOWNSTREAM: u8 = 0x4;
    pub const EXPLICIT_READ_LENGTH: u8 = 0x8;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}

/// Mate coordinates of a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MateInfo {
    pub flags: MateFlags,
    pub reference_id: i32,
    pub alignment_start: i64,
    pub template_size: i32,
}

/// An optional tag with its value already serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: TagKey,
    pub value: Vec<u8>,
}
impl Tag {
    pub fn new(name: [u8; 2], kind: u8, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: TagKey::new(name, kind),
            value: value.into(),
        }
    }
}

/// One read in reference-diff form
///
/// `next` and `previous` index the mate within the same batch. They are plain
/// indices so a batch is released as a whole without any link bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Position within the batch
    pub index: usize,
    pub flags: RecordFlags,
    pub reference_id: i32,
    pub read_length: u32,
    /// 1-based alignment start
    pub alignment_start: i32,
    /// Read group id, `-1` when absent
    pub read_group: i32,
    pub read_name: Option<Vec<u8>>,
    pub mapping_quality: u8,
    /// Edits sorted by position
    pub features: Vec<Feature>,
    /// Verbatim bases, set for unmapped reads
    pub bases: Option<Vec<u8>>,
    /// Verbatim qualities, set when every score is preserved
    pub qualities: Option<Vec<u8>>,
    pub tags: Vec<Tag>,
    pub mate: MateInfo,
    /// The mate is not in this batch and its coordinates are stored explicitly
    pub detached: bool,
    /// Records between this one and its mate further down the batch
    pub records_to_next_fragment: Option<u32>,
    pub next: Option<usize>,
    pub previous: Option<usize>,
}
impl Record {
    pub fn is_unmapped(&self) -> bool {
        self.flags.is_unmapped()
    }

    pub fn has_mate_downstream(&self) -> bool {
        self.records_to_next_fragment.is_some()
    }

    /// Full SAM flag word, mate bits included
    pub fn sam_flags(&self) -> u16 {
        self.flags.bits() | self.mate.flags.to_sam()
    }

    /// Compression flags for this record given the container's default read length
    pub fn compression_flags(&self, read_length_default: u32) -> CompressionFlags {
        let mut bits = 0;
        if self.qualities.is_some() {
            bits |= CompressionFlags::FORCE_PRESERVE_QUALITY;
        }
        if self.detached {
            bits |= CompressionFlags::DETACHED;
        }
        if self.has_mate_downstream() {
            bits |= CompressionFlags::MATE_DOWNSTREAM;
        }
        if self.read_length != read_length_default {
            bits |= CompressionFlags::EXPLICIT_READ_LENGTH;
        }
        CompressionFlags(bits)
    }

    /// Number of reference bases spanned by the alignment
    pub fn reference_span(&self) -> i64 {
        let mut span = i64::from(self.read_length);
        for feature in &self.features {
            span -= i64::from(feature.read_len());
            span += i64::from(feature.reference_len());
        }
        span
    }

    /// 1-based position of the last aligned reference base
    pub fn alignment_end(&self) -> i64 {
        let start = i64::from(self.alignment_start);
        if self.is_unmapped() {
            return start;
        }
        start + self.reference_span() - 1
    }

    /// Rebuilds the read bases by replaying the features over `reference`
    pub fn restore_bases(&self, reference: &[u8]) -> Result<Vec<u8>> {
        if let Some(bases) = &self.bases {
            return Ok(bases.clone());
        }
        let ref_base = |pos: i64| -> Result<u8> {
            usize::try_from(pos - 1)
                .ok()
                .and_then(|i| reference.get(i).copied())
                .ok_or_else(|| {
                    BuildError::ReferenceOutOfBounds {
                        position: pos,
                        length: reference.len(),
                    }
                    .into()
                })
        };

        let mut out = Vec::with_capacity(self.read_length as usize);
        let mut read_pos = 1u32;
        let mut ref_pos = i64::from(self.alignment_start);
        for feature in &self.features {
            while read_pos < feature.position {
                out.push(ref_base(ref_pos)?);
                read_pos += 1;
                ref_pos += 1;
            }
            match &feature.kind {
                FeatureKind::Substitution(change) => {
                    out.push(change.apply(ref_base(ref_pos)?)?);
                    read_pos += 1;
                    ref_pos += 1;
                }
                FeatureKind::Insertion(bases) | FeatureKind::SoftClip(bases) => {
                    out.extend_from_slice(bases);
                    read_pos += bases.len() as u32;
                }
                FeatureKind::InsertedBase(base) => {
                    out.push(*base);
                    read_pos += 1;
                }
                FeatureKind::Deletion(len) => ref_pos += i64::from(*len),
                FeatureKind::QualityScore(_) => {}
            }
        }
        while read_pos <= self.read_length {
            out.push(ref_base(ref_pos)?);
            read_pos += 1;
            ref_pos += 1;
        }
        Ok(out)
    }

    /// Rebuilds the quality string, defaulting scores that were not captured
    pub fn restore_qualities(&self) -> Vec<u8> {
        if let Some(qualities) = &self.qualities {
            return qualities.clone();
        }
        let mut out = vec![DEFAULT_QUALITY; self.read_length as usize];
        for feature in &self.features {
            if let FeatureKind::QualityScore(score) = feature.kind {
                let slot = (feature.position as usize)
                    .checked_sub(1)
                    .and_then(|i| out.get_mut(i));
                if let Some(slot) = slot {
                    *slot = score;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(start: i32, read_length: u32, features: Vec<Feature>) -> Record {
        Record {
            alignment_start: start,
            read_length,
            features,
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_split_mate_bits() {
        let sam = 0x1 | 0x8 | 0x20 | 0x40;
        let flags = RecordFlags::from_sam(sam);
        let mate = MateFlags::from_sam(sam);
        assert_eq!(flags.bits(), 0x41);
        assert!(mate.is_reverse() && mate.is_unmapped());
        assert_eq!(flags.bits() | mate.to_sam(), sam);
        assert!(flags.with(RecordFlags::UNMAPPED, true).is_unmapped());
    }

    #[test]
    fn test_restore_with_every_feature() -> crate::Result<()> {
        let reference = b"AAAACCCCGGGGTTTT";
        // read: 2 clipped, 2 matched, substitution, insertion, 1 match, deletion of 3, 2 matches
        let features = vec![
            Feature::new(1, FeatureKind::SoftClip(b"NN".to_vec())),
            Feature::new(5, FeatureKind::Substitution(BaseChange::new(b'A', b'T')?)),
            Feature::new(5, FeatureKind::QualityScore(b'#')),
            Feature::new(6, FeatureKind::Insertion(b"GG".to_vec())),
            Feature::new(9, FeatureKind::Deletion(3)),
            Feature::new(11, FeatureKind::InsertedBase(b'A')),
        ];
        let record = mapped(2, 12, features);
        let bases = record.restore_bases(reference)?;
        assert_eq!(bases, b"NNAATGGCGGAG");
        assert_eq!(record.reference_span(), 10);
        assert_eq!(record.alignment_end(), 11);

        let qualities = record.restore_qualities();
        assert_eq!(qualities[4], b'#');
        assert_eq!(qualities.iter().filter(|&&q| q == DEFAULT_QUALITY).count(), 11);
        Ok(())
    }

    #[test]
    fn test_restore_out_of_bounds() {
        let record = mapped(10, 8, Vec::new());
        assert!(record.restore_bases(b"ACGTACGTAC").is_err());
    }

    #[test]
    fn test_compression_flags() {
        let mut record = mapped(1, 100, Vec::new());
        assert_eq!(record.compression_flags(100).bits(), 0);
        record.detached = true;
        record.qualities = Some(vec![b'I'; 100]);
        let flags = record.compression_flags(50);
        assert!(flags.contains(CompressionFlags::DETACHED));
        assert!(flags.contains(CompressionFlags::FORCE_PRESERVE_QUALITY));
        assert!(flags.contains(CompressionFlags::EXPLICIT_READ_LENGTH));
        assert!(!flags.contains(CompressionFlags::MATE_DOWNSTREAM));
    }
}
