//! Conversion of aligned reads into reference-diff records
//!
//! The builder walks a read's alignment against the reference, emitting one
//! [`Feature`] per divergence and updating the batch's [`CoverageTrack`] as it goes.

use rand::rngs::SmallRng;
use rand::SeedableRng;

use super::{
    BaseChange, CoverageTrack, Feature, FeatureKind, MateFlags, MateInfo, Record, RecordFlags, Tag,
};
use crate::error::{BuildError, Result};
use crate::policy::{Policy, RNG_SEED};
use crate::quality::{CaptureDecision, QualityPolicy};

/// CIGAR operation types.
///
/// Each operation describes a type of alignment event and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// Match or mismatch (M)
    Match(u32),
    /// Insertion to reference (I)
    Insertion(u32),
    /// Deletion from reference (D)
    Deletion(u32),
    /// Skipped region from reference (N)
    RefSkip(u32),
    /// Soft clipping (S)
    SoftClip(u32),
    /// Hard clipping (H)
    HardClip(u32),
    /// Padding (P)
    Padding(u32),
    /// Sequence match (=)
    SeqMatch(u32),
    /// Sequence mismatch (X)
    SeqMismatch(u32),
}
impl CigarOp {
    pub fn length(&self) -> u32 {
        match *self {
            CigarOp::Match(len)
            | CigarOp::Insertion(len)
            | CigarOp::Deletion(len)
            | CigarOp::RefSkip(len)
            | CigarOp::SoftClip(len)
            | CigarOp::HardClip(len)
            | CigarOp::Padding(len)
            | CigarOp::SeqMatch(len)
            | CigarOp::SeqMismatch(len) => len,
        }
    }

    pub fn consumes_read(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Insertion(_)
                | CigarOp::SoftClip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::Match(_)
                | CigarOp::Deletion(_)
                | CigarOp::RefSkip(_)
                | CigarOp::SeqMatch(_)
                | CigarOp::SeqMismatch(_)
        )
    }

    fn from_char(op: char, len: u32) -> Option<Self> {
        Some(match op {
            'M' => CigarOp::Match(len),
            'I' => CigarOp::Insertion(len),
            'D' => CigarOp::Deletion(len),
            'N' => CigarOp::RefSkip(len),
            'S' => CigarOp::SoftClip(len),
            'H' => CigarOp::HardClip(len),
            'P' => CigarOp::Padding(len),
            '=' => CigarOp::SeqMatch(len),
            'X' => CigarOp::SeqMismatch(len),
            _ => return None,
        })
    }
}

/// Parses a SAM CIGAR string such as `"5S40M2I53M"`; `"*"` is the empty alignment
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>> {
    let invalid = || BuildError::InvalidAlignment(format!("malformed CIGAR string: {cigar}"));
    if cigar == "*" {
        return Ok(Vec::new());
    }
    let mut ops = Vec::new();
    let mut len: Option<u32> = None;
    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let current = len.unwrap_or(0);
            len = Some(
                current
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(invalid)?,
            );
        } else {
            let n = len.take().ok_or_else(invalid)?;
            ops.push(CigarOp::from_char(c, n).ok_or_else(invalid)?);
        }
    }
    if len.is_some() {
        return Err(invalid().into());
    }
    Ok(ops)
}

/// An aligned read as handed over by the input collaborator
#[derive(Debug, Clone, Default)]
pub struct AlignedRead {
    pub name: Vec<u8>,
    /// SAM flag word
    pub flags: u16,
    pub reference_id: i32,
    pub reference_name: String,
    /// 1-based position of the first aligned base
    pub alignment_start: i32,
    pub mapping_quality: u8,
    pub cigar: Vec<CigarOp>,
    pub bases: Vec<u8>,
    /// Per-base scores, empty when missing
    pub qualities: Vec<u8>,
    pub tags: Vec<Tag>,
    /// Read group id, `-1` when absent
    pub read_group: i32,
    pub mate_reference_id: i32,
    pub mate_alignment_start: i32,
    pub template_length: i32,
}
impl AlignedRead {
    pub fn is_unmapped(&self) -> bool {
        self.flags & RecordFlags::UNMAPPED != 0
    }
}

/// Which optional tags are kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagFilter {
    #[default]
    KeepAll,
    /// Keep only the listed tag names
    Keep(Vec<[u8; 2]>),
    /// Keep everything but the listed tag names
    Drop(Vec<[u8; 2]>),
}
impl TagFilter {
    pub fn accepts(&self, name: [u8; 2]) -> bool {
        match self {
            Self::KeepAll => true,
            Self::Keep(names) => names.contains(&name),
            Self::Drop(names) => !names.contains(&name),
        }
    }
}

/// What the builder captures beyond the reference diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePolicy {
    pub tags: TagFilter,
    /// Keep the quality score of every substituted base
    pub substitution_quality: bool,
    /// Keep the full quality string of unmapped reads
    pub unmapped_quality: bool,
    /// Keep the strand of reads and their mates; otherwise both read as forward
    pub strand: bool,
}
impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            tags: TagFilter::KeepAll,
            substitution_quality: false,
            unmapped_quality: true,
            strand: true,
        }
    }
}

/// Turns aligned reads into [`Record`]s
pub struct RecordBuilder {
    capture: CapturePolicy,
    policy: Policy,
    rng: SmallRng,
    /// Upper-cased bases of the current read
    bases: Vec<u8>,
    /// Policy output buffer
    ibuf: Vec<u8>,
}
impl RecordBuilder {
    pub fn new(capture: CapturePolicy, policy: Policy) -> Self {
        Self {
            capture,
            policy,
            rng: SmallRng::seed_from_u64(RNG_SEED),
            bases: Vec::new(),
            ibuf: Vec::new(),
        }
    }

    pub fn capture(&self) -> &CapturePolicy {
        &self.capture
    }

    /// Builds the record for `read`
    ///
    /// `reference` holds the bases of the read's reference sequence, indexed from
    /// position 1. Returns `None` when the nucleotide policy drops the read.
    pub fn build<Q: QualityPolicy + ?Sized>(
        &mut self,
        read: &AlignedRead,
        reference: &[u8],
        coverage: &mut CoverageTrack,
        quality: &Q,
    ) -> Result<Option<Record>> {
        if !self.normalize(&read.bases)? {
            return Ok(None);
        }
        if !read.qualities.is_empty() && read.qualities.len() != self.bases.len() {
            return Err(BuildError::InvalidAlignment(format!(
                "{} bases but {} quality scores",
                self.bases.len(),
                read.qualities.len()
            ))
            .into());
        }
        let read_length = u32::try_from(self.bases.len())
            .map_err(|_| BuildError::InvalidAlignment("read too long".to_string()))?;

        let mut record = Record {
            flags: RecordFlags::from_sam(read.flags),
            reference_id: read.reference_id,
            read_length,
            alignment_start: read.alignment_start,
            read_group: read.read_group,
            read_name: Some(read.name.clone()),
            mapping_quality: read.mapping_quality,
            tags: read
                .tags
                .iter()
                .filter(|tag| self.capture.tags.accepts(tag.key.name))
                .cloned()
                .collect(),
            mate: MateInfo {
                flags: MateFlags::from_sam(read.flags),
                reference_id: read.mate_reference_id,
                alignment_start: i64::from(read.mate_alignment_start),
                template_size: read.template_length,
            },
            ..Default::default()
        };
        if !self.capture.strand {
            record.flags = record.flags.with(RecordFlags::REVERSE, false);
            record.mate.flags = MateFlags::from_bits(record.mate.flags.bits() & !MateFlags::REVERSE);
        }

        if read.is_unmapped() {
            record.bases = Some(self.bases.clone());
            if self.capture.unmapped_quality && !read.qualities.is_empty() {
                record.qualities = Some(read.qualities.clone());
            }
            return Ok(Some(record));
        }

        record.features = self.walk(read, reference, coverage)?;
        if !read.qualities.is_empty() {
            let decision = quality.decide(&record, coverage);
            Self::apply_quality_decision(&mut record, &read.qualities, decision);
        }
        record.features.sort_by_key(|f| f.position);
        Ok(Some(record))
    }

    /// Upper-cases the bases and applies the nucleotide policy if needed
    fn normalize(&mut self, bases: &[u8]) -> Result<bool> {
        self.bases.clear();
        self.bases.extend(bases.iter().map(u8::to_ascii_uppercase));
        if self.bases.iter().all(|&b| Policy::is_valid(b)) {
            return Ok(true);
        }
        if !self.policy.handle(&self.bases, &mut self.ibuf, &mut self.rng)? {
            return Ok(false);
        }
        std::mem::swap(&mut self.bases, &mut self.ibuf);
        Ok(true)
    }

    /// Walks the alignment, updating coverage and collecting features
    fn walk(
        &self,
        read: &AlignedRead,
        reference: &[u8],
        coverage: &mut CoverageTrack,
    ) -> Result<Vec<Feature>> {
        let read_consumed: u64 = read
            .cigar
            .iter()
            .filter(|op| op.consumes_read())
            .map(|op| u64::from(op.length()))
            .sum();
        let ref_consumed: u64 = read
            .cigar
            .iter()
            .filter(|op| op.consumes_reference())
            .map(|op| u64::from(op.length()))
            .sum();
        if ref_consumed == 0 {
            return Err(BuildError::InvalidAlignment("zero-length reference span".into()).into());
        }
        if read_consumed != self.bases.len() as u64 {
            return Err(BuildError::InvalidAlignment(format!(
                "alignment covers {read_consumed} read bases, read has {}",
                self.bases.len()
            ))
            .into());
        }
        if read.alignment_start < 1 {
            return Err(BuildError::InvalidAlignment(format!(
                "alignment start {} is not 1-based",
                read.alignment_start
            ))
            .into());
        }

        let ref_base = |pos: i64| -> Result<u8> {
            reference
                .get((pos - 1) as usize)
                .copied()
                .ok_or_else(|| {
                    BuildError::ReferenceOutOfBounds {
                        position: pos,
                        length: reference.len(),
                    }
                    .into()
                })
        };

        let mut features = Vec::new();
        let mut read_pos = 0usize;
        let mut ref_pos = i64::from(read.alignment_start);
        for op in &read.cigar {
            let len = op.length();
            let n = len as usize;
            match op {
                CigarOp::Match(_) | CigarOp::SeqMatch(_) | CigarOp::SeqMismatch(_) => {
                    coverage.add_coverage(ref_pos, len);
                    for i in 0..n {
                        let reference_base = ref_base(ref_pos + i as i64)?;
                        let read_base = self.bases[read_pos + i];
                        if read_base == reference_base {
                            continue;
                        }
                        coverage.add_mismatch(ref_pos + i as i64);
                        let position = (read_pos + i + 1) as u32;
                        let change = BaseChange::new(reference_base, read_base)?;
                        features.push(Feature::new(position, FeatureKind::Substitution(change)));
                        if self.capture.substitution_quality {
                            if let Some(&score) = read.qualities.get(read_pos + i) {
                                features.push(Feature::new(
                                    position,
                                    FeatureKind::QualityScore(score),
                                ));
                            }
                        }
                    }
                    read_pos += n;
                    ref_pos += i64::from(len);
                }
                CigarOp::Insertion(_) => {
                    let position = (read_pos + 1) as u32;
                    let kind = if n == 1 {
                        FeatureKind::InsertedBase(self.bases[read_pos])
                    } else {
                        FeatureKind::Insertion(self.bases[read_pos..read_pos + n].to_vec())
                    };
                    features.push(Feature::new(position, kind));
                    read_pos += n;
                }
                CigarOp::SoftClip(_) => {
                    let bases = self.bases[read_pos..read_pos + n].to_vec();
                    features.push(Feature::new(
                        (read_pos + 1) as u32,
                        FeatureKind::SoftClip(bases),
                    ));
                    read_pos += n;
                }
                CigarOp::Deletion(_) | CigarOp::RefSkip(_) => {
                    coverage.add_coverage(ref_pos, len);
                    features.push(Feature::new(
                        (read_pos + 1) as u32,
                        FeatureKind::Deletion(len),
                    ));
                    ref_pos += i64::from(len);
                }
                CigarOp::HardClip(_) | CigarOp::Padding(_) => {}
            }
        }
        Ok(features)
    }

    fn apply_quality_decision(record: &mut Record, qualities: &[u8], decision: CaptureDecision) {
        match decision {
            CaptureDecision::Nothing => {}
            CaptureDecision::Everything => record.qualities = Some(qualities.to_vec()),
            CaptureDecision::Positions(mut positions) => {
                positions.sort_unstable();
                positions.dedup();
                for position in positions {
                    let captured = record.features.iter().any(|f| {
                        f.position == position && matches!(f.kind, FeatureKind::QualityScore(_))
                    });
                    let score = (position as usize)
                        .checked_sub(1)
                        .and_then(|i| qualities.get(i));
                    if let (false, Some(&score)) = (captured, score) {
                        record
                            .features
                            .push(Feature::new(position, FeatureKind::QualityScore(score)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{DropQualities, KeepQualities};

    const REFERENCE: &[u8] = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";

    fn read(start: i32, cigar: &str, bases: &[u8]) -> AlignedRead {
        AlignedRead {
            name: b"r1".to_vec(),
            reference_id: 0,
            reference_name: "chr1".into(),
            alignment_start: start,
            mapping_quality: 60,
            cigar: parse_cigar(cigar).unwrap(),
            bases: bases.to_vec(),
            qualities: vec![b'I'; bases.len()],
            read_group: -1,
            ..Default::default()
        }
    }

    fn builder() -> RecordBuilder {
        RecordBuilder::new(CapturePolicy::default(), Policy::default())
    }

    #[test]
    fn test_parse_cigar() -> crate::Result<()> {
        assert_eq!(
            parse_cigar("5S40M2I3D10=1X")?,
            vec![
                CigarOp::SoftClip(5),
                CigarOp::Match(40),
                CigarOp::Insertion(2),
                CigarOp::Deletion(3),
                CigarOp::SeqMatch(10),
                CigarOp::SeqMismatch(1),
            ]
        );
        assert!(parse_cigar("*")?.is_empty());
        assert!(parse_cigar("10").is_err());
        assert!(parse_cigar("M").is_err());
        assert!(parse_cigar("4Q").is_err());
        Ok(())
    }

    #[test]
    fn test_perfect_match_has_no_features() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let input = read(5, "12M", &REFERENCE[4..16]);
        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();

        assert!(record.features.is_empty());
        assert_eq!(record.read_length, 12);
        assert_eq!(record.alignment_end(), 16);
        for pos in 5..17 {
            assert_eq!(coverage.coverage_at(pos), 1);
            assert_eq!(coverage.mismatches_at(pos), 0);
        }
        assert_eq!(coverage.coverage_at(4), 0);
        assert_eq!(coverage.coverage_at(17), 0);
        Ok(())
    }

    #[test]
    fn test_single_substitution() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let mut bases = REFERENCE[0..10].to_vec();
        bases[3] = b'G';
        let input = read(1, "10M", &bases);
        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();

        assert_eq!(record.features.len(), 1);
        let feature = &record.features[0];
        assert_eq!(feature.position, 4);
        assert_eq!(
            feature.kind,
            FeatureKind::Substitution(BaseChange::new(b'T', b'G')?)
        );
        assert_eq!(coverage.mismatches_at(4), 1);
        assert_eq!(record.restore_bases(REFERENCE)?, bases);
        Ok(())
    }

    #[test]
    fn test_indels_and_clips() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        // 2S 4M 1I 3M 2D 4M 3I 1M
        let mut bases = b"TT".to_vec();
        bases.extend_from_slice(&REFERENCE[0..4]);
        bases.push(b'G');
        bases.extend_from_slice(&REFERENCE[4..7]);
        bases.extend_from_slice(&REFERENCE[9..13]);
        bases.extend_from_slice(b"CCC");
        bases.extend_from_slice(&REFERENCE[13..14]);
        let input = read(1, "2S4M1I3M2D4M3I1M", &bases);
        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();

        let codes: Vec<u8> = record.features.iter().map(Feature::code).collect();
        assert_eq!(codes, b"SiDI");
        assert_eq!(record.features[2], Feature::new(11, FeatureKind::Deletion(2)));
        assert_eq!(record.restore_bases(REFERENCE)?, bases);
        assert_eq!(record.alignment_end(), 14);
        assert_eq!(coverage.coverage_at(8), 1);
        Ok(())
    }

    #[test]
    fn test_zero_span_rejected() {
        let mut coverage = CoverageTrack::new(1, 10);
        let input = read(1, "4S", b"ACGT");
        assert!(matches!(
            builder().build(&input, REFERENCE, &mut coverage, &DropQualities),
            Err(crate::Error::BuildError(BuildError::InvalidAlignment(_)))
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut coverage = CoverageTrack::new(1, 10);
        let input = read(1, "6M", b"ACGT");
        assert!(builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)
            .is_err());
    }

    #[test]
    fn test_reference_overrun_rejected() {
        let mut coverage = CoverageTrack::new(1, 10);
        let input = read(38, "4M", b"ACGT");
        assert!(matches!(
            builder().build(&input, REFERENCE, &mut coverage, &DropQualities),
            Err(crate::Error::BuildError(BuildError::ReferenceOutOfBounds { .. }))
        ));
    }

    #[test]
    fn test_unmapped_keeps_bases() -> crate::Result<()> {
        let mut coverage = CoverageTrack::default();
        let mut input = read(0, "*", b"acgtn");
        input.flags = RecordFlags::UNMAPPED;
        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();
        assert!(record.features.is_empty());
        assert_eq!(record.bases.as_deref(), Some(&b"ACGTN"[..]));
        assert_eq!(record.qualities.as_deref(), Some(&b"IIIII"[..]));
        Ok(())
    }

    #[test]
    fn test_quality_capture() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let mut bases = REFERENCE[0..8].to_vec();
        bases[2] = b'A';
        let mut input = read(1, "8M", &bases);
        input.qualities = b"ABCDEFGH".to_vec();

        let capture = CapturePolicy {
            substitution_quality: true,
            ..Default::default()
        };
        let record = RecordBuilder::new(capture, Policy::default())
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();
        assert_eq!(record.features.len(), 2);
        assert_eq!(record.restore_qualities(), b"??C?????");

        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &KeepQualities)?
            .unwrap();
        assert_eq!(record.qualities.as_deref(), Some(&b"ABCDEFGH"[..]));
        Ok(())
    }

    /// Captures the scores of substituted bases covered by a single read
    struct LowDepthSubstitutions;
    impl QualityPolicy for LowDepthSubstitutions {
        fn decide(&self, record: &Record, coverage: &CoverageTrack) -> CaptureDecision {
            let positions = record
                .features
                .iter()
                .filter(|f| matches!(f.kind, FeatureKind::Substitution(_)))
                .filter(|f| {
                    let pos = i64::from(record.alignment_start) + i64::from(f.position) - 1;
                    coverage.coverage_at(pos) < 2
                })
                .map(|f| f.position)
                .collect();
            CaptureDecision::Positions(positions)
        }
    }

    #[test]
    fn test_quality_policy_sees_record_and_coverage() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let mut bases = REFERENCE[0..8].to_vec();
        bases[5] = b'T';
        let mut input = read(1, "8M", &bases);
        input.qualities = b"ABCDEFGH".to_vec();

        let mut builder = builder();
        let record = builder
            .build(&input, REFERENCE, &mut coverage, &LowDepthSubstitutions)?
            .unwrap();
        assert_eq!(record.restore_qualities(), b"?????F??");

        let record = builder
            .build(&input, REFERENCE, &mut coverage, &LowDepthSubstitutions)?
            .unwrap();
        assert_eq!(record.restore_qualities(), b"????????");
        Ok(())
    }

    #[test]
    fn test_strand_capture() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let mut input = read(1, "4M", b"ACGT");
        input.flags = RecordFlags::REVERSE | 0x20;

        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();
        assert!(record.flags.is_reverse());
        assert!(record.mate.flags.is_reverse());

        let capture = CapturePolicy {
            strand: false,
            ..Default::default()
        };
        let record = RecordBuilder::new(capture, Policy::default())
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();
        assert!(!record.flags.is_reverse());
        assert!(!record.mate.flags.is_reverse());
        Ok(())
    }

    #[test]
    fn test_policy_applied() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let input = read(1, "4M", b"AC.T");
        let record = builder()
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();
        assert_eq!(record.restore_bases(REFERENCE)?, b"ACNT");

        let mut skipping = RecordBuilder::new(CapturePolicy::default(), Policy::IgnoreSequence);
        assert!(skipping
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .is_none());
        Ok(())
    }

    #[test]
    fn test_tag_filter() -> crate::Result<()> {
        let mut coverage = CoverageTrack::new(1, REFERENCE.len());
        let mut input = read(1, "4M", b"ACGT");
        input.tags = vec![Tag::new(*b"NM", b'i', [0u8]), Tag::new(*b"MD", b'Z', *b"4\0")];
        let capture = CapturePolicy {
            tags: TagFilter::Drop(vec![*b"MD"]),
            ..Default::default()
        };
        let record = RecordBuilder::new(capture, Policy::default())
            .build(&input, REFERENCE, &mut coverage, &DropQualities)?
            .unwrap();
        assert_eq!(record.tags.len(), 1);
        assert_eq!(&record.tags[0].key.name, b"NM");
        Ok(())
    }
}
