pub mod codec;
pub mod container;
mod error;
mod policy;
pub mod quality;
pub mod record;
mod reference;
pub mod series;

pub use container::{
    CompressionReport, ContainerReader, ContainerWriter, ContainerWriterBuilder, DecodedContainer,
};
pub use error::{
    BuildError, CodecError, Error, HeaderError, ReadError, ReferenceError, Result, WriteError,
};
pub use policy::{Policy, RNG_SEED};
pub use quality::{CaptureDecision, DropQualities, KeepQualities, QualityPolicy};
pub use record::{AlignedRead, CapturePolicy, Record};
pub use reference::{normalize_bases, ReferenceSet, ReferenceSource};
pub use series::{AdaptiveStrategy, EncodingStrategy, FixedStrategy};

#[cfg(test)]
mod testing {

    use super::*;
    use crate::record::{parse_cigar, BaseChange, Feature, FeatureKind, RecordFlags};
    use anyhow::Result;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_bases(rng: &mut SmallRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.random_range(0..4usize)]).collect()
    }

    fn references(rng: &mut SmallRng) -> ReferenceSet {
        let mut set = ReferenceSet::new();
        set.insert("chr1", &random_bases(rng, 200));
        set.insert("chr2", &random_bases(rng, 2000));
        set
    }

    fn mapped(
        name: &str,
        reference: &ReferenceSet,
        reference_id: i32,
        start: i32,
        len: usize,
    ) -> Result<AlignedRead> {
        let reference_name = format!("chr{}", reference_id + 1);
        let bases = reference.get_bases(&reference_name)?;
        let from = (start - 1) as usize;
        Ok(AlignedRead {
            name: name.as_bytes().to_vec(),
            flags: 0,
            reference_id,
            reference_name,
            alignment_start: start,
            mapping_quality: 42,
            cigar: parse_cigar(&format!("{len}M"))?,
            bases: bases[from..from + len].to_vec(),
            qualities: vec![b'I'; len],
            read_group: -1,
            mate_reference_id: -1,
            ..Default::default()
        })
    }

    fn substitute(base: u8) -> u8 {
        if base == b'A' {
            b'C'
        } else {
            b'A'
        }
    }

    /// One perfect match, one single substitution, one unmapped read
    fn three_reads(reference: &ReferenceSet) -> Result<Vec<AlignedRead>> {
        let perfect = mapped("perfect", reference, 0, 11, 50)?;
        let mut substituted = mapped("substituted", reference, 0, 61, 40)?;
        substituted.bases[7] = substitute(substituted.bases[7]);
        let unmapped = AlignedRead {
            name: b"unmapped".to_vec(),
            flags: RecordFlags::UNMAPPED,
            reference_id: 0,
            reference_name: "chr1".to_string(),
            bases: b"ACGTNACGTA".to_vec(),
            qualities: b"!!!!IIII##".to_vec(),
            read_group: -1,
            mate_reference_id: -1,
            ..Default::default()
        };
        Ok(vec![perfect, substituted, unmapped])
    }

    fn write_reads(
        builder: ContainerWriterBuilder,
        reads: &[AlignedRead],
        reference: &ReferenceSet,
    ) -> Result<(Vec<u8>, CompressionReport)> {
        let mut buf = Vec::new();
        let report = {
            let mut writer = builder.build(&mut buf, reference)?;
            for read in reads {
                assert!(writer.push(read)?);
            }
            writer.finish()?;
            writer.report().clone()
        };
        Ok((buf, report))
    }

    fn read_all(buf: &[u8]) -> Result<Vec<DecodedContainer>> {
        let reader = ContainerReader::new(buf)?;
        Ok(reader.collect::<crate::Result<Vec<_>>>()?)
    }

    #[test]
    fn test_three_read_round_trip() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(RNG_SEED);
        let reference = references(&mut rng);
        let chr1 = reference.get_bases("chr1")?;
        let reads = three_reads(&reference)?;

        for compress in [false, true] {
            for adaptive in [false, true] {
                let mut builder = ContainerWriterBuilder::default().compress(compress);
                builder = if adaptive {
                    builder.strategy(AdaptiveStrategy::default())
                } else {
                    builder.strategy(FixedStrategy)
                };
                let (buf, report) = write_reads(builder, &reads, &reference)?;
                assert_eq!(report.containers, 1);
                assert_eq!(report.bytes.bases, 100);

                let containers = read_all(&buf)?;
                assert_eq!(containers.len(), 1);
                let records = &containers[0].records;
                assert_eq!(records.len(), 3);
                assert_eq!(containers[0].header.reference_length, 200);

                assert!(records[0].features.is_empty());
                assert_eq!(records[0].alignment_start, 11);
                assert_eq!(records[0].restore_bases(&chr1)?, reads[0].bases);

                assert_eq!(records[1].alignment_start, 61);
                let expected = Feature::new(
                    8,
                    FeatureKind::Substitution(BaseChange::new(chr1[67], reads[1].bases[7])?),
                );
                assert_eq!(records[1].features, vec![expected]);
                assert_eq!(records[1].restore_bases(&chr1)?, reads[1].bases);

                assert!(records[2].is_unmapped());
                assert!(records[2].features.is_empty());
                assert_eq!(records[2].bases.as_deref(), Some(&b"ACGTNACGTA"[..]));
                assert_eq!(records[2].restore_qualities(), reads[2].qualities);

                for (record, read) in records.iter().zip(&reads) {
                    assert_eq!(record.read_name.as_deref(), Some(read.name.as_slice()));
                    assert_eq!(record.reference_id, 0);
                    assert!(record.detached);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_reference_change_splits_containers() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(RNG_SEED);
        let reference = references(&mut rng);
        let mut reads = Vec::new();
        for i in 0..5 {
            reads.push(mapped(&format!("a{i}"), &reference, 0, 1 + 20 * i, 30)?);
        }
        for i in 0..3 {
            reads.push(mapped(&format!("b{i}"), &reference, 1, 100 + 50 * i, 30)?);
        }

        let (buf, report) = write_reads(ContainerWriterBuilder::default(), &reads, &reference)?;
        assert_eq!(report.containers, 2);

        let containers = read_all(&buf)?;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].header.reference_id, 0);
        assert_eq!(containers[0].records.len(), 5);
        assert_eq!(containers[1].header.reference_id, 1);
        assert_eq!(containers[1].records.len(), 3);
        assert_eq!(containers[1].header.reference_length, 2000);
        assert!(containers[1].records.iter().all(|r| r.reference_id == 1));
        Ok(())
    }

    #[test]
    fn test_mates_are_linked() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(RNG_SEED);
        let reference = references(&mut rng);
        let mut first = mapped("pair", &reference, 1, 10, 10)?;
        first.flags = RecordFlags::MULTI_FRAGMENT | RecordFlags::FIRST_SEGMENT | 0x20;
        let lonely = mapped("lonely", &reference, 1, 40, 10)?;
        let mut second = mapped("pair", &reference, 1, 80, 10)?;
        second.flags = RecordFlags::MULTI_FRAGMENT | RecordFlags::LAST_SEGMENT | RecordFlags::REVERSE;
        let mut detached = mapped("far", &reference, 1, 90, 10)?;
        detached.mate_reference_id = 0;
        detached.mate_alignment_start = 150;
        detached.template_length = -77;
        let reads = vec![first, lonely, second, detached];

        for preserve in [false, true] {
            let builder = ContainerWriterBuilder::default().preserve_read_names(preserve);
            let (buf, _) = write_reads(builder, &reads, &reference)?;
            let records = read_all(&buf)?.remove(0).records;

            assert_eq!(records[0].records_to_next_fragment, Some(1));
            assert_eq!(records[0].next, Some(2));
            assert_eq!(records[2].previous, Some(0));
            assert!(!records[0].detached && !records[2].detached);
            assert_eq!(records[0].read_name, records[2].read_name);
            if preserve {
                assert_eq!(records[0].read_name.as_deref(), Some(&b"pair"[..]));
            } else {
                assert_eq!(records[0].read_name.as_deref(), Some(&b"read0"[..]));
            }

            assert!(records[0].mate.flags.is_reverse());
            assert_eq!(records[0].mate.alignment_start, 80);
            assert_eq!(records[0].mate.template_size, 80);
            assert_eq!(records[2].mate.template_size, -80);
            assert_eq!(records[0].sam_flags() & 0x20, 0x20);

            assert!(records[1].detached);
            assert_eq!(records[1].read_name.as_deref(), Some(&b"lonely"[..]));
            assert!(records[3].detached);
            assert_eq!(records[3].mate.reference_id, 0);
            assert_eq!(records[3].mate.alignment_start, 150);
            assert_eq!(records[3].mate.template_size, -77);
        }
        Ok(())
    }

    #[test]
    fn test_many_reads_with_indels() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(RNG_SEED);
        let reference = references(&mut rng);
        let chr2 = reference.get_bases("chr2")?;

        let mut reads = Vec::new();
        for i in 0..250 {
            let start = rng.random_range(1..1900);
            let mut read = mapped(&format!("r{}", i / 2), &reference, 1, start, 60)?;
            for _ in 0..rng.random_range(0..4) {
                let at = rng.random_range(0..60usize);
                read.bases[at] = substitute(read.bases[at]);
            }
            reads.push(read);
        }
        // 3S10M2I5M3D10M: clip, match, insertion, match, deletion, match
        let start = 500usize;
        let mut bases = b"GGG".to_vec();
        bases.extend_from_slice(&chr2[start - 1..start + 9]);
        bases.extend_from_slice(b"TT");
        bases.extend_from_slice(&chr2[start + 9..start + 14]);
        bases.extend_from_slice(&chr2[start + 17..start + 27]);
        let mut indel = mapped("indel", &reference, 1, start as i32, 10)?;
        indel.cigar = parse_cigar("3S10M2I5M3D10M")?;
        indel.qualities = vec![b'5'; bases.len()];
        indel.bases = bases;
        reads.push(indel);

        let builder = ContainerWriterBuilder::default()
            .max_container_records(100)
            .max_slice_records(30)
            .quality_policy(KeepQualities)
            .debug_markers(true);
        let (buf, report) = write_reads(builder, &reads, &reference)?;
        assert_eq!(report.containers, 3);
        assert_eq!(report.records, reads.len());
        assert!(report.bytes.bits_per_base() > 0.0);

        let containers = read_all(&buf)?;
        assert_eq!(containers.len(), 3);
        assert_eq!(containers[0].header.slices, 4);
        let records: Vec<Record> = containers.into_iter().flat_map(|c| c.records).collect();
        assert_eq!(records.len(), reads.len());
        for (record, read) in records.iter().zip(&reads) {
            assert_eq!(record.alignment_start, read.alignment_start);
            assert_eq!(record.restore_bases(&chr2)?, read.bases);
            assert_eq!(record.restore_qualities(), read.qualities);
        }
        Ok(())
    }

    #[test]
    fn test_headless_and_truncation() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(RNG_SEED);
        let reference = references(&mut rng);
        let reads = three_reads(&reference)?;
        let (buf, _) = write_reads(
            ContainerWriterBuilder::default().headless(true),
            &reads,
            &reference,
        )?;

        let mut reader = ContainerReader::headless(buf.as_slice());
        assert!(reader.next_container()?.is_some());
        assert!(reader.next_container()?.is_none());

        let truncated = &buf[..buf.len() - 5];
        let mut reader = ContainerReader::headless(truncated);
        assert!(matches!(
            reader.next_container(),
            Err(Error::ReadError(ReadError::ContainerTruncation(_)))
        ));
        Ok(())
    }
}
