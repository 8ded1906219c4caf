use std::collections::HashMap;

use log::warn;

use super::{MateFlags, MateInfo, Record};
use crate::error::{CodecError, Result};

/// Pairs records that share a read name within one batch
///
/// The earlier record of a pair gets `records_to_next_fragment` and `next`, the
/// later one `previous`; both are attached. Records whose mate never shows up
/// in the batch are marked detached and keep their explicit mate coordinates.
pub fn link_mates(records: &mut [Record]) {
    let mut pending: HashMap<Vec<u8>, usize> = HashMap::new();
    for i in 0..records.len() {
        records[i].detached = false;
        records[i].records_to_next_fragment = None;
        records[i].next = None;
        records[i].previous = None;

        let Some(name) = records[i].read_name.clone() else {
            records[i].detached = true;
            continue;
        };
        match pending.remove(&name) {
            Some(earlier) => {
                records[earlier].records_to_next_fragment = Some((i - earlier - 1) as u32);
                records[earlier].next = Some(i);
                records[i].previous = Some(earlier);
            }
            None => {
                pending.insert(name, i);
            }
        }
    }
    for (_, i) in pending {
        records[i].detached = true;
    }
}

/// Signed observed template length of two mapped segments
///
/// The magnitude spans from the leftmost aligned base to the rightmost one. The
/// segment that starts leftmost gets the positive value; on a tie, `first` does.
/// Segments on different references, or unmapped ones, have a template size of 0.
pub fn template_size(first: &Record, second: &Record) -> i32 {
    if first.reference_id != second.reference_id || first.is_unmapped() || second.is_unmapped() {
        return 0;
    }
    let left = i64::from(first.alignment_start.min(second.alignment_start));
    let right = first.alignment_end().max(second.alignment_end());
    let size = i32::try_from(right - left + 1).unwrap_or(i32::MAX);
    if first.alignment_start <= second.alignment_start {
        size
    } else {
        -size
    }
}

fn mate_info_of(mate: &Record, template_size: i32) -> MateInfo {
    let mut bits = 0;
    if mate.flags.is_reverse() {
        bits |= MateFlags::REVERSE;
    }
    if mate.is_unmapped() {
        bits |= MateFlags::UNMAPPED;
    }
    MateInfo {
        flags: MateFlags::from_bits(bits),
        reference_id: mate.reference_id,
        alignment_start: i64::from(mate.alignment_start),
        template_size,
    }
}

/// Restores in-batch mate links after decoding
///
/// Follows each `records_to_next_fragment` distance, sets `next`/`previous`,
/// copies the read name to the downstream mate, and rebuilds both records'
/// mate coordinates and template size.
pub fn resolve_mates(records: &mut [Record]) -> Result<()> {
    let len = records.len();
    for i in 0..len {
        let Some(distance) = records[i].records_to_next_fragment else {
            continue;
        };
        let j = i + distance as usize + 1;
        if j >= len {
            return Err(CodecError::InvalidMateDistance { index: i, len }.into());
        }
        if records[j].previous.is_some() {
            warn!("record {j} is claimed as mate by more than one record");
        }
        records[i].next = Some(j);
        records[j].previous = Some(i);
        if records[j].read_name.is_none() {
            records[j].read_name = records[i].read_name.clone();
        }
        let size = template_size(&records[i], &records[j]);
        records[i].mate = mate_info_of(&records[j], size);
        records[j].mate = mate_info_of(&records[i], -size);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordFlags;

    fn named(name: &str) -> Record {
        Record {
            read_name: Some(name.as_bytes().to_vec()),
            ..Default::default()
        }
    }

    #[test]
    fn test_link_with_gap() {
        let mut records = vec![named("x"), named("y"), named("x")];
        link_mates(&mut records);

        assert_eq!(records[0].records_to_next_fragment, Some(1));
        assert_eq!(records[0].next, Some(2));
        assert_eq!(records[2].previous, Some(0));
        assert!(!records[0].detached);
        assert!(!records[2].detached);
        assert!(records[1].detached);
        assert_eq!(records[1].records_to_next_fragment, None);
        assert_eq!(records[1].next, None);
    }

    #[test]
    fn test_adjacent_pair_and_relink() {
        let mut records = vec![named("a"), named("a"), named("b"), named("b")];
        link_mates(&mut records);
        assert_eq!(records[0].records_to_next_fragment, Some(0));
        assert_eq!(records[2].records_to_next_fragment, Some(0));
        assert!(records.iter().all(|r| !r.detached));

        // running again on a subset starts from a clean slate
        link_mates(&mut records[1..3]);
        assert!(records[1].detached && records[2].detached);
        assert_eq!(records[2].records_to_next_fragment, None);
    }

    #[test]
    fn test_template_size_sign() {
        let mut left = named("p");
        left.alignment_start = 100;
        left.read_length = 50;
        let mut right = named("p");
        right.alignment_start = 300;
        right.read_length = 50;

        assert_eq!(template_size(&left, &right), 250);
        assert_eq!(template_size(&right, &left), -250);

        right.reference_id = 1;
        assert_eq!(template_size(&left, &right), 0);
    }

    #[test]
    fn test_resolve_restores_mate_info() -> crate::Result<()> {
        let mut first = named("pair");
        first.alignment_start = 10;
        first.read_length = 20;
        first.records_to_next_fragment = Some(1);
        let other = named("solo");
        let mut second = Record {
            alignment_start: 40,
            read_length: 20,
            flags: RecordFlags::from_sam(RecordFlags::REVERSE),
            ..Default::default()
        };
        second.read_name = None;

        let mut records = vec![first, other, second];
        resolve_mates(&mut records)?;

        assert_eq!(records[0].next, Some(2));
        assert_eq!(records[2].previous, Some(0));
        assert_eq!(records[2].read_name.as_deref(), Some(&b"pair"[..]));
        assert_eq!(records[0].mate.alignment_start, 40);
        assert!(records[0].mate.flags.is_reverse());
        assert_eq!(records[0].mate.template_size, 50);
        assert_eq!(records[2].mate.template_size, -50);
        assert_eq!(records[2].mate.alignment_start, 10);
        Ok(())
    }

    #[test]
    fn test_resolve_rejects_overrun() {
        let mut record = named("z");
        record.records_to_next_fragment = Some(3);
        assert!(resolve_mates(&mut [record]).is_err());
    }
}
