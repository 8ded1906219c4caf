use std::collections::BTreeMap;
use std::fmt;

use crate::series::StreamId;

/// Stored size of one container's blocks against the bases it encodes
///
/// Sizes are measured after compression, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteReport {
    pub core_bits: u64,
    pub external_bits: BTreeMap<StreamId, u64>,
    pub bases: u64,
}
impl ByteReport {
    pub fn add_core(&mut self, bytes: usize) {
        self.core_bits += 8 * bytes as u64;
    }

    pub fn add_external(&mut self, stream: StreamId, bytes: usize) {
        *self.external_bits.entry(stream).or_default() += 8 * bytes as u64;
    }

    pub fn total_bits(&self) -> u64 {
        self.core_bits + self.external_bits.values().sum::<u64>()
    }

    fn per_base(&self, bits: u64) -> f64 {
        if self.bases == 0 {
            0.0
        } else {
            bits as f64 / self.bases as f64
        }
    }

    pub fn core_bits_per_base(&self) -> f64 {
        self.per_base(self.core_bits)
    }

    pub fn external_bits_per_base(&self, stream: StreamId) -> Option<f64> {
        self.external_bits
            .get(&stream)
            .map(|&bits| self.per_base(bits))
    }

    pub fn bits_per_base(&self) -> f64 {
        self.per_base(self.total_bits())
    }

    pub fn merge(&mut self, other: &ByteReport) {
        self.core_bits += other.core_bits;
        for (&stream, &bits) in &other.external_bits {
            *self.external_bits.entry(stream).or_default() += bits;
        }
        self.bases += other.bases;
    }
}
impl fmt::Display for ByteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core {:.2} b/b", self.core_bits_per_base())?;
        for (&stream, &bits) in &self.external_bits {
            write!(f, ", ex{stream} {:.2} b/b", self.per_base(bits))?;
        }
        Ok(())
    }
}

/// Byte accounting accumulated over every container a writer emitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionReport {
    pub containers: usize,
    pub records: usize,
    pub bytes: ByteReport,
    /// Report of the most recent container
    pub last: Option<ByteReport>,
}
impl CompressionReport {
    pub fn add_container(&mut self, records: usize, report: ByteReport) {
        self.containers += 1;
        self.records += records;
        self.bytes.merge(&report);
        self.last = Some(report);
    }
}
impl fmt::Display for CompressionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} containers, {} records, {} bases: {}",
            self.containers, self.records, self.bytes.bases, self.bytes
        )
    }
}
