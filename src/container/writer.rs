//! Writer that batches aligned reads into containers
//!
//! Reads are diffed against their reference as they arrive and collected into a
//! batch. A batch is flushed as one container when it reaches the configured
//! record count, when the next read belongs to another reference sequence, and
//! when the writer finishes.
//!
//! # Example
//!
//! ```rust,no_run
//! use diffseq::container::ContainerWriterBuilder;
//! use diffseq::record::{parse_cigar, AlignedRead};
//! use diffseq::ReferenceSet;
//!
//! let mut reference = ReferenceSet::new();
//! reference.insert("chr1", b"ACGTACGTACGT");
//!
//! let mut buf = Vec::new();
//! let mut writer = ContainerWriterBuilder::default()
//!     .max_container_records(50_000)
//!     .build(&mut buf, reference)
//!     .unwrap();
//!
//! let read = AlignedRead {
//!     name: b"r1".to_vec(),
//!     reference_name: "chr1".to_string(),
//!     alignment_start: 3,
//!     cigar: parse_cigar("4M").unwrap(),
//!     bases: b"GTAC".to_vec(),
//!     ..Default::default()
//! };
//! writer.push(&read).unwrap();
//! writer.finish().unwrap();
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use super::header::{ContainerHeader, FileHeader};
use super::slice::Slice;
use super::stats::{ByteReport, CompressionReport};
use crate::error::{Result, WriteError};
use crate::policy::Policy;
use crate::quality::{DropQualities, QualityPolicy};
use crate::record::{
    collect_stats, link_mates, most_common_read_length, AlignedRead, CapturePolicy, CodecConfig,
    CoverageTrack, Record, RecordBuilder,
};
use crate::reference::ReferenceSource;
use crate::series::{AdaptiveStrategy, EncodingStrategy};

/// Default number of records per container
pub const DEFAULT_CONTAINER_RECORDS: usize = 100_000;

/// Default number of records per slice
pub const DEFAULT_SLICE_RECORDS: usize = 10_000;

/// Builder for [`ContainerWriter`]
///
/// Every setting is optional and falls back to a default in [`build`](Self::build).
#[derive(Default)]
pub struct ContainerWriterBuilder {
    max_container_records: Option<usize>,
    max_slice_records: Option<usize>,
    compress: Option<bool>,
    preserve_read_names: Option<bool>,
    debug_markers: Option<bool>,
    capture: Option<CapturePolicy>,
    policy: Option<Policy>,
    quality_policy: Option<Box<dyn QualityPolicy>>,
    strategy: Option<Box<dyn EncodingStrategy>>,
    headless: Option<bool>,
}
impl ContainerWriterBuilder {
    /// Sets how many records a container holds before it is flushed
    pub fn max_container_records(mut self, records: usize) -> Self {
        self.max_container_records = Some(records);
        self
    }

    /// Sets how many records go into one slice of a container
    pub fn max_slice_records(mut self, records: usize) -> Self {
        self.max_slice_records = Some(records);
        self
    }

    /// Sets whether blocks are zstd-compressed
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    /// Sets whether every read name is stored
    ///
    /// Without it only names of detached records survive; the reader generates
    /// the others.
    pub fn preserve_read_names(mut self, preserve: bool) -> Self {
        self.preserve_read_names = Some(preserve);
        self
    }

    /// Sets whether records are bracketed by sentinels checked on decode
    pub fn debug_markers(mut self, markers: bool) -> Self {
        self.debug_markers = Some(markers);
        self
    }

    pub fn capture(mut self, capture: CapturePolicy) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Sets the policy for read bases outside `ACGTN`
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn quality_policy(mut self, quality: impl QualityPolicy + 'static) -> Self {
        self.quality_policy = Some(Box::new(quality));
        self
    }

    /// Sets how each container's encoding table is chosen
    pub fn strategy(mut self, strategy: impl EncodingStrategy + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Sets whether to skip the file header
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    /// Builds the writer, writing the file header unless headless
    ///
    /// # Errors
    ///
    /// * `WriteError::InvalidBatchSize` - If the slice size is zero or exceeds the container size
    pub fn build<W: Write, R: ReferenceSource>(
        self,
        inner: W,
        reference: R,
    ) -> Result<ContainerWriter<W, R>> {
        let container = self
            .max_container_records
            .unwrap_or(DEFAULT_CONTAINER_RECORDS);
        let slice = self
            .max_slice_records
            .unwrap_or(DEFAULT_SLICE_RECORDS)
            .min(container);
        if container == 0 || slice == 0 {
            return Err(WriteError::InvalidBatchSize { container, slice }.into());
        }
        let mut writer = ContainerWriter {
            inner,
            reference,
            builder: RecordBuilder::new(
                self.capture.unwrap_or_default(),
                self.policy.unwrap_or_default(),
            ),
            quality: self
                .quality_policy
                .unwrap_or_else(|| Box::new(DropQualities)),
            strategy: self
                .strategy
                .unwrap_or_else(|| Box::new(AdaptiveStrategy::default())),
            max_container_records: container,
            max_slice_records: slice,
            compress: self.compress.unwrap_or(true),
            read_names: self.preserve_read_names.unwrap_or(false),
            debug_markers: self.debug_markers.unwrap_or(false),
            batch: Vec::new(),
            batch_reference: None,
            coverage: CoverageTrack::default(),
            report: CompressionReport::default(),
            reported: false,
        };
        if !self.headless.unwrap_or(false) {
            FileHeader::new(writer.compress).write_bytes(&mut writer.inner)?;
        }
        Ok(writer)
    }
}

/// Reference sequence of the batch being accumulated
struct BatchReference {
    id: i32,
    bases: Arc<[u8]>,
}

/// Batches aligned reads into containers and writes them to `W`
///
/// A container never mixes reads of two reference sequences.
pub struct ContainerWriter<W: Write, R: ReferenceSource> {
    inner: W,
    reference: R,
    builder: RecordBuilder,
    quality: Box<dyn QualityPolicy>,
    strategy: Box<dyn EncodingStrategy>,
    max_container_records: usize,
    max_slice_records: usize,
    compress: bool,
    read_names: bool,
    debug_markers: bool,
    batch: Vec<Record>,
    batch_reference: Option<BatchReference>,
    coverage: CoverageTrack,
    report: CompressionReport,
    /// Whether `report` has been logged since the last container
    reported: bool,
}
impl<W: Write, R: ReferenceSource> ContainerWriter<W, R> {
    /// Byte accounting of every container written so far
    pub fn report(&self) -> &CompressionReport {
        &self.report
    }

    /// Records waiting in the current batch
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    fn start_batch(&mut self, read: &AlignedRead) -> Result<()> {
        let bases = if read.reference_id >= 0 && !read.reference_name.is_empty() {
            self.reference.get_bases(&read.reference_name)?
        } else {
            Arc::from(Vec::new())
        };
        debug!(
            "starting batch for sequence {} ({} bases)",
            read.reference_id,
            bases.len()
        );
        // reads of a batch are not sorted by position
        self.coverage = CoverageTrack::new(1, bases.len());
        self.batch_reference = Some(BatchReference {
            id: read.reference_id,
            bases,
        });
        Ok(())
    }

    /// Diffs one read and adds it to the current batch
    ///
    /// Flushes first when the read belongs to another reference sequence, and
    /// afterwards when the batch is full. Returns `false` when the nucleotide
    /// policy dropped the read.
    pub fn push(&mut self, read: &AlignedRead) -> Result<bool> {
        if let Some(current) = &self.batch_reference {
            if current.id != read.reference_id {
                self.flush()?;
            }
        }
        if self.batch_reference.is_none() {
            self.start_batch(read)?;
        }
        let Some(reference) = &self.batch_reference else {
            return Ok(false);
        };
        let built = self.builder.build(
            read,
            &reference.bases,
            &mut self.coverage,
            self.quality.as_ref(),
        )?;
        let Some(mut record) = built else {
            return Ok(false);
        };
        record.index = self.batch.len();
        self.batch.push(record);
        if self.batch.len() >= self.max_container_records {
            self.flush()?;
        }
        Ok(true)
    }

    /// Writes the current batch as one container
    ///
    /// The container is assembled in memory and written in a single call. On
    /// failure the batch is dropped and nothing of it has been emitted by this
    /// writer.
    pub fn flush(&mut self) -> Result<()> {
        let reference = self.batch_reference.take();
        let mut records = std::mem::take(&mut self.batch);
        let Some(reference) = reference else {
            return Ok(());
        };
        if records.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        link_mates(&mut records);
        let config = CodecConfig {
            read_names: self.read_names,
            debug_markers: self.debug_markers,
            read_length_default: most_common_read_length(&records),
        };
        let stats = collect_stats(&records, self.max_slice_records, &config);
        let table = self.strategy.select(&stats);

        let mut body = Vec::new();
        table.write_to(&mut body);
        let mut bytes = ByteReport {
            bases: records.iter().map(|r| u64::from(r.read_length)).sum(),
            ..Default::default()
        };
        let mut slices = 0usize;
        for chunk in records.chunks(self.max_slice_records) {
            Slice::encode(chunk, &table, config)?.write_to(&mut body, self.compress, &mut bytes)?;
            slices += 1;
        }
        let slices = u16::try_from(slices).map_err(|_| WriteError::TooManySlices(slices))?;

        let mut flags = 0;
        if self.read_names {
            flags |= ContainerHeader::READ_NAMES;
        }
        if self.debug_markers {
            flags |= ContainerHeader::DEBUG_MARKERS;
        }
        if self.compress {
            flags |= ContainerHeader::COMPRESSED;
        }
        let capture = self.builder.capture();
        if capture.substitution_quality {
            flags |= ContainerHeader::SUBSTITUTION_QUALITY;
        }
        if capture.unmapped_quality {
            flags |= ContainerHeader::UNMAPPED_QUALITY;
        }
        if capture.strand {
            flags |= ContainerHeader::STRAND;
        }
        let header = ContainerHeader::new(
            body.len() as u64,
            reference.id,
            reference.bases.len() as u32,
            records.len() as u32,
            config.read_length_default,
            flags,
            slices,
        );
        let built = start.elapsed();

        let start = Instant::now();
        let mut buf = Vec::with_capacity(body.len() + super::SIZE_CONTAINER_HEADER);
        header.write_bytes(&mut buf)?;
        buf.extend_from_slice(&body);
        self.inner.write_all(&buf)?;
        info!(
            "container for sequence {}: {} records in {} slices, {} bytes (build {:?}, write {:?}); {}",
            reference.id,
            records.len(),
            slices,
            buf.len(),
            built,
            start.elapsed(),
            bytes
        );

        self.report.add_container(records.len(), bytes);
        self.reported = false;
        Ok(())
    }

    /// Flushes the pending batch and the inner writer
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.flush()?;
        if !self.reported && self.report.containers > 0 {
            info!("STATS: {}", self.report);
            self.reported = true;
        }
        Ok(())
    }
}
impl<W: Write, R: ReferenceSource> Drop for ContainerWriter<W, R> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            error!("ContainerWriter: failed to finish writing: {err}");
        }
    }
}
