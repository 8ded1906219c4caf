use std::collections::BTreeMap;
use std::io::{Read, Write};

use zstd::{Decoder, Encoder};

use super::stats::ByteReport;
use crate::codec::itf8;
use crate::error::{CodecError, Result};
use crate::record::{CodecConfig, Record, RecordReader, RecordWriter};
use crate::series::{EncodingTable, InputStreams, OutputStreams, StreamId};

/// zstd level used for every block
const COMPRESSION_LEVEL: i32 = 3;

/// One flush unit of records: the core block plus one block per external stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub records: u32,
    /// Alignment start the first record's delta is taken against
    pub baseline: i32,
    pub core: Vec<u8>,
    pub external: BTreeMap<StreamId, Vec<u8>>,
}
impl Slice {
    /// Serializes `records` through the series of `table`
    pub fn encode(records: &[Record], table: &EncodingTable, config: CodecConfig) -> Result<Self> {
        let baseline = records.first().map_or(0, |r| r.alignment_start);
        let mut out = OutputStreams::new();
        let writer = RecordWriter::new(table, config, &mut out)?;
        let mut prev_start = baseline;
        for record in records {
            writer.write(record, &mut prev_start, &mut out)?;
        }
        let (core, external) = out.finish();
        let count = u32::try_from(records.len())
            .map_err(|_| CodecError::ValueOutOfRange(records.len() as i64))?;
        Ok(Self {
            records: count,
            baseline,
            core,
            external,
        })
    }

    /// Decodes the records, numbering them from `first_index`
    pub fn decode(
        &self,
        table: &EncodingTable,
        config: CodecConfig,
        first_index: usize,
    ) -> Result<Vec<Record>> {
        let mut input = InputStreams::new(&self.core, &self.external);
        let reader = RecordReader::new(table, config, &input)?;
        let mut prev_start = self.baseline;
        (0..self.records as usize)
            .map(|i| reader.read(&mut input, &mut prev_start, first_index + i))
            .collect()
    }

    fn write_block(block: &[u8], buf: &mut Vec<u8>, compress: bool) -> Result<usize> {
        let stored = if compress {
            let mut zbuf = Vec::new();
            let mut encoder = Encoder::new(&mut zbuf, COMPRESSION_LEVEL)?;
            encoder.write_all(block)?;
            encoder.finish()?;
            zbuf
        } else {
            block.to_vec()
        };
        itf8::encode(stored.len() as u32, buf);
        buf.extend_from_slice(&stored);
        Ok(stored.len())
    }

    fn read_block<R: Read>(reader: &mut R, compressed: bool) -> Result<Vec<u8>> {
        let stored = itf8::read_prefixed(reader)?;
        if !compressed {
            return Ok(stored);
        }
        let mut decoder = Decoder::with_buffer(stored.as_slice())?;
        let mut block = Vec::new();
        decoder.read_to_end(&mut block)?;
        Ok(block)
    }

    /// Appends the slice to `buf`, recording the stored size of every block
    pub fn write_to(&self, buf: &mut Vec<u8>, compress: bool, report: &mut ByteReport) -> Result<()> {
        itf8::encode(self.records, buf);
        itf8::encode_signed(self.baseline, buf);
        report.add_core(Self::write_block(&self.core, buf, compress)?);
        itf8::encode(self.external.len() as u32, buf);
        for (&stream, block) in &self.external {
            itf8::encode(stream, buf);
            report.add_external(stream, Self::write_block(block, buf, compress)?);
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R, compressed: bool) -> Result<Self> {
        let records = itf8::read_itf8(reader)?;
        let baseline = itf8::read_itf8_signed(reader)?;
        let core = Self::read_block(reader, compressed)?;
        let count = itf8::read_itf8(reader)?;
        let mut external = BTreeMap::new();
        for _ in 0..count {
            let stream = itf8::read_itf8(reader)?;
            external.insert(stream, Self::read_block(reader, compressed)?);
        }
        Ok(Self {
            records,
            baseline,
            core,
            external,
        })
    }
}
