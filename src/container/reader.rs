//! Reader that decodes containers back into records

use std::io::{self, Read};

use log::debug;

use super::header::{ContainerHeader, FileHeader, SIZE_CONTAINER_HEADER};
use super::slice::Slice;
use crate::error::{HeaderError, ReadError, Result};
use crate::record::{resolve_mates, CodecConfig, Record};
use crate::series::EncodingTable;

/// Prefix of read names generated for records stored without one
pub const DEFAULT_NAME_PREFIX: &str = "read";

/// One decoded container
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    pub header: ContainerHeader,
    pub table: EncodingTable,
    /// Records in write order with mate links resolved
    pub records: Vec<Record>,
}
impl DecodedContainer {
    /// Whether record and mate strands were kept; otherwise all read as forward
    pub fn strand_captured(&self) -> bool {
        self.header.has_flag(ContainerHeader::STRAND)
    }

    /// Whether scores of substituted bases were kept
    pub fn substitution_qualities_captured(&self) -> bool {
        self.header.has_flag(ContainerHeader::SUBSTITUTION_QUALITY)
    }

    /// Whether full quality strings of unmapped reads were kept
    pub fn unmapped_qualities_captured(&self) -> bool {
        self.header.has_flag(ContainerHeader::UNMAPPED_QUALITY)
    }
}

/// Reads until `buf` is full or the input ends, returning the bytes read
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decodes the containers of a stream one at a time
///
/// Also iterates as `Result<DecodedContainer>`.
pub struct ContainerReader<R: Read> {
    inner: R,
    header: Option<FileHeader>,
    name_prefix: String,
    /// Records decoded so far, used to number generated names
    records_read: usize,
    /// Container bytes read so far
    bytes_read: usize,
}
impl<R: Read> ContainerReader<R> {
    /// Opens a stream that starts with a file header
    pub fn new(mut inner: R) -> Result<Self> {
        let header = FileHeader::from_reader(&mut inner)?;
        let mut reader = Self::headless(inner);
        reader.header = Some(header);
        Ok(reader)
    }

    /// Opens a stream of bare containers
    pub fn headless(inner: R) -> Self {
        Self {
            inner,
            header: None,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            records_read: 0,
            bytes_read: 0,
        }
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Decodes the next container, or `None` at a clean end of input
    ///
    /// # Errors
    ///
    /// * `ReadError::ContainerTruncation` - If the input ends inside a container
    /// * `ReadError::TrailingBytes` - If the body holds more than its slices
    pub fn next_container(&mut self) -> Result<Option<DecodedContainer>> {
        let mut header_bytes = [0u8; SIZE_CONTAINER_HEADER];
        let n = fill(&mut self.inner, &mut header_bytes)?;
        if n == 0 {
            return Ok(None);
        }
        if n < SIZE_CONTAINER_HEADER {
            return Err(ReadError::ContainerTruncation(n).into());
        }
        let header = ContainerHeader::from_bytes(&header_bytes)?;
        let compressed = header.has_flag(ContainerHeader::COMPRESSED);
        if let Some(file) = &self.header {
            if file.compressed != compressed {
                return Err(HeaderError::CompressionMismatch {
                    file: file.compressed,
                    container: compressed,
                }
                .into());
            }
        }

        // grows with the input so a corrupt size cannot force the allocation
        let mut body = Vec::new();
        (&mut self.inner)
            .take(header.body_size)
            .read_to_end(&mut body)?;
        if (body.len() as u64) < header.body_size {
            return Err(ReadError::ContainerTruncation(SIZE_CONTAINER_HEADER + body.len()).into());
        }
        self.bytes_read += SIZE_CONTAINER_HEADER + body.len();

        let mut cursor = body.as_slice();
        let table = EncodingTable::read_from(&mut cursor)?;
        let config = CodecConfig {
            read_names: header.has_flag(ContainerHeader::READ_NAMES),
            debug_markers: header.has_flag(ContainerHeader::DEBUG_MARKERS),
            read_length_default: header.read_length_default,
        };

        let mut records = Vec::with_capacity((header.records as usize).min(body.len()));
        for _ in 0..header.slices {
            let slice = Slice::read_from(&mut cursor, compressed)?;
            let first = records.len();
            records.extend(slice.decode(&table, config, first)?);
        }
        if !cursor.is_empty() {
            return Err(ReadError::TrailingBytes(cursor.len()).into());
        }
        for record in &mut records {
            record.reference_id = header.reference_id;
        }

        resolve_mates(&mut records)?;
        self.restore_names(&mut records);
        self.records_read += records.len();
        debug!(
            "decoded {} records of sequence {} ({} bytes read)",
            records.len(),
            header.reference_id,
            self.bytes_read
        );

        Ok(Some(DecodedContainer {
            header,
            table,
            records,
        }))
    }

    /// Gives nameless records their upstream mate's name or a generated one
    fn restore_names(&self, records: &mut [Record]) {
        let mut buffer = itoa::Buffer::new();
        for i in 0..records.len() {
            if records[i].read_name.is_some() {
                continue;
            }
            let name = match records[i].previous {
                Some(p) => records[p].read_name.clone(),
                None => {
                    let mut name = self.name_prefix.clone().into_bytes();
                    name.extend_from_slice(buffer.format(self.records_read + i).as_bytes());
                    Some(name)
                }
            };
            records[i].read_name = name;
        }
    }
}
impl<R: Read> Iterator for ContainerReader<R> {
    type Item = Result<DecodedContainer>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_container().transpose()
    }
}
