//! # File and Container Header Definitions
//!
//! A file opens with a 32-byte [`FileHeader`]. Every container that follows is
//! preceded by a 40-byte [`ContainerHeader`] describing the reference sequence
//! it covers and how its body is laid out. Both carry magic numbers so a reader
//! can reject foreign or misaligned input early.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{HeaderError, Result};

/// Magic number for file identification: "DSEQ" in ASCII (0x51455344)
const MAGIC: u32 = 0x51455344;

/// Magic number for container identification: "DSEQCONT" in ASCII
const CONTAINER_MAGIC: u64 = 0x544E4F4351455344;

/// Current format version number
const FORMAT: u8 = 1;

/// Size of the file header in bytes
pub const SIZE_HEADER: usize = 32;

/// Size of a container header in bytes
pub const SIZE_CONTAINER_HEADER: usize = 40;

/// Placeholder bytes reserved in the file header
pub const RESERVED_BYTES: [u8; 26] = [42; 26];

/// Placeholder bytes reserved in container headers
pub const RESERVED_BYTES_CONTAINER: [u8; 5] = [42; 5];

/// File header
///
/// # Fields
///
/// * `magic` - Magic number to validate file format ("DSEQ", 4 bytes)
/// * `format` - Version number of the file format (1 byte)
/// * `compressed` - Whether container blocks default to zstd (1 byte boolean)
/// * `reserved` - Reserved bytes for future extensions (26 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub format: u8,
    pub compressed: bool,
    pub reserved: [u8; 26],
}
impl Default for FileHeader {
    fn default() -> Self {
        Self::new(true)
    }
}
impl FileHeader {
    pub fn new(compressed: bool) -> Self {
        Self {
            magic: MAGIC,
            format: FORMAT,
            compressed,
            reserved: RESERVED_BYTES,
        }
    }

    /// Parses a header, validating the magic number and format version
    ///
    /// # Errors
    ///
    /// * `HeaderError::InvalidMagicNumber` - If the magic number doesn't match "DSEQ"
    /// * `HeaderError::InvalidFormatVersion` - If the format version is unsupported
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        }
        let format = buffer[4];
        if format != FORMAT {
            return Err(HeaderError::InvalidFormatVersion(format).into());
        }
        let compressed = buffer[5] != 0;
        let Ok(reserved) = buffer[6..32].try_into() else {
            return Err(HeaderError::InvalidReservedBytes.into());
        };
        Ok(Self {
            magic,
            format,
            compressed,
            reserved,
        })
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], self.magic);
        buffer[4] = self.format;
        buffer[5] = u8::from(self.compressed);
        buffer[6..32].copy_from_slice(&self.reserved);
        writer.write_all(&buffer)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer)?;
        Self::from_bytes(&buffer)
    }
}

/// Header preceding each container body
///
/// # Fields
///
/// * `magic` - Magic number to validate container integrity ("DSEQCONT", 8 bytes)
/// * `body_size` - Size of the body that follows in bytes (8 bytes)
/// * `reference_id` - Reference sequence shared by every record, `-1` if none (4 bytes)
/// * `reference_length` - Length of that reference sequence (4 bytes)
/// * `records` - Number of records in the container (4 bytes)
/// * `read_length_default` - Read length of records that omit one (4 bytes)
/// * `flags` - Read names, debug markers, compression, strand and quality capture (1 byte)
/// * `slices` - Number of slices in the body (2 bytes)
/// * `reserved` - Reserved bytes for future extensions (5 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u64,
    pub body_size: u64,
    pub reference_id: i32,
    pub reference_length: u32,
    pub records: u32,
    pub read_length_default: u32,
    pub flags: u8,
    pub slices: u16,
    pub reserved: [u8; 5],
}
impl ContainerHeader {
    /// Every record stores its read name
    pub const READ_NAMES: u8 = 0x1;
    /// Records are bracketed by debug markers in the core stream
    pub const DEBUG_MARKERS: u8 = 0x2;
    /// Blocks are zstd frames
    pub const COMPRESSED: u8 = 0x4;
    /// Scores of substituted bases were captured
    pub const SUBSTITUTION_QUALITY: u8 = 0x8;
    /// Full quality strings of unmapped reads were captured
    pub const UNMAPPED_QUALITY: u8 = 0x10;
    /// Record and mate strands were captured
    pub const STRAND: u8 = 0x20;

    pub fn new(
        body_size: u64,
        reference_id: i32,
        reference_length: u32,
        records: u32,
        read_length_default: u32,
        flags: u8,
        slices: u16,
    ) -> Self {
        Self {
            magic: CONTAINER_MAGIC,
            body_size,
            reference_id,
            reference_length,
            records,
            read_length_default,
            flags,
            slices,
            reserved: RESERVED_BYTES_CONTAINER,
        }
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_CONTAINER_HEADER];
        LittleEndian::write_u64(&mut buffer[0..8], self.magic);
        LittleEndian::write_u64(&mut buffer[8..16], self.body_size);
        LittleEndian::write_i32(&mut buffer[16..20], self.reference_id);
        LittleEndian::write_u32(&mut buffer[20..24], self.reference_length);
        LittleEndian::write_u32(&mut buffer[24..28], self.records);
        LittleEndian::write_u32(&mut buffer[28..32], self.read_length_default);
        buffer[32] = self.flags;
        LittleEndian::write_u16(&mut buffer[33..35], self.slices);
        buffer[35..].copy_from_slice(&self.reserved);
        writer.write_all(&buffer)?;
        Ok(())
    }

    /// # Errors
    ///
    /// * `HeaderError::InvalidContainerMagic` - If the magic number doesn't match "DSEQCONT"
    pub fn from_bytes(buffer: &[u8; SIZE_CONTAINER_HEADER]) -> Result<Self> {
        let magic = LittleEndian::read_u64(&buffer[0..8]);
        if magic != CONTAINER_MAGIC {
            return Err(HeaderError::InvalidContainerMagic(magic).into());
        }
        let Ok(reserved) = buffer[35..40].try_into() else {
            return Err(HeaderError::InvalidReservedBytes.into());
        };
        Ok(Self {
            magic,
            body_size: LittleEndian::read_u64(&buffer[8..16]),
            reference_id: LittleEndian::read_i32(&buffer[16..20]),
            reference_length: LittleEndian::read_u32(&buffer[20..24]),
            records: LittleEndian::read_u32(&buffer[24..28]),
            read_length_default: LittleEndian::read_u32(&buffer[28..32]),
            flags: buffer[32],
            slices: LittleEndian::read_u16(&buffer[33..35]),
            reserved,
        })
    }
}
