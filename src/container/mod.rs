//! Container assembly and decoding
//!
//! A container holds the records of one batch, all on the same reference
//! sequence: its header, the encoding table the batch was written with, and
//! one or more slices of encoded records.

mod header;
mod reader;
mod slice;
mod stats;
mod writer;

pub use header::{
    ContainerHeader, FileHeader, RESERVED_BYTES, RESERVED_BYTES_CONTAINER, SIZE_CONTAINER_HEADER,
    SIZE_HEADER,
};
pub use reader::{ContainerReader, DecodedContainer, DEFAULT_NAME_PREFIX};
pub use slice::Slice;
pub use stats::{ByteReport, CompressionReport};
pub use writer::{
    ContainerWriter, ContainerWriterBuilder, DEFAULT_CONTAINER_RECORDS, DEFAULT_SLICE_RECORDS,
};
