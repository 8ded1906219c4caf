use crate::series::{SeriesKey, SeriesType, StreamId};

/// Custom Result type for diffseq operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the diffseq library, encompassing all possible error cases
/// that can occur while building, encoding, and decoding containers.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to file and container header processing
    HeaderError(#[from] HeaderError),
    /// Errors raised by the low-level codecs and the data-series framework
    CodecError(#[from] CodecError),
    /// Errors raised while turning an aligned read into a record
    BuildError(#[from] BuildError),
    /// Errors that occur during read operations
    ReadError(#[from] ReadError),
    /// Errors that occur during write operations
    WriteError(#[from] WriteError),
    /// Errors from the reference collaborator
    ReferenceError(#[from] ReferenceError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// UTF-8 encoding/decoding errors
    Utf8Error(#[from] std::str::Utf8Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}

/// Errors specific to processing and validating file and container headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the file header does not match the expected value
    ///
    /// # Arguments
    /// * `u32` - The invalid magic number that was found
    #[error("Invalid magic number: {0:#x}")]
    InvalidMagicNumber(u32),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u8` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The magic number of a container header does not match
    ///
    /// # Arguments
    /// * `u64` - The invalid magic number that was found
    #[error("Invalid container magic number: {0:#x}")]
    InvalidContainerMagic(u64),

    /// The reserved bytes in the header contain unexpected values
    #[error("Invalid reserved bytes")]
    InvalidReservedBytes,

    /// A container's compression flag disagrees with the file header
    ///
    /// # Fields
    /// * `file` - Compression declared by the file header
    /// * `container` - Compression declared by the container header
    #[error("Container compression ({container}) does not match the file header ({file})")]
    CompressionMismatch { file: bool, container: bool },
}

/// Errors raised by the numeric codecs, the bit stream, and the data-series framework
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// An ITF8 value was truncated before its declared length
    ///
    /// # Fields
    /// * `needed` - Bytes required by the leading byte
    /// * `available` - Bytes actually present
    #[error("Malformed ITF8 value: needed {needed} bytes, found {available}")]
    MalformedVarInt { needed: usize, available: usize },

    /// A read requested more bits than remain in the stream
    #[error("Bit stream underrun: requested {requested} bits, {available} available")]
    BitStreamUnderrun { requested: u32, available: u64 },

    /// A bit count outside the supported width was requested
    #[error("Invalid bit count {count} (maximum {max})")]
    InvalidBitCount { count: u32, max: u32 },

    /// Too many bits were pushed back onto a reader
    #[error("Cannot push back {0} more bits")]
    PutBackOverflow(u32),

    /// A feature code byte that does not name any feature kind
    #[error("Unknown feature code: {0:#04x}")]
    UnknownFeatureCode(u8),

    /// A data series was referenced without a registered encoding
    #[error("No encoding registered for data series {0}")]
    UnregisteredSeries(SeriesKey),

    /// The per-record sentinel did not match
    #[error("Debug marker mismatch: expected {expected:#010x}, found {found:#010x}")]
    DebugMarkerMismatch { expected: u32, found: u32 },

    /// A reader or writer was requested with the wrong value type for its series
    #[error("Data series {key} holds {expected:?} values, not {requested:?}")]
    SeriesTypeMismatch {
        key: SeriesKey,
        expected: SeriesType,
        requested: SeriesType,
    },

    /// The encoding cannot carry values of the series type
    #[error("Encoding {encoding} cannot carry {kind:?} values")]
    UnsupportedEncoding {
        encoding: &'static str,
        kind: SeriesType,
    },

    /// A serialized series key that does not name any data series
    #[error("Unknown data series code: {0}")]
    UnknownSeriesCode(String),

    /// An encoding identifier that does not name any encoding
    #[error("Unknown encoding identifier: {0}")]
    UnknownEncodingId(u8),

    /// A value fell outside the range representable by its codec
    #[error("Value {0} is out of range for the codec")]
    ValueOutOfRange(i64),

    /// An external stream referenced by an encoding was absent from the slice
    #[error("Missing external stream {0}")]
    MissingExternalStream(StreamId),

    /// A mate distance that points outside the container
    #[error("Mate distance from record {index} points past the end of the container ({len})")]
    InvalidMateDistance { index: usize, len: usize },
}

/// Errors raised while converting an aligned read into a record
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// The alignment cannot be walked
    ///
    /// # Arguments
    /// * `String` - Description of the inconsistency
    #[error("Invalid alignment: {0}")]
    InvalidAlignment(String),

    /// The alignment walks past the end of the reference sequence
    #[error("Reference position {position} is outside the sequence (length {length})")]
    ReferenceOutOfBounds { position: i64, length: usize },

    /// The read contains invalid nucleotide characters
    ///
    /// # Arguments
    /// * `String` - The offending sequence
    #[error("Invalid nucleotides found in sequence: {0}")]
    InvalidNucleotideSequence(String),

    /// A substitution between two bases that cannot be expressed as a base-change code
    #[error("Cannot express substitution {reference} -> {read}")]
    InvalidBaseChange { reference: char, read: char },
}

/// Errors that can occur while reading containers
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The stream ended partway through a container
    ///
    /// # Arguments
    /// * `usize` - The number of container bytes that were read
    #[error("Container truncated after {0} bytes")]
    ContainerTruncation(usize),

    /// Bytes were left over after decoding every slice of a container
    #[error("{0} unexpected trailing bytes in container body")]
    TrailingBytes(usize),
}

/// Errors that can occur while writing containers
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// The slice size must be positive and no larger than the container size
    #[error("Invalid batch sizes: {slice} records per slice, {container} per container")]
    InvalidBatchSize { container: usize, slice: usize },

    /// A container holds more slices than the header can describe
    #[error("Too many slices in one container: {0}")]
    TooManySlices(usize),
}

/// Errors from the reference collaborator
#[derive(thiserror::Error, Debug)]
pub enum ReferenceError {
    /// The requested sequence is not known
    #[error("Reference sequence not found: {0}")]
    MissingSequence(String),
}
