use std::collections::BTreeMap;
use std::io::Cursor;

use super::StreamId;
use crate::codec::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Destination of one slice's encoded records
///
/// Holds the core bit stream and one byte buffer per external stream.
#[derive(Debug, Default)]
pub struct OutputStreams {
    pub core: BitWriter,
    external: BTreeMap<StreamId, Vec<u8>>,
}
impl OutputStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure an external stream exists, even if nothing is written to it
    pub fn register(&mut self, stream: StreamId) {
        self.external.entry(stream).or_default();
    }

    pub fn external_mut(&mut self, stream: StreamId) -> &mut Vec<u8> {
        self.external.entry(stream).or_default()
    }

    /// Byte-aligns the core stream and hands back all buffers
    pub fn finish(self) -> (Vec<u8>, BTreeMap<StreamId, Vec<u8>>) {
        (self.core.finish(), self.external)
    }
}

/// Source of one slice's encoded records
pub struct InputStreams<'a> {
    pub core: BitReader<'a>,
    external: BTreeMap<StreamId, Cursor<&'a [u8]>>,
}
impl<'a> InputStreams<'a> {
    pub fn new(core: &'a [u8], external: &'a BTreeMap<StreamId, Vec<u8>>) -> Self {
        Self {
            core: BitReader::new(core),
            external: external
                .iter()
                .map(|(id, bytes)| (*id, Cursor::new(bytes.as_slice())))
                .collect(),
        }
    }

    pub fn contains(&self, stream: StreamId) -> bool {
        self.external.contains_key(&stream)
    }

    pub fn external_mut(&mut self, stream: StreamId) -> Result<&mut Cursor<&'a [u8]>> {
        self.external
            .get_mut(&stream)
            .ok_or_else(|| CodecError::MissingExternalStream(stream).into())
    }

    /// Unread bytes left in an external stream
    pub fn remaining(&self, stream: StreamId) -> usize {
        self.external.get(&stream).map_or(0, |cursor| {
            cursor.get_ref().len().saturating_sub(cursor.position() as usize)
        })
    }
}
