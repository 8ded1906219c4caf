//! Reference sequences the records are diffed against

use std::collections::HashMap;
use std::sync::Arc;

use auto_impl::auto_impl;

use crate::error::{ReferenceError, Result};

/// Upper-cases `ACGTN` and maps every other symbol to `N`
pub fn normalize_bases(bases: &[u8]) -> Vec<u8> {
    bases
        .iter()
        .map(|b| match b.to_ascii_uppercase() {
            n @ (b'A' | b'C' | b'G' | b'T') => n,
            _ => b'N',
        })
        .collect()
}

/// Supplies the bases of a reference sequence by name
///
/// Returned bases must already be normalized (see [`normalize_bases`]).
#[auto_impl(&, Box, Arc)]
pub trait ReferenceSource {
    fn get_bases(&self, name: &str) -> Result<Arc<[u8]>>;
}

/// An in-memory set of named reference sequences
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    sequences: HashMap<String, Arc<[u8]>>,
}
impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sequence, normalizing its bases
    pub fn insert(&mut self, name: impl Into<String>, bases: &[u8]) {
        self.sequences
            .insert(name.into(), Arc::from(normalize_bases(bases)));
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
impl ReferenceSource for ReferenceSet {
    fn get_bases(&self, name: &str) -> Result<Arc<[u8]>> {
        self.sequences
            .get(name)
            .cloned()
            .ok_or_else(|| ReferenceError::MissingSequence(name.to_string()).into())
    }
}
