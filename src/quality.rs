//! Quality-score capture decisions
//!
//! The record builder asks a [`QualityPolicy`] which quality scores of a read
//! are worth keeping. Everything else is restored as [`DEFAULT_QUALITY`] on decode.
//!
//! [`DEFAULT_QUALITY`]: crate::record::DEFAULT_QUALITY

use auto_impl::auto_impl;

use crate::record::{CoverageTrack, Record};

/// Which quality scores of one read to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureDecision {
    Nothing,
    /// Keep the whole quality string
    Everything,
    /// Keep the scores at these 1-based read positions
    Positions(Vec<u32>),
}

/// Decides per read which quality scores are captured
#[auto_impl(&, Box, Arc)]
pub trait QualityPolicy {
    fn decide(&self, record: &Record, coverage: &CoverageTrack) -> CaptureDecision;
}

/// Keeps no quality scores beyond what the capture policy forces
#[derive(Debug, Clone, Copy, Default)]
pub struct DropQualities;
impl QualityPolicy for DropQualities {
    fn decide(&self, _record: &Record, _coverage: &CoverageTrack) -> CaptureDecision {
        CaptureDecision::Nothing
    }
}

/// Keeps every quality score
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepQualities;
impl QualityPolicy for KeepQualities {
    fn decide(&self, _record: &Record, _coverage: &CoverageTrack) -> CaptureDecision {
        CaptureDecision::Everything
    }
}
