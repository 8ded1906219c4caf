use rand::Rng;

use crate::{error::BuildError, Result};

/// Seed of the generator used by [`Policy::RandomDraw`], fixed for reproducible output
pub const RNG_SEED: u64 = 42;

/// Policy for handling read bases outside `ACGTN`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    /// Replace invalid bases with `N`
    #[default]
    SetToN,
    /// Skip the read entirely
    IgnoreSequence,
    /// Fail the build with [`BuildError::InvalidNucleotideSequence`]
    BreakOnInvalid,
    /// Replace invalid bases with a random nucleotide
    RandomDraw,
    SetToA,
    SetToC,
    SetToG,
    SetToT,
}
impl Policy {
    /// Whether `base` needs no policy decision
    pub fn is_valid(base: u8) -> bool {
        matches!(base, b'A' | b'C' | b'G' | b'T' | b'N')
    }

    fn fill_with_known(sequence: &[u8], val: u8, ibuf: &mut Vec<u8>) {
        for &n in sequence {
            ibuf.push(if Self::is_valid(n) { n } else { val });
        }
    }

    fn fill_with_random<R: Rng>(sequence: &[u8], rng: &mut R, ibuf: &mut Vec<u8>) {
        for &n in sequence {
            ibuf.push(if Self::is_valid(n) {
                n
            } else {
                b"ACGT"[rng.random_range(0..4usize)]
            });
        }
    }

    /// Convert the sequence according to the policy
    ///
    /// Clears `ibuf` first. Returns whether the read should be kept.
    ///
    /// # Arguments
    /// * `sequence` - The upper-cased read bases
    /// * `ibuf` - Receives the converted bases
    /// * `rng` - The random number generator
    pub fn handle<R: Rng>(&self, sequence: &[u8], ibuf: &mut Vec<u8>, rng: &mut R) -> Result<bool> {
        ibuf.clear();
        match self {
            Self::IgnoreSequence => Ok(false),
            Self::BreakOnInvalid => {
                let seq_str = std::str::from_utf8(sequence)?.to_string();
                Err(BuildError::InvalidNucleotideSequence(seq_str).into())
            }
            Self::RandomDraw => {
                Self::fill_with_random(sequence, rng, ibuf);
                Ok(true)
            }
            Self::SetToN => {
                Self::fill_with_known(sequence, b'N', ibuf);
                Ok(true)
            }
            Self::SetToA => {
                Self::fill_with_known(sequence, b'A', ibuf);
                Ok(true)
            }
            Self::SetToC => {
                Self::fill_with_known(sequence, b'C', ibuf);
                Ok(true)
            }
            Self::SetToG => {
                Self::fill_with_known(sequence, b'G', ibuf);
                Ok(true)
            }
            Self::SetToT => {
                Self::fill_with_known(sequence, b'T', ibuf);
                Ok(true)
            }
        }
    }
}
