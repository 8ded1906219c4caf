use crate::error::{BuildError, CodecError, Result};

/// Alphabet of bases that substitutions can express
pub const BASES: [u8; 5] = *b"ACGTN";

fn base_index(base: u8) -> Option<usize> {
    BASES.iter().position(|&b| b == base)
}

/// A read base expressed relative to the reference base it replaces
///
/// For a reference base `R` the four other bases of `ACGTN` are listed in order
/// with `R` removed; the code is the read base's index in that list. This keeps
/// the substitution alphabet to four symbols whatever the reference base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseChange(u8);
impl BaseChange {
    pub fn new(reference: u8, read: u8) -> Result<Self> {
        let invalid = || BuildError::InvalidBaseChange {
            reference: reference as char,
            read: read as char,
        };
        let r = base_index(reference).ok_or_else(invalid)?;
        let q = base_index(read).ok_or_else(invalid)?;
        if r == q {
            return Err(invalid().into());
        }
        let code = if q < r { q } else { q - 1 };
        Ok(Self(code as u8))
    }

    pub fn from_code(code: u8) -> Result<Self> {
        if code > 3 {
            return Err(CodecError::ValueOutOfRange(i64::from(code)).into());
        }
        Ok(Self(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// Returns the read base this change produces over `reference`
    pub fn apply(self, reference: u8) -> Result<u8> {
        let r = base_index(reference).ok_or(BuildError::InvalidBaseChange {
            reference: reference as char,
            read: '?',
        })?;
        let code = usize::from(self.0);
        let q = if code < r { code } else { code + 1 };
        Ok(BASES[q])
    }
}

/// The edit carried by a [`Feature`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureKind {
    /// One read base differs from the reference
    Substitution(BaseChange),
    /// Bases present in the read but not in the reference
    Insertion(Vec<u8>),
    /// Reference bases skipped by the read
    Deletion(u32),
    /// Clipped bases kept in the read
    SoftClip(Vec<u8>),
    /// A single inserted base
    InsertedBase(u8),
    /// A quality score captured at this position
    QualityScore(u8),
}

/// A positional edit of a read relative to the reference
///
/// `position` is the 1-based offset in the read of the first base the edit
/// touches. For a deletion it is the read base that follows the deleted span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub position: u32,
    pub kind: FeatureKind,
}
impl Feature {
    pub const SUBSTITUTION: u8 = b'X';
    pub const INSERTION: u8 = b'I';
    pub const DELETION: u8 = b'D';
    pub const SOFT_CLIP: u8 = b'S';
    pub const INSERTED_BASE: u8 = b'i';
    pub const QUALITY_SCORE: u8 = b'Q';

    pub fn new(position: u32, kind: FeatureKind) -> Self {
        Self { position, kind }
    }

    /// The code written to the feature-code series
    pub fn code(&self) -> u8 {
        match self.kind {
            FeatureKind::Substitution(_) => Self::SUBSTITUTION,
            FeatureKind::Insertion(_) => Self::INSERTION,
            FeatureKind::Deletion(_) => Self::DELETION,
            FeatureKind::SoftClip(_) => Self::SOFT_CLIP,
            FeatureKind::InsertedBase(_) => Self::INSERTED_BASE,
            FeatureKind::QualityScore(_) => Self::QUALITY_SCORE,
        }
    }

    /// Number of read bases the feature accounts for
    pub fn read_len(&self) -> u32 {
        match &self.kind {
            FeatureKind::Substitution(_) | FeatureKind::InsertedBase(_) => 1,
            FeatureKind::Insertion(bases) | FeatureKind::SoftClip(bases) => bases.len() as u32,
            FeatureKind::Deletion(_) | FeatureKind::QualityScore(_) => 0,
        }
    }

    /// Number of reference bases the feature accounts for
    pub fn reference_len(&self) -> u32 {
        match &self.kind {
            FeatureKind::Substitution(_) => 1,
            FeatureKind::Deletion(len) => *len,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_change_covers_alphabet() -> crate::Result<()> {
        for &reference in &BASES {
            let mut codes = Vec::new();
            for &read in BASES.iter().filter(|&&b| b != reference) {
                let change = BaseChange::new(reference, read)?;
                assert_eq!(change.apply(reference)?, read);
                codes.push(change.code());
            }
            assert_eq!(codes, [0, 1, 2, 3]);
        }
        Ok(())
    }

    #[test]
    fn test_base_change_rejects_identity() {
        assert!(BaseChange::new(b'A', b'A').is_err());
        assert!(BaseChange::new(b'A', b'x').is_err());
        assert!(BaseChange::from_code(4).is_err());
    }

    #[test]
    fn test_lengths() {
        let ins = Feature::new(3, FeatureKind::Insertion(b"ACG".to_vec()));
        assert_eq!((ins.read_len(), ins.reference_len()), (3, 0));
        let del = Feature::new(3, FeatureKind::Deletion(4));
        assert_eq!((del.read_len(), del.reference_len()), (0, 4));
        assert_eq!(del.code(), b'D');
    }
}
