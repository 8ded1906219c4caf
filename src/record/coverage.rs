/// Per-position coverage and mismatch counters over a reference window
///
/// The window starts at a 1-based reference position and grows at its end as
/// reads extend past it. Positions before the start are ignored, so a batch
/// whose reads arrive out of order opens the window at position 1.
#[derive(Debug, Clone, Default)]
pub struct CoverageTrack {
    start: i64,
    coverage: Vec<u32>,
    mismatches: Vec<u32>,
}
impl CoverageTrack {
    pub fn new(start: i64, len: usize) -> Self {
        Self {
            start,
            coverage: vec![0; len],
            mismatches: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.is_empty()
    }

    fn offset(&self, pos: i64) -> Option<usize> {
        usize::try_from(pos - self.start).ok()
    }

    fn grow_to(&mut self, end: usize) {
        if end > self.coverage.len() {
            self.coverage.resize(end, 0);
            self.mismatches.resize(end, 0);
        }
    }

    /// Adds one read of depth to `[pos, pos + len)`
    pub fn add_coverage(&mut self, pos: i64, len: u32) {
        let first = pos.max(self.start);
        let last = pos + i64::from(len);
        let (Some(from), Some(to)) = (self.offset(first), self.offset(last)) else {
            return;
        };
        self.grow_to(to);
        for depth in &mut self.coverage[from..to] {
            *depth += 1;
        }
    }

    pub fn add_mismatch(&mut self, pos: i64) {
        if let Some(i) = self.offset(pos) {
            self.grow_to(i + 1);
            self.mismatches[i] += 1;
        }
    }

    pub fn coverage_at(&self, pos: i64) -> u32 {
        self.offset(pos)
            .and_then(|i| self.coverage.get(i).copied())
            .unwrap_or(0)
    }

    pub fn mismatches_at(&self, pos: i64) -> u32 {
        self.offset(pos)
            .and_then(|i| self.mismatches.get(i).copied())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut track = CoverageTrack::new(10, 5);
        track.add_coverage(8, 4);
        track.add_coverage(12, 6);
        track.add_mismatch(13);
        track.add_mismatch(3);

        assert_eq!(track.coverage_at(9), 0);
        assert_eq!(track.coverage_at(10), 1);
        assert_eq!(track.coverage_at(11), 1);
        assert_eq!(track.coverage_at(12), 1);
        assert_eq!(track.coverage_at(17), 1);
        assert_eq!(track.coverage_at(18), 0);
        assert_eq!(track.mismatches_at(13), 1);
        assert_eq!(track.len(), 8);
    }
}
