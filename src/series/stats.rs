use std::collections::{BTreeMap, BTreeSet};

use super::{DataSeries, TagKey};

/// Running summary of the integer values seen for one series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueStats {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    pub sum: i64,
}
impl Default for ValueStats {
    fn default() -> Self {
        Self {
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            sum: 0,
        }
    }
}
impl ValueStats {
    pub fn add(&mut self, value: i64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum = self.sum.saturating_add(value);
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean of the values after shifting the minimum to zero
    #[allow(clippy::cast_precision_loss)]
    pub fn shifted_mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.sum as f64 / self.count as f64;
        mean - self.min as f64
    }
}

/// Value distribution of a batch, gathered before choosing encodings
#[derive(Debug, Clone, Default)]
pub struct SeriesStats {
    values: BTreeMap<DataSeries, ValueStats>,
    tags: BTreeSet<TagKey>,
}
impl SeriesStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, series: DataSeries, value: i64) {
        self.values.entry(series).or_default().add(value);
    }

    pub fn add_tag(&mut self, key: TagKey) {
        self.tags.insert(key);
    }

    pub fn get(&self, series: DataSeries) -> Option<&ValueStats> {
        self.values.get(&series)
    }

    pub fn tags(&self) -> impl Iterator<Item = TagKey> + '_ {
        self.tags.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_stats() {
        let mut stats = ValueStats::default();
        assert!(stats.is_empty());
        for v in [-2, 0, 4, 10] {
            stats.add(v);
        }
        assert_eq!((stats.min, stats.max, stats.count), (-2, 10, 4));
        assert!((stats.shifted_mean() - 5.0).abs() < f64::EPSILON);
    }
}
