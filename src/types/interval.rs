//! Capture intervals and the donor relation between them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capture period in seconds. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalSpec(u64);

impl IntervalSpec {
    /// Returns `None` for a zero period.
    pub fn new(period_secs: u64) -> Option<Self> {
        (period_secs > 0).then_some(Self(period_secs))
    }

    pub fn period_secs(self) -> u64 {
        self.0
    }

    /// Whether `tick` is a multiple of this period.
    pub fn divides(self, tick: u64) -> bool {
        tick % self.0 == 0
    }
}

impl std::fmt::Display for IntervalSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Donor relation over the configured intervals, computed once at startup.
///
/// Interval `d` can donate to `c` when `d < c` and `c % d == 0`: every due
/// tick of `c` is then also a due tick of `d`. Each consumer gets the
/// smallest such donor, which is the most frequently fetched one.
#[derive(Debug, Clone, Default)]
pub struct IntervalGraph {
    intervals: Vec<IntervalSpec>,
    donor_of: BTreeMap<IntervalSpec, IntervalSpec>,
}

impl IntervalGraph {
    /// Build from raw periods. Zero periods and duplicates are dropped.
    pub fn new(periods: &[u64]) -> Self {
        let mut intervals: Vec<IntervalSpec> =
            periods.iter().copied().filter_map(IntervalSpec::new).collect();
        intervals.sort_unstable();
        intervals.dedup();

        let mut donor_of = BTreeMap::new();
        for (i, &consumer) in intervals.iter().enumerate() {
            if let Some(&donor) = intervals[..i]
                .iter()
                .find(|d| consumer.period_secs() % d.period_secs() == 0)
            {
                donor_of.insert(consumer, donor);
            }
        }

        Self {
            intervals,
            donor_of,
        }
    }

    /// Intervals in ascending order.
    pub fn intervals(&self) -> &[IntervalSpec] {
        &self.intervals
    }

    pub fn donor_of(&self, consumer: IntervalSpec) -> Option<IntervalSpec> {
        self.donor_of.get(&consumer).copied()
    }

    /// Whether some other interval reuses this one's images.
    pub fn is_donor(&self, interval: IntervalSpec) -> bool {
        self.donor_of.values().any(|&d| d == interval)
    }

    /// `(consumer, donor)` pairs, for startup logging.
    pub fn pairs(&self) -> impl Iterator<Item = (IntervalSpec, IntervalSpec)> + '_ {
        self.donor_of.iter().map(|(&c, &d)| (c, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(p: u64) -> IntervalSpec {
        IntervalSpec::new(p).unwrap()
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(IntervalSpec::new(0).is_none());
    }

    #[test]
    fn test_smallest_divisor_is_donor() {
        let g = IntervalGraph::new(&[900, 60, 180, 3600, 86_400]);
        assert_eq!(g.donor_of(iv(180)), Some(iv(60)));
        assert_eq!(g.donor_of(iv(900)), Some(iv(60)));
        assert_eq!(g.donor_of(iv(86_400)), Some(iv(60)));
        assert_eq!(g.donor_of(iv(60)), None);
        assert!(g.is_donor(iv(60)));
        assert!(!g.is_donor(iv(180)));
    }

    #[test]
    fn test_non_divisible_intervals_have_no_donor() {
        let g = IntervalGraph::new(&[60, 90]);
        assert_eq!(g.donor_of(iv(90)), None);
        assert!(!g.is_donor(iv(60)));
    }

    #[test]
    fn test_duplicates_removed_and_sorted() {
        let g = IntervalGraph::new(&[180, 60, 60, 0]);
        assert_eq!(g.intervals(), &[iv(60), iv(180)]);
    }
}
