use std::collections::BTreeMap;

use crate::Page;

/// Container usage of one tier of a pool.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct TierUsage {
    used: usize,
    total: usize,
}

impl TierUsage {
    /// Creates a usage entry with `used` out of `total` containers lent out.
    #[must_use]
    pub const fn new(used: usize, total: usize) -> Self {
        Self { used, total }
    }

    /// Number of containers that were lent out when the snapshot was taken.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Number of containers in the tier.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Number of containers that were available when the snapshot was taken.
    #[must_use]
    pub const fn free(&self) -> usize {
        self.total.saturating_sub(self.used)
    }
}

/// A point-in-time snapshot of container usage, keyed by tier capacity in bytes.
///
/// Each tier is counted separately while other threads keep leasing and returning buffers,
/// so the snapshot as a whole is best-effort and need not be consistent across tiers.
///
/// # Examples
///
/// ```
/// use tiered_pool::{TierConfig, TierUsage, TieredPool};
///
/// let pool = TieredPool::new(&TierConfig::from([(10, 2), (20, 1)]));
///
/// let _buffer = pool.get(12).unwrap();
///
/// let usage = pool.usage();
/// assert_eq!(usage.tier(10), Some(TierUsage::new(0, 2)));
/// assert_eq!(usage.tier(20), Some(TierUsage::new(1, 1)));
/// assert_eq!(usage.total_used(), 1);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Usage {
    tiers: BTreeMap<usize, TierUsage>,
}

impl Usage {
    #[must_use]
    pub(crate) fn from_pages<'a>(pages: impl IntoIterator<Item = &'a Page>) -> Self {
        pages
            .into_iter()
            .map(|page| (page.capacity(), page.usage()))
            .collect()
    }

    /// Usage of the tier with the given container capacity, if the pool has such a tier.
    #[must_use]
    pub fn tier(&self, capacity: usize) -> Option<TierUsage> {
        self.tiers.get(&capacity).copied()
    }

    /// Iterates over `(capacity, usage)` pairs in ascending order of capacity.
    pub fn tiers(&self) -> impl Iterator<Item = (usize, TierUsage)> + '_ {
        self.tiers
            .iter()
            .map(|(capacity, usage)| (*capacity, *usage))
    }

    /// Number of tiers in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Whether the pool had no tiers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Lent out containers across all tiers.
    #[must_use]
    pub fn total_used(&self) -> usize {
        self.tiers.values().map(TierUsage::used).sum()
    }

    /// Containers across all tiers.
    #[must_use]
    pub fn total_containers(&self) -> usize {
        self.tiers.values().map(TierUsage::total).sum()
    }
}

impl FromIterator<(usize, TierUsage)> for Usage {
    fn from_iter<I: IntoIterator<Item = (usize, TierUsage)>>(iter: I) -> Self {
        Self {
            tiers: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn tier_usage_free_count() {
        let usage = TierUsage::new(3, 5);

        assert_eq!(usage.used(), 3);
        assert_eq!(usage.total(), 5);
        assert_eq!(usage.free(), 2);
    }

    #[test]
    fn totals_sum_all_tiers() {
        let usage: Usage = [(10, TierUsage::new(1, 4)), (20, TierUsage::new(2, 2))]
            .into_iter()
            .collect();

        assert_eq!(usage.len(), 2);
        assert_eq!(usage.total_used(), 3);
        assert_eq!(usage.total_containers(), 6);
        assert_eq!(usage.tier(30), None);
    }

    #[test]
    fn tiers_are_ascending() {
        let usage: Usage = [(64, TierUsage::default()), (8, TierUsage::default())]
            .into_iter()
            .collect();

        let capacities: Vec<_> = usage.tiers().map(|(capacity, _)| capacity).collect();

        assert_eq!(capacities, vec![8, 64]);
    }

    #[test]
    fn from_pages_reports_each_page() {
        let pages = [Page::with_containers(10, 2), Page::new(20)];

        let usage = Usage::from_pages(&pages);

        assert_eq!(usage.tier(10), Some(TierUsage::new(0, 2)));
        assert_eq!(usage.tier(20), Some(TierUsage::new(0, 0)));
        assert!(!usage.is_empty());
    }
}
