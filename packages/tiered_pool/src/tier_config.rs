use std::collections::BTreeMap;

/// The tiers of a [`TieredPool`][crate::TieredPool]: how many containers of which capacity.
///
/// Setting the same capacity twice overwrites the earlier count. A count of zero is allowed
/// and produces a tier that never yields a buffer.
///
/// # Examples
///
/// ```
/// use tiered_pool::TierConfig;
///
/// let config = TierConfig::new().tier(1024, 16).tier(4096, 4);
/// assert_eq!(config.count(1024), Some(16));
/// assert_eq!(config.total_bytes(), 1024 * 16 + 4096 * 4);
///
/// // Equivalent, built from pairs.
/// assert_eq!(config, TierConfig::from([(4096, 4), (1024, 16)]));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TierConfig {
    /// Container capacity in bytes to container count.
    tiers: BTreeMap<usize, usize>,
}

impl TierConfig {
    /// Creates a configuration with no tiers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of containers with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn tier(mut self, capacity: usize, count: usize) -> Self {
        self.set_tier(capacity, count);
        self
    }

    /// Sets the number of containers with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn set_tier(&mut self, capacity: usize, count: usize) {
        assert!(capacity > 0, "pool tiers must have non-zero capacity");

        self.tiers.insert(capacity, count);
    }

    /// The number of containers configured for the given capacity, if that tier exists.
    #[must_use]
    pub fn count(&self, capacity: usize) -> Option<usize> {
        self.tiers.get(&capacity).copied()
    }

    /// Number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Whether there are no tiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Total bytes of storage a pool built from this configuration allocates.
    ///
    /// Saturates at `usize::MAX`, which no real configuration can be allocated with anyway.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.tiers
            .iter()
            .map(|(capacity, count)| capacity.saturating_mul(*count))
            .fold(0, usize::saturating_add)
    }

    /// `(capacity, count)` pairs in ascending order of capacity.
    pub(crate) fn tiers(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tiers.iter().map(|(capacity, count)| (*capacity, *count))
    }
}

impl FromIterator<(usize, usize)> for TierConfig {
    /// # Panics
    ///
    /// Panics if any capacity is zero.
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        let mut config = Self::new();

        for (capacity, count) in iter {
            config.set_tier(capacity, count);
        }

        config
    }
}

impl<const N: usize> From<[(usize, usize); N]> for TierConfig {
    /// # Panics
    ///
    /// Panics if any capacity is zero.
    fn from(tiers: [(usize, usize); N]) -> Self {
        tiers.into_iter().collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_by_default() {
        let config = TierConfig::new();

        assert!(config.is_empty());
        assert_eq!(config.len(), 0);
        assert_eq!(config.total_bytes(), 0);
    }

    #[test]
    fn repeated_capacity_overwrites() {
        let config = TierConfig::new().tier(10, 1).tier(10, 5);

        assert_eq!(config.len(), 1);
        assert_eq!(config.count(10), Some(5));
    }

    #[test]
    fn tiers_are_ascending() {
        let config = TierConfig::from([(30, 1), (10, 2), (20, 0)]);

        let tiers: Vec<_> = config.tiers().collect();

        assert_eq!(tiers, vec![(10, 2), (20, 0), (30, 1)]);
    }

    #[test]
    fn total_bytes_saturates() {
        let config = TierConfig::from([(usize::MAX, 2), (10, 1)]);

        assert_eq!(config.total_bytes(), usize::MAX);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        _ = TierConfig::new().tier(0, 1);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_from_pairs_panics() {
        _ = TierConfig::from([(8, 1), (0, 1)]);
    }
}
