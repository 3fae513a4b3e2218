use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use foldhash::HashMap;

use crate::ERR_POISONED_LOCK;

/// Counts how often each buffer size was requested from a pool.
///
/// Attach a histogram to a pool via its builder and the pool records every `get()` call,
/// whether or not it produced a buffer. The recorded sizes are a good basis for choosing
/// the tiers of a [`TierConfig`][crate::TierConfig].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use tiered_pool::{SizeHistogram, TierConfig, TieredPool};
///
/// let histogram = Arc::new(SizeHistogram::new());
///
/// let pool = TieredPool::builder()
///     .tiers(TierConfig::from([(10, 1)]))
///     .histogram(Arc::clone(&histogram))
///     .build();
///
/// let _buffer = pool.get(10);
/// let _too_large = pool.get(64);
///
/// assert_eq!(histogram.count(10), 1);
/// assert_eq!(histogram.count(64), 1);
/// ```
///
/// # Thread safety
///
/// The histogram is thread-safe. Recording a size that has been seen before only takes a
/// shared lock, so concurrent callers do not block each other on the common path.
#[derive(Debug, Default)]
pub struct SizeHistogram {
    /// We use foldhash for better performance with small hash tables.
    counts: RwLock<HashMap<usize, AtomicU64>>,
}

impl SizeHistogram {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request for `size` bytes.
    pub fn hit(&self, size: usize) {
        {
            let counts = self.counts.read().expect(ERR_POISONED_LOCK);

            if let Some(count) = counts.get(&size) {
                count.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        // First time we see this size (or another thread is adding it right now).
        self.counts
            .write()
            .expect(ERR_POISONED_LOCK)
            .entry(size)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Number of recorded requests for `size` bytes.
    #[must_use]
    pub fn count(&self, size: usize) -> u64 {
        self.counts
            .read()
            .expect(ERR_POISONED_LOCK)
            .get(&size)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Copies out the counts of all recorded sizes, ordered by size.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<usize, u64> {
        self.counts
            .read()
            .expect(ERR_POISONED_LOCK)
            .iter()
            .map(|(size, count)| (*size, count.load(Ordering::Relaxed)))
            .collect()
    }

    /// Forgets all recorded requests.
    pub fn reset(&self) {
        self.counts.write().expect(ERR_POISONED_LOCK).clear();
    }
}
