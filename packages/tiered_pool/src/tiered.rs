use std::result;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{
    ERR_POISONED_LOCK, Error, Page, PooledBuffer, PutError, SizeHistogram, TierConfig, Usage,
    next_lease_token, next_pool_id,
};

/// One immutable set of pages, built from one [`TierConfig`].
#[derive(Debug)]
struct Generation {
    id: u64,

    /// Sorted by ascending capacity, at most one page per capacity.
    pages: Vec<Page>,
}

impl Generation {
    fn build(id: u64, config: &TierConfig) -> Self {
        Self {
            id,
            pages: config
                .tiers()
                .map(|(capacity, count)| Page::with_containers(capacity, count))
                .collect(),
        }
    }
}

/// A byte buffer pool with a fixed set of tiers.
///
/// All containers are allocated up front from a [`TierConfig`] and the pool never grows.
/// A request is served by the smallest tier that fits and still has a free container,
/// falling back to larger tiers when the best fitting one is exhausted.
///
/// Taking and returning buffers is lock-free. The only guarded operation is
/// [`reconfigure()`](Self::reconfigure), which replaces the whole set of tiers at once.
///
/// # Examples
///
/// ```
/// use tiered_pool::{TierConfig, TieredPool};
///
/// let pool = TieredPool::new(&TierConfig::from([(10, 1), (20, 1)]));
///
/// let small = pool.get(10).unwrap();
///
/// // The 10-byte tier is exhausted, so the 20-byte tier serves the next request.
/// let upgraded = pool.get(10).unwrap();
/// assert_eq!(upgraded.len(), 10);
/// assert_eq!(upgraded.capacity(), 20);
///
/// // Everything is lent out now.
/// assert!(pool.get(1).is_none());
///
/// pool.put(small).unwrap();
/// pool.put(upgraded).unwrap();
/// ```
///
/// # Thread safety
///
/// The pool is thread-safe ([`Send`] + [`Sync`]). Share it between threads via `Arc` or
/// scoped threads.
#[derive(Debug)]
pub struct TieredPool {
    /// Buffers carry this ID so we can tell when one is returned to the wrong pool.
    pool_id: u64,

    /// We use `ArcSwap` here because it offers very good multithreaded read performance
    /// and operations that loaded a generation keep it alive until they are done with it.
    current: ArcSwap<Generation>,

    /// ID of the current generation. Holding the lock serializes reconfigurations.
    last_generation_id: Mutex<u64>,

    histogram: Option<Arc<SizeHistogram>>,
}

impl TieredPool {
    /// Creates a builder for configuring and constructing a [`TieredPool`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use tiered_pool::{SizeHistogram, TieredPool};
    ///
    /// let pool = TieredPool::builder()
    ///     .tier(512, 8)
    ///     .tier(4096, 2)
    ///     .histogram(Arc::new(SizeHistogram::new()))
    ///     .build();
    ///
    /// assert_eq!(pool.tier_capacities(), vec![512, 4096]);
    /// ```
    #[inline]
    pub fn builder() -> TieredPoolBuilder {
        TieredPoolBuilder::new()
    }

    /// Creates a pool with the given tiers and no histogram.
    #[must_use]
    pub fn new(config: &TierConfig) -> Self {
        Self::new_inner(config, None)
    }

    #[must_use]
    fn new_inner(config: &TierConfig, histogram: Option<Arc<SizeHistogram>>) -> Self {
        Self {
            pool_id: next_pool_id(),
            current: ArcSwap::from_pointee(Generation::build(0, config)),
            last_generation_id: Mutex::new(0),
            histogram,
        }
    }

    /// Takes a buffer of exactly `size` bytes from the pool.
    ///
    /// The buffer comes from the smallest tier with capacity of at least `size` bytes that has
    /// a free container. Returns `None` if `size` is zero or no tier can serve the request.
    /// The pool never allocates in this method.
    ///
    /// If a histogram is attached, the request is recorded whether or not it succeeds.
    ///
    /// # Examples
    ///
    /// ```
    /// use tiered_pool::{TierConfig, TieredPool};
    ///
    /// let pool = TieredPool::new(&TierConfig::from([(10, 1)]));
    ///
    /// assert_eq!(pool.get(8).unwrap().len(), 8);
    /// assert!(pool.get(12).is_none());
    /// assert!(pool.get(0).is_none());
    /// ```
    #[must_use]
    pub fn get(&self, size: usize) -> Option<PooledBuffer> {
        if let Some(histogram) = &self.histogram {
            histogram.hit(size);
        }

        if size == 0 {
            return None;
        }

        let generation = self.current.load();
        let token = next_lease_token();

        generation
            .pages
            .iter()
            .filter(|page| page.capacity() >= size)
            .find_map(|page| page.try_get(size, token))
            .map(|lease| PooledBuffer::new(self.pool_id, lease))
    }

    /// Returns a buffer to the pool.
    ///
    /// Accepts either a [`PooledBuffer`] or an `Option<PooledBuffer>`, so the result of
    /// [`get()`](Self::get) can be handed back as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NilBuffer`] if given `None`. Returns [`Error::ForeignBuffer`] if the
    /// buffer was taken from a different pool or before the last
    /// [`reconfigure()`](Self::reconfigure). A rejected buffer is handed back in the
    /// [`PutError`] untouched, and neither this pool nor the one it came from changes.
    ///
    /// # Examples
    ///
    /// ```
    /// use tiered_pool::{Error, TierConfig, TieredPool};
    ///
    /// let pool = TieredPool::new(&TierConfig::from([(10, 1)]));
    /// let other = TieredPool::new(&TierConfig::from([(10, 1)]));
    ///
    /// assert_eq!(*pool.put(None).unwrap_err().error(), Error::NilBuffer);
    ///
    /// let buffer = other.get(10);
    /// let rejected = pool.put(buffer).unwrap_err();
    /// assert_eq!(*rejected.error(), Error::ForeignBuffer);
    ///
    /// let buffer = pool.get(10);
    /// assert!(pool.put(buffer).is_ok());
    /// ```
    pub fn put(&self, buffer: impl Into<Option<PooledBuffer>>) -> result::Result<(), PutError> {
        let buffer: Option<PooledBuffer> = buffer.into();
        let Some(buffer) = buffer else {
            return Err(PutError::new(Error::NilBuffer, None));
        };

        if buffer.pool_id() != self.pool_id {
            return Err(PutError::new(Error::ForeignBuffer, Some(buffer)));
        }

        let lease = buffer.lease();
        let generation = self.current.load();

        if generation
            .pages
            .iter()
            .filter(|page| page.capacity() == lease.capacity())
            .any(|page| page.try_free(lease.token()))
        {
            return Ok(());
        }

        // Taken before a reconfiguration. Its container is released when the caller drops it.
        Err(PutError::new(Error::ForeignBuffer, Some(buffer)))
    }

    /// Snapshot of container usage per tier.
    #[must_use]
    pub fn usage(&self) -> Usage {
        Usage::from_pages(&self.current.load().pages)
    }

    /// Replaces all tiers of the pool with the ones in `config`.
    ///
    /// New requests are only served from the new tiers. Buffers that are lent out at the
    /// time of the call remain valid for reading and writing, but [`put()`](Self::put) no
    /// longer accepts them. Dropping such a buffer releases its container, and the storage of
    /// the replaced tiers is freed once the last of those buffers is gone.
    ///
    /// # Examples
    ///
    /// ```
    /// use tiered_pool::{Error, TierConfig, TieredPool};
    ///
    /// let pool = TieredPool::new(&TierConfig::from([(10, 1)]));
    /// let old = pool.get(10).unwrap();
    ///
    /// pool.reconfigure(&TierConfig::from([(10, 5), (20, 5)]));
    ///
    /// assert_eq!(pool.tier_capacities(), vec![10, 20]);
    /// assert_eq!(pool.usage().total_used(), 0);
    ///
    /// // The old buffer is still good, but it no longer belongs to any tier of the pool.
    /// assert_eq!(old.len(), 10);
    /// assert_eq!(*pool.put(old).unwrap_err().error(), Error::ForeignBuffer);
    /// ```
    pub fn reconfigure(&self, config: &TierConfig) {
        let mut last_generation_id = self.last_generation_id.lock().expect(ERR_POISONED_LOCK);

        // Overflow would require more reconfigurations than fit in a u64 - impossible.
        let id = last_generation_id.wrapping_add(1);

        self.current.store(Arc::new(Generation::build(id, config)));
        *last_generation_id = id;

        debug!(
            generation = id,
            tiers = config.len(),
            total_bytes = config.total_bytes(),
            "published new pool generation"
        );
    }

    /// Number of times the pool has been reconfigured.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.load().id
    }

    /// Container capacities of all tiers, in ascending order.
    #[must_use]
    pub fn tier_capacities(&self) -> Vec<usize> {
        self.current.load().pages.iter().map(Page::capacity).collect()
    }

    /// The histogram that records requests to this pool, if one is attached.
    #[must_use]
    pub fn histogram(&self) -> Option<&Arc<SizeHistogram>> {
        self.histogram.as_ref()
    }
}

/// Builder for creating an instance of [`TieredPool`].
///
/// All settings are optional. A pool built without any tiers never yields a buffer until
/// it is reconfigured.
///
/// # Examples
///
/// ```
/// use tiered_pool::{TierConfig, TieredPool};
///
/// let pool = TieredPool::builder()
///     .tiers(TierConfig::from([(64, 4)]))
///     .tier(256, 1)
///     .build();
///
/// assert_eq!(pool.tier_capacities(), vec![64, 256]);
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct TieredPoolBuilder {
    config: TierConfig,
    histogram: Option<Arc<SizeHistogram>>,
}

impl TieredPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces all tiers configured so far.
    #[inline]
    pub fn tiers(mut self, config: TierConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds or overwrites the tier with the given container capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[inline]
    pub fn tier(mut self, capacity: usize, count: usize) -> Self {
        self.config.set_tier(capacity, count);
        self
    }

    /// Records the size of every request in the given histogram.
    #[inline]
    pub fn histogram(mut self, histogram: Arc<SizeHistogram>) -> Self {
        self.histogram = Some(histogram);
        self
    }

    /// Builds the pool, allocating all of its containers.
    #[must_use]
    pub fn build(self) -> TieredPool {
        TieredPool::new_inner(&self.config, self.histogram)
    }
}
