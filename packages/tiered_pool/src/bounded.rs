use std::result;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{
    ERR_POISONED_LOCK, Error, Page, PooledBuffer, PutError, Result, SizeHistogram, Usage,
    next_lease_token, next_pool_id,
};

/// Everything that changes when the pool grows.
#[derive(Debug, Default)]
struct GrowthState {
    /// Sorted by ascending capacity, at most one page per capacity.
    pages: Vec<Page>,

    /// Sum of the capacities of all containers ever created by the pool.
    allocated_bytes: usize,
}

/// A byte buffer pool that starts empty and grows on demand, up to a size limit.
///
/// A request is served by the smallest existing container that fits and is free. If there
/// is none, the pool creates a container of exactly the requested size, as long as the total
/// size of all containers stays within the size limit. Containers are never freed, so the
/// pool converges on the set of sizes its callers actually use.
///
/// # Examples
///
/// ```
/// use tiered_pool::{BoundedPool, Error};
///
/// let pool = BoundedPool::with_size_limit(100);
///
/// assert!(matches!(pool.get(110), Err(Error::BudgetExceeded { .. })));
/// assert_eq!(pool.allocated_bytes(), 0);
///
/// let a = pool.get(10).unwrap();
/// let b = pool.get(32).unwrap();
/// assert_eq!(pool.allocated_bytes(), 42);
///
/// pool.put(a).unwrap();
///
/// // Served by the existing 10-byte container, no growth.
/// let c = pool.get(8).unwrap();
/// assert_eq!(c.capacity(), 10);
/// assert_eq!(pool.allocated_bytes(), 42);
/// # drop((b, c));
/// ```
///
/// # Thread safety
///
/// The pool is thread-safe ([`Send`] + [`Sync`]). Taking and returning buffers is serialized
/// by a single lock, so that two threads can never grow the same missing tier twice and the
/// size limit is never overshot. Dropping a buffer without returning it does not take the lock.
#[derive(Debug)]
pub struct BoundedPool {
    /// Buffers carry this ID so we can tell when one is returned to the wrong pool.
    pool_id: u64,

    size_limit: usize,

    state: Mutex<GrowthState>,

    histogram: Option<Arc<SizeHistogram>>,
}

impl BoundedPool {
    /// Creates a builder for configuring and constructing a [`BoundedPool`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use tiered_pool::{BoundedPool, SizeHistogram};
    ///
    /// let histogram = Arc::new(SizeHistogram::new());
    ///
    /// let pool = BoundedPool::builder()
    ///     .size_limit(1024 * 1024)
    ///     .histogram(Arc::clone(&histogram))
    ///     .build();
    ///
    /// let _buffer = pool.get(1500).unwrap();
    /// assert_eq!(histogram.count(1500), 1);
    /// ```
    #[inline]
    pub fn builder() -> BoundedPoolBuilder {
        BoundedPoolBuilder::new()
    }

    /// Creates an empty pool that may allocate at most `size_limit` bytes in total.
    #[must_use]
    pub fn with_size_limit(size_limit: usize) -> Self {
        Self::new_inner(size_limit, None)
    }

    /// Creates an empty pool without a size limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new_inner(usize::MAX, None)
    }

    #[must_use]
    fn new_inner(size_limit: usize, histogram: Option<Arc<SizeHistogram>>) -> Self {
        Self {
            pool_id: next_pool_id(),
            size_limit,
            state: Mutex::new(GrowthState::default()),
            histogram,
        }
    }

    /// Takes a buffer of exactly `size` bytes from the pool, growing the pool if needed.
    ///
    /// If a histogram is attached, the request is recorded whether or not it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroSize`] if `size` is zero. Returns [`Error::BudgetExceeded`] if no
    /// free container fits and creating one would exceed the size limit. Nothing is allocated
    /// in either case.
    pub fn get(&self, size: usize) -> Result<PooledBuffer> {
        if let Some(histogram) = &self.histogram {
            histogram.hit(size);
        }

        if size == 0 {
            return Err(Error::ZeroSize);
        }

        let token = next_lease_token();

        let mut guard = self.state.lock().expect(ERR_POISONED_LOCK);
        let state = &mut *guard;

        let mut exact_page_index = None;

        for (index, page) in state.pages.iter().enumerate() {
            if page.capacity() < size {
                continue;
            }

            if page.capacity() == size {
                exact_page_index = Some(index);
            }

            if let Some(lease) = page.try_get(size, token) {
                return Ok(PooledBuffer::new(self.pool_id, lease));
            }
        }

        let allocated_bytes = state
            .allocated_bytes
            .checked_add(size)
            .filter(|total| *total <= self.size_limit)
            .ok_or(Error::BudgetExceeded {
                requested: size,
                allocated: state.allocated_bytes,
                limit: self.size_limit,
            })?;

        state.allocated_bytes = allocated_bytes;

        let page = if let Some(index) = exact_page_index {
            state
                .pages
                .get_mut(index)
                .expect("index was found by scanning the same page list under the same lock")
        } else {
            let index = state.pages.partition_point(|page| page.capacity() < size);
            state.pages.insert(index, Page::new(size));

            debug!(capacity = size, tiers = state.pages.len(), "created new page");

            state
                .pages
                .get_mut(index)
                .expect("we just inserted a page at this index")
        };

        let lease = page.add_container(size, token);

        debug!(
            capacity = size,
            containers = page.len(),
            allocated_bytes,
            "added container"
        );

        Ok(PooledBuffer::new(self.pool_id, lease))
    }

    /// Returns a buffer to the pool.
    ///
    /// Accepts either a [`PooledBuffer`] or an `Option<PooledBuffer>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NilBuffer`] if given `None` and [`Error::ForeignBuffer`] if the buffer
    /// was not lent out by this pool. A rejected buffer is handed back in the [`PutError`]
    /// untouched, and neither this pool nor the one it came from changes.
    pub fn put(&self, buffer: impl Into<Option<PooledBuffer>>) -> result::Result<(), PutError> {
        let buffer: Option<PooledBuffer> = buffer.into();
        let Some(buffer) = buffer else {
            return Err(PutError::new(Error::NilBuffer, None));
        };

        if buffer.pool_id() != self.pool_id {
            return Err(PutError::new(Error::ForeignBuffer, Some(buffer)));
        }

        let lease = buffer.lease();
        let state = self.state.lock().expect(ERR_POISONED_LOCK);

        if state
            .pages
            .iter()
            .filter(|page| page.capacity() == lease.capacity())
            .any(|page| page.try_free(lease.token()))
        {
            return Ok(());
        }

        drop(state);

        Err(PutError::new(Error::ForeignBuffer, Some(buffer)))
    }

    /// Snapshot of container usage per tier.
    #[must_use]
    pub fn usage(&self) -> Usage {
        Usage::from_pages(&self.state.lock().expect(ERR_POISONED_LOCK).pages)
    }

    /// Total bytes allocated for containers so far.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.state.lock().expect(ERR_POISONED_LOCK).allocated_bytes
    }

    /// Maximum number of bytes the pool may allocate for containers.
    #[must_use]
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// The histogram that records requests to this pool, if one is attached.
    #[must_use]
    pub fn histogram(&self) -> Option<&Arc<SizeHistogram>> {
        self.histogram.as_ref()
    }
}

/// Builder for creating an instance of [`BoundedPool`].
///
/// All settings are optional. Without a size limit the pool grows for as long as there is memory.
///
/// # Examples
///
/// ```
/// use tiered_pool::BoundedPool;
///
/// let pool = BoundedPool::builder().size_limit(4096).build();
///
/// assert_eq!(pool.size_limit(), 4096);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
#[derive(Debug)]
#[must_use]
pub struct BoundedPoolBuilder {
    size_limit: usize,
    histogram: Option<Arc<SizeHistogram>>,
}

impl BoundedPoolBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            size_limit: usize::MAX,
            histogram: None,
        }
    }

    /// Sets the maximum number of bytes the pool may allocate for containers.
    #[inline]
    pub fn size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Records the size of every request in the given histogram.
    #[inline]
    pub fn histogram(mut self, histogram: Arc<SizeHistogram>) -> Self {
        self.histogram = Some(histogram);
        self
    }

    /// Builds the pool. No memory is allocated until the first request.
    #[must_use]
    pub fn build(self) -> BoundedPool {
        BoundedPool::new_inner(self.size_limit, self.histogram)
    }
}
