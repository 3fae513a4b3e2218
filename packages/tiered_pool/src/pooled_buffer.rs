use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::Lease;

/// A byte buffer lent out by a pool.
///
/// The buffer is exactly as long as requested, even if the container backing it is larger.
/// It dereferences to `[u8]` and grants exclusive write access to its bytes for as long as
/// the buffer exists.
///
/// Return the buffer via the `put()` method of the pool it came from to learn whether the
/// pool accepted it. A rejected buffer is handed back to the caller. A buffer that is simply
/// dropped is returned to its container as well, without any checks and without taking any
/// pool lock.
///
/// The contents are not cleared between uses. A freshly taken buffer may contain whatever
/// the previous user of the same container wrote into it.
///
/// # Examples
///
/// ```
/// use tiered_pool::{TierConfig, TieredPool};
///
/// let pool = TieredPool::new(&TierConfig::from([(16, 1)]));
///
/// let mut buffer = pool.get(4).unwrap();
/// assert_eq!(buffer.len(), 4);
/// assert_eq!(buffer.capacity(), 16);
///
/// buffer.copy_from_slice(b"pool");
/// assert_eq!(&*buffer, b"pool");
///
/// pool.put(buffer).unwrap();
/// ```
///
/// # Thread safety
///
/// The buffer is thread-safe ([`Send`] + [`Sync`]) and can be returned to the pool from
/// any thread. The storage stays alive for as long as the buffer does, even if the pool
/// is reconfigured or dropped in the meantime.
pub struct PooledBuffer {
    /// Ensures the buffer is only accepted by the pool it came from.
    pool_id: u64,

    lease: Lease,
}

impl PooledBuffer {
    #[must_use]
    pub(crate) fn new(pool_id: u64, lease: Lease) -> Self {
        Self { pool_id, lease }
    }

    #[must_use]
    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    #[must_use]
    pub(crate) fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Number of bytes in the buffer, as requested from the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lease.len()
    }

    /// Whether the buffer has no bytes. Pools never lend out empty buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lease.len() == 0
    }

    /// Capacity of the container backing the buffer.
    ///
    /// This is larger than [`len()`](Self::len) if the request was served by a larger tier.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lease.capacity()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // SAFETY: The lease is only released when the buffer is consumed by `put()` or dropped,
        // so we still hold it. Any exclusive reference would have to borrow `self` mutably.
        unsafe { self.lease.container().bytes(self.lease.len()) }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: We hold the lease and `&mut self` rules out any other reference from this buffer.
        unsafe { self.lease.container().bytes_mut(self.lease.len()) }
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl AsMut<[u8]> for PooledBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // If the buffer went through `put()`, the lease is already released and this is a no-op.
        _ = self.lease.release();
    }
}

impl fmt::Debug for PooledBuffer {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of any contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("pool_id", &self.pool_id)
            .field("len", &self.lease.len())
            .field("capacity", &self.lease.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::{Page, TierUsage, next_lease_token};

    assert_impl_all!(PooledBuffer: Send, Sync, fmt::Debug);

    #[test]
    fn view_is_requested_prefix() {
        let page = Page::with_containers(16, 1);
        let mut buffer = PooledBuffer::new(1, page.try_get(5, next_lease_token()).unwrap());

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.capacity(), 16);
        assert!(!buffer.is_empty());

        buffer.as_mut().fill(7);
        assert_eq!(buffer.as_ref(), &[7; 5]);
    }

    #[test]
    fn drop_releases_container() {
        let page = Page::with_containers(16, 1);
        let buffer = PooledBuffer::new(1, page.try_get(16, next_lease_token()).unwrap());

        assert_eq!(page.usage(), TierUsage::new(1, 1));

        drop(buffer);

        assert_eq!(page.usage(), TierUsage::new(0, 1));
    }

    #[test]
    fn drop_after_release_leaves_new_lease_alone() {
        let page = Page::with_containers(16, 1);
        let buffer = PooledBuffer::new(1, page.try_get(16, next_lease_token()).unwrap());

        assert!(page.try_free(buffer.lease().token()));

        let next = page.try_get(16, next_lease_token()).unwrap();
        drop(buffer);

        assert!(next.container().is_in_use());
        assert_eq!(page.usage(), TierUsage::new(1, 1));
    }

    #[test]
    fn debug_shows_sizes() {
        let page = Page::with_containers(16, 1);
        let buffer = PooledBuffer::new(1, page.try_get(3, next_lease_token()).unwrap());

        let output = format!("{buffer:?}");

        assert!(output.contains("PooledBuffer"));
        assert!(output.contains("len: 3"));
    }
}
