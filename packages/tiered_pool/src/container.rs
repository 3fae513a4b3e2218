use std::cell::UnsafeCell;
use std::fmt;
use std::num::NonZero;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lease marker value of a container that is not lent out.
const FREE: u64 = 0;

/// A single fixed-capacity block of bytes that is lent out to at most one caller at a time.
///
/// The lease marker is either [`FREE`] or the token of the one lent view that may access
/// the storage. Both transitions are a single compare-and-swap, so no thread ever observes
/// a half-claimed container.
///
/// # Out of band access
///
/// The container does not hand out references on its own. The holder of the current lease
/// obtains them via [`bytes()`](Self::bytes) and [`bytes_mut()`](Self::bytes_mut) from unsafe
/// code, promising that it really does hold the lease.
pub(crate) struct Container {
    capacity: usize,

    storage: UnsafeCell<Box<[u8]>>,

    /// [`FREE`] or the token of the current lease.
    lease: AtomicU64,
}

// SAFETY: The storage is only ever accessed through `bytes()` and `bytes_mut()`, which require
// the caller to hold the current lease. A lease is granted to exactly one lessee via an atomic
// compare-and-swap, so there is never more than one thread accessing the storage.
unsafe impl Sync for Container {}

impl Container {
    /// Creates a free container with `capacity` zero-initialized bytes of storage.
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            storage: UnsafeCell::new(vec![0; capacity].into_boxed_slice()),
            lease: AtomicU64::new(FREE),
        }
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the container is currently lent out.
    ///
    /// This is only a hint for scanning. The answer may be stale by the time the caller acts on it.
    #[must_use]
    pub(crate) fn is_in_use(&self) -> bool {
        self.lease.load(Ordering::Relaxed) != FREE
    }

    /// Attempts to lend out the container under the given lease token.
    ///
    /// Returns `false` if the container is already lent out, including the case where another
    /// thread claimed it between the caller's scan and this call.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds the capacity of the container.
    #[must_use]
    pub(crate) fn try_claim(&self, token: NonZero<u64>, size: usize) -> bool {
        assert!(
            size <= self.capacity,
            "requested {size} bytes from a container with capacity {}",
            self.capacity
        );

        self.lease
            .compare_exchange(FREE, token.get(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Lends out a container that the caller knows to be free.
    ///
    /// # Panics
    ///
    /// Panics if the container is already lent out or if `size` exceeds its capacity.
    /// Either means the page or pool bookkeeping is broken.
    pub(crate) fn allocate(&self, token: NonZero<u64>, size: usize) {
        let claimed = self.try_claim(token, size);

        assert!(
            claimed,
            "attempted to allocate a container that is already lent out"
        );
    }

    /// Returns the container if `token` identifies the current lease.
    ///
    /// Returns whether the container was released by this call. A stale or foreign token never
    /// releases anything.
    #[must_use]
    pub(crate) fn free(&self, token: NonZero<u64>) -> bool {
        self.lease
            .compare_exchange(token.get(), FREE, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    /// The first `len` bytes of the storage.
    ///
    /// # Safety
    ///
    /// The caller must hold the current lease on this container and must not hold any
    /// exclusive reference obtained via [`bytes_mut()`](Self::bytes_mut) at the same time.
    pub(crate) unsafe fn bytes(&self, len: usize) -> &[u8] {
        // SAFETY: The caller holds the lease, so nobody else is accessing the storage.
        let storage = unsafe { &*self.storage.get() };

        storage
            .get(..len)
            .expect("lease length never exceeds container capacity")
    }

    /// The first `len` bytes of the storage, for writing.
    ///
    /// # Safety
    ///
    /// The caller must hold the current lease on this container and must not hold any other
    /// reference to the storage at the same time.
    #[expect(
        clippy::mut_from_ref,
        reason = "exclusivity is guaranteed by the lease, not by the borrow"
    )]
    pub(crate) unsafe fn bytes_mut(&self, len: usize) -> &mut [u8] {
        // SAFETY: The caller holds the lease and no other reference, so access is exclusive.
        let storage = unsafe { &mut *self.storage.get() };

        storage
            .get_mut(..len)
            .expect("lease length never exceeds container capacity")
    }
}

impl fmt::Debug for Container {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of any contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("capacity", &self.capacity)
            .field("lease", &self.lease.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::next_lease_token;

    assert_impl_all!(Container: Send, Sync, fmt::Debug);

    #[test]
    fn new_container_is_free() {
        let container = Container::new(16);

        assert_eq!(container.capacity(), 16);
        assert!(!container.is_in_use());
    }

    #[test]
    fn claim_marks_in_use() {
        let container = Container::new(16);

        assert!(container.try_claim(next_lease_token(), 8));
        assert!(container.is_in_use());
    }

    #[test]
    fn second_claim_loses() {
        let container = Container::new(16);

        assert!(container.try_claim(next_lease_token(), 16));
        assert!(!container.try_claim(next_lease_token(), 16));
    }

    #[test]
    fn free_with_matching_token() {
        let container = Container::new(16);
        let token = next_lease_token();

        container.allocate(token, 16);

        assert!(container.free(token));
        assert!(!container.is_in_use());
    }

    #[test]
    fn free_with_foreign_token_is_rejected() {
        let container = Container::new(16);
        let token = next_lease_token();

        container.allocate(token, 16);

        assert!(!container.free(next_lease_token()));
        assert!(container.is_in_use());
    }

    #[test]
    fn double_free_is_rejected() {
        let container = Container::new(16);
        let token = next_lease_token();

        container.allocate(token, 4);

        assert!(container.free(token));
        assert!(!container.free(token));
    }

    #[test]
    fn stale_token_cannot_free_new_lease() {
        let container = Container::new(16);
        let first = next_lease_token();
        let second = next_lease_token();

        container.allocate(first, 16);
        assert!(container.free(first));

        container.allocate(second, 16);

        assert!(!container.free(first));
        assert!(container.is_in_use());
        assert!(container.free(second));
    }

    #[test]
    #[should_panic]
    fn allocate_lent_container_panics() {
        let container = Container::new(16);

        container.allocate(next_lease_token(), 16);
        container.allocate(next_lease_token(), 16);
    }

    #[test]
    #[should_panic]
    fn claim_beyond_capacity_panics() {
        let container = Container::new(16);

        _ = container.try_claim(next_lease_token(), 17);
    }

    #[test]
    fn storage_is_shared_between_leases() {
        let container = Container::new(8);
        let first = next_lease_token();

        container.allocate(first, 4);
        unsafe { container.bytes_mut(4) }.copy_from_slice(&[1, 2, 3, 4]);
        assert!(container.free(first));

        container.allocate(next_lease_token(), 8);

        // Storage is not cleared between leases.
        assert_eq!(unsafe { container.bytes(8) }, &[1, 2, 3, 4, 0, 0, 0, 0]);
    }
}
