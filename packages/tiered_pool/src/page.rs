use std::iter;
use std::num::NonZero;
use std::sync::Arc;

use crate::{Container, TierUsage};

/// A claim on one container, as handed out by a [`Page`].
///
/// The lease keeps the container alive, so the storage remains valid even after the page
/// (or the whole pool) that created it is gone.
#[derive(Debug)]
pub(crate) struct Lease {
    container: Arc<Container>,
    token: NonZero<u64>,

    /// Number of bytes the lessee asked for. Never more than the container capacity.
    len: usize,
}

impl Lease {
    #[must_use]
    fn new(container: Arc<Container>, token: NonZero<u64>, len: usize) -> Self {
        Self {
            container,
            token,
            len,
        }
    }

    #[must_use]
    pub(crate) fn container(&self) -> &Container {
        &self.container
    }

    #[must_use]
    pub(crate) fn token(&self) -> NonZero<u64> {
        self.token
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.container.capacity()
    }

    /// Returns the container directly, without going through any page.
    ///
    /// Returns `false` if this lease is no longer the active one.
    #[must_use]
    pub(crate) fn release(&self) -> bool {
        self.container.free(self.token)
    }
}

/// One tier of the pool: a set of containers that all have the same capacity.
///
/// Containers are only ever appended, never removed or reordered.
#[derive(Debug)]
pub(crate) struct Page {
    capacity: usize,
    containers: Vec<Arc<Container>>,
}

impl Page {
    /// Creates a page with no containers, to be filled via [`add_container()`](Self::add_container).
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            containers: Vec::new(),
        }
    }

    /// Creates a page with `count` free containers.
    #[must_use]
    pub(crate) fn with_containers(capacity: usize, count: usize) -> Self {
        Self {
            capacity,
            containers: iter::repeat_with(|| Arc::new(Container::new(capacity)))
                .take(count)
                .collect(),
        }
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of containers in the page, lent out or not.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.containers.len()
    }

    /// Claims the first free container for a `size`-byte view.
    ///
    /// A container that another thread claims first is skipped, not retried, so this never
    /// spins. Returns `None` if no container could be claimed.
    #[must_use]
    pub(crate) fn try_get(&self, size: usize, token: NonZero<u64>) -> Option<Lease> {
        debug_assert!(size <= self.capacity);

        self.containers
            .iter()
            .filter(|container| !container.is_in_use())
            .find(|container| container.try_claim(token, size))
            .map(|container| Lease::new(Arc::clone(container), token, size))
    }

    /// Appends a new container and claims it for a `size`-byte view.
    ///
    /// Requiring `&mut self` means the caller must already hold whatever guard protects
    /// the page list of the pool.
    #[must_use]
    pub(crate) fn add_container(&mut self, size: usize, token: NonZero<u64>) -> Lease {
        let container = Arc::new(Container::new(self.capacity));
        container.allocate(token, size);

        self.containers.push(Arc::clone(&container));

        Lease::new(container, token, size)
    }

    /// Releases whichever container of this page is lent out under `token`.
    ///
    /// Returns whether any container matched.
    #[must_use]
    pub(crate) fn try_free(&self, token: NonZero<u64>) -> bool {
        self.containers.iter().any(|container| container.free(token))
    }

    /// Point-in-time count of lent out containers. Not consistent under concurrent mutation.
    #[must_use]
    pub(crate) fn usage(&self) -> TierUsage {
        let used = self
            .containers
            .iter()
            .filter(|container| container.is_in_use())
            .count();

        TierUsage::new(used, self.containers.len())
    }
}
