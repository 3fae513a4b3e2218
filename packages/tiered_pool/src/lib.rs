#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A concurrent, size-tiered byte buffer pool.
//!
//! Hot code paths that need short-lived byte buffers can take them from a pool instead of
//! allocating and freeing memory for every use. The pool keeps a set of fixed-capacity
//! containers, grouped into tiers by capacity, and lends them out as buffers of exactly the
//! requested length.
//!
//! Which containers are lent out is tracked with one atomic marker per container rather than
//! with a lock-protected free list. Claiming and returning a container is a single
//! compare-and-swap, so concurrent callers never block each other on the common path.
//!
//! # Pool types
//!
//! - [`TieredPool`] is built from a static [`TierConfig`] and never grows. Taking and returning
//!   buffers is lock-free. The tiers can be replaced at runtime via
//!   [`reconfigure()`](TieredPool::reconfigure).
//! - [`BoundedPool`] starts empty and creates containers of exactly the requested size on demand,
//!   as long as the total allocated size stays within a limit.
//!
//! Both serve a request from the smallest tier that fits and has a free container, falling
//! back to larger tiers when the best fitting one is exhausted.
//!
//! # Examples
//!
//! ```
//! use tiered_pool::{TierConfig, TierUsage, TieredPool};
//!
//! let pool = TieredPool::new(&TierConfig::from([(1024, 4), (4096, 1)]));
//!
//! let mut buffer = pool.get(1500).unwrap();
//! assert_eq!(buffer.len(), 1500);
//!
//! buffer.fill(0xAB);
//!
//! assert_eq!(pool.usage().tier(4096), Some(TierUsage::new(1, 1)));
//!
//! pool.put(buffer).unwrap();
//! assert_eq!(pool.usage().total_used(), 0);
//! ```
//!
//! Growing on demand within a budget:
//!
//! ```
//! use tiered_pool::{BoundedPool, Error};
//!
//! let pool = BoundedPool::with_size_limit(4096);
//!
//! let buffer = pool.get(4000).unwrap();
//! assert!(matches!(pool.get(100), Err(Error::BudgetExceeded { .. })));
//!
//! pool.put(buffer).unwrap();
//!
//! // The existing container serves smaller requests.
//! assert_eq!(pool.get(100).unwrap().capacity(), 4000);
//! ```
//!
//! # Returning buffers
//!
//! A [`PooledBuffer`] returns its container when dropped, so buffers are never leaked. Returning
//! it explicitly via `put()` additionally verifies that it came from that pool. A buffer the
//! pool refuses comes back inside the [`PutError`], unchanged.
//!
//! # Observability
//!
//! Attach a [`SizeHistogram`] to a pool to record the requested sizes, and call `usage()` for a
//! per-tier [`Usage`] snapshot. Structural changes (new tiers, new containers, reconfiguration)
//! are reported as `tracing` debug events.

mod bounded;
mod container;
mod error;
mod histogram;
mod ids;
mod page;
mod pooled_buffer;
mod tier_config;
mod tiered;
mod usage;

pub use bounded::*;
pub(crate) use container::*;
pub use error::*;
pub use histogram::*;
pub(crate) use ids::*;
pub(crate) use page::*;
pub use pooled_buffer::*;
pub use tier_config::*;
pub use tiered::*;
pub use usage::*;

// A poisoned lock means the process is in an unrecoverable/unsafe state and must exit (we panic).
pub(crate) const ERR_POISONED_LOCK: &str =
    "encountered poisoned lock - program validity cannot be guaranteed";
