use std::num::NonZero;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique pool IDs.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Global counter for generating lease tokens. Zero is reserved for "not lent out".
static NEXT_LEASE_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
pub(crate) fn next_pool_id() -> u64 {
    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Generates a lease token that has never been handed out before in this process.
///
/// Tokens are never reused, so a buffer that has already been returned can never match
/// the lease of whoever claimed the same container after it.
pub(crate) fn next_lease_token() -> NonZero<u64> {
    // A u64 incremented once per request cannot wrap around within the lifetime of a process.
    NonZero::new(NEXT_LEASE_TOKEN.fetch_add(1, Ordering::Relaxed))
        .expect("lease token counter starts at 1 and never wraps around")
}
