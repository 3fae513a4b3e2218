use thiserror::Error;

use crate::PooledBuffer;

/// Errors that can occur when taking buffers from or returning buffers to a pool.
///
/// None of these leave the pool in a modified state.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Growing the pool by a container of the requested size would exceed its size limit.
    ///
    /// Only returned by [`BoundedPool`][crate::BoundedPool]. The caller may retry once other
    /// buffers have been returned or request a size that an existing container can serve.
    #[error(
        "requesting {requested} more bytes would exceed the pool size limit ({allocated} of {limit} bytes allocated)"
    )]
    BudgetExceeded {
        /// The size of the buffer that could not be served.
        requested: usize,

        /// The number of bytes the pool had allocated at the time of the request.
        allocated: usize,

        /// The size limit of the pool.
        limit: usize,
    },

    /// A zero-byte buffer was requested from a pool that would have to grow to serve it.
    #[error("cannot take a zero-sized buffer from the pool")]
    ZeroSize,

    /// No buffer was given to return to the pool.
    #[error("cannot put nil-buffer into pool")]
    NilBuffer,

    /// The buffer is not currently lent out by this pool.
    ///
    /// This includes buffers taken before the pool was reconfigured. The buffer itself is
    /// handed back via [`PutError::into_buffer()`] and still returns to its own container
    /// when dropped.
    #[error("buffer was not taken from pool")]
    ForeignBuffer,
}

/// A buffer that a pool refused to take back, together with the reason.
///
/// The pool does not keep or release a buffer it rejects. The caller gets it back and can
/// return it to the pool it really came from.
///
/// # Examples
///
/// ```
/// use tiered_pool::{Error, TierConfig, TieredPool};
///
/// let pool = TieredPool::new(&TierConfig::from([(10, 1)]));
/// let other = TieredPool::new(&TierConfig::from([(10, 1)]));
///
/// let rejected = pool.put(other.get(10)).unwrap_err();
/// assert_eq!(*rejected.error(), Error::ForeignBuffer);
///
/// other.put(rejected.into_buffer()).unwrap();
/// ```
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PutError {
    error: Error,
    buffer: Option<PooledBuffer>,
}

impl PutError {
    #[must_use]
    pub(crate) fn new(error: Error, buffer: Option<PooledBuffer>) -> Self {
        Self { error, buffer }
    }

    /// Why the pool refused the buffer.
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// The rejected buffer, or `None` if there was no buffer to begin with.
    #[must_use]
    pub fn into_buffer(self) -> Option<PooledBuffer> {
        self.buffer
    }
}

impl From<PutError> for Error {
    fn from(value: PutError) -> Self {
        value.error
    }
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
