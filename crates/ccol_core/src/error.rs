//! # Collection Error Types
//!
//! All errors that can occur while growing or configuring a container.

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors that can occur in the container layer.
///
/// Lock acquisition and reads never fail; only memory growth and
/// configuration can.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// The allocator refused a buffer or page request.
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// A capacity computation overflowed `usize`.
    #[error("capacity overflow: cannot add {additional} elements to {len}")]
    CapacityOverflow {
        /// Elements held when growth was requested.
        len: usize,
        /// Elements that were to be added.
        additional: usize,
    },

    /// Invalid configuration value or file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for container operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Handles a growth failure on an infallible path.
///
/// Same contract as `Vec`: running out of memory while growing is fatal.
#[cold]
#[inline(never)]
pub(crate) fn growth_failed(err: &CollectionError) -> ! {
    tracing::error!(error = %err, "container growth failed");
    panic!("container growth failed: {err}");
}
