//! Error types shared by every layer.

use crate::alloc::AllocSite;
use std::collections::TryReserveError;
use thiserror::Error;

/// Failure of an operation that needed memory.
///
/// Key absence is never reported through this type; lookups answer
/// `None`/`false` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// The map's `BucketAlloc` refused the request.
    #[error("allocation refused for {site}: {bytes} bytes requested")]
    AllocRefused { site: AllocSite, bytes: usize },

    /// The global allocator could not satisfy a reservation.
    #[error("allocation failed: {0}")]
    Reserve(#[from] TryReserveError),
}

/// A failed ownership-transferring call: the caller's handle comes back
/// untouched together with the reason.
#[derive(Debug)]
pub struct Failed<H> {
    pub handle: H,
    pub error: MapError,
}

impl<H> Failed<H> {
    pub(crate) fn new(handle: H, error: MapError) -> Self {
        Self { handle, error }
    }

    /// Drop the returned handle, keeping only the error.
    pub fn into_error(self) -> MapError {
        self.error
    }
}
