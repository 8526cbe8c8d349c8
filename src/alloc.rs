//! Allocation gate consulted before each fallible allocation.
//!
//! `ShardedMap` never allocates through an infallible path: the bucket
//! array, each bucket, and each bucket growth first ask the map's
//! `BucketAlloc` and then reserve with `try_reserve*`. A refusal at either
//! step surfaces as `MapError` and leaves the map untouched.

use crate::error::MapError;
use core::cell::Cell;
use core::fmt;
use std::rc::Rc;

/// Which structure an allocation is for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AllocSite {
    /// The top-level array of bucket slots.
    Table,
    /// A freshly created bucket (initial capacity or a duplicate).
    Bucket,
    /// Growth of an existing bucket, or a copied byte string.
    Entry,
}

impl fmt::Display for AllocSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocSite::Table => "bucket table",
            AllocSite::Bucket => "bucket",
            AllocSite::Entry => "entry",
        })
    }
}

/// Policy deciding whether an allocation may proceed.
pub trait BucketAlloc: Clone {
    /// Return `false` to refuse `bytes` bytes for `site`.
    fn grant(&self, site: AllocSite, bytes: usize) -> bool;
}

/// Grants everything; only the global allocator can fail.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DefaultAlloc;

impl BucketAlloc for DefaultAlloc {
    #[inline]
    fn grant(&self, _site: AllocSite, _bytes: usize) -> bool {
        true
    }
}

/// Cumulative byte budget shared by every clone.
///
/// Each granted request is subtracted from the remaining budget; freed
/// memory is not credited back.
#[derive(Clone, Debug)]
pub struct AllocBudget {
    remaining: Rc<Cell<usize>>,
}

impl AllocBudget {
    pub fn new(bytes: usize) -> Self {
        Self {
            remaining: Rc::new(Cell::new(bytes)),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }

    /// Replace the remaining budget for every clone.
    pub fn set_remaining(&self, bytes: usize) {
        self.remaining.set(bytes);
    }
}

impl Default for AllocBudget {
    /// An effectively unlimited budget.
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl BucketAlloc for AllocBudget {
    fn grant(&self, _site: AllocSite, bytes: usize) -> bool {
        match self.remaining.get().checked_sub(bytes) {
            Some(left) => {
                self.remaining.set(left);
                true
            }
            None => false,
        }
    }
}

/// Ask `alloc` for `bytes` at `site`, logging and converting a refusal.
#[inline]
pub(crate) fn gate<A: BucketAlloc>(alloc: &A, site: AllocSite, bytes: usize) -> Result<(), MapError> {
    if alloc.grant(site, bytes) {
        Ok(())
    } else {
        log::debug!("allocation refused for {site}: {bytes} bytes");
        Err(MapError::AllocRefused { site, bytes })
    }
}
