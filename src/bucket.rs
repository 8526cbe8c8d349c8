//! SortedBucket: the ordered container behind each bucket slot.
//!
//! Entries are kept sorted by key in one vector and located by binary
//! search. Every growth goes through the map's `BucketAlloc` and
//! `try_reserve_exact`, so inserting can fail cleanly: on error the bucket
//! is exactly as it was.

use crate::alloc::{gate, AllocSite, BucketAlloc};
use crate::error::MapError;
use crate::pair::{Increment, TryDuplicate};
use core::borrow::Borrow;
use core::mem;
use core::ops::{Bound, ControlFlow, RangeBounds};

#[derive(Debug)]
pub struct SortedBucket<K, V> {
    entries: Vec<(K, V)>,
}

#[inline]
fn entry_bytes<K, V>(n: usize) -> usize {
    n.saturating_mul(mem::size_of::<(K, V)>())
}

impl<K, V> SortedBucket<K, V>
where
    K: Ord,
{
    pub fn allocate<A: BucketAlloc>(capacity: usize, alloc: &A) -> Result<Self, MapError> {
        gate(alloc, AllocSite::Bucket, entry_bytes::<K, V>(capacity))?;
        let mut entries = Vec::new();
        entries.try_reserve_exact(capacity)?;
        Ok(Self { entries })
    }

    /// Deep copy. A failure part-way drops whatever was copied so far.
    pub fn duplicate<A: BucketAlloc>(&self, alloc: &A) -> Result<Self, MapError>
    where
        K: TryDuplicate,
        V: TryDuplicate,
    {
        let n = self.entries.len();
        gate(alloc, AllocSite::Bucket, entry_bytes::<K, V>(n))?;
        let mut entries = Vec::new();
        entries.try_reserve_exact(n)?;
        for (k, v) in &self.entries {
            entries.push((k.try_duplicate(alloc)?, v.try_duplicate(alloc)?));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Drop every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Release unused capacity.
    pub fn shrink(&mut self) {
        self.entries.shrink_to_fit();
    }

    fn search<Q>(&self, q: &Q) -> Result<usize, usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.entries.binary_search_by(|(k, _)| k.borrow().cmp(q))
    }

    pub fn at<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(q).ok().map(|i| &self.entries[i].1)
    }

    pub fn at_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.search(q) {
            Ok(i) => Some(&mut self.entries[i].1),
            Err(_) => None,
        }
    }

    pub fn count<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(q).is_ok()
    }

    // Make room for one more entry, doubling when full.
    fn reserve_one<A: BucketAlloc>(&mut self, alloc: &A) -> Result<(), MapError> {
        if self.entries.len() < self.entries.capacity() {
            return Ok(());
        }
        let additional = self.entries.len().max(1);
        gate(alloc, AllocSite::Entry, entry_bytes::<K, V>(additional))?;
        self.entries.try_reserve_exact(additional)?;
        Ok(())
    }

    /// Insert or overwrite; returns the replaced value.
    pub fn insert<A: BucketAlloc>(&mut self, key: K, value: V, alloc: &A) -> Result<Option<V>, MapError> {
        match self.search(&key) {
            Ok(i) => Ok(Some(mem::replace(&mut self.entries[i].1, value))),
            Err(i) => {
                self.reserve_one(alloc)?;
                self.entries.insert(i, (key, value));
                Ok(None)
            }
        }
    }

    /// Add `delta` to the value under `key`, inserting `delta` when absent.
    /// Returns the new value and whether the key was new.
    pub fn increment<A: BucketAlloc>(&mut self, key: K, delta: V, alloc: &A) -> Result<(V, bool), MapError>
    where
        V: Increment,
    {
        match self.search(&key) {
            Ok(i) => {
                let slot = &mut self.entries[i].1;
                *slot = slot.increment_by(delta);
                Ok((*slot, false))
            }
            Err(i) => {
                self.reserve_one(alloc)?;
                self.entries.insert(i, (key, delta));
                Ok((delta, true))
            }
        }
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(q).ok().map(|i| self.entries.remove(i))
    }

    /// Entries whose keys fall inside `range`, in key order.
    pub fn range<Q, R>(&self, range: &R) -> &[(K, V)]
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        R: RangeBounds<Q> + ?Sized,
    {
        let e = &self.entries;
        let start = match range.start_bound() {
            Bound::Included(s) => e.partition_point(|(k, _)| k.borrow() < s),
            Bound::Excluded(s) => e.partition_point(|(k, _)| k.borrow() <= s),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(x) => e.partition_point(|(k, _)| k.borrow() <= x),
            Bound::Excluded(x) => e.partition_point(|(k, _)| k.borrow() < x),
            Bound::Unbounded => e.len(),
        };
        if start < end {
            &e[start..end]
        } else {
            &[]
        }
    }

    /// Feed in-range entries to `visitor` in key order.
    ///
    /// `Continue(n)` means all `n` matching entries were visited;
    /// `Break(n)` means the visitor stopped on the `n`-th.
    pub fn iterate<Q, R, F>(&self, range: &R, visitor: &mut F) -> ControlFlow<usize, usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        R: RangeBounds<Q> + ?Sized,
        F: FnMut(&K, &V) -> ControlFlow<()>,
    {
        let mut visited = 0;
        for (k, v) in self.range(range) {
            visited += 1;
            if visitor(k, v).is_break() {
                return ControlFlow::Break(visited);
            }
        }
        ControlFlow::Continue(visited)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, (K, V)> {
        self.entries.iter()
    }
}
