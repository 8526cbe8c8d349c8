//! ShardedMap: a fixed array of lazily created, ordered buckets.
//!
//! A key's bucket is chosen by `hash_index` from the key bits and the map's
//! index width; the bucket then resolves the key by comparison. The bucket
//! array never grows or rehashes. `len` is kept equal to the sum of all
//! bucket lengths: it moves only when a bucket confirms that an entry was
//! added or removed.

use crate::alloc::{gate, AllocSite, BucketAlloc, DefaultAlloc};
use crate::bucket::SortedBucket;
use crate::error::MapError;
use crate::hash_index::{clamp_bits, ShardKey};
use crate::pair::{Increment, MapType, TypePair};
use core::borrow::Borrow;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{ControlFlow, RangeBounds};

// Initial bucket capacities, cycled by bucket index so neighbouring
// buckets do not all grow at the same insert count.
const INITIAL_CAPACITIES: [usize; 4] = [8, 16, 32, 64];

#[inline]
fn initial_capacity(index: usize) -> usize {
    INITIAL_CAPACITIES[index % INITIAL_CAPACITIES.len()]
}

/// Shape of a map's bucket array.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MapConfig {
    index_bits: u32,
}

impl MapConfig {
    /// Default shape for a type pair.
    pub fn for_type(tag: MapType) -> Self {
        Self {
            index_bits: tag.default_index_bits(),
        }
    }

    /// Override the index width; clamped to the accepted range.
    pub fn with_index_bits(mut self, bits: u32) -> Self {
        self.index_bits = clamp_bits(bits);
        self
    }

    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }

    pub fn bucket_count(&self) -> usize {
        1usize << self.index_bits
    }
}

type Bucket<P> = SortedBucket<<P as TypePair>::Key, <P as TypePair>::Value>;

pub struct ShardedMap<P: TypePair, A: BucketAlloc = DefaultAlloc> {
    len: usize,
    index_bits: u32,
    buckets: Vec<Option<Bucket<P>>>,
    alloc: A,
    _pair: PhantomData<fn() -> P>,
}

impl<P: TypePair> ShardedMap<P> {
    pub fn new() -> Result<Self, MapError> {
        Self::with_alloc(DefaultAlloc)
    }
}

impl<P, A> ShardedMap<P, A>
where
    P: TypePair,
    A: BucketAlloc,
{
    pub fn with_alloc(alloc: A) -> Result<Self, MapError> {
        Self::with_config(MapConfig::for_type(P::TAG), alloc)
    }

    /// Allocate an empty map. Nothing is left behind on failure.
    pub fn with_config(config: MapConfig, alloc: A) -> Result<Self, MapError> {
        let index_bits = clamp_bits(config.index_bits);
        let n = 1usize << index_bits;
        gate(
            &alloc,
            AllocSite::Table,
            n.saturating_mul(core::mem::size_of::<Option<Bucket<P>>>()),
        )?;
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(n)?;
        buckets.resize_with(n, || None);
        log::debug!("allocated {:?} map with {} buckets", P::TAG, n);
        Ok(Self {
            len: 0,
            index_bits,
            buckets,
            alloc,
            _pair: PhantomData,
        })
    }

    pub fn config(&self) -> MapConfig {
        MapConfig {
            index_bits: self.index_bits,
        }
    }

    pub fn type_tag(&self) -> MapType {
        P::TAG
    }

    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of bucket slots that currently hold a bucket.
    pub fn allocated_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }

    pub fn alloc(&self) -> &A {
        &self.alloc
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn bucket_index<Q>(&self, q: &Q) -> usize
    where
        Q: ?Sized + ShardKey,
    {
        q.shard_index(self.index_bits)
    }

    pub fn at<Q>(&self, q: &Q) -> Option<&P::Value>
    where
        P::Key: Borrow<Q>,
        Q: ?Sized + ShardKey + Ord,
    {
        self.buckets[self.bucket_index(q)].as_ref()?.at(q)
    }

    pub fn at_mut<Q>(&mut self, q: &Q) -> Option<&mut P::Value>
    where
        P::Key: Borrow<Q>,
        Q: ?Sized + ShardKey + Ord,
    {
        let i = self.bucket_index(q);
        self.buckets[i].as_mut()?.at_mut(q)
    }

    pub fn count<Q>(&self, q: &Q) -> bool
    where
        P::Key: Borrow<Q>,
        Q: ?Sized + ShardKey + Ord,
    {
        self.buckets[self.bucket_index(q)]
            .as_ref()
            .map(|b| b.count(q))
            .unwrap_or(false)
    }

    // Run `op` on bucket `i`, creating the bucket first if needed. A bucket
    // created here is discarded again when `op` fails.
    fn with_bucket<T, F>(&mut self, i: usize, op: F) -> Result<T, MapError>
    where
        F: FnOnce(&mut Bucket<P>, &A) -> Result<T, MapError>,
    {
        let slot = &mut self.buckets[i];
        let created = slot.is_none();
        let bucket = match slot.take() {
            Some(b) => b,
            None => {
                let b = SortedBucket::allocate(initial_capacity(i), &self.alloc)?;
                log::trace!("created bucket {} with capacity {}", i, b.capacity());
                b
            }
        };
        let bucket = slot.insert(bucket);
        match op(bucket, &self.alloc) {
            Ok(out) => Ok(out),
            Err(e) => {
                if created {
                    *slot = None;
                }
                Err(e)
            }
        }
    }

    /// Insert or overwrite. Returns the previous value when the key existed.
    /// On error the map is unchanged.
    pub fn insert(&mut self, key: P::Key, value: P::Value) -> Result<Option<P::Value>, MapError> {
        let i = self.bucket_index(&key);
        let prev = self.with_bucket(i, |b, alloc| b.insert(key, value, alloc))?;
        if prev.is_none() {
            self.len += 1;
        }
        Ok(prev)
    }

    /// Remove `q`, returning its value.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<P::Value>
    where
        P::Key: Borrow<Q>,
        Q: ?Sized + ShardKey + Ord,
    {
        let i = self.bucket_index(q);
        let (_k, v) = self.buckets[i].as_mut()?.remove(q)?;
        self.len -= 1;
        Some(v)
    }

    /// Remove `q`; `false` when it was not present.
    pub fn delete<Q>(&mut self, q: &Q) -> bool
    where
        P::Key: Borrow<Q>,
        Q: ?Sized + ShardKey + Ord,
    {
        self.remove(q).is_some()
    }

    /// Empty every bucket in place. Buckets, type and shape are kept.
    pub fn clear(&mut self) {
        for b in self.buckets.iter_mut().flatten() {
            b.clear();
        }
        self.len = 0;
    }

    /// Release unused capacity held by the buckets.
    pub fn shrink(&mut self) {
        for b in self.buckets.iter_mut().flatten() {
            b.shrink();
        }
    }

    pub(crate) fn duplicate_with(&self, alloc: A) -> Result<Self, MapError> {
        let mut out = Self::with_config(self.config(), alloc)?;
        for (dst, src) in out.buckets.iter_mut().zip(&self.buckets) {
            if let Some(src) = src {
                *dst = Some(src.duplicate(&out.alloc)?);
            }
        }
        out.len = self.len;
        log::debug!("duplicated {:?} map with {} entries", P::TAG, out.len);
        Ok(out)
    }

    /// Deep copy sharing nothing with `self`. On failure the partial copy
    /// is dropped and `self` is untouched.
    pub fn duplicate(&self) -> Result<Self, MapError> {
        self.duplicate_with(self.alloc.clone())
    }

    /// Replace the contents (and shape) of `self` with a copy of `src`.
    ///
    /// An empty `src` clears `self` in place, keeping its shape. On failure
    /// `self` is untouched.
    pub fn copy_from(&mut self, src: &Self) -> Result<(), MapError> {
        if src.is_empty() {
            self.clear();
            return Ok(());
        }
        *self = src.duplicate_with(self.alloc.clone())?;
        Ok(())
    }

    /// Visit the entries whose keys fall inside `range`.
    ///
    /// Buckets are walked in index order and each bucket in key order, so
    /// the output is sorted only within a bucket. The range filters entries
    /// but cannot skip buckets: a bounded walk costs as much as a full one.
    ///
    /// The visitor may return `Break` to stop early. Returns the number of
    /// in-range entries passed to the visitor, the stopping one included.
    pub fn iterate<Q, R, F>(&self, range: R, mut visitor: F) -> usize
    where
        P::Key: Borrow<Q>,
        Q: ?Sized + Ord,
        R: RangeBounds<Q>,
        F: FnMut(&P::Key, &P::Value) -> ControlFlow<()>,
    {
        let mut visited = 0;
        for b in self.buckets.iter().flatten() {
            match b.iterate(&range, &mut visitor) {
                ControlFlow::Continue(n) => visited += n,
                ControlFlow::Break(n) => return visited + n,
            }
        }
        visited
    }

    /// `iterate` over every entry.
    pub fn visit_all<F>(&self, visitor: F) -> usize
    where
        F: FnMut(&P::Key, &P::Value) -> ControlFlow<()>,
    {
        self.iterate::<P::Key, _, _>(.., visitor)
    }

    /// Allocated buckets paired with their slot index.
    #[cfg(test)]
    pub(crate) fn indexed_buckets(&self) -> impl Iterator<Item = (usize, &Bucket<P>)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (i, b)))
    }

    pub fn iter(&self) -> Iter<'_, P::Key, P::Value> {
        Iter {
            buckets: self.buckets.iter(),
            current: None,
            remaining: self.len,
        }
    }
}

impl<P, A> ShardedMap<P, A>
where
    P: TypePair,
    P::Value: Increment,
    A: BucketAlloc,
{
    /// Add `delta` to the value under `key`, inserting `delta` when absent.
    /// Overflow wraps. Returns the new value; on error the map is unchanged.
    pub fn increment(&mut self, key: P::Key, delta: P::Value) -> Result<P::Value, MapError> {
        let i = self.bucket_index(&key);
        let (value, added) = self.with_bucket(i, |b, alloc| b.increment(key, delta, alloc))?;
        if added {
            self.len += 1;
        }
        Ok(value)
    }
}

impl<P, A> fmt::Debug for ShardedMap<P, A>
where
    P: TypePair,
    A: BucketAlloc,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedMap")
            .field("type", &P::TAG)
            .field("len", &self.len)
            .field("index_bits", &self.index_bits)
            .field("allocated_buckets", &self.allocated_buckets())
            .finish()
    }
}

/// Iterator over entries in bucket order, then key order within a bucket.
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Option<SortedBucket<K, V>>>,
    current: Option<core::slice::Iter<'a, (K, V)>>,
    remaining: usize,
}

impl<'a, K: Ord, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.current.as_mut().and_then(|it| it.next()) {
                self.remaining -= 1;
                return Some((k, v));
            }
            match self.buckets.next()? {
                Some(b) => self.current = Some(b.iter()),
                None => continue,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K: Ord, V> ExactSizeIterator for Iter<'a, K, V> {}

impl<'a, P, A> IntoIterator for &'a ShardedMap<P, A>
where
    P: TypePair,
    A: BucketAlloc,
{
    type Item = (&'a P::Key, &'a P::Value);
    type IntoIter = Iter<'a, P::Key, P::Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::AllocBudget;
    use crate::pair::{ExtRef, I32I32, I64I64, I64Ref, StrI64, StrStr, U32U32};
    use std::collections::BTreeMap;

    fn contents<P: TypePair, A: BucketAlloc>(m: &ShardedMap<P, A>) -> BTreeMap<P::Key, P::Value>
    where
        P::Key: Clone,
        P::Value: Clone,
    {
        m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Invariant: a fresh map has the default shape for its pair and no buckets.
    #[test]
    fn allocate_shapes_by_type() {
        let m: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        assert_eq!(m.type_tag(), MapType::I64I64);
        assert_eq!(m.bucket_count(), 1 << MapType::I64I64.default_index_bits());
        assert_eq!(m.allocated_buckets(), 0);
        assert!(m.is_empty());

        let s: ShardedMap<StrStr> = ShardedMap::new().unwrap();
        assert_eq!(s.index_bits(), MapType::StrStr.default_index_bits());
        assert!(s.bucket_count().is_power_of_two());
    }

    #[test]
    fn zero_index_bits_are_clamped() {
        let cfg = MapConfig::for_type(MapType::I32I32).with_index_bits(0);
        let m: ShardedMap<I32I32> = ShardedMap::with_config(cfg, DefaultAlloc).unwrap();
        assert_eq!(m.index_bits(), 1);
        assert_eq!(m.bucket_count(), 2);
    }

    /// Invariant: inserting a new key adds one; overwriting adds nothing.
    #[test]
    fn insert_at_count_and_overwrite() {
        let mut m: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        assert_eq!(m.insert(5, 100).unwrap(), None);
        assert_eq!(m.insert(7, 200).unwrap(), None);
        assert_eq!(m.at(&5), Some(&100));
        assert_eq!(m.at(&7), Some(&200));
        assert!(m.count(&5));
        assert!(!m.count(&6));
        assert_eq!(m.len(), 2);

        assert_eq!(m.insert(5, 101).unwrap(), Some(100));
        assert_eq!(m.len(), 2);
        assert_eq!(m.at(&5), Some(&101));
    }

    #[test]
    fn buckets_are_created_lazily() {
        let mut m: ShardedMap<U32U32> = ShardedMap::new().unwrap();
        m.insert(1, 1).unwrap();
        m.insert(1 << 14, 2).unwrap(); // folds onto bucket 1 as well
        assert_eq!(m.allocated_buckets(), 1);
        m.insert(2, 3).unwrap();
        assert_eq!(m.allocated_buckets(), 2);
        assert_eq!(m.len(), 3);
    }

    /// Invariant: delete decrements only when the key was present; the
    /// bucket survives becoming empty.
    #[test]
    fn delete_and_remove() {
        let mut m: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        m.insert(5, 100).unwrap();
        m.insert(7, 200).unwrap();
        assert!(m.delete(&5));
        assert_eq!(m.at(&5), None);
        assert_eq!(m.len(), 1);
        assert!(!m.delete(&5));
        assert!(!m.delete(&12345));
        assert_eq!(m.len(), 1);
        assert_eq!(m.remove(&7), Some(200));
        assert!(m.is_empty());
        assert_eq!(m.allocated_buckets(), 2);
    }

    #[test]
    fn byte_string_keys_borrow_as_slices() {
        let mut m: ShardedMap<StrStr> = ShardedMap::new().unwrap();
        m.insert(b"alpha".to_vec(), b"1".to_vec()).unwrap();
        m.insert(b"beta".to_vec(), b"2".to_vec()).unwrap();
        assert!(m.count(b"alpha".as_slice()));
        assert!(!m.count(b"gamma".as_slice()));
        assert_eq!(m.at(b"beta".as_slice()).map(Vec::as_slice), Some(b"2".as_slice()));
        assert_eq!(m.at(&b"alpha".to_vec()), Some(&b"1".to_vec()));
    }

    #[test]
    fn at_mut_updates_in_place() {
        let mut m: ShardedMap<StrI64> = ShardedMap::new().unwrap();
        m.insert(b"k".to_vec(), 1).unwrap();
        *m.at_mut(b"k".as_slice()).unwrap() += 41;
        assert_eq!(m.at(b"k".as_slice()), Some(&42));
        assert!(m.at_mut(b"missing".as_slice()).is_none());
    }

    #[test]
    fn increment_inserts_then_accumulates() {
        let mut m: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        assert_eq!(m.increment(10, 3).unwrap(), 3);
        assert_eq!(m.len(), 1);
        assert_eq!(m.increment(10, 4).unwrap(), 7);
        assert_eq!(m.at(&10), Some(&7));
        assert_eq!(m.len(), 1);
    }

    /// Invariant: increments wrap at the value type's boundaries.
    #[test]
    fn increment_wraps() {
        let mut a: ShardedMap<I32I32> = ShardedMap::new().unwrap();
        a.insert(1, i32::MAX).unwrap();
        assert_eq!(a.increment(1, 1).unwrap(), i32::MIN);

        let mut b: ShardedMap<U32U32> = ShardedMap::new().unwrap();
        b.increment(1, u32::MAX).unwrap();
        assert_eq!(b.increment(1, 2).unwrap(), 1);

        let mut c: ShardedMap<StrI64> = ShardedMap::new().unwrap();
        c.increment(b"n".to_vec(), i64::MIN).unwrap();
        assert_eq!(c.increment(b"n".to_vec(), -1).unwrap(), i64::MAX);
    }

    /// Invariant: clear empties in place; type, shape and buckets remain.
    #[test]
    fn clear_keeps_type_shape_and_buckets() {
        let mut m: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        for k in 0..100 {
            m.insert(k, k).unwrap();
        }
        let buckets = m.allocated_buckets();
        m.clear();
        assert_eq!(m.len(), 0);
        assert_eq!(m.type_tag(), MapType::I64I64);
        assert_eq!(m.allocated_buckets(), buckets);
        for k in 0..100 {
            assert!(!m.count(&k));
        }
        m.insert(3, 3).unwrap();
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn shrink_keeps_contents() {
        let mut m: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        for k in 0..50 {
            m.insert(k, -k).unwrap();
        }
        let before = contents(&m);
        m.shrink();
        assert_eq!(contents(&m), before);
        assert_eq!(m.len(), 50);
    }

    /// Invariant: duplicate shares nothing with its source.
    #[test]
    fn duplicate_is_independent() {
        let mut m: ShardedMap<StrStr> = ShardedMap::new().unwrap();
        for i in 0..200 {
            m.insert(format!("k{i}").into_bytes(), format!("v{i}").into_bytes()).unwrap();
        }
        let mut d = m.duplicate().unwrap();
        assert_eq!(d.len(), m.len());
        assert_eq!(contents(&d), contents(&m));

        assert!(d.delete(b"k7".as_slice()));
        d.insert(b"new".to_vec(), b"x".to_vec()).unwrap();
        assert!(m.count(b"k7".as_slice()));
        assert!(!m.count(b"new".as_slice()));
        m.clear();
        assert_eq!(d.len(), 200);
    }

    /// Invariant: a duplicate that runs out of memory part-way reports the
    /// failure and leaves the source intact.
    #[test]
    fn duplicate_failure_leaves_source() {
        let budget = AllocBudget::new(usize::MAX);
        let cfg = MapConfig::for_type(MapType::StrStr).with_index_bits(4);
        let mut m: ShardedMap<StrStr, AllocBudget> = ShardedMap::with_config(cfg, budget.clone()).unwrap();
        for i in 0..64 {
            m.insert(format!("k{i}").into_bytes(), vec![0u8; 64]).unwrap();
        }
        budget.set_remaining(2048);
        assert!(m.duplicate().is_err());
        assert_eq!(m.len(), 64);
        assert!(m.count(b"k5".as_slice()));
    }

    #[test]
    fn copy_from_replaces_shape_and_contents() {
        let mut src: ShardedMap<I64I64> =
            ShardedMap::with_config(MapConfig::for_type(MapType::I64I64).with_index_bits(6), DefaultAlloc).unwrap();
        src.insert(1, 10).unwrap();
        src.insert(2, 20).unwrap();

        let mut dst: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        dst.insert(99, 0).unwrap();
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.index_bits(), 6);
        assert_eq!(contents(&dst), contents(&src));

        // An empty source clears in place and keeps the destination shape.
        let empty: ShardedMap<I64I64> = ShardedMap::new().unwrap();
        dst.copy_from(&empty).unwrap();
        assert!(dst.is_empty());
        assert_eq!(dst.index_bits(), 6);
    }

    /// Invariant: range bounds filter entries inside every bucket, visit
    /// order is sorted within a bucket, and the count includes the entry
    /// that stopped the walk.
    #[test]
    fn iterate_filters_counts_and_stops() {
        let cfg = MapConfig::for_type(MapType::I64I64).with_index_bits(2);
        let mut m: ShardedMap<I64I64> = ShardedMap::with_config(cfg, DefaultAlloc).unwrap();
        for k in 0..40 {
            m.insert(k, k * 2).unwrap();
        }

        let mut seen = Vec::new();
        let n = m.iterate(10..20, |k, v| {
            assert_eq!(*v, k * 2);
            seen.push(*k);
            ControlFlow::Continue(())
        });
        assert_eq!(n, 10);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(sorted, (10..20).collect::<Vec<_>>());

        let mut calls = 0;
        let n = m.visit_all(|_, _| {
            calls += 1;
            if calls == 5 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(n, 5);
        assert_eq!(calls, 5);

        assert_eq!(m.visit_all(|_, _| ControlFlow::Continue(())), 40);
    }

    #[test]
    fn iteration_is_sorted_within_each_bucket() {
        let cfg = MapConfig::for_type(MapType::I64I64).with_index_bits(3);
        let mut m: ShardedMap<I64I64> = ShardedMap::with_config(cfg, DefaultAlloc).unwrap();
        for k in (0..200).rev() {
            m.insert(k, 0).unwrap();
        }
        let mut last: Option<(usize, i64)> = None;
        for (k, _) in &m {
            let bucket = k.shard_index(3);
            if let Some((lb, lk)) = last {
                assert!(lb < bucket || (lb == bucket && lk < *k));
            }
            last = Some((bucket, *k));
        }
        assert_eq!(m.iter().len(), 200);
    }

    /// Invariant: lookups stay correct when every key shares one of two
    /// buckets.
    #[test]
    fn heavy_collisions_resolve_by_key() {
        let cfg = MapConfig::for_type(MapType::StrI64).with_index_bits(1);
        let mut m: ShardedMap<StrI64> = ShardedMap::with_config(cfg, DefaultAlloc).unwrap();
        for i in 0..500i64 {
            m.insert(format!("key{i}").into_bytes(), i).unwrap();
        }
        assert!(m.allocated_buckets() <= 2);
        for i in 0..500i64 {
            assert_eq!(m.at(format!("key{i}").as_bytes()), Some(&i));
        }
        assert_eq!(m.len(), 500);
    }

    #[test]
    fn ext_refs_are_stored_verbatim() {
        let raws = [0u64, 0x2_0000_0005, 0xdead_beef_0000_0001, u64::MAX];
        let mut m: ShardedMap<I64Ref> = ShardedMap::new().unwrap();
        for (k, raw) in raws.iter().enumerate() {
            m.insert(-(k as i64), ExtRef::from_raw(*raw)).unwrap();
        }
        let d = m.duplicate().unwrap();
        for (k, raw) in raws.iter().enumerate() {
            let k = -(k as i64);
            assert_eq!(m.at(&k).map(|r| r.as_raw()), Some(*raw));
            assert_eq!(d.at(&k).map(|r| r.as_raw()), Some(*raw));
        }
    }

    /// Invariant: a refused bucket creation leaves no bucket, no entry and
    /// no counter change behind.
    #[test]
    fn failed_bucket_creation_leaves_map_unchanged() {
        let budget = AllocBudget::new(usize::MAX);
        let mut m: ShardedMap<I64I64, AllocBudget> = ShardedMap::with_alloc(budget.clone()).unwrap();
        m.insert(1, 1).unwrap();
        budget.set_remaining(0);

        assert!(matches!(
            m.insert(2, 2),
            Err(MapError::AllocRefused { site: AllocSite::Bucket, .. })
        ));
        assert!(m.increment(3, 3).is_err());
        assert_eq!(m.len(), 1);
        assert_eq!(m.at(&2), None);
        assert_eq!(m.allocated_buckets(), 1);

        // Existing keys can still be overwritten without memory.
        assert_eq!(m.insert(1, 5).unwrap(), Some(1));
    }

    #[test]
    fn failed_bucket_growth_leaves_map_unchanged() {
        let budget = AllocBudget::new(usize::MAX);
        let cfg = MapConfig::for_type(MapType::I64I64).with_index_bits(1);
        let mut m: ShardedMap<I64I64, AllocBudget> = ShardedMap::with_config(cfg, budget.clone()).unwrap();
        // With one index bit the bucket is the key's bit parity. Bucket 0
        // starts with capacity 8; fill it with even-parity keys.
        for k in [0i64, 3, 5, 6, 9, 10, 12, 15] {
            m.insert(k, k).unwrap();
        }
        budget.set_remaining(0);
        assert!(matches!(
            m.insert(17, 1),
            Err(MapError::AllocRefused { site: AllocSite::Entry, .. })
        ));
        assert_eq!(m.len(), 8);
        assert!(!m.count(&17));
        assert_eq!(m.allocated_buckets(), 1);
    }

    #[test]
    fn failed_table_allocation() {
        let r: Result<ShardedMap<I32I32, AllocBudget>, _> = ShardedMap::with_alloc(AllocBudget::new(16));
        assert!(matches!(r, Err(MapError::AllocRefused { site: AllocSite::Table, .. })));
    }
}
