//! Operations on nullable map handles with explicit ownership transfer.
//!
//! A handle is `Option<ShardedMap<P, A>>`: `None` is the unset state that
//! every query treats as the empty map. Calls that may create or replace
//! the map take the handle by value and return the map to keep using; on
//! failure the handle comes back in `Failed` exactly as it was passed in.
//! Calls that only edit contents in place borrow the handle.

use crate::alloc::BucketAlloc;
use crate::error::{Failed, MapError};
use crate::hash_index::ShardKey;
use crate::pair::{Increment, TypePair};
use crate::sharded_map::ShardedMap;
use core::borrow::Borrow;

pub type Handle<P, A> = Option<ShardedMap<P, A>>;

/// Allocate a map with the pair's default shape.
pub fn allocate<P, A>() -> Result<ShardedMap<P, A>, MapError>
where
    P: TypePair,
    A: BucketAlloc + Default,
{
    ShardedMap::with_alloc(A::default())
}

pub fn size<P: TypePair, A: BucketAlloc>(h: Option<&ShardedMap<P, A>>) -> usize {
    h.map(|m| m.len()).unwrap_or(0)
}

pub fn empty<P: TypePair, A: BucketAlloc>(h: Option<&ShardedMap<P, A>>) -> bool {
    size(h) == 0
}

pub fn at<'a, P, A, Q>(h: Option<&'a ShardedMap<P, A>>, q: &Q) -> Option<&'a P::Value>
where
    P: TypePair,
    A: BucketAlloc,
    P::Key: Borrow<Q>,
    Q: ?Sized + ShardKey + Ord,
{
    h?.at(q)
}

pub fn count<P, A, Q>(h: Option<&ShardedMap<P, A>>, q: &Q) -> bool
where
    P: TypePair,
    A: BucketAlloc,
    P::Key: Borrow<Q>,
    Q: ?Sized + ShardKey + Ord,
{
    h.map(|m| m.count(q)).unwrap_or(false)
}

// Run `op` on the handle's map, allocating one for an unset handle. A map
// allocated here is dropped again if `op` fails.
fn with_map<P, A, F>(h: Handle<P, A>, op: F) -> Result<ShardedMap<P, A>, Failed<Handle<P, A>>>
where
    P: TypePair,
    A: BucketAlloc + Default,
    F: FnOnce(&mut ShardedMap<P, A>) -> Result<(), MapError>,
{
    let was_set = h.is_some();
    let mut map = match h {
        Some(m) => m,
        None => allocate().map_err(|e| Failed::new(None, e))?,
    };
    match op(&mut map) {
        Ok(()) => Ok(map),
        Err(e) => Err(Failed::new(if was_set { Some(map) } else { None }, e)),
    }
}

/// Insert or overwrite, allocating the map for an unset handle.
pub fn insert<P, A>(h: Handle<P, A>, key: P::Key, value: P::Value) -> Result<ShardedMap<P, A>, Failed<Handle<P, A>>>
where
    P: TypePair,
    A: BucketAlloc + Default,
{
    with_map(h, |m| m.insert(key, value).map(|_| ()))
}

/// Increment, allocating the map for an unset handle.
pub fn increment<P, A>(h: Handle<P, A>, key: P::Key, delta: P::Value) -> Result<ShardedMap<P, A>, Failed<Handle<P, A>>>
where
    P: TypePair,
    P::Value: Increment,
    A: BucketAlloc + Default,
{
    with_map(h, |m| m.increment(key, delta).map(|_| ()))
}

/// Delete `q`; an unset handle has nothing to delete.
pub fn delete<P, A, Q>(h: &mut Handle<P, A>, q: &Q) -> bool
where
    P: TypePair,
    A: BucketAlloc,
    P::Key: Borrow<Q>,
    Q: ?Sized + ShardKey + Ord,
{
    h.as_mut().map(|m| m.delete(q)).unwrap_or(false)
}

pub fn clear<P: TypePair, A: BucketAlloc>(h: &mut Handle<P, A>) {
    if let Some(m) = h {
        m.clear();
    }
}

pub fn shrink<P: TypePair, A: BucketAlloc>(h: &mut Handle<P, A>) {
    if let Some(m) = h {
        m.shrink();
    }
}

/// Duplicate; an unset handle duplicates to an unset handle.
pub fn duplicate<P: TypePair, A: BucketAlloc>(h: Option<&ShardedMap<P, A>>) -> Result<Handle<P, A>, MapError> {
    h.map(|m| m.duplicate()).transpose()
}

/// Overwrite `dst` with a copy of `src`.
///
/// An unset or empty `src` clears `dst` in place; an unset `dst` becomes a
/// duplicate of `src`; otherwise `dst` takes `src`'s shape and entries.
pub fn copy_over<P, A>(dst: Handle<P, A>, src: Option<&ShardedMap<P, A>>) -> Result<Handle<P, A>, Failed<Handle<P, A>>>
where
    P: TypePair,
    A: BucketAlloc,
{
    match (dst, src) {
        (None, Some(s)) if !s.is_empty() => s.duplicate().map(Some).map_err(|e| Failed::new(None, e)),
        (None, _) => Ok(None),
        (Some(mut d), Some(s)) => match d.copy_from(s) {
            Ok(()) => Ok(Some(d)),
            Err(e) => Err(Failed::new(Some(d), e)),
        },
        (Some(mut d), None) => {
            d.clear();
            Ok(Some(d))
        }
    }
}

/// Free the map and unset the handle. Releasing an unset handle is a no-op.
pub fn release<P: TypePair, A: BucketAlloc>(h: &mut Handle<P, A>) {
    if let Some(m) = h.take() {
        log::debug!("released {:?} map with {} entries", m.type_tag(), m.len());
    }
}

/// Release several handles in one call.
pub fn release_all<'a, P, A, I>(handles: I)
where
    P: TypePair,
    A: BucketAlloc + 'a,
    I: IntoIterator<Item = &'a mut Handle<P, A>>,
{
    for h in handles {
        release(h);
    }
}
