//! AnyMap: a map whose type pair is known only at run time.
//!
//! `ShardedMap` fixes its pair at compile time. Copy-over may replace a
//! live map with a copy of a differently typed one, so the handle being
//! overwritten has to be able to hold any of the eight instantiations.

use crate::alloc::{BucketAlloc, DefaultAlloc};
use crate::error::{Failed, MapError};
use crate::pair::{I32I32, I64I64, I64Ref, I64Str, MapType, StrI64, StrRef, StrStr, TypePair, U32U32};
use crate::sharded_map::{MapConfig, ShardedMap};

#[derive(Debug)]
pub enum AnyMap<A: BucketAlloc = DefaultAlloc> {
    I32I32(ShardedMap<I32I32, A>),
    U32U32(ShardedMap<U32U32, A>),
    I64I64(ShardedMap<I64I64, A>),
    I64Str(ShardedMap<I64Str, A>),
    I64Ref(ShardedMap<I64Ref, A>),
    StrI64(ShardedMap<StrI64, A>),
    StrStr(ShardedMap<StrStr, A>),
    StrRef(ShardedMap<StrRef, A>),
}

macro_rules! dispatch {
    ($any:expr, $m:ident => $body:expr) => {
        match $any {
            AnyMap::I32I32($m) => $body,
            AnyMap::U32U32($m) => $body,
            AnyMap::I64I64($m) => $body,
            AnyMap::I64Str($m) => $body,
            AnyMap::I64Ref($m) => $body,
            AnyMap::StrI64($m) => $body,
            AnyMap::StrStr($m) => $body,
            AnyMap::StrRef($m) => $body,
        }
    };
}

/// Type pairs that have an `AnyMap` variant.
pub trait Tagged: TypePair + Sized {
    fn wrap<A: BucketAlloc>(map: ShardedMap<Self, A>) -> AnyMap<A>;
    fn peek<A: BucketAlloc>(any: &AnyMap<A>) -> Option<&ShardedMap<Self, A>>;
    fn peek_mut<A: BucketAlloc>(any: &mut AnyMap<A>) -> Option<&mut ShardedMap<Self, A>>;
    fn unwrap_any<A: BucketAlloc>(any: AnyMap<A>) -> Result<ShardedMap<Self, A>, AnyMap<A>>;
}

macro_rules! tagged {
    ($($name:ident),*) => {$(
        impl Tagged for $name {
            fn wrap<A: BucketAlloc>(map: ShardedMap<Self, A>) -> AnyMap<A> {
                AnyMap::$name(map)
            }
            fn peek<A: BucketAlloc>(any: &AnyMap<A>) -> Option<&ShardedMap<Self, A>> {
                match any {
                    AnyMap::$name(m) => Some(m),
                    _ => None,
                }
            }
            fn peek_mut<A: BucketAlloc>(any: &mut AnyMap<A>) -> Option<&mut ShardedMap<Self, A>> {
                match any {
                    AnyMap::$name(m) => Some(m),
                    _ => None,
                }
            }
            fn unwrap_any<A: BucketAlloc>(any: AnyMap<A>) -> Result<ShardedMap<Self, A>, AnyMap<A>> {
                match any {
                    AnyMap::$name(m) => Ok(m),
                    other => Err(other),
                }
            }
        }
    )*};
}

tagged!(I32I32, U32U32, I64I64, I64Str, I64Ref, StrI64, StrStr, StrRef);

impl<P: Tagged, A: BucketAlloc> From<ShardedMap<P, A>> for AnyMap<A> {
    fn from(map: ShardedMap<P, A>) -> Self {
        P::wrap(map)
    }
}

impl<A: BucketAlloc> AnyMap<A> {
    /// Allocate an empty map of the given pair with its default shape.
    pub fn allocate(tag: MapType, alloc: A) -> Result<Self, MapError> {
        Self::with_config(tag, MapConfig::for_type(tag), alloc)
    }

    pub fn with_config(tag: MapType, config: MapConfig, alloc: A) -> Result<Self, MapError> {
        Ok(match tag {
            MapType::I32I32 => AnyMap::I32I32(ShardedMap::with_config(config, alloc)?),
            MapType::U32U32 => AnyMap::U32U32(ShardedMap::with_config(config, alloc)?),
            MapType::I64I64 => AnyMap::I64I64(ShardedMap::with_config(config, alloc)?),
            MapType::I64Str => AnyMap::I64Str(ShardedMap::with_config(config, alloc)?),
            MapType::I64Ref => AnyMap::I64Ref(ShardedMap::with_config(config, alloc)?),
            MapType::StrI64 => AnyMap::StrI64(ShardedMap::with_config(config, alloc)?),
            MapType::StrStr => AnyMap::StrStr(ShardedMap::with_config(config, alloc)?),
            MapType::StrRef => AnyMap::StrRef(ShardedMap::with_config(config, alloc)?),
        })
    }

    pub fn type_tag(&self) -> MapType {
        dispatch!(self, m => m.type_tag())
    }

    pub fn config(&self) -> MapConfig {
        dispatch!(self, m => m.config())
    }

    pub fn alloc(&self) -> &A {
        dispatch!(self, m => m.alloc())
    }

    pub fn len(&self) -> usize {
        dispatch!(self, m => m.len())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, m => m.is_empty())
    }

    pub fn clear(&mut self) {
        dispatch!(self, m => m.clear())
    }

    pub fn shrink(&mut self) {
        dispatch!(self, m => m.shrink())
    }

    pub fn duplicate(&self) -> Result<Self, MapError> {
        self.duplicate_with(self.alloc().clone())
    }

    fn duplicate_with(&self, alloc: A) -> Result<Self, MapError> {
        Ok(dispatch!(self, m => m.duplicate_with(alloc)?.into()))
    }

    /// Borrow the typed map when the pair matches.
    pub fn get<P: Tagged>(&self) -> Option<&ShardedMap<P, A>> {
        P::peek(self)
    }

    pub fn get_mut<P: Tagged>(&mut self) -> Option<&mut ShardedMap<P, A>> {
        P::peek_mut(self)
    }

    /// Take the typed map out, or get `self` back when the pair differs.
    pub fn into_typed<P: Tagged>(self) -> Result<ShardedMap<P, A>, Self> {
        P::unwrap_any(self)
    }

    /// Overwrite `dst` with a copy of `src`.
    ///
    /// - `src` unset or empty: `dst` is cleared in place and keeps its pair
    ///   and shape (an unset `dst` stays unset).
    /// - `dst` unset: it becomes a duplicate of `src`.
    /// - otherwise `dst` is rebuilt with `src`'s pair, shape and entries,
    ///   keeping its own allocation policy. This is the only operation that
    ///   changes a live map's pair.
    ///
    /// On failure the original `dst` is handed back untouched.
    pub fn copy_over(dst: Option<Self>, src: Option<&Self>) -> Result<Option<Self>, Failed<Option<Self>>> {
        let src = match src {
            Some(s) if !s.is_empty() => s,
            _ => {
                return Ok(dst.map(|mut d| {
                    d.clear();
                    d
                }))
            }
        };
        let copied = match &dst {
            None => src.duplicate(),
            Some(d) => src.duplicate_with(d.alloc().clone()),
        };
        match copied {
            Ok(map) => {
                log::debug!(
                    "copy-over replaced {:?} with {:?} map of {} entries",
                    dst.as_ref().map(|d| d.type_tag()),
                    map.type_tag(),
                    map.len()
                );
                Ok(Some(map))
            }
            Err(e) => Err(Failed::new(dst, e)),
        }
    }
}
