//! Type-pair descriptors: the eight supported key/value combinations.
//!
//! `ShardedMap` is written once, generically over `P: TypePair`, and
//! instantiated per descriptor at compile time. The runtime tag `MapType`
//! is only needed where a map's pair can change, see `AnyMap`.

use crate::alloc::{gate, AllocSite, BucketAlloc};
use crate::error::MapError;
use crate::hash_index::ShardKey;
use core::fmt;
use slotmap::KeyData;

/// Default index width for integer-keyed maps.
pub const INT_INDEX_BITS: u32 = 14;
/// Default index width for byte-string-keyed maps.
pub const STR_INDEX_BITS: u32 = 12;

/// Runtime identifier of a type pair.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MapType {
    I32I32,
    U32U32,
    I64I64,
    I64Str,
    I64Ref,
    StrI64,
    StrStr,
    StrRef,
}

impl MapType {
    pub const ALL: [MapType; 8] = [
        MapType::I32I32,
        MapType::U32U32,
        MapType::I64I64,
        MapType::I64Str,
        MapType::I64Ref,
        MapType::StrI64,
        MapType::StrStr,
        MapType::StrRef,
    ];

    pub const fn is_string_keyed(self) -> bool {
        matches!(self, MapType::StrI64 | MapType::StrStr | MapType::StrRef)
    }

    /// Whether the pair supports `increment`.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            MapType::I32I32 | MapType::U32U32 | MapType::I64I64 | MapType::StrI64
        )
    }

    pub const fn default_index_bits(self) -> u32 {
        if self.is_string_keyed() {
            STR_INDEX_BITS
        } else {
            INT_INDEX_BITS
        }
    }
}

/// Opaque reference to data the map does not own.
///
/// Stored and returned verbatim; the map never resolves it. Any raw 64-bit
/// identifier round-trips through `from_raw`/`as_raw` unchanged. Slotmap
/// keys convert through their FFI form so callers can point into their
/// own arenas.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExtRef(u64);

impl ExtRef {
    pub fn from_key<K: slotmap::Key>(key: K) -> Self {
        ExtRef(key.data().as_ffi())
    }

    /// Reinterpret as a slotmap key. Only meaningful for values built by
    /// `from_key`: a raw value with an even version half is normalized.
    pub fn to_key<K: slotmap::Key>(self) -> K {
        K::from(KeyData::from_ffi(self.0))
    }

    pub const fn from_raw(bits: u64) -> Self {
        ExtRef(bits)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Copy that reports allocation failure instead of aborting.
pub trait TryDuplicate: Sized {
    fn try_duplicate<A: BucketAlloc>(&self, alloc: &A) -> Result<Self, MapError>;
}

macro_rules! copy_duplicate {
    ($($t:ty),*) => {$(
        impl TryDuplicate for $t {
            #[inline]
            fn try_duplicate<A: BucketAlloc>(&self, _alloc: &A) -> Result<Self, MapError> {
                Ok(*self)
            }
        }
    )*};
}

copy_duplicate!(i32, u32, i64, ExtRef);

impl TryDuplicate for Vec<u8> {
    fn try_duplicate<A: BucketAlloc>(&self, alloc: &A) -> Result<Self, MapError> {
        gate(alloc, AllocSite::Entry, self.len())?;
        let mut out = Vec::new();
        out.try_reserve_exact(self.len())?;
        out.extend_from_slice(self);
        Ok(out)
    }
}

/// Values that `increment` can add to.
///
/// Overflow wraps in two's complement for every implementor: `i32::MAX + 1`
/// becomes `i32::MIN`, `u32::MAX + 1` becomes `0`.
pub trait Increment: Copy {
    fn increment_by(self, delta: Self) -> Self;
}

impl Increment for i32 {
    #[inline]
    fn increment_by(self, delta: Self) -> Self {
        self.wrapping_add(delta)
    }
}

impl Increment for u32 {
    #[inline]
    fn increment_by(self, delta: Self) -> Self {
        self.wrapping_add(delta)
    }
}

impl Increment for i64 {
    #[inline]
    fn increment_by(self, delta: Self) -> Self {
        self.wrapping_add(delta)
    }
}

/// Compile-time descriptor of a key/value pair.
pub trait TypePair: 'static {
    type Key: ShardKey + Ord + TryDuplicate + fmt::Debug;
    type Value: TryDuplicate + fmt::Debug;
    const TAG: MapType;
}

macro_rules! type_pairs {
    ($($(#[$doc:meta])* $name:ident => ($k:ty, $v:ty);)*) => {$(
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
        pub struct $name;

        impl TypePair for $name {
            type Key = $k;
            type Value = $v;
            const TAG: MapType = MapType::$name;
        }
    )*};
}

type_pairs! {
    /// `i32 -> i32`
    I32I32 => (i32, i32);
    /// `u32 -> u32`
    U32U32 => (u32, u32);
    /// `i64 -> i64`
    I64I64 => (i64, i64);
    /// `i64 -> bytes`
    I64Str => (i64, Vec<u8>);
    /// `i64 -> ExtRef`
    I64Ref => (i64, ExtRef);
    /// `bytes -> i64`
    StrI64 => (Vec<u8>, i64);
    /// `bytes -> bytes`
    StrStr => (Vec<u8>, Vec<u8>);
    /// `bytes -> ExtRef`
    StrRef => (Vec<u8>, ExtRef);
}
