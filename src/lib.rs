//! sharded-hashmap: a hash map split into a fixed array of lazily
//! created, ordered buckets, over eight key/value type pairs.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) bucket selection by a cheap bit-folding hash, then
//!   binary-searched lookups inside a small ordered bucket, with every
//!   allocation fallible and every failure leaving the map unchanged.
//! - Layers:
//!   - `hash_index`: pure reduction from a key to a bucket index.
//!   - `bucket::SortedBucket`: ordered per-bucket container.
//!   - `ShardedMap<P, A>`: the bucket array, the element counter, the
//!     lifecycle operations and the per-key dispatch. Written once and
//!     instantiated per type pair `P` at compile time.
//!   - `AnyMap`: run-time tagged union of the eight instantiations, used
//!     where a map's pair can change (copy-over).
//!   - `handle`: nullable handles with explicit ownership transfer.
//!
//! Constraints
//! - Single-threaded: no internal synchronization. Queries take `&self`,
//!   mutations take `&mut self` or consume the handle.
//! - The bucket array is sized once from the index width (a power of two)
//!   and never rehashed or resized.
//! - `len()` always equals the sum of the bucket lengths. It changes only
//!   after a bucket confirms that an entry was added or removed.
//! - A bucket slot is empty until the first successful insert or increment
//!   that lands on it; `clear` empties buckets without freeing them.
//!
//! Failure semantics
//! - Every allocation asks the map's `BucketAlloc` first and then uses
//!   `try_reserve*`. A failed insert, increment, duplicate or copy-over
//!   leaves the map exactly as it was; a bucket created for a failed
//!   insert is discarded again.
//! - Missing keys are `None`/`false`, never errors.
//!
//! Overflow semantics
//! - `increment` wraps in two's complement for all numeric value types.
//!
//! Ordering
//! - Iteration walks buckets in index order and each bucket in key order.
//!   Keys are therefore only sorted within a bucket. Range bounds filter
//!   entries inside each bucket but never let a walk skip a bucket.
//!
//! Notes and non-goals
//! - No global key order, no growth of the bucket array.
//! - `ExtRef` values are opaque: stored and returned verbatim, never
//!   resolved or freed by the map.

pub mod alloc;
pub mod any_map;
pub mod bucket;
mod error;
pub mod handle;
pub mod hash_index;
pub mod pair;
mod sharded_map;
mod sharded_map_proptest;

// Public surface
pub use alloc::{AllocBudget, AllocSite, BucketAlloc, DefaultAlloc};
pub use any_map::{AnyMap, Tagged};
pub use error::{Failed, MapError};
pub use pair::{ExtRef, Increment, MapType, TypePair};
pub use sharded_map::{Iter, MapConfig, ShardedMap};

pub type I32Map<A = DefaultAlloc> = ShardedMap<pair::I32I32, A>;
pub type U32Map<A = DefaultAlloc> = ShardedMap<pair::U32U32, A>;
pub type I64Map<A = DefaultAlloc> = ShardedMap<pair::I64I64, A>;
pub type I64StrMap<A = DefaultAlloc> = ShardedMap<pair::I64Str, A>;
pub type I64RefMap<A = DefaultAlloc> = ShardedMap<pair::I64Ref, A>;
pub type StrI64Map<A = DefaultAlloc> = ShardedMap<pair::StrI64, A>;
pub type StrStrMap<A = DefaultAlloc> = ShardedMap<pair::StrStr, A>;
pub type StrRefMap<A = DefaultAlloc> = ShardedMap<pair::StrRef, A>;
