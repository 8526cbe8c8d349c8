//! HashIndexer: bit-folding reduction from a key to a bucket index.
//!
//! Every key is reduced by summing consecutive `bits`-wide windows of its
//! bit pattern and masking the sum to `bits` bits. Byte strings are first
//! folded into a single 64-bit accumulator, 8 bytes at a time, by rotating
//! the accumulator and XOR-ing in the next little-endian chunk. The result
//! depends only on the key and the width, never on map contents.
//!
//! This is not a plain XOR accumulation of chunks. Plain XOR is
//! order-insensitive: `"AAAAAAAABBBBBBBB"` and `"BBBBBBBBAAAAAAAA"` would
//! always share a bucket. The rotation before each XOR makes the index
//! depend on chunk order.

/// Narrowest accepted index width; a width of 0 is clamped up to this.
pub const MIN_INDEX_BITS: u32 = 1;
/// Widest accepted index width.
pub const MAX_INDEX_BITS: u32 = 24;

// Rotation applied to the accumulator before each chunk is XOR-ed in.
const CHUNK_ROTATION: u32 = 5;

/// Clamp a requested index width into `[MIN_INDEX_BITS, MAX_INDEX_BITS]`.
#[inline]
pub fn clamp_bits(bits: u32) -> u32 {
    bits.clamp(MIN_INDEX_BITS, MAX_INDEX_BITS)
}

#[inline]
fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Sum the `bits`-wide windows of the low `width` bits of `x`, wrapping.
#[inline]
fn fold(x: u64, width: u32, bits: u32) -> u64 {
    let mut out = 0u64;
    let mut shift = 0;
    while shift < width {
        out = out.wrapping_add(x >> shift);
        shift += bits;
    }
    out
}

/// Bucket index for a 32-bit key.
#[inline]
pub fn index_u32(key: u32, bits: u32) -> usize {
    let bits = clamp_bits(bits);
    (fold(key as u64, 32, bits) & mask(bits)) as usize
}

/// Bucket index for a 64-bit key.
#[inline]
pub fn index_u64(key: u64, bits: u32) -> usize {
    let bits = clamp_bits(bits);
    (fold(key, 64, bits) & mask(bits)) as usize
}

/// Bucket index for a byte string. The empty string maps to 0.
pub fn index_bytes(key: &[u8], bits: u32) -> usize {
    let mut chunks = key.chunks_exact(8);
    let mut acc = 0u64;
    for chunk in chunks.by_ref() {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        acc = acc.rotate_left(CHUNK_ROTATION) ^ u64::from_le_bytes(word);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut word = [0u8; 8];
        word[..tail.len()].copy_from_slice(tail);
        acc = acc.rotate_left(CHUNK_ROTATION) ^ u64::from_le_bytes(word);
    }
    index_u64(acc, bits)
}

/// Keys (and borrowed key forms) that can be placed in a bucket.
///
/// Owned keys and the forms they `Borrow` as must agree on the index, so
/// `Vec<u8>` and `[u8]` share one implementation.
pub trait ShardKey {
    fn shard_index(&self, bits: u32) -> usize;
}

impl ShardKey for i32 {
    #[inline]
    fn shard_index(&self, bits: u32) -> usize {
        index_u32(*self as u32, bits)
    }
}

impl ShardKey for u32 {
    #[inline]
    fn shard_index(&self, bits: u32) -> usize {
        index_u32(*self, bits)
    }
}

impl ShardKey for i64 {
    #[inline]
    fn shard_index(&self, bits: u32) -> usize {
        index_u64(*self as u64, bits)
    }
}

impl ShardKey for [u8] {
    #[inline]
    fn shard_index(&self, bits: u32) -> usize {
        index_bytes(self, bits)
    }
}

impl ShardKey for Vec<u8> {
    #[inline]
    fn shard_index(&self, bits: u32) -> usize {
        index_bytes(self, bits)
    }
}
