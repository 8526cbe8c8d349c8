#![cfg(test)]

// Property tests for ShardedMap kept inside the crate so they can reach
// bucket-level details such as `allocated_buckets`.

use crate::alloc::DefaultAlloc;
use crate::hash_index::ShardKey;
use crate::pair::{MapType, StrI64};
use crate::sharded_map::{MapConfig, ShardedMap};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i64),
    Increment(usize, i64),
    Delete(usize),
    At(usize),
    Count(Vec<u8>),
    Range(usize, usize),
    Duplicate,
    Clear,
    Shrink,
}

fn key_from(pool: &[Vec<u8>], i: usize) -> Vec<u8> {
    pool[i].clone()
}

fn arb_scenario() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<OpI>)> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..12), 1..=10).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let count_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i64>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            3 => (idx.clone(), any::<i64>()).prop_map(|(i, d)| OpI::Increment(i, d)),
            3 => idx.clone().prop_map(OpI::Delete),
            2 => idx.clone().prop_map(OpI::At),
            2 => prop_oneof![
                count_pool,
                proptest::collection::vec(any::<u8>(), 0..12)
            ]
            .prop_map(OpI::Count),
            1 => (idx.clone(), idx.clone()).prop_map(|(a, b)| OpI::Range(a, b)),
            1 => Just(OpI::Duplicate),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Shrink),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn snapshot(m: &ShardedMap<StrI64>) -> BTreeMap<Vec<u8>, i64> {
    m.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

fn run(bits: u32, pool: Vec<Vec<u8>>, ops: Vec<OpI>) -> Result<(), TestCaseError> {
    let cfg = MapConfig::for_type(MapType::StrI64).with_index_bits(bits);
    let mut sut: ShardedMap<StrI64> = ShardedMap::with_config(cfg, DefaultAlloc).unwrap();
    let mut model: BTreeMap<Vec<u8>, i64> = BTreeMap::new();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(&pool, i);
                let prev = sut.insert(k.clone(), v).unwrap();
                prop_assert_eq!(prev, model.insert(k, v));
            }
            OpI::Increment(i, d) => {
                let k = key_from(&pool, i);
                let got = sut.increment(k.clone(), d).unwrap();
                let slot = model.entry(k).or_insert(0);
                *slot = slot.wrapping_add(d);
                prop_assert_eq!(got, *slot);
            }
            OpI::Delete(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.delete(k.as_slice()), model.remove(&k).is_some());
            }
            OpI::At(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.at(k.as_slice()), model.get(&k));
            }
            OpI::Count(k) => {
                prop_assert_eq!(sut.count(k.as_slice()), model.contains_key(&k));
            }
            OpI::Range(a, b) => {
                let (lo, hi) = (key_from(&pool, a), key_from(&pool, b));
                let mut seen = BTreeMap::new();
                let n = sut.iterate(lo.clone()..hi.clone(), |k, v| {
                    seen.insert(k.clone(), *v);
                    ControlFlow::Continue(())
                });
                let expected: BTreeMap<Vec<u8>, i64> = if lo < hi {
                    model.range(lo..hi).map(|(k, v)| (k.clone(), *v)).collect()
                } else {
                    BTreeMap::new()
                };
                prop_assert_eq!(n, expected.len());
                prop_assert_eq!(seen, expected);
            }
            OpI::Duplicate => {
                let mut dup = sut.duplicate().unwrap();
                prop_assert_eq!(dup.len(), sut.len());
                prop_assert_eq!(snapshot(&dup), snapshot(&sut));
                // Mutating the copy never shows through to the source.
                dup.clear();
                dup.insert(b"only-in-dup".to_vec(), 1).unwrap();
                prop_assert_eq!(snapshot(&sut), model.clone());
            }
            OpI::Clear => {
                let buckets = sut.allocated_buckets();
                sut.clear();
                model.clear();
                prop_assert_eq!(sut.allocated_buckets(), buckets);
                prop_assert_eq!(sut.type_tag(), MapType::StrI64);
            }
            OpI::Shrink => sut.shrink(),
        }

        // Post-conditions after each op
        // 1) Counter parity with the model
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        // 2) The counter equals the number of entries actually stored
        prop_assert_eq!(sut.iter().count(), model.len());
        // 3) Every entry sits in the bucket its key hashes to
        for (i, bucket) in sut.indexed_buckets() {
            for (k, _) in bucket.iter() {
                prop_assert_eq!(k.shard_index(sut.index_bits()), i);
            }
        }
    }
    prop_assert_eq!(snapshot(&sut), model);
    Ok(())
}

// Property: state-machine equivalence against BTreeMap with the default
// string index width.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run(MapType::StrI64.default_index_bits(), pool, ops)?;
    }
}

// Property: the same invariants when every key shares one of two buckets,
// stressing in-bucket ordering and range filtering.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run(1, pool, ops)?;
    }
}

// Property: integer index is a pure function of the key and the width.
proptest! {
    #[test]
    fn prop_index_in_range(k in any::<i64>(), bits in 0u32..40) {
        let b = crate::hash_index::clamp_bits(bits);
        let i = k.shard_index(bits);
        prop_assert!(i < (1usize << b));
        prop_assert_eq!(i, k.shard_index(bits));
    }
}
