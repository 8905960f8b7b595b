#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use probemap::{FullError, HashMap as ProbeHashMap, ResizeMode};
use std::collections::HashMap as StdHashMap;

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    Insert(K, V),
    Remove(K),
    Get(K),
    Contains(K),
    Len,
    IsEmpty,
    Grow(u8),
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    capacity: u8,
    double: bool,
    operations: Vec<Operation<u16, u32>>,
}

fn fuzz_hashmap(input: FuzzInput) {
    let resize_mode = if input.double {
        ResizeMode::Double
    } else {
        ResizeMode::Manual
    };

    let mut std_map = StdHashMap::new();
    let probe_raw = ProbeHashMap::builder()
        .capacity(usize::from(input.capacity).max(1))
        .resize_mode(resize_mode)
        .build();
    let probe_map = probe_raw.pin();

    for op in input.operations {
        match op {
            Operation::Insert(k, v) => match probe_map.insert(k, v) {
                Ok(()) => {
                    std_map.insert(k, v);
                }
                // Only a manual map can be full, and only when inserting a new key.
                Err(FullError { key, value }) => {
                    assert_eq!((key, value), (k, v));
                    assert_eq!(resize_mode, ResizeMode::Manual);
                    assert!(!std_map.contains_key(&k));
                }
            },
            Operation::Remove(k) => {
                let std_result = std_map.remove(&k).is_some();
                let probe_result = probe_map.remove(&k);
                assert_eq!(std_result, probe_result);
            }
            Operation::Get(k) => {
                let std_result = std_map.get(&k);
                let probe_result = probe_map.get(&k);
                assert_eq!(std_result, probe_result);
            }
            Operation::Contains(k) => {
                let std_result = std_map.contains_key(&k);
                let probe_result = probe_map.contains_key(&k);
                assert_eq!(std_result, probe_result);
            }
            Operation::Len => {
                assert_eq!(std_map.len(), probe_map.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), probe_map.is_empty());
            }
            Operation::Grow(extra) => {
                let capacity = probe_map.capacity();
                probe_map.grow(capacity + usize::from(extra));
                assert_eq!(probe_map.capacity(), capacity + usize::from(extra));
            }
        }
    }

    // Final consistency checks
    for (k, v) in std_map.iter() {
        let probe_result = probe_map.get(k);
        assert_eq!(Some(v), probe_result);
    }
    assert_eq!(std_map.len(), probe_map.len());
    assert_eq!(std_map.is_empty(), probe_map.is_empty());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_hashmap(data);
});
