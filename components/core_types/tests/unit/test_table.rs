//! Unit tests for the table engine.

use core_types::{Table, Value};
use std::sync::Arc;

#[test]
fn test_mixed_key_types() {
    let t = Table::new();
    t.raw_set(Value::Int(1), Value::from("int")).unwrap();
    t.raw_set(Value::Float(1.5), Value::from("float")).unwrap();
    t.raw_set(Value::from("s"), Value::from("str")).unwrap();
    t.raw_set(Value::Bool(false), Value::from("bool")).unwrap();
    assert_eq!(t.raw_get(&Value::Int(1)), Value::from("int"));
    assert_eq!(t.raw_get(&Value::Float(1.5)), Value::from("float"));
    assert_eq!(t.raw_get(&Value::from("s")), Value::from("str"));
    assert_eq!(t.raw_get(&Value::Bool(false)), Value::from("bool"));
    assert_eq!(t.key_count(), 4);
}

#[test]
fn test_large_sparse_keys_stay_in_hash() {
    let t = Table::new();
    t.raw_set(Value::Int(1_000_000), Value::Int(1)).unwrap();
    t.raw_set(Value::Int(2_000_000), Value::Int(2)).unwrap();
    // sparse integers must not blow up the array part
    assert!(t.array_length() <= 2);
    assert_eq!(t.raw_get(&Value::Int(1_000_000)), Value::Int(1));
}

#[test]
fn test_dense_fill_any_order_same_observable_state() {
    let orders: Vec<Vec<i32>> = vec![
        (1..=40).collect(),
        (1..=40).rev().collect(),
        // interleaved: odds then evens
        (1..=40).filter(|i| i % 2 == 1).chain((1..=40).filter(|i| i % 2 == 0)).collect(),
    ];
    let mut key_sets: Vec<Vec<i32>> = Vec::new();
    for order in orders {
        let t = Table::new();
        for i in order {
            t.raw_set(Value::Int(i), Value::Int(i * 3)).unwrap();
        }
        assert_eq!(t.raw_len(), 40);
        for i in 1..=40 {
            assert_eq!(t.raw_get(&Value::Int(i)), Value::Int(i * 3));
        }
        let mut keys: Vec<i32> = t
            .keys()
            .into_iter()
            .map(|k| match k {
                Value::Int(i) => i,
                other => panic!("unexpected key {:?}", other),
            })
            .collect();
        keys.sort_unstable();
        key_sets.push(keys);
    }
    assert_eq!(key_sets[0], key_sets[1]);
    assert_eq!(key_sets[0], key_sets[2]);
}

#[test]
fn test_shrink_back_to_hash() {
    let t = Table::new();
    for i in 1..=32 {
        t.raw_set(Value::Int(i), Value::Int(i)).unwrap();
    }
    for i in 3..=32 {
        t.raw_set(Value::Int(i), Value::Nil).unwrap();
    }
    assert_eq!(t.raw_len(), 2);
    assert_eq!(t.key_count(), 2);
    // trigger rehashes with fresh string keys
    for i in 0..32 {
        t.raw_set(Value::from(format!("k{i}").as_str()), Value::Int(i))
            .unwrap();
    }
    assert_eq!(t.key_count(), 34);
}

#[test]
fn test_next_over_empty_table() {
    let t = Table::new();
    assert_eq!(t.next(&Value::Nil).unwrap(), None);
}

#[test]
fn test_next_resumes_after_deleted_hash_key() {
    let t = Table::new();
    for k in ["a", "b", "c", "d", "e", "f"] {
        t.raw_set(Value::from(k), Value::Int(1)).unwrap();
    }
    // walk two steps, delete the second key, resume from it
    let (k1, _) = t.next(&Value::Nil).unwrap().unwrap();
    let (k2, _) = t.next(&k1).unwrap().unwrap();
    t.raw_set(k2.clone(), Value::Nil).unwrap();
    let mut rest = 0;
    let mut key = k2;
    while let Some((k, _)) = t.next(&key).unwrap() {
        rest += 1;
        key = k;
    }
    assert_eq!(rest, 4);
}

#[test]
fn test_metatable_roundtrip() {
    let t = Arc::new(Table::new());
    assert!(t.metatable().is_none());
    let mt = Value::table(Table::new());
    t.set_metatable(Some(mt.clone()));
    assert_eq!(t.metatable(), Some(mt));
    t.set_metatable(None);
    assert!(t.metatable().is_none());
}

#[test]
fn test_unpack_shapes() {
    let rt = core_types::Runtime::new();
    let t = Arc::new(Table::new());
    for i in 1..=3 {
        t.raw_set_int(i, Value::Int(i * 2));
    }
    assert_eq!(t.unpack(&rt, 1, 0).unwrap().narg(), 0);
    assert_eq!(t.unpack(&rt, 2, 2).unwrap().arg1(), Value::Int(4));
    let all = t.unpack(&rt, 1, 3).unwrap();
    assert_eq!(all.narg(), 3);
    assert_eq!(all.arg(3), Value::Int(6));
}

#[test]
fn test_sort_default_ordering() {
    let rt = core_types::Runtime::new();
    let t = Arc::new(Table::new());
    for (i, v) in [5, 3, 9, 1, 4].iter().enumerate() {
        t.raw_set_int(i as i32 + 1, Value::Int(*v));
    }
    t.sort(&rt, Value::Nil).unwrap();
    let sorted: Vec<Value> = (1..=5).map(|i| t.raw_get_int(i)).collect();
    assert_eq!(
        sorted,
        vec![
            Value::Int(1),
            Value::Int(3),
            Value::Int(4),
            Value::Int(5),
            Value::Int(9)
        ]
    );
}

#[test]
fn test_sort_with_comparator() {
    let rt = core_types::Runtime::new();
    let t = Arc::new(Table::new());
    for (i, v) in [5, 3, 9, 1, 4].iter().enumerate() {
        t.raw_set_int(i as i32 + 1, Value::Int(*v));
    }
    let desc = core_types::NativeFunction::value("desc", |rt, args| {
        let gt = core_types::ops::lt(rt, &args.arg(2), &args.arg(1))?;
        Ok(core_types::Varargs::one(Value::Bool(gt)))
    });
    t.sort(&rt, desc).unwrap();
    assert_eq!(t.raw_get_int(1), Value::Int(9));
    assert_eq!(t.raw_get_int(5), Value::Int(1));
}

#[test]
fn test_concat_values() {
    let rt = core_types::Runtime::new();
    let t = Arc::new(Table::new());
    for (i, v) in ["a", "b", "c"].iter().enumerate() {
        t.raw_set_int(i as i32 + 1, Value::from(*v));
    }
    let sep = rt.intern(b",");
    assert_eq!(
        t.concat_values(&rt, &sep, 1, 3).unwrap(),
        Value::from("a,b,c")
    );
    t.raw_set_int(2, Value::table(Table::new()));
    assert!(t.concat_values(&rt, &sep, 1, 3).is_err());
}
