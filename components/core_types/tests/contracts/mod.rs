//! Contract compliance tests for core_types.
//!
//! These pin down the externally observable properties of the value
//! model, string interner and table engine, including the property-based
//! checks over numeric round-trips and table set/get sequences.

use core_types::{ops, LuaStr, Runtime, StringPool, Table, Value};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

mod numeric_contract {
    use super::*;

    #[test]
    fn test_integer_add_is_integer_tagged() {
        let rt = Runtime::new();
        let r = ops::add(&rt, &Value::Int(1), &Value::Int(1)).unwrap();
        assert!(r.is_int());
        assert_eq!(r, Value::Int(2));
    }

    #[test]
    fn test_division_is_float_tagged() {
        let rt = Runtime::new();
        let r = ops::div(&rt, &Value::Int(1), &Value::Int(2)).unwrap();
        assert!(matches!(r, Value::Float(_)));
        assert_eq!(r, Value::Float(0.5));
    }

    #[test]
    fn test_division_by_zero_is_infinity() {
        let rt = Runtime::new();
        assert_eq!(
            ops::div(&rt, &Value::Int(1), &Value::Int(0)).unwrap(),
            Value::Float(f64::INFINITY)
        );
        assert_eq!(
            ops::div(&rt, &Value::Int(-1), &Value::Int(0)).unwrap(),
            Value::Float(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn test_zero_over_zero_is_nan_and_nan_ne_nan() {
        let rt = Runtime::new();
        let nan = ops::div(&rt, &Value::Int(0), &Value::Int(0)).unwrap();
        assert!(matches!(nan, Value::Float(f) if f.is_nan()));
        assert!(!ops::eq(&rt, &nan, &nan.clone()).unwrap());
    }

    #[test]
    fn test_beyond_exact_integer_range_uses_float_semantics() {
        let rt = Runtime::new();
        let two53 = Value::Float((1u64 << 53) as f64);
        let r = ops::add(&rt, &two53, &Value::Int(1)).unwrap();
        assert_eq!(r, two53); // 2^53 + 1 rounds back to 2^53
    }
}

mod interning_contract {
    use super::*;

    #[test]
    fn test_intern_idempotence_by_value() {
        let pool = StringPool::new();
        for len in [0usize, 1, 16, 32, 33, 100] {
            let bytes = vec![b'q'; len];
            assert_eq!(pool.intern(&bytes), pool.intern(&bytes));
        }
    }

    #[test]
    fn test_intern_identity_for_short_strings() {
        let pool = StringPool::new();
        let a = pool.intern(b"short");
        let b = pool.intern(b"short");
        assert!(LuaStr::ptr_eq(&a, &b));
    }
}

mod table_contract {
    use super::*;

    #[test]
    fn test_set_get_roundtrip_and_delete() {
        let t = Table::new();
        t.raw_set(Value::from("k"), Value::Int(7)).unwrap();
        assert_eq!(t.raw_get(&Value::from("k")), Value::Int(7));
        t.raw_set(Value::from("k"), Value::Nil).unwrap();
        assert_eq!(t.raw_get(&Value::from("k")), Value::Nil);
        assert!(!t
            .keys()
            .iter()
            .any(|k| k.raw_eq(&Value::from("k"))));
    }

    #[test]
    fn test_migration_transparency() {
        let shuffled = [7, 1, 9, 14, 3, 2, 16, 5, 12, 4, 10, 6, 15, 8, 11, 13];
        let a = Table::new();
        let b = Table::new();
        for i in 1..=16 {
            a.raw_set(Value::Int(i), Value::Int(100 + i)).unwrap();
        }
        for &i in &shuffled {
            b.raw_set(Value::Int(i), Value::Int(100 + i)).unwrap();
        }
        for i in 1..=16 {
            assert_eq!(a.raw_get(&Value::Int(i)), b.raw_get(&Value::Int(i)));
        }
        assert_eq!(a.raw_len(), b.raw_len());
        assert_eq!(a.key_count(), b.key_count());
    }
}

proptest! {
    #[test]
    fn prop_int_constructor_roundtrip(i in i32::MIN as i64..=i32::MAX as i64) {
        prop_assert_eq!(Value::int(i), Value::Int(i as i32));
    }

    #[test]
    fn prop_wide_int_becomes_float(i in (i32::MAX as i64 + 1)..i64::MAX / 2) {
        prop_assert!(matches!(Value::int(i), Value::Float(_)));
    }

    #[test]
    fn prop_float_roundtrip(f in proptest::num::f64::NORMAL) {
        let v = Value::Float(f);
        prop_assert_eq!(v.as_float(), Some(f));
    }

    #[test]
    fn prop_hash_stable(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(
            core_types::LuaStr::from_slice(&bytes).hash(),
            core_types::LuaStr::from_vec(bytes.clone()).hash()
        );
    }

    #[test]
    fn prop_table_matches_model(
        ops in proptest::collection::vec((0u8..3, 1i32..20, any::<i32>()), 1..60)
    ) {
        let t = Table::new();
        let mut model: HashMap<i32, i32> = HashMap::new();
        for (op, key, val) in ops {
            match op {
                0 => {
                    t.raw_set(Value::Int(key), Value::Int(val)).unwrap();
                    model.insert(key, val);
                }
                1 => {
                    t.raw_set(Value::Int(key), Value::Nil).unwrap();
                    model.remove(&key);
                }
                _ => {
                    let expect = model.get(&key).map(|v| Value::Int(*v)).unwrap_or(Value::Nil);
                    prop_assert_eq!(t.raw_get(&Value::Int(key)), expect);
                }
            }
        }
        prop_assert_eq!(t.key_count(), model.len());
    }
}

#[test]
fn test_values_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Value>();
    assert_send_sync::<Table>();
    assert_send_sync::<Runtime>();
    let _ = Arc::new(Table::new());
}
