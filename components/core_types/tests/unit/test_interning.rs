//! Unit tests for the string interner and byte-string helpers.

use core_types::{LuaStr, Runtime, StringPool, RECENT_STRINGS_MAX_LENGTH};

#[test]
fn test_intern_equal_by_value_for_any_bytes() {
    let pool = StringPool::new();
    for bytes in [&b"a"[..], b"", b"\x00\xff\x80", b"longer-than-a-word"] {
        assert_eq!(pool.intern(bytes), pool.intern(bytes));
    }
}

#[test]
fn test_intern_identity_until_eviction() {
    let pool = StringPool::new();
    let first = pool.intern(b"stable");
    // touching other buckets does not evict an unrelated bucket's occupant
    let second = pool.intern(b"stable");
    assert!(LuaStr::ptr_eq(&first, &second));
}

#[test]
fn test_intern_threshold_boundary() {
    let pool = StringPool::new();
    let at = vec![b'a'; RECENT_STRINGS_MAX_LENGTH];
    let over = vec![b'a'; RECENT_STRINGS_MAX_LENGTH + 1];
    assert!(LuaStr::ptr_eq(&pool.intern(&at), &pool.intern(&at)));
    assert!(!LuaStr::ptr_eq(&pool.intern(&over), &pool.intern(&over)));
}

#[test]
fn test_runtime_interning_entry_points() {
    let rt = Runtime::new();
    let a = rt.intern(b"field");
    let b = rt.adopt(b"field".to_vec());
    assert!(LuaStr::ptr_eq(&a, &b));
}

#[test]
fn test_substring_copy_vs_share() {
    let s = LuaStr::from_slice(b"0123456789");
    // long suffix shares, short prefix copies; both compare equal to fresh
    assert_eq!(s.substring(5, 10), LuaStr::from_slice(b"56789"));
    assert_eq!(s.substring(0, 2), LuaStr::from_slice(b"01"));
}

#[test]
fn test_hash_collision_disambiguated_by_bytes() {
    // the sampling hash can collide; equality must still be byte-exact
    let a = LuaStr::from_slice(b"abcdefghijklmnopqrstuvwxyz0123456789-one");
    let b = LuaStr::from_slice(b"abcdefghijklmnopqrstuvwxyz0123456789-two");
    assert_ne!(a, b);
}
