//! Contract compliance tests for bytecode_system.
//!
//! The binary chunk format is bit-exact: header layout, trailer
//! signature, and the not-recognized (rather than error) contract for
//! foreign inputs.

use bytecode_system::{dump, undump, Prototype};
use core_types::Runtime;

#[test]
fn test_header_is_18_bytes_before_body() {
    // signature(4) + 8 config bytes + trailer(6)
    let bytes = dump::dump(&Prototype::default(), true);
    assert_eq!(bytes[0], 0x1b);
    assert_eq!(&bytes[1..4], b"Lua");
    assert_eq!(bytes[4], 0x52);
    assert_eq!(&bytes[12..18], &[0x19, 0x93, b'\r', b'\n', 0x1a, b'\n']);
}

#[test]
fn test_unrecognized_input_is_not_an_error() {
    let rt = Runtime::new();
    // callers use None to fall back to source compilation
    assert!(undump(&rt, b"print('hi')", "chunk").unwrap().is_none());
}

#[test]
fn test_recognized_but_malformed_is_fatal() {
    let rt = Runtime::new();
    let bytes = [0x1bu8, b'L', b'u', b'a', 0x52, 0, 1, 4];
    assert!(undump(&rt, &bytes, "chunk").is_err());
}

#[test]
fn test_load_never_partially_populates() {
    let rt = Runtime::new();
    let p = Prototype {
        constants: vec![core_types::Value::Int(9)],
        code: vec![0],
        line_info: vec![1],
        ..Prototype::default()
    };
    let good = dump::dump(&p, false);
    // chop the tail off the chunk: the result is an error, never a
    // prototype with fewer fields
    let err = undump(&rt, &good[..good.len() - 4], "chunk");
    assert!(err.is_err());
}
