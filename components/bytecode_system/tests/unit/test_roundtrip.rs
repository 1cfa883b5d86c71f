//! Dump/undump round-trip tests.

use std::sync::Arc;

use bytecode_system::{dump, opcode, undump, LocalVar, Prototype, UpvalueDesc};
use core_types::{LuaStr, Runtime, Value};

fn sample_prototype() -> Prototype {
    let inner = Prototype {
        source: LuaStr::from_slice(b"sample"),
        code: vec![
            opcode::abc(opcode::OP_RETURN, 0, 1, 0),
        ],
        num_params: 1,
        max_stack_size: 2,
        line_defined: 3,
        last_line_defined: 4,
        line_info: vec![4],
        upvalues: vec![UpvalueDesc {
            name: Some(LuaStr::from_slice(b"x")),
            in_stack: true,
            index: 0,
        }],
        ..Prototype::default()
    };
    Prototype {
        source: LuaStr::from_slice(b"sample"),
        code: vec![
            opcode::abx(opcode::OP_LOADK, 0, 0),
            opcode::abx(opcode::OP_CLOSURE, 1, 0),
            opcode::abc(opcode::OP_RETURN, 0, 3, 0),
        ],
        constants: vec![
            Value::Nil,
            Value::Bool(true),
            Value::Int(42),
            Value::Int(-7),
            Value::Float(0.25),
            Value::Str(LuaStr::from_slice(b"hello")),
            Value::Str(LuaStr::from_slice(b"")),
        ],
        protos: vec![Arc::new(inner)],
        upvalues: vec![UpvalueDesc {
            name: Some(LuaStr::from_slice(b"_ENV")),
            in_stack: true,
            index: 0,
        }],
        line_info: vec![1, 1, 2],
        loc_vars: vec![LocalVar {
            name: LuaStr::from_slice(b"v"),
            start_pc: 0,
            end_pc: 3,
        }],
        line_defined: 0,
        last_line_defined: 0,
        num_params: 0,
        is_vararg: 1,
        max_stack_size: 4,
    }
}

#[test]
fn test_roundtrip_field_for_field() {
    let rt = Runtime::new();
    let p = sample_prototype();
    let bytes = dump::dump(&p, false);
    let loaded = undump(&rt, &bytes, "sample").unwrap().expect("recognized");
    assert_eq!(*loaded, p);
}

#[test]
fn test_roundtrip_big_endian() {
    let rt = Runtime::new();
    let p = sample_prototype();
    let bytes = dump::DumpState::new().big_endian().dump(&p, false);
    let loaded = undump(&rt, &bytes, "sample").unwrap().expect("recognized");
    assert_eq!(*loaded, p);
}

#[test]
fn test_roundtrip_ints_only_format() {
    let rt = Runtime::new();
    let p = Prototype {
        source: LuaStr::from_slice(b"ints"),
        constants: vec![Value::Int(1), Value::Int(-100), Value::Bool(false)],
        ..Prototype::default()
    };
    let bytes = dump::DumpState::new().ints_only().dump(&p, false);
    let loaded = undump(&rt, &bytes, "ints").unwrap().expect("recognized");
    assert_eq!(loaded.constants, p.constants);
}

#[test]
fn test_integral_double_constant_collapses_to_int() {
    let rt = Runtime::new();
    let p = Prototype {
        source: LuaStr::from_slice(b"c"),
        constants: vec![Value::Float(6.0)],
        ..Prototype::default()
    };
    let bytes = dump::dump(&p, false);
    let loaded = undump(&rt, &bytes, "c").unwrap().unwrap();
    // the doubles format cannot distinguish 6.0 from 6
    assert_eq!(loaded.constants, vec![Value::Int(6)]);
}

#[test]
fn test_stripped_chunk_loads_without_debug() {
    let rt = Runtime::new();
    let p = sample_prototype();
    let bytes = dump::dump(&p, true);
    let loaded = undump(&rt, &bytes, "@script.lua").unwrap().unwrap();
    assert!(loaded.line_info.is_empty());
    assert!(loaded.loc_vars.is_empty());
    assert_eq!(loaded.code, p.code);
    assert_eq!(loaded.constants, p.constants);
    // without a dumped source the chunk name applies
    assert_eq!(loaded.source.as_bytes(), b"script.lua");
}

#[test]
fn test_trailer_corruption_rejected_at_every_index() {
    let rt = Runtime::new();
    let p = Prototype::default();
    let bytes = dump::dump(&p, true);
    let trailer_start = 12;
    for i in 0..6 {
        let mut corrupt = bytes.clone();
        corrupt[trailer_start + i] ^= 0x40;
        let err = undump(&rt, &corrupt, "x").unwrap_err();
        assert_eq!(err.kind, core_types::ErrorKind::Format);
        assert!(err.to_string().contains(&format!("index {}", i)));
    }
}

#[test]
fn test_truncated_body_rejected() {
    let rt = Runtime::new();
    let p = sample_prototype();
    let bytes = dump::dump(&p, false);
    for cut in [20, bytes.len() / 2, bytes.len() - 1] {
        let err = undump(&rt, &bytes[..cut], "x").unwrap_err();
        assert_eq!(err.kind, core_types::ErrorKind::Format);
    }
}

#[test]
fn test_nested_prototypes_preserved() {
    let rt = Runtime::new();
    let p = sample_prototype();
    let bytes = dump::dump(&p, false);
    let loaded = undump(&rt, &bytes, "sample").unwrap().unwrap();
    assert_eq!(loaded.protos.len(), 1);
    assert_eq!(loaded.protos[0].num_params, 1);
    assert_eq!(loaded.protos[0].upvalues[0].name, Some(LuaStr::from_slice(b"x")));
}
