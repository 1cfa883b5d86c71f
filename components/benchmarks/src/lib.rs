//! Benchmark fixtures shared by the criterion benches.

use std::sync::Arc;

use bytecode_system::opcode::*;
use bytecode_system::Prototype;
use core_types::Value;

/// A prototype computing the sum 1..=n with a numeric for loop.
pub fn sum_loop_proto(n: i32) -> Prototype {
    Prototype {
        constants: vec![Value::Int(0), Value::Int(1), Value::Int(n)],
        code: vec![
            abx(OP_LOADK, 0, 0),
            abx(OP_LOADK, 1, 1),
            abx(OP_LOADK, 2, 2),
            abx(OP_LOADK, 3, 1),
            asbx(OP_FORPREP, 1, 1),
            abc(OP_ADD, 0, 0, 4),
            asbx(OP_FORLOOP, 1, -2),
            abc(OP_RETURN, 0, 2, 0),
        ],
        max_stack_size: 5,
        ..Prototype::default()
    }
}

/// Load a prototype into a callable in a fresh environment.
pub fn load(proto: Prototype) -> (interpreter::Globals, Value) {
    let g = interpreter::Globals::new();
    let f = g
        .load_prototype_value(Arc::new(proto), "bench")
        .expect("default loader");
    (g, f)
}
