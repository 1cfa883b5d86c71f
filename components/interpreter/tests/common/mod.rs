//! Shared helpers for interpreter integration tests: hand-assembled
//! prototypes executed through the default environment.

use std::sync::Arc;

use bytecode_system::Prototype;
use core_types::{ops, LuaError, Value, Varargs};
use interpreter::Globals;

/// Run a prototype as a top-level chunk in a fresh environment.
#[allow(dead_code)]
pub fn run(proto: Prototype, args: Varargs) -> Result<Varargs, LuaError> {
    run_in(&Globals::new(), proto, args)
}

/// Run a prototype as a top-level chunk in the given environment.
#[allow(dead_code)]
pub fn run_in(g: &Globals, proto: Prototype, args: Varargs) -> Result<Varargs, LuaError> {
    let f = g
        .load_prototype_value(Arc::new(proto), "test")
        .expect("loader installed");
    ops::invoke_value(&g.runtime, &f, args)
}

/// Load a prototype as a callable without running it.
#[allow(dead_code)]
pub fn function_in(g: &Globals, proto: Prototype) -> Value {
    g.load_prototype_value(Arc::new(proto), "test")
        .expect("loader installed")
}
