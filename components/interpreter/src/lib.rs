//! Bytecode interpreter for the Lua runtime.
//!
//! This crate executes compiled [`Prototype`](bytecode_system::Prototype)s:
//!
//! - Register-machine dispatch over the full instruction set
//! - Closures with shared, closable upvalue cells
//! - Fast-pathed fixed-arity call shapes and trampolined tail calls
//! - Error unwinding that closes open upvalues and attaches source
//!   locations from debug info
//! - The [`Globals`] environment with the pluggable compiler, undumper,
//!   loader and resource-finder interfaces
//!
//! # Example
//!
//! ```
//! use bytecode_system::{opcode, Prototype};
//! use core_types::{Value, Varargs};
//! use interpreter::Globals;
//! use std::sync::Arc;
//!
//! // return 41 + 1
//! let proto = Arc::new(Prototype {
//!     constants: vec![Value::Int(41), Value::Int(1)],
//!     code: vec![
//!         opcode::abc(opcode::OP_ADD, 0, opcode::rk_as_k(0), opcode::rk_as_k(1)),
//!         opcode::abc(opcode::OP_RETURN, 0, 2, 0),
//!     ],
//!     max_stack_size: 1,
//!     ..Prototype::default()
//! });
//! let g = Globals::new();
//! let f = g.load_prototype_value(proto, "answer").unwrap();
//! let out = core_types::ops::invoke_value(&g.runtime, &f, Varargs::empty()).unwrap();
//! assert_eq!(out.arg1(), Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod closure;
mod dispatch;
mod frame;
mod globals;
mod upvalue;

pub use closure::Closure;
pub use core_types::DebugHooks;
pub use frame::Frame;
pub use globals::{
    BinaryUndumper, ClosureLoader, Compiler, Globals, Loader, ResourceFinder, Undumper,
};
pub use upvalue::Upvalue;
