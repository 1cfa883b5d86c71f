//! Core Lua value types, tables, strings and error handling.
//!
//! This crate provides the foundational types for a Lua runtime:
//! value representation, the hybrid array/hash table engine, immutable
//! byte strings with a recent-short-string cache, multi-value argument
//! lists, and the per-instance runtime context.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of Lua values
//! - [`LuaStr`] - Immutable byte string with precomputed hash
//! - [`Table`] - Hybrid array + chained-hash table with weak modes
//! - [`Varargs`] - Multi-value argument/result list
//! - [`LuaError`] - Lua errors carrying an arbitrary message value
//! - [`Runtime`] - Per-instance context (string cache, type metatables)
//! - [`ops`] - Operator dispatch with metatable fallback
//!
//! # Examples
//!
//! ```
//! use core_types::{ops, Runtime, Value};
//!
//! let rt = Runtime::new();
//! let sum = ops::add(&rt, &Value::Int(1), &Value::Int(1)).unwrap();
//! assert_eq!(sum, Value::Int(2));
//!
//! let q = ops::div(&rt, &Value::Int(1), &Value::Int(2)).unwrap();
//! assert_eq!(q, Value::Float(0.5));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod intern;
pub mod ops;
mod runtime;
mod string;
mod table;
mod value;
mod varargs;
mod weak;

pub use error::{ErrorKind, LuaError};
pub use intern::{StringPool, RECENT_STRINGS_CACHE_SIZE, RECENT_STRINGS_MAX_LENGTH};
pub use runtime::{DebugHooks, Runtime, Tags, TypeMetatables};
pub use string::{decode_as_utf8, encode_to_utf8, length_as_utf8, LuaStr};
pub use table::Table;
pub use value::{
    Callable, Dispatch, NativeFunction, ThreadHandle, Userdata, Value, TBOOLEAN, TFUNCTION, TNIL,
    TNUMBER, TSTRING, TTABLE, TTHREAD, TUSERDATA,
};
pub use varargs::Varargs;
pub use weak::WeakSlot;
