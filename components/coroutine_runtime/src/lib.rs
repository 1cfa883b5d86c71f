//! Coroutine scheduler for the Lua runtime.
//!
//! Coroutines are cooperative: each one runs on its own native thread,
//! but the resume/yield rendezvous guarantees at most one of them
//! executes script code at any moment. The resuming side parks until the
//! resumed side yields or finishes; arguments and results travel through
//! a single-slot channel guarded by a lock with one condition variable
//! per direction.
//!
//! A coroutine whose script-visible handle becomes unreachable is
//! detected on a bounded wait timeout through a weak back-reference and
//! terminates itself rather than blocking its native thread forever.
//!
//! # Example
//!
//! ```
//! use core_types::{NativeFunction, Runtime, Value, Varargs};
//! use coroutine_runtime::{yield_current, LuaThread};
//!
//! let rt = Runtime::new();
//! let body = NativeFunction::value("body", |rt, args| {
//!     let back = yield_current(rt, args)?; // echo the resume arguments
//!     Ok(back)
//! });
//! let co = LuaThread::new(body);
//! let out = co.resume(&rt, Varargs::one(Value::Int(1)));
//! assert_eq!(out.arg(1), Value::Bool(true));
//! assert_eq!(out.arg(2), Value::Int(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod thread;

pub use thread::{
    set_orphan_check_interval_ms, yield_current, LuaThread, Status,
};
