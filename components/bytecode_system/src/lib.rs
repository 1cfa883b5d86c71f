//! Bytecode system for the Lua runtime.
//!
//! This crate provides the instruction set definitions, the immutable
//! compiled-function template, and the binary chunk loader and dumper.
//!
//! # Features
//!
//! - Register-based instruction set (40 opcodes, packed bit fields)
//! - Immutable [`Prototype`] tree with constants, nested prototypes and
//!   debug info
//! - Binary chunk undumper driven entirely by the chunk header's
//!   endianness and field widths
//! - Matching dumper producing chunks the loader round-trips
//!   field-for-field
//!
//! # Example
//!
//! ```
//! use bytecode_system::{dump, undump, Prototype};
//! use core_types::Runtime;
//!
//! let rt = Runtime::new();
//! let proto = Prototype::default();
//! let bytes = dump::dump(&proto, false);
//! let loaded = undump::undump(&rt, &bytes, "chunk").unwrap().unwrap();
//! assert_eq!(*loaded, proto);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dump;
pub mod opcode;
mod prototype;
pub mod undump;

pub use prototype::{LocalVar, Prototype, UpvalueDesc};
pub use undump::undump;
