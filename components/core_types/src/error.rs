//! Lua error types and error propagation.
//!
//! A Lua error carries an arbitrary message *value* (usually, but not
//! necessarily, a string), an optional `source:line` location attached by
//! the interpreter at the innermost frame with debug info, and an optional
//! traceback produced by an installed error handler.

use crate::string::LuaStr;
use crate::value::Value;
use thiserror::Error;

/// The kind of Lua error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Ordinary runtime error raised by script-visible operations
    /// (type mismatches, invalid keys, failed conversions).
    Runtime,
    /// Malformed binary chunk: bad header, trailer or constant tag,
    /// or exhausted input. Always fatal to the load operation.
    Format,
    /// A coroutine detected that its script-visible handle is gone and
    /// terminated itself. Fatal to that coroutine only.
    Orphaned,
}

/// A Lua error with message value, location and traceback.
///
/// # Examples
///
/// ```
/// use core_types::{LuaError, Value};
///
/// let err = LuaError::runtime("attempt to index a nil value");
/// assert_eq!(err.to_string(), "attempt to index a nil value");
///
/// let located = err.with_file_line("script.lua:3");
/// assert_eq!(located.to_string(), "script.lua:3 attempt to index a nil value");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{}", render(.traceback, .file_line, .message))]
pub struct LuaError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// The message value. Any Lua value, not just text.
    pub message: Value,
    /// Call-stack level used when attaching location info.
    pub level: i32,
    /// `source:line` of the innermost frame with debug info, when known.
    pub file_line: Option<String>,
    /// Traceback string, filled in once by error-handler processing.
    pub traceback: Option<String>,
}

impl LuaError {
    /// Create a runtime error from a text message.
    pub fn runtime(message: impl Into<String>) -> Self {
        LuaError {
            kind: ErrorKind::Runtime,
            message: Value::Str(LuaStr::from_slice(message.into().as_bytes())),
            level: 1,
            file_line: None,
            traceback: None,
        }
    }

    /// Create a runtime error from an arbitrary message value.
    pub fn value(message: Value) -> Self {
        LuaError {
            kind: ErrorKind::Runtime,
            message,
            level: 1,
            file_line: None,
            traceback: None,
        }
    }

    /// Create a binary chunk format error.
    pub fn format(message: impl Into<String>) -> Self {
        LuaError {
            kind: ErrorKind::Format,
            ..LuaError::runtime(message)
        }
    }

    /// Create the unrecoverable orphaned-coroutine signal.
    pub fn orphaned() -> Self {
        LuaError {
            kind: ErrorKind::Orphaned,
            ..LuaError::runtime("orphaned thread")
        }
    }

    /// Attach a `source:line` location, consuming self.
    pub fn with_file_line(mut self, file_line: impl Into<String>) -> Self {
        self.file_line = Some(file_line.into());
        self
    }

    /// The full error text: traceback if present, else location-prefixed
    /// message.
    pub fn text(&self) -> String {
        render(&self.traceback, &self.file_line, &self.message)
    }
}

fn render(traceback: &Option<String>, file_line: &Option<String>, message: &Value) -> String {
    if let Some(tb) = traceback {
        return tb.clone();
    }
    match file_line {
        Some(fl) => format!("{} {}", fl, message),
        None => message.to_string(),
    }
}
