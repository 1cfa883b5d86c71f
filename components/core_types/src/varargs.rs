//! Multi-value argument and result lists.
//!
//! A `Varargs` encapsulates the values of a variable argument list or of
//! multiple return values. It is distinct from any single value: at
//! boundaries that take one value (table slots, upvalue cells) a varargs
//! is always narrowed to its first value or dropped.

use std::sync::Arc;

use crate::error::LuaError;
use crate::string::LuaStr;
use crate::table::Table;
use crate::value::{Callable, ThreadHandle, Value};

/// A possibly-multi-valued argument/result list.
///
/// Argument positions are 1-based, matching the language. Reading past
/// the end yields `nil`.
///
/// # Examples
///
/// ```
/// use core_types::{Value, Varargs};
///
/// let v = Varargs::pair(Value::Int(1), Value::from("two"));
/// assert_eq!(v.narg(), 2);
/// assert_eq!(v.arg(1), Value::Int(1));
/// assert_eq!(v.arg(3), Value::Nil);
/// assert_eq!(v.subargs(2).narg(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Varargs {
    values: Vec<Value>,
}

impl Varargs {
    /// The empty list.
    pub fn empty() -> Varargs {
        Varargs { values: Vec::new() }
    }

    /// A single-value list.
    pub fn one(v: Value) -> Varargs {
        Varargs { values: vec![v] }
    }

    /// A two-value list.
    pub fn pair(a: Value, b: Value) -> Varargs {
        Varargs { values: vec![a, b] }
    }

    /// Wrap a vector of values.
    pub fn from_vec(values: Vec<Value>) -> Varargs {
        Varargs { values }
    }

    /// Copy `count` values starting at `offset` out of a slice, appending
    /// `more` after them.
    pub fn from_slice(slice: &[Value], offset: usize, count: usize, more: &Varargs) -> Varargs {
        let mut values = Vec::with_capacity(count + more.narg());
        values.extend_from_slice(&slice[offset..offset + count]);
        values.extend_from_slice(&more.values);
        Varargs { values }
    }

    /// Prepend a value in front of an existing list.
    pub fn prepend(first: Value, rest: Varargs) -> Varargs {
        let mut values = Vec::with_capacity(rest.narg() + 1);
        values.push(first);
        values.extend(rest.values);
        Varargs { values }
    }

    /// The number of values.
    #[inline]
    pub fn narg(&self) -> usize {
        self.values.len()
    }

    /// True when there are no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `i`-th value (1-based), or `nil` past the end.
    pub fn arg(&self, i: usize) -> Value {
        if i >= 1 && i <= self.values.len() {
            self.values[i - 1].clone()
        } else {
            Value::Nil
        }
    }

    /// The first value, or `nil` when empty.
    pub fn arg1(&self) -> Value {
        self.values.first().cloned().unwrap_or(Value::Nil)
    }

    /// The tail of the list from 1-based position `start`.
    pub fn subargs(&self, start: usize) -> Varargs {
        if start <= 1 {
            return self.clone();
        }
        if start > self.values.len() {
            return Varargs::empty();
        }
        Varargs {
            values: self.values[start - 1..].to_vec(),
        }
    }

    /// Borrow the values as a slice.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Consume into the underlying vector.
    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }

    // ------------------------------------------------------------------
    // argument checking, for native callables
    // ------------------------------------------------------------------

    fn arg_error(&self, i: usize, expected: &str) -> LuaError {
        LuaError::runtime(format!(
            "bad argument #{}: {} expected, got {}",
            i,
            expected,
            self.arg(i).type_name()
        ))
    }

    /// Argument `i` as a boolean, or an error for any other type.
    pub fn check_boolean(&self, i: usize) -> Result<bool, LuaError> {
        match self.arg(i) {
            Value::Bool(b) => Ok(b),
            _ => Err(self.arg_error(i, "boolean")),
        }
    }

    /// Argument `i` as an integer, coercing floats with no fractional
    /// part and numeric strings.
    pub fn check_int(&self, i: usize) -> Result<i32, LuaError> {
        let d = self.check_double(i)?;
        Ok(d as i64 as i32)
    }

    /// Argument `i` as a float, coercing the integer subtype and numeric
    /// strings.
    pub fn check_double(&self, i: usize) -> Result<f64, LuaError> {
        let v = self.arg(i);
        match &v {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            Value::Str(s) => {
                let d = s.scan_number();
                if d.is_nan() {
                    Err(self.arg_error(i, "number"))
                } else {
                    Ok(d)
                }
            }
            _ => Err(self.arg_error(i, "number")),
        }
    }

    /// Argument `i` as a string; numbers convert to their display form.
    pub fn check_str(&self, i: usize) -> Result<LuaStr, LuaError> {
        let v = self.arg(i);
        match &v {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(_) | Value::Float(_) => Ok(LuaStr::from_vec(v.to_string().into_bytes())),
            _ => Err(self.arg_error(i, "string")),
        }
    }

    /// Argument `i` as a table reference.
    pub fn check_table(&self, i: usize) -> Result<Arc<Table>, LuaError> {
        match self.arg(i) {
            Value::Table(t) => Ok(t),
            _ => Err(self.arg_error(i, "table")),
        }
    }

    /// Argument `i` as a callable reference.
    pub fn check_function(&self, i: usize) -> Result<Arc<dyn Callable>, LuaError> {
        match self.arg(i) {
            Value::Function(f) => Ok(f),
            _ => Err(self.arg_error(i, "function")),
        }
    }

    /// Argument `i` as a thread handle.
    pub fn check_thread(&self, i: usize) -> Result<Arc<dyn ThreadHandle>, LuaError> {
        match self.arg(i) {
            Value::Thread(t) => Ok(t),
            _ => Err(self.arg_error(i, "thread")),
        }
    }

    /// Argument `i` as any non-nil value.
    pub fn check_value(&self, i: usize) -> Result<Value, LuaError> {
        match self.arg(i) {
            Value::Nil => Err(self.arg_error(i, "value")),
            v => Ok(v),
        }
    }

    /// Argument `i` as an integer, or `default` when absent or nil.
    pub fn opt_int(&self, i: usize, default: i32) -> Result<i32, LuaError> {
        if self.arg(i).is_nil() {
            Ok(default)
        } else {
            self.check_int(i)
        }
    }

    /// Argument `i` as a float, or `default` when absent or nil.
    pub fn opt_double(&self, i: usize, default: f64) -> Result<f64, LuaError> {
        if self.arg(i).is_nil() {
            Ok(default)
        } else {
            self.check_double(i)
        }
    }

    /// Argument `i` as a string, or `default` when absent or nil.
    pub fn opt_str(&self, i: usize, default: &LuaStr) -> Result<LuaStr, LuaError> {
        if self.arg(i).is_nil() {
            Ok(default.clone())
        } else {
            self.check_str(i)
        }
    }

    /// Argument `i` as a boolean, or `default` when absent or nil.
    pub fn opt_boolean(&self, i: usize, default: bool) -> Result<bool, LuaError> {
        if self.arg(i).is_nil() {
            Ok(default)
        } else {
            self.check_boolean(i)
        }
    }

    /// Argument `i`, or `default` when absent or nil.
    pub fn opt_value(&self, i: usize, default: Value) -> Value {
        match self.arg(i) {
            Value::Nil => default,
            v => v,
        }
    }
}

impl From<Value> for Varargs {
    fn from(v: Value) -> Varargs {
        Varargs::one(v)
    }
}

impl From<Vec<Value>> for Varargs {
    fn from(values: Vec<Value>) -> Varargs {
        Varargs { values }
    }
}
