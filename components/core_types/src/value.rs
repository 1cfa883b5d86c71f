//! Lua value representation.
//!
//! This module provides the core `Value` enum that represents all possible
//! Lua values as a closed tagged union. Primitive values are stored inline;
//! tables, functions, userdata and threads are shared by reference, so
//! cloning a `Value` is cheap and "mutating" a table mutates the referent,
//! never the tag.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LuaError;
use crate::runtime::Runtime;
use crate::string::LuaStr;
use crate::table::Table;
use crate::varargs::Varargs;

/// Type tag for nil.
pub const TNIL: u8 = 0;
/// Type tag for booleans.
pub const TBOOLEAN: u8 = 1;
/// Type tag for numbers (integer or float subtype).
pub const TNUMBER: u8 = 3;
/// Type tag for strings.
pub const TSTRING: u8 = 4;
/// Type tag for tables.
pub const TTABLE: u8 = 5;
/// Type tag for functions.
pub const TFUNCTION: u8 = 6;
/// Type tag for userdata.
pub const TUSERDATA: u8 = 7;
/// Type tag for threads.
pub const TTHREAD: u8 = 8;

/// Represents any Lua value.
///
/// The discriminant of a value never changes after construction. The
/// number type has two internal representations: a 32-bit integer
/// subtype and an IEEE-754 double; constructors taking wider inputs
/// demote to `Int` only when the value is exactly representable.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::int(7), Value::Int(7));
/// assert_eq!(Value::int(1i64 << 40), Value::Float((1u64 << 40) as f64));
///
/// assert!(!Value::Nil.is_truthy());
/// assert!(!Value::Bool(false).is_truthy());
/// assert!(Value::Int(0).is_truthy()); // 0 is truthy in Lua
/// ```
#[derive(Clone)]
pub enum Value {
    /// The nil value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// Integer number subtype (32-bit; wider values live in the float
    /// subtype).
    Int(i32),
    /// Float number subtype (IEEE-754 double).
    Float(f64),
    /// An immutable byte string.
    Str(LuaStr),
    /// A table, shared by reference.
    Table(Arc<Table>),
    /// A callable function value (closure or native function).
    Function(Arc<dyn Callable>),
    /// A host object carried through script code opaquely.
    Userdata(Arc<Userdata>),
    /// A coroutine handle.
    Thread(Arc<dyn ThreadHandle>),
}

impl Value {
    /// Construct a number from an `i64`, demoting to `Int` when it fits
    /// in 32 bits and falling back to `Float` otherwise.
    #[inline]
    pub fn int(v: i64) -> Value {
        if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            Value::Int(v as i32)
        } else {
            Value::Float(v as f64)
        }
    }

    /// Construct a number from an `f64`, demoting to `Int` when the value
    /// is exactly an in-range integer.
    #[inline]
    pub fn number(v: f64) -> Value {
        let i = v as i32;
        if i as f64 == v {
            Value::Int(i)
        } else {
            Value::Float(v)
        }
    }

    /// Construct a string value from text.
    pub fn str(s: impl Into<LuaStr>) -> Value {
        Value::Str(s.into())
    }

    /// Construct a table value.
    pub fn table(t: Table) -> Value {
        Value::Table(Arc::new(t))
    }

    /// Construct a function value.
    pub fn function(f: impl Callable + 'static) -> Value {
        Value::Function(Arc::new(f))
    }

    /// The numeric type tag of this value.
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Nil => TNIL,
            Value::Bool(_) => TBOOLEAN,
            Value::Int(_) | Value::Float(_) => TNUMBER,
            Value::Str(_) => TSTRING,
            Value::Table(_) => TTABLE,
            Value::Function(_) => TFUNCTION,
            Value::Userdata(_) => TUSERDATA,
            Value::Thread(_) => TTHREAD,
        }
    }

    /// The Lua type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
            Value::Thread(_) => "thread",
        }
    }

    /// Returns whether this value is truthy: everything except `nil` and
    /// `false` is truthy, including `0` and NaN.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Returns true for `nil`.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns true for either number subtype.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Returns true for the integer subtype only.
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    /// The value as an `f64`, converting the integer subtype. `None` for
    /// non-numbers (no string coercion here).
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The table referent, when this is a table.
    pub fn as_table(&self) -> Option<&Arc<Table>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// The callable referent, when this is a function.
    pub fn as_function(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// A stable address identifying the referent of a reference-typed
    /// value; `None` for inline values.
    pub fn ref_addr(&self) -> Option<usize> {
        match self {
            Value::Table(t) => Some(Arc::as_ptr(t) as usize),
            Value::Function(f) => Some(Arc::as_ptr(f) as *const () as usize),
            Value::Userdata(u) => Some(Arc::as_ptr(u) as usize),
            Value::Thread(t) => Some(Arc::as_ptr(t) as *const () as usize),
            _ => None,
        }
    }

    /// Raw equality: numeric comparison across number subtypes, byte
    /// comparison for strings, referent identity for reference types.
    /// Never consults metatables.
    pub fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.ref_addr(), other.ref_addr()) {
                (Some(a), Some(b)) => self.type_tag() == other.type_tag() && a == b,
                _ => false,
            },
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(LuaStr::from_slice(s.as_bytes()))
    }
}

impl From<LuaStr> for Value {
    fn from(s: LuaStr) -> Value {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => {
                if n.is_nan() {
                    write!(f, "nan")
                } else if n.is_infinite() {
                    write!(f, "{}", if *n > 0.0 { "inf" } else { "-inf" })
                } else if *n == n.floor() && n.abs() < 9.007199254740992e15 {
                    // integral doubles display without a fractional part
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "table: {:#x}", Arc::as_ptr(t) as usize),
            Value::Function(c) => write!(f, "function: {}", c.name()),
            Value::Userdata(u) => write!(f, "userdata: {:#x}", Arc::as_ptr(u) as usize),
            Value::Thread(t) => {
                write!(f, "thread: {:#x}", Arc::as_ptr(t) as *const () as usize)
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Table(t) => write!(f, "Table({:#x})", Arc::as_ptr(t) as usize),
            Value::Function(c) => write!(f, "Function({})", c.name()),
            Value::Userdata(u) => write!(f, "Userdata({:#x})", Arc::as_ptr(u) as usize),
            Value::Thread(t) => {
                write!(f, "Thread({:#x})", Arc::as_ptr(t) as *const () as usize)
            }
        }
    }
}

/// The result of one dispatch step of a callable.
///
/// A tail call is returned to the caller as a deferred invocation rather
/// than performed recursively, so chains of tail calls run in bounded
/// native stack space. [`Callable::invoke`] drives deferred calls in a
/// loop until actual results are produced.
#[derive(Debug)]
pub enum Dispatch {
    /// Final results of the call.
    Data(Varargs),
    /// Continue by invoking this callee with these arguments.
    TailCall(Value, Varargs),
}

/// A callable value: a bytecode closure or a native function.
///
/// `on_invoke` performs one dispatch step and may defer a tail call;
/// `invoke` is the trampoline that drives steps to completion. The
/// fixed-arity `call0`..`call3` entry points exist so hot call shapes can
/// avoid building an argument list; implementations may override them.
pub trait Callable: Send + Sync {
    /// One dispatch step. Implementations return `Dispatch::TailCall`
    /// instead of recursing for calls in tail position.
    fn on_invoke(&self, rt: &Runtime, args: Varargs) -> Result<Dispatch, LuaError>;

    /// A human-readable name for diagnostics.
    fn name(&self) -> String {
        "?".to_string()
    }

    /// Invoke with an argument list, driving deferred tail calls to
    /// completion.
    fn invoke(&self, rt: &Runtime, args: Varargs) -> Result<Varargs, LuaError> {
        let mut step = self.on_invoke(rt, args)?;
        loop {
            match step {
                Dispatch::Data(v) => return Ok(v),
                Dispatch::TailCall(f, a) => step = crate::ops::dispatch_call(rt, &f, a)?,
            }
        }
    }

    /// Call with no arguments, returning the first result.
    fn call0(&self, rt: &Runtime) -> Result<Value, LuaError> {
        Ok(self.invoke(rt, Varargs::empty())?.arg1())
    }

    /// Call with one argument, returning the first result.
    fn call1(&self, rt: &Runtime, a: Value) -> Result<Value, LuaError> {
        Ok(self.invoke(rt, Varargs::one(a))?.arg1())
    }

    /// Call with two arguments, returning the first result.
    fn call2(&self, rt: &Runtime, a: Value, b: Value) -> Result<Value, LuaError> {
        Ok(self.invoke(rt, Varargs::pair(a, b))?.arg1())
    }

    /// Call with three arguments, returning the first result.
    fn call3(&self, rt: &Runtime, a: Value, b: Value, c: Value) -> Result<Value, LuaError> {
        Ok(self.invoke(rt, Varargs::from_vec(vec![a, b, c]))?.arg1())
    }
}

/// A native function registered into the runtime as an ordinary callable
/// value.
///
/// # Examples
///
/// ```
/// use core_types::{ops, NativeFunction, Runtime, Value, Varargs};
///
/// let rt = Runtime::new();
/// let id = NativeFunction::value("identity", |_rt, args| Ok(args));
/// let out = ops::invoke_value(&rt, &id, Varargs::one(Value::Int(5))).unwrap();
/// assert_eq!(out.arg1(), Value::Int(5));
/// ```
pub struct NativeFunction {
    name: String,
    #[allow(clippy::type_complexity)]
    body: Box<dyn Fn(&Runtime, Varargs) -> Result<Varargs, LuaError> + Send + Sync>,
}

impl NativeFunction {
    /// Wrap a Rust function as a callable Lua value.
    pub fn new<F>(name: impl Into<String>, body: F) -> NativeFunction
    where
        F: Fn(&Runtime, Varargs) -> Result<Varargs, LuaError> + Send + Sync + 'static,
    {
        NativeFunction {
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// Wrap a Rust function as a `Value::Function`.
    pub fn value<F>(name: impl Into<String>, body: F) -> Value
    where
        F: Fn(&Runtime, Varargs) -> Result<Varargs, LuaError> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(NativeFunction::new(name, body)))
    }
}

impl Callable for NativeFunction {
    fn on_invoke(&self, rt: &Runtime, args: Varargs) -> Result<Dispatch, LuaError> {
        (self.body)(rt, args).map(Dispatch::Data)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// A coroutine handle as seen by the value model.
///
/// The scheduler lives in its own component; the value model only needs
/// identity, status text and the per-thread error-handler slot. Schedulers
/// recover their concrete type through [`ThreadHandle::as_any`].
pub trait ThreadHandle: Send + Sync {
    /// Downcast support for the owning scheduler.
    fn as_any(&self) -> &dyn Any;

    /// The status name: `suspended`, `running`, `normal` or `dead`.
    fn status_name(&self) -> &'static str;

    /// The installed per-thread error handler function, if any.
    fn error_handler(&self) -> Option<Value>;

    /// Install or clear the per-thread error handler function.
    fn set_error_handler(&self, handler: Option<Value>);
}

/// A host object carried opaquely through script code.
///
/// The payload is reachable only from host code via downcasting; script
/// code interacts with userdata exclusively through its metatable.
pub struct Userdata {
    data: Box<dyn Any + Send + Sync>,
    metatable: Mutex<Option<Value>>,
}

impl Userdata {
    /// Wrap a host object.
    pub fn new(data: impl Any + Send + Sync) -> Userdata {
        Userdata {
            data: Box::new(data),
            metatable: Mutex::new(None),
        }
    }

    /// Borrow the payload as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// This userdata's metatable, if set.
    pub fn metatable(&self) -> Option<Value> {
        self.metatable.lock().clone()
    }

    /// Set or clear this userdata's metatable.
    pub fn set_metatable(&self, mt: Option<Value>) {
        *self.metatable.lock() = mt;
    }
}
