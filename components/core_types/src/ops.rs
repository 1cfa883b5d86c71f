//! Operator dispatch with metatable fallback.
//!
//! Every operation here is a two-step function: first the native
//! computation is attempted when the operand tags support it, then the
//! corresponding metatag (`__add`, `__index`, ...) is looked up on either
//! operand, preferring the left, and invoked with both operands. Errors
//! from metamethods are forwarded unchanged.
//!
//! Numeric rules: `add`/`sub`/`mul` on two integers compute in 64 bits
//! and fall back to float on overflow; `div`/`mod`/`pow` always compute
//! in floats; strings coerce to floats for arithmetic but never for
//! relational ordering.

use std::sync::Arc;

use crate::error::LuaError;
use crate::runtime::Runtime;
use crate::string::LuaStr;
use crate::value::{Callable, Dispatch, Value};
use crate::varargs::Varargs;

/// Limit on `__index`/`__newindex` chain processing.
const MAX_TAG_LOOP: usize = 100;

// Numeric view of an operand for arithmetic.
enum Num {
    Int(i32),
    Float(f64),
    NotANumber,
}

// String operands coerce to float, never to the integer subtype.
fn arith_operand(v: &Value) -> Num {
    match v {
        Value::Int(i) => Num::Int(*i),
        Value::Float(f) => Num::Float(*f),
        Value::Str(s) => {
            let d = s.scan_number();
            if d.is_nan() {
                Num::NotANumber
            } else {
                Num::Float(d)
            }
        }
        _ => Num::NotANumber,
    }
}

/// The metatable of a value: the table's or userdata's own, else the
/// runtime's shared per-type metatable.
pub fn metatable_of(rt: &Runtime, v: &Value) -> Option<Value> {
    match v {
        Value::Table(t) => t.metatable(),
        Value::Userdata(u) => u.metatable(),
        Value::Nil => rt.type_metatables.nil.lock().clone(),
        Value::Bool(_) => rt.type_metatables.boolean.lock().clone(),
        Value::Int(_) | Value::Float(_) => rt.type_metatables.number.lock().clone(),
        Value::Str(_) => rt.type_metatables.string.lock().clone(),
        Value::Function(_) => rt.type_metatables.function.lock().clone(),
        Value::Thread(_) => rt.type_metatables.thread.lock().clone(),
    }
}

/// Look up a metatag on a value's metatable, or `nil`.
pub fn metatag(rt: &Runtime, v: &Value, tag: &LuaStr) -> Value {
    match metatable_of(rt, v) {
        Some(Value::Table(mt)) => mt.raw_get(&Value::Str(tag.clone())),
        _ => Value::Nil,
    }
}

fn arith_mt(
    rt: &Runtime,
    tag: &LuaStr,
    lhs: &Value,
    rhs: &Value,
) -> Result<Value, LuaError> {
    let mut h = metatag(rt, lhs, tag);
    if h.is_nil() {
        h = metatag(rt, rhs, tag);
        if h.is_nil() {
            return Err(LuaError::runtime(format!(
                "attempt to perform arithmetic {} on {} and {}",
                tag,
                lhs.type_name(),
                rhs.type_name()
            )));
        }
    }
    Ok(invoke_value(rt, &h, Varargs::pair(lhs.clone(), rhs.clone()))?.arg1())
}

/// Addition with overflow fallback and `__add`.
pub fn add(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match (arith_operand(lhs), arith_operand(rhs)) {
        (Num::Int(a), Num::Int(b)) => Ok(Value::int(a as i64 + b as i64)),
        (Num::Int(a), Num::Float(b)) => Ok(Value::Float(a as f64 + b)),
        (Num::Float(a), Num::Int(b)) => Ok(Value::Float(a + b as f64)),
        (Num::Float(a), Num::Float(b)) => Ok(Value::Float(a + b)),
        _ => arith_mt(rt, &rt.tags.add, lhs, rhs),
    }
}

/// Subtraction with overflow fallback and `__sub`.
pub fn sub(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match (arith_operand(lhs), arith_operand(rhs)) {
        (Num::Int(a), Num::Int(b)) => Ok(Value::int(a as i64 - b as i64)),
        (Num::Int(a), Num::Float(b)) => Ok(Value::Float(a as f64 - b)),
        (Num::Float(a), Num::Int(b)) => Ok(Value::Float(a - b as f64)),
        (Num::Float(a), Num::Float(b)) => Ok(Value::Float(a - b)),
        _ => arith_mt(rt, &rt.tags.sub, lhs, rhs),
    }
}

/// Multiplication with overflow fallback and `__mul`.
pub fn mul(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match (arith_operand(lhs), arith_operand(rhs)) {
        (Num::Int(a), Num::Int(b)) => Ok(Value::int(a as i64 * b as i64)),
        (Num::Int(a), Num::Float(b)) => Ok(Value::Float(a as f64 * b)),
        (Num::Float(a), Num::Int(b)) => Ok(Value::Float(a * b as f64)),
        (Num::Float(a), Num::Float(b)) => Ok(Value::Float(a * b)),
        _ => arith_mt(rt, &rt.tags.mul, lhs, rhs),
    }
}

/// Division. Always computes in floats; division by zero yields a signed
/// infinity or NaN, never an error.
pub fn div(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match (arith_operand(lhs), arith_operand(rhs)) {
        (Num::NotANumber, _) | (_, Num::NotANumber) => {
            arith_mt(rt, &rt.tags.div, lhs, rhs)
        }
        (a, b) => Ok(Value::Float(as_f64(a) / as_f64(b))),
    }
}

/// Floored modulo in floats; `x % 0` is NaN.
pub fn modulo(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match (arith_operand(lhs), arith_operand(rhs)) {
        (Num::NotANumber, _) | (_, Num::NotANumber) => {
            arith_mt(rt, &rt.tags.modulo, lhs, rhs)
        }
        (a, b) => {
            let (a, b) = (as_f64(a), as_f64(b));
            Ok(Value::Float(if b != 0.0 {
                a - b * (a / b).floor()
            } else {
                f64::NAN
            }))
        }
    }
}

/// Exponentiation in floats.
pub fn pow(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    match (arith_operand(lhs), arith_operand(rhs)) {
        (Num::NotANumber, _) | (_, Num::NotANumber) => {
            arith_mt(rt, &rt.tags.pow, lhs, rhs)
        }
        (a, b) => Ok(Value::Float(as_f64(a).powf(as_f64(b)))),
    }
}

/// Unary minus with `__unm`.
pub fn neg(rt: &Runtime, v: &Value) -> Result<Value, LuaError> {
    match arith_operand(v) {
        Num::Int(i) => Ok(Value::int(-(i as i64))),
        Num::Float(f) => Ok(Value::Float(-f)),
        Num::NotANumber => arith_mt(rt, &rt.tags.unm, v, v),
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
        Num::NotANumber => f64::NAN,
    }
}

/// Logical not: true only for `nil` and `false`.
pub fn not(v: &Value) -> Value {
    Value::Bool(!v.is_truthy())
}

/// Equality with `__eq` fallback.
///
/// Raw equality decides first. `__eq` is consulted only when both
/// operands are tables or both are userdata, neither is primitively
/// equal, and both metatables yield the same handler.
pub fn eq(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<bool, LuaError> {
    if lhs.raw_eq(rhs) {
        return Ok(true);
    }
    let comparable = matches!(
        (lhs, rhs),
        (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
    );
    if !comparable {
        return Ok(false);
    }
    let h = metatag(rt, lhs, &rt.tags.eq);
    if h.is_nil() || !h.raw_eq(&metatag(rt, rhs, &rt.tags.eq)) {
        return Ok(false);
    }
    Ok(invoke_value(rt, &h, Varargs::pair(lhs.clone(), rhs.clone()))?
        .arg1()
        .is_truthy())
}

fn compare_mt(
    rt: &Runtime,
    tag: &LuaStr,
    lhs: &Value,
    rhs: &Value,
) -> Result<bool, LuaError> {
    let mut h = metatag(rt, lhs, tag);
    if h.is_nil() {
        h = metatag(rt, rhs, tag);
    }
    if !h.is_nil() {
        return Ok(invoke_value(rt, &h, Varargs::pair(lhs.clone(), rhs.clone()))?
            .arg1()
            .is_truthy());
    }
    // `a <= b` falls back to `not (b < a)`
    if tag == &rt.tags.le {
        let mut h = metatag(rt, lhs, &rt.tags.lt);
        if h.is_nil() {
            h = metatag(rt, rhs, &rt.tags.lt);
        }
        if !h.is_nil() {
            return Ok(!invoke_value(rt, &h, Varargs::pair(rhs.clone(), lhs.clone()))?
                .arg1()
                .is_truthy());
        }
    }
    Err(LuaError::runtime(format!(
        "attempt to compare {} on {} and {}",
        tag,
        lhs.type_name(),
        rhs.type_name()
    )))
}

/// Less-than. Both operands must be numbers or both strings, else
/// `__lt` applies.
pub fn lt(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<bool, LuaError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(a.str_cmp(b) == std::cmp::Ordering::Less),
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => Ok(a < b),
            _ => compare_mt(rt, &rt.tags.lt, lhs, rhs),
        },
    }
}

/// Less-than-or-equal, with the `__lt` double-negation fallback.
pub fn le(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<bool, LuaError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(a.str_cmp(b) != std::cmp::Ordering::Greater),
        _ => match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => Ok(a <= b),
            _ => compare_mt(rt, &rt.tags.le, lhs, rhs),
        },
    }
}

fn concat_bytes(rt: &Runtime, v: &Value) -> Option<LuaStr> {
    match v {
        Value::Str(s) => Some(s.clone()),
        Value::Int(_) | Value::Float(_) => Some(rt.adopt(v.to_string().into_bytes())),
        _ => None,
    }
}

/// Concatenation with `__concat` fallback.
pub fn concat(rt: &Runtime, lhs: &Value, rhs: &Value) -> Result<Value, LuaError> {
    if let (Some(a), Some(b)) = (concat_bytes(rt, lhs), concat_bytes(rt, rhs)) {
        return Ok(Value::Str(LuaStr::concat(&a, &b)));
    }
    let mut h = metatag(rt, lhs, &rt.tags.concat);
    if h.is_nil() {
        h = metatag(rt, rhs, &rt.tags.concat);
        if h.is_nil() {
            return Err(LuaError::runtime(format!(
                "attempt to concatenate {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
    }
    Ok(invoke_value(rt, &h, Varargs::pair(lhs.clone(), rhs.clone()))?.arg1())
}

/// Length: string byte count, or table border; `__len` consulted for
/// tables first and required for any other type.
pub fn len(rt: &Runtime, v: &Value) -> Result<Value, LuaError> {
    match v {
        Value::Str(s) => Ok(Value::int(s.len() as i64)),
        Value::Table(t) => {
            let h = metatag(rt, v, &rt.tags.len);
            if h.is_truthy() {
                Ok(invoke_value(rt, &h, Varargs::one(v.clone()))?.arg1())
            } else {
                Ok(Value::int(t.raw_len() as i64))
            }
        }
        _ => {
            let h = metatag(rt, v, &rt.tags.len);
            if h.is_nil() {
                Err(LuaError::runtime(format!(
                    "attempt to get length of {}",
                    v.type_name()
                )))
            } else {
                Ok(invoke_value(rt, &h, Varargs::one(v.clone()))?.arg1())
            }
        }
    }
}

/// Indexed read with `__index` chain processing.
pub fn gettable(rt: &Runtime, t: &Value, key: &Value) -> Result<Value, LuaError> {
    let mut t = t.clone();
    for _ in 0..MAX_TAG_LOOP {
        let tm = match &t {
            Value::Table(tbl) => {
                let res = tbl.raw_get(key);
                let tm = metatag(rt, &t, &rt.tags.index);
                if !res.is_nil() || tm.is_nil() {
                    return Ok(res);
                }
                tm
            }
            _ => {
                let tm = metatag(rt, &t, &rt.tags.index);
                if tm.is_nil() {
                    return Err(LuaError::runtime(format!(
                        "attempt to index ? (a {} value)",
                        t.type_name()
                    )));
                }
                tm
            }
        };
        if matches!(tm, Value::Function(_)) {
            return Ok(invoke_value(rt, &tm, Varargs::pair(t, key.clone()))?.arg1());
        }
        t = tm;
    }
    Err(LuaError::runtime("loop in gettable"))
}

/// Indexed write with `__newindex` chain processing.
pub fn settable(rt: &Runtime, t: &Value, key: Value, value: Value) -> Result<(), LuaError> {
    let mut t = t.clone();
    for _ in 0..MAX_TAG_LOOP {
        let tm = match &t {
            Value::Table(tbl) => {
                let tm = metatag(rt, &t, &rt.tags.newindex);
                if !tbl.raw_get(&key).is_nil() || tm.is_nil() {
                    return tbl.raw_set(key, value);
                }
                tm
            }
            _ => {
                let tm = metatag(rt, &t, &rt.tags.newindex);
                if tm.is_nil() {
                    return Err(LuaError::runtime(format!(
                        "attempt to index ? (a {} value)",
                        t.type_name()
                    )));
                }
                tm
            }
        };
        if matches!(tm, Value::Function(_)) {
            invoke_value(rt, &tm, Varargs::from_vec(vec![t, key, value]))?;
            return Ok(());
        }
        t = tm;
    }
    Err(LuaError::runtime("loop in settable"))
}

/// Coerce a value to a number per the language rules, or `None`.
pub fn tonumber(v: &Value) -> Option<Value> {
    match v {
        Value::Int(_) | Value::Float(_) => Some(v.clone()),
        Value::Str(s) => {
            let d = s.scan_number();
            if d.is_nan() {
                None
            } else {
                Some(Value::number(d))
            }
        }
        _ => None,
    }
}

/// Check a value is a number (with string coercion), or raise `msg`.
pub fn check_number(v: &Value, msg: &str) -> Result<Value, LuaError> {
    tonumber(v).ok_or_else(|| LuaError::runtime(msg.to_string()))
}

// Resolve a value into a directly invokable callable, applying a single
// level of `__call` (the handler must itself be a function).
fn resolve_callable(
    rt: &Runtime,
    f: &Value,
    args: Varargs,
) -> Result<(Arc<dyn Callable>, Varargs), LuaError> {
    if let Value::Function(c) = f {
        return Ok((Arc::clone(c), args));
    }
    let h = metatag(rt, f, &rt.tags.call);
    if let Value::Function(c) = h {
        return Ok((c, Varargs::prepend(f.clone(), args)));
    }
    Err(LuaError::runtime(format!(
        "attempt to call {}",
        f.type_name()
    )))
}

/// One dispatch step of an arbitrary callee value. Used by the tail-call
/// trampoline.
pub fn dispatch_call(rt: &Runtime, f: &Value, args: Varargs) -> Result<Dispatch, LuaError> {
    let (c, args) = resolve_callable(rt, f, args)?;
    c.on_invoke(rt, args)
}

/// Invoke an arbitrary value as a function, driving deferred tail calls
/// to completion so tail-call chains never grow the native stack.
pub fn invoke_value(rt: &Runtime, f: &Value, args: Varargs) -> Result<Varargs, LuaError> {
    let mut step = dispatch_call(rt, f, args)?;
    loop {
        match step {
            Dispatch::Data(v) => return Ok(v),
            Dispatch::TailCall(f, a) => step = dispatch_call(rt, &f, a)?,
        }
    }
}

/// Call a value with no arguments, returning the first result. Functions
/// take their fixed-arity fast path; `__call` values go through the
/// general dispatcher.
pub fn call_value0(rt: &Runtime, f: &Value) -> Result<Value, LuaError> {
    match f {
        Value::Function(c) => c.call0(rt),
        _ => Ok(invoke_value(rt, f, Varargs::empty())?.arg1()),
    }
}

/// Call a value with one argument, returning the first result.
pub fn call_value1(rt: &Runtime, f: &Value, a: Value) -> Result<Value, LuaError> {
    match f {
        Value::Function(c) => c.call1(rt, a),
        _ => Ok(invoke_value(rt, f, Varargs::one(a))?.arg1()),
    }
}

/// Call a value with two arguments, returning the first result.
pub fn call_value2(rt: &Runtime, f: &Value, a: Value, b: Value) -> Result<Value, LuaError> {
    match f {
        Value::Function(c) => c.call2(rt, a, b),
        _ => Ok(invoke_value(rt, f, Varargs::pair(a, b))?.arg1()),
    }
}

/// Call a value with three arguments, returning the first result.
pub fn call_value3(
    rt: &Runtime,
    f: &Value,
    a: Value,
    b: Value,
    c: Value,
) -> Result<Value, LuaError> {
    match f {
        Value::Function(c2) => c2.call3(rt, a, b, c),
        _ => Ok(invoke_value(rt, f, Varargs::from_vec(vec![a, b, c]))?.arg1()),
    }
}
