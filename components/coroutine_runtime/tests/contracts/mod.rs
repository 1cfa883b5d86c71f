//! Contract compliance tests for the coroutine scheduler.
//!
//! These pin the resume/yield round-trip contract: argument delivery,
//! `(true, ...)` / `(false, message)` result shapes, and strict
//! alternation of control.

use core_types::{NativeFunction, Runtime, Value, Varargs};
use coroutine_runtime::{yield_current, LuaThread};

#[test]
fn test_round_trip_contract() {
    let rt = Runtime::new();
    // body: receives (a, b); yields (a+b, a-b); returns "done"
    let co = LuaThread::new(NativeFunction::value("body", |rt, args| {
        let (a, b) = (args.arg(1), args.arg(2));
        let sum = core_types::ops::add(rt, &a, &b)?;
        let diff = core_types::ops::sub(rt, &a, &b)?;
        yield_current(rt, Varargs::pair(sum, diff))?;
        Ok(Varargs::one(Value::from("done")))
    }));

    // first resume delivers (a, b) as the body's arguments
    let out = co.resume(&rt, Varargs::pair(Value::Int(7), Value::Int(2)));
    assert_eq!(out.arg(1), Value::Bool(true));
    assert_eq!(out.arg(2), Value::Int(9));
    assert_eq!(out.arg(3), Value::Int(5));

    // completion value
    let out = co.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(1), Value::Bool(true));
    assert_eq!(out.arg(2), Value::from("done"));

    // resuming a dead coroutine is a failure result, not an error
    let out = co.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(1), Value::Bool(false));
    assert_eq!(out.arg(2), Value::from("cannot resume dead coroutine"));
}

#[test]
fn test_results_observed_only_after_park() {
    let rt = Runtime::new();
    // the resumer must never observe a yield value before the yielding
    // side has fully parked; run many hand-offs to shake out races
    let co = LuaThread::new(NativeFunction::value("pingpong", |rt, _| {
        let mut n = 0i64;
        loop {
            let back = yield_current(rt, Varargs::one(Value::int(n)))?;
            if back.arg1().is_nil() {
                return Ok(Varargs::one(Value::from("bye")));
            }
            n += 1;
        }
    }));
    for expect in 0..200 {
        let out = co.resume(&rt, Varargs::one(Value::Bool(true)));
        assert_eq!(out.arg(1), Value::Bool(true));
        assert_eq!(out.arg(2), Value::Int(expect));
    }
    let out = co.resume(&rt, Varargs::one(Value::Nil));
    assert_eq!(out.arg(2), Value::from("bye"));
}

#[test]
fn test_error_in_body_does_not_corrupt_other_coroutines() {
    let rt = Runtime::new();
    let bad = LuaThread::new(NativeFunction::value("bad", |_rt, _| {
        Err(core_types::LuaError::runtime("kaboom"))
    }));
    let good = LuaThread::new(NativeFunction::value("good", |rt, args| {
        let back = yield_current(rt, args)?;
        Ok(back)
    }));

    good.resume(&rt, Varargs::one(Value::Int(1)));
    let out = bad.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(1), Value::Bool(false));
    assert_eq!(out.arg(2), Value::from("kaboom"));

    // the healthy coroutine is unaffected
    let out = good.resume(&rt, Varargs::one(Value::Int(2)));
    assert_eq!(out.arg(1), Value::Bool(true));
    assert_eq!(out.arg(2), Value::Int(2));
}
