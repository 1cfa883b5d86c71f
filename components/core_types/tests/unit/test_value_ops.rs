//! Unit tests for operator dispatch edge cases.

use core_types::{ops, NativeFunction, Runtime, Table, Value, Varargs};
use std::sync::Arc;

#[test]
fn test_arith_error_messages_name_both_types() {
    let rt = Runtime::new();
    let err = ops::add(&rt, &Value::Nil, &Value::Int(1)).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("__add"), "{text}");
    assert!(text.contains("nil"), "{text}");
    assert!(text.contains("number"), "{text}");
}

#[test]
fn test_arith_metamethod_prefers_left_operand() {
    let rt = Runtime::new();
    let left_mt = Arc::new(Table::new());
    left_mt
        .raw_set(
            rt.str_value("__add"),
            NativeFunction::value("left", |_rt, _| Ok(Varargs::one(Value::from("left")))),
        )
        .unwrap();
    let right_mt = Arc::new(Table::new());
    right_mt
        .raw_set(
            rt.str_value("__add"),
            NativeFunction::value("right", |_rt, _| Ok(Varargs::one(Value::from("right")))),
        )
        .unwrap();

    let a = Arc::new(Table::new());
    a.set_metatable(Some(Value::Table(left_mt)));
    let b = Arc::new(Table::new());
    b.set_metatable(Some(Value::Table(right_mt)));

    let out = ops::add(&rt, &Value::Table(a), &Value::Table(b)).unwrap();
    assert_eq!(out, Value::from("left"));
}

#[test]
fn test_metamethod_errors_forwarded_unchanged() {
    let rt = Runtime::new();
    let mt = Arc::new(Table::new());
    mt.raw_set(
        rt.str_value("__add"),
        NativeFunction::value("boom", |_rt, _| {
            Err(core_types::LuaError::runtime("inner failure"))
        }),
    )
    .unwrap();
    let t = Arc::new(Table::new());
    t.set_metatable(Some(Value::Table(mt)));
    let err = ops::add(&rt, &Value::Table(t), &Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "inner failure");
}

#[test]
fn test_eq_never_called_for_different_tags() {
    let rt = Runtime::new();
    assert!(!ops::eq(&rt, &Value::Int(1), &Value::from("1")).unwrap());
    assert!(!ops::eq(&rt, &Value::Nil, &Value::Bool(false)).unwrap());
}

#[test]
fn test_eq_numeric_across_subtypes() {
    let rt = Runtime::new();
    assert!(ops::eq(&rt, &Value::Int(2), &Value::Float(2.0)).unwrap());
    assert!(!ops::eq(&rt, &Value::Float(f64::NAN), &Value::Float(f64::NAN)).unwrap());
}

#[test]
fn test_shared_type_metatable_for_strings() {
    let rt = Runtime::new();
    let mt = Arc::new(Table::new());
    mt.raw_set(
        rt.str_value("__index"),
        NativeFunction::value("strindex", |_rt, args| {
            Ok(Varargs::one(Value::from(
                format!("{}!", args.arg(2)).as_str(),
            )))
        }),
    )
    .unwrap();
    *rt.type_metatables.string.lock() = Some(Value::Table(mt));
    let out = ops::gettable(&rt, &Value::from("s"), &Value::from("upper")).unwrap();
    assert_eq!(out, Value::from("upper!"));
}

#[test]
fn test_concat_number_formatting() {
    let rt = Runtime::new();
    assert_eq!(
        ops::concat(&rt, &Value::Float(1.5), &Value::from("")).unwrap(),
        Value::from("1.5")
    );
    assert_eq!(
        ops::concat(&rt, &Value::Float(2.0), &Value::from("")).unwrap(),
        Value::from("2")
    );
}

#[test]
fn test_tail_call_chain_runs_in_bounded_stack() {
    // a native "callable" that returns a deferred call to itself until a
    // countdown reaches zero; deep chains must not overflow the stack
    struct Countdown;
    impl core_types::Callable for Countdown {
        fn on_invoke(
            &self,
            _rt: &Runtime,
            args: Varargs,
        ) -> Result<core_types::Dispatch, core_types::LuaError> {
            let n = match args.arg1() {
                Value::Int(i) => i,
                _ => 0,
            };
            if n <= 0 {
                Ok(core_types::Dispatch::Data(Varargs::one(Value::from("done"))))
            } else {
                Ok(core_types::Dispatch::TailCall(
                    Value::function(Countdown),
                    Varargs::one(Value::Int(n - 1)),
                ))
            }
        }
    }
    let rt = Runtime::new();
    let out = ops::invoke_value(
        &rt,
        &Value::function(Countdown),
        Varargs::one(Value::Int(1_000_000)),
    )
    .unwrap();
    assert_eq!(out.arg1(), Value::from("done"));
}
