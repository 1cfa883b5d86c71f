//! Unit test suite for coroutine_runtime.

use std::sync::Arc;
use std::time::Duration;

use core_types::{NativeFunction, Runtime, Value, Varargs};
use coroutine_runtime::{set_orphan_check_interval_ms, yield_current, LuaThread, Status};

#[test]
fn test_multiple_yields_alternate_strictly() {
    let rt = Runtime::new();
    let co = LuaThread::new(NativeFunction::value("counter", |rt, _args| {
        for i in 1..=3 {
            yield_current(rt, Varargs::one(Value::Int(i)))?;
        }
        Ok(Varargs::one(Value::from("end")))
    }));
    for i in 1..=3 {
        let out = co.resume(&rt, Varargs::empty());
        assert_eq!(out.arg(1), Value::Bool(true));
        assert_eq!(out.arg(2), Value::Int(i));
    }
    let out = co.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(2), Value::from("end"));
    assert_eq!(co.status(), Status::Dead);
}

#[test]
fn test_yield_receives_next_resume_arguments() {
    let rt = Runtime::new();
    let co = LuaThread::new(NativeFunction::value("relay", |rt, first| {
        let second = yield_current(rt, Varargs::one(first.arg1()))?;
        Ok(Varargs::one(second.arg1()))
    }));
    let out = co.resume(&rt, Varargs::one(Value::Int(10)));
    assert_eq!(out.arg(2), Value::Int(10));
    let out = co.resume(&rt, Varargs::one(Value::Int(20)));
    assert_eq!(out.arg(2), Value::Int(20));
}

#[test]
fn test_nested_resume_marks_outer_normal() {
    let rt = Runtime::new();
    let inner = LuaThread::new(NativeFunction::value("inner", |_rt, args| {
        // while the inner coroutine runs, its resumer reports `normal`
        let name = match args.arg1() {
            Value::Thread(t) => t.status_name(),
            other => panic!("expected thread argument, got {:?}", other),
        };
        Ok(Varargs::one(Value::from(name)))
    }));

    let inner_for_body = Arc::clone(&inner);
    let outer = LuaThread::new(NativeFunction::value("outer", move |rt, _args| {
        let self_handle = rt.current_thread().expect("running inside a coroutine");
        let out = inner_for_body.resume(rt, Varargs::one(Value::Thread(self_handle)));
        Ok(out.subargs(2))
    }));

    let out = outer.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(1), Value::Bool(true));
    assert_eq!(out.arg(2), Value::from("normal"));
    assert_eq!(outer.status(), Status::Dead);
    assert_eq!(inner.status(), Status::Dead);
}

#[test]
fn test_current_thread_restored_after_nested_resume() {
    let rt = Runtime::new();
    let inner = LuaThread::new(NativeFunction::value("inner", |_rt, _args| {
        Ok(Varargs::empty())
    }));
    let inner_for_body = Arc::clone(&inner);
    let outer = LuaThread::new(NativeFunction::value("outer", move |rt, _args| {
        let before = rt.current_thread().expect("current set");
        inner_for_body.resume(rt, Varargs::empty());
        let after = rt.current_thread().expect("current restored");
        Ok(Varargs::one(Value::Bool(Arc::ptr_eq(&before, &after))))
    }));
    let out = outer.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(2), Value::Bool(true));
    assert!(rt.current_thread().is_none());
}

#[test]
fn test_resume_running_coroutine_fails() {
    let rt = Runtime::new();
    let co_cell: Arc<parking_lot::Mutex<Option<Arc<LuaThread>>>> =
        Arc::new(parking_lot::Mutex::new(None));
    let cell = Arc::clone(&co_cell);
    let co = LuaThread::new(NativeFunction::value("self-resume", move |rt, _args| {
        let me = cell.lock().clone().expect("handle installed");
        // resuming the coroutine that is currently running must fail
        Ok(me.resume(rt, Varargs::empty()))
    }));
    *co_cell.lock() = Some(Arc::clone(&co));
    let out = co.resume(&rt, Varargs::empty());
    assert_eq!(out.arg(1), Value::Bool(true));
    assert_eq!(out.arg(2), Value::Bool(false));
    assert_eq!(
        out.arg(3),
        Value::from("cannot resume non-suspended coroutine")
    );
    *co_cell.lock() = None;
}

#[test]
fn test_orphaned_coroutine_terminates_itself() {
    set_orphan_check_interval_ms(50);
    let rt = Runtime::new();
    let finished: Arc<parking_lot::Mutex<bool>> = Arc::new(parking_lot::Mutex::new(false));
    let flag = Arc::clone(&finished);
    let co = LuaThread::new(NativeFunction::value("parked", move |rt, args| {
        let r = yield_current(rt, args);
        // an orphaned wake-up propagates an error; the body never
        // completes normally
        *flag.lock() = r.is_ok();
        r
    }));
    co.resume(&rt, Varargs::empty());
    assert_eq!(co.status(), Status::Suspended);
    // drop the only handle; the worker must notice and exit on its own
    drop(co);
    std::thread::sleep(Duration::from_millis(500));
    assert!(!*finished.lock());
    set_orphan_check_interval_ms(5_000);
}
