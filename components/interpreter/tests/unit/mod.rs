//! Unit test suite for the interpreter: debug hook surface and closure
//! plumbing that the integration suites exercise only indirectly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytecode_system::opcode::*;
use bytecode_system::Prototype;
use core_types::{ops, DebugHooks, Value, Varargs};
use interpreter::{Closure, Globals};

#[derive(Default)]
struct CountingHooks {
    calls: AtomicUsize,
    instructions: AtomicUsize,
    returns: AtomicUsize,
}

impl DebugHooks for CountingHooks {
    fn on_call(&self, _name: &str, _args: &Varargs) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn on_instruction(&self, _pc: usize, _top: usize) {
        self.instructions.fetch_add(1, Ordering::Relaxed);
    }

    fn on_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }
}

fn two_instruction_proto() -> Prototype {
    Prototype {
        constants: vec![Value::Int(1)],
        code: vec![abx(OP_LOADK, 0, 0), abc(OP_RETURN, 0, 2, 0)],
        max_stack_size: 1,
        ..Prototype::default()
    }
}

#[test]
fn test_debug_hooks_receive_notifications() {
    let g = Globals::new();
    let hooks = Arc::new(CountingHooks::default());
    g.runtime.set_debug_hooks(Some(Arc::clone(&hooks) as Arc<dyn DebugHooks>));

    let f = g
        .load_prototype_value(Arc::new(two_instruction_proto()), "hooked")
        .unwrap();
    ops::invoke_value(&g.runtime, &f, Varargs::empty()).unwrap();

    assert_eq!(hooks.calls.load(Ordering::Relaxed), 1);
    assert_eq!(hooks.instructions.load(Ordering::Relaxed), 2);
    assert_eq!(hooks.returns.load(Ordering::Relaxed), 1);
}

#[test]
fn test_hooks_removable() {
    let g = Globals::new();
    let hooks = Arc::new(CountingHooks::default());
    g.runtime.set_debug_hooks(Some(Arc::clone(&hooks) as Arc<dyn DebugHooks>));
    g.runtime.set_debug_hooks(None);

    let f = g
        .load_prototype_value(Arc::new(two_instruction_proto()), "unhooked")
        .unwrap();
    ops::invoke_value(&g.runtime, &f, Varargs::empty()).unwrap();
    assert_eq!(hooks.instructions.load(Ordering::Relaxed), 0);
}

#[test]
fn test_closure_name_includes_source_and_line() {
    let proto = Prototype {
        source: core_types::LuaStr::from_slice(b"@m.lua"),
        line_defined: 12,
        ..two_instruction_proto()
    };
    let c = Closure::with_env(Arc::new(proto), Value::Nil);
    assert_eq!(core_types::Callable::name(&c), "m.lua:12");
}

#[test]
fn test_with_env_seeds_first_upvalue() {
    let proto = Prototype {
        upvalues: vec![bytecode_system::UpvalueDesc {
            name: None,
            in_stack: true,
            index: 0,
        }],
        ..two_instruction_proto()
    };
    let env = Value::Int(7); // any value can serve as an environment slot
    let c = Closure::with_env(Arc::new(proto), env.clone());
    assert_eq!(c.upvalue(0).get(), env);
}
