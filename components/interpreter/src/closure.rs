//! Executable closures.

use std::sync::Arc;

use bytecode_system::Prototype;
use core_types::{Callable, Dispatch, LuaError, Runtime, Value, Varargs};

use crate::frame::Frame;
use crate::upvalue::Upvalue;

/// A [`Prototype`] bound to its upvalue cells: an executable function
/// value.
///
/// Closures are created by the `CLOSURE` instruction, or directly when
/// loading a top-level chunk, in which case the environment value is
/// seeded into the first upvalue.
pub struct Closure {
    /// The compiled-function template this closure executes.
    pub proto: Arc<Prototype>,
    pub(crate) upvalues: Vec<Arc<Upvalue>>,
}

impl Closure {
    /// Bind a prototype to a full set of upvalue cells.
    ///
    /// # Panics
    /// Panics when the cell count does not match the prototype's
    /// descriptor count; the instantiation site controls both.
    pub fn new(proto: Arc<Prototype>, upvalues: Vec<Arc<Upvalue>>) -> Closure {
        assert_eq!(
            proto.upvalues.len(),
            upvalues.len(),
            "upvalue cell count must match descriptors"
        );
        Closure { proto, upvalues }
    }

    /// Bind a top-level prototype, writing `env` into the first upvalue
    /// (the environment) when the prototype has any upvalues.
    pub fn with_env(proto: Arc<Prototype>, env: Value) -> Closure {
        let n = proto.upvalues.len();
        let mut upvalues = Vec::with_capacity(n);
        if n > 0 {
            upvalues.push(Upvalue::closed(env));
            upvalues.extend((1..n).map(|_| Upvalue::closed(Value::Nil)));
        }
        Closure { proto, upvalues }
    }

    /// The cell for upvalue `i`.
    pub fn upvalue(&self, i: usize) -> &Arc<Upvalue> {
        &self.upvalues[i]
    }

    fn fresh_frame(&self) -> Arc<Frame> {
        Frame::new(self.proto.max_stack_size as usize)
    }

    // run to completion, driving a deferred tail call if one comes back
    fn run_to_completion(
        &self,
        rt: &Runtime,
        frame: &Arc<Frame>,
        varargs: Varargs,
    ) -> Result<Varargs, LuaError> {
        match self.execute(rt, frame, varargs)? {
            Dispatch::Data(v) => Ok(v),
            Dispatch::TailCall(f, a) => core_types::ops::invoke_value(rt, &f, a),
        }
    }
}

impl Callable for Closure {
    fn on_invoke(&self, rt: &Runtime, args: Varargs) -> Result<Dispatch, LuaError> {
        let frame = self.fresh_frame();
        let num_params = self.proto.num_params as usize;
        for i in 0..num_params {
            frame.set(i, args.arg(i + 1));
        }
        let varargs = if self.proto.is_vararg != 0 {
            args.subargs(num_params + 1)
        } else {
            Varargs::empty()
        };
        self.execute(rt, &frame, varargs)
    }

    fn name(&self) -> String {
        self.proto.to_string()
    }

    // fixed-arity entry points place arguments straight into registers
    // without building an argument list

    fn call0(&self, rt: &Runtime) -> Result<Value, LuaError> {
        let frame = self.fresh_frame();
        Ok(self.run_to_completion(rt, &frame, Varargs::empty())?.arg1())
    }

    fn call1(&self, rt: &Runtime, a: Value) -> Result<Value, LuaError> {
        let frame = self.fresh_frame();
        let varargs = match self.proto.num_params {
            0 if self.proto.is_vararg != 0 => Varargs::one(a),
            0 => Varargs::empty(),
            _ => {
                frame.set(0, a);
                Varargs::empty()
            }
        };
        Ok(self.run_to_completion(rt, &frame, varargs)?.arg1())
    }

    fn call2(&self, rt: &Runtime, a: Value, b: Value) -> Result<Value, LuaError> {
        let frame = self.fresh_frame();
        let mut extra = Vec::new();
        match self.proto.num_params {
            0 => extra = vec![a, b],
            1 => {
                frame.set(0, a);
                extra = vec![b];
            }
            _ => {
                frame.set(0, a);
                frame.set(1, b);
            }
        }
        let varargs = if self.proto.is_vararg != 0 {
            Varargs::from_vec(extra)
        } else {
            Varargs::empty()
        };
        Ok(self.run_to_completion(rt, &frame, varargs)?.arg1())
    }

    fn call3(&self, rt: &Runtime, a: Value, b: Value, c: Value) -> Result<Value, LuaError> {
        let frame = self.fresh_frame();
        let mut extra = Vec::new();
        match self.proto.num_params {
            0 => extra = vec![a, b, c],
            1 => {
                frame.set(0, a);
                extra = vec![b, c];
            }
            2 => {
                frame.set(0, a);
                frame.set(1, b);
                extra = vec![c];
            }
            _ => {
                frame.set(0, a);
                frame.set(1, b);
                frame.set(2, c);
            }
        }
        let varargs = if self.proto.is_vararg != 0 {
            Varargs::from_vec(extra)
        } else {
            Varargs::empty()
        };
        Ok(self.run_to_completion(rt, &frame, varargs)?.arg1())
    }
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Closure({})", self.proto)
    }
}
