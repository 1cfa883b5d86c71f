//! The fetch/decode/execute loop.
//!
//! One call to [`Closure::execute`] runs one activation: a program
//! counter over the prototype's instruction stream, a register frame
//! sized to the declared maximum, and a `top` marker for the
//! variable-arity call/return/vararg instructions. Normal instructions
//! advance the counter by one; jumps add a signed offset.
//!
//! Tail calls never recurse: the loop returns a deferred
//! [`Dispatch::TailCall`] to its caller's trampoline, so chains of tail
//! calls run in constant native stack space.
//!
//! Every exit path, normal or error, closes the activation's still-open
//! upvalues; errors additionally pick up a `source:line` location from
//! debug info at the innermost frame that has it, and give the installed
//! error handler one chance to transform the message.

use std::sync::Arc;

use bytecode_system::opcode::*;
use core_types::{ops, Callable, Dispatch, ErrorKind, LuaError, Runtime, Table, Value, Varargs};
use tracing::trace;

use crate::closure::Closure;
use crate::frame::Frame;
use crate::upvalue::Upvalue;

impl Closure {
    /// Execute this closure's instruction stream against `frame`.
    ///
    /// Returns the activation's results, or a deferred tail call for the
    /// caller's trampoline to continue.
    pub(crate) fn execute(
        &self,
        rt: &Runtime,
        frame: &Arc<Frame>,
        varargs: Varargs,
    ) -> Result<Dispatch, LuaError> {
        // upvalues are only possible when closures create closures
        let mut open_upvalues: Vec<Option<Arc<Upvalue>>> = if self.proto.protos.is_empty() {
            Vec::new()
        } else {
            vec![None; frame.len()]
        };

        let hooks = rt.debug_hooks();
        if let Some(h) = &hooks {
            h.on_call(&self.name(), &varargs);
        }

        let mut last_pc = 0usize;
        let result = self.run(rt, frame, &varargs, &mut open_upvalues, &mut last_pc);

        // unconditional cleanup: close every still-open upvalue on both
        // the normal and the error path
        for u in open_upvalues.iter().flatten() {
            u.close();
        }
        if let Some(h) = &hooks {
            h.on_return();
        }

        result.map_err(|e| self.decorate_error(rt, e, last_pc))
    }

    fn run(
        &self,
        rt: &Runtime,
        frame: &Arc<Frame>,
        varargs: &Varargs,
        open_upvalues: &mut [Option<Arc<Upvalue>>],
        last_pc: &mut usize,
    ) -> Result<Dispatch, LuaError> {
        let code = &self.proto.code;
        let k = &self.proto.constants;
        let hooks = rt.debug_hooks();

        let mut pc = 0usize;
        let mut top = 0usize;
        let mut v = Varargs::empty();

        // RK operand: register, or constant when the high bit is set
        let rk = |x: u32| -> Value {
            if is_k(x) {
                k[index_k(x) as usize].clone()
            } else {
                frame.get(x as usize)
            }
        };

        loop {
            *last_pc = pc;
            if let Some(h) = &hooks {
                h.on_instruction(pc, top);
            }

            let i = code[pc];
            let a = get_a(i) as usize;

            match get_opcode(i) {
                OP_MOVE => {
                    frame.set(a, frame.get(get_b(i) as usize));
                }

                OP_LOADK => {
                    frame.set(a, k[get_bx(i) as usize].clone());
                }

                OP_LOADKX => {
                    pc += 1;
                    frame.set(a, k[get_ax(code[pc]) as usize].clone());
                }

                OP_LOADBOOL => {
                    frame.set(a, Value::Bool(get_b(i) != 0));
                    if get_c(i) != 0 {
                        pc += 1; // skip next instruction
                    }
                }

                OP_LOADNIL => {
                    let b = get_b(i) as usize;
                    for j in 0..=b {
                        frame.set(a + j, Value::Nil);
                    }
                }

                OP_GETUPVAL => {
                    frame.set(a, self.upvalues[get_b(i) as usize].get());
                }

                OP_GETTABUP => {
                    let t = self.upvalues[get_b(i) as usize].get();
                    let key = rk(get_c(i));
                    frame.set(a, ops::gettable(rt, &t, &key)?);
                }

                OP_GETTABLE => {
                    let t = frame.get(get_b(i) as usize);
                    let key = rk(get_c(i));
                    frame.set(a, ops::gettable(rt, &t, &key)?);
                }

                OP_SETTABUP => {
                    let t = self.upvalues[a].get();
                    ops::settable(rt, &t, rk(get_b(i)), rk(get_c(i)))?;
                }

                OP_SETUPVAL => {
                    self.upvalues[get_b(i) as usize].set(frame.get(a));
                }

                OP_SETTABLE => {
                    let t = frame.get(a);
                    ops::settable(rt, &t, rk(get_b(i)), rk(get_c(i)))?;
                }

                OP_NEWTABLE => {
                    let narray = get_b(i) as usize;
                    let nhash = get_c(i) as usize;
                    frame.set(a, Value::table(Table::with_capacity(narray, nhash)));
                }

                OP_SELF => {
                    let o = frame.get(get_b(i) as usize);
                    frame.set(a + 1, o.clone());
                    let key = rk(get_c(i));
                    frame.set(a, ops::gettable(rt, &o, &key)?);
                }

                OP_ADD => frame.set(a, ops::add(rt, &rk(get_b(i)), &rk(get_c(i)))?),
                OP_SUB => frame.set(a, ops::sub(rt, &rk(get_b(i)), &rk(get_c(i)))?),
                OP_MUL => frame.set(a, ops::mul(rt, &rk(get_b(i)), &rk(get_c(i)))?),
                OP_DIV => frame.set(a, ops::div(rt, &rk(get_b(i)), &rk(get_c(i)))?),
                OP_MOD => frame.set(a, ops::modulo(rt, &rk(get_b(i)), &rk(get_c(i)))?),
                OP_POW => frame.set(a, ops::pow(rt, &rk(get_b(i)), &rk(get_c(i)))?),

                OP_UNM => frame.set(a, ops::neg(rt, &frame.get(get_b(i) as usize))?),
                OP_NOT => frame.set(a, ops::not(&frame.get(get_b(i) as usize))),
                OP_LEN => frame.set(a, ops::len(rt, &frame.get(get_b(i) as usize))?),

                OP_CONCAT => {
                    let b = get_b(i) as usize;
                    let c = get_c(i) as usize;
                    // fold right-to-left so metamethods associate right
                    let mut acc = frame.get(c);
                    let mut j = c;
                    while j > b {
                        j -= 1;
                        acc = ops::concat(rt, &frame.get(j), &acc)?;
                    }
                    frame.set(a, acc);
                }

                OP_JMP => {
                    pc = offset_pc(pc, get_sbx(i));
                    if a > 0 {
                        close_from(open_upvalues, a - 1);
                    }
                }

                OP_EQ => {
                    if ops::eq(rt, &rk(get_b(i)), &rk(get_c(i)))? != (a != 0) {
                        pc += 1;
                    }
                }

                OP_LT => {
                    if ops::lt(rt, &rk(get_b(i)), &rk(get_c(i)))? != (a != 0) {
                        pc += 1;
                    }
                }

                OP_LE => {
                    if ops::le(rt, &rk(get_b(i)), &rk(get_c(i)))? != (a != 0) {
                        pc += 1;
                    }
                }

                OP_TEST => {
                    if frame.get(a).is_truthy() != (get_c(i) != 0) {
                        pc += 1;
                    }
                }

                OP_TESTSET => {
                    let o = frame.get(get_b(i) as usize);
                    if o.is_truthy() != (get_c(i) != 0) {
                        pc += 1;
                    } else {
                        frame.set(a, o);
                    }
                }

                OP_CALL => {
                    let b = get_b(i);
                    let c = get_c(i);
                    let f = frame.get(a);
                    match (b, c) {
                        // variable-result shapes keep `top` and the
                        // pending value list current
                        (1, 0) => {
                            v = ops::invoke_value(rt, &f, Varargs::empty())?;
                            top = a + v.narg();
                        }
                        (2, 0) => {
                            v = ops::invoke_value(rt, &f, Varargs::one(frame.get(a + 1)))?;
                            top = a + v.narg();
                        }
                        // fixed-arity fast paths
                        (1, 1) => {
                            ops::call_value0(rt, &f)?;
                        }
                        (2, 1) => {
                            ops::call_value1(rt, &f, frame.get(a + 1))?;
                        }
                        (3, 1) => {
                            ops::call_value2(rt, &f, frame.get(a + 1), frame.get(a + 2))?;
                        }
                        (4, 1) => {
                            ops::call_value3(
                                rt,
                                &f,
                                frame.get(a + 1),
                                frame.get(a + 2),
                                frame.get(a + 3),
                            )?;
                        }
                        (1, 2) => {
                            let r = ops::call_value0(rt, &f)?;
                            frame.set(a, r);
                        }
                        (2, 2) => {
                            let r = ops::call_value1(rt, &f, frame.get(a + 1))?;
                            frame.set(a, r);
                        }
                        (3, 2) => {
                            let r =
                                ops::call_value2(rt, &f, frame.get(a + 1), frame.get(a + 2))?;
                            frame.set(a, r);
                        }
                        (4, 2) => {
                            let r = ops::call_value3(
                                rt,
                                &f,
                                frame.get(a + 1),
                                frame.get(a + 2),
                                frame.get(a + 3),
                            )?;
                            frame.set(a, r);
                        }
                        _ => {
                            let args = if b > 0 {
                                Varargs::from_vec(frame.slice(a + 1, b as usize - 1))
                            } else {
                                // exact count from the previous top
                                let fixed = top - v.narg() - (a + 1);
                                Varargs::from_slice(&frame.slice(a + 1, fixed), 0, fixed, &v)
                            };
                            let results = ops::invoke_value(rt, &f, args)?;
                            if c > 0 {
                                for j in 0..(c as usize - 1) {
                                    frame.set(a + j, results.arg(j + 1));
                                }
                                v = Varargs::empty();
                            } else {
                                top = a + results.narg();
                                v = results;
                            }
                        }
                    }
                }

                OP_TAILCALL => {
                    let f = frame.get(a);
                    let b = get_b(i);
                    let args = match b {
                        1 => Varargs::empty(),
                        2 => Varargs::one(frame.get(a + 1)),
                        3 => Varargs::pair(frame.get(a + 1), frame.get(a + 2)),
                        4 => Varargs::from_vec(frame.slice(a + 1, 3)),
                        _ => {
                            if b > 0 {
                                Varargs::from_vec(frame.slice(a + 1, b as usize - 1))
                            } else {
                                let fixed = top - v.narg() - (a + 1);
                                Varargs::from_slice(&frame.slice(a + 1, fixed), 0, fixed, &v)
                            }
                        }
                    };
                    trace!(callee = %f, "tail call");
                    return Ok(Dispatch::TailCall(f, args));
                }

                OP_RETURN => {
                    let b = get_b(i);
                    return Ok(Dispatch::Data(match b {
                        0 => {
                            let fixed = top - v.narg() - a;
                            Varargs::from_slice(&frame.slice(a, fixed), 0, fixed, &v)
                        }
                        1 => Varargs::empty(),
                        2 => Varargs::one(frame.get(a)),
                        _ => Varargs::from_vec(frame.slice(a, b as usize - 1)),
                    }));
                }

                OP_FORLOOP => {
                    let limit = frame.get(a + 1);
                    let step = frame.get(a + 2);
                    let idx = ops::add(rt, &step, &frame.get(a))?;
                    let ascending = step.as_float().unwrap_or(f64::NAN) > 0.0;
                    let cont = if ascending {
                        ops::le(rt, &idx, &limit)?
                    } else {
                        ops::le(rt, &limit, &idx)?
                    };
                    if cont {
                        frame.set(a, idx.clone());
                        frame.set(a + 3, idx);
                        pc = offset_pc(pc, get_sbx(i));
                    }
                }

                OP_FORPREP => {
                    let init = ops::check_number(
                        &frame.get(a),
                        "'for' initial value must be a number",
                    )?;
                    let limit =
                        ops::check_number(&frame.get(a + 1), "'for' limit must be a number")?;
                    let step =
                        ops::check_number(&frame.get(a + 2), "'for' step must be a number")?;
                    // pre-subtract the step so the loop instruction can
                    // unconditionally add it; zero-iteration loops never
                    // run the body
                    frame.set(a, ops::sub(rt, &init, &step)?);
                    frame.set(a + 1, limit);
                    frame.set(a + 2, step);
                    pc = offset_pc(pc, get_sbx(i));
                }

                OP_TFORCALL => {
                    let f = frame.get(a);
                    let results = ops::invoke_value(
                        rt,
                        &f,
                        Varargs::pair(frame.get(a + 1), frame.get(a + 2)),
                    )?;
                    let c = get_c(i) as usize;
                    for j in 0..c {
                        frame.set(a + 3 + j, results.arg(j + 1));
                    }
                    v = Varargs::empty();
                }

                OP_TFORLOOP => {
                    let control = frame.get(a + 1);
                    if !control.is_nil() {
                        frame.set(a, control);
                        pc = offset_pc(pc, get_sbx(i));
                    }
                }

                OP_SETLIST => {
                    let mut c = get_c(i) as usize;
                    if c == 0 {
                        pc += 1;
                        c = get_ax(code[pc]) as usize;
                    }
                    let offset = (c - 1) * LFIELDS_PER_FLUSH;
                    let t = match frame.get(a) {
                        Value::Table(t) => t,
                        other => {
                            return Err(LuaError::runtime(format!(
                                "attempt to index ? (a {} value)",
                                other.type_name()
                            )))
                        }
                    };
                    let b = get_b(i) as usize;
                    if b == 0 {
                        let b = top - a - 1;
                        let m = b - v.narg();
                        for j in 1..=m {
                            t.raw_set_int((offset + j) as i32, frame.get(a + j));
                        }
                        for j in m + 1..=b {
                            t.raw_set_int((offset + j) as i32, v.arg(j - m));
                        }
                    } else {
                        t.presize(offset + b, 0);
                        for j in 1..=b {
                            t.raw_set_int((offset + j) as i32, frame.get(a + j));
                        }
                    }
                }

                OP_CLOSURE => {
                    let new_proto = Arc::clone(&self.proto.protos[get_bx(i) as usize]);
                    let mut cells = Vec::with_capacity(new_proto.upvalues.len());
                    for desc in new_proto.upvalues.iter() {
                        if desc.in_stack {
                            // capture a register of this activation
                            cells.push(find_upvalue(frame, desc.index as usize, open_upvalues));
                        } else {
                            // share this closure's own upvalue
                            cells.push(Arc::clone(&self.upvalues[desc.index as usize]));
                        }
                    }
                    frame.set(a, Value::function(Closure::new(new_proto, cells)));
                }

                OP_VARARG => {
                    let b = get_b(i) as usize;
                    if b == 0 {
                        top = a + varargs.narg();
                        v = varargs.clone();
                    } else {
                        for j in 1..b {
                            frame.set(a + j - 1, varargs.arg(j));
                        }
                    }
                }

                OP_EXTRAARG => panic!("unexecutable opcode: EXTRAARG"),

                op => panic!("illegal opcode: {}", op),
            }

            pc += 1;
        }
    }

    // attach the source location once, at the innermost frame that has
    // debug info, then let the installed error handler transform the
    // message
    fn decorate_error(&self, rt: &Runtime, mut e: LuaError, pc: usize) -> LuaError {
        if e.kind == ErrorKind::Orphaned || e.file_line.is_some() {
            return e;
        }
        let line = match self.proto.line_at(pc) {
            Some(line) => line,
            None => return e,
        };
        e.file_line = Some(format!("{}:{}", self.proto.short_source(), line));

        if let Some(handler) = rt.error_handler() {
            // the handler is removed while it runs, so an error inside
            // it cannot recurse
            rt.set_error_handler(None);
            let transformed = ops::invoke_value(rt, &handler, Varargs::one(e.message.clone()));
            rt.set_error_handler(Some(handler));
            e.message = match transformed {
                Ok(out) => out.arg1(),
                Err(_) => Value::from("error in error handling"),
            };
        } else if let Some(hooks) = rt.debug_hooks() {
            if let Some(tb) = hooks.traceback(e.level) {
                e.traceback = Some(format!("{}\n{}", e.text(), tb));
            }
        }
        e
    }
}

fn offset_pc(pc: usize, sbx: i32) -> usize {
    (pc as i64 + sbx as i64) as usize
}

// close (and forget) every open upvalue at or above `bound`
fn close_from(open_upvalues: &mut [Option<Arc<Upvalue>>], bound: usize) {
    for slot in open_upvalues.iter_mut() {
        if let Some(u) = slot {
            if u.open_index().is_some_and(|i| i >= bound) {
                u.close();
                *slot = None;
            }
        }
    }
}

// reuse an already-open upvalue for this register, or open a new one in
// the first free slot
fn find_upvalue(
    frame: &Arc<Frame>,
    index: usize,
    open_upvalues: &mut [Option<Arc<Upvalue>>],
) -> Arc<Upvalue> {
    for slot in open_upvalues.iter().flatten() {
        if slot.open_index() == Some(index) {
            return Arc::clone(slot);
        }
    }
    for slot in open_upvalues.iter_mut() {
        if slot.is_none() {
            let u = Upvalue::open(frame, index);
            *slot = Some(Arc::clone(&u));
            return u;
        }
    }
    // one slot exists per register, so this is unreachable unless the
    // interpreter's own bookkeeping is broken
    panic!("no space for upvalue");
}
