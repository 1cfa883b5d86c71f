//! Coroutine threads and the resume/yield rendezvous.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use core_types::{ops, ErrorKind, LuaError, Runtime, ThreadHandle, Value, Varargs};

// How often a parked worker re-checks that its handle is still reachable.
static ORPHAN_CHECK_INTERVAL_MS: AtomicU64 = AtomicU64::new(5_000);

/// Set the poll interval used by parked coroutines to detect that their
/// script-visible handle is gone. Affects threads parked after the call.
pub fn set_orphan_check_interval_ms(ms: u64) {
    ORPHAN_CHECK_INTERVAL_MS.store(ms, Ordering::Relaxed);
}

/// Status of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Created, never resumed. Reported as `suspended`.
    Initial,
    /// Parked in a yield (or at its start), resumable.
    Suspended,
    /// Currently executing.
    Running,
    /// Resumed another coroutine and is waiting for it.
    Normal,
    /// Finished, errored out, or orphaned. Not resumable.
    Dead,
}

impl Status {
    fn name(self) -> &'static str {
        match self {
            Status::Initial | Status::Suspended => "suspended",
            Status::Running => "running",
            Status::Normal => "normal",
            Status::Dead => "dead",
        }
    }
}

enum Outcome {
    Yielded(Varargs),
    Finished(Varargs),
    Failed(LuaError),
}

struct Channel {
    status: Status,
    // resume payload travelling to the worker
    args: Option<Varargs>,
    // yield payload or completion travelling back to the resumer
    outcome: Option<Outcome>,
}

struct ThreadState {
    chan: Mutex<Channel>,
    // worker -> resumer: an outcome is available
    resumer_cv: Condvar,
    // resumer -> worker: arguments are available
    worker_cv: Condvar,
    body: Value,
    error_handler: Mutex<Option<Value>>,
}

/// A coroutine: an execution context suspended and resumed under script
/// control.
///
/// The backing native thread is spawned lazily by the first resume and
/// parks between resumes. Dropping the last [`Arc`] to a suspended
/// coroutine orphans it; the worker notices within the orphan-check
/// interval and terminates itself.
pub struct LuaThread {
    state: Arc<ThreadState>,
    weak_self: Weak<LuaThread>,
}

impl LuaThread {
    /// Create a coroutine around a callable body. The body receives the
    /// first resume's arguments as its arguments.
    pub fn new(body: Value) -> Arc<LuaThread> {
        Arc::new_cyclic(|weak_self| LuaThread {
            state: Arc::new(ThreadState {
                chan: Mutex::new(Channel {
                    status: Status::Initial,
                    args: None,
                    outcome: None,
                }),
                resumer_cv: Condvar::new(),
                worker_cv: Condvar::new(),
                body,
                error_handler: Mutex::new(None),
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// The coroutine's current status.
    pub fn status(&self) -> Status {
        self.state.chan.lock().status
    }

    /// Resume this coroutine with `args`.
    ///
    /// Blocks until the coroutine yields or finishes. Returns
    /// `(true, ...)` with the yielded/returned values on success, and
    /// `(false, message)` when the coroutine cannot be resumed or its
    /// body raised an uncaught error. Never raises.
    pub fn resume(self: &Arc<Self>, rt: &Runtime, args: Varargs) -> Varargs {
        {
            let mut ch = self.state.chan.lock();
            match ch.status {
                Status::Initial => {
                    self.spawn_worker(rt);
                }
                Status::Suspended => {}
                Status::Dead => {
                    return failure(rt, "cannot resume dead coroutine");
                }
                Status::Running | Status::Normal => {
                    return failure(rt, "cannot resume non-suspended coroutine");
                }
            }
            ch.status = Status::Running;
        }

        // the resumer becomes `normal` until control comes back; this
        // bookkeeping must be visible before the worker can take its
        // arguments
        let prev = rt.swap_current_thread(Some(self.clone() as Arc<dyn ThreadHandle>));
        if let Some(p) = prev.as_ref().and_then(as_lua_thread) {
            p.set_status(Status::Normal);
        }
        trace!(co = self.addr(), "resume");

        let outcome = {
            let mut ch = self.state.chan.lock();
            ch.args = Some(args);
            self.state.worker_cv.notify_one();
            while ch.outcome.is_none() {
                self.state.resumer_cv.wait(&mut ch);
            }
            ch.outcome.take().expect("outcome present")
        };

        rt.swap_current_thread(prev.clone());
        if let Some(p) = prev.as_ref().and_then(as_lua_thread) {
            p.set_status(Status::Running);
        }

        match outcome {
            Outcome::Yielded(v) | Outcome::Finished(v) => {
                Varargs::prepend(Value::Bool(true), v)
            }
            Outcome::Failed(e) => Varargs::pair(Value::Bool(false), e.message),
        }
    }

    // park the running coroutine, handing `args` to its resumer
    fn yield_values(
        state: &Arc<ThreadState>,
        weak: &Weak<LuaThread>,
        args: Varargs,
    ) -> Result<Varargs, LuaError> {
        {
            let mut ch = state.chan.lock();
            ch.status = Status::Suspended;
            ch.outcome = Some(Outcome::Yielded(args));
            state.resumer_cv.notify_one();
        }
        wait_for_resume(state, weak)
    }

    fn spawn_worker(self: &Arc<Self>, rt: &Runtime) {
        let state = Arc::clone(&self.state);
        let weak = self.weak_self.clone();
        let rt = rt.shared();
        std::thread::Builder::new()
            .name("coroutine".to_string())
            .spawn(move || worker_main(state, weak, rt))
            .expect("failed to spawn coroutine thread");
    }

    fn set_status(&self, status: Status) {
        self.state.chan.lock().status = status;
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }
}

impl ThreadHandle for LuaThread {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn status_name(&self) -> &'static str {
        self.status().name()
    }

    fn error_handler(&self) -> Option<Value> {
        self.state.error_handler.lock().clone()
    }

    fn set_error_handler(&self, handler: Option<Value>) {
        *self.state.error_handler.lock() = handler;
    }
}

impl std::fmt::Debug for LuaThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaThread")
            .field("status", &self.status())
            .finish()
    }
}

/// Yield the currently running coroutine with `args`.
///
/// Returns the arguments of the resume call that reactivates it. Raises
/// when called from the main thread, and raises the unrecoverable
/// orphaned signal when the coroutine's handle disappears while parked.
pub fn yield_current(rt: &Runtime, args: Varargs) -> Result<Varargs, LuaError> {
    let (state, weak) = {
        let cur = rt
            .current_thread()
            .ok_or_else(|| LuaError::runtime("cannot yield main thread"))?;
        let co = cur
            .as_any()
            .downcast_ref::<LuaThread>()
            .ok_or_else(|| LuaError::runtime("cannot yield a foreign thread"))?;
        (Arc::clone(&co.state), co.weak_self.clone())
        // the strong handle is dropped here: a parked worker must not
        // keep its own script-visible handle alive
    };
    trace!("yield");
    LuaThread::yield_values(&state, &weak, args)
}

fn as_lua_thread(h: &Arc<dyn ThreadHandle>) -> Option<&LuaThread> {
    h.as_any().downcast_ref::<LuaThread>()
}

fn failure(rt: &Runtime, message: &str) -> Varargs {
    Varargs::pair(Value::Bool(false), rt.str_value(message))
}

fn wait_for_resume(
    state: &Arc<ThreadState>,
    weak: &Weak<LuaThread>,
) -> Result<Varargs, LuaError> {
    let interval = Duration::from_millis(ORPHAN_CHECK_INTERVAL_MS.load(Ordering::Relaxed));
    let mut ch = state.chan.lock();
    loop {
        if let Some(args) = ch.args.take() {
            return Ok(args);
        }
        let timed_out = state.worker_cv.wait_for(&mut ch, interval).timed_out();
        if timed_out && weak.upgrade().is_none() {
            ch.status = Status::Dead;
            debug!("coroutine orphaned, terminating");
            return Err(LuaError::orphaned());
        }
    }
}

fn worker_main(state: Arc<ThreadState>, weak: Weak<LuaThread>, rt: Arc<Runtime>) {
    let args = match wait_for_resume(&state, &weak) {
        Ok(args) => args,
        Err(_) => return, // orphaned before it ever ran
    };
    let result = ops::invoke_value(&rt, &state.body, args);
    let mut ch = state.chan.lock();
    ch.status = Status::Dead;
    match result {
        Ok(values) => {
            debug!("coroutine finished");
            ch.outcome = Some(Outcome::Finished(values));
        }
        Err(e) if e.kind == ErrorKind::Orphaned => {
            // nobody is waiting for an orphan; exit without notifying
            return;
        }
        Err(e) => {
            debug!(error = %e, "coroutine failed");
            ch.outcome = Some(Outcome::Failed(e));
        }
    }
    state.resumer_cv.notify_one();
}
