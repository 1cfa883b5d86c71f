//! Per-instance runtime context.
//!
//! Everything that could have been process-wide state lives on an
//! explicit [`Runtime`] instance instead, so multiple independent
//! runtimes can coexist: the recent-short-string cache, the shared
//! per-type metatables, the metatag name constants, the current-coroutine
//! slot and the debug hook installation point.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::intern::StringPool;
use crate::string::LuaStr;
use crate::value::{ThreadHandle, Value};
use crate::varargs::Varargs;

/// Interned metatag name strings, built once per runtime.
pub struct Tags {
    /// `__index`
    pub index: LuaStr,
    /// `__newindex`
    pub newindex: LuaStr,
    /// `__call`
    pub call: LuaStr,
    /// `__mode`
    pub mode: LuaStr,
    /// `__metatable`
    pub metatable: LuaStr,
    /// `__add`
    pub add: LuaStr,
    /// `__sub`
    pub sub: LuaStr,
    /// `__mul`
    pub mul: LuaStr,
    /// `__div`
    pub div: LuaStr,
    /// `__mod`
    pub modulo: LuaStr,
    /// `__pow`
    pub pow: LuaStr,
    /// `__unm`
    pub unm: LuaStr,
    /// `__len`
    pub len: LuaStr,
    /// `__eq`
    pub eq: LuaStr,
    /// `__lt`
    pub lt: LuaStr,
    /// `__le`
    pub le: LuaStr,
    /// `__concat`
    pub concat: LuaStr,
    /// `__tostring`
    pub tostring: LuaStr,
}

impl Tags {
    fn new(pool: &StringPool) -> Tags {
        Tags {
            index: pool.intern(b"__index"),
            newindex: pool.intern(b"__newindex"),
            call: pool.intern(b"__call"),
            mode: pool.intern(b"__mode"),
            metatable: pool.intern(b"__metatable"),
            add: pool.intern(b"__add"),
            sub: pool.intern(b"__sub"),
            mul: pool.intern(b"__mul"),
            div: pool.intern(b"__div"),
            modulo: pool.intern(b"__mod"),
            pow: pool.intern(b"__pow"),
            unm: pool.intern(b"__unm"),
            len: pool.intern(b"__len"),
            eq: pool.intern(b"__eq"),
            lt: pool.intern(b"__lt"),
            le: pool.intern(b"__le"),
            concat: pool.intern(b"__concat"),
            tostring: pool.intern(b"__tostring"),
        }
    }
}

/// Shared metatables for values that do not carry their own.
///
/// Tables and userdata have per-instance metatables; every other type
/// shares one optional metatable per runtime instance.
#[derive(Default)]
pub struct TypeMetatables {
    /// Metatable shared by all nil values.
    pub nil: Mutex<Option<Value>>,
    /// Metatable shared by all booleans.
    pub boolean: Mutex<Option<Value>>,
    /// Metatable shared by all numbers.
    pub number: Mutex<Option<Value>>,
    /// Metatable shared by all strings.
    pub string: Mutex<Option<Value>>,
    /// Metatable shared by all functions.
    pub function: Mutex<Option<Value>>,
    /// Metatable shared by all threads.
    pub thread: Mutex<Option<Value>>,
}

/// Debug hook surface invoked synchronously by the interpreter.
///
/// All methods have empty defaults; when no hooks are installed the
/// interpreter pays one branch per instruction and nothing else.
pub trait DebugHooks: Send + Sync {
    /// A function call is starting.
    fn on_call(&self, _name: &str, _args: &Varargs) {}

    /// About to execute the instruction at `pc`.
    fn on_instruction(&self, _pc: usize, _top: usize) {}

    /// The current function is returning.
    fn on_return(&self) {}

    /// Produce a traceback for the given level, if supported.
    fn traceback(&self, _level: i32) -> Option<String> {
        None
    }
}

/// A Lua runtime instance.
///
/// Passed by reference to every operation that may consult shared state.
/// Two `Runtime` instances never interfere with each other.
///
/// # Examples
///
/// ```
/// use core_types::{LuaStr, Runtime};
///
/// let rt = Runtime::new();
/// let a = rt.intern(b"print");
/// let b = rt.intern(b"print");
/// assert!(LuaStr::ptr_eq(&a, &b));
/// ```
pub struct Runtime {
    /// The recent-short-string cache.
    pub strings: StringPool,
    /// Interned metatag names.
    pub tags: Tags,
    /// Shared per-type metatables.
    pub type_metatables: TypeMetatables,
    current: Mutex<Option<Arc<dyn ThreadHandle>>>,
    main_error_handler: Mutex<Option<Value>>,
    debug_hooks: RwLock<Option<Arc<dyn DebugHooks>>>,
    weak_self: std::sync::Weak<Runtime>,
}

impl Runtime {
    /// Create a fresh runtime instance.
    pub fn new() -> Arc<Runtime> {
        Arc::new_cyclic(|weak_self| {
            let strings = StringPool::new();
            let tags = Tags::new(&strings);
            Runtime {
                strings,
                tags,
                type_metatables: TypeMetatables::default(),
                current: Mutex::new(None),
                main_error_handler: Mutex::new(None),
                debug_hooks: RwLock::new(None),
                weak_self: weak_self.clone(),
            }
        })
    }

    /// An owning handle to this runtime. Runtimes are always created
    /// behind an [`Arc`], so this never fails.
    pub fn shared(&self) -> Arc<Runtime> {
        self.weak_self.upgrade().expect("runtime is arc-owned")
    }

    /// Intern a copy of `bytes` through the string cache.
    pub fn intern(&self, bytes: &[u8]) -> LuaStr {
        self.strings.intern(bytes)
    }

    /// Intern by adopting the supplied buffer.
    pub fn adopt(&self, bytes: Vec<u8>) -> LuaStr {
        self.strings.adopt(bytes)
    }

    /// Intern text as a string value.
    pub fn str_value(&self, text: &str) -> Value {
        Value::Str(self.intern(text.as_bytes()))
    }

    /// The coroutine currently running on this runtime, or `None` when
    /// control is in the main thread.
    pub fn current_thread(&self) -> Option<Arc<dyn ThreadHandle>> {
        self.current.lock().clone()
    }

    /// Record the currently running coroutine, returning the previous
    /// occupant. Used only by the coroutine scheduler.
    pub fn swap_current_thread(
        &self,
        thread: Option<Arc<dyn ThreadHandle>>,
    ) -> Option<Arc<dyn ThreadHandle>> {
        std::mem::replace(&mut *self.current.lock(), thread)
    }

    /// The error handler of the running thread (or of the main thread).
    pub fn error_handler(&self) -> Option<Value> {
        match self.current_thread() {
            Some(t) => t.error_handler(),
            None => self.main_error_handler.lock().clone(),
        }
    }

    /// Install or clear the error handler of the running thread (or of
    /// the main thread).
    pub fn set_error_handler(&self, handler: Option<Value>) {
        match self.current_thread() {
            Some(t) => t.set_error_handler(handler),
            None => *self.main_error_handler.lock() = handler,
        }
    }

    /// The installed debug hooks, if any.
    pub fn debug_hooks(&self) -> Option<Arc<dyn DebugHooks>> {
        self.debug_hooks.read().clone()
    }

    /// Install or remove debug hooks.
    pub fn set_debug_hooks(&self, hooks: Option<Arc<dyn DebugHooks>>) {
        *self.debug_hooks.write() = hooks;
    }
}
