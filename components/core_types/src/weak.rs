//! Weak references for table entries.
//!
//! A table in weak-keys or weak-values mode stores reference-typed keys or
//! values through a breakable reference: the entry does not by itself keep
//! the referent alive. Lookups and iteration treat a broken reference as
//! an absent entry. Inline values (nil, booleans, numbers) and strings are
//! plain values, not collectible objects, so they are always held strongly.

use std::sync::{Arc, Weak};

use crate::table::Table;
use crate::value::{Callable, ThreadHandle, Userdata, Value};

/// A table slot that may hold its value weakly.
#[derive(Clone)]
pub enum WeakSlot {
    /// An ordinary strongly-held value.
    Strong(Value),
    /// A weakly-held table.
    Table(Weak<Table>),
    /// A weakly-held function.
    Function(Weak<dyn Callable>),
    /// A weakly-held userdata.
    Userdata(Weak<Userdata>),
    /// A weakly-held thread.
    Thread(Weak<dyn ThreadHandle>),
}

impl WeakSlot {
    /// Store `value`, demoting reference types to weak references when
    /// `weak` is set. Primitives and strings stay strong either way.
    pub fn demote(value: Value, weak: bool) -> WeakSlot {
        if !weak {
            return WeakSlot::Strong(value);
        }
        match value {
            Value::Table(t) => WeakSlot::Table(Arc::downgrade(&t)),
            Value::Function(f) => WeakSlot::Function(Arc::downgrade(&f)),
            Value::Userdata(u) => WeakSlot::Userdata(Arc::downgrade(&u)),
            Value::Thread(t) => WeakSlot::Thread(Arc::downgrade(&t)),
            other => WeakSlot::Strong(other),
        }
    }

    /// Recover the strong value, or `None` when the referent is gone.
    pub fn strong_value(&self) -> Option<Value> {
        match self {
            WeakSlot::Strong(v) => Some(v.clone()),
            WeakSlot::Table(w) => w.upgrade().map(Value::Table),
            WeakSlot::Function(w) => w.upgrade().map(Value::Function),
            WeakSlot::Userdata(w) => w.upgrade().map(Value::Userdata),
            WeakSlot::Thread(w) => w.upgrade().map(Value::Thread),
        }
    }

    /// True when the referent has been dropped.
    pub fn is_broken(&self) -> bool {
        self.strong_value().is_none()
    }
}

impl std::fmt::Debug for WeakSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.strong_value() {
            Some(v) => write!(f, "WeakSlot({:?})", v),
            None => write!(f, "WeakSlot(<broken>)"),
        }
    }
}
