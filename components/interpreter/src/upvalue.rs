//! Upvalue cells for closures.
//!
//! An upvalue is open while its variable still lives in an activation's
//! register file, aliasing that slot, and is closed into a private cell
//! when the defining scope exits. The open-to-closed transition happens
//! exactly once, inside the same shared cell, so every closure holding
//! the upvalue observes it.

use core_types::Value;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::frame::Frame;

enum State {
    Open { frame: Arc<Frame>, index: usize },
    Closed(Value),
}

/// A shared, closable reference to a captured variable.
pub struct Upvalue {
    state: Mutex<State>,
}

impl Upvalue {
    /// Open an upvalue aliasing `frame[index]`.
    pub fn open(frame: &Arc<Frame>, index: usize) -> Arc<Upvalue> {
        Arc::new(Upvalue {
            state: Mutex::new(State::Open {
                frame: Arc::clone(frame),
                index,
            }),
        })
    }

    /// Create an already-closed upvalue owning `value`.
    pub fn closed(value: Value) -> Arc<Upvalue> {
        Arc::new(Upvalue {
            state: Mutex::new(State::Closed(value)),
        })
    }

    /// Read the captured variable.
    pub fn get(&self) -> Value {
        match &*self.state.lock() {
            State::Open { frame, index } => frame.get(*index),
            State::Closed(v) => v.clone(),
        }
    }

    /// Write the captured variable.
    pub fn set(&self, value: Value) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Open { frame, index } => frame.set(*index, value),
            State::Closed(v) => *v = value,
        }
    }

    /// Detach from the register file, taking a private copy of the
    /// current value. Idempotent; closing a closed upvalue is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let State::Open { frame, index } = &*state {
            let value = frame.get(*index);
            *state = State::Closed(value);
        }
    }

    /// The register index this upvalue aliases, or `None` once closed.
    pub fn open_index(&self) -> Option<usize> {
        match &*self.state.lock() {
            State::Open { index, .. } => Some(*index),
            State::Closed(_) => None,
        }
    }

    /// True while the upvalue aliases a register.
    pub fn is_open(&self) -> bool {
        self.open_index().is_some()
    }
}

impl std::fmt::Debug for Upvalue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.state.lock() {
            State::Open { index, .. } => write!(f, "Upvalue(open @{})", index),
            State::Closed(v) => write!(f, "Upvalue(closed {:?})", v),
        }
    }
}
