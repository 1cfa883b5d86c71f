//! Register file of one activation.

use core_types::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// The register file of a single function activation.
///
/// Registers live behind a shared handle so open upvalues can alias a
/// slot after the defining call has moved on in the dispatch loop; the
/// activation and every closure capturing from it observe the same
/// storage until the upvalue is closed.
pub struct Frame {
    slots: Mutex<Vec<Value>>,
}

impl Frame {
    /// Allocate a frame with `size` nil-initialized registers.
    pub fn new(size: usize) -> Arc<Frame> {
        Arc::new(Frame {
            slots: Mutex::new(vec![Value::Nil; size]),
        })
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when the frame has no registers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read register `i`.
    #[inline]
    pub fn get(&self, i: usize) -> Value {
        self.slots.lock()[i].clone()
    }

    /// Write register `i`.
    #[inline]
    pub fn set(&self, i: usize, v: Value) {
        self.slots.lock()[i] = v;
    }

    /// Copy registers `[start, start + count)` out of the frame.
    pub fn slice(&self, start: usize, count: usize) -> Vec<Value> {
        let slots = self.slots.lock();
        slots[start..start + count].to_vec()
    }

    /// Write a slice of values starting at register `start`.
    pub fn fill(&self, start: usize, values: &[Value]) {
        let mut slots = self.slots.lock();
        slots[start..start + values.len()].clone_from_slice(values);
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({} slots)", self.len())
    }
}
