//! Hybrid array/hash table engine.
//!
//! A table owns a dense array part (integer keys `1..=N`) and a hash part
//! of power-of-two buckets holding chains of entries. A key present in the
//! array part is never duplicated into the hash part. Integer-valued float
//! keys are normalized to integer keys. Deleting a hash entry leaves a
//! dead tombstone that preserves chain linkage for `next` until the next
//! rehash drops it.
//!
//! Rehash policy: when the hash part reaches load factor 1.0, or an
//! integer insert could extend the array part, the table is resized so the
//! new array length `N` is the largest power of two with at least `N/2`
//! integer keys in `[1, N]`; qualifying hash entries migrate into the
//! array and evicted array tail entries migrate into the hash.
//!
//! A metatable whose `__mode` string contains `k`/`v` switches the entry
//! strategy to weak keys/values and forces a full rehash, re-wrapping
//! every entry for the new mode.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LuaError;
use crate::ops;
use crate::runtime::Runtime;
use crate::string::LuaStr;
use crate::value::Value;
use crate::varargs::Varargs;
use crate::weak::WeakSlot;

const MIN_HASH_CAPACITY: usize = 2;

/// A Lua table.
///
/// All raw operations lock the table for their duration; operations that
/// may invoke script code (metatable-mediated access, sorting with a
/// comparator) never hold the lock across the invocation.
///
/// # Examples
///
/// ```
/// use core_types::{Table, Value};
///
/// let t = Table::new();
/// t.raw_set(Value::Int(1), Value::from("one")).unwrap();
/// assert_eq!(t.raw_get(&Value::Int(1)), Value::from("one"));
/// t.raw_set(Value::Int(1), Value::Nil).unwrap();
/// assert_eq!(t.raw_get(&Value::Int(1)), Value::Nil);
/// ```
pub struct Table {
    data: Mutex<TableData>,
}

struct TableData {
    array: Vec<Option<WeakSlot>>,
    hash: Vec<Vec<Node>>,
    hash_entries: usize,
    meta: Option<Meta>,
}

struct Meta {
    table: Value,
    weak_keys: bool,
    weak_values: bool,
}

enum Node {
    Entry { key: EntryKey, value: WeakSlot },
    // tombstone: keeps its key so `next` can resume from a deleted entry
    Dead { key: WeakSlot },
}

enum EntryKey {
    Int(i32),
    Strong(Value),
    Weak(WeakSlot),
}

impl EntryKey {
    fn demote(key: Value, weak_keys: bool) -> EntryKey {
        match key {
            Value::Int(i) => EntryKey::Int(i),
            other if weak_keys && other.ref_addr().is_some() => {
                EntryKey::Weak(WeakSlot::demote(other, true))
            }
            other => EntryKey::Strong(other),
        }
    }

    fn strong(&self) -> Option<Value> {
        match self {
            EntryKey::Int(i) => Some(Value::Int(*i)),
            EntryKey::Strong(v) => Some(v.clone()),
            EntryKey::Weak(w) => w.strong_value(),
        }
    }

    fn matches(&self, probe: &Value) -> bool {
        match self {
            EntryKey::Int(i) => matches!(probe, Value::Int(p) if p == i),
            EntryKey::Strong(v) => v.raw_eq(probe),
            EntryKey::Weak(w) => w.strong_value().is_some_and(|v| v.raw_eq(probe)),
        }
    }

    // the key, iff an integer in 1..=max
    fn array_key(&self, max: usize) -> Option<i32> {
        match self {
            EntryKey::Int(i) if *i >= 1 && (*i as usize) <= max => Some(*i),
            _ => None,
        }
    }
}

impl Node {
    // live key/value pair, or None for tombstones and broken weak entries
    fn pair(&self) -> Option<(Value, Value)> {
        match self {
            Node::Entry { key, value } => Some((key.strong()?, value.strong_value()?)),
            Node::Dead { .. } => None,
        }
    }

    fn key_eq(&self, probe: &Value) -> bool {
        match self {
            Node::Entry { key, .. } => key.matches(probe),
            Node::Dead { key } => key.strong_value().is_some_and(|v| v.raw_eq(probe)),
        }
    }
}

impl Table {
    /// Construct an empty table.
    pub fn new() -> Table {
        Table {
            data: Mutex::new(TableData {
                array: Vec::new(),
                hash: Vec::new(),
                hash_entries: 0,
                meta: None,
            }),
        }
    }

    /// Construct a table pre-sized for `narray` array slots and `nhash`
    /// hash entries.
    pub fn with_capacity(narray: usize, nhash: usize) -> Table {
        let t = Table::new();
        t.presize(narray, nhash);
        t
    }

    /// Pre-size both parts; sizes round up to powers of two.
    pub fn presize(&self, narray: usize, nhash: usize) {
        let mut d = self.data.lock();
        let nhash = if nhash > 0 {
            nhash.max(MIN_HASH_CAPACITY)
        } else {
            0
        };
        if narray > 0 {
            let n = 1usize << ceil_log2(narray);
            if n > d.array.len() {
                d.array.resize_with(n, || None);
            }
        }
        if nhash > 0 && d.hash.is_empty() {
            let n = 1usize << ceil_log2(nhash);
            d.hash = new_buckets(n);
        }
    }

    /// Length of the array part. Unrelated to the number of entries.
    pub fn array_length(&self) -> usize {
        self.data.lock().array.len()
    }

    /// Number of hash buckets. Unrelated to the number of entries.
    pub fn hash_length(&self) -> usize {
        self.data.lock().hash.len()
    }

    /// This table's metatable, if set.
    pub fn metatable(&self) -> Option<Value> {
        self.data.lock().meta.as_ref().map(|m| m.table.clone())
    }

    /// Set or clear the metatable.
    ///
    /// Parses the `__mode` field; when the weak-keys/weak-values mode
    /// changes, every entry is re-wrapped by a forced full rehash.
    pub fn set_metatable(&self, metatable: Option<Value>) {
        let (weak_keys, weak_values) = match &metatable {
            Some(Value::Table(mt)) => {
                let mode = mt.raw_get_str("__mode");
                match mode {
                    Value::Str(s) => {
                        let b = s.as_bytes();
                        (b.contains(&b'k'), b.contains(&b'v'))
                    }
                    _ => (false, false),
                }
            }
            _ => (false, false),
        };
        let mut d = self.data.lock();
        let had = d
            .meta
            .as_ref()
            .map(|m| (m.weak_keys, m.weak_values))
            .unwrap_or((false, false));
        d.meta = metatable.map(|table| Meta {
            table,
            weak_keys,
            weak_values,
        });
        if had != (weak_keys, weak_values) {
            d.rehash(0);
        }
    }

    /// Raw lookup, no metatable processing.
    pub fn raw_get(&self, key: &Value) -> Value {
        let key = match normalize_key_lossy(key) {
            Some(k) => k,
            None => return Value::Nil,
        };
        let mut d = self.data.lock();
        d.raw_get(&key)
    }

    /// Raw lookup by integer key.
    pub fn raw_get_int(&self, key: i32) -> Value {
        self.data.lock().raw_get(&Value::Int(key))
    }

    /// Raw lookup by a text key (convenience for interned field names).
    pub fn raw_get_str(&self, key: &str) -> Value {
        self.raw_get(&Value::Str(LuaStr::from_slice(key.as_bytes())))
    }

    /// Raw store, no metatable processing. A `nil` value deletes the key.
    pub fn raw_set(&self, key: Value, value: Value) -> Result<(), LuaError> {
        let key = normalize_key(key)?;
        let mut d = self.data.lock();
        d.raw_set(key, value);
        Ok(())
    }

    /// Raw store by integer key.
    pub fn raw_set_int(&self, key: i32, value: Value) {
        self.data.lock().raw_set(Value::Int(key), value);
    }

    /// Lookup with metatable processing: a raw miss consults `__index`.
    pub fn get(self: &Arc<Self>, rt: &Runtime, key: &Value) -> Result<Value, LuaError> {
        let v = self.raw_get(key);
        if v.is_nil() && self.metatable().is_some() {
            ops::gettable(rt, &Value::Table(Arc::clone(self)), key)
        } else {
            Ok(v)
        }
    }

    /// Store with metatable processing: a raw miss consults `__newindex`.
    pub fn set(self: &Arc<Self>, rt: &Runtime, key: Value, value: Value) -> Result<(), LuaError> {
        if self.metatable().is_none() || !self.raw_get(&key).is_nil() {
            self.raw_set(key, value)
        } else {
            ops::settable(rt, &Value::Table(Arc::clone(self)), key, value)
        }
    }

    /// The border of the array sequence: some `n` where `t[n]` is non-nil
    /// and `t[n+1]` is nil (0 when `t[1]` is nil).
    pub fn raw_len(&self) -> usize {
        let mut d = self.data.lock();
        d.raw_len()
    }

    /// Deterministic successor over the table's entries.
    ///
    /// Given `nil` returns the first pair; given the last key returns
    /// `None`. A key not currently (and not recently) present raises
    /// `invalid key to 'next'`.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, LuaError> {
        let mut d = self.data.lock();
        d.next(key)
    }

    /// Successor over the contiguous array sequence only.
    pub fn inext(&self, key: i32) -> Option<(Value, Value)> {
        let k = key + 1;
        let v = self.raw_get_int(k);
        if v.is_nil() {
            None
        } else {
            Some((Value::Int(k), v))
        }
    }

    /// Count the keys via iteration.
    pub fn key_count(&self) -> usize {
        let mut n = 0;
        let mut key = Value::Nil;
        while let Ok(Some((k, _))) = self.next(&key) {
            n += 1;
            key = k;
        }
        n
    }

    /// Collect all keys via iteration.
    pub fn keys(&self) -> Vec<Value> {
        let mut out = Vec::new();
        let mut key = Value::Nil;
        while let Ok(Some((k, _))) = self.next(&key) {
            out.push(k.clone());
            key = k;
        }
        out
    }

    /// Insert `value` at `pos` in the list part, shifting later elements
    /// up. `pos == 0` appends.
    pub fn insert(&self, pos: usize, value: Value) {
        let pos = if pos == 0 { self.raw_len() + 1 } else { pos };
        let mut pos = pos as i32;
        let mut value = value;
        while !value.is_nil() {
            let displaced = self.raw_get_int(pos);
            self.raw_set_int(pos, value);
            pos += 1;
            value = displaced;
        }
    }

    /// Remove and return the element at `pos`, shifting later elements
    /// down. `pos == 0` removes the last element.
    pub fn remove(&self, pos: usize) -> Value {
        let n = self.raw_len();
        let pos = if pos == 0 { n } else { pos };
        if pos > n {
            return Value::Nil;
        }
        let removed = self.raw_get_int(pos as i32);
        let mut v = removed.clone();
        let mut pos = pos as i32;
        while !v.is_nil() {
            v = self.raw_get_int(pos + 1);
            self.raw_set_int(pos, v.clone());
            pos += 1;
        }
        removed
    }

    /// Unpack elements `i..=j` as a multi-value list, with metatable
    /// processing per element.
    pub fn unpack(
        self: &Arc<Self>,
        rt: &Runtime,
        i: i32,
        j: i32,
    ) -> Result<Varargs, LuaError> {
        if j < i {
            return Ok(Varargs::empty());
        }
        let mut out = Vec::with_capacity((j - i + 1) as usize);
        for k in i..=j {
            out.push(self.get(rt, &Value::Int(k))?);
        }
        Ok(Varargs::from_vec(out))
    }

    /// Concatenate elements `i..=j` with `sep` between them; every element
    /// must be a string or number.
    pub fn concat_values(
        self: &Arc<Self>,
        rt: &Runtime,
        sep: &LuaStr,
        i: i32,
        j: i32,
    ) -> Result<Value, LuaError> {
        let mut out: Vec<u8> = Vec::new();
        for k in i..=j {
            if k > i {
                out.extend_from_slice(sep.as_bytes());
            }
            let v = self.get(rt, &Value::Int(k))?;
            match &v {
                Value::Str(s) => out.extend_from_slice(s.as_bytes()),
                Value::Int(_) | Value::Float(_) => {
                    out.extend_from_slice(v.to_string().as_bytes())
                }
                other => {
                    return Err(LuaError::runtime(format!(
                        "invalid value (at index {}) in table for 'concat': {}",
                        k,
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Value::Str(rt.adopt(out)))
    }

    /// Sort the contiguous array part in place by heap sort.
    ///
    /// `comparator` is either a callable value invoked as `cmp(a, b)`
    /// (truthy result means `a` orders before `b`) or `nil` for the
    /// default `<` ordering. The comparator runs without the table lock.
    pub fn sort(self: &Arc<Self>, rt: &Runtime, comparator: Value) -> Result<(), LuaError> {
        let mut n = {
            let mut d = self.data.lock();
            if d.meta.as_ref().is_some_and(|m| m.weak_values) {
                d.drop_weak_array_values();
            }
            d.array.len()
        };
        while n > 0 && self.array_slot(n - 1).is_none() {
            n -= 1;
        }
        if n > 1 {
            self.heap_sort(rt, n, &comparator)?;
        }
        Ok(())
    }

    fn array_slot(&self, i: usize) -> Option<Value> {
        let mut d = self.data.lock();
        d.array_get(i)
    }

    fn heap_sort(
        self: &Arc<Self>,
        rt: &Runtime,
        count: usize,
        cmp: &Value,
    ) -> Result<(), LuaError> {
        for start in (0..count / 2).rev() {
            self.sift_down(rt, start, count - 1, cmp)?;
        }
        let mut end = count - 1;
        while end > 0 {
            self.swap_slots(end, 0);
            end -= 1;
            self.sift_down(rt, 0, end, cmp)?;
        }
        Ok(())
    }

    fn sift_down(
        self: &Arc<Self>,
        rt: &Runtime,
        start: usize,
        end: usize,
        cmp: &Value,
    ) -> Result<(), LuaError> {
        let mut root = start;
        while root * 2 + 1 <= end {
            let mut child = root * 2 + 1;
            if child < end && self.compare_slots(rt, child, child + 1, cmp)? {
                child += 1;
            }
            if self.compare_slots(rt, root, child, cmp)? {
                self.swap_slots(root, child);
                root = child;
            } else {
                return Ok(());
            }
        }
        Ok(())
    }

    fn compare_slots(
        self: &Arc<Self>,
        rt: &Runtime,
        i: usize,
        j: usize,
        cmp: &Value,
    ) -> Result<bool, LuaError> {
        let (a, b) = (self.array_slot(i), self.array_slot(j));
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(false),
        };
        if cmp.is_nil() {
            ops::lt(rt, &a, &b)
        } else {
            Ok(ops::invoke_value(rt, cmp, Varargs::pair(a, b))?.arg1().is_truthy())
        }
    }

    fn swap_slots(&self, i: usize, j: usize) {
        let mut d = self.data.lock();
        d.array.swap(i, j);
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.data.lock();
        f.debug_struct("Table")
            .field("array_len", &d.array.len())
            .field("hash_len", &d.hash.len())
            .field("hash_entries", &d.hash_entries)
            .field("has_metatable", &d.meta.is_some())
            .finish()
    }
}

impl TableData {
    fn weak_keys(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.weak_keys)
    }

    fn weak_values(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.weak_values)
    }

    // array part read with lazy clearing of broken weak values
    fn array_get(&mut self, i: usize) -> Option<Value> {
        let v = self.array[i].as_ref().and_then(|s| s.strong_value());
        if v.is_none() {
            self.array[i] = None;
        }
        v
    }

    fn raw_get(&mut self, key: &Value) -> Value {
        if let Value::Int(i) = key {
            let i = *i;
            if i >= 1 && (i as usize) <= self.array.len() {
                return self.array_get(i as usize - 1).unwrap_or(Value::Nil);
            }
        }
        self.hash_get(key)
    }

    fn hash_get(&mut self, key: &Value) -> Value {
        if self.hash_entries == 0 || self.hash.is_empty() {
            return Value::Nil;
        }
        let b = self.hash_slot(key);
        let mut broken = false;
        let mut found = Value::Nil;
        for node in &self.hash[b] {
            if let Node::Entry { key: k, value } = node {
                if k.matches(key) {
                    match value.strong_value() {
                        Some(v) => found = v,
                        None => broken = true,
                    }
                    break;
                }
            }
        }
        if broken {
            // lazily unlink the entry whose weak value broke
            self.remove_from_bucket(b, key);
        }
        found
    }

    fn raw_set(&mut self, key: Value, value: Value) {
        if let Value::Int(i) = key {
            if self.array_set(i, &value) {
                return;
            }
        }
        self.hash_set(key, value);
    }

    fn array_set(&mut self, key: i32, value: &Value) -> bool {
        if key >= 1 && (key as usize) <= self.array.len() {
            let weak = self.weak_values();
            self.array[key as usize - 1] = if value.is_nil() {
                None
            } else {
                Some(WeakSlot::demote(value.clone(), weak))
            };
            true
        } else {
            false
        }
    }

    fn hash_set(&mut self, key: Value, value: Value) {
        if value.is_nil() {
            self.hash_remove(&key);
            return;
        }
        let weak_values = self.weak_values();
        if !self.hash.is_empty() {
            let b = self.hash_slot(&key);
            for node in self.hash[b].iter_mut() {
                if let Node::Entry { key: k, value: v } = node {
                    if k.matches(&key) {
                        *v = WeakSlot::demote(value, weak_values);
                        return;
                    }
                }
            }
        }
        if self.check_load_factor() {
            if let Value::Int(i) = key {
                if i > 0 {
                    // a rehash might make room in the array portion
                    self.rehash(i);
                    if self.array_set(i, &value) {
                        return;
                    }
                } else {
                    self.rehash(-1);
                }
            } else {
                self.rehash(-1);
            }
        }
        let b = self.hash_slot(&key);
        let weak_keys = self.weak_keys();
        let weak_values = self.weak_values();
        // appending to a chain drops its tombstones
        self.hash[b].retain(|n| matches!(n, Node::Entry { .. }));
        self.hash[b].push(Node::Entry {
            key: EntryKey::demote(key, weak_keys),
            value: WeakSlot::demote(value, weak_values),
        });
        self.hash_entries += 1;
    }

    fn hash_remove(&mut self, key: &Value) {
        if self.hash.is_empty() {
            return;
        }
        let b = self.hash_slot(key);
        self.remove_from_bucket(b, key);
    }

    fn remove_from_bucket(&mut self, b: usize, key: &Value) {
        for node in self.hash[b].iter_mut() {
            if let Node::Entry { key: k, .. } = node {
                if k.matches(key) {
                    let dead = k
                        .strong()
                        .map(|v| WeakSlot::demote(v, true))
                        .unwrap_or(WeakSlot::Strong(Value::Nil));
                    *node = Node::Dead { key: dead };
                    self.hash_entries -= 1;
                    return;
                }
            }
        }
    }

    fn check_load_factor(&self) -> bool {
        self.hash_entries >= self.hash.len()
    }

    fn hash_slot(&self, key: &Value) -> usize {
        hash_slot_for(key, self.hash.len() - 1)
    }

    fn raw_len(&mut self) -> usize {
        let a = self.array.len();
        let mut n = a + 1;
        let mut m = 0;
        while !self.raw_get(&Value::int(n as i64)).is_nil() {
            m = n;
            n += a + self.hash.len() + 1;
        }
        while n > m + 1 {
            let k = (n + m) / 2;
            if !self.raw_get(&Value::int(k as i64)).is_nil() {
                m = k;
            } else {
                n = k;
            }
        }
        m
    }

    fn next(&mut self, key: &Value) -> Result<Option<(Value, Value)>, LuaError> {
        // find the scan start position: array index, or bucket offset
        let mut i = 0usize;
        'locate: {
            if key.is_nil() {
                break 'locate;
            }
            let key = normalize_key_lossy(key)
                .ok_or_else(|| LuaError::runtime("invalid key to 'next'"))?;
            if let Value::Int(k) = key {
                if k >= 1 && (k as usize) <= self.array.len() {
                    i = k as usize;
                    break 'locate;
                }
            }
            if self.hash.is_empty() {
                return Err(LuaError::runtime("invalid key to 'next'"));
            }
            let b = self.hash_slot(&key);
            let mut found = false;
            for node in &self.hash[b] {
                if found {
                    if let Some(pair) = node.pair() {
                        return Ok(Some(pair));
                    }
                } else if node.key_eq(&key) {
                    found = true;
                }
            }
            if !found {
                return Err(LuaError::runtime("invalid key to 'next'"));
            }
            i = b + 1 + self.array.len();
        }

        // scan the array part
        while i < self.array.len() {
            if let Some(v) = self.array_get(i) {
                return Ok(Some((Value::Int(i as i32 + 1), v)));
            }
            i += 1;
        }

        // scan the hash part
        let mut b = i - self.array.len();
        while b < self.hash.len() {
            for node in &self.hash[b] {
                if let Some(pair) = node.pair() {
                    return Ok(Some(pair));
                }
            }
            b += 1;
        }
        Ok(None)
    }

    fn count_hash_keys(&self) -> usize {
        self.hash
            .iter()
            .flatten()
            .filter(|n| n.pair().is_some())
            .count()
    }

    fn drop_weak_array_values(&mut self) {
        for i in 0..self.array.len() {
            self.array_get(i);
        }
    }

    // count live integer keys into log2 histogram buckets
    fn count_int_keys(&mut self, nums: &mut [usize; 32]) -> usize {
        let mut total = 0;

        let mut i = 1usize;
        for (bit, slot) in nums.iter_mut().enumerate().take(31) {
            if i > self.array.len() {
                break;
            }
            let j = self.array.len().min(1 << bit);
            let mut c = 0;
            while i <= j {
                if self.array_get(i - 1).is_some() {
                    c += 1;
                }
                i += 1;
            }
            *slot = c;
            total += c;
        }

        for b in 0..self.hash.len() {
            for n in &self.hash[b] {
                if let Node::Entry { key, value } = n {
                    if value.strong_value().is_some() {
                        if let Some(k) = key.array_key(i32::MAX as usize) {
                            nums[ceil_log2(k as usize) as usize] += 1;
                            total += 1;
                        }
                    }
                }
            }
        }

        total
    }

    // new_key > 0: next integer key to insert
    // new_key == 0: key count unchanged (__mode toggled)
    // new_key < 0: next key will go into the hash part
    fn rehash(&mut self, new_key: i32) {
        if self.weak_keys() || self.weak_values() {
            // with weak entries, hash_entries is only an upper bound
            self.hash_entries = self.count_hash_keys();
            if self.weak_values() {
                self.drop_weak_array_values();
            }
        }
        let mut nums = [0usize; 32];
        let mut total = self.count_int_keys(&mut nums);
        if new_key > 0 {
            total += 1;
            nums[ceil_log2(new_key as usize) as usize] += 1;
        }

        // choose N such that N <= count of int keys in [1, N] * 2
        let mut keys = nums[0];
        let mut new_array_size = 0usize;
        for log in 1..=31u32 {
            keys += nums[log as usize];
            if total * 2 < (1usize << log) {
                break;
            } else if keys >= (1usize << (log - 1)) {
                new_array_size = 1 << log;
            }
        }

        let old_array_size = self.array.len();
        let mut moving_to_array: isize = 0;
        if new_key > 0 && (new_key as usize) <= new_array_size {
            moving_to_array -= 1;
        }
        if new_array_size > old_array_size {
            for i in ceil_log2(old_array_size + 1)..=ceil_log2(new_array_size) {
                moving_to_array += nums[i as usize] as isize;
            }
        } else if old_array_size > new_array_size {
            for i in ceil_log2(new_array_size + 1)..=ceil_log2(old_array_size) {
                moving_to_array -= nums[i as usize] as isize;
            }
        }

        let extra = if new_key < 0 || new_key as usize > new_array_size {
            1
        } else {
            0
        };
        let new_hash_size =
            (self.hash_entries as isize - moving_to_array + extra).max(0) as usize;
        let new_capacity = if new_hash_size > 0 {
            (1usize << ceil_log2(new_hash_size)).max(MIN_HASH_CAPACITY)
        } else {
            0
        };

        let old_array = std::mem::take(&mut self.array);
        let old_hash = std::mem::take(&mut self.hash);
        let weak_keys = self.weak_keys();
        let weak_values = self.weak_values();

        let mut new_array: Vec<Option<WeakSlot>> = Vec::with_capacity(new_array_size);
        new_array.extend(
            old_array
                .iter()
                .take(new_array_size.min(old_array_size))
                .cloned(),
        );
        new_array.resize_with(new_array_size, || None);
        let mut new_hash = new_buckets(new_capacity);
        let new_mask = new_capacity.wrapping_sub(1);

        // move hash entries: qualifying integer keys into the array,
        // everything else re-wrapped into the new buckets
        for bucket in old_hash {
            for node in bucket {
                if let Node::Entry { key, value } = node {
                    let (k, v) = match (key.strong(), value.strong_value()) {
                        (Some(k), Some(v)) => (k, v),
                        _ => continue, // broken weak entry dropped
                    };
                    if let Some(ak) = key.array_key(new_array_size) {
                        new_array[ak as usize - 1] =
                            Some(WeakSlot::demote(v, weak_values));
                    } else {
                        let b = hash_slot_for(&k, new_mask);
                        new_hash[b].push(Node::Entry {
                            key: EntryKey::demote(k, weak_keys),
                            value: WeakSlot::demote(v, weak_values),
                        });
                    }
                }
                // tombstones are dropped by the rehash
            }
        }

        // move evicted array tail entries into the hash part
        for (i, slot) in old_array.into_iter().enumerate().skip(new_array_size) {
            if let Some(v) = slot.and_then(|s| s.strong_value()) {
                let k = i as i32 + 1;
                let b = hash_slot_for(&Value::Int(k), new_mask);
                new_hash[b].push(Node::Entry {
                    key: EntryKey::Int(k),
                    value: WeakSlot::demote(v, weak_values),
                });
            }
        }

        self.array = new_array;
        self.hash = new_hash;
        self.hash_entries = (self.hash_entries as isize - moving_to_array).max(0) as usize;
    }
}

fn new_buckets(n: usize) -> Vec<Vec<Node>> {
    let mut v = Vec::with_capacity(n);
    v.resize_with(n, Vec::new);
    v
}

// ceil(log2(x)) for x >= 1
fn ceil_log2(x: usize) -> u32 {
    if x <= 1 {
        0
    } else {
        usize::BITS - (x - 1).leading_zeros()
    }
}

/// Reject nil and NaN keys; normalize integral float keys to integers.
fn normalize_key(key: Value) -> Result<Value, LuaError> {
    match key {
        Value::Nil => Err(LuaError::runtime("table index is nil")),
        Value::Float(f) if f.is_nan() => Err(LuaError::runtime("table index is NaN")),
        Value::Float(f) => {
            let i = f as i32;
            if i as f64 == f {
                Ok(Value::Int(i))
            } else {
                Ok(Value::Float(f))
            }
        }
        other => Ok(other),
    }
}

// as normalize_key, but nil/NaN simply fail to match anything
fn normalize_key_lossy(key: &Value) -> Option<Value> {
    match key {
        Value::Nil => None,
        Value::Float(f) if f.is_nan() => None,
        other => normalize_key(other.clone()).ok(),
    }
}

// bucket index for a key; mask is bucket count - 1
fn hash_slot_for(key: &Value, mask: usize) -> usize {
    let h = key_hash(key);
    match key {
        Value::Int(_) | Value::Float(_) | Value::Table(_) | Value::Thread(_)
        | Value::Userdata(_) => hash_mod(h, mask),
        _ => hash_pow2(h, mask),
    }
}

fn hash_pow2(hash: i32, mask: usize) -> usize {
    hash as usize & mask
}

fn hash_mod(hash: i32, mask: usize) -> usize {
    if mask == 0 {
        0
    } else {
        ((hash & 0x7FFF_FFFF) as usize) % mask
    }
}

fn key_hash(key: &Value) -> i32 {
    match key {
        Value::Nil => 0,
        Value::Bool(b) => {
            if *b {
                1231
            } else {
                1237
            }
        }
        Value::Int(i) => *i,
        Value::Float(f) => {
            let b = f.to_bits();
            ((b >> 32) as i32).wrapping_add(b as i32)
        }
        Value::Str(s) => s.hash(),
        other => {
            let p = other.ref_addr().unwrap_or(0);
            (p ^ (p >> 32)) as i32
        }
    }
}
