//! Binary chunk writer.
//!
//! Serializes a [`Prototype`] tree into the binary form the loader
//! reads back field-for-field. The default configuration writes the
//! standard little-endian doubles format; big-endian output and the
//! ints-only number format are available as options for producing chunks
//! for differently configured consumers.

use core_types::Value;

use crate::prototype::Prototype;
use crate::undump::{
    FORMAT, NUMBER_FORMAT_FLOATS_OR_DOUBLES, NUMBER_FORMAT_INTS_ONLY, SIGNATURE, TAG_BOOLEAN,
    TAG_INT, TAG_NIL, TAG_NUMBER, TAG_STRING, TAIL, VERSION,
};

/// Serialize a prototype with the default configuration.
///
/// `strip` omits all debug info (source name, line table, local
/// variable ranges, upvalue names).
pub fn dump(proto: &Prototype, strip: bool) -> Vec<u8> {
    DumpState::new().dump(proto, strip)
}

/// A configurable binary chunk writer.
pub struct DumpState {
    little_endian: bool,
    number_format: u8,
    out: Vec<u8>,
}

impl DumpState {
    /// Writer with the standard configuration: little-endian, doubles.
    pub fn new() -> DumpState {
        DumpState {
            little_endian: true,
            number_format: NUMBER_FORMAT_FLOATS_OR_DOUBLES,
            out: Vec::new(),
        }
    }

    /// Select byte order.
    pub fn big_endian(mut self) -> DumpState {
        self.little_endian = false;
        self
    }

    /// Write all numbers as 4-byte integers (ints-only producers).
    pub fn ints_only(mut self) -> DumpState {
        self.number_format = NUMBER_FORMAT_INTS_ONLY;
        self
    }

    /// Serialize `proto`, consuming the writer.
    pub fn dump(mut self, proto: &Prototype, strip: bool) -> Vec<u8> {
        self.header();
        self.function(proto, strip);
        self.out
    }

    fn header(&mut self) {
        self.out.extend_from_slice(&SIGNATURE);
        self.out.push(VERSION);
        self.out.push(FORMAT);
        self.out.push(self.little_endian as u8);
        self.out.push(4); // sizeof int
        self.out.push(4); // sizeof size_t
        self.out.push(4); // sizeof instruction
        self.out.push(8); // sizeof number
        self.out.push(self.number_format);
        self.out.extend_from_slice(&TAIL);
    }

    fn int(&mut self, v: i32) {
        let b = if self.little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        };
        self.out.extend_from_slice(&b);
    }

    fn int64(&mut self, v: i64) {
        let (lo, hi) = (v as i32, (v >> 32) as i32);
        if self.little_endian {
            self.int(lo);
            self.int(hi);
        } else {
            self.int(hi);
            self.int(lo);
        }
    }

    fn byte(&mut self, v: u8) {
        self.out.push(v);
    }

    // length-prefixed, NUL-terminated; None writes length 0
    fn string(&mut self, s: Option<&core_types::LuaStr>) {
        match s {
            Some(s) => {
                self.int(s.len() as i32 + 1);
                self.out.extend_from_slice(s.as_bytes());
                self.out.push(0);
            }
            None => self.int(0),
        }
    }

    fn constant(&mut self, v: &Value) {
        match v {
            Value::Nil => self.byte(TAG_NIL as u8),
            Value::Bool(b) => {
                self.byte(TAG_BOOLEAN as u8);
                self.byte(*b as u8);
            }
            Value::Int(i) => {
                if self.number_format == NUMBER_FORMAT_INTS_ONLY {
                    self.byte(TAG_INT as u8);
                    self.int(*i);
                } else {
                    self.byte(TAG_NUMBER as u8);
                    self.int64((*i as f64).to_bits() as i64);
                }
            }
            Value::Float(f) => {
                self.byte(TAG_NUMBER as u8);
                self.int64(f.to_bits() as i64);
            }
            Value::Str(s) => {
                self.byte(TAG_STRING as u8);
                self.string(Some(s));
            }
            other => panic!("value not representable as a chunk constant: {:?}", other),
        }
    }

    fn function(&mut self, f: &Prototype, strip: bool) {
        self.int(f.line_defined);
        self.int(f.last_line_defined);
        self.byte(f.num_params);
        self.byte(f.is_vararg);
        self.byte(f.max_stack_size);

        self.int(f.code.len() as i32);
        for w in &f.code {
            self.int(*w as i32);
        }

        self.int(f.constants.len() as i32);
        for k in &f.constants {
            self.constant(k);
        }
        self.int(f.protos.len() as i32);
        for p in &f.protos {
            self.function(p, strip);
        }

        self.int(f.upvalues.len() as i32);
        for u in &f.upvalues {
            self.byte(u.in_stack as u8);
            self.byte(u.index);
        }

        if strip {
            self.string(None);
            self.int(0); // line info
            self.int(0); // local variables
            self.int(0); // upvalue names
        } else {
            self.string(Some(&f.source));
            self.int(f.line_info.len() as i32);
            for l in &f.line_info {
                self.int(*l);
            }
            self.int(f.loc_vars.len() as i32);
            for lv in &f.loc_vars {
                self.string(Some(&lv.name));
                self.int(lv.start_pc);
                self.int(lv.end_pc);
            }
            self.int(f.upvalues.len() as i32);
            for u in &f.upvalues {
                self.string(u.name.as_ref());
            }
        }
    }
}

impl Default for DumpState {
    fn default() -> Self {
        DumpState::new()
    }
}
