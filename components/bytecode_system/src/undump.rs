//! Binary chunk loader.
//!
//! Reconstructs a [`Prototype`] tree from the serialized binary form. The
//! header carries the producing configuration (endianness, integer and
//! size_t widths, number format); all multi-byte reads honor those fields
//! rather than compiled-in constants, so chunks produced on differently
//! configured producers load identically.
//!
//! A fatal mismatch anywhere never yields a partially populated
//! prototype: the whole load fails.

use std::sync::Arc;

use core_types::{LuaError, LuaStr, Runtime, Value};
use tracing::debug;

use crate::prototype::{LocalVar, Prototype, UpvalueDesc};

/// Signature bytes introducing a binary chunk.
pub const SIGNATURE: [u8; 4] = [0x1b, b'L', b'u', b'a'];

/// Bytes closing the chunk header, used to catch transcoding corruption.
pub const TAIL: [u8; 6] = [0x19, 0x93, b'\r', b'\n', 0x1a, b'\n'];

/// Chunk version written by this runtime (Lua 5.2 format).
pub const VERSION: u8 = 0x52;

/// Chunk format written by this runtime (the official format).
pub const FORMAT: u8 = 0;

/// Number format: all numbers are doubles.
pub const NUMBER_FORMAT_FLOATS_OR_DOUBLES: u8 = 0;
/// Number format: all numbers are 4-byte integers.
pub const NUMBER_FORMAT_INTS_ONLY: u8 = 1;
/// Number format: number-patched producer, 32-bit integers.
pub const NUMBER_FORMAT_NUM_PATCH_INT32: u8 = 4;

// constant tags in the chunk body
pub(crate) const TAG_NIL: i8 = 0;
pub(crate) const TAG_BOOLEAN: i8 = 1;
pub(crate) const TAG_INT: i8 = -2;
pub(crate) const TAG_NUMBER: i8 = 3;
pub(crate) const TAG_STRING: i8 = 4;

/// Load a byte slice as a binary chunk when it starts with the chunk
/// signature.
///
/// Returns `Ok(None)` when the signature does not match, so callers can
/// fall back to source compilation; every other malformation is a fatal
/// [`ErrorKind::Format`](core_types::ErrorKind::Format) error.
pub fn undump(
    rt: &Runtime,
    bytes: &[u8],
    chunk_name: &str,
) -> Result<Option<Arc<Prototype>>, LuaError> {
    if bytes.len() < SIGNATURE.len() || bytes[..SIGNATURE.len()] != SIGNATURE {
        return Ok(None);
    }
    let source_name = source_name(chunk_name);
    let mut s = LoadState {
        rt,
        bytes,
        pos: SIGNATURE.len(),
        little_endian: false,
        sizeof_size_t: 4,
        number_format: NUMBER_FORMAT_FLOATS_OR_DOUBLES,
    };
    s.load_header()?;
    let proto = s.load_function(&rt.intern(source_name.as_bytes()))?;
    debug!(
        chunk = %source_name,
        instructions = proto.code.len(),
        constants = proto.constants.len(),
        "loaded binary chunk"
    );
    Ok(Some(Arc::new(proto)))
}

/// Construct a source name from a supplied chunk name: `@file` and
/// `=name` drop their prefix; an embedded signature byte means the chunk
/// came from an in-memory binary string.
pub fn source_name(chunk_name: &str) -> String {
    if let Some(n) = chunk_name.strip_prefix('@').or_else(|| chunk_name.strip_prefix('=')) {
        n.to_string()
    } else if chunk_name.starts_with('\u{1b}') {
        "binary string".to_string()
    } else {
        chunk_name.to_string()
    }
}

struct LoadState<'a> {
    rt: &'a Runtime,
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
    sizeof_size_t: u8,
    number_format: u8,
}

impl<'a> LoadState<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], LuaError> {
        if self.pos + n > self.bytes.len() {
            return Err(LuaError::format("unexpected end of binary chunk"));
        }
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn load_byte(&mut self) -> Result<u8, LuaError> {
        Ok(self.take(1)?[0])
    }

    fn load_header(&mut self) -> Result<(), LuaError> {
        let _version = self.load_byte()?;
        let _format = self.load_byte()?;
        self.little_endian = self.load_byte()? != 0;
        let _sizeof_int = self.load_byte()?;
        self.sizeof_size_t = self.load_byte()?;
        let _sizeof_instruction = self.load_byte()?;
        let _sizeof_number = self.load_byte()?;
        self.number_format = self.load_byte()?;
        for (i, expected) in TAIL.iter().enumerate() {
            if self.load_byte()? != *expected {
                return Err(LuaError::format(format!(
                    "unexpected byte in chunk trailer at index {}",
                    i
                )));
            }
        }
        match self.number_format {
            NUMBER_FORMAT_FLOATS_OR_DOUBLES
            | NUMBER_FORMAT_INTS_ONLY
            | NUMBER_FORMAT_NUM_PATCH_INT32 => Ok(()),
            other => Err(LuaError::format(format!(
                "unsupported number format {}",
                other
            ))),
        }
    }

    fn load_int(&mut self) -> Result<i32, LuaError> {
        let b = self.take(4)?;
        Ok(if self.little_endian {
            i32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            i32::from_be_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn load_count(&mut self) -> Result<usize, LuaError> {
        let n = self.load_int()?;
        if n < 0 {
            return Err(LuaError::format("negative count in binary chunk"));
        }
        Ok(n as usize)
    }

    fn load_int64(&mut self) -> Result<i64, LuaError> {
        let (a, b) = if self.little_endian {
            let a = self.load_int()?;
            let b = self.load_int()?;
            (a, b)
        } else {
            let b = self.load_int()?;
            let a = self.load_int()?;
            (a, b)
        };
        Ok(((b as i64) << 32) | (a as i64 & 0xffff_ffff))
    }

    fn load_size_t(&mut self) -> Result<usize, LuaError> {
        if self.sizeof_size_t == 8 {
            Ok(self.load_int64()? as usize)
        } else {
            self.load_count()
        }
    }

    fn load_code(&mut self) -> Result<Vec<u32>, LuaError> {
        let n = self.load_count()?;
        let mut code = Vec::with_capacity(n);
        for _ in 0..n {
            code.push(self.load_int()? as u32);
        }
        Ok(code)
    }

    fn load_int_array(&mut self) -> Result<Vec<i32>, LuaError> {
        let n = self.load_count()?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.load_int()?);
        }
        Ok(out)
    }

    // strings are length-prefixed and NUL-terminated; length 0 means absent
    fn load_string(&mut self) -> Result<Option<LuaStr>, LuaError> {
        let size = self.load_size_t()?;
        if size == 0 {
            return Ok(None);
        }
        let mut bytes = self.take(size)?.to_vec();
        bytes.pop();
        Ok(Some(self.rt.adopt(bytes)))
    }

    fn load_number(&mut self) -> Result<Value, LuaError> {
        if self.number_format == NUMBER_FORMAT_INTS_ONLY {
            Ok(Value::Int(self.load_int()?))
        } else {
            Ok(long_bits_to_value(self.load_int64()? as u64))
        }
    }

    fn load_constants(&mut self) -> Result<Vec<Value>, LuaError> {
        let n = self.load_count()?;
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            let tag = self.load_byte()? as i8;
            values.push(match tag {
                TAG_NIL => Value::Nil,
                TAG_BOOLEAN => Value::Bool(self.load_byte()? != 0),
                TAG_INT => Value::Int(self.load_int()?),
                TAG_NUMBER => self.load_number()?,
                TAG_STRING => self
                    .load_string()?
                    .map(Value::Str)
                    .unwrap_or_else(|| Value::Str(self.rt.intern(b""))),
                _ => return Err(LuaError::format("bad constant in binary chunk")),
            });
        }
        Ok(values)
    }

    fn load_upvalues(&mut self) -> Result<Vec<UpvalueDesc>, LuaError> {
        let n = self.load_count()?;
        let mut upvalues = Vec::with_capacity(n);
        for _ in 0..n {
            let in_stack = self.load_byte()? != 0;
            let index = self.load_byte()?;
            upvalues.push(UpvalueDesc {
                name: None,
                in_stack,
                index,
            });
        }
        Ok(upvalues)
    }

    fn load_debug(&mut self, f: &mut Prototype) -> Result<(), LuaError> {
        if let Some(source) = self.load_string()? {
            f.source = source;
        }
        f.line_info = self.load_int_array()?;
        let n = self.load_count()?;
        f.loc_vars = Vec::with_capacity(n);
        for _ in 0..n {
            let name = self
                .load_string()?
                .ok_or_else(|| LuaError::format("missing local variable name"))?;
            let start_pc = self.load_int()?;
            let end_pc = self.load_int()?;
            f.loc_vars.push(LocalVar {
                name,
                start_pc,
                end_pc,
            });
        }
        let n = self.load_count()?;
        for i in 0..n {
            let name = self.load_string()?;
            match f.upvalues.get_mut(i) {
                Some(u) => u.name = name,
                None => return Err(LuaError::format("upvalue name count mismatch")),
            }
        }
        Ok(())
    }

    fn load_function(&mut self, source: &LuaStr) -> Result<Prototype, LuaError> {
        let mut f = Prototype {
            source: source.clone(),
            ..Prototype::default()
        };
        f.line_defined = self.load_int()?;
        f.last_line_defined = self.load_int()?;
        f.num_params = self.load_byte()?;
        f.is_vararg = self.load_byte()?;
        f.max_stack_size = self.load_byte()?;
        f.code = self.load_code()?;
        f.constants = self.load_constants()?;
        let n = self.load_count()?;
        f.protos = Vec::with_capacity(n);
        for _ in 0..n {
            f.protos.push(Arc::new(self.load_function(source)?));
        }
        f.upvalues = self.load_upvalues()?;
        self.load_debug(&mut f)?;
        Ok(f)
    }
}

/// Convert the bits of a chunk number to a value: doubles holding an
/// exactly representable small integer collapse to the integer subtype.
pub fn long_bits_to_value(bits: u64) -> Value {
    if bits & ((1u64 << 63) - 1) == 0 {
        return Value::Int(0);
    }
    let e = ((bits >> 52) & 0x7ff) as i32 - 1023;
    if (0..31).contains(&e) {
        let f = bits & 0xf_ffff_ffff_ffff;
        let shift = 52 - e;
        let int_prec_mask = (1u64 << shift) - 1;
        if f & int_prec_mask == 0 {
            let int_value = ((f >> shift) as i32) | (1 << e);
            return Value::Int(if bits >> 63 != 0 { -int_value } else { int_value });
        }
    }
    Value::Float(f64::from_bits(bits))
}
