//! Compiled-function templates.

use std::fmt;
use std::sync::Arc;

use core_types::{LuaStr, Value};

use crate::opcode;

/// Descriptor of one upvalue of a prototype.
///
/// `in_stack` upvalues capture a register of the enclosing activation;
/// the rest copy the enclosing closure's own upvalue at `index`.
#[derive(Clone, Debug, PartialEq)]
pub struct UpvalueDesc {
    /// Upvalue name from debug info, when present.
    pub name: Option<LuaStr>,
    /// Whether the upvalue captures an enclosing activation's register.
    pub in_stack: bool,
    /// Register index or enclosing-upvalue index.
    pub index: u8,
}

/// Debug range of a local variable.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    /// Variable name.
    pub name: LuaStr,
    /// First instruction where the variable is live.
    pub start_pc: i32,
    /// First instruction where the variable is dead.
    pub end_pc: i32,
}

/// An immutable compiled-function template.
///
/// Created once by the chunk loader (or a compiler), shared by every
/// closure instantiated from it, and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Prototype {
    /// Constant pool.
    pub constants: Vec<Value>,
    /// Instruction stream.
    pub code: Vec<u32>,
    /// Nested function prototypes.
    pub protos: Vec<Arc<Prototype>>,
    /// Upvalue descriptors.
    pub upvalues: Vec<UpvalueDesc>,
    /// Source name from debug info.
    pub source: LuaStr,
    /// Per-instruction source line numbers (may be empty when stripped).
    pub line_info: Vec<i32>,
    /// Local variable live ranges (may be empty when stripped).
    pub loc_vars: Vec<LocalVar>,
    /// First source line of the function definition.
    pub line_defined: i32,
    /// Last source line of the function definition.
    pub last_line_defined: i32,
    /// Number of fixed parameters.
    pub num_params: u8,
    /// Non-zero when the function accepts varargs.
    pub is_vararg: u8,
    /// Number of registers the function needs.
    pub max_stack_size: u8,
}

impl Default for Prototype {
    fn default() -> Self {
        Prototype {
            constants: Vec::new(),
            code: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            source: LuaStr::from_slice(b"?"),
            line_info: Vec::new(),
            loc_vars: Vec::new(),
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: 0,
            max_stack_size: 2,
        }
    }
}

impl Prototype {
    /// Short presentable form of the source name.
    pub fn short_source(&self) -> String {
        opcode::chunk_id(&self.source.to_string())
    }

    /// The source line of the instruction at `pc`, when line info exists.
    pub fn line_at(&self, pc: usize) -> Option<i32> {
        self.line_info.get(pc).copied()
    }

    /// Name of the local variable in register `reg` live at `pc`, from
    /// debug info.
    pub fn local_name(&self, reg: usize, pc: i32) -> Option<&LuaStr> {
        let mut seen = 0;
        for lv in &self.loc_vars {
            if lv.start_pc <= pc && pc < lv.end_pc {
                if seen == reg {
                    return Some(&lv.name);
                }
                seen += 1;
            }
        }
        None
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.short_source(), self.line_defined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prototype() {
        let p = Prototype::default();
        assert_eq!(p.num_params, 0);
        assert!(p.code.is_empty());
        assert_eq!(p.line_at(0), None);
    }

    #[test]
    fn test_local_name_ranges() {
        let p = Prototype {
            loc_vars: vec![
                LocalVar {
                    name: LuaStr::from_slice(b"a"),
                    start_pc: 0,
                    end_pc: 10,
                },
                LocalVar {
                    name: LuaStr::from_slice(b"b"),
                    start_pc: 2,
                    end_pc: 5,
                },
            ],
            ..Prototype::default()
        };
        assert_eq!(p.local_name(0, 3).unwrap().as_bytes(), b"a");
        assert_eq!(p.local_name(1, 3).unwrap().as_bytes(), b"b");
        assert!(p.local_name(1, 7).is_none());
    }

    #[test]
    fn test_display_uses_chunk_id() {
        let p = Prototype {
            source: LuaStr::from_slice(b"@main.lua"),
            line_defined: 3,
            ..Prototype::default()
        };
        assert_eq!(p.to_string(), "main.lua:3");
    }
}
