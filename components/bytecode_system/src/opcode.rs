//! Instruction set constants and field decoding.
//!
//! Instructions are unsigned 32-bit words. Every instruction has an
//! opcode in the low 6 bits. The operand fields:
//!
//! - `A`: 8 bits at position 6
//! - `C`: 9 bits at position 14
//! - `B`: 9 bits at position 23
//! - `Bx`: `B` and `C` together (18 bits); `sBx` is `Bx` in excess-K
//!   signed representation
//! - `Ax`: `A`, `B` and `C` together (26 bits)
//!
//! A `B` or `C` operand of a `K`-mode opcode selects a constant instead
//! of a register when its high bit ([`BITRK`]) is set.

/// Size in bits of the `C` operand.
pub const SIZE_C: u32 = 9;
/// Size in bits of the `B` operand.
pub const SIZE_B: u32 = 9;
/// Size in bits of the combined `Bx` operand.
pub const SIZE_BX: u32 = SIZE_C + SIZE_B;
/// Size in bits of the `A` operand.
pub const SIZE_A: u32 = 8;
/// Size in bits of the combined `Ax` operand.
pub const SIZE_AX: u32 = SIZE_C + SIZE_B + SIZE_A;
/// Size in bits of the opcode field.
pub const SIZE_OP: u32 = 6;

/// Bit position of the opcode field.
pub const POS_OP: u32 = 0;
/// Bit position of the `A` operand.
pub const POS_A: u32 = POS_OP + SIZE_OP;
/// Bit position of the `C` operand.
pub const POS_C: u32 = POS_A + SIZE_A;
/// Bit position of the `B` operand.
pub const POS_B: u32 = POS_C + SIZE_C;
/// Bit position of the `Bx` operand.
pub const POS_BX: u32 = POS_C;
/// Bit position of the `Ax` operand.
pub const POS_AX: u32 = POS_A;

/// Maximum opcode value.
pub const MAX_OP: u32 = (1 << SIZE_OP) - 1;
/// Maximum `A` operand value.
pub const MAXARG_A: u32 = (1 << SIZE_A) - 1;
/// Maximum `B` operand value.
pub const MAXARG_B: u32 = (1 << SIZE_B) - 1;
/// Maximum `C` operand value.
pub const MAXARG_C: u32 = (1 << SIZE_C) - 1;
/// Maximum `Bx` operand value.
pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
/// Maximum `sBx` operand value (excess-K bias).
pub const MAXARG_SBX: u32 = MAXARG_BX >> 1;
/// Maximum `Ax` operand value.
pub const MAXARG_AX: u32 = (1 << SIZE_AX) - 1;

/// This bit set in a `B`/`C` operand means constant index, clear means
/// register index.
pub const BITRK: u32 = 1 << (SIZE_B - 1);
/// Largest constant index that can be encoded in an RK operand.
pub const MAXINDEXRK: u32 = BITRK - 1;

/// Number of list items accumulated before a `SETLIST` flush.
pub const LFIELDS_PER_FLUSH: usize = 50;

/// Extract the opcode of an instruction.
#[inline]
pub fn get_opcode(i: u32) -> u32 {
    (i >> POS_OP) & MAX_OP
}

/// Extract the `A` operand.
#[inline]
pub fn get_a(i: u32) -> u32 {
    (i >> POS_A) & MAXARG_A
}

/// Extract the `B` operand.
#[inline]
pub fn get_b(i: u32) -> u32 {
    (i >> POS_B) & MAXARG_B
}

/// Extract the `C` operand.
#[inline]
pub fn get_c(i: u32) -> u32 {
    (i >> POS_C) & MAXARG_C
}

/// Extract the `Bx` operand.
#[inline]
pub fn get_bx(i: u32) -> u32 {
    (i >> POS_BX) & MAXARG_BX
}

/// Extract the `sBx` operand as a signed offset.
#[inline]
pub fn get_sbx(i: u32) -> i32 {
    get_bx(i) as i32 - MAXARG_SBX as i32
}

/// Extract the `Ax` operand.
#[inline]
pub fn get_ax(i: u32) -> u32 {
    (i >> POS_AX) & MAXARG_AX
}

/// Whether an RK operand selects a constant.
#[inline]
pub fn is_k(x: u32) -> bool {
    x & BITRK != 0
}

/// The constant index of an RK operand.
#[inline]
pub fn index_k(x: u32) -> u32 {
    x & !BITRK
}

/// Encode a constant index as an RK operand.
#[inline]
pub fn rk_as_k(x: u32) -> u32 {
    x | BITRK
}

/// `R(A) := R(B)`
pub const OP_MOVE: u32 = 0;
/// `R(A) := Kst(Bx)`
pub const OP_LOADK: u32 = 1;
/// `R(A) := Kst(extra arg)`
pub const OP_LOADKX: u32 = 2;
/// `R(A) := (Bool)B; if (C) pc++`
pub const OP_LOADBOOL: u32 = 3;
/// `R(A) := ... := R(A+B) := nil`
pub const OP_LOADNIL: u32 = 4;
/// `R(A) := UpValue[B]`
pub const OP_GETUPVAL: u32 = 5;
/// `R(A) := UpValue[B][RK(C)]`
pub const OP_GETTABUP: u32 = 6;
/// `R(A) := R(B)[RK(C)]`
pub const OP_GETTABLE: u32 = 7;
/// `UpValue[A][RK(B)] := RK(C)`
pub const OP_SETTABUP: u32 = 8;
/// `UpValue[B] := R(A)`
pub const OP_SETUPVAL: u32 = 9;
/// `R(A)[RK(B)] := RK(C)`
pub const OP_SETTABLE: u32 = 10;
/// `R(A) := {} (size = B,C)`
pub const OP_NEWTABLE: u32 = 11;
/// `R(A+1) := R(B); R(A) := R(B)[RK(C)]`
pub const OP_SELF: u32 = 12;
/// `R(A) := RK(B) + RK(C)`
pub const OP_ADD: u32 = 13;
/// `R(A) := RK(B) - RK(C)`
pub const OP_SUB: u32 = 14;
/// `R(A) := RK(B) * RK(C)`
pub const OP_MUL: u32 = 15;
/// `R(A) := RK(B) / RK(C)`
pub const OP_DIV: u32 = 16;
/// `R(A) := RK(B) % RK(C)`
pub const OP_MOD: u32 = 17;
/// `R(A) := RK(B) ^ RK(C)`
pub const OP_POW: u32 = 18;
/// `R(A) := -R(B)`
pub const OP_UNM: u32 = 19;
/// `R(A) := not R(B)`
pub const OP_NOT: u32 = 20;
/// `R(A) := length of R(B)`
pub const OP_LEN: u32 = 21;
/// `R(A) := R(B).. ... ..R(C)`
pub const OP_CONCAT: u32 = 22;
/// `pc += sBx; close upvalues >= R(A-1) if A > 0`
pub const OP_JMP: u32 = 23;
/// `if ((RK(B) == RK(C)) ~= A) then pc++`
pub const OP_EQ: u32 = 24;
/// `if ((RK(B) < RK(C)) ~= A) then pc++`
pub const OP_LT: u32 = 25;
/// `if ((RK(B) <= RK(C)) ~= A) then pc++`
pub const OP_LE: u32 = 26;
/// `if not (R(A) <=> C) then pc++`
pub const OP_TEST: u32 = 27;
/// `if (R(B) <=> C) then R(A) := R(B) else pc++`
pub const OP_TESTSET: u32 = 28;
/// `R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))`
pub const OP_CALL: u32 = 29;
/// `return R(A)(R(A+1), ... ,R(A+B-1))`
pub const OP_TAILCALL: u32 = 30;
/// `return R(A), ... ,R(A+B-2)`
pub const OP_RETURN: u32 = 31;
/// `R(A) += R(A+2); if R(A) <?= R(A+1) then { pc += sBx; R(A+3) = R(A) }`
pub const OP_FORLOOP: u32 = 32;
/// `R(A) -= R(A+2); pc += sBx`
pub const OP_FORPREP: u32 = 33;
/// `R(A+3), ... ,R(A+2+C) := R(A)(R(A+1), R(A+2))`
pub const OP_TFORCALL: u32 = 34;
/// `if R(A+1) ~= nil then { R(A) = R(A+1); pc += sBx }`
pub const OP_TFORLOOP: u32 = 35;
/// `R(A)[(C-1)*FPF + i] := R(A+i), 1 <= i <= B`
pub const OP_SETLIST: u32 = 36;
/// `R(A) := closure(KPROTO[Bx])`
pub const OP_CLOSURE: u32 = 37;
/// `R(A), R(A+1), ..., R(A+B-1) = vararg`
pub const OP_VARARG: u32 = 38;
/// Extra (larger) argument for the previous opcode.
pub const OP_EXTRAARG: u32 = 39;

/// Number of opcodes in the instruction set.
pub const NUM_OPCODES: u32 = OP_EXTRAARG + 1;

/// Opcode mnemonic, for diagnostics and disassembly-style output.
pub fn opcode_name(op: u32) -> &'static str {
    const NAMES: [&str; NUM_OPCODES as usize] = [
        "MOVE", "LOADK", "LOADKX", "LOADBOOL", "LOADNIL", "GETUPVAL", "GETTABUP", "GETTABLE",
        "SETTABUP", "SETUPVAL", "SETTABLE", "NEWTABLE", "SELF", "ADD", "SUB", "MUL", "DIV",
        "MOD", "POW", "UNM", "NOT", "LEN", "CONCAT", "JMP", "EQ", "LT", "LE", "TEST", "TESTSET",
        "CALL", "TAILCALL", "RETURN", "FORLOOP", "FORPREP", "TFORCALL", "TFORLOOP", "SETLIST",
        "CLOSURE", "VARARG", "EXTRAARG",
    ];
    NAMES.get(op as usize).copied().unwrap_or("UNKNOWN")
}

/// Build an iABC instruction word.
pub fn abc(op: u32, a: u32, b: u32, c: u32) -> u32 {
    op | (a << POS_A) | (b << POS_B) | (c << POS_C)
}

/// Build an iABx instruction word.
pub fn abx(op: u32, a: u32, bx: u32) -> u32 {
    op | (a << POS_A) | (bx << POS_BX)
}

/// Build an iAsBx instruction word.
pub fn asbx(op: u32, a: u32, sbx: i32) -> u32 {
    abx(op, a, (sbx + MAXARG_SBX as i32) as u32)
}

/// Format a chunk name the way error messages present sources:
/// `=name` strips the prefix, `@name` is a file name, anything else is
/// quoted script text, truncated when long.
pub fn chunk_id(source: &str) -> String {
    const MAX_SRC: usize = 80;
    if let Some(stripped) = source.strip_prefix('=') {
        return stripped.to_string();
    }
    let (body, suffix) = match source.strip_prefix('@') {
        Some(file) => (file.to_string(), ""),
        None => (format!("[string \"{}", source), "\"]"),
    };
    let n = body.len() + suffix.len();
    if n > MAX_SRC {
        format!("{}...{}", &body[..MAX_SRC - suffix.len() - 3], suffix)
    } else {
        format!("{}{}", body, suffix)
    }
}
