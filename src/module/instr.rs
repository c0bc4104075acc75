//! Instruction model: the MVP opcode table and per-opcode immediate shapes, plus their
//! decode/encode/format implementations.
//!
//! <https://webassembly.github.io/spec/core/binary/instructions.html>

use crate::leb128::{self, CodecError, CodecResult};
use crate::module::types::{BlockType, ValueType};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use std::fmt;
use std::io::{Read, Write};

/// The wire opcode byte. Kept as a separate enum from [`Instruction`] so decoding can
/// dispatch on it before committing to an immediate shape; [`Instruction`] is the
/// structured AST the rest of the crate works with.
#[derive(Eq, PartialEq, Debug, Copy, Clone, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Unreachable = 0x00,
    Nop = 0x01,
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0B,
    Br = 0x0C,
    BrIf = 0x0D,
    BrTable = 0x0E,
    Return = 0x0F,
    Call = 0x10,
    CallIndirect = 0x11,

    Drop = 0x1A,
    Select = 0x1B,

    LocalGet = 0x20,
    LocalSet = 0x21,
    LocalTee = 0x22,
    GlobalGet = 0x23,
    GlobalSet = 0x24,

    I32Load = 0x28,
    I64Load = 0x29,
    F32Load = 0x2A,
    F64Load = 0x2B,
    I32Load8S = 0x2C,
    I32Load8U = 0x2D,
    I32Load16S = 0x2E,
    I32Load16U = 0x2F,
    I64Load8S = 0x30,
    I64Load8U = 0x31,
    I64Load16S = 0x32,
    I64Load16U = 0x33,
    I64Load32S = 0x34,
    I64Load32U = 0x35,
    I32Store = 0x36,
    I64Store = 0x37,
    F32Store = 0x38,
    F64Store = 0x39,
    I32Store8 = 0x3A,
    I32Store16 = 0x3B,
    I64Store8 = 0x3C,
    I64Store16 = 0x3D,
    I64Store32 = 0x3E,
    MemorySize = 0x3F,
    MemoryGrow = 0x40,

    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,

    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32LtU = 0x49,
    I32GtS = 0x4A,
    I32GtU = 0x4B,
    I32LeS = 0x4C,
    I32LeU = 0x4D,
    I32GeS = 0x4E,
    I32GeU = 0x4F,

    I64Eqz = 0x50,
    I64Eq = 0x51,
    I64Ne = 0x52,
    I64LtS = 0x53,
    I64LtU = 0x54,
    I64GtS = 0x55,
    I64GtU = 0x56,
    I64LeS = 0x57,
    I64LeU = 0x58,
    I64GeS = 0x59,
    I64GeU = 0x5A,

    F32Eq = 0x5B,
    F32Ne = 0x5C,
    F32Lt = 0x5D,
    F32Gt = 0x5E,
    F32Le = 0x5F,
    F32Ge = 0x60,

    F64Eq = 0x61,
    F64Ne = 0x62,
    F64Lt = 0x63,
    F64Gt = 0x64,
    F64Le = 0x65,
    F64Ge = 0x66,

    I32Clz = 0x67,
    I32Ctz = 0x68,
    I32Popcnt = 0x69,
    I32Add = 0x6A,
    I32Sub = 0x6B,
    I32Mul = 0x6C,
    I32DivS = 0x6D,
    I32DivU = 0x6E,
    I32RemS = 0x6F,
    I32RemU = 0x70,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,
    I32Rotl = 0x77,
    I32Rotr = 0x78,

    I64Clz = 0x79,
    I64Ctz = 0x7A,
    I64Popcnt = 0x7B,
    I64Add = 0x7C,
    I64Sub = 0x7D,
    I64Mul = 0x7E,
    I64DivS = 0x7F,
    I64DivU = 0x80,
    I64RemS = 0x81,
    I64RemU = 0x82,
    I64And = 0x83,
    I64Or = 0x84,
    I64Xor = 0x85,
    I64Shl = 0x86,
    I64ShrS = 0x87,
    I64ShrU = 0x88,
    I64Rotl = 0x89,
    I64Rotr = 0x8A,

    F32Abs = 0x8B,
    F32Neg = 0x8C,
    F32Ceil = 0x8D,
    F32Floor = 0x8E,
    F32Trunc = 0x8F,
    F32Nearest = 0x90,
    F32Sqrt = 0x91,
    F32Add = 0x92,
    F32Sub = 0x93,
    F32Mul = 0x94,
    F32Div = 0x95,
    F32Min = 0x96,
    F32Max = 0x97,
    F32Copysign = 0x98,

    F64Abs = 0x99,
    F64Neg = 0x9A,
    F64Ceil = 0x9B,
    F64Floor = 0x9C,
    F64Trunc = 0x9D,
    F64Nearest = 0x9E,
    F64Sqrt = 0x9F,
    F64Add = 0xA0,
    F64Sub = 0xA1,
    F64Mul = 0xA2,
    F64Div = 0xA3,
    F64Min = 0xA4,
    F64Max = 0xA5,
    F64Copysign = 0xA6,

    I32WrapI64 = 0xA7,
    I32TruncF32S = 0xA8,
    I32TruncF32U = 0xA9,
    I32TruncF64S = 0xAA,
    I32TruncF64U = 0xAB,
    I64ExtendI32S = 0xAC,
    I64ExtendI32U = 0xAD,
    I64TruncF32S = 0xAE,
    I64TruncF32U = 0xAF,
    I64TruncF64S = 0xB0,
    I64TruncF64U = 0xB1,
    F32ConvertI32S = 0xB2,
    F32ConvertI32U = 0xB3,
    F32ConvertI64S = 0xB4,
    F32ConvertI64U = 0xB5,
    F32DemoteF64 = 0xB6,
    F64ConvertI32S = 0xB7,
    F64ConvertI32U = 0xB8,
    F64ConvertI64S = 0xB9,
    F64ConvertI64U = 0xBA,
    F64PromoteF32 = 0xBB,
    I32ReinterpretF32 = 0xBC,
    I64ReinterpretF64 = 0xBD,
    F32ReinterpretI32 = 0xBE,
    F64ReinterpretI64 = 0xBF,
}

/// `align`/`offset` immediate pair shared by every load/store instruction.
#[derive(Eq, PartialEq, Debug, Copy, Clone, Default)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    fn decode(reader: &mut impl Read) -> CodecResult<MemArg> {
        Ok(MemArg {
            align: leb128::read_varuint32(reader)?,
            offset: leb128::read_varuint32(reader)?,
        })
    }

    fn encode(&self, writer: &mut impl Write) -> CodecResult<()> {
        leb128::write_varuint32(writer, self.align)?;
        leb128::write_varuint32(writer, self.offset)
    }
}

/// A structured instruction: the decoded form of one opcode plus its immediates. Block
/// bodies are fully nested so the interpreter never re-scans bytes for `end`/`else`.
#[derive(PartialEq, Debug, Clone)]
pub enum Instruction {
    Unreachable,
    Nop,
    Block { block_type: BlockType, body: Vec<Instruction> },
    Loop { block_type: BlockType, body: Vec<Instruction> },
    If { block_type: BlockType, then_body: Vec<Instruction>, else_body: Option<Vec<Instruction>> },
    Br { label: u32 },
    BrIf { label: u32 },
    BrTable { targets: Vec<u32>, default: u32 },
    Return,
    Call { function_index: u32 },
    CallIndirect { type_index: u32 },

    Drop,
    Select,

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    I32Load(MemArg),
    I64Load(MemArg),
    F32Load(MemArg),
    F64Load(MemArg),
    I32Load8S(MemArg),
    I32Load8U(MemArg),
    I32Load16S(MemArg),
    I32Load16U(MemArg),
    I64Load8S(MemArg),
    I64Load8U(MemArg),
    I64Load16S(MemArg),
    I64Load16U(MemArg),
    I64Load32S(MemArg),
    I64Load32U(MemArg),
    I32Store(MemArg),
    I64Store(MemArg),
    F32Store(MemArg),
    F64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),
    I64Store16(MemArg),
    I64Store32(MemArg),
    MemorySize,
    MemoryGrow,

    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),

    I32Eqz, I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU, I32GeS, I32GeU,
    I64Eqz, I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU, I64GeS, I64GeU,
    F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge,
    F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge,

    I32Clz, I32Ctz, I32Popcnt, I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
    I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr,
    I64Clz, I64Ctz, I64Popcnt, I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
    I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr,

    F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt,
    F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign,
    F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt,
    F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign,

    I32WrapI64,
    I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U,
    I64ExtendI32S, I64ExtendI32U,
    I64TruncF32S, I64TruncF32U, I64TruncF64S, I64TruncF64U,
    F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U, F32DemoteF64,
    F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U, F64PromoteF32,
    I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;
        match self {
            Unreachable => "unreachable",
            Nop => "nop",
            Block { .. } => "block",
            Loop { .. } => "loop",
            If { .. } => "if",
            Br { .. } => "br",
            BrIf { .. } => "br_if",
            BrTable { .. } => "br_table",
            Return => "return",
            Call { .. } => "call",
            CallIndirect { .. } => "call_indirect",
            Drop => "drop",
            Select => "select",
            LocalGet(_) => "local.get",
            LocalSet(_) => "local.set",
            LocalTee(_) => "local.tee",
            GlobalGet(_) => "global.get",
            GlobalSet(_) => "global.set",
            I32Load(_) => "i32.load", I64Load(_) => "i64.load",
            F32Load(_) => "f32.load", F64Load(_) => "f64.load",
            I32Load8S(_) => "i32.load8_s", I32Load8U(_) => "i32.load8_u",
            I32Load16S(_) => "i32.load16_s", I32Load16U(_) => "i32.load16_u",
            I64Load8S(_) => "i64.load8_s", I64Load8U(_) => "i64.load8_u",
            I64Load16S(_) => "i64.load16_s", I64Load16U(_) => "i64.load16_u",
            I64Load32S(_) => "i64.load32_s", I64Load32U(_) => "i64.load32_u",
            I32Store(_) => "i32.store", I64Store(_) => "i64.store",
            F32Store(_) => "f32.store", F64Store(_) => "f64.store",
            I32Store8(_) => "i32.store8", I32Store16(_) => "i32.store16",
            I64Store8(_) => "i64.store8", I64Store16(_) => "i64.store16", I64Store32(_) => "i64.store32",
            MemorySize => "memory.size", MemoryGrow => "memory.grow",
            I32Const(_) => "i32.const", I64Const(_) => "i64.const",
            F32Const(_) => "f32.const", F64Const(_) => "f64.const",
            I32Eqz => "i32.eqz", I32Eq => "i32.eq", I32Ne => "i32.ne",
            I32LtS => "i32.lt_s", I32LtU => "i32.lt_u", I32GtS => "i32.gt_s", I32GtU => "i32.gt_u",
            I32LeS => "i32.le_s", I32LeU => "i32.le_u", I32GeS => "i32.ge_s", I32GeU => "i32.ge_u",
            I64Eqz => "i64.eqz", I64Eq => "i64.eq", I64Ne => "i64.ne",
            I64LtS => "i64.lt_s", I64LtU => "i64.lt_u", I64GtS => "i64.gt_s", I64GtU => "i64.gt_u",
            I64LeS => "i64.le_s", I64LeU => "i64.le_u", I64GeS => "i64.ge_s", I64GeU => "i64.ge_u",
            F32Eq => "f32.eq", F32Ne => "f32.ne", F32Lt => "f32.lt", F32Gt => "f32.gt",
            F32Le => "f32.le", F32Ge => "f32.ge",
            F64Eq => "f64.eq", F64Ne => "f64.ne", F64Lt => "f64.lt", F64Gt => "f64.gt",
            F64Le => "f64.le", F64Ge => "f64.ge",
            I32Clz => "i32.clz", I32Ctz => "i32.ctz", I32Popcnt => "i32.popcnt",
            I32Add => "i32.add", I32Sub => "i32.sub", I32Mul => "i32.mul",
            I32DivS => "i32.div_s", I32DivU => "i32.div_u", I32RemS => "i32.rem_s", I32RemU => "i32.rem_u",
            I32And => "i32.and", I32Or => "i32.or", I32Xor => "i32.xor",
            I32Shl => "i32.shl", I32ShrS => "i32.shr_s", I32ShrU => "i32.shr_u",
            I32Rotl => "i32.rotl", I32Rotr => "i32.rotr",
            I64Clz => "i64.clz", I64Ctz => "i64.ctz", I64Popcnt => "i64.popcnt",
            I64Add => "i64.add", I64Sub => "i64.sub", I64Mul => "i64.mul",
            I64DivS => "i64.div_s", I64DivU => "i64.div_u", I64RemS => "i64.rem_s", I64RemU => "i64.rem_u",
            I64And => "i64.and", I64Or => "i64.or", I64Xor => "i64.xor",
            I64Shl => "i64.shl", I64ShrS => "i64.shr_s", I64ShrU => "i64.shr_u",
            I64Rotl => "i64.rotl", I64Rotr => "i64.rotr",
            F32Abs => "f32.abs", F32Neg => "f32.neg", F32Ceil => "f32.ceil", F32Floor => "f32.floor",
            F32Trunc => "f32.trunc", F32Nearest => "f32.nearest", F32Sqrt => "f32.sqrt",
            F32Add => "f32.add", F32Sub => "f32.sub", F32Mul => "f32.mul", F32Div => "f32.div",
            F32Min => "f32.min", F32Max => "f32.max", F32Copysign => "f32.copysign",
            F64Abs => "f64.abs", F64Neg => "f64.neg", F64Ceil => "f64.ceil", F64Floor => "f64.floor",
            F64Trunc => "f64.trunc", F64Nearest => "f64.nearest", F64Sqrt => "f64.sqrt",
            F64Add => "f64.add", F64Sub => "f64.sub", F64Mul => "f64.mul", F64Div => "f64.div",
            F64Min => "f64.min", F64Max => "f64.max", F64Copysign => "f64.copysign",
            I32WrapI64 => "i32.wrap_i64",
            I32TruncF32S => "i32.trunc_f32_s", I32TruncF32U => "i32.trunc_f32_u",
            I32TruncF64S => "i32.trunc_f64_s", I32TruncF64U => "i32.trunc_f64_u",
            I64ExtendI32S => "i64.extend_i32_s", I64ExtendI32U => "i64.extend_i32_u",
            I64TruncF32S => "i64.trunc_f32_s", I64TruncF32U => "i64.trunc_f32_u",
            I64TruncF64S => "i64.trunc_f64_s", I64TruncF64U => "i64.trunc_f64_u",
            F32ConvertI32S => "f32.convert_i32_s", F32ConvertI32U => "f32.convert_i32_u",
            F32ConvertI64S => "f32.convert_i64_s", F32ConvertI64U => "f32.convert_i64_u",
            F32DemoteF64 => "f32.demote_f64",
            F64ConvertI32S => "f64.convert_i32_s", F64ConvertI32U => "f64.convert_i32_u",
            F64ConvertI64S => "f64.convert_i64_s", F64ConvertI64U => "f64.convert_i64_u",
            F64PromoteF32 => "f64.promote_f32",
            I32ReinterpretF32 => "i32.reinterpret_f32", I64ReinterpretF64 => "i64.reinterpret_f64",
            F32ReinterpretI32 => "f32.reinterpret_i32", F64ReinterpretI64 => "f64.reinterpret_i64",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_indented(self, f, 0)
    }
}

fn fmt_indented(instr: &Instruction, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    match instr {
        Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
            writeln!(f, "{pad}{}", instr.mnemonic())?;
            for inner in body {
                fmt_indented(inner, f, depth + 1)?;
            }
            writeln!(f, "{pad}end")
        }
        Instruction::If { then_body, else_body, .. } => {
            writeln!(f, "{pad}if")?;
            for inner in then_body {
                fmt_indented(inner, f, depth + 1)?;
            }
            if let Some(else_body) = else_body {
                writeln!(f, "{pad}else")?;
                for inner in else_body {
                    fmt_indented(inner, f, depth + 1)?;
                }
            }
            writeln!(f, "{pad}end")
        }
        Instruction::Br { label } | Instruction::BrIf { label } => {
            writeln!(f, "{pad}{} {label}", instr.mnemonic())
        }
        Instruction::BrTable { targets, default } => {
            let targets = targets.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");
            writeln!(f, "{pad}br_table {targets} {default}")
        }
        Instruction::Call { function_index } => writeln!(f, "{pad}call {function_index}"),
        Instruction::CallIndirect { type_index } => writeln!(f, "{pad}call_indirect (type {type_index})"),
        Instruction::LocalGet(i) | Instruction::LocalSet(i) | Instruction::LocalTee(i)
        | Instruction::GlobalGet(i) | Instruction::GlobalSet(i) => {
            writeln!(f, "{pad}{} {i}", instr.mnemonic())
        }
        Instruction::I32Const(v) => writeln!(f, "{pad}i32.const {v}"),
        Instruction::I64Const(v) => writeln!(f, "{pad}i64.const {v}"),
        Instruction::F32Const(v) => writeln!(f, "{pad}f32.const {v}"),
        Instruction::F64Const(v) => writeln!(f, "{pad}f64.const {v}"),
        mem_instr if mem_arg_of(mem_instr).is_some() => {
            let mem_arg = mem_arg_of(mem_instr).unwrap();
            writeln!(f, "{pad}{} offset={} align={}", mem_instr.mnemonic(), mem_arg.offset, mem_arg.align)
        }
        other => writeln!(f, "{pad}{}", other.mnemonic()),
    }
}

fn mem_arg_of(instr: &Instruction) -> Option<&MemArg> {
    use Instruction::*;
    match instr {
        I32Load(m) | I64Load(m) | F32Load(m) | F64Load(m)
        | I32Load8S(m) | I32Load8U(m) | I32Load16S(m) | I32Load16U(m)
        | I64Load8S(m) | I64Load8U(m) | I64Load16S(m) | I64Load16U(m)
        | I64Load32S(m) | I64Load32U(m)
        | I32Store(m) | I64Store(m) | F32Store(m) | F64Store(m)
        | I32Store8(m) | I32Store16(m) | I64Store8(m) | I64Store16(m) | I64Store32(m) => Some(m),
        _ => None,
    }
}

fn decode_block_type(reader: &mut impl Read) -> CodecResult<BlockType> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    BlockType::decode(buf[0]).ok_or_else(|| {
        CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown block type byte {:#x}", buf[0]),
        ))
    })
}

/// Decodes a single opcode and, recursively, any nested block it opens, stopping when it
/// reads the terminating `end` (or, for `if`, possibly an `else` first). Returns `None`
/// once the terminator for the *current* scope has been consumed, signalling the caller
/// to stop.
fn decode_one(reader: &mut impl Read) -> CodecResult<DecodedOpcode> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    let opcode = Opcode::try_from(buf[0]).map_err(|_| {
        CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown opcode byte {:#x}", buf[0]),
        ))
    })?;

    let instruction = match opcode {
        Opcode::End => return Ok(DecodedOpcode::End),
        Opcode::Else => return Ok(DecodedOpcode::Else),
        Opcode::Unreachable => Instruction::Unreachable,
        Opcode::Nop => Instruction::Nop,
        Opcode::Block => {
            let block_type = decode_block_type(reader)?;
            let body = decode_sequence(reader)?.body;
            Instruction::Block { block_type, body }
        }
        Opcode::Loop => {
            let block_type = decode_block_type(reader)?;
            let body = decode_sequence(reader)?.body;
            Instruction::Loop { block_type, body }
        }
        Opcode::If => {
            let block_type = decode_block_type(reader)?;
            let first = decode_sequence(reader)?;
            let else_body = if first.had_else {
                Some(decode_sequence(reader)?.body)
            } else {
                None
            };
            Instruction::If { block_type, then_body: first.body, else_body }
        }
        Opcode::Br => Instruction::Br { label: leb128::read_varuint32(reader)? },
        Opcode::BrIf => Instruction::BrIf { label: leb128::read_varuint32(reader)? },
        Opcode::BrTable => {
            let count = leb128::read_varuint32(reader)? as usize;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(leb128::read_varuint32(reader)?);
            }
            let default = leb128::read_varuint32(reader)?;
            Instruction::BrTable { targets, default }
        }
        Opcode::Return => Instruction::Return,
        Opcode::Call => Instruction::Call { function_index: leb128::read_varuint32(reader)? },
        Opcode::CallIndirect => {
            let type_index = leb128::read_varuint32(reader)?;
            let mut reserved = [0u8; 1];
            reader.read_exact(&mut reserved)?;
            Instruction::CallIndirect { type_index }
        }
        Opcode::Drop => Instruction::Drop,
        Opcode::Select => Instruction::Select,
        Opcode::LocalGet => Instruction::LocalGet(leb128::read_varuint32(reader)?),
        Opcode::LocalSet => Instruction::LocalSet(leb128::read_varuint32(reader)?),
        Opcode::LocalTee => Instruction::LocalTee(leb128::read_varuint32(reader)?),
        Opcode::GlobalGet => Instruction::GlobalGet(leb128::read_varuint32(reader)?),
        Opcode::GlobalSet => Instruction::GlobalSet(leb128::read_varuint32(reader)?),
        Opcode::I32Load => Instruction::I32Load(MemArg::decode(reader)?),
        Opcode::I64Load => Instruction::I64Load(MemArg::decode(reader)?),
        Opcode::F32Load => Instruction::F32Load(MemArg::decode(reader)?),
        Opcode::F64Load => Instruction::F64Load(MemArg::decode(reader)?),
        Opcode::I32Load8S => Instruction::I32Load8S(MemArg::decode(reader)?),
        Opcode::I32Load8U => Instruction::I32Load8U(MemArg::decode(reader)?),
        Opcode::I32Load16S => Instruction::I32Load16S(MemArg::decode(reader)?),
        Opcode::I32Load16U => Instruction::I32Load16U(MemArg::decode(reader)?),
        Opcode::I64Load8S => Instruction::I64Load8S(MemArg::decode(reader)?),
        Opcode::I64Load8U => Instruction::I64Load8U(MemArg::decode(reader)?),
        Opcode::I64Load16S => Instruction::I64Load16S(MemArg::decode(reader)?),
        Opcode::I64Load16U => Instruction::I64Load16U(MemArg::decode(reader)?),
        Opcode::I64Load32S => Instruction::I64Load32S(MemArg::decode(reader)?),
        Opcode::I64Load32U => Instruction::I64Load32U(MemArg::decode(reader)?),
        Opcode::I32Store => Instruction::I32Store(MemArg::decode(reader)?),
        Opcode::I64Store => Instruction::I64Store(MemArg::decode(reader)?),
        Opcode::F32Store => Instruction::F32Store(MemArg::decode(reader)?),
        Opcode::F64Store => Instruction::F64Store(MemArg::decode(reader)?),
        Opcode::I32Store8 => Instruction::I32Store8(MemArg::decode(reader)?),
        Opcode::I32Store16 => Instruction::I32Store16(MemArg::decode(reader)?),
        Opcode::I64Store8 => Instruction::I64Store8(MemArg::decode(reader)?),
        Opcode::I64Store16 => Instruction::I64Store16(MemArg::decode(reader)?),
        Opcode::I64Store32 => Instruction::I64Store32(MemArg::decode(reader)?),
        Opcode::MemorySize => {
            let mut reserved = [0u8; 1];
            reader.read_exact(&mut reserved)?;
            Instruction::MemorySize
        }
        Opcode::MemoryGrow => {
            let mut reserved = [0u8; 1];
            reader.read_exact(&mut reserved)?;
            Instruction::MemoryGrow
        }
        Opcode::I32Const => Instruction::I32Const(leb128::read_varint32(reader)?),
        Opcode::I64Const => Instruction::I64Const(leb128::read_varint64(reader)?),
        Opcode::F32Const => Instruction::F32Const(leb128::read_f32(reader)?),
        Opcode::F64Const => Instruction::F64Const(leb128::read_f64(reader)?),
        Opcode::I32Eqz => Instruction::I32Eqz, Opcode::I32Eq => Instruction::I32Eq, Opcode::I32Ne => Instruction::I32Ne,
        Opcode::I32LtS => Instruction::I32LtS, Opcode::I32LtU => Instruction::I32LtU,
        Opcode::I32GtS => Instruction::I32GtS, Opcode::I32GtU => Instruction::I32GtU,
        Opcode::I32LeS => Instruction::I32LeS, Opcode::I32LeU => Instruction::I32LeU,
        Opcode::I32GeS => Instruction::I32GeS, Opcode::I32GeU => Instruction::I32GeU,
        Opcode::I64Eqz => Instruction::I64Eqz, Opcode::I64Eq => Instruction::I64Eq, Opcode::I64Ne => Instruction::I64Ne,
        Opcode::I64LtS => Instruction::I64LtS, Opcode::I64LtU => Instruction::I64LtU,
        Opcode::I64GtS => Instruction::I64GtS, Opcode::I64GtU => Instruction::I64GtU,
        Opcode::I64LeS => Instruction::I64LeS, Opcode::I64LeU => Instruction::I64LeU,
        Opcode::I64GeS => Instruction::I64GeS, Opcode::I64GeU => Instruction::I64GeU,
        Opcode::F32Eq => Instruction::F32Eq, Opcode::F32Ne => Instruction::F32Ne,
        Opcode::F32Lt => Instruction::F32Lt, Opcode::F32Gt => Instruction::F32Gt,
        Opcode::F32Le => Instruction::F32Le, Opcode::F32Ge => Instruction::F32Ge,
        Opcode::F64Eq => Instruction::F64Eq, Opcode::F64Ne => Instruction::F64Ne,
        Opcode::F64Lt => Instruction::F64Lt, Opcode::F64Gt => Instruction::F64Gt,
        Opcode::F64Le => Instruction::F64Le, Opcode::F64Ge => Instruction::F64Ge,
        Opcode::I32Clz => Instruction::I32Clz, Opcode::I32Ctz => Instruction::I32Ctz, Opcode::I32Popcnt => Instruction::I32Popcnt,
        Opcode::I32Add => Instruction::I32Add, Opcode::I32Sub => Instruction::I32Sub, Opcode::I32Mul => Instruction::I32Mul,
        Opcode::I32DivS => Instruction::I32DivS, Opcode::I32DivU => Instruction::I32DivU,
        Opcode::I32RemS => Instruction::I32RemS, Opcode::I32RemU => Instruction::I32RemU,
        Opcode::I32And => Instruction::I32And, Opcode::I32Or => Instruction::I32Or, Opcode::I32Xor => Instruction::I32Xor,
        Opcode::I32Shl => Instruction::I32Shl, Opcode::I32ShrS => Instruction::I32ShrS, Opcode::I32ShrU => Instruction::I32ShrU,
        Opcode::I32Rotl => Instruction::I32Rotl, Opcode::I32Rotr => Instruction::I32Rotr,
        Opcode::I64Clz => Instruction::I64Clz, Opcode::I64Ctz => Instruction::I64Ctz, Opcode::I64Popcnt => Instruction::I64Popcnt,
        Opcode::I64Add => Instruction::I64Add, Opcode::I64Sub => Instruction::I64Sub, Opcode::I64Mul => Instruction::I64Mul,
        Opcode::I64DivS => Instruction::I64DivS, Opcode::I64DivU => Instruction::I64DivU,
        Opcode::I64RemS => Instruction::I64RemS, Opcode::I64RemU => Instruction::I64RemU,
        Opcode::I64And => Instruction::I64And, Opcode::I64Or => Instruction::I64Or, Opcode::I64Xor => Instruction::I64Xor,
        Opcode::I64Shl => Instruction::I64Shl, Opcode::I64ShrS => Instruction::I64ShrS, Opcode::I64ShrU => Instruction::I64ShrU,
        Opcode::I64Rotl => Instruction::I64Rotl, Opcode::I64Rotr => Instruction::I64Rotr,
        Opcode::F32Abs => Instruction::F32Abs, Opcode::F32Neg => Instruction::F32Neg,
        Opcode::F32Ceil => Instruction::F32Ceil, Opcode::F32Floor => Instruction::F32Floor,
        Opcode::F32Trunc => Instruction::F32Trunc, Opcode::F32Nearest => Instruction::F32Nearest, Opcode::F32Sqrt => Instruction::F32Sqrt,
        Opcode::F32Add => Instruction::F32Add, Opcode::F32Sub => Instruction::F32Sub,
        Opcode::F32Mul => Instruction::F32Mul, Opcode::F32Div => Instruction::F32Div,
        Opcode::F32Min => Instruction::F32Min, Opcode::F32Max => Instruction::F32Max, Opcode::F32Copysign => Instruction::F32Copysign,
        Opcode::F64Abs => Instruction::F64Abs, Opcode::F64Neg => Instruction::F64Neg,
        Opcode::F64Ceil => Instruction::F64Ceil, Opcode::F64Floor => Instruction::F64Floor,
        Opcode::F64Trunc => Instruction::F64Trunc, Opcode::F64Nearest => Instruction::F64Nearest, Opcode::F64Sqrt => Instruction::F64Sqrt,
        Opcode::F64Add => Instruction::F64Add, Opcode::F64Sub => Instruction::F64Sub,
        Opcode::F64Mul => Instruction::F64Mul, Opcode::F64Div => Instruction::F64Div,
        Opcode::F64Min => Instruction::F64Min, Opcode::F64Max => Instruction::F64Max, Opcode::F64Copysign => Instruction::F64Copysign,
        Opcode::I32WrapI64 => Instruction::I32WrapI64,
        Opcode::I32TruncF32S => Instruction::I32TruncF32S, Opcode::I32TruncF32U => Instruction::I32TruncF32U,
        Opcode::I32TruncF64S => Instruction::I32TruncF64S, Opcode::I32TruncF64U => Instruction::I32TruncF64U,
        Opcode::I64ExtendI32S => Instruction::I64ExtendI32S, Opcode::I64ExtendI32U => Instruction::I64ExtendI32U,
        Opcode::I64TruncF32S => Instruction::I64TruncF32S, Opcode::I64TruncF32U => Instruction::I64TruncF32U,
        Opcode::I64TruncF64S => Instruction::I64TruncF64S, Opcode::I64TruncF64U => Instruction::I64TruncF64U,
        Opcode::F32ConvertI32S => Instruction::F32ConvertI32S, Opcode::F32ConvertI32U => Instruction::F32ConvertI32U,
        Opcode::F32ConvertI64S => Instruction::F32ConvertI64S, Opcode::F32ConvertI64U => Instruction::F32ConvertI64U,
        Opcode::F32DemoteF64 => Instruction::F32DemoteF64,
        Opcode::F64ConvertI32S => Instruction::F64ConvertI32S, Opcode::F64ConvertI32U => Instruction::F64ConvertI32U,
        Opcode::F64ConvertI64S => Instruction::F64ConvertI64S, Opcode::F64ConvertI64U => Instruction::F64ConvertI64U,
        Opcode::F64PromoteF32 => Instruction::F64PromoteF32,
        Opcode::I32ReinterpretF32 => Instruction::I32ReinterpretF32, Opcode::I64ReinterpretF64 => Instruction::I64ReinterpretF64,
        Opcode::F32ReinterpretI32 => Instruction::F32ReinterpretI32, Opcode::F64ReinterpretI64 => Instruction::F64ReinterpretI64,
    };
    Ok(DecodedOpcode::Instruction(instruction))
}

enum DecodedOpcode {
    Instruction(Instruction),
    Else,
    End,
}

struct DecodedSequence {
    body: Vec<Instruction>,
    had_else: bool,
}

fn decode_sequence(reader: &mut impl Read) -> CodecResult<DecodedSequence> {
    let mut body = Vec::new();
    loop {
        match decode_one(reader)? {
            DecodedOpcode::Instruction(instr) => body.push(instr),
            DecodedOpcode::Else => return Ok(DecodedSequence { body, had_else: true }),
            DecodedOpcode::End => return Ok(DecodedSequence { body, had_else: false }),
        }
    }
}

/// Decodes an instruction stream terminated by the top-level `end` (function bodies and
/// initializer expressions both use this entry point).
pub fn decode_instructions(reader: &mut impl Read) -> CodecResult<Vec<Instruction>> {
    Ok(decode_sequence(reader)?.body)
}

fn encode_one(instr: &Instruction, writer: &mut impl Write) -> CodecResult<()> {
    use Instruction::*;
    match instr {
        Unreachable => writer.write_all(&[Opcode::Unreachable as u8])?,
        Nop => writer.write_all(&[Opcode::Nop as u8])?,
        Block { block_type, body } => {
            writer.write_all(&[Opcode::Block as u8, block_type.encode()])?;
            encode_instructions(body, writer)?;
            writer.write_all(&[Opcode::End as u8])?;
        }
        Loop { block_type, body } => {
            writer.write_all(&[Opcode::Loop as u8, block_type.encode()])?;
            encode_instructions(body, writer)?;
            writer.write_all(&[Opcode::End as u8])?;
        }
        If { block_type, then_body, else_body } => {
            writer.write_all(&[Opcode::If as u8, block_type.encode()])?;
            encode_instructions(then_body, writer)?;
            if let Some(else_body) = else_body {
                writer.write_all(&[Opcode::Else as u8])?;
                encode_instructions(else_body, writer)?;
            }
            writer.write_all(&[Opcode::End as u8])?;
        }
        Br { label } => { writer.write_all(&[Opcode::Br as u8])?; leb128::write_varuint32(writer, *label)?; }
        BrIf { label } => { writer.write_all(&[Opcode::BrIf as u8])?; leb128::write_varuint32(writer, *label)?; }
        BrTable { targets, default } => {
            writer.write_all(&[Opcode::BrTable as u8])?;
            leb128::write_varuint32(writer, targets.len() as u32)?;
            for target in targets {
                leb128::write_varuint32(writer, *target)?;
            }
            leb128::write_varuint32(writer, *default)?;
        }
        Return => writer.write_all(&[Opcode::Return as u8])?,
        Call { function_index } => { writer.write_all(&[Opcode::Call as u8])?; leb128::write_varuint32(writer, *function_index)?; }
        CallIndirect { type_index } => {
            writer.write_all(&[Opcode::CallIndirect as u8])?;
            leb128::write_varuint32(writer, *type_index)?;
            writer.write_all(&[0u8])?;
        }
        Drop => writer.write_all(&[Opcode::Drop as u8])?,
        Select => writer.write_all(&[Opcode::Select as u8])?,
        LocalGet(i) => { writer.write_all(&[Opcode::LocalGet as u8])?; leb128::write_varuint32(writer, *i)?; }
        LocalSet(i) => { writer.write_all(&[Opcode::LocalSet as u8])?; leb128::write_varuint32(writer, *i)?; }
        LocalTee(i) => { writer.write_all(&[Opcode::LocalTee as u8])?; leb128::write_varuint32(writer, *i)?; }
        GlobalGet(i) => { writer.write_all(&[Opcode::GlobalGet as u8])?; leb128::write_varuint32(writer, *i)?; }
        GlobalSet(i) => { writer.write_all(&[Opcode::GlobalSet as u8])?; leb128::write_varuint32(writer, *i)?; }
        I32Load(m) => { writer.write_all(&[Opcode::I32Load as u8])?; m.encode(writer)?; }
        I64Load(m) => { writer.write_all(&[Opcode::I64Load as u8])?; m.encode(writer)?; }
        F32Load(m) => { writer.write_all(&[Opcode::F32Load as u8])?; m.encode(writer)?; }
        F64Load(m) => { writer.write_all(&[Opcode::F64Load as u8])?; m.encode(writer)?; }
        I32Load8S(m) => { writer.write_all(&[Opcode::I32Load8S as u8])?; m.encode(writer)?; }
        I32Load8U(m) => { writer.write_all(&[Opcode::I32Load8U as u8])?; m.encode(writer)?; }
        I32Load16S(m) => { writer.write_all(&[Opcode::I32Load16S as u8])?; m.encode(writer)?; }
        I32Load16U(m) => { writer.write_all(&[Opcode::I32Load16U as u8])?; m.encode(writer)?; }
        I64Load8S(m) => { writer.write_all(&[Opcode::I64Load8S as u8])?; m.encode(writer)?; }
        I64Load8U(m) => { writer.write_all(&[Opcode::I64Load8U as u8])?; m.encode(writer)?; }
        I64Load16S(m) => { writer.write_all(&[Opcode::I64Load16S as u8])?; m.encode(writer)?; }
        I64Load16U(m) => { writer.write_all(&[Opcode::I64Load16U as u8])?; m.encode(writer)?; }
        I64Load32S(m) => { writer.write_all(&[Opcode::I64Load32S as u8])?; m.encode(writer)?; }
        I64Load32U(m) => { writer.write_all(&[Opcode::I64Load32U as u8])?; m.encode(writer)?; }
        I32Store(m) => { writer.write_all(&[Opcode::I32Store as u8])?; m.encode(writer)?; }
        I64Store(m) => { writer.write_all(&[Opcode::I64Store as u8])?; m.encode(writer)?; }
        F32Store(m) => { writer.write_all(&[Opcode::F32Store as u8])?; m.encode(writer)?; }
        F64Store(m) => { writer.write_all(&[Opcode::F64Store as u8])?; m.encode(writer)?; }
        I32Store8(m) => { writer.write_all(&[Opcode::I32Store8 as u8])?; m.encode(writer)?; }
        I32Store16(m) => { writer.write_all(&[Opcode::I32Store16 as u8])?; m.encode(writer)?; }
        I64Store8(m) => { writer.write_all(&[Opcode::I64Store8 as u8])?; m.encode(writer)?; }
        I64Store16(m) => { writer.write_all(&[Opcode::I64Store16 as u8])?; m.encode(writer)?; }
        I64Store32(m) => { writer.write_all(&[Opcode::I64Store32 as u8])?; m.encode(writer)?; }
        MemorySize => writer.write_all(&[Opcode::MemorySize as u8, 0])?,
        MemoryGrow => writer.write_all(&[Opcode::MemoryGrow as u8, 0])?,
        I32Const(v) => { writer.write_all(&[Opcode::I32Const as u8])?; leb128::write_varint32(writer, *v)?; }
        I64Const(v) => { writer.write_all(&[Opcode::I64Const as u8])?; leb128::write_varint64(writer, *v)?; }
        F32Const(v) => { writer.write_all(&[Opcode::F32Const as u8])?; leb128::write_f32(writer, *v)?; }
        F64Const(v) => { writer.write_all(&[Opcode::F64Const as u8])?; leb128::write_f64(writer, *v)?; }
        simple => writer.write_all(&[simple_opcode_byte(simple)])?,
    }
    Ok(())
}

/// Maps the remaining nullary comparison/arithmetic/conversion instructions to their
/// opcode byte. Split out from `encode_one` because this tail is a pure 1:1 byte lookup
/// with no immediates to encode.
fn simple_opcode_byte(instr: &Instruction) -> u8 {
    use Instruction::*;
    (match instr {
        I32Eqz => Opcode::I32Eqz, I32Eq => Opcode::I32Eq, I32Ne => Opcode::I32Ne,
        I32LtS => Opcode::I32LtS, I32LtU => Opcode::I32LtU, I32GtS => Opcode::I32GtS, I32GtU => Opcode::I32GtU,
        I32LeS => Opcode::I32LeS, I32LeU => Opcode::I32LeU, I32GeS => Opcode::I32GeS, I32GeU => Opcode::I32GeU,
        I64Eqz => Opcode::I64Eqz, I64Eq => Opcode::I64Eq, I64Ne => Opcode::I64Ne,
        I64LtS => Opcode::I64LtS, I64LtU => Opcode::I64LtU, I64GtS => Opcode::I64GtS, I64GtU => Opcode::I64GtU,
        I64LeS => Opcode::I64LeS, I64LeU => Opcode::I64LeU, I64GeS => Opcode::I64GeS, I64GeU => Opcode::I64GeU,
        F32Eq => Opcode::F32Eq, F32Ne => Opcode::F32Ne, F32Lt => Opcode::F32Lt, F32Gt => Opcode::F32Gt,
        F32Le => Opcode::F32Le, F32Ge => Opcode::F32Ge,
        F64Eq => Opcode::F64Eq, F64Ne => Opcode::F64Ne, F64Lt => Opcode::F64Lt, F64Gt => Opcode::F64Gt,
        F64Le => Opcode::F64Le, F64Ge => Opcode::F64Ge,
        I32Clz => Opcode::I32Clz, I32Ctz => Opcode::I32Ctz, I32Popcnt => Opcode::I32Popcnt,
        I32Add => Opcode::I32Add, I32Sub => Opcode::I32Sub, I32Mul => Opcode::I32Mul,
        I32DivS => Opcode::I32DivS, I32DivU => Opcode::I32DivU, I32RemS => Opcode::I32RemS, I32RemU => Opcode::I32RemU,
        I32And => Opcode::I32And, I32Or => Opcode::I32Or, I32Xor => Opcode::I32Xor,
        I32Shl => Opcode::I32Shl, I32ShrS => Opcode::I32ShrS, I32ShrU => Opcode::I32ShrU,
        I32Rotl => Opcode::I32Rotl, I32Rotr => Opcode::I32Rotr,
        I64Clz => Opcode::I64Clz, I64Ctz => Opcode::I64Ctz, I64Popcnt => Opcode::I64Popcnt,
        I64Add => Opcode::I64Add, I64Sub => Opcode::I64Sub, I64Mul => Opcode::I64Mul,
        I64DivS => Opcode::I64DivS, I64DivU => Opcode::I64DivU, I64RemS => Opcode::I64RemS, I64RemU => Opcode::I64RemU,
        I64And => Opcode::I64And, I64Or => Opcode::I64Or, I64Xor => Opcode::I64Xor,
        I64Shl => Opcode::I64Shl, I64ShrS => Opcode::I64ShrS, I64ShrU => Opcode::I64ShrU,
        I64Rotl => Opcode::I64Rotl, I64Rotr => Opcode::I64Rotr,
        F32Abs => Opcode::F32Abs, F32Neg => Opcode::F32Neg, F32Ceil => Opcode::F32Ceil, F32Floor => Opcode::F32Floor,
        F32Trunc => Opcode::F32Trunc, F32Nearest => Opcode::F32Nearest, F32Sqrt => Opcode::F32Sqrt,
        F32Add => Opcode::F32Add, F32Sub => Opcode::F32Sub, F32Mul => Opcode::F32Mul, F32Div => Opcode::F32Div,
        F32Min => Opcode::F32Min, F32Max => Opcode::F32Max, F32Copysign => Opcode::F32Copysign,
        F64Abs => Opcode::F64Abs, F64Neg => Opcode::F64Neg, F64Ceil => Opcode::F64Ceil, F64Floor => Opcode::F64Floor,
        F64Trunc => Opcode::F64Trunc, F64Nearest => Opcode::F64Nearest, F64Sqrt => Opcode::F64Sqrt,
        F64Add => Opcode::F64Add, F64Sub => Opcode::F64Sub, F64Mul => Opcode::F64Mul, F64Div => Opcode::F64Div,
        F64Min => Opcode::F64Min, F64Max => Opcode::F64Max, F64Copysign => Opcode::F64Copysign,
        I32WrapI64 => Opcode::I32WrapI64,
        I32TruncF32S => Opcode::I32TruncF32S, I32TruncF32U => Opcode::I32TruncF32U,
        I32TruncF64S => Opcode::I32TruncF64S, I32TruncF64U => Opcode::I32TruncF64U,
        I64ExtendI32S => Opcode::I64ExtendI32S, I64ExtendI32U => Opcode::I64ExtendI32U,
        I64TruncF32S => Opcode::I64TruncF32S, I64TruncF32U => Opcode::I64TruncF32U,
        I64TruncF64S => Opcode::I64TruncF64S, I64TruncF64U => Opcode::I64TruncF64U,
        F32ConvertI32S => Opcode::F32ConvertI32S, F32ConvertI32U => Opcode::F32ConvertI32U,
        F32ConvertI64S => Opcode::F32ConvertI64S, F32ConvertI64U => Opcode::F32ConvertI64U,
        F32DemoteF64 => Opcode::F32DemoteF64,
        F64ConvertI32S => Opcode::F64ConvertI32S, F64ConvertI32U => Opcode::F64ConvertI32U,
        F64ConvertI64S => Opcode::F64ConvertI64S, F64ConvertI64U => Opcode::F64ConvertI64U,
        F64PromoteF32 => Opcode::F64PromoteF32,
        I32ReinterpretF32 => Opcode::I32ReinterpretF32, I64ReinterpretF64 => Opcode::I64ReinterpretF64,
        F32ReinterpretI32 => Opcode::F32ReinterpretI32, F64ReinterpretI64 => Opcode::F64ReinterpretI64,
        other => unreachable!("{other:?} has a dedicated encode_one arm"),
    }) as u8
}

pub fn encode_instructions(instructions: &[Instruction], writer: &mut impl Write) -> CodecResult<()> {
    for instr in instructions {
        encode_one(instr, writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullary_round_trip() {
        let body = vec![Instruction::LocalGet(0), Instruction::LocalGet(1), Instruction::I32Add];
        let mut buf = Vec::new();
        encode_instructions(&body, &mut buf).unwrap();
        buf.push(Opcode::End as u8);
        let decoded = decode_instructions(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn nested_block_round_trip() {
        let body = vec![Instruction::Block {
            block_type: BlockType::Empty,
            body: vec![Instruction::Br { label: 0 }],
        }];
        let mut buf = Vec::new();
        encode_instructions(&body, &mut buf).unwrap();
        buf.push(Opcode::End as u8);
        let decoded = decode_instructions(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn if_else_round_trip() {
        let body = vec![Instruction::If {
            block_type: BlockType::Value(ValueType::I32),
            then_body: vec![Instruction::I32Const(1)],
            else_body: Some(vec![Instruction::I32Const(0)]),
        }];
        let mut buf = Vec::new();
        encode_instructions(&body, &mut buf).unwrap();
        buf.push(Opcode::End as u8);
        let decoded = decode_instructions(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn br_table_round_trip() {
        let body = vec![Instruction::BrTable { targets: vec![0, 1, 2], default: 3 }];
        let mut buf = Vec::new();
        encode_instructions(&body, &mut buf).unwrap();
        buf.push(Opcode::End as u8);
        let decoded = decode_instructions(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn display_formats_mnemonic() {
        let instr = Instruction::I32Const(5);
        assert_eq!(instr.to_string().trim(), "i32.const 5");
    }
}
