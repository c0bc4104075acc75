//! The stack-machine interpreter: per-call [`Context`], the opcode dispatch loop, and the
//! `break_depth`/`return_values` control-flow protocol that replaces exceptions or
//! sentinel returns for `br`/`return` with explicit signalling threaded through every
//! block/loop/if handler.

use crate::module::instr::{Instruction, MemArg};
use crate::module::types::ValueType;
use crate::runtime::error::Trap;
use crate::runtime::function::FunctionDefinition;
use crate::runtime::instance::{InstanceHandle, ModuleInstance};
use crate::runtime::policy::ExecutionPolicy;
use crate::runtime::table::TableSlot;
use crate::runtime::value::Value;
use crate::runtime::variable::Variable;
use std::convert::TryFrom;
use tracing::trace;

/// One function activation: its locals, its value stack, and the control-flow signals
/// that the block/loop/if handlers thread through nested instruction sequences.
struct Context<'a> {
    instance: &'a ModuleInstance,
    locals: Vec<Variable>,
    value_stack: Vec<Value>,
    expected_returns: &'a [ValueType],
    policy: ExecutionPolicy,
    call_depth: usize,
    break_depth: i64,
    return_values: Option<Vec<Value>>,
}

impl<'a> Context<'a> {
    fn push(&mut self, value: Value) {
        self.value_stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, Trap> {
        self.value_stack.pop().ok_or(Trap::ValueStackUnderflow)
    }

    fn pop_i32(&mut self) -> Result<i32, Trap> {
        i32::try_from(self.pop()?)
    }

    fn pop_u32(&mut self) -> Result<u32, Trap> {
        u32::try_from(self.pop()?)
    }

    fn pop_i64(&mut self) -> Result<i64, Trap> {
        i64::try_from(self.pop()?)
    }

    fn pop_f32(&mut self) -> Result<f32, Trap> {
        f32::try_from(self.pop()?)
    }

    fn pop_f64(&mut self) -> Result<f64, Trap> {
        f64::try_from(self.pop()?)
    }

    /// Whether a pending break or return should cause the caller to stop processing more
    /// instructions in the current sequence.
    fn should_unwind(&self) -> bool {
        self.break_depth >= 0 || self.return_values.is_some()
    }
}

/// Invokes function `index` in `instance` with `args`, dispatching to whichever
/// [`FunctionDefinition`] variant it resolves to. The sole entry point used both by
/// instantiation's start-function call and by external callers.
pub fn call_function(instance: &InstanceHandle, index: usize, args: &[Value]) -> Result<Vec<Value>, Trap> {
    invoke(instance, index, args, 0)
}

/// Runs function `index` against its *declaring* instance. For an `Interpreted`
/// definition this is the weak back-reference stored alongside the body, not
/// necessarily `instance` itself — a function imported from another module via
/// [`crate::runtime::importer::ModuleExportsImporter`] still reads and writes its
/// origin instance's globals and memories when called.
fn invoke(instance: &InstanceHandle, index: usize, args: &[Value], depth: usize) -> Result<Vec<Value>, Trap> {
    let def = instance.functions.get(index).ok_or(Trap::UndefinedElement)?.clone();
    match def {
        FunctionDefinition::Delegate { callback, .. } => {
            trace!(index, "calling delegate function");
            callback(&args.to_vec())
        }
        FunctionDefinition::Throw { error, .. } => Err(error),
        FunctionDefinition::Interpreted { signature, locals, body, instance: owner } => {
            let owner = owner.upgrade().ok_or_else(|| Trap::Host("owning instance dropped".to_string()))?;
            if args.len() != signature.params.len() {
                return Err(Trap::Host(format!(
                    "function expects {} argument(s), got {}",
                    signature.params.len(),
                    args.len()
                )));
            }
            let mut local_vars = Vec::with_capacity(signature.params.len() + locals.len());
            for (param_type, arg) in signature.params.iter().zip(args) {
                if arg.value_type() != *param_type {
                    return Err(Trap::stack_type_error("function argument", *arg));
                }
                local_vars.push(Variable::new(*arg, true));
            }
            for local_type in &locals {
                local_vars.push(Variable::new(Value::default_for(*local_type), true));
            }

            let span = tracing::debug_span!("function", index, depth);
            let _enter = span.enter();

            let mut context = Context {
                instance: &owner,
                locals: local_vars,
                value_stack: Vec::new(),
                expected_returns: &signature.results,
                policy: owner.policy,
                call_depth: depth,
                break_depth: -1,
                return_values: None,
            };

            if let Err(trap) = run_sequence(&mut context, &body) {
                tracing::debug!(%trap, index, depth, "trap raised");
                return Err(trap);
            }

            let arity = context.expected_returns.len();
            let mut results = context.return_values.take().unwrap_or(context.value_stack);
            if results.len() < arity {
                return Err(Trap::ReturnTypeMismatch);
            }
            results.drain(..results.len() - arity);
            for (value, expected) in results.iter().zip(context.expected_returns.iter()) {
                if value.value_type() != *expected {
                    return Err(Trap::ReturnTypeMismatch);
                }
            }
            Ok(results)
        }
    }
}

/// Runs a flat instruction sequence (a function body or a block/loop/if arm), stopping
/// early once a break or return becomes pending.
fn run_sequence(context: &mut Context, instructions: &[Instruction]) -> Result<(), Trap> {
    for instr in instructions {
        run_one(context, instr)?;
        if context.should_unwind() {
            break;
        }
    }
    Ok(())
}

fn run_one(context: &mut Context, instr: &Instruction) -> Result<(), Trap> {
    use Instruction::*;
    match instr {
        Unreachable => return Err(Trap::Unreachable),
        Nop => {}

        Block { block_type, body } => run_block(context, block_type.arity(), body)?,
        // A loop is its own branch target for `br 0`, and that target means "restart the
        // body", not "exit the loop", so it can't reuse `run_block`, which always treats
        // break_depth == 0 as exiting with the block's result arity.
        Loop { body, .. } => loop {
            let base = context.value_stack.len();
            run_sequence(context, body)?;
            if context.break_depth == 0 {
                // Loops take no params in the MVP, so a restart starts from an empty body stack.
                context.value_stack.truncate(base);
                context.break_depth = -1;
                continue;
            }
            if context.break_depth > 0 {
                context.break_depth -= 1;
            }
            break;
        },
        If { block_type, then_body, else_body } => {
            let condition = context.pop_i32()?;
            if condition != 0 {
                run_block(context, block_type.arity(), then_body)?;
            } else if let Some(else_body) = else_body {
                run_block(context, block_type.arity(), else_body)?;
            }
        }
        Br { label } => context.break_depth = *label as i64,
        BrIf { label } => {
            if context.pop_i32()? != 0 {
                context.break_depth = *label as i64;
            }
        }
        BrTable { targets, default } => {
            let index = context.pop_u32()? as usize;
            context.break_depth = *targets.get(index).unwrap_or(default) as i64;
        }
        Return => {
            context.return_values = Some(context.value_stack.clone());
        }
        Call { function_index } => do_call(context, *function_index as usize)?,
        CallIndirect { type_index } => do_call_indirect(context, *type_index)?,

        Drop => {
            context.pop()?;
        }
        Select => {
            let condition = context.pop_i32()?;
            let on_false = context.pop()?;
            let on_true = context.pop()?;
            context.push(if condition != 0 { on_true } else { on_false });
        }

        LocalGet(i) => {
            let value = context.locals.get(*i as usize).ok_or(Trap::ValueStackUnderflow)?.get();
            context.push(value);
        }
        LocalSet(i) => {
            let value = context.pop()?;
            context.locals.get_mut(*i as usize).ok_or(Trap::ValueStackUnderflow)?.set(value)?;
        }
        LocalTee(i) => {
            let value = context.pop()?;
            context.locals.get_mut(*i as usize).ok_or(Trap::ValueStackUnderflow)?.set(value)?;
            context.push(value);
        }
        GlobalGet(i) => {
            let global = context.instance.globals.get(*i as usize).ok_or(Trap::ValueStackUnderflow)?;
            let value = global.borrow().get();
            context.push(value);
        }
        GlobalSet(i) => {
            let value = context.pop()?;
            let global = context.instance.globals.get(*i as usize).ok_or(Trap::ValueStackUnderflow)?;
            global.borrow_mut().set(value)?;
        }

        I32Load(m) => load_and_push(context, m, |mem, addr| mem.read::<i32>(addr))?,
        I64Load(m) => load_and_push(context, m, |mem, addr| mem.read::<i64>(addr))?,
        F32Load(m) => load_and_push(context, m, |mem, addr| mem.read::<f32>(addr))?,
        F64Load(m) => load_and_push(context, m, |mem, addr| mem.read::<f64>(addr))?,
        I32Load8S(m) => load_and_push(context, m, |mem, addr| mem.read::<i8>(addr).map(|v| v as i32))?,
        I32Load8U(m) => load_and_push(context, m, |mem, addr| mem.read::<u8>(addr).map(|v| v as i32))?,
        I32Load16S(m) => load_and_push(context, m, |mem, addr| mem.read::<i16>(addr).map(|v| v as i32))?,
        I32Load16U(m) => load_and_push(context, m, |mem, addr| mem.read::<u16>(addr).map(|v| v as i32))?,
        I64Load8S(m) => load_and_push(context, m, |mem, addr| mem.read::<i8>(addr).map(|v| v as i64))?,
        I64Load8U(m) => load_and_push(context, m, |mem, addr| mem.read::<u8>(addr).map(|v| v as i64))?,
        I64Load16S(m) => load_and_push(context, m, |mem, addr| mem.read::<i16>(addr).map(|v| v as i64))?,
        I64Load16U(m) => load_and_push(context, m, |mem, addr| mem.read::<u16>(addr).map(|v| v as i64))?,
        I64Load32S(m) => load_and_push(context, m, |mem, addr| mem.read::<i32>(addr).map(|v| v as i64))?,
        I64Load32U(m) => load_and_push(context, m, |mem, addr| mem.read::<u32>(addr).map(|v| v as i64))?,

        I32Store(m) => store_from_stack(context, m, |mem, addr, v: i32| mem.write(addr, v))?,
        I64Store(m) => store_from_stack(context, m, |mem, addr, v: i64| mem.write(addr, v))?,
        F32Store(m) => store_from_stack(context, m, |mem, addr, v: f32| mem.write(addr, v))?,
        F64Store(m) => store_from_stack(context, m, |mem, addr, v: f64| mem.write(addr, v))?,
        I32Store8(m) => store_from_stack(context, m, |mem, addr, v: i32| mem.write(addr, v as i8))?,
        I32Store16(m) => store_from_stack(context, m, |mem, addr, v: i32| mem.write(addr, v as i16))?,
        I64Store8(m) => store_from_stack(context, m, |mem, addr, v: i64| mem.write(addr, v as i8))?,
        I64Store16(m) => store_from_stack(context, m, |mem, addr, v: i64| mem.write(addr, v as i16))?,
        I64Store32(m) => store_from_stack(context, m, |mem, addr, v: i64| mem.write(addr, v as i32))?,

        MemorySize => {
            let memory = context.instance.memories.first().ok_or(Trap::OutOfBoundsMemoryAccess)?;
            context.push(Value::I32(memory.borrow().page_count() as i32));
        }
        MemoryGrow => {
            let delta = context.pop_u32()?;
            let memory = context.instance.memories.first().ok_or(Trap::OutOfBoundsMemoryAccess)?;
            context.push(Value::I32(memory.borrow_mut().grow(delta)));
        }

        I32Const(v) => context.push(Value::I32(*v)),
        I64Const(v) => context.push(Value::I64(*v)),
        F32Const(v) => context.push(Value::F32(*v)),
        F64Const(v) => context.push(Value::F64(*v)),

        I32Eqz => unary_i32(context, |a| (a == 0) as i32)?,
        I32Eq => compare_i32(context, |a, b| a == b)?,
        I32Ne => compare_i32(context, |a, b| a != b)?,
        I32LtS => compare_i32(context, |a, b| a < b)?,
        I32LtU => compare_u32(context, |a, b| a < b)?,
        I32GtS => compare_i32(context, |a, b| a > b)?,
        I32GtU => compare_u32(context, |a, b| a > b)?,
        I32LeS => compare_i32(context, |a, b| a <= b)?,
        I32LeU => compare_u32(context, |a, b| a <= b)?,
        I32GeS => compare_i32(context, |a, b| a >= b)?,
        I32GeU => compare_u32(context, |a, b| a >= b)?,

        I64Eqz => {
            let a = context.pop_i64()?;
            context.push(Value::I32((a == 0) as i32));
        }
        I64Eq => compare_i64(context, |a, b| a == b)?,
        I64Ne => compare_i64(context, |a, b| a != b)?,
        I64LtS => compare_i64(context, |a, b| a < b)?,
        I64LtU => compare_u64(context, |a, b| a < b)?,
        I64GtS => compare_i64(context, |a, b| a > b)?,
        I64GtU => compare_u64(context, |a, b| a > b)?,
        I64LeS => compare_i64(context, |a, b| a <= b)?,
        I64LeU => compare_u64(context, |a, b| a <= b)?,
        I64GeS => compare_i64(context, |a, b| a >= b)?,
        I64GeU => compare_u64(context, |a, b| a >= b)?,

        F32Eq => compare_f32(context, |a, b| a == b)?,
        F32Ne => compare_f32(context, |a, b| a != b)?,
        F32Lt => compare_f32(context, |a, b| a < b)?,
        F32Gt => compare_f32(context, |a, b| a > b)?,
        F32Le => compare_f32(context, |a, b| a <= b)?,
        F32Ge => compare_f32(context, |a, b| a >= b)?,

        F64Eq => compare_f64(context, |a, b| a == b)?,
        F64Ne => compare_f64(context, |a, b| a != b)?,
        F64Lt => compare_f64(context, |a, b| a < b)?,
        F64Gt => compare_f64(context, |a, b| a > b)?,
        F64Le => compare_f64(context, |a, b| a <= b)?,
        F64Ge => compare_f64(context, |a, b| a >= b)?,

        I32Clz => unary_i32(context, |a| a.leading_zeros() as i32)?,
        I32Ctz => unary_i32(context, |a| a.trailing_zeros() as i32)?,
        I32Popcnt => unary_i32(context, |a| a.count_ones() as i32)?,
        I32Add => binary_i32(context, |a, b| Ok(a.wrapping_add(b)))?,
        I32Sub => binary_i32(context, |a, b| Ok(a.wrapping_sub(b)))?,
        I32Mul => binary_i32(context, |a, b| Ok(a.wrapping_mul(b)))?,
        I32DivS => binary_i32(context, |a, b| {
            if b == 0 {
                Err(Trap::IntegerDivideByZero)
            } else if a == i32::MIN && b == -1 {
                Err(Trap::IntegerOverflow)
            } else {
                Ok(a / b)
            }
        })?,
        I32DivU => binary_u32(context, |a, b| if b == 0 { Err(Trap::IntegerDivideByZero) } else { Ok(a / b) })?,
        I32RemS => binary_i32(context, |a, b| {
            if b == 0 {
                Err(Trap::IntegerDivideByZero)
            } else if a == i32::MIN && b == -1 {
                Ok(0)
            } else {
                Ok(a % b)
            }
        })?,
        I32RemU => binary_u32(context, |a, b| if b == 0 { Err(Trap::IntegerDivideByZero) } else { Ok(a % b) })?,
        I32And => binary_i32(context, |a, b| Ok(a & b))?,
        I32Or => binary_i32(context, |a, b| Ok(a | b))?,
        I32Xor => binary_i32(context, |a, b| Ok(a ^ b))?,
        I32Shl => binary_i32(context, |a, b| Ok(a.wrapping_shl(b as u32 & 31)))?,
        I32ShrS => binary_i32(context, |a, b| Ok(a.wrapping_shr(b as u32 & 31)))?,
        I32ShrU => binary_u32(context, |a, b| Ok(a.wrapping_shr(b & 31)))?,
        I32Rotl => binary_u32(context, |a, b| Ok(a.rotate_left(b & 31)))?,
        I32Rotr => binary_u32(context, |a, b| Ok(a.rotate_right(b & 31)))?,

        I64Clz => unary_i64(context, |a| a.leading_zeros() as i64)?,
        I64Ctz => unary_i64(context, |a| a.trailing_zeros() as i64)?,
        I64Popcnt => unary_i64(context, |a| a.count_ones() as i64)?,
        I64Add => binary_i64(context, |a, b| Ok(a.wrapping_add(b)))?,
        I64Sub => binary_i64(context, |a, b| Ok(a.wrapping_sub(b)))?,
        I64Mul => binary_i64(context, |a, b| Ok(a.wrapping_mul(b)))?,
        I64DivS => binary_i64(context, |a, b| {
            if b == 0 {
                Err(Trap::IntegerDivideByZero)
            } else if a == i64::MIN && b == -1 {
                Err(Trap::IntegerOverflow)
            } else {
                Ok(a / b)
            }
        })?,
        I64DivU => binary_u64(context, |a, b| if b == 0 { Err(Trap::IntegerDivideByZero) } else { Ok(a / b) })?,
        I64RemS => binary_i64(context, |a, b| {
            if b == 0 {
                Err(Trap::IntegerDivideByZero)
            } else if a == i64::MIN && b == -1 {
                Ok(0)
            } else {
                Ok(a % b)
            }
        })?,
        I64RemU => binary_u64(context, |a, b| if b == 0 { Err(Trap::IntegerDivideByZero) } else { Ok(a % b) })?,
        I64And => binary_i64(context, |a, b| Ok(a & b))?,
        I64Or => binary_i64(context, |a, b| Ok(a | b))?,
        I64Xor => binary_i64(context, |a, b| Ok(a ^ b))?,
        I64Shl => binary_i64(context, |a, b| Ok(a.wrapping_shl(b as u32 & 63)))?,
        I64ShrS => binary_i64(context, |a, b| Ok(a.wrapping_shr(b as u32 & 63)))?,
        I64ShrU => binary_u64(context, |a, b| Ok(a.wrapping_shr(b as u32 & 63)))?,
        I64Rotl => binary_u64(context, |a, b| Ok(a.rotate_left(b as u32 & 63)))?,
        I64Rotr => binary_u64(context, |a, b| Ok(a.rotate_right(b as u32 & 63)))?,

        F32Abs => unary_f32(context, |a| a.abs())?,
        F32Neg => unary_f32(context, |a| -a)?,
        F32Ceil => unary_f32(context, |a| a.ceil())?,
        F32Floor => unary_f32(context, |a| a.floor())?,
        F32Trunc => unary_f32(context, |a| a.trunc())?,
        F32Nearest => unary_f32(context, round_nearest_even_f32)?,
        F32Sqrt => unary_f32(context, |a| a.sqrt())?,
        F32Add => binary_f32(context, |a, b| a + b)?,
        F32Sub => binary_f32(context, |a, b| a - b)?,
        F32Mul => binary_f32(context, |a, b| a * b)?,
        F32Div => binary_f32(context, |a, b| a / b)?,
        F32Min => binary_f32(context, wasm_min_f32)?,
        F32Max => binary_f32(context, wasm_max_f32)?,
        F32Copysign => binary_f32(context, f32::copysign)?,

        F64Abs => unary_f64(context, |a| a.abs())?,
        F64Neg => unary_f64(context, |a| -a)?,
        F64Ceil => unary_f64(context, |a| a.ceil())?,
        F64Floor => unary_f64(context, |a| a.floor())?,
        F64Trunc => unary_f64(context, |a| a.trunc())?,
        F64Nearest => unary_f64(context, round_nearest_even_f64)?,
        F64Sqrt => unary_f64(context, |a| a.sqrt())?,
        F64Add => binary_f64(context, |a, b| a + b)?,
        F64Sub => binary_f64(context, |a, b| a - b)?,
        F64Mul => binary_f64(context, |a, b| a * b)?,
        F64Div => binary_f64(context, |a, b| a / b)?,
        F64Min => binary_f64(context, wasm_min_f64)?,
        F64Max => binary_f64(context, wasm_max_f64)?,
        F64Copysign => binary_f64(context, f64::copysign)?,

        I32WrapI64 => {
            let a = context.pop_i64()?;
            context.push(Value::I32(a as i32));
        }
        I32TruncF32S => { let v = context.pop_f32()?; trunc_to_i32(context, v, true)? }
        I32TruncF32U => { let v = context.pop_f32()?; trunc_to_i32(context, v, false)? }
        I32TruncF64S => trunc_to_i32_from_f64(context, true)?,
        I32TruncF64U => trunc_to_i32_from_f64(context, false)?,
        I64ExtendI32S => {
            let a = context.pop_i32()?;
            context.push(Value::I64(a as i64));
        }
        I64ExtendI32U => {
            let a = context.pop_u32()?;
            context.push(Value::I64(a as i64));
        }
        I64TruncF32S => { let v = context.pop_f32()?; trunc_to_i64(context, v, true)? }
        I64TruncF32U => { let v = context.pop_f32()?; trunc_to_i64(context, v, false)? }
        I64TruncF64S => trunc_to_i64_from_f64(context, true)?,
        I64TruncF64U => trunc_to_i64_from_f64(context, false)?,
        F32ConvertI32S => {
            let a = context.pop_i32()?;
            context.push(Value::F32(a as f32));
        }
        F32ConvertI32U => {
            let a = context.pop_u32()?;
            context.push(Value::F32(a as f32));
        }
        F32ConvertI64S => {
            let a = context.pop_i64()?;
            context.push(Value::F32(a as f32));
        }
        F32ConvertI64U => {
            let a = context.pop_i64()? as u64;
            context.push(Value::F32(a as f32));
        }
        F32DemoteF64 => {
            let a = context.pop_f64()?;
            context.push(Value::F32(a as f32));
        }
        F64ConvertI32S => {
            let a = context.pop_i32()?;
            context.push(Value::F64(a as f64));
        }
        F64ConvertI32U => {
            let a = context.pop_u32()?;
            context.push(Value::F64(a as f64));
        }
        F64ConvertI64S => {
            let a = context.pop_i64()?;
            context.push(Value::F64(a as f64));
        }
        F64ConvertI64U => {
            let a = context.pop_i64()? as u64;
            context.push(Value::F64(a as f64));
        }
        F64PromoteF32 => {
            let a = context.pop_f32()?;
            context.push(Value::F64(a as f64));
        }
        I32ReinterpretF32 => {
            let a = context.pop_f32()?;
            context.push(Value::I32(a.to_bits() as i32));
        }
        I64ReinterpretF64 => {
            let a = context.pop_f64()?;
            context.push(Value::I64(a.to_bits() as i64));
        }
        F32ReinterpretI32 => {
            let a = context.pop_i32()?;
            context.push(Value::F32(f32::from_bits(a as u32)));
        }
        F64ReinterpretI64 => {
            let a = context.pop_i64()?;
            context.push(Value::F64(f64::from_bits(a as u64)));
        }
    }
    Ok(())
}

/// Runs a nested block body; on return, decrements a break targeting an enclosing label
/// and, when the block itself was the target, trims the stack down to the block's arity.
fn run_block(context: &mut Context, arity: usize, body: &[Instruction]) -> Result<(), Trap> {
    let base = context.value_stack.len();
    run_sequence(context, body)?;
    if context.break_depth == 0 {
        let results = context.value_stack.split_off(context.value_stack.len().saturating_sub(arity));
        context.value_stack.truncate(base);
        context.value_stack.extend(results);
        context.break_depth = -1;
    } else if context.break_depth > 0 {
        context.break_depth -= 1;
    }
    Ok(())
}

fn do_call(context: &mut Context, function_index: usize) -> Result<(), Trap> {
    let def = context.instance.functions.get(function_index).ok_or(Trap::UndefinedElement)?;
    let arity = def.signature().params.len();
    if context.value_stack.len() < arity {
        return Err(Trap::ValueStackUnderflow);
    }
    let args: Vec<Value> = context.value_stack.split_off(context.value_stack.len() - arity);
    let results = dispatch_call(context, def, function_index, &args)?;
    context.value_stack.extend(results);
    Ok(())
}

fn do_call_indirect(context: &mut Context, type_index: u32) -> Result<(), Trap> {
    let table = context.instance.tables.first().ok_or(Trap::UndefinedElement)?;
    let element_index = context.pop_u32()?;
    let slot = table.borrow().get(element_index)?;
    let function_index = match slot {
        TableSlot::Uninitialized => return Err(Trap::UninitializedElement),
        TableSlot::Function(index) => index,
    };

    let def = context.instance.functions.get(function_index).ok_or(Trap::UndefinedElement)?;
    let expected = context.instance.types.get(type_index as usize).ok_or(Trap::IndirectCallTypeMismatch)?;
    if !def.signature().matches(expected) {
        return Err(Trap::IndirectCallTypeMismatch);
    }

    let arity = def.signature().params.len();
    if context.value_stack.len() < arity {
        return Err(Trap::ValueStackUnderflow);
    }
    let args: Vec<Value> = context.value_stack.split_off(context.value_stack.len() - arity);
    let results = dispatch_call(context, def, function_index, &args)?;
    context.value_stack.extend(results);
    Ok(())
}

/// Shared tail of `call`/`call_indirect`: checks the caller's own stack-depth budget
/// before doing anything else, then either invokes a host callback/thrown error directly
/// or recurses into the interpreter for a Wasm-defined function. Only the `Interpreted`
/// case needs an [`InstanceHandle`] at all, since only it can recurse further.
fn dispatch_call(
    context: &Context,
    def: &FunctionDefinition,
    function_index: usize,
    args: &[Value],
) -> Result<Vec<Value>, Trap> {
    if context.call_depth + 1 >= context.policy.max_call_stack_depth {
        return Err(Trap::CallStackExhausted);
    }
    match def {
        FunctionDefinition::Delegate { callback, .. } => {
            trace!(function_index, "calling delegate function");
            callback(args)
        }
        FunctionDefinition::Throw { error, .. } => Err(error.clone()),
        FunctionDefinition::Interpreted { instance: owner, .. } => {
            let owner: InstanceHandle = owner.upgrade().ok_or_else(|| Trap::Host("owning instance dropped".to_string()))?;
            invoke(&owner, function_index, args, context.call_depth + 1)
        }
    }
}

fn load_and_push<T: Into<Value>>(
    context: &mut Context,
    mem_arg: &MemArg,
    read: impl FnOnce(&crate::runtime::memory::LinearMemory, u64) -> Result<T, Trap>,
) -> Result<(), Trap> {
    let base = context.pop_u32()?;
    let addr = effective_address(base, mem_arg)?;
    check_alignment(&context.policy, addr, mem_arg)?;
    let memory = context.instance.memories.first().ok_or(Trap::OutOfBoundsMemoryAccess)?;
    let value = read(&memory.borrow(), addr)?;
    context.push(value.into());
    Ok(())
}

fn store_from_stack<T>(
    context: &mut Context,
    mem_arg: &MemArg,
    write: impl FnOnce(&mut crate::runtime::memory::LinearMemory, u64, T) -> Result<(), Trap>,
) -> Result<(), Trap>
where
    T: StoreOperand,
{
    let value = context.pop()?;
    let base = context.pop_u32()?;
    let addr = effective_address(base, mem_arg)?;
    check_alignment(&context.policy, addr, mem_arg)?;
    let value = T::from_value(value)?;
    let memory = context.instance.memories.first().ok_or(Trap::OutOfBoundsMemoryAccess)?;
    write(&mut memory.borrow_mut(), addr, value)
}

fn effective_address(base: u32, mem_arg: &MemArg) -> Result<u64, Trap> {
    (base as u64).checked_add(mem_arg.offset as u64).ok_or(Trap::OutOfBoundsMemoryAccess)
}

/// `mem_arg.align` is the wire-encoded log2 of the natural alignment in bytes. Only
/// checked when the policy opts in — the MVP permits any alignment hint and treats it as
/// a no-op performance annotation by default.
fn check_alignment(policy: &ExecutionPolicy, addr: u64, mem_arg: &MemArg) -> Result<(), Trap> {
    if policy.enforce_alignment && addr % (1u64 << mem_arg.align) != 0 {
        return Err(Trap::MisalignedMemoryAccess);
    }
    Ok(())
}

fn unary_i32(context: &mut Context, f: impl FnOnce(i32) -> i32) -> Result<(), Trap> {
    let a = context.pop_i32()?;
    context.push(Value::I32(f(a)));
    Ok(())
}

fn unary_i64(context: &mut Context, f: impl FnOnce(i64) -> i64) -> Result<(), Trap> {
    let a = context.pop_i64()?;
    context.push(Value::I64(f(a)));
    Ok(())
}

fn unary_f32(context: &mut Context, f: impl FnOnce(f32) -> f32) -> Result<(), Trap> {
    let a = context.pop_f32()?;
    context.push(Value::F32(f(a)));
    Ok(())
}

fn unary_f64(context: &mut Context, f: impl FnOnce(f64) -> f64) -> Result<(), Trap> {
    let a = context.pop_f64()?;
    context.push(Value::F64(f(a)));
    Ok(())
}

fn binary_i32(context: &mut Context, f: impl FnOnce(i32, i32) -> Result<i32, Trap>) -> Result<(), Trap> {
    let b = context.pop_i32()?;
    let a = context.pop_i32()?;
    context.push(Value::I32(f(a, b)?));
    Ok(())
}

fn binary_u32(context: &mut Context, f: impl FnOnce(u32, u32) -> Result<u32, Trap>) -> Result<(), Trap> {
    let b = context.pop_u32()?;
    let a = context.pop_u32()?;
    context.push(Value::I32(f(a, b)? as i32));
    Ok(())
}

fn binary_i64(context: &mut Context, f: impl FnOnce(i64, i64) -> Result<i64, Trap>) -> Result<(), Trap> {
    let b = context.pop_i64()?;
    let a = context.pop_i64()?;
    context.push(Value::I64(f(a, b)?));
    Ok(())
}

fn binary_u64(context: &mut Context, f: impl FnOnce(u64, u64) -> Result<u64, Trap>) -> Result<(), Trap> {
    let b = context.pop_i64()? as u64;
    let a = context.pop_i64()? as u64;
    context.push(Value::I64(f(a, b)? as i64));
    Ok(())
}

fn binary_f32(context: &mut Context, f: impl FnOnce(f32, f32) -> f32) -> Result<(), Trap> {
    let b = context.pop_f32()?;
    let a = context.pop_f32()?;
    context.push(Value::F32(f(a, b)));
    Ok(())
}

fn binary_f64(context: &mut Context, f: impl FnOnce(f64, f64) -> f64) -> Result<(), Trap> {
    let b = context.pop_f64()?;
    let a = context.pop_f64()?;
    context.push(Value::F64(f(a, b)));
    Ok(())
}

fn compare_i32(context: &mut Context, f: impl FnOnce(i32, i32) -> bool) -> Result<(), Trap> {
    let b = context.pop_i32()?;
    let a = context.pop_i32()?;
    context.push(Value::I32(f(a, b) as i32));
    Ok(())
}

fn compare_u32(context: &mut Context, f: impl FnOnce(u32, u32) -> bool) -> Result<(), Trap> {
    let b = context.pop_u32()?;
    let a = context.pop_u32()?;
    context.push(Value::I32(f(a, b) as i32));
    Ok(())
}

fn compare_i64(context: &mut Context, f: impl FnOnce(i64, i64) -> bool) -> Result<(), Trap> {
    let b = context.pop_i64()?;
    let a = context.pop_i64()?;
    context.push(Value::I32(f(a, b) as i32));
    Ok(())
}

fn compare_u64(context: &mut Context, f: impl FnOnce(u64, u64) -> bool) -> Result<(), Trap> {
    let b = context.pop_i64()? as u64;
    let a = context.pop_i64()? as u64;
    context.push(Value::I32(f(a, b) as i32));
    Ok(())
}

fn compare_f32(context: &mut Context, f: impl FnOnce(f32, f32) -> bool) -> Result<(), Trap> {
    let b = context.pop_f32()?;
    let a = context.pop_f32()?;
    context.push(Value::I32(f(a, b) as i32));
    Ok(())
}

fn compare_f64(context: &mut Context, f: impl FnOnce(f64, f64) -> bool) -> Result<(), Trap> {
    let b = context.pop_f64()?;
    let a = context.pop_f64()?;
    context.push(Value::I32(f(a, b) as i32));
    Ok(())
}

fn wasm_min_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.min(b)
    }
}

fn wasm_max_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.max(b)
    }
}

fn wasm_min_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn wasm_max_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn round_nearest_even_f32(a: f32) -> f32 {
    let rounded = a.round();
    if (a.fract().abs() - 0.5).abs() < f32::EPSILON && (rounded as i64) % 2 != 0 {
        rounded - a.signum()
    } else {
        rounded
    }
}

fn round_nearest_even_f64(a: f64) -> f64 {
    let rounded = a.round();
    if (a.fract().abs() - 0.5).abs() < f64::EPSILON && (rounded as i64) % 2 != 0 {
        rounded - a.signum()
    } else {
        rounded
    }
}

fn trunc_to_i32(context: &mut Context, value: f32, signed: bool) -> Result<(), Trap> {
    check_truncatable(value as f64)?;
    let (min, max) = if signed { (i32::MIN as f64, i32::MAX as f64 + 1.0) } else { (0.0, u32::MAX as f64 + 1.0) };
    let v = value as f64;
    if v < min || v >= max {
        return Err(Trap::IntegerOverflow);
    }
    context.push(Value::I32(if signed { v as i32 } else { (v as u32) as i32 }));
    Ok(())
}

fn trunc_to_i32_from_f64(context: &mut Context, signed: bool) -> Result<(), Trap> {
    let value = context.pop_f64()?;
    check_truncatable(value)?;
    let (min, max) = if signed { (i32::MIN as f64, i32::MAX as f64 + 1.0) } else { (0.0, u32::MAX as f64 + 1.0) };
    if value < min || value >= max {
        return Err(Trap::IntegerOverflow);
    }
    context.push(Value::I32(if signed { value as i32 } else { (value as u32) as i32 }));
    Ok(())
}

fn trunc_to_i64(context: &mut Context, value: f32, signed: bool) -> Result<(), Trap> {
    check_truncatable(value as f64)?;
    let v = value as f64;
    // i64::MAX/u64::MAX round up to exactly 2^63/2^64 as f64, so the cap itself is already
    // out of range and belongs on the `>=` side, same as the i32 paths above.
    let (min, max) = if signed { (i64::MIN as f64, i64::MAX as f64) } else { (0.0, u64::MAX as f64) };
    if v < min || v >= max {
        return Err(Trap::IntegerOverflow);
    }
    context.push(Value::I64(if signed { v as i64 } else { (v as u64) as i64 }));
    Ok(())
}

fn trunc_to_i64_from_f64(context: &mut Context, signed: bool) -> Result<(), Trap> {
    let value = context.pop_f64()?;
    check_truncatable(value)?;
    let (min, max) = if signed { (i64::MIN as f64, i64::MAX as f64) } else { (0.0, u64::MAX as f64) };
    if value < min || value >= max {
        return Err(Trap::IntegerOverflow);
    }
    context.push(Value::I64(if signed { value as i64 } else { (value as u64) as i64 }));
    Ok(())
}

fn check_truncatable(value: f64) -> Result<(), Trap> {
    if value.is_nan() {
        Err(Trap::InvalidConversionToInteger)
    } else if value.is_infinite() {
        Err(Trap::IntegerOverflow)
    } else {
        Ok(())
    }
}

/// Narrows a popped [`Value`] down to the width a store instruction actually writes
/// (`i32.store8` truncates to `i8`, etc. — widths `Value` itself doesn't model).
trait StoreOperand: Sized {
    fn from_value(value: Value) -> Result<Self, Trap>;
}

impl StoreOperand for i32 {
    fn from_value(value: Value) -> Result<i32, Trap> {
        i32::try_from(value)
    }
}

impl StoreOperand for i64 {
    fn from_value(value: Value) -> Result<i64, Trap> {
        i64::try_from(value)
    }
}

impl StoreOperand for f32 {
    fn from_value(value: Value) -> Result<f32, Trap> {
        f32::try_from(value)
    }
}

impl StoreOperand for f64 {
    fn from_value(value: Value) -> Result<f64, Trap> {
        f64::try_from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::instr::Instruction as I;
    use crate::module::section::{ExportDesc, FunctionBody};
    use crate::module::types::FunctionSignature;
    use crate::module::Module;
    use crate::runtime::importer::EmptyImporter;
    use crate::runtime::instance::instantiate;
    use std::rc::Rc;

    fn build_add_module() -> Module {
        let mut module = Module::new();
        let type_index =
            module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32])));
        let function_index = module.add_function(
            type_index,
            FunctionBody { locals: vec![], body: vec![I::LocalGet(0), I::LocalGet(1), I::I32Add], extra: vec![] },
        );
        module.add_export("add", ExportDesc::Function(function_index));
        module
    }

    #[test]
    fn add_function_returns_sum() {
        let module = build_add_module();
        let instance = instantiate(&module, &EmptyImporter, None).unwrap();
        let index = instance.exported_function_index("add").unwrap();
        let result = call_function(&instance, index, &[Value::I32(2), Value::I32(3)]).unwrap();
        assert_eq!(result, vec![Value::I32(5)]);
    }

    #[test]
    fn factorial_with_loop() {
        use crate::module::types::BlockType;
        let mut module = Module::new();
        let type_index = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32], vec![ValueType::I32])));
        // locals: [n, acc]; acc starts at 1, multiply while n > 0, decrementing n.
        let body = vec![
            I::I32Const(1),
            I::LocalSet(1),
            I::Loop {
                block_type: BlockType::Empty,
                body: vec![
                    I::LocalGet(0),
                    I::I32Eqz,
                    I::BrIf { label: 1 },
                    I::LocalGet(1),
                    I::LocalGet(0),
                    I::I32Mul,
                    I::LocalSet(1),
                    I::LocalGet(0),
                    I::I32Const(1),
                    I::I32Sub,
                    I::LocalSet(0),
                    I::Br { label: 0 },
                ],
            },
            I::LocalGet(1),
        ];
        let function_index = module.add_function(
            type_index,
            FunctionBody { locals: vec![(1, ValueType::I32)], body, extra: vec![] },
        );
        module.add_export("fact", ExportDesc::Function(function_index));

        let instance = instantiate(&module, &EmptyImporter, None).unwrap();
        let index = instance.exported_function_index("fact").unwrap();
        assert_eq!(call_function(&instance, index, &[Value::I32(5)]).unwrap(), vec![Value::I32(120)]);
        assert_eq!(call_function(&instance, index, &[Value::I32(0)]).unwrap(), vec![Value::I32(1)]);
    }

    fn empty_context(instance: &ModuleInstance, value_stack: Vec<Value>) -> Context {
        Context {
            instance,
            locals: vec![],
            value_stack,
            expected_returns: &[],
            policy: ExecutionPolicy::default(),
            call_depth: 0,
            break_depth: -1,
            return_values: None,
        }
    }

    #[test]
    fn division_by_zero_traps_before_overflow_check() {
        let instance = instantiate(&Module::new(), &EmptyImporter, None).unwrap();
        let mut context = empty_context(&instance, vec![Value::I32(i32::MIN), Value::I32(0)]);
        let err = binary_i32(&mut context, |a, b| {
            if b == 0 {
                Err(Trap::IntegerDivideByZero)
            } else if a == i32::MIN && b == -1 {
                Err(Trap::IntegerOverflow)
            } else {
                Ok(a / b)
            }
        })
        .unwrap_err();
        assert!(matches!(err, Trap::IntegerDivideByZero));
    }

    #[test]
    fn int_min_rem_neg_one_is_zero() {
        let instance = instantiate(&Module::new(), &EmptyImporter, None).unwrap();
        let mut context = empty_context(&instance, vec![Value::I32(i32::MIN), Value::I32(-1)]);
        binary_i32(&mut context, |a, b| {
            if b == 0 {
                Err(Trap::IntegerDivideByZero)
            } else if a == i32::MIN && b == -1 {
                Ok(0)
            } else {
                Ok(a % b)
            }
        })
        .unwrap();
        assert_eq!(context.value_stack, vec![Value::I32(0)]);
    }

    #[test]
    fn float_to_int_nan_traps_invalid_conversion() {
        assert!(matches!(check_truncatable(f64::NAN), Err(Trap::InvalidConversionToInteger)));
        assert!(matches!(check_truncatable(f64::INFINITY), Err(Trap::IntegerOverflow)));
    }

    #[test]
    fn indirect_call_type_mismatch_traps() {
        use crate::module::section::ElementSegment;
        use crate::module::types::TableType;
        use crate::module::types::{ElementType, Limits};

        let mut module = Module::new();
        let callee_type = module.add_type(Rc::new(FunctionSignature::new(vec![], vec![ValueType::I32])));
        let caller_type = module.add_type(Rc::new(FunctionSignature::new(vec![ValueType::I32], vec![ValueType::I32])));
        let callee_index = module.add_function(
            callee_type,
            FunctionBody { locals: vec![], body: vec![I::I32Const(7)], extra: vec![] },
        );
        module.add_table(TableType { element_type: ElementType::AnyFunc, limits: Limits { initial: 1, maximum: None } });
        module.add_element_segment(0, vec![I::I32Const(0)], vec![callee_index]);

        let caller_body = vec![I::I32Const(0), I::CallIndirect { type_index: caller_type }];
        let caller_index = module.add_function(
            callee_type,
            FunctionBody { locals: vec![], body: caller_body, extra: vec![] },
        );
        module.add_export("caller", ExportDesc::Function(caller_index));

        let instance = instantiate(&module, &EmptyImporter, None).unwrap();
        let index = instance.exported_function_index("caller").unwrap();
        let err = call_function(&instance, index, &[]).unwrap_err();
        assert!(matches!(err, Trap::IndirectCallTypeMismatch));
    }
}
