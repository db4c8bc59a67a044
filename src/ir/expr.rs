// This module defines the IR expression tree as a closed tagged union and its encode
// protocol. Each variant supports: return_type (static type, context consulted only for
// symbol lookups), Display (diagnostic rendering), add_to_data_section (recursive
// registration of literal data the expression needs resident before code generation,
// errors propagating unchanged), encode (emit the instruction sequence computing the
// value into a target operand, appending each instruction to the context and returning
// the same sequence for local composition), and ssa_transform (auxiliary rewrite
// assignments plus a replacement expression; a no-op returns no rewrites and the node
// unchanged). Literals lower to a single move-class instruction of their immediate bit
// pattern; floats reinterpret, they do not coerce. Arithmetic lowers the left side into
// the target, the right side into an immediate form or a scratch register, then the ALU
// instruction. Syscalls delegate to the ABI lowering: argument setup, selector into
// RAX, the trap, the result move, then the unconditional clobber restore sequence.

//! IR expressions and the encode protocol.

use std::fmt;

use log::debug;

use crate::core::{CompileError, CompileResult};
use crate::x64::opcode::Instruction;
use crate::x64::operand::{classify, Operand, RAX};
use crate::x64::opcodes;

use super::abi::{abi_call_setup, restore_registers};
use super::context::LoweringContext;
use super::ssa::{SsaContext, SsaRewrite};
use super::types::IrType;

/// The closed set of expression variants.
///
/// Children are owned exclusively by their parent; the tree is acyclic by
/// construction and expressions carry no mutable state of their own.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F64(f64),
    /// A byte buffer; evaluates to its data-section address.
    ByteArray(Vec<u8>),
    /// Reference to a bound variable.
    Var(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    /// A system call: selector expression plus argument expressions in
    /// calling-convention order.
    Syscall {
        number: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Static type of the value this expression computes.
    pub fn return_type(&self, ctx: &LoweringContext<'_>) -> CompileResult<IrType> {
        match self {
            Expr::U8(_) => Ok(IrType::U8),
            Expr::U16(_) => Ok(IrType::U16),
            Expr::U32(_) => Ok(IrType::U32),
            Expr::U64(_) => Ok(IrType::U64),
            Expr::F64(_) => Ok(IrType::F64),
            Expr::ByteArray(_) => Ok(IrType::ByteArray),
            Expr::Var(name) => ctx
                .lookup(name)
                .map(|symbol| symbol.ty)
                .ok_or_else(|| CompileError::UndefinedVariable { name: name.clone() }),
            Expr::Add(lhs, _) | Expr::Sub(lhs, _) => lhs.return_type(ctx),
            Expr::Syscall { .. } => Ok(IrType::U64),
        }
    }

    /// Recursively register literal data this expression needs resident in
    /// the data section. Descendant failures propagate unchanged.
    pub fn add_to_data_section(&self, ctx: &mut LoweringContext<'_>) -> CompileResult<()> {
        match self {
            Expr::ByteArray(bytes) => {
                ctx.register_data(bytes);
                Ok(())
            }
            Expr::Add(lhs, rhs) | Expr::Sub(lhs, rhs) => {
                lhs.add_to_data_section(ctx)?;
                rhs.add_to_data_section(ctx)
            }
            Expr::Syscall { number, args } => {
                number.add_to_data_section(ctx)?;
                for arg in args {
                    arg.add_to_data_section(ctx)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Emit the instruction sequence computing this expression into
    /// `target`, appending each instruction to the context as a side effect
    /// and returning the same sequence for local composition.
    pub fn encode(
        &self,
        ctx: &mut LoweringContext<'_>,
        target: Operand,
    ) -> CompileResult<Vec<Instruction>> {
        match self {
            Expr::U8(v) => encode_literal(ctx, target, Operand::U8(*v)),
            Expr::U16(v) => encode_literal(ctx, target, Operand::U16(*v)),
            Expr::U32(v) => encode_literal(ctx, target, Operand::U32(*v)),
            Expr::U64(v) => encode_literal(ctx, target, Operand::U64(*v)),
            Expr::F64(v) => encode_literal(ctx, target, Operand::F64(*v)),
            Expr::ByteArray(bytes) => {
                let address =
                    ctx.data_address(bytes)
                        .ok_or_else(|| CompileError::DataSection {
                            reason: "byte array was not registered before encoding".to_string(),
                        })?;
                encode_literal(ctx, target, Operand::U64(address))
            }
            Expr::Var(name) => {
                let symbol = ctx
                    .lookup(name)
                    .ok_or_else(|| CompileError::UndefinedVariable { name: name.clone() })?;
                let instruction = select_mov(target, symbol.operand)?;
                ctx.add_instruction(instruction.clone());
                Ok(vec![instruction])
            }
            Expr::Add(lhs, rhs) => encode_alu(ctx, target, lhs, rhs, opcodes::add, "add"),
            Expr::Sub(lhs, rhs) => encode_alu(ctx, target, lhs, rhs, opcodes::sub, "sub"),
            Expr::Syscall { number, args } => encode_syscall(ctx, target, number, args),
        }
    }

    /// Rewrite into static-single-assignment form.
    ///
    /// Leaves and syscalls are no-ops; arithmetic hoists non-trivial
    /// children into fresh temporaries, each assigned exactly once.
    pub fn ssa_transform(&self, ssa: &mut SsaContext) -> (Vec<SsaRewrite>, Expr) {
        match self {
            Expr::Add(lhs, rhs) => transform_binary(ssa, lhs, rhs, Expr::Add),
            Expr::Sub(lhs, rhs) => transform_binary(ssa, lhs, rhs, Expr::Sub),
            _ => (Vec::new(), self.clone()),
        }
    }

    /// Trivial expressions need no SSA hoisting.
    fn is_trivial(&self) -> bool {
        matches!(
            self,
            Expr::U8(_)
                | Expr::U16(_)
                | Expr::U32(_)
                | Expr::U64(_)
                | Expr::F64(_)
                | Expr::Var(_)
        )
    }

    /// The immediate operand form of a literal, if this is one.
    fn immediate_operand(&self) -> Option<Operand> {
        match *self {
            Expr::U8(v) => Some(Operand::U8(v)),
            Expr::U16(v) => Some(Operand::U16(v)),
            Expr::U32(v) => Some(Operand::U32(v)),
            Expr::U64(v) => Some(Operand::U64(v)),
            Expr::F64(v) => Some(Operand::F64(v)),
            _ => None,
        }
    }
}

fn select_mov(dst: Operand, src: Operand) -> CompileResult<Instruction> {
    opcodes::mov(dst, src).ok_or_else(|| CompileError::NoOpcodeMatch {
        mnemonic: "mov",
        operands: format!("{dst}, {src}"),
    })
}

fn encode_literal(
    ctx: &mut LoweringContext<'_>,
    target: Operand,
    immediate: Operand,
) -> CompileResult<Vec<Instruction>> {
    let instruction = select_mov(target, immediate)?;
    ctx.add_instruction(instruction.clone());
    Ok(vec![instruction])
}

fn transform_binary(
    ssa: &mut SsaContext,
    lhs: &Expr,
    rhs: &Expr,
    build: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> (Vec<SsaRewrite>, Expr) {
    let (mut rewrites, lhs) = lhs.ssa_transform(ssa);
    let (rhs_rewrites, rhs) = rhs.ssa_transform(ssa);
    rewrites.extend(rhs_rewrites);
    let lhs = hoist(ssa, &mut rewrites, lhs);
    let rhs = hoist(ssa, &mut rewrites, rhs);
    (rewrites, build(Box::new(lhs), Box::new(rhs)))
}

fn hoist(ssa: &mut SsaContext, rewrites: &mut Vec<SsaRewrite>, expr: Expr) -> Expr {
    if expr.is_trivial() {
        return expr;
    }
    let name = ssa.fresh_name();
    rewrites.push(SsaRewrite {
        name: name.clone(),
        expr,
    });
    Expr::Var(name)
}

fn encode_alu(
    ctx: &mut LoweringContext<'_>,
    target: Operand,
    lhs: &Expr,
    rhs: &Expr,
    select: fn(Operand, Operand) -> Option<Instruction>,
    mnemonic: &'static str,
) -> CompileResult<Vec<Instruction>> {
    let mut sequence = lhs.encode(ctx, target)?;

    if let Some(immediate) = rhs.immediate_operand() {
        let instruction = select(target, immediate).ok_or_else(|| CompileError::NoOpcodeMatch {
            mnemonic,
            operands: format!("{target}, {immediate}"),
        })?;
        ctx.add_instruction(instruction.clone());
        sequence.push(instruction);
        return Ok(sequence);
    }

    // The target holds the left value while the right side lowers. Pin it
    // so the scratch allocation cannot alias it and a nested call saves it
    // across the trap.
    let pinned = match target {
        Operand::Reg(reg) if !ctx.is_in_use(reg) => {
            ctx.reserve_gp(reg);
            Some(reg)
        }
        _ => None,
    };
    let result = encode_alu_rhs(ctx, target, rhs, select, mnemonic);
    if let Some(reg) = pinned {
        ctx.release_gp(reg);
    }
    sequence.extend(result?);
    Ok(sequence)
}

fn encode_alu_rhs(
    ctx: &mut LoweringContext<'_>,
    target: Operand,
    rhs: &Expr,
    select: fn(Operand, Operand) -> Option<Instruction>,
    mnemonic: &'static str,
) -> CompileResult<Vec<Instruction>> {
    let width = classify(&target).1;
    let scratch = ctx.allocate_gp(width)?;
    let mut sequence = match rhs.encode(ctx, Operand::Reg(scratch)) {
        Ok(sequence) => sequence,
        Err(e) => {
            ctx.release_gp(scratch);
            return Err(e);
        }
    };
    let instruction = match select(target, Operand::Reg(scratch)) {
        Some(instruction) => instruction,
        None => {
            ctx.release_gp(scratch);
            return Err(CompileError::NoOpcodeMatch {
                mnemonic,
                operands: format!("{target}, {scratch}"),
            });
        }
    };
    ctx.release_gp(scratch);
    ctx.add_instruction(instruction.clone());
    sequence.push(instruction);
    Ok(sequence)
}

fn encode_syscall(
    ctx: &mut LoweringContext<'_>,
    target: Operand,
    number: &Expr,
    args: &[Expr],
) -> CompileResult<Vec<Instruction>> {
    debug!("lowering syscall with {} args", args.len());

    // The target receives the result; saving and restoring it across the
    // call would pop the old value over the result move, so it drops out of
    // the preserved set for the duration of the setup.
    let unpinned = match target {
        Operand::Reg(reg) if ctx.is_in_use(reg) => {
            ctx.release_gp(reg);
            Some(reg)
        }
        _ => None,
    };
    let setup = abi_call_setup(ctx, args, IrType::U64);
    if let Some(reg) = unpinned {
        ctx.reserve_gp(reg);
    }
    let (mut sequence, _result, clobbered) = setup?;

    sequence.extend(number.encode(ctx, Operand::Reg(RAX))?);

    let trap = opcodes::syscall();
    ctx.add_instruction(trap.clone());
    sequence.push(trap);

    let result_move = select_mov(target, Operand::Reg(RAX))?;
    ctx.add_instruction(result_move.clone());
    sequence.push(result_move);

    // Unconditional, even when the call's result is discarded.
    sequence.extend(restore_registers(ctx, &clobbered));
    Ok(sequence)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::U8(v) => write!(f, "{v:#x}"),
            Expr::U16(v) => write!(f, "{v:#x}"),
            Expr::U32(v) => write!(f, "{v:#x}"),
            Expr::U64(v) => write!(f, "{v:#x}"),
            Expr::F64(v) => write!(f, "{v}"),
            Expr::ByteArray(bytes) => write!(f, "{bytes:#04x?}"),
            Expr::Var(name) => f.write_str(name),
            Expr::Add(lhs, rhs) => write!(f, "({lhs} + {rhs})"),
            Expr::Sub(lhs, rhs) => write!(f, "({lhs} - {rhs})"),
            Expr::Syscall { number, args } => {
                write!(f, "syscall({number}, [")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "])")
            }
        }
    }
}
