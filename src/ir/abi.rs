// This module lowers calls into the Linux x86-64 syscall convention. Arguments go in
// RDI, RSI, RDX, R10, R8, R9 in order; the selector and result share RAX; the kernel
// clobbers RCX and R11. Before moving arguments into place, every convention register
// currently holding a live value is pushed and recorded; after the trap and the result
// move the recorded registers are popped in reverse, unconditionally, so caller state
// survives whether or not the result is consumed. More than six arguments is an error,
// not a spill: the convention has no stack argument slots for syscalls.

//! Linux syscall ABI lowering and the canned syscall constructors.

use log::debug;

use crate::core::{CompileError, CompileResult};
use crate::x64::opcode::Instruction;
use crate::x64::operand::{Operand, Register, R10, R11, R8, R9, RAX, RCX, RDI, RDX, RSI};
use crate::x64::opcodes;

use super::context::LoweringContext;
use super::expr::Expr;
use super::types::IrType;

/// Argument registers, in convention order.
pub const SYSCALL_ARG_REGS: [Register; 6] = [RDI, RSI, RDX, R10, R8, R9];

/// Registers the kernel may trash across the trap, plus the result register.
pub const SYSCALL_CLOBBERED: [Register; 3] = [RCX, R11, RAX];

/// Linux syscall selectors used by the canned constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum LinuxSyscall {
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
}

/// Stage a call: save live convention registers, then lower each argument
/// into its register. Returns the emitted sequence, the result operand and
/// the saved registers (in push order) for [`restore_registers`].
pub fn abi_call_setup(
    ctx: &mut LoweringContext<'_>,
    args: &[Expr],
    return_type: IrType,
) -> CompileResult<(Vec<Instruction>, Operand, Vec<Register>)> {
    if args.len() > SYSCALL_ARG_REGS.len() {
        return Err(CompileError::AbiSetup {
            reason: format!(
                "syscall takes at most {} arguments, got {}",
                SYSCALL_ARG_REGS.len(),
                args.len()
            ),
        });
    }
    debug!("abi setup: {} args, returns {return_type}", args.len());

    let mut sequence = Vec::new();
    let mut saved = Vec::new();
    for reg in SYSCALL_ARG_REGS.iter().chain(SYSCALL_CLOBBERED.iter()) {
        if ctx.is_in_use(*reg) {
            let push = opcodes::push(Operand::Reg(*reg)).ok_or_else(|| {
                CompileError::NoOpcodeMatch {
                    mnemonic: "push",
                    operands: reg.to_string(),
                }
            })?;
            ctx.add_instruction(push.clone());
            sequence.push(push);
            saved.push(*reg);
        }
    }

    for (arg, reg) in args.iter().zip(SYSCALL_ARG_REGS) {
        sequence.extend(arg.encode(ctx, Operand::Reg(reg))?);
    }

    Ok((sequence, Operand::Reg(RAX), saved))
}

/// Pop the registers saved by [`abi_call_setup`], most recent first.
pub fn restore_registers(
    ctx: &mut LoweringContext<'_>,
    saved: &[Register],
) -> Vec<Instruction> {
    let mut sequence = Vec::new();
    for reg in saved.iter().rev() {
        // Push always resolved for these registers, so pop does too.
        if let Some(pop) = opcodes::pop(Operand::Reg(*reg)) {
            ctx.add_instruction(pop.clone());
            sequence.push(pop);
        }
    }
    sequence
}

/// `write(fd, buffer, size)`.
pub fn linux_write(fd: Expr, bytes: &[u8], size: usize) -> Expr {
    Expr::Syscall {
        number: Box::new(Expr::U64(LinuxSyscall::Write as u64)),
        args: vec![
            fd,
            Expr::ByteArray(bytes.to_vec()),
            Expr::U64(size as u64),
        ],
    }
}

/// `open(filename, flags, mode)`. The filename gets a trailing NUL, the
/// convention passes a C string.
pub fn linux_open(filename: &str, flags: u64, mode: u64) -> Expr {
    let mut bytes = filename.as_bytes().to_vec();
    bytes.push(0);
    Expr::Syscall {
        number: Box::new(Expr::U64(LinuxSyscall::Open as u64)),
        args: vec![Expr::ByteArray(bytes), Expr::U64(flags), Expr::U64(mode)],
    }
}

/// `close(fd)`.
pub fn linux_close(fd: u64) -> Expr {
    Expr::Syscall {
        number: Box::new(Expr::U64(LinuxSyscall::Close as u64)),
        args: vec![Expr::U64(fd)],
    }
}
