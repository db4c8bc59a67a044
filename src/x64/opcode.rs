// This module defines the static opcode definition model: OperandPattern (the abstract
// operand-type patterns an opcode declares per argument position, e.g. "8-bit
// register-or-memory"), Extension (the prefix families an encoding requires: REX,
// REX.W, VEX.128, VEX.256), the Opcode definition itself (mnemonic + ordered pattern
// list + required extensions, process-wide immutable), and Instruction (a resolved
// opcode paired with concrete operands). The declaration order of OperandPattern is a
// load-bearing contract: the resolver breaks ties between structurally equal candidates
// by sorting ascending on the first position's pattern ordinal and taking the first.
// Memory-only forms sort before register/memory forms, which sort before register-only
// forms; changing the order changes which encoding wins and is covered by tests.

//! Opcode definitions and resolved instructions.

use std::fmt;

use super::operand::Operand;

/// Operation mnemonics the lowering layer selects between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Mov,
    Add,
    Sub,
    Cmp,
    Push,
    Pop,
    Jmp,
    Syscall,
    Ret,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mnemonic::Mov => "mov",
            Mnemonic::Add => "add",
            Mnemonic::Sub => "sub",
            Mnemonic::Cmp => "cmp",
            Mnemonic::Push => "push",
            Mnemonic::Pop => "pop",
            Mnemonic::Jmp => "jmp",
            Mnemonic::Syscall => "syscall",
            Mnemonic::Ret => "ret",
        };
        f.write_str(s)
    }
}

/// Abstract operand-type pattern at one argument position.
///
/// Declaration order defines the resolver tie-break ordinal; treat it as a
/// fixed contract, not an implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum OperandPattern {
    M,
    M16,
    M32,
    M64,
    Rm8,
    Rm16,
    Rm32,
    Rm64,
    R8,
    R16,
    R32,
    R64,
    Rel8,
    Rel16,
    Rel32,
    Imm8,
    Imm16,
    Imm32,
    Imm64,
    Xmm1,
    Xmm2,
    Xmm1M64,
    Xmm2M64,
    Xmm2M128,
    Ymm1,
    Ymm2,
}

impl OperandPattern {
    /// Tie-break ordinal (ascending sort, take first).
    pub const fn ordinal(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for OperandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperandPattern::M => "m",
            OperandPattern::M16 => "m16",
            OperandPattern::M32 => "m32",
            OperandPattern::M64 => "m64",
            OperandPattern::Rm8 => "r/m8",
            OperandPattern::Rm16 => "r/m16",
            OperandPattern::Rm32 => "r/m32",
            OperandPattern::Rm64 => "r/m64",
            OperandPattern::R8 => "r8",
            OperandPattern::R16 => "r16",
            OperandPattern::R32 => "r32",
            OperandPattern::R64 => "r64",
            OperandPattern::Rel8 => "rel8",
            OperandPattern::Rel16 => "rel16",
            OperandPattern::Rel32 => "rel32",
            OperandPattern::Imm8 => "imm8",
            OperandPattern::Imm16 => "imm16",
            OperandPattern::Imm32 => "imm32",
            OperandPattern::Imm64 => "imm64",
            OperandPattern::Xmm1 => "xmm1",
            OperandPattern::Xmm2 => "xmm2",
            OperandPattern::Xmm1M64 => "xmm1/m64",
            OperandPattern::Xmm2M64 => "xmm2/m64",
            OperandPattern::Xmm2M128 => "xmm2/m128",
            OperandPattern::Ymm1 => "ymm1",
            OperandPattern::Ymm2 => "ymm2",
        };
        f.write_str(s)
    }
}

/// Prefix extension families an encoding may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Rex,
    RexW,
    Vex128,
    Vex256,
}

/// A static, immutable opcode definition.
///
/// Lifetime: process-wide constant table, never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub operands: &'static [OperandPattern],
    pub extensions: &'static [Extension],
}

impl Opcode {
    pub const fn new(
        mnemonic: Mnemonic,
        operands: &'static [OperandPattern],
        extensions: &'static [Extension],
    ) -> Self {
        Self {
            mnemonic,
            operands,
            extensions,
        }
    }

    pub fn has_extension(&self, extension: Extension) -> bool {
        self.extensions.contains(&extension)
    }

    /// True if the encoding carries any of REX, REX.W, VEX.128 or VEX.256.
    pub fn has_any_extension(&self) -> bool {
        !self.extensions.is_empty()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, pattern) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {pattern}")?;
            } else {
                write!(f, ", {pattern}")?;
            }
        }
        Ok(())
    }
}

/// A resolved opcode definition paired with its concrete operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {operand}")?;
            } else {
                write!(f, ", {operand}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::operand::{Operand, RAX};

    #[test]
    fn rm_patterns_sort_before_register_patterns() {
        assert!(OperandPattern::M.ordinal() < OperandPattern::Rm8.ordinal());
        assert!(OperandPattern::Rm8.ordinal() < OperandPattern::R8.ordinal());
        assert!(OperandPattern::R64.ordinal() < OperandPattern::Imm8.ordinal());
    }

    #[test]
    fn extension_queries() {
        let op = Opcode::new(
            Mnemonic::Mov,
            &[OperandPattern::Rm64, OperandPattern::R64],
            &[Extension::RexW],
        );
        assert!(op.has_extension(Extension::RexW));
        assert!(!op.has_extension(Extension::Rex));
        assert!(op.has_any_extension());
    }

    #[test]
    fn display_rendering() {
        let op = Opcode::new(
            Mnemonic::Mov,
            &[OperandPattern::Rm8, OperandPattern::Imm8],
            &[],
        );
        assert_eq!(op.to_string(), "mov r/m8, imm8");

        let instruction = Instruction::new(op, vec![Operand::Reg(RAX), Operand::U8(1)]);
        assert_eq!(instruction.to_string(), "mov rax, 0x1");
    }
}
