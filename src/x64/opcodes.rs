// This module carries the static opcode catalogue for the operations the lowering layer
// emits (MOV, ADD, SUB, CMP, PUSH, POP, JMP plus the zero-operand SYSCALL and RET) and
// the selection helpers that turn (mnemonic, concrete operands) into a resolved
// Instruction. The catalogue is deliberately a subset of the architecture: enough forms
// at widths 8/16/32/64 with the correct REX/REX.W extensions to cover generic
// move/arithmetic/compare/jump selection, not the full instruction set. Per-mnemonic
// OpcodeMaps are built once behind LazyLock and shared read-only across arbitrarily
// many lowering passes. Operand order is Intel style, destination first.

//! Static opcode catalogue and selection helpers.

use std::sync::LazyLock;

use log::trace;

use super::opcode::{Extension, Instruction, Mnemonic, Opcode, OperandPattern};
use super::opcode_map::OpcodeMaps;
use super::operand::Operand;

use Extension as E;
use OperandPattern as P;

static MOV_DEFS: [Opcode; 12] = [
    Opcode::new(Mnemonic::Mov, &[P::Rm8, P::Imm8], &[]),
    Opcode::new(Mnemonic::Mov, &[P::Rm8, P::Imm8], &[E::Rex]),
    Opcode::new(Mnemonic::Mov, &[P::Rm8, P::R8], &[]),
    Opcode::new(Mnemonic::Mov, &[P::R8, P::Rm8], &[]),
    Opcode::new(Mnemonic::Mov, &[P::Rm16, P::Imm16], &[]),
    Opcode::new(Mnemonic::Mov, &[P::Rm16, P::R16], &[]),
    Opcode::new(Mnemonic::Mov, &[P::Rm32, P::Imm32], &[]),
    Opcode::new(Mnemonic::Mov, &[P::Rm32, P::R32], &[]),
    Opcode::new(Mnemonic::Mov, &[P::R64, P::Imm64], &[E::RexW]),
    Opcode::new(Mnemonic::Mov, &[P::Rm64, P::Imm32], &[E::RexW]),
    Opcode::new(Mnemonic::Mov, &[P::Rm64, P::R64], &[E::RexW]),
    Opcode::new(Mnemonic::Mov, &[P::R64, P::Rm64], &[E::RexW]),
];

static ADD_DEFS: [Opcode; 9] = [
    Opcode::new(Mnemonic::Add, &[P::Rm8, P::Imm8], &[]),
    Opcode::new(Mnemonic::Add, &[P::Rm8, P::Imm8], &[E::Rex]),
    Opcode::new(Mnemonic::Add, &[P::Rm8, P::R8], &[]),
    Opcode::new(Mnemonic::Add, &[P::Rm32, P::Imm32], &[]),
    Opcode::new(Mnemonic::Add, &[P::Rm32, P::R32], &[]),
    Opcode::new(Mnemonic::Add, &[P::R32, P::Rm32], &[]),
    Opcode::new(Mnemonic::Add, &[P::Rm64, P::Imm32], &[E::RexW]),
    Opcode::new(Mnemonic::Add, &[P::Rm64, P::R64], &[E::RexW]),
    Opcode::new(Mnemonic::Add, &[P::R64, P::Rm64], &[E::RexW]),
];

static SUB_DEFS: [Opcode; 9] = [
    Opcode::new(Mnemonic::Sub, &[P::Rm8, P::Imm8], &[]),
    Opcode::new(Mnemonic::Sub, &[P::Rm8, P::Imm8], &[E::Rex]),
    Opcode::new(Mnemonic::Sub, &[P::Rm8, P::R8], &[]),
    Opcode::new(Mnemonic::Sub, &[P::Rm32, P::Imm32], &[]),
    Opcode::new(Mnemonic::Sub, &[P::Rm32, P::R32], &[]),
    Opcode::new(Mnemonic::Sub, &[P::R32, P::Rm32], &[]),
    Opcode::new(Mnemonic::Sub, &[P::Rm64, P::Imm32], &[E::RexW]),
    Opcode::new(Mnemonic::Sub, &[P::Rm64, P::R64], &[E::RexW]),
    Opcode::new(Mnemonic::Sub, &[P::R64, P::Rm64], &[E::RexW]),
];

static CMP_DEFS: [Opcode; 9] = [
    Opcode::new(Mnemonic::Cmp, &[P::Rm8, P::Imm8], &[]),
    Opcode::new(Mnemonic::Cmp, &[P::Rm8, P::Imm8], &[E::Rex]),
    Opcode::new(Mnemonic::Cmp, &[P::Rm8, P::R8], &[]),
    Opcode::new(Mnemonic::Cmp, &[P::Rm32, P::Imm32], &[]),
    Opcode::new(Mnemonic::Cmp, &[P::Rm32, P::R32], &[]),
    Opcode::new(Mnemonic::Cmp, &[P::R32, P::Rm32], &[]),
    Opcode::new(Mnemonic::Cmp, &[P::Rm64, P::Imm32], &[E::RexW]),
    Opcode::new(Mnemonic::Cmp, &[P::Rm64, P::R64], &[E::RexW]),
    Opcode::new(Mnemonic::Cmp, &[P::R64, P::Rm64], &[E::RexW]),
];

static PUSH_DEFS: [Opcode; 2] = [
    Opcode::new(Mnemonic::Push, &[P::R64], &[]),
    Opcode::new(Mnemonic::Push, &[P::R64], &[E::Rex]),
];

static POP_DEFS: [Opcode; 2] = [
    Opcode::new(Mnemonic::Pop, &[P::R64], &[]),
    Opcode::new(Mnemonic::Pop, &[P::R64], &[E::Rex]),
];

static JMP_DEFS: [Opcode; 2] = [
    Opcode::new(Mnemonic::Jmp, &[P::Rel8], &[]),
    Opcode::new(Mnemonic::Jmp, &[P::Rel32], &[]),
];

const SYSCALL_DEF: Opcode = Opcode::new(Mnemonic::Syscall, &[], &[]);
const RET_DEF: Opcode = Opcode::new(Mnemonic::Ret, &[], &[]);

static MOV_MAPS: LazyLock<OpcodeMaps<'static>> = LazyLock::new(|| OpcodeMaps::build(&MOV_DEFS, 2));
static ADD_MAPS: LazyLock<OpcodeMaps<'static>> = LazyLock::new(|| OpcodeMaps::build(&ADD_DEFS, 2));
static SUB_MAPS: LazyLock<OpcodeMaps<'static>> = LazyLock::new(|| OpcodeMaps::build(&SUB_DEFS, 2));
static CMP_MAPS: LazyLock<OpcodeMaps<'static>> = LazyLock::new(|| OpcodeMaps::build(&CMP_DEFS, 2));
static PUSH_MAPS: LazyLock<OpcodeMaps<'static>> =
    LazyLock::new(|| OpcodeMaps::build(&PUSH_DEFS, 1));
static POP_MAPS: LazyLock<OpcodeMaps<'static>> = LazyLock::new(|| OpcodeMaps::build(&POP_DEFS, 1));
static JMP_MAPS: LazyLock<OpcodeMaps<'static>> = LazyLock::new(|| OpcodeMaps::build(&JMP_DEFS, 1));

fn select2(maps: &OpcodeMaps<'static>, dst: Operand, src: Operand) -> Option<Instruction> {
    let opcode = maps.resolve(&[Some(dst), Some(src)])?;
    trace!("select: {} for {dst}, {src}", opcode);
    Some(Instruction::new(*opcode, vec![dst, src]))
}

fn select1(maps: &OpcodeMaps<'static>, operand: Operand) -> Option<Instruction> {
    let opcode = maps.resolve(&[Some(operand)])?;
    Some(Instruction::new(*opcode, vec![operand]))
}

/// Select a MOV encoding for the given destination and source.
pub fn mov(dst: Operand, src: Operand) -> Option<Instruction> {
    select2(&MOV_MAPS, dst, src)
}

/// Select an ADD encoding.
pub fn add(dst: Operand, src: Operand) -> Option<Instruction> {
    select2(&ADD_MAPS, dst, src)
}

/// Select a SUB encoding.
pub fn sub(dst: Operand, src: Operand) -> Option<Instruction> {
    select2(&SUB_MAPS, dst, src)
}

/// Select a CMP encoding.
pub fn cmp(dst: Operand, src: Operand) -> Option<Instruction> {
    select2(&CMP_MAPS, dst, src)
}

/// Select a PUSH encoding.
pub fn push(operand: Operand) -> Option<Instruction> {
    select1(&PUSH_MAPS, operand)
}

/// Select a POP encoding.
pub fn pop(operand: Operand) -> Option<Instruction> {
    select1(&POP_MAPS, operand)
}

/// Select a JMP encoding for a rel8/rel32 displacement.
pub fn jmp(displacement: Operand) -> Option<Instruction> {
    select1(&JMP_MAPS, displacement)
}

/// The SYSCALL trap instruction.
pub fn syscall() -> Instruction {
    Instruction::new(SYSCALL_DEF, Vec::new())
}

/// The near RET instruction.
pub fn ret() -> Instruction {
    Instruction::new(RET_DEF, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::operand::{Operand, Width, AH, AL, CL, R10, R8, RAX, RBX, RCX, SIL};

    #[test]
    fn mov_imm64_selects_the_movabs_form() {
        let instruction = mov(Operand::Reg(RAX), Operand::U64(0xdead_beef_0000)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::R64, P::Imm64]);
        assert!(instruction.opcode.has_extension(E::RexW));
    }

    #[test]
    fn mov_imm32_into_r64_selects_the_rm_form() {
        let instruction = mov(Operand::Reg(RAX), Operand::U32(7)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::Rm64, P::Imm32]);
    }

    #[test]
    fn mov_reg_reg_resolves_at_each_width() {
        assert!(mov(Operand::Reg(RAX), Operand::Reg(RBX)).is_some());
        assert!(mov(Operand::Reg(AL), Operand::Reg(CL)).is_some());
        // Width mismatch has no encoding.
        assert!(mov(Operand::Reg(AL), Operand::Reg(RCX)).is_none());
    }

    #[test]
    fn mov_float64_reinterprets_into_imm64() {
        let instruction = mov(Operand::Reg(RAX), Operand::F64(1.0)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::R64, P::Imm64]);
    }

    #[test]
    fn high_byte_moves_use_the_legacy_form() {
        let instruction = mov(Operand::Reg(AH), Operand::U8(1)).unwrap();
        assert!(!instruction.opcode.has_any_extension());
    }

    #[test]
    fn rex_byte_moves_require_the_rex_form() {
        let instruction = mov(Operand::Reg(SIL), Operand::U8(1)).unwrap();
        assert!(instruction.opcode.has_extension(E::Rex));
    }

    #[test]
    fn push_pop_extended_registers_get_rex() {
        let instruction = push(Operand::Reg(R8)).unwrap();
        assert!(instruction.opcode.has_extension(E::Rex));
        let instruction = pop(Operand::Reg(R10)).unwrap();
        assert!(instruction.opcode.has_extension(E::Rex));
        let instruction = push(Operand::Reg(RCX)).unwrap();
        assert!(!instruction.opcode.has_any_extension());
    }

    #[test]
    fn jmp_selects_by_displacement_width() {
        let instruction = jmp(Operand::U8(4)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::Rel8]);
        let instruction = jmp(Operand::U32(0x1000)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::Rel32]);
        assert!(jmp(Operand::U64(0)).is_none());
    }

    #[test]
    fn memory_destinations_resolve() {
        let dst = Operand::Displaced {
            base: RAX,
            displacement: 8,
            width: Width::W64,
        };
        let instruction = mov(dst, Operand::Reg(RCX)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::Rm64, P::R64]);
    }

    #[test]
    fn alu_immediate_forms() {
        let instruction = add(Operand::Reg(RAX), Operand::U32(5)).unwrap();
        assert_eq!(instruction.opcode.operands, &[P::Rm64, P::Imm32]);
        assert!(sub(Operand::Reg(RAX), Operand::Reg(RCX)).is_some());
        assert!(cmp(Operand::Reg(AL), Operand::U8(0)).is_some());
        // No 64-bit immediate ALU form exists.
        assert!(add(Operand::Reg(RAX), Operand::U64(5)).is_none());
    }
}
