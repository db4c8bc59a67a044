// This module implements the byte-level instruction encoder using the iced-x86 library.
// The lowering core treats byte encoding as an external black box behind the
// InstructionEncoder trait: it hands over one resolved Instruction (opcode definition
// plus concrete operands) and receives the encoded byte buffer or an error, never
// inspecting byte contents beyond their length. X64Encoder realizes that contract with
// a fresh iced CodeAssembler per call: our Register values convert to iced registers
// through per-width constant tables (including the AH-family high-byte and SPL-family
// REX-only names), memory operands build through the code_asm pointer helpers for
// indirect, displaced and SIB forms, and immediates dispatch per destination width.
// Unsupported combinations surface as CompileError::Encoding, never a panic.

//! x86-64 byte encoding using iced-x86.

use iced_x86::code_asm::*;
use iced_x86::IcedError;

use crate::core::{CompileError, CompileResult};
use crate::ir::context::InstructionEncoder;

use super::opcode::{Instruction, Mnemonic, OperandPattern};
use super::operand::{Operand, RegFlavor, Register, Width};

/// Byte encoder for resolved instructions, backed by iced-x86.
#[derive(Debug, Default)]
pub struct X64Encoder;

impl X64Encoder {
    pub fn new() -> Self {
        Self
    }

    fn assembly_error(e: IcedError) -> CompileError {
        CompileError::Encoding {
            reason: e.to_string(),
        }
    }

    fn unsupported(instruction: &Instruction) -> CompileError {
        CompileError::Encoding {
            reason: format!("unsupported operand combination: {instruction}"),
        }
    }

    /// Convert to an iced 64-bit GP register.
    fn gp64(reg: Register) -> CompileResult<AsmRegister64> {
        const GP64: [AsmRegister64; 16] = [
            rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
        ];
        GP64.get(reg.index as usize)
            .copied()
            .ok_or(CompileError::Encoding {
                reason: format!("invalid 64-bit register index {}", reg.index),
            })
    }

    /// Convert to an iced 32-bit GP register.
    fn gp32(reg: Register) -> CompileResult<AsmRegister32> {
        const GP32: [AsmRegister32; 16] = [
            eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
        ];
        GP32.get(reg.index as usize)
            .copied()
            .ok_or(CompileError::Encoding {
                reason: format!("invalid 32-bit register index {}", reg.index),
            })
    }

    /// Convert to an iced 16-bit GP register.
    fn gp16(reg: Register) -> CompileResult<AsmRegister16> {
        const GP16: [AsmRegister16; 16] = [
            ax, cx, dx, bx, sp, bp, si, di, r8w, r9w, r10w, r11w, r12w, r13w, r14w, r15w,
        ];
        GP16.get(reg.index as usize)
            .copied()
            .ok_or(CompileError::Encoding {
                reason: format!("invalid 16-bit register index {}", reg.index),
            })
    }

    /// Convert to an iced 8-bit GP register, honoring the byte flavor.
    fn gp8(reg: Register) -> CompileResult<AsmRegister8> {
        if reg.flavor == RegFlavor::HighByte {
            return match reg.index {
                4 => Ok(ah),
                5 => Ok(ch),
                6 => Ok(dh),
                7 => Ok(bh),
                _ => Err(CompileError::Encoding {
                    reason: format!("invalid high-byte register index {}", reg.index),
                }),
            };
        }
        const GP8: [AsmRegister8; 16] = [
            al, cl, dl, bl, spl, bpl, sil, dil, r8b, r9b, r10b, r11b, r12b, r13b, r14b, r15b,
        ];
        GP8.get(reg.index as usize)
            .copied()
            .ok_or(CompileError::Encoding {
                reason: format!("invalid 8-bit register index {}", reg.index),
            })
    }

    /// Build an iced memory operand sized to the referenced data width.
    fn memory(operand: &Operand) -> CompileResult<AsmMemoryOperand> {
        let (expr, width) = match *operand {
            Operand::Indirect { base, width } => (qword_ptr(Self::gp64(base)?), width),
            Operand::Displaced {
                base,
                displacement,
                width,
            } => (qword_ptr(Self::gp64(base)? + displacement), width),
            Operand::Sib {
                base,
                index,
                scale,
                width,
            } => (
                qword_ptr(Self::gp64(base)? + Self::gp64(index)? * scale.factor()),
                width,
            ),
            Operand::RipRelative { .. } => {
                return Err(CompileError::Encoding {
                    reason: "rip-relative memory operands are not supported".to_string(),
                })
            }
            _ => {
                return Err(CompileError::Encoding {
                    reason: format!("not a memory operand: {operand}"),
                })
            }
        };
        Ok(match width {
            Width::W8 => byte_ptr(expr),
            Width::W16 => word_ptr(expr),
            Width::W32 => dword_ptr(expr),
            Width::W64 => qword_ptr(expr),
            Width::W128 => xmmword_ptr(expr),
            Width::W256 => ymmword_ptr(expr),
        })
    }

    fn is_memory(operand: &Operand) -> bool {
        matches!(
            operand,
            Operand::Indirect { .. } | Operand::Displaced { .. } | Operand::Sib { .. }
        )
    }

    fn emit_mov(
        asm: &mut CodeAssembler,
        instruction: &Instruction,
        dst: &Operand,
        src: &Operand,
    ) -> CompileResult<()> {
        match (dst, src) {
            (Operand::Reg(d), Operand::Reg(s)) => {
                if d.width != s.width {
                    return Err(Self::unsupported(instruction));
                }
                match d.width {
                    Width::W8 => asm.mov(Self::gp8(*d)?, Self::gp8(*s)?),
                    Width::W16 => asm.mov(Self::gp16(*d)?, Self::gp16(*s)?),
                    Width::W32 => asm.mov(Self::gp32(*d)?, Self::gp32(*s)?),
                    Width::W64 => asm.mov(Self::gp64(*d)?, Self::gp64(*s)?),
                    _ => return Err(Self::unsupported(instruction)),
                }
                .map_err(Self::assembly_error)
            }
            (Operand::Reg(d), s) if s.immediate_bits().is_some() => {
                let bits = s.immediate_bits().unwrap_or_default();
                match d.width {
                    Width::W8 => asm.mov(Self::gp8(*d)?, bits as u8 as i32),
                    Width::W16 => asm.mov(Self::gp16(*d)?, bits as u16 as i32),
                    Width::W32 => asm.mov(Self::gp32(*d)?, bits as u32),
                    Width::W64 => asm.mov(Self::gp64(*d)?, bits),
                    _ => return Err(Self::unsupported(instruction)),
                }
                .map_err(Self::assembly_error)
            }
            (d, Operand::Reg(s)) if Self::is_memory(d) => {
                let mem = Self::memory(d)?;
                match s.width {
                    Width::W8 => asm.mov(mem, Self::gp8(*s)?),
                    Width::W16 => asm.mov(mem, Self::gp16(*s)?),
                    Width::W32 => asm.mov(mem, Self::gp32(*s)?),
                    Width::W64 => asm.mov(mem, Self::gp64(*s)?),
                    _ => return Err(Self::unsupported(instruction)),
                }
                .map_err(Self::assembly_error)
            }
            (Operand::Reg(d), s) if Self::is_memory(s) => {
                let mem = Self::memory(s)?;
                match d.width {
                    Width::W8 => asm.mov(Self::gp8(*d)?, mem),
                    Width::W16 => asm.mov(Self::gp16(*d)?, mem),
                    Width::W32 => asm.mov(Self::gp32(*d)?, mem),
                    Width::W64 => asm.mov(Self::gp64(*d)?, mem),
                    _ => return Err(Self::unsupported(instruction)),
                }
                .map_err(Self::assembly_error)
            }
            (d, s) if Self::is_memory(d) && s.immediate_bits().is_some() => {
                let bits = s.immediate_bits().unwrap_or_default();
                asm.mov(Self::memory(d)?, bits as u32 as i32)
                    .map_err(Self::assembly_error)
            }
            _ => Err(Self::unsupported(instruction)),
        }
    }

    fn emit_alu(
        asm: &mut CodeAssembler,
        instruction: &Instruction,
        dst: &Operand,
        src: &Operand,
    ) -> CompileResult<()> {
        let mnemonic = instruction.opcode.mnemonic;
        macro_rules! emit {
            ($d:expr, $s:expr) => {
                match mnemonic {
                    Mnemonic::Add => asm.add($d, $s),
                    Mnemonic::Sub => asm.sub($d, $s),
                    Mnemonic::Cmp => asm.cmp($d, $s),
                    _ => return Err(Self::unsupported(instruction)),
                }
                .map_err(Self::assembly_error)
            };
        }

        match (dst, src) {
            (Operand::Reg(d), Operand::Reg(s)) => {
                if d.width != s.width {
                    return Err(Self::unsupported(instruction));
                }
                match d.width {
                    Width::W8 => emit!(Self::gp8(*d)?, Self::gp8(*s)?),
                    Width::W16 => emit!(Self::gp16(*d)?, Self::gp16(*s)?),
                    Width::W32 => emit!(Self::gp32(*d)?, Self::gp32(*s)?),
                    Width::W64 => emit!(Self::gp64(*d)?, Self::gp64(*s)?),
                    _ => Err(Self::unsupported(instruction)),
                }
            }
            (Operand::Reg(d), s) if s.immediate_bits().is_some() => {
                let bits = s.immediate_bits().unwrap_or_default();
                match d.width {
                    Width::W8 => emit!(Self::gp8(*d)?, bits as u8 as i32),
                    Width::W16 => emit!(Self::gp16(*d)?, bits as u16 as i32),
                    Width::W32 => emit!(Self::gp32(*d)?, bits as u32 as i32),
                    Width::W64 => emit!(Self::gp64(*d)?, bits as u32 as i32),
                    _ => Err(Self::unsupported(instruction)),
                }
            }
            (d, Operand::Reg(s)) if Self::is_memory(d) => {
                let mem = Self::memory(d)?;
                match s.width {
                    Width::W8 => emit!(mem, Self::gp8(*s)?),
                    Width::W16 => emit!(mem, Self::gp16(*s)?),
                    Width::W32 => emit!(mem, Self::gp32(*s)?),
                    Width::W64 => emit!(mem, Self::gp64(*s)?),
                    _ => Err(Self::unsupported(instruction)),
                }
            }
            (Operand::Reg(d), s) if Self::is_memory(s) => {
                let mem = Self::memory(s)?;
                match d.width {
                    Width::W8 => emit!(Self::gp8(*d)?, mem),
                    Width::W16 => emit!(Self::gp16(*d)?, mem),
                    Width::W32 => emit!(Self::gp32(*d)?, mem),
                    Width::W64 => emit!(Self::gp64(*d)?, mem),
                    _ => Err(Self::unsupported(instruction)),
                }
            }
            (d, s) if Self::is_memory(d) && s.immediate_bits().is_some() => {
                let bits = s.immediate_bits().unwrap_or_default();
                emit!(Self::memory(d)?, bits as u32 as i32)
            }
            _ => Err(Self::unsupported(instruction)),
        }
    }

    fn emit_jmp(asm: &mut CodeAssembler, instruction: &Instruction) -> CompileResult<()> {
        let target = instruction
            .operands
            .first()
            .and_then(Operand::immediate_bits)
            .ok_or_else(|| Self::unsupported(instruction))?;
        let code = match instruction.opcode.operands.first() {
            Some(OperandPattern::Rel8) => iced_x86::Code::Jmp_rel8_64,
            Some(OperandPattern::Rel32) => iced_x86::Code::Jmp_rel32_64,
            _ => return Err(Self::unsupported(instruction)),
        };
        let branch =
            iced_x86::Instruction::with_branch(code, target).map_err(Self::assembly_error)?;
        asm.add_instruction(branch).map_err(Self::assembly_error)
    }
}

impl InstructionEncoder for X64Encoder {
    fn encode(&self, instruction: &Instruction) -> CompileResult<Vec<u8>> {
        let mut asm = CodeAssembler::new(64).map_err(Self::assembly_error)?;

        match (instruction.opcode.mnemonic, instruction.operands.as_slice()) {
            (Mnemonic::Syscall, []) => asm.syscall().map_err(Self::assembly_error)?,
            (Mnemonic::Ret, []) => asm.ret().map_err(Self::assembly_error)?,
            (Mnemonic::Push, [Operand::Reg(r)]) => {
                asm.push(Self::gp64(*r)?).map_err(Self::assembly_error)?
            }
            (Mnemonic::Pop, [Operand::Reg(r)]) => {
                asm.pop(Self::gp64(*r)?).map_err(Self::assembly_error)?
            }
            (Mnemonic::Jmp, [_]) => Self::emit_jmp(&mut asm, instruction)?,
            (Mnemonic::Mov, [dst, src]) => Self::emit_mov(&mut asm, instruction, dst, src)?,
            (Mnemonic::Add | Mnemonic::Sub | Mnemonic::Cmp, [dst, src]) => {
                Self::emit_alu(&mut asm, instruction, dst, src)?
            }
            _ => return Err(Self::unsupported(instruction)),
        }

        asm.assemble(0).map_err(Self::assembly_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::opcodes;
    use crate::x64::operand::{Operand, Scale, Width, AH, AL, R8, RAX, RBP, RCX, RDI};

    fn encode(instruction: Instruction) -> Vec<u8> {
        X64Encoder::new().encode(&instruction).unwrap()
    }

    #[test]
    fn syscall_and_ret_encode_to_fixed_bytes() {
        assert_eq!(encode(opcodes::syscall()), vec![0x0f, 0x05]);
        assert_eq!(encode(opcodes::ret()), vec![0xc3]);
    }

    #[test]
    fn push_pop_lengths() {
        let push_rcx = opcodes::push(Operand::Reg(RCX)).unwrap();
        assert_eq!(encode(push_rcx), vec![0x51]);
        // Extended registers need the REX.B prefix byte.
        let push_r8 = opcodes::push(Operand::Reg(R8)).unwrap();
        assert_eq!(encode(push_r8).len(), 2);
    }

    #[test]
    fn mov_reg_reg_is_three_bytes_at_width_64() {
        let instruction = opcodes::mov(Operand::Reg(RAX), Operand::Reg(RCX)).unwrap();
        assert_eq!(encode(instruction).len(), 3);
    }

    #[test]
    fn movabs_is_ten_bytes() {
        let instruction = opcodes::mov(Operand::Reg(RAX), Operand::U64(0x1122_3344_5566)).unwrap();
        assert_eq!(encode(instruction).len(), 10);
    }

    #[test]
    fn high_byte_and_low_byte_moves_encode() {
        let instruction = opcodes::mov(Operand::Reg(AH), Operand::U8(1)).unwrap();
        assert!(!encode(instruction).is_empty());
        let instruction = opcodes::mov(Operand::Reg(AL), Operand::U8(1)).unwrap();
        assert_eq!(encode(instruction), vec![0xb0, 0x01]);
    }

    #[test]
    fn memory_operands_encode() {
        let dst = Operand::Displaced {
            base: RBP,
            displacement: -8,
            width: Width::W64,
        };
        let instruction = opcodes::mov(dst, Operand::Reg(RDI)).unwrap();
        assert!(!encode(instruction).is_empty());

        let sib = Operand::Sib {
            base: RAX,
            index: RCX,
            scale: Scale::S4,
            width: Width::W64,
        };
        let instruction = opcodes::mov(Operand::Reg(RDI), sib).unwrap();
        assert!(!encode(instruction).is_empty());
    }

    #[test]
    fn alu_encodes() {
        let instruction = opcodes::add(Operand::Reg(RAX), Operand::Reg(RCX)).unwrap();
        assert!(!encode(instruction).is_empty());
        let instruction = opcodes::cmp(Operand::Reg(AL), Operand::U8(0)).unwrap();
        assert!(!encode(instruction).is_empty());
    }

    #[test]
    fn jmp_lengths_follow_the_selected_form() {
        let rel8 = opcodes::jmp(Operand::U8(4)).unwrap();
        assert_eq!(encode(rel8).len(), 2);
        let rel32 = opcodes::jmp(Operand::U32(0x1000)).unwrap();
        assert_eq!(encode(rel32).len(), 5);
    }

    #[test]
    fn float_bit_patterns_move_as_immediates() {
        let instruction = opcodes::mov(Operand::Reg(RAX), Operand::F64(1.0)).unwrap();
        let bytes = encode(instruction);
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[2..].to_vec(), 1.0f64.to_bits().to_le_bytes().to_vec());
    }

    #[test]
    fn rip_relative_is_reported_not_panicked() {
        let instruction = Instruction::new(
            opcodes::mov(Operand::Reg(RAX), Operand::Reg(RCX)).unwrap().opcode,
            vec![
                Operand::Reg(RAX),
                Operand::RipRelative {
                    displacement: 0x10,
                    width: Width::W64,
                },
            ],
        );
        assert!(X64Encoder::new().encode(&instruction).is_err());
    }
}
