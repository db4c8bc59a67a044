// This module defines the operand model for x86-64 instruction selection: the Register
// value type (encoding index, width, byte-register flavor), the Operand enum covering
// every operand shape an instruction can take (register, indirect, SIB, displaced,
// RIP-relative, integer and float immediates), and the classify function that reduces
// a concrete operand to the (kind, width) pair used as the lookup key by the opcode
// tables. Classification is pure and total; width and kind together, never the value,
// determine encoding eligibility. SIB operands always classify at pointer width because
// the SIB byte encodes addressing, not data size. The byte-register flavor distinguishes
// the legacy high-byte registers (AH/CH/DH/BH) from the REX-only low-byte registers
// (SPL/BPL/SIL/DIL); the resolver uses it to enforce the mutual exclusion between
// high-byte encodings and REX-family prefixes.

//! Operands and operand classification.

use std::fmt;

/// Operand bit widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
    W128,
    W256,
}

/// Number of distinct widths (dense table axis).
pub const WIDTH_COUNT: usize = 6;

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
            Width::W128 => 128,
            Width::W256 => 256,
        }
    }

    pub(crate) const fn table_index(self) -> usize {
        self as usize
    }
}

/// Operand classification kinds (dense table axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Register,
    IndirectRegister,
    SibRegister,
    DisplacedRegister,
    RipRelative,
    UnsignedImmediate,
    SignedImmediate,
    FloatImmediate,
}

/// Number of distinct kinds (dense table axis).
pub const KIND_COUNT: usize = 8;

impl OperandKind {
    pub(crate) const fn table_index(self) -> usize {
        self as usize
    }
}

/// Flavor of an 8-bit register name.
///
/// At width 8 the same encoding index can name two different registers:
/// index 4 is AH in the legacy encoding but SPL once any REX prefix is
/// present. The flavor disambiguates, and drives the resolver's prefix
/// legality filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegFlavor {
    /// Ordinary register, no prefix constraint of its own.
    Default,
    /// AH/CH/DH/BH: encodable only without a REX-family prefix.
    HighByte,
    /// SPL/BPL/SIL/DIL: addressable only with a REX-family prefix.
    RexByte,
}

/// A concrete machine register: encoding index, width and byte flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub index: u8,
    pub width: Width,
    pub flavor: RegFlavor,
}

impl Register {
    /// General-purpose register at the given encoding index and width.
    ///
    /// 8-bit indices 4..=7 name the REX-only low-byte registers
    /// (SPL/BPL/SIL/DIL); use the AH/CH/DH/BH constants for the legacy
    /// high-byte aliases.
    pub const fn gp(index: u8, width: Width) -> Self {
        let flavor = match width {
            Width::W8 if index >= 4 && index <= 7 => RegFlavor::RexByte,
            _ => RegFlavor::Default,
        };
        Self {
            index,
            width,
            flavor,
        }
    }

    const fn high_byte(index: u8) -> Self {
        Self {
            index,
            width: Width::W8,
            flavor: RegFlavor::HighByte,
        }
    }

    /// Vector register (XMM at width 128, YMM at width 256).
    pub const fn vector(index: u8, width: Width) -> Self {
        Self {
            index,
            width,
            flavor: RegFlavor::Default,
        }
    }

    pub fn is_high_byte(&self) -> bool {
        self.flavor == RegFlavor::HighByte
    }

    /// True for registers inexpressible without a REX/VEX prefix: the
    /// REX-only byte registers and any register with index >= 8.
    pub fn requires_extension(&self) -> bool {
        self.flavor == RegFlavor::RexByte || self.index >= 8
    }

    pub fn name(&self) -> String {
        const NAMES8: [&str; 16] = [
            "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b",
            "r12b", "r13b", "r14b", "r15b",
        ];
        const NAMES8_HIGH: [&str; 4] = ["ah", "ch", "dh", "bh"];
        const NAMES16: [&str; 16] = [
            "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w",
            "r13w", "r14w", "r15w",
        ];
        const NAMES32: [&str; 16] = [
            "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
            "r12d", "r13d", "r14d", "r15d",
        ];
        const NAMES64: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        let idx = self.index as usize;
        match (self.width, self.flavor) {
            (Width::W8, RegFlavor::HighByte) => NAMES8_HIGH
                .get(idx.wrapping_sub(4))
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("hb{idx}")),
            (Width::W8, _) => NAMES8[idx & 15].to_string(),
            (Width::W16, _) => NAMES16[idx & 15].to_string(),
            (Width::W32, _) => NAMES32[idx & 15].to_string(),
            (Width::W64, _) => NAMES64[idx & 15].to_string(),
            (Width::W128, _) => format!("xmm{idx}"),
            (Width::W256, _) => format!("ymm{idx}"),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// 64-bit general-purpose registers.
pub const RAX: Register = Register::gp(0, Width::W64);
pub const RCX: Register = Register::gp(1, Width::W64);
pub const RDX: Register = Register::gp(2, Width::W64);
pub const RBX: Register = Register::gp(3, Width::W64);
pub const RSP: Register = Register::gp(4, Width::W64);
pub const RBP: Register = Register::gp(5, Width::W64);
pub const RSI: Register = Register::gp(6, Width::W64);
pub const RDI: Register = Register::gp(7, Width::W64);
pub const R8: Register = Register::gp(8, Width::W64);
pub const R9: Register = Register::gp(9, Width::W64);
pub const R10: Register = Register::gp(10, Width::W64);
pub const R11: Register = Register::gp(11, Width::W64);
pub const R12: Register = Register::gp(12, Width::W64);
pub const R13: Register = Register::gp(13, Width::W64);
pub const R14: Register = Register::gp(14, Width::W64);
pub const R15: Register = Register::gp(15, Width::W64);

// 32-bit general-purpose registers.
pub const EAX: Register = Register::gp(0, Width::W32);
pub const ECX: Register = Register::gp(1, Width::W32);
pub const EDX: Register = Register::gp(2, Width::W32);
pub const EBX: Register = Register::gp(3, Width::W32);
pub const ESI: Register = Register::gp(6, Width::W32);
pub const EDI: Register = Register::gp(7, Width::W32);
pub const R8D: Register = Register::gp(8, Width::W32);
pub const R9D: Register = Register::gp(9, Width::W32);

// 16-bit general-purpose registers.
pub const AX: Register = Register::gp(0, Width::W16);
pub const CX: Register = Register::gp(1, Width::W16);
pub const DX: Register = Register::gp(2, Width::W16);
pub const BX: Register = Register::gp(3, Width::W16);

// 8-bit low-byte registers.
pub const AL: Register = Register::gp(0, Width::W8);
pub const CL: Register = Register::gp(1, Width::W8);
pub const DL: Register = Register::gp(2, Width::W8);
pub const BL: Register = Register::gp(3, Width::W8);
pub const SPL: Register = Register::gp(4, Width::W8);
pub const BPL: Register = Register::gp(5, Width::W8);
pub const SIL: Register = Register::gp(6, Width::W8);
pub const DIL: Register = Register::gp(7, Width::W8);
pub const R8B: Register = Register::gp(8, Width::W8);
pub const R9B: Register = Register::gp(9, Width::W8);

// 8-bit legacy high-byte registers.
pub const AH: Register = Register::high_byte(4);
pub const CH: Register = Register::high_byte(5);
pub const DH: Register = Register::high_byte(6);
pub const BH: Register = Register::high_byte(7);

// Vector registers.
pub const XMM0: Register = Register::vector(0, Width::W128);
pub const XMM1: Register = Register::vector(1, Width::W128);
pub const XMM2: Register = Register::vector(2, Width::W128);
pub const XMM3: Register = Register::vector(3, Width::W128);
pub const XMM4: Register = Register::vector(4, Width::W128);
pub const XMM5: Register = Register::vector(5, Width::W128);
pub const XMM6: Register = Register::vector(6, Width::W128);
pub const XMM7: Register = Register::vector(7, Width::W128);
pub const XMM8: Register = Register::vector(8, Width::W128);
pub const XMM9: Register = Register::vector(9, Width::W128);
pub const XMM10: Register = Register::vector(10, Width::W128);
pub const XMM11: Register = Register::vector(11, Width::W128);
pub const XMM12: Register = Register::vector(12, Width::W128);
pub const XMM13: Register = Register::vector(13, Width::W128);
pub const XMM14: Register = Register::vector(14, Width::W128);
pub const XMM15: Register = Register::vector(15, Width::W128);
pub const YMM0: Register = Register::vector(0, Width::W256);
pub const YMM1: Register = Register::vector(1, Width::W256);
pub const YMM2: Register = Register::vector(2, Width::W256);
pub const YMM3: Register = Register::vector(3, Width::W256);

/// SIB scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    S1,
    S2,
    S4,
    S8,
}

impl Scale {
    pub const fn factor(self) -> u32 {
        match self {
            Scale::S1 => 1,
            Scale::S2 => 2,
            Scale::S4 => 4,
            Scale::S8 => 8,
        }
    }
}

/// A typed value that can appear in an instruction.
///
/// Memory variants carry the width of the referenced data; SIB operands
/// nevertheless classify at pointer width (the SIB byte encodes addressing).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Reg(Register),
    Indirect {
        base: Register,
        width: Width,
    },
    Displaced {
        base: Register,
        displacement: i32,
        width: Width,
    },
    Sib {
        base: Register,
        index: Register,
        scale: Scale,
        width: Width,
    },
    RipRelative {
        displacement: i32,
        width: Width,
    },
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        classify(self).0
    }

    pub fn width(&self) -> Width {
        classify(self).1
    }

    /// The raw bit pattern of an immediate operand, if this is one.
    /// Floats reinterpret, they do not coerce.
    pub fn immediate_bits(&self) -> Option<u64> {
        match *self {
            Operand::U8(v) => Some(v as u64),
            Operand::U16(v) => Some(v as u64),
            Operand::U32(v) => Some(v as u64),
            Operand::U64(v) => Some(v),
            Operand::I8(v) => Some(v as u8 as u64),
            Operand::I16(v) => Some(v as u16 as u64),
            Operand::I32(v) => Some(v as u32 as u64),
            Operand::I64(v) => Some(v as u64),
            Operand::F32(v) => Some(v.to_bits() as u64),
            Operand::F64(v) => Some(v.to_bits()),
            _ => None,
        }
    }
}

/// Categorize an operand into the (kind, width) lookup key.
///
/// Pure and total over the closed operand set. This is the sole key used by
/// both the table builder and the resolver, so its granularity must match
/// the builder's fan-out exactly.
pub fn classify(operand: &Operand) -> (OperandKind, Width) {
    match *operand {
        Operand::Reg(r) => (OperandKind::Register, r.width),
        Operand::Indirect { width, .. } => (OperandKind::IndirectRegister, width),
        Operand::Displaced { width, .. } => (OperandKind::DisplacedRegister, width),
        // SIB addressing always classifies at pointer width.
        Operand::Sib { .. } => (OperandKind::SibRegister, Width::W64),
        Operand::RipRelative { width, .. } => (OperandKind::RipRelative, width),
        Operand::U8(_) => (OperandKind::UnsignedImmediate, Width::W8),
        Operand::U16(_) => (OperandKind::UnsignedImmediate, Width::W16),
        Operand::U32(_) => (OperandKind::UnsignedImmediate, Width::W32),
        Operand::U64(_) => (OperandKind::UnsignedImmediate, Width::W64),
        Operand::I8(_) => (OperandKind::SignedImmediate, Width::W8),
        Operand::I16(_) => (OperandKind::SignedImmediate, Width::W16),
        Operand::I32(_) => (OperandKind::SignedImmediate, Width::W32),
        Operand::I64(_) => (OperandKind::SignedImmediate, Width::W64),
        Operand::F32(_) => (OperandKind::FloatImmediate, Width::W32),
        Operand::F64(_) => (OperandKind::FloatImmediate, Width::W64),
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Indirect { base, .. } => write!(f, "[{base}]"),
            Operand::Displaced {
                base, displacement, ..
            } => {
                if displacement < 0 {
                    write!(f, "[{base}-{:#x}]", -(displacement as i64))
                } else {
                    write!(f, "[{base}+{displacement:#x}]")
                }
            }
            Operand::Sib {
                base, index, scale, ..
            } => write!(f, "[{base}+{index}*{}]", scale.factor()),
            Operand::RipRelative { displacement, .. } => write!(f, "[rip+{displacement:#x}]"),
            Operand::U8(v) => write!(f, "{v:#x}"),
            Operand::U16(v) => write!(f, "{v:#x}"),
            Operand::U32(v) => write!(f, "{v:#x}"),
            Operand::U64(v) => write!(f, "{v:#x}"),
            Operand::I8(v) => write!(f, "{v}"),
            Operand::I16(v) => write!(f, "{v}"),
            Operand::I32(v) => write!(f, "{v}"),
            Operand::I64(v) => write!(f, "{v}"),
            Operand::F32(v) => write!(f, "{v}"),
            Operand::F64(v) => write!(f, "{v}"),
        }
    }
}
