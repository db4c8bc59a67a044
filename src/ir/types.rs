//! Static types of IR expression values.

use std::fmt;

use crate::x64::operand::Width;

/// The closed set of value types the IR computes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    U8,
    U16,
    U32,
    U64,
    F64,
    /// A byte buffer resident in the data section; values of this type are
    /// pointers at runtime.
    ByteArray,
}

impl IrType {
    /// Register width a value of this type occupies.
    pub const fn width(self) -> Width {
        match self {
            IrType::U8 => Width::W8,
            IrType::U16 => Width::W16,
            IrType::U32 => Width::W32,
            IrType::U64 => Width::W64,
            IrType::F64 => Width::W64,
            IrType::ByteArray => Width::W64,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrType::U8 => "u8",
            IrType::U16 => "u16",
            IrType::U32 => "u32",
            IrType::U64 => "u64",
            IrType::F64 => "f64",
            IrType::ByteArray => "[]u8",
        };
        f.write_str(s)
    }
}
