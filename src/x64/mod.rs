//! x86-64 backend: operand model, opcode tables, instruction selection,
//! byte-level encoding via iced-x86 and statement lowering.

pub mod arch;
pub mod encoder;
pub mod opcode;
pub mod opcode_map;
pub mod opcodes;
pub mod operand;

pub use arch::X64Architecture;
pub use encoder::X64Encoder;
pub use opcode::{Instruction, Mnemonic, Opcode, OperandPattern};
pub use opcode_map::{OpcodeMap, OpcodeMaps};
pub use operand::{Operand, OperandKind, Register, Scale, Width};
