//! jitx64 - x86-64 machine-code generation for a JIT backend.
//!
//! The crate turns a small expression-tree IR into encoded x86-64 machine
//! code. Instruction selection runs through per-mnemonic opcode tables that
//! resolve concrete operands to a unique legal instruction form; byte-level
//! encoding goes through iced-x86.
//!
//! # Usage
//!
//! ```ignore
//! use jitx64::ir::{linux_write, Expr, LoweringContext, Statement};
//! use jitx64::x64::{X64Architecture, X64Encoder};
//! use jitx64::ir::context::Architecture;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let (arch, encoder) = (X64Architecture, X64Encoder::new());
//! let mut ctx = LoweringContext::new(&arena, &arch, &encoder);
//!
//! let statement = Statement::Return(linux_write(Expr::U64(1), b"hi\n", 3));
//! statement.add_to_data_section(&mut ctx)?;
//! arch.encode_statement(&statement, &mut ctx)?;
//! ```
//!
//! # Layout
//!
//! - [`core`] - shared infrastructure: errors, register sets
//! - [`x64`] - operand model, opcode tables, selection, encoding, lowering
//! - [`ir`] - expression tree, statements, lowering context, syscall ABI

pub mod core;
pub mod ir;
pub mod x64;

pub use crate::core::{CompileError, CompileResult, RegisterSet};
pub use crate::ir::{ir_length, Expr, IrType, LoweringContext, Statement};
pub use crate::x64::{Instruction, Operand, X64Architecture, X64Encoder};
