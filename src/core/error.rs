// This module defines error types for the jitx64 backend using the thiserror crate for
// idiomatic Rust error handling. CompileError covers the failure scenarios the lowering
// core can hit: no legal opcode encoding for an operand combination, register allocation
// exhaustion, ABI setup mismatches, byte-encoding failures reported by the external
// encoder, data-section registration problems, and references to undefined variables.
// Each variant carries relevant context for debugging. The module also provides
// CompileResult<T> as a convenience alias. Resolution failure in the opcode resolver is
// deliberately NOT an error: it is surfaced as Option::None and only becomes a
// NoOpcodeMatch error once a lowering path required that encoding to exist.

//! Error types for the lowering backend.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for IR lowering and instruction selection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("no opcode encoding matches {mnemonic} {operands}")]
    NoOpcodeMatch {
        mnemonic: &'static str,
        operands: String,
    },

    #[error("register allocation failed: {reason}")]
    RegisterAllocation { reason: String },

    #[error("ABI setup failed: {reason}")]
    AbiSetup { reason: String },

    #[error("instruction encoding failed: {reason}")]
    Encoding { reason: String },

    #[error("data section: {reason}")]
    DataSection { reason: String },

    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
}

/// Result type alias for lowering operations.
pub type CompileResult<T> = Result<T, CompileError>;
