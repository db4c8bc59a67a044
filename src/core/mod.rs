// This module is the hub for shared infrastructure used by both the instruction
// selection layer and the IR lowering layer: the CompileError/CompileResult error
// types and the RegisterSet bit set that tracks which general-purpose registers
// hold live values during a lowering pass. Architecture-specific code lives in
// x64/, the expression tree and lowering context in ir/.

//! Shared infrastructure: errors and register usage tracking.

pub mod error;
pub mod register_set;

pub use error::{CompileError, CompileResult};
pub use register_set::{RegisterSet, GP_REGISTER_COUNT};
