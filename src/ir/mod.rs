//! Architecture-independent IR: expressions, statements, lowering state and
//! the Linux syscall ABI.

pub mod abi;
pub mod context;
pub mod expr;
pub mod ssa;
pub mod statement;
pub mod types;

pub use abi::{
    abi_call_setup, linux_close, linux_open, linux_write, restore_registers, LinuxSyscall,
    SYSCALL_ARG_REGS, SYSCALL_CLOBBERED,
};
pub use context::{
    ir_length, Architecture, DataSection, DataSectionBuilder, InstructionEncoder,
    LoweringContext, Symbol,
};
pub use expr::Expr;
pub use ssa::{SsaContext, SsaRewrite};
pub use statement::Statement;
pub use types::IrType;
