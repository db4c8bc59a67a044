//! x86-64 statement lowering.

use log::debug;

use crate::core::CompileResult;
use crate::ir::context::{Architecture, LoweringContext};
use crate::ir::statement::Statement;
use crate::x64::opcode::Instruction;
use crate::x64::opcodes;
use crate::x64::operand::{Operand, RAX};

/// The x86-64 lowering backend.
///
/// Stateless; per-pass state lives in the [`LoweringContext`].
#[derive(Debug, Default, Clone, Copy)]
pub struct X64Architecture;

impl Architecture for X64Architecture {
    fn encode_statement(
        &self,
        statement: &Statement,
        ctx: &mut LoweringContext<'_>,
    ) -> CompileResult<Vec<Instruction>> {
        debug!("lowering: {statement}");
        match statement {
            Statement::Assign(name, expr) => {
                let ty = expr.return_type(ctx)?;
                let target = ctx.define_variable(name, ty)?;
                expr.encode(ctx, target)
            }
            Statement::Return(expr) => {
                let mut sequence = expr.encode(ctx, Operand::Reg(RAX))?;
                let ret = opcodes::ret();
                ctx.add_instruction(ret.clone());
                sequence.push(ret);
                Ok(sequence)
            }
        }
    }
}
