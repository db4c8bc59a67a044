//! IR statements.
//!
//! The statement layer above expressions: variable assignment and function
//! return. Statements delegate data-section registration to their expression
//! and expand through the SSA pass into the rewrite assignments followed by
//! the rewritten statement.

use std::fmt;

use crate::core::CompileResult;

use super::context::LoweringContext;
use super::expr::Expr;
use super::ssa::SsaContext;

/// The closed set of statements the lowering layer walks.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Bind the value of an expression to a name.
    Assign(String, Expr),
    /// Compute a value into the return register and return.
    Return(Expr),
}

impl Statement {
    pub fn expr(&self) -> &Expr {
        match self {
            Statement::Assign(_, expr) => expr,
            Statement::Return(expr) => expr,
        }
    }

    /// Register any literal data the statement's expression needs resident
    /// in the data section before code generation.
    pub fn add_to_data_section(&self, ctx: &mut LoweringContext<'_>) -> CompileResult<()> {
        self.expr().add_to_data_section(ctx)
    }

    /// Rewrite into static-single-assignment form: the auxiliary rewrite
    /// assignments in evaluation order, then this statement with its
    /// expression replaced.
    pub fn ssa_transform(&self, ssa: &mut SsaContext) -> Vec<Statement> {
        let (rewrites, replacement) = self.expr().ssa_transform(ssa);
        let mut statements: Vec<Statement> = rewrites
            .into_iter()
            .map(|rewrite| Statement::Assign(rewrite.name, rewrite.expr))
            .collect();
        statements.push(match self {
            Statement::Assign(name, _) => Statement::Assign(name.clone(), replacement),
            Statement::Return(_) => Statement::Return(replacement),
        });
        statements
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign(name, expr) => write!(f, "{name} = {expr}"),
            Statement::Return(expr) => write!(f, "return {expr}"),
        }
    }
}
