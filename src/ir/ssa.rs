//! Fresh-name supply for the SSA rewrite pass.

use super::expr::Expr;

/// Monotonic counter handing out temporary names.
///
/// One context spans a whole rewrite so hoisted temporaries never collide;
/// generated names use a prefix no source-level variable can carry.
#[derive(Debug, Default)]
pub struct SsaContext {
    next_temp: u64,
}

impl SsaContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_name(&mut self) -> String {
        let name = format!("__t{}", self.next_temp);
        self.next_temp += 1;
        name
    }
}

/// A hoisted sub-expression: assign `expr` to `name` before the rewritten
/// parent runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaRewrite {
    pub name: String,
    pub expr: Expr,
}
