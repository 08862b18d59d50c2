//! The postcondition expression sandbox.
//!
//! Compiles caller-supplied `ensure` expressions into a small AST once, then
//! evaluates that AST against a step's JSON result repeatedly without ever
//! touching a general-purpose interpreter, the host environment, or any
//! name besides `result` and a fixed whitelist of helper functions.

mod ast;
mod eval;
mod lexer;
mod parser;

use serde_json::Value;

use crate::error::SandboxError;

/// A postcondition expression, compiled once at parse time.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    text: String,
    expr: ast::Expr,
}

impl CompiledExpr {
    /// The verbatim expression text, for violation reporting.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluate against `result`, coercing a non-boolean final value to bool
    /// by standard truthiness. Any evaluation failure (missing field, type
    /// mismatch) is reported as a distinct "failed to evaluate" condition,
    /// never silently treated as `false`.
    pub fn evaluate(&self, result: &Value) -> Result<bool, SandboxError> {
        eval::eval(&self.expr, result)
            .map(|v| eval::truthy(&v))
            .map_err(|cause| SandboxError::EvaluationError {
                expr: self.text.clone(),
                cause,
            })
    }
}

/// Compile a postcondition expression under the sandbox rules. Any syntax
/// error, unknown name, non-whitelisted call, or dunder/underscore-leading
/// or trailing attribute access is rejected here, at compile time — never
/// deferred to evaluation.
pub fn compile_ensure(expr_text: &str) -> Result<CompiledExpr, SandboxError> {
    let expr = parser::parse(expr_text).map_err(|reason| SandboxError::CompileError {
        expr: expr_text.to_string(),
        reason,
    })?;
    Ok(CompiledExpr {
        text: expr_text.to_string(),
        expr,
    })
}
