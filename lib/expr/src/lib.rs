//! # curio Expression Engine
//!
//! The small formula language used for calculated fields and import column
//! formulas:
//!
//! ```text
//! =UPPER([Name]) & " - " & [Status]
//! ```
//!
//! Grammar (single-pass recursive descent, no backtracking):
//!
//! ```text
//! expression := comparison ('&' comparison)*
//! comparison := factor ('=' factor)?
//! factor     := field-ref | string-literal | function-call
//! field-ref  := '[' name ']'
//! function   := identifier '(' (expression (',' expression)*)? ')'
//! ```
//!
//! Parse errors carry the byte offset of the failure. Unknown function names
//! fail evaluation, not parsing.
//!
//! ## Example
//!
//! ```rust
//! use curio_expr::{parse, EvalContext, EvalValue};
//!
//! let expr = parse("=UPPER([Name]) & \"!\"").unwrap();
//! let mut ctx = EvalContext::new();
//! ctx.insert("Name", EvalValue::Text("task1".into()));
//! assert_eq!(expr.evaluate(&ctx).unwrap(), EvalValue::Text("TASK1!".into()));
//! ```

pub mod ast;
pub mod eval;
pub mod functions;
pub mod parser;

pub use ast::Expr;
pub use eval::{EvalContext, EvalError, EvalErrorKind, EvalValue};
pub use parser::{parse, ParseError};

/// Whether a source string denotes a formula (as opposed to a plain column
/// name in an import map).
#[must_use]
pub fn is_formula(source: &str) -> bool {
    source.trim_start().starts_with('=')
}
