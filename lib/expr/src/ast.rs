//! Immutable expression tree.

use crate::eval::{EvalContext, EvalError, EvalValue};

/// A parsed formula. Evaluation walks the tree and short-circuits on the
/// first failing child; no node has side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A double-quoted string literal.
    Literal(String),
    /// A `[FieldName]` reference into the evaluation context.
    Field(String),
    /// `a & b & c` - string concatenation of every child.
    Concat(Vec<Expr>),
    /// `a = b` - loose equality (numeric when both sides are numbers,
    /// case-insensitive text otherwise).
    Equals(Box<Expr>, Box<Expr>),
    /// `NAME(arg, ...)` - call into the function registry.
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Evaluate against a context. Errors propagate upward without partial
    /// side effects.
    pub fn evaluate(&self, ctx: &EvalContext) -> Result<EvalValue, EvalError> {
        match self {
            Expr::Literal(text) => Ok(EvalValue::Text(text.clone())),
            Expr::Field(name) => ctx
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::unknown_field(name)),
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&part.evaluate(ctx)?.to_text());
                }
                Ok(EvalValue::Text(out))
            }
            Expr::Equals(lhs, rhs) => {
                let lhs = lhs.evaluate(ctx)?;
                let rhs = rhs.evaluate(ctx)?;
                Ok(EvalValue::Bool(lhs.loosely_equals(&rhs)))
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(ctx)?);
                }
                crate::functions::call(name, &values)
            }
        }
    }

    /// Field names this expression reads, in first-appearance order.
    #[must_use]
    pub fn referenced_fields(&self) -> Vec<&str> {
        fn walk<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
            match expr {
                Expr::Literal(_) => {}
                Expr::Field(name) => {
                    if !out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                        out.push(name);
                    }
                }
                Expr::Concat(parts) => parts.iter().for_each(|p| walk(p, out)),
                Expr::Equals(lhs, rhs) => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
                Expr::Call(_, args) => args.iter().for_each(|a| walk(a, out)),
            }
        }
        let mut fields = Vec::new();
        walk(self, &mut fields);
        fields
    }
}
