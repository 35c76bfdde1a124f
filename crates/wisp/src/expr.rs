//! Expression language used in `:attr`, `@event` and `{{ }}` bindings.

mod ast;
pub use ast::*;

mod parser;
pub use parser::{ParseError, parse, parser};

mod eval;
pub use eval::{Resolver, evaluate_expr};

mod globals;
pub use globals::Globals;

use crate::error::Result;
use crate::value::Value;

/// Parses and evaluates `source` in one go.
pub fn evaluate(source: &str, resolver: &dyn Resolver) -> Result<Value> {
    evaluate_expr(&parse(source)?, resolver)
}
