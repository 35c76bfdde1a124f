use crate::error::Result;
use crate::expr::{self, Expr, Resolver};
use crate::scope::Scope;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// An expression compiled once and evaluated against whichever scope it is given.
///
/// Nothing is cached between evaluations; every call reads the scope afresh,
/// which is what lets a reactive run pick up new values.
#[derive(Clone)]
pub struct BoundExpression {
    source: Rc<str>,
    expr: Rc<Expr>,
}

/// Compiles `text`. Syntax errors surface here, not at evaluation time.
pub fn bind(text: &str) -> Result<BoundExpression> {
    let expr = expr::parse(text)?;
    Ok(BoundExpression {
        source: text.into(),
        expr: Rc::new(expr),
    })
}

impl BoundExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        self.evaluate_with(scope)
    }

    pub fn evaluate_with(&self, resolver: &dyn Resolver) -> Result<Value> {
        expr::evaluate_expr(&self.expr, resolver)
    }
}

impl fmt::Debug for BoundExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BoundExpression({:?})", self.source)
    }
}

impl PartialEq for BoundExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reactive::Runtime;

    #[test]
    fn same_expression_different_scopes() {
        let runtime = Runtime::default();
        let first = Scope::root(&runtime);
        let second = Scope::root(&runtime);
        first.define("name", "a");
        second.define("name", "b");
        let greeting = bind("'hi ' + name").unwrap();
        assert_eq!(greeting.evaluate(&first).unwrap(), Value::from("hi a"));
        assert_eq!(greeting.evaluate(&second).unwrap(), Value::from("hi b"));
    }

    #[test]
    fn evaluation_sees_later_writes() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        scope.define("count", 1);
        let doubled = bind("count * 2").unwrap();
        scope.write("count", 5).unwrap();
        assert_eq!(doubled.evaluate(&scope).unwrap(), Value::from(10));
    }

    #[test]
    fn globals_resolve_after_scope() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        assert_eq!(bind("Math.max(1, 4)").unwrap().evaluate(&scope).unwrap(), Value::from(4));
        scope.define("Math", "shadowed");
        assert_eq!(bind("Math").unwrap().evaluate(&scope).unwrap(), Value::from("shadowed"));
    }

    #[test]
    fn syntax_errors_surface_at_bind_time() {
        assert!(matches!(bind("a +* b"), Err(Error::Syntax { .. })));
    }
}
