use super::ast::*;
use crate::error::{Error, Result};
use crate::value::Value;

/// Where free identifiers come from during evaluation.
pub trait Resolver {
    fn has(&self, name: &str) -> bool;

    fn read(&self, name: &str) -> Result<Value>;

    /// Assigns to an existing binding. Must not create one.
    fn write(&self, name: &str, value: Value) -> Result<()>;

    /// Ambient fallback consulted when no binding named `name` exists.
    fn global(&self, _name: &str) -> Option<Value> {
        None
    }
}

pub fn evaluate_expr(expr: &Expr, resolver: &dyn Resolver) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Identifier(name) => lookup(name, resolver),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate_expr(item, resolver))
            .collect::<Result<Vec<_>>>()
            .map(Value::from),
        Expr::Member { object, property } => evaluate_expr(object, resolver)?.property(property),
        Expr::Index { object, index } => {
            let object = evaluate_expr(object, resolver)?;
            let key = evaluate_expr(index, resolver)?.to_string();
            object.property(&key)
        }
        Expr::Call { callee, arguments } => {
            let function = evaluate_expr(callee, resolver)?;
            let arguments = arguments
                .iter()
                .map(|argument| evaluate_expr(argument, resolver))
                .collect::<Result<Vec<_>>>()?;
            match function {
                Value::Function(function) => function.call(&arguments),
                other => Err(Error::type_mismatch(format!(
                    "{} is not a function",
                    describe(callee, &other)
                ))),
            }
        }
        Expr::Unary { operator, operand } => {
            let operand = evaluate_expr(operand, resolver)?;
            Ok(match operator {
                UnaryOperator::Not => Value::Bool(!operand.is_truthy()),
                UnaryOperator::Negate => Value::Number(-operand.to_number()),
            })
        }
        Expr::Binary {
            operator,
            left,
            right,
        } => {
            let left = evaluate_expr(left, resolver)?;
            let right = evaluate_expr(right, resolver)?;
            Ok(binary(*operator, &left, &right))
        }
        Expr::Logical {
            operator,
            left,
            right,
        } => {
            let left = evaluate_expr(left, resolver)?;
            match (operator, left.is_truthy()) {
                (LogicalOperator::And, false) | (LogicalOperator::Or, true) => Ok(left),
                _ => evaluate_expr(right, resolver),
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if evaluate_expr(test, resolver)?.is_truthy() {
                evaluate_expr(consequent, resolver)
            } else {
                evaluate_expr(alternate, resolver)
            }
        }
        Expr::Assign {
            operator,
            target,
            value,
        } => {
            let value = evaluate_expr(value, resolver)?;
            let value = match operator {
                AssignOperator::Assign => value,
                AssignOperator::Add => {
                    binary(BinaryOperator::Add, &evaluate_expr(target, resolver)?, &value)
                }
                AssignOperator::Subtract => binary(
                    BinaryOperator::Subtract,
                    &evaluate_expr(target, resolver)?,
                    &value,
                ),
            };
            assign(target, value.clone(), resolver)?;
            Ok(value)
        }
        Expr::Sequence(expressions) => {
            let mut last = Value::Undefined;
            for expression in expressions {
                last = evaluate_expr(expression, resolver)?;
            }
            Ok(last)
        }
    }
}

fn lookup(name: &str, resolver: &dyn Resolver) -> Result<Value> {
    if resolver.has(name) {
        return resolver.read(name);
    }
    resolver
        .global(name)
        .ok_or_else(|| Error::name_not_defined(name))
}

fn describe(callee: &Expr, value: &Value) -> String {
    match callee {
        Expr::Identifier(name) => name.clone(),
        Expr::Member { property, .. } => property.clone(),
        _ => value.type_name().to_owned(),
    }
}

/// Writes through a member/index path: the root variable is read, updated
/// along the path and written back whole, so readers of the root re-run.
fn assign(target: &Expr, value: Value, resolver: &dyn Resolver) -> Result<()> {
    let mut path = Vec::new();
    let mut cursor = target;
    let root = loop {
        match cursor {
            Expr::Identifier(name) => break name,
            Expr::Member { object, property } => {
                path.push(property.clone());
                cursor = object;
            }
            Expr::Index { object, index } => {
                path.push(evaluate_expr(index, resolver)?.to_string());
                cursor = object;
            }
            _ => return Err(Error::InvalidAssignment),
        }
    };
    let Some((last, parents)) = path.split_first() else {
        return resolver.write(root, value);
    };
    let mut root_value = resolver.read(root)?;
    let mut slot = &mut root_value;
    for key in parents.iter().rev() {
        slot = slot.property_mut(key)?;
    }
    slot.set_property(last, value)?;
    resolver.write(root, root_value)
}

fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> Value {
    use BinaryOperator::*;
    match operator {
        Add => match (left, right) {
            (Value::Text(_) | Value::List(_) | Value::Object(_) | Value::Function(_), _)
            | (_, Value::Text(_) | Value::List(_) | Value::Object(_) | Value::Function(_)) => {
                Value::from(format!("{left}{right}"))
            }
            _ => Value::Number(left.to_number() + right.to_number()),
        },
        Subtract => Value::Number(left.to_number() - right.to_number()),
        Multiply => Value::Number(left.to_number() * right.to_number()),
        Divide => Value::Number(left.to_number() / right.to_number()),
        Remainder => Value::Number(left.to_number() % right.to_number()),
        Less | LessOrEqual | Greater | GreaterOrEqual => {
            let ordering = match (left, right) {
                (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(ordering.is_some_and(|ordering| match operator {
                Less => ordering.is_lt(),
                LessOrEqual => ordering.is_le(),
                Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        Equal => Value::Bool(left.loose_eq(right)),
        NotEqual => Value::Bool(!left.loose_eq(right)),
        StrictEqual => Value::Bool(left.strict_eq(right)),
        StrictNotEqual => Value::Bool(!left.strict_eq(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;
    use indexmap::IndexMap;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Bag(RefCell<IndexMap<String, Value>>);

    impl Bag {
        fn with(entries: &[(&str, Value)]) -> Self {
            Self(RefCell::new(
                entries
                    .iter()
                    .map(|(name, value)| ((*name).to_owned(), value.clone()))
                    .collect(),
            ))
        }
    }

    impl Resolver for Bag {
        fn has(&self, name: &str) -> bool {
            self.0.borrow().contains_key(name)
        }

        fn read(&self, name: &str) -> Result<Value> {
            self.0
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| Error::name_not_defined(name))
        }

        fn write(&self, name: &str, value: Value) -> Result<()> {
            match self.0.borrow_mut().get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(Error::name_not_defined(name)),
            }
        }
    }

    fn eval(source: &str, bag: &Bag) -> Result<Value> {
        evaluate_expr(&parse(source)?, bag)
    }

    #[test]
    fn arithmetic_and_concatenation() {
        let bag = Bag::default();
        assert_eq!(eval("1 + 1", &bag).unwrap(), Value::from(2));
        assert_eq!(eval("'a' + 1", &bag).unwrap(), Value::from("a1"));
        assert_eq!(eval("7 % 4 * 2", &bag).unwrap(), Value::from(6));
        assert_eq!(eval("-(2 - 5)", &bag).unwrap(), Value::from(3));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let bag = Bag::default();
        assert_eq!(eval("0 || 'fallback'", &bag).unwrap(), Value::from("fallback"));
        assert_eq!(eval("false && missing", &bag).unwrap(), Value::Bool(false));
    }

    #[test]
    fn undefined_identifier_fails() {
        let bag = Bag::default();
        assert_eq!(
            eval("unknownVar + 1", &bag).unwrap_err(),
            Error::name_not_defined("unknownVar")
        );
    }

    #[test]
    fn assignment_never_creates_a_binding() {
        let bag = Bag::default();
        assert_eq!(eval("fresh = 1", &bag).unwrap_err(), Error::name_not_defined("fresh"));
        assert!(!bag.has("fresh"));
    }

    #[test]
    fn compound_assignment() {
        let bag = Bag::with(&[("count", 1.into())]);
        assert_eq!(eval("count += 2", &bag).unwrap(), Value::from(3));
        assert_eq!(eval("count -= 1; count", &bag).unwrap(), Value::from(2));
    }

    #[test]
    fn nested_assignment_writes_the_root_back() {
        let user = Value::object([(
            "address".to_owned(),
            Value::object([("city".to_owned(), "Oslo".into())]),
        )]);
        let bag = Bag::with(&[("user", user.clone()), ("items", Value::list([1.into()]))]);
        eval("user.address.city = 'Bergen'", &bag).unwrap();
        eval("items[0] = 5", &bag).unwrap();
        assert_eq!(eval("user.address.city", &bag).unwrap(), Value::from("Bergen"));
        assert_eq!(eval("items[0]", &bag).unwrap(), Value::from(5));
        assert_eq!(
            user.property("address").unwrap().property("city").unwrap(),
            Value::from("Oslo")
        );
    }

    #[test]
    fn calling_a_non_function_is_a_type_mismatch() {
        let bag = Bag::with(&[("count", 1.into())]);
        let error = eval("count()", &bag).unwrap_err();
        assert_eq!(error, Error::type_mismatch("count is not a function"));
    }

    #[test]
    fn comparisons() {
        let bag = Bag::default();
        assert_eq!(eval("'b' > 'a'", &bag).unwrap(), Value::Bool(true));
        assert_eq!(eval("2 <= 1", &bag).unwrap(), Value::Bool(false));
        assert_eq!(eval("'1' == 1", &bag).unwrap(), Value::Bool(true));
        assert_eq!(eval("'1' === 1", &bag).unwrap(), Value::Bool(false));
        assert_eq!(eval("[1, 2].length", &bag).unwrap(), Value::from(2));
    }
}
