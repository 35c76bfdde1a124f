use super::ast::*;
use crate::error::{Error, Result};
use crate::value::Value;
use chumsky::{pratt::*, prelude::*};

pub type ParseError<'src> = Rich<'src, char>;

enum Postfix {
    Member(String),
    Index(Expr),
    Call(Vec<Expr>),
}

/// Parses one expression, or several separated by `;`.
pub fn parse(source: &str) -> Result<Expr> {
    parser().parse(source).into_result().map_err(|errors| {
        let error = errors
            .into_iter()
            .next()
            .map(|error| (error.to_string(), error.span().into_range()))
            .unwrap_or_else(|| ("invalid expression".to_owned(), 0..source.len()));
        Error::Syntax {
            expression: source.to_owned(),
            message: error.0,
            span: error.1,
        }
    })
}

pub fn parser<'src>() -> impl Parser<'src, &'src str, Expr, extra::Err<ParseError<'src>>> {
    let expression = recursive(|expression| {
        let number = text::int(10)
            .then(just('.').then(text::digits(10)).or_not())
            .to_slice()
            .from_str::<f64>()
            .unwrapped()
            .map(|number| Expr::Literal(Value::Number(number)));

        let escape = just('\\').ignore_then(choice((
            just('n').to('\n'),
            just('t').to('\t'),
            just('r').to('\r'),
            any(),
        )));
        let single_quoted = none_of("\\'")
            .or(escape.clone())
            .repeated()
            .collect::<String>()
            .delimited_by(just('\''), just('\''));
        let double_quoted = none_of("\\\"")
            .or(escape)
            .repeated()
            .collect::<String>()
            .delimited_by(just('"'), just('"'));
        let string = single_quoted
            .or(double_quoted)
            .map(|text| Expr::Literal(Value::from(text)));

        let name = just('$')
            .or_not()
            .then(text::ident())
            .to_slice()
            .map(|name: &str| match name {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                "undefined" => Expr::Literal(Value::Undefined),
                _ => Expr::Identifier(name.to_owned()),
            });

        let items = expression
            .clone()
            .separated_by(just(',').padded())
            .allow_trailing()
            .collect::<Vec<_>>();

        let array = items
            .clone()
            .delimited_by(just('[').padded(), just(']'))
            .map(Expr::Array);

        let group = expression
            .clone()
            .delimited_by(just('(').padded(), just(')'));

        let atom = choice((number, string, name, array, group)).padded();

        let postfix = atom.foldl(
            choice((
                just('.')
                    .padded()
                    .ignore_then(text::ident())
                    .map(|property: &str| Postfix::Member(property.to_owned())),
                expression
                    .clone()
                    .delimited_by(just('[').padded(), just(']'))
                    .map(Postfix::Index),
                items
                    .delimited_by(just('(').padded(), just(')'))
                    .map(Postfix::Call),
            ))
            .padded()
            .repeated(),
            |object, postfix| match postfix {
                Postfix::Member(property) => Expr::Member {
                    object: Box::new(object),
                    property,
                },
                Postfix::Index(index) => Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                },
                Postfix::Call(arguments) => Expr::Call {
                    callee: Box::new(object),
                    arguments,
                },
            },
        );

        let operators = postfix.pratt((
            prefix(8, just('!').padded(), |_, operand, _| {
                Expr::unary(UnaryOperator::Not, operand)
            }),
            prefix(8, just('-').padded(), |_, operand, _| {
                Expr::unary(UnaryOperator::Negate, operand)
            }),
            infix(left(6), just('*').padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Multiply, l, r)
            }),
            infix(left(6), just('/').padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Divide, l, r)
            }),
            infix(left(6), just('%').padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Remainder, l, r)
            }),
            // `+=` and `-=` belong to assignment
            infix(left(5), just('+').then_ignore(just('=').not()).padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Add, l, r)
            }),
            infix(left(5), just('-').then_ignore(just('=').not()).padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Subtract, l, r)
            }),
            infix(left(4), just("<=").padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::LessOrEqual, l, r)
            }),
            infix(left(4), just('<').padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Less, l, r)
            }),
            infix(left(4), just(">=").padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::GreaterOrEqual, l, r)
            }),
            infix(left(4), just('>').padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Greater, l, r)
            }),
            infix(left(3), just("===").padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::StrictEqual, l, r)
            }),
            infix(left(3), just("!==").padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::StrictNotEqual, l, r)
            }),
            infix(left(3), just("==").padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::Equal, l, r)
            }),
            infix(left(3), just("!=").padded(), |l, _, r, _| {
                Expr::binary(BinaryOperator::NotEqual, l, r)
            }),
            infix(left(2), just("&&").padded(), |l, _, r, _| {
                Expr::logical(LogicalOperator::And, l, r)
            }),
            infix(left(1), just("||").padded(), |l, _, r, _| {
                Expr::logical(LogicalOperator::Or, l, r)
            }),
        ));

        let conditional = operators
            .then(
                just('?')
                    .padded()
                    .ignore_then(expression.clone())
                    .then_ignore(just(':').padded())
                    .then(expression.clone())
                    .or_not(),
            )
            .map(|(test, branches)| match branches {
                Some((consequent, alternate)) => Expr::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                },
                None => test,
            });

        let assign_operator = choice((
            just("+=").to(AssignOperator::Add),
            just("-=").to(AssignOperator::Subtract),
            just('=').then_ignore(just('=').not()).to(AssignOperator::Assign),
        ))
        .padded();

        conditional
            .then(assign_operator.then(expression).or_not())
            .try_map(|(target, assignment), span| match assignment {
                None => Ok(target),
                Some((operator, value)) if target.is_assignable() => Ok(Expr::Assign {
                    operator,
                    target: Box::new(target),
                    value: Box::new(value),
                }),
                Some(_) => Err(Rich::custom(span, "invalid assignment target")),
            })
    });

    expression
        .separated_by(just(';').padded())
        .allow_trailing()
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|mut expressions| match expressions.len() {
            1 => expressions.remove(0),
            _ => Expr::Sequence(expressions),
        })
        .padded()
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier(name: &str) -> Expr {
        Expr::Identifier(name.to_owned())
    }

    fn number(number: f64) -> Expr {
        Expr::Literal(Value::Number(number))
    }

    #[test]
    fn precedence() {
        assert_eq!(
            parse("1 + 2 * 3").unwrap(),
            Expr::binary(
                BinaryOperator::Add,
                number(1.0),
                Expr::binary(BinaryOperator::Multiply, number(2.0), number(3.0)),
            )
        );
    }

    #[test]
    fn member_call_chain() {
        let expr = parse("console.log(a[0], 'x')").unwrap();
        let Expr::Call { callee, arguments } = expr else {
            panic!("expected call");
        };
        assert_eq!(
            *callee,
            Expr::Member {
                object: Box::new(identifier("console")),
                property: "log".into(),
            }
        );
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn event_identifier_and_compound_assignment() {
        let expr = parse("count += $event.detail").unwrap();
        let Expr::Assign {
            operator, target, ..
        } = expr
        else {
            panic!("expected assignment");
        };
        assert_eq!(operator, AssignOperator::Add);
        assert_eq!(*target, identifier("count"));
        assert_eq!(
            parse("$event").unwrap().identifiers(),
            vec!["$event"]
        );
    }

    #[test]
    fn equality_is_not_assignment() {
        assert!(matches!(
            parse("a == 1").unwrap(),
            Expr::Binary {
                operator: BinaryOperator::Equal,
                ..
            }
        ));
        assert!(matches!(
            parse("a !== 1").unwrap(),
            Expr::Binary {
                operator: BinaryOperator::StrictNotEqual,
                ..
            }
        ));
    }

    #[test]
    fn conditional_and_sequence() {
        let expr = parse("a = 1; ok ? 'yes' : 'no'").unwrap();
        let Expr::Sequence(parts) = expr else {
            panic!("expected sequence");
        };
        assert!(matches!(parts[1], Expr::Conditional { .. }));
    }

    #[test]
    fn invalid_assignment_target_is_a_syntax_error() {
        assert!(matches!(parse("1 = 2").unwrap_err(), Error::Syntax { .. }));
        assert!(matches!(parse("a + b = 2").unwrap_err(), Error::Syntax { .. }));
    }

    #[test]
    fn unterminated_input_is_a_syntax_error() {
        let Error::Syntax { expression, span, .. } = parse("count +").unwrap_err() else {
            panic!("expected syntax error");
        };
        assert_eq!(expression, "count +");
        assert!(span.start <= expression.len());
    }

    #[test]
    fn keywords_are_literals() {
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(parse(" true ").unwrap(), Expr::Literal(Value::Bool(true)));
    }
}
