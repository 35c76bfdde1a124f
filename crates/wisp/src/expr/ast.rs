use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Array(Vec<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        operator: AssignOperator,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `a; b; c` evaluates to `c`.
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Assign,
    Add,
    Subtract,
}

impl Expr {
    pub fn unary(operator: UnaryOperator, operand: Expr) -> Self {
        Self::Unary {
            operator,
            operand: Box::new(operand),
        }
    }

    pub fn binary(operator: BinaryOperator, left: Expr, right: Expr) -> Self {
        Self::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(operator: LogicalOperator, left: Expr, right: Expr) -> Self {
        Self::Logical {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Identifiers, members and indexes can stand on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Self::Identifier(_) | Self::Member { .. } | Self::Index { .. }
        )
    }

    /// Free identifiers in evaluation order, duplicates removed.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Identifier(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Self::Array(items) | Self::Sequence(items) => {
                items.iter().for_each(|item| item.collect_identifiers(names))
            }
            Self::Member { object, .. } => object.collect_identifiers(names),
            Self::Index { object, index } => {
                object.collect_identifiers(names);
                index.collect_identifiers(names);
            }
            Self::Call { callee, arguments } => {
                callee.collect_identifiers(names);
                arguments
                    .iter()
                    .for_each(|argument| argument.collect_identifiers(names));
            }
            Self::Unary { operand, .. } => operand.collect_identifiers(names),
            Self::Binary { left, right, .. } | Self::Logical { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
            Self::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.collect_identifiers(names);
                consequent.collect_identifiers(names);
                alternate.collect_identifiers(names);
            }
            Self::Assign { target, value, .. } => {
                target.collect_identifiers(names);
                value.collect_identifiers(names);
            }
        }
    }
}
