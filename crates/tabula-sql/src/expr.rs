//! SQL expressions.

use crate::{ColumnName, ParamName};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A parameter placeholder (e.g., $handle -> $1)
    Param(ParamName),
    /// A column reference
    Column(ColumnRef),
    /// A string literal
    String(String),
    /// An integer literal
    Int(i64),
    /// A floating point literal
    Float(f64),
    /// A boolean literal
    Bool(bool),
    /// NULL
    Null,
    /// NOW() function
    Now,
    /// Binary operation (e.g., a = b, a AND b)
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// NOT expr
    Not(Box<Expr>),
    /// A parenthesized expression
    Nested(Box<Expr>),
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// LIKE pattern match (backslash is the escape character)
    Like { expr: Box<Expr>, pattern: Box<Expr> },
    /// Function call
    FnCall { name: String, args: Vec<Expr> },
    /// Raw SQL (escape hatch)
    Raw(String),
}

/// A column reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub column: ColumnName,
}

impl ColumnRef {
    pub fn new(column: ColumnName) -> Self {
        Self { column }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }

    fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

// Convenience constructors
impl Expr {
    pub fn param(name: ParamName) -> Self {
        Expr::Param(name)
    }

    pub fn column(name: ColumnName) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::String(s.into())
    }

    pub fn int(n: i64) -> Self {
        Expr::Int(n)
    }

    pub fn bool(b: bool) -> Self {
        Expr::Bool(b)
    }

    fn binop(self, op: BinOp, other: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    /// Create an equality expression: self = other
    pub fn eq(self, other: Expr) -> Self {
        self.binop(BinOp::Eq, other)
    }

    /// Create an inequality expression: self <> other
    pub fn ne(self, other: Expr) -> Self {
        self.binop(BinOp::Ne, other)
    }

    /// Create a comparison using an arbitrary operator.
    pub fn compare(self, op: BinOp, other: Expr) -> Self {
        self.binop(op, other)
    }

    /// Create an AND expression: self AND other
    pub fn and(self, other: Expr) -> Self {
        self.binop(BinOp::And, other.nested_if_logical())
            .with_nested_left()
    }

    /// Create an OR expression: self OR other
    pub fn or(self, other: Expr) -> Self {
        self.binop(BinOp::Or, other.nested_if_logical())
            .with_nested_left()
    }

    /// Create a NOT expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self.nested_if_logical()))
    }

    /// Create IS NULL expression
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// Create IS NOT NULL expression
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Create LIKE expression
    pub fn like(self, pattern: Expr) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern),
        }
    }

    /// Conjunction of all expressions. Empty input is `TRUE`.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or(Expr::Bool(true))
    }

    /// Disjunction of all expressions. Empty input is `FALSE`.
    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or(Expr::Bool(false))
    }

    fn nested_if_logical(self) -> Self {
        match &self {
            Expr::BinOp { op, .. } if op.is_logical() => Expr::Nested(Box::new(self)),
            _ => self,
        }
    }

    // `a OR b` followed by `.and(c)` must render as `(a OR b) AND c`. Operands
    // of the same operator chain stay flat.
    fn with_nested_left(self) -> Self {
        match self {
            Expr::BinOp { left, op, right } => {
                let left = match *left {
                    Expr::BinOp {
                        op: inner_op,
                        left: l,
                        right: r,
                    } if inner_op.is_logical() && inner_op != op => {
                        Expr::Nested(Box::new(Expr::BinOp {
                            left: l,
                            op: inner_op,
                            right: r,
                        }))
                    }
                    other => other,
                };
                Expr::BinOp {
                    left: Box::new(left),
                    op,
                    right,
                }
            }
            other => other,
        }
    }
}
