//! Filter and condition expressions.
//!
//! A reduced expression DSL that renders through [`SqlWriter`], so literal
//! values become parameters numbered in sequence with the rest of the
//! statement they are embedded in.

use crate::sql::{SqlWriter, ToSql};
use sqlbulk_core::Value;

/// Alias of the pre-update row in an update condition.
pub const CURRENT: &str = "__bulk_current";
/// Alias of the candidate row in an update condition.
pub const INCOMING: &str = "__bulk_incoming";

/// A SQL expression that can be used in WHERE clauses and update conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value, bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a > b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// IN (v1, v2, ...)
    In {
        expr: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },

    /// LIKE / NOT LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Get the precedence of this operator (higher = binds tighter).
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div => 5,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(v: $t) -> Self {
                Expr::Literal(Value::from(v))
            }
        })*
    };
}

literal_from!(bool, i8, i16, i32, i64, f32, f64, String, &str);

impl Expr {
    /// Unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Column reference qualified by a table alias.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Column of the row as it is stored before an update.
    pub fn current(column: impl Into<String>) -> Self {
        Self::qualified(CURRENT, column)
    }

    /// Column of the candidate row supplied by the caller.
    pub fn incoming(column: impl Into<String>) -> Self {
        Self::qualified(INCOMING, column)
    }

    /// Literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, values: Vec<impl Into<Value>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<impl Into<Value>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn not_like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: true,
        }
    }

    /// Every column this expression references, as `(qualifier, name)`.
    pub fn columns(&self) -> Vec<(Option<&str>, &str)> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<(Option<&'a str>, &'a str)>) {
        match self {
            Expr::Column { table, name } => out.push((table.as_deref(), name.as_str())),
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(expr)
            | Expr::IsNull { expr, .. }
            | Expr::In { expr, .. }
            | Expr::Like { expr, .. } => expr.collect_columns(out),
        }
    }

    fn write_operand(&self, w: &mut SqlWriter, parent: u8) {
        let wrap = match self {
            Expr::Binary { op, .. } => op.precedence() <= parent,
            Expr::Not(_) | Expr::IsNull { .. } | Expr::In { .. } | Expr::Like { .. } => parent > 2,
            Expr::Column { .. } | Expr::Literal(_) => false,
        };
        if wrap {
            w.push("(");
            self.to_sql(w);
            w.push(")");
        } else {
            self.to_sql(w);
        }
    }
}

impl ToSql for Expr {
    fn to_sql(&self, w: &mut SqlWriter) {
        match self {
            Expr::Column { table, name } => {
                if let Some(t) = table {
                    w.qualified(t, name);
                } else {
                    w.ident(name);
                }
            }
            Expr::Literal(value) => {
                if value.is_null() {
                    w.push("NULL");
                } else {
                    w.param(value.clone());
                }
            }
            Expr::Binary { left, op, right } => {
                // Left-associative: an equal-precedence left operand needs no parens.
                left.write_operand(w, op.precedence().saturating_sub(1));
                w.push(" ").push(op.as_str()).push(" ");
                right.write_operand(w, op.precedence());
            }
            Expr::Not(expr) => {
                w.push("NOT ");
                expr.write_operand(w, 3);
            }
            Expr::IsNull { expr, negated } => {
                expr.write_operand(w, 3);
                w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::In {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // `x IN ()` is not valid SQL; an empty list matches nothing.
                    w.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return;
                }
                expr.write_operand(w, 3);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                w.join(values.iter(), ", ", |w, v| {
                    w.param(v.clone());
                });
                w.push(")");
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                expr.write_operand(w, 3);
                w.push(if *negated { " NOT LIKE " } else { " LIKE " });
                w.param(Value::Text(pattern.clone()));
            }
        }
    }
}
