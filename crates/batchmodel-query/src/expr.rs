//! Predicates and assignment expressions.
//!
//! Expressions address entity properties by path (`total`,
//! `embedded.address`) rather than by column. Paths are resolved to
//! quoted columns through the entity's mapping when the statement is
//! built, so an expression stays valid whatever the catalog names the
//! columns.

use batchmodel_core::{Dialect, Result, Value};
use batchmodel_mapping::EntityMapping;

/// A SQL expression usable as a predicate or an assigned value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Entity property addressed by path
    Property(String),

    /// Literal value, always bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a > b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation (e.g., NOT a, -a)
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// IN expression
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// Explicit grouping
    Paren(Box<Expr>),

    /// Raw SQL fragment (escape hatch)
    Raw(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,

    // Logical
    /// Logical AND
    And,
    /// Logical OR
    Or,

    // Arithmetic
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
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
            BinaryOp::Add | BinaryOp::Sub => 7,
            BinaryOp::Mul | BinaryOp::Div => 8,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl Expr {
    // ==================== Constructors ====================

    /// Reference an entity property by path.
    pub fn prop(path: impl Into<String>) -> Self {
        Expr::Property(path.into())
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a NULL literal.
    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    /// Create a raw SQL expression (escape hatch).
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    // ==================== Comparison Operators ====================

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

    // ==================== Logical Operators ====================

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    // ==================== Null Checks ====================

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

    // ==================== IN ====================

    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    // ==================== Arithmetic ====================

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }

    /// Wrap in parentheses.
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    /// Property paths referenced anywhere in the expression.
    pub fn properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Property(path) => out.push(path),
            Expr::Binary { left, right, .. } => {
                left.collect_properties(out);
                right.collect_properties(out);
            }
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } | Expr::Paren(expr) => {
                expr.collect_properties(out);
            }
            Expr::In { expr, values, .. } => {
                expr.collect_properties(out);
                for value in values {
                    value.collect_properties(out);
                }
            }
            Expr::Literal(_) | Expr::Raw(_) => {}
        }
    }

    // ==================== SQL Generation ====================

    /// Build SQL for this expression.
    ///
    /// Literals are appended to `params`; placeholders are numbered after
    /// the parameters already present, so one vector can collect the
    /// parameters of a whole statement in textual order.
    pub fn build(
        &self,
        dialect: Dialect,
        mapping: &EntityMapping,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        match self {
            Expr::Property(path) => {
                let column = mapping.column_for(path)?;
                Ok(dialect.quote_identifier(column))
            }

            Expr::Literal(value) => {
                params.push(value.clone());
                Ok(dialect.placeholder(params.len()))
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build_operand(*op, false, dialect, mapping, params)?;
                let right_sql = right.build_operand(*op, true, dialect, mapping, params)?;
                Ok(format!("{left_sql} {} {right_sql}", op.as_str()))
            }

            Expr::Unary { op, expr } => {
                let expr_sql = expr.build_grouped(dialect, mapping, params)?;
                Ok(match op {
                    UnaryOp::Not => format!("NOT {expr_sql}"),
                    UnaryOp::Neg => format!("-{expr_sql}"),
                })
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_grouped(dialect, mapping, params)?;
                let not_str = if *negated { " NOT" } else { "" };
                Ok(format!("{expr_sql} IS{not_str} NULL"))
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // `x IN ()` is not valid SQL. The operand is still checked
                    // against the mapping, but binds nothing.
                    expr.build(dialect, mapping, &mut Vec::new())?;
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let expr_sql = expr.build_grouped(dialect, mapping, params)?;
                let value_sqls = values
                    .iter()
                    .map(|v| v.build(dialect, mapping, params))
                    .collect::<Result<Vec<_>>>()?;
                let not_str = if *negated { "NOT " } else { "" };
                Ok(format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", ")))
            }

            Expr::Paren(expr) => Ok(format!("({})", expr.build(dialect, mapping, params)?)),

            Expr::Raw(sql) => Ok(sql.clone()),
        }
    }

    /// Build an operand of `parent`.
    ///
    /// A left operand is parenthesized when it binds looser than `parent`.
    /// A right operand is also parenthesized at equal precedence, since
    /// `a - (b - c)` is not `a - b - c`.
    fn build_operand(
        &self,
        parent: BinaryOp,
        right: bool,
        dialect: Dialect,
        mapping: &EntityMapping,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        let sql = self.build(dialect, mapping, params)?;
        let needs_parens = match self {
            Expr::Binary { op, .. } if right => op.precedence() <= parent.precedence(),
            Expr::Binary { op, .. } => op.precedence() < parent.precedence(),
            _ => false,
        };
        Ok(if needs_parens { format!("({sql})") } else { sql })
    }

    /// Build the operand of a unary operator, IS NULL or IN.
    ///
    /// Anything compound is parenthesized; in particular `-(-x)` must not
    /// render as `--x`, which SQL reads as a comment.
    fn build_grouped(
        &self,
        dialect: Dialect,
        mapping: &EntityMapping,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        let sql = self.build(dialect, mapping, params)?;
        Ok(match self {
            Expr::Binary { .. } | Expr::Unary { .. } | Expr::IsNull { .. } | Expr::In { .. } => {
                format!("({sql})")
            }
            _ => sql,
        })
    }
}

// ==================== Conversions ====================

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}
