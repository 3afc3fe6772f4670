//! Typed expression tree for deferred rule bodies.
//!
//! Rules are authored as small expression trees evaluated later against an
//! explicit [`EvalScope`](crate::core::context::EvalScope) — names resolve to
//! bindings or sibling field values, [`Expr::SelfValue`] resolves to the
//! current field's own value. There is no reflective code capture anywhere:
//! what a rule can see is exactly what the scope holds.

use crate::core::types::Value;
use serde::{Deserialize, Serialize};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Logical negation (truthiness-based)
    Not,
    /// Numeric negation
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// Membership in a list
    In,
    /// Absence from a list
    NotIn,
    /// String concatenation
    Concat,
}

impl BinaryOp {
    /// Operator spelling for error messages.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Concat => "++",
        }
    }
}

/// A deferred rule body as data.
///
/// Built with the combinator methods below; evaluated by the
/// [`evaluator`](crate::eval::evaluator) against a per-run scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "args", rename_all = "snake_case")]
pub enum Expr {
    /// A literal value
    Literal(Value),
    /// A name resolved against the scope (binding or sibling field)
    Name(String),
    /// The current field's own value
    SelfValue,
    /// Unary operation
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// A literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// A name resolved against the evaluation scope.
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    /// The current field's own value.
    pub fn self_value() -> Self {
        Expr::SelfValue
    }

    /// Whether this expression references the current field's value anywhere.
    pub fn uses_self(&self) -> bool {
        match self {
            Expr::SelfValue => true,
            Expr::Literal(_) | Expr::Name(_) => false,
            Expr::Unary(_, inner) => inner.uses_self(),
            Expr::Binary(_, lhs, rhs) => lhs.uses_self() || rhs.uses_self(),
        }
    }

    fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(self), Box::new(rhs))
    }

    /// `self + rhs`
    pub fn add(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    /// `self - rhs`
    pub fn sub(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    /// `self * rhs`
    pub fn mul(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// `self / rhs`
    pub fn div(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    /// `self == rhs`
    pub fn eq(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn ne(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// `self and rhs` (truthiness-based)
    pub fn and(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    /// `self or rhs` (truthiness-based)
    pub fn or(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    /// `self in rhs` where rhs evaluates to a list
    pub fn in_list(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::In, rhs)
    }

    /// `self not in rhs` where rhs evaluates to a list
    pub fn not_in_list(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::NotIn, rhs)
    }

    /// String concatenation
    pub fn concat(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Concat, rhs)
    }

    /// Logical negation
    pub fn not(self) -> Self {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }

    /// Numeric negation
    pub fn neg(self) -> Self {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}
