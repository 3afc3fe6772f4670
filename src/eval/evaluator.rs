//! Rule body evaluation.
//!
//! A [`RuleBody`] is either an [`Expr`] tree or a named closure. Both are
//! evaluated against an [`EvalScope`] and both fail softly: every failure is
//! an [`EvalError`] the pipeline turns into a field error — nothing escapes
//! this boundary as a panic. A rule that loops forever is the caller's
//! problem; the engine does not bound evaluation time.

use crate::core::context::EvalScope;
use crate::core::error::{EvalError, EvalResult};
use crate::core::types::Value;
use crate::eval::expr::{BinaryOp, Expr, UnaryOp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Declared argument count of a rule body.
///
/// Nullary bodies see only the scope; unary bodies additionally receive the
/// current field's value (as `SelfValue` / [`EvalScope::current`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    Nullary,
    Unary,
}

/// Closure form of a rule body.
pub type RuleFn = Arc<dyn Fn(&EvalScope) -> EvalResult<Value> + Send + Sync>;

/// A deferred rule body attached to a field at definition time.
///
/// Shared across all runs of the definition; only the scope varies per run.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "body", content = "spec", rename_all = "snake_case")]
pub enum RuleBody {
    /// An expression tree with its declared arity
    Expr {
        /// Declared arity; must match the expression's actual use of
        /// `SelfValue` (checked when the definition is built)
        arity: Arity,
        /// The expression
        expr: Expr,
    },

    /// A named closure
    /// Note: The closure is skipped during serialization
    #[serde(skip)]
    Function {
        /// Name used in diagnostics
        name: String,
        /// Declared arity
        arity: Arity,
        /// The closure
        f: RuleFn,
    },
}

impl RuleBody {
    /// Build an expression body, inferring arity from `SelfValue` usage.
    pub fn expr(expr: Expr) -> Self {
        let arity = if expr.uses_self() {
            Arity::Unary
        } else {
            Arity::Nullary
        };
        RuleBody::Expr { arity, expr }
    }

    /// Build an expression body with an explicitly declared arity.
    pub fn expr_with_arity(arity: Arity, expr: Expr) -> Self {
        RuleBody::Expr { arity, expr }
    }

    /// Build a closure body.
    pub fn function(
        name: impl Into<String>,
        arity: Arity,
        f: impl Fn(&EvalScope) -> EvalResult<Value> + Send + Sync + 'static,
    ) -> Self {
        RuleBody::Function {
            name: name.into(),
            arity,
            f: Arc::new(f),
        }
    }

    /// Declared arity of this body.
    pub fn arity(&self) -> Arity {
        match self {
            RuleBody::Expr { arity, .. } => *arity,
            RuleBody::Function { arity, .. } => *arity,
        }
    }

    /// Whether the declared arity matches the body's actual shape.
    ///
    /// Closures are opaque, so only expression bodies can be checked.
    pub fn arity_consistent(&self) -> bool {
        match self {
            RuleBody::Expr { arity, expr } => {
                let actual = if expr.uses_self() {
                    Arity::Unary
                } else {
                    Arity::Nullary
                };
                // A nullary expression under a unary declaration is fine
                // (the body simply ignores its argument); the reverse is not.
                actual == Arity::Nullary || *arity == Arity::Unary
            }
            RuleBody::Function { .. } => true,
        }
    }

    /// Evaluate this body against a scope.
    pub fn evaluate(&self, scope: &EvalScope) -> EvalResult<Value> {
        let result = match self {
            RuleBody::Expr { expr, .. } => eval_expr(expr, scope),
            RuleBody::Function { f, .. } => f(scope),
        };
        log::trace!("rule body evaluated: {:?}", result);
        result
    }
}

impl fmt::Debug for RuleBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleBody::Expr { arity, expr } => f
                .debug_struct("Expr")
                .field("arity", arity)
                .field("expr", expr)
                .finish(),
            RuleBody::Function { name, arity, .. } => f
                .debug_struct("Function")
                .field("name", name)
                .field("arity", arity)
                .field("f", &"<closure>")
                .finish(),
        }
    }
}

// ============================================================================
// Expression Evaluation
// ============================================================================

/// Evaluate an expression tree against a scope.
pub fn eval_expr(expr: &Expr, scope: &EvalScope) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Name(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownName(name.clone())),

        Expr::SelfValue => scope
            .current()
            .cloned()
            .ok_or_else(|| EvalError::Failed("no current value in scope".to_string())),

        Expr::Unary(op, inner) => {
            let value = eval_expr(inner, scope)?;
            eval_unary(*op, value)
        }

        Expr::Binary(op, lhs, rhs) => {
            // And/Or short-circuit on the left operand's truthiness
            match op {
                BinaryOp::And => {
                    let left = eval_expr(lhs, scope)?;
                    if !left.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                    let right = eval_expr(rhs, scope)?;
                    Ok(Value::Boolean(right.is_truthy()))
                }
                BinaryOp::Or => {
                    let left = eval_expr(lhs, scope)?;
                    if left.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                    let right = eval_expr(rhs, scope)?;
                    Ok(Value::Boolean(right.is_truthy()))
                }
                _ => {
                    let left = eval_expr(lhs, scope)?;
                    let right = eval_expr(rhs, scope)?;
                    eval_binary(*op, left, right)
                }
            }
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> EvalResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvalError::TypeMismatch {
                op: "-".to_string(),
                got: other.kind_name().to_string(),
            }),
        },
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Add => numeric_op(op, left, right, |a, b| a + b, |a, b| a.checked_add(b)),
        BinaryOp::Sub => numeric_op(op, left, right, |a, b| a - b, |a, b| a.checked_sub(b)),
        BinaryOp::Mul => numeric_op(op, left, right, |a, b| a * b, |a, b| a.checked_mul(b)),

        BinaryOp::Div => match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Integer(a / b))
                }
            }
            _ => {
                let (a, b) = both_floats(op, &left, &right)?;
                if b == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Float(a / b))
                }
            }
        },

        BinaryOp::Eq => Ok(Value::Boolean(loose_eq(&left, &right))),
        BinaryOp::Ne => Ok(Value::Boolean(!loose_eq(&left, &right))),

        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(op, &left, &right)?;
            let pass = match op {
                BinaryOp::Lt => ordering == std::cmp::Ordering::Less,
                BinaryOp::Le => ordering != std::cmp::Ordering::Greater,
                BinaryOp::Gt => ordering == std::cmp::Ordering::Greater,
                BinaryOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Boolean(pass))
        }

        BinaryOp::In | BinaryOp::NotIn => match &right {
            Value::List(items) => {
                let found = items.iter().any(|item| loose_eq(&left, item));
                Ok(Value::Boolean(if op == BinaryOp::In {
                    found
                } else {
                    !found
                }))
            }
            other => Err(EvalError::TypeMismatch {
                op: op.symbol().to_string(),
                got: other.kind_name().to_string(),
            }),
        },

        BinaryOp::Concat => match (&left, &right) {
            (Value::String(a), Value::String(b)) => {
                Ok(Value::String(format!("{}{}", a, b)))
            }
            _ => Err(EvalError::TypeMismatch {
                op: op.symbol().to_string(),
                got: format!("{} and {}", left.kind_name(), right.kind_name()),
            }),
        },

        BinaryOp::And | BinaryOp::Or => unreachable!("handled in eval_expr"),
    }
}

/// Integer-preserving arithmetic: two integers stay integral, anything
/// numeric otherwise widens to float.
fn numeric_op(
    op: BinaryOp,
    left: Value,
    right: Value,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> Option<i64>,
) -> EvalResult<Value> {
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => int_op(*a, *b)
            .map(Value::Integer)
            .ok_or_else(|| EvalError::Failed(format!("integer overflow in '{}'", op.symbol()))),
        _ => {
            let (a, b) = both_floats(op, &left, &right)?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn both_floats(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<(f64, f64)> {
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => {
            let bad = if left.as_float().is_none() {
                left
            } else {
                right
            };
            Err(EvalError::TypeMismatch {
                op: op.symbol().to_string(),
                got: bad.kind_name().to_string(),
            })
        }
    }
}

/// Equality that treats 1 and 1.0 as equal; everything else is structural.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| EvalError::Failed(
                "incomparable float (NaN)".to_string(),
            )),
            _ => {
                let bad = if left.as_float().is_none() { left } else { right };
                Err(EvalError::TypeMismatch {
                    op: op.symbol().to_string(),
                    got: bad.kind_name().to_string(),
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Bindings;

    fn scope_with(entries: &[(&str, Value)]) -> EvalScope {
        let mut scope = EvalScope::new();
        for (name, value) in entries {
            scope.insert(name.to_string(), value.clone());
        }
        scope
    }

    #[test]
    fn test_name_resolution() {
        let scope = scope_with(&[("age", Value::Integer(30))]);
        let expr = Expr::name("age").add(Expr::lit(1));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Integer(31)));
    }

    #[test]
    fn test_unknown_name_is_caught() {
        let scope = EvalScope::new();
        let expr = Expr::name("missing");
        assert_eq!(
            eval_expr(&expr, &scope),
            Err(EvalError::UnknownName("missing".into()))
        );
    }

    #[test]
    fn test_self_value() {
        let mut scope = EvalScope::new();
        scope.set_current(Value::Integer(-1));
        let expr = Expr::self_value().gt(Expr::lit(0));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_mixed_arithmetic_widens() {
        let scope = EvalScope::new();
        let expr = Expr::lit(1).add(Expr::lit(0.5));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Float(1.5)));
    }

    #[test]
    fn test_division_by_zero_is_caught() {
        let scope = EvalScope::new();
        let expr = Expr::lit(1).div(Expr::lit(0));
        assert_eq!(eval_expr(&expr, &scope), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_loose_numeric_equality() {
        let scope = EvalScope::new();
        let expr = Expr::lit(1).eq(Expr::lit(1.0));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_membership() {
        let scope = EvalScope::new();
        let list = Expr::lit(Value::List(vec![Value::Integer(1), Value::Integer(2)]));
        assert_eq!(
            eval_expr(&Expr::lit(2).in_list(list.clone()), &scope),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_expr(&Expr::lit(3).not_in_list(list), &scope),
            Ok(Value::Boolean(true))
        );
    }

    #[test]
    fn test_and_short_circuits() {
        // Right side would fail with UnknownName; the left falsy side wins
        let scope = EvalScope::new();
        let expr = Expr::lit(false).and(Expr::name("missing"));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Boolean(false)));
    }

    #[test]
    fn test_string_comparison() {
        let scope = EvalScope::new();
        let expr = Expr::lit("apple").lt(Expr::lit("banana"));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Boolean(true)));
    }

    #[test]
    fn test_type_mismatch_is_caught() {
        let scope = EvalScope::new();
        let expr = Expr::lit("x").add(Expr::lit(1));
        assert!(matches!(
            eval_expr(&expr, &scope),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_closure_body() {
        let body = RuleBody::function("double", Arity::Unary, |scope| {
            let current = scope
                .current()
                .and_then(Value::as_integer)
                .ok_or_else(|| EvalError::Failed("expected an integer".into()))?;
            Ok(Value::Integer(current * 2))
        });

        let mut scope = EvalScope::new();
        scope.set_current(Value::Integer(21));
        assert_eq!(body.evaluate(&scope), Ok(Value::Integer(42)));
    }

    #[test]
    fn test_arity_consistency() {
        let nullary_expr = RuleBody::expr_with_arity(Arity::Nullary, Expr::self_value());
        assert!(!nullary_expr.arity_consistent());

        let unary_over_nullary =
            RuleBody::expr_with_arity(Arity::Unary, Expr::name("rating"));
        assert!(unary_over_nullary.arity_consistent());

        let inferred = RuleBody::expr(Expr::self_value().gt(Expr::lit(0)));
        assert_eq!(inferred.arity(), Arity::Unary);
        assert!(inferred.arity_consistent());
    }

    #[test]
    fn test_scope_from_bindings() {
        let bindings = Bindings::new().with("max_age", Value::Integer(100));
        let scope = EvalScope::with_bindings(&bindings);
        let expr = Expr::lit(30).lt(Expr::name("max_age"));
        assert_eq!(eval_expr(&expr, &scope), Ok(Value::Boolean(true)));
    }
}
