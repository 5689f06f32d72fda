//! # Construction-time simplification
//!
//! Graphs produced by the integrators are large and shared, so rewriting them globally
//! after the fact is not an option. Instead every node is folded when it is created:
//!
//! 1. **Constant Folding**: arithmetic on two constants is evaluated
//! 2. **Algebraic Identities**: `x + 0 = x`, `x * 1 = x`, `x * 0 = 0`, `x / 1 = x`,
//!    `0 / x = 0`, `x ^ 1 = x`, `x ^ 0 = 1`
//!
//! Each rule looks at the two operands only, so folding costs O(1) per node.

use crate::symbolic::symbolic_engine::Expr;
use std::sync::Arc;

impl Expr {
    pub fn fold_add(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a + b),
            (Some(a), _) if a == 0.0 => rhs,
            (_, Some(b)) if b == 0.0 => lhs,
            _ => Expr::Add(Arc::new(lhs), Arc::new(rhs)),
        }
    }

    pub fn fold_sub(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a - b),
            (_, Some(b)) if b == 0.0 => lhs,
            (Some(a), _) if a == 0.0 => Expr::fold_mul(Expr::Const(-1.0), rhs),
            _ => Expr::Sub(Arc::new(lhs), Arc::new(rhs)),
        }
    }

    pub fn fold_mul(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a * b),
            (Some(a), _) if a == 0.0 => Expr::Const(0.0),
            (_, Some(b)) if b == 0.0 => Expr::Const(0.0),
            (Some(a), _) if a == 1.0 => rhs,
            (_, Some(b)) if b == 1.0 => lhs,
            _ => Expr::Mul(Arc::new(lhs), Arc::new(rhs)),
        }
    }

    pub fn fold_div(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_const(), rhs.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a / b),
            (_, Some(b)) if b == 1.0 => lhs,
            // a symbolic denominator is left alone, even if it may vanish
            (Some(a), None) if a == 0.0 => Expr::Const(0.0),
            _ => Expr::Div(Arc::new(lhs), Arc::new(rhs)),
        }
    }

    pub fn fold_pow(base: Expr, exponent: Expr) -> Expr {
        match (base.as_const(), exponent.as_const()) {
            (Some(a), Some(b)) => Expr::Const(a.powf(b)),
            (_, Some(b)) if b == 1.0 => base,
            (_, Some(b)) if b == 0.0 => Expr::Const(1.0),
            _ => Expr::Pow(Arc::new(base), Arc::new(exponent)),
        }
    }

    pub(crate) fn fold_unary(arg: Expr, ctor: fn(Arc<Expr>) -> Expr, eval: fn(f64) -> f64) -> Expr {
        match arg.as_const() {
            Some(value) => Expr::Const(eval(value)),
            None => ctor(Arc::new(arg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_folding() {
        let e = Expr::Const(2.0) * Expr::Const(3.0) + Expr::Const(1.0);
        assert_eq!(e, Expr::Const(7.0));
        assert_eq!(Expr::Const(4.0).sqrt(), Expr::Const(2.0));
    }

    #[test]
    fn test_identities() {
        let x = Expr::Var("x".to_string());
        assert_eq!(x.clone() + 0.0, x);
        assert_eq!(0.0 + x.clone(), x);
        assert_eq!(x.clone() * 1.0, x);
        assert_eq!(x.clone() * 0.0, Expr::Const(0.0));
        assert_eq!(x.clone() / 1.0, x);
        assert_eq!(0.0 / x.clone(), Expr::Const(0.0));
        assert_eq!(x.clone().powf(1.0), x);
        assert_eq!(x.clone().powf(0.0), Expr::Const(1.0));
    }

    #[test]
    fn test_zero_minus_is_negation() {
        let x = Expr::Var("x".to_string());
        let e = 0.0 - x.clone();
        assert_eq!(e, Expr::Mul(Arc::new(Expr::Const(-1.0)), Arc::new(x)));
    }

    #[test]
    fn test_symbolic_denominator_kept() {
        let x = Expr::Var("x".to_string());
        let e = x.clone() / x.clone();
        assert!(matches!(e, Expr::Div(_, _)));
    }
}
