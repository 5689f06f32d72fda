//! # Symbolic Engine Derivatives Module
//!
//! Analytical differentiation over expression graphs.
//!
//! Derivatives are computed in forward mode, one node at a time in topological order, so
//! every shared sub-expression is differentiated once. The cost of `diff` is linear in the
//! number of distinct nodes, which keeps Jacobians of deep integrator graphs affordable.
//!
//! ## Key Methods
//! - `diff(var)` - partial derivative of a single expression
//! - `diff_roots(roots, var)` - partial derivatives of many expressions sharing nodes
//! - `ExprVector::jacobian(vars)` - Jacobian matrix (rows: functions, columns: variables)

use crate::symbolic::symbolic_engine::{Expr, node_key, topological_order};
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use std::collections::HashMap;
use std::sync::Arc;

impl Expr {
    /// DIFFERENTIATION

    /// Computes the analytical derivative of the expression with respect to a variable.
    ///
    /// - Power rule: d/dx(x^n) = n*x^(n-1)
    /// - Product rule: d/dx(f*g) = f'*g + f*g'
    /// - Quotient rule: d/dx(f/g) = (f'*g - f*g')/g^2
    /// - Chain rule: d/dx(f(g(x))) = f'(g(x))*g'(x)
    ///
    /// # Examples
    /// ```rust, ignore
    /// let x = Expr::Var("x".to_string());
    /// let f = x.clone().powf(2.0); // x^2
    /// let df_dx = f.diff("x"); // 2*x
    /// ```
    pub fn diff(&self, var: &str) -> Expr {
        let order = topological_order([self]);
        diff_ordered(&order, &[self], var).remove(0)
    }

    /// Derivatives of several expressions w.r.t. one variable, sharing the work on common nodes.
    pub fn diff_roots(roots: &[&Expr], var: &str) -> Vec<Expr> {
        let order = topological_order(roots.iter().copied());
        diff_ordered(&order, roots, var)
    }
}

fn diff_ordered(order: &[&Expr], roots: &[&Expr], var: &str) -> Vec<Expr> {
    let mut derivatives: HashMap<usize, Expr> = HashMap::with_capacity(order.len());
    for &node in order {
        let derivative = {
            let d = |child: &Arc<Expr>| derivatives[&node_key(child.as_ref())].clone();
            let own = |child: &Arc<Expr>| child.as_ref().clone();
            match node {
                Expr::Var(name) => {
                    if name == var {
                        Expr::Const(1.0)
                    } else {
                        Expr::Const(0.0)
                    }
                }
                Expr::Const(_) => Expr::Const(0.0),
                Expr::Add(lhs, rhs) => d(lhs) + d(rhs),
                Expr::Sub(lhs, rhs) => d(lhs) - d(rhs),
                Expr::Mul(lhs, rhs) => d(lhs) * own(rhs) + own(lhs) * d(rhs),
                Expr::Div(lhs, rhs) => {
                    let (dl, dr) = (d(lhs), d(rhs));
                    if dr.is_zero() {
                        dl / own(rhs)
                    } else {
                        (dl * own(rhs) - own(lhs) * dr) / (own(rhs) * own(rhs))
                    }
                }
                Expr::Pow(base, exponent) => {
                    let (db, de) = (d(base), d(exponent));
                    match exponent.as_const() {
                        Some(n) => Expr::Const(n) * own(base).powf(n - 1.0) * db,
                        None => {
                            node.clone() * (de * own(base).ln() + own(exponent) * db / own(base))
                        }
                    }
                }
                Expr::Exp(arg) => node.clone() * d(arg),
                Expr::Ln(arg) => d(arg) / own(arg),
                Expr::sin(arg) => own(arg).cos() * d(arg),
                Expr::cos(arg) => -(own(arg).sin()) * d(arg),
                Expr::tg(arg) => d(arg) / own(arg).cos().powf(2.0),
                Expr::arctg(arg) => d(arg) / (1.0 + own(arg).powf(2.0)),
                Expr::sqrt(arg) => d(arg) / (2.0 * node.clone()),
            }
        };
        derivatives.insert(node_key(node), derivative);
    }
    roots
        .iter()
        .map(|root| derivatives[&node_key(root)].clone())
        .collect()
}

impl ExprVector {
    /// Jacobian of the vector w.r.t. `vars`: entry (i, j) is d self[i] / d vars[j].
    pub fn jacobian(&self, vars: &[String]) -> ExprMatrix {
        let roots: Vec<&Expr> = self.iter().collect();
        let order = topological_order(roots.iter().copied());
        let columns: Vec<ExprVector> = vars
            .iter()
            .map(|var| ExprVector::new(diff_ordered(&order, &roots, var)))
            .collect();
        ExprMatrix::from_columns_with_rows(self.len(), columns)
    }
}
