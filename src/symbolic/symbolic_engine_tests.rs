use crate::symbolic::symbolic_engine::{Expr, free_variables, substitute_all, topological_order};
use std::collections::HashMap;
use std::sync::Arc;
//___________________________________TESTS____________________________________

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn test_add_assign() {
        let mut expr = var("x");
        expr += Expr::Const(2.0);
        let expected = Expr::Add(Arc::new(var("x")), Arc::new(Expr::Const(2.0)));
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_symbols_and_indexed_vars() {
        let vars = Expr::Symbols("x, y,z,");
        assert_eq!(vars, vec![var("x"), var("y"), var("z")]);
        assert_eq!(Expr::IndexedVar(3, "x"), var("x3"));
        assert_eq!(Expr::IndexedVar2D(1, 2, "u"), var("u_1_2"));
    }

    #[test]
    fn test_folding_on_construction() {
        let x = var("x");
        assert_eq!(x.clone() + Expr::Const(0.0), x);
        assert_eq!(x.clone() * 1.0, x);
        assert!((x.clone() * 0.0).is_zero());
        assert_eq!(Expr::Const(2.0) * Expr::Const(3.0), Expr::Const(6.0));
        assert_eq!(Expr::Const(4.0).sqrt(), Expr::Const(2.0));
    }

    #[test]
    fn test_display() {
        let e = (var("x") + var("y")) * var("z").sin();
        assert_eq!(e.to_string(), "((x + y) * sin(z))");
    }

    #[test]
    fn test_shared_nodes_are_listed_once() {
        let x = var("x");
        let s = (x.clone() + 1.0).exp();
        // s is reused three times; the graph keeps one copy of its children
        let e = &(&s * &s) + &s;
        assert!(e.node_count() < 10);
        let order = topological_order([&e]);
        assert!(std::ptr::eq(*order.last().unwrap(), &e));
    }

    #[test]
    fn test_deep_graph_iterative() {
        let mut e = var("x");
        for _ in 0..2_000 {
            e = e + 1.0;
        }
        assert_eq!(e.node_count(), 4_001);
        assert_eq!(e.all_arguments_are_variables(), vec!["x".to_string()]);
    }

    #[test]
    fn test_free_variables_sorted() {
        let e = var("b") * var("a") + var("b").ln();
        assert_eq!(free_variables([&e]), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_substitution() {
        let e = var("x") * var("y") + var("x");
        let replaced = e.substitute_variable("x", &Expr::Const(2.0));
        let v = replaced.eval_expression(&["y"], &[5.0]).unwrap();
        assert_relative_eq!(v, 12.0);

        // simultaneous: x -> y and y -> x swap
        let mut map = HashMap::new();
        map.insert("x".to_string(), var("y"));
        map.insert("y".to_string(), var("x"));
        let e = var("x") - var("y");
        let swapped = substitute_all(&[&e], &map).remove(0);
        assert_eq!(swapped, var("y") - var("x"));
    }

    fn sine_chain(depth: usize) -> Expr {
        let mut e = var("x");
        for _ in 0..depth {
            e = e.sin();
        }
        e
    }

    #[test]
    fn test_deep_graph_equality_display_and_drop() {
        let depth = 200_000;
        let (a, b) = (sine_chain(depth), sine_chain(depth));
        assert!(a == b);
        assert!(a != sine_chain(depth - 1));
        let text = sine_chain(50_000).to_string();
        assert_eq!(text.len(), 5 * 50_000 + 1);
        assert!(text.starts_with("sin(sin(") && text.ends_with("x))"));
        drop(a);
        drop(b);
    }

    #[test]
    fn test_drop_keeps_shared_children() {
        let shared = sine_chain(10) + var("y");
        let kept = Arc::new(shared.clone());
        let e = &shared * &shared;
        drop(shared);
        drop(e);
        assert_eq!(kept.all_arguments_are_variables(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(kept.node_count(), 13);
    }
}

