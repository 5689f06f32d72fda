//! # Symbolic Engine Module
//!
//! Core expression type of the crate. Every integration scheme is written as arithmetic on
//! `Expr` values and the resulting graphs are later compiled into callables
//! (see `symbolic_function`).
//!
//! ## Main Structures and Methods
//!
//! ### `Expr` Enum
//! - **Variables**: `Var(String)` - symbolic variables like "x0", "u_1_0"
//! - **Constants**: `Const(f64)` - numerical constants
//! - **Operations**: `Add`, `Sub`, `Mul`, `Div`, `Pow` - basic arithmetic
//! - **Functions**: `Exp`, `Ln`, `sin`, `cos`, `tg`, `arctg`, `sqrt`
//!
//! ### Key Methods
//! - `Symbols(symbols: &str)` - Create multiple variables from comma-separated string
//! - `IndexedVar(index, name)` / `IndexedVar2D(row, col, name)` - indexed variables
//! - `diff(var)` - analytical differentiation (`symbolic_engine_derivatives`)
//! - `substitute_variable(var, value)` - substitution of a variable by an expression
//!
//! ## Interesting Code Features
//!
//! 1. **Shared sub-expressions**: children are `Arc<Expr>`, so an expression built by
//!    many Runge-Kutta sub-steps is a directed acyclic graph. Reusing a value clones a
//!    pointer, not a subtree, and graph size stays linear in the number of operations.
//!
//! 2. **Operator Overloading**: `std::ops` traits are implemented for owned values,
//!    references and `f64` operands: `&x + 2.0 * &y`.
//!
//! 3. **Local folding**: operators fold constants and trivial identities
//!    (`x + 0`, `x * 1`, `x * 0`) when the node is created (`symbolic_simplify`).
//!
//! 4. **Iterative traversal**: `topological_order`, equality, formatting and dropping
//!    visit a graph without recursion, so very deep graphs cannot overflow the stack.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Symbolic expression node.
///
/// Children are shared through `Arc`, which makes `Expr` cheap to clone and `Send + Sync`.
/// Structural equality (`PartialEq`) compares graphs node by node, skipping shared nodes;
/// identity of nodes inside a graph is by address.
#[derive(Clone)]
pub enum Expr {
    /// Symbolic variable with a name (e.g., "x", "u_0_1")
    Var(String),
    /// Numerical constant value
    Const(f64),
    Add(Arc<Expr>, Arc<Expr>),
    Sub(Arc<Expr>, Arc<Expr>),
    Mul(Arc<Expr>, Arc<Expr>),
    Div(Arc<Expr>, Arc<Expr>),
    /// Power operation: base ^ exponent
    Pow(Arc<Expr>, Arc<Expr>),
    Exp(Arc<Expr>),
    /// Natural logarithm
    Ln(Arc<Expr>),
    sin(Arc<Expr>),
    cos(Arc<Expr>),
    /// Tangent, mathematical notation 'tg'
    tg(Arc<Expr>),
    /// Arctangent, mathematical notation 'arctg'
    arctg(Arc<Expr>),
    sqrt(Arc<Expr>),
}

enum Piece<'a> {
    Node(&'a Expr),
    Text(&'static str),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut stack = vec![Piece::Node(self)];
        while let Some(piece) = stack.pop() {
            let node = match piece {
                Piece::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Node(node) => node,
            };
            // pieces are pushed in reverse order
            let (open, sep) = match node {
                Expr::Var(name) => {
                    write!(f, "{}", name)?;
                    continue;
                }
                Expr::Const(val) => {
                    write!(f, "{}", val)?;
                    continue;
                }
                Expr::Add(..) => ("(", " + "),
                Expr::Sub(..) => ("(", " - "),
                Expr::Mul(..) => ("(", " * "),
                Expr::Div(..) => ("(", " / "),
                Expr::Pow(..) => ("(", " ^ "),
                Expr::Exp(_) => ("exp(", ""),
                Expr::Ln(_) => ("ln(", ""),
                Expr::sin(_) => ("sin(", ""),
                Expr::cos(_) => ("cos(", ""),
                Expr::tg(_) => ("tg(", ""),
                Expr::arctg(_) => ("arctg(", ""),
                Expr::sqrt(_) => ("sqrt(", ""),
            };
            stack.push(Piece::Text(")"));
            match node.operands() {
                [Some(lhs), Some(rhs)] => {
                    stack.push(Piece::Node(rhs));
                    stack.push(Piece::Text(sep));
                    stack.push(Piece::Node(lhs));
                }
                [Some(arg), None] => stack.push(Piece::Node(arg)),
                _ => {}
            }
            stack.push(Piece::Text(open));
        }
        Ok(())
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        let mut compared: HashSet<(usize, usize)> = HashSet::new();
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if std::ptr::eq(a, b) || !compared.insert((node_key(a), node_key(b))) {
                continue;
            }
            let same_head = match (a, b) {
                (Expr::Var(x), Expr::Var(y)) => x == y,
                (Expr::Const(x), Expr::Const(y)) => x == y,
                _ => std::mem::discriminant(a) == std::mem::discriminant(b),
            };
            if !same_head {
                return false;
            }
            let [a0, a1] = a.operands();
            let [b0, b1] = b.operands();
            for pair in [(a0, b0), (a1, b1)] {
                if let (Some(ca), Some(cb)) = pair {
                    stack.push((ca, cb));
                }
            }
        }
        true
    }
}

/// Leaf swapped into the child slots of a node being dropped.
static DETACHED: LazyLock<Arc<Expr>> = LazyLock::new(|| Arc::new(Expr::Const(0.0)));

impl Expr {
    /// Moves the children out of `self` onto `out`, leaving `DETACHED` in their place.
    fn detach_operands(&mut self, out: &mut Vec<Arc<Expr>>) {
        let leaf: &Arc<Expr> = &DETACHED;
        let mut take = |slot: &mut Arc<Expr>| {
            if !Arc::ptr_eq(slot, leaf) {
                out.push(std::mem::replace(slot, Arc::clone(leaf)));
            }
        };
        match self {
            Expr::Var(_) | Expr::Const(_) => {}
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                take(lhs);
                take(rhs);
            }
            Expr::Exp(arg)
            | Expr::Ln(arg)
            | Expr::sin(arg)
            | Expr::cos(arg)
            | Expr::tg(arg)
            | Expr::arctg(arg)
            | Expr::sqrt(arg) => take(arg),
        }
    }
}

impl Drop for Expr {
    /// Releases the graph with an explicit stack: a node whose last owner goes away hands
    /// its children to the stack before it is freed.
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_operands(&mut pending);
        while let Some(child) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(child) {
                node.detach_operands(&mut pending);
            }
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $fold:ident) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$fold(self, rhs)
            }
        }
        impl std::ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$fold(self, rhs.clone())
            }
        }
        impl std::ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$fold(self.clone(), rhs)
            }
        }
        impl std::ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$fold(self.clone(), rhs.clone())
            }
        }
        impl std::ops::$trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$fold(self, Expr::Const(rhs))
            }
        }
        impl std::ops::$trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$fold(self.clone(), Expr::Const(rhs))
            }
        }
        impl std::ops::$trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$fold(Expr::Const(self), rhs)
            }
        }
        impl std::ops::$trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$fold(Expr::Const(self), rhs.clone())
            }
        }
    };
}

impl_binary_op!(Add, add, fold_add);
impl_binary_op!(Sub, sub, fold_sub);
impl_binary_op!(Mul, mul, fold_mul);
impl_binary_op!(Div, div, fold_div);

impl std::ops::AddAssign for Expr {
    fn add_assign(&mut self, rhs: Self) {
        *self = Expr::fold_add(self.clone(), rhs);
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Expr::fold_mul(Expr::Const(-1.0), self)
    }
}

impl std::ops::Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output {
        Expr::fold_mul(Expr::Const(-1.0), self.clone())
    }
}

impl Expr {
    /// BASIC FEATURES

    /// Creates multiple symbolic variables from a comma-separated string.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let vars = Expr::Symbols("x, y, z");
    /// assert_eq!(vars.len(), 3);
    /// ```
    pub fn Symbols(symbols: &str) -> Vec<Expr> {
        symbols
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| Expr::Var(s.to_string()))
            .collect()
    }

    /// Indexed variable in the format `name{index}` (x0, x1, ...).
    pub fn IndexedVar(index: usize, var_name: &str) -> Expr {
        Expr::Var(format!("{}{}", var_name, index))
    }

    /// 2D indexed variable in the format `name_row_col` (e.g., "A_2_3").
    pub fn IndexedVar2D(index_row: usize, index_col: usize, var_name: &str) -> Expr {
        Expr::Var(format!("{}_{}_{}", var_name, index_row, index_col))
    }

    pub fn shared(self) -> Arc<Expr> {
        Arc::new(self)
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(val) => Some(*val),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_const() == Some(0.0)
    }

    pub fn is_one(&self) -> bool {
        self.as_const() == Some(1.0)
    }

    /// Name of the variable if the node is a pure symbol.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn pow(self, rhs: Expr) -> Expr {
        Expr::fold_pow(self, rhs)
    }

    pub fn powf(self, exponent: f64) -> Expr {
        Expr::fold_pow(self, Expr::Const(exponent))
    }

    pub fn exp(self) -> Expr {
        Expr::fold_unary(self, Expr::Exp, f64::exp)
    }

    pub fn ln(self) -> Expr {
        Expr::fold_unary(self, Expr::Ln, f64::ln)
    }

    pub fn sin(self) -> Expr {
        Expr::fold_unary(self, Expr::sin, f64::sin)
    }

    pub fn cos(self) -> Expr {
        Expr::fold_unary(self, Expr::cos, f64::cos)
    }

    pub fn tg(self) -> Expr {
        Expr::fold_unary(self, Expr::tg, f64::tan)
    }

    pub fn arctg(self) -> Expr {
        Expr::fold_unary(self, Expr::arctg, f64::atan)
    }

    pub fn sqrt(self) -> Expr {
        Expr::fold_unary(self, Expr::sqrt, f64::sqrt)
    }

    /// Operands of the node, at most two.
    pub(crate) fn operands(&self) -> [Option<&Expr>; 2] {
        match self {
            Expr::Var(_) | Expr::Const(_) => [None, None],
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => [Some(lhs.as_ref()), Some(rhs.as_ref())],
            Expr::Exp(arg)
            | Expr::Ln(arg)
            | Expr::sin(arg)
            | Expr::cos(arg)
            | Expr::tg(arg)
            | Expr::arctg(arg)
            | Expr::sqrt(arg) => [Some(arg.as_ref()), None],
        }
    }

    /// Returns the sorted list of variable names the expression depends on.
    pub fn all_arguments_are_variables(&self) -> Vec<String> {
        free_variables([self])
    }

    /// Substitutes a variable with an expression throughout the graph.
    pub fn substitute_variable(&self, var: &str, value: &Expr) -> Expr {
        let mut map = std::collections::HashMap::new();
        map.insert(var.to_string(), value.clone());
        substitute_all(&[self], &map).remove(0)
    }

    /// Number of distinct nodes reachable from the expression.
    pub fn node_count(&self) -> usize {
        topological_order([self]).len()
    }
}

#[inline]
pub(crate) fn node_key(expr: &Expr) -> usize {
    expr as *const Expr as usize
}

/// Post-order (children first) listing of every distinct node reachable from `roots`.
///
/// Nodes are identified by address, so a sub-expression shared through `Arc` is listed once.
pub(crate) fn topological_order<'a, I>(roots: I) -> Vec<&'a Expr>
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut order: Vec<&'a Expr> = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(&'a Expr, bool)> = Vec::new();
    for root in roots {
        stack.push((root, false));
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node_key(node)) {
                continue;
            }
            stack.push((node, true));
            for child in node.operands().into_iter().flatten() {
                if !visited.contains(&node_key(child)) {
                    stack.push((child, false));
                }
            }
        }
    }
    order
}

/// Sorted, deduplicated variable names of a set of expressions.
pub(crate) fn free_variables<'a, I>(roots: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut names: Vec<String> = topological_order(roots)
        .into_iter()
        .filter_map(|node| node.var_name().map(|name| name.to_string()))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Rebuilds `roots` with every variable found in `map` replaced by its image.
pub(crate) fn substitute_all(
    roots: &[&Expr],
    map: &std::collections::HashMap<String, Expr>,
) -> Vec<Expr> {
    let order = topological_order(roots.iter().copied());
    let mut images: std::collections::HashMap<usize, Expr> =
        std::collections::HashMap::with_capacity(order.len());
    for node in order {
        let image = {
            let get = |child: &Arc<Expr>| images[&node_key(child.as_ref())].clone();
            match node {
                Expr::Var(name) => map.get(name).cloned().unwrap_or_else(|| node.clone()),
                Expr::Const(_) => node.clone(),
                Expr::Add(lhs, rhs) => Expr::fold_add(get(lhs), get(rhs)),
                Expr::Sub(lhs, rhs) => Expr::fold_sub(get(lhs), get(rhs)),
                Expr::Mul(lhs, rhs) => Expr::fold_mul(get(lhs), get(rhs)),
                Expr::Div(lhs, rhs) => Expr::fold_div(get(lhs), get(rhs)),
                Expr::Pow(lhs, rhs) => Expr::fold_pow(get(lhs), get(rhs)),
                Expr::Exp(arg) => get(arg).exp(),
                Expr::Ln(arg) => get(arg).ln(),
                Expr::sin(arg) => get(arg).sin(),
                Expr::cos(arg) => get(arg).cos(),
                Expr::tg(arg) => get(arg).tg(),
                Expr::arctg(arg) => get(arg).arctg(),
                Expr::sqrt(arg) => get(arg).sqrt(),
            }
        };
        images.insert(node_key(node), image);
    }
    roots
        .iter()
        .map(|root| images[&node_key(root)].clone())
        .collect()
}
