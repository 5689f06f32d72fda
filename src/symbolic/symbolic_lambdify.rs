//! # Lambdification
//!
//! Converts expression graphs into numerical evaluators. Two backends are available:
//!
//! - `ExprBackend::Tape` compiles the graph once into a flat instruction list. Every
//!   distinct node becomes one slot, so common sub-expressions are computed once per call.
//! - `ExprBackend::Graph` keeps the graph and walks it on every call. Nothing is compiled
//!   up front, which suits functions that are built often and called rarely.
//!
//! Both backends apply `apply_op` to the same operands for every node, so they return
//! bit-identical results. The choice only affects speed.

use crate::symbolic::symbolic_engine::{Expr, node_key, topological_order};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExprBackend {
    #[default]
    Tape,
    Graph,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Exp,
    Ln,
    Sin,
    Cos,
    Tg,
    Arctg,
    Sqrt,
}

fn op_kind(node: &Expr) -> Option<OpKind> {
    let kind = match node {
        Expr::Var(_) | Expr::Const(_) => return None,
        Expr::Add(_, _) => OpKind::Add,
        Expr::Sub(_, _) => OpKind::Sub,
        Expr::Mul(_, _) => OpKind::Mul,
        Expr::Div(_, _) => OpKind::Div,
        Expr::Pow(_, _) => OpKind::Pow,
        Expr::Exp(_) => OpKind::Exp,
        Expr::Ln(_) => OpKind::Ln,
        Expr::sin(_) => OpKind::Sin,
        Expr::cos(_) => OpKind::Cos,
        Expr::tg(_) => OpKind::Tg,
        Expr::arctg(_) => OpKind::Arctg,
        Expr::sqrt(_) => OpKind::Sqrt,
    };
    Some(kind)
}

/// The single numerical kernel shared by both backends; `b` is ignored by unary ops.
#[inline(always)]
fn apply_op(kind: OpKind, a: f64, b: f64) -> f64 {
    match kind {
        OpKind::Add => a + b,
        OpKind::Sub => a - b,
        OpKind::Mul => a * b,
        OpKind::Div => a / b,
        OpKind::Pow => a.powf(b),
        OpKind::Exp => a.exp(),
        OpKind::Ln => a.ln(),
        OpKind::Sin => a.sin(),
        OpKind::Cos => a.cos(),
        OpKind::Tg => a.tan(),
        OpKind::Arctg => a.atan(),
        OpKind::Sqrt => a.sqrt(),
    }
}

#[derive(Clone, Debug)]
enum Instruction {
    Input(usize),
    Const(f64),
    Unary(OpKind, usize),
    Binary(OpKind, usize, usize),
}

/// Flat, topologically ordered instruction list.
#[derive(Clone, Debug)]
pub struct LambdaTape {
    instructions: Vec<Instruction>,
    outputs: Vec<usize>,
}

impl LambdaTape {
    /// Compiles `roots` over the ordered input symbols `vars`.
    /// Fails with the name of the first variable that is not an input.
    pub fn compile(roots: &[&Expr], vars: &[String]) -> Result<Self, String> {
        let var_index: HashMap<&str, usize> =
            vars.iter().enumerate().map(|(i, v)| (v.as_str(), i)).collect();
        let order = topological_order(roots.iter().copied());
        let mut instructions = Vec::with_capacity(order.len());
        let mut slot_of: HashMap<usize, usize> = HashMap::with_capacity(order.len());
        // nodes are merged by value: one slot per input symbol, per constant and per
        // operation on already merged operands
        let mut input_slot: HashMap<usize, usize> = HashMap::new();
        let mut const_slot: HashMap<u64, usize> = HashMap::new();
        let mut op_slot: HashMap<(OpKind, usize, usize), usize> = HashMap::new();
        for node in order {
            let slot = match node {
                Expr::Var(name) => {
                    let index = *var_index.get(name.as_str()).ok_or_else(|| name.clone())?;
                    *input_slot.entry(index).or_insert_with(|| {
                        instructions.push(Instruction::Input(index));
                        instructions.len() - 1
                    })
                }
                Expr::Const(value) => *const_slot.entry(value.to_bits()).or_insert_with(|| {
                    instructions.push(Instruction::Const(*value));
                    instructions.len() - 1
                }),
                _ => {
                    let [lhs, rhs] = node.operands();
                    let kind = op_kind(node).ok_or_else(|| node.to_string())?;
                    let a = lhs.map(|c| slot_of[&node_key(c)]).unwrap_or(0);
                    let b = rhs.map(|c| slot_of[&node_key(c)]);
                    *op_slot
                        .entry((kind, a, b.unwrap_or(usize::MAX)))
                        .or_insert_with(|| {
                            instructions.push(match b {
                                Some(b) => Instruction::Binary(kind, a, b),
                                None => Instruction::Unary(kind, a),
                            });
                            instructions.len() - 1
                        })
                }
            };
            slot_of.insert(node_key(node), slot);
        }
        let outputs = roots.iter().map(|r| slot_of[&node_key(r)]).collect();
        Ok(Self {
            instructions,
            outputs,
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn eval(&self, args: &[f64]) -> Vec<f64> {
        let mut slots = vec![0.0; self.instructions.len()];
        for (i, instruction) in self.instructions.iter().enumerate() {
            slots[i] = match *instruction {
                Instruction::Input(k) => args[k],
                Instruction::Const(value) => value,
                Instruction::Unary(kind, a) => apply_op(kind, slots[a], 0.0),
                Instruction::Binary(kind, a, b) => apply_op(kind, slots[a], slots[b]),
            };
        }
        self.outputs.iter().map(|&s| slots[s]).collect()
    }
}

/// Graph walker: keeps the expressions and evaluates them on every call.
#[derive(Clone, Debug)]
pub struct LambdaGraph {
    roots: Vec<Expr>,
    var_index: HashMap<String, usize>,
}

impl LambdaGraph {
    pub fn new(roots: &[&Expr], vars: &[String]) -> Result<Self, String> {
        let var_index: HashMap<String, usize> =
            vars.iter().enumerate().map(|(i, v)| (v.clone(), i)).collect();
        for node in topological_order(roots.iter().copied()) {
            if let Expr::Var(name) = node {
                if !var_index.contains_key(name) {
                    return Err(name.clone());
                }
            }
        }
        Ok(Self {
            roots: roots.iter().map(|&r| r.clone()).collect(),
            var_index,
        })
    }

    pub fn eval(&self, args: &[f64]) -> Vec<f64> {
        let order = topological_order(self.roots.iter());
        let mut values: HashMap<usize, f64> = HashMap::with_capacity(order.len());
        for node in order {
            let value = match node {
                // checked in `new`
                Expr::Var(name) => self.var_index.get(name).map(|&k| args[k]).unwrap_or(f64::NAN),
                Expr::Const(value) => *value,
                _ => {
                    let [lhs, rhs] = node.operands();
                    let a = lhs.map(|c| values[&node_key(c)]).unwrap_or(0.0);
                    let b = rhs.map(|c| values[&node_key(c)]).unwrap_or(0.0);
                    match op_kind(node) {
                        Some(kind) => apply_op(kind, a, b),
                        None => f64::NAN,
                    }
                }
            };
            values.insert(node_key(node), value);
        }
        self.roots.iter().map(|r| values[&node_key(r)]).collect()
    }
}

/// Compiled evaluator for one of the two backends.
#[derive(Clone, Debug)]
pub enum Lambdified {
    Tape(LambdaTape),
    Graph(LambdaGraph),
}

impl Lambdified {
    pub fn compile(roots: &[&Expr], vars: &[String], backend: ExprBackend) -> Result<Self, String> {
        match backend {
            ExprBackend::Tape => Ok(Lambdified::Tape(LambdaTape::compile(roots, vars)?)),
            ExprBackend::Graph => Ok(Lambdified::Graph(LambdaGraph::new(roots, vars)?)),
        }
    }

    pub fn eval(&self, args: &[f64]) -> Vec<f64> {
        match self {
            Lambdified::Tape(tape) => tape.eval(args),
            Lambdified::Graph(graph) => graph.eval(args),
        }
    }

    /// Number of tape instructions, or distinct graph nodes.
    pub fn size(&self) -> usize {
        match self {
            Lambdified::Tape(tape) => tape.len(),
            Lambdified::Graph(graph) => topological_order(graph.roots.iter()).len(),
        }
    }
}

/// One-off evaluation of expressions with the graph walker.
pub fn eval_graph(roots: &[&Expr], vars: &[&str], values: &[f64]) -> Result<Vec<f64>, String> {
    let vars: Vec<String> = vars.iter().map(|v| v.to_string()).collect();
    Ok(LambdaGraph::new(roots, &vars)?.eval(values))
}

impl Expr {
    /// Evaluates the expression for the given variable values.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let f = Expr::parse_expression("x^2 + y").unwrap();
    /// assert_eq!(f.eval_expression(&["x", "y"], &[3.0, 1.0]), Ok(10.0));
    /// ```
    pub fn eval_expression(&self, vars: &[&str], values: &[f64]) -> Result<f64, String> {
        Ok(eval_graph(&[self], vars, values)?[0])
    }
}
