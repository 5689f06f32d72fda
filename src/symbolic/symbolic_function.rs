//! # Symbolic functions
//!
//! `SymFunction` is a named callable with several matrix inputs and several matrix outputs,
//! compiled once from expression matrices. It is the packaging step of every integrator:
//! the scheme derives its outputs as expressions over symbolic inputs and the function
//! freezes them into something that can be called with numbers.
//!
//! # Examples
//! ```rust, ignore
//! let x = ExprMatrix::indexed_vars_matrix(2, 1, "x");
//! let y = ExprMatrix::from_vector(&ExprVector::new(vec![&x[(0, 0)] * &x[(1, 0)]]));
//! let f = SymFunction::new("f", vec![("x", x)], vec![("y", y)], ExprBackend::Tape)?;
//! let out = f.call(&[DMatrix::from_vec(2, 1, vec![2.0, 3.0])])?;
//! assert_eq!(out[0][(0, 0)], 6.0);
//! ```

use crate::symbolic::symbolic_engine::{Expr, free_variables};
use crate::symbolic::symbolic_error::SymbolicError;
use crate::symbolic::symbolic_lambdify::{ExprBackend, Lambdified};
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use nalgebra::DMatrix;
use std::collections::HashSet;

#[derive(Clone, Debug)]
struct Port {
    name: String,
    shape: (usize, usize),
}

impl Port {
    fn new(name: &str, matrix: &ExprMatrix) -> Self {
        Self {
            name: name.to_string(),
            shape: matrix.shape(),
        }
    }
}

/// Compiled multi-input / multi-output function. Immutable after construction,
/// so a single instance can be shared between threads.
#[derive(Clone, Debug)]
pub struct SymFunction {
    name: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    /// symbolic inputs and outputs, kept for differentiation
    input_exprs: Vec<ExprMatrix>,
    output_exprs: Vec<ExprMatrix>,
    backend: ExprBackend,
    kernel: Lambdified,
}

impl SymFunction {
    pub fn new<S: Into<String>>(
        name: S,
        inputs: Vec<(&str, ExprMatrix)>,
        outputs: Vec<(&str, ExprMatrix)>,
        backend: ExprBackend,
    ) -> Result<Self, SymbolicError> {
        let name = name.into();
        let mut symbols: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (input_name, matrix) in &inputs {
            for entry in matrix.iter() {
                let symbol = entry.var_name().ok_or_else(|| SymbolicError::NotASymbol {
                    function: name.clone(),
                    input: input_name.to_string(),
                    entry: entry.to_string(),
                })?;
                if !seen.insert(symbol.to_string()) {
                    return Err(SymbolicError::DuplicateSymbol {
                        function: name.clone(),
                        variable: symbol.to_string(),
                    });
                }
                symbols.push(symbol.to_string());
            }
        }
        let roots: Vec<&Expr> = outputs.iter().flat_map(|(_, m)| m.iter()).collect();
        if let Some(variable) = free_variables(roots.iter().copied())
            .into_iter()
            .find(|v| !seen.contains(v))
        {
            return Err(SymbolicError::FreeVariable {
                function: name.clone(),
                variable,
            });
        }
        let kernel = Lambdified::compile(&roots, &symbols, backend).map_err(|variable| {
            SymbolicError::FreeVariable {
                function: name.clone(),
                variable,
            }
        })?;
        Ok(Self {
            inputs: inputs.iter().map(|(n, m)| Port::new(n, m)).collect(),
            outputs: outputs.iter().map(|(n, m)| Port::new(n, m)).collect(),
            input_exprs: inputs.into_iter().map(|(_, m)| m).collect(),
            output_exprs: outputs.into_iter().map(|(_, m)| m).collect(),
            name,
            backend,
            kernel,
        })
    }

    /// Evaluates the function. Arguments are checked for count and shape.
    pub fn call(&self, args: &[DMatrix<f64>]) -> Result<Vec<DMatrix<f64>>, SymbolicError> {
        if args.len() != self.inputs.len() {
            return Err(SymbolicError::ArgumentCount {
                function: self.name.clone(),
                expected: self.inputs.len(),
                found: args.len(),
            });
        }
        let mut flat = Vec::with_capacity(self.inputs.iter().map(|p| p.shape.0 * p.shape.1).sum());
        for (port, arg) in self.inputs.iter().zip(args) {
            if arg.shape() != port.shape {
                return Err(SymbolicError::ShapeMismatch {
                    function: self.name.clone(),
                    argument: port.name.clone(),
                    expected: port.shape,
                    found: arg.shape(),
                });
            }
            // nalgebra storage is column-major, like the symbol layout
            flat.extend_from_slice(arg.as_slice());
        }
        let values = self.kernel.eval(&flat);
        let mut offset = 0;
        let result = self
            .outputs
            .iter()
            .map(|port| {
                let (r, c) = port.shape;
                let m = DMatrix::from_column_slice(r, c, &values[offset..offset + r * c]);
                offset += r * c;
                m
            })
            .collect();
        Ok(result)
    }

    /// Derivative of the vectorized output `output` w.r.t. the vectorized input `input`,
    /// as a function with the same inputs and a single output named `jac_{output}_{input}`.
    pub fn jacobian(&self, output: &str, input: &str) -> Result<SymFunction, SymbolicError> {
        let out_index = self.output_index(output)?;
        let in_index = self.input_index(input)?;
        let vars: Vec<String> = self.input_exprs[in_index]
            .iter()
            .filter_map(|e| e.var_name().map(|s| s.to_string()))
            .collect();
        let jac = self.output_exprs[out_index].flatten().jacobian(&vars);
        let jac_name = format!("jac_{}_{}", output, input);
        let inputs: Vec<(&str, ExprMatrix)> = self
            .inputs
            .iter()
            .zip(&self.input_exprs)
            .map(|(p, m)| (p.name.as_str(), m.clone()))
            .collect();
        SymFunction::new(
            format!("{}_{}", self.name, jac_name),
            inputs,
            vec![(jac_name.as_str(), jac)],
            self.backend,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn input_shape(&self, i: usize) -> (usize, usize) {
        self.inputs[i].shape
    }

    pub fn output_shape(&self, i: usize) -> (usize, usize) {
        self.outputs[i].shape
    }

    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn backend(&self) -> ExprBackend {
        self.backend
    }

    /// Size of the compiled kernel (instructions or graph nodes).
    pub fn kernel_size(&self) -> usize {
        self.kernel.size()
    }

    /// Symbolic form of an output, as passed to `new`.
    pub fn output_expr(&self, i: usize) -> &ExprMatrix {
        &self.output_exprs[i]
    }

    /// Symbolic form of an input, as passed to `new`.
    pub fn input_expr(&self, i: usize) -> &ExprMatrix {
        &self.input_exprs[i]
    }

    pub fn input_index(&self, input: &str) -> Result<usize, SymbolicError> {
        self.inputs
            .iter()
            .position(|p| p.name == input)
            .ok_or_else(|| SymbolicError::UnknownName {
                function: self.name.clone(),
                kind: "input",
                name: input.to_string(),
            })
    }

    pub fn output_index(&self, output: &str) -> Result<usize, SymbolicError> {
        self.outputs
            .iter()
            .position(|p| p.name == output)
            .ok_or_else(|| SymbolicError::UnknownName {
                function: self.name.clone(),
                kind: "output",
                name: output.to_string(),
            })
    }
}

/// Column matrix of a symbolic vector, the usual shape of a function port.
pub fn column(v: &ExprVector) -> ExprMatrix {
    ExprMatrix::from_vector(v)
}
