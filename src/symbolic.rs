/// a module turns a String expression into a symbolic expression
///
///# Example
/// ```
/// use RustedTranscription::symbolic::symbolic_engine::Expr;
/// let parsed_expression = Expr::parse_expression("x^2*exp(-y) + 3").unwrap();
/// let value = parsed_expression.eval_expression(&["x", "y"], &[2.0, 0.0]).unwrap();
/// assert_eq!(value, 7.0);
/// ```
pub mod parse_expr;
///____________________________________________________________________________________________________________________________
/// # Symbolic engine
/// expression DAG with shared subexpressions, folded on construction
///# Example#
/// ```
/// use RustedTranscription::symbolic::symbolic_engine::Expr;
/// let x = Expr::Var("x".to_string());
/// let f = x.clone() * x.clone() + x.clone();
/// let df = f.diff("x");
/// assert_eq!(df.eval_expression(&["x"], &[2.0]).unwrap(), 5.0);
/// ```
pub mod symbolic_engine;
/// forward-mode derivatives and jacobians
pub mod symbolic_engine_derivatives;
pub mod symbolic_simplify;
/// vectors and column-major matrices of expressions
pub mod symbolic_vectors;
/// compiles expressions to tapes or graph walkers
pub mod symbolic_lambdify;
/// named multi-input multi-output compiled functions
pub mod symbolic_function;
pub mod symbolic_error;
#[cfg(test)]
mod symbolic_engine_tests;
