//! The two external collaborators of the integrators and the symbols they work on.
//!
//! - `Dynamics` gives the state derivative (and optionally an implicit residual)
//!   as expressions. It is called while graphs are built, never at evaluation time.
//! - `IntegrationModel` gives dimension counts and the quaternion normalization.
//!
//! `OdeDescription` bundles the symbolic inputs of one interval with the dynamics.
use crate::numerical::Integrators::integrator_api::{IntegratorOptions, IntegratorType};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use std::collections::HashMap;
use std::sync::Arc;

/// Continuous-time dynamics `xdot = f(t, h, x, u, p, a)`.
///
/// `t` is the absolute time of the evaluation point and `h` the step the scheme uses
/// around it (the sub-step for Runge-Kutta, the interval length otherwise).
pub trait Dynamics: Send + Sync {
    fn explicit(
        &self,
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        u: &ExprVector,
        p: &ExprVector,
        a: &ExprVector,
    ) -> ExprVector;

    /// Residual `f_impl(t, h, x, u, p, a, xdot)` that vanishes on the dynamics, if any.
    fn implicit(
        &self,
        _t: &Expr,
        _h: &Expr,
        _x: &ExprVector,
        _u: &ExprVector,
        _p: &ExprVector,
        _a: &ExprVector,
        _xdot: &ExprVector,
    ) -> Option<ExprVector> {
        None
    }

    fn has_implicit(&self) -> bool {
        false
    }
}

/// Dynamics written over template symbols `t`, `h`, `x{i}`, `u{i}`, `p{i}`, `a{i}` and,
/// for the implicit form, `xdot{i}`. Each call substitutes the actual expressions.
#[derive(Clone, Debug)]
pub struct SymbolicDynamics {
    pub explicit: Vec<Expr>,
    pub implicit: Option<Vec<Expr>>,
}

impl SymbolicDynamics {
    pub fn new(explicit: Vec<Expr>, implicit: Option<Vec<Expr>>) -> Self {
        Self { explicit, implicit }
    }

    /// Parses one expression per state.
    ///
    /// # Examples
    /// ```rust, ignore
    /// // damped oscillator: x0' = x1, x1' = -p0*x0 - 0.1*x1 + u0
    /// let dynamics = SymbolicDynamics::from_strings(&["x1", "-p0*x0 - 0.1*x1 + u0"], None)?;
    /// ```
    pub fn from_strings(
        explicit: &[&str],
        implicit: Option<&[&str]>,
    ) -> Result<Self, IntegratorError> {
        let parse = |list: &[&str]| -> Result<Vec<Expr>, IntegratorError> {
            list.iter()
                .map(|s| {
                    Expr::parse_expression(s).map_err(|e| {
                        IntegratorError::Symbolic(
                            crate::symbolic::symbolic_error::SymbolicError::Parse(format!(
                                "'{}': {}",
                                s, e
                            )),
                        )
                    })
                })
                .collect()
        };
        let explicit = parse(explicit)?;
        let implicit = match implicit {
            Some(list) => Some(parse(list)?),
            None => None,
        };
        Ok(Self { explicit, implicit })
    }

    fn bindings(
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        u: &ExprVector,
        p: &ExprVector,
        a: &ExprVector,
    ) -> HashMap<String, Expr> {
        let mut map = HashMap::new();
        map.insert("t".to_string(), t.clone());
        map.insert("h".to_string(), h.clone());
        for (prefix, v) in [("x", x), ("u", u), ("p", p), ("a", a)] {
            for (i, e) in v.iter().enumerate() {
                map.insert(format!("{}{}", prefix, i), e.clone());
            }
        }
        map
    }
}

impl Dynamics for SymbolicDynamics {
    fn explicit(
        &self,
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        u: &ExprVector,
        p: &ExprVector,
        a: &ExprVector,
    ) -> ExprVector {
        let map = Self::bindings(t, h, x, u, p, a);
        ExprVector::new(self.explicit.clone()).substitute(&map)
    }

    fn implicit(
        &self,
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        u: &ExprVector,
        p: &ExprVector,
        a: &ExprVector,
        xdot: &ExprVector,
    ) -> Option<ExprVector> {
        let implicit = self.implicit.as_ref()?;
        let mut map = Self::bindings(t, h, x, u, p, a);
        for (i, e) in xdot.iter().enumerate() {
            map.insert(format!("xdot{}", i), e.clone());
        }
        Some(ExprVector::new(implicit.clone()).substitute(&map))
    }

    fn has_implicit(&self) -> bool {
        self.implicit.is_some()
    }
}

type ExplicitFn =
    dyn Fn(&Expr, &Expr, &ExprVector, &ExprVector, &ExprVector, &ExprVector) -> ExprVector
        + Send
        + Sync;
type ImplicitFn = dyn Fn(&Expr, &Expr, &ExprVector, &ExprVector, &ExprVector, &ExprVector, &ExprVector) -> ExprVector
    + Send
    + Sync;

/// Dynamics given as closures building expressions.
pub struct FnDynamics {
    explicit: Box<ExplicitFn>,
    implicit: Option<Box<ImplicitFn>>,
}

impl FnDynamics {
    pub fn new<F>(explicit: F) -> Self
    where
        F: Fn(&Expr, &Expr, &ExprVector, &ExprVector, &ExprVector, &ExprVector) -> ExprVector
            + Send
            + Sync
            + 'static,
    {
        Self {
            explicit: Box::new(explicit),
            implicit: None,
        }
    }

    pub fn with_implicit<G>(mut self, implicit: G) -> Self
    where
        G: Fn(&Expr, &Expr, &ExprVector, &ExprVector, &ExprVector, &ExprVector, &ExprVector) -> ExprVector
            + Send
            + Sync
            + 'static,
    {
        self.implicit = Some(Box::new(implicit));
        self
    }
}

impl Dynamics for FnDynamics {
    fn explicit(
        &self,
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        u: &ExprVector,
        p: &ExprVector,
        a: &ExprVector,
    ) -> ExprVector {
        (self.explicit)(t, h, x, u, p, a)
    }

    fn implicit(
        &self,
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        u: &ExprVector,
        p: &ExprVector,
        a: &ExprVector,
        xdot: &ExprVector,
    ) -> Option<ExprVector> {
        self.implicit.as_ref().map(|f| f(t, h, x, u, p, a, xdot))
    }

    fn has_implicit(&self) -> bool {
        self.implicit.is_some()
    }
}

/// Dimension counts of the model and its quaternion handling.
pub trait IntegrationModel: Send + Sync {
    fn nb_states(&self) -> usize;
    fn nb_controls(&self) -> usize;
    fn nb_parameters(&self) -> usize {
        0
    }
    fn nb_algebraic_states(&self) -> usize {
        0
    }
    fn nb_quaternions(&self) -> usize {
        0
    }
    /// Rescales every quaternion block of `x` to unit norm.
    fn normalize_state_quaternions(&self, x: &ExprVector) -> ExprVector {
        x.clone()
    }
}

/// Model with fixed counts and quaternion blocks given by the indices of their
/// four components in the state vector.
#[derive(Clone, Debug, PartialEq)]
pub struct QuaternionModel {
    pub nb_states: usize,
    pub nb_controls: usize,
    pub nb_parameters: usize,
    pub nb_algebraic_states: usize,
    pub quaternions: Vec<[usize; 4]>,
}

impl QuaternionModel {
    pub fn new(nb_states: usize, nb_controls: usize) -> Self {
        Self {
            nb_states,
            nb_controls,
            nb_parameters: 0,
            nb_algebraic_states: 0,
            quaternions: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, n: usize) -> Self {
        self.nb_parameters = n;
        self
    }

    pub fn with_algebraic_states(mut self, n: usize) -> Self {
        self.nb_algebraic_states = n;
        self
    }

    pub fn with_quaternion(mut self, block: [usize; 4]) -> Result<Self, IntegratorError> {
        if let Some(&bad) = block.iter().find(|&&i| i >= self.nb_states) {
            return Err(IntegratorError::dimension(
                "quaternion index",
                format!("< {}", self.nb_states),
                bad,
            ));
        }
        self.quaternions.push(block);
        Ok(self)
    }
}

impl IntegrationModel for QuaternionModel {
    fn nb_states(&self) -> usize {
        self.nb_states
    }
    fn nb_controls(&self) -> usize {
        self.nb_controls
    }
    fn nb_parameters(&self) -> usize {
        self.nb_parameters
    }
    fn nb_algebraic_states(&self) -> usize {
        self.nb_algebraic_states
    }
    fn nb_quaternions(&self) -> usize {
        self.quaternions.len()
    }
    fn normalize_state_quaternions(&self, x: &ExprVector) -> ExprVector {
        let mut out = x.clone();
        for block in &self.quaternions {
            let q = ExprVector::new(block.iter().map(|&i| x[i].clone()).collect());
            let norm = q.norm2();
            for &i in block {
                out[i] = &x[i] / &norm;
            }
        }
        out
    }
}

/// Symbolic inputs of one interval and the dynamics they feed.
#[derive(Clone)]
pub struct OdeDescription {
    /// `[t0, dt]`: start and duration of the interval
    pub t_span: ExprVector,
    /// one vector for explicit schemes and IRK, `[x_start, x_end]` for trapezoidal,
    /// node states for collocation (element 0 is the interval start)
    pub x: Vec<ExprVector>,
    pub u: ExprMatrix,
    /// shared by every interval
    pub p: ExprVector,
    pub a: ExprMatrix,
    pub dynamics: Arc<dyn Dynamics>,
}

impl OdeDescription {
    pub fn new(
        t_span: ExprVector,
        x: Vec<ExprVector>,
        u: ExprMatrix,
        p: ExprVector,
        a: ExprMatrix,
        dynamics: Arc<dyn Dynamics>,
    ) -> Self {
        Self {
            t_span,
            x,
            u,
            p,
            a,
            dynamics,
        }
    }

    /// Fresh symbols shaped for the scheme selected in `options`:
    /// `t_span0, t_span1`, `x_k_i` for state vector k, `u_i_j`, `p{i}`, `a_i_j`.
    pub fn symbolic(dynamics: Arc<dyn Dynamics>, options: &IntegratorOptions) -> Self {
        let model = &options.model;
        let nx = model.nb_states();
        let degree = options.irk_polynomial_interpolation_degree;
        let (n_x, u_cols, a_cols) = match options.integrator {
            IntegratorType::Trapezoidal => (2, 2, 2),
            IntegratorType::Collocation if options.duplicate_starting_point => (degree + 2, 1, 1),
            IntegratorType::Collocation => (degree + 1, 1, 1),
            _ => (1, options.control_type.control_columns(), 1),
        };
        let x = (0..n_x)
            .map(|k| ExprVector::indexed_vars_vector(nx, &format!("x_{}_", k)))
            .collect();
        Self {
            t_span: ExprVector::indexed_vars_vector(2, "t_span"),
            x,
            u: ExprMatrix::indexed_vars_matrix(model.nb_controls(), u_cols, "u"),
            p: ExprVector::indexed_vars_vector(model.nb_parameters(), "p"),
            a: ExprMatrix::indexed_vars_matrix(model.nb_algebraic_states(), a_cols, "a"),
            dynamics,
        }
    }

    pub fn t0(&self) -> &Expr {
        &self.t_span[0]
    }

    pub fn dt(&self) -> &Expr {
        &self.t_span[1]
    }

    /// Horizontal concatenation of the state vectors, the `x0` input of the step function.
    pub fn x_matrix(&self) -> ExprMatrix {
        ExprMatrix::from_columns(self.x.clone())
    }

    /// Checks the symbol shapes against the model counts.
    pub fn check_dimensions(&self, model: &dyn IntegrationModel) -> Result<(), IntegratorError> {
        if self.t_span.len() != 2 {
            return Err(IntegratorError::dimension("t_span", 2, self.t_span.len()));
        }
        for (k, x) in self.x.iter().enumerate() {
            if x.len() != model.nb_states() {
                return Err(IntegratorError::dimension(
                    format!("state vector {}", k),
                    model.nb_states(),
                    x.len(),
                ));
            }
        }
        if self.u.nrows() != model.nb_controls() {
            return Err(IntegratorError::dimension("controls", model.nb_controls(), self.u.nrows()));
        }
        if self.p.len() != model.nb_parameters() {
            return Err(IntegratorError::dimension("parameters", model.nb_parameters(), self.p.len()));
        }
        if self.a.nrows() != model.nb_algebraic_states() {
            return Err(IntegratorError::dimension(
                "algebraic states",
                model.nb_algebraic_states(),
                self.a.nrows(),
            ));
        }
        Ok(())
    }

    /// Column 0 of the algebraic states, or an empty vector.
    pub(crate) fn a_start(&self) -> ExprVector {
        if self.a.ncols() == 0 {
            ExprVector::new(Vec::new())
        } else {
            self.a.column(0)
        }
    }
}
