//! Direct collocation on one interval.
//!
//! The state on `[t0, t0 + dt]` is the Lagrange polynomial through `x_start` and the states
//! at the collocation nodes `tau_1..tau_d` (Legendre or right Radau points, from the
//! Gauss-Legendre and Gauss-Jacobi rules of `gauss_quad`). With `tau_0 = 0` and the basis `L_0..L_d`:
//! - `c[j][r] = L_j'(tau_r)` gives the polynomial slope at node `r`,
//! - `d[j] = L_j(1)` gives the polynomial at the interval end.
//!
//! The step function exposes the node states as decision variables and returns the
//! defects `xp_j - dt f(t_j, x_j)` (explicit) or `f_impl(t_j, x_j, xp_j / dt)` (implicit)
//! together with the interpolated end state.
use crate::numerical::Integrators::dynamics::OdeDescription;
use crate::numerical::Integrators::integrator_api::{CollocationPoints, DefectType, IntegratorOptions};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::scheme::{Scheme, SchemeOutputs, graph_kernel};
use crate::numerical::Integrators::step_function::StepKernel;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_error::SymbolicError;
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use log::{debug, info};
use gauss_quad::{GaussJacobi, GaussLegendre};
use nalgebra::{DMatrix, DVector};

/// Collocation points on (0, 1], ascending, `degree` of them.
///
/// Legendre points are the Gauss-Legendre nodes. Right Radau points are the zeros of the
/// Jacobi polynomial `P_{degree-1}^{(1,0)}` followed by the end point.
pub fn collocation_points(
    degree: usize,
    family: CollocationPoints,
) -> Result<Vec<f64>, IntegratorError> {
    if degree == 0 {
        return Err(IntegratorError::InvalidDegree(degree));
    }
    let quadrature_failed = |e: String| {
        IntegratorError::Unsupported(format!("{} points of degree {}: {}", family, degree, e))
    };
    // nodes on [-1, 1]; the quadrature rules start at two nodes
    let mut x: Vec<f64> = match (family, degree) {
        (CollocationPoints::Legendre, 1) => vec![0.0],
        (CollocationPoints::Legendre, _) => GaussLegendre::new(degree)
            .map_err(|e| quadrature_failed(format!("{:?}", e)))?
            .into_node_weight_pairs()
            .into_iter()
            .map(|(node, _)| node)
            .collect(),
        (CollocationPoints::Radau, 1) => vec![],
        // single zero of P_1^{(1,0)}
        (CollocationPoints::Radau, 2) => vec![-1.0 / 3.0],
        (CollocationPoints::Radau, _) => GaussJacobi::new(degree - 1, 1.0, 0.0)
            .map_err(|e| quadrature_failed(format!("{:?}", e)))?
            .into_node_weight_pairs()
            .into_iter()
            .map(|(node, _)| node)
            .collect(),
    };
    x.sort_by(|a, b| a.total_cmp(b));
    let mut tau: Vec<f64> = x.iter().map(|xi| (xi + 1.0) / 2.0).collect();
    if family == CollocationPoints::Radau {
        tau.push(1.0);
    }
    Ok(tau)
}

/// `(c, d)` of the Lagrange basis through `tau` (which starts with 0).
pub fn collocation_coefficients(
    tau: &[f64],
    family: CollocationPoints,
) -> Result<(DMatrix<f64>, Vec<f64>), IntegratorError> {
    let n = tau.len();
    let var = Expr::Var("tau".to_string());
    let mut c = DMatrix::zeros(n, n);
    let mut d = vec![0.0; n];
    for j in 0..n {
        let mut basis = Expr::Const(1.0);
        for r in (0..n).filter(|&r| r != j) {
            basis = basis * ((&var - tau[r]) / (tau[j] - tau[r]));
        }
        let slope = basis.diff("tau");
        for r in 0..n {
            c[(j, r)] = eval_at(&slope, tau[r])?;
        }
        d[j] = match family {
            CollocationPoints::Radau => {
                if j == n - 1 {
                    1.0
                } else {
                    0.0
                }
            }
            CollocationPoints::Legendre => eval_at(&basis, 1.0)?,
        };
    }
    Ok((c, d))
}

fn eval_at(e: &Expr, tau: f64) -> Result<f64, IntegratorError> {
    e.eval_expression(&["tau"], &[tau]).map_err(|v| {
        IntegratorError::Symbolic(SymbolicError::FreeVariable {
            function: "lagrange basis".to_string(),
            variable: v,
        })
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collocation {
    pub degree: usize,
    pub points: CollocationPoints,
    pub defects_type: DefectType,
    pub duplicate_starting_point: bool,
    /// `[0, tau_1, ..., tau_d]`
    tau: Vec<f64>,
    c: DMatrix<f64>,
    d: Vec<f64>,
}

impl Collocation {
    pub fn new(
        degree: usize,
        points: CollocationPoints,
        defects_type: DefectType,
        duplicate_starting_point: bool,
    ) -> Result<Self, IntegratorError> {
        let mut tau = vec![0.0];
        tau.extend(collocation_points(degree, points)?);
        let (c, d) = collocation_coefficients(&tau, points)?;
        debug!("{} points of degree {}: {:?}", points, degree, &tau[1..]);
        Ok(Self {
            degree,
            points,
            defects_type,
            duplicate_starting_point,
            tau,
            c,
            d,
        })
    }

    /// `[0, tau_1, ..., tau_d]`
    pub fn tau(&self) -> &[f64] {
        &self.tau
    }

    pub fn coefficients(&self) -> (&DMatrix<f64>, &[f64]) {
        (&self.c, &self.d)
    }

    /// End state and defects for `states = [x_start, x_start_copy, x_1, ..., x_d]`.
    ///
    /// The copy of the start only enters the end state; the slopes use `x_start`.
    pub(crate) fn equations(
        &self,
        ode: &OdeDescription,
        states: &[ExprVector],
        options: &IntegratorOptions,
    ) -> Result<(ExprVector, ExprVector), IntegratorError> {
        let degree = self.degree;
        if states.len() != degree + 2 {
            return Err(IntegratorError::dimension("collocation states", degree + 2, states.len()));
        }
        if self.defects_type == DefectType::Implicit && !ode.dynamics.has_implicit() {
            return Err(IntegratorError::MissingImplicitDynamics);
        }
        let nx = states[0].len();
        let (t0, dt) = (ode.t0(), ode.dt());
        let a = ode.a_start();
        let mut defects = Vec::with_capacity(degree);
        for j in 1..=degree {
            // slope of the polynomial at node j
            let mut xp = &states[0] * self.c[(0, j)];
            for r in 1..=degree {
                xp = &xp + &(&states[r + 1] * self.c[(r, j)]);
            }
            let t_j = t0 + &(dt * self.tau[j]);
            let u = options.control_type.evaluate(&ode.u, &t_j, &ode.t_span)?;
            let x_j = &states[j + 1];
            let defect = match self.defects_type {
                DefectType::Explicit => {
                    let f = ode.dynamics.explicit(&t_j, dt, x_j, &u, &ode.p, &a);
                    if f.len() != nx {
                        return Err(IntegratorError::dimension("dynamics output", nx, f.len()));
                    }
                    &xp - &f.scale(dt)
                }
                DefectType::Implicit => {
                    let xdot = ExprVector::new(xp.iter().map(|e| e / dt).collect());
                    ode.dynamics
                        .implicit(&t_j, dt, x_j, &u, &ode.p, &a, &xdot)
                        .ok_or(IntegratorError::MissingImplicitDynamics)?
                }
            };
            defects.push(defect);
        }
        let mut xf = &states[1] * self.d[0];
        for j in 1..=degree {
            xf = &xf + &(&states[j + 1] * self.d[j]);
        }
        Ok((xf, ExprVector::concat(&defects)))
    }

    pub fn outputs(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<SchemeOutputs, IntegratorError> {
        let states: Vec<ExprVector> = if self.duplicate_starting_point {
            ode.x.clone()
        } else {
            let mut s = vec![ode.x[0].clone(), ode.x[0].clone()];
            s.extend(ode.x[1..].iter().cloned());
            s
        };
        let (xf, defects) = self.equations(ode, &states, options)?;
        Ok(SchemeOutputs {
            xf,
            xall: ExprMatrix::from_columns(ode.x.clone()),
            defects: Some(defects),
        })
    }
}

impl Scheme for Collocation {
    fn name(&self) -> String {
        format!("collocation_{}_{}", self.points, self.degree)
    }

    fn state_vectors(&self) -> usize {
        if self.duplicate_starting_point {
            self.degree + 2
        } else {
            self.degree + 1
        }
    }

    fn shape_xf(&self, nx: usize) -> (usize, usize) {
        (nx, self.degree + 1)
    }

    /// One column per state vector.
    fn shape_xall(&self, nx: usize) -> (usize, usize) {
        (nx, self.state_vectors())
    }

    /// `[t0, (t0,) t0 + tau_1 dt, ..., t0 + tau_d dt]`, the copy of the start sharing `t0`.
    fn time_grid(&self, t0: f64, dt: f64) -> DVector<f64> {
        let mut grid = vec![t0];
        if self.duplicate_starting_point {
            grid.push(t0);
        }
        grid.extend(self.tau[1..].iter().map(|tau| t0 + tau * dt));
        DVector::from_vec(grid)
    }

    fn build_kernel(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<StepKernel, IntegratorError> {
        info!(
            "collocation: degree {}, {} points, {} defects, duplicate start {}",
            self.degree, self.points, self.defects_type, self.duplicate_starting_point
        );
        let outputs = self.outputs(ode, options)?;
        graph_kernel(&self.name(), ode, outputs, options.backend)
    }
}
