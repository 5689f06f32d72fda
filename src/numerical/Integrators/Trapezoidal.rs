//! Trapezoidal rule over one interval:
//! `x_end = x_start + dt/2 (f(t0, x_start, u0, a0) + f(t0 + dt, x_end, u1, a1))`.
//!
//! The state input holds both `x_start` and `x_end`, the controls and algebraic states
//! hold their start and end columns. With `TrapezoidalEndState::Recomputed` the scheme
//! reports the explicit end state; with `Supplied` it reports the given `x_end` and a
//! `defects` output measuring how far it is from the rule.
use crate::numerical::Integrators::dynamics::{IntegrationModel, OdeDescription};
use crate::numerical::Integrators::integrator_api::{IntegratorOptions, TrapezoidalEndState};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::scheme::{Scheme, SchemeOutputs, graph_kernel, linspace};
use crate::numerical::Integrators::step_function::StepKernel;
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use log::info;
use nalgebra::DVector;

#[derive(Clone, Debug, PartialEq)]
pub struct Trapezoidal;

impl Trapezoidal {
    pub fn new(n_elements: usize) -> Result<Self, IntegratorError> {
        if n_elements != 1 {
            return Err(IntegratorError::InvalidFiniteElements {
                scheme: "trapezoidal".to_string(),
                expected: "1".to_string(),
                found: n_elements,
            });
        }
        Ok(Trapezoidal)
    }

    /// Start and end columns of a two-column matrix; an input without rows gives two
    /// empty vectors.
    fn boundary_columns(
        m: &ExprMatrix,
        what: &str,
    ) -> Result<(ExprVector, ExprVector), IntegratorError> {
        if m.nrows() == 0 {
            return Ok((ExprVector::new(Vec::new()), ExprVector::new(Vec::new())));
        }
        if m.ncols() != 2 {
            return Err(IntegratorError::dimension(format!("{} columns", what), 2, m.ncols()));
        }
        Ok((m.column(0), m.column(1)))
    }

    pub fn outputs(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<SchemeOutputs, IntegratorError> {
        let model: &dyn IntegrationModel = options.model.as_ref();
        let (x_start, x_end) = (&ode.x[0], &ode.x[1]);
        let nx = x_start.len();
        let (u0, u1) = Self::boundary_columns(&ode.u, "control")?;
        let (a0, a1) = Self::boundary_columns(&ode.a, "algebraic state")?;
        let (t0, dt) = (ode.t0(), ode.dt());
        let t_end = t0 + dt;

        let f_start = ode.dynamics.explicit(t0, dt, x_start, &u0, &ode.p, &a0);
        let f_end = ode.dynamics.explicit(&t_end, dt, x_end, &u1, &ode.p, &a1);
        for f in [&f_start, &f_end] {
            if f.len() != nx {
                return Err(IntegratorError::dimension("dynamics output", nx, f.len()));
            }
        }
        let mut computed = x_start + &(&f_start + &f_end).scale(&(dt / 2.0));
        if model.nb_quaternions() > 0 {
            computed = model.normalize_state_quaternions(&computed);
        }

        let outputs = match options.trapezoidal_end_state {
            TrapezoidalEndState::Recomputed => SchemeOutputs {
                xall: ExprMatrix::from_columns(vec![x_start.clone(), computed.clone()]),
                xf: computed,
                defects: None,
            },
            TrapezoidalEndState::Supplied => SchemeOutputs {
                xf: x_end.clone(),
                xall: ExprMatrix::from_columns(vec![x_start.clone(), x_end.clone()]),
                defects: Some(x_end - &computed),
            },
        };
        Ok(outputs)
    }
}

impl Scheme for Trapezoidal {
    fn name(&self) -> String {
        "trapezoidal".to_string()
    }

    fn state_vectors(&self) -> usize {
        2
    }

    fn shape_xf(&self, nx: usize) -> (usize, usize) {
        (nx, 1)
    }

    fn shape_xall(&self, nx: usize) -> (usize, usize) {
        (nx, 2)
    }

    fn time_grid(&self, t0: f64, dt: f64) -> DVector<f64> {
        linspace(t0, dt, 2)
    }

    fn build_kernel(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<StepKernel, IntegratorError> {
        info!("trapezoidal step, end state {}", options.trapezoidal_end_state);
        let outputs = self.outputs(ode, options)?;
        graph_kernel("trapezoidal", ode, outputs, options.backend)
    }
}
