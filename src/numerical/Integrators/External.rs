//! Steps delegated to an integrator outside the crate (typically an adaptive solver).
//!
//! The external integrator is called with numbers; the step function only checks shapes,
//! fixes the output layout and reports the trajectory. Derivatives of such a step are not
//! available.
use crate::numerical::Integrators::dynamics::OdeDescription;
use crate::numerical::Integrators::integrator_api::IntegratorOptions;
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::scheme::{Scheme, linspace};
use crate::numerical::Integrators::step_function::{
    Kernel, StepArguments, StepInput, StepKernel, StepOutput, StepStatus,
};
use log::info;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

pub trait ExternalIntegrator: Send + Sync {
    fn name(&self) -> &str;

    /// Integrates over `t_span = [t0, dt]` and returns `(xf, xall)`, `xall` having
    /// `n_output_columns()` columns.
    fn integrate(
        &self,
        t_span: &DVector<f64>,
        x0: &DVector<f64>,
        u: &DMatrix<f64>,
        p: &DVector<f64>,
        a: &DMatrix<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), IntegratorError>;

    fn n_output_columns(&self) -> usize;

    /// Times of the `xall` columns, evenly spaced unless the integrator knows better.
    fn time_grid(&self, t0: f64, dt: f64) -> DVector<f64> {
        linspace(t0, dt, self.n_output_columns())
    }
}

#[derive(Clone)]
pub struct ExternalScheme {
    integrator: Arc<dyn ExternalIntegrator>,
}

impl ExternalScheme {
    pub fn new(integrator: Arc<dyn ExternalIntegrator>) -> Self {
        Self { integrator }
    }
}

impl Scheme for ExternalScheme {
    fn name(&self) -> String {
        self.integrator.name().to_string()
    }

    fn state_vectors(&self) -> usize {
        1
    }

    fn shape_xf(&self, nx: usize) -> (usize, usize) {
        (nx, 1)
    }

    fn shape_xall(&self, nx: usize) -> (usize, usize) {
        (nx, self.integrator.n_output_columns())
    }

    fn time_grid(&self, t0: f64, dt: f64) -> DVector<f64> {
        self.integrator.time_grid(t0, dt)
    }

    fn build_kernel(
        &self,
        ode: &OdeDescription,
        _options: &IntegratorOptions,
    ) -> Result<StepKernel, IntegratorError> {
        info!("external integrator '{}'", self.integrator.name());
        Ok(StepKernel::ExternalKernel(ExternalKernel {
            integrator: self.integrator.clone(),
            nx: ode.x[0].len(),
            nu: ode.u.nrows(),
            np: ode.p.len(),
            na: ode.a.nrows(),
        }))
    }
}

#[derive(Clone)]
pub struct ExternalKernel {
    integrator: Arc<dyn ExternalIntegrator>,
    nx: usize,
    nu: usize,
    np: usize,
    na: usize,
}

impl Kernel for ExternalKernel {
    fn call(&self, args: &StepArguments) -> Result<StepOutput, IntegratorError> {
        if args.t_span.len() != 2 {
            return Err(IntegratorError::dimension("t_span", 2, args.t_span.len()));
        }
        if args.x0.shape() != (self.nx, 1) {
            return Err(IntegratorError::dimension(
                "x0",
                format!("{:?}", (self.nx, 1)),
                format!("{:?}", args.x0.shape()),
            ));
        }
        for (what, rows, found) in [
            ("u", self.nu, args.u.nrows()),
            ("p", self.np, args.p.len()),
            ("a", self.na, args.a.nrows()),
        ] {
            // empty arguments stand for zero rows
            if found != rows && !(rows == 0 && found == 0) {
                return Err(IntegratorError::dimension(what, rows, found));
            }
        }
        let x0 = DVector::from_column_slice(args.x0.as_slice());
        let (xf, xall) = self
            .integrator
            .integrate(&args.t_span, &x0, &args.u, &args.p, &args.a)?;
        let expected = (self.nx, self.integrator.n_output_columns());
        if xf.len() != self.nx || xall.shape() != expected {
            return Err(IntegratorError::dimension(
                format!("output of '{}'", self.integrator.name()),
                format!("xf {} / xall {:?}", self.nx, expected),
                format!("xf {} / xall {:?}", xf.len(), xall.shape()),
            ));
        }
        Ok(StepOutput {
            xf,
            xall,
            defects: None,
            status: StepStatus::Success,
        })
    }

    fn jacobian_xf(
        &self,
        _wrt: StepInput,
        _args: &StepArguments,
    ) -> Result<DMatrix<f64>, IntegratorError> {
        Err(IntegratorError::Unsupported(format!(
            "derivatives of the external integrator '{}'",
            self.integrator.name()
        )))
    }

    fn kernel_size(&self) -> usize {
        0
    }
}
