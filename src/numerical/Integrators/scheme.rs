//! The closed set of integration schemes behind one trait.
//!
//! A scheme knows the layout of its symbolic state input, the shapes of its outputs and
//! the times of its trajectory columns, and it turns an `OdeDescription` into a compiled
//! kernel. Graph schemes (explicit Runge-Kutta, trapezoidal, collocation) derive their
//! outputs as expressions and compile one `SymFunction`; IRK and the external scheme
//! produce kernels of their own.
use crate::numerical::Integrators::Collocation::Collocation;
use crate::numerical::Integrators::External::ExternalScheme;
use crate::numerical::Integrators::IRK::ImplicitRungeKutta;
use crate::numerical::Integrators::RK_fixed::{RkMethod, RungeKutta};
use crate::numerical::Integrators::Trapezoidal::Trapezoidal;
use crate::numerical::Integrators::dynamics::OdeDescription;
use crate::numerical::Integrators::integrator_api::{IntegratorOptions, IntegratorType};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::step_function::{GraphKernel, StepKernel};
use crate::symbolic::symbolic_function::{SymFunction, column};
use crate::symbolic::symbolic_lambdify::ExprBackend;
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use enum_dispatch::enum_dispatch;
use nalgebra::DVector;

/// Symbolic outputs of one interval.
#[derive(Clone, Debug)]
pub struct SchemeOutputs {
    pub xf: ExprVector,
    pub xall: ExprMatrix,
    pub defects: Option<ExprVector>,
}

#[enum_dispatch]
#[derive(Clone)]
pub enum SchemeKind {
    RungeKutta(RungeKutta),
    Trapezoidal(Trapezoidal),
    Collocation(Collocation),
    ImplicitRungeKutta(ImplicitRungeKutta),
    ExternalScheme(ExternalScheme),
}

#[enum_dispatch(SchemeKind)]
pub trait Scheme {
    fn name(&self) -> String;
    /// Number of state vectors expected in `OdeDescription::x`.
    fn state_vectors(&self) -> usize;
    fn shape_xf(&self, nx: usize) -> (usize, usize);
    fn shape_xall(&self, nx: usize) -> (usize, usize);
    /// Absolute time of every `xall` column for the interval `[t0, t0 + dt]`.
    fn time_grid(&self, t0: f64, dt: f64) -> DVector<f64>;
    fn build_kernel(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<StepKernel, IntegratorError>;
}

impl SchemeKind {
    /// Selects and configures the scheme named by `options.integrator`.
    pub fn from_options(options: &IntegratorOptions) -> Result<Self, IntegratorError> {
        let n = options.number_of_finite_elements;
        let scheme = match &options.integrator {
            IntegratorType::RK1 => RungeKutta::new(RkMethod::RK1, n.unwrap_or(5))?.into(),
            IntegratorType::RK2 => RungeKutta::new(RkMethod::RK2, n.unwrap_or(5))?.into(),
            IntegratorType::RK4 => RungeKutta::new(RkMethod::RK4, n.unwrap_or(5))?.into(),
            IntegratorType::RK8 => RungeKutta::new(RkMethod::RK8, n.unwrap_or(5))?.into(),
            IntegratorType::Trapezoidal => Trapezoidal::new(n.unwrap_or(1))?.into(),
            IntegratorType::Collocation => {
                options.control_type.require_constant("collocation")?;
                Collocation::new(
                    options.irk_polynomial_interpolation_degree,
                    options.collocation_points,
                    options.defects_type,
                    options.duplicate_starting_point,
                )?
                .into()
            }
            IntegratorType::IRK => {
                options.control_type.require_constant("irk")?;
                ImplicitRungeKutta::new(
                    options.irk_polynomial_interpolation_degree,
                    options.collocation_points,
                    options.defects_type,
                )?
                .into()
            }
            IntegratorType::External(integrator) => ExternalScheme::new(integrator.clone()).into(),
        };
        Ok(scheme)
    }
}

/// Column-major `[t0, t0 + dt/(n-1), ..., t0 + dt]` with `n` points.
pub(crate) fn linspace(t0: f64, dt: f64, n: usize) -> DVector<f64> {
    if n < 2 {
        return DVector::from_element(n, t0);
    }
    let last = (n - 1) as f64;
    DVector::from_fn(n, |i, _| t0 + dt * (i as f64) / last)
}

/// Packages graph outputs into a function with inputs `[t_span, x0, u, p, a]`
/// and outputs `[xf, xall(, defects)]`.
pub(crate) fn graph_kernel(
    name: &str,
    ode: &OdeDescription,
    outputs: SchemeOutputs,
    backend: ExprBackend,
) -> Result<StepKernel, IntegratorError> {
    let inputs = vec![
        ("t_span", column(&ode.t_span)),
        ("x0", ode.x_matrix()),
        ("u", ode.u.clone()),
        ("p", column(&ode.p)),
        ("a", ode.a.clone()),
    ];
    let has_defects = outputs.defects.is_some();
    let mut out = vec![("xf", column(&outputs.xf)), ("xall", outputs.xall)];
    if let Some(defects) = outputs.defects {
        out.push(("defects", column(&defects)));
    }
    let function = SymFunction::new(name, inputs, out, backend)?;
    Ok(StepKernel::GraphKernel(GraphKernel::new(function, has_defects)))
}
