//! # Step function
//!
//! A `StepFunction` advances the state over one interval `[t0, t0 + dt]` with the scheme
//! selected in `IntegratorOptions`. It is built once from an `OdeDescription` (symbols plus
//! dynamics) and then called with numbers any number of times:
//! ```rust, ignore
//! let model = Arc::new(QuaternionModel::new(1, 0));
//! let dynamics = Arc::new(SymbolicDynamics::from_strings(&["-x0"], None)?);
//! let options = IntegratorOptions::new(model).with_integrator(IntegratorType::RK4);
//! let step = StepFunction::from_dynamics(dynamics, &options)?;
//! let out = step.call(&StepArguments::new(
//!     DVector::from_vec(vec![0.0, 1.0]),        // t_span = [t0, dt]
//!     DMatrix::from_element(1, 1, 1.0),         // x0
//!     DMatrix::zeros(0, 1),                     // u
//!     DVector::zeros(0),                        // p
//!     DMatrix::zeros(0, 1),                     // a
//! ))?;
//! ```
//! Inputs are always `[t_span, x0, u, p, a]`. Outputs are `xf`, `xall` (the state at every
//! point of `time_grid`) and, for the trapezoidal scheme with a supplied end state and
//! for collocation, `defects`.
use crate::Utils::logger::init_logger;
use crate::numerical::Integrators::External::ExternalKernel;
use crate::numerical::Integrators::IRK::ImplicitKernel;
use crate::numerical::Integrators::dynamics::{Dynamics, OdeDescription};
use crate::numerical::Integrators::integrator_api::IntegratorOptions;
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::scheme::{Scheme, SchemeKind};
use crate::symbolic::symbolic_function::SymFunction;
use enum_dispatch::enum_dispatch;
use log::info;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

/// Names of the step-function inputs, in call order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StepInput {
    TSpan,
    X0,
    U,
    P,
    A,
}

impl StepInput {
    pub fn name(&self) -> &'static str {
        match self {
            StepInput::TSpan => "t_span",
            StepInput::X0 => "x0",
            StepInput::U => "u",
            StepInput::P => "p",
            StepInput::A => "a",
        }
    }
}

/// Numeric arguments of one call.
#[derive(Clone, Debug, PartialEq)]
pub struct StepArguments {
    /// `[t0, dt]`
    pub t_span: DVector<f64>,
    /// one column for single-state schemes, the node states for collocation,
    /// `[x_start, x_end]` for trapezoidal
    pub x0: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub p: DVector<f64>,
    pub a: DMatrix<f64>,
}

impl StepArguments {
    pub fn new(
        t_span: DVector<f64>,
        x0: DMatrix<f64>,
        u: DMatrix<f64>,
        p: DVector<f64>,
        a: DMatrix<f64>,
    ) -> Self {
        Self { t_span, x0, u, p, a }
    }

    /// Arguments as matrices in input order; empty arguments take the empty shape the
    /// function expects (a 0 x 0 control stands for 0 x k).
    pub(crate) fn to_matrices(&self, shapes: &[(usize, usize)]) -> Vec<DMatrix<f64>> {
        let as_column = |v: &DVector<f64>| DMatrix::from_column_slice(v.len(), 1, v.as_slice());
        let raw = [
            as_column(&self.t_span),
            self.x0.clone(),
            self.u.clone(),
            as_column(&self.p),
            self.a.clone(),
        ];
        raw.into_iter()
            .zip(shapes)
            .map(|(m, &(r, c))| {
                if m.is_empty() && r * c == 0 {
                    DMatrix::zeros(r, c)
                } else {
                    m
                }
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepStatus {
    /// explicit evaluation, nothing to converge
    Success,
    Converged { iterations: usize, residual_norm: f64 },
    /// outputs are NaN
    NotConverged { iterations: usize, residual_norm: f64 },
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        !matches!(self, StepStatus::NotConverged { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepOutput {
    pub xf: DVector<f64>,
    pub xall: DMatrix<f64>,
    pub defects: Option<DVector<f64>>,
    pub status: StepStatus,
}

#[enum_dispatch]
#[derive(Clone)]
pub enum StepKernel {
    GraphKernel(GraphKernel),
    ImplicitKernel(ImplicitKernel),
    ExternalKernel(ExternalKernel),
}

#[enum_dispatch(StepKernel)]
pub trait Kernel {
    fn call(&self, args: &StepArguments) -> Result<StepOutput, IntegratorError>;
    /// `d xf / d wrt`, of shape `(nx, number of entries of wrt)`.
    fn jacobian_xf(&self, wrt: StepInput, args: &StepArguments)
    -> Result<DMatrix<f64>, IntegratorError>;
    /// Size of the compiled evaluation kernels.
    fn kernel_size(&self) -> usize;
}

/// Kernel of the schemes whose outputs are explicit expressions of the inputs.
#[derive(Clone, Debug)]
pub struct GraphKernel {
    function: SymFunction,
    has_defects: bool,
}

impl GraphKernel {
    pub(crate) fn new(function: SymFunction, has_defects: bool) -> Self {
        Self {
            function,
            has_defects,
        }
    }

    pub fn function(&self) -> &SymFunction {
        &self.function
    }

    fn arguments(&self, args: &StepArguments) -> Vec<DMatrix<f64>> {
        let shapes: Vec<(usize, usize)> = (0..self.function.n_inputs())
            .map(|i| self.function.input_shape(i))
            .collect();
        args.to_matrices(&shapes)
    }

    /// `d xf / d wrt` as a function of the same inputs, compiled anew on every request.
    pub fn xf_jacobian(&self, wrt: StepInput) -> Result<SymFunction, IntegratorError> {
        Ok(self.function.jacobian("xf", wrt.name())?)
    }
}

impl Kernel for GraphKernel {
    fn call(&self, args: &StepArguments) -> Result<StepOutput, IntegratorError> {
        let mut out = self.function.call(&self.arguments(args))?;
        let defects = if self.has_defects {
            Some(DVector::from_column_slice(out[2].as_slice()))
        } else {
            None
        };
        let xall = out.swap_remove(1);
        let xf = DVector::from_column_slice(out[0].as_slice());
        Ok(StepOutput {
            xf,
            xall,
            defects,
            status: StepStatus::Success,
        })
    }

    fn jacobian_xf(
        &self,
        wrt: StepInput,
        args: &StepArguments,
    ) -> Result<DMatrix<f64>, IntegratorError> {
        let jacobian = self.xf_jacobian(wrt)?;
        Ok(jacobian.call(&self.arguments(args))?.swap_remove(0))
    }

    fn kernel_size(&self) -> usize {
        self.function.kernel_size()
    }
}

/// Step over one interval, built once and evaluated many times. Immutable and `Sync`,
/// so one instance serves every interval and thread.
#[derive(Clone)]
pub struct StepFunction {
    scheme: SchemeKind,
    kernel: StepKernel,
    nx: usize,
    output_names: Vec<String>,
}

impl StepFunction {
    /// Builds the step function of `ode` with the scheme in `options`.
    ///
    /// Fails on inconsistent options (unsupported control policy, invalid element count or
    /// degree, implicit defects without an implicit form) and on symbol shapes that do not
    /// match the scheme.
    pub fn build(ode: &OdeDescription, options: &IntegratorOptions) -> Result<Self, IntegratorError> {
        if let Some(level) = options.log_level {
            init_logger(level, None);
        }
        let scheme = SchemeKind::from_options(options)?;
        ode.check_dimensions(options.model.as_ref())?;
        if ode.x.len() != scheme.state_vectors() {
            return Err(IntegratorError::dimension(
                format!("state vectors of {}", scheme.name()),
                scheme.state_vectors(),
                ode.x.len(),
            ));
        }
        let nx = options.model.nb_states();
        let kernel = scheme.build_kernel(ode, options)?;
        let output_names = match &kernel {
            StepKernel::GraphKernel(k) => k
                .function()
                .output_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            _ => vec!["xf".to_string(), "xall".to_string()],
        };
        info!(
            "step function '{}' built: xf {:?}, xall {:?}, kernel size {}",
            scheme.name(),
            scheme.shape_xf(nx),
            scheme.shape_xall(nx),
            kernel.kernel_size()
        );
        Ok(Self {
            scheme,
            kernel,
            nx,
            output_names,
        })
    }

    /// Builds the symbols the scheme needs and then the step function.
    pub fn from_dynamics(
        dynamics: Arc<dyn Dynamics>,
        options: &IntegratorOptions,
    ) -> Result<Self, IntegratorError> {
        let ode = OdeDescription::symbolic(dynamics, options);
        Self::build(&ode, options)
    }

    pub fn call(&self, args: &StepArguments) -> Result<StepOutput, IntegratorError> {
        self.kernel.call(args)
    }

    /// Derivative of `xf` with respect to one input at `args`.
    ///
    /// Nothing is kept between calls; to evaluate the derivative many times, compile it once
    /// with `jacobian_function`.
    pub fn jacobian_xf(
        &self,
        wrt: StepInput,
        args: &StepArguments,
    ) -> Result<DMatrix<f64>, IntegratorError> {
        self.kernel.jacobian_xf(wrt, args)
    }

    /// Compiled `d xf / d wrt` over the inputs `[t_span, x0, u, p, a]`. Only schemes whose
    /// outputs are explicit expressions have one; implicit and external steps answer
    /// `Unsupported` and are differentiated through `jacobian_xf`.
    pub fn jacobian_function(&self, wrt: StepInput) -> Result<SymFunction, IntegratorError> {
        match &self.kernel {
            StepKernel::GraphKernel(kernel) => kernel.xf_jacobian(wrt),
            _ => Err(IntegratorError::Unsupported(format!(
                "compiled jacobian of the '{}' step",
                self.scheme_name()
            ))),
        }
    }

    pub fn scheme_name(&self) -> String {
        self.scheme.name()
    }

    pub fn scheme(&self) -> &SchemeKind {
        &self.scheme
    }

    pub fn shape_xf(&self) -> (usize, usize) {
        self.scheme.shape_xf(self.nx)
    }

    pub fn shape_xall(&self) -> (usize, usize) {
        self.scheme.shape_xall(self.nx)
    }

    /// Absolute times of the `xall` columns for `t_span = [t0, dt]`.
    pub fn time_grid(&self, t_span: &DVector<f64>) -> Result<DVector<f64>, IntegratorError> {
        if t_span.len() != 2 {
            return Err(IntegratorError::dimension("t_span", 2, t_span.len()));
        }
        Ok(self.scheme.time_grid(t_span[0], t_span[1]))
    }

    pub fn input_names(&self) -> Vec<&'static str> {
        [StepInput::TSpan, StepInput::X0, StepInput::U, StepInput::P, StepInput::A]
            .iter()
            .map(|i| i.name())
            .collect()
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// The compiled function behind graph schemes.
    pub fn function(&self) -> Option<&SymFunction> {
        match &self.kernel {
            StepKernel::GraphKernel(k) => Some(k.function()),
            _ => None,
        }
    }

    pub fn kernel(&self) -> &StepKernel {
        &self.kernel
    }

    /// Evaluates `n` independent intervals at once.
    pub fn map(&self, n: usize) -> MappedStepFunction<'_> {
        MappedStepFunction { step: self, n }
    }
}

pub struct MappedStepFunction<'a> {
    step: &'a StepFunction,
    n: usize,
}

impl MappedStepFunction<'_> {
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// One output per argument set, in order. Intervals run in parallel.
    pub fn call(&self, args: &[StepArguments]) -> Result<Vec<StepOutput>, IntegratorError> {
        if args.len() != self.n {
            return Err(IntegratorError::dimension("mapped arguments", self.n, args.len()));
        }
        args.par_iter().map(|a| self.step.call(a)).collect()
    }
}
