//! Fixed-step explicit Runge-Kutta schemes: Euler, midpoint, classic RK4 and the
//! 10-stage order-8 method.
//!
//! The interval `[t0, t0 + dt]` is cut into `n` sub-steps of length `h = dt / n`. Sub-step `i`
//! starts at `t0 + i h` and every stage `s` is evaluated at `t0 + i h + c_s h`, with the
//! control interpolated at that time. The dynamics always receive `h` as their step
//! argument. After each sub-step the quaternion blocks of the state are normalized.
use crate::numerical::Integrators::dynamics::{Dynamics, IntegrationModel, OdeDescription};
use crate::numerical::Integrators::integrator_api::{ControlType, IntegratorOptions};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::scheme::{Scheme, SchemeOutputs, graph_kernel, linspace};
use crate::numerical::Integrators::step_function::StepKernel;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};
use log::info;
use nalgebra::DVector;

/// One row of a Butcher tableau with rational coefficients: the stage node `c`
/// and `a_j = numerators[j] / denominator`.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub c: f64,
    pub denominator: f64,
    pub numerators: Vec<f64>,
}

impl Stage {
    fn new(c: f64, denominator: f64, numerators: &[f64]) -> Self {
        Self {
            c,
            denominator,
            numerators: numerators.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tableau {
    /// stages after the first one (which is always `f(t, x)`)
    pub stages: Vec<Stage>,
    pub weight_denominator: f64,
    pub weights: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RkMethod {
    RK1,
    RK2,
    RK4,
    RK8,
}

impl RkMethod {
    pub fn name(&self) -> &'static str {
        match self {
            RkMethod::RK1 => "rk1",
            RkMethod::RK2 => "rk2",
            RkMethod::RK4 => "rk4",
            RkMethod::RK8 => "rk8",
        }
    }

    pub fn order(&self) -> usize {
        match self {
            RkMethod::RK1 => 1,
            RkMethod::RK2 => 2,
            RkMethod::RK4 => 4,
            RkMethod::RK8 => 8,
        }
    }

    pub fn tableau(&self) -> Tableau {
        match self {
            RkMethod::RK1 => Tableau {
                stages: Vec::new(),
                weight_denominator: 1.0,
                weights: vec![1.0],
            },
            RkMethod::RK2 => Tableau {
                stages: vec![Stage::new(0.5, 2.0, &[1.0])],
                weight_denominator: 1.0,
                weights: vec![0.0, 1.0],
            },
            RkMethod::RK4 => Tableau {
                stages: vec![
                    Stage::new(0.5, 2.0, &[1.0]),
                    Stage::new(0.5, 2.0, &[0.0, 1.0]),
                    Stage::new(1.0, 1.0, &[0.0, 0.0, 1.0]),
                ],
                weight_denominator: 6.0,
                weights: vec![1.0, 2.0, 2.0, 1.0],
            },
            RkMethod::RK8 => Tableau {
                stages: vec![
                    Stage::new(4.0 / 27.0, 27.0, &[4.0]),
                    Stage::new(2.0 / 9.0, 18.0, &[1.0, 3.0]),
                    Stage::new(1.0 / 3.0, 12.0, &[1.0, 0.0, 3.0]),
                    Stage::new(0.5, 8.0, &[1.0, 0.0, 0.0, 3.0]),
                    Stage::new(2.0 / 3.0, 54.0, &[13.0, 0.0, -27.0, 42.0, 8.0]),
                    Stage::new(1.0 / 6.0, 4320.0, &[389.0, 0.0, -54.0, 966.0, -824.0, 243.0]),
                    Stage::new(1.0, 20.0, &[-231.0, 0.0, 81.0, -1164.0, 656.0, -122.0, 800.0]),
                    Stage::new(5.0 / 6.0, 288.0, &[-127.0, 0.0, 18.0, -678.0, 456.0, -9.0, 576.0, 4.0]),
                    Stage::new(
                        1.0,
                        820.0,
                        &[1481.0, 0.0, -81.0, 7104.0, -3376.0, 72.0, -5040.0, -60.0, 720.0],
                    ),
                ],
                weight_denominator: 840.0,
                weights: vec![41.0, 0.0, 0.0, 27.0, 272.0, 27.0, 216.0, 0.0, 216.0, 41.0],
            },
        }
    }
}

/// `sum_j w_j k_j`, skipping zero weights.
fn combine(weights: &[f64], ks: &[ExprVector], nx: usize) -> ExprVector {
    let mut acc: Option<ExprVector> = None;
    for (w, k) in weights.iter().zip(ks) {
        if *w == 0.0 {
            continue;
        }
        let term = if *w == 1.0 { k.clone() } else { k * *w };
        acc = Some(match acc {
            Some(a) => &a + &term,
            None => term,
        });
    }
    acc.unwrap_or_else(|| ExprVector::zeros(nx))
}

#[derive(Clone, Debug, PartialEq)]
pub struct RungeKutta {
    pub method: RkMethod,
    pub n_steps: usize,
    tableau: Tableau,
}

impl RungeKutta {
    pub fn new(method: RkMethod, n_steps: usize) -> Result<Self, IntegratorError> {
        if n_steps == 0 {
            return Err(IntegratorError::InvalidFiniteElements {
                scheme: method.name().to_string(),
                expected: ">= 1".to_string(),
                found: 0,
            });
        }
        Ok(Self {
            method,
            n_steps,
            tableau: method.tableau(),
        })
    }

    /// Sub-step `i` from `(t, x)` with step `h`.
    ///
    /// Stage `s` sits at the fraction `(i + c_s) / n` of the interval, which is where the
    /// controls are interpolated.
    fn next_x(
        &self,
        i: usize,
        t: &Expr,
        h: &Expr,
        x: &ExprVector,
        ode: &OdeDescription,
        control: ControlType,
        a: &ExprVector,
    ) -> Result<ExprVector, IntegratorError> {
        let nx = x.len();
        let n = self.n_steps as f64;
        let dynamics: &dyn Dynamics = ode.dynamics.as_ref();
        let derivative = |c: f64, t_s: &Expr, x_s: &ExprVector| -> Result<ExprVector, IntegratorError> {
            let u_s = control.evaluate_at_fraction(&ode.u, (i as f64 + c) / n)?;
            let k = dynamics.explicit(t_s, h, x_s, &u_s, &ode.p, a);
            if k.len() != nx {
                return Err(IntegratorError::dimension("dynamics output", nx, k.len()));
            }
            Ok(k)
        };

        let mut ks = vec![derivative(0.0, t, x)?];
        for stage in &self.tableau.stages {
            let t_s = t + &(h * stage.c);
            let x_s = x + &combine(&stage.numerators, &ks, nx).scale(&(h / stage.denominator));
            ks.push(derivative(stage.c, &t_s, &x_s)?);
        }
        let increment = combine(&self.tableau.weights, &ks, nx);
        Ok(x + &increment.scale(&(h / self.tableau.weight_denominator)))
    }

    /// Symbolic end state and trajectory of the interval.
    pub fn outputs(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<SchemeOutputs, IntegratorError> {
        let model: &dyn IntegrationModel = options.model.as_ref();
        let h = ode.dt() / (self.n_steps as f64);
        let a = ode.a_start();
        let mut x = ode.x[0].clone();
        let mut trajectory = Vec::with_capacity(self.n_steps + 1);
        trajectory.push(x.clone());
        for i in 0..self.n_steps {
            let t = ode.t0() + &(&h * (i as f64));
            x = self.next_x(i, &t, &h, &x, ode, options.control_type, &a)?;
            if model.nb_quaternions() > 0 {
                x = model.normalize_state_quaternions(&x);
            }
            trajectory.push(x.clone());
        }
        Ok(SchemeOutputs {
            xf: x,
            xall: ExprMatrix::from_columns(trajectory),
            defects: None,
        })
    }
}

impl Scheme for RungeKutta {
    fn name(&self) -> String {
        self.method.name().to_string()
    }

    fn state_vectors(&self) -> usize {
        1
    }

    fn shape_xf(&self, nx: usize) -> (usize, usize) {
        (nx, 1)
    }

    fn shape_xall(&self, nx: usize) -> (usize, usize) {
        (nx, self.n_steps + 1)
    }

    fn time_grid(&self, t0: f64, dt: f64) -> DVector<f64> {
        linspace(t0, dt, self.n_steps + 1)
    }

    fn build_kernel(
        &self,
        ode: &OdeDescription,
        options: &IntegratorOptions,
    ) -> Result<StepKernel, IntegratorError> {
        info!(
            "explicit {} (order {}) with {} sub-steps, control {}",
            self.method.name(),
            self.method.order(),
            self.n_steps,
            options.control_type
        );
        let outputs = self.outputs(ode, options)?;
        graph_kernel(self.method.name(), ode, outputs, options.backend)
    }
}
