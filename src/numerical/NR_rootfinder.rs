//! Damped Newton-Raphson root-finder on compiled symbolic functions.
//!
//! Solves `F(z, params) = 0` for `z`, where `F` and its Jacobian `dF/dz` are `SymFunction`s
//! whose first input is `z` and whose remaining inputs are held fixed. Used by the
//! implicit Runge-Kutta scheme to eliminate the collocation-node states of an interval.
//!
//! Tolerances are relative to the size of the iterate, `scale = 1 + |z|_inf`, so states of
//! any magnitude converge to the same number of significant digits. Every iteration:
//! 1. stop if `|F(z)|_inf < abstol * scale`
//! 2. solve `J(z) dz = -F(z)` with an LU decomposition
//! 3. stop after the step if `|dz|_inf < steptol * scale`
//! 4. halve the step until `|F(z + lambda dz)|_inf < |F(z)|_inf`, at most
//!    `max_damping_steps` times. If no damped step decreases the residual, the iterate is
//!    accepted when `|dz|_inf < STALL_STEP * scale` (the residual sits at its rounding
//!    floor), otherwise the solve fails
//!
//! The solver never panics on failure: the report tells whether it converged.
use crate::symbolic::symbolic_error::SymbolicError;
use crate::symbolic::symbolic_function::SymFunction;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

/// Relative Newton step below which a residual that no longer decreases is rounding noise.
const STALL_STEP: f64 = 1e-8;

#[derive(Clone, Debug, PartialEq)]
pub struct RootfinderOptions {
    /// residual tolerance, relative to `1 + |z|_inf`
    pub abstol: f64,
    /// step tolerance, relative to `1 + |z|_inf`
    pub steptol: f64,
    pub max_iterations: usize,
    pub max_damping_steps: usize,
    /// return an error instead of a flagged, NaN-filled result
    pub error_on_fail: bool,
}

impl Default for RootfinderOptions {
    fn default() -> Self {
        Self {
            abstol: 1e-12,
            steptol: 1e-14,
            max_iterations: 50,
            max_damping_steps: 10,
            error_on_fail: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewtonReport {
    pub solution: DVector<f64>,
    pub iterations: usize,
    /// infinity norm of the residual at `solution`
    pub residual_norm: f64,
    pub converged: bool,
}

pub struct NewtonRootfinder<'a> {
    residual: &'a SymFunction,
    jacobian: &'a SymFunction,
    options: &'a RootfinderOptions,
}

impl<'a> NewtonRootfinder<'a> {
    pub fn new(
        residual: &'a SymFunction,
        jacobian: &'a SymFunction,
        options: &'a RootfinderOptions,
    ) -> Self {
        Self {
            residual,
            jacobian,
            options,
        }
    }

    fn eval(
        &self,
        f: &SymFunction,
        z: &DVector<f64>,
        params: &[DMatrix<f64>],
    ) -> Result<DMatrix<f64>, SymbolicError> {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(DMatrix::from_column_slice(z.len(), 1, z.as_slice()));
        args.extend(params.iter().cloned());
        let mut out = f.call(&args)?;
        Ok(out.swap_remove(0))
    }

    fn residual_at(
        &self,
        z: &DVector<f64>,
        params: &[DMatrix<f64>],
    ) -> Result<DVector<f64>, SymbolicError> {
        let r = self.eval(self.residual, z, params)?;
        Ok(DVector::from_column_slice(r.as_slice()))
    }

    /// Runs the iteration from `z0`. Errors only come from malformed arguments.
    pub fn solve(
        &self,
        z0: DVector<f64>,
        params: &[DMatrix<f64>],
    ) -> Result<NewtonReport, SymbolicError> {
        let opts = self.options;
        let mut z = z0;
        let mut r = self.residual_at(&z, params)?;
        let mut error = inf_norm(&r);
        for i in 0..opts.max_iterations {
            let scale = 1.0 + inf_norm(&z);
            if error < opts.abstol * scale {
                debug!("newton converged on residual: iteration {}, error {:e}", i, error);
                return Ok(report(z, i, error, true));
            }
            let jac = self.eval(self.jacobian, &z, params)?;
            let step = match jac.lu().solve(&(-&r)) {
                Some(step) => step,
                None => {
                    warn!("singular jacobian at iteration {}, residual {:e}", i, error);
                    return Ok(report(z, i, error, false));
                }
            };
            let step_norm = inf_norm(&step);
            if step_norm < opts.steptol * scale {
                z += &step;
                r = self.residual_at(&z, params)?;
                error = inf_norm(&r);
                debug!("newton converged on step: iteration {}, error {:e}", i + 1, error);
                return Ok(report(z, i + 1, error, true));
            }
            let mut lambda = 1.0;
            let mut accepted = false;
            for k in 0..=opts.max_damping_steps {
                let trial = &z + &step * lambda;
                let r_trial = self.residual_at(&trial, params)?;
                let trial_error = inf_norm(&r_trial);
                if trial_error < error {
                    if k > 0 {
                        debug!("damped step accepted with lambda = {}", lambda);
                    }
                    z = trial;
                    r = r_trial;
                    error = trial_error;
                    accepted = true;
                    break;
                }
                lambda *= 0.5;
            }
            debug!("newton iteration {}: error {:e}, step {:e}", i + 1, error, step_norm);
            if !accepted {
                if step_norm < STALL_STEP * scale {
                    debug!(
                        "newton stalled at the rounding floor: iteration {}, error {:e}",
                        i + 1,
                        error
                    );
                    return Ok(report(z, i + 1, error, true));
                }
                warn!(
                    "no damped step decreases the residual at iteration {} (residual {:e})",
                    i + 1,
                    error
                );
                return Ok(report(z, i + 1, error, false));
            }
        }
        let converged = error < opts.abstol * (1.0 + inf_norm(&z));
        if !converged {
            warn!(
                "newton did not converge in {} iterations, residual {:e}",
                opts.max_iterations, error
            );
        }
        Ok(report(z, opts.max_iterations, error, converged))
    }
}

fn report(solution: DVector<f64>, iterations: usize, residual_norm: f64, converged: bool) -> NewtonReport {
    NewtonReport {
        solution,
        iterations,
        residual_norm,
        converged,
    }
}

/// Infinity norm; NaN entries make it NaN, so comparisons against it fail.
fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| {
        if x.is_nan() || acc.is_nan() {
            f64::NAN
        } else {
            acc.max(x.abs())
        }
    })
}
