//! Implicit Runge-Kutta: collocation with the node states eliminated by a Newton solve.
//!
//! The unknowns `z = [z_1, ..., z_d]` are the node states of the collocation polynomial
//! through `x0`. For given `(t_span, x0, u, p, a)` the kernel solves `defects(z) = 0`
//! starting from `z_j = x0`, then interpolates `xf = d_0 x0 + sum_j d_j z_j`.
//! Derivatives of `xf` follow from the implicit function theorem,
//! `dz/dw = -(dF/dz)^-1 dF/dw`.
use crate::numerical::Integrators::Collocation::Collocation;
use crate::numerical::Integrators::dynamics::OdeDescription;
use crate::numerical::Integrators::integrator_api::{CollocationPoints, DefectType, IntegratorOptions};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::scheme::{Scheme, linspace};
use crate::numerical::Integrators::step_function::{
    Kernel, StepArguments, StepInput, StepKernel, StepOutput, StepStatus,
};
use crate::numerical::NR_rootfinder::{NewtonReport, NewtonRootfinder, RootfinderOptions};
use crate::symbolic::symbolic_function::{SymFunction, column};
use crate::symbolic::symbolic_vectors::ExprVector;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};

#[derive(Clone, Debug, PartialEq)]
pub struct ImplicitRungeKutta {
    collocation: Collocation,
}

impl ImplicitRungeKutta {
    pub fn new(
        degree: usize,
        points: CollocationPoints,
        defects_type: DefectType,
    ) -> Result<Self, IntegratorError> {
        Ok(Self {
            collocation: Collocation::new(degree, points, defects_type, false)?,
        })
    }

    pub fn collocation(&self) -> &Collocation {
        &self.collocation
    }
}

impl Scheme for ImplicitRungeKutta {
    fn name(&self) -> String {
        format!("irk_{}_{}", self.collocation.points, self.collocation.degree)
    }

    fn state_vectors(&self) -> usize {
        1
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
        let degree = self.collocation.degree;
        let x0 = &ode.x[0];
        let nx = x0.len();
        info!(
            "irk: degree {}, {} points, {} unknowns",
            degree,
            self.collocation.points,
            degree * nx
        );
        let z = ExprVector::indexed_vars_vector(degree * nx, "z");
        let mut states = vec![x0.clone(), x0.clone()];
        for j in 0..degree {
            states.push(z.slice(j * nx, (j + 1) * nx));
        }
        let (_, defects) = self.collocation.equations(ode, &states, options)?;
        let residual = SymFunction::new(
            format!("{}_residual", self.name()),
            vec![
                ("z", column(&z)),
                ("t_span", column(&ode.t_span)),
                ("x0", ode.x_matrix()),
                ("u", ode.u.clone()),
                ("p", column(&ode.p)),
                ("a", ode.a.clone()),
            ],
            vec![("defects", column(&defects))],
            options.backend,
        )?;
        let jacobian = residual.jacobian("defects", "z")?;
        let (_, d) = self.collocation.coefficients();
        Ok(StepKernel::ImplicitKernel(ImplicitKernel {
            residual,
            jacobian,
            d: d.to_vec(),
            nx,
            degree,
            rootfinder: options.rootfinder.clone(),
        }))
    }
}

#[derive(Clone, Debug)]
pub struct ImplicitKernel {
    /// inputs `[z, t_span, x0, u, p, a]`, output `defects`
    residual: SymFunction,
    /// `d defects / d z`
    jacobian: SymFunction,
    d: Vec<f64>,
    nx: usize,
    degree: usize,
    rootfinder: RootfinderOptions,
}

impl ImplicitKernel {
    pub fn residual(&self) -> &SymFunction {
        &self.residual
    }

    /// Arguments after `z`, conformed to the residual's input shapes.
    fn parameters(&self, args: &StepArguments) -> Vec<DMatrix<f64>> {
        let shapes: Vec<(usize, usize)> = (1..self.residual.n_inputs())
            .map(|i| self.residual.input_shape(i))
            .collect();
        args.to_matrices(&shapes)
    }

    /// Newton solve for the node states.
    pub fn solve(&self, args: &StepArguments) -> Result<NewtonReport, IntegratorError> {
        let params = self.parameters(args);
        let x0 = &params[1];
        if x0.shape() != (self.nx, 1) {
            return Err(IntegratorError::dimension(
                "x0",
                format!("{:?}", (self.nx, 1)),
                format!("{:?}", x0.shape()),
            ));
        }
        let mut z0 = DVector::zeros(self.degree * self.nx);
        for j in 0..self.degree {
            z0.rows_mut(j * self.nx, self.nx).copy_from(&x0.column(0));
        }
        let solver = NewtonRootfinder::new(&self.residual, &self.jacobian, &self.rootfinder);
        Ok(solver.solve(z0, &params)?)
    }

    fn end_state(&self, x0: &DVector<f64>, z: &DVector<f64>) -> DVector<f64> {
        let mut xf = x0 * self.d[0];
        for j in 0..self.degree {
            xf += z.rows(j * self.nx, self.nx) * self.d[j + 1];
        }
        xf
    }
}

impl Kernel for ImplicitKernel {
    fn call(&self, args: &StepArguments) -> Result<StepOutput, IntegratorError> {
        let report = self.solve(args)?;
        if !report.converged {
            if self.rootfinder.error_on_fail {
                return Err(IntegratorError::RootfinderFailed {
                    iterations: report.iterations,
                    residual_norm: report.residual_norm,
                });
            }
            warn!(
                "irk step returns NaN: no convergence after {} iterations",
                report.iterations
            );
            return Ok(StepOutput {
                xf: DVector::from_element(self.nx, f64::NAN),
                xall: DMatrix::from_element(self.nx, 2, f64::NAN),
                defects: None,
                status: StepStatus::NotConverged {
                    iterations: report.iterations,
                    residual_norm: report.residual_norm,
                },
            });
        }
        let x0 = DVector::from_column_slice(args.x0.as_slice());
        let xf = self.end_state(&x0, &report.solution);
        let xall = DMatrix::from_columns(&[x0, xf.clone()]);
        Ok(StepOutput {
            xf,
            xall,
            defects: None,
            status: StepStatus::Converged {
                iterations: report.iterations,
                residual_norm: report.residual_norm,
            },
        })
    }

    fn jacobian_xf(
        &self,
        wrt: StepInput,
        args: &StepArguments,
    ) -> Result<DMatrix<f64>, IntegratorError> {
        let report = self.solve(args)?;
        if !report.converged {
            return Err(IntegratorError::RootfinderFailed {
                iterations: report.iterations,
                residual_norm: report.residual_norm,
            });
        }
        let mut inputs = vec![DMatrix::from_column_slice(
            report.solution.len(),
            1,
            report.solution.as_slice(),
        )];
        inputs.extend(self.parameters(args));
        let j_z = self.jacobian.call(&inputs)?.swap_remove(0);
        let j_w = self
            .residual
            .jacobian("defects", wrt.name())?
            .call(&inputs)?
            .swap_remove(0);
        let dz = j_z.lu().solve(&(-j_w)).ok_or_else(|| {
            IntegratorError::Unsupported("singular collocation jacobian at the solution".to_string())
        })?;
        let nw = dz.ncols();
        let mut dxf = DMatrix::zeros(self.nx, nw);
        if wrt == StepInput::X0 {
            for i in 0..self.nx {
                dxf[(i, i)] = self.d[0];
            }
        }
        for j in 0..self.degree {
            dxf += dz.rows(j * self.nx, self.nx) * self.d[j + 1];
        }
        Ok(dxf)
    }

    fn kernel_size(&self) -> usize {
        self.residual.kernel_size() + self.jacobian.kernel_size()
    }
}
