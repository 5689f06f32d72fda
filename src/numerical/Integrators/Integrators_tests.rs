use crate::numerical::Integrators::External::ExternalIntegrator;
use crate::numerical::Integrators::dynamics::{
    Dynamics, FnDynamics, IntegrationModel, OdeDescription, QuaternionModel, SymbolicDynamics,
};
use crate::numerical::Integrators::integrator_api::{
    CollocationPoints, ControlType, DefectType, IntegratorOptions, IntegratorType, TrapezoidalEndState,
};
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::Integrators::step_function::{
    StepArguments, StepFunction, StepInput, StepKernel, StepOutput, StepStatus,
};
use crate::numerical::NR_rootfinder::RootfinderOptions;
use crate::symbolic::symbolic_lambdify::ExprBackend;
use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

fn model(nx: usize, nu: usize) -> Arc<dyn IntegrationModel> {
    Arc::new(QuaternionModel::new(nx, nu))
}

/// x' = -x
fn decay() -> Arc<dyn Dynamics> {
    Arc::new(SymbolicDynamics::from_strings(&["-x0"], Some(&["xdot0 + x0"])).unwrap())
}

fn args(t0: f64, dt: f64, x0: DMatrix<f64>, u: DMatrix<f64>) -> StepArguments {
    StepArguments::new(
        DVector::from_vec(vec![t0, dt]),
        x0,
        u,
        DVector::zeros(0),
        DMatrix::zeros(0, 0),
    )
}

fn scalar_args(t0: f64, dt: f64, x0: f64) -> StepArguments {
    args(t0, dt, DMatrix::from_element(1, 1, x0), DMatrix::zeros(0, 0))
}

fn decay_error(integrator: IntegratorType, n: usize) -> f64 {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(integrator)
        .with_finite_elements(n);
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    let out = step.call(&scalar_args(0.0, 1.0, 1.0)).unwrap();
    (out.xf[0] - (-1.0_f64).exp()).abs()
}

fn observed_order(integrator: IntegratorType, n: usize) -> f64 {
    let coarse = decay_error(integrator.clone(), n);
    let fine = decay_error(integrator, 2 * n);
    (coarse / fine).log2()
}

#[test]
fn test_explicit_orders() {
    let euler = observed_order(IntegratorType::RK1, 8);
    assert!(euler > 0.8 && euler < 1.2, "euler order {}", euler);
    let midpoint = observed_order(IntegratorType::RK2, 8);
    assert!(midpoint > 1.8 && midpoint < 2.3, "midpoint order {}", midpoint);
    let rk4 = observed_order(IntegratorType::RK4, 4);
    assert!(rk4 > 3.7 && rk4 < 4.4, "rk4 order {}", rk4);
    let rk8 = observed_order(IntegratorType::RK8, 2);
    assert!(rk8 >= 7.0, "rk8 order {}", rk8);
}

#[test]
fn test_rk4_accuracy_on_decay() {
    assert!(decay_error(IntegratorType::RK4, 100) < 1e-6);
    assert!(decay_error(IntegratorType::RK8, 4) < 1e-9);
}

#[test]
fn test_rk_trajectory_and_grid() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::RK4)
        .with_finite_elements(4);
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    let out = step.call(&scalar_args(1.0, 2.0, 1.0)).unwrap();
    assert_eq!(out.xall.shape(), (1, 5));
    assert_eq!(out.xall[(0, 0)], 1.0);
    assert_eq!(out.xall[(0, 4)], out.xf[0]);
    // the grid times match the columns
    let grid = step.time_grid(&DVector::from_vec(vec![1.0, 2.0])).unwrap();
    assert_eq!(grid.as_slice(), &[1.0, 1.5, 2.0, 2.5, 3.0]);
    for k in 0..5 {
        let exact = (-(grid[k] - 1.0)).exp();
        assert_relative_eq!(out.xall[(0, k)], exact, epsilon = 1e-3);
    }
    assert!(out.defects.is_none());
    assert_eq!(out.status, StepStatus::Success);
    assert!(step.time_grid(&DVector::from_vec(vec![0.0])).is_err());
}

#[test]
fn test_shapes_reported_and_produced() {
    let dynamics: Arc<dyn Dynamics> = Arc::new(
        SymbolicDynamics::from_strings(&["x1", "-x0", "x3", "-x2 + u0"], None).unwrap(),
    );
    let options = IntegratorOptions::new(model(4, 1))
        .with_integrator(IntegratorType::RK8)
        .with_finite_elements(5);
    let step = StepFunction::from_dynamics(dynamics.clone(), &options).unwrap();
    assert_eq!(step.shape_xf(), (4, 1));
    assert_eq!(step.shape_xall(), (4, 6));
    let out = step
        .call(&args(
            0.0,
            0.1,
            DMatrix::from_element(4, 1, 1.0),
            DMatrix::from_element(1, 1, 0.5),
        ))
        .unwrap();
    assert_eq!(out.xf.len(), 4);
    assert_eq!(out.xall.shape(), (4, 6));
    assert_eq!(step.input_names(), vec!["t_span", "x0", "u", "p", "a"]);
    assert_eq!(step.output_names(), &["xf".to_string(), "xall".to_string()]);
    assert_eq!(step.scheme_name(), "rk8");

    let options = IntegratorOptions::new(model(4, 1))
        .with_integrator(IntegratorType::Collocation)
        .with_degree(3)
        .with_duplicate_starting_point(true);
    let step = StepFunction::from_dynamics(dynamics, &options).unwrap();
    assert_eq!(step.shape_xf(), (4, 4));
    assert_eq!(step.shape_xall(), (4, 5));
    assert_eq!(
        step.output_names(),
        &["xf".to_string(), "xall".to_string(), "defects".to_string()]
    );
    let out = step
        .call(&args(
            0.0,
            0.1,
            DMatrix::from_element(4, 5, 1.0),
            DMatrix::from_element(1, 1, 0.5),
        ))
        .unwrap();
    assert_eq!(out.xall.ncols(), 5);
    assert_eq!(out.defects.map(|d| d.len()), Some(12));
    assert_eq!(step.time_grid(&DVector::from_vec(vec![0.0, 1.0])).unwrap().len(), 5);
}

#[test]
fn test_deterministic_and_backend_independent() {
    let dynamics: Arc<dyn Dynamics> = Arc::new(
        SymbolicDynamics::from_strings(&["x1*sin(t)", "-exp(-x0)*x1 + u0/(1 + x0^2)"], None).unwrap(),
    );
    let call_with = |backend: ExprBackend| -> StepOutput {
        let options = IntegratorOptions::new(model(2, 1))
            .with_integrator(IntegratorType::RK8)
            .with_finite_elements(3)
            .with_backend(backend);
        let step = StepFunction::from_dynamics(dynamics.clone(), &options).unwrap();
        let a = args(
            0.3,
            0.7,
            DMatrix::from_vec(2, 1, vec![0.4, -1.2]),
            DMatrix::from_element(1, 1, 2.0),
        );
        let first = step.call(&a).unwrap();
        assert_eq!(first, step.call(&a).unwrap());
        first
    };
    let tape = call_with(ExprBackend::Tape);
    let graph = call_with(ExprBackend::Graph);
    assert_eq!(tape.xf, graph.xf);
    assert_eq!(tape.xall, graph.xall);
}

#[test]
fn test_quaternion_blocks_stay_unit() {
    let model = Arc::new(
        QuaternionModel::new(5, 0)
            .with_quaternion([1, 2, 3, 4])
            .unwrap(),
    );
    // rotation plus growth: without normalization the norm would grow like exp(0.3 t)
    let dynamics: Arc<dyn Dynamics> = Arc::new(
        SymbolicDynamics::from_strings(
            &[
                "1",
                "-x2 + 0.3*x1",
                "x1 + 0.3*x2",
                "0.5*x4 + 0.3*x3",
                "-0.5*x3 + 0.3*x4",
            ],
            None,
        )
        .unwrap(),
    );
    for integrator in [IntegratorType::RK4, IntegratorType::RK8] {
        let options = IntegratorOptions::new(model.clone())
            .with_integrator(integrator)
            .with_finite_elements(5);
        let step = StepFunction::from_dynamics(dynamics.clone(), &options).unwrap();
        let x0 = DMatrix::from_vec(5, 1, vec![0.0, 0.5, 0.5, 0.5, 0.5]);
        let out = step.call(&args(0.0, 1.0, x0, DMatrix::zeros(0, 0))).unwrap();
        for k in 0..out.xall.ncols() {
            let q = out.xall.column(k);
            let norm = (1..5).map(|i| q[i] * q[i]).sum::<f64>().sqrt();
            assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
        }
        // the non-quaternion state is untouched
        assert_relative_eq!(out.xf[0], 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_linear_control_is_interpolated() {
    let dynamics: Arc<dyn Dynamics> = Arc::new(SymbolicDynamics::from_strings(&["u0"], None).unwrap());
    let u = DMatrix::from_vec(1, 2, vec![1.0, 3.0]);
    let build = |integrator: IntegratorType, n: usize| {
        let options = IntegratorOptions::new(model(1, 1))
            .with_integrator(integrator)
            .with_finite_elements(n)
            .with_control_type(ControlType::LinearContinuous);
        StepFunction::from_dynamics(dynamics.clone(), &options).unwrap()
    };
    // RK4 integrates the linear control exactly: x = x0 + dt (u0 + u1) / 2
    let out = build(IntegratorType::RK4, 3)
        .call(&args(5.0, 2.0, DMatrix::zeros(1, 1), u.clone()))
        .unwrap();
    assert_relative_eq!(out.xf[0], 4.0, epsilon = 1e-12);
    // a single Euler step only sees the control at the interval start
    let out = build(IntegratorType::RK1, 1)
        .call(&args(5.0, 2.0, DMatrix::zeros(1, 1), u))
        .unwrap();
    assert_relative_eq!(out.xf[0], 2.0, epsilon = 1e-12);
}

#[test]
fn test_constant_policies_agree() {
    let dynamics: Arc<dyn Dynamics> =
        Arc::new(SymbolicDynamics::from_strings(&["u0 - x0"], None).unwrap());
    let run = |policy: ControlType| {
        let options = IntegratorOptions::new(model(1, 1))
            .with_integrator(IntegratorType::RK4)
            .with_control_type(policy);
        let step = StepFunction::from_dynamics(dynamics.clone(), &options).unwrap();
        step.call(&args(
            0.0,
            1.0,
            DMatrix::zeros(1, 1),
            DMatrix::from_element(1, 1, 2.0),
        ))
        .unwrap()
    };
    assert_eq!(run(ControlType::Constant), run(ControlType::ConstantWithLastNode));
}

#[test]
fn test_trapezoidal_end_states() {
    let make = |end_state: TrapezoidalEndState| {
        let options = IntegratorOptions::new(model(1, 0))
            .with_integrator(IntegratorType::Trapezoidal)
            .with_trapezoidal_end_state(end_state);
        StepFunction::from_dynamics(decay(), &options).unwrap()
    };
    let x = DMatrix::from_vec(1, 2, vec![1.0, 0.5]);

    let supplied = make(TrapezoidalEndState::Supplied);
    let out = supplied.call(&args(0.0, 0.5, x.clone(), DMatrix::zeros(0, 0))).unwrap();
    // x_end - (x_start + dt/2 (f(x_start) + f(x_end))) = 0.5 - (1 - 0.25 * 1.5)
    let defects = out.defects.unwrap();
    assert_relative_eq!(defects[0], -0.125, epsilon = 1e-14);
    assert_eq!(out.xf[0], 0.5);
    assert_eq!(out.xall, DMatrix::from_vec(1, 2, vec![1.0, 0.5]));

    let recomputed = make(TrapezoidalEndState::Recomputed);
    assert_eq!(recomputed.shape_xall(), (1, 2));
    let out = recomputed.call(&args(0.0, 0.5, x, DMatrix::zeros(0, 0))).unwrap();
    assert_relative_eq!(out.xf[0], 0.625, epsilon = 1e-14);
    assert!(out.defects.is_none());
    assert_relative_eq!(out.xall[(0, 1)], 0.625, epsilon = 1e-14);

    let grid = recomputed.time_grid(&DVector::from_vec(vec![2.0, 0.5])).unwrap();
    assert_eq!(grid.as_slice(), &[2.0, 2.5]);

    // the supplied end state that satisfies the rule has no defect
    let consistent = 1.0 * (1.0 - 0.25) / (1.0 + 0.25);
    let out = supplied
        .call(&args(
            0.0,
            0.5,
            DMatrix::from_vec(1, 2, vec![1.0, consistent]),
            DMatrix::zeros(0, 0),
        ))
        .unwrap();
    assert_relative_eq!(out.defects.unwrap()[0], 0.0, epsilon = 1e-14);
}

/// x' = t^2, solution x0 + (t^3 - t0^3) / 3, a cubic that degree 3 reproduces exactly
#[test]
fn test_collocation_exact_on_cubic() {
    let dynamics: Arc<dyn Dynamics> =
        Arc::new(SymbolicDynamics::from_strings(&["t^2"], Some(&["xdot0 - t^2"])).unwrap());
    let (t0, dt, x0): (f64, f64, f64) = (0.5, 1.5, 2.0);
    let exact = |t: f64| x0 + (t.powi(3) - t0.powi(3)) / 3.0;
    for points in [CollocationPoints::Legendre, CollocationPoints::Radau] {
        for defects_type in [DefectType::Explicit, DefectType::Implicit] {
            let options = IntegratorOptions::new(model(1, 0))
                .with_integrator(IntegratorType::Collocation)
                .with_degree(3)
                .with_collocation_points(points)
                .with_defects_type(defects_type);
            let step = StepFunction::from_dynamics(dynamics.clone(), &options).unwrap();
            let grid = step.time_grid(&DVector::from_vec(vec![t0, dt])).unwrap();
            // the start and the three nodes
            let states: Vec<f64> = (0..4).map(|k| exact(grid[k])).collect();
            let out = step
                .call(&args(t0, dt, DMatrix::from_vec(1, 4, states), DMatrix::zeros(0, 0)))
                .unwrap();
            for d in out.defects.unwrap().iter() {
                assert!(d.abs() < 1e-11, "{} {} defect {}", points, defects_type, d);
            }
            assert_relative_eq!(out.xf[0], exact(t0 + dt), epsilon = 1e-11);
            assert_eq!(out.xall.shape(), (1, 4));
        }
    }
}

#[test]
fn test_collocation_duplicate_start_enters_end_state_only() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::Collocation)
        .with_degree(2)
        .with_collocation_points(CollocationPoints::Legendre)
        .with_duplicate_starting_point(true);
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    let with_start = |copy: f64| {
        step.call(&args(
            0.0,
            1.0,
            DMatrix::from_vec(1, 4, vec![1.0, copy, 0.8, 0.5]),
            DMatrix::zeros(0, 0),
        ))
        .unwrap()
    };
    let (a, b) = (with_start(1.0), with_start(3.0));
    assert_eq!(a.defects, b.defects);
    assert!((a.xf[0] - b.xf[0]).abs() > 1e-3);
}

#[test]
fn test_irk_matches_collocation() {
    let (t0, dt) = (0.0, 0.5);
    for points in [CollocationPoints::Radau, CollocationPoints::Legendre] {
        let irk_options = IntegratorOptions::new(model(1, 0))
            .with_integrator(IntegratorType::IRK)
            .with_degree(3)
            .with_collocation_points(points);
        let irk = StepFunction::from_dynamics(decay(), &irk_options).unwrap();
        assert_eq!(irk.shape_xf(), (1, 1));
        assert_eq!(irk.shape_xall(), (1, 2));
        let a = scalar_args(t0, dt, 1.0);
        let out = irk.call(&a).unwrap();
        assert!(matches!(out.status, StepStatus::Converged { .. }));
        assert_relative_eq!(out.xf[0], (-dt).exp(), epsilon = 1e-5);
        assert_eq!(out.xall.shape(), (1, 2));
        assert_eq!(out.xall[(0, 0)], 1.0);

        let z = match irk.kernel() {
            StepKernel::ImplicitKernel(kernel) => kernel.solve(&a).unwrap().solution,
            _ => panic!("irk must build an implicit kernel"),
        };
        let coll_options = irk_options.clone().with_integrator(IntegratorType::Collocation);
        let coll = StepFunction::from_dynamics(decay(), &coll_options).unwrap();
        let mut states = vec![1.0];
        states.extend(z.iter());
        let check = coll
            .call(&args(t0, dt, DMatrix::from_vec(1, 4, states), DMatrix::zeros(0, 0)))
            .unwrap();
        for d in check.defects.unwrap().iter() {
            assert!(d.abs() < 1e-11);
        }
        assert_relative_eq!(check.xf[0], out.xf[0], epsilon = 1e-12);
    }
}

#[test]
fn test_irk_jacobians() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::IRK)
        .with_degree(2)
        .with_collocation_points(CollocationPoints::Radau);
    let irk = StepFunction::from_dynamics(decay(), &options).unwrap();
    let a = scalar_args(0.0, 0.4, 1.0);
    let xf = irk.call(&a).unwrap().xf[0];
    // linear dynamics: xf is proportional to x0
    let dx0 = irk.jacobian_xf(StepInput::X0, &a).unwrap();
    assert_eq!(dx0.shape(), (1, 1));
    assert_relative_eq!(dx0[(0, 0)], xf, epsilon = 1e-10);

    let dt_span = irk.jacobian_xf(StepInput::TSpan, &a).unwrap();
    assert_eq!(dt_span.shape(), (1, 2));
    let eps = 1e-6;
    let plus = irk.call(&scalar_args(0.0, 0.4 + eps, 1.0)).unwrap().xf[0];
    let minus = irk.call(&scalar_args(0.0, 0.4 - eps, 1.0)).unwrap().xf[0];
    assert_relative_eq!(dt_span[(0, 1)], (plus - minus) / (2.0 * eps), epsilon = 1e-6);
    assert_relative_eq!(dt_span[(0, 0)], 0.0, epsilon = 1e-12);
}

#[test]
fn test_graph_jacobian() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::RK4)
        .with_finite_elements(3);
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    let a = scalar_args(0.0, 1.0, 2.0);
    let xf = step.call(&a).unwrap().xf[0];
    let dx0 = step.jacobian_xf(StepInput::X0, &a).unwrap();
    assert_relative_eq!(dx0[(0, 0)], xf / 2.0, epsilon = 1e-14);
    // repeated calls see no state from earlier ones
    assert_eq!(dx0, step.jacobian_xf(StepInput::X0, &a).unwrap());
    assert_eq!(step.jacobian_xf(StepInput::P, &a).unwrap().shape(), (1, 0));

    let compiled = step.jacobian_function(StepInput::X0).unwrap();
    let shapes: Vec<(usize, usize)> =
        (0..compiled.n_inputs()).map(|i| compiled.input_shape(i)).collect();
    assert_eq!(compiled.call(&a.to_matrices(&shapes)).unwrap()[0], dx0);

    let irk = StepFunction::from_dynamics(
        decay(),
        &IntegratorOptions::new(model(1, 0)).with_integrator(IntegratorType::IRK),
    )
    .unwrap();
    assert!(matches!(
        irk.jacobian_function(StepInput::X0),
        Err(IntegratorError::Unsupported(_))
    ));
}

#[test]
fn test_irk_failure_modes() {
    let stuck = RootfinderOptions {
        max_iterations: 0,
        ..RootfinderOptions::default()
    };
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::IRK)
        .with_degree(2)
        .with_rootfinder(stuck.clone());
    let irk = StepFunction::from_dynamics(decay(), &options).unwrap();
    let out = irk.call(&scalar_args(0.0, 0.5, 1.0)).unwrap();
    assert!(out.xf[0].is_nan());
    assert!(out.xall.iter().all(|v| v.is_nan()));
    assert!(!out.status.is_ok());

    let options = options.with_rootfinder(RootfinderOptions {
        error_on_fail: true,
        ..stuck
    });
    let irk = StepFunction::from_dynamics(decay(), &options).unwrap();
    let err = irk.call(&scalar_args(0.0, 0.5, 1.0)).unwrap_err();
    assert!(matches!(err, IntegratorError::RootfinderFailed { iterations: 0, .. }));
}

#[test]
fn test_build_errors() {
    let base = IntegratorOptions::new(model(1, 0));

    let err = StepFunction::from_dynamics(
        decay(),
        &base
            .clone()
            .with_integrator(IntegratorType::Collocation)
            .with_control_type(ControlType::LinearContinuous),
    )
    .err();
    assert!(matches!(err, Some(IntegratorError::UnsupportedControlPolicy { .. })));

    let err = StepFunction::from_dynamics(
        decay(),
        &base.clone().with_integrator(IntegratorType::IRK).with_control_type(ControlType::None),
    )
    .err();
    assert!(matches!(err, Some(IntegratorError::UnsupportedControlPolicy { .. })));

    let err = StepFunction::from_dynamics(
        decay(),
        &base.clone().with_integrator(IntegratorType::RK4).with_control_type(ControlType::None),
    )
    .err();
    assert!(matches!(err, Some(IntegratorError::UnsupportedControlPolicy { .. })));

    let explicit_only: Arc<dyn Dynamics> = Arc::new(FnDynamics::new(|_, _, x, _, _, _| x.clone()));
    for integrator in [IntegratorType::Collocation, IntegratorType::IRK] {
        let err = StepFunction::from_dynamics(
            explicit_only.clone(),
            &base
                .clone()
                .with_integrator(integrator)
                .with_defects_type(DefectType::Implicit),
        )
        .err();
        assert_eq!(err, Some(IntegratorError::MissingImplicitDynamics));
    }

    let err = StepFunction::from_dynamics(
        decay(),
        &base.clone().with_integrator(IntegratorType::Trapezoidal).with_finite_elements(3),
    )
    .err();
    assert!(matches!(err, Some(IntegratorError::InvalidFiniteElements { found: 3, .. })));

    let err = StepFunction::from_dynamics(
        decay(),
        &base.clone().with_integrator(IntegratorType::RK2).with_finite_elements(0),
    )
    .err();
    assert!(matches!(err, Some(IntegratorError::InvalidFiniteElements { found: 0, .. })));

    let err = StepFunction::from_dynamics(
        decay(),
        &base.clone().with_integrator(IntegratorType::Collocation).with_degree(0),
    )
    .err();
    assert_eq!(err, Some(IntegratorError::InvalidDegree(0)));

    // symbols laid out for RK4 do not fit the trapezoidal scheme
    let ode = OdeDescription::symbolic(decay(), &base);
    let err = StepFunction::build(&ode, &base.clone().with_integrator(IntegratorType::Trapezoidal)).err();
    assert!(matches!(err, Some(IntegratorError::DimensionMismatch { .. })));

    // the model says two states, the symbols have one
    let err = StepFunction::build(&ode, &IntegratorOptions::new(model(2, 0))).err();
    assert!(matches!(err, Some(IntegratorError::DimensionMismatch { .. })));
}

#[test]
fn test_call_argument_errors() {
    let options = IntegratorOptions::new(model(2, 0)).with_integrator(IntegratorType::RK4);
    let dynamics: Arc<dyn Dynamics> = Arc::new(SymbolicDynamics::from_strings(&["x1", "-x0"], None).unwrap());
    let step = StepFunction::from_dynamics(dynamics, &options).unwrap();
    let err = step.call(&scalar_args(0.0, 1.0, 1.0)).unwrap_err();
    assert!(matches!(err, IntegratorError::Symbolic(_)));
}

#[test]
fn test_map_runs_intervals_in_parallel() {
    let options = IntegratorOptions::new(model(1, 0)).with_integrator(IntegratorType::RK4);
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    let batch: Vec<StepArguments> = (0..8)
        .map(|k| scalar_args(k as f64 * 0.1, 0.1, 1.0 + k as f64))
        .collect();
    let mapped = step.map(batch.len());
    assert_eq!(mapped.len(), 8);
    let outs = mapped.call(&batch).unwrap();
    for (a, out) in batch.iter().zip(&outs) {
        assert_eq!(out, &step.call(a).unwrap());
    }
    assert!(matches!(
        step.map(3).call(&batch),
        Err(IntegratorError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_build_from_toml() {
    let text = r#"
        integrator = "rk4"
        number_of_finite_elements = 20
        control_type = "constant"
        backend = "graph"
    "#;
    let options = IntegratorOptions::from_toml_str(model(1, 0), text).unwrap();
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    assert_eq!(step.shape_xall(), (1, 21));
    assert_eq!(step.function().map(|f| f.backend()), Some(ExprBackend::Graph));
    let out = step.call(&scalar_args(0.0, 1.0, 1.0)).unwrap();
    assert_relative_eq!(out.xf[0], (-1.0_f64).exp(), epsilon = 1e-7);
}

/// Exact solution of x' = -x at `n` evenly spaced points.
struct ExactDecay {
    n: usize,
}

impl ExternalIntegrator for ExactDecay {
    fn name(&self) -> &str {
        "exact_decay"
    }

    fn integrate(
        &self,
        t_span: &DVector<f64>,
        x0: &DVector<f64>,
        _u: &DMatrix<f64>,
        _p: &DVector<f64>,
        _a: &DMatrix<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>), IntegratorError> {
        let dt = t_span[1];
        let columns: Vec<DVector<f64>> = (0..self.n)
            .map(|k| x0 * (-dt * k as f64 / (self.n - 1) as f64).exp())
            .collect();
        let xall = DMatrix::from_columns(&columns);
        Ok((columns[self.n - 1].clone(), xall))
    }

    fn n_output_columns(&self) -> usize {
        self.n
    }
}

#[test]
fn test_external_integrator() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::External(Arc::new(ExactDecay { n: 3 })));
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    assert_eq!(step.scheme_name(), "exact_decay");
    assert_eq!(step.shape_xall(), (1, 3));
    assert!(step.function().is_none());
    let a = scalar_args(0.0, 2.0, 1.0);
    let out = step.call(&a).unwrap();
    assert_relative_eq!(out.xf[0], (-2.0_f64).exp(), epsilon = 1e-15);
    assert_relative_eq!(out.xall[(0, 1)], (-1.0_f64).exp(), epsilon = 1e-15);
    let grid = step.time_grid(&DVector::from_vec(vec![0.0, 2.0])).unwrap();
    assert_eq!(grid.as_slice(), &[0.0, 1.0, 2.0]);
    assert!(matches!(
        step.jacobian_xf(StepInput::X0, &a),
        Err(IntegratorError::Unsupported(_))
    ));
    let mut bad = scalar_args(0.0, 2.0, 1.0);
    bad.x0 = DMatrix::zeros(2, 1);
    assert!(step.call(&bad).is_err());
}

#[test]
fn test_many_sub_steps() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::RK4)
        .with_finite_elements(5_000);
    let step = StepFunction::from_dynamics(decay(), &options).unwrap();
    let out = step.call(&scalar_args(0.0, 1.0, 1.0)).unwrap();
    assert_relative_eq!(out.xf[0], (-1.0_f64).exp(), epsilon = 1e-11);
    assert_eq!(out.xall.shape(), (1, 5_001));
    // releasing a graph thousands of sub-steps deep
    drop(step);
}

#[test]
fn test_irk_large_states() {
    let options = IntegratorOptions::new(model(1, 0))
        .with_integrator(IntegratorType::IRK)
        .with_degree(3)
        .with_collocation_points(CollocationPoints::Radau);
    let irk = StepFunction::from_dynamics(decay(), &options).unwrap();
    let unit = irk.call(&scalar_args(0.0, 0.5, 1.0)).unwrap().xf[0];
    assert_relative_eq!(unit, (-0.5_f64).exp(), epsilon = 1e-5);
    // the step is linear in x0
    for x0 in [1.0e5, 1.0e6, 1.0e9] {
        let out = irk.call(&scalar_args(0.0, 0.5, x0)).unwrap();
        assert!(matches!(out.status, StepStatus::Converged { .. }), "x0 = {}: {:?}", x0, out.status);
        assert_relative_eq!(out.xf[0], x0 * unit, max_relative = 1e-10);
    }
}

#[test]
fn test_collocation_grid_labels_columns() {
    for duplicate in [false, true] {
        let options = IntegratorOptions::new(model(1, 0))
            .with_integrator(IntegratorType::Collocation)
            .with_degree(3)
            .with_collocation_points(CollocationPoints::Radau)
            .with_duplicate_starting_point(duplicate);
        let step = StepFunction::from_dynamics(decay(), &options).unwrap();
        let columns = if duplicate { 5 } else { 4 };
        assert_eq!(step.shape_xall(), (1, columns));
        let grid = step.time_grid(&DVector::from_vec(vec![1.0, 2.0])).unwrap();
        assert_eq!(grid.len(), columns);
        let x = DMatrix::from_fn(1, columns, |_, j| (-(grid[j] - 1.0)).exp());
        let out = step.call(&args(1.0, 2.0, x.clone(), DMatrix::zeros(0, 0))).unwrap();
        assert_eq!(out.xall.shape(), step.shape_xall());
        assert_eq!(out.xall, x);
        assert_eq!(grid[0], 1.0);
        if duplicate {
            assert_eq!(grid[1], 1.0);
        }
        // right Radau: the last node is the interval end
        assert_eq!(grid[columns - 1], 3.0);
    }
}

#[test]
fn test_trapezoidal_normalizes_quaternion() {
    let model = Arc::new(
        QuaternionModel::new(5, 0)
            .with_quaternion([1, 2, 3, 4])
            .unwrap(),
    );
    let dynamics: Arc<dyn Dynamics> = Arc::new(
        SymbolicDynamics::from_strings(
            &[
                "1",
                "-x2 + 0.3*x1",
                "x1 + 0.3*x2",
                "0.5*x4 + 0.3*x3",
                "-0.5*x3 + 0.3*x4",
            ],
            None,
        )
        .unwrap(),
    );
    let options = IntegratorOptions::new(model)
        .with_integrator(IntegratorType::Trapezoidal)
        .with_trapezoidal_end_state(TrapezoidalEndState::Recomputed);
    let step = StepFunction::from_dynamics(dynamics, &options).unwrap();
    let x = DMatrix::from_vec(
        5,
        2,
        vec![0.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5],
    );
    let out = step.call(&args(0.0, 0.5, x, DMatrix::zeros(0, 0))).unwrap();
    let norm = (1..5).map(|i| out.xf[i] * out.xf[i]).sum::<f64>().sqrt();
    assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
    assert_eq!(out.xall.column(1).into_owned(), out.xf);
    // x0' = 1 is not part of the block
    assert_relative_eq!(out.xf[0], 0.5, epsilon = 1e-14);
}
