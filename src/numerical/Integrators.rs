/// Step functions of one interval of a transcribed optimal-control problem.
///
/// Example#1
/// ```rust, ignore
///    // state x0' = x1, x1' = -x0 + u0, held control, 10 RK4 sub-steps
///    let model = Arc::new(QuaternionModel::new(2, 1));
///    let dynamics = Arc::new(SymbolicDynamics::from_strings(&["x1", "-x0 + u0"], None)?);
///    let options = IntegratorOptions::new(model)
///        .with_integrator(IntegratorType::RK4)
///        .with_finite_elements(10);
///    let step = StepFunction::from_dynamics(dynamics, &options)?;
///    let out = step.call(&StepArguments::new(
///        DVector::from_vec(vec![0.0, 0.5]),
///        DMatrix::from_vec(2, 1, vec![1.0, 0.0]),
///        DMatrix::from_element(1, 1, 0.2),
///        DVector::zeros(0),
///        DMatrix::zeros(0, 1),
///    ))?;
///    println!("xf = {}", out.xf);
/// ```
/// Example#2
/// ```rust, ignore
///    // the same problem, options from a TOML table
///    let options = IntegratorOptions::from_toml_str(model, "integrator = \"irk\"\ndegree = 3")?;
///    let step = StepFunction::from_dynamics(dynamics, &options)?;
///    let dxf_dx0 = step.jacobian_xf(StepInput::X0, &args)?;
/// ```
pub mod step_function;
/// the closed set of schemes behind one trait
pub mod scheme;
/// options, policies and their string forms
pub mod integrator_api;
pub mod integrator_error;
/// dynamics and model collaborators, symbolic interval inputs
pub mod dynamics;
/// control value at a stage time
pub mod control_interpolation;
/// explicit fixed-step Runge-Kutta: RK1, RK2, RK4, RK8
pub mod RK_fixed;
pub mod Trapezoidal;
/// direct collocation, Legendre and Radau points
pub mod Collocation;
/// implicit Runge-Kutta built on collocation and a Newton solve
pub mod IRK;
/// steps delegated to outside solvers
pub mod External;
#[cfg(test)]
mod Integrators_tests;
