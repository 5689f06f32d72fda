/// damped Newton-Raphson on compiled symbolic functions
/// ```rust, ignore
///    let solver = NewtonRootfinder::new(&residual, &jacobian, &RootfinderOptions::default());
///    let report = solver.solve(z0, &[params])?;
///    assert!(report.converged);
/// ```
pub mod NR_rootfinder;
/// step functions: explicit Runge-Kutta, trapezoidal, collocation, IRK, external
pub mod Integrators;
