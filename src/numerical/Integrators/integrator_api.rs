//! Options of the step-function builder.
//!
//! `IntegratorOptions` can be filled in code with the `with_*` setters or read from a
//! TOML table:
//! ```toml
//! integrator = "collocation"
//! degree = 3
//! method = "radau"
//! defects_type = "explicit"
//! control_type = "constant"
//! duplicate_starting_point = true
//! backend = "tape"
//! log_level = "info"
//!
//! [rootfinder]
//! abstol = 1e-12
//! max_iterations = 30
//! ```
use crate::Utils::logger::parse_level;
use crate::numerical::Integrators::External::ExternalIntegrator;
use crate::numerical::Integrators::dynamics::IntegrationModel;
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::numerical::NR_rootfinder::RootfinderOptions;
use crate::symbolic::symbolic_lambdify::ExprBackend;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

/// How the control matrix of one interval is turned into a control value at time t.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ControlType {
    #[default]
    Constant,
    ConstantWithLastNode,
    LinearContinuous,
    None,
}

impl ControlType {
    /// Number of control columns a step function of this policy takes.
    pub fn control_columns(&self) -> usize {
        match self {
            ControlType::LinearContinuous => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DefectType {
    /// `xp_j - dt * f(t_j, x_j, ...)`
    #[default]
    Explicit,
    /// `f_impl(t_j, x_j, ..., xp_j / dt)`
    Implicit,
}

impl DefectType {
    pub fn parse(s: &str) -> Result<Self, IntegratorError> {
        DefectType::from_str(s).map_err(|_| IntegratorError::UnknownDefectType(s.to_string()))
    }
}

/// Family of collocation points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CollocationPoints {
    /// right Radau points, the last one is 1
    Radau,
    /// Legendre-Gauss points, all inside (0, 1)
    #[default]
    Legendre,
}

/// What the trapezoidal scheme exposes as its end state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TrapezoidalEndState {
    /// `xf` is `x_start + dt/2 (f_start + f_end)`
    #[default]
    Recomputed,
    /// `xf` is the supplied end state, with `defects = x_end - x_end_recomputed`
    Supplied,
}

#[derive(Clone)]
pub enum IntegratorType {
    /// forward Euler
    RK1,
    /// midpoint
    RK2,
    RK4,
    RK8,
    Trapezoidal,
    Collocation,
    IRK,
    /// step delegated to an adaptive solver outside the crate
    External(Arc<dyn ExternalIntegrator>),
}

impl IntegratorType {
    pub fn name(&self) -> &str {
        match self {
            IntegratorType::RK1 => "rk1",
            IntegratorType::RK2 => "rk2",
            IntegratorType::RK4 => "rk4",
            IntegratorType::RK8 => "rk8",
            IntegratorType::Trapezoidal => "trapezoidal",
            IntegratorType::Collocation => "collocation",
            IntegratorType::IRK => "irk",
            IntegratorType::External(external) => external.name(),
        }
    }
}

impl fmt::Debug for IntegratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegratorType::External(external) => write!(f, "External({})", external.name()),
            other => write!(f, "{}", other.name().to_uppercase()),
        }
    }
}

impl fmt::Display for IntegratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for IntegratorType {
    type Err = IntegratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rk1" => Ok(IntegratorType::RK1),
            "rk2" => Ok(IntegratorType::RK2),
            "rk4" => Ok(IntegratorType::RK4),
            "rk8" => Ok(IntegratorType::RK8),
            "trapezoidal" => Ok(IntegratorType::Trapezoidal),
            "collocation" => Ok(IntegratorType::Collocation),
            "irk" => Ok(IntegratorType::IRK),
            _ => Err(IntegratorError::UnknownIntegrator(s.to_string())),
        }
    }
}

/// Everything the builder needs besides the dynamics.
#[derive(Clone)]
pub struct IntegratorOptions {
    /// dimension counts and quaternion normalization
    pub model: Arc<dyn IntegrationModel>,
    pub integrator: IntegratorType,
    /// explicit Runge-Kutta sub-steps per interval; `None` takes the scheme default
    /// (5 for Runge-Kutta, 1 for trapezoidal)
    pub number_of_finite_elements: Option<usize>,
    pub control_type: ControlType,
    pub defects_type: DefectType,
    /// collocation and IRK polynomial degree
    pub irk_polynomial_interpolation_degree: usize,
    pub collocation_points: CollocationPoints,
    pub duplicate_starting_point: bool,
    pub backend: ExprBackend,
    pub trapezoidal_end_state: TrapezoidalEndState,
    pub rootfinder: RootfinderOptions,
    /// when set, the build installs the terminal logger at this level
    pub log_level: Option<LevelFilter>,
}

impl fmt::Debug for IntegratorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegratorOptions")
            .field("nb_states", &self.model.nb_states())
            .field("integrator", &self.integrator)
            .field("number_of_finite_elements", &self.number_of_finite_elements)
            .field("control_type", &self.control_type)
            .field("defects_type", &self.defects_type)
            .field("degree", &self.irk_polynomial_interpolation_degree)
            .field("collocation_points", &self.collocation_points)
            .field("duplicate_starting_point", &self.duplicate_starting_point)
            .field("backend", &self.backend)
            .field("trapezoidal_end_state", &self.trapezoidal_end_state)
            .field("rootfinder", &self.rootfinder)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl IntegratorOptions {
    pub fn new(model: Arc<dyn IntegrationModel>) -> Self {
        Self {
            model,
            integrator: IntegratorType::RK4,
            number_of_finite_elements: None,
            control_type: ControlType::Constant,
            defects_type: DefectType::Explicit,
            irk_polynomial_interpolation_degree: 4,
            collocation_points: CollocationPoints::Legendre,
            duplicate_starting_point: false,
            backend: ExprBackend::Tape,
            trapezoidal_end_state: TrapezoidalEndState::Recomputed,
            rootfinder: RootfinderOptions::default(),
            log_level: None,
        }
    }

    pub fn with_integrator(mut self, integrator: IntegratorType) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn with_finite_elements(mut self, n: usize) -> Self {
        self.number_of_finite_elements = Some(n);
        self
    }

    pub fn with_control_type(mut self, control_type: ControlType) -> Self {
        self.control_type = control_type;
        self
    }

    pub fn with_defects_type(mut self, defects_type: DefectType) -> Self {
        self.defects_type = defects_type;
        self
    }

    pub fn with_degree(mut self, degree: usize) -> Self {
        self.irk_polynomial_interpolation_degree = degree;
        self
    }

    pub fn with_collocation_points(mut self, points: CollocationPoints) -> Self {
        self.collocation_points = points;
        self
    }

    pub fn with_duplicate_starting_point(mut self, duplicate: bool) -> Self {
        self.duplicate_starting_point = duplicate;
        self
    }

    pub fn with_backend(mut self, backend: ExprBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_trapezoidal_end_state(mut self, end_state: TrapezoidalEndState) -> Self {
        self.trapezoidal_end_state = end_state;
        self
    }

    pub fn with_rootfinder(mut self, rootfinder: RootfinderOptions) -> Self {
        self.rootfinder = rootfinder;
        self
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Reads options from a TOML document. Keys left out keep their defaults,
    /// unknown keys and unknown enum strings are errors.
    pub fn from_toml_str(model: Arc<dyn IntegrationModel>, s: &str) -> Result<Self, IntegratorError> {
        let table = s
            .parse::<toml::Table>()
            .map_err(|e| IntegratorError::Config(e.to_string()))?;
        let mut options = IntegratorOptions::new(model);
        for (key, value) in &table {
            match key.as_str() {
                "integrator" => options.integrator = toml_str(key, value)?.parse()?,
                "number_of_finite_elements" => {
                    options.number_of_finite_elements = Some(toml_usize(key, value)?)
                }
                "control_type" => options.control_type = toml_enum(key, value)?,
                "defects_type" => options.defects_type = DefectType::parse(toml_str(key, value)?)?,
                "degree" | "irk_polynomial_interpolation_degree" => {
                    options.irk_polynomial_interpolation_degree = toml_usize(key, value)?
                }
                "method" | "collocation_points" => options.collocation_points = toml_enum(key, value)?,
                "duplicate_starting_point" => options.duplicate_starting_point = toml_bool(key, value)?,
                "backend" => options.backend = toml_enum(key, value)?,
                "trapezoidal_end_state" => options.trapezoidal_end_state = toml_enum(key, value)?,
                "log_level" => {
                    let level = toml_str(key, value)?;
                    options.log_level = Some(parse_level(level).ok_or_else(|| {
                        IntegratorError::Config(format!("unknown log level '{}'", level))
                    })?);
                }
                "rootfinder" => {
                    let sub = value.as_table().ok_or_else(|| wrong_type(key, "table"))?;
                    options.rootfinder = rootfinder_from_toml(sub)?;
                }
                _ => return Err(IntegratorError::Config(format!("unknown key '{}'", key))),
            }
        }
        Ok(options)
    }
}

fn rootfinder_from_toml(table: &toml::Table) -> Result<RootfinderOptions, IntegratorError> {
    let mut options = RootfinderOptions::default();
    for (key, value) in table {
        match key.as_str() {
            "abstol" => options.abstol = toml_f64(key, value)?,
            "steptol" => options.steptol = toml_f64(key, value)?,
            "max_iterations" => options.max_iterations = toml_usize(key, value)?,
            "max_damping_steps" => options.max_damping_steps = toml_usize(key, value)?,
            "error_on_fail" => options.error_on_fail = toml_bool(key, value)?,
            _ => {
                return Err(IntegratorError::Config(format!(
                    "unknown key 'rootfinder.{}'",
                    key
                )));
            }
        }
    }
    Ok(options)
}

fn wrong_type(key: &str, expected: &str) -> IntegratorError {
    IntegratorError::Config(format!("'{}' must be a {}", key, expected))
}

fn toml_str<'a>(key: &str, value: &'a toml::Value) -> Result<&'a str, IntegratorError> {
    value.as_str().ok_or_else(|| wrong_type(key, "string"))
}

fn toml_enum<T: FromStr>(key: &str, value: &toml::Value) -> Result<T, IntegratorError> {
    let s = toml_str(key, value)?;
    s.parse::<T>()
        .map_err(|_| IntegratorError::Config(format!("unknown value '{}' for '{}'", s, key)))
}

fn toml_usize(key: &str, value: &toml::Value) -> Result<usize, IntegratorError> {
    value
        .as_integer()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| wrong_type(key, "non-negative integer"))
}

fn toml_f64(key: &str, value: &toml::Value) -> Result<f64, IntegratorError> {
    match value {
        toml::Value::Float(f) => Ok(*f),
        toml::Value::Integer(i) => Ok(*i as f64),
        _ => Err(wrong_type(key, "number")),
    }
}

fn toml_bool(key: &str, value: &toml::Value) -> Result<bool, IntegratorError> {
    value.as_bool().ok_or_else(|| wrong_type(key, "boolean"))
}
