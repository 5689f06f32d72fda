use crate::numerical::Integrators::integrator_api::ControlType;
use crate::symbolic::symbolic_error::SymbolicError;
use thiserror::Error;

/// Errors of the integrator layer. Everything except `RootfinderFailed` is raised while the
/// step function is built; evaluation only fails on bad arguments or, when requested,
/// on a root-finder that did not converge.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegratorError {
    #[error("control type {policy} is not supported by {scheme}: {reason}")]
    UnsupportedControlPolicy {
        policy: ControlType,
        scheme: String,
        reason: String,
    },
    #[error("unknown defects type '{0}', expected 'explicit' or 'implicit'")]
    UnknownDefectType(String),
    #[error("unknown integrator '{0}'")]
    UnknownIntegrator(String),
    #[error("{scheme} requires {expected} finite elements, got {found}")]
    InvalidFiniteElements {
        scheme: String,
        expected: String,
        found: usize,
    },
    #[error("collocation degree must be at least 1, got {0}")]
    InvalidDegree(usize),
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: String,
        found: String,
    },
    #[error("implicit defects requested but the dynamics provide no implicit form")]
    MissingImplicitDynamics,
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("root-finder did not converge after {iterations} iterations (residual {residual_norm:e})")]
    RootfinderFailed {
        iterations: usize,
        residual_norm: f64,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Symbolic(#[from] SymbolicError),
}

impl IntegratorError {
    pub(crate) fn dimension<W, E, F>(what: W, expected: E, found: F) -> Self
    where
        W: Into<String>,
        E: ToString,
        F: ToString,
    {
        IntegratorError::DimensionMismatch {
            what: what.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
