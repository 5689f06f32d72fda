use crate::numerical::Integrators::integrator_api::ControlType;
use crate::numerical::Integrators::integrator_error::IntegratorError;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_vectors::{ExprMatrix, ExprVector};

impl ControlType {
    /// Control value at time `t` of the interval `t_span = [t0, dt]`.
    ///
    /// Constant policies return column 0 whatever the time. The linear policy blends the two
    /// columns, `u0 (1 - r) + u1 r` with `r = (t - t0) / dt`; the division stays symbolic, so a
    /// zero duration only shows up at evaluation.
    pub fn evaluate(
        &self,
        u: &ExprMatrix,
        t: &Expr,
        t_span: &ExprVector,
    ) -> Result<ExprVector, IntegratorError> {
        self.interpolate(u, || (t - &t_span[0]) / &t_span[1])
    }

    /// Same as `evaluate` when the fraction `r` of the interval is known when the graph is
    /// built. `r = 0` and `r = 1` return columns 0 and 1 exactly.
    pub fn evaluate_at_fraction(
        &self,
        u: &ExprMatrix,
        fraction: f64,
    ) -> Result<ExprVector, IntegratorError> {
        self.interpolate(u, || Expr::Const(fraction))
    }

    fn interpolate<F>(&self, u: &ExprMatrix, ratio: F) -> Result<ExprVector, IntegratorError>
    where
        F: FnOnce() -> Expr,
    {
        match self {
            ControlType::Constant | ControlType::ConstantWithLastNode => {
                if u.ncols() == 0 {
                    if u.nrows() == 0 {
                        return Ok(ExprVector::new(Vec::new()));
                    }
                    return Err(IntegratorError::dimension("control columns", ">= 1", 0));
                }
                Ok(u.column(0))
            }
            ControlType::LinearContinuous => {
                if u.ncols() != 2 {
                    return Err(IntegratorError::UnsupportedControlPolicy {
                        policy: *self,
                        scheme: "control interpolation".to_string(),
                        reason: format!("expected 2 control columns, got {}", u.ncols()),
                    });
                }
                let r = ratio();
                let (u0, u1) = (u.column(0), u.column(1));
                Ok(&u0.scale(&(1.0 - &r)) + &u1.scale(&r))
            }
            ControlType::None => Err(IntegratorError::UnsupportedControlPolicy {
                policy: *self,
                scheme: "control interpolation".to_string(),
                reason: "no interpolation is defined for this policy".to_string(),
            }),
        }
    }

    /// Collocation and IRK hold the control over the whole interval.
    pub(crate) fn require_constant(&self, scheme: &str) -> Result<(), IntegratorError> {
        match self {
            ControlType::Constant | ControlType::ConstantWithLastNode => Ok(()),
            _ => Err(IntegratorError::UnsupportedControlPolicy {
                policy: *self,
                scheme: scheme.to_string(),
                reason: "only constant controls are supported".to_string(),
            }),
        }
    }
}
