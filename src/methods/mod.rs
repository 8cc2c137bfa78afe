//! Concrete differentiation strategies and the interface they share.
//!
//! Every strategy works on one lane: a 1-D slice of samples together with its
//! time base. [`crate::Method`] lifts a strategy to n-dimensional arrays.

mod finite_difference;
mod kalman;
mod savitzky_golay;
mod spectral;
mod spline;
mod trend_filtered;

pub use finite_difference::FiniteDifference;
pub use kalman::Kalman;
pub use savitzky_golay::SavitzkyGolay;
pub use spectral::Spectral;
pub use spline::Spline;
pub use trend_filtered::TrendFiltered;

use crate::error::{DerivativeError, Result};
use crate::kind::Kind;
use crate::params::ParamReader;

/// Smoothing and differentiation of a single lane.
pub trait Differentiate {
    /// Denoised reconstruction of `x`, same length as the input.
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>>;

    /// Estimate of `dx/dt` at every sample, same length as the input.
    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>>;
}

/// Strategies whose value and derivative come out of one fit.
pub trait JointFit {
    fn fit(&self, x: &[f64], t: &[f64]) -> Result<Fit>;
}

/// Both projections of one lane fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    pub x: Vec<f64>,
    pub dxdt: Vec<f64>,
    /// False when an iterative solve stopped at its iteration cap.
    pub converged: bool,
}

impl Fit {
    pub(crate) fn exact(x: Vec<f64>, dxdt: Vec<f64>) -> Self {
        Self {
            x,
            dxdt,
            converged: true,
        }
    }

    /// Fit for lanes too short to carry any slope information.
    pub(crate) fn degenerate(x: &[f64]) -> Self {
        Self::exact(x.to_vec(), vec![0.0; x.len()])
    }
}

/// Checks that a lane and its time base line up and that time is usable.
pub(crate) fn check_lane(x: &[f64], t: &[f64]) -> Result<()> {
    if x.len() != t.len() {
        return Err(DerivativeError::ShapeMismatch {
            axis: 0,
            signal_len: x.len(),
            time_len: t.len(),
        });
    }
    validate_time(t)
}

pub(crate) fn validate_time(t: &[f64]) -> Result<()> {
    if let Some(bad) = t.iter().position(|v| !v.is_finite()) {
        return Err(DerivativeError::InvalidTime(format!(
            "non-finite value at index {}",
            bad
        )));
    }
    if let Some(i) = t.windows(2).position(|w| w[1] <= w[0]) {
        return Err(DerivativeError::InvalidTime(format!(
            "not strictly increasing at index {} ({} then {})",
            i + 1,
            t[i],
            t[i + 1]
        )));
    }
    Ok(())
}

pub(crate) fn ensure_finite(values: &[f64], what: &str) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DerivativeError::NumericalFailure(format!(
            "{} produced non-finite values",
            what
        )))
    }
}

/// A strategy resolved from its kind at instance construction.
#[derive(Debug, Clone)]
pub(crate) enum Strategy {
    Spectral(Spectral),
    Spline(Spline),
    TrendFiltered(TrendFiltered),
    FiniteDifference(FiniteDifference),
    SavitzkyGolay(SavitzkyGolay),
    Kalman(Kalman),
}

impl Strategy {
    pub(crate) fn from_params(kind: Kind, mut reader: ParamReader) -> Result<Self> {
        let strategy = match kind {
            Kind::Spectral => Strategy::Spectral(Spectral::from_params(&mut reader)?),
            Kind::Spline => Strategy::Spline(Spline::from_params(&mut reader)?),
            Kind::TrendFiltered => Strategy::TrendFiltered(TrendFiltered::from_params(&mut reader)?),
            Kind::FiniteDifference => {
                Strategy::FiniteDifference(FiniteDifference::from_params(&mut reader)?)
            }
            Kind::SavitzkyGolay => Strategy::SavitzkyGolay(SavitzkyGolay::from_params(&mut reader)?),
            Kind::Kalman => Strategy::Kalman(Kalman::from_params(&mut reader)?),
        };
        reader.finish()?;
        Ok(strategy)
    }

    pub(crate) fn kind(&self) -> Kind {
        match self {
            Strategy::Spectral(_) => Kind::Spectral,
            Strategy::Spline(_) => Kind::Spline,
            Strategy::TrendFiltered(_) => Kind::TrendFiltered,
            Strategy::FiniteDifference(_) => Kind::FiniteDifference,
            Strategy::SavitzkyGolay(_) => Kind::SavitzkyGolay,
            Strategy::Kalman(_) => Kind::Kalman,
        }
    }

    fn as_differentiate(&self) -> &dyn Differentiate {
        match self {
            Strategy::Spectral(m) => m,
            Strategy::Spline(m) => m,
            Strategy::TrendFiltered(m) => m,
            Strategy::FiniteDifference(m) => m,
            Strategy::SavitzkyGolay(m) => m,
            Strategy::Kalman(m) => m,
        }
    }

    pub(crate) fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        self.as_differentiate().smooth(x, t)
    }

    pub(crate) fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        self.as_differentiate().derivative(x, t)
    }

    /// Joint fit of one lane. Strategies without a shared fit run both
    /// projections independently.
    pub(crate) fn fit(&self, x: &[f64], t: &[f64]) -> Result<Fit> {
        match self {
            Strategy::Spline(m) => m.fit(x, t),
            Strategy::TrendFiltered(m) => m.fit(x, t),
            Strategy::Kalman(m) => m.fit(x, t),
            other => Ok(Fit::exact(other.smooth(x, t)?, other.derivative(x, t)?)),
        }
    }
}
