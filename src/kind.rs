use std::fmt;
use std::str::FromStr;

use crate::error::DerivativeError;

/// Tag selecting a differentiation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// Fourier filtering with an `i·ω` derivative
    Spectral,
    /// Cubic smoothing spline
    Spline,
    /// ℓ1 trend filtering
    TrendFiltered,
    /// Central divided differences
    FiniteDifference,
    /// Local least-squares polynomials
    SavitzkyGolay,
    /// Kalman filter with RTS smoothing
    Kalman,
}

impl Kind {
    /// Every supported kind, in registry order.
    pub const ALL: [Kind; 6] = [
        Kind::Spectral,
        Kind::Spline,
        Kind::TrendFiltered,
        Kind::FiniteDifference,
        Kind::SavitzkyGolay,
        Kind::Kalman,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Spectral => "spectral",
            Kind::Spline => "spline",
            Kind::TrendFiltered => "trend_filtered",
            Kind::FiniteDifference => "finite_difference",
            Kind::SavitzkyGolay => "savitzky_golay",
            Kind::Kalman => "kalman",
        }
    }

    /// Whether smoothing and differentiation come out of one shared fit,
    /// in which case instances of this kind memoize that fit.
    pub fn shares_intermediate(&self) -> bool {
        matches!(self, Kind::Spline | Kind::TrendFiltered | Kind::Kalman)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = DerivativeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DerivativeError::UnknownKind(s.to_string()))
    }
}
