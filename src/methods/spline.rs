use log::warn;

use crate::error::{DerivativeError, Result};
use crate::params::ParamReader;

use super::{check_lane, ensure_finite, Differentiate, Fit, JointFit};

const MAX_BISECTIONS: usize = 200;
const MAX_BRACKET_STEPS: usize = 80;
/// Half-bandwidth of `R + λ QᵀQ`.
const BANDWIDTH: usize = 2;

/// Cubic smoothing spline with natural boundary conditions.
///
/// The roughness penalty is tuned so that the residual sum of squares of the
/// fit equals the smoothing factor `s`. `s = 0` interpolates; a large `s`
/// degrades to the least-squares line.
#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    s: f64,
}

/// Values and second derivatives at the knots for one penalty weight.
struct Solution {
    values: Vec<f64>,
    curvature: Vec<f64>,
    rss: f64,
}

/// Symmetric positive definite band matrix.
///
/// Diagonal `r` holds the elements `(i, i + r)` at index `i`.
struct SymmetricBand {
    diagonals: Vec<Vec<f64>>,
}

impl SymmetricBand {
    fn dim(&self) -> usize {
        self.diagonals[0].len()
    }

    /// Banded Cholesky `A = L Lᵀ` followed by forward and back substitution.
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.dim();
        let k = self.diagonals.len() - 1;
        // lower[r][j] is L(j + r, j)
        let mut lower: Vec<Vec<f64>> = self.diagonals.iter().map(|d| vec![0.0; d.len()]).collect();

        for j in 0..n {
            let reach = j.min(k);
            let pivot = (1..=reach).fold(self.diagonals[0][j], |acc, t| acc - lower[t][j - t].powi(2));
            if !(pivot > 0.0 && pivot.is_finite()) {
                return Err(DerivativeError::NumericalFailure(
                    "spline system is not positive definite".to_string(),
                ));
            }
            let diag = pivot.sqrt();
            lower[0][j] = diag;

            for r in 1..=k.min(n - 1 - j) {
                let entry = (1..=reach.min(k - r)).fold(self.diagonals[r][j], |acc, t| {
                    acc - lower[r + t][j - t] * lower[t][j - t]
                });
                lower[r][j] = entry / diag;
            }
        }

        let mut z = rhs.to_vec();
        for i in 0..n {
            let sum = (1..=k.min(i)).fold(z[i], |acc, r| acc - lower[r][i - r] * z[i - r]);
            z[i] = sum / lower[0][i];
        }
        for i in (0..n).rev() {
            let sum = (1..=k.min(n - 1 - i)).fold(z[i], |acc, r| acc - lower[r][i] * z[i + r]);
            z[i] = sum / lower[0][i];
        }
        Ok(z)
    }
}

/// Band pieces of the Reinsch formulation for one time base.
///
/// Column `c` of `Q` has its three nonzeros on rows `c..c + 3`; `R` is
/// tridiagonal and `QᵀQ` pentadiagonal.
struct Bands {
    h: Vec<f64>,
    q: Vec<[f64; 3]>,
    r: [Vec<f64>; 2],
    qtq: [Vec<f64>; 3],
}

impl Bands {
    fn new(t: &[f64]) -> Self {
        let h: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();
        let m = t.len() - 2;

        let q: Vec<[f64; 3]> = (0..m)
            .map(|c| [1.0 / h[c], -1.0 / h[c] - 1.0 / h[c + 1], 1.0 / h[c + 1]])
            .collect();
        let r: [Vec<f64>; 2] = [
            (0..m).map(|c| (h[c] + h[c + 1]) / 3.0).collect(),
            (0..m.saturating_sub(1)).map(|c| h[c + 1] / 6.0).collect(),
        ];
        let qtq: [Vec<f64>; 3] = [
            q.iter().map(|col| col.iter().map(|v| v * v).sum::<f64>()).collect(),
            (0..m.saturating_sub(1))
                .map(|c| q[c][1] * q[c + 1][0] + q[c][2] * q[c + 1][1])
                .collect(),
            (0..m.saturating_sub(2)).map(|c| q[c][2] * q[c + 2][0]).collect(),
        ];
        Self { h, q, r, qtq }
    }

    fn qt_mul(&self, y: &[f64]) -> Vec<f64> {
        self.q
            .iter()
            .enumerate()
            .map(|(c, col)| col[0] * y[c] + col[1] * y[c + 1] + col[2] * y[c + 2])
            .collect()
    }

    fn q_mul(&self, gamma: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.h.len() + 1];
        for (c, (col, g)) in self.q.iter().zip(gamma).enumerate() {
            for (row, v) in col.iter().enumerate() {
                out[c + row] += v * g;
            }
        }
        out
    }

    /// Solves `(R + λ QᵀQ) γ = Qᵀy`, then `g = y - λ Q γ`.
    fn solve(&self, y: &[f64], lambda: f64) -> Result<Solution> {
        let diagonals: Vec<Vec<f64>> = (0..=BANDWIDTH)
            .map(|band| {
                let roughness = self.r.get(band);
                self.qtq[band]
                    .iter()
                    .enumerate()
                    .map(|(i, v)| roughness.map_or(0.0, |r| r[i]) + lambda * v)
                    .collect::<Vec<f64>>()
            })
            .collect();
        let gamma = SymmetricBand { diagonals }.solve(&self.qt_mul(y))?;

        let residual: Vec<f64> = self.q_mul(&gamma).iter().map(|v| v * lambda).collect();
        let values: Vec<f64> = y.iter().zip(&residual).map(|(yi, ri)| yi - ri).collect();

        let mut curvature = Vec::with_capacity(y.len());
        curvature.push(0.0);
        curvature.extend(gamma);
        curvature.push(0.0);

        Ok(Solution {
            values,
            curvature,
            rss: residual.iter().map(|r| r * r).sum(),
        })
    }
}

impl Spline {
    pub fn new(s: f64) -> Result<Self> {
        if !s.is_finite() || s < 0.0 {
            return Err(DerivativeError::invalid(
                "s",
                format!("smoothing factor must be finite and non-negative, got {}", s),
            ));
        }
        Ok(Self { s })
    }

    pub(crate) fn from_params(reader: &mut ParamReader) -> Result<Self> {
        let s = reader.f64("s")?;
        Self::new(reader.required(s, "s")?)
    }

    fn line(x: &[f64], t: &[f64]) -> (Fit, f64) {
        let n = x.len() as f64;
        let t_mean = t.iter().sum::<f64>() / n;
        let x_mean = x.iter().sum::<f64>() / n;
        let sxx: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
        let sxy: f64 = t.iter().zip(x).map(|(ti, xi)| (ti - t_mean) * (xi - x_mean)).sum();
        let slope = sxy / sxx;

        let values: Vec<f64> = t.iter().map(|ti| x_mean + slope * (ti - t_mean)).collect();
        let rss = values.iter().zip(x).map(|(v, xi)| (v - xi).powi(2)).sum();
        (Fit::exact(values, vec![slope; x.len()]), rss)
    }

    /// Finds the penalty weight whose fit has `rss == s`; rss grows with λ.
    fn search(&self, bands: &Bands, y: &[f64]) -> Result<(Solution, bool)> {
        let mut lo = 1.0_f64;
        let mut hi = 1.0_f64;
        let mut steps = 0;
        while bands.solve(y, hi)?.rss < self.s && steps < MAX_BRACKET_STEPS {
            lo = hi;
            hi *= 10.0;
            steps += 1;
        }
        steps = 0;
        while bands.solve(y, lo)?.rss > self.s && steps < MAX_BRACKET_STEPS {
            hi = lo;
            lo /= 10.0;
            steps += 1;
        }

        let tolerance = 1e-8 * self.s.max(f64::MIN_POSITIVE);
        let mut best = bands.solve(y, lo)?;
        for _ in 0..MAX_BISECTIONS {
            let mid = (lo * hi).sqrt();
            let candidate = bands.solve(y, mid)?;
            if (candidate.rss - self.s).abs() <= tolerance {
                return Ok((candidate, true));
            }
            if candidate.rss < self.s {
                lo = mid;
            } else {
                hi = mid;
            }
            best = candidate;
        }
        Ok((best, false))
    }

    fn knot_slopes(bands: &Bands, values: &[f64], curvature: &[f64]) -> Vec<f64> {
        let n = values.len();
        let h = &bands.h;
        let mut slopes: Vec<f64> = (0..n - 1)
            .map(|i| {
                (values[i + 1] - values[i]) / h[i] - h[i] * (2.0 * curvature[i] + curvature[i + 1]) / 6.0
            })
            .collect();
        let last = n - 2;
        slopes.push(
            (values[n - 1] - values[last]) / h[last] + h[last] * (curvature[last] + 2.0 * curvature[n - 1]) / 6.0,
        );
        slopes
    }
}

impl JointFit for Spline {
    fn fit(&self, x: &[f64], t: &[f64]) -> Result<Fit> {
        check_lane(x, t)?;
        if x.len() < 2 {
            return Ok(Fit::degenerate(x));
        }

        let (line, line_rss) = Self::line(x, t);
        if x.len() == 2 || line_rss <= self.s {
            return Ok(line);
        }

        let bands = Bands::new(t);
        let (solution, converged) = if self.s == 0.0 {
            (bands.solve(x, 0.0)?, true)
        } else {
            self.search(&bands, x)?
        };
        if !converged {
            warn!(
                "smoothing spline did not reach s = {} within {} bisections",
                self.s, MAX_BISECTIONS
            );
        }

        let slopes = Self::knot_slopes(&bands, &solution.values, &solution.curvature);
        ensure_finite(&solution.values, "smoothing spline")?;
        ensure_finite(&slopes, "smoothing spline")?;
        Ok(Fit {
            x: solution.values,
            dxdt: slopes,
            converged,
        })
    }
}

impl Differentiate for Spline {
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(x, t)?.x)
    }

    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(x, t)?.dxdt)
    }
}
