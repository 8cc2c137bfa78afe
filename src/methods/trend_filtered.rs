use log::warn;
use nalgebra::{DMatrix, DVector};

use crate::error::{DerivativeError, Result};
use crate::params::ParamReader;

use super::{check_lane, ensure_finite, Differentiate, Fit, JointFit};

const DEFAULT_MAX_ITER: usize = 1000;
const DEFAULT_TOL: f64 = 1e-4;

/// ℓ1 trend filtering of the signal.
///
/// The signal is regressed on a truncated power basis of degree `order + 1`
/// with a knot at every interior sample, so the fitted derivative is piecewise
/// polynomial of degree `order`. The knot coefficients carry a lasso penalty
/// `alpha`; the global polynomial part is unpenalized. The problem
///
/// `minimize (1 / 2n) ||x - B w||² + alpha ||w_knots||₁`
///
/// is solved by coordinate descent on time rescaled to `[0, 1]`, capped at
/// `max_iter` sweeps.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendFiltered {
    order: usize,
    alpha: f64,
    max_iter: usize,
    tol: f64,
}

/// Design matrix pieces for one time base.
struct Basis {
    /// Unpenalized polynomial columns `u^k`
    poly: DMatrix<f64>,
    /// Penalized truncated powers `(u - u_j)_+^degree`
    knots: DMatrix<f64>,
    knot_positions: Vec<f64>,
    degree: usize,
    u: Vec<f64>,
}

impl Basis {
    fn new(t: &[f64], degree: usize) -> Self {
        let n = t.len();
        let span = t[n - 1] - t[0];
        let u: Vec<f64> = t.iter().map(|v| (v - t[0]) / span).collect();

        let poly_degree = degree.min(n - 1);
        let poly = DMatrix::from_fn(n, poly_degree + 1, |i, k| u[i].powi(k as i32));

        let knot_positions: Vec<f64> = if n > 2 { u[1..n - 1].to_vec() } else { Vec::new() };
        let knots = DMatrix::from_fn(n, knot_positions.len(), |i, j| {
            truncated_power(u[i] - knot_positions[j], degree)
        });

        Self {
            poly,
            knots,
            knot_positions,
            degree,
            u,
        }
    }
}

fn truncated_power(z: f64, degree: usize) -> f64 {
    if z > 0.0 {
        z.powi(degree as i32)
    } else {
        0.0
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

impl TrendFiltered {
    pub fn new(order: usize, alpha: f64) -> Result<Self> {
        // Basis degree order + 1 is used as a `powi` exponent
        if order.checked_add(1).and_then(|degree| i32::try_from(degree).ok()).is_none() {
            return Err(DerivativeError::invalid(
                "order",
                format!("polynomial order {} is too large", order),
            ));
        }
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(DerivativeError::invalid(
                "alpha",
                format!("regularization must be finite and non-negative, got {}", alpha),
            ));
        }
        Ok(Self {
            order,
            alpha,
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
        })
    }

    /// Caps the number of coordinate descent sweeps.
    pub fn with_max_iter(mut self, max_iter: usize) -> Result<Self> {
        if max_iter == 0 {
            return Err(DerivativeError::invalid("max_iter", "must be at least 1"));
        }
        self.max_iter = max_iter;
        Ok(self)
    }

    /// Relative coefficient change below which the descent stops.
    pub fn with_tol(mut self, tol: f64) -> Result<Self> {
        if !tol.is_finite() || tol <= 0.0 {
            return Err(DerivativeError::invalid(
                "tol",
                format!("tolerance must be finite and positive, got {}", tol),
            ));
        }
        self.tol = tol;
        Ok(self)
    }

    pub(crate) fn from_params(reader: &mut ParamReader) -> Result<Self> {
        let order = reader.usize("order")?;
        let order = reader.required(order, "order")?;
        let alpha = reader.f64("alpha")?;
        let alpha = reader.required(alpha, "alpha")?;
        let mut method = Self::new(order, alpha)?;
        if let Some(max_iter) = reader.usize("max_iter")? {
            method = method.with_max_iter(max_iter)?;
        }
        if let Some(tol) = reader.f64("tol")? {
            method = method.with_tol(tol)?;
        }
        Ok(method)
    }

    /// Coordinate descent; returns polynomial and knot weights, and whether
    /// the tolerance was met within `max_iter` sweeps.
    fn descend(&self, basis: &Basis, y: &DVector<f64>) -> Result<(DVector<f64>, Vec<f64>, bool)> {
        let n = y.len() as f64;
        let gram = basis
            .poly
            .tr_mul(&basis.poly)
            .cholesky()
            .ok_or_else(|| DerivativeError::NumericalFailure("singular polynomial trend basis".to_string()))?;
        let col_sq: Vec<f64> = basis.knots.column_iter().map(|c| c.norm_squared() / n).collect();

        let mut poly_w = DVector::<f64>::zeros(basis.poly.ncols());
        let mut knot_w = vec![0.0; basis.knots.ncols()];
        let mut residual = y.clone();

        for sweep in 1..=self.max_iter {
            let mut max_change = 0.0_f64;

            // Unpenalized block is solved exactly against the partial residual
            let partial = &residual + &basis.poly * &poly_w;
            let updated = gram.solve(&basis.poly.tr_mul(&partial));
            residual = &partial - &basis.poly * &updated;
            max_change = max_change.max((&updated - &poly_w).amax());
            poly_w = updated;

            for (j, weight) in knot_w.iter_mut().enumerate() {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let column = basis.knots.column(j);
                let rho = column.dot(&residual) / n + col_sq[j] * *weight;
                let updated = soft_threshold(rho, self.alpha) / col_sq[j];
                let change = updated - *weight;
                if change != 0.0 {
                    residual.axpy(-change, &column, 1.0);
                    *weight = updated;
                    max_change = max_change.max(change.abs());
                }
            }

            let max_weight = knot_w
                .iter()
                .fold(poly_w.amax(), |acc, w| acc.max(w.abs()));
            if max_change <= self.tol * max_weight {
                return Ok((poly_w, knot_w, true));
            }
            if !max_weight.is_finite() {
                return Err(DerivativeError::NumericalFailure(format!(
                    "trend filter diverged after {} sweeps",
                    sweep
                )));
            }
        }

        Ok((poly_w, knot_w, false))
    }
}

impl JointFit for TrendFiltered {
    fn fit(&self, x: &[f64], t: &[f64]) -> Result<Fit> {
        check_lane(x, t)?;
        let n = x.len();
        if n < 2 {
            return Ok(Fit::degenerate(x));
        }

        let basis = Basis::new(t, self.order + 1);
        let y = DVector::from_column_slice(x);
        let (poly_w, knot_w, converged) = self.descend(&basis, &y)?;
        if !converged {
            warn!(
                "trend filter did not converge within {} sweeps (alpha = {}, order = {})",
                self.max_iter, self.alpha, self.order
            );
        }

        let knot_v = DVector::from_column_slice(&knot_w);
        let values = &basis.poly * &poly_w + &basis.knots * &knot_v;

        let span = t[n - 1] - t[0];
        let slopes: Vec<f64> = basis
            .u
            .iter()
            .map(|&u| {
                let poly: f64 = (1..poly_w.len())
                    .map(|k| k as f64 * poly_w[k] * u.powi(k as i32 - 1))
                    .sum();
                let knots: f64 = basis
                    .knot_positions
                    .iter()
                    .zip(&knot_w)
                    .map(|(&knot, w)| basis.degree as f64 * w * truncated_power(u - knot, basis.degree - 1))
                    .sum();
                (poly + knots) / span
            })
            .collect();

        let values: Vec<f64> = values.iter().copied().collect();
        ensure_finite(&values, "trend filter")?;
        ensure_finite(&slopes, "trend filter")?;
        Ok(Fit {
            x: values,
            dxdt: slopes,
            converged,
        })
    }
}

impl Differentiate for TrendFiltered {
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(x, t)?.x)
    }

    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(x, t)?.dxdt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(n: usize, start: f64, end: f64) -> Vec<f64> {
        (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn test_linear_signal_is_exact() {
        let t = grid(40, -1.0, 0.0);
        let x: Vec<f64> = t.iter().map(|v| 2.0 * v + 1.0).collect();
        let fit = TrendFiltered::new(0, 0.01).unwrap().fit(&x, &t).unwrap();

        assert!(fit.converged);
        for d in &fit.dxdt {
            assert_abs_diff_eq!(*d, 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_signal_converges_immediately() {
        let t = grid(20, 0.0, 1.0);
        let fit = TrendFiltered::new(0, 0.01).unwrap().fit(&[0.0; 20], &t).unwrap();
        assert!(fit.converged);
        assert!(fit.x.iter().all(|v| *v == 0.0));
        assert!(fit.dxdt.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_kink_is_located() {
        // Piecewise linear signal with a slope change at t = 0.5
        let t = grid(41, 0.0, 1.0);
        let x: Vec<f64> = t.iter().map(|&v| if v < 0.5 { v } else { 0.5 - (v - 0.5) }).collect();
        let fit = TrendFiltered::new(0, 1e-4)
            .unwrap()
            .with_max_iter(5000)
            .unwrap()
            .fit(&x, &t)
            .unwrap();

        assert!(fit.dxdt[5] > 0.5);
        assert!(fit.dxdt[35] < -0.5);
    }

    #[test]
    fn test_iteration_cap_is_best_effort() {
        let t = grid(30, 0.0, 1.0);
        let x: Vec<f64> = t.iter().map(|v| (7.0 * v).sin()).collect();
        let fit = TrendFiltered::new(1, 1e-6)
            .unwrap()
            .with_max_iter(1)
            .unwrap()
            .fit(&x, &t)
            .unwrap();

        assert!(!fit.converged);
        assert_eq!(fit.x.len(), 30);
        assert!(fit.dxdt.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TrendFiltered::new(0, -0.1).is_err());
        assert!(TrendFiltered::new(0, 0.1).unwrap().with_max_iter(0).is_err());
        assert!(TrendFiltered::new(0, 0.1).unwrap().with_tol(0.0).is_err());
    }

    #[test]
    fn test_oversized_order_is_rejected() {
        assert!(TrendFiltered::new(usize::MAX, 0.01).unwrap_err().is_configuration());
        assert!(TrendFiltered::new(i32::MAX as usize, 0.01).is_err());
        assert!(TrendFiltered::new(i32::MAX as usize - 1, 0.01).is_ok());
    }
}
