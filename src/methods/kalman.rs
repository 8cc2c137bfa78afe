use nalgebra::{Matrix2, Vector2};

use crate::error::{DerivativeError, Result};
use crate::params::ParamReader;

use super::{check_lane, ensure_finite, Differentiate, Fit, JointFit};

/// Prior variance multiplier standing in for an uninformative initial state.
const DIFFUSE_PRIOR: f64 = 1.0e6;

/// Kalman filter with Rauch-Tung-Striebel smoothing.
///
/// The signal is modelled as the noisy position of an integrated random walk:
/// state `(position, velocity)`, unit observation noise, and a velocity
/// diffusion rate of `1 / alpha`. Larger `alpha` means smoother estimates.
/// One forward filter plus one backward pass yields both the smoothed signal
/// and its derivative.
#[derive(Debug, Clone, PartialEq)]
pub struct Kalman {
    alpha: f64,
}

/// Filtered and one-step predicted moments at one sample.
struct Step {
    predicted_mean: Vector2<f64>,
    predicted_cov: Matrix2<f64>,
    mean: Vector2<f64>,
    cov: Matrix2<f64>,
}

impl Kalman {
    pub fn new(alpha: f64) -> Result<Self> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(DerivativeError::invalid(
                "alpha",
                format!("regularization must be finite and positive, got {}", alpha),
            ));
        }
        Ok(Self { alpha })
    }

    pub(crate) fn from_params(reader: &mut ParamReader) -> Result<Self> {
        let alpha = reader.f64("alpha")?;
        Self::new(reader.required(alpha, "alpha")?)
    }

    fn transition(dt: f64) -> Matrix2<f64> {
        Matrix2::new(1.0, dt, 0.0, 1.0)
    }

    fn process_noise(&self, dt: f64) -> Matrix2<f64> {
        let q = 1.0 / self.alpha;
        Matrix2::new(
            dt.powi(3) / 3.0,
            dt.powi(2) / 2.0,
            dt.powi(2) / 2.0,
            dt,
        ) * q
    }

    fn forward(&self, x: &[f64], t: &[f64]) -> Vec<Step> {
        let n = x.len();
        let scale = 1.0 + x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).powi(2);
        let span = t[n - 1] - t[0];
        let mut mean = Vector2::new(x[0], 0.0);
        let mut cov = Matrix2::new(DIFFUSE_PRIOR * scale, 0.0, 0.0, DIFFUSE_PRIOR * scale / (span * span));

        let observation = Vector2::new(1.0, 0.0);
        let mut steps = Vec::with_capacity(n);
        for k in 0..n {
            if k > 0 {
                let dt = t[k] - t[k - 1];
                let f = Self::transition(dt);
                mean = f * mean;
                cov = f * cov * f.transpose() + self.process_noise(dt);
            }
            let (predicted_mean, predicted_cov) = (mean, cov);

            let innovation_var = cov[(0, 0)] + 1.0;
            let gain = cov.column(0) / innovation_var;
            let innovation = x[k] - mean[0];
            mean += gain * innovation;
            // Joseph form keeps the covariance symmetric positive definite
            let update = Matrix2::identity() - gain * observation.transpose();
            cov = update * cov * update.transpose() + gain * gain.transpose();

            steps.push(Step {
                predicted_mean,
                predicted_cov,
                mean,
                cov,
            });
        }
        steps
    }
}

impl JointFit for Kalman {
    fn fit(&self, x: &[f64], t: &[f64]) -> Result<Fit> {
        check_lane(x, t)?;
        let n = x.len();
        if n < 2 {
            return Ok(Fit::degenerate(x));
        }

        // Smoothed mean is linear in the data: filter at unit magnitude, then rescale
        let magnitude = x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let scale = if magnitude > 0.0 && magnitude.is_finite() { magnitude } else { 1.0 };
        let normalized: Vec<f64> = x.iter().map(|v| v / scale).collect();

        let steps = self.forward(&normalized, t);
        let mut smoothed = vec![Vector2::zeros(); n];
        smoothed[n - 1] = steps[n - 1].mean;
        for k in (0..n - 1).rev() {
            let f = Self::transition(t[k + 1] - t[k]);
            let next = &steps[k + 1];
            let inverse = next.predicted_cov.try_inverse().ok_or_else(|| {
                DerivativeError::NumericalFailure(format!("singular predicted covariance at sample {}", k + 1))
            })?;
            let smoother_gain = steps[k].cov * f.transpose() * inverse;
            smoothed[k] = steps[k].mean + smoother_gain * (smoothed[k + 1] - next.predicted_mean);
        }

        let values: Vec<f64> = smoothed.iter().map(|s| s[0] * scale).collect();
        let slopes: Vec<f64> = smoothed.iter().map(|s| s[1] * scale).collect();
        ensure_finite(&values, "kalman smoother")?;
        ensure_finite(&slopes, "kalman smoother")?;
        Ok(Fit::exact(values, slopes))
    }
}

impl Differentiate for Kalman {
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(x, t)?.x)
    }

    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fit(x, t)?.dxdt)
    }
}
