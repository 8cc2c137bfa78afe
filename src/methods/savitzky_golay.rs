use std::ops::Range;

use crate::coefficients::CoefficientCache;
use crate::error::{DerivativeError, Result};
use crate::params::ParamReader;

use super::{check_lane, Differentiate};

/// Savitzky-Golay local polynomial smoothing and differentiation.
///
/// At every sample a polynomial of degree `order` is fitted by least squares to
/// the samples in the window `[i - left, i + right]`, and its value and first
/// derivative at the sample are reported.
#[derive(Debug, Clone, PartialEq)]
pub struct SavitzkyGolay {
    /// Window extent before the sample
    left: f64,
    /// Window extent after the sample
    right: f64,
    /// Degree of the fitted polynomial
    order: usize,
    /// Window extents count samples instead of time units
    iwindow: bool,
}

impl SavitzkyGolay {
    /// Creates a new filter configuration with validation.
    ///
    /// With `iwindow` set, `left` and `right` must be whole sample counts and
    /// near the lane ends the window keeps its size by shifting inwards.
    /// Otherwise they are measured in time units and the window is truncated
    /// at the ends.
    ///
    /// # Example
    ///
    /// ```rust
    /// use signal_derivative::SavitzkyGolay;
    ///
    /// let filter = SavitzkyGolay::new(5.0, 5.0, 3, true).expect("Valid parameters");
    /// ```
    pub fn new(left: f64, right: f64, order: usize, iwindow: bool) -> Result<Self> {
        for (name, extent) in [("left", left), ("right", right)] {
            if !extent.is_finite() || extent < 0.0 {
                return Err(DerivativeError::invalid(
                    name,
                    format!("window extent must be finite and non-negative, got {}", extent),
                ));
            }
            if iwindow && extent.fract() != 0.0 {
                return Err(DerivativeError::invalid(
                    name,
                    format!("window extent must be a whole sample count, got {}", extent),
                ));
            }
        }
        if left + right == 0.0 {
            return Err(DerivativeError::invalid("left", "window must span more than one sample"));
        }
        if iwindow && Self::sample_count(left, right).is_none() {
            return Err(DerivativeError::invalid(
                "left",
                format!("window of {} + {} samples is too large", left, right),
            ));
        }
        Ok(Self {
            left,
            right,
            order,
            iwindow,
        })
    }

    pub(crate) fn from_params(reader: &mut ParamReader) -> Result<Self> {
        let left = reader.f64("left")?;
        let left = reader.required(left, "left")?;
        let right = reader.f64("right")?;
        let right = reader.required(right, "right")?;
        let order = reader.usize("order")?;
        let order = reader.required(order, "order")?;
        let iwindow = reader.bool("iwindow")?.unwrap_or(false);
        Self::new(left, right, order, iwindow)
    }

    /// Samples in an index window, `None` when it does not fit in `usize`.
    fn sample_count(left: f64, right: f64) -> Option<usize> {
        if left >= usize::MAX as f64 || right >= usize::MAX as f64 {
            return None;
        }
        (left as usize).checked_add(right as usize)?.checked_add(1)
    }

    fn window(&self, t: &[f64], center: usize) -> Range<usize> {
        let n = t.len();
        if self.iwindow {
            let before = self.left as usize;
            let size = Self::sample_count(self.left, self.right).unwrap_or(usize::MAX);
            if size >= n {
                return 0..n;
            }
            // Compute start so that [start, start + size) is within [0, n)
            let start = center.saturating_sub(before).min(n - size);
            start..start + size
        } else {
            let lo = t.partition_point(|&v| v < t[center] - self.left);
            let hi = t.partition_point(|&v| v <= t[center] + self.right);
            lo.min(center)..hi.max(center + 1)
        }
    }

    fn apply(&self, x: &[f64], t: &[f64], derivative: usize) -> Result<Vec<f64>> {
        check_lane(x, t)?;
        let mut cache = CoefficientCache::new();
        let mut result = Vec::with_capacity(x.len());

        for center in 0..x.len() {
            let window = self.window(t, center);
            let offsets: Vec<f64> = t[window.clone()].iter().map(|&v| v - t[center]).collect();
            if derivative > 0 && offsets.len() < 2 && x.len() > 1 {
                return Err(DerivativeError::invalid(
                    "left",
                    format!(
                        "window [-{}, {}] around t = {} holds a single sample, narrower than the sample spacing",
                        self.left, self.right, t[center]
                    ),
                ));
            }
            // Short windows get the highest degree they can support
            let order = self.order.min(offsets.len() - 1);
            let weights = cache.get_weights(&offsets, order, derivative)?;

            let sum: f64 = weights
                .iter()
                .zip(&x[window])
                .map(|(w, value)| w * value)
                .sum();
            result.push(sum);
        }

        Ok(result)
    }
}

impl Differentiate for SavitzkyGolay {
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        self.apply(x, t, 0)
    }

    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        self.apply(x, t, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * step).collect()
    }

    #[test]
    fn test_polynomial_preservation() {
        let filter = SavitzkyGolay::new(2.0, 2.0, 2, true).unwrap();

        // Quadratic polynomial is reproduced everywhere, edges included
        let t = grid(20, 1.0);
        let data: Vec<f64> = t.iter().map(|x| x.powi(2)).collect();
        let smoothed = filter.smooth(&data, &t).unwrap();

        for i in 0..20 {
            assert_abs_diff_eq!(data[i], smoothed[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_derivative() {
        let filter = SavitzkyGolay::new(2.0, 2.0, 3, true).unwrap();

        let t = grid(20, 0.1);
        let data: Vec<f64> = t.iter().map(|x| x.powi(3)).collect();
        let derivative = filter.derivative(&data, &t).unwrap();

        for i in 0..20 {
            assert_abs_diff_eq!(derivative[i], 3.0 * t[i].powi(2), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_time_window_on_irregular_grid() {
        let filter = SavitzkyGolay::new(0.3, 0.3, 2, false).unwrap();

        let t: Vec<f64> = (0..30).map(|i| (i as f64 * 0.1).powf(1.2)).collect();
        let data: Vec<f64> = t.iter().map(|&x| 1.0 - x + 0.5 * x * x).collect();
        let derivative = filter.derivative(&data, &t).unwrap();

        for i in 0..30 {
            assert_abs_diff_eq!(derivative[i], -1.0 + t[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_iwindow_window_shifts_inside() {
        let filter = SavitzkyGolay::new(5.0, 5.0, 3, true).unwrap();
        let t = grid(100, 0.01);
        assert_eq!(filter.window(&t, 0), 0..11);
        assert_eq!(filter.window(&t, 50), 45..56);
        assert_eq!(filter.window(&t, 99), 89..100);
    }

    #[test]
    fn test_noise_reduction() {
        let t = grid(50, 0.1);
        let true_signal: Vec<f64> = t.iter().map(|x| x.sin()).collect();

        // Deterministic "noise" for reproducible testing
        let noisy_signal: Vec<f64> = true_signal
            .iter()
            .enumerate()
            .map(|(i, v)| v + 0.1 * (i as f64 * 1.7).sin())
            .collect();

        let filter = SavitzkyGolay::new(4.0, 4.0, 3, true).unwrap();
        let smoothed = filter.smooth(&noisy_signal, &t).unwrap();

        let mse = |a: &[f64]| -> f64 {
            a.iter()
                .zip(&true_signal)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                / a.len() as f64
        };

        assert!(mse(&smoothed) < mse(&noisy_signal));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SavitzkyGolay::new(2.5, 2.0, 2, true).is_err());
        assert!(SavitzkyGolay::new(-1.0, 2.0, 2, false).is_err());
        assert!(SavitzkyGolay::new(0.0, 0.0, 0, true).is_err());
        assert!(SavitzkyGolay::new(0.25, 0.25, 2, false).is_ok());
    }

    #[test]
    fn test_short_data() {
        let filter = SavitzkyGolay::new(5.0, 5.0, 3, true).unwrap();
        let smoothed = filter.smooth(&[1.0, 2.0], &[0.0, 1.0]).unwrap();
        assert_abs_diff_eq!(smoothed[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[1], 2.0, epsilon = 1e-12);
        assert!(filter.smooth(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_window_narrower_than_spacing_is_rejected() {
        let filter = SavitzkyGolay::new(0.001, 0.001, 2, false).unwrap();
        let t = grid(100, 1.0 / 99.0);
        let data: Vec<f64> = t.iter().map(|x| 3.0 * x).collect();

        let err = filter.derivative(&data, &t).unwrap_err();
        assert!(err.is_configuration());
        // Smoothing with a single-sample window is still the sample itself
        let smoothed = filter.smooth(&data, &t).unwrap();
        assert_abs_diff_eq!(smoothed[10], data[10], epsilon = 1e-12);
    }

    #[test]
    fn test_oversized_sample_window_is_rejected() {
        let err = SavitzkyGolay::new(1e30, 1e30, 2, true).unwrap_err();
        assert!(err.is_configuration());
        let err = SavitzkyGolay::new(9.0e18, 9.5e18, 2, true).unwrap_err();
        assert!(err.is_configuration());
        // Huge time-unit extents just cover the whole lane
        assert!(SavitzkyGolay::new(1e30, 1e30, 2, false).is_ok());
    }
}
