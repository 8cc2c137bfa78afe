use crate::error::{DerivativeError, Result};
use crate::params::ParamReader;

use super::{check_lane, Differentiate};

/// Central divided differences averaged over stencil half-widths `1..=k`.
///
/// Samples without a symmetric neighbour fall back to one-sided differences,
/// unless the lane is treated as periodic. Smoothing is the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteDifference {
    k: usize,
    periodic: bool,
}

impl FiniteDifference {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(DerivativeError::invalid("k", "stencil half-width must be at least 1"));
        }
        Ok(Self { k, periodic: false })
    }

    /// Wraps the stencil around the lane ends.
    pub fn with_periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }

    pub(crate) fn from_params(reader: &mut ParamReader) -> Result<Self> {
        let k = reader.usize("k")?;
        let k = reader.required(k, "k")?;
        let periodic = reader.bool("periodic")?.unwrap_or(false);
        Ok(Self::new(k)?.with_periodic(periodic))
    }

    fn at(&self, x: &[f64], t: &[f64], i: usize) -> f64 {
        let n = x.len();
        let reach = self.k.min(i).min(n - 1 - i);
        if reach > 0 {
            let sum: f64 = (1..=reach)
                .map(|j| (x[i + j] - x[i - j]) / (t[i + j] - t[i - j]))
                .sum();
            return sum / reach as f64;
        }

        let width = self.k.min(n - 1);
        let sum: f64 = if i == 0 {
            (1..=width).map(|j| (x[j] - x[0]) / (t[j] - t[0])).sum()
        } else {
            (1..=width)
                .map(|j| (x[i] - x[i - j]) / (t[i] - t[i - j]))
                .sum()
        };
        sum / width as f64
    }

    fn at_periodic(&self, x: &[f64], t: &[f64], i: usize) -> f64 {
        let n = x.len() as isize;
        let period = t[t.len() - 1] - t[0] + (t[t.len() - 1] - t[t.len() - 2]);
        let reach = self.k.min(((n - 1) / 2).max(1) as usize);

        // Unwrapped time of (possibly out-of-range) index m.
        let time = |m: isize| t[m.rem_euclid(n) as usize] + m.div_euclid(n) as f64 * period;
        let value = |m: isize| x[m.rem_euclid(n) as usize];

        let i = i as isize;
        let sum: f64 = (1..=reach as isize)
            .map(|j| (value(i + j) - value(i - j)) / (time(i + j) - time(i - j)))
            .sum();
        sum / reach as f64
    }
}

impl Differentiate for FiniteDifference {
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        check_lane(x, t)?;
        Ok(x.to_vec())
    }

    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        check_lane(x, t)?;
        if x.len() < 2 {
            return Ok(vec![0.0; x.len()]);
        }
        Ok((0..x.len())
            .map(|i| {
                if self.periodic {
                    self.at_periodic(x, t, i)
                } else {
                    self.at(x, t, i)
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_is_exact_everywhere() {
        let t: Vec<f64> = (0..20).map(|i| (i as f64).powf(1.3) * 0.1).collect();
        let x: Vec<f64> = t.iter().map(|&ti| 3.0 * ti - 2.0).collect();
        for k in 1..4 {
            let d = FiniteDifference::new(k).unwrap().derivative(&x, &t).unwrap();
            for value in d {
                assert_abs_diff_eq!(value, 3.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_central_difference_on_quadratic() {
        let t: Vec<f64> = (0..11).map(|i| i as f64 * 0.1).collect();
        let x: Vec<f64> = t.iter().map(|&ti| ti * ti).collect();
        let d = FiniteDifference::new(1).unwrap().derivative(&x, &t).unwrap();
        // Central differences are exact for quadratics in the interior
        for i in 1..10 {
            assert_abs_diff_eq!(d[i], 2.0 * t[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_periodic_sine() {
        let n = 64;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let omega = 2.0 * std::f64::consts::PI;
        let x: Vec<f64> = t.iter().map(|&ti| (omega * ti).sin()).collect();
        let d = FiniteDifference::new(1)
            .unwrap()
            .with_periodic(true)
            .derivative(&x, &t)
            .unwrap();
        // Endpoints benefit from wrapping just like interior samples
        assert_abs_diff_eq!(d[0], omega, epsilon = 0.02);
        assert_abs_diff_eq!(d[n - 1], omega * (omega * t[n - 1]).cos(), epsilon = 0.02);
    }

    #[test]
    fn test_smoothing_is_identity() {
        let x = [1.0, 5.0, -2.0];
        let t = [0.0, 1.0, 2.0];
        assert_eq!(FiniteDifference::new(1).unwrap().smooth(&x, &t).unwrap(), x.to_vec());
    }

    #[test]
    fn test_short_lanes() {
        let fd = FiniteDifference::new(3).unwrap();
        assert!(fd.derivative(&[], &[]).unwrap().is_empty());
        assert_eq!(fd.derivative(&[4.0], &[1.0]).unwrap(), vec![0.0]);
        assert_eq!(fd.derivative(&[0.0, 2.0], &[0.0, 1.0]).unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_zero_stencil_rejected() {
        assert!(FiniteDifference::new(0).is_err());
    }
}
