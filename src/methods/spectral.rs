use std::f64::consts::PI;

use num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::Result;
use crate::params::{FrequencyFilter, ParamReader};

use super::{check_lane, ensure_finite, Differentiate};

/// Fourier-domain filtering and differentiation.
///
/// The lane is treated as one period of a periodic signal sampled at its mean
/// spacing; non-periodic signals should be preconditioned by the caller.
#[derive(Debug, Clone, Default)]
pub struct Spectral {
    filter: Option<FrequencyFilter>,
}

impl Spectral {
    /// All-pass spectral method.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gain applied to each frequency before reconstruction.
    pub fn with_filter(mut self, filter: FrequencyFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub(crate) fn from_params(reader: &mut ParamReader) -> Result<Self> {
        Ok(Self {
            filter: reader.filter("filter")?,
        })
    }

    /// Frequencies in cycles per time unit, in FFT output order.
    fn frequencies(n: usize, dt: f64) -> Vec<f64> {
        let positive = (n + 1) / 2;
        (0..n)
            .map(|k| {
                let k = if k < positive { k as f64 } else { k as f64 - n as f64 };
                k / (n as f64 * dt)
            })
            .collect()
    }

    fn transform(&self, x: &[f64], t: &[f64], differentiate: bool) -> Result<Vec<f64>> {
        check_lane(x, t)?;
        let n = x.len();
        if n < 2 {
            return Ok(if differentiate { vec![0.0; n] } else { x.to_vec() });
        }

        let dt = (t[n - 1] - t[0]) / (n - 1) as f64;
        let mut planner = FftPlanner::<f64>::new();
        let fft_forward = planner.plan_fft_forward(n);
        let fft_inverse = planner.plan_fft_inverse(n);

        let mut buffer: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
        fft_forward.process(&mut buffer);

        for (coeff, freq) in buffer.iter_mut().zip(Self::frequencies(n, dt)) {
            let gain = self.filter.as_ref().map_or(1.0, |f| f.gain(freq));
            *coeff *= gain;
            if differentiate {
                *coeff *= Complex::new(0.0, 2.0 * PI * freq);
            }
        }

        fft_inverse.process(&mut buffer);
        let result: Vec<f64> = buffer.iter().map(|c| c.re / n as f64).collect();
        ensure_finite(&result, "spectral filter")?;
        Ok(result)
    }
}

impl Differentiate for Spectral {
    fn smooth(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        self.transform(x, t, false)
    }

    fn derivative(&self, x: &[f64], t: &[f64]) -> Result<Vec<f64>> {
        self.transform(x, t, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn periodic_grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / n as f64).collect()
    }

    #[test]
    fn test_frequency_layout() {
        assert_eq!(Spectral::frequencies(4, 0.25), vec![0.0, 1.0, -2.0, -1.0]);
        assert_eq!(Spectral::frequencies(5, 0.2), vec![0.0, 1.0, 2.0, -2.0, -1.0]);
    }

    #[test]
    fn test_derivative_of_periodic_sine() {
        let t = periodic_grid(64);
        let omega = 2.0 * PI * 3.0;
        let x: Vec<f64> = t.iter().map(|&v| (omega * v).sin()).collect();

        let d = Spectral::new().derivative(&x, &t).unwrap();
        for (di, &ti) in d.iter().zip(&t) {
            assert_abs_diff_eq!(*di, omega * (omega * ti).cos(), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_low_pass_removes_high_harmonic() {
        let t = periodic_grid(128);
        let clean: Vec<f64> = t.iter().map(|&v| (2.0 * PI * 2.0 * v).cos()).collect();
        let x: Vec<f64> = t
            .iter()
            .zip(&clean)
            .map(|(&v, c)| c + 0.3 * (2.0 * PI * 40.0 * v).sin())
            .collect();

        let smoothed = Spectral::new()
            .with_filter(FrequencyFilter::low_pass(10.0))
            .smooth(&x, &t)
            .unwrap();
        for (s, c) in smoothed.iter().zip(&clean) {
            assert_abs_diff_eq!(s, c, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_all_pass_smoothing_is_identity() {
        let t = periodic_grid(10);
        let x: Vec<f64> = (0..10).map(|i| (i * i) as f64).collect();
        let smoothed = Spectral::new().smooth(&x, &t).unwrap();
        for (s, v) in smoothed.iter().zip(&x) {
            assert_abs_diff_eq!(s, v, epsilon = 1e-9);
        }
    }
}
