use ahash::AHashMap;
use nalgebra::{DMatrix, DVector};

use crate::error::{DerivativeError, Result};

/// Computes local least-squares polynomial weights for samples at arbitrary offsets.
///
/// A polynomial of degree `poly_order` is fitted to samples located at `offsets`
/// (measured from the evaluation point, in time units). The returned weights `w`
/// give the `derivative`-th derivative of that polynomial at offset zero as
/// `sum(w[i] * y[i])`.
///
/// Offsets are rescaled to `[-1, 1]` before building the Vandermonde matrix so the
/// normal equations stay well conditioned for small sample spacings; the weights
/// are scaled back to physical units before returning.
///
/// # Arguments
///
/// * `offsets` - Sample positions relative to the evaluation point
/// * `poly_order` - Degree of the polynomial to fit (must be < offsets.len())
/// * `derivative` - Order of derivative to compute (0 for smoothing)
pub fn local_fit_weights(offsets: &[f64], poly_order: usize, derivative: usize) -> Result<Vec<f64>> {
    let window_size = offsets.len();
    if window_size == 0 {
        return Err(DerivativeError::invalid("window", "window contains no samples"));
    }
    if poly_order >= window_size {
        return Err(DerivativeError::invalid(
            "order",
            format!(
                "polynomial order {} must be less than window size {}",
                poly_order, window_size
            ),
        ));
    }
    if derivative > poly_order {
        return Ok(vec![0.0; window_size]);
    }

    let max_offset = offsets.iter().fold(0.0_f64, |acc, o| acc.max(o.abs()));
    let scale = if max_offset > 0.0 { max_offset } else { 1.0 };

    let mut vandermonde = DMatrix::<f64>::zeros(window_size, poly_order + 1);
    for (i, &off) in offsets.iter().enumerate() {
        let u = off / scale;
        for j in 0..=poly_order {
            vandermonde[(i, j)] = u.powi(j as i32);
        }
    }

    // A^T A c = d! e_d
    let ata = vandermonde.transpose() * &vandermonde;
    let mut rhs = DVector::<f64>::zeros(poly_order + 1);
    rhs[derivative] = (1..=derivative).fold(1.0, |acc, x| acc * x as f64);

    let coeffs_poly = ata.lu().solve(&rhs).ok_or_else(|| {
        DerivativeError::NumericalFailure("singular local polynomial system".to_string())
    })?;

    let weights = &vandermonde * coeffs_poly;
    let unscale = scale.powi(derivative as i32);
    Ok(weights.iter().map(|w| w / unscale).collect())
}

/// Memoizes local fit weights by exact offsets, polynomial order and derivative.
///
/// Uniformly sampled signals reuse a handful of offset patterns across the
/// whole lane, so a lane-sized pass mostly hits this cache.
#[derive(Default)]
pub struct CoefficientCache {
    weights: AHashMap<(Vec<u64>, usize, usize), Vec<f64>>,
}

impl CoefficientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets weights from cache or computes them if not cached
    pub fn get_weights(
        &mut self,
        offsets: &[f64],
        poly_order: usize,
        derivative: usize,
    ) -> Result<&[f64]> {
        let key = (
            offsets.iter().map(|o| o.to_bits()).collect::<Vec<_>>(),
            poly_order,
            derivative,
        );

        if !self.weights.contains_key(&key) {
            let weights = local_fit_weights(offsets, poly_order, derivative)?;
            self.weights.insert(key.clone(), weights);
        }

        Ok(self.weights[&key].as_slice())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const FIVE: [f64; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];

    #[test]
    fn test_5_point_quadratic_smoothing() {
        let weights = local_fit_weights(&FIVE, 2, 0).unwrap();
        let expected = [-3.0 / 35.0, 12.0 / 35.0, 17.0 / 35.0, 12.0 / 35.0, -3.0 / 35.0];

        for (actual, expected) in weights.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(actual, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_5_point_quadratic_first_derivative() {
        let weights = local_fit_weights(&FIVE, 2, 1).unwrap();
        let expected = [-0.2, -0.1, 0.0, 0.1, 0.2];

        for (actual, expected) in weights.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(actual, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_physical_spacing() {
        // Same stencil at spacing 0.01 must scale the derivative by 1/0.01
        let offsets: Vec<f64> = FIVE.iter().map(|o| o * 0.01).collect();
        let weights = local_fit_weights(&offsets, 2, 1).unwrap();
        assert_abs_diff_eq!(weights[4], 20.0, epsilon = 1e-8);
    }

    #[test]
    fn test_asymmetric_window_is_exact_for_cubic() {
        let offsets = [0.0, 0.1, 0.25, 0.3, 0.45, 0.6];
        let f = |x: f64| 2.0 + x - 3.0 * x * x + 0.5 * x.powi(3);
        let samples: Vec<f64> = offsets.iter().map(|&o| f(0.7 + o)).collect();

        let value: f64 = local_fit_weights(&offsets, 3, 0)
            .unwrap()
            .iter()
            .zip(&samples)
            .map(|(w, y)| w * y)
            .sum();
        let slope: f64 = local_fit_weights(&offsets, 3, 1)
            .unwrap()
            .iter()
            .zip(&samples)
            .map(|(w, y)| w * y)
            .sum();

        assert_abs_diff_eq!(value, f(0.7), epsilon = 1e-9);
        assert_abs_diff_eq!(slope, 1.0 - 6.0 * 0.7 + 1.5 * 0.49, epsilon = 1e-8);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(local_fit_weights(&[], 0, 0).is_err());
        assert!(local_fit_weights(&FIVE, 5, 0).is_err());
        assert_eq!(local_fit_weights(&FIVE, 1, 2).unwrap(), vec![0.0; 5]);
    }

    #[test]
    fn test_coefficient_cache() {
        let mut cache = CoefficientCache::new();

        let first = cache.get_weights(&FIVE, 2, 0).unwrap().to_vec();
        let second = cache.get_weights(&FIVE, 2, 0).unwrap().to_vec();
        cache.get_weights(&FIVE, 2, 1).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 2);
    }
}
