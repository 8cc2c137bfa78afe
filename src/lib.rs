//! # Signal Derivative
//!
//! Numerical differentiation and smoothing of noisy, discretely sampled signals.
//!
//! Given samples `x` observed at strictly increasing times `t`, the crate
//! estimates either a denoised reconstruction of `x` or `dx/dt`, using one of
//! six strategies:
//!
//! - `spectral`: Fourier filtering with an `i·ω` derivative
//! - `spline`: cubic smoothing spline
//! - `trend_filtered`: ℓ1 trend filtering by coordinate descent
//! - `finite_difference`: averaged central divided differences
//! - `savitzky_golay`: local least-squares polynomials
//! - `kalman`: Kalman filter with RTS smoothing
//!
//! Signals may have any number of dimensions; time runs along one axis and
//! every other axis is an independent channel.
//!
//! ## Caching
//!
//! [`MethodCache`] maps the exact form of a request to a shared [`Method`]
//! instance. Kinds whose value and derivative come out of one fit (spline,
//! trend filter, Kalman) memoize that fit per `(x, t)` inside the instance, so
//! smoothing and then differentiating the same signal runs the fit once.
//! Neither cache evicts on its own; call `cache_clear` to release memory.
//! Both are single-threaded (`Rc`/`RefCell`), and the free functions below use
//! a per-thread default cache.
//!
//! ## Example
//!
//! ```rust
//! use ndarray::Array1;
//! use signal_derivative::{dxdt, smooth_x, Kind, Value};
//!
//! let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
//! let x = Array1::from(t.iter().map(|v| v * v).collect::<Vec<_>>());
//!
//! let slope = dxdt(&x, &t, Kind::FiniteDifference, 1, &[("k", Value::Int(1))]).unwrap();
//! let smoothed = smooth_x(&x, &t, Kind::Kalman, 1, &[("alpha", Value::Float(0.5))]).unwrap();
//! assert_eq!(slope.len(), 100);
//! assert_eq!(smoothed.len(), 100);
//! ```

mod cache;
mod coefficients;
mod error;
mod factory;
mod kind;
mod method;
mod methods;
mod params;

use std::cell::RefCell;

use ndarray::{ArrayBase, ArrayD, Data, Dimension};

pub use cache::{CacheInfo, GlobalCache};
pub use coefficients::{local_fit_weights, CoefficientCache};
pub use error::{DerivativeError, Result};
pub use factory::{Call, MethodCache, DEFAULT_AXIS};
pub use kind::Kind;
pub use method::{Estimate, Method};
pub use methods::{
    Differentiate, FiniteDifference, Fit, JointFit, Kalman, SavitzkyGolay, Spectral, Spline, TrendFiltered,
};
pub use params::{FrequencyFilter, Value};

thread_local! {
    static DEFAULT_CACHE: RefCell<MethodCache> = RefCell::new(MethodCache::new());
}

/// Every supported method kind.
pub fn methods() -> &'static [Kind] {
    &Kind::ALL
}

/// Runs `f` with this thread's default method cache, the one used by
/// [`dxdt`] and [`smooth_x`]. Useful for inspecting or clearing it.
pub fn with_default_cache<R>(f: impl FnOnce(&mut MethodCache) -> R) -> R {
    DEFAULT_CACHE.with(|cache| f(&mut cache.borrow_mut()))
}

/// Estimates `dx/dt` along `axis`.
///
/// # Arguments
///
/// * `x` - The signal; time runs along `axis`
/// * `t` - Strictly increasing sample times, one per sample along `axis`
/// * `kind` - A [`Kind`] or its name
/// * `axis` - The time axis. 1-D signals are treated as a single row, so use `1`
/// * `params` - Keyword parameters for the kind
///
/// # Returns
///
/// A Result containing the derivative, same shape as `x`
pub fn dxdt<S, D, K>(x: &ArrayBase<S, D>, t: &[f64], kind: K, axis: usize, params: &[(&str, Value)]) -> Result<ArrayD<f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
    K: Into<Value>,
{
    let call = Call::positional(kind, axis, params);
    with_default_cache(|cache| cache.dxdt(x, t, &call))
}

/// Smooths `x` along `axis`. Arguments are as for [`dxdt`].
pub fn smooth_x<S, D, K>(
    x: &ArrayBase<S, D>,
    t: &[f64],
    kind: K,
    axis: usize,
    params: &[(&str, Value)],
) -> Result<ArrayD<f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
    K: Into<Value>,
{
    let call = Call::positional(kind, axis, params);
    with_default_cache(|cache| cache.smooth_x(x, t, &call))
}
