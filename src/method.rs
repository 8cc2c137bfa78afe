use std::rc::Rc;

use ndarray::{ArrayBase, ArrayD, ArrayView1, ArrayViewD, Axis, Data, Dimension};

use crate::cache::GlobalCache;
use crate::error::{DerivativeError, Result};
use crate::kind::Kind;
use crate::methods::{validate_time, Fit, Strategy};
use crate::params::{ParamReader, Value};

/// Both projections of a signal, shaped like the signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub x: ArrayD<f64>,
    pub dxdt: ArrayD<f64>,
    /// False when any lane stopped at an iteration cap.
    pub converged: bool,
}

/// A strategy bound to an axis and a parameter set.
///
/// Kinds whose value and derivative share one fit keep a [`GlobalCache`] so
/// asking for `x` and then `d` on the same signal runs that fit once.
///
/// `Method` is neither `Send` nor `Sync`; share it within one thread through
/// `Rc`.
pub struct Method {
    axis: usize,
    strategy: Strategy,
    global: Option<GlobalCache<Estimate>>,
}

impl Method {
    /// Builds a method from keyword parameters, rejecting any the kind does not accept.
    ///
    /// # Example
    ///
    /// ```rust
    /// use signal_derivative::{Kind, Method, Value};
    ///
    /// let method = Method::new(Kind::Kalman, 1, vec![("alpha".to_string(), Value::Float(0.5))])
    ///     .expect("Valid parameters");
    /// assert!(method.global().is_some());
    /// ```
    pub fn new(kind: Kind, axis: usize, params: Vec<(String, Value)>) -> Result<Self> {
        let strategy = Strategy::from_params(kind, ParamReader::new(kind, params))?;
        Ok(Self {
            axis,
            strategy,
            global: kind.shares_intermediate().then(GlobalCache::new),
        })
    }

    pub fn kind(&self) -> Kind {
        self.strategy.kind()
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// The shared-fit memo, for kinds that have one.
    pub fn global(&self) -> Option<&GlobalCache<Estimate>> {
        self.global.as_ref()
    }

    /// Smoothed reconstruction of `x`, same shape as `x`.
    pub fn x<S, D>(&self, x: &ArrayBase<S, D>, t: &[f64]) -> Result<ArrayD<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let view = x.view().into_dyn();
        match &self.global {
            Some(global) => Ok(global
                .get_or_try_insert_with(&view, t, || self.compute_estimate(&view, t))?
                .x
                .clone()),
            None => self.map_lanes(&view, t, |lane| self.strategy.smooth(lane, t)),
        }
    }

    /// Estimate of `dx/dt` along the bound axis, same shape as `x`.
    pub fn d<S, D>(&self, x: &ArrayBase<S, D>, t: &[f64]) -> Result<ArrayD<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let view = x.view().into_dyn();
        match &self.global {
            Some(global) => Ok(global
                .get_or_try_insert_with(&view, t, || self.compute_estimate(&view, t))?
                .dxdt
                .clone()),
            None => self.map_lanes(&view, t, |lane| self.strategy.derivative(lane, t)),
        }
    }

    /// Both projections at once. Served from the global cache when the kind has one.
    pub fn estimate<S, D>(&self, x: &ArrayBase<S, D>, t: &[f64]) -> Result<Rc<Estimate>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let view = x.view().into_dyn();
        match &self.global {
            Some(global) => global.get_or_try_insert_with(&view, t, || self.compute_estimate(&view, t)),
            None => self.compute_estimate(&view, t).map(Rc::new),
        }
    }

    /// Promotes 1-D signals to a single row and checks the axis against `t`.
    fn align<'a>(&self, x: &ArrayViewD<'a, f64>, t: &[f64]) -> Result<(ArrayViewD<'a, f64>, bool)> {
        let promoted = x.ndim() == 1;
        let aligned = if promoted {
            x.clone().insert_axis(Axis(0))
        } else {
            x.clone()
        };

        if self.axis >= aligned.ndim() {
            return Err(DerivativeError::InvalidAxis {
                axis: self.axis,
                ndim: aligned.ndim(),
            });
        }
        let signal_len = aligned.len_of(Axis(self.axis));
        if signal_len != t.len() {
            return Err(DerivativeError::ShapeMismatch {
                axis: self.axis,
                signal_len,
                time_len: t.len(),
            });
        }
        validate_time(t)?;
        Ok((aligned, promoted))
    }

    fn restore(output: ArrayD<f64>, promoted: bool) -> ArrayD<f64> {
        if promoted {
            output.index_axis_move(Axis(0), 0)
        } else {
            output
        }
    }

    fn map_lanes<F>(&self, x: &ArrayViewD<'_, f64>, t: &[f64], mut f: F) -> Result<ArrayD<f64>>
    where
        F: FnMut(&[f64]) -> Result<Vec<f64>>,
    {
        let (aligned, promoted) = self.align(x, t)?;
        let axis = Axis(self.axis);
        let mut output = ArrayD::<f64>::zeros(aligned.raw_dim());

        for (lane, mut out) in aligned.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
            let values = f(&lane.to_vec())?;
            out.assign(&ArrayView1::from(&values[..]));
        }

        Ok(Self::restore(output, promoted))
    }

    fn compute_estimate(&self, x: &ArrayViewD<'_, f64>, t: &[f64]) -> Result<Estimate> {
        let (aligned, promoted) = self.align(x, t)?;
        let axis = Axis(self.axis);
        let mut values = ArrayD::<f64>::zeros(aligned.raw_dim());
        let mut slopes = ArrayD::<f64>::zeros(aligned.raw_dim());
        let mut converged = true;

        let lanes = aligned
            .lanes(axis)
            .into_iter()
            .zip(values.lanes_mut(axis))
            .zip(slopes.lanes_mut(axis));
        for ((lane, mut value_out), mut slope_out) in lanes {
            let Fit { x, dxdt, converged: lane_converged } = self.strategy.fit(&lane.to_vec(), t)?;
            value_out.assign(&ArrayView1::from(&x[..]));
            slope_out.assign(&ArrayView1::from(&dxdt[..]));
            converged &= lane_converged;
        }

        Ok(Estimate {
            x: Self::restore(values, promoted),
            dxdt: Self::restore(slopes, promoted),
            converged,
        })
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("kind", &self.kind())
            .field("axis", &self.axis)
            .field("strategy", &self.strategy)
            .finish()
    }
}
