use std::rc::Rc;

use ahash::AHashMap;
use log::{debug, trace};
use ndarray::{ArrayBase, ArrayD, Data, Dimension};

use crate::cache::CacheInfo;
use crate::error::{DerivativeError, Result};
use crate::kind::Kind;
use crate::method::Method;
use crate::params::Value;

/// Axis used when a call does not name one.
pub const DEFAULT_AXIS: usize = 1;

/// The argument form of one factory request.
///
/// Positional arguments bind in order to `kind` and `axis`; everything else is
/// passed by keyword. The form is part of the instance cache key: spelling the
/// same argument positionally or by keyword yields different keys.
///
/// # Example
///
/// ```rust
/// use signal_derivative::Call;
///
/// let positional = Call::new().arg("finite_difference").arg(1).kwarg("k", 1);
/// let keyword = Call::new().arg("finite_difference").kwarg("axis", 1).kwarg("k", 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Call {
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
}

impl Call {
    pub fn new() -> Self {
        Self::default()
    }

    /// The façade's call form: kind and axis positional, parameters by keyword.
    pub fn positional<K: Into<Value>>(kind: K, axis: usize, params: &[(&str, Value)]) -> Self {
        params
            .iter()
            .fold(Self::new().arg(kind).arg(axis), |call, (name, value)| {
                call.kwarg(name, value.clone())
            })
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.push((name.to_string(), value.into()));
        self
    }

    /// Resolves kind, axis and the remaining keyword parameters.
    fn bind(&self) -> Result<(Kind, usize, Vec<(String, Value)>)> {
        if self.args.len() > 2 {
            return Err(DerivativeError::TooManyArguments(self.args.len()));
        }

        let mut kind = self.args.first().map(|v| v.as_kind("kind")).transpose()?;
        let mut axis = self.args.get(1).map(|v| v.as_usize("axis")).transpose()?;
        let mut params: Vec<(String, Value)> = Vec::new();

        for (name, value) in &self.kwargs {
            let seen = params.iter().any(|(n, _)| n == name)
                || (name == "kind" && kind.is_some())
                || (name == "axis" && axis.is_some());
            if seen {
                return Err(DerivativeError::DuplicateArgument(name.clone()));
            }
            match name.as_str() {
                "kind" => kind = Some(value.as_kind("kind")?),
                "axis" => axis = Some(value.as_usize("axis")?),
                _ => params.push((name.clone(), value.clone())),
            }
        }

        let kind = kind.ok_or_else(|| DerivativeError::invalid("kind", "a method kind is required"))?;
        Ok((kind, axis.unwrap_or(DEFAULT_AXIS), params))
    }
}

/// Hashable image of a [`Value`]: floats by bit pattern, filters by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Int(i64),
    Float(u64),
    Bool(bool),
    Str(String),
    Kind(Kind),
    Filter(usize),
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(v) => ValueKey::Int(*v),
            Value::Float(v) => ValueKey::Float(v.to_bits()),
            Value::Bool(v) => ValueKey::Bool(*v),
            Value::Str(v) => ValueKey::Str(v.clone()),
            Value::Kind(v) => ValueKey::Kind(*v),
            Value::Filter(v) => ValueKey::Filter(v.id()),
        }
    }
}

/// Exact call signature: signal shape, time base and argument form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignatureKey {
    shape: Vec<usize>,
    time: Vec<u64>,
    args: Vec<ValueKey>,
    kwargs: Vec<(String, ValueKey)>,
}

impl SignatureKey {
    fn new(shape: &[usize], t: &[f64], call: &Call) -> Self {
        Self {
            shape: shape.to_vec(),
            time: t.iter().map(|v| v.to_bits()).collect(),
            args: call.args.iter().map(ValueKey::from).collect(),
            kwargs: call
                .kwargs
                .iter()
                .map(|(name, value)| (name.clone(), ValueKey::from(value)))
                .collect(),
        }
    }
}

/// Maps exact call signatures to shared [`Method`] instances.
///
/// Repeating a call with the same argument form returns the same instance,
/// and with it the instance's global cache. Entries live until
/// [`MethodCache::cache_clear`]; nothing is evicted automatically.
#[derive(Default)]
pub struct MethodCache {
    instances: AHashMap<SignatureKey, Rc<Method>>,
    hits: usize,
    misses: usize,
}

impl MethodCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance for this exact signature, building it on first use.
    ///
    /// Construction errors count as a miss and leave nothing cached.
    pub fn gen_method<S, D>(&mut self, x: &ArrayBase<S, D>, t: &[f64], call: &Call) -> Result<Rc<Method>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let key = SignatureKey::new(x.shape(), t, call);
        if let Some(method) = self.instances.get(&key) {
            self.hits += 1;
            trace!("method cache hit for {}", method.kind());
            return Ok(Rc::clone(method));
        }

        self.misses += 1;
        let (kind, axis, params) = call.bind()?;
        debug!("method cache miss, building {} on axis {}", kind, axis);
        let method = Rc::new(Method::new(kind, axis, params)?);
        self.instances.insert(key, Rc::clone(&method));
        Ok(method)
    }

    /// Derivative of `x` through the cached instance for `call`.
    pub fn dxdt<S, D>(&mut self, x: &ArrayBase<S, D>, t: &[f64], call: &Call) -> Result<ArrayD<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        self.gen_method(x, t, call)?.d(x, t)
    }

    /// Smoothed `x` through the cached instance for `call`.
    pub fn smooth_x<S, D>(&mut self, x: &ArrayBase<S, D>, t: &[f64], call: &Call) -> Result<ArrayD<f64>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        self.gen_method(x, t, call)?.x(x, t)
    }

    pub fn cache_info(&self) -> CacheInfo {
        CacheInfo {
            hits: self.hits,
            misses: self.misses,
            currsize: self.instances.len(),
        }
    }

    /// Forgets every instance and resets the counters. Callers holding an
    /// `Rc<Method>` keep a working instance.
    pub fn cache_clear(&mut self) {
        self.instances.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FrequencyFilter;
    use ndarray::Array1;

    fn inputs() -> (Array1<f64>, Vec<f64>) {
        (Array1::ones(3), vec![0.0, 1.0, 2.0])
    }

    #[test]
    fn test_bind_positional_and_keyword() {
        let (kind, axis, params) = Call::new().arg("kalman").kwarg("alpha", 0.5).bind().unwrap();
        assert_eq!(kind, Kind::Kalman);
        assert_eq!(axis, DEFAULT_AXIS);
        assert_eq!(params.len(), 1);

        let (kind, axis, _) = Call::new()
            .kwarg("kind", Kind::Spline)
            .kwarg("axis", 0)
            .kwarg("s", 0.1)
            .bind()
            .unwrap();
        assert_eq!((kind, axis), (Kind::Spline, 0));
    }

    #[test]
    fn test_bind_errors() {
        let duplicate = Call::new().arg("kalman").kwarg("kind", "kalman").bind();
        assert_eq!(
            duplicate.unwrap_err(),
            DerivativeError::DuplicateArgument("kind".to_string())
        );

        let too_many = Call::new().arg("kalman").arg(1).arg(2).bind();
        assert_eq!(too_many.unwrap_err(), DerivativeError::TooManyArguments(3));

        assert!(Call::new().kwarg("alpha", 1.0).bind().unwrap_err().is_configuration());
        assert!(Call::new().arg("wavelet").bind().unwrap_err().is_configuration());
    }

    #[test]
    fn test_construction_error_is_not_cached() {
        let mut cache = MethodCache::new();
        let (x, t) = inputs();
        let call = Call::new().arg("finite_difference").arg(1).kwarg("q", 1);

        assert!(cache.gen_method(&x, &t, &call).is_err());
        assert_eq!(
            cache.cache_info(),
            CacheInfo {
                hits: 0,
                misses: 1,
                currsize: 0
            }
        );
    }

    #[test]
    fn test_float_bits_distinguish_keys() {
        let mut cache = MethodCache::new();
        let (x, t) = inputs();
        cache
            .gen_method(&x, &t, &Call::new().arg("kalman").arg(1).kwarg("alpha", 1.0))
            .unwrap();
        cache
            .gen_method(&x, &t, &Call::new().arg("kalman").arg(1).kwarg("alpha", 1))
            .unwrap();
        assert_eq!(cache.cache_info().misses, 2);
    }

    #[test]
    fn test_filter_identity_in_key() {
        let mut cache = MethodCache::new();
        let (x, t) = inputs();
        let filter = FrequencyFilter::low_pass(10.0);

        let call = Call::new().arg(Kind::Spectral).arg(1).kwarg("filter", filter.clone());
        let first = cache.gen_method(&x, &t, &call).unwrap();
        let again = Call::new().arg(Kind::Spectral).arg(1).kwarg("filter", filter);
        let second = cache.gen_method(&x, &t, &again).unwrap();
        let other = Call::new()
            .arg(Kind::Spectral)
            .arg(1)
            .kwarg("filter", FrequencyFilter::low_pass(10.0));
        let third = cache.gen_method(&x, &t, &other).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_time_base_is_part_of_key() {
        let mut cache = MethodCache::new();
        let x = Array1::<f64>::ones(3);
        let call = Call::positional(Kind::FiniteDifference, 1, &[("k", Value::Int(1))]);

        cache.gen_method(&x, &[0.0, 1.0, 2.0], &call).unwrap();
        cache.gen_method(&x, &[0.0, 1.0, 3.0], &call).unwrap();
        assert_eq!(cache.cache_info().currsize, 2);
    }
}
