use std::fmt;
use std::rc::Rc;

use crate::error::{DerivativeError, Result};
use crate::kind::Kind;

/// Gain applied to each frequency (in cycles per time unit) by the spectral method.
#[derive(Clone)]
pub struct FrequencyFilter(Rc<dyn Fn(f64) -> f64>);

impl FrequencyFilter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + 'static,
    {
        Self(Rc::new(f))
    }

    /// Ideal low-pass: gain 1 strictly below `cutoff`, 0 elsewhere.
    pub fn low_pass(cutoff: f64) -> Self {
        Self::new(move |w| if w.abs() < cutoff { 1.0 } else { 0.0 })
    }

    pub fn gain(&self, frequency: f64) -> f64 {
        (self.0)(frequency)
    }

    /// Address of the shared closure; clones of one filter share it.
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for FrequencyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrequencyFilter({:#x})", self.id())
    }
}

/// A single argument value passed to the method factory.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Kind(Kind),
    Filter(FrequencyFilter),
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Kind> for Value {
    fn from(v: Kind) -> Self {
        Value::Kind(v)
    }
}

impl From<FrequencyFilter> for Value {
    fn from(v: FrequencyFilter) -> Self {
        Value::Filter(v)
    }
}

impl Value {
    pub(crate) fn as_kind(&self, name: &str) -> Result<Kind> {
        match self {
            Value::Kind(kind) => Ok(*kind),
            Value::Str(s) => s.parse(),
            other => Err(DerivativeError::invalid(
                name,
                format!("expected a method kind, got {:?}", other),
            )),
        }
    }

    pub(crate) fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(DerivativeError::invalid(
                name,
                format!("expected a number, got {:?}", other),
            )),
        }
    }

    /// Integral floats are accepted, so `max_iter = 1e3` binds as 1000.
    pub(crate) fn as_usize(&self, name: &str) -> Result<usize> {
        let out_of_range = |v: &dyn fmt::Display| {
            DerivativeError::invalid(name, format!("expected a non-negative integer, got {}", v))
        };
        match self {
            Value::Int(v) => usize::try_from(*v).map_err(|_| out_of_range(v)),
            Value::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v < usize::MAX as f64 => {
                Ok(*v as usize)
            }
            Value::Float(v) => Err(out_of_range(v)),
            other => Err(DerivativeError::invalid(
                name,
                format!("expected a non-negative integer, got {:?}", other),
            )),
        }
    }

    pub(crate) fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(DerivativeError::invalid(
                name,
                format!("expected a boolean, got {:?}", other),
            )),
        }
    }
}

/// Consumes keyword parameters for one kind, rejecting anything left over.
pub(crate) struct ParamReader {
    kind: Kind,
    params: Vec<(String, Value)>,
}

impl ParamReader {
    pub(crate) fn new(kind: Kind, params: Vec<(String, Value)>) -> Self {
        Self { kind, params }
    }

    fn take(&mut self, name: &str) -> Option<Value> {
        let pos = self.params.iter().position(|(n, _)| n == name)?;
        Some(self.params.remove(pos).1)
    }

    pub(crate) fn f64(&mut self, name: &'static str) -> Result<Option<f64>> {
        self.take(name).map(|v| v.as_f64(name)).transpose()
    }

    pub(crate) fn usize(&mut self, name: &'static str) -> Result<Option<usize>> {
        self.take(name).map(|v| v.as_usize(name)).transpose()
    }

    pub(crate) fn bool(&mut self, name: &'static str) -> Result<Option<bool>> {
        self.take(name).map(|v| v.as_bool(name)).transpose()
    }

    pub(crate) fn filter(&mut self, name: &'static str) -> Result<Option<FrequencyFilter>> {
        match self.take(name) {
            None => Ok(None),
            Some(Value::Filter(filter)) => Ok(Some(filter)),
            Some(other) => Err(DerivativeError::invalid(
                name,
                format!("expected a frequency filter, got {:?}", other),
            )),
        }
    }

    pub(crate) fn required<T>(&self, value: Option<T>, name: &'static str) -> Result<T> {
        value.ok_or(DerivativeError::MissingParameter {
            kind: self.kind,
            name,
        })
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self.params.into_iter().next() {
            Some((name, _)) => Err(DerivativeError::UnknownParameter {
                kind: self.kind,
                name,
            }),
            None => Ok(()),
        }
    }
}
