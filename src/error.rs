use std::fmt;

use crate::kind::Kind;

/// Error types for differentiation and smoothing operations
#[derive(Debug, Clone, PartialEq)]
pub enum DerivativeError {
    /// Signal length along the chosen axis differs from the time base length
    ShapeMismatch {
        axis: usize,
        signal_len: usize,
        time_len: usize,
    },
    /// The chosen axis does not exist on the signal
    InvalidAxis { axis: usize, ndim: usize },
    /// Time base is not finite and strictly increasing
    InvalidTime(String),
    /// Kind name does not match any registered method
    UnknownKind(String),
    /// Parameter not accepted by the selected kind
    UnknownParameter { kind: Kind, name: String },
    /// Required parameter was not supplied
    MissingParameter { kind: Kind, name: &'static str },
    /// Parameter was supplied with an unusable value
    InvalidParameter { name: String, reason: String },
    /// Same argument bound twice, positionally or by keyword
    DuplicateArgument(String),
    /// More positional arguments than the factory accepts
    TooManyArguments(usize),
    /// Singular system or non-finite solve result
    NumericalFailure(String),
}

impl DerivativeError {
    /// True for errors raised while binding or validating method parameters.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DerivativeError::UnknownKind(_)
                | DerivativeError::UnknownParameter { .. }
                | DerivativeError::MissingParameter { .. }
                | DerivativeError::InvalidParameter { .. }
                | DerivativeError::DuplicateArgument(_)
                | DerivativeError::TooManyArguments(_)
        )
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        DerivativeError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DerivativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivativeError::ShapeMismatch {
                axis,
                signal_len,
                time_len,
            } => write!(
                f,
                "Shape mismatch: signal has {} samples along axis {} but time has {}",
                signal_len, axis, time_len
            ),
            DerivativeError::InvalidAxis { axis, ndim } => {
                write!(f, "Invalid axis {} for a {}-dimensional signal", axis, ndim)
            }
            DerivativeError::InvalidTime(msg) => write!(f, "Invalid time base: {}", msg),
            DerivativeError::UnknownKind(name) => write!(f, "Unknown method kind: {}", name),
            DerivativeError::UnknownParameter { kind, name } => {
                write!(f, "Unknown parameter '{}' for method {}", name, kind)
            }
            DerivativeError::MissingParameter { kind, name } => {
                write!(f, "Missing required parameter '{}' for method {}", name, kind)
            }
            DerivativeError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            DerivativeError::DuplicateArgument(name) => {
                write!(f, "Argument '{}' given more than once", name)
            }
            DerivativeError::TooManyArguments(count) => write!(
                f,
                "Too many positional arguments: {}. At most 2 (kind, axis) are accepted",
                count
            ),
            DerivativeError::NumericalFailure(msg) => write!(f, "Numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for DerivativeError {}

/// Result type for differentiation operations
pub type Result<T> = std::result::Result<T, DerivativeError>;
