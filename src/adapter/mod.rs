//! Typed conversion of replies.
//!
//! [`FromResp`] turns a parsed [`Value`] into a caller-chosen type. Only
//! compatible kinds convert: there is no implicit truncation and no coercion
//! between numeric representations, so an `integer` reply never becomes an
//! `f64` and a `double` never becomes an `i64`.
//!
//! [`adapt`] is what the connection runs for every reply. It checks for an
//! error reply first and reports it as [`RespError::Server`] whatever the
//! target type is; only non-error replies go through [`FromResp`].
//!
//! # Example
//!
//! ```ignore
//! use resp3_client::adapter::adapt;
//! use resp3_client::protocol::Value;
//!
//! let n: i64 = adapt(Value::Integer(3))?;
//! let names: Vec<String> = adapt(Value::Array(vec!["a".into(), "b".into()]))?;
//! ```

mod impls;

use std::fmt;

use crate::error::{RespError, Result};
use crate::protocol::{Kind, Value};

pub use impls::{Attributed, KeyValues, Status};

/// Conversion from a parsed value.
///
/// Implementations should look through attribute decoration (use
/// [`Value::into_plain`]) unless the type exists to keep it.
pub trait FromResp: Sized + Send + 'static {
    fn from_resp(value: Value) -> std::result::Result<Self, AdapterError>;
}

/// Convert a reply, surfacing error replies as server errors.
pub fn adapt<T: FromResp>(value: Value) -> Result<T> {
    if let Some(err) = value.server_error() {
        return Err(RespError::Server(err));
    }
    T::from_resp(value).map_err(RespError::from)
}

/// What went wrong during a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// The value's kind cannot produce the target type.
    TypeMismatch,
    /// A null where the target type has no way to express absence.
    UnexpectedNull,
    /// A number outside the target type's range.
    ValueOutOfRange,
    /// An aggregate with the wrong number of elements.
    SizeMismatch,
    /// The right kind, but contents the target rejects.
    InvalidValue,
}

/// Step into a nested value, used to locate a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    Index(usize),
    Key(String),
}

/// A failed conversion, with the location of the offending element.
///
/// Displays as `$[1]["name"]: expected integer, got blob_string`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    kind: AdapterErrorKind,
    actual: Kind,
    expected: &'static str,
    target: &'static str,
    detail: Option<String>,
    /// Innermost step first; reversed when rendered.
    path: Vec<PathElement>,
}

impl AdapterError {
    fn new(kind: AdapterErrorKind, actual: Kind, expected: &'static str, target: &'static str) -> Self {
        Self {
            kind,
            actual,
            expected,
            target,
            detail: None,
            path: Vec::new(),
        }
    }

    /// `actual` cannot produce `T`; `expected` names the kinds that can.
    pub fn mismatch<T>(actual: Kind, expected: &'static str) -> Self {
        Self::new(
            AdapterErrorKind::TypeMismatch,
            actual,
            expected,
            std::any::type_name::<T>(),
        )
    }

    pub fn unexpected_null<T>(expected: &'static str) -> Self {
        Self::new(
            AdapterErrorKind::UnexpectedNull,
            Kind::Null,
            expected,
            std::any::type_name::<T>(),
        )
    }

    pub fn out_of_range<T>(actual: Kind, detail: impl Into<String>) -> Self {
        Self::new(
            AdapterErrorKind::ValueOutOfRange,
            actual,
            "",
            std::any::type_name::<T>(),
        )
        .with_detail(detail)
    }

    pub fn size_mismatch<T>(actual: Kind, expected: usize, got: usize) -> Self {
        Self::new(
            AdapterErrorKind::SizeMismatch,
            actual,
            "",
            std::any::type_name::<T>(),
        )
        .with_detail(format!("expected {} elements, got {}", expected, got))
    }

    pub fn invalid<T>(actual: Kind, detail: impl Into<String>) -> Self {
        Self::new(
            AdapterErrorKind::InvalidValue,
            actual,
            "",
            std::any::type_name::<T>(),
        )
        .with_detail(detail)
    }

    /// Unexpected-null or mismatch error for `value`, whichever applies.
    pub(crate) fn for_value<T>(value: &Value, expected: &'static str) -> Self {
        match value.kind() {
            Kind::Null => Self::unexpected_null::<T>(expected),
            other => Self::mismatch::<T>(other, expected),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Record that the failure happened at `index` of the enclosing value.
    pub fn at_index(mut self, index: usize) -> Self {
        self.path.push(PathElement::Index(index));
        self
    }

    /// Record that the failure happened under map key `key`.
    pub fn at_key(mut self, key: impl Into<String>) -> Self {
        self.path.push(PathElement::Key(key.into()));
        self
    }

    pub fn kind(&self) -> AdapterErrorKind {
        self.kind
    }

    /// Kind of the value that failed to convert.
    pub fn actual(&self) -> Kind {
        self.actual
    }

    /// Rust type the conversion was aiming for.
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Location, outermost step first.
    pub fn path(&self) -> impl Iterator<Item = &PathElement> {
        self.path.iter().rev()
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in self.path() {
            match step {
                PathElement::Index(i) => write!(f, "[{}]", i)?,
                PathElement::Key(k) => write!(f, "[{:?}]", k)?,
            }
        }
        f.write_str(": ")?;
        match self.kind {
            AdapterErrorKind::TypeMismatch => {
                write!(f, "expected {}, got {}", self.expected, self.actual)
            }
            AdapterErrorKind::UnexpectedNull => {
                write!(f, "unexpected null, expected {}", self.expected)
            }
            AdapterErrorKind::ValueOutOfRange
            | AdapterErrorKind::SizeMismatch
            | AdapterErrorKind::InvalidValue => {
                write!(f, "{}", self.detail.as_deref().unwrap_or("invalid value"))
            }
        }
    }
}

impl std::error::Error for AdapterError {}
