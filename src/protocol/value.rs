//! RESP3 value model.
//!
//! [`Value`] is a closed tagged union over every RESP3 kind. Attribute maps
//! never get merged into the value they decorate: a decorated value is held
//! in [`Value::Attributed`] and the metadata is reachable through
//! [`Value::attributes`] while [`Value::kind`] and the other accessors look
//! straight through to the inner value.
//!
//! # Example
//!
//! ```ignore
//! use resp3_client::protocol::{Kind, Value};
//!
//! let value = Value::Array(vec![Value::Integer(1), Value::from("two")]);
//! assert_eq!(value.kind(), Kind::Array);
//!
//! let items: Vec<Value> = value.extract()?;
//! ```

use bytes::Bytes;

use super::kind::Kind;
use crate::adapter::{AdapterError, FromResp};
use crate::error::ServerError;

/// Key/value pairs of a map or attribute, in wire order.
pub type Pairs = Vec<(Value, Value)>;

/// A complete RESP3 value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    /// Arbitrary precision integer kept in its decimal text form.
    BigNumber(String),
    SimpleString(String),
    SimpleError(String),
    BlobString(Bytes),
    BlobError(Bytes),
    /// Text with a three byte format tag such as `txt` or `mkd`.
    VerbatimString {
        format: String,
        data: Bytes,
    },
    Array(Vec<Value>),
    /// Received order is kept, but the contents are semantically unordered.
    Set(Vec<Value>),
    Map(Pairs),
    /// Out-of-band server notification.
    Push(Vec<Value>),
    /// A value preceded by an attribute map.
    Attributed {
        attributes: Pairs,
        value: Box<Value>,
    },
}

impl Value {
    /// Kind of the value, looking through any attribute decoration.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Boolean(_) => Kind::Boolean,
            Value::Integer(_) => Kind::Integer,
            Value::Double(_) => Kind::Double,
            Value::BigNumber(_) => Kind::BigNumber,
            Value::SimpleString(_) => Kind::SimpleString,
            Value::SimpleError(_) => Kind::SimpleError,
            Value::BlobString(_) => Kind::BlobString,
            Value::BlobError(_) => Kind::BlobError,
            Value::VerbatimString { .. } => Kind::VerbatimString,
            Value::Array(_) => Kind::Array,
            Value::Set(_) => Kind::Set,
            Value::Map(_) => Kind::Map,
            Value::Push(_) => Kind::Push,
            Value::Attributed { value, .. } => value.kind(),
        }
    }

    /// The value with any attribute decoration peeled off, by reference.
    pub fn plain(&self) -> &Value {
        match self {
            Value::Attributed { value, .. } => value.plain(),
            other => other,
        }
    }

    /// Drop any attribute decoration and return the bare value.
    pub fn into_plain(self) -> Value {
        self.into_parts().1
    }

    /// Split into the attribute map (if any) and the bare value.
    pub fn into_parts(self) -> (Option<Pairs>, Value) {
        match self {
            Value::Attributed { attributes, value } => {
                let (_, inner) = value.into_parts();
                (Some(attributes), inner)
            }
            other => (None, other),
        }
    }

    /// Attribute map attached to this value, if one preceded it.
    pub fn attributes(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Attributed { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    /// Wrap `value` in an attribute map. An empty map leaves it undecorated.
    pub fn with_attributes(value: Value, attributes: Pairs) -> Value {
        if attributes.is_empty() {
            return value;
        }
        Value::Attributed {
            attributes,
            value: Box::new(value),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.kind() == Kind::Null
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }

    #[inline]
    pub fn is_push(&self) -> bool {
        self.kind() == Kind::Push
    }

    #[inline]
    pub fn is_aggregate(&self) -> bool {
        self.kind().is_aggregate()
    }

    /// The server error this value represents, if it is an error reply.
    pub fn server_error(&self) -> Option<ServerError> {
        match self.plain() {
            Value::SimpleError(msg) => Some(ServerError::simple(msg.clone())),
            Value::BlobError(payload) => Some(ServerError::blob(payload)),
            _ => None,
        }
    }

    /// Text content of simple, blob and verbatim strings.
    ///
    /// Returns `None` for blobs that are not valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self.plain() {
            Value::SimpleString(s) => Some(s),
            Value::BlobString(b) => std::str::from_utf8(b).ok(),
            Value::VerbatimString { data, .. } => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Raw bytes of string-like values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.plain() {
            Value::SimpleString(s) => Some(s.as_bytes()),
            Value::BlobString(b) => Some(b),
            Value::VerbatimString { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.plain() {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.plain() {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.plain() {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements of an array, set or push.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self.plain() {
            Value::Array(items) | Value::Set(items) | Value::Push(items) => Some(items),
            _ => None,
        }
    }

    /// Entries of a map.
    pub fn as_pairs(&self) -> Option<&[(Value, Value)]> {
        match self.plain() {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Convert into `T`.
    ///
    /// On failure the error names the offending kind and the target type.
    /// Error replies are not special-cased here; see [`crate::adapter::adapt`]
    /// for the variant that reports them as server errors.
    pub fn extract<T: FromResp>(self) -> Result<T, AdapterError> {
        T::from_resp(self)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::BlobString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::BlobString(Bytes::from(s))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::BlobString(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributed() -> Value {
        Value::with_attributes(
            Value::Integer(7),
            vec![(Value::from("ttl"), Value::Integer(100))],
        )
    }

    #[test]
    fn test_kind_looks_through_attributes() {
        let value = attributed();
        assert_eq!(value.kind(), Kind::Integer);
        assert_eq!(value.as_integer(), Some(7));
        assert_eq!(value.attributes().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_into_parts_keeps_attributes() {
        let (attrs, value) = attributed().into_parts();
        assert_eq!(value, Value::Integer(7));
        let attrs = attrs.unwrap();
        assert_eq!(attrs[0].0.as_str(), Some("ttl"));
        assert_eq!(attrs[0].1, Value::Integer(100));
    }

    #[test]
    fn test_empty_attributes_do_not_decorate() {
        let value = Value::with_attributes(Value::Null, Vec::new());
        assert_eq!(value, Value::Null);
        assert!(value.attributes().is_none());
    }

    #[test]
    fn test_string_accessors() {
        assert_eq!(Value::SimpleString("OK".into()).as_str(), Some("OK"));
        assert_eq!(Value::from("v").as_bytes(), Some(&b"v"[..]));

        let verbatim = Value::VerbatimString {
            format: "txt".into(),
            data: Bytes::from_static(b"hello"),
        };
        assert_eq!(verbatim.as_str(), Some("hello"));

        let binary = Value::BlobString(Bytes::from_static(&[0xff, 0xfe]));
        assert_eq!(binary.as_str(), None);
        assert_eq!(binary.as_bytes(), Some(&[0xff, 0xfe][..]));
        assert_eq!(Value::Integer(1).as_str(), None);
    }

    #[test]
    fn test_server_error_detection() {
        let value = Value::SimpleError("ERR boom".into());
        assert!(value.is_error());
        assert_eq!(value.server_error().unwrap().code(), "ERR");

        let value = Value::BlobError(Bytes::from_static(b"SYNTAX bad"));
        assert_eq!(value.server_error().unwrap().message(), "SYNTAX bad");

        assert!(Value::from("ERR not an error").server_error().is_none());
    }

    #[test]
    fn test_aggregate_accessors() {
        let push = Value::Push(vec![Value::from("message")]);
        assert!(push.is_push());
        assert_eq!(push.as_slice().map(|s| s.len()), Some(1));

        let map = Value::Map(vec![(Value::from("a"), Value::Integer(1))]);
        assert!(map.is_aggregate());
        assert_eq!(map.as_pairs().map(|p| p.len()), Some(1));
        assert!(map.as_slice().is_none());
    }
}
