//! `FromResp` implementations for std types and a few reply-shaped helpers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use bytes::Bytes;

use super::{AdapterError, FromResp};
use crate::error::ServerError;
use crate::protocol::{Kind, Pairs, Value};

const STRING: &str = "simple_string, blob_string or verbatim_string";
const SEQUENCE: &str = "array, set or push";

impl FromResp for Value {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        Ok(value)
    }
}

/// Accepts any reply and discards it.
impl FromResp for () {
    fn from_resp(_value: Value) -> Result<Self, AdapterError> {
        Ok(())
    }
}

impl FromResp for String {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        let actual = value.kind();
        let bytes = match value.into_plain() {
            Value::SimpleString(s) => return Ok(s),
            Value::BlobString(b) => b,
            Value::VerbatimString { data, .. } => data,
            other => return Err(AdapterError::for_value::<String>(&other, STRING)),
        };
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AdapterError::invalid::<String>(actual, "not valid UTF-8"))
    }
}

impl FromResp for Bytes {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        match value.into_plain() {
            Value::BlobString(b) => Ok(b),
            Value::SimpleString(s) => Ok(Bytes::from(s)),
            Value::VerbatimString { data, .. } => Ok(data),
            other => Err(AdapterError::for_value::<Bytes>(&other, STRING)),
        }
    }
}

macro_rules! impl_from_resp_integer {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromResp for $t {
                fn from_resp(value: Value) -> Result<Self, AdapterError> {
                    match value.into_plain() {
                        Value::Integer(i) => <$t>::try_from(i).map_err(|_| {
                            AdapterError::out_of_range::<$t>(
                                Kind::Integer,
                                format!("integer {} out of range for {}", i, stringify!($t)),
                            )
                        }),
                        other => Err(AdapterError::for_value::<$t>(&other, "integer")),
                    }
                }
            }
        )*
    };
}

impl_from_resp_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl FromResp for bool {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        match value.into_plain() {
            Value::Boolean(b) => Ok(b),
            other => Err(AdapterError::for_value::<bool>(&other, "boolean")),
        }
    }
}

impl FromResp for f64 {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        match value.into_plain() {
            Value::Double(d) => Ok(d),
            other => Err(AdapterError::for_value::<f64>(&other, "double")),
        }
    }
}

/// `null` becomes `None`; anything else must convert to `T`.
impl<T: FromResp> FromResp for Option<T> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_resp(value).map(Some)
    }
}

/// Element-level error replies, as found inside `EXEC` results.
impl<T: FromResp> FromResp for Result<T, ServerError> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        match value.server_error() {
            Some(err) => Ok(Err(err)),
            None => T::from_resp(value).map(Ok),
        }
    }
}

fn sequence<T, C>(value: Value) -> Result<C, AdapterError>
where
    T: FromResp,
    C: FromIterator<T>,
{
    match value.into_plain() {
        Value::Array(items) | Value::Set(items) | Value::Push(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| T::from_resp(item).map_err(|e| e.at_index(i)))
            .collect(),
        other => Err(AdapterError::for_value::<C>(&other, SEQUENCE)),
    }
}

impl<T: FromResp> FromResp for Vec<T> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        sequence::<T, Vec<T>>(value)
    }
}

impl<T: FromResp + Eq + Hash> FromResp for HashSet<T> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        sequence::<T, HashSet<T>>(value)
    }
}

impl<T: FromResp + Ord> FromResp for BTreeSet<T> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        sequence::<T, BTreeSet<T>>(value)
    }
}

/// Readable label for a map key in error paths.
fn key_label(key: &Value, index: usize) -> String {
    match key.as_str() {
        Some(s) => s.to_owned(),
        None => format!("#{}", index),
    }
}

fn map_entries<K, V, C>(value: Value) -> Result<Vec<(K, V)>, AdapterError>
where
    K: FromResp,
    V: FromResp,
{
    let pairs = match value.into_plain() {
        Value::Map(pairs) => pairs,
        other => return Err(AdapterError::for_value::<C>(&other, "map")),
    };
    pairs
        .into_iter()
        .enumerate()
        .map(|(i, (key, value))| {
            let label = key_label(&key, i);
            let key = K::from_resp(key).map_err(|e| e.at_key(label.clone()))?;
            let value = V::from_resp(value).map_err(|e| e.at_key(label))?;
            Ok((key, value))
        })
        .collect()
}

fn duplicate_key<C>(index: usize) -> AdapterError {
    AdapterError::invalid::<C>(Kind::Map, format!("duplicate key at entry {}", index))
}

/// Duplicate keys are rejected rather than silently overwritten.
impl<K, V> FromResp for HashMap<K, V>
where
    K: FromResp + Eq + Hash,
    V: FromResp,
{
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        let entries = map_entries::<K, V, Self>(value)?;
        let mut map = HashMap::with_capacity(entries.len());
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if map.insert(key, value).is_some() {
                return Err(duplicate_key::<Self>(i));
            }
        }
        Ok(map)
    }
}

impl<K, V> FromResp for BTreeMap<K, V>
where
    K: FromResp + Ord,
    V: FromResp,
{
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        let entries = map_entries::<K, V, Self>(value)?;
        let mut map = BTreeMap::new();
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if map.insert(key, value).is_some() {
                return Err(duplicate_key::<Self>(i));
            }
        }
        Ok(map)
    }
}

/// Map entries in wire order, duplicates kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValues<K, V>(pub Vec<(K, V)>);

impl<K: FromResp, V: FromResp> FromResp for KeyValues<K, V> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        map_entries::<K, V, Self>(value).map(KeyValues)
    }
}

impl<K, V> KeyValues<K, V> {
    pub fn into_inner(self) -> Vec<(K, V)> {
        self.0
    }
}

fn exact_items<C>(value: Value, len: usize) -> Result<Vec<Value>, AdapterError> {
    match value.into_plain() {
        Value::Array(items) => {
            if items.len() != len {
                return Err(AdapterError::size_mismatch::<C>(Kind::Array, len, items.len()));
            }
            Ok(items)
        }
        other => Err(AdapterError::for_value::<C>(&other, "array")),
    }
}

impl<A: FromResp, B: FromResp> FromResp for (A, B) {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        let mut items = exact_items::<Self>(value, 2)?.into_iter();
        match (items.next(), items.next()) {
            (Some(a), Some(b)) => Ok((
                A::from_resp(a).map_err(|e| e.at_index(0))?,
                B::from_resp(b).map_err(|e| e.at_index(1))?,
            )),
            _ => Err(AdapterError::size_mismatch::<Self>(Kind::Array, 2, 0)),
        }
    }
}

impl<A: FromResp, B: FromResp, C: FromResp> FromResp for (A, B, C) {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        let mut items = exact_items::<Self>(value, 3)?.into_iter();
        match (items.next(), items.next(), items.next()) {
            (Some(a), Some(b), Some(c)) => Ok((
                A::from_resp(a).map_err(|e| e.at_index(0))?,
                B::from_resp(b).map_err(|e| e.at_index(1))?,
                C::from_resp(c).map_err(|e| e.at_index(2))?,
            )),
            _ => Err(AdapterError::size_mismatch::<Self>(Kind::Array, 3, 0)),
        }
    }
}

/// A status reply such as `+OK` or `+QUEUED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status(String);

impl Status {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the status is exactly `OK`.
    pub fn is_ok(&self) -> bool {
        self.0 == "OK"
    }
}

impl FromResp for Status {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        match value.into_plain() {
            Value::SimpleString(s) => Ok(Status(s)),
            other => Err(AdapterError::for_value::<Status>(&other, "simple_string")),
        }
    }
}

/// A converted value together with the attribute map that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributed<T> {
    pub attributes: Pairs,
    pub value: T,
}

impl<T: FromResp> FromResp for Attributed<T> {
    fn from_resp(value: Value) -> Result<Self, AdapterError> {
        let (attributes, value) = value.into_parts();
        Ok(Attributed {
            attributes: attributes.unwrap_or_default(),
            value: T::from_resp(value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{adapt, AdapterErrorKind};
    use crate::error::RespError;

    fn blob(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_strings() {
        assert_eq!(String::from_resp(blob("v")).unwrap(), "v");
        assert_eq!(
            String::from_resp(Value::SimpleString("OK".into())).unwrap(),
            "OK"
        );
        let verbatim = Value::VerbatimString {
            format: "txt".into(),
            data: Bytes::from_static(b"hello"),
        };
        assert_eq!(String::from_resp(verbatim).unwrap(), "hello");

        let err = String::from_resp(Value::Integer(1)).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::TypeMismatch);
        assert_eq!(err.actual(), Kind::Integer);

        let err = String::from_resp(Value::BlobString(Bytes::from_static(&[0xff]))).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::InvalidValue);
    }

    #[test]
    fn test_integers_are_range_checked() {
        assert_eq!(i64::from_resp(Value::Integer(-5)).unwrap(), -5);
        assert_eq!(u8::from_resp(Value::Integer(255)).unwrap(), 255);

        let err = u8::from_resp(Value::Integer(256)).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::ValueOutOfRange);
        assert_eq!(err.to_string(), "$: integer 256 out of range for u8");

        let err = u64::from_resp(Value::Integer(-1)).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::ValueOutOfRange);
    }

    #[test]
    fn test_no_numeric_coercion() {
        assert!(i64::from_resp(Value::Double(1.0)).is_err());
        assert!(f64::from_resp(Value::Integer(1)).is_err());
        assert!(i64::from_resp(blob("12")).is_err());
        assert!(bool::from_resp(Value::Integer(1)).is_err());
        assert_eq!(f64::from_resp(Value::Double(2.5)).unwrap(), 2.5);
        assert!(bool::from_resp(Value::Boolean(true)).unwrap());
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(Option::<String>::from_resp(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_resp(blob("x")).unwrap(),
            Some("x".to_string())
        );
        let err = String::from_resp(Value::Null).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::UnexpectedNull);
    }

    #[test]
    fn test_sequences_report_path() {
        let value = Value::Array(vec![Value::Integer(1), blob("two"), Value::Integer(3)]);
        let err = Vec::<i64>::from_resp(value).unwrap_err();
        assert_eq!(err.to_string(), "$[1]: expected integer, got blob_string");

        let set = Value::Set(vec![blob("a"), blob("b"), blob("a")]);
        let set = HashSet::<String>::from_resp(set).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_maps() {
        let value = Value::Map(vec![
            (blob("a"), Value::Integer(1)),
            (blob("b"), Value::Integer(2)),
        ]);
        let map = HashMap::<String, i64>::from_resp(value.clone()).unwrap();
        assert_eq!(map["b"], 2);

        let pairs = KeyValues::<String, i64>::from_resp(value).unwrap();
        assert_eq!(pairs.0[0], ("a".to_string(), 1));

        let nested = Value::Map(vec![(blob("name"), Value::Array(vec![Value::Null]))]);
        let err = HashMap::<String, Vec<i64>>::from_resp(nested).unwrap_err();
        assert_eq!(err.to_string(), "$[\"name\"][0]: unexpected null, expected integer");

        let dup = Value::Map(vec![
            (blob("a"), Value::Integer(1)),
            (blob("a"), Value::Integer(2)),
        ]);
        let err = BTreeMap::<String, i64>::from_resp(dup).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::InvalidValue);
    }

    #[test]
    fn test_tuples() {
        let value = Value::Array(vec![blob("k"), Value::Integer(9)]);
        assert_eq!(
            <(String, i64)>::from_resp(value).unwrap(),
            ("k".to_string(), 9)
        );

        let value = Value::Array(vec![blob("k")]);
        let err = <(String, i64)>::from_resp(value).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::SizeMismatch);
        assert_eq!(err.to_string(), "$: expected 2 elements, got 1");
    }

    #[test]
    fn test_status_and_attributes() {
        let status = Status::from_resp(Value::SimpleString("OK".into())).unwrap();
        assert!(status.is_ok());
        assert!(Status::from_resp(blob("OK")).is_err());

        let value = Value::with_attributes(
            Value::Integer(3),
            vec![(blob("ttl"), Value::Integer(10))],
        );
        let attributed = Attributed::<i64>::from_resp(value.clone()).unwrap();
        assert_eq!(attributed.value, 3);
        assert_eq!(attributed.attributes.len(), 1);

        // Plain targets look through the decoration.
        assert_eq!(i64::from_resp(value).unwrap(), 3);
    }

    #[test]
    fn test_adapt_surfaces_server_errors_first() {
        let err = adapt::<String>(Value::SimpleError("ERR boom".into())).unwrap_err();
        match err {
            RespError::Server(e) => assert_eq!(e.message(), "ERR boom"),
            other => panic!("expected server error, got {:?}", other),
        }

        let err = adapt::<Value>(Value::BlobError(Bytes::from_static(b"SYNTAX x"))).unwrap_err();
        assert!(matches!(err, RespError::Server(_)));

        let err = adapt::<i64>(blob("x")).unwrap_err();
        assert!(matches!(err, RespError::TypeMismatch(_)));
    }

    #[test]
    fn test_element_level_server_errors() {
        let value = Value::Array(vec![
            Value::SimpleString("OK".into()),
            Value::SimpleError("WRONGTYPE bad".into()),
        ]);
        let results = Vec::<Result<Status, ServerError>>::from_resp(value).unwrap();
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().code(), "WRONGTYPE");
    }

    #[test]
    fn test_raw_bytes_come_from_bytes_not_vec() {
        let payload = Value::BlobString(Bytes::from_static(b"\x00\xff"));
        assert_eq!(Bytes::from_resp(payload.clone()).unwrap(), &b"\x00\xff"[..]);

        // `Vec<u8>` is a sequence of small integers, not a blob.
        let err = Vec::<u8>::from_resp(payload).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::TypeMismatch);
        let small = Value::Array(vec![Value::Integer(1), Value::Integer(255)]);
        assert_eq!(Vec::<u8>::from_resp(small).unwrap(), vec![1u8, 255]);
    }
}
