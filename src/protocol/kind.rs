//! RESP3 value kinds and their one-byte sigils.

use std::fmt;

/// Kind tag of a RESP3 value.
///
/// Each kind maps to exactly one leading type byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Boolean,
    Integer,
    Double,
    BigNumber,
    SimpleString,
    SimpleError,
    BlobString,
    BlobError,
    VerbatimString,
    Array,
    Set,
    Map,
    Push,
    Attribute,
}

impl Kind {
    /// All kinds, in sigil table order.
    pub const ALL: [Kind; 15] = [
        Kind::Null,
        Kind::Boolean,
        Kind::Integer,
        Kind::Double,
        Kind::BigNumber,
        Kind::SimpleString,
        Kind::SimpleError,
        Kind::BlobString,
        Kind::BlobError,
        Kind::VerbatimString,
        Kind::Array,
        Kind::Set,
        Kind::Map,
        Kind::Push,
        Kind::Attribute,
    ];

    /// Look up the kind for a leading type byte.
    #[inline]
    pub fn from_sigil(byte: u8) -> Option<Kind> {
        Some(match byte {
            b'_' => Kind::Null,
            b'#' => Kind::Boolean,
            b':' => Kind::Integer,
            b',' => Kind::Double,
            b'(' => Kind::BigNumber,
            b'+' => Kind::SimpleString,
            b'-' => Kind::SimpleError,
            b'$' => Kind::BlobString,
            b'!' => Kind::BlobError,
            b'=' => Kind::VerbatimString,
            b'*' => Kind::Array,
            b'~' => Kind::Set,
            b'%' => Kind::Map,
            b'>' => Kind::Push,
            b'|' => Kind::Attribute,
            _ => return None,
        })
    }

    /// The leading type byte for this kind.
    #[inline]
    pub fn sigil(self) -> u8 {
        match self {
            Kind::Null => b'_',
            Kind::Boolean => b'#',
            Kind::Integer => b':',
            Kind::Double => b',',
            Kind::BigNumber => b'(',
            Kind::SimpleString => b'+',
            Kind::SimpleError => b'-',
            Kind::BlobString => b'$',
            Kind::BlobError => b'!',
            Kind::VerbatimString => b'=',
            Kind::Array => b'*',
            Kind::Set => b'~',
            Kind::Map => b'%',
            Kind::Push => b'>',
            Kind::Attribute => b'|',
        }
    }

    /// Lowercase name used in diagnostics, e.g. `blob_string`.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Integer => "integer",
            Kind::Double => "double",
            Kind::BigNumber => "big_number",
            Kind::SimpleString => "simple_string",
            Kind::SimpleError => "simple_error",
            Kind::BlobString => "blob_string",
            Kind::BlobError => "blob_error",
            Kind::VerbatimString => "verbatim_string",
            Kind::Array => "array",
            Kind::Set => "set",
            Kind::Map => "map",
            Kind::Push => "push",
            Kind::Attribute => "attribute",
        }
    }

    /// Container kinds carry a count line followed by child values.
    #[inline]
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Kind::Array | Kind::Set | Kind::Map | Kind::Push | Kind::Attribute
        )
    }

    /// Length-prefixed kinds carry a byte count line followed by a payload.
    #[inline]
    pub fn is_blob(self) -> bool {
        matches!(
            self,
            Kind::BlobString | Kind::BlobError | Kind::VerbatimString
        )
    }

    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, Kind::SimpleError | Kind::BlobError)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigil_table_is_bijective() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_sigil(kind.sigil()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_sigils() {
        for byte in [b'@', b'a', b'\r', 0u8, 0xff] {
            assert_eq!(Kind::from_sigil(byte), None);
        }
    }

    #[test]
    fn test_classification() {
        assert!(Kind::Map.is_aggregate());
        assert!(Kind::Attribute.is_aggregate());
        assert!(!Kind::BlobString.is_aggregate());
        assert!(Kind::VerbatimString.is_blob());
        assert!(Kind::BlobError.is_error());
        assert!(!Kind::SimpleString.is_error());
        assert_eq!(Kind::BigNumber.to_string(), "big_number");
    }
}
