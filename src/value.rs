//! Decoded column values.

use std::fmt;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// A key, column name or column value after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    /// Raw bytes (BytesType and anything without a known validator).
    Bytes(Vec<u8>),
    /// AsciiType / UTF8Type
    Text(String),
    /// LongType, Int32Type, CounterColumnType, small IntegerType values
    Int(i64),
    /// Integer-like types when big integers are requested, or IntegerType
    /// values that do not fit in 64 bits.
    BigInt(BigInt),
    /// UUIDType, TimeUUIDType, LexicalUUIDType
    Uuid(Uuid),
    Boolean(bool),
    Double(f64),
    Float(f32),
    /// DateType
    Timestamp(DateTime<Utc>),
}

impl CqlValue {
    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) => Some(s),
            CqlValue::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CqlValue::Bytes(b) => Some(b),
            CqlValue::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to get as a 64-bit integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CqlValue::Int(n) => Some(*n),
            CqlValue::BigInt(n) => i64::try_from(n).ok(),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            CqlValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CqlValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            CqlValue::Text(s) => write!(f, "{}", s),
            CqlValue::Int(n) => write!(f, "{}", n),
            CqlValue::BigInt(n) => write!(f, "{}", n),
            CqlValue::Uuid(u) => write!(f, "{}", u),
            CqlValue::Boolean(b) => write!(f, "{}", b),
            CqlValue::Double(n) => write!(f, "{}", n),
            CqlValue::Float(n) => write!(f, "{}", n),
            CqlValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// JSON-friendly: numbers stay numbers, big integers become strings so
/// nothing is rounded on the way out.
impl Serialize for CqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CqlValue::Int(n) => serializer.serialize_i64(*n),
            CqlValue::Boolean(b) => serializer.serialize_bool(*b),
            CqlValue::Double(n) => serializer.serialize_f64(*n),
            CqlValue::Float(n) => serializer.serialize_f32(*n),
            other => serializer.collect_str(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CqlValue::Bytes(vec![0x0a, 0xff]).to_string(), "0aff");
        assert_eq!(CqlValue::Int(-3).to_string(), "-3");
        assert_eq!(CqlValue::BigInt(BigInt::from(1u8) << 70u32).to_string(), "1180591620717411303424");
    }

    #[test]
    fn test_serialize_json() {
        let json = serde_json::to_string(&vec![
            CqlValue::Int(5),
            CqlValue::Text("a".into()),
            CqlValue::BigInt(BigInt::from(12)),
        ])
        .unwrap();
        assert_eq!(json, r#"[5,"a","12"]"#);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(CqlValue::BigInt(BigInt::from(9)).as_i64(), Some(9));
        assert_eq!(CqlValue::Bytes(b"hi".to_vec()).as_str(), Some("hi"));
        assert_eq!(CqlValue::Int(1).as_uuid(), None);
    }
}
