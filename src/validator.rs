//! Cassandra marshal types ("validators") and how their bytes decode.

use chrono::DateTime;
use num_bigint::BigInt;
use uuid::Uuid;

use crate::error::{CqlError, CqlResult};
use crate::value::CqlValue;

const MARSHAL_PACKAGE: &str = "org.apache.cassandra.db.marshal.";

/// Options that change how integer-like values are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Render Long/Int32/Integer/Counter values as arbitrary precision.
    pub use_bigints: bool,
}

/// A type descriptor for keys, column names or column values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    Bytes,
    Ascii,
    Utf8,
    Long,
    Int32,
    Integer,
    Counter,
    Uuid,
    TimeUuid,
    LexicalUuid,
    Boolean,
    Double,
    Float,
    Date,
    /// A marshal class this driver does not know; decoded as bytes.
    Unknown(String),
}

impl Validator {
    /// Parse a marshal class name as reported by `describe_keyspace`.
    ///
    /// Accepts short (`UTF8Type`) and fully qualified names, and unwraps
    /// `ReversedType(...)`.
    pub fn from_class(class: &str) -> Validator {
        let class = class.trim();
        let short = class.strip_prefix(MARSHAL_PACKAGE).unwrap_or(class);

        if let Some(inner) = short
            .strip_prefix("ReversedType(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Validator::from_class(inner);
        }

        match short {
            "BytesType" => Validator::Bytes,
            "AsciiType" => Validator::Ascii,
            "UTF8Type" => Validator::Utf8,
            "LongType" => Validator::Long,
            "Int32Type" => Validator::Int32,
            "IntegerType" => Validator::Integer,
            "CounterColumnType" => Validator::Counter,
            "UUIDType" => Validator::Uuid,
            "TimeUUIDType" => Validator::TimeUuid,
            "LexicalUUIDType" => Validator::LexicalUuid,
            "BooleanType" => Validator::Boolean,
            "DoubleType" => Validator::Double,
            "FloatType" => Validator::Float,
            "DateType" => Validator::Date,
            _ => Validator::Unknown(class.to_string()),
        }
    }

    /// Decode raw bytes according to this validator.
    pub fn decode(&self, raw: &[u8], options: DecodeOptions) -> CqlResult<CqlValue> {
        match self {
            Validator::Bytes | Validator::Unknown(_) => Ok(CqlValue::Bytes(raw.to_vec())),
            Validator::Ascii => {
                if !raw.is_ascii() {
                    return Err(CqlError::decode("AsciiType value is not ASCII"));
                }
                Ok(CqlValue::Text(String::from_utf8_lossy(raw).into_owned()))
            }
            Validator::Utf8 => String::from_utf8(raw.to_vec())
                .map(CqlValue::Text)
                .map_err(|e| CqlError::decode(format!("UTF8Type value: {}", e))),
            Validator::Long | Validator::Counter => {
                let n = i64::from_be_bytes(fixed::<8>(self, raw)?);
                Ok(integer(n, options))
            }
            Validator::Int32 => {
                let n = i32::from_be_bytes(fixed::<4>(self, raw)?);
                Ok(integer(n as i64, options))
            }
            Validator::Integer => {
                if raw.is_empty() {
                    return Err(CqlError::decode("IntegerType value is empty"));
                }
                if options.use_bigints || raw.len() > 8 {
                    return Ok(CqlValue::BigInt(BigInt::from_signed_bytes_be(raw)));
                }
                Ok(CqlValue::Int(sign_extend(raw)))
            }
            Validator::Uuid | Validator::TimeUuid | Validator::LexicalUuid => Uuid::from_slice(raw)
                .map(CqlValue::Uuid)
                .map_err(|e| CqlError::decode(format!("{:?} value: {}", self, e))),
            Validator::Boolean => {
                let [b] = fixed::<1>(self, raw)?;
                Ok(CqlValue::Boolean(b != 0))
            }
            Validator::Double => Ok(CqlValue::Double(f64::from_be_bytes(fixed::<8>(self, raw)?))),
            Validator::Float => Ok(CqlValue::Float(f32::from_be_bytes(fixed::<4>(self, raw)?))),
            Validator::Date => {
                let millis = i64::from_be_bytes(fixed::<8>(self, raw)?);
                DateTime::from_timestamp_millis(millis)
                    .map(CqlValue::Timestamp)
                    .ok_or_else(|| CqlError::decode(format!("DateType out of range: {}", millis)))
            }
        }
    }
}

fn fixed<const N: usize>(validator: &Validator, raw: &[u8]) -> CqlResult<[u8; N]> {
    raw.try_into().map_err(|_| {
        CqlError::decode(format!(
            "{:?} expects {} bytes, got {}",
            validator,
            N,
            raw.len()
        ))
    })
}

fn integer(n: i64, options: DecodeOptions) -> CqlValue {
    if options.use_bigints {
        CqlValue::BigInt(BigInt::from(n))
    } else {
        CqlValue::Int(n)
    }
}

/// Two's complement big-endian, at most 8 bytes.
fn sign_extend(raw: &[u8]) -> i64 {
    let fill = if raw[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 8];
    buf[8 - raw.len()..].copy_from_slice(raw);
    i64::from_be_bytes(buf)
}
