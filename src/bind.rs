//! Query binder.
//!
//! Textual `?` substitution, not a prepared statement. Values are quoted
//! and inner single quotes doubled; that is the whole of the escaping.
//!
//! ```
//! use cassandra_cql::bind::{bind, Param};
//!
//! let cql = bind("SELECT ? FROM users WHERE KEY = ?", &["name".into(), Param::from(7i64)]).unwrap();
//! assert_eq!(cql, "SELECT 'name' FROM users WHERE KEY = '7'");
//! ```

use std::fmt;

use uuid::Uuid;

use crate::error::BindError;

/// Placeholder character in query templates.
pub const PLACEHOLDER: char = '?';

/// A value bound into a query template.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    /// Rendered as lowercase hex, which is how CQL 2 takes blob literals.
    Bytes(Vec<u8>),
}

impl Param {
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Null => write!(f, "null"),
            Param::Text(s) => write!(f, "{}", s),
            Param::Int(n) => write!(f, "{}", n),
            Param::Float(n) => write!(f, "{}", n),
            Param::Bool(b) => write!(f, "{}", b),
            Param::Uuid(u) => write!(f, "{}", u),
            Param::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Text(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Text(s)
    }
}

impl From<&String> for Param {
    fn from(s: &String) -> Self {
        Param::Text(s.clone())
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Int(n)
    }
}

impl From<i32> for Param {
    fn from(n: i32) -> Self {
        Param::Int(n as i64)
    }
}

impl From<u32> for Param {
    fn from(n: u32) -> Self {
        Param::Int(n as i64)
    }
}

impl From<f64> for Param {
    fn from(n: f64) -> Self {
        Param::Float(n)
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Bool(b)
    }
}

impl From<Uuid> for Param {
    fn from(u: Uuid) -> Self {
        Param::Uuid(u)
    }
}

impl From<Vec<u8>> for Param {
    fn from(b: Vec<u8>) -> Self {
        Param::Bytes(b)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Param::Null)
    }
}

/// Bind `args` into the `?` placeholders of `template`, in order.
///
/// With no arguments the template comes back untouched. A null argument, or
/// a placeholder with no argument left for it, fails the whole bind.
pub fn bind(template: &str, args: &[Param]) -> Result<String, BindError> {
    if args.is_empty() {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len() + args.len() * 8);
    for (i, segment) in template.split(PLACEHOLDER).enumerate() {
        if i > 0 {
            let position = i - 1;
            match args.get(position) {
                Some(arg) if !arg.is_null() => push_quoted(&mut out, &arg.to_string()),
                _ => return Err(BindError::NullArgument(position)),
            }
        }
        out.push_str(segment);
    }
    Ok(out)
}

fn push_quoted(out: &mut String, value: &str) {
    out.push('\'');
    out.push_str(&value.replace('\'', "''"));
    out.push('\'');
}
