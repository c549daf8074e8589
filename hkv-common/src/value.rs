//! # Reply Values
//!
//! Purpose: Represent a decoded backend reply as a small closed enum and
//! convert it into the caller's target type without dynamic inspection.
//!
//! ## Design Principles
//! 1. **Closed Variant**: Every reply is one of five shapes; error replies are
//!    never values and travel as `PipeError::Server` instead.
//! 2. **Explicit Conversion**: `FromValue` fails with `TypeMismatch`, `Nil` or
//!    `Parse` rather than guessing.
//! 3. **Binary-Safe**: Bulk payloads stay as `Bytes` until a caller asks for text.
//!
//! ## Conversion Table
//!
//! ```text
//! target   | Nil  | Status      | Int        | Bulk             | Array
//! ---------+------+-------------+------------+------------------+-----------
//! String   | Nil  | ok          | mismatch   | utf-8 check      | mismatch
//! i64      | Nil  | mismatch    | ok         | decimal parse    | mismatch
//! bool     | Nil  | mismatch    | != 0       | "1"/"0"/"true".. | mismatch
//! Bytes    | Nil  | ok          | mismatch   | ok               | mismatch
//! Vec<T>   | Nil  | mismatch    | mismatch   | mismatch         | per item
//! Option<T>| None | Some(T)     | Some(T)    | Some(T)          | Some(T)
//! ```

use bytes::Bytes;

use crate::error::{PipeError, PipeResult};

/// Decoded backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null bulk string or null array.
    Nil,
    /// +OK or +PONG style status replies.
    Status(String),
    /// :123 replies.
    Int(i64),
    /// $... bulk strings.
    Bulk(Bytes),
    /// *... arrays.
    Array(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Status(_) => "status",
            Value::Int(_) => "integer",
            Value::Bulk(_) => "bulk",
            Value::Array(_) => "array",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Converts the reply into `T`.
    pub fn convert<T: FromValue>(self) -> PipeResult<T> {
        T::from_value(self)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Bulk(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// Conversion from a reply into a typed result.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> PipeResult<Self>;
}

/// Converts a `(reply, error)` pair into a typed result.
///
/// Errors already present in `result` pass through untouched, so callers can
/// chain this directly onto a completed command.
pub fn convert<T: FromValue>(result: PipeResult<Value>) -> PipeResult<T> {
    result.and_then(T::from_value)
}

fn mismatch<T>(expected: &'static str, value: &Value) -> PipeResult<T> {
    Err(PipeError::TypeMismatch {
        expected,
        found: value.kind(),
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> PipeResult<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> PipeResult<Self> {
        match value {
            Value::Nil => Err(PipeError::Nil),
            Value::Status(text) => Ok(text),
            Value::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| PipeError::Parse("bulk reply is not valid utf-8".to_string())),
            other => mismatch("string", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> PipeResult<Self> {
        match value {
            Value::Nil => Err(PipeError::Nil),
            Value::Int(n) => Ok(n),
            Value::Bulk(data) => parse_text(&data, "integer"),
            other => mismatch("integer", &other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> PipeResult<Self> {
        match value {
            Value::Nil => Err(PipeError::Nil),
            Value::Int(n) => Ok(n != 0),
            Value::Bulk(data) => parse_bool(&data),
            other => mismatch("boolean", &other),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> PipeResult<Self> {
        match value {
            Value::Nil => Err(PipeError::Nil),
            Value::Bulk(data) => Ok(data),
            Value::Status(text) => Ok(Bytes::from(text.into_bytes())),
            other => mismatch("bytes", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> PipeResult<Self> {
        Bytes::from_value(value).map(|data| data.to_vec())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> PipeResult<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> PipeResult<Self> {
        match value {
            Value::Nil => Err(PipeError::Nil),
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("array", &other),
        }
    }
}

fn parse_text<T: std::str::FromStr>(data: &[u8], expected: &'static str) -> PipeResult<T> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            PipeError::Parse(format!(
                "cannot parse {:?} as {}",
                String::from_utf8_lossy(data),
                expected
            ))
        })
}

// Accepts the same spellings as Go's strconv.ParseBool, which is what most
// Redis clients emit for boolean arguments.
fn parse_bool(data: &[u8]) -> PipeResult<bool> {
    match data {
        b"1" | b"t" | b"T" | b"true" | b"TRUE" | b"True" => Ok(true),
        b"0" | b"f" | b"F" | b"false" | b"FALSE" | b"False" => Ok(false),
        _ => Err(PipeError::Parse(format!(
            "cannot parse {:?} as boolean",
            String::from_utf8_lossy(data)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(text: &str) -> Value {
        Value::from(text)
    }

    #[test]
    fn bulk_converts_to_string_and_int() {
        assert_eq!(String::from_value(bulk("1")), Ok("1".to_string()));
        assert_eq!(i64::from_value(bulk("-42")), Ok(-42));
        assert_eq!(i64::from_value(Value::Int(7)), Ok(7));
    }

    #[test]
    fn bool_accepts_int_and_text() {
        assert_eq!(bool::from_value(Value::Int(1)), Ok(true));
        assert_eq!(bool::from_value(Value::Int(0)), Ok(false));
        assert_eq!(bool::from_value(bulk("true")), Ok(true));
        assert!(matches!(bool::from_value(bulk("yes")), Err(PipeError::Parse(_))));
    }

    #[test]
    fn nil_is_an_error_unless_optional() {
        assert_eq!(String::from_value(Value::Nil), Err(PipeError::Nil));
        assert_eq!(Option::<String>::from_value(Value::Nil), Ok(None));
        assert_eq!(
            Option::<i64>::from_value(bulk("3")),
            Ok(Some(3))
        );
    }

    #[test]
    fn wrong_shape_reports_mismatch() {
        assert_eq!(
            String::from_value(Value::Int(1)),
            Err(PipeError::TypeMismatch {
                expected: "string",
                found: "integer",
            })
        );
        assert_eq!(
            i64::from_value(Value::Status("OK".to_string())),
            Err(PipeError::TypeMismatch {
                expected: "integer",
                found: "status",
            })
        );
    }

    #[test]
    fn arrays_convert_per_item() {
        let reply = Value::Array(vec![bulk("2"), bulk("3")]);
        assert_eq!(Vec::<i64>::from_value(reply), Ok(vec![2, 3]));

        let with_hole = Value::Array(vec![bulk("a"), Value::Nil]);
        assert_eq!(
            Vec::<Option<String>>::from_value(with_hole),
            Ok(vec![Some("a".to_string()), None])
        );
    }

    #[test]
    fn convert_passes_errors_through() {
        let failed: PipeResult<Value> = Err(PipeError::Server("ERR".to_string()));
        assert_eq!(
            convert::<String>(failed),
            Err(PipeError::Server("ERR".to_string()))
        );
    }
}
