//! Canonical column values.
//!
//! Every column value is stored as a string, and index keys are derived
//! from that string, so each value type has exactly one serialization:
//!
//! | Variant     | Canonical form                                  |
//! |-------------|-------------------------------------------------|
//! | `Null`      | `null`                                          |
//! | `Int`       | decimal, e.g. `-42`                             |
//! | `Float`     | always fractional, e.g. `1.0`, `1e300`          |
//! | `Bool`      | `true` / `false`                                |
//! | `Timestamp` | UTC, `%a, %d %b %Y %H:%M:%S %z`                 |
//! | `Text`      | the string itself                               |

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};

/// Textual marker stored for a null value.
pub const NULL_MARKER: &str = "null";

/// Pattern used for timestamp values.
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A typed value accepted for a column write.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Explicit null, stored as the `null` marker.
    Null,
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float. Must be finite.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Point in time, serialized in UTC.
    Timestamp(DateTime<Utc>),
    /// Free text.
    Text(String),
}

impl ColumnValue {
    /// Returns the canonical string form of this value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] for NaN or infinite floats.
    pub fn canonical(&self) -> Result<String> {
        match self {
            Self::Null => Ok(NULL_MARKER.to_string()),
            Self::Int(v) => Ok(v.to_string()),
            Self::Float(v) => {
                if !v.is_finite() {
                    return Err(Error::InvalidValue(format!("non-finite float {v}")));
                }
                // -0.0 and 0.0 are the same value and must share an index entry
                let v = if *v == 0.0 { 0.0 } else { *v };
                // `Debug` keeps `1.0` apart from the integer `1`
                Ok(format!("{v:?}"))
            }
            Self::Bool(v) => Ok(if *v { "true" } else { "false" }.to_string()),
            Self::Timestamp(ts) => Ok(ts.format(TIMESTAMP_FORMAT).to_string()),
            Self::Text(s) => Ok(s.clone()),
        }
    }

    /// Returns a short type name, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "text",
        }
    }
}

/// Returns true if a stored value must never be retracted from, or
/// inserted into, a value index: absent, blank, or the null marker.
#[must_use]
pub fn is_empty_value(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.trim().is_empty() || v.eq_ignore_ascii_case(NULL_MARKER),
    }
}

/// Parses a string previously produced by [`ColumnValue::canonical`] for
/// a timestamp.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ColumnValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// JSON scalars map onto the closed set of value types; arrays and
/// objects have no canonical form and are rejected.
impl TryFrom<&Value> for ColumnValue {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(Error::InvalidValue(format!("number {n} out of range")))
                }
            }
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(_) => Err(Error::InvalidValue(
                "arrays have no canonical column form".to_string(),
            )),
            Value::Object(_) => Err(Error::InvalidValue(
                "objects have no canonical column form".to_string(),
            )),
        }
    }
}

impl TryFrom<Value> for ColumnValue {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::try_from(&value)
    }
}
