//! Tagged value model shared by drivers and callers.
//!
//! [`Value`] is the closed set of value kinds a driver can bind as a
//! statement parameter or produce from a result column. [`ValueType`] is the
//! matching type tag, used for column descriptors and typed nulls.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Format used when a [`Value::DateTime`] is rendered as text.
///
/// ISO-8601 with millisecond precision and no offset.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Format used when a [`Value::Time`] is rendered as text (`hh:mm:ss.zzz`).
pub const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Format used when a [`Value::Date`] is rendered as text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Type tag for a [`Value`] or a column.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{Value, ValueType};
///
/// assert_eq!(Value::Int32(7).value_type(), ValueType::Int32);
/// assert_eq!(ValueType::default(), ValueType::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValueType {
    /// No usable type information (e.g. a NULL column with no declared type).
    #[default]
    Unknown,
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit unsigned integer.
    UInt64,
    /// Double precision float.
    Double,
    /// Unicode text.
    Text,
    /// Binary blob.
    Bytes,
    /// Date and time of day without offset.
    DateTime,
    /// Time of day.
    Time,
    /// Calendar date.
    Date,
}

impl ValueType {
    /// Returns `true` for the integral types.
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Int32 | Self::UInt32 | Self::Int64 | Self::UInt64)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Double => "double",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Date => "date",
        };
        f.write_str(name)
    }
}

/// A strongly-typed value.
///
/// Nulls carry the type they stand in for, so a NULL read from a text column
/// still reports [`ValueType::Text`].
///
/// # Examples
///
/// ```
/// use cipher_sql_core::{Value, ValueType};
///
/// let v = Value::from("hello");
/// assert_eq!(v.as_text(), Some("hello"));
///
/// let null = Value::Null(ValueType::Text);
/// assert!(null.is_null());
/// assert_eq!(null.value_type(), ValueType::Text);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL standing in for a value of the given type.
    Null(ValueType),
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// Double precision float.
    Double(f64),
    /// Unicode text.
    Text(String),
    /// Binary blob.
    Bytes(Vec<u8>),
    /// Date and time of day without offset.
    DateTime(NaiveDateTime),
    /// Time of day.
    Time(NaiveTime),
    /// Calendar date.
    Date(NaiveDate),
}

impl Value {
    /// An untyped NULL.
    pub const NULL: Value = Value::Null(ValueType::Unknown);

    /// Returns the type tag of this value. For nulls this is the stand-in type.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null(t) => *t,
            Self::Bool(_) => ValueType::Bool,
            Self::Int32(_) => ValueType::Int32,
            Self::UInt32(_) => ValueType::UInt32,
            Self::Int64(_) => ValueType::Int64,
            Self::UInt64(_) => ValueType::UInt64,
            Self::Double(_) => ValueType::Double,
            Self::Text(_) => ValueType::Text,
            Self::Bytes(_) => ValueType::Bytes,
            Self::DateTime(_) => ValueType::DateTime,
            Self::Time(_) => ValueType::Time,
            Self::Date(_) => ValueType::Date,
        }
    }

    /// Returns `true` if this is a (typed or untyped) NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Converts numeric and boolean values to `i64`.
    ///
    /// Doubles are truncated toward zero; text is parsed. Returns `None` for
    /// nulls, blobs, temporal values, unparsable text and out-of-range
    /// unsigned values.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::Double(v) => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converts numeric and boolean values to `f64`; text is parsed.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::UInt32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrows the text of a [`Value::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows the bytes of a [`Value::Bytes`].
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::NULL
    }
}

/// The generic to-string conversion.
///
/// Nulls render as the empty string and blobs as lowercase hex. Temporal
/// values use [`DATETIME_FORMAT`], [`TIME_FORMAT`] and [`DATE_FORMAT`].
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(_) => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Self::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    NaiveTime => Time,
    NaiveDate => Date,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::NULL, Into::into)
    }
}

/// Builds a `Vec<Value>` from heterogeneous expressions.
///
/// ```
/// use cipher_sql_core::{values, Value};
///
/// let row = values![1_i64, "two", 3.0_f64];
/// assert_eq!(row[1], Value::Text("two".into()));
/// ```
#[macro_export]
macro_rules! values {
    ($($val:expr),* $(,)?) => {
        vec![$($crate::Value::from($val)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_null_reports_stand_in_type() {
        let v = Value::Null(ValueType::Text);
        assert!(v.is_null());
        assert_eq!(v.value_type(), ValueType::Text);
        assert_eq!(Value::NULL.value_type(), ValueType::Unknown);
    }

    #[test]
    fn test_display_formats_temporal_values() {
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(13, 5, 9, 42)
            .unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2024-02-29T13:05:09.042");

        let t = NaiveTime::from_hms_milli_opt(7, 8, 9, 5).unwrap();
        assert_eq!(Value::Time(t).to_string(), "07:08:09.005");

        let d = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(Value::Date(d).to_string(), "1999-12-31");
    }

    #[test]
    fn test_display_blob_as_hex() {
        assert_eq!(Value::Bytes(vec![0x00, 0xab, 0x10]).to_string(), "00ab10");
        assert_eq!(Value::NULL.to_string(), "");
    }

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(Value::Double(3.7).to_i64(), Some(3));
        assert_eq!(Value::Bool(true).to_i64(), Some(1));
        assert_eq!(Value::Text(" 42 ".into()).to_i64(), Some(42));
        assert_eq!(Value::UInt64(u64::MAX).to_i64(), None);
        assert_eq!(Value::Int32(-2).to_f64(), Some(-2.0));
        assert_eq!(Value::Bytes(vec![1]).to_f64(), None);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::NULL);
        assert_eq!(Value::from(Some(5_i64)), Value::Int64(5));
    }

    #[test]
    fn test_values_macro() {
        let row = values![1_i32, "a", vec![1_u8, 2]];
        assert_eq!(
            row,
            vec![
                Value::Int32(1),
                Value::Text("a".into()),
                Value::Bytes(vec![1, 2])
            ]
        );
    }

    #[test]
    fn test_serialize_value() {
        let json = serde_json::to_string(&Value::Int64(9)).unwrap();
        assert_eq!(json, r#"{"Int64":9}"#);
    }
}
