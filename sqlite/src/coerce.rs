//! Value coercion between [`Value`] and the engine's storage classes.
//!
//! Outbound, each [`Value`] variant maps to exactly one bind call. Inbound,
//! the column's storage class in the current row picks the [`Value`] variant,
//! with floating-point columns shaped by the [`PrecisionPolicy`].

use cipher_sql_core::{DATETIME_FORMAT, PrecisionPolicy, TIME_FORMAT, Value, ValueType};

use crate::ffi::{self, RawStmt};

/// Column type implied by a declared type name.
///
/// Matching is case-insensitive; anything unrecognised (including an empty
/// name) is text.
///
/// # Examples
///
/// ```
/// use cipher_sql_core::ValueType;
/// use cipher_sql_sqlite::type_from_declared;
///
/// assert_eq!(type_from_declared("INTEGER"), ValueType::Int32);
/// assert_eq!(type_from_declared("numeric(10,2)"), ValueType::Double);
/// assert_eq!(type_from_declared("varchar(20)"), ValueType::Text);
/// ```
pub fn type_from_declared(declared: &str) -> ValueType {
    let name = declared.to_lowercase();
    match name.as_str() {
        "integer" | "int" => ValueType::Int32,
        "double" | "float" | "real" => ValueType::Double,
        "blob" => ValueType::Bytes,
        "boolean" | "bool" => ValueType::Bool,
        _ if name.starts_with("numeric") => ValueType::Double,
        _ => ValueType::Text,
    }
}

/// Column type implied by a row's storage class. NULL and unknown classes
/// give [`ValueType::Unknown`].
pub(crate) fn type_from_storage(storage: i32) -> ValueType {
    match storage {
        ffi::SQLITE_INTEGER => ValueType::Int32,
        ffi::SQLITE_FLOAT => ValueType::Double,
        ffi::SQLITE_BLOB => ValueType::Bytes,
        ffi::SQLITE_TEXT => ValueType::Text,
        _ => ValueType::Unknown,
    }
}

/// Binds `value` to the 1-based parameter `index`; returns the engine code.
///
/// Text and blobs move into the statement without an engine-side copy.
/// Values without a native binding (`UInt64`, `Date`) are bound as their
/// string form.
pub(crate) fn bind_value(stmt: &mut RawStmt, index: i32, value: Value) -> i32 {
    match value {
        Value::Null(_) => stmt.bind_null(index),
        Value::Bytes(bytes) => stmt.bind_blob_retained(index, bytes),
        Value::Int32(n) => stmt.bind_int(index, n),
        Value::Bool(b) => stmt.bind_int(index, i32::from(b)),
        Value::Double(d) => stmt.bind_double(index, d),
        Value::UInt32(n) => stmt.bind_int64(index, i64::from(n)),
        Value::Int64(n) => stmt.bind_int64(index, n),
        Value::DateTime(dt) => {
            stmt.bind_text_transient(index, &dt.format(DATETIME_FORMAT).to_string())
        }
        Value::Time(t) => stmt.bind_text_transient(index, &t.format(TIME_FORMAT).to_string()),
        Value::Text(text) => stmt.bind_text_retained(index, text),
        other @ (Value::UInt64(_) | Value::Date(_)) => {
            stmt.bind_text_transient(index, &other.to_string())
        }
    }
}

/// Reads column `index` of the current row.
pub(crate) fn read_column(stmt: &RawStmt, index: i32, policy: PrecisionPolicy) -> Value {
    match stmt.column_type(index) {
        ffi::SQLITE_BLOB => Value::Bytes(stmt.column_blob(index)),
        ffi::SQLITE_INTEGER => Value::Int64(stmt.column_int64(index)),
        ffi::SQLITE_FLOAT => match policy {
            PrecisionPolicy::LowInt32 => Value::Int32(stmt.column_int(index)),
            PrecisionPolicy::LowInt64 => Value::Int64(stmt.column_int64(index)),
            PrecisionPolicy::LowDouble | PrecisionPolicy::High => {
                Value::Double(stmt.column_double(index))
            }
        },
        ffi::SQLITE_NULL => Value::Null(ValueType::Text),
        _ => Value::Text(stmt.column_text(index)),
    }
}
