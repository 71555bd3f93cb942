//! Generic SQL-access abstraction for embedded database drivers.
//!
//! This crate defines the engine-independent surface a driver plugs into:
//!
//! - [`Value`] / [`ValueType`]: the tagged value model for parameters and
//!   result columns.
//! - [`Field`], [`Record`], [`Index`]: column, row-shape and key
//!   descriptors.
//! - [`BoundValues`]: positional and named parameter binding, with the
//!   name-to-positions map needed to collapse repeated placeholders.
//! - [`ResultBuffer`] / [`RowFetcher`]: buffered cursor navigation over a
//!   driver's step-wise row source.
//! - [`Driver`] / [`SqlResult`]: the connection and per-query traits, with
//!   [`DriverFeature`] capability tags.
//! - [`SqlError`]: the connection / statement / transaction error taxonomy.
//!
//! # Example
//!
//! ```
//! use cipher_sql_core::*;
//!
//! let mut params = BoundValues::for_query("INSERT INTO t VALUES (:id, :name)");
//! params.bind_name(":id", Value::Int64(1));
//! params.bind_name(":name", Value::from("alice"));
//! assert_eq!(params.values(), &[Value::Int64(1), Value::from("alice")]);
//!
//! let mut record = Record::new();
//! record.append(Field::new("id", ValueType::Int32).with_auto_value(true));
//! assert_eq!(record.index_of("ID"), Some(0));
//! ```

mod buffer;
mod driver;
mod error;
mod params;
mod record;
mod value;

pub use buffer::{Location, ResultBuffer, RowFetcher};
pub use driver::{
    ChangeOperation, Driver, DriverFeature, IdentifierKind, Notification, PrecisionPolicy,
    SqlResult, TableType,
};
pub use error::{ErrorKind, Result, SqlError};
pub use params::{BoundValues, Placeholder, scan_placeholders};
pub use record::{Field, Index, Record};
pub use value::{DATE_FORMAT, DATETIME_FORMAT, TIME_FORMAT, Value, ValueType};
