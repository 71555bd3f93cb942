//! Driver and result traits, capability tags and related enums.
//!
//! A driver binds this abstraction to a concrete engine. [`Driver`] is the
//! connection-level surface (open/close, transactions, introspection,
//! notifications); [`SqlResult`] is the per-query surface (prepare, bind,
//! execute, navigate rows).

use std::ops::BitOr;

use serde::Serialize;

use crate::buffer::Location;
use crate::error::{Result, SqlError};
use crate::params::BoundValues;
use crate::record::{Index, Record};
use crate::value::Value;

/// Capability tags a driver can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFeature {
    /// Binary blob values.
    Blob,
    /// BEGIN/COMMIT/ROLLBACK.
    Transactions,
    /// Unicode text.
    Unicode,
    /// Retrieval of the last generated row id.
    LastInsertId,
    /// Prepared statements.
    PreparedQueries,
    /// `?` placeholders.
    PositionalPlaceholders,
    /// `:name` placeholders.
    NamedPlaceholders,
    /// Only simple (non-shared) locking.
    SimpleLocking,
    /// Explicit release of query resources.
    FinishQuery,
    /// Reduced-precision numeric materialization.
    LowPrecisionNumbers,
    /// Change-event notifications.
    EventNotifications,
    /// Result size known before iteration.
    QuerySize,
    /// Native batch execution.
    BatchOperations,
    /// Several result sets from one query.
    MultipleResultSets,
    /// Interrupting a running query.
    CancelQuery,
}

/// Bitmask of catalog entry kinds for [`Driver::tables`].
///
/// # Examples
///
/// ```
/// use cipher_sql_core::TableType;
///
/// let kinds = TableType::TABLES | TableType::VIEWS;
/// assert!(kinds.contains(TableType::VIEWS));
/// assert!(!kinds.contains(TableType::SYSTEM_TABLES));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TableType(u8);

impl TableType {
    /// User tables.
    pub const TABLES: Self = Self(0x01);
    /// Views.
    pub const VIEWS: Self = Self(0x02);
    /// Engine-internal tables.
    pub const SYSTEM_TABLES: Self = Self(0x04);
    /// Everything.
    pub const ALL: Self = Self(0xff);

    /// Returns `true` if every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TableType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What an identifier passed to the escaping helpers names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// A column or other plain identifier.
    FieldName,
    /// A table name, possibly schema-qualified with `.`.
    TableName,
}

/// How floating-point columns are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrecisionPolicy {
    /// Truncate to a 32-bit integer.
    LowInt32,
    /// Truncate to a 64-bit integer.
    LowInt64,
    /// Keep the native double.
    #[default]
    LowDouble,
    /// Keep the native double.
    High,
}

/// Kind of row change reported by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeOperation {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
    /// Operation code the driver does not recognise.
    Unknown,
}

/// A table-level change event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Subscription name, i.e. the changed table.
    pub name: String,
    /// Row id of the changed row.
    pub row_id: i64,
    /// What happened to the row.
    pub operation: ChangeOperation,
    /// Attached database the table lives in (e.g. `main`).
    pub database: String,
}

/// Per-query surface of a driver.
pub trait SqlResult {
    /// Compiles `query`, discarding any previous statement.
    fn prepare(&mut self, query: &str) -> Result<()>;

    /// Binds the current values and executes the prepared statement.
    fn exec(&mut self) -> Result<()>;

    /// Prepares and executes `query`.
    fn reset(&mut self, query: &str) -> Result<()> {
        self.prepare(query)?;
        self.exec()
    }

    /// Values to bind on the next [`exec`](Self::exec).
    fn bound_values(&self) -> &BoundValues;

    /// Mutable access to the values to bind.
    fn bound_values_mut(&mut self) -> &mut BoundValues;

    /// Advances to the next row; `Ok(false)` once the rows are exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Moves to the zero-based row `index`.
    fn seek(&mut self, index: usize) -> Result<bool>;

    /// Value of column `index` in the current row.
    fn value(&self, index: usize) -> Option<&Value>;

    /// Current position.
    fn at(&self) -> Location;

    /// Column descriptors of an active row-producing query.
    fn record(&self) -> Record;

    /// Result size, if the driver knows it before iteration.
    fn size(&self) -> Option<usize>;

    /// Rows changed by the last data-modifying statement.
    fn rows_affected(&self) -> u64;

    /// Id generated by the last insert.
    fn last_insert_id(&self) -> Option<Value>;

    /// Called when the owner stops iterating before the end.
    fn detach_from_result_set(&mut self);

    /// Releases the statement and all result state.
    fn finish(&mut self);

    /// Whether the last execution succeeded and has not been finished.
    fn is_active(&self) -> bool;

    /// Whether the active query produces rows.
    fn is_select(&self) -> bool;

    /// Last error recorded by this result.
    fn last_error(&self) -> Option<&SqlError>;

    /// Policy for materializing floating-point columns.
    fn precision_policy(&self) -> PrecisionPolicy;

    /// Changes the floating-point materialization policy.
    fn set_precision_policy(&mut self, policy: PrecisionPolicy);
}

/// Connection-level surface of a driver.
pub trait Driver {
    /// Result type produced by [`create_result`](Self::create_result).
    type Result: SqlResult;

    /// Reports whether the driver supports `feature`.
    fn has_feature(&self, feature: DriverFeature) -> bool;

    /// Opens `path`, closing any connection already open.
    fn open(&mut self, path: &str, password: &str, options: &str) -> Result<()>;

    /// Closes the connection.
    fn close(&mut self) -> Result<()>;

    /// Whether a connection is open.
    fn is_open(&self) -> bool;

    /// Whether the last [`open`](Self::open) failed.
    fn is_open_error(&self) -> bool;

    /// Creates a result bound to this connection.
    fn create_result(&self) -> Self::Result;

    /// Starts a transaction.
    fn begin_transaction(&self) -> Result<()>;

    /// Commits the current transaction.
    fn commit_transaction(&self) -> Result<()>;

    /// Rolls back the current transaction.
    fn rollback_transaction(&self) -> Result<()>;

    /// Names of catalog entries of the requested kinds.
    fn tables(&self, kinds: TableType) -> Vec<String>;

    /// All columns of `table`.
    fn record(&self, table: &str) -> Record;

    /// Primary key columns of `table`.
    fn primary_index(&self, table: &str) -> Index;

    /// Quotes `identifier` for use in SQL.
    fn escape_identifier(&self, identifier: &str, kind: IdentifierKind) -> String;

    /// Whether `identifier` is already quoted.
    fn is_identifier_escaped(&self, identifier: &str, _kind: IdentifierKind) -> bool {
        identifier.len() > 2 && identifier.starts_with('"') && identifier.ends_with('"')
    }

    /// Removes the surrounding quotes of an escaped identifier.
    fn strip_delimiters(&self, identifier: &str, kind: IdentifierKind) -> String {
        if self.is_identifier_escaped(identifier, kind) {
            identifier[1..identifier.len() - 1].to_string()
        } else {
            identifier.to_string()
        }
    }

    /// Subscribes to change events for `name`.
    fn subscribe(&self, name: &str) -> bool;

    /// Cancels the subscription for `name`.
    fn unsubscribe(&self, name: &str) -> bool;

    /// Current subscriptions in subscription order.
    fn subscribed(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_type_all_contains_everything() {
        assert!(TableType::ALL.contains(TableType::TABLES));
        assert!(TableType::ALL.contains(TableType::SYSTEM_TABLES));
        assert!(!TableType::default().contains(TableType::TABLES));
    }

    #[test]
    fn test_default_precision_policy_keeps_doubles() {
        assert_eq!(PrecisionPolicy::default(), PrecisionPolicy::LowDouble);
    }
}
