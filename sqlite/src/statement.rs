//! Prepared statement handle with its column cache and peek-ahead row.
//!
//! Executing a statement must step it once to learn whether it produces rows.
//! The row consumed by that first step is parked in [`PendingRow`] and handed
//! out by the next [`StatementHandle::fetch_next`] without touching the
//! engine again.

use std::collections::{HashMap, HashSet};

use cipher_sql_core::{Field, PrecisionPolicy, Record, Result, SqlError, Value, ValueType};
use tracing::debug;

use crate::coerce;
use crate::ffi::{self, RawDb, RawStmt};

/// The row consumed by the initial step, waiting to be replayed.
#[derive(Debug, Clone, PartialEq)]
struct PendingRow {
    row: Vec<Value>,
    outcome: bool,
}

/// One prepared statement plus its fetch state.
#[derive(Default)]
pub(crate) struct StatementHandle {
    stmt: Option<RawStmt>,
    columns: Record,
    pending: Option<PendingRow>,
}

impl StatementHandle {
    /// Compiles `query`, replacing any previous statement.
    ///
    /// Exactly one statement is accepted; anything but whitespace or
    /// comments after it is a misuse error.
    pub(crate) fn prepare(&mut self, db: &RawDb, query: &str) -> Result<()> {
        self.finalize();

        let (stmt, tail) = db.prepare(query).map_err(|err| {
            SqlError::statement("Unable to execute statement", err.message).with_code(err.code)
        })?;
        if has_trailing_statement(db, tail) {
            drop(stmt);
            return Err(SqlError::statement(
                "Unable to execute multiple statements at a time",
                ffi::error_string(ffi::SQLITE_MISUSE),
            )
            .with_code(ffi::SQLITE_MISUSE));
        }

        debug!(query, "prepared statement");
        self.stmt = stmt;
        Ok(())
    }

    /// Releases the statement and the replay row. Idempotent.
    pub(crate) fn finalize(&mut self) {
        self.stmt = None;
        self.pending = None;
    }

    /// Releases everything, including the column descriptors.
    pub(crate) fn cleanup(&mut self) {
        self.finalize();
        self.columns.clear();
    }

    pub(crate) fn columns(&self) -> &Record {
        &self.columns
    }

    pub(crate) fn raw(&self) -> Option<&RawStmt> {
        self.stmt.as_ref()
    }

    /// Rewinds the statement without touching its bindings.
    pub(crate) fn rewind(&mut self) {
        if let Some(stmt) = self.stmt.as_mut() {
            stmt.reset();
        }
    }

    /// Binds `values`, then steps once and parks the first row.
    ///
    /// `names` maps each placeholder name to its positions in `values`; it is
    /// used to collapse repeated names onto the single engine slot they share.
    pub(crate) fn execute(
        &mut self,
        values: &[Value],
        names: &HashMap<String, Vec<usize>>,
        policy: PrecisionPolicy,
    ) -> Result<()> {
        self.columns.clear();
        self.pending = None;

        if let Some(stmt) = self.stmt.as_mut() {
            let rc = stmt.reset();
            if rc != ffi::SQLITE_OK {
                let err = SqlError::statement("Unable to reset statement", stmt.errmsg()).with_code(rc);
                self.finalize();
                return Err(err);
            }

            let Some(values) = reconcile_parameters(stmt, values, names) else {
                stmt.clear_bindings();
                return Err(SqlError::statement("Parameter count mismatch", ""));
            };

            stmt.clear_bindings();
            for (i, value) in values.into_iter().enumerate() {
                let rc = coerce::bind_value(stmt, (i + 1) as i32, value);
                if rc != ffi::SQLITE_OK {
                    let err = SqlError::statement("Unable to bind parameters", stmt.errmsg()).with_code(rc);
                    self.finalize();
                    return Err(err);
                }
            }
        } else if !values.is_empty() {
            return Err(SqlError::statement("Parameter count mismatch", ""));
        }

        let width = self.stmt.as_ref().map_or(0, RawStmt::column_count);
        let mut row = vec![Value::NULL; width];
        let fetched = self.step(Some(&mut row), policy);
        self.pending = Some(PendingRow {
            row,
            outcome: matches!(fetched, Ok(true)),
        });
        fetched.map(|_| ())
    }

    /// Moves to the next row.
    ///
    /// A parked row is replayed first. With `None` as target the row is only
    /// confirmed, not read. Returns `Ok(false)` when the rows are exhausted;
    /// on failure the statement has been reset and can be executed again.
    pub(crate) fn fetch_next(&mut self, target: Option<&mut [Value]>, policy: PrecisionPolicy) -> Result<bool> {
        if let Some(pending) = self.pending.take() {
            if let Some(target) = target {
                for (slot, value) in target.iter_mut().zip(pending.row) {
                    *slot = value;
                }
            }
            return Ok(pending.outcome);
        }
        self.step(target, policy)
    }

    fn step(&mut self, target: Option<&mut [Value]>, policy: PrecisionPolicy) -> Result<bool> {
        let Some(stmt) = self.stmt.as_mut() else {
            return Err(SqlError::connection("Unable to fetch row", "No query"));
        };

        let rc = stmt.step();
        match ffi::primary_code(rc) {
            ffi::SQLITE_ROW => {
                if self.columns.is_empty() {
                    self.columns = describe_columns(stmt, false);
                }
                let Some(target) = target else {
                    return Ok(true);
                };
                for (i, slot) in target.iter_mut().enumerate().take(self.columns.len()) {
                    *slot = coerce::read_column(stmt, i as i32, policy);
                }
                Ok(true)
            }
            ffi::SQLITE_DONE => {
                if self.columns.is_empty() {
                    self.columns = describe_columns(stmt, true);
                }
                stmt.reset();
                Ok(false)
            }
            ffi::SQLITE_CONSTRAINT | ffi::SQLITE_ERROR => {
                // The step code is generic; reset yields the specific one.
                let rc = stmt.reset();
                Err(SqlError::connection("Unable to fetch row", stmt.errmsg()).with_code(rc))
            }
            _ => {
                let err = SqlError::connection("Unable to fetch row", stmt.errmsg()).with_code(rc);
                stmt.reset();
                Err(err)
            }
        }
    }
}

/// Builds column descriptors from statement metadata.
///
/// On an empty result the per-row storage class is meaningless, so only the
/// declared type is used.
fn describe_columns(stmt: &RawStmt, empty: bool) -> Record {
    (0..stmt.column_count() as i32)
        .map(|i| {
            let name = stmt.column_name(i).replace('"', "");
            let declared = stmt.column_decltype(i);
            let storage = (!empty).then(|| stmt.column_type(i));
            let value_type = if !declared.is_empty() {
                coerce::type_from_declared(&declared)
            } else {
                storage.map_or(ValueType::Unknown, coerce::type_from_storage)
            };
            Field::new(name, value_type).with_sql_type(storage)
        })
        .collect()
}

/// Matches the supplied values to the statement's parameter slots.
///
/// Repeated named placeholders share one engine slot, so when there are
/// more values than slots each slot's name is looked up and the first value
/// bound to that name is taken. Returns `None` when the values cannot be
/// matched.
fn reconcile_parameters(
    stmt: &RawStmt,
    values: &[Value],
    names: &HashMap<String, Vec<usize>>,
) -> Option<Vec<Value>> {
    let slots = stmt.parameter_count();
    if slots == values.len() {
        return Some(values.to_vec());
    }
    if slots == 0 || slots > values.len() {
        return None;
    }

    let mut pruned = Vec::with_capacity(slots);
    let mut handled = HashSet::new();
    for i in 0..values.len() {
        if handled.contains(&i) {
            continue;
        }
        let name = stmt.parameter_name(pruned.len() + 1)?;
        let positions = names.get(&name).filter(|positions| !positions.is_empty())?;
        handled.extend(positions.iter().copied());
        pruned.push(values.get(positions[0])?.clone());
    }
    (pruned.len() == slots).then_some(pruned)
}

/// Whether `tail` holds anything other than whitespace and comments.
fn has_trailing_statement(db: &RawDb, tail: &str) -> bool {
    let mut rest = tail;
    loop {
        if rest.trim().is_empty() {
            return false;
        }
        match db.prepare(rest) {
            Ok((None, next)) if next.len() < rest.len() => rest = next,
            _ => return true,
        }
    }
}
