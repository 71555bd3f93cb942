//! Per-query cursor.
//!
//! A [`Cursor`] is created by [`Connection`](crate::Connection) through
//! [`Driver::create_result`](cipher_sql_core::Driver::create_result). Its
//! prepared statement lives in a slot of the connection's statement arena,
//! keyed by the cursor's id, so the connection can finalize every statement
//! on close. Dropping the cursor frees the slot.
//!
//! # Example
//!
//! ```no_run
//! use cipher_sql_core::{Driver, SqlResult, Value};
//! use cipher_sql_sqlite::Connection;
//!
//! let mut conn = Connection::new();
//! conn.open("app.db", "secret", "").unwrap();
//!
//! let mut cursor = conn.create_result();
//! cursor.prepare("SELECT name FROM users WHERE age > :age").unwrap();
//! cursor.bound_values_mut().bind_name(":age", Value::Int32(30));
//! cursor.exec().unwrap();
//! while cursor.next().unwrap() {
//!     println!("{}", cursor.value(0).unwrap());
//! }
//! ```

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

use cipher_sql_core::{
    BoundValues, Location, PrecisionPolicy, Record, Result, ResultBuffer, RowFetcher, SqlError,
    SqlResult, Value,
};

use crate::connection::{CursorId, Shared};
use crate::ffi::RawStmt;

/// Cursor over one prepared statement of a [`Connection`](crate::Connection).
pub struct Cursor {
    shared: Rc<RefCell<Shared>>,
    id: CursorId,
    bound: BoundValues,
    buffer: ResultBuffer,
    active: bool,
    select: bool,
    precision: PrecisionPolicy,
    last_error: Option<SqlError>,
}

impl Cursor {
    pub(crate) fn new(shared: Rc<RefCell<Shared>>) -> Self {
        let id = shared.borrow_mut().register();
        Self {
            shared,
            id,
            bound: BoundValues::new(),
            buffer: ResultBuffer::new(false),
            active: false,
            select: false,
            precision: PrecisionPolicy::default(),
            last_error: None,
        }
    }

    /// Keeps only the current row instead of caching every row. Takes
    /// effect on the next execution; a live result keeps its mode.
    pub fn set_forward_only(&mut self, forward_only: bool) {
        self.buffer.set_forward_only(forward_only);
    }

    /// Whether only the current row is kept.
    pub fn is_forward_only(&self) -> bool {
        self.buffer.is_forward_only()
    }

    /// Moves to the previous row (scrollable cursors only).
    pub fn previous(&mut self) -> Result<bool> {
        self.navigate(|buffer, fetcher| buffer.fetch_previous(fetcher))
    }

    /// Moves to the first row.
    pub fn first(&mut self) -> Result<bool> {
        self.navigate(|buffer, fetcher| buffer.fetch_first(fetcher))
    }

    /// Moves to the last row.
    pub fn last(&mut self) -> Result<bool> {
        self.navigate(|buffer, fetcher| buffer.fetch_last(fetcher))
    }

    /// All values of the current row.
    pub fn row(&self) -> Option<&[Value]> {
        self.buffer.row()
    }

    /// Executes the prepared statement once per row of `rows`, binding each
    /// row positionally.
    ///
    /// Stops at the first failing row. The previously bound values are
    /// restored afterwards.
    ///
    /// # Errors
    ///
    /// Fails if `rows` is empty or any execution fails.
    pub fn exec_batch(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        if rows.is_empty() {
            return Err(SqlError::statement("Unable to execute batch", "No values to bind"));
        }

        let layout = self.bound.clone();
        let mut outcome = Ok(());
        for row in rows {
            self.bound = layout.clone();
            self.bound.clear_values();
            for (pos, value) in row.iter().enumerate() {
                self.bound.bind_at(pos, value.clone());
            }
            if let Err(err) = self.exec() {
                outcome = Err(err);
                break;
            }
        }
        self.bound = layout;
        outcome
    }

    /// Opaque native statement handle, for interop only.
    pub fn raw_statement(&self) -> Option<*mut c_void> {
        self.shared
            .borrow()
            .statements
            .get(&self.id)
            .and_then(|handle| handle.raw().map(RawStmt::as_ptr))
    }

    fn navigate(
        &mut self,
        op: impl FnOnce(&mut ResultBuffer, &mut StepFetcher<'_>) -> bool,
    ) -> Result<bool> {
        if !self.active || !self.select {
            return Ok(false);
        }

        let mut error = None;
        let mut fetcher = StepFetcher {
            shared: &self.shared,
            id: self.id,
            policy: self.precision,
            error: &mut error,
        };
        let found = op(&mut self.buffer, &mut fetcher);
        match error {
            Some(err) => {
                self.last_error = Some(err.clone());
                Err(err)
            }
            None => Ok(found),
        }
    }

    fn fail(&mut self, err: SqlError) -> SqlError {
        self.last_error = Some(err.clone());
        err
    }
}

/// Steps the cursor's statement on behalf of the [`ResultBuffer`].
struct StepFetcher<'a> {
    shared: &'a RefCell<Shared>,
    id: CursorId,
    policy: PrecisionPolicy,
    error: &'a mut Option<SqlError>,
}

impl RowFetcher for StepFetcher<'_> {
    fn goto_next(&mut self, row: Option<&mut [Value]>) -> bool {
        let mut shared = self.shared.borrow_mut();
        match shared.statement(self.id).fetch_next(row, self.policy) {
            Ok(found) => found,
            Err(err) => {
                *self.error = Some(err);
                false
            }
        }
    }
}

impl SqlResult for Cursor {
    fn prepare(&mut self, query: &str) -> Result<()> {
        self.finish();
        self.bound = BoundValues::for_query(query);

        let result = {
            let mut guard = self.shared.borrow_mut();
            let shared = &mut *guard;
            match shared.db.as_ref().filter(|_| !shared.open_error) {
                Some(db) => shared
                    .statements
                    .entry(self.id)
                    .or_default()
                    .prepare(db, query),
                None => Err(SqlError::connection(
                    "Unable to execute statement",
                    "Database not open",
                )),
            }
        };
        result.map_err(|err| self.fail(err))
    }

    fn exec(&mut self) -> Result<()> {
        self.last_error = None;
        self.buffer.clear();

        let result = {
            let mut shared = self.shared.borrow_mut();
            let handle = shared.statement(self.id);
            handle
                .execute(self.bound.values(), self.bound.indexes(), self.precision)
                .map(|()| handle.columns().len())
        };

        match result {
            Ok(columns) => {
                self.select = columns > 0;
                self.active = true;
                self.buffer.init(columns);
                Ok(())
            }
            Err(err) => {
                self.select = false;
                self.active = false;
                Err(self.fail(err))
            }
        }
    }

    fn bound_values(&self) -> &BoundValues {
        &self.bound
    }

    fn bound_values_mut(&mut self) -> &mut BoundValues {
        &mut self.bound
    }

    fn next(&mut self) -> Result<bool> {
        self.navigate(|buffer, fetcher| buffer.fetch_next(fetcher))
    }

    fn seek(&mut self, index: usize) -> Result<bool> {
        self.navigate(|buffer, fetcher| buffer.fetch(fetcher, index))
    }

    fn value(&self, index: usize) -> Option<&Value> {
        self.buffer.value(index)
    }

    fn at(&self) -> Location {
        self.buffer.at()
    }

    fn record(&self) -> Record {
        if !self.active || !self.select {
            return Record::new();
        }
        self.shared
            .borrow()
            .statements
            .get(&self.id)
            .map(|handle| handle.columns().clone())
            .unwrap_or_default()
    }

    /// Always `None`: the engine cannot count rows ahead of iteration.
    fn size(&self) -> Option<usize> {
        None
    }

    /// Rows changed by the most recent statement on the whole connection,
    /// not just this cursor.
    fn rows_affected(&self) -> u64 {
        self.shared
            .borrow()
            .db
            .as_ref()
            .map_or(0, |db| u64::try_from(db.changes()).unwrap_or(0))
    }

    fn last_insert_id(&self) -> Option<Value> {
        if !self.active {
            return None;
        }
        let shared = self.shared.borrow();
        let id = shared.db.as_ref()?.last_insert_rowid();
        (id != 0).then_some(Value::Int64(id))
    }

    fn detach_from_result_set(&mut self) {
        if let Some(handle) = self.shared.borrow_mut().statements.get_mut(&self.id) {
            handle.rewind();
        }
    }

    fn finish(&mut self) {
        if let Some(handle) = self.shared.borrow_mut().statements.get_mut(&self.id) {
            handle.cleanup();
        }
        self.buffer.clear();
        self.active = false;
        self.select = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_select(&self) -> bool {
        self.select
    }

    fn last_error(&self) -> Option<&SqlError> {
        self.last_error.as_ref()
    }

    fn precision_policy(&self) -> PrecisionPolicy {
        self.precision
    }

    fn set_precision_policy(&mut self, policy: PrecisionPolicy) {
        self.precision = policy;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.try_borrow_mut() {
            shared.deregister(self.id);
        }
    }
}
