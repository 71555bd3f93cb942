//! Encrypted database connection.
//!
//! A [`Connection`] owns the engine handle, the statement arena shared with
//! its cursors, the notification subscriptions and their inbox.
//!
//! # Example
//!
//! ```no_run
//! use cipher_sql_core::{Driver, SqlResult, TableType};
//! use cipher_sql_sqlite::Connection;
//!
//! let mut conn = Connection::new();
//! conn.open("vault.db", "correct horse", "BUSY_TIMEOUT=1000;ENABLE_REGEXP").unwrap();
//!
//! conn.transaction(|conn| {
//!     let mut cursor = conn.create_result();
//!     cursor.reset("CREATE TABLE IF NOT EXISTS notes(id INTEGER PRIMARY KEY, body TEXT)")?;
//!     cursor.reset("INSERT INTO notes(body) VALUES ('hello')")
//! })
//! .unwrap();
//!
//! println!("{:?}", conn.tables(TableType::TABLES));
//! ```

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

use cipher_sql_core::{
    Driver, DriverFeature, ErrorKind, IdentifierKind, Index, Notification, Record, Result,
    SqlError, SqlResult, TableType,
};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::cursor::Cursor;
use crate::error::engine_error;
use crate::escape;
use crate::ffi::RawDb;
use crate::notify::{Inbox, NotificationHandler};
use crate::options::ConnectOptions;
use crate::regexp::RegexCache;
use crate::schema;
use crate::statement::StatementHandle;

/// Query used to check that the key decrypts the database.
const KEY_CHECK_QUERY: &str = "SELECT count(*) FROM sqlite_master;";

pub(crate) type CursorId = u64;

/// State shared between a connection and its cursors.
///
/// Statements are declared before the engine handle so they are finalized
/// first when the last owner goes away.
pub(crate) struct Shared {
    pub(crate) statements: IndexMap<CursorId, StatementHandle>,
    pub(crate) db: Option<RawDb>,
    pub(crate) open_error: bool,
    next_cursor: CursorId,
    subscriptions: IndexSet<String>,
    inbox: Inbox,
    handler: Option<NotificationHandler>,
    last_error: Option<SqlError>,
}

impl Shared {
    fn new() -> Self {
        Self {
            statements: IndexMap::new(),
            db: None,
            open_error: false,
            next_cursor: 0,
            subscriptions: IndexSet::new(),
            inbox: Inbox::new(),
            handler: None,
            last_error: None,
        }
    }

    /// Allocates an empty statement slot.
    pub(crate) fn register(&mut self) -> CursorId {
        let id = self.next_cursor;
        self.next_cursor += 1;
        self.statements.insert(id, StatementHandle::default());
        id
    }

    /// Frees a statement slot, finalizing its statement.
    pub(crate) fn deregister(&mut self, id: CursorId) {
        self.statements.shift_remove(&id);
    }

    pub(crate) fn statement(&mut self, id: CursorId) -> &mut StatementHandle {
        self.statements.entry(id).or_default()
    }
}

/// A connection to an encrypted database file.
pub struct Connection {
    shared: Rc<RefCell<Shared>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Creates a closed connection.
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared::new())),
        }
    }

    /// Opens `path` with typed options, closing any open database first.
    ///
    /// The password's UTF-8 bytes are the encryption key; an empty password
    /// opens an unencrypted database. The key is checked by reading the
    /// catalog.
    ///
    /// # Errors
    ///
    /// Returns a connection error "Error opening database" if the file cannot
    /// be opened or the key cannot be applied, and "Incorrect password" if
    /// the key does not decrypt it. In
    /// both cases no handle is left open and [`is_open_error`](Driver::is_open_error)
    /// reports `true`.
    pub fn open_with(&mut self, path: &str, password: &str, options: &ConnectOptions) -> Result<()> {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!(%err, "failed to close previous database");
            }
        }

        let db = RawDb::open(path, options.open_flags())
            .map_err(|err| engine_error(ErrorKind::Connection, "Error opening database", err))
            .and_then(|db| {
                db.busy_timeout(options.busy_timeout);
                db.extended_result_codes(options.extended_result_codes);
                if let Err(err) = db.key(password.as_bytes()) {
                    let err = engine_error(ErrorKind::Connection, "Error opening database", err);
                    let _ = db.close();
                    return Err(err);
                }
                match db.exec(KEY_CHECK_QUERY) {
                    Ok(()) => Ok(db),
                    Err(err) => {
                        let err = engine_error(ErrorKind::Connection, "Incorrect password", err);
                        // The check already failed; a close failure adds nothing.
                        let _ = db.close();
                        Err(err)
                    }
                }
            });

        let mut shared = self.shared.borrow_mut();
        match db {
            Ok(db) => {
                if let Some(size) = options.regexp_cache_size {
                    if let Err(err) = db.create_regexp_function(RegexCache::new(size)) {
                        warn!(message = %err.message, "failed to register REGEXP");
                    }
                }
                shared.db = Some(db);
                shared.open_error = false;
                debug!(path, "opened database");
                Ok(())
            }
            Err(err) => {
                debug!(path, %err, "open failed");
                shared.open_error = true;
                shared.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Last connection-level error.
    pub fn last_error(&self) -> Option<SqlError> {
        self.shared.borrow().last_error.clone()
    }

    /// Opaque native engine handle, for interop only.
    pub fn raw_handle(&self) -> Option<*mut c_void> {
        self.shared.borrow().db.as_ref().map(RawDb::as_ptr)
    }

    /// Runs `f` inside a transaction: commits if it returns `Ok`, rolls back
    /// otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback_transaction() {
                    warn!(%rollback, "rollback after failure also failed");
                }
                Err(err)
            }
        }
    }

    /// Delivers queued row changes on subscribed tables, oldest first.
    ///
    /// Changes are queued by the engine while statements run; they are
    /// filtered against the current subscriptions only here. A handler set
    /// with [`set_notification_handler`](Self::set_notification_handler) sees
    /// each delivered notification too.
    pub fn poll_notifications(&self) -> Vec<Notification> {
        let (delivered, mut handler) = {
            let mut shared = self.shared.borrow_mut();
            let delivered = shared.inbox.drain(&shared.subscriptions);
            (delivered, shared.handler.take())
        };

        // The handler may use this connection, so no borrow is held here.
        if let Some(handler) = handler.as_mut() {
            for notification in &delivered {
                handler(notification);
            }
        }

        let mut shared = self.shared.borrow_mut();
        if shared.handler.is_none() {
            shared.handler = handler;
        }
        delivered
    }

    /// Sets the callback invoked for each notification delivered by
    /// [`poll_notifications`](Self::poll_notifications).
    pub fn set_notification_handler(&self, handler: impl FnMut(&Notification) + 'static) {
        self.shared.borrow_mut().handler = Some(Box::new(handler));
    }

    /// Removes the notification callback.
    pub fn clear_notification_handler(&self) {
        self.shared.borrow_mut().handler = None;
    }

    fn run_transaction_statement(&self, sql: &str, message: &str) -> Result<()> {
        if !self.is_open() || self.is_open_error() {
            return Err(SqlError::transaction(message, "Database not open"));
        }

        let mut cursor = self.create_result();
        cursor.reset(sql).map_err(|err| {
            let mut failure = SqlError::transaction(message, err.database_text);
            failure.code = err.code;
            self.shared.borrow_mut().last_error = Some(failure.clone());
            failure
        })
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> &Rc<RefCell<Shared>> {
        &self.shared
    }
}

impl Driver for Connection {
    type Result = Cursor;

    fn has_feature(&self, feature: DriverFeature) -> bool {
        match feature {
            DriverFeature::Blob
            | DriverFeature::Transactions
            | DriverFeature::Unicode
            | DriverFeature::LastInsertId
            | DriverFeature::PreparedQueries
            | DriverFeature::PositionalPlaceholders
            | DriverFeature::NamedPlaceholders
            | DriverFeature::SimpleLocking
            | DriverFeature::FinishQuery
            | DriverFeature::LowPrecisionNumbers
            | DriverFeature::EventNotifications => true,
            DriverFeature::QuerySize
            | DriverFeature::BatchOperations
            | DriverFeature::MultipleResultSets
            | DriverFeature::CancelQuery => false,
        }
    }

    /// Opens `path`; `options` is a `;`-separated option string, see
    /// [`ConnectOptions`].
    fn open(&mut self, path: &str, password: &str, options: &str) -> Result<()> {
        self.open_with(path, password, &ConnectOptions::parse(options))
    }

    /// Finalizes every cursor's statement, removes the notification hook and
    /// closes the engine handle. Cursors stay usable as objects but have no
    /// statement until prepared again.
    fn close(&mut self) -> Result<()> {
        let mut guard = self.shared.borrow_mut();
        let shared = &mut *guard;
        let Some(mut db) = shared.db.take() else {
            shared.open_error = false;
            return Ok(());
        };

        for handle in shared.statements.values_mut() {
            handle.finalize();
        }
        if !shared.subscriptions.is_empty() {
            shared.subscriptions.clear();
            db.clear_update_hook();
        }
        shared.inbox.clear();
        shared.open_error = false;

        match db.close() {
            Ok(()) => {
                debug!("closed database");
                Ok(())
            }
            Err(err) => {
                let err = engine_error(ErrorKind::Connection, "Error closing database", err);
                warn!(%err, "close failed");
                shared.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.shared.borrow().db.is_some()
    }

    fn is_open_error(&self) -> bool {
        self.shared.borrow().open_error
    }

    fn create_result(&self) -> Cursor {
        Cursor::new(Rc::clone(&self.shared))
    }

    fn begin_transaction(&self) -> Result<()> {
        self.run_transaction_statement("BEGIN", "Unable to begin transaction")
    }

    fn commit_transaction(&self) -> Result<()> {
        self.run_transaction_statement("COMMIT", "Unable to commit transaction")
    }

    fn rollback_transaction(&self) -> Result<()> {
        self.run_transaction_statement("ROLLBACK", "Unable to rollback transaction")
    }

    fn tables(&self, kinds: TableType) -> Vec<String> {
        schema::list_tables(self, kinds)
    }

    fn record(&self, table: &str) -> Record {
        if !self.is_open() {
            return Record::new();
        }
        let table = self.strip_delimiters(table, IdentifierKind::TableName);
        schema::table_info(self, &table, false)
    }

    fn primary_index(&self, table: &str) -> Index {
        if !self.is_open() {
            return Index::default();
        }
        let table = self.strip_delimiters(table, IdentifierKind::TableName);
        Index::new("", schema::table_info(self, &table, true))
    }

    fn escape_identifier(&self, identifier: &str, kind: IdentifierKind) -> String {
        escape::escape_identifier(identifier, kind)
    }

    /// Starts delivering changes on `name`. The engine hook is installed
    /// with the first subscription.
    fn subscribe(&self, name: &str) -> bool {
        let mut guard = self.shared.borrow_mut();
        let shared = &mut *guard;
        let Some(db) = shared.db.as_mut() else {
            warn!(name, "cannot subscribe: database not open");
            return false;
        };
        if !shared.subscriptions.insert(name.to_string()) {
            warn!(name, "already subscribed");
            return false;
        }
        if shared.subscriptions.len() == 1 {
            db.set_update_hook(shared.inbox.sender());
        }
        true
    }

    /// Stops delivering changes on `name`. The engine hook is removed with
    /// the last subscription.
    fn unsubscribe(&self, name: &str) -> bool {
        let mut guard = self.shared.borrow_mut();
        let shared = &mut *guard;
        let Some(db) = shared.db.as_mut() else {
            warn!(name, "cannot unsubscribe: database not open");
            return false;
        };
        if !shared.subscriptions.shift_remove(name) {
            warn!(name, "not subscribed");
            return false;
        }
        if shared.subscriptions.is_empty() {
            db.clear_update_hook();
        }
        true
    }

    fn subscribed(&self) -> Vec<String> {
        self.shared.borrow().subscriptions.iter().cloned().collect()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!(%err, "error closing database on drop");
            }
        }
    }
}
