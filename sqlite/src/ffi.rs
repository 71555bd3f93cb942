//! Thin safe wrappers over the engine's C surface.
//!
//! This is the **only** module that contains `unsafe` code or C types. Every
//! other module talks to the engine through [`RawDb`] and [`RawStmt`], which
//! own their native handles and release them on drop.
//!
//! Handle ownership rules:
//!
//! - A [`RawStmt`] must be dropped before the [`RawDb`] it was prepared on is
//!   closed. The connection enforces this by finalizing every statement in
//!   its arena before closing; [`RawDb::close`] falls back to
//!   `sqlite3_close_v2` so a leaked statement never leaves a dangling handle.
//! - Text and blob parameters bound without a copy are moved into the
//!   statement's retained buffers and stay there until the bindings are
//!   cleared, so the engine never reads freed memory.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr::{self, NonNull};
use std::sync::mpsc::Sender;

use rusqlite::ffi;

use crate::regexp::RegexCache;

pub(crate) use ffi::{
    SQLITE_BLOB, SQLITE_CONSTRAINT, SQLITE_DELETE, SQLITE_DONE, SQLITE_ERROR,
    SQLITE_FLOAT, SQLITE_INSERT, SQLITE_INTEGER, SQLITE_MISUSE, SQLITE_NULL, SQLITE_OK,
    SQLITE_OPEN_CREATE, SQLITE_OPEN_NOMUTEX, SQLITE_OPEN_PRIVATECACHE, SQLITE_OPEN_READONLY,
    SQLITE_OPEN_READWRITE, SQLITE_OPEN_SHAREDCACHE, SQLITE_OPEN_URI, SQLITE_ROW, SQLITE_TEXT,
    SQLITE_UPDATE,
};

unsafe extern "C" {
    // Exported by the SQLCipher amalgamation linked in by libsqlite3-sys.
    fn sqlite3_key(db: *mut ffi::sqlite3, key: *const c_void, len: c_int) -> c_int;
    // Exported by the amalgamation but omitted from libsqlite3-sys's bindings.
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// Failure reported by the engine: result code plus its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Row change reported by the update hook, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawChange {
    pub operation: i32,
    pub database: String,
    pub table: String,
    pub row_id: i64,
}

/// Primary result code of a possibly extended code.
pub(crate) fn primary_code(code: i32) -> i32 {
    code & 0xff
}

/// Engine's English description of a result code.
pub(crate) fn error_string(code: i32) -> String {
    // SAFETY: sqlite3_errstr returns a pointer to a static string.
    unsafe { cstr_to_string(ffi::sqlite3_errstr(code)) }
}

/// Result of a keying call.
fn key_status(rc: i32) -> Result<(), EngineError> {
    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(EngineError::new(rc, error_string(rc)))
    }
}

/// Copies a nullable C string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: guaranteed by the caller.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// An open engine connection handle.
pub(crate) struct RawDb {
    db: *mut ffi::sqlite3,
    hook: *mut Sender<RawChange>,
}

impl RawDb {
    /// Opens `path` with the given `SQLITE_OPEN_*` flags.
    ///
    /// A half-open handle is closed before the error is returned.
    pub(crate) fn open(path: &str, flags: i32) -> Result<Self, EngineError> {
        let c_path = CString::new(path)
            .map_err(|_| EngineError::new(SQLITE_MISUSE, "path contains a NUL byte"))?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: c_path is NUL-terminated and db is a valid out pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: sqlite3_open_v2 hands out a handle even on failure;
                // it must still be closed.
                unsafe {
                    let message = cstr_to_string(ffi::sqlite3_errmsg(db));
                    ffi::sqlite3_close(db);
                    message
                }
            };
            return Err(EngineError::new(rc, message));
        }

        Ok(Self {
            db,
            hook: ptr::null_mut(),
        })
    }

    /// Closes the handle.
    ///
    /// If the engine refuses (statements still alive) the handle is handed to
    /// `sqlite3_close_v2`, which releases it once the last statement is gone,
    /// and the refusal is reported.
    pub(crate) fn close(mut self) -> Result<(), EngineError> {
        self.clear_update_hook();
        let db = std::mem::replace(&mut self.db, ptr::null_mut());
        // SAFETY: db is a live handle owned by self.
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc == SQLITE_OK {
            return Ok(());
        }
        // SAFETY: db is still live because sqlite3_close failed.
        let message = unsafe { cstr_to_string(ffi::sqlite3_errmsg(db)) };
        // SAFETY: as above; close_v2 defers the release.
        unsafe { sqlite3_close_v2(db) };
        Err(EngineError::new(rc, message))
    }

    /// Applies the encryption key. The bytes are passed through verbatim; an
    /// empty key leaves the database unencrypted.
    pub(crate) fn key(&self, key: &[u8]) -> Result<(), EngineError> {
        if key.is_empty() {
            return Ok(());
        }
        let Ok(len) = c_int::try_from(key.len()) else {
            return key_status(ffi::SQLITE_TOOBIG);
        };
        // SAFETY: key points to len readable bytes; the engine copies them.
        key_status(unsafe { sqlite3_key(self.db, key.as_ptr().cast(), len) })
    }

    /// Runs one or more statements, discarding rows.
    pub(crate) fn exec(&self, sql: &str) -> Result<(), EngineError> {
        let c_sql = CString::new(sql)
            .map_err(|_| EngineError::new(SQLITE_MISUSE, "SQL contains a NUL byte"))?;
        let mut errmsg: *mut c_char = ptr::null_mut();

        // SAFETY: all pointers are valid; errmsg is freed below.
        let rc = unsafe { ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
        if rc == SQLITE_OK {
            return Ok(());
        }
        let message = if errmsg.is_null() {
            self.errmsg()
        } else {
            // SAFETY: errmsg was allocated by sqlite3_exec.
            unsafe {
                let message = cstr_to_string(errmsg);
                ffi::sqlite3_free(errmsg.cast());
                message
            }
        };
        Err(EngineError::new(rc, message))
    }

    /// Compiles the first statement of `sql`.
    ///
    /// Returns the statement (absent when `sql` holds only whitespace or
    /// comments) and the unparsed remainder.
    pub(crate) fn prepare<'s>(&self, sql: &'s str) -> Result<(Option<RawStmt>, &'s str), EngineError> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| EngineError::new(ffi::SQLITE_TOOBIG, "statement too long"))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: sql points to len bytes; stmt and tail are valid out pointers.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db, sql.as_ptr().cast(), len, &mut stmt, &mut tail)
        };
        if rc != SQLITE_OK {
            if !stmt.is_null() {
                // SAFETY: stmt came from the failed prepare call.
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(EngineError::new(rc, self.errmsg()));
        }

        let rest = if tail.is_null() {
            ""
        } else {
            let offset = (tail as usize).saturating_sub(sql.as_ptr() as usize);
            sql.get(offset..).unwrap_or("")
        };
        let stmt = NonNull::new(stmt).map(|stmt| RawStmt {
            stmt,
            retained_text: Vec::new(),
            retained_blobs: Vec::new(),
        });
        Ok((stmt, rest))
    }

    pub(crate) fn busy_timeout(&self, millis: i32) {
        // SAFETY: db is live.
        unsafe { ffi::sqlite3_busy_timeout(self.db, millis) };
    }

    pub(crate) fn extended_result_codes(&self, enabled: bool) {
        // SAFETY: db is live.
        unsafe { ffi::sqlite3_extended_result_codes(self.db, c_int::from(enabled)) };
    }

    /// Rows changed by the most recent statement on this connection.
    pub(crate) fn changes(&self) -> i64 {
        // SAFETY: db is live.
        i64::from(unsafe { ffi::sqlite3_changes(self.db) })
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is live.
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Most recent error message on this connection.
    pub(crate) fn errmsg(&self) -> String {
        // SAFETY: db is live; the message is copied before any other call.
        unsafe { cstr_to_string(ffi::sqlite3_errmsg(self.db)) }
    }

    /// Opaque handle for interop. Never dereferenced by this crate.
    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.db.cast()
    }

    /// Installs the row-change hook, replacing any previous one.
    ///
    /// The callback only forwards each change into `sender`.
    pub(crate) fn set_update_hook(&mut self, sender: Sender<RawChange>) {
        self.clear_update_hook();
        let data = Box::into_raw(Box::new(sender));
        // SAFETY: data stays alive until clear_update_hook removes the hook.
        unsafe { ffi::sqlite3_update_hook(self.db, Some(update_hook_trampoline), data.cast()) };
        self.hook = data;
    }

    /// Removes the row-change hook, if installed.
    pub(crate) fn clear_update_hook(&mut self) {
        if self.hook.is_null() {
            return;
        }
        // SAFETY: the hook is removed before its user data is freed.
        unsafe {
            ffi::sqlite3_update_hook(self.db, None, ptr::null_mut());
            drop(Box::from_raw(self.hook));
        }
        self.hook = ptr::null_mut();
    }

    /// Registers the two-argument `regexp` SQL function backed by `cache`.
    ///
    /// The engine owns the cache from here on and frees it when the function
    /// is replaced or the connection closes.
    pub(crate) fn create_regexp_function(&self, cache: RegexCache) -> Result<(), EngineError> {
        let data = Box::into_raw(Box::new(cache));
        // SAFETY: on failure the engine invokes the destructor itself.
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                self.db,
                c"regexp".as_ptr(),
                2,
                ffi::SQLITE_UTF8 | ffi::SQLITE_DETERMINISTIC,
                data.cast(),
                Some(regexp_trampoline),
                None,
                None,
                Some(regexp_destroy),
            )
        };
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(EngineError::new(rc, self.errmsg()))
        }
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        if self.db.is_null() {
            return;
        }
        self.clear_update_hook();
        // SAFETY: db is live; close_v2 tolerates unfinalized statements.
        unsafe { sqlite3_close_v2(self.db) };
    }
}

/// A prepared statement handle. Finalized on drop.
pub(crate) struct RawStmt {
    stmt: NonNull<ffi::sqlite3_stmt>,
    retained_text: Vec<String>,
    retained_blobs: Vec<Vec<u8>>,
}

impl RawStmt {
    fn ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt.as_ptr()
    }

    /// Rewinds the statement. Returns the code of the last failed step, if any.
    pub(crate) fn reset(&mut self) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_reset(self.ptr()) }
    }

    /// Sets every parameter back to NULL and releases retained buffers.
    pub(crate) fn clear_bindings(&mut self) {
        // SAFETY: stmt is live; after this no parameter points into the
        // retained buffers.
        unsafe { ffi::sqlite3_clear_bindings(self.ptr()) };
        self.retained_text.clear();
        self.retained_blobs.clear();
    }

    /// Advances the statement; returns the raw result code.
    pub(crate) fn step(&mut self) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_step(self.ptr()) }
    }

    /// Error message of the owning connection.
    pub(crate) fn errmsg(&self) -> String {
        // SAFETY: the owning connection outlives the statement.
        unsafe { cstr_to_string(ffi::sqlite3_errmsg(ffi::sqlite3_db_handle(self.ptr()))) }
    }

    pub(crate) fn parameter_count(&self) -> usize {
        // SAFETY: stmt is live.
        usize::try_from(unsafe { ffi::sqlite3_bind_parameter_count(self.ptr()) }).unwrap_or(0)
    }

    /// Name of the 1-based parameter `index`, including its prefix.
    pub(crate) fn parameter_name(&self, index: usize) -> Option<String> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: stmt is live; out-of-range indexes yield NULL.
        let name = unsafe { ffi::sqlite3_bind_parameter_name(self.ptr(), index) };
        if name.is_null() {
            None
        } else {
            // SAFETY: non-null names are NUL-terminated.
            Some(unsafe { cstr_to_string(name) })
        }
    }

    pub(crate) fn bind_null(&mut self, index: c_int) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_bind_null(self.ptr(), index) }
    }

    pub(crate) fn bind_int(&mut self, index: c_int, value: i32) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_bind_int(self.ptr(), index, value) }
    }

    pub(crate) fn bind_int64(&mut self, index: c_int, value: i64) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_bind_int64(self.ptr(), index, value) }
    }

    pub(crate) fn bind_double(&mut self, index: c_int, value: f64) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_bind_double(self.ptr(), index, value) }
    }

    /// Binds text without an engine-side copy; the string is retained by the
    /// statement until the bindings are cleared.
    pub(crate) fn bind_text_retained(&mut self, index: c_int, text: String) -> i32 {
        let Ok(len) = c_int::try_from(text.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        let ptr = text.as_ptr();
        self.retained_text.push(text);
        // SAFETY: the heap buffer behind ptr does not move when the String
        // is pushed and lives until clear_bindings or drop.
        unsafe { ffi::sqlite3_bind_text(self.ptr(), index, ptr.cast(), len, ffi::SQLITE_STATIC()) }
    }

    /// Binds text the engine copies immediately.
    pub(crate) fn bind_text_transient(&mut self, index: c_int, text: &str) -> i32 {
        let Ok(len) = c_int::try_from(text.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: SQLITE_TRANSIENT makes the engine copy the buffer.
        unsafe {
            ffi::sqlite3_bind_text(self.ptr(), index, text.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT())
        }
    }

    /// Binds a blob without an engine-side copy; see
    /// [`bind_text_retained`](Self::bind_text_retained).
    pub(crate) fn bind_blob_retained(&mut self, index: c_int, blob: Vec<u8>) -> i32 {
        let Ok(len) = c_int::try_from(blob.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        let ptr = blob.as_ptr();
        self.retained_blobs.push(blob);
        // SAFETY: as for bind_text_retained.
        unsafe { ffi::sqlite3_bind_blob(self.ptr(), index, ptr.cast(), len, ffi::SQLITE_STATIC()) }
    }

    pub(crate) fn column_count(&self) -> usize {
        // SAFETY: stmt is live.
        usize::try_from(unsafe { ffi::sqlite3_column_count(self.ptr()) }).unwrap_or(0)
    }

    pub(crate) fn column_name(&self, index: c_int) -> String {
        // SAFETY: stmt is live; the name is copied immediately.
        unsafe { cstr_to_string(ffi::sqlite3_column_name(self.ptr(), index)) }
    }

    /// Declared type of the column; empty for expressions.
    pub(crate) fn column_decltype(&self, index: c_int) -> String {
        // SAFETY: stmt is live; the type name is copied immediately.
        unsafe { cstr_to_string(ffi::sqlite3_column_decltype(self.ptr(), index)) }
    }

    /// Storage class of the column in the current row.
    pub(crate) fn column_type(&self, index: c_int) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_column_type(self.ptr(), index) }
    }

    pub(crate) fn column_int(&self, index: c_int) -> i32 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_column_int(self.ptr(), index) }
    }

    pub(crate) fn column_int64(&self, index: c_int) -> i64 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_column_int64(self.ptr(), index) }
    }

    pub(crate) fn column_double(&self, index: c_int) -> f64 {
        // SAFETY: stmt is live.
        unsafe { ffi::sqlite3_column_double(self.ptr(), index) }
    }

    pub(crate) fn column_blob(&self, index: c_int) -> Vec<u8> {
        // SAFETY: the pointer must be read before column_bytes is called
        // again; both refer to the current row.
        unsafe {
            let data = ffi::sqlite3_column_blob(self.ptr(), index);
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.ptr(), index)).unwrap_or(0);
            if data.is_null() || len == 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(data.cast::<u8>(), len).to_vec()
        }
    }

    pub(crate) fn column_text(&self, index: c_int) -> String {
        // SAFETY: text is fetched first so column_bytes reports its length.
        unsafe {
            let data = ffi::sqlite3_column_text(self.ptr(), index);
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.ptr(), index)).unwrap_or(0);
            if data.is_null() || len == 0 {
                return String::new();
            }
            String::from_utf8_lossy(std::slice::from_raw_parts(data, len)).into_owned()
        }
    }

    /// Opaque handle for interop. Never dereferenced by this crate.
    pub(crate) fn as_ptr(&self) -> *mut c_void {
        self.ptr().cast()
    }
}

impl Drop for RawStmt {
    fn drop(&mut self) {
        // SAFETY: stmt is live and finalized exactly once.
        unsafe { ffi::sqlite3_finalize(self.ptr()) };
    }
}

unsafe extern "C" fn update_hook_trampoline(
    data: *mut c_void,
    operation: c_int,
    database: *const c_char,
    table: *const c_char,
    row_id: ffi::sqlite3_int64,
) {
    // SAFETY: data is the Sender installed by set_update_hook, alive while
    // the hook is registered; the names are NUL-terminated.
    let (sender, database, table) = unsafe {
        (
            &*data.cast::<Sender<RawChange>>(),
            cstr_to_string(database),
            cstr_to_string(table),
        )
    };
    // A closed receiver means the connection is going away.
    let _ = sender.send(RawChange {
        operation,
        database,
        table,
        row_id,
    });
}

/// Reads an argument as text; NULL becomes the empty string.
///
/// # Safety
///
/// `value` must be a protected value passed to a function callback.
unsafe fn value_text(value: *mut ffi::sqlite3_value) -> String {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let data = ffi::sqlite3_value_text(value);
        let len = usize::try_from(ffi::sqlite3_value_bytes(value)).unwrap_or(0);
        if data.is_null() || len == 0 {
            return String::new();
        }
        String::from_utf8_lossy(std::slice::from_raw_parts(data, len)).into_owned()
    }
}

unsafe extern "C" fn regexp_trampoline(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    if argc != 2 {
        // SAFETY: ctx is the live function context.
        unsafe { ffi::sqlite3_result_int(ctx, 0) };
        return;
    }
    // SAFETY: argv holds argc values and the user data is the RegexCache
    // registered with the function.
    let found = unsafe {
        let pattern = value_text(*argv);
        let subject = value_text(*argv.add(1));
        let cache = &*ffi::sqlite3_user_data(ctx).cast::<RegexCache>();
        cache.is_match(&pattern, &subject)
    };
    // SAFETY: ctx is the live function context.
    unsafe { ffi::sqlite3_result_int(ctx, c_int::from(found)) };
}

unsafe extern "C" fn regexp_destroy(data: *mut c_void) {
    if !data.is_null() {
        // SAFETY: data came from Box::into_raw in create_regexp_function.
        drop(unsafe { Box::from_raw(data.cast::<RegexCache>()) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> RawDb {
        RawDb::open(":memory:", SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE).unwrap()
    }

    #[test]
    fn test_empty_key_is_skipped() {
        let db = memory();
        assert_eq!(db.key(b""), Ok(()));
        db.exec("SELECT count(*) FROM sqlite_master;").unwrap();
    }

    #[test]
    fn test_key_applies_to_fresh_database() {
        let db = memory();
        assert_eq!(db.key(b"secret"), Ok(()));
        db.exec("CREATE TABLE t(x); SELECT count(*) FROM sqlite_master;").unwrap();
    }

    #[test]
    fn test_key_failure_carries_code() {
        assert_eq!(key_status(SQLITE_OK), Ok(()));
        let err = key_status(ffi::SQLITE_TOOBIG).unwrap_err();
        assert_eq!(err.code, ffi::SQLITE_TOOBIG);
        assert!(!err.message.is_empty());
    }
}
