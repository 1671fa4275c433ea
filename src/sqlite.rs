//! A thin SQLite wrapper built on `UniqueHandle`.
//!
//! SQLite exposes two primary objects through its C API: the connection and
//! the prepared statement. Both are raw pointers that must be closed
//! (`sqlite3_close`) or finalized (`sqlite3_finalize`) exactly once, which is
//! what the two traits policies below describe.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int};
use std::ptr;

use rusqlite::ffi;
use thiserror::Error;

use crate::handle::{HandleTraits, UniqueHandle};

// =============================================================================
// Errors
// =============================================================================

/// A failed SQLite call: the result code and SQLite's English description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("SQLite error {code}: {message}")]
pub struct SqlError {
    pub code: i32,
    pub message: String,
}

impl SqlError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds the error from the most recent failure recorded on `db`.
    fn from_connection(code: c_int, db: *mut ffi::sqlite3) -> Self {
        // sqlite3_errmsg accepts null and reports an out-of-memory message.
        let message = unsafe { message_from(ffi::sqlite3_errmsg(db)) };
        Self::new(code, message)
    }

    /// Builds the error from the generic description of `code`.
    fn from_code(code: c_int) -> Self {
        let message = unsafe { message_from(ffi::sqlite3_errstr(code)) };
        Self::new(code, message)
    }

    fn misuse(message: &str) -> Self {
        Self::new(ffi::SQLITE_MISUSE, message)
    }
}

/// Copies a C string owned by SQLite into an owned `String`.
unsafe fn message_from(text: *const c_char) -> String {
    if text.is_null() {
        return "unknown error".to_string();
    }
    CStr::from_ptr(text).to_string_lossy().into_owned()
}

/// Out-of-range indexes saturate; SQLite then treats the column or
/// parameter as missing.
fn c_index(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

fn c_string(text: &str) -> Result<CString, SqlError> {
    CString::new(text).map_err(|_| SqlError::misuse("text contains an interior NUL byte"))
}

// =============================================================================
// Traits policies
// =============================================================================

/// Policy for `sqlite3*` connection pointers.
pub struct ConnectionTraits;

impl HandleTraits for ConnectionTraits {
    type Raw = *mut ffi::sqlite3;
    type Error = SqlError;

    fn invalid() -> Self::Raw {
        ptr::null_mut()
    }

    fn close(value: Self::Raw) -> Result<(), SqlError> {
        log::debug!("closing connection {value:p}");
        let result = unsafe { ffi::sqlite3_close(value) };
        if result == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(SqlError::from_code(result))
        }
    }
}

pub type ConnectionHandle = UniqueHandle<ConnectionTraits>;

/// Policy for `sqlite3_stmt*` prepared statement pointers.
pub struct StatementTraits;

impl HandleTraits for StatementTraits {
    type Raw = *mut ffi::sqlite3_stmt;
    type Error = SqlError;

    fn invalid() -> Self::Raw {
        ptr::null_mut()
    }

    /// `sqlite3_finalize` always frees the statement. A non-OK result only
    /// repeats the error of the last failed step, which `step` already
    /// returned, so it is not a close failure.
    fn close(value: Self::Raw) -> Result<(), SqlError> {
        let result = unsafe { ffi::sqlite3_finalize(value) };
        if result == ffi::SQLITE_OK {
            log::debug!("finalized statement {value:p}");
        } else {
            log::debug!("finalized statement {value:p} after failed step (code {result})");
        }
        Ok(())
    }
}

pub type StatementHandle = UniqueHandle<StatementTraits>;

// =============================================================================
// Connection
// =============================================================================

/// Owns one connection handle. Starts out disconnected.
#[derive(Debug, Default)]
pub struct Connection {
    handle: ConnectionHandle,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or creates) `filename` and returns the connected object.
    pub fn connect(filename: &str) -> Result<Self, SqlError> {
        let mut conn = Self::new();
        conn.open(filename)?;
        Ok(conn)
    }

    pub fn open_in_memory() -> Result<Self, SqlError> {
        Self::connect(":memory:")
    }

    /// Opens `filename`, replacing any connection already held.
    ///
    /// SQLite may allocate a connection object even when opening fails, so
    /// the pointer lands in a local handle first. On failure that local
    /// closes it; on success it moves into `self`.
    pub fn open(&mut self, filename: &str) -> Result<(), SqlError> {
        let c_filename = c_string(filename)?;
        let mut local = ConnectionHandle::empty();

        let result = unsafe { ffi::sqlite3_open(c_filename.as_ptr(), local.out_slot()) };
        if result != ffi::SQLITE_OK {
            return Err(SqlError::from_connection(result, local.get()));
        }

        log::debug!("opened {filename}");
        self.handle.assign(local);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_valid()
    }

    /// Runs ad-hoc SQL, possibly several `;`-separated statements.
    pub fn execute(&self, sql: &str) -> Result<(), SqlError> {
        if !self.is_open() {
            return Err(SqlError::misuse("connection is not open"));
        }
        let c_sql = c_string(sql)?;

        let result = unsafe {
            ffi::sqlite3_exec(
                self.handle.get(),
                c_sql.as_ptr(),
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };

        if result != ffi::SQLITE_OK {
            return Err(SqlError::from_connection(result, self.handle.get()));
        }
        Ok(())
    }

    /// Compiles `sql` into a new statement bound to this connection.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>, SqlError> {
        let mut statement = Statement::new();
        statement.prepare(self, sql)?;
        Ok(statement)
    }

    /// Closes the connection now, reporting a failed close.
    pub fn close(self) -> Result<(), SqlError> {
        self.handle.close()
    }
}

// =============================================================================
// Statement
// =============================================================================

/// Owns one prepared statement. Borrows the connection it was prepared on,
/// so the connection outlives every statement.
#[derive(Debug, Default)]
pub struct Statement<'c> {
    handle: StatementHandle,
    _conn: PhantomData<&'c Connection>,
}

impl<'c> Statement<'c> {
    pub fn new() -> Self {
        Self {
            handle: StatementHandle::empty(),
            _conn: PhantomData,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.handle.is_valid()
    }

    /// Compiles `sql`. Any previously prepared statement is finalized first,
    /// so one `Statement` can be reused for several queries.
    pub fn prepare(&mut self, conn: &'c Connection, sql: &str) -> Result<(), SqlError> {
        self.handle.reset_empty();
        if !conn.is_open() {
            return Err(SqlError::misuse("connection is not open"));
        }
        let c_sql = c_string(sql)?;

        // Unlike sqlite3_open, a failed prepare leaves the slot null.
        let result = unsafe {
            ffi::sqlite3_prepare_v2(
                conn.handle.get(),
                c_sql.as_ptr(),
                -1,
                self.handle.out_slot(),
                ptr::null_mut(),
            )
        };

        if result != ffi::SQLITE_OK {
            return Err(SqlError::from_connection(result, conn.handle.get()));
        }
        if !self.is_prepared() {
            return Err(SqlError::misuse("no SQL statement to prepare"));
        }
        Ok(())
    }

    /// Advances to the next row. `Ok(true)` while rows remain, `Ok(false)`
    /// once execution is done.
    pub fn step(&mut self) -> Result<bool, SqlError> {
        if !self.is_prepared() {
            return Err(SqlError::misuse("statement is not prepared"));
        }

        let result = unsafe { ffi::sqlite3_step(self.handle.get()) };
        match result {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            code => {
                let db = unsafe { ffi::sqlite3_db_handle(self.handle.get()) };
                Err(SqlError::from_connection(code, db))
            }
        }
    }

    /// Rewinds the statement so it can be stepped again, keeping bindings.
    pub fn rewind(&mut self) {
        // sqlite3_reset repeats the last step error, already reported by step.
        unsafe {
            ffi::sqlite3_reset(self.handle.get());
        }
    }

    /// Binds an integer to the `?` parameter at `index` (1-based).
    pub fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), SqlError> {
        let result =
            unsafe { ffi::sqlite3_bind_int64(self.handle.get(), c_index(index), value) };
        self.check_bind(result)
    }

    /// Binds text to the `?` parameter at `index` (1-based). SQLite keeps its
    /// own copy.
    pub fn bind_text(&mut self, index: usize, value: &str) -> Result<(), SqlError> {
        let len = c_int::try_from(value.len())
            .map_err(|_| SqlError::new(ffi::SQLITE_TOOBIG, "text is too long to bind"))?;
        let result = unsafe {
            ffi::sqlite3_bind_text(
                self.handle.get(),
                c_index(index),
                value.as_ptr().cast::<c_char>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check_bind(result)
    }

    fn check_bind(&self, result: c_int) -> Result<(), SqlError> {
        if !self.is_prepared() {
            return Err(SqlError::misuse("statement is not prepared"));
        }
        if result != ffi::SQLITE_OK {
            let db = unsafe { ffi::sqlite3_db_handle(self.handle.get()) };
            return Err(SqlError::from_connection(result, db));
        }
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        let count = unsafe { ffi::sqlite3_column_count(self.handle.get()) };
        usize::try_from(count).unwrap_or(0)
    }

    pub fn get_int(&self, column: usize) -> i32 {
        unsafe { ffi::sqlite3_column_int(self.handle.get(), c_index(column)) }
    }

    pub fn get_int64(&self, column: usize) -> i64 {
        unsafe { ffi::sqlite3_column_int64(self.handle.get(), c_index(column)) }
    }

    /// The column's text, copied out because SQLite frees it on the next
    /// step or finalize. `None` for SQL NULL.
    pub fn get_string(&self, column: usize) -> Option<String> {
        let text = unsafe { ffi::sqlite3_column_text(self.handle.get(), c_index(column)) };
        if text.is_null() {
            return None;
        }
        let text = unsafe { CStr::from_ptr(text.cast::<c_char>()) };
        Some(text.to_string_lossy().into_owned())
    }
}

// =============================================================================
// Tests
// =============================================================================
