//! Raw statement handles over `rusqlite::ffi`.
//!
//! This is the only SQLite file with `unsafe` code. Handles borrow the
//! `rusqlite::Connection` they were compiled on, so they cannot outlive it.

use crate::error::{DbError, Result};
use rusqlite::ffi;
use std::collections::HashMap;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int};
use std::ptr;

lazy_static::lazy_static! {
    static ref RESULT_CODE_TEXT: HashMap<c_int, &'static str> = {
        let mut m = HashMap::new();
        m.insert(ffi::SQLITE_OK, "Successful result");
        m.insert(ffi::SQLITE_ERROR, "SQL error or missing database");
        m.insert(ffi::SQLITE_INTERNAL, "Internal logic error in SQLite");
        m.insert(ffi::SQLITE_PERM, "Access permission denied");
        m.insert(ffi::SQLITE_ABORT, "Callback routine requested an abort");
        m.insert(ffi::SQLITE_BUSY, "The database file is locked");
        m.insert(ffi::SQLITE_LOCKED, "A table in the database is locked");
        m.insert(ffi::SQLITE_NOMEM, "A malloc() failed");
        m.insert(ffi::SQLITE_READONLY, "Attempt to write a readonly database");
        m.insert(ffi::SQLITE_INTERRUPT, "Operation terminated by sqlite3_interrupt()");
        m.insert(ffi::SQLITE_IOERR, "Some kind of disk I/O error occurred");
        m.insert(ffi::SQLITE_CORRUPT, "The database disk image is malformed");
        m.insert(ffi::SQLITE_NOTFOUND, "Unknown opcode in sqlite3_file_control()");
        m.insert(ffi::SQLITE_FULL, "Insertion failed because database is full");
        m.insert(ffi::SQLITE_CANTOPEN, "Unable to open the database file");
        m.insert(ffi::SQLITE_PROTOCOL, "Database lock protocol error");
        m.insert(ffi::SQLITE_EMPTY, "Database is empty");
        m.insert(ffi::SQLITE_SCHEMA, "The database schema changed");
        m.insert(ffi::SQLITE_TOOBIG, "String or BLOB exceeds size limit");
        m.insert(ffi::SQLITE_CONSTRAINT, "Abort due to constraint violation");
        m.insert(ffi::SQLITE_MISMATCH, "Data type mismatch");
        m.insert(ffi::SQLITE_MISUSE, "Library used incorrectly");
        m.insert(ffi::SQLITE_NOLFS, "Uses OS features not supported on host");
        m.insert(ffi::SQLITE_AUTH, "Authorization denied");
        m.insert(ffi::SQLITE_FORMAT, "Auxiliary database format error");
        m.insert(ffi::SQLITE_RANGE, "2nd parameter to sqlite3_bind out of range");
        m.insert(ffi::SQLITE_NOTADB, "File opened that is not a database file");
        m.insert(ffi::SQLITE_NOTICE, "Notifications from sqlite3_log()");
        m.insert(ffi::SQLITE_WARNING, "Warnings from sqlite3_log()");
        m.insert(ffi::SQLITE_ROW, "sqlite3_step() has another row ready");
        m.insert(ffi::SQLITE_DONE, "sqlite3_step() has finished executing");
        m
    };
}

/// Fixed description of a (possibly extended) result code.
pub fn decode_result_code(code: c_int) -> &'static str {
    RESULT_CODE_TEXT
        .get(&(code & 0xff))
        .copied()
        .unwrap_or("UNKNOWN")
}

/// Storage class of a cell in the current row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Integer,
    Real,
    Text,
    Blob,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

/// The `sqlite3*` of an open connection.
#[derive(Clone, Copy)]
pub struct RawDb<'c> {
    db: *mut ffi::sqlite3,
    _conn: PhantomData<&'c rusqlite::Connection>,
}

impl<'c> RawDb<'c> {
    pub fn new(conn: &'c rusqlite::Connection) -> Self {
        // SAFETY: the handle stays valid while `conn` is borrowed.
        let db = unsafe { conn.handle() };
        Self {
            db,
            _conn: PhantomData,
        }
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        // SAFETY: `db` is open for 'c.
        let n = unsafe { ffi::sqlite3_changes(self.db) };
        u64::try_from(n).unwrap_or(0)
    }

    /// Rows changed since the connection opened.
    pub fn total_changes(&self) -> u64 {
        // SAFETY: `db` is open for 'c.
        let n = unsafe { ffi::sqlite3_total_changes(self.db) };
        u64::try_from(n).unwrap_or(0)
    }

    pub fn interrupt(&self) {
        // SAFETY: sqlite3_interrupt is safe to call on an open handle.
        unsafe { ffi::sqlite3_interrupt(self.db) }
    }

    pub fn errmsg(&self) -> String {
        // SAFETY: errmsg returns a NUL-terminated string owned by SQLite.
        unsafe {
            let msg = ffi::sqlite3_errmsg(self.db);
            if msg.is_null() {
                String::new()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    /// `Native` error carrying the decoded code and SQLite's message.
    pub fn error(&self, rc: c_int) -> DbError {
        // SAFETY: `db` is open for 'c.
        let extended = unsafe { ffi::sqlite3_extended_errcode(self.db) };
        let code = if extended & 0xff == rc & 0xff { extended } else { rc };
        DbError::native(
            code,
            format!("{}: {}", decode_result_code(rc), self.errmsg()),
        )
    }

    /// Compiles every statement of `sql`. Comments and whitespace between
    /// statements produce no handle. Any compile error drops the handles
    /// already compiled and fails the whole batch.
    pub fn prepare_all(&self, sql: &str) -> Result<Vec<RawStmt<'c>>> {
        let mut handles = Vec::new();
        let mut rest = sql;

        while !rest.trim().is_empty() {
            let len = c_int::try_from(rest.len())
                .map_err(|_| DbError::Validation("SQL text too long".to_string()))?;
            let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
            let mut tail: *const c_char = ptr::null();

            // SAFETY: `rest` is valid for `len` bytes; SQLite writes the
            // statement handle and a tail pointer inside `rest`.
            let rc = unsafe {
                ffi::sqlite3_prepare_v2(
                    self.db,
                    rest.as_ptr() as *const c_char,
                    len,
                    &mut stmt,
                    &mut tail,
                )
            };
            if rc != ffi::SQLITE_OK {
                if !stmt.is_null() {
                    // SAFETY: finalizing a handle SQLite just returned.
                    unsafe { ffi::sqlite3_finalize(stmt) };
                }
                return Err(self.error(rc));
            }
            if !stmt.is_null() {
                handles.push(RawStmt {
                    stmt,
                    db: *self,
                });
            }

            let consumed = if tail.is_null() {
                rest.len()
            } else {
                (tail as usize).saturating_sub(rest.as_ptr() as usize)
            };
            match rest.get(consumed..) {
                Some(remaining) if consumed > 0 => rest = remaining,
                _ => break,
            }
        }
        Ok(handles)
    }
}

/// One compiled statement, finalized on drop.
pub struct RawStmt<'c> {
    stmt: *mut ffi::sqlite3_stmt,
    db: RawDb<'c>,
}

impl<'c> RawStmt<'c> {
    pub fn db(&self) -> RawDb<'c> {
        self.db
    }

    pub fn step(&self) -> Result<StepResult> {
        // SAFETY: `stmt` is a live handle owned by self.
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            other => Err(self.db.error(other)),
        }
    }

    /// Rewinds the statement; bindings persist.
    pub fn reset(&self) {
        // SAFETY: `stmt` is a live handle. The return code repeats the last
        // step error, which was already reported.
        unsafe { ffi::sqlite3_reset(self.stmt) };
    }

    pub fn sql(&self) -> String {
        // SAFETY: sqlite3_sql returns text owned by the statement.
        unsafe {
            let text = ffi::sqlite3_sql(self.stmt);
            if text.is_null() {
                String::new()
            } else {
                CStr::from_ptr(text).to_string_lossy().into_owned()
            }
        }
    }

    pub fn column_count(&self) -> usize {
        // SAFETY: `stmt` is a live handle.
        let n = unsafe { ffi::sqlite3_column_count(self.stmt) };
        usize::try_from(n).unwrap_or(0)
    }

    pub fn column_name(&self, index: usize) -> String {
        // SAFETY: index checked by SQLite; NULL on out of range.
        unsafe {
            let name = ffi::sqlite3_column_name(self.stmt, to_c(index));
            if name.is_null() {
                String::new()
            } else {
                CStr::from_ptr(name).to_string_lossy().into_owned()
            }
        }
    }

    pub fn column_decltype(&self, index: usize) -> Option<String> {
        // SAFETY: NULL for expressions and out-of-range indexes.
        unsafe {
            let decl = ffi::sqlite3_column_decltype(self.stmt, to_c(index));
            if decl.is_null() {
                None
            } else {
                Some(CStr::from_ptr(decl).to_string_lossy().into_owned())
            }
        }
    }

    pub fn column_type(&self, index: usize) -> StorageClass {
        // SAFETY: valid while a row is current.
        match unsafe { ffi::sqlite3_column_type(self.stmt, to_c(index)) } {
            ffi::SQLITE_INTEGER => StorageClass::Integer,
            ffi::SQLITE_FLOAT => StorageClass::Real,
            ffi::SQLITE_TEXT => StorageClass::Text,
            ffi::SQLITE_BLOB => StorageClass::Blob,
            _ => StorageClass::Null,
        }
    }

    pub fn column_i64(&self, index: usize) -> i64 {
        // SAFETY: valid while a row is current.
        unsafe { ffi::sqlite3_column_int64(self.stmt, to_c(index)) }
    }

    pub fn column_f64(&self, index: usize) -> f64 {
        // SAFETY: valid while a row is current.
        unsafe { ffi::sqlite3_column_double(self.stmt, to_c(index)) }
    }

    /// UTF-8 text of the cell (numbers are rendered by SQLite).
    pub fn column_text(&self, index: usize) -> Vec<u8> {
        // SAFETY: the pointer is valid until the next step/reset; the bytes
        // are copied out before returning. `column_bytes` must follow
        // `column_text` to report the UTF-8 length.
        unsafe {
            let text = ffi::sqlite3_column_text(self.stmt, to_c(index));
            let len = ffi::sqlite3_column_bytes(self.stmt, to_c(index));
            copy_out(text, len)
        }
    }

    pub fn column_blob(&self, index: usize) -> Vec<u8> {
        // SAFETY: as for `column_text`.
        unsafe {
            let blob = ffi::sqlite3_column_blob(self.stmt, to_c(index)) as *const u8;
            let len = ffi::sqlite3_column_bytes(self.stmt, to_c(index));
            copy_out(blob, len)
        }
    }

    pub fn bind_parameter_count(&self) -> usize {
        // SAFETY: `stmt` is a live handle.
        let n = unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) };
        usize::try_from(n).unwrap_or(0)
    }

    /// Binds at 0-based `index`.
    pub fn bind_null(&self, index: usize) -> Result<()> {
        // SAFETY: `stmt` is a live handle.
        self.check_bind(unsafe { ffi::sqlite3_bind_null(self.stmt, to_c(index + 1)) })
    }

    pub fn bind_i64(&self, index: usize, value: i64) -> Result<()> {
        // SAFETY: `stmt` is a live handle.
        self.check_bind(unsafe { ffi::sqlite3_bind_int64(self.stmt, to_c(index + 1), value) })
    }

    pub fn bind_f64(&self, index: usize, value: f64) -> Result<()> {
        // SAFETY: `stmt` is a live handle.
        self.check_bind(unsafe { ffi::sqlite3_bind_double(self.stmt, to_c(index + 1), value) })
    }

    pub fn bind_text(&self, index: usize, value: &str) -> Result<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| DbError::Validation("text parameter too long".to_string()))?;
        // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
        self.check_bind(unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                to_c(index + 1),
                value.as_ptr() as *const c_char,
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        })
    }

    pub fn bind_blob(&self, index: usize, value: &[u8]) -> Result<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| DbError::Validation("blob parameter too long".to_string()))?;
        // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
        self.check_bind(unsafe {
            ffi::sqlite3_bind_blob(
                self.stmt,
                to_c(index + 1),
                value.as_ptr() as *const std::os::raw::c_void,
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        })
    }

    fn check_bind(&self, rc: c_int) -> Result<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.db.error(rc))
        }
    }
}

impl Drop for RawStmt<'_> {
    fn drop(&mut self) {
        // SAFETY: the handle is owned by self and finalized exactly once.
        unsafe { ffi::sqlite3_finalize(self.stmt) };
    }
}

fn to_c(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

/// # Safety
/// `data` must be NULL or valid for `len` bytes.
unsafe fn copy_out(data: *const u8, len: c_int) -> Vec<u8> {
    if data.is_null() || len <= 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(data, len as usize).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_result_code() {
        assert_eq!(
            decode_result_code(ffi::SQLITE_CONSTRAINT),
            "Abort due to constraint violation"
        );
        // SQLITE_CONSTRAINT_UNIQUE decodes through its primary code
        assert_eq!(decode_result_code(2067), "Abort due to constraint violation");
        assert_eq!(decode_result_code(9999), "UNKNOWN");
    }

    #[test]
    fn test_prepare_all_splits_statements() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let db = RawDb::new(&conn);
        let handles = db
            .prepare_all("SELECT 1; SELECT 2;\n -- trailing comment\n ;  ")
            .unwrap();
        assert_eq!(handles.len(), 2);
        assert!(handles[1].sql().contains("SELECT 2"));
    }

    #[test]
    fn test_prepare_error_fails_whole_batch() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let db = RawDb::new(&conn);
        let err = db.prepare_all("SELECT 1; SELEKT 2").err().unwrap();
        assert_eq!(err.native_code() & 0xff, ffi::SQLITE_ERROR);
        assert!(err.message().contains("syntax error"));
    }

    #[test]
    fn test_step_and_read_columns() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let db = RawDb::new(&conn);
        let handles = db
            .prepare_all("SELECT 42 AS answer, 'hi', x'0102', NULL, 1.5")
            .unwrap();
        let stmt = &handles[0];
        assert_eq!(stmt.column_count(), 5);
        assert_eq!(stmt.column_name(0), "answer");
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        assert_eq!(stmt.column_type(0), StorageClass::Integer);
        assert_eq!(stmt.column_i64(0), 42);
        assert_eq!(stmt.column_text(1), b"hi");
        assert_eq!(stmt.column_blob(2), vec![1, 2]);
        assert_eq!(stmt.column_type(3), StorageClass::Null);
        assert_eq!(stmt.column_type(4), StorageClass::Real);
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
    }

    #[test]
    fn test_bind_and_changes() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b TEXT)").unwrap();
        let db = RawDb::new(&conn);
        let handles = db.prepare_all("INSERT INTO t VALUES (?, ?)").unwrap();
        let insert = &handles[0];
        assert_eq!(insert.bind_parameter_count(), 2);
        insert.bind_i64(0, 7).unwrap();
        insert.bind_text(1, "seven").unwrap();
        assert_eq!(insert.step().unwrap(), StepResult::Done);
        assert_eq!(db.changes(), 1);
        assert!(insert.bind_null(5).is_err());
    }
}
