//! In-memory SQLite connection backing the end-to-end tests.
//!
//! Statements run against a real database so the tests can assert what the
//! table holds after an operation, not only which SQL was sent.

#![allow(unsafe_code)]

use super::cancel;
use libsqlite3_sys as ffi;
use sqlbulk::{Connection, Cx, Dialect, Error, IsolationLevel, Outcome, Row, TransactionOps, Value};
use sqlbulk_core::{ColumnInfo, QueryError, QueryErrorKind};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex};

// The bundled bindings omit `sqlite3_close_v2`; the symbol is still compiled
// into the bundled amalgamation, so declare it directly.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

struct Handle {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only used while the connection mutex is held, and
// the bundled SQLite is built in serialized threading mode.
unsafe impl Send for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: db came from sqlite3_open_v2 and is closed exactly once.
        unsafe { sqlite3_close_v2(self.db) };
    }
}

#[derive(Debug, Default)]
struct Counters {
    begins: usize,
    commits: usize,
    rollbacks: usize,
    cancel_after: Option<(String, Cx)>,
}

/// A private in-memory database.
#[derive(Clone)]
pub struct SqliteConnection {
    handle: Arc<Mutex<Handle>>,
    counters: Arc<Mutex<Counters>>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &":memory:")
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub fn open_memory() -> Self {
        let path = CString::new(":memory:").expect("static path");
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_MEMORY;
        // SAFETY: path is NUL-terminated and db is a valid out pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        let handle = Handle { db };
        assert_eq!(rc, ffi::SQLITE_OK, "opening in-memory SQLite failed");
        Self {
            handle: Arc::new(Mutex::new(handle)),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    /// Run one or more statements without parameters, panicking on failure.
    pub fn execute_batch(&self, sql: &str) {
        let c_sql = CString::new(sql).expect("SQL contains a NUL byte");
        let handle = self.handle.lock().expect("lock poisoned");
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();
        // SAFETY: db is open, c_sql is NUL-terminated, errmsg is a valid out pointer.
        let rc = unsafe {
            ffi::sqlite3_exec(handle.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                format!("sqlite error {rc}")
            } else {
                // SAFETY: SQLite allocated errmsg as a C string; we free it after copying.
                unsafe {
                    let text = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    text
                }
            };
            panic!("{sql}: {message}");
        }
    }

    /// Rows of a read-only statement, for asserting table contents.
    pub fn rows(&self, sql: &str) -> Vec<Row> {
        match self.query_sync(sql, &[]) {
            Ok(rows) => rows,
            Err(e) => panic!("{sql}: {e}"),
        }
    }

    /// Cancel `cx` once a statement containing `pattern` has run.
    pub fn cancelling_after(self, pattern: &str, cx: &Cx) -> Self {
        self.counters.lock().expect("lock poisoned").cancel_after =
            Some((pattern.to_string(), cx.clone()));
        self
    }

    /// `(begins, commits, rollbacks)`
    pub fn transactions(&self) -> (usize, usize, usize) {
        let guard = self.counters.lock().expect("lock poisoned");
        (guard.begins, guard.commits, guard.rollbacks)
    }

    fn after_statement(&self, sql: &str) {
        let mut guard = self.counters.lock().expect("lock poisoned");
        if guard
            .cancel_after
            .as_ref()
            .is_some_and(|(p, _)| sql.contains(p.as_str()))
        {
            if let Some((_, cx)) = guard.cancel_after.take() {
                cancel(&cx);
            }
        }
    }

    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let handle = self.handle.lock().expect("lock poisoned");
        let stmt = prepare(handle.db, sql, params)?;

        // SAFETY: stmt is a prepared statement.
        let count = unsafe { ffi::sqlite3_column_count(stmt) };
        let names = (0..count)
            .map(|i| {
                // SAFETY: i is within the column count.
                let name = unsafe { ffi::sqlite3_column_name(stmt, i) };
                if name.is_null() {
                    format!("col{i}")
                } else {
                    // SAFETY: SQLite returned a NUL-terminated name.
                    unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
                }
            })
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is a prepared statement.
            match unsafe { ffi::sqlite3_step(stmt) } {
                ffi::SQLITE_ROW => {
                    let values = (0..count).map(|i| read_column(stmt, i)).collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => {
                    let err = sqlite_error(handle.db, sql);
                    // SAFETY: stmt is finalized once.
                    unsafe { ffi::sqlite3_finalize(stmt) };
                    return Err(err);
                }
            }
        }
        // SAFETY: stmt is finalized once.
        unsafe { ffi::sqlite3_finalize(stmt) };
        drop(handle);
        self.after_statement(sql);
        Ok(rows)
    }

    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let handle = self.handle.lock().expect("lock poisoned");
        let stmt = prepare(handle.db, sql, params)?;
        // SAFETY: stmt is a prepared statement.
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        let result = match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is open.
                let changes = unsafe { ffi::sqlite3_changes(handle.db) };
                Ok(u64::try_from(changes).unwrap_or(0))
            }
            _ => Err(sqlite_error(handle.db, sql)),
        };
        // SAFETY: stmt is finalized once.
        unsafe { ffi::sqlite3_finalize(stmt) };
        drop(handle);
        if result.is_ok() {
            self.after_statement(sql);
        }
        result
    }

    fn control(&self, sql: &str) -> Result<(), Error> {
        self.execute_sync(sql, &[]).map(|_| ())
    }
}

fn prepare(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<*mut ffi::sqlite3_stmt, Error> {
    let c_sql = CString::new(sql).map_err(|_| {
        query_error(QueryErrorKind::Syntax, sql, None, "SQL contains a NUL byte".to_string())
    })?;
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: db is open; c_sql is NUL-terminated (-1 reads up to the NUL).
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut()) };
    if rc != ffi::SQLITE_OK {
        return Err(sqlite_error(db, sql));
    }
    for (i, param) in params.iter().enumerate() {
        let index = c_int::try_from(i + 1).expect("parameter index fits c_int");
        let rc = bind_value(stmt, index, param);
        if rc != ffi::SQLITE_OK {
            let err = sqlite_error(db, sql);
            // SAFETY: stmt is finalized once.
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(err);
        }
    }
    Ok(stmt)
}

fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let len = c_int::try_from(text.len()).expect("text fits c_int");
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
    unsafe { ffi::sqlite3_bind_text(stmt, index, text.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
}

fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8]) -> c_int {
    let len = c_int::try_from(bytes.len()).expect("blob fits c_int");
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
    unsafe { ffi::sqlite3_bind_blob(stmt, index, bytes.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
}

fn bind_int(stmt: *mut ffi::sqlite3_stmt, index: c_int, v: i64) -> c_int {
    // SAFETY: stmt is a prepared statement and index is 1-based.
    unsafe { ffi::sqlite3_bind_int64(stmt, index, v) }
}

fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    match value {
        // SAFETY: stmt is a prepared statement and index is 1-based.
        Value::Null => unsafe { ffi::sqlite3_bind_null(stmt, index) },
        Value::Bool(b) => bind_int(stmt, index, i64::from(*b)),
        Value::TinyInt(v) => bind_int(stmt, index, i64::from(*v)),
        Value::SmallInt(v) => bind_int(stmt, index, i64::from(*v)),
        Value::Int(v) => bind_int(stmt, index, i64::from(*v)),
        Value::BigInt(v) | Value::Time(v) | Value::Timestamp(v) | Value::TimestampTz(v) => {
            bind_int(stmt, index, *v)
        }
        Value::Date(days) => bind_int(stmt, index, i64::from(*days)),
        // SAFETY: stmt is a prepared statement and index is 1-based.
        Value::Float(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, f64::from(*v)) },
        // SAFETY: stmt is a prepared statement and index is 1-based.
        Value::Double(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, *v) },
        Value::Decimal(s) | Value::Text(s) => bind_text(stmt, index, s),
        Value::Json(v) => bind_text(stmt, index, &v.to_string()),
        Value::Bytes(b) => bind_blob(stmt, index, b),
        Value::Uuid(u) => bind_blob(stmt, index, u),
        Value::Table(_) => ffi::SQLITE_MISMATCH,
    }
}

fn read_column(stmt: *mut ffi::sqlite3_stmt, i: c_int) -> Value {
    // SAFETY: stmt has a current row and i is within the column count.
    unsafe {
        match ffi::sqlite3_column_type(stmt, i) {
            ffi::SQLITE_INTEGER => Value::BigInt(ffi::sqlite3_column_int64(stmt, i)),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, i)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, i);
                let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, i)).unwrap_or(0);
                if ptr.is_null() {
                    Value::Text(String::new())
                } else {
                    let bytes = std::slice::from_raw_parts(ptr, len);
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, i);
                let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, i)).unwrap_or(0);
                if ptr.is_null() {
                    Value::Bytes(Vec::new())
                } else {
                    Value::Bytes(std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

fn sqlite_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is open; errmsg is valid until the next call on db.
    let (code, message) = unsafe {
        let message = CStr::from_ptr(ffi::sqlite3_errmsg(db))
            .to_string_lossy()
            .into_owned();
        (ffi::sqlite3_extended_errcode(db), message)
    };
    let kind = match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Deadlock,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        _ => QueryErrorKind::Database,
    };
    query_error(kind, sql, Some(code), message)
}

fn query_error(kind: QueryErrorKind, sql: &str, code: Option<i32>, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        sqlstate: None,
        code,
        message,
        source: None,
    })
}

fn settle<T>(result: Result<T, Error>) -> impl Future<Output = Outcome<T, Error>> + Send
where
    T: Send,
{
    let outcome = result.map_or_else(Outcome::Err, Outcome::Ok);
    async move { outcome }
}

impl Connection for SqliteConnection {
    type Tx<'conn>
        = SqliteTransaction<'conn>
    where
        Self: 'conn;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn database_identity(&self) -> String {
        "sqlite/:memory:".to_string()
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        settle(self.query_sync(sql, params))
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        settle(self.query_sync(sql, params).map(|rows| rows.into_iter().next()))
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        settle(self.execute_sync(sql, params))
    }

    fn begin_with(
        &self,
        _cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        let sql = match isolation {
            IsolationLevel::Serializable => "BEGIN EXCLUSIVE",
            _ => "BEGIN",
        };
        let result = self.control(sql).map(|()| {
            self.counters.lock().expect("lock poisoned").begins += 1;
            SqliteTransaction {
                conn: self,
                finished: false,
            }
        });
        settle(result)
    }
}

/// A transaction on [`SqliteConnection`]; rolled back if dropped unfinished.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.conn.control("ROLLBACK");
        }
    }
}

impl TransactionOps for SqliteTransaction<'_> {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        settle(self.conn.query_sync(sql, params))
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        settle(self.conn.execute_sync(sql, params))
    }

    fn commit(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.finished = true;
        self.conn.counters.lock().expect("lock poisoned").commits += 1;
        settle(self.conn.control("COMMIT"))
    }

    fn rollback(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.finished = true;
        self.conn.counters.lock().expect("lock poisoned").rollbacks += 1;
        settle(self.conn.control("ROLLBACK"))
    }
}
