//! SQLite connection over `libsqlite3-sys`.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)]

use crate::types;
use batchmodel_core::{
    Connection, Cx, Dialect, Error, Outcome, Row, Value,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind},
    row::ColumnInfo,
};
use libsqlite3_sys as ffi;
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

// The bundled bindings omit `sqlite3_close_v2`; the bundled SQLite still exports it.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:"
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds; 0 disables it
    pub busy_timeout_ms: u32,
}

/// How the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Create the database if it does not exist
    pub create: bool,
    /// Interpret the path as a URI
    pub uri: bool,
    /// Serialized threading mode
    pub full_mutex: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access to an existing database.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;
        for (set, flag) in [
            (self.read_only, ffi::SQLITE_OPEN_READONLY),
            (self.read_write, ffi::SQLITE_OPEN_READWRITE),
            (self.create, ffi::SQLITE_OPEN_CREATE),
            (self.uri, ffi::SQLITE_OPEN_URI),
            (self.full_mutex, ffi::SQLITE_OPEN_FULLMUTEX),
        ] {
            if set {
                flags |= flag;
            }
        }
        // no access mode means read-write-create
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only touched while the surrounding Mutex is held.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// All access to the handle goes through an internal mutex, so one
/// connection can be shared by concurrent batch commands.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Finalizes the statement on every exit path.
struct Stmt(*mut ffi::sqlite3_stmt);

impl Drop for Stmt {
    fn drop(&mut self) {
        // SAFETY: the pointer came from a successful prepare and is finalized once
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

impl SqliteConnection {
    /// Open a connection with `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: valid C string and out-pointer; the result is checked below
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                config.flags.to_sqlite_flags(),
                ptr::null(),
            )
        };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: a handle is returned even on failure and must be closed
                let msg = unsafe { last_message(db) };
                unsafe { ffi::sqlite3_close(db) };
                msg
            };
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", message),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is open
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }
        tracing::debug!(path = %config.path, "Opened SQLite database");

        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one or more `;`-separated statements without parameters (DDL,
    /// fixtures).
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock();
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: valid handle and C string; errmsg is freed below
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }

        let message = if errmsg.is_null() {
            error_string(rc)
        } else {
            // SAFETY: errmsg was allocated by SQLite
            unsafe {
                let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                msg
            }
        };
        Err(query_error(rc, sql, message))
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        // SAFETY: db is open
        let n = unsafe { ffi::sqlite3_changes(inner.db) };
        n.max(0) as u64
    }

    /// Bound-parameter limit of this connection.
    pub fn variable_limit(&self) -> usize {
        let inner = self.lock();
        // SAFETY: a negative value only queries the limit
        let n = unsafe { ffi::sqlite3_limit(inner.db, ffi::SQLITE_LIMIT_VARIABLE_NUMBER, -1) };
        if n > 0 {
            n as usize
        } else {
            Dialect::Sqlite.max_params()
        }
    }

    fn prepare(&self, inner: &SqliteInner, sql: &str, params: &[Value]) -> Result<Stmt, Error> {
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: valid handle, C string and out-pointer
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                inner.db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(db_error(inner.db, sql));
        }
        let stmt = Stmt(raw);

        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is prepared, index is 1-based
            let rc = unsafe { types::bind_value(stmt.0, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is open
                let msg = unsafe { last_message(inner.db) };
                return Err(query_error(
                    rc,
                    sql,
                    format!("Failed to bind parameter {}: {}", i + 1, msg),
                ));
            }
        }
        Ok(stmt)
    }

    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.lock();
        let stmt = self.prepare(&inner, sql, params)?;

        // SAFETY: stmt is prepared
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.0) };
        let names = (0..col_count)
            .map(|i| unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is prepared
            match unsafe { ffi::sqlite3_step(stmt.0) } {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: a row is current
                        .map(|i| unsafe { types::read_column(stmt.0, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(db_error(inner.db, sql)),
            }
        }
        tracing::trace!(rows = rows.len(), "SQLite query finished");
        Ok(rows)
    }

    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.lock();
        let stmt = self.prepare(&inner, sql, params)?;
        loop {
            // SAFETY: stmt is prepared
            match unsafe { ffi::sqlite3_step(stmt.0) } {
                ffi::SQLITE_ROW => continue,
                ffi::SQLITE_DONE => break,
                _ => return Err(db_error(inner.db, sql)),
            }
        }
        drop(stmt);
        // SAFETY: db is open
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        tracing::trace!(changes = changes, "SQLite statement finished");
        Ok(changes.max(0) as u64)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is open and every statement is finalized
            unsafe {
                sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn max_params(&self) -> usize {
        self.variable_limit()
    }
}

fn nul_in_sql(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

/// # Safety
/// `db` must be an open handle.
unsafe fn last_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: errmsg is valid until the next call on `db`
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)).to_string_lossy().into_owned() }
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)).to_string_lossy().into_owned() }
}

fn db_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: callers pass the open handle of the failing statement
    let (code, message) = unsafe { (ffi::sqlite3_errcode(db), last_message(db)) };
    query_error(code, sql, message)
}

fn query_error(code: c_int, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        sqlstate: None,
        message,
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Deadlock,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
        }
    }

    fn seeded() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, score REAL);
             INSERT INTO test (name, score) VALUES ('Alice', 1.5), ('Bob', NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(conn.variable_limit() >= 999);
    }

    #[test]
    fn test_execute_raw_reports_syntax_errors() {
        let conn = SqliteConnection::open_memory().unwrap();
        let err = conn.execute_raw("CREATE TABLE (").unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_query_reads_storage_classes() {
        let conn = seeded();
        let rows = conn
            .query_sync("SELECT id, name, score FROM test ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some(&Value::BigInt(1)));
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get(2), Some(&Value::Double(1.5)));
        assert_eq!(rows[1].get_named::<Option<f64>>("score").unwrap(), None);
    }

    #[test]
    fn test_execute_counts_changes() {
        let conn = seeded();
        let n = conn
            .execute_sync(
                "UPDATE test SET score = ?1 WHERE name <> ?2",
                &[Value::Double(2.0), Value::Text("nobody".into())],
            )
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(conn.changes(), 2);
    }

    #[test]
    fn test_returning_through_query() {
        let conn = seeded();
        let rows = conn
            .query_sync(
                "INSERT INTO test (name) VALUES (?1), (?2) RETURNING id",
                &[Value::Text("Cara".into()), Value::Text("Dan".into())],
            )
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.get(0).cloned()).collect();
        assert_eq!(ids, vec![Some(Value::BigInt(3)), Some(Value::BigInt(4))]);
    }

    #[test]
    fn test_constraint_error_kind() {
        let conn = seeded();
        let err = conn
            .execute_sync("INSERT INTO test (id) VALUES (?1)", &[Value::BigInt(1)])
            .unwrap_err();
        match err {
            Error::Query(q) => assert_eq!(q.kind, QueryErrorKind::Constraint),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_flags() {
        assert_eq!(
            OpenFlags::default().to_sqlite_flags(),
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        );
        assert_eq!(
            OpenFlags::read_only().to_sqlite_flags(),
            ffi::SQLITE_OPEN_READONLY
        );
        let missing = SqliteConnection::open(
            &SqliteConfig::file("/nonexistent/dir/db.sqlite").flags(OpenFlags::read_write()),
        );
        assert!(matches!(missing, Err(Error::Connection(_))));
    }

    #[test]
    fn test_connection_trait() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = seeded();

        rt.block_on(async {
            assert_eq!(conn.dialect(), Dialect::Sqlite);
            let n = unwrap_outcome(
                conn.execute(&cx, "DELETE FROM test WHERE id = ?1", &[Value::Int(2)])
                    .await,
            );
            assert_eq!(n, 1);
            let rows = unwrap_outcome(conn.query(&cx, "SELECT COUNT(*) FROM test", &[]).await);
            assert_eq!(rows[0].get(0), Some(&Value::BigInt(1)));
        });
    }
}
