//! Database backend.
//!
//! Synchronous DuckDB connection behind the `duckdb` feature.
//! - Columnar, embedded, single process
//! - Single-writer enforced via file lock

#[cfg(feature = "duckdb")]
use std::path::Path;
#[cfg(feature = "duckdb")]
use std::rc::Rc;
#[cfg(feature = "duckdb")]
use std::time::Instant;
use thiserror::Error;
#[cfg(feature = "duckdb")]
use tracing::{debug, debug_span, info, warn};

#[cfg(feature = "duckdb")]
use crate::value::{DbRow, DbTimestamp, DbValue, FromDbValue};

/// Errors from database backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database is locked by another process: {0}")]
    Locked(String),

    #[error("Operation requires write access but database is read-only")]
    ReadOnly,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend not available: {0}")]
    NotAvailable(String),

    #[cfg(feature = "duckdb")]
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Database access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-write access (requires exclusive lock for DuckDB)
    ReadWrite,
    /// Read-only access (can coexist with other readers)
    ReadOnly,
}

/// DuckDB connection.
///
/// Clones share the same underlying connection and are confined to one thread.
#[cfg(feature = "duckdb")]
#[derive(Clone)]
pub struct DbConnection {
    conn: Rc<duckdb::Connection>,
    access_mode: AccessMode,
    /// Holds the exclusive file lock via RAII - not read, but dropping it releases the lock.
    #[allow(dead_code)]
    lock_guard: Option<Rc<crate::lock::DbLockGuard>>,
}

#[cfg(feature = "duckdb")]
impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("backend", &"DuckDB")
            .field("access_mode", &self.access_mode)
            .finish()
    }
}

#[cfg(feature = "duckdb")]
impl DbConnection {
    /// Open a database from a URL: `duckdb:<path>` or `duckdb::memory:`.
    pub fn open_from_url(url: &str) -> Result<Self, BackendError> {
        match url.strip_prefix("duckdb:") {
            Some(":memory:") => Self::open_duckdb_memory(),
            Some(path) => Self::open_duckdb(Path::new(path)),
            None => Err(BackendError::NotAvailable(format!(
                "Unsupported database URL: {}",
                url
            ))),
        }
    }

    /// Open a file database for writing.
    ///
    /// DuckDB allows one writer process per file, so the writer lock next to
    /// the file is taken first and held for the life of the connection.
    pub fn open_duckdb(path: &Path) -> Result<Self, BackendError> {
        let lock_guard = crate::lock::try_lock_exclusive(&crate::lock::lock_path_for(path))?;
        let conn = duckdb::Connection::open(path)?;
        info!("Opened DuckDB database for writing: {}", path.display());
        Ok(Self::wrap(conn, AccessMode::ReadWrite, Some(lock_guard)))
    }

    /// Open a file database read-only; no lock is taken.
    pub fn open_duckdb_readonly(path: &Path) -> Result<Self, BackendError> {
        let config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
        let conn = duckdb::Connection::open_with_flags(path, config)?;
        info!("Opened DuckDB database read-only: {}", path.display());
        Ok(Self::wrap(conn, AccessMode::ReadOnly, None))
    }

    pub fn open_duckdb_memory() -> Result<Self, BackendError> {
        let conn = duckdb::Connection::open_in_memory()?;
        debug!("Opened in-memory DuckDB database");
        Ok(Self::wrap(conn, AccessMode::ReadWrite, None))
    }

    fn wrap(
        conn: duckdb::Connection,
        access_mode: AccessMode,
        lock_guard: Option<crate::lock::DbLockGuard>,
    ) -> Self {
        Self {
            conn: Rc::new(conn),
            access_mode,
            lock_guard: lock_guard.map(Rc::new),
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn is_writable(&self) -> bool {
        self.access_mode == AccessMode::ReadWrite
    }

    /// Execute one parameterized statement, returning the changed row count.
    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        self.ensure_writable()?;
        self.traced("exec", sql, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let changed = stmt.execute(duckdb::params_from_iter(bind(params)))?;
            Ok(changed as u64)
        })
    }

    /// Execute several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;
        self.traced("batch", sql, |conn| Ok(conn.execute_batch(sql)?))
    }

    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        self.traced("query", sql, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(duckdb::params_from_iter(bind(params)))?;
            let columns = match rows.as_ref() {
                Some(stmt) => stmt.column_names(),
                None => return Ok(Vec::new()),
            };

            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..columns.len())
                    .map(|i| value_at(row, i))
                    .collect::<Result<Vec<_>, _>>()?;
                result.push(DbRow::new(columns.clone(), values));
            }
            Ok(result)
        })
    }

    pub fn query_optional(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Option<DbRow>, BackendError> {
        Ok(self.query_all(sql, params)?.into_iter().next())
    }

    /// First column of the first row.
    pub fn query_scalar<T: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))?
            .get(0)
    }

    fn ensure_writable(&self) -> Result<(), BackendError> {
        match self.access_mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(BackendError::ReadOnly),
        }
    }

    /// Run `f` inside a `db.statement` span carrying the op, SQL hash and duration.
    fn traced<T>(
        &self,
        kind: &'static str,
        sql: &str,
        f: impl FnOnce(&duckdb::Connection) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let span = debug_span!(
            "db.statement",
            kind,
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = tracing::field::Empty
        );
        let _enter = span.enter();
        let start = Instant::now();
        let result = f(&self.conn);
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        result
    }
}

#[cfg(feature = "duckdb")]
fn bind(params: &[DbValue]) -> Vec<duckdb::types::Value> {
    use duckdb::types::{TimeUnit, Value};

    params
        .iter()
        .map(|p| match p {
            DbValue::Null => Value::Null,
            DbValue::Integer(v) => Value::BigInt(*v),
            DbValue::Real(v) => Value::Double(*v),
            DbValue::Text(v) => Value::Text(v.clone()),
            DbValue::Blob(v) => Value::Blob(v.clone()),
            DbValue::Boolean(v) => Value::Boolean(*v),
            DbValue::Timestamp(v) => {
                Value::Timestamp(TimeUnit::Microsecond, v.as_chrono().timestamp_micros())
            }
        })
        .collect()
}

#[cfg(feature = "duckdb")]
fn value_at(row: &duckdb::Row, index: usize) -> Result<DbValue, duckdb::Error> {
    use duckdb::types::{TimeUnit, ValueRef};

    let value = match row.get_ref(index)? {
        ValueRef::Null => DbValue::Null,
        ValueRef::Boolean(v) => DbValue::Boolean(v),
        ValueRef::TinyInt(v) => DbValue::Integer(v.into()),
        ValueRef::SmallInt(v) => DbValue::Integer(v.into()),
        ValueRef::Int(v) => DbValue::Integer(v.into()),
        ValueRef::BigInt(v) => DbValue::Integer(v),
        ValueRef::HugeInt(v) => DbValue::Integer(v as i64),
        ValueRef::UTinyInt(v) => DbValue::Integer(v.into()),
        ValueRef::USmallInt(v) => DbValue::Integer(v.into()),
        ValueRef::UInt(v) => DbValue::Integer(v.into()),
        ValueRef::UBigInt(v) => DbValue::Integer(v as i64),
        ValueRef::Float(v) => DbValue::Real(v.into()),
        ValueRef::Double(v) => DbValue::Real(v),
        ValueRef::Text(v) => DbValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => DbValue::Blob(v.to_vec()),
        ValueRef::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v * 1_000_000,
                TimeUnit::Millisecond => v * 1_000,
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| DbValue::Timestamp(DbTimestamp::from_chrono(dt)))
                .unwrap_or(DbValue::Integer(micros))
        }
        other => {
            warn!(column = index, "unmapped DuckDB value, storing its debug form");
            DbValue::Text(format!("{:?}", other))
        }
    };
    Ok(value)
}

impl From<crate::lock::LockError> for BackendError {
    fn from(err: crate::lock::LockError) -> Self {
        use crate::lock::LockError;

        match err {
            LockError::Locked(p) => BackendError::Locked(p.display().to_string()),
            LockError::CreateFailed(io) => {
                BackendError::Database(format!("Lock file error: {}", io))
            }
            LockError::AcquireFailed(io) => {
                BackendError::Database(format!("Lock acquire error: {}", io))
            }
        }
    }
}

/// First keyword of a statement, used as the span's `op` field.
pub fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

/// FNV-1a 64-bit hash for low-cardinality, stable identification.
pub fn hash_sql(sql: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_sql_is_stable() {
        assert_eq!(hash_sql("SELECT 1"), hash_sql("SELECT 1"));
        assert_ne!(hash_sql("SELECT 1"), hash_sql("SELECT 2"));
        assert_eq!(hash_sql("").len(), 16);
    }

    #[test]
    fn sql_op_name_takes_first_word() {
        assert_eq!(sql_op_name("  INSERT INTO t VALUES (?)"), "INSERT");
        assert_eq!(sql_op_name(""), "unknown");
    }

    #[test]
    #[cfg(feature = "duckdb")]
    fn execute_and_query_round_trip() {
        let conn = DbConnection::open_duckdb_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id BIGINT, name VARCHAR)")
            .unwrap();

        let inserted = conn
            .execute(
                "INSERT INTO t (id, name) VALUES (?, ?)",
                &[DbValue::from(1_i64), DbValue::from("alpha")],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let count: i64 = conn.query_scalar("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(count, 1);

        let rows = conn
            .query_all("SELECT name FROM t WHERE id = ?", &[DbValue::from(1_i64)])
            .unwrap();
        assert_eq!(rows[0].get_by_name::<String>("name").unwrap(), "alpha");
    }

    #[test]
    #[cfg(feature = "duckdb")]
    fn open_from_url_rejects_unknown_scheme() {
        let err = DbConnection::open_from_url("mysql://localhost/db").unwrap_err();
        assert!(matches!(err, BackendError::NotAvailable(_)));
    }
}
