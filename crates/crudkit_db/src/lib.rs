//! Storage layer for crudkit.
//!
//! Holds the value model shared by every store (`DbValue`, `DbRow`), the
//! backend error type, the synchronous DuckDB connection (feature `duckdb`)
//! and the file locks used to serialize writers and schema migrations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crudkit_db::{DbConnection, DbValue};
//!
//! let conn = DbConnection::open_from_url("duckdb::memory:")?;
//! conn.execute("INSERT INTO users (name) VALUES (?)", &[DbValue::from("Alice")])?;
//! let rows = conn.query_all("SELECT name FROM users", &[])?;
//! ```

pub mod backend;
pub mod lock;
mod value;

pub use backend::{hash_sql, sql_op_name, AccessMode, BackendError};
#[cfg(feature = "duckdb")]
pub use backend::DbConnection;
pub use lock::{lock_exclusive, lock_path_for, try_lock_exclusive, DbLockGuard, LockError};
pub use value::{DbRow, DbTimestamp, DbTimestampError, DbValue, FromDbValue};
