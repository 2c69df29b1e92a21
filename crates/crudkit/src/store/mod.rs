//! The storage capabilities the core consumes.
//!
//! A [`Store`] executes DDL and parameterized DML and answers introspection
//! queries. Connection setup, pooling and retries belong to whoever
//! constructs the store.

use std::rc::Rc;
use std::sync::Arc;

use crudkit_db::{BackendError, DbRow, DbValue};

use crate::descriptor::ColumnDescriptor;
use crate::dialect::{DdlStatement, Dialect};

#[cfg(feature = "duckdb")]
mod duckdb;
mod memory;

pub use memory::{ExecutedStatement, MemoryStore};

/// Role a live column plays in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Unique,
    /// Part of a non-unique index.
    Multiple,
}

impl KeyRole {
    /// Parse the `Key` column of MySQL's `SHOW COLUMNS`.
    pub fn from_mysql(key: &str) -> Self {
        match key {
            "PRI" => KeyRole::Primary,
            "UNI" => KeyRole::Unique,
            "MUL" => KeyRole::Multiple,
            _ => KeyRole::None,
        }
    }
}

/// A column as the store currently has it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub column_type: String,
    pub nullable: bool,
    pub key: KeyRole,
    pub default: Option<String>,
    /// Extra attributes such as `auto_increment`.
    pub extra: String,
}

impl LiveColumn {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            nullable: true,
            key: KeyRole::None,
            default: None,
            extra: String::new(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.key = KeyRole::Primary;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The live column a store of `dialect` would report after creating `column`.
    pub fn from_descriptor(column: &ColumnDescriptor, primary_key: bool, dialect: Dialect) -> Self {
        Self {
            name: column.name().to_string(),
            column_type: column.column_type().to_string(),
            nullable: !(column.is_not_null() || primary_key),
            key: if primary_key { KeyRole::Primary } else { KeyRole::None },
            default: column.default().map(|d| dialect.reported_default(d)),
            extra: if column.is_auto_increment() {
                "auto_increment".to_string()
            } else {
                String::new()
            },
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.key == KeyRole::Primary
    }
}

/// Storage operations used by the synchronizer, writers and selects.
///
/// All calls are blocking. Implementations may be shared between callers;
/// the core keeps no state between calls.
pub trait Store {
    /// SQL flavour used to render DDL and compare live metadata.
    fn dialect(&self) -> Dialect;

    fn table_exists(&self, table: &str) -> Result<bool, BackendError>;

    /// Live columns of an existing table, in table order.
    fn live_columns(&self, table: &str) -> Result<Vec<LiveColumn>, BackendError>;

    fn execute_ddl(&self, statement: &DdlStatement) -> Result<(), BackendError>;

    /// Execute a parameterized statement, returning the affected row count.
    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError>;

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError>;
}

macro_rules! forward_store {
    ($($ptr:ty),*) => {$(
        impl<S: Store + ?Sized> Store for $ptr {
            fn dialect(&self) -> Dialect {
                (**self).dialect()
            }

            fn table_exists(&self, table: &str) -> Result<bool, BackendError> {
                (**self).table_exists(table)
            }

            fn live_columns(&self, table: &str) -> Result<Vec<LiveColumn>, BackendError> {
                (**self).live_columns(table)
            }

            fn execute_ddl(&self, statement: &DdlStatement) -> Result<(), BackendError> {
                (**self).execute_ddl(statement)
            }

            fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
                (**self).execute(sql, params)
            }

            fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
                (**self).query_all(sql, params)
            }
        }
    )*};
}

forward_store!(&S, Arc<S>, Rc<S>, Box<S>);
