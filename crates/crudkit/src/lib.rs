//! Descriptor-driven access to a single relational table.
//!
//! A [`TableDescriptor`] declares a table's columns once. From it:
//!
//! - [`SchemaSynchronizer`] creates the table or brings an existing one in
//!   line (modify drifted columns, add missing ones, key the auto-increment
//!   column) without touching columns it does not know.
//! - [`Table`] validates records before writing them and runs filtered
//!   selects; entity wrappers such as [`UserTable`] add write policy on top.
//! - [`FilterCompiler`] turns a nested filter into a parameterized
//!   [`Predicate`], collecting every unknown column instead of stopping at
//!   the first.
//!
//! Storage is reached through the [`Store`] trait. [`MemoryStore`] models a
//! schema in process; with the `duckdb` feature, `crudkit_db::DbConnection`
//! is a store too.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crudkit::{FilterExpr, MemoryStore, Record, RecordWriter, UserTable};
//!
//! let users = UserTable::new(MemoryStore::new())?;
//! users.synchronize()?;
//!
//! let mut alice = Record::new();
//! alice.insert("name".into(), "Alice".into());
//! alice.insert("email".into(), "alice@example.com".into());
//! users.create(&alice)?;
//!
//! let rows = users.table().select(&FilterExpr::like("email", "@example.com"))?;
//! ```

pub mod config;
pub mod descriptor;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod store;
pub mod sync;
pub mod users;
pub mod writer;

pub use config::{load_descriptor, ColumnEntry, DescriptorFile};
pub use descriptor::{
    is_valid_identifier, ColumnDescriptor, ColumnProperties, DescriptorError, PropertyFlag,
    TableDescriptor, TableDescriptorBuilder,
};
pub use dialect::{DdlStatement, Dialect};
pub use error::{CrudError, Result, ValidationError};
pub use filter::{
    CompiledFilter, Condition, FilterCompiler, FilterError, FilterExpr, FilterParseError, Logic,
    Operator, Predicate,
};
pub use store::{ExecutedStatement, KeyRole, LiveColumn, MemoryStore, Store};
pub use sync::{plan_changes, SchemaSynchronizer, SyncReport};
pub use users::{users_descriptor, UserTable, PROTECTED_USER_ID, USERS_TABLE};
pub use writer::{record_from_json, Record, RecordWriter, Table};

pub use crudkit_db::{BackendError, DbRow, DbValue};
