//! Validated writes and filtered reads against one table.

use std::collections::BTreeMap;
use std::path::Path;

use crudkit_db::{DbRow, DbValue};
use serde_json::{Map, Value};
use tracing::debug;

use crate::descriptor::TableDescriptor;
use crate::dialect::Dialect;
use crate::error::{CrudError, Result, ValidationError};
use crate::filter::{CompiledFilter, FilterCompiler, FilterExpr};
use crate::store::Store;
use crate::sync::{SchemaSynchronizer, SyncReport};

/// Field values keyed by column name.
pub type Record = BTreeMap<String, DbValue>;

/// Build a [`Record`] from a JSON object of scalars.
pub fn record_from_json(object: &Map<String, Value>) -> Result<Record> {
    object
        .iter()
        .map(|(field, value)| {
            DbValue::from_json(value)
                .map(|v| (field.clone(), v))
                .ok_or_else(|| CrudError::from(ValidationError::NonScalarValue(field.clone())))
        })
        .collect()
}

/// Create, update and delete records of one table.
///
/// Entity types wrap a [`Table`] and override the operations whose policy
/// differs, delegating the rest.
pub trait RecordWriter {
    fn descriptor(&self) -> &TableDescriptor;

    /// Insert a record; returns the affected row count.
    ///
    /// Every required column (NOT NULL, no default, not auto-increment) must
    /// be present in the record. Fields outside the descriptor are ignored.
    fn create(&self, record: &Record) -> Result<u64>;

    /// Update the row whose `id` matches.
    ///
    /// Required columns are checked against the whole descriptor, so the
    /// record must carry them even when they are unchanged.
    fn update(&self, id: &DbValue, record: &Record) -> Result<u64>;

    /// Delete the row whose `id` matches.
    fn delete(&self, id: &DbValue) -> Result<u64>;
}

/// A store bound to a table descriptor.
#[derive(Debug, Clone)]
pub struct Table<S> {
    store: S,
    descriptor: TableDescriptor,
}

impl<S: Store> Table<S> {
    pub fn new(store: S, descriptor: TableDescriptor) -> Self {
        Self { store, descriptor }
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bring the live table in line with the descriptor.
    pub fn synchronize(&self) -> Result<SyncReport> {
        SchemaSynchronizer::new(&self.store).synchronize(&self.descriptor)
    }

    pub fn synchronize_exclusive(&self, lock_path: &Path) -> Result<SyncReport> {
        SchemaSynchronizer::new(&self.store).synchronize_exclusive(&self.descriptor, lock_path)
    }

    pub fn compiler(&self) -> FilterCompiler<'_> {
        FilterCompiler::new(&self.descriptor)
    }

    /// Compile a filter; unknown columns are reported, not raised.
    pub fn prepare_where(&self, filter: &FilterExpr) -> CompiledFilter {
        self.compiler().compile(filter)
    }

    pub fn prepare_where_json(&self, filter: &Value) -> Result<CompiledFilter> {
        Ok(self.compiler().compile_json(filter)?)
    }

    /// Rows matching `filter`, with the descriptor's columns in order.
    ///
    /// Fails with [`CrudError::InvalidFilter`] before querying if any leaf
    /// names an unknown column.
    pub fn select(&self, filter: &FilterExpr) -> Result<Vec<DbRow>> {
        let predicate = self.prepare_where(filter).into_result()?;
        let columns: Vec<&str> = self.descriptor.column_names().collect();
        let sql = with_where(
            format!("SELECT {} FROM {}", columns.join(", "), self.descriptor.name()),
            predicate.sql(),
        );
        debug!(table = self.descriptor.name(), filter = %predicate, "select");
        Ok(self.store.query_all(&sql, predicate.params())?)
    }

    pub fn select_json(&self, filter: &Value) -> Result<Vec<DbRow>> {
        self.select(&FilterExpr::from_json(filter)?)
    }

    /// Number of rows matching `filter`.
    pub fn count(&self, filter: &FilterExpr) -> Result<u64> {
        let predicate = self.prepare_where(filter).into_result()?;
        let sql = with_where(
            format!("SELECT COUNT(*) FROM {}", self.descriptor.name()),
            predicate.sql(),
        );
        let rows = self.store.query_all(&sql, predicate.params())?;
        match rows.first() {
            Some(row) => {
                let count: i64 = row.get(0)?;
                Ok(count.max(0) as u64)
            }
            None => Ok(0),
        }
    }

    /// Required columns whose key `record` lacks, in descriptor order.
    ///
    /// Only presence is checked; an explicit null is left for the store to
    /// accept or refuse.
    pub fn missing_required<'a>(&'a self, record: &Record) -> Vec<&'a str> {
        self.descriptor
            .required_columns()
            .filter(|c| !record.contains_key(c.name()))
            .map(|c| c.name())
            .collect()
    }

    fn validate(&self, record: &Record) -> Result<()> {
        match self.missing_required(record).first() {
            Some(field) => Err(ValidationError::MissingField(field.to_string()).into()),
            None => Ok(()),
        }
    }

    fn insert_sql(&self, columns: &[&str]) -> String {
        let table = self.descriptor.name();
        if columns.is_empty() {
            return match self.store.dialect() {
                Dialect::MySql => format!("INSERT INTO {} () VALUES ()", table),
                Dialect::DuckDb => format!("INSERT INTO {} DEFAULT VALUES", table),
            };
        }
        let placeholders = vec!["?"; columns.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}

impl<S: Store> RecordWriter for Table<S> {
    fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    fn create(&self, record: &Record) -> Result<u64> {
        self.validate(record)?;

        // Every column is bound, absent ones as NULL. An absent
        // auto-increment column is left out so the store assigns it.
        let (columns, params): (Vec<&str>, Vec<DbValue>) = self
            .descriptor
            .columns()
            .iter()
            .filter_map(|c| match record.get(c.name()) {
                Some(value) => Some((c.name(), value.clone())),
                None if c.is_auto_increment() => None,
                None => Some((c.name(), DbValue::Null)),
            })
            .unzip();

        let sql = self.insert_sql(&columns);
        let rows = self.store.execute(&sql, &params)?;
        debug!(table = self.descriptor.name(), rows, "inserted record");
        Ok(rows)
    }

    fn update(&self, id: &DbValue, record: &Record) -> Result<u64> {
        self.validate(record)?;

        let mut assignments = Vec::with_capacity(record.len());
        let mut params = Vec::with_capacity(record.len() + 1);
        for column in self.descriptor.columns() {
            if let Some(value) = record.get(column.name()) {
                assignments.push(format!("{} = ?", column.name()));
                params.push(value.clone());
            }
        }
        if assignments.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        params.push(id.clone());

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            self.descriptor.name(),
            assignments.join(", ")
        );
        let rows = self.store.execute(&sql, &params)?;
        debug!(table = self.descriptor.name(), id = %id, rows, "updated record");
        Ok(rows)
    }

    fn delete(&self, id: &DbValue) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.descriptor.name());
        let rows = self.store.execute(&sql, std::slice::from_ref(id))?;
        debug!(table = self.descriptor.name(), id = %id, rows, "deleted record");
        Ok(rows)
    }
}

fn with_where(mut sql: String, predicate: &str) -> String {
    if !predicate.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    sql
}
