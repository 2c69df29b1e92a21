//! In-process store.
//!
//! Keeps a live-schema model that DDL statements are applied to, and records
//! every statement it is handed. DML is recorded but not interpreted; queries
//! answer from a queue of canned results. Faults can be injected to exercise
//! error paths.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crudkit_db::{BackendError, DbRow, DbValue};
use tracing::debug;

use super::{KeyRole, LiveColumn, Store};
use crate::dialect::{DdlStatement, Dialect};

/// A DML statement or query as the store received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<DbValue>,
}

#[derive(Debug, Default)]
struct MemoryState {
    dialect: Dialect,
    tables: BTreeMap<String, Vec<LiveColumn>>,
    ddl_log: Vec<String>,
    executed: Vec<ExecutedStatement>,
    queries: Vec<ExecutedStatement>,
    query_results: VecDeque<Vec<DbRow>>,
    rows_affected: u64,
    fail_ddl_in: Option<usize>,
    fail_next_execute: Option<String>,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty MySQL-flavoured store.
    pub fn new() -> Self {
        Self::with_dialect(Dialect::MySql)
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                dialect,
                rows_affected: 1,
                ..MemoryState::default()
            }),
        }
    }

    /// Seed an existing table.
    pub fn with_table(self, table: impl Into<String>, columns: Vec<LiveColumn>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.tables.insert(table.into(), columns);
        }
        self
    }

    /// Current live columns of `table`, if it exists.
    pub fn live_table(&self, table: &str) -> Option<Vec<LiveColumn>> {
        self.state.lock().ok()?.tables.get(table).cloned()
    }

    /// SQL text of every DDL statement applied (or attempted), in order.
    pub fn ddl_statements(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.ddl_log.clone())
            .unwrap_or_default()
    }

    /// Every DML statement passed to [`Store::execute`], in order.
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state
            .lock()
            .map(|s| s.executed.clone())
            .unwrap_or_default()
    }

    /// Every statement passed to [`Store::query_all`], in order.
    pub fn queries(&self) -> Vec<ExecutedStatement> {
        self.state
            .lock()
            .map(|s| s.queries.clone())
            .unwrap_or_default()
    }

    /// Forget recorded statements; the schema model is kept.
    pub fn clear_log(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.ddl_log.clear();
            state.executed.clear();
            state.queries.clear();
        }
    }

    /// Fail the DDL statement `n` statements from now (0 = the next one).
    pub fn fail_ddl_after(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_ddl_in = Some(n);
        }
    }

    /// Fail the next call to [`Store::execute`] with `message`.
    pub fn fail_next_execute(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next_execute = Some(message.into());
        }
    }

    /// Rows returned by the next [`Store::query_all`]; empty when the queue runs out.
    pub fn push_query_result(&self, rows: Vec<DbRow>) {
        if let Ok(mut state) = self.state.lock() {
            state.query_results.push_back(rows);
        }
    }

    /// Row count reported by [`Store::execute`] (default 1).
    pub fn set_rows_affected(&self, rows: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.rows_affected = rows;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::Database("memory store lock poisoned".to_string()))
    }
}

impl MemoryState {
    fn apply(&mut self, statement: &DdlStatement) -> Result<(), BackendError> {
        let dialect = self.dialect;
        match statement {
            DdlStatement::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                if self.tables.contains_key(table) {
                    return Err(BackendError::Query(format!("Table '{}' already exists", table)));
                }
                let live = columns
                    .iter()
                    .map(|c| {
                        let is_pk = primary_key.as_deref() == Some(c.name());
                        LiveColumn::from_descriptor(c, is_pk, dialect)
                    })
                    .collect();
                self.tables.insert(table.clone(), live);
            }
            DdlStatement::ModifyColumn { table, column } => {
                let live = self.column_mut(table, column.name())?;
                let key = live.key;
                *live = LiveColumn::from_descriptor(column, false, dialect);
                live.key = key;
                if key == KeyRole::Primary {
                    live.nullable = false;
                }
            }
            DdlStatement::AddColumn {
                table,
                column,
                primary_key,
            } => {
                let columns = self.table_mut(table)?;
                if columns.iter().any(|c| c.name == column.name()) {
                    return Err(BackendError::Query(format!(
                        "Duplicate column name '{}'",
                        column.name()
                    )));
                }
                if *primary_key && columns.iter().any(LiveColumn::is_primary_key) {
                    return Err(BackendError::Query("Multiple primary key defined".to_string()));
                }
                columns.push(LiveColumn::from_descriptor(column, *primary_key, dialect));
            }
            DdlStatement::AddPrimaryKey { table, column } => {
                if self.table_mut(table)?.iter().any(LiveColumn::is_primary_key) {
                    return Err(BackendError::Query("Multiple primary key defined".to_string()));
                }
                let live = self.column_mut(table, column)?;
                live.key = KeyRole::Primary;
                live.nullable = false;
            }
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut Vec<LiveColumn>, BackendError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| BackendError::Query(format!("Table '{}' doesn't exist", table)))
    }

    fn column_mut(&mut self, table: &str, column: &str) -> Result<&mut LiveColumn, BackendError> {
        self.table_mut(table)?
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| BackendError::Query(format!("Unknown column '{}'", column)))
    }
}

impl Store for MemoryStore {
    fn dialect(&self) -> Dialect {
        self.state.lock().map(|s| s.dialect).unwrap_or_default()
    }

    fn table_exists(&self, table: &str) -> Result<bool, BackendError> {
        Ok(self.lock()?.tables.contains_key(table))
    }

    fn live_columns(&self, table: &str) -> Result<Vec<LiveColumn>, BackendError> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| BackendError::Query(format!("Table '{}' doesn't exist", table)))
    }

    fn execute_ddl(&self, statement: &DdlStatement) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let sql = statement.to_sql(state.dialect);
        debug!(sql = %sql, "memory store DDL");
        state.ddl_log.push(sql);

        let pending_failure = state.fail_ddl_in;
        match pending_failure {
            Some(0) => {
                state.fail_ddl_in = None;
                return Err(BackendError::Query("injected DDL failure".to_string()));
            }
            Some(n) => state.fail_ddl_in = Some(n - 1),
            None => {}
        }

        state.apply(statement)
    }

    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        let mut state = self.lock()?;
        state.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if let Some(message) = state.fail_next_execute.take() {
            return Err(BackendError::Query(message));
        }
        Ok(state.rows_affected)
    }

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        let mut state = self.lock()?;
        state.queries.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(state.query_results.pop_front().unwrap_or_default())
    }
}
