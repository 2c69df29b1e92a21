//! Schema synchronization.
//!
//! Brings a live table in line with its [`TableDescriptor`]: creates it when
//! missing, otherwise modifies drifted columns, adds missing ones and makes
//! the auto-increment column the primary key. Columns the descriptor does
//! not name are never touched.
//!
//! Concurrent runs against one table race on the introspection snapshot.
//! Run synchronization once per deployment, or go through
//! [`SchemaSynchronizer::synchronize_exclusive`] so processes take turns.

use std::path::Path;

use crudkit_db::{lock_exclusive, BackendError};
use tracing::{debug, info, info_span};

use crate::descriptor::TableDescriptor;
use crate::dialect::{DdlStatement, Dialect};
use crate::error::{CrudError, Result};
use crate::store::{LiveColumn, Store};

/// What a synchronization run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub table: String,
    /// The table did not exist and was created.
    pub created: bool,
    /// Statements issued, in order.
    pub statements: Vec<DdlStatement>,
    pub dialect: Dialect,
}

impl SyncReport {
    /// No statement was issued.
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn sql_statements(&self) -> Vec<String> {
        self.statements
            .iter()
            .map(|s| s.to_sql(self.dialect))
            .collect()
    }
}

/// Reconciles live tables against descriptors through a [`Store`].
#[derive(Debug, Clone)]
pub struct SchemaSynchronizer<S> {
    store: S,
}

impl<S: Store> SchemaSynchronizer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The statements [`synchronize`](Self::synchronize) would issue now.
    pub fn plan(&self, descriptor: &TableDescriptor) -> Result<Vec<DdlStatement>> {
        let live = self.introspect(descriptor.name())?;
        Ok(plan_changes(descriptor, live.as_deref(), self.store.dialect()))
    }

    /// Apply every planned statement, stopping at the first failure.
    ///
    /// A failed statement surfaces as [`CrudError::Schema`] carrying its SQL
    /// text. Statements applied before it are not rolled back; rerun after
    /// fixing the cause.
    pub fn synchronize(&self, descriptor: &TableDescriptor) -> Result<SyncReport> {
        let span = info_span!("crudkit.sync", table = descriptor.name());
        let _enter = span.enter();

        let dialect = self.store.dialect();
        let live = self.introspect(descriptor.name())?;
        let created = live.is_none();
        let statements = plan_changes(descriptor, live.as_deref(), dialect);
        debug!(
            exists = !created,
            statements = statements.len(),
            "planned schema changes"
        );

        for statement in &statements {
            let sql = statement.to_sql(dialect);
            info!(sql = %sql, "applying schema change");
            self.store
                .execute_ddl(statement)
                .map_err(|source| CrudError::Schema {
                    statement: sql,
                    source,
                })?;
        }

        if created {
            info!("created table {}", descriptor.name());
        } else if statements.is_empty() {
            debug!("table {} already matches its descriptor", descriptor.name());
        }

        Ok(SyncReport {
            table: descriptor.name().to_string(),
            created,
            statements,
            dialect,
        })
    }

    /// [`synchronize`](Self::synchronize) while holding an exclusive lock on
    /// `lock_path`, blocking until the lock is free.
    pub fn synchronize_exclusive(
        &self,
        descriptor: &TableDescriptor,
        lock_path: &Path,
    ) -> Result<SyncReport> {
        let _guard = lock_exclusive(lock_path).map_err(BackendError::from)?;
        self.synchronize(descriptor)
    }

    fn introspect(&self, table: &str) -> Result<Option<Vec<LiveColumn>>> {
        if !self.store.table_exists(table)? {
            return Ok(None);
        }
        Ok(Some(self.store.live_columns(table)?))
    }
}

/// Diff a descriptor against a live table (`None` when it does not exist).
pub fn plan_changes(
    descriptor: &TableDescriptor,
    live: Option<&[LiveColumn]>,
    dialect: Dialect,
) -> Vec<DdlStatement> {
    let table = descriptor.name().to_string();
    let auto_increment = descriptor.auto_increment_column();

    let Some(live) = live else {
        return vec![DdlStatement::CreateTable {
            table,
            columns: descriptor.columns().to_vec(),
            primary_key: auto_increment.map(|c| c.name().to_string()),
        }];
    };

    let mut statements = Vec::new();
    for column in descriptor.columns() {
        match live.iter().find(|l| l.name == column.name()) {
            Some(current) => {
                let drifted = !dialect.types_match(column.column_type(), &current.column_type)
                    || (column.is_not_null() && current.nullable)
                    || column
                        .default()
                        .is_some_and(|d| !dialect.defaults_match(d, current.default.as_deref()));
                if drifted {
                    statements.push(DdlStatement::ModifyColumn {
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
            }
            None => statements.push(DdlStatement::AddColumn {
                table: table.clone(),
                column: column.clone(),
                // An auto-increment column must be a key when it is created.
                primary_key: column.is_auto_increment(),
            }),
        }
    }

    if let Some(column) = auto_increment {
        let needs_key = live
            .iter()
            .find(|l| l.name == column.name())
            .is_some_and(|l| !l.is_primary_key());
        if needs_key {
            statements.push(DdlStatement::AddPrimaryKey {
                table,
                column: column.name().to_string(),
            });
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ColumnDescriptor;
    use crate::store::MemoryStore;

    fn users() -> TableDescriptor {
        TableDescriptor::builder("users")
            .column(ColumnDescriptor::new("id", "int").not_null().auto_increment())
            .column(ColumnDescriptor::new("name", "varchar(255)").not_null())
            .column(ColumnDescriptor::new("status", "varchar(16)").default_value("'active'"))
            .build()
            .unwrap()
    }

    fn matching_live() -> Vec<LiveColumn> {
        vec![
            LiveColumn::new("id", "int").primary_key(),
            LiveColumn::new("name", "varchar(255)").not_null(),
            LiveColumn::new("status", "varchar(16)").with_default("active"),
        ]
    }

    #[test]
    fn missing_table_is_created_with_primary_key() {
        let plan = plan_changes(&users(), None, Dialect::MySql);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan[0].to_sql(Dialect::MySql),
            "CREATE TABLE users (id int NOT NULL AUTO_INCREMENT, name varchar(255) NOT NULL, \
             status varchar(16) DEFAULT 'active', PRIMARY KEY (id))"
        );
    }

    #[test]
    fn matching_table_needs_nothing() {
        assert!(plan_changes(&users(), Some(&matching_live()), Dialect::MySql).is_empty());
    }

    #[test]
    fn drift_is_modified_with_full_definition() {
        let mut live = matching_live();
        live[1].nullable = true;
        live[2].default = Some("inactive".into());

        let plan = plan_changes(&users(), Some(&live), Dialect::MySql);
        let sql: Vec<String> = plan.iter().map(|s| s.to_sql(Dialect::MySql)).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE users MODIFY name varchar(255) NOT NULL",
                "ALTER TABLE users MODIFY status varchar(16) DEFAULT 'active'",
            ]
        );
    }

    #[test]
    fn type_change_is_modified() {
        let mut live = matching_live();
        live[1].column_type = "varchar(64)".into();
        let plan = plan_changes(&users(), Some(&live), Dialect::MySql);
        assert!(matches!(
            &plan[..],
            [DdlStatement::ModifyColumn { column, .. }] if column.name() == "name"
        ));
    }

    #[test]
    fn nullable_descriptor_tolerates_not_null_live() {
        let mut live = matching_live();
        live[2].nullable = false;
        assert!(plan_changes(&users(), Some(&live), Dialect::MySql).is_empty());
    }

    #[test]
    fn missing_columns_are_added() {
        let live = vec![LiveColumn::new("name", "varchar(255)").not_null()];
        let plan = plan_changes(&users(), Some(&live), Dialect::MySql);
        let sql: Vec<String> = plan.iter().map(|s| s.to_sql(Dialect::MySql)).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE users ADD COLUMN id int NOT NULL AUTO_INCREMENT PRIMARY KEY",
                "ALTER TABLE users ADD COLUMN status varchar(16) DEFAULT 'active'",
            ]
        );
    }

    #[test]
    fn existing_auto_increment_gets_primary_key() {
        let mut live = matching_live();
        live[0] = LiveColumn::new("id", "int").not_null();
        let plan = plan_changes(&users(), Some(&live), Dialect::MySql);
        assert_eq!(
            plan,
            vec![DdlStatement::AddPrimaryKey {
                table: "users".into(),
                column: "id".into(),
            }]
        );
    }

    #[test]
    fn unknown_live_columns_are_left_alone() {
        let mut live = matching_live();
        live.push(LiveColumn::new("legacy", "text"));
        assert!(plan_changes(&users(), Some(&live), Dialect::MySql).is_empty());
    }

    #[test]
    fn synchronize_reports_creation_then_noop() {
        let sync = SchemaSynchronizer::new(MemoryStore::new());
        let first = sync.synchronize(&users()).unwrap();
        assert!(first.created);
        assert_eq!(first.statements.len(), 1);

        let second = sync.synchronize(&users()).unwrap();
        assert!(!second.created);
        assert!(second.is_noop());
        assert!(sync.plan(&users()).unwrap().is_empty());
    }
}
