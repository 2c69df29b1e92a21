//! [`Store`] for the DuckDB backend.

use crudkit_db::{BackendError, DbConnection, DbRow, DbValue};

use super::{KeyRole, LiveColumn, Store};
use crate::dialect::{DdlStatement, Dialect};

const TABLE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = ?";

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable, column_default \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = ? \
     ORDER BY ordinal_position";

const PRIMARY_KEY_SQL: &str = "SELECT unnest(constraint_column_names) AS column_name \
     FROM duckdb_constraints() \
     WHERE schema_name = current_schema() AND table_name = ? \
     AND constraint_type = 'PRIMARY KEY'";

impl Store for DbConnection {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn table_exists(&self, table: &str) -> Result<bool, BackendError> {
        let count: i64 = self.query_scalar(TABLE_EXISTS_SQL, &[DbValue::from(table)])?;
        Ok(count > 0)
    }

    fn live_columns(&self, table: &str) -> Result<Vec<LiveColumn>, BackendError> {
        let params = [DbValue::from(table)];
        let primary_key = DbConnection::query_all(self, PRIMARY_KEY_SQL, &params)?
            .iter()
            .map(|row| row.get::<String>(0))
            .collect::<Result<Vec<_>, _>>()?;

        DbConnection::query_all(self, COLUMNS_SQL, &params)?
            .iter()
            .map(|row| {
                let name: String = row.get(0)?;
                let default: Option<String> = row.get(3)?;
                let is_nullable: String = row.get(2)?;
                let extra = match &default {
                    Some(d) if d.starts_with("nextval(") => "auto_increment".to_string(),
                    _ => String::new(),
                };
                Ok(LiveColumn {
                    key: if primary_key.contains(&name) {
                        KeyRole::Primary
                    } else {
                        KeyRole::None
                    },
                    name,
                    column_type: row.get(1)?,
                    nullable: is_nullable == "YES",
                    default,
                    extra,
                })
            })
            .collect()
    }

    fn execute_ddl(&self, statement: &DdlStatement) -> Result<(), BackendError> {
        self.execute_batch(&statement.to_sql(Dialect::DuckDb))
    }

    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        DbConnection::execute(self, sql, params)
    }

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        DbConnection::query_all(self, sql, params)
    }
}
