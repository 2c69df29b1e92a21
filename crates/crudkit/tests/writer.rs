//! Validated writes and the users deletion policy.

use std::cell::RefCell;
use std::collections::BTreeSet;

use crudkit::{
    record_from_json, BackendError, CrudError, DbRow, DbValue, DdlStatement, Dialect, LiveColumn,
    MemoryStore, Record, RecordWriter, Store, Table, UserTable, ValidationError,
};
use serde_json::json;

fn record(value: serde_json::Value) -> Record {
    record_from_json(value.as_object().unwrap()).unwrap()
}

fn users() -> UserTable<MemoryStore> {
    let users = UserTable::new(MemoryStore::new()).unwrap();
    users.synchronize().unwrap();
    users.table().store().clear_log();
    users
}

// =============================================================================
// REQUIRED FIELDS
// =============================================================================

#[test]
fn test_create_requires_name() {
    let users = users();

    let err = users
        .create(&record(json!({"email": "x@example.com"})))
        .unwrap_err();

    assert!(matches!(
        &err,
        CrudError::Validation(ValidationError::MissingField(field)) if field == "name"
    ));
    assert_eq!(err.to_string(), "Validation error: field 'name' cannot be null");
    assert!(users.table().store().executed().is_empty());
}

#[test]
fn test_missing_set_empties_once_supplied() {
    let users = users();
    let partial = record(json!({"email": "x@example.com"}));
    assert_eq!(users.table().missing_required(&partial), vec!["name"]);

    let complete = record(json!({"email": "x@example.com", "name": "X"}));
    assert!(users.table().missing_required(&complete).is_empty());
    assert_eq!(users.create(&complete).unwrap(), 1);
}

#[test]
fn test_create_ignores_extra_fields() {
    let users = users();
    users
        .create(&record(json!({"name": "A", "email": "a@x", "nickname": "z"})))
        .unwrap();

    let executed = users.table().store().executed();
    assert_eq!(executed[0].sql, "INSERT INTO users (name, email) VALUES (?, ?)");
}

#[test]
fn test_create_leaves_id_to_the_store() {
    let users = users();
    users
        .create(&record(json!({"name": "Alice Smith", "email": "alice.smith@example.com"})))
        .unwrap();

    let executed = users.table().store().executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql, "INSERT INTO users (name, email) VALUES (?, ?)");
    assert_eq!(
        executed[0].params,
        vec![
            DbValue::from("Alice Smith"),
            DbValue::from("alice.smith@example.com")
        ]
    );
}

#[test]
fn test_update_requires_every_required_column() {
    let users = users();

    let err = users.update(&DbValue::from("2"), &Record::new()).unwrap_err();
    assert!(matches!(err, CrudError::Validation(ValidationError::MissingField(_))));

    let err = users
        .update(&DbValue::from("2"), &record(json!({"name": "Only Name"})))
        .unwrap_err();
    assert!(matches!(
        &err,
        CrudError::Validation(ValidationError::MissingField(field)) if field == "email"
    ));
    assert!(users.table().store().executed().is_empty());
}

#[test]
fn test_update_by_id() {
    let users = users();
    users
        .update(
            &DbValue::from("1"),
            &record(json!({"email": "updated.email@example.com", "name": "Updated Name"})),
        )
        .unwrap();

    let executed = users.table().store().executed();
    assert_eq!(executed[0].sql, "UPDATE users SET name = ?, email = ? WHERE id = ?");
    assert_eq!(executed[0].params.last(), Some(&DbValue::from("1")));
}

// =============================================================================
// DELETION POLICY
// =============================================================================

#[test]
fn test_protected_user_cannot_be_deleted() {
    let users = users();

    let err = users.delete(&DbValue::from("1")).unwrap_err();

    assert!(matches!(err, CrudError::Permission(_)));
    assert!(err.is_caller_error());
    assert!(users.table().store().executed().is_empty());
}

#[test]
fn test_other_users_are_deleted() {
    let users = users();

    assert_eq!(users.delete(&DbValue::from("2")).unwrap(), 1);

    let executed = users.table().store().executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql, "DELETE FROM users WHERE id = ?");
    assert_eq!(executed[0].params, vec![DbValue::from("2")]);
}

/// Store holding the ids of existing user rows; deletes by id remove them.
struct UserRows {
    schema: MemoryStore,
    ids: RefCell<BTreeSet<i64>>,
}

impl UserRows {
    fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            schema: MemoryStore::new(),
            ids: RefCell::new(ids.into_iter().collect()),
        }
    }

    fn ids(&self) -> Vec<i64> {
        self.ids.borrow().iter().copied().collect()
    }
}

impl Store for UserRows {
    fn dialect(&self) -> Dialect {
        self.schema.dialect()
    }

    fn table_exists(&self, table: &str) -> Result<bool, BackendError> {
        self.schema.table_exists(table)
    }

    fn live_columns(&self, table: &str) -> Result<Vec<LiveColumn>, BackendError> {
        self.schema.live_columns(table)
    }

    fn execute_ddl(&self, statement: &DdlStatement) -> Result<(), BackendError> {
        self.schema.execute_ddl(statement)
    }

    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        self.schema.execute(sql, params)?;
        match (sql, params) {
            ("DELETE FROM users WHERE id = ?", [DbValue::Integer(id)]) => {
                Ok(u64::from(self.ids.borrow_mut().remove(id)))
            }
            _ => Err(BackendError::Query(format!("unexpected statement: {sql}"))),
        }
    }

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        self.schema.query_all(sql, params)
    }
}

#[test]
fn test_delete_removes_only_unprotected_rows() {
    let users = UserTable::new(UserRows::new([1, 2, 3])).unwrap();
    users.synchronize().unwrap();

    assert!(matches!(
        users.delete(&DbValue::Integer(1)),
        Err(CrudError::Permission(_))
    ));
    assert_eq!(users.table().store().ids(), vec![1, 2, 3]);

    assert_eq!(users.delete(&DbValue::Integer(2)).unwrap(), 1);
    assert_eq!(users.table().store().ids(), vec![1, 3]);

    let executed = users.table().store().schema.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].params, vec![DbValue::Integer(2)]);

    assert_eq!(users.delete(&DbValue::Integer(2)).unwrap(), 0);
}

#[test]
fn test_plain_table_has_no_policy() {
    let users = users();
    let table: &Table<MemoryStore> = users.table();
    assert_eq!(table.delete(&DbValue::from("1")).unwrap(), 1);
}

#[test]
fn test_writers_behind_trait_objects() {
    let users = users();
    let writer: &dyn RecordWriter = &users;
    assert_eq!(writer.descriptor().name(), "users");
    assert!(writer.delete(&DbValue::Integer(1)).is_err());
}

// =============================================================================
// DUCKDB
// =============================================================================

#[cfg(feature = "duckdb")]
mod duckdb {
    use super::*;
    use crudkit::FilterExpr;
    use crudkit_db::DbConnection;

    #[test]
    fn test_users_round_trip_in_duckdb() {
        let users = UserTable::new(DbConnection::open_duckdb_memory().unwrap()).unwrap();
        users.synchronize().unwrap();

        users
            .create(&record(json!({"name": "Alice", "email": "alice@example.com"})))
            .unwrap();
        users
            .create(&record(json!({"name": "Bob", "email": "bob@example.org"})))
            .unwrap();

        assert!(users.delete(&DbValue::Integer(1)).is_err());
        assert_eq!(users.delete(&DbValue::Integer(2)).unwrap(), 1);

        let rows = users
            .table()
            .select(&FilterExpr::like("email", "@example.com"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name::<String>("name").unwrap(), "Alice");
        assert_eq!(users.table().count(&FilterExpr::and([])).unwrap(), 1);
    }
}
