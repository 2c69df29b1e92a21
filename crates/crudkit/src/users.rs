//! The `users` table and its deletion policy.

use crudkit_db::DbValue;
use tracing::warn;

use crate::descriptor::{ColumnDescriptor, DescriptorError, TableDescriptor};
use crate::error::{CrudError, Result};
use crate::store::Store;
use crate::sync::SyncReport;
use crate::writer::{Record, RecordWriter, Table};

/// Id of the user row that can never be deleted.
pub const PROTECTED_USER_ID: &str = "1";

pub const USERS_TABLE: &str = "users";

/// `id` (auto-increment key), `name`, `email`.
pub fn users_descriptor() -> std::result::Result<TableDescriptor, DescriptorError> {
    TableDescriptor::builder(USERS_TABLE)
        .column(
            ColumnDescriptor::new("id", "int")
                .not_null()
                .indexed()
                .unique()
                .auto_increment(),
        )
        .column(ColumnDescriptor::new("name", "varchar(255)").not_null().indexed())
        .column(ColumnDescriptor::new("email", "varchar(255)").not_null().unique())
        .build()
}

/// Writer for `users` that refuses to delete the protected row.
#[derive(Debug, Clone)]
pub struct UserTable<S> {
    base: Table<S>,
}

impl<S: Store> UserTable<S> {
    pub fn new(store: S) -> Result<Self> {
        Ok(Self {
            base: Table::new(store, users_descriptor()?),
        })
    }

    /// The underlying table, for selects and counts.
    pub fn table(&self) -> &Table<S> {
        &self.base
    }

    pub fn synchronize(&self) -> Result<SyncReport> {
        self.base.synchronize()
    }
}

impl<S: Store> RecordWriter for UserTable<S> {
    fn descriptor(&self) -> &TableDescriptor {
        self.base.descriptor()
    }

    fn create(&self, record: &Record) -> Result<u64> {
        self.base.create(record)
    }

    fn update(&self, id: &DbValue, record: &Record) -> Result<u64> {
        self.base.update(id, record)
    }

    fn delete(&self, id: &DbValue) -> Result<u64> {
        if id.to_string() == PROTECTED_USER_ID {
            warn!(id = %id, "refused to delete protected user");
            return Err(CrudError::permission(format!(
                "deletion forbidden for user with id = {}",
                PROTECTED_USER_ID
            )));
        }
        self.base.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn descriptor_shape() {
        let descriptor = users_descriptor().unwrap();
        assert_eq!(
            descriptor.column_names().collect::<Vec<_>>(),
            vec!["id", "name", "email"]
        );
        assert_eq!(descriptor.auto_increment_column().map(|c| c.name()), Some("id"));
        let required: Vec<&str> = descriptor.required_columns().map(|c| c.name()).collect();
        assert_eq!(required, vec!["name", "email"]);
    }

    #[test]
    fn protected_row_is_matched_by_text_or_integer() {
        let users = UserTable::new(MemoryStore::new()).unwrap();
        for id in [DbValue::from(1_i64), DbValue::from("1")] {
            let err = users.delete(&id).unwrap_err();
            assert!(matches!(err, CrudError::Permission(_)));
        }
        assert!(users.table().store().executed().is_empty());
    }

    #[test]
    fn other_rows_delegate() {
        let users = UserTable::new(MemoryStore::new()).unwrap();
        assert_eq!(users.delete(&DbValue::from(2_i64)).unwrap(), 1);
        assert_eq!(
            users.table().store().executed()[0].sql,
            "DELETE FROM users WHERE id = ?"
        );
    }
}
