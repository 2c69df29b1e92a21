//! Descriptor files.
//!
//! A descriptor can be kept next to the application as TOML:
//!
//! ```toml
//! table = "users"
//!
//! [[columns]]
//! name = "id"
//! TYPE = "int"
//! NOT_NULL = true
//! AUTO_INCREMENT = true
//!
//! [[columns]]
//! name = "name"
//! TYPE = "varchar(255)"
//! NOT_NULL = "true"
//! INDEX = "yes"
//! ```
//!
//! The same shape is accepted as JSON when the file ends in `.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{ColumnDescriptor, ColumnProperties, PropertyFlag, TableDescriptor};
use crate::error::{CrudError, Result};

/// On-disk form of a [`TableDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorFile {
    pub table: String,
    #[serde(default)]
    pub columns: Vec<ColumnEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub name: String,
    #[serde(flatten)]
    pub properties: ColumnProperties,
}

impl DescriptorFile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CrudError::config(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| CrudError::config(e.to_string()))
    }

    /// Read a descriptor file; `.json` files are JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CrudError::config(format!("{}: {}", path.display(), e)))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Write as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| CrudError::config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| CrudError::config(format!("{}: {}", path.display(), e)))
    }

    /// Validate into a descriptor.
    pub fn into_descriptor(self) -> Result<TableDescriptor> {
        let columns = self
            .columns
            .into_iter()
            .map(|entry| (entry.name, entry.properties));
        Ok(TableDescriptor::from_properties(self.table, columns)?)
    }
}

impl From<&TableDescriptor> for DescriptorFile {
    fn from(descriptor: &TableDescriptor) -> Self {
        Self {
            table: descriptor.name().to_string(),
            columns: descriptor
                .columns()
                .iter()
                .map(|column| ColumnEntry {
                    name: column.name().to_string(),
                    properties: properties_of(column),
                })
                .collect(),
        }
    }
}

fn properties_of(column: &ColumnDescriptor) -> ColumnProperties {
    ColumnProperties {
        column_type: column.column_type().to_string(),
        name: None,
        not_null: PropertyFlag::Bool(column.is_not_null()),
        default: column.default().map(str::to_string),
        index: PropertyFlag::Bool(column.is_indexed()),
        unique: PropertyFlag::Bool(column.is_unique()),
        auto_increment: PropertyFlag::Bool(column.is_auto_increment()),
    }
}

/// Load and validate a descriptor file.
pub fn load_descriptor(path: impl AsRef<Path>) -> Result<TableDescriptor> {
    DescriptorFile::load(path.as_ref())?.into_descriptor()
}

impl TableDescriptor {
    /// Build from a JSON object mapping column name to its property bag.
    ///
    /// Column order follows the object's key order.
    pub fn from_json(table: impl Into<String>, columns: &Value) -> Result<Self> {
        let object = columns
            .as_object()
            .ok_or_else(|| CrudError::config("descriptor columns must be a JSON object"))?;
        let columns = object
            .iter()
            .map(|(name, props)| {
                ColumnProperties::deserialize(props)
                    .map(|p| (name.clone(), p))
                    .map_err(|e| CrudError::config(format!("column '{}': {}", name, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_properties(table, columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USERS_TOML: &str = r#"
table = "users"

[[columns]]
name = "id"
TYPE = "int"
NOT_NULL = true
AUTO_INCREMENT = "true"

[[columns]]
name = "name"
TYPE = "varchar(255)"
NAME = "Name"
NOT_NULL = "true"
INDEX = "yes"
UNIQUE = "no"

[[columns]]
name = "status"
TYPE = "varchar(16)"
DEFAULT = "'active'"
"#;

    #[test]
    fn parses_toml_property_bags() {
        let descriptor = DescriptorFile::from_toml_str(USERS_TOML)
            .unwrap()
            .into_descriptor()
            .unwrap();

        assert_eq!(descriptor.name(), "users");
        let id = descriptor.column("id").unwrap();
        assert!(id.is_not_null() && id.is_auto_increment());
        let name = descriptor.column("name").unwrap();
        assert!(name.is_indexed());
        assert!(!name.is_unique());
        assert_eq!(descriptor.column("status").unwrap().default(), Some("'active'"));
    }

    #[test]
    fn from_json_keeps_key_order() {
        let descriptor = TableDescriptor::from_json(
            "users",
            &json!({
                "id": {"TYPE": "int", "NOT_NULL": "true", "DEFAULT": "", "AUTO_INCREMENT": "true"},
                "name": {"TYPE": "varchar(255)", "NOT_NULL": "true", "AUTO_INCREMENT": "false"},
                "email": {"TYPE": "varchar(255)", "NOT_NULL": "true", "UNIQUE": "yes"}
            }),
        )
        .unwrap();

        assert_eq!(
            descriptor.column_names().collect::<Vec<_>>(),
            vec!["id", "name", "email"]
        );
        assert_eq!(descriptor.column("id").unwrap().default(), None);
        assert!(!descriptor.column("name").unwrap().is_auto_increment());
    }

    #[test]
    fn missing_type_is_a_config_error() {
        let err = TableDescriptor::from_json("users", &json!({"id": {"NOT_NULL": "true"}}))
            .unwrap_err();
        assert!(matches!(err, CrudError::Config(ref msg) if msg.contains("'id'")));
    }

    #[test]
    fn invalid_descriptor_is_reported() {
        let err = DescriptorFile::from_toml_str("table = \"users\"\ncolumns = []\n")
            .unwrap()
            .into_descriptor()
            .unwrap_err();
        assert!(matches!(err, CrudError::Descriptor(_)));
    }

    #[test]
    fn descriptor_converts_back_to_file() {
        let descriptor = DescriptorFile::from_toml_str(USERS_TOML)
            .unwrap()
            .into_descriptor()
            .unwrap();
        let file = DescriptorFile::from(&descriptor);
        let reparsed = DescriptorFile::from_toml_str(&toml::to_string_pretty(&file).unwrap())
            .unwrap()
            .into_descriptor()
            .unwrap();
        assert_eq!(reparsed, descriptor);
    }

    #[test]
    fn yes_only_sets_advisory_flags() {
        let table = TableDescriptor::from_json(
            "t",
            &json!({
                "a": {
                    "TYPE": "int",
                    "NOT_NULL": "yes",
                    "AUTO_INCREMENT": "yes",
                    "INDEX": "yes",
                    "UNIQUE": "yes"
                }
            }),
        )
        .unwrap();

        let a = table.column("a").unwrap();
        assert!(!a.is_not_null());
        assert!(!a.is_auto_increment());
        assert!(a.is_indexed() && a.is_unique());
        assert!(table.auto_increment_column().is_none());
    }
}
