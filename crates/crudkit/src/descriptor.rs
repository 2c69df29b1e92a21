//! Table descriptors.
//!
//! A [`TableDescriptor`] is the single declaration of a table's shape. It
//! drives DDL generation in the synchronizer, required-field checks in the
//! writers and column validation in the filter compiler, so it is validated
//! once here and treated as trusted everywhere else. In particular every
//! table and column name that reaches SQL text has passed
//! [`is_valid_identifier`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("invalid {kind} name '{name}'")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("table '{0}' declares no columns")]
    NoColumns(String),

    #[error("column '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("columns '{first}' and '{second}' are both AUTO_INCREMENT; at most one is allowed")]
    MultipleAutoIncrement { first: String, second: String },

    #[error("column '{column}' has invalid type '{column_type}'")]
    InvalidType { column: String, column_type: String },

    #[error("column '{column}' has invalid default '{default}'")]
    InvalidDefault { column: String, default: String },
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    name: String,
    column_type: String,
    not_null: bool,
    default: Option<String>,
    index: bool,
    unique: bool,
    auto_increment: bool,
}

impl ColumnDescriptor {
    /// A nullable column with no default.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            not_null: false,
            default: None,
            index: false,
            unique: false,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Default literal, written exactly as it should appear in DDL (`'pending'`, `0`).
    ///
    /// An empty literal means no default.
    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        let literal = literal.into();
        self.default = if literal.is_empty() { None } else { Some(literal) };
        self
    }

    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Advisory only; the synchronizer does not create indexes.
    pub fn is_indexed(&self) -> bool {
        self.index
    }

    /// Advisory only; the synchronizer does not create unique constraints.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Whether writes must supply a value for this column.
    pub fn is_required(&self) -> bool {
        self.not_null && self.default.is_none() && !self.auto_increment
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        if !is_valid_identifier(&self.name) {
            return Err(DescriptorError::InvalidIdentifier {
                kind: "column",
                name: self.name.clone(),
            });
        }
        if !is_valid_type(&self.column_type) {
            return Err(DescriptorError::InvalidType {
                column: self.name.clone(),
                column_type: self.column_type.clone(),
            });
        }
        if let Some(default) = &self.default {
            if default.contains(';') || default.contains('\n') {
                return Err(DescriptorError::InvalidDefault {
                    column: self.name.clone(),
                    default: default.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A table name and its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Validate and build a descriptor.
    ///
    /// Column order is kept; it is the order used for CREATE TABLE and INSERT.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if !is_valid_identifier(&name) {
            return Err(DescriptorError::InvalidIdentifier { kind: "table", name });
        }
        if columns.is_empty() {
            return Err(DescriptorError::NoColumns(name));
        }

        let mut auto_increment: Option<&str> = None;
        for (i, column) in columns.iter().enumerate() {
            column.validate()?;
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(DescriptorError::DuplicateColumn(column.name.clone()));
            }
            if column.auto_increment {
                if let Some(first) = auto_increment {
                    return Err(DescriptorError::MultipleAutoIncrement {
                        first: first.to_string(),
                        second: column.name.clone(),
                    });
                }
                auto_increment = Some(&column.name);
            }
        }

        Ok(Self { name, columns })
    }

    pub fn builder(name: impl Into<String>) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Build from the `TYPE` / `NOT_NULL` / `DEFAULT` / ... property bags.
    pub fn from_properties<I, K>(
        name: impl Into<String>,
        columns: I,
    ) -> Result<Self, DescriptorError>
    where
        I: IntoIterator<Item = (K, ColumnProperties)>,
        K: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(column, props)| props.into_descriptor(column))
            .collect();
        Self::new(name, columns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// The primary key candidate, if any.
    pub fn auto_increment_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Columns a write must supply: NOT NULL, no default, not auto-increment.
    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_required())
    }
}

#[derive(Debug, Clone)]
pub struct TableDescriptorBuilder {
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl TableDescriptorBuilder {
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Result<TableDescriptor, DescriptorError> {
        TableDescriptor::new(self.name, self.columns)
    }
}

/// Raw per-column property bag as written in configuration.
///
/// Flags accept TOML/JSON booleans or strings. `NOT_NULL` and
/// `AUTO_INCREMENT` are set only by `"true"`; the advisory `INDEX` and
/// `UNIQUE` also take `"yes"`. Any other string is false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ColumnProperties {
    #[serde(rename = "TYPE")]
    pub column_type: String,
    /// Human-readable label; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub not_null: PropertyFlag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub index: PropertyFlag,
    #[serde(default)]
    pub unique: PropertyFlag,
    #[serde(default)]
    pub auto_increment: PropertyFlag,
}

impl ColumnProperties {
    pub fn into_descriptor(self, column: impl Into<String>) -> ColumnDescriptor {
        ColumnDescriptor {
            name: column.into(),
            column_type: self.column_type,
            not_null: self.not_null.is_set(),
            default: self.default.filter(|d| !d.is_empty()),
            index: self.index.is_yes(),
            unique: self.unique.is_yes(),
            auto_increment: self.auto_increment.is_set(),
        }
    }
}

/// A boolean property that may be spelled as a bool or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyFlag {
    Bool(bool),
    Text(String),
}

impl PropertyFlag {
    /// Constraint flags: `true` or `"true"`.
    pub fn is_set(&self) -> bool {
        match self {
            PropertyFlag::Bool(b) => *b,
            PropertyFlag::Text(s) => s == "true",
        }
    }

    /// Advisory flags: additionally `"yes"`.
    pub fn is_yes(&self) -> bool {
        match self {
            PropertyFlag::Text(s) => s == "yes" || self.is_set(),
            PropertyFlag::Bool(_) => self.is_set(),
        }
    }
}

impl Default for PropertyFlag {
    fn default() -> Self {
        PropertyFlag::Bool(false)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, at most 64 characters.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_type(column_type: &str) -> bool {
    let trimmed = column_type.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ','))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDescriptor {
        TableDescriptor::builder("users")
            .column(ColumnDescriptor::new("id", "int").not_null().auto_increment())
            .column(ColumnDescriptor::new("name", "varchar(255)").not_null())
            .column(ColumnDescriptor::new("email", "varchar(255)").not_null().unique())
            .column(
                ColumnDescriptor::new("status", "varchar(16)")
                    .not_null()
                    .default_value("'active'"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn required_columns_skip_defaults_and_auto_increment() {
        let table = users();
        let required: Vec<_> = table.required_columns().map(|c| c.name()).collect();
        assert_eq!(required, vec!["name", "email"]);
        assert_eq!(table.auto_increment_column().unwrap().name(), "id");
    }

    #[test]
    fn keeps_declaration_order() {
        let names: Vec<_> = users().column_names().map(str::to_string).collect();
        assert_eq!(names, vec!["id", "name", "email", "status"]);
    }

    #[test]
    fn rejects_two_auto_increment_columns() {
        let err = TableDescriptor::builder("t")
            .column(ColumnDescriptor::new("a", "int").auto_increment())
            .column(ColumnDescriptor::new("b", "int").auto_increment())
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DescriptorError::MultipleAutoIncrement {
                first: "a".to_string(),
                second: "b".to_string()
            }
        );
    }

    #[test]
    fn rejects_duplicates_and_bad_names() {
        let err = TableDescriptor::builder("t")
            .column(ColumnDescriptor::new("a", "int"))
            .column(ColumnDescriptor::new("a", "int"))
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::DuplicateColumn("a".to_string()));

        let err = TableDescriptor::builder("users; DROP TABLE x")
            .column(ColumnDescriptor::new("a", "int"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidIdentifier { kind: "table", .. }));

        let err = TableDescriptor::builder("t")
            .column(ColumnDescriptor::new("1a", "int"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidIdentifier { kind: "column", .. }));

        assert_eq!(
            TableDescriptor::new("t", Vec::new()).unwrap_err(),
            DescriptorError::NoColumns("t".to_string())
        );
    }

    #[test]
    fn rejects_injected_type_and_default() {
        let err = TableDescriptor::builder("t")
            .column(ColumnDescriptor::new("a", "int; DROP TABLE t"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidType { .. }));

        let err = TableDescriptor::builder("t")
            .column(ColumnDescriptor::new("a", "int").default_value("0; DROP TABLE t"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidDefault { .. }));
    }

    #[test]
    fn empty_default_means_none() {
        let column = ColumnDescriptor::new("a", "int").not_null().default_value("");
        assert_eq!(column.default(), None);
        assert!(column.is_required());
    }

    #[test]
    fn property_flags_follow_string_convention() {
        assert!(PropertyFlag::Text("true".into()).is_set());
        assert!(!PropertyFlag::Text("yes".into()).is_set());
        assert!(PropertyFlag::Text("yes".into()).is_yes());
        assert!(PropertyFlag::Text("true".into()).is_yes());
        assert!(!PropertyFlag::Text("no".into()).is_yes());
        assert!(!PropertyFlag::Text("no".into()).is_set());
        assert!(!PropertyFlag::Text("TRUE ".into()).is_set());
        assert!(PropertyFlag::Bool(true).is_set());
        assert!(!PropertyFlag::default().is_set());
    }

    #[test]
    fn from_properties_maps_bags() {
        let props = |t: &str, not_null: &str, auto: &str| ColumnProperties {
            column_type: t.to_string(),
            not_null: PropertyFlag::Text(not_null.to_string()),
            auto_increment: PropertyFlag::Text(auto.to_string()),
            default: Some(String::new()),
            ..ColumnProperties::default()
        };
        let table = TableDescriptor::from_properties(
            "users",
            vec![
                ("id", props("int", "true", "true")),
                ("name", props("varchar(255)", "true", "false")),
                ("nickname", props("varchar(64)", "false", "false")),
            ],
        )
        .unwrap();

        let id = table.column("id").unwrap();
        assert!(id.is_auto_increment() && id.is_not_null() && id.default().is_none());
        assert!(table.column("name").unwrap().is_required());
        assert!(!table.column("nickname").unwrap().is_not_null());
    }
}
