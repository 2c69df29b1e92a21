//! Data-definition statements and their SQL rendering.
//!
//! The synchronizer plans [`DdlStatement`]s; a store renders them with its
//! [`Dialect`]. MySQL output follows the classic grammar
//! (`ALTER TABLE t MODIFY ...`, `AUTO_INCREMENT`). DuckDB has neither, so its
//! rendering is a `;`-separated batch using a sequence for auto-increment
//! and one `ALTER COLUMN` per attribute.
//!
//! Identifiers are interpolated unquoted. They come from a validated
//! [`TableDescriptor`](crate::TableDescriptor) and never from caller input.

use std::fmt;

use crate::descriptor::ColumnDescriptor;

/// SQL flavour spoken by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    MySql,
    DuckDb,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::MySql => f.write_str("MySQL"),
            Dialect::DuckDb => f.write_str("DuckDB"),
        }
    }
}

/// A schema change planned by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    CreateTable {
        table: String,
        columns: Vec<ColumnDescriptor>,
        primary_key: Option<String>,
    },
    /// Rewrites an existing column with its full desired definition.
    ModifyColumn {
        table: String,
        column: ColumnDescriptor,
    },
    AddColumn {
        table: String,
        column: ColumnDescriptor,
        primary_key: bool,
    },
    AddPrimaryKey {
        table: String,
        column: String,
    },
}

impl DdlStatement {
    pub fn table(&self) -> &str {
        match self {
            DdlStatement::CreateTable { table, .. }
            | DdlStatement::ModifyColumn { table, .. }
            | DdlStatement::AddColumn { table, .. }
            | DdlStatement::AddPrimaryKey { table, .. } => table,
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::MySql => self.to_mysql(),
            Dialect::DuckDb => self.to_duckdb(),
        }
    }

    fn to_mysql(&self) -> String {
        match self {
            DdlStatement::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                let mut defs: Vec<String> = columns.iter().map(mysql_column_definition).collect();
                if let Some(pk) = primary_key {
                    defs.push(format!("PRIMARY KEY ({})", pk));
                }
                format!("CREATE TABLE {} ({})", table, defs.join(", "))
            }
            DdlStatement::ModifyColumn { table, column } => {
                format!("ALTER TABLE {} MODIFY {}", table, mysql_column_definition(column))
            }
            DdlStatement::AddColumn {
                table,
                column,
                primary_key,
            } => {
                let mut sql = format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table,
                    mysql_column_definition(column)
                );
                if *primary_key {
                    sql.push_str(" PRIMARY KEY");
                }
                sql
            }
            DdlStatement::AddPrimaryKey { table, column } => {
                format!("ALTER TABLE {} ADD PRIMARY KEY ({})", table, column)
            }
        }
    }

    fn to_duckdb(&self) -> String {
        let mut statements = Vec::new();
        match self {
            DdlStatement::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                if let Some(column) = columns.iter().find(|c| c.is_auto_increment()) {
                    statements.push(create_sequence(table, column.name()));
                }
                let mut defs: Vec<String> = columns
                    .iter()
                    .map(|c| duckdb_column_definition(table, c))
                    .collect();
                if let Some(pk) = primary_key {
                    defs.push(format!("PRIMARY KEY ({})", pk));
                }
                statements.push(format!("CREATE TABLE {} ({})", table, defs.join(", ")));
            }
            DdlStatement::ModifyColumn { table, column } => {
                let name = column.name();
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                    table,
                    name,
                    column.column_type()
                ));
                if column.is_not_null() {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                        table, name
                    ));
                }
                if column.is_auto_increment() {
                    statements.push(create_sequence(table, name));
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT nextval('{}')",
                        table,
                        name,
                        sequence_name(table, name)
                    ));
                } else if let Some(default) = column.default() {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                        table, name, default
                    ));
                }
            }
            DdlStatement::AddColumn {
                table,
                column,
                primary_key,
            } => {
                let name = column.name();
                // DuckDB rejects constraints on ADD COLUMN; apply them afterwards.
                let mut add = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table,
                    name,
                    column.column_type()
                );
                if column.is_auto_increment() {
                    statements.push(create_sequence(table, name));
                    add.push_str(&format!(" DEFAULT nextval('{}')", sequence_name(table, name)));
                } else if let Some(default) = column.default() {
                    add.push_str(&format!(" DEFAULT {}", default));
                }
                statements.push(add);
                if column.is_not_null() {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                        table, name
                    ));
                }
                if *primary_key {
                    statements.push(format!("ALTER TABLE {} ADD PRIMARY KEY ({})", table, name));
                }
            }
            DdlStatement::AddPrimaryKey { table, column } => {
                statements.push(format!("ALTER TABLE {} ADD PRIMARY KEY ({})", table, column));
            }
        }
        statements.join("; ")
    }
}

/// `name type [NOT NULL] [DEFAULT literal] [AUTO_INCREMENT]`
fn mysql_column_definition(column: &ColumnDescriptor) -> String {
    let mut def = format!("{} {}", column.name(), column.column_type());
    if column.is_not_null() {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = column.default() {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    if column.is_auto_increment() {
        def.push_str(" AUTO_INCREMENT");
    }
    def
}

fn duckdb_column_definition(table: &str, column: &ColumnDescriptor) -> String {
    let mut def = format!("{} {}", column.name(), column.column_type());
    if column.is_not_null() {
        def.push_str(" NOT NULL");
    }
    if column.is_auto_increment() {
        def.push_str(&format!(" DEFAULT nextval('{}')", sequence_name(table, column.name())));
    } else if let Some(default) = column.default() {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}

fn sequence_name(table: &str, column: &str) -> String {
    format!("{}_{}_seq", table, column)
}

fn create_sequence(table: &str, column: &str) -> String {
    format!("CREATE SEQUENCE IF NOT EXISTS {}", sequence_name(table, column))
}

impl Dialect {
    /// Whether a live column type satisfies the declared one.
    pub fn types_match(self, declared: &str, live: &str) -> bool {
        match self {
            Dialect::MySql => declared.trim().eq_ignore_ascii_case(live.trim()),
            Dialect::DuckDb => canonical_duckdb_type(declared) == canonical_duckdb_type(live),
        }
    }

    /// Whether a live default satisfies the declared default literal.
    ///
    /// Stores report string defaults without their quotes (`'active'` comes
    /// back as `active`), so quoted literals compare by content.
    pub fn defaults_match(self, declared: &str, live: Option<&str>) -> bool {
        let Some(live) = live else {
            return false;
        };
        let live = match self {
            Dialect::MySql => live.trim(),
            Dialect::DuckDb => strip_duckdb_cast(live.trim()),
        };
        let declared = declared.trim();
        let declared_quoted = unquote(declared).is_some();
        let declared = unquote(declared).unwrap_or_else(|| declared.to_string());
        let live = unquote(live).unwrap_or_else(|| live.to_string());
        if declared_quoted {
            declared == live
        } else {
            declared.eq_ignore_ascii_case(&live)
        }
    }

    /// The default a store of this dialect reports for a declared literal.
    pub fn reported_default(self, declared: &str) -> String {
        let declared = declared.trim();
        unquote(declared).unwrap_or_else(|| declared.to_string())
    }
}

/// `'it''s'` -> `it's`; `None` when the literal is not single-quoted.
fn unquote(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

/// `CAST('x' AS VARCHAR)` -> `'x'`
fn strip_duckdb_cast(value: &str) -> &str {
    let upper = value.to_ascii_uppercase();
    if upper.starts_with("CAST(") && value.ends_with(')') {
        if let Some(pos) = upper.rfind(" AS ") {
            return value[5..pos].trim();
        }
    }
    value
}

fn canonical_duckdb_type(column_type: &str) -> String {
    let upper = column_type.trim().to_ascii_uppercase();
    let (base, params) = match upper.find('(') {
        Some(pos) => (upper[..pos].trim(), Some(upper[pos..].replace(' ', ""))),
        None => (upper.as_str(), None),
    };
    let canonical = match base {
        "INT" | "INTEGER" | "INT4" | "SIGNED" => "INTEGER",
        "BIGINT" | "INT8" | "LONG" => "BIGINT",
        "SMALLINT" | "INT2" | "SHORT" => "SMALLINT",
        "TINYINT" | "INT1" => "TINYINT",
        "VARCHAR" | "CHAR" | "BPCHAR" | "TEXT" | "STRING" => "VARCHAR",
        "BOOL" | "BOOLEAN" | "LOGICAL" => "BOOLEAN",
        "DOUBLE" | "FLOAT8" => "DOUBLE",
        "REAL" | "FLOAT" | "FLOAT4" => "FLOAT",
        "DATETIME" | "TIMESTAMP" => "TIMESTAMP",
        "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => "BLOB",
        "NUMERIC" | "DECIMAL" => "DECIMAL",
        other => other,
    };
    match params {
        // DuckDB ignores lengths and display widths; only precision matters.
        Some(params) if canonical == "DECIMAL" => format!("{}{}", canonical, params),
        _ => canonical.to_string(),
    }
}
