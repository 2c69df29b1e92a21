//! Filter expressions and their compilation to a WHERE predicate.
//!
//! Filters arrive as a JSON object whose keys are either column names with
//! an optional operator suffix (`name`, `id>`, `id<`, `id=`, `email%`) or
//! group tags (`[OR]`, `[AND]`, optionally followed by any text so several
//! sibling groups can share a tag). [`FilterExpr::from_json`] turns that
//! object into a tree; [`FilterCompiler`] turns the tree into a parameterized
//! [`Predicate`] and reports every leaf whose column is not in the table
//! descriptor.
//!
//! Sibling group tags must be distinct keys (`[AND]`, `[AND]2`): a JSON
//! object keeps one entry per key, so a repeated tag replaces the earlier
//! group. Programmatic trees built with [`FilterExpr::and`] /
//! [`FilterExpr::or`] have no such restriction.

use std::fmt;

use crudkit_db::DbValue;
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::TableDescriptor;
use crate::error::CrudError;

pub const OR_TAG: &str = "[OR]";
pub const AND_TAG: &str = "[AND]";

/// A leaf referenced a column outside the descriptor.
///
/// Collected rather than raised; the rest of the tree still compiles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("field '{0}' does not exist in the table descriptor")]
    UnknownColumn(String),
}

impl FilterError {
    pub fn column(&self) -> &str {
        match self {
            FilterError::UnknownColumn(column) => column,
        }
    }
}

/// The filter input is not shaped like a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("filter must be a JSON object")]
    NotAnObject,

    #[error("group '{0}' must map to a JSON object")]
    GroupNotObject(String),

    #[error("value of '{0}' must be a scalar")]
    NonScalarValue(String),
}

/// How the clauses of one group are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    pub fn as_sql(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }

    /// The group logic a filter key introduces, if it is a group tag.
    pub fn from_tag(key: &str) -> Option<Self> {
        if key.starts_with(OR_TAG) {
            Some(Logic::Or)
        } else if key.starts_with(AND_TAG) {
            Some(Logic::And)
        } else {
            None
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Eq,
    Gt,
    Lt,
    /// Substring match; the value is wrapped as `%value%`.
    Like,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Like => "LIKE",
        }
    }

    /// Split a filter key into its column and operator.
    ///
    /// `id>` gives `("id", Gt)`; a key without a suffix compares for equality.
    pub fn split_key(key: &str) -> (&str, Operator) {
        const SUFFIXES: [(char, Operator); 4] = [
            ('>', Operator::Gt),
            ('<', Operator::Lt),
            ('=', Operator::Eq),
            ('%', Operator::Like),
        ];
        for (suffix, operator) in SUFFIXES {
            if let Some(column) = key.strip_suffix(suffix) {
                return (column, operator);
            }
        }
        (key, Operator::Eq)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// `column operator value`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: DbValue,
}

impl Condition {
    /// The value as bound to the placeholder.
    fn bound_value(&self) -> DbValue {
        match self.operator {
            Operator::Like => DbValue::Text(format!("%{}%", self.value)),
            _ => self.value.clone(),
        }
    }
}

/// A filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Leaf(Condition),
    Group {
        logic: Logic,
        children: Vec<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn leaf(column: impl Into<String>, operator: Operator, value: impl Into<DbValue>) -> Self {
        FilterExpr::Leaf(Condition {
            column: column.into(),
            operator,
            value: value.into(),
        })
    }

    pub fn eq(column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::leaf(column, Operator::Eq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::leaf(column, Operator::Gt, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::leaf(column, Operator::Lt, value)
    }

    pub fn like(column: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self::leaf(column, Operator::Like, value)
    }

    pub fn and(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::Group {
            logic: Logic::And,
            children: children.into_iter().collect(),
        }
    }

    pub fn or(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::Group {
            logic: Logic::Or,
            children: children.into_iter().collect(),
        }
    }

    /// Parse a JSON filter object; the root group joins with AND.
    pub fn from_json(value: &Value) -> Result<Self, FilterParseError> {
        Self::from_json_with_logic(value, Logic::And)
    }

    /// Parse a JSON filter object whose root group joins with `logic`.
    pub fn from_json_with_logic(value: &Value, logic: Logic) -> Result<Self, FilterParseError> {
        let object = value.as_object().ok_or(FilterParseError::NotAnObject)?;
        let mut children = Vec::with_capacity(object.len());

        for (key, value) in object {
            if let Some(group_logic) = Logic::from_tag(key) {
                if !value.is_object() {
                    return Err(FilterParseError::GroupNotObject(key.clone()));
                }
                children.push(Self::from_json_with_logic(value, group_logic)?);
                continue;
            }

            let (column, operator) = Operator::split_key(key);
            let value = DbValue::from_json(value)
                .ok_or_else(|| FilterParseError::NonScalarValue(key.clone()))?;
            children.push(Self::leaf(column, operator, value));
        }

        Ok(FilterExpr::Group { logic, children })
    }
}

/// A WHERE predicate with `?` placeholders and the values bound to them.
///
/// An empty predicate means "no restriction".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    sql: String,
    params: Vec<DbValue>,
}

impl Predicate {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[DbValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<DbValue>) {
        (self.sql, self.params)
    }

    /// The predicate with every value inlined as a double-quoted literal.
    ///
    /// For logs and diagnostics only; execute [`sql`](Self::sql) with
    /// [`params`](Self::params) instead.
    pub fn to_inline_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut params = self.params.iter();
        for ch in self.sql.chars() {
            if ch == '?' {
                if let Some(value) = params.next() {
                    out.push('"');
                    out.push_str(&value.to_string().replace('"', "\"\""));
                    out.push('"');
                    continue;
                }
            }
            out.push(ch);
        }
        out
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_inline_sql())
    }
}

/// Output of a compilation: the best-effort predicate plus every problem found.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    pub predicate: Predicate,
    pub errors: Vec<FilterError>,
}

impl CompiledFilter {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The predicate, or [`CrudError::InvalidFilter`] if any leaf was rejected.
    pub fn into_result(self) -> Result<Predicate, CrudError> {
        if self.errors.is_empty() {
            Ok(self.predicate)
        } else {
            Err(CrudError::InvalidFilter(self.errors))
        }
    }
}

/// Compiles filter trees against one table descriptor.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    descriptor: &'a TableDescriptor,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(descriptor: &'a TableDescriptor) -> Self {
        Self { descriptor }
    }

    /// Compile using the root group's own logic.
    pub fn compile(&self, expr: &FilterExpr) -> CompiledFilter {
        match expr {
            FilterExpr::Group { logic, .. } => self.compile_with_logic(expr, *logic),
            FilterExpr::Leaf(_) => self.compile_with_logic(expr, Logic::And),
        }
    }

    /// Compile with the root group's clauses joined by `logic`.
    ///
    /// The root is never parenthesized; nested non-empty groups are.
    pub fn compile_with_logic(&self, expr: &FilterExpr, logic: Logic) -> CompiledFilter {
        let mut errors = Vec::new();
        let predicate = match expr {
            FilterExpr::Group { children, .. } => self.compile_group(logic, children, &mut errors),
            FilterExpr::Leaf(_) => {
                self.compile_group(logic, std::slice::from_ref(expr), &mut errors)
            }
        };
        CompiledFilter { predicate, errors }
    }

    /// Parse and compile a JSON filter with AND at the root.
    pub fn compile_json(&self, value: &Value) -> Result<CompiledFilter, FilterParseError> {
        Ok(self.compile(&FilterExpr::from_json(value)?))
    }

    fn compile_group(
        &self,
        logic: Logic,
        children: &[FilterExpr],
        errors: &mut Vec<FilterError>,
    ) -> Predicate {
        let mut clauses = Vec::with_capacity(children.len());
        let mut params = Vec::new();

        for child in children {
            match child {
                FilterExpr::Leaf(condition) => {
                    if !self.descriptor.contains(&condition.column) {
                        errors.push(FilterError::UnknownColumn(condition.column.clone()));
                        continue;
                    }
                    clauses.push(format!("{} {} ?", condition.column, condition.operator));
                    params.push(condition.bound_value());
                }
                FilterExpr::Group {
                    logic: nested_logic,
                    children,
                } => {
                    let nested = self.compile_group(*nested_logic, children, errors);
                    if !nested.is_empty() {
                        clauses.push(format!("({})", nested.sql));
                        params.extend(nested.params);
                    }
                }
            }
        }

        Predicate {
            sql: clauses.join(&format!(" {} ", logic)),
            params,
        }
    }
}
