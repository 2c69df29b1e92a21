//! Error types for the table layer.

use crudkit_db::BackendError;
use thiserror::Error;

use crate::descriptor::DescriptorError;
use crate::filter::{FilterError, FilterParseError};

/// Table layer result type.
pub type Result<T> = std::result::Result<T, CrudError>;

/// A write was rejected before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field '{0}' cannot be null")]
    MissingField(String),

    #[error("field '{0}' must be a scalar value")]
    NonScalarValue(String),

    #[error("update supplies no fields")]
    EmptyUpdate,
}

/// Table layer errors.
#[derive(Debug, Error)]
pub enum CrudError {
    /// Required field missing or record malformed; no store call was made.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The filter referenced columns outside the descriptor.
    #[error("Invalid filter: {}", join_errors(.0))]
    InvalidFilter(Vec<FilterError>),

    /// The filter input did not have the expected shape.
    #[error("Malformed filter: {0}")]
    FilterParse(#[from] FilterParseError),

    /// A DDL statement failed; synchronization stopped at this statement.
    #[error("Schema error: {source}; statement: {statement}")]
    Schema {
        statement: String,
        #[source]
        source: BackendError,
    },

    /// Entity policy forbids the write; no store call was made.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Store failure passed through unchanged.
    #[error("Store error: {0}")]
    Store(#[from] BackendError),

    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrudError {
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True when the caller can fix the problem by changing its input.
    ///
    /// Schema and store errors point at the environment instead.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CrudError::Validation(_)
                | CrudError::InvalidFilter(_)
                | CrudError::FilterParse(_)
                | CrudError::Permission(_)
        )
    }
}

fn join_errors(errors: &[FilterError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_carries_statement() {
        let err = CrudError::Schema {
            statement: "ALTER TABLE users ADD PRIMARY KEY (id)".to_string(),
            source: BackendError::Query("Multiple primary key defined".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("ALTER TABLE users ADD PRIMARY KEY (id)"));
        assert!(msg.contains("Multiple primary key defined"));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn caller_errors_are_distinguished() {
        assert!(CrudError::from(ValidationError::MissingField("name".into())).is_caller_error());
        assert!(CrudError::permission("nope").is_caller_error());
        assert!(CrudError::InvalidFilter(vec![FilterError::UnknownColumn("ghost".into())])
            .is_caller_error());
        assert!(!CrudError::from(BackendError::ReadOnly).is_caller_error());
    }

    #[test]
    fn invalid_filter_lists_every_column() {
        let err = CrudError::InvalidFilter(vec![
            FilterError::UnknownColumn("ghost".into()),
            FilterError::UnknownColumn("phantom".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("'ghost'") && msg.contains("'phantom'"));
    }
}
