//! Error surface for the query core.
//!
//! All failures are typed, deterministic and non-retryable: the same input
//! produces the same error with the same message every time. No partial
//! compilation result is ever returned alongside an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// A filter or sort path names a field that does not exist on the
    /// declared owner type at some hop.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The number of values handed to an operator violates its arity
    /// contract.
    #[error("operator {operator} expects {expected}, got {actual} value(s)")]
    InvalidValueCount {
        operator: &'static str,
        expected: String,
        actual: usize,
    },

    /// A value is incompatible with the operator's value-kind contract or
    /// with the declared type of the path's terminal field.
    #[error("invalid value for operator {operator}: {detail}")]
    InvalidValueType {
        operator: &'static str,
        detail: String,
    },

    /// A cycle was detected in the directed graph of formula column
    /// references. Raised once, at metadata store construction; fatal to the
    /// metadata configuration, never a per-request error.
    #[error("Formula reference loop found: {cycle}")]
    FormulaReferenceLoop { cycle: String },

    /// The request combines an operator, field type or query feature in a
    /// way the engine does not support.
    #[error("invalid operation: {detail}")]
    InvalidOperation { detail: String },

    /// The filter text could not be parsed.
    #[error("parse error at offset {offset}: {message}")]
    Parse { message: String, offset: usize },

    /// Engine configuration could not be loaded.
    #[error("config error: {message}")]
    Config { message: String },
}

impl QueryError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_operation(detail: impl Into<String>) -> Self {
        QueryError::InvalidOperation {
            detail: detail.into(),
        }
    }
}
