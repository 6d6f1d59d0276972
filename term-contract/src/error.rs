//! Error types for the term-contract library.
//!
//! Every fallible operation returns [`Result`], whose error side is [`TermError`].
//! The variants fall into three families:
//!
//! - [`TermError::CheckFailed`]: the data violated a check. The attached
//!   [`Violation`] carries the offending rows and a diagnostic message.
//! - Usage errors (`InvalidArgument`, `ColumnNotFound`, `SecurityError`): the check was
//!   called with parameters that cannot be applied to the table. They are raised before
//!   any scan happens.
//! - Engine errors (`DataFusion`, `Arrow`, `Serialization`, `Internal`).

use crate::core::Violation;
use thiserror::Error;

/// The main error type for the term-contract library.
#[derive(Error, Debug)]
pub enum TermError {
    /// The table failed a check.
    #[error("{0}")]
    CheckFailed(Box<Violation>),

    /// A check parameter is invalid for the given table.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A column referenced by a check parameter does not exist.
    #[error("Column '{column}' not found in table")]
    ColumnNotFound { column: String },

    /// A custom SQL expression or identifier was rejected.
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from serialization of reports.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, TermError>`.
pub type Result<T> = std::result::Result<T, TermError>;

impl TermError {
    /// Wraps a violation into a check failure.
    pub fn check_failed(violation: Violation) -> Self {
        Self::CheckFailed(Box::new(violation))
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a column-not-found error.
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Creates an internal error raised while evaluating the named constraint.
    pub fn constraint_evaluation(constraint: &str, message: impl Into<String>) -> Self {
        Self::Internal(format!(
            "evaluation of '{constraint}' failed: {}",
            message.into()
        ))
    }

    /// Returns true when the data failed a check.
    pub fn is_check_failure(&self) -> bool {
        matches!(self, Self::CheckFailed(_))
    }

    /// Returns true when the check was called with unusable parameters.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::ColumnNotFound { .. } | Self::SecurityError(_)
        )
    }

    /// Returns the violation carried by a check failure.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::CheckFailed(violation) => Some(violation),
            _ => None,
        }
    }

    /// Consumes the error and returns the violation of a check failure.
    pub fn into_violation(self) -> Option<Violation> {
        match self {
            Self::CheckFailed(violation) => Some(*violation),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TermError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<TermError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.with_context(|| msg.to_string())
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e.into() {
            // Failures and usage errors keep their kind so callers can match on them.
            err @ (TermError::CheckFailed(_)
            | TermError::InvalidArgument(_)
            | TermError::ColumnNotFound { .. }
            | TermError::SecurityError(_)) => err,
            TermError::Internal(inner) => TermError::Internal(format!("{}: {inner}", f())),
            other => TermError::Internal(format!("{}: {other}", f())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MaterializedTable;

    #[test]
    fn test_column_not_found() {
        let err = TermError::column_not_found("user_id");
        assert_eq!(err.to_string(), "Column 'user_id' not found in table");
        assert!(err.is_usage_error());
        assert!(!err.is_check_failure());
    }

    #[test]
    fn test_check_failed_carries_violation() {
        let violation = Violation::new("has_columns", "Missing columns: x", MaterializedTable::empty());
        let err = TermError::check_failed(violation);

        assert!(err.is_check_failure());
        assert!(!err.is_usage_error());
        assert_eq!(err.violation().map(|v| v.check()), Some("has_columns"));
        assert!(err.to_string().contains("Missing columns: x"));
    }

    #[test]
    fn test_context_wraps_engine_errors() {
        let result: std::result::Result<(), arrow::error::ArrowError> = Err(
            arrow::error::ArrowError::ComputeError("boom".to_string()),
        );
        let err = result.context("computing deltas").unwrap_err();
        assert!(matches!(err, TermError::Internal(ref msg) if msg.starts_with("computing deltas")));
    }

    #[test]
    fn test_context_keeps_usage_errors() {
        let result: Result<()> = Err(TermError::invalid_argument("bad"));
        let err = result.with_context(|| "ignored".to_string()).unwrap_err();
        assert!(matches!(err, TermError::InvalidArgument(_)));
    }
}
