//! Constraint trait and related types.

use crate::core::{TermContext, Violation};
use crate::prelude::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// The status of a constraint evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintStatus {
    Success,
    Failure,
}

impl ConstraintStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ConstraintStatus::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ConstraintStatus::Failure)
    }
}

/// The result of evaluating a constraint.
#[derive(Debug, Clone)]
pub struct ConstraintResult {
    pub status: ConstraintStatus,
    /// Present exactly when the status is a failure.
    pub violation: Option<Violation>,
}

impl ConstraintResult {
    pub fn success() -> Self {
        Self {
            status: ConstraintStatus::Success,
            violation: None,
        }
    }

    pub fn failure(violation: Violation) -> Self {
        Self {
            status: ConstraintStatus::Failure,
            violation: Some(violation),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Descriptive metadata of a constraint, used in logs and reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintMetadata {
    /// The column(s) this constraint operates on
    pub columns: Vec<String>,
    /// A human-readable description of what this constraint validates
    pub description: Option<String>,
    /// Additional key-value pairs
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub custom: HashMap<String, String>,
}

impl ConstraintMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_column(column: impl Into<String>) -> Self {
        Self::for_columns([column.into()])
    }

    pub fn for_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// A check that can be evaluated against a table.
///
/// Implementations register the table in the given session, compile their whole
/// violation condition into one query, realize it once and report offending rows
/// through a [`ViolationReporter`](crate::core::ViolationReporter).
///
/// ```rust,ignore
/// use term_contract::core::{Constraint, ConstraintResult, Table, TermContext};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct NonEmpty;
///
/// #[async_trait]
/// impl Constraint for NonEmpty {
///     async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
///         ctx.register_data(table)?;
///         let rows = ctx.query("SELECT COUNT(*) AS n FROM data HAVING COUNT(*) = 0").await?;
///         Ok(ViolationReporter::new(self.name()).report(rows, "table is empty"))
///     }
///
///     fn name(&self) -> &str {
///         "non_empty"
///     }
/// }
/// ```
#[async_trait]
pub trait Constraint: Debug + Send + Sync {
    /// Evaluates the constraint against `table` in the session `ctx`.
    ///
    /// Usage errors (unknown columns, invalid parameters) are returned as `Err`;
    /// data failures are returned as a failed [`ConstraintResult`].
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult>;

    /// Returns the name of the constraint.
    fn name(&self) -> &str;

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        let ok = ConstraintResult::success();
        assert!(ok.is_success());
        assert!(ok.violation.is_none());

        let failed = ConstraintResult::failure(Violation::without_rows("c", "m"));
        assert!(failed.status.is_failure());
        assert_eq!(failed.violation.map(|v| v.message().to_string()), Some("m".to_string()));
    }

    #[test]
    fn test_metadata_serde() {
        let metadata = ConstraintMetadata::for_columns(["low", "high"])
            .with_description("intervals are disjoint")
            .with_custom("closed", "both");
        let json = serde_json::to_string(&metadata).unwrap();
        let back: ConstraintMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
        assert_eq!(back.columns, vec!["low", "high"]);
    }
}
