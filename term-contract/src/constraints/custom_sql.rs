//! Custom SQL predicate checks.

use crate::core::{
    Constraint, ConstraintMetadata, ConstraintResult, Table, TermContext, ViolationReporter,
    DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Checks a boolean SQL expression over each row.
///
/// The expression states the requirement: rows where it is false are reported in
/// full. Rows where it evaluates to null are not. The expression is validated before
/// it is run, so statements, comments and subqueries are rejected as usage errors.
///
/// ```rust
/// use term_contract::constraints::CustomSqlConstraint;
///
/// let constraint = CustomSqlConstraint::new("\"a\" <> 3");
/// # let _ = constraint;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSqlConstraint {
    predicate: String,
}

impl CustomSqlConstraint {
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
        }
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }
}

#[async_trait]
impl Constraint for CustomSqlConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "custom_check"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        SqlSecurity::validate_sql_expression(&self.predicate)?;

        ctx.register_data(table)?;
        let sql = format!("SELECT * FROM {DATA_TABLE} WHERE NOT ({})", self.predicate);
        let rows = ctx.query(&sql).await?;
        debug!(offending = rows.num_rows(), predicate = %self.predicate, "custom check evaluated");
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, format!("Unexpected data in custom check: {}", self.predicate)))
    }

    fn name(&self) -> &str {
        "custom_check"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::new().with_custom("predicate", self.predicate.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{int_batch, int_values};

    fn table() -> Table {
        Table::from_batch(int_batch(&[
            ("a", vec![Some(1), Some(2), Some(3), None]),
            ("b", vec![Some(1), Some(1), Some(1), Some(1)]),
        ]))
    }

    #[tokio::test]
    async fn test_passing_predicate() -> Result<()> {
        let input = table();
        let output = input.clone().check(&CustomSqlConstraint::new("\"a\" < 10")).await?;
        assert_eq!(output.as_materialized(), input.as_materialized());
        Ok(())
    }

    #[tokio::test]
    async fn test_reports_rows_violating_predicate() {
        let err = table()
            .check(&CustomSqlConstraint::new("a <> 3"))
            .await
            .unwrap_err();
        let v = err.violation().unwrap();
        assert_eq!(int_values(v.rows(), "a"), vec![Some(3)]);
        assert_eq!(v.rows().column_names(), vec!["a", "b"]);
        assert_eq!(v.message(), "Unexpected data in custom check: a <> 3");
    }

    #[tokio::test]
    async fn test_multi_column_predicate() {
        let err = table()
            .check(&CustomSqlConstraint::new("a + b <= 3"))
            .await
            .unwrap_err();
        assert_eq!(int_values(err.violation().unwrap().rows(), "a"), vec![Some(3)]);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_predicates() {
        for predicate in ["1 = 1; DROP TABLE data", "a > 0 -- comment", "a IN (SELECT 1)", ""] {
            let err = table()
                .check(&CustomSqlConstraint::new(predicate))
                .await
                .unwrap_err();
            assert!(err.is_usage_error(), "{predicate} should be rejected");
        }
    }
}
