//! Duplicate and constant-value checks.
//!
//! [`UniqueConstraint`] looks at each column on its own, [`UniqueCombinationConstraint`]
//! at the tuple of selected columns. Nulls are values here: two nulls in a column are
//! a duplicate.

use crate::core::{
    Branch, ColumnSpec, Constraint, ConstraintMetadata, ConstraintResult, GroupBy,
    GroupEvaluator, Measure, Table, TermContext, ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use async_trait::async_trait;
use tracing::{debug, instrument};

const ROW: &str = "__term_row";

/// Checks that no value repeats within any selected column, optionally per group.
///
/// Every row holding a duplicated value is reported in full, in input order.
///
/// ```rust
/// use term_contract::constraints::UniqueConstraint;
///
/// let ids = UniqueConstraint::new("id");
/// let per_day = UniqueConstraint::new(vec!["slot", "room"]).group_by("day");
/// # let _ = (ids, per_day);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueConstraint {
    columns: ColumnSpec,
    group_by: GroupBy,
}

impl UniqueConstraint {
    pub fn new(columns: impl Into<ColumnSpec>) -> Self {
        Self {
            columns: columns.into(),
            group_by: GroupBy::none(),
        }
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }
}

#[async_trait]
impl Constraint for UniqueConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "unique"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        self.group_by.validate(&schema)?;
        let evaluator = GroupEvaluator::new(&self.group_by, DATA_TABLE);
        let columns = evaluator.without_keys(self.columns.resolve_checked(&schema)?);
        if columns.is_empty() {
            return Ok(ConstraintResult::success());
        }

        let keys = self.group_by.order_prefix();
        let duplicated: Vec<String> = columns
            .iter()
            .map(|c| format!("COUNT(*) OVER (PARTITION BY {keys}{}) > 1", c.sql))
            .collect();
        let originals: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| SqlSecurity::quote_identifier(f.name()))
            .collect();
        let sql = format!(
            "WITH base AS (SELECT *, ROW_NUMBER() OVER () AS \"{ROW}\" FROM {DATA_TABLE}), \
             flagged AS (SELECT *, {} AS \"__term_duplicated\" FROM base) \
             SELECT {} FROM flagged WHERE \"__term_duplicated\" ORDER BY \"{ROW}\"",
            duplicated.join(" OR "),
            originals.join(", ")
        );

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;
        debug!(duplicated_rows = rows.num_rows(), "uniqueness evaluated");
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, "Some values are duplicated within the specified columns"))
    }

    fn name(&self) -> &str {
        "unique"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.describe())
    }
}

/// Checks that the tuple of selected columns identifies each row.
///
/// Failures report each repeated tuple once, with its number of occurrences in `len`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueCombinationConstraint {
    columns: ColumnSpec,
}

impl UniqueCombinationConstraint {
    pub fn new(columns: impl Into<ColumnSpec>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

#[async_trait]
impl Constraint for UniqueCombinationConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "unique_combination_of_columns"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let columns = self.columns.resolve_checked(&table.schema())?;
        if columns.is_empty() {
            return Ok(ConstraintResult::success());
        }

        let projections: Vec<String> = columns
            .iter()
            .map(|c| format!("{} AS {}", c.sql, SqlSecurity::quote_identifier(&c.label)))
            .collect();
        let keys: Vec<&str> = columns.iter().map(|c| c.sql.as_str()).collect();
        let labels: Vec<&str> = columns.iter().map(|c| c.label.as_str()).collect();
        let sql = format!(
            "SELECT {}, COUNT(*) AS \"len\" FROM {DATA_TABLE} GROUP BY {keys} \
             HAVING COUNT(*) > 1 ORDER BY {keys}",
            projections.join(", "),
            keys = keys.join(", ")
        );

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(
                rows,
                format!("Some combinations of columns are not unique. See above, selected: {labels:?}"),
            ))
    }

    fn name(&self) -> &str {
        "unique_combination_of_columns"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.describe())
    }
}

/// Checks that no selected column holds a single distinct value, optionally per group.
///
/// Null counts as a value, so a column of `[1, null]` is not constant. Failures report
/// `(group.., column, n_distinct)` rows. An empty table passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotConstantConstraint {
    columns: ColumnSpec,
    group_by: GroupBy,
}

impl NotConstantConstraint {
    pub fn new(columns: impl Into<ColumnSpec>) -> Self {
        Self {
            columns: columns.into(),
            group_by: GroupBy::none(),
        }
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }
}

#[async_trait]
impl Constraint for NotConstantConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "not_constant"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        self.group_by.validate(&schema)?;
        let evaluator = GroupEvaluator::new(&self.group_by, DATA_TABLE);
        let branches: Vec<Branch> = evaluator
            .without_keys(self.columns.resolve_checked(&schema)?)
            .into_iter()
            .map(|c| Branch {
                measures: vec![Measure::new(
                    "n_distinct",
                    format!(
                        "COUNT(DISTINCT {sql}) + MAX(CASE WHEN {sql} IS NULL THEN 1 ELSE 0 END)",
                        sql = c.sql
                    ),
                )],
                label: c.label,
            })
            .collect();
        let Some(sql) = evaluator.per_column(&branches, "\"n_distinct\" = 1") else {
            return Ok(ConstraintResult::success());
        };

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;
        let message = if self.group_by.is_grouped() {
            "Some columns are constant within a given group"
        } else {
            "Some columns are constant"
        };
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, message))
    }

    fn name(&self) -> &str {
        "not_constant"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.describe())
            .with_custom("group_by", self.group_by.names().join(","))
    }
}
