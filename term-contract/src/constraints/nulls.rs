//! Null and infinity checks.

use crate::core::{
    Branch, ColumnSpec, Constraint, ConstraintMetadata, ConstraintResult, GroupBy,
    GroupEvaluator, Measure, Table, TermContext, ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::datatypes::DataType;
use async_trait::async_trait;
use datafusion::scalar::ScalarValue;
use tracing::{debug, instrument};

/// Checks that the selected columns contain no nulls.
///
/// Failures report one `(column, null_count)` row per column holding nulls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoNullsConstraint {
    columns: ColumnSpec,
}

impl NoNullsConstraint {
    pub fn new(columns: impl Into<ColumnSpec>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

#[async_trait]
impl Constraint for NoNullsConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "has_no_nulls"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let columns = self.columns.resolve_checked(&table.schema())?;
        let group_by = GroupBy::none();
        let evaluator = GroupEvaluator::new(&group_by, DATA_TABLE);
        let branches: Vec<Branch> = columns
            .into_iter()
            .map(|c| Branch {
                measures: vec![Measure::new(
                    "null_count",
                    format!("COUNT(*) - COUNT({})", c.sql),
                )],
                label: c.label,
            })
            .collect();
        let Some(sql) = evaluator.per_column(&branches, "\"null_count\" > 0") else {
            return Ok(ConstraintResult::success());
        };

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;
        debug!(columns_with_nulls = rows.num_rows(), "null counts evaluated");
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, "There were unexpected nulls in the columns above"))
    }

    fn name(&self) -> &str {
        "has_no_nulls"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.describe())
    }
}

/// Checks that floating-point columns contain no positive or negative infinity.
///
/// Non-float columns in the selection are ignored. Offending rows are reported in
/// full.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoInfsConstraint {
    columns: ColumnSpec,
}

impl NoInfsConstraint {
    pub fn new(columns: impl Into<ColumnSpec>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

#[async_trait]
impl Constraint for NoInfsConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "has_no_infs"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let columns = self.columns.resolve_checked(&table.schema())?;
        let positive = SqlSecurity::literal(&ScalarValue::Float64(Some(f64::INFINITY)))?;
        let negative = SqlSecurity::literal(&ScalarValue::Float64(Some(f64::NEG_INFINITY)))?;
        let conditions: Vec<String> = columns
            .iter()
            .filter(|c| {
                matches!(
                    c.data_type,
                    Some(DataType::Float16 | DataType::Float32 | DataType::Float64)
                )
            })
            .map(|c| format!("{sql} = {positive} OR {sql} = {negative}", sql = c.sql))
            .collect();
        if conditions.is_empty() {
            debug!("no floating point columns selected");
            return Ok(ConstraintResult::success());
        }

        ctx.register_data(table)?;
        let sql = format!(
            "SELECT * FROM {DATA_TABLE} WHERE {}",
            conditions.join(" OR ")
        );
        let rows = ctx.query(&sql).await?;
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, "The table contains infinite values"))
    }

    fn name(&self) -> &str {
        "has_no_infs"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.describe())
    }
}

/// Checks the fraction of non-null values of columns, optionally per group.
///
/// ```rust
/// use term_contract::constraints::NotNullProportionConstraint;
///
/// let constraint = NotNullProportionConstraint::new()
///     .at_least("email", 0.9)
///     .column("phone", 0.2, 0.8)
///     .group_by("country");
/// # let _ = constraint;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotNullProportionConstraint {
    ranges: Vec<(ColumnSpec, f64, f64)>,
    group_by: GroupBy,
}

impl NotNullProportionConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the non-null fraction of `columns` to lie in `[min, max]`.
    pub fn column(mut self, columns: impl Into<ColumnSpec>, min: f64, max: f64) -> Self {
        self.ranges.push((columns.into(), min, max));
        self
    }

    /// Requires the non-null fraction of `columns` to be at least `min`.
    pub fn at_least(self, columns: impl Into<ColumnSpec>, min: f64) -> Self {
        self.column(columns, min, 1.0)
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }

    fn validate_range(min: f64, max: f64) -> Result<()> {
        let in_unit = |p: f64| (0.0..=1.0).contains(&p);
        if !in_unit(min) || !in_unit(max) || min > max {
            return Err(TermError::invalid_argument(format!(
                "proportion bounds must satisfy 0 <= min <= max <= 1, got ({min}, {max})"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Constraint for NotNullProportionConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "not_null_proportion"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        self.group_by.validate(&schema)?;
        let evaluator = GroupEvaluator::new(&self.group_by, DATA_TABLE);

        let mut branches = Vec::new();
        for (spec, min, max) in &self.ranges {
            Self::validate_range(*min, *max)?;
            for column in evaluator.without_keys(spec.resolve_checked(&schema)?) {
                branches.push(Branch {
                    measures: vec![
                        Measure::new(
                            "not_null_fraction",
                            format!(
                                "CAST(COUNT({}) AS DOUBLE) / CAST(NULLIF(COUNT(*), 0) AS DOUBLE)",
                                column.sql
                            ),
                        ),
                        Measure::new("min_prop", format!("CAST({min:?} AS DOUBLE)")),
                        Measure::new("max_prop", format!("CAST({max:?} AS DOUBLE)")),
                    ],
                    label: column.label,
                });
            }
        }
        let predicate =
            "NOT (\"not_null_fraction\" BETWEEN \"min_prop\" AND \"max_prop\")";
        let Some(sql) = evaluator.per_column(&branches, predicate) else {
            return Ok(ConstraintResult::success());
        };

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;
        debug!(out_of_range = rows.num_rows(), "not-null proportions evaluated");
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(
                rows,
                "Some columns contain a proportion of nulls beyond specified limits",
            ))
    }

    fn name(&self) -> &str {
        "not_null_proportion"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.ranges.iter().flat_map(|(spec, _, _)| spec.describe()))
            .with_custom("group_by", self.group_by.names().join(","))
    }
}

/// Checks that every selected column holds at least one non-null value, optionally
/// per group.
///
/// Failures report `(group.., column)` rows. An empty table fails, since none of its
/// columns holds a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtLeastOneConstraint {
    columns: ColumnSpec,
    group_by: GroupBy,
}

impl AtLeastOneConstraint {
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
impl Constraint for AtLeastOneConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "at_least_one"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        self.group_by.validate(&schema)?;
        let evaluator = GroupEvaluator::new(&self.group_by, DATA_TABLE);
        let branches: Vec<Branch> = evaluator
            .without_keys(self.columns.resolve_checked(&schema)?)
            .into_iter()
            .map(|c| Branch {
                measures: vec![Measure::new("__term_non_null", format!("COUNT({})", c.sql))],
                label: c.label,
            })
            .collect();
        let Some(sql) = evaluator.per_column(&branches, "\"__term_non_null\" = 0") else {
            return Ok(ConstraintResult::success());
        };

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?.drop_columns(&["__term_non_null"])?;
        let message = if self.group_by.is_grouped() {
            "Some columns contain only null values per group"
        } else {
            "Some columns contain only null values"
        };
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, message))
    }

    fn name(&self) -> &str {
        "at_least_one"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.describe())
    }
}
