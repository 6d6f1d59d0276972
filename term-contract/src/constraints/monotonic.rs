//! Monotonicity with an optional fixed step.
//!
//! [`MonotonicConstraint`] checks that a column is sorted, in input row order,
//! within each group. Optionally every step between consecutive values must equal a
//! fixed numeric interval or, for dates and timestamps, a calendar duration.
//!
//! The whole check is one query:
//!
//! 1. number rows in input order and take the previous value within the group;
//! 2. derive the sign of each step (null when either side is null);
//! 3. a row is reported when `NOT (backward_ok AND forward_ok)` holds, where
//!    `forward_ok` is the next row's `backward_ok` in the same group;
//! 4. only when no row breaks the ordering, rows whose step differs from the
//!    interval are reported instead.
//!
//! ```rust
//! use term_contract::constraints::MonotonicConstraint;
//!
//! let increasing_daily = MonotonicConstraint::new("day").interval("1d");
//! let countdown = MonotonicConstraint::new("remaining").decreasing(true).strict(false);
//! let per_sensor = MonotonicConstraint::new("seq").interval(1).group_by("sensor");
//! # let _ = (increasing_daily, countdown, per_sensor);
//! ```

use crate::core::{
    Constraint, ConstraintMetadata, ConstraintResult, GroupBy, Table, TermContext, TimeStep,
    ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::array::AsArray;
use arrow::datatypes::{DataType, Schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const ROW: &str = "__term_row";
const PREV: &str = "__term_prev";
const SIGN: &str = "__term_sign";
const STEP: &str = "__term_step";
const BACK_OK: &str = "__term_back_ok";
const FWD_OK: &str = "__term_fwd_ok";
const ORDER_BAD: &str = "__term_order_bad";
const STEP_BAD: &str = "__term_step_bad";
const ANY_ORDER_BAD: &str = "__term_any_order_bad";

/// Expected distance between consecutive values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Exact integer difference, for numeric columns.
    Integer(i64),
    /// Exact floating-point difference, for numeric columns.
    Exact(f64),
    /// Calendar duration such as `"1mo"` or `"3 minutes"`, for temporal columns.
    Duration(String),
}

impl From<i32> for Step {
    fn from(value: i32) -> Self {
        Step::Integer(i64::from(value))
    }
}

impl From<i64> for Step {
    fn from(value: i64) -> Self {
        Step::Integer(value)
    }
}

impl From<f64> for Step {
    fn from(value: f64) -> Self {
        Step::Exact(value)
    }
}

impl From<&str> for Step {
    fn from(value: &str) -> Self {
        Step::Duration(value.to_string())
    }
}

impl From<String> for Step {
    fn from(value: String) -> Self {
        Step::Duration(value)
    }
}

impl From<TimeStep> for Step {
    fn from(value: TimeStep) -> Self {
        Step::Duration(value.as_str().to_string())
    }
}

/// Step test compiled for a concrete column type.
#[derive(Debug)]
struct StepSql {
    /// Value of the reported step column.
    value: String,
    /// True when a row's step is wrong.
    mismatch: String,
    /// Name of the reported step column.
    label: &'static str,
    /// Interval as shown in messages.
    display: String,
}

/// Checks that a column is monotonic within each group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonotonicConstraint {
    column: String,
    decreasing: bool,
    strict: bool,
    interval: Option<Step>,
    group_by: GroupBy,
}

impl MonotonicConstraint {
    /// Strictly increasing, no interval, ungrouped.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            decreasing: false,
            strict: true,
            interval: None,
            group_by: GroupBy::none(),
        }
    }

    pub fn decreasing(mut self, decreasing: bool) -> Self {
        self.decreasing = decreasing;
        self
    }

    /// Whether ties between consecutive values are forbidden.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn interval(mut self, interval: impl Into<Step>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }

    fn sign_predicate(&self) -> &'static str {
        match (self.decreasing, self.strict) {
            (false, false) => ">= 0",
            (false, true) => "> 0",
            (true, false) => "<= 0",
            (true, true) => "< 0",
        }
    }

    fn require_numeric(&self, data_type: &DataType, interval: &str) -> Result<()> {
        if data_type.is_numeric() {
            return Ok(());
        }
        Err(TermError::invalid_argument(format!(
            "numeric interval {interval} cannot be applied to column \"{}\" of type {data_type}; use a duration such as \"1d\" for temporal columns",
            self.column
        )))
    }

    /// Difference to the previous value. Unsigned columns are widened so that a
    /// decreasing step stays negative.
    fn delta_sql(column: &str, data_type: &DataType) -> String {
        if data_type.is_unsigned_integer() {
            format!("CAST({column} AS DECIMAL(20, 0)) - CAST(\"{PREV}\" AS DECIMAL(20, 0))")
        } else {
            format!("{column} - \"{PREV}\"")
        }
    }

    fn step_sql(&self, data_type: &DataType) -> Result<Option<StepSql>> {
        let column = SqlSecurity::quote_identifier(&self.column);
        let temporal = matches!(
            data_type,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _)
        );

        match &self.interval {
            None => Ok(None),
            Some(Step::Integer(value)) => {
                self.require_numeric(data_type, &value.to_string())?;
                Ok(Some(StepSql {
                    value: Self::delta_sql(&column, data_type),
                    mismatch: format!("\"{STEP}\" <> {value}"),
                    label: "previous_delta",
                    display: value.to_string(),
                }))
            }
            Some(Step::Exact(value)) => {
                if !value.is_finite() {
                    return Err(TermError::invalid_argument(format!(
                        "interval must be finite, got {value}"
                    )));
                }
                self.require_numeric(data_type, &value.to_string())?;
                Ok(Some(StepSql {
                    value: Self::delta_sql(&column, data_type),
                    mismatch: format!("\"{STEP}\" <> {value:?}"),
                    label: "previous_delta",
                    display: format!("{value}"),
                }))
            }
            Some(Step::Duration(text)) => {
                if !temporal {
                    return Err(TermError::invalid_argument(format!(
                        "duration \"{text}\" can only be applied to date or timestamp columns, \"{}\" is {data_type}",
                        self.column
                    )));
                }
                let step: TimeStep = text.parse()?;
                Ok(Some(StepSql {
                    value: format!("\"{PREV}\" + {}", step.to_sql()),
                    mismatch: format!("\"{STEP}\" <> {column}"),
                    label: "previous_plus_interval",
                    display: step.to_string(),
                }))
            }
        }
    }

    fn build_query(&self, schema: &Schema, step: Option<&StepSql>) -> String {
        let column = SqlSecurity::quote_identifier(&self.column);
        let window = format!("{} ORDER BY \"{ROW}\"", self.group_by.partition_clause());
        let sign_ok = self.sign_predicate();
        let originals: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| SqlSecurity::quote_identifier(f.name()))
            .collect();

        let (step_projection, step_bad, step_output) = match step {
            Some(step) => (
                format!(", {} AS \"{STEP}\"", step.value),
                format!("COALESCE({}, FALSE)", step.mismatch),
                format!("\"{STEP}\", "),
            ),
            None => (String::new(), "FALSE".to_string(), String::new()),
        };

        format!(
            "WITH base AS (\
                SELECT *, ROW_NUMBER() OVER () AS \"{ROW}\", {group} FROM {DATA_TABLE}\
             ), lagged AS (\
                SELECT *, LAG({column}) OVER ({window}) AS \"{PREV}\" FROM base\
             ), signed AS (\
                SELECT *, CASE WHEN {column} > \"{PREV}\" THEN 1 \
                               WHEN {column} < \"{PREV}\" THEN -1 \
                               WHEN {column} = \"{PREV}\" THEN 0 END AS \"{SIGN}\"{step_projection} \
                FROM lagged\
             ), checked AS (\
                SELECT *, (\"{SIGN}\" {sign_ok}) AS \"{BACK_OK}\", \
                       LEAD(\"{SIGN}\" {sign_ok}) OVER ({window}) AS \"{FWD_OK}\" \
                FROM signed\
             ), flagged AS (\
                SELECT *, COALESCE(NOT (\"{BACK_OK}\" AND \"{FWD_OK}\"), FALSE) AS \"{ORDER_BAD}\", \
                       {step_bad} AS \"{STEP_BAD}\" \
                FROM checked\
             ), scored AS (\
                SELECT *, MAX(CASE WHEN \"{ORDER_BAD}\" THEN 1 ELSE 0 END) OVER () AS \"{ANY_ORDER_BAD}\" \
                FROM flagged\
             ) \
             SELECT {originals}, {step_output}\"{ORDER_BAD}\" FROM scored \
             WHERE CASE WHEN \"{ANY_ORDER_BAD}\" = 1 THEN \"{ORDER_BAD}\" ELSE \"{STEP_BAD}\" END \
             ORDER BY \"{ROW}\"",
            group = GroupBy::implicit_group_projection(),
            originals = originals.join(", "),
        )
    }
}

#[async_trait]
impl Constraint for MonotonicConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "is_monotonic", column = %self.column))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        let index = schema
            .index_of(&self.column)
            .map_err(|_| TermError::column_not_found(self.column.clone()))?;
        self.group_by.validate(&schema)?;
        let step = self.step_sql(schema.field(index).data_type())?;

        let sql = self.build_query(&schema, step.as_ref());
        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;

        let reporter =
            ViolationReporter::new(self.name()).max_rows(ctx.config().max_report_rows);
        if rows.is_empty() {
            debug!("column is monotonic");
            return Ok(ConstraintResult::success());
        }

        let flags = rows.column_by_name(ORDER_BAD)?;
        let order_failed = flags
            .as_boolean_opt()
            .ok_or_else(|| TermError::constraint_evaluation(self.name(), "ordering flag is not boolean"))?
            .value(0);

        let original: Vec<usize> = (0..schema.fields().len()).collect();
        if order_failed {
            let message = format!(
                "Column \"{0}\" expected to be monotonic but is not, try sorting by \"{0}\"",
                self.column
            );
            return Ok(reporter.fail(rows.project(&original)?, message));
        }

        let step = step.ok_or_else(|| {
            TermError::constraint_evaluation(self.name(), "step rows reported without an interval")
        })?;
        let step_index = original.len();
        let mut with_step = original;
        with_step.push(step_index);
        let offending = rows
            .project(&with_step)?
            .rename_column(step_index, step.label)?;
        let message = format!(
            "Intervals differ from the specified {} interval",
            step.display
        );
        Ok(reporter.fail(offending, message))
    }

    fn name(&self) -> &str {
        "is_monotonic"
    }

    fn metadata(&self) -> ConstraintMetadata {
        let mut metadata = ConstraintMetadata::for_column(self.column.clone())
            .with_custom("decreasing", self.decreasing.to_string())
            .with_custom("strict", self.strict.to_string());
        if self.group_by.is_grouped() {
            metadata = metadata.with_custom("group_by", self.group_by.names().join(","));
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{batch, int_batch, int_values, planned};
    use arrow::array::{ArrayRef, Date32Array, Int64Array, StringArray, TimestampSecondArray, UInt64Array};
    use std::sync::Arc;

    fn ints(values: &[i64]) -> Table {
        Table::from_batch(int_batch(&[("a", values.iter().copied().map(Some).collect())]))
    }

    async fn violation(table: Table, constraint: MonotonicConstraint) -> crate::core::Violation {
        let err = table.check(&constraint).await.unwrap_err();
        err.into_violation().expect("expected a check failure")
    }

    #[tokio::test]
    async fn test_strictly_increasing_passes() -> Result<()> {
        let input = ints(&[1, 2, 3]);
        let output = input.clone().check(&MonotonicConstraint::new("a")).await?;
        assert_eq!(output.as_materialized(), input.as_materialized());
        Ok(())
    }

    #[tokio::test]
    async fn test_reports_both_sides_of_a_break() {
        let v = violation(ints(&[1, 2, 1]), MonotonicConstraint::new("a")).await;
        assert_eq!(int_values(v.rows(), "a"), vec![Some(2), Some(1)]);
        assert_eq!(
            v.message(),
            "Column \"a\" expected to be monotonic but is not, try sorting by \"a\""
        );
    }

    #[tokio::test]
    async fn test_ties_pass_only_when_not_strict() -> Result<()> {
        let v = violation(ints(&[1, 1, 2]), MonotonicConstraint::new("a")).await;
        assert_eq!(int_values(v.rows(), "a"), vec![Some(1), Some(1)]);

        ints(&[1, 1, 2])
            .check(&MonotonicConstraint::new("a").strict(false))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_decreasing() -> Result<()> {
        ints(&[3, 2, 1])
            .check(&MonotonicConstraint::new("a").decreasing(true))
            .await?;
        let v = violation(ints(&[3, 2, 1]), MonotonicConstraint::new("a")).await;
        assert_eq!(v.rows().num_rows(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_trivial_columns_pass() -> Result<()> {
        ints(&[7]).check(&MonotonicConstraint::new("a")).await?;
        ints(&[]).check(&MonotonicConstraint::new("a")).await?;
        Table::from_batch(int_batch(&[("a", vec![None, None])]))
            .check(&MonotonicConstraint::new("a"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unsigned_decreasing_interval() -> Result<()> {
        let values: ArrayRef = Arc::new(UInt64Array::from(vec![3, 2, 1]));
        let table = Table::from_batch(batch(vec![("a", values)]));
        table
            .clone()
            .check(&MonotonicConstraint::new("a").decreasing(true).interval(-1))
            .await?;

        let v = violation(table, MonotonicConstraint::new("a").decreasing(true).interval(-2)).await;
        assert_eq!(int_values(v.rows(), "previous_delta"), vec![Some(-1), Some(-1)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_large_integer_interval_is_exact() -> Result<()> {
        let step = (1i64 << 53) + 1;
        let values: ArrayRef = Arc::new(Int64Array::from(vec![0, step, 2 * step]));
        let table = Table::from_batch(batch(vec![("a", values)]));
        table.clone().check(&MonotonicConstraint::new("a").interval(step)).await?;

        let v = violation(table, MonotonicConstraint::new("a").interval(step - 1)).await;
        assert_eq!(v.rows().num_rows(), 2);
        assert_eq!(
            v.message(),
            format!("Intervals differ from the specified {} interval", step - 1)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_numeric_interval() -> Result<()> {
        ints(&[1, 3, 5]).check(&MonotonicConstraint::new("a").interval(2)).await?;

        let v = violation(ints(&[1, 3, 6]), MonotonicConstraint::new("a").interval(2)).await;
        assert_eq!(v.rows().column_names(), vec!["a", "previous_delta"]);
        assert_eq!(int_values(v.rows(), "a"), vec![Some(6)]);
        assert_eq!(int_values(v.rows(), "previous_delta"), vec![Some(3)]);
        assert_eq!(v.message(), "Intervals differ from the specified 2 interval");
        Ok(())
    }

    #[tokio::test]
    async fn test_ordering_failure_takes_precedence() {
        let v = violation(ints(&[1, 3, 2]), MonotonicConstraint::new("a").interval(2)).await;
        assert_eq!(v.rows().column_names(), vec!["a"]);
        assert!(v.message().contains("expected to be monotonic"));
    }

    #[tokio::test]
    async fn test_calendar_interval_on_dates() -> Result<()> {
        // 2024-01-01, 2024-02-01, 2024-03-01
        let monthly: ArrayRef = Arc::new(Date32Array::from(vec![19_723, 19_754, 19_783]));
        Table::from_batch(batch(vec![("d", monthly)]))
            .check(&MonotonicConstraint::new("d").interval("1mo"))
            .await?;

        // 2024-03-03 instead of 2024-03-01
        let skewed: ArrayRef = Arc::new(Date32Array::from(vec![19_723, 19_754, 19_785]));
        let v = violation(
            Table::from_batch(batch(vec![("d", skewed)])),
            MonotonicConstraint::new("d").interval("1 month"),
        )
        .await;
        assert_eq!(v.rows().column_names(), vec!["d", "previous_plus_interval"]);
        assert_eq!(v.rows().num_rows(), 1);
        assert_eq!(v.message(), "Intervals differ from the specified 1 month interval");
        Ok(())
    }

    #[tokio::test]
    async fn test_calendar_interval_on_timestamps() -> Result<()> {
        let ts: ArrayRef = Arc::new(TimestampSecondArray::from(vec![0, 180, 360]));
        Table::from_batch(batch(vec![("t", ts.clone())]))
            .check(&MonotonicConstraint::new("t").interval("3m"))
            .await?;

        let err = Table::from_batch(batch(vec![("t", ts)]))
            .check(&MonotonicConstraint::new("t").interval("2m"))
            .await
            .unwrap_err();
        assert_eq!(err.violation().map(|v| v.rows().num_rows()), Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_interval_kind_must_match_column_type() {
        let err = ints(&[1, 2])
            .check(&MonotonicConstraint::new("a").interval("1d"))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());

        let dates: ArrayRef = Arc::new(Date32Array::from(vec![1, 2]));
        let err = Table::from_batch(batch(vec![("d", dates)]))
            .check(&MonotonicConstraint::new("d").interval(1))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());

        let err = ints(&[1, 2])
            .check(&MonotonicConstraint::new("a").interval(f64::NAN))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_grouped() -> Result<()> {
        let groups: ArrayRef = Arc::new(StringArray::from(vec!["x", "y", "x", "y"]));
        let values: ArrayRef = Arc::new(arrow::array::Int64Array::from(vec![1, 10, 2, 5]));
        let table = Table::from_batch(batch(vec![("g", groups), ("a", values)]));

        let v = violation(table.clone(), MonotonicConstraint::new("a").group_by("g")).await;
        assert_eq!(int_values(v.rows(), "a"), vec![Some(10), Some(5)]);

        // Sorted within each group, unsorted globally.
        let groups: ArrayRef = Arc::new(StringArray::from(vec!["x", "y", "x", "y"]));
        let values: ArrayRef = Arc::new(arrow::array::Int64Array::from(vec![1, 10, 2, 11]));
        let table = Table::from_batch(batch(vec![("g", groups), ("a", values)]));
        table
            .clone()
            .check(&MonotonicConstraint::new("a").group_by("g").interval(1))
            .await?;
        table.check(&MonotonicConstraint::new("a")).await.unwrap_err();
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_columns_are_usage_errors() {
        let err = ints(&[1]).check(&MonotonicConstraint::new("b")).await.unwrap_err();
        assert!(matches!(err, TermError::ColumnNotFound { ref column } if column == "b"));

        let err = ints(&[1])
            .check(&MonotonicConstraint::new("a").group_by("g"))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_planned_table() -> Result<()> {
        let ok = planned(int_batch(&[("a", vec![Some(1), Some(2)])]))?;
        let out = ok.check(&MonotonicConstraint::new("a")).await?;
        assert!(out.is_planned());

        let bad = planned(int_batch(&[("a", vec![Some(2), Some(1)])]))?;
        let err = bad.check(&MonotonicConstraint::new("a")).await.unwrap_err();
        assert_eq!(err.violation().map(|v| v.rows().num_rows()), Some(2));
        Ok(())
    }
}
