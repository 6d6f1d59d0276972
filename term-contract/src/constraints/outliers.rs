//! Outliers outside `mean ± n · std`.

use crate::core::{
    ColumnSpec, Constraint, ConstraintMetadata, ConstraintResult, Table, TermContext,
    ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::array::Array;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Checks that values stay within `n_std` sample standard deviations of their mean.
///
/// Several `(columns, n_std)` pairs can be combined. Statistics of every resolved
/// column are computed in one aggregate; when two pairs resolve to the same column
/// a value is an outlier if it falls outside either band.
///
/// The report keeps only rows with at least one outlier and only columns containing
/// one; cells that are not outliers are null.
///
/// ```rust
/// use arrow::datatypes::DataType;
/// use term_contract::constraints::ColumnWithinStdConstraint;
///
/// let constraint = ColumnWithinStdConstraint::new()
///     .column("price", 3.0)
///     .column(DataType::Float64, 5.0);
/// # let _ = constraint;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnWithinStdConstraint {
    pairs: Vec<(ColumnSpec, f64)>,
}

/// One resolved column with the bands it is checked against.
#[derive(Debug)]
struct Banded {
    label: String,
    sql: String,
    n_stds: Vec<f64>,
}

impl ColumnWithinStdConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `(columns, n_std)` pair.
    pub fn column(mut self, columns: impl Into<ColumnSpec>, n_std: f64) -> Self {
        self.pairs.push((columns.into(), n_std));
        self
    }

    fn resolve(&self, table: &Table) -> Result<Vec<Banded>> {
        let schema = table.schema();
        let mut banded: Vec<Banded> = Vec::new();
        for (spec, n_std) in &self.pairs {
            if !n_std.is_finite() || *n_std < 0.0 {
                return Err(TermError::invalid_argument(format!(
                    "n_std must be a non-negative finite number, got {n_std}"
                )));
            }
            for column in spec.resolve_checked(&schema)? {
                if let Some(data_type) = column.data_type.as_ref().filter(|t| !t.is_numeric()) {
                    // Selecting every column skips the non-numeric ones.
                    if matches!(spec, ColumnSpec::All) {
                        continue;
                    }
                    return Err(TermError::invalid_argument(format!(
                        "column \"{}\" has type {data_type}, mean and standard deviation need a numeric column",
                        column.label
                    )));
                }
                match banded.iter_mut().find(|b| b.label == column.label) {
                    Some(existing) => existing.n_stds.push(*n_std),
                    None => banded.push(Banded {
                        label: column.label,
                        sql: column.sql,
                        n_stds: vec![*n_std],
                    }),
                }
            }
        }
        Ok(banded)
    }

    fn build_query(columns: &[Banded]) -> String {
        let stats: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "AVG({sql}) AS \"__term_mean_{i}\", STDDEV({sql}) AS \"__term_std_{i}\"",
                    sql = c.sql
                )
            })
            .collect();

        let cells: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let outside: Vec<String> = c
                    .n_stds
                    .iter()
                    .map(|n| {
                        format!(
                            "({sql} < \"__term_mean_{i}\" - {n:?} * \"__term_std_{i}\" \
                             OR {sql} > \"__term_mean_{i}\" + {n:?} * \"__term_std_{i}\")",
                            sql = c.sql
                        )
                    })
                    .collect();
                format!(
                    "CASE WHEN {} THEN {} END AS {}",
                    outside.join(" OR "),
                    c.sql,
                    SqlSecurity::quote_identifier(&c.label)
                )
            })
            .collect();

        let any: Vec<String> = columns
            .iter()
            .map(|c| format!("{} IS NOT NULL", SqlSecurity::quote_identifier(&c.label)))
            .collect();

        format!(
            "WITH stats AS (SELECT {} FROM {DATA_TABLE}), \
             tagged AS (SELECT {} FROM {DATA_TABLE} CROSS JOIN stats) \
             SELECT * FROM tagged WHERE {}",
            stats.join(", "),
            cells.join(", "),
            any.join(" OR ")
        )
    }
}

#[async_trait]
impl Constraint for ColumnWithinStdConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "column_is_within_n_std"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let columns = self.resolve(table)?;
        if columns.is_empty() {
            debug!("no columns to check");
            return Ok(ConstraintResult::success());
        }

        ctx.register_data(table)?;
        let rows = ctx.query(&Self::build_query(&columns)).await?;
        if rows.is_empty() {
            return Ok(ConstraintResult::success());
        }

        // Keep only columns holding at least one outlier.
        let batch = rows.concat()?;
        let impacted: Vec<usize> = (0..batch.num_columns())
            .filter(|&i| batch.column(i).null_count() < batch.num_rows())
            .collect();
        let offending = rows.project(&impacted)?;
        let names = offending.column_names();
        debug!(impacted = ?names, rows = offending.num_rows(), "outliers found");

        let message = format!(
            "There are some outliers outside the specified mean±std range\n\
             Impacted columns: {names:?}"
        );
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .fail(offending, message))
    }

    fn name(&self) -> &str {
        "column_is_within_n_std"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.pairs.iter().flat_map(|(spec, _)| spec.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{batch, int_batch, int_values};
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::DataType;
    use std::sync::Arc;

    fn scenario() -> Table {
        let b: ArrayRef = Arc::new(Int64Array::from(vec![2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]));
        let c: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 5000]));
        Table::from_batch(batch(vec![("b", b), ("c", c)]))
    }

    #[tokio::test]
    async fn test_reports_outlier_rows_and_columns() {
        let err = scenario()
            .check(&ColumnWithinStdConstraint::new().column(vec!["b", "c"], 2.0))
            .await
            .unwrap_err();
        let v = err.violation().unwrap();
        assert_eq!(v.rows().column_names(), vec!["c"]);
        assert_eq!(int_values(v.rows(), "c"), vec![Some(5000)]);
        assert!(v.message().contains("Impacted columns: [\"c\"]"));
    }

    #[tokio::test]
    async fn test_wide_band_passes() -> Result<()> {
        let input = scenario();
        let output = input
            .clone()
            .check(&ColumnWithinStdConstraint::new().column("c", 10.0))
            .await?;
        assert_eq!(output.as_materialized(), input.as_materialized());
        Ok(())
    }

    #[tokio::test]
    async fn test_pairs_on_same_column_are_ored() {
        let err = scenario()
            .check(
                &ColumnWithinStdConstraint::new()
                    .column("c", 10.0)
                    .column(DataType::Int64, 2.0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.violation().unwrap().rows().column_names(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_non_outlier_cells_are_null() {
        let a: ArrayRef = Arc::new(Float64Array::from(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 100.0, 0.0]));
        let b: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, -100.0]));
        let err = Table::from_batch(batch(vec![("a", a), ("b", b)]))
            .check(&ColumnWithinStdConstraint::new().column(ColumnSpec::All, 2.0))
            .await
            .unwrap_err();
        let rows = err.violation().unwrap().rows().concat().unwrap();
        assert_eq!(rows.num_rows(), 2);
        assert_eq!(rows.column(0).null_count(), 1);
        assert_eq!(rows.column(1).null_count(), 1);
    }

    #[tokio::test]
    async fn test_constant_and_empty_columns_pass() -> Result<()> {
        Table::from_batch(int_batch(&[("a", vec![Some(4), Some(4), Some(4)])]))
            .check(&ColumnWithinStdConstraint::new().column("a", 0.0))
            .await?;
        Table::from_batch(int_batch(&[("a", vec![])]))
            .check(&ColumnWithinStdConstraint::new().column("a", 1.0))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let table = scenario();
        let err = table
            .clone()
            .check(&ColumnWithinStdConstraint::new().column("missing", 1.0))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());

        let err = table
            .check(&ColumnWithinStdConstraint::new().column("c", -1.0))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_non_numeric_columns() -> Result<()> {
        let name: ArrayRef = Arc::new(StringArray::from(vec!["x", "y", "z"]));
        let value: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let table = Table::from_batch(batch(vec![("name", name), ("value", value)]));

        table
            .clone()
            .check(&ColumnWithinStdConstraint::new().column(ColumnSpec::All, 3.0))
            .await?;

        let err = table
            .check(&ColumnWithinStdConstraint::new().column("name", 3.0))
            .await
            .unwrap_err();
        assert!(err.is_usage_error(), "{err}");
        Ok(())
    }
}
