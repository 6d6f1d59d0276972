//! Pipe-style check functions.
//!
//! Each function takes a table by value and returns it unchanged when the check
//! passes, so checks chain with `?` between transformation steps:
//!
//! ```rust
//! use term_contract::checks;
//! use term_contract::prelude::*;
//! # use arrow::array::Int64Array;
//! # use arrow::record_batch::RecordBatch;
//! # use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! # let batch = RecordBatch::try_from_iter(vec![("id", Arc::new(Int64Array::from(vec![1, 2])) as _)])?;
//! let table = Table::from_batch(batch);
//! let table = checks::has_no_nulls(table, "id").await?;
//! let table = checks::is_monotonic(table, "id").await?;
//! # let _ = table;
//! # Ok(())
//! # }
//! ```
//!
//! For non-default options, build the constraint and call [`Table::check`].

use crate::constraints::{
    AtLeastOneConstraint, ColumnWithinStdConstraint, CustomSqlConstraint, HasColumnsConstraint,
    HasDtypesConstraint, HasShapeConstraint, MaintainsRelationshipsConstraint,
    MonotonicConstraint, MutuallyExclusiveRangesConstraint, NoInfsConstraint,
    NoNullsConstraint, NotConstantConstraint, UniqueCombinationConstraint, UniqueConstraint,
};
use crate::core::{ColumnSpec, Table};
use crate::prelude::*;
use arrow::datatypes::DataType;

/// Fails unless the table has `rows` rows and/or `columns` columns.
pub async fn has_shape(table: Table, rows: Option<usize>, columns: Option<usize>) -> Result<Table> {
    table.check(&HasShapeConstraint::new(rows, columns)).await
}

pub async fn has_columns<I, S>(table: Table, columns: I) -> Result<Table>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    table.check(&HasColumnsConstraint::new(columns)).await
}

pub async fn has_dtypes<I, S>(table: Table, dtypes: I) -> Result<Table>
where
    I: IntoIterator<Item = (S, DataType)>,
    S: Into<String>,
{
    table.check(&HasDtypesConstraint::from_iter(dtypes)).await
}

pub async fn has_no_nulls(table: Table, columns: impl Into<ColumnSpec>) -> Result<Table> {
    table.check(&NoNullsConstraint::new(columns)).await
}

pub async fn has_no_infs(table: Table, columns: impl Into<ColumnSpec>) -> Result<Table> {
    table.check(&NoInfsConstraint::new(columns)).await
}

pub async fn at_least_one(table: Table, columns: impl Into<ColumnSpec>) -> Result<Table> {
    table.check(&AtLeastOneConstraint::new(columns)).await
}

pub async fn unique(table: Table, columns: impl Into<ColumnSpec>) -> Result<Table> {
    table.check(&UniqueConstraint::new(columns)).await
}

pub async fn unique_combination_of_columns(
    table: Table,
    columns: impl Into<ColumnSpec>,
) -> Result<Table> {
    table.check(&UniqueCombinationConstraint::new(columns)).await
}

pub async fn not_constant(table: Table, columns: impl Into<ColumnSpec>) -> Result<Table> {
    table.check(&NotConstantConstraint::new(columns)).await
}

/// Fails unless `column` is strictly increasing.
pub async fn is_monotonic(table: Table, column: impl Into<String>) -> Result<Table> {
    table.check(&MonotonicConstraint::new(column)).await
}

/// Fails when two `[low, high]` intervals overlap.
pub async fn mutually_exclusive_ranges(
    table: Table,
    low: impl Into<String>,
    high: impl Into<String>,
) -> Result<Table> {
    table
        .check(&MutuallyExclusiveRangesConstraint::new(low, high))
        .await
}

/// Fails unless `table` and `reference` hold the same key tuples.
pub async fn maintains_relationships<I, S>(table: Table, reference: Table, keys: I) -> Result<Table>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    table
        .check(&MaintainsRelationshipsConstraint::new(reference, keys))
        .await
}

pub async fn column_is_within_n_std(
    table: Table,
    columns: impl Into<ColumnSpec>,
    n_std: f64,
) -> Result<Table> {
    table
        .check(&ColumnWithinStdConstraint::new().column(columns, n_std))
        .await
}

/// Fails on rows where `predicate` is false.
pub async fn custom_check(table: Table, predicate: impl Into<String>) -> Result<Table> {
    table.check(&CustomSqlConstraint::new(predicate)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::int_batch;

    fn table() -> Table {
        Table::from_batch(int_batch(&[
            ("a", vec![Some(1), Some(2), Some(3)]),
            ("b", vec![Some(2), Some(3), Some(4)]),
        ]))
    }

    #[tokio::test]
    async fn test_chained_checks_return_the_table() -> Result<()> {
        let input = table();
        let output = has_shape(input.clone(), Some(3), Some(2)).await?;
        let output = has_columns(output, ["a", "b"]).await?;
        let output = has_dtypes(output, [("a", DataType::Int64)]).await?;
        let output = has_no_nulls(output, ColumnSpec::All).await?;
        let output = has_no_infs(output, ColumnSpec::All).await?;
        let output = at_least_one(output, "a").await?;
        let output = unique(output, "a").await?;
        let output = unique_combination_of_columns(output, vec!["a", "b"]).await?;
        let output = not_constant(output, ColumnSpec::All).await?;
        let output = is_monotonic(output, "a").await?;
        let output = mutually_exclusive_ranges(output, "a", "a").await?;
        let output = maintains_relationships(output, table(), ["a"]).await?;
        let output = column_is_within_n_std(output, "a", 3.0).await?;
        let output = custom_check(output, "a < b").await?;
        assert_eq!(output.as_materialized(), input.as_materialized());
        Ok(())
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        async fn pipeline(table: Table) -> Result<Table> {
            let table = unique(table, "a").await?;
            let table = custom_check(table, "a > 1").await?;
            has_shape(table, Some(99), None).await
        }

        let err = pipeline(table()).await.unwrap_err();
        assert_eq!(err.violation().unwrap().check(), "custom_check");
    }
}
