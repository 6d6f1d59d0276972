//! Helpers for building small tables in tests.
//!
//! Available to unit tests and, with the `test-utils` feature, to integration tests
//! and downstream crates.

use crate::core::{MaterializedTable, Table};
use crate::prelude::*;
use arrow::array::{Array, ArrayRef, AsArray, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::prelude::SessionContext;
use std::sync::Arc;

/// Builds a batch from named arrays. Every field is nullable.
///
/// # Panics
///
/// Panics when the arrays have different lengths.
#[allow(clippy::expect_used)]
pub fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, array)| array).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("columns of equal length")
}

/// Builds a batch of nullable `Int64` columns.
pub fn int_batch(columns: &[(&str, Vec<Option<i64>>)]) -> RecordBatch {
    batch(
        columns
            .iter()
            .map(|(name, values)| {
                let array: ArrayRef = Arc::new(Int64Array::from(values.clone()));
                (*name, array)
            })
            .collect(),
    )
}

/// Wraps a batch in a planned table, as produced by a lazy DataFusion pipeline.
pub fn planned(batch: RecordBatch) -> Result<Table> {
    let df = SessionContext::new().read_batch(batch)?;
    Ok(Table::planned(df))
}

fn cast_column(table: &MaterializedTable, name: &str, to: &DataType) -> Result<ArrayRef> {
    let column = table.column_by_name(name)?;
    Ok(cast(&column, to)?)
}

/// Values of a column cast to `Int64`.
///
/// # Panics
///
/// Panics when the column is missing or cannot be cast.
#[allow(clippy::expect_used)]
pub fn int_values(table: &MaterializedTable, name: &str) -> Vec<Option<i64>> {
    let array = cast_column(table, name, &DataType::Int64).expect("integer column");
    array.as_primitive::<Int64Type>().iter().collect()
}

/// Values of a column cast to `Float64`.
///
/// # Panics
///
/// Panics when the column is missing or cannot be cast.
#[allow(clippy::expect_used)]
pub fn float_values(table: &MaterializedTable, name: &str) -> Vec<Option<f64>> {
    let array = cast_column(table, name, &DataType::Float64).expect("float column");
    array.as_primitive::<Float64Type>().iter().collect()
}

/// Values of a column cast to `Utf8`.
///
/// # Panics
///
/// Panics when the column is missing or cannot be cast.
#[allow(clippy::expect_used)]
pub fn string_values(table: &MaterializedTable, name: &str) -> Vec<Option<String>> {
    let array = cast_column(table, name, &DataType::Utf8).expect("string column");
    array
        .as_string::<i32>()
        .iter()
        .map(|value| value.map(str::to_string))
        .collect()
}

/// Null count of a column.
pub fn null_count(table: &MaterializedTable, name: &str) -> Result<usize> {
    Ok(table.column_by_name(name)?.null_count())
}
