//! Shared helpers for integration tests.

#![allow(dead_code)]

use arrow::array::{Array, ArrayRef, AsArray, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::prelude::SessionContext;
use std::sync::Arc;
use term_contract::prelude::*;

pub fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, array)| array).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

pub fn ints<'a>(name: &'a str, values: &[i64]) -> (&'a str, ArrayRef) {
    (name, Arc::new(Int64Array::from(values.to_vec())))
}

pub fn strings<'a>(name: &'a str, values: &[&str]) -> (&'a str, ArrayRef) {
    (name, Arc::new(StringArray::from(values.to_vec())))
}

pub fn table(columns: Vec<(&str, ArrayRef)>) -> Table {
    Table::from_batch(batch(columns))
}

/// The same data as a lazily planned table.
pub fn planned(columns: Vec<(&str, ArrayRef)>) -> Table {
    let df = SessionContext::new().read_batch(batch(columns)).unwrap();
    Table::planned(df)
}

pub fn int_column(rows: &MaterializedTable, name: &str) -> Vec<Option<i64>> {
    let column = cast(&rows.column_by_name(name).unwrap(), &DataType::Int64).unwrap();
    column.as_primitive::<Int64Type>().iter().collect()
}

pub fn string_column(rows: &MaterializedTable, name: &str) -> Vec<Option<String>> {
    let column = cast(&rows.column_by_name(name).unwrap(), &DataType::Utf8).unwrap();
    column
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

/// Runs a check that must fail on the data and returns its violation.
pub async fn expect_violation<C: Constraint>(table: Table, constraint: &C) -> Violation {
    match table.check(constraint).await {
        Err(TermError::CheckFailed(violation)) => *violation,
        Err(other) => panic!("expected a check failure, got {other}"),
        Ok(_) => panic!("expected {} to fail", constraint.name()),
    }
}

pub fn null_count(rows: &MaterializedTable, name: &str) -> usize {
    rows.column_by_name(name).unwrap().null_count()
}
