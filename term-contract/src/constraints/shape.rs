//! Structural checks: shape, column presence and column types.
//!
//! Column checks only read the schema, so they never realize a planned table.

use crate::core::{
    Constraint, ConstraintMetadata, ConstraintResult, GroupBy, GroupEvaluator, Measure, Table,
    TermContext, ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use arrow::array::AsArray;
use arrow::datatypes::{DataType, Int64Type};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Checks the number of rows and/or columns, or the number of rows per group.
///
/// ```rust
/// use term_contract::constraints::HasShapeConstraint;
///
/// let exactly_ten_rows = HasShapeConstraint::new(Some(10), None);
/// let two_rows_per_day = HasShapeConstraint::new(Some(2), None).group_by("day");
/// # let _ = (exactly_ten_rows, two_rows_per_day);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HasShapeConstraint {
    rows: Option<usize>,
    columns: Option<usize>,
    group_by: GroupBy,
}

impl HasShapeConstraint {
    pub fn new(rows: Option<usize>, columns: Option<usize>) -> Self {
        Self {
            rows,
            columns,
            group_by: GroupBy::none(),
        }
    }

    /// Counts rows per group instead of in the whole table.
    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }
}

#[async_trait]
impl Constraint for HasShapeConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "has_shape"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        if self.rows.is_none() && self.columns.is_none() {
            return Err(TermError::invalid_argument(
                "has_shape needs an expected number of rows, columns or both",
            ));
        }
        if self.group_by.is_grouped() && self.rows.is_none() {
            return Err(TermError::invalid_argument(
                "has_shape with group_by needs an expected number of rows",
            ));
        }

        let schema = table.schema();
        self.group_by.validate(&schema)?;
        let reporter =
            ViolationReporter::new(self.name()).max_rows(ctx.config().max_report_rows);

        let actual_columns = schema.fields().len();
        if let Some(expected) = self.columns {
            if expected != actual_columns {
                return Ok(reporter.fail_structural(format!(
                    "Table has {actual_columns} columns, expected {expected}"
                )));
            }
        }

        let Some(expected_rows) = self.rows else {
            return Ok(ConstraintResult::success());
        };
        ctx.register_data(table)?;
        let evaluator = GroupEvaluator::new(&self.group_by, DATA_TABLE);
        let sql = evaluator.per_group(
            &[Measure::new("len", "COUNT(*)")],
            &format!("\"len\" <> {expected_rows}"),
        );
        let rows = ctx.query(&sql).await?;
        debug!(offending = rows.num_rows(), "row count evaluated");

        if self.group_by.is_grouped() {
            return Ok(reporter.report(
                rows,
                format!("Some groups do not have exactly {expected_rows} rows"),
            ));
        }
        if rows.is_empty() {
            return Ok(ConstraintResult::success());
        }
        let actual_rows = rows
            .column_by_name("len")?
            .as_primitive_opt::<Int64Type>()
            .map(|counts| counts.value(0))
            .unwrap_or_default();
        Ok(reporter.fail_structural(format!(
            "Table has {actual_rows} rows, expected {expected_rows}"
        )))
    }

    fn name(&self) -> &str {
        "has_shape"
    }

    fn metadata(&self) -> ConstraintMetadata {
        let mut metadata = ConstraintMetadata::new();
        if let Some(rows) = self.rows {
            metadata = metadata.with_custom("rows", rows.to_string());
        }
        if let Some(columns) = self.columns {
            metadata = metadata.with_custom("columns", columns.to_string());
        }
        metadata
    }
}

/// Checks that every named column exists.
#[derive(Debug, Clone, PartialEq)]
pub struct HasColumnsConstraint {
    columns: Vec<String>,
}

impl HasColumnsConstraint {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Constraint for HasColumnsConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "has_columns"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        let missing: Vec<&String> = self
            .columns
            .iter()
            .filter(|c| schema.index_of(c).is_err())
            .collect();
        if missing.is_empty() {
            return Ok(ConstraintResult::success());
        }
        let reporter =
            ViolationReporter::new(self.name()).max_rows(ctx.config().max_report_rows);
        Ok(reporter.fail_structural(format!(
            "Missing columns: {missing:?}, available columns: {:?}",
            schema.fields().iter().map(|f| f.name()).collect::<Vec<_>>()
        )))
    }

    fn name(&self) -> &str {
        "has_columns"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.columns.clone())
    }
}

/// Checks that named columns exist and have the expected Arrow types.
///
/// ```rust
/// use arrow::datatypes::DataType;
/// use term_contract::constraints::HasDtypesConstraint;
///
/// let constraint = HasDtypesConstraint::new()
///     .column("id", DataType::Int64)
///     .column("name", DataType::Utf8);
/// # let _ = constraint;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HasDtypesConstraint {
    expected: Vec<(String, DataType)>,
}

impl HasDtypesConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.expected.push((name.into(), data_type));
        self
    }
}

impl<S: Into<String>> FromIterator<(S, DataType)> for HasDtypesConstraint {
    fn from_iter<I: IntoIterator<Item = (S, DataType)>>(iter: I) -> Self {
        Self {
            expected: iter.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }
}

#[async_trait]
impl Constraint for HasDtypesConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "has_dtypes"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        let mut problems = Vec::new();
        for (name, expected) in &self.expected {
            match schema.field_with_name(name) {
                Err(_) => problems.push(format!("column {name:?} is missing")),
                Ok(field) if field.data_type() != expected => problems.push(format!(
                    "column {name:?} has type {}, expected {expected}",
                    field.data_type()
                )),
                Ok(_) => {}
            }
        }
        if problems.is_empty() {
            return Ok(ConstraintResult::success());
        }
        let reporter =
            ViolationReporter::new(self.name()).max_rows(ctx.config().max_report_rows);
        Ok(reporter.fail_structural(format!(
            "Some columns don't have the expected type:\n{}",
            problems.join("\n")
        )))
    }

    fn name(&self) -> &str {
        "has_dtypes"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.expected.iter().map(|(n, _)| n.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{batch, int_batch, int_values, planned};
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use std::sync::Arc;

    fn table() -> Table {
        let g: ArrayRef = Arc::new(StringArray::from(vec!["x", "x", "y"]));
        let a: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        Table::from_batch(batch(vec![("g", g), ("a", a)]))
    }

    #[tokio::test]
    async fn test_has_shape() -> Result<()> {
        table().check(&HasShapeConstraint::new(Some(3), Some(2))).await?;
        table().check(&HasShapeConstraint::new(None, Some(2))).await?;

        let err = table()
            .check(&HasShapeConstraint::new(Some(4), None))
            .await
            .unwrap_err();
        let v = err.violation().unwrap();
        assert_eq!(v.message(), "Table has 3 rows, expected 4");
        assert!(v.rows().is_empty());

        let err = table()
            .check(&HasShapeConstraint::new(None, Some(5)))
            .await
            .unwrap_err();
        assert_eq!(err.violation().unwrap().message(), "Table has 2 columns, expected 5");
        Ok(())
    }

    #[tokio::test]
    async fn test_has_shape_grouped() -> Result<()> {
        let err = table()
            .check(&HasShapeConstraint::new(Some(2), None).group_by("g"))
            .await
            .unwrap_err();
        let v = err.violation().unwrap();
        assert_eq!(v.rows().column_names(), vec!["g", "len"]);
        assert_eq!(int_values(v.rows(), "len"), vec![Some(1)]);

        let even = Table::from_batch(int_batch(&[
            ("g", vec![Some(1), Some(2), Some(1), Some(2)]),
        ]));
        even.check(&HasShapeConstraint::new(Some(2), None).group_by("g")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_has_shape_usage_errors() {
        let err = table().check(&HasShapeConstraint::new(None, None)).await.unwrap_err();
        assert!(err.is_usage_error());
        let err = table()
            .check(&HasShapeConstraint::new(None, Some(2)).group_by("g"))
            .await
            .unwrap_err();
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_has_columns() -> Result<()> {
        table().check(&HasColumnsConstraint::new(["a", "g"])).await?;
        let err = table()
            .check(&HasColumnsConstraint::new(["a", "z"]))
            .await
            .unwrap_err();
        let v = err.violation().unwrap();
        assert!(v.message().starts_with("Missing columns: [\"z\"]"));
        assert!(v.rows().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_has_dtypes() -> Result<()> {
        table()
            .check(&HasDtypesConstraint::from_iter([("a", DataType::Int64), ("g", DataType::Utf8)]))
            .await?;

        let err = table()
            .check(
                &HasDtypesConstraint::new()
                    .column("a", DataType::Utf8)
                    .column("missing", DataType::Int64),
            )
            .await
            .unwrap_err();
        let message = err.violation().unwrap().message().to_string();
        assert!(message.contains("column \"a\" has type Int64, expected Utf8"));
        assert!(message.contains("column \"missing\" is missing"));
        Ok(())
    }

    #[tokio::test]
    async fn test_schema_checks_on_planned_tables() -> Result<()> {
        let table = planned(int_batch(&[("a", vec![Some(1)])]))?;
        let table = table.check(&HasColumnsConstraint::new(["a"])).await?;
        let table = table
            .check(&HasDtypesConstraint::new().column("a", DataType::Int64))
            .await?;
        assert!(table.is_planned());
        Ok(())
    }
}
