//! Tables handed to checks.
//!
//! A [`Table`] is either materialized (Arrow record batches already in memory) or
//! planned (a DataFusion [`DataFrame`] evaluated on demand). Checks see both forms
//! through the same table provider, so the SQL they compile is identical and only the
//! moment the input is realized differs.

use crate::core::Constraint;
use crate::prelude::*;
use arrow::array::ArrayRef;
use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::prelude::DataFrame;
use std::sync::Arc;

/// An in-memory table: a schema and the record batches that share it.
///
/// Two materialized tables are equal when they have the same schema and the same
/// rows, however the rows are split into batches.
#[derive(Debug, Clone)]
pub struct MaterializedTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl PartialEq for MaterializedTable {
    fn eq(&self, other: &Self) -> bool {
        if self.schema != other.schema || self.num_rows() != other.num_rows() {
            return false;
        }
        if self.batches == other.batches {
            return true;
        }
        match (self.concat(), other.concat()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }
}

impl MaterializedTable {
    /// Creates a table, checking that every batch fits the schema.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if !schema.contains(&batch.schema()) {
                return Err(TermError::invalid_argument(format!(
                    "record batch schema {:?} does not match table schema {:?}",
                    batch.schema(),
                    schema
                )));
            }
        }
        Ok(Self { schema, batches })
    }

    /// Wraps query output. The engine guarantees that batches share the schema.
    pub(crate) fn from_parts(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let schema = batches.first().map(|b| b.schema()).unwrap_or(schema);
        Self { schema, batches }
    }

    /// Creates a table from a single batch.
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::empty_with_schema(Arc::new(Schema::empty()))
    }

    /// A table with the given schema and no rows.
    pub fn empty_with_schema(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    /// Concatenates all batches into one.
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Returns the named column of the concatenated table.
    pub fn column_by_name(&self, name: &str) -> Result<ArrayRef> {
        let batch = self.concat()?;
        batch
            .column_by_name(name)
            .cloned()
            .ok_or_else(|| TermError::column_not_found(name))
    }

    /// Keeps the columns at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        let schema = Arc::new(self.schema.project(indices)?);
        let batches = self
            .batches
            .iter()
            .map(|batch| batch.project(indices))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { schema, batches })
    }

    /// Removes the named columns, ignoring names that are absent.
    pub fn drop_columns(&self, names: &[&str]) -> Result<Self> {
        let keep: Vec<usize> = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| !names.contains(&field.name().as_str()))
            .map(|(i, _)| i)
            .collect();
        self.project(&keep)
    }

    /// Renames the column at `index`.
    pub fn rename_column(&self, index: usize, name: &str) -> Result<Self> {
        let fields: Vec<Field> = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if i == index {
                    field.as_ref().clone().with_name(name)
                } else {
                    field.as_ref().clone()
                }
            })
            .collect();
        let schema = Arc::new(Schema::new_with_metadata(fields, self.schema.metadata().clone()));
        let batches = self
            .batches
            .iter()
            .map(|batch| RecordBatch::try_new(schema.clone(), batch.columns().to_vec()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { schema, batches })
    }

    /// Keeps at most the first `limit` rows.
    pub fn head(&self, limit: usize) -> Self {
        let mut remaining = limit;
        let mut batches = Vec::new();
        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            batches.push(batch.slice(0, take));
            remaining -= take;
        }
        Self {
            schema: self.schema.clone(),
            batches,
        }
    }

    /// Renders the table with Arrow's pretty printer.
    pub fn to_pretty_string(&self) -> Result<String> {
        Ok(pretty_format_batches(&self.batches)?.to_string())
    }
}

/// A table passed to a check.
#[derive(Debug, Clone)]
pub enum Table {
    /// Record batches already in memory.
    Materialized(MaterializedTable),
    /// A DataFusion plan, realized when a check needs its rows.
    Planned(DataFrame),
}

impl Table {
    /// Creates a materialized table from a single batch.
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self::Materialized(MaterializedTable::from_batch(batch))
    }

    /// Creates a materialized table from batches sharing `schema`.
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        Ok(Self::Materialized(MaterializedTable::try_new(
            schema, batches,
        )?))
    }

    /// Creates a planned table.
    pub fn planned(df: DataFrame) -> Self {
        Self::Planned(df)
    }

    /// The schema of the table. Never realizes a planned table.
    pub fn schema(&self) -> SchemaRef {
        match self {
            Self::Materialized(table) => table.schema(),
            Self::Planned(df) => df.schema().inner().clone(),
        }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self, Self::Planned(_))
    }

    pub fn as_materialized(&self) -> Option<&MaterializedTable> {
        match self {
            Self::Materialized(table) => Some(table),
            Self::Planned(_) => None,
        }
    }

    /// Realizes the table.
    pub async fn collect(self) -> Result<MaterializedTable> {
        match self {
            Self::Materialized(table) => Ok(table),
            Self::Planned(df) => {
                let schema = df.schema().inner().clone();
                let batches = df.collect().await?;
                Ok(MaterializedTable::from_parts(schema, batches))
            }
        }
    }

    /// Runs a constraint in a fresh session and returns the table unchanged on success.
    ///
    /// ```rust
    /// use term_contract::prelude::*;
    /// use term_contract::constraints::MonotonicConstraint;
    /// use arrow::array::Int64Array;
    /// use arrow::record_batch::RecordBatch;
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> Result<()> {
    /// let batch = RecordBatch::try_from_iter(vec![(
    ///     "a",
    ///     Arc::new(Int64Array::from(vec![1, 2, 3])) as _,
    /// )])?;
    /// let table = Table::from_batch(batch)
    ///     .check(&MonotonicConstraint::new("a"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn check<C>(self, constraint: &C) -> Result<Self>
    where
        C: Constraint + ?Sized,
    {
        let ctx = TermContext::new()?;
        self.check_in(&ctx, constraint).await
    }

    /// Runs a constraint in the given session.
    pub async fn check_in<C>(self, ctx: &TermContext, constraint: &C) -> Result<Self>
    where
        C: Constraint + ?Sized,
    {
        let result = constraint.evaluate(ctx, &self).await?;
        match result.violation {
            Some(violation) if result.status.is_failure() => {
                crate::log_violation!(ctx.config().log, violation.check(), violation.message());
                Err(TermError::check_failed(violation))
            }
            _ => Ok(self),
        }
    }

    /// Builds the table provider a check session registers this table under.
    pub(crate) fn table_provider(&self) -> Result<Arc<dyn TableProvider>> {
        match self {
            Self::Materialized(table) => Ok(Arc::new(MemTable::try_new(
                table.schema(),
                vec![table.batches().to_vec()],
            )?)),
            Self::Planned(df) => Ok(df.clone().into_view()),
        }
    }
}

impl From<RecordBatch> for Table {
    fn from(batch: RecordBatch) -> Self {
        Self::from_batch(batch)
    }
}

impl From<MaterializedTable> for Table {
    fn from(table: MaterializedTable) -> Self {
        Self::Materialized(table)
    }
}

impl From<DataFrame> for Table {
    fn from(df: DataFrame) -> Self {
        Self::Planned(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{int_batch, planned};

    #[test]
    fn test_materialized_helpers() -> Result<()> {
        let table = MaterializedTable::from_batch(int_batch(&[
            ("a", vec![Some(1), Some(2), Some(3)]),
            ("b", vec![Some(4), None, Some(6)]),
        ]));
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.column_names(), vec!["a", "b"]);

        let projected = table.project(&[1])?;
        assert_eq!(projected.column_names(), vec!["b"]);

        let renamed = table.rename_column(0, "x")?;
        assert_eq!(renamed.column_names(), vec!["x", "b"]);
        assert_eq!(renamed.num_rows(), 3);

        assert_eq!(table.head(2).num_rows(), 2);
        assert_eq!(table.head(10).num_rows(), 3);
        assert!(table.to_pretty_string()?.contains("| a |"));
        Ok(())
    }

    #[test]
    fn test_try_new_rejects_foreign_batches() {
        let a = int_batch(&[("a", vec![Some(1)])]);
        let b = int_batch(&[("b", vec![Some(1)])]);
        assert!(MaterializedTable::try_new(a.schema(), vec![a.clone()]).is_ok());
        assert!(MaterializedTable::try_new(a.schema(), vec![b]).is_err());
    }

    #[test]
    fn test_equality_ignores_batch_boundaries() -> Result<()> {
        let whole = int_batch(&[("a", vec![Some(1), Some(2), Some(3)])]);
        let split = MaterializedTable::try_new(
            whole.schema(),
            vec![whole.slice(0, 1), whole.slice(1, 2)],
        )?;
        assert_eq!(split, MaterializedTable::from_batch(whole.clone()));
        assert_ne!(split, MaterializedTable::from_batch(whole.slice(0, 2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_planned_schema_and_collect() -> Result<()> {
        let batch = int_batch(&[("a", vec![Some(1), Some(2)])]);
        let table = planned(batch.clone())?;
        assert!(table.is_planned());
        assert_eq!(table.schema().field(0).name(), "a");

        let collected = table.collect().await?;
        assert_eq!(collected.num_rows(), 2);
        assert_eq!(collected.concat()?.column(0), batch.column(0));
        Ok(())
    }
}
