//! Value-set and value-range checks.
//!
//! Parameters are given as Arrow [`ScalarValue`]s and rendered to SQL literals with
//! [`SqlSecurity::literal`], so user values never reach the query unescaped. Nulls in
//! a checked column are left alone unless null itself is one of the listed values.

use crate::core::{
    Branch, Closed, Constraint, ConstraintMetadata, ConstraintResult, GroupBy, GroupEvaluator,
    MaterializedTable, Measure, Table, TermContext, ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::array::AsArray;
use arrow::datatypes::Schema;
use async_trait::async_trait;
use datafusion::scalar::ScalarValue;
use tracing::{debug, instrument};

type ValueSets = Vec<(String, Vec<ScalarValue>)>;

fn push_values<I, V>(sets: &mut ValueSets, column: impl Into<String>, values: I)
where
    I: IntoIterator<Item = V>,
    V: Into<ScalarValue>,
{
    sets.push((column.into(), values.into_iter().map(Into::into).collect()));
}

fn require_columns<'a>(schema: &Schema, columns: impl IntoIterator<Item = &'a String>) -> Result<()> {
    for column in columns {
        if schema.index_of(column).is_err() {
            return Err(TermError::column_not_found(column.clone()));
        }
    }
    Ok(())
}

/// SQL predicate that is true when `column` equals one of `values`, never null.
fn membership(column: &str, values: &[ScalarValue]) -> Result<String> {
    let literals = values
        .iter()
        .filter(|v| !v.is_null())
        .map(SqlSecurity::literal)
        .collect::<Result<Vec<_>>>()?;
    let mut parts = Vec::new();
    if !literals.is_empty() {
        parts.push(format!("COALESCE({column} IN ({}), FALSE)", literals.join(", ")));
    }
    if values.iter().any(ScalarValue::is_null) {
        parts.push(format!("{column} IS NULL"));
    }
    if parts.is_empty() {
        return Ok("FALSE".to_string());
    }
    Ok(format!("({})", parts.join(" OR ")))
}

/// Runs one flag per value set and returns the flagged rows projected onto the
/// columns that raised at least one flag.
async fn flagged_columns(
    ctx: &TermContext,
    table: &Table,
    sets: &ValueSets,
    flag: impl Fn(&str, &[ScalarValue]) -> Result<String>,
) -> Result<MaterializedTable> {
    let mut flags = Vec::with_capacity(sets.len());
    for (i, (column, values)) in sets.iter().enumerate() {
        let sql = flag(&SqlSecurity::quote_identifier(column), values)?;
        flags.push(format!("{sql} AS \"__term_bad_{i}\""));
    }
    let any: Vec<String> = (0..sets.len()).map(|i| format!("\"__term_bad_{i}\"")).collect();
    let sql = format!(
        "SELECT * FROM (SELECT *, {} FROM {DATA_TABLE}) AS flagged WHERE {}",
        flags.join(", "),
        any.join(" OR ")
    );

    ctx.register_data(table)?;
    let rows = ctx.query(&sql).await?;
    if rows.is_empty() {
        return Ok(rows);
    }

    let batch = rows.concat()?;
    let mut offending: Vec<usize> = Vec::new();
    for (i, (column, _)) in sets.iter().enumerate() {
        let raised = batch
            .column_by_name(&format!("__term_bad_{i}"))
            .and_then(|flags| flags.as_boolean_opt().map(|f| f.true_count() > 0))
            .unwrap_or(false);
        let index = rows.schema().index_of(column)?;
        if raised && !offending.contains(&index) {
            offending.push(index);
        }
    }
    rows.project(&offending)
}

/// Checks that columns only hold values from an allowed list.
///
/// Failures show the offending rows restricted to the columns holding a value
/// outside its list.
///
/// ```rust
/// use term_contract::constraints::AcceptedValuesConstraint;
///
/// let constraint = AcceptedValuesConstraint::new()
///     .column("status", ["active", "inactive"])
///     .column("tier", [1i64, 2, 3]);
/// # let _ = constraint;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptedValuesConstraint {
    sets: ValueSets,
}

impl AcceptedValuesConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        push_values(&mut self.sets, column, values);
        self
    }
}

#[async_trait]
impl Constraint for AcceptedValuesConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "accepted_values"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        require_columns(&table.schema(), self.sets.iter().map(|(c, _)| c))?;
        if self.sets.is_empty() {
            return Ok(ConstraintResult::success());
        }
        let rows = flagged_columns(ctx, table, &self.sets, |column, values| {
            Ok(format!("({column} IS NOT NULL AND NOT {})", membership(column, values)?))
        })
        .await?;
        debug!(offending = rows.num_rows(), "accepted values evaluated");
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(
                rows,
                "It contains values that have not been white-listed.\nShowing problematic columns only.",
            ))
    }

    fn name(&self) -> &str {
        "accepted_values"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.sets.iter().map(|(c, _)| c.clone()))
    }
}

/// Checks that columns never hold a forbidden value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotAcceptedValuesConstraint {
    sets: ValueSets,
}

impl NotAcceptedValuesConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        push_values(&mut self.sets, column, values);
        self
    }
}

#[async_trait]
impl Constraint for NotAcceptedValuesConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "not_accepted_values"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        require_columns(&table.schema(), self.sets.iter().map(|(c, _)| c))?;
        if self.sets.is_empty() {
            return Ok(ConstraintResult::success());
        }
        let rows = flagged_columns(ctx, table, &self.sets, membership).await?;
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, "This table contains values marked as forbidden"))
    }

    fn name(&self) -> &str {
        "not_accepted_values"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.sets.iter().map(|(c, _)| c.clone()))
    }
}

/// Checks that each listed value occurs at least once in its column, optionally in
/// every group.
///
/// Failures report `(group.., column, value)` for each missing value, the value
/// rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MandatoryValuesConstraint {
    sets: ValueSets,
    group_by: GroupBy,
}

impl MandatoryValuesConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarValue>,
    {
        push_values(&mut self.sets, column, values);
        self
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }
}

#[async_trait]
impl Constraint for MandatoryValuesConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "has_mandatory_values"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        require_columns(&schema, self.sets.iter().map(|(c, _)| c))?;
        self.group_by.validate(&schema)?;

        let mut branches = Vec::new();
        for (column, values) in &self.sets {
            let quoted = SqlSecurity::quote_identifier(column);
            for value in values {
                let matches = if value.is_null() {
                    format!("{quoted} IS NULL")
                } else {
                    format!("{quoted} = {}", SqlSecurity::literal(value)?)
                };
                let shown = if value.is_null() { "null".to_string() } else { value.to_string() };
                branches.push(Branch {
                    label: column.clone(),
                    measures: vec![
                        Measure::new("value", SqlSecurity::quote_literal(&shown)),
                        Measure::new(
                            "__term_occurrences",
                            format!("COUNT(CASE WHEN {matches} THEN 1 END)"),
                        ),
                    ],
                });
            }
        }
        let evaluator = GroupEvaluator::new(&self.group_by, DATA_TABLE);
        let Some(sql) = evaluator.per_column(&branches, "\"__term_occurrences\" = 0") else {
            return Ok(ConstraintResult::success());
        };

        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?.drop_columns(&["__term_occurrences"])?;
        let message = if self.group_by.is_grouped() {
            "Some groups are missing mandatory values"
        } else {
            "Some mandatory values are missing, see above"
        };
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, message))
    }

    fn name(&self) -> &str {
        "has_mandatory_values"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.sets.iter().map(|(c, _)| c.clone()))
            .with_custom("group_by", self.group_by.names().join(","))
    }
}

/// Checks that values lie within `[low, high]` under a closure.
///
/// ```rust
/// use term_contract::constraints::AcceptedRangeConstraint;
/// use term_contract::core::Closed;
///
/// let constraint = AcceptedRangeConstraint::new()
///     .column("age", 0i64, 130i64)
///     .column_closed("grade", "a", "f", Closed::Left);
/// # let _ = constraint;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptedRangeConstraint {
    ranges: Vec<(String, ScalarValue, ScalarValue, Closed)>,
}

impl AcceptedRangeConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range including both bounds.
    pub fn column(
        self,
        column: impl Into<String>,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
    ) -> Self {
        self.column_closed(column, low, high, Closed::Both)
    }

    pub fn column_closed(
        mut self,
        column: impl Into<String>,
        low: impl Into<ScalarValue>,
        high: impl Into<ScalarValue>,
        closed: Closed,
    ) -> Self {
        self.ranges
            .push((column.into(), low.into(), high.into(), closed));
        self
    }
}

#[async_trait]
impl Constraint for AcceptedRangeConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "accepted_range"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        require_columns(&table.schema(), self.ranges.iter().map(|(c, ..)| c))?;
        let mut outside = Vec::with_capacity(self.ranges.len());
        for (column, low, high, closed) in &self.ranges {
            if low.is_null() || high.is_null() {
                return Err(TermError::invalid_argument(format!(
                    "range bounds of {column:?} must not be null"
                )));
            }
            let quoted = SqlSecurity::quote_identifier(column);
            let inside = closed.contains_sql(
                &quoted,
                &SqlSecurity::literal(low)?,
                &SqlSecurity::literal(high)?,
            );
            outside.push(format!("({quoted} IS NOT NULL AND NOT {inside})"));
        }
        if outside.is_empty() {
            return Ok(ConstraintResult::success());
        }

        ctx.register_data(table)?;
        let sql = format!("SELECT * FROM {DATA_TABLE} WHERE {}", outside.join(" OR "));
        let rows = ctx.query(&sql).await?;
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, "Some values are beyond the acceptable ranges defined"))
    }

    fn name(&self) -> &str {
        "accepted_range"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.ranges.iter().map(|(c, ..)| c.clone()))
    }
}
