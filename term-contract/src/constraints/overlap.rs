//! Interval overlap detection.
//!
//! Each row carries an interval `(low, high)`. After sorting by group, `low` and
//! `high`, a row overlaps when its `low` reaches the largest `high` seen so far in its
//! group. Comparing with the running maximum rather than only the predecessor also
//! catches an interval nested in an earlier, longer one.

use crate::core::{
    Closed, Constraint, ConstraintMetadata, ConstraintResult, GroupBy, Table, TermContext,
    ViolationReporter, DATA_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::datatypes::Schema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const INDEX: &str = "__term_index";
const OVERLAP: &str = "__term_overlap";
const NEXT_OVERLAP: &str = "__term_next_overlap";

/// Checks that the `[low, high]` intervals of a table are pairwise disjoint within
/// each group.
///
/// The offending rows are reported with an `index` column giving their position in
/// the sorted table. Every overlapping row is reported with its predecessor.
///
/// ```rust
/// use term_contract::constraints::MutuallyExclusiveRangesConstraint;
/// use term_contract::core::Closed;
///
/// let bookings = MutuallyExclusiveRangesConstraint::new("start", "end")
///     .group_by("room")
///     .closed(Closed::Left);
/// # let _ = bookings;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutuallyExclusiveRangesConstraint {
    low: String,
    high: String,
    group_by: GroupBy,
    closed: Closed,
}

impl MutuallyExclusiveRangesConstraint {
    pub fn new(low: impl Into<String>, high: impl Into<String>) -> Self {
        Self {
            low: low.into(),
            high: high.into(),
            group_by: GroupBy::none(),
            closed: Closed::Both,
        }
    }

    pub fn group_by(mut self, group_by: impl Into<GroupBy>) -> Self {
        self.group_by = group_by.into();
        self
    }

    /// Closure of the intervals. Touching endpoints only overlap with [`Closed::Both`].
    pub fn closed(mut self, closed: Closed) -> Self {
        self.closed = closed;
        self
    }

    /// `index`, or `__index` when the table already has an `index` column.
    fn index_label(schema: &Schema) -> &'static str {
        if schema.index_of("index").is_ok() {
            "__index"
        } else {
            "index"
        }
    }

    fn build_query(&self, schema: &Schema) -> String {
        let low = SqlSecurity::quote_identifier(&self.low);
        let high = SqlSecurity::quote_identifier(&self.high);
        let sort = format!("{}{low}, {high}", self.group_by.order_prefix());
        let window = format!("{} ORDER BY \"{INDEX}\"", self.group_by.partition_clause());
        let op = self.closed.overlap_op();
        let originals: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| SqlSecurity::quote_identifier(f.name()))
            .collect();

        format!(
            "WITH sorted AS (\
                SELECT *, CAST(ROW_NUMBER() OVER (ORDER BY {sort}) AS BIGINT) - 1 AS \"{INDEX}\", {group} FROM {DATA_TABLE}\
             ), flagged AS (\
                SELECT *, COALESCE({low} {op} MAX({high}) OVER ({window} \
                    ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING), FALSE) AS \"{OVERLAP}\" \
                FROM sorted\
             ), paired AS (\
                SELECT *, COALESCE(LEAD(\"{OVERLAP}\") OVER ({window}), FALSE) AS \"{NEXT_OVERLAP}\" \
                FROM flagged\
             ) \
             SELECT \"{INDEX}\" AS {index}, {originals} FROM paired \
             WHERE \"{OVERLAP}\" OR \"{NEXT_OVERLAP}\" \
             ORDER BY \"{INDEX}\"",
            group = GroupBy::implicit_group_projection(),
            index = SqlSecurity::quote_identifier(Self::index_label(schema)),
            originals = originals.join(", "),
        )
    }
}

#[async_trait]
impl Constraint for MutuallyExclusiveRangesConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "mutually_exclusive_ranges"))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        let schema = table.schema();
        for column in [&self.low, &self.high] {
            if schema.index_of(column).is_err() {
                return Err(TermError::column_not_found(column.clone()));
            }
        }
        self.group_by.validate(&schema)?;

        let sql = self.build_query(&schema);
        ctx.register_data(table)?;
        let rows = ctx.query(&sql).await?;
        debug!(offending_rows = rows.num_rows(), "overlap scan finished");

        let mut sorted_by: Vec<&str> = self.group_by.names().iter().map(String::as_str).collect();
        sorted_by.extend([self.low.as_str(), self.high.as_str()]);
        let message = format!(
            "There were overlapping intervals:\n\
             Table was sorted by: {sorted_by:?},\n\
             Interval columns: low_bound={:?}, high_bound={:?}, closed={}",
            self.low, self.high, self.closed
        );
        Ok(ViolationReporter::new(self.name())
            .max_rows(ctx.config().max_report_rows)
            .report(rows, message))
    }

    fn name(&self) -> &str {
        "mutually_exclusive_ranges"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns([self.low.clone(), self.high.clone()])
            .with_custom("closed", self.closed.to_string())
    }
}
