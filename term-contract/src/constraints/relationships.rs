//! Referential set comparison between two tables.
//!
//! [`MaintainsRelationshipsConstraint`] compares the distinct key tuples of the
//! checked table with those of a reference table. Keys present only in the checked
//! table were *added*, keys present only in the reference were *removed*. Both tables
//! are registered in the same session and compared with one full outer join using
//! null-safe equality, so a null key matches a null key.
//!
//! ```rust,no_run
//! use term_contract::prelude::*;
//! use term_contract::constraints::MaintainsRelationshipsConstraint;
//!
//! # async fn example(orders: Table, customers: Table) -> Result<()> {
//! let orders = orders
//!     .check(&MaintainsRelationshipsConstraint::new(customers, ["customer_id"]))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::core::{
    Constraint, ConstraintMetadata, ConstraintResult, MaterializedTable, Table, TermContext,
    ViolationReporter, DATA_TABLE, REFERENCE_TABLE,
};
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::array::AsArray;
use arrow::compute::{filter_record_batch, not};
use async_trait::async_trait;
use tracing::{debug, instrument};

const CURRENT_MARK: &str = "__term_in_current";
const REFERENCE_MARK: &str = "__term_in_reference";
const ADDED: &str = "__term_added";

/// Default number of mismatching keys attached to a violation.
pub const DEFAULT_MAX_REPORTED: usize = 200;

/// Checks that the checked table has exactly the key tuples of a reference table.
#[derive(Debug, Clone)]
pub struct MaintainsRelationshipsConstraint {
    reference: Table,
    keys: Vec<String>,
    max_reported: usize,
}

impl MaintainsRelationshipsConstraint {
    pub fn new<I, S>(reference: Table, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reference,
            keys: keys.into_iter().map(Into::into).collect(),
            max_reported: DEFAULT_MAX_REPORTED,
        }
    }

    /// Caps the number of mismatching keys fetched from the engine.
    pub fn max_reported(mut self, max_reported: usize) -> Self {
        self.max_reported = max_reported;
        self
    }

    fn current_alias(i: usize) -> String {
        format!("\"__term_cur_{i}\"")
    }

    fn reference_alias(i: usize) -> String {
        format!("\"__term_ref_{i}\"")
    }

    fn build_query(&self) -> String {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|k| SqlSecurity::quote_identifier(k))
            .collect();
        let key_list = keys.join(", ");
        let on: Vec<String> = keys
            .iter()
            .map(|k| format!("c.{k} IS NOT DISTINCT FROM r.{k}"))
            .collect();
        let current_columns: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("c.{k} AS {}", Self::current_alias(i)))
            .collect();
        let reference_columns: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("r.{k} AS {}", Self::reference_alias(i)))
            .collect();
        let order: Vec<String> = (0..keys.len())
            .map(Self::current_alias)
            .chain((0..keys.len()).map(Self::reference_alias))
            .collect();

        format!(
            "WITH cur_keys AS (\
                SELECT DISTINCT {key_list}, TRUE AS \"{CURRENT_MARK}\" FROM {DATA_TABLE}\
             ), ref_keys AS (\
                SELECT DISTINCT {key_list}, TRUE AS \"{REFERENCE_MARK}\" FROM {REFERENCE_TABLE}\
             ) \
             SELECT {}, {}, r.\"{REFERENCE_MARK}\" IS NULL AS \"{ADDED}\" \
             FROM cur_keys c FULL OUTER JOIN ref_keys r ON {} \
             WHERE c.\"{CURRENT_MARK}\" IS NULL OR r.\"{REFERENCE_MARK}\" IS NULL \
             ORDER BY \"{ADDED}\" DESC, {} \
             LIMIT {}",
            current_columns.join(", "),
            reference_columns.join(", "),
            on.join(" AND "),
            order.join(", "),
            self.max_reported
        )
    }

    /// Splits the mismatch rows into added keys and removed keys, each named after
    /// the key columns.
    fn split(&self, rows: &MaterializedTable) -> Result<(MaterializedTable, MaterializedTable)> {
        let n = self.keys.len();
        let batch = rows.concat()?;
        let added_flags = batch
            .column(2 * n)
            .as_boolean_opt()
            .ok_or_else(|| TermError::constraint_evaluation(self.name(), "added flag is not boolean"))?
            .clone();
        let removed_flags = not(&added_flags)?;

        let side = |flags: &arrow::array::BooleanArray, offset: usize| -> Result<MaterializedTable> {
            let filtered = filter_record_batch(&batch, flags)?;
            let indices: Vec<usize> = (offset..offset + n).collect();
            let mut table = MaterializedTable::from_batch(filtered).project(&indices)?;
            for (i, key) in self.keys.iter().enumerate() {
                table = table.rename_column(i, key)?;
            }
            Ok(table)
        };

        Ok((side(&added_flags, 0)?, side(&removed_flags, n)?))
    }
}

#[async_trait]
impl Constraint for MaintainsRelationshipsConstraint {
    #[instrument(skip(self, ctx, table), fields(constraint = "maintains_relationships", keys = ?self.keys))]
    async fn evaluate(&self, ctx: &TermContext, table: &Table) -> Result<ConstraintResult> {
        if self.keys.is_empty() {
            return Err(TermError::invalid_argument(
                "maintains_relationships needs at least one key column",
            ));
        }
        for (side, schema) in [("table", table.schema()), ("reference", self.reference.schema())] {
            for key in &self.keys {
                if schema.index_of(key).is_err() {
                    debug!(side, key = %key, "key column missing");
                    return Err(TermError::column_not_found(key.clone()));
                }
            }
        }

        ctx.register_data(table)?;
        ctx.register(REFERENCE_TABLE, &self.reference)?;
        let rows = ctx.query(&self.build_query()).await?;
        let reporter =
            ViolationReporter::new(self.name()).max_rows(ctx.config().max_report_rows);
        if rows.is_empty() {
            return Ok(ConstraintResult::success());
        }

        let (added, removed) = self.split(&rows)?;
        debug!(added = added.num_rows(), removed = removed.num_rows(), "key sets differ");
        let (offending, verb) = if !added.is_empty() {
            (added, "added to")
        } else {
            (removed, "removed from")
        };
        let message = format!(
            "Some values were {verb} col(s) {:?}, see above!",
            self.keys
        );
        Ok(reporter.fail(offending, message))
    }

    fn name(&self) -> &str {
        "maintains_relationships"
    }

    fn metadata(&self) -> ConstraintMetadata {
        ConstraintMetadata::for_columns(self.keys.clone())
            .with_custom("max_reported", self.max_reported.to_string())
    }
}
