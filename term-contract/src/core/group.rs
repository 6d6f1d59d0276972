//! Grouped evaluation.
//!
//! Checks that accept a group key run the same query whether or not a key is given.
//!
//! - Window computations partition by [`GroupBy::partition_clause`]. Without a key
//!   they partition by the constant column [`IMPLICIT_GROUP_COLUMN`], which the base
//!   projection of such checks always adds, so the whole table is one group.
//! - Aggregate computations go through [`GroupEvaluator`], which groups by the
//!   (possibly empty) key list and emits one `UNION ALL` branch per checked column.

use crate::core::ResolvedColumn;
use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::datatypes::Schema;
use serde::{Deserialize, Serialize};

/// Constant column standing in for the group key of ungrouped window checks.
pub const IMPLICIT_GROUP_COLUMN: &str = "__term_group";

/// The optional grouping key of a check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBy(Vec<String>);

impl GroupBy {
    /// No key: the whole table is one group.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn is_grouped(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    /// Fails with a usage error when a key column is absent from the schema.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for column in &self.0 {
            if schema.index_of(column).is_err() {
                return Err(TermError::column_not_found(column.clone()));
            }
        }
        Ok(())
    }

    /// Quoted key columns, empty when ungrouped.
    pub fn key_columns(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|c| SqlSecurity::quote_identifier(c))
            .collect()
    }

    /// `PARTITION BY` clause for window functions.
    pub fn partition_clause(&self) -> String {
        let keys = if self.is_grouped() {
            self.key_columns()
        } else {
            vec![SqlSecurity::quote_identifier(IMPLICIT_GROUP_COLUMN)]
        };
        format!("PARTITION BY {}", keys.join(", "))
    }

    /// Projection item that adds the implicit group column.
    pub fn implicit_group_projection() -> String {
        format!("0 AS {}", SqlSecurity::quote_identifier(IMPLICIT_GROUP_COLUMN))
    }

    /// Leading `ORDER BY` terms for a sort by group, empty when ungrouped.
    pub fn order_prefix(&self) -> String {
        self.key_columns()
            .into_iter()
            .map(|key| format!("{key}, "))
            .collect()
    }
}

impl From<&str> for GroupBy {
    fn from(column: &str) -> Self {
        Self(vec![column.to_string()])
    }
}

impl From<String> for GroupBy {
    fn from(column: String) -> Self {
        Self(vec![column])
    }
}

impl From<Vec<&str>> for GroupBy {
    fn from(columns: Vec<&str>) -> Self {
        Self::columns(columns)
    }
}

impl From<Vec<String>> for GroupBy {
    fn from(columns: Vec<String>) -> Self {
        Self(columns)
    }
}

impl<const N: usize> From<[&str; N]> for GroupBy {
    fn from(columns: [&str; N]) -> Self {
        Self::columns(columns)
    }
}

impl<T: Into<GroupBy>> From<Option<T>> for GroupBy {
    fn from(group_by: Option<T>) -> Self {
        group_by.map(Into::into).unwrap_or_default()
    }
}

/// A named aggregate computed for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub alias: String,
    pub sql: String,
}

impl Measure {
    pub fn new(alias: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            sql: sql.into(),
        }
    }
}

/// One `UNION ALL` branch of a per-column aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Value of the `column` output column.
    pub label: String,
    pub measures: Vec<Measure>,
}

/// Compiles aggregate checks over the optional group key.
#[derive(Debug, Clone)]
pub struct GroupEvaluator<'a> {
    group_by: &'a GroupBy,
    source: &'a str,
}

impl<'a> GroupEvaluator<'a> {
    pub fn new(group_by: &'a GroupBy, source: &'a str) -> Self {
        Self { group_by, source }
    }

    fn group_clause(&self) -> String {
        if self.group_by.is_grouped() {
            format!(" GROUP BY {}", self.group_by.key_columns().join(", "))
        } else {
            String::new()
        }
    }

    fn key_projection(&self) -> String {
        self.group_by.order_prefix()
    }

    /// Drops columns that are part of the group key.
    pub fn without_keys(&self, columns: Vec<ResolvedColumn>) -> Vec<ResolvedColumn> {
        columns
            .into_iter()
            .filter(|column| column.index.is_none() || !self.group_by.contains(&column.label))
            .collect()
    }

    /// One row per (group, branch) with columns `<group keys>, column, <measures>`,
    /// filtered by `predicate` over the measure aliases.
    ///
    /// Returns `None` when there is nothing to compute.
    pub fn per_column(&self, branches: &[Branch], predicate: &str) -> Option<String> {
        if branches.is_empty() {
            return None;
        }
        let keys = self.key_projection();
        let group = self.group_clause();
        let selects: Vec<String> = branches
            .iter()
            .map(|branch| {
                let measures: Vec<String> = branch
                    .measures
                    .iter()
                    .map(|m| format!("{} AS {}", m.sql, SqlSecurity::quote_identifier(&m.alias)))
                    .collect();
                format!(
                    "SELECT {keys}{} AS \"column\", {} FROM {}{group}",
                    SqlSecurity::quote_literal(&branch.label),
                    measures.join(", "),
                    self.source
                )
            })
            .collect();

        Some(format!(
            "SELECT * FROM ({}) AS per_column WHERE {predicate} ORDER BY {}\"column\"",
            selects.join(" UNION ALL "),
            self.group_by.order_prefix()
        ))
    }

    /// One row per group with columns `<group keys>, <measures>`, filtered by
    /// `predicate`.
    pub fn per_group(&self, measures: &[Measure], predicate: &str) -> String {
        let projections: Vec<String> = self
            .group_by
            .key_columns()
            .into_iter()
            .chain(
                measures
                    .iter()
                    .map(|m| format!("{} AS {}", m.sql, SqlSecurity::quote_identifier(&m.alias))),
            )
            .collect();
        let order = if self.group_by.is_grouped() {
            format!(" ORDER BY {}", self.group_by.key_columns().join(", "))
        } else {
            String::new()
        };
        format!(
            "SELECT * FROM (SELECT {} FROM {}{}) AS per_group WHERE {predicate}{order}",
            projections.join(", "),
            self.source,
            self.group_clause()
        )
    }
}
