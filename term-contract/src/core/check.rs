//! Ordered chains of constraints.
//!
//! A [`Check`] runs its constraints in order against one table. With
//! [`Level::Error`] the first failing constraint stops the chain and its violation is
//! returned; with lower levels failures are logged and the chain keeps going.
//!
//! ```rust
//! use term_contract::core::{Check, Level};
//! use term_contract::constraints::{HasColumnsConstraint, MonotonicConstraint};
//!
//! let check = Check::builder("orders")
//!     .level(Level::Error)
//!     .description("orders arrive sorted by time")
//!     .constraint(HasColumnsConstraint::new(["order_id", "created_at"]))
//!     .constraint(MonotonicConstraint::new("created_at").strict(false))
//!     .build();
//! assert_eq!(check.constraints().len(), 2);
//! ```

use super::{Constraint, Level, Table, TermContext, TermContextConfig, Violation};
use crate::constraints::{
    ColumnWithinStdConstraint, HasColumnsConstraint, MonotonicConstraint,
    MutuallyExclusiveRangesConstraint, NoNullsConstraint, UniqueConstraint,
};
use crate::core::ColumnSpec;
use crate::prelude::*;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A named, leveled chain of constraints.
#[derive(Debug, Clone)]
pub struct Check {
    name: String,
    level: Level,
    description: Option<String>,
    constraints: Vec<Arc<dyn Constraint>>,
    config: TermContextConfig,
}

/// Outcome of a non-blocking run.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub check: String,
    pub level: Level,
    /// Violations collected from failing constraints, in chain order.
    pub violations: Vec<Violation>,
    pub evaluated: usize,
}

impl CheckReport {
    pub fn is_success(&self) -> bool {
        self.violations.is_empty()
    }
}

impl Check {
    pub fn builder(name: impl Into<String>) -> CheckBuilder {
        CheckBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn constraints(&self) -> &[Arc<dyn Constraint>] {
        &self.constraints
    }

    /// Runs the chain and returns the table unchanged when nothing blocks it.
    #[instrument(skip(self, table), fields(check = %self.name, level = %self.level))]
    pub async fn run(&self, table: Table) -> Result<Table> {
        let report = self.evaluate_all(&table, self.level.is_blocking()).await?;
        match report.violations.into_iter().next() {
            Some(violation) if self.level.is_blocking() => Err(TermError::check_failed(violation)),
            _ => Ok(table),
        }
    }

    /// Evaluates every constraint and collects violations without failing.
    pub async fn report(&self, table: &Table) -> Result<CheckReport> {
        self.evaluate_all(table, false).await
    }

    async fn evaluate_all(&self, table: &Table, stop_on_failure: bool) -> Result<CheckReport> {
        let mut report = CheckReport {
            check: self.name.clone(),
            level: self.level,
            ..CheckReport::default()
        };
        for constraint in &self.constraints {
            let ctx = TermContext::with_config(self.config.clone())?;
            let result = constraint.evaluate(&ctx, table).await?;
            report.evaluated += 1;

            let Some(violation) = result.violation else {
                continue;
            };
            let columns = constraint.metadata().columns;
            match self.level {
                Level::Error => warn!(
                    constraint = constraint.name(),
                    ?columns,
                    message = violation.message(),
                    "constraint failed"
                ),
                Level::Warning => warn!(
                    constraint = constraint.name(),
                    ?columns,
                    message = violation.message(),
                    "constraint failed, continuing"
                ),
                Level::Info => info!(
                    constraint = constraint.name(),
                    ?columns,
                    message = violation.message(),
                    "constraint failed, continuing"
                ),
            }
            report.violations.push(violation);
            if stop_on_failure {
                break;
            }
        }
        Ok(report)
    }
}

/// Builder for [`Check`].
#[derive(Debug)]
pub struct CheckBuilder {
    name: String,
    level: Level,
    description: Option<String>,
    constraints: Vec<Arc<dyn Constraint>>,
    config: TermContextConfig,
}

impl CheckBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::default(),
            description: None,
            constraints: Vec::new(),
            config: TermContextConfig::default(),
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the session configuration used for each constraint.
    pub fn config(mut self, config: TermContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.constraints.push(Arc::new(constraint));
        self
    }

    pub fn constraints<I>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Constraint>>,
    {
        self.constraints.extend(constraints);
        self
    }

    pub fn has_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraint(HasColumnsConstraint::new(columns))
    }

    pub fn has_no_nulls(self, columns: impl Into<ColumnSpec>) -> Self {
        self.constraint(NoNullsConstraint::new(columns))
    }

    pub fn unique(self, columns: impl Into<ColumnSpec>) -> Self {
        self.constraint(UniqueConstraint::new(columns))
    }

    pub fn is_monotonic(self, column: impl Into<String>) -> Self {
        self.constraint(MonotonicConstraint::new(column))
    }

    pub fn mutually_exclusive_ranges(
        self,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        self.constraint(MutuallyExclusiveRangesConstraint::new(low, high))
    }

    pub fn column_is_within_n_std(self, column: impl Into<ColumnSpec>, n_std: f64) -> Self {
        self.constraint(ColumnWithinStdConstraint::new().column(column, n_std))
    }

    pub fn build(self) -> Check {
        Check {
            name: self.name,
            level: self.level,
            description: self.description,
            constraints: self.constraints,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::int_batch;

    fn table() -> Table {
        Table::from_batch(int_batch(&[
            ("a", vec![Some(1), Some(2), Some(1)]),
            ("b", vec![Some(1), None, Some(3)]),
        ]))
    }

    #[tokio::test]
    async fn test_error_level_stops_on_first_failure() -> Result<()> {
        let check = Check::builder("chain")
            .has_columns(["a", "b"])
            .is_monotonic("a")
            .has_no_nulls("b")
            .build();

        let err = check.run(table()).await.unwrap_err();
        let violation = err.violation().unwrap();
        assert_eq!(violation.check(), "is_monotonic");
        Ok(())
    }

    #[tokio::test]
    async fn test_warning_level_passes_table_through() -> Result<()> {
        let check = Check::builder("soft")
            .level(Level::Warning)
            .is_monotonic("a")
            .has_no_nulls("b")
            .build();

        let input = table();
        let output = check.run(input.clone()).await?;
        assert_eq!(output.as_materialized(), input.as_materialized());

        let report = check.report(&input).await?;
        assert_eq!(report.evaluated, 2);
        let names: Vec<&str> = report.violations.iter().map(|v| v.check()).collect();
        assert_eq!(names, vec!["is_monotonic", "has_no_nulls"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_usage_errors_propagate_at_any_level() {
        let check = Check::builder("bad")
            .level(Level::Info)
            .is_monotonic("missing")
            .build();
        let err = check.run(table()).await.unwrap_err();
        assert!(err.is_usage_error());
    }
}
