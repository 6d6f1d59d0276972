//! Failure payloads.
//!
//! A [`Violation`] is what a failing check hands back: the offending rows (possibly
//! none, for structural checks), a diagnostic message, the check name and the time
//! of detection. [`ViolationReporter`] builds violations and applies the row cap.

use crate::core::{ConstraintResult, MaterializedTable};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

/// Evidence of a failed check.
#[derive(Debug, Clone)]
pub struct Violation {
    check: String,
    message: String,
    rows: MaterializedTable,
    total_rows: usize,
    detected_at: DateTime<Utc>,
}

impl Violation {
    pub fn new(
        check: impl Into<String>,
        message: impl Into<String>,
        rows: MaterializedTable,
    ) -> Self {
        let total_rows = rows.num_rows();
        Self {
            check: check.into(),
            message: message.into(),
            rows,
            total_rows,
            detected_at: Utc::now(),
        }
    }

    /// A violation without row-level evidence.
    pub fn without_rows(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(check, message, MaterializedTable::empty())
    }

    /// Name of the check that failed.
    pub fn check(&self) -> &str {
        &self.check
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Offending rows, empty when the failure is structural.
    pub fn rows(&self) -> &MaterializedTable {
        &self.rows
    }

    pub fn into_rows(self) -> MaterializedTable {
        self.rows
    }

    /// Number of offending rows before the report cap was applied.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// True when the attached rows are a prefix of the offending set.
    pub fn is_truncated(&self) -> bool {
        self.total_rows > self.rows.num_rows()
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Check '{}' failed", self.check)?;
        if self.rows.num_columns() > 0 {
            match self.rows.to_pretty_string() {
                Ok(table) => writeln!(f, "{table}")?,
                Err(e) => writeln!(f, "<rows could not be rendered: {e}>")?,
            }
            if self.is_truncated() {
                writeln!(
                    f,
                    "(showing {} of {} offending rows)",
                    self.rows.num_rows(),
                    self.total_rows
                )?;
            }
        }
        write!(f, "--> {}", self.message)
    }
}

/// Builds check results, capping the attached rows.
#[derive(Debug, Clone)]
pub struct ViolationReporter {
    check: String,
    max_rows: Option<usize>,
}

impl ViolationReporter {
    pub fn new(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            max_rows: None,
        }
    }

    pub fn max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Passes when `rows` is empty, fails with `message` otherwise.
    pub fn report(&self, rows: MaterializedTable, message: impl Into<String>) -> ConstraintResult {
        if rows.is_empty() {
            debug!(check = %self.check, "no offending rows");
            return ConstraintResult::success();
        }
        ConstraintResult::failure(self.violation(rows, message))
    }

    /// Fails unconditionally with `rows` as evidence.
    pub fn fail(&self, rows: MaterializedTable, message: impl Into<String>) -> ConstraintResult {
        ConstraintResult::failure(self.violation(rows, message))
    }

    /// Fails without row-level evidence.
    pub fn fail_structural(&self, message: impl Into<String>) -> ConstraintResult {
        ConstraintResult::failure(Violation::without_rows(self.check.clone(), message))
    }

    fn violation(&self, rows: MaterializedTable, message: impl Into<String>) -> Violation {
        let total_rows = rows.num_rows();
        let kept = match self.max_rows {
            Some(max) if total_rows > max => rows.head(max),
            _ => rows,
        };
        debug!(
            check = %self.check,
            offending_rows = total_rows,
            reported_rows = kept.num_rows(),
            "building violation"
        );
        let mut violation = Violation::new(self.check.clone(), message, kept);
        violation.total_rows = total_rows;
        violation
    }
}
