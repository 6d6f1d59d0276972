//! Core types: tables, check sessions, column selection, grouping, violations and
//! the [`Constraint`] trait.
//!
//! ```text
//! Table ──register──▶ TermContext (one DataFusion session per evaluation)
//!                          │
//! Constraint::evaluate ────┤ ColumnSpec::resolve  → quoted column SQL
//!                          │ GroupBy / GroupEvaluator → grouped SQL
//!                          │ query() → offending rows
//!                          ▼
//!                    ViolationReporter → ConstraintResult
//! ```
//!
//! [`Table::check`] turns a failed result into `Err(TermError::CheckFailed)` and a
//! passed one into the original table, so checks chain with `?`.

mod check;
mod column;
mod constraint;
mod context;
mod group;
mod interval;
mod level;
mod table;
mod time_step;
mod violation;

pub use check::{Check, CheckBuilder, CheckReport};
pub use column::{ColumnSpec, MissingColumns, ResolvedColumn};
pub use constraint::{Constraint, ConstraintMetadata, ConstraintResult, ConstraintStatus};
pub use context::{TermContext, TermContextConfig, DATA_TABLE, REFERENCE_TABLE};
pub use group::{Branch, GroupBy, GroupEvaluator, Measure, IMPLICIT_GROUP_COLUMN};
pub use interval::Closed;
pub use level::Level;
pub use table::{MaterializedTable, Table};
pub use time_step::{TimeStep, TimeUnit};
pub use violation::{Violation, ViolationReporter};
