//! # term-contract
//!
//! Contract checks for tabular data flowing through a pipeline. A check takes a
//! table, verifies an invariant and either hands the table back unchanged or fails
//! with the offending rows and a diagnostic message. Tables are Arrow record batches
//! or lazily planned DataFusion data frames; checks run as SQL in a private
//! DataFusion session.
//!
//! ## Quick Start
//!
//! ```rust
//! use term_contract::prelude::*;
//! use term_contract::constraints::{MonotonicConstraint, MutuallyExclusiveRangesConstraint};
//! use arrow::array::Int64Array;
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let batch = RecordBatch::try_from_iter(vec![
//!     ("start", Arc::new(Int64Array::from(vec![10, 30, 20])) as _),
//!     ("end", Arc::new(Int64Array::from(vec![15, 35, 25])) as _),
//! ])?;
//!
//! let result = Table::from_batch(batch)
//!     .check(&MutuallyExclusiveRangesConstraint::new("start", "end"))
//!     .await?
//!     .check(&MonotonicConstraint::new("start"))
//!     .await;
//!
//! match result {
//!     Ok(table) => println!("contract holds for {} columns", table.schema().fields().len()),
//!     Err(TermError::CheckFailed(violation)) => println!("{violation}"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The second check fails: `start` is `[10, 30, 20]`. The error displays the offending
//! rows followed by the message:
//!
//! ```text
//! Check 'is_monotonic' failed
//! +-------+-----+
//! | start | end |
//! +-------+-----+
//! | 30    | 35  |
//! | 20    | 25  |
//! +-------+-----+
//! --> Column "start" expected to be monotonic but is not, try sorting by "start"
//! ```
//!
//! ## Checks
//!
//! Every check accepts its columns as a [`ColumnSpec`](core::ColumnSpec) (all
//! columns, names, Arrow types or a SQL expression) and many take an optional
//! [`GroupBy`](core::GroupBy). Grouped and ungrouped checks share one code path, so a
//! grouping with a single group behaves exactly like no grouping.
//!
//! See [`constraints`] for the full list and [`checks`] for one-call functions.
//!
//! ## Chains and reports
//!
//! [`Check`](core::Check) runs several constraints in order. At
//! [`Level::Error`](core::Level) it stops at the first failure; at lower levels it
//! logs failures and lets the table through. [`formatters`] renders violations as
//! text or JSON.
//!
//! ## Logging
//!
//! Checks emit `tracing` spans and events. Install a subscriber with
//! [`logging::setup::init_logging`] or your own.
//!
//! ## Errors
//!
//! All fallible operations return [`TermError`](error::TermError). Data failures are
//! [`TermError::CheckFailed`](error::TermError::CheckFailed); wrong parameters
//! (unknown columns, bad bounds, unsafe SQL) are usage errors raised before any
//! data is scanned.

pub mod checks;
pub mod constraints;
pub mod core;
pub mod error;
pub mod formatters;
pub mod logging;
pub mod prelude;
pub mod security;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
