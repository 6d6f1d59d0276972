//! Built-in checks.
//!
//! Every check implements [`Constraint`](crate::core::Constraint): it compiles its
//! whole condition into one SQL query over the registered table, realizes the
//! result once and turns the offending rows into a
//! [`Violation`](crate::core::Violation).
//!
//! ## Sequence and interval checks
//!
//! - [`MonotonicConstraint`]: ordering, strictness and fixed steps, per group.
//! - [`MutuallyExclusiveRangesConstraint`]: pairwise disjoint intervals, per group.
//!
//! ## Cross-table checks
//!
//! - [`MaintainsRelationshipsConstraint`]: equal key sets in two tables.
//!
//! ## Column content
//!
//! - [`NoNullsConstraint`], [`NoInfsConstraint`], [`NotNullProportionConstraint`],
//!   [`AtLeastOneConstraint`]
//! - [`UniqueConstraint`], [`UniqueCombinationConstraint`], [`NotConstantConstraint`]
//! - [`AcceptedValuesConstraint`], [`NotAcceptedValuesConstraint`],
//!   [`MandatoryValuesConstraint`], [`AcceptedRangeConstraint`]
//! - [`ColumnWithinStdConstraint`]: outliers beyond `mean ± n · std`.
//! - [`CustomSqlConstraint`]: any row-level SQL predicate.
//!
//! ## Structure
//!
//! - [`HasShapeConstraint`], [`HasColumnsConstraint`], [`HasDtypesConstraint`]
//!
//! ```rust
//! use term_contract::prelude::*;
//! use term_contract::constraints::{MonotonicConstraint, UniqueConstraint};
//! # use arrow::array::Int64Array;
//! # use arrow::datatypes::{DataType, Field, Schema};
//! # use arrow::record_batch::RecordBatch;
//! # use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! # let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
//! # let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))])?;
//! let table = Table::from_batch(batch)
//!     .check(&UniqueConstraint::new("id"))
//!     .await?
//!     .check(&MonotonicConstraint::new("id").strict(true))
//!     .await?;
//! # let _ = table;
//! # Ok(())
//! # }
//! ```

mod custom_sql;
mod monotonic;
mod nulls;
mod outliers;
mod overlap;
mod relationships;
mod shape;
mod uniqueness;
mod values;

pub use custom_sql::CustomSqlConstraint;
pub use monotonic::{MonotonicConstraint, Step};
pub use nulls::{AtLeastOneConstraint, NoInfsConstraint, NoNullsConstraint, NotNullProportionConstraint};
pub use outliers::ColumnWithinStdConstraint;
pub use overlap::MutuallyExclusiveRangesConstraint;
pub use relationships::{MaintainsRelationshipsConstraint, DEFAULT_MAX_REPORTED};
pub use shape::{HasColumnsConstraint, HasDtypesConstraint, HasShapeConstraint};
pub use uniqueness::{NotConstantConstraint, UniqueCombinationConstraint, UniqueConstraint};
pub use values::{
    AcceptedRangeConstraint, AcceptedValuesConstraint, MandatoryValuesConstraint,
    NotAcceptedValuesConstraint,
};
