//! Commonly used types and traits.

pub use crate::core::{
    Check, Closed, ColumnSpec, Constraint, GroupBy, Level, MaterializedTable, Table,
    TermContext, TermContextConfig, Violation,
};
pub use crate::error::{ErrorContext, Result, TermError};
pub use crate::logging::LogConfig;
