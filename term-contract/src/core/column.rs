//! Column selection shared by every check.
//!
//! A [`ColumnSpec`] names the columns a check applies to: all of them, a list of
//! names, every column of some Arrow types, or a custom SQL expression. Resolution
//! against a schema turns the column spec into quoted SQL expressions plus the label used
//! in reports.
//!
//! ```rust
//! use arrow::datatypes::{DataType, Field, Schema};
//! use term_contract::core::ColumnSpec;
//!
//! let schema = Schema::new(vec![
//!     Field::new("id", DataType::Int64, false),
//!     Field::new("name", DataType::Utf8, true),
//! ]);
//!
//! let resolved = ColumnSpec::from(DataType::Utf8).resolve(&schema).unwrap();
//! assert_eq!(resolved[0].label, "name");
//! assert_eq!(resolved[0].sql, "\"name\"");
//!
//! let missing = ColumnSpec::from(vec!["id", "email"]).resolve(&schema).unwrap_err();
//! assert_eq!(missing.missing, vec!["email".to_string()]);
//! ```

use crate::prelude::*;
use crate::security::SqlSecurity;
use arrow::datatypes::{DataType, Schema};

/// A selection of columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ColumnSpec {
    /// Every column of the table.
    #[default]
    All,
    /// Exactly these columns, in this order.
    Named(Vec<String>),
    /// Every column whose type is one of these.
    Types(Vec<DataType>),
    /// A custom SQL expression evaluated over the table.
    Expression(String),
}

/// A column selected by a [`ColumnSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    /// Name used in reports: the column name or the expression text.
    pub label: String,
    /// SQL that evaluates the column.
    pub sql: String,
    /// Arrow type, unknown for expressions.
    pub data_type: Option<DataType>,
    /// Position in the schema, unknown for expressions.
    pub index: Option<usize>,
}

/// Names that a [`ColumnSpec`] referenced but the schema lacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("columns not found: {}", .missing.join(", "))]
pub struct MissingColumns {
    pub missing: Vec<String>,
}

impl From<MissingColumns> for TermError {
    fn from(err: MissingColumns) -> Self {
        TermError::ColumnNotFound {
            column: err.missing.join(", "),
        }
    }
}

impl ColumnSpec {
    pub fn all() -> Self {
        Self::All
    }

    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn types<I>(types: I) -> Self
    where
        I: IntoIterator<Item = DataType>,
    {
        Self::Types(types.into_iter().collect())
    }

    pub fn expression(sql: impl Into<String>) -> Self {
        Self::Expression(sql.into())
    }

    /// Column names referenced by the spec, for metadata and logging.
    pub fn describe(&self) -> Vec<String> {
        match self {
            Self::All => vec!["*".to_string()],
            Self::Named(names) => names.clone(),
            Self::Types(types) => types.iter().map(|t| format!("<{t}>")).collect(),
            Self::Expression(sql) => vec![sql.clone()],
        }
    }

    /// Resolves the column spec against a schema.
    pub fn resolve(&self, schema: &Schema) -> std::result::Result<Vec<ResolvedColumn>, MissingColumns> {
        let by_index = |index: usize| {
            let field = schema.field(index);
            ResolvedColumn {
                label: field.name().clone(),
                sql: SqlSecurity::quote_identifier(field.name()),
                data_type: Some(field.data_type().clone()),
                index: Some(index),
            }
        };

        match self {
            Self::All => Ok((0..schema.fields().len()).map(by_index).collect()),
            Self::Types(types) => Ok(schema
                .fields()
                .iter()
                .enumerate()
                .filter(|(_, field)| types.contains(field.data_type()))
                .map(|(index, _)| by_index(index))
                .collect()),
            Self::Named(names) => {
                let mut resolved = Vec::with_capacity(names.len());
                let mut missing = Vec::new();
                for name in names {
                    match schema.index_of(name) {
                        Ok(index) => resolved.push(by_index(index)),
                        Err(_) => missing.push(name.clone()),
                    }
                }
                if missing.is_empty() {
                    Ok(resolved)
                } else {
                    Err(MissingColumns { missing })
                }
            }
            Self::Expression(sql) => Ok(vec![ResolvedColumn {
                label: sql.clone(),
                sql: format!("({sql})"),
                data_type: None,
                index: None,
            }]),
        }
    }

    /// Validates the column spec and resolves it, turning missing columns into a usage error.
    pub fn resolve_checked(&self, schema: &Schema) -> Result<Vec<ResolvedColumn>> {
        if let Self::Expression(sql) = self {
            SqlSecurity::validate_sql_expression(sql)?;
        }
        Ok(self.resolve(schema)?)
    }
}

impl From<&str> for ColumnSpec {
    fn from(name: &str) -> Self {
        Self::Named(vec![name.to_string()])
    }
}

impl From<String> for ColumnSpec {
    fn from(name: String) -> Self {
        Self::Named(vec![name])
    }
}

impl From<Vec<&str>> for ColumnSpec {
    fn from(names: Vec<&str>) -> Self {
        Self::named(names)
    }
}

impl From<Vec<String>> for ColumnSpec {
    fn from(names: Vec<String>) -> Self {
        Self::Named(names)
    }
}

impl<const N: usize> From<[&str; N]> for ColumnSpec {
    fn from(names: [&str; N]) -> Self {
        Self::named(names)
    }
}

impl From<DataType> for ColumnSpec {
    fn from(data_type: DataType) -> Self {
        Self::Types(vec![data_type])
    }
}

impl From<Vec<DataType>> for ColumnSpec {
    fn from(types: Vec<DataType>) -> Self {
        Self::Types(types)
    }
}

impl<T: Into<ColumnSpec>> From<Option<T>> for ColumnSpec {
    fn from(spec: Option<T>) -> Self {
        spec.map(Into::into).unwrap_or_default()
    }
}
