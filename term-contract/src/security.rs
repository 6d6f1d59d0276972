//! SQL rendering and validation helpers.
//!
//! Every check compiles to a single SQL statement. User-supplied column names are
//! always quoted with [`SqlSecurity::quote_identifier`], user values are rendered with
//! [`SqlSecurity::literal`], and free-form expressions go through
//! [`SqlSecurity::validate_sql_expression`] before being spliced into a query.

use crate::error::{Result, TermError};
use chrono::{DateTime, NaiveDate, Utc};
use datafusion::scalar::ScalarValue;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_EXPRESSION_LENGTH: usize = 5000;
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Days between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

static DANGEROUS_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    // Hard-coded pattern.
    #[allow(clippy::expect_used)]
    Regex::new(
        r"(?i)\b(drop|create|alter|truncate|insert|update|delete|merge|grant|revoke|exec|execute|copy|attach|pragma|information_schema)\b",
    )
    .expect("Hard-coded regex pattern should be valid")
});

static SUBQUERY: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)\b(select|union)\b").expect("Hard-coded regex pattern should be valid")
});

/// SQL identifier quoting, literal rendering and expression validation.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Quotes an identifier that is known to exist in a schema.
    ///
    /// Embedded double quotes are doubled, so any column name round-trips.
    ///
    /// ```rust
    /// use term_contract::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::quote_identifier("user id"), "\"user id\"");
    /// assert_eq!(SqlSecurity::quote_identifier("a\"b"), "\"a\"\"b\"");
    /// ```
    pub fn quote_identifier(identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Validates and quotes an identifier supplied by a caller.
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(Self::quote_identifier(identifier))
    }

    /// Rejects identifiers that are empty, too long or contain NUL bytes.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.is_empty() {
            return Err(TermError::SecurityError(
                "SQL identifier cannot be empty".to_string(),
            ));
        }
        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(TermError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }
        if identifier.contains('\0') {
            return Err(TermError::SecurityError(
                "SQL identifier cannot contain null bytes".to_string(),
            ));
        }
        Ok(())
    }

    /// Quotes a string as a SQL string literal.
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Validates a custom SQL expression used as a column or a predicate.
    ///
    /// Expressions may use any scalar function, but cannot contain statement
    /// separators, comments, subqueries or data-modifying keywords.
    pub fn validate_sql_expression(expression: &str) -> Result<()> {
        if expression.trim().is_empty() {
            return Err(TermError::SecurityError(
                "SQL expression cannot be empty".to_string(),
            ));
        }
        if expression.len() > MAX_EXPRESSION_LENGTH {
            return Err(TermError::SecurityError(format!(
                "SQL expression too long (max {MAX_EXPRESSION_LENGTH} characters)"
            )));
        }
        if expression.contains('\0') {
            return Err(TermError::SecurityError(
                "SQL expression cannot contain null bytes".to_string(),
            ));
        }

        let unquoted = strip_quoted(expression);
        for pattern in [";", "--", "/*", "*/"] {
            if unquoted.contains(pattern) {
                return Err(TermError::SecurityError(format!(
                    "SQL expression contains forbidden sequence: '{pattern}'"
                )));
            }
        }
        if let Some(found) = DANGEROUS_KEYWORDS.find(&unquoted) {
            return Err(TermError::SecurityError(format!(
                "SQL expression contains dangerous keyword: '{}'",
                found.as_str()
            )));
        }
        if SUBQUERY.is_match(&unquoted) {
            return Err(TermError::SecurityError(
                "SQL expression cannot contain subqueries".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders a scalar value as a SQL literal.
    ///
    /// ```rust
    /// use datafusion::scalar::ScalarValue;
    /// use term_contract::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::literal(&ScalarValue::from(3i64)).unwrap(), "3");
    /// assert_eq!(SqlSecurity::literal(&ScalarValue::from("it's")).unwrap(), "'it''s'");
    /// ```
    pub fn literal(value: &ScalarValue) -> Result<String> {
        if value.is_null() {
            return Ok("NULL".to_string());
        }
        let rendered = match value {
            ScalarValue::Boolean(Some(v)) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            ScalarValue::Int8(Some(v)) => v.to_string(),
            ScalarValue::Int16(Some(v)) => v.to_string(),
            ScalarValue::Int32(Some(v)) => v.to_string(),
            ScalarValue::Int64(Some(v)) => v.to_string(),
            ScalarValue::UInt8(Some(v)) => v.to_string(),
            ScalarValue::UInt16(Some(v)) => v.to_string(),
            ScalarValue::UInt32(Some(v)) => v.to_string(),
            ScalarValue::UInt64(Some(v)) => v.to_string(),
            ScalarValue::Float32(Some(v)) => Self::float_literal(f64::from(*v)),
            ScalarValue::Float64(Some(v)) => Self::float_literal(*v),
            ScalarValue::Utf8(Some(v))
            | ScalarValue::LargeUtf8(Some(v))
            | ScalarValue::Utf8View(Some(v)) => Self::quote_literal(v),
            ScalarValue::Date32(Some(days)) => {
                let date = days
                    .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .ok_or_else(|| {
                        TermError::invalid_argument(format!("date out of range: {days}"))
                    })?;
                format!("CAST('{}' AS DATE)", date.format("%Y-%m-%d"))
            }
            ScalarValue::Date64(Some(millis)) => {
                let date = DateTime::from_timestamp_millis(*millis)
                    .ok_or_else(|| TermError::invalid_argument(format!("date out of range: {millis}")))?;
                format!("CAST('{}' AS DATE)", date.format("%Y-%m-%d"))
            }
            ScalarValue::TimestampSecond(Some(v), _) => {
                Self::timestamp_literal(DateTime::from_timestamp(*v, 0), "TIMESTAMP")?
            }
            ScalarValue::TimestampMillisecond(Some(v), _) => {
                Self::timestamp_literal(DateTime::from_timestamp_millis(*v), "TIMESTAMP")?
            }
            ScalarValue::TimestampMicrosecond(Some(v), _) => {
                Self::timestamp_literal(DateTime::from_timestamp_micros(*v), "TIMESTAMP")?
            }
            ScalarValue::TimestampNanosecond(Some(v), _) => Self::timestamp_literal(
                Some(DateTime::from_timestamp_nanos(*v)),
                "TIMESTAMP",
            )?,
            other => {
                return Err(TermError::invalid_argument(format!(
                    "values of type {} cannot be used as check parameters",
                    other.data_type()
                )))
            }
        };
        Ok(rendered)
    }

    fn float_literal(value: f64) -> String {
        if value.is_nan() {
            "CAST('NaN' AS DOUBLE)".to_string()
        } else if value.is_infinite() {
            let sign = if value > 0.0 { "" } else { "-" };
            format!("CAST('{sign}inf' AS DOUBLE)")
        } else {
            // Debug keeps a decimal point, so the literal is typed as a float.
            format!("{value:?}")
        }
    }

    fn timestamp_literal(value: Option<DateTime<Utc>>, sql_type: &str) -> Result<String> {
        let value = value
            .ok_or_else(|| TermError::invalid_argument("timestamp out of range".to_string()))?;
        Ok(format!(
            "CAST('{}' AS {sql_type})",
            value.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f")
        ))
    }
}

/// Removes the content of string literals and quoted identifiers so that keyword
/// checks only look at SQL syntax.
fn strip_quoted(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut quote: Option<char> = None;
    for ch in expression.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                out.push(ch);
            }
            Some(_) => {}
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}
