//! Rendering of violations and check reports.
//!
//! [`HumanFormatter`] produces console output with the offending rows as a table,
//! [`JsonFormatter`] a JSON document for machines, with the rows as an array of
//! objects.
//!
//! ```rust
//! use term_contract::core::Violation;
//! use term_contract::formatters::{HumanFormatter, ViolationFormatter};
//!
//! let violation = Violation::without_rows("has_shape", "Table has 3 rows, expected 4");
//! let text = HumanFormatter::new().format(&violation).unwrap();
//! assert!(text.contains("Table has 3 rows, expected 4"));
//! ```

use crate::core::{CheckReport, Level, MaterializedTable, Violation};
use crate::prelude::*;
use arrow::json::ArrayWriter;
use arrow::record_batch::RecordBatch;
use serde_json::{json, Value};

/// Options shared by all formatters.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include the offending rows.
    pub include_rows: bool,
    /// Maximum number of rows to render, `None` for all attached rows.
    pub max_rows: Option<usize>,
    /// ANSI colors (human formatter only).
    pub use_colors: bool,
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_rows: true,
            max_rows: None,
            use_colors: true,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Messages only.
    pub fn minimal() -> Self {
        Self {
            include_rows: false,
            max_rows: Some(0),
            use_colors: false,
            include_timestamps: false,
        }
    }

    /// Plain text with a bounded number of rows, for CI logs.
    pub fn ci() -> Self {
        Self {
            include_rows: true,
            max_rows: Some(20),
            use_colors: false,
            include_timestamps: true,
        }
    }

    pub fn with_rows(mut self, include: bool) -> Self {
        self.include_rows = include;
        self
    }

    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn rows_of<'a>(&self, violation: &'a Violation) -> Option<std::borrow::Cow<'a, MaterializedTable>> {
        let rows = violation.rows();
        if !self.include_rows || rows.num_columns() == 0 {
            return None;
        }
        match self.max_rows {
            Some(max) if rows.num_rows() > max => Some(std::borrow::Cow::Owned(rows.head(max))),
            _ => Some(std::borrow::Cow::Borrowed(rows)),
        }
    }
}

/// Turns violations into text.
///
/// ```rust
/// use term_contract::core::Violation;
/// use term_contract::formatters::ViolationFormatter;
///
/// struct OneLine;
///
/// impl ViolationFormatter for OneLine {
///     fn format(&self, violation: &Violation) -> term_contract::prelude::Result<String> {
///         Ok(format!("{}: {}", violation.check(), violation.message()))
///     }
/// }
///
/// let line = OneLine.format(&Violation::without_rows("unique", "duplicates")).unwrap();
/// assert_eq!(line, "unique: duplicates");
/// ```
pub trait ViolationFormatter {
    fn format(&self, violation: &Violation) -> Result<String>;

    /// Formats every violation of a report, separated by blank lines.
    fn format_report(&self, report: &CheckReport) -> Result<String> {
        let parts = report
            .violations
            .iter()
            .map(|v| self.format(v))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("\n\n"))
    }
}

/// Console output.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.config.use_colors {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn level_marker(&self, level: Level) -> String {
        match level {
            Level::Error => self.paint("ERROR", "31"),
            Level::Warning => self.paint("WARN", "33"),
            Level::Info => self.paint("INFO", "34"),
        }
    }
}

impl ViolationFormatter for HumanFormatter {
    fn format(&self, violation: &Violation) -> Result<String> {
        let mut output = String::new();
        output.push_str(&format!(
            "{} Check '{}' failed\n",
            self.paint("✗", "31"),
            violation.check()
        ));
        if self.config.include_timestamps {
            output.push_str(&format!("Detected at: {}\n", violation.detected_at().to_rfc3339()));
        }
        if let Some(rows) = self.config.rows_of(violation) {
            output.push_str(&rows.to_pretty_string()?);
            output.push('\n');
            if rows.num_rows() < violation.total_rows() {
                output.push_str(&format!(
                    "(showing {} of {} offending rows)\n",
                    rows.num_rows(),
                    violation.total_rows()
                ));
            }
        }
        output.push_str(&format!("--> {}", violation.message()));
        Ok(output)
    }

    fn format_report(&self, report: &CheckReport) -> Result<String> {
        let mut output = format!(
            "[{}] {}: {} of {} constraints failed\n",
            self.level_marker(report.level),
            report.check,
            report.violations.len(),
            report.evaluated
        );
        for violation in &report.violations {
            output.push('\n');
            output.push_str(&self.format(violation)?);
            output.push('\n');
        }
        Ok(output)
    }
}

/// JSON output.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// The violation as a JSON value.
    pub fn to_value(&self, violation: &Violation) -> Result<Value> {
        let mut value = json!({
            "check": violation.check(),
            "message": violation.message(),
            "total_rows": violation.total_rows(),
            "truncated": violation.is_truncated(),
        });
        if self.config.include_timestamps {
            value["detected_at"] = json!(violation.detected_at().to_rfc3339());
        }
        if let Some(rows) = self.config.rows_of(violation) {
            value["columns"] = json!(rows.column_names());
            value["rows"] = rows_to_json(rows.batches())?;
        }
        Ok(value)
    }

    fn render(&self, value: &Value) -> Result<String> {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.map_err(|e| TermError::Serialization(format!("failed to render JSON: {e}")))
    }
}

impl ViolationFormatter for JsonFormatter {
    fn format(&self, violation: &Violation) -> Result<String> {
        self.render(&self.to_value(violation)?)
    }

    fn format_report(&self, report: &CheckReport) -> Result<String> {
        let violations = report
            .violations
            .iter()
            .map(|v| self.to_value(v))
            .collect::<Result<Vec<_>>>()?;
        self.render(&json!({
            "check": report.check,
            "level": report.level,
            "evaluated": report.evaluated,
            "success": report.is_success(),
            "violations": violations,
        }))
    }
}

/// Serializes batches as a JSON array of row objects.
fn rows_to_json(batches: &[RecordBatch]) -> Result<Value> {
    let mut writer = ArrayWriter::new(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs)?;
    writer.finish()?;
    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(json!([]));
    }
    Ok(serde_json::from_slice(&buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ViolationReporter;
    use crate::test_utils::int_batch;

    fn violation() -> Violation {
        let rows = MaterializedTable::from_batch(int_batch(&[("a", vec![Some(3), Some(1), None])]));
        ViolationReporter::new("is_monotonic")
            .max_rows(Some(2))
            .fail(rows, "Column \"a\" expected to be monotonic")
            .violation
            .unwrap()
    }

    #[test]
    fn test_human_formatter() {
        let text = HumanFormatter::with_config(FormatterConfig::ci())
            .format(&violation())
            .unwrap();
        assert!(text.starts_with("✗ Check 'is_monotonic' failed"));
        assert!(text.contains("| a |"));
        assert!(text.contains("(showing 2 of 3 offending rows)"));
        assert!(text.ends_with("--> Column \"a\" expected to be monotonic"));
        assert!(!text.contains("\x1b["));
    }

    #[test]
    fn test_minimal_config_hides_rows() {
        let text = HumanFormatter::with_config(FormatterConfig::minimal())
            .format(&violation())
            .unwrap();
        assert_eq!(text, "✗ Check 'is_monotonic' failed\n--> Column \"a\" expected to be monotonic");
    }

    #[test]
    fn test_json_formatter() {
        let value = JsonFormatter::new().to_value(&violation()).unwrap();
        assert_eq!(value["check"], "is_monotonic");
        assert_eq!(value["total_rows"], 3);
        assert_eq!(value["truncated"], true);
        assert_eq!(value["columns"], json!(["a"]));
        assert_eq!(value["rows"], json!([{"a": 3}, {"a": 1}]));
    }

    #[test]
    fn test_json_structural_violation_has_no_rows() {
        let value = JsonFormatter::new()
            .to_value(&Violation::without_rows("has_columns", "Missing columns"))
            .unwrap();
        assert!(value.get("rows").is_none());
        assert_eq!(value["truncated"], false);
    }

    #[test]
    fn test_json_report() {
        let report = CheckReport {
            check: "orders".to_string(),
            level: Level::Warning,
            violations: vec![violation()],
            evaluated: 2,
        };
        let text = JsonFormatter::new().with_pretty(false).format_report(&report).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["level"], "warning");
        assert_eq!(value["success"], false);
        assert_eq!(value["violations"][0]["check"], "is_monotonic");
    }

    #[test]
    fn test_human_report() {
        let report = CheckReport {
            check: "orders".to_string(),
            level: Level::Error,
            violations: vec![violation()],
            evaluated: 2,
        };
        let text = HumanFormatter::with_config(FormatterConfig::minimal())
            .format_report(&report)
            .unwrap();
        assert!(text.starts_with("[ERROR] orders: 1 of 2 constraints failed"));
    }
}
