//! Calendar-aware durations for temporal interval checks.
//!
//! A [`TimeStep`] is parsed from compact strings such as `"1mo"`, `"3m"`, `"-1mo"`,
//! `"1d12h"` or from phrases such as `"1 month"` and `"3 minutes"`, and rendered as a
//! SQL `INTERVAL` literal.
//!
//! ```rust
//! use term_contract::core::TimeStep;
//!
//! let step: TimeStep = "1d12h".parse().unwrap();
//! assert_eq!(step.to_sql(), "INTERVAL '1 days 12 hours'");
//!
//! let step: TimeStep = "1 quarter".parse().unwrap();
//! assert_eq!(step.to_sql(), "INTERVAL '3 months'");
//! ```

use crate::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static STEP: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\s*(-)?\s*((?:\d+\s*[a-zµ]+\s*)+)$").expect("Hard-coded regex pattern should be valid")
});

static PART: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(\d+)\s*([a-zµ]+)").expect("Hard-coded regex pattern should be valid")
});

/// Unit of one component of a [`TimeStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    fn parse(unit: &str) -> Option<Self> {
        let unit = match unit {
            "ns" | "nanosecond" | "nanoseconds" => TimeUnit::Nanosecond,
            "us" | "µs" | "microsecond" | "microseconds" => TimeUnit::Microsecond,
            "ms" | "millisecond" | "milliseconds" => TimeUnit::Millisecond,
            "s" | "sec" | "secs" | "second" | "seconds" => TimeUnit::Second,
            "m" | "min" | "mins" | "minute" | "minutes" => TimeUnit::Minute,
            "h" | "hr" | "hour" | "hours" => TimeUnit::Hour,
            "d" | "day" | "days" => TimeUnit::Day,
            "w" | "week" | "weeks" => TimeUnit::Week,
            "mo" | "month" | "months" => TimeUnit::Month,
            "q" | "quarter" | "quarters" => TimeUnit::Quarter,
            "y" | "year" | "years" => TimeUnit::Year,
            _ => return None,
        };
        Some(unit)
    }

    /// Unit name understood by SQL interval literals, and the multiplier to apply.
    fn sql_unit(&self) -> (&'static str, i64) {
        match self {
            TimeUnit::Nanosecond => ("nanoseconds", 1),
            TimeUnit::Microsecond => ("microseconds", 1),
            TimeUnit::Millisecond => ("milliseconds", 1),
            TimeUnit::Second => ("seconds", 1),
            TimeUnit::Minute => ("minutes", 1),
            TimeUnit::Hour => ("hours", 1),
            TimeUnit::Day => ("days", 1),
            TimeUnit::Week => ("weeks", 1),
            TimeUnit::Month => ("months", 1),
            TimeUnit::Quarter => ("months", 3),
            TimeUnit::Year => ("years", 1),
        }
    }
}

/// A signed, possibly compound calendar duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStep {
    text: String,
    negative: bool,
    parts: Vec<(i64, TimeUnit)>,
    /// Signed amounts in SQL interval units, e.g. quarters as months.
    sql_parts: Vec<(i64, String)>,
}

impl TimeStep {
    /// The text the step was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn parts(&self) -> &[(i64, TimeUnit)] {
        &self.parts
    }

    /// Renders the step as a SQL interval literal.
    pub fn to_sql(&self) -> String {
        let body: Vec<String> = self
            .sql_parts
            .iter()
            .map(|(amount, name)| format!("{amount} {name}"))
            .collect();
        format!("INTERVAL '{}'", body.join(" "))
    }
}

impl FromStr for TimeStep {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            TermError::invalid_argument(format!(
                "invalid duration '{s}': expected forms like '1mo', '3m', '-1d12h' or '3 minutes'"
            ))
        };

        let lowered = s.to_lowercase();
        let captures = STEP.captures(&lowered).ok_or_else(invalid)?;
        let negative = captures.get(1).is_some();
        let body = captures.get(2).map(|m| m.as_str()).ok_or_else(invalid)?;

        let mut parts = Vec::new();
        let mut sql_parts = Vec::new();
        for part in PART.captures_iter(body) {
            let count: i64 = part[1].parse().map_err(|_| invalid())?;
            let unit = TimeUnit::parse(&part[2]).ok_or_else(invalid)?;
            let (name, factor) = unit.sql_unit();
            let amount = count.checked_mul(factor).ok_or_else(|| {
                TermError::invalid_argument(format!("duration '{s}' is out of range"))
            })?;
            // amount is non-negative, so negation cannot overflow
            let amount = if negative { -amount } else { amount };
            parts.push((count, unit));
            sql_parts.push((amount, name.to_string()));
        }
        if parts.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            text: s.trim().to_string(),
            negative,
            parts,
            sql_parts,
        })
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
