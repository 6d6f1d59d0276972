//! Interval closure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which ends of an interval are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Closed {
    /// `[low, high]`
    #[default]
    Both,
    /// `[low, high)`
    Left,
    /// `(low, high]`
    Right,
    /// `(low, high)`
    None,
}

impl Closed {
    pub fn includes_low(&self) -> bool {
        matches!(self, Closed::Both | Closed::Left)
    }

    pub fn includes_high(&self) -> bool {
        matches!(self, Closed::Both | Closed::Right)
    }

    /// SQL predicate for `value` lying inside `[low, high]` under this closure.
    pub fn contains_sql(&self, value: &str, low: &str, high: &str) -> String {
        let low_op = if self.includes_low() { ">=" } else { ">" };
        let high_op = if self.includes_high() { "<=" } else { "<" };
        format!("({value} {low_op} {low} AND {value} {high_op} {high})")
    }

    /// Comparison under which a lower bound touching an earlier upper bound overlaps.
    ///
    /// Touching endpoints only overlap when both ends are included.
    pub fn overlap_op(&self) -> &'static str {
        match self {
            Closed::Both => "<=",
            _ => "<",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Closed::Both => "both",
            Closed::Left => "left",
            Closed::Right => "right",
            Closed::None => "none",
        }
    }
}

impl fmt::Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Closed {
    type Err = crate::error::TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "both" => Ok(Closed::Both),
            "left" => Ok(Closed::Left),
            "right" => Ok(Closed::Right),
            "none" => Ok(Closed::None),
            other => Err(crate::error::TermError::invalid_argument(format!(
                "closed must be one of both, left, right, none; got '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_sql() {
        assert_eq!(Closed::Both.contains_sql("x", "1", "2"), "(x >= 1 AND x <= 2)");
        assert_eq!(Closed::Left.contains_sql("x", "1", "2"), "(x >= 1 AND x < 2)");
        assert_eq!(Closed::Right.contains_sql("x", "1", "2"), "(x > 1 AND x <= 2)");
        assert_eq!(Closed::None.contains_sql("x", "1", "2"), "(x > 1 AND x < 2)");
    }

    #[test]
    fn test_overlap_op() {
        assert_eq!(Closed::Both.overlap_op(), "<=");
        assert_eq!(Closed::Left.overlap_op(), "<");
        assert_eq!(Closed::None.overlap_op(), "<");
    }

    #[test]
    fn test_parse() {
        assert_eq!("LEFT".parse::<Closed>().unwrap(), Closed::Left);
        assert!("open".parse::<Closed>().is_err());
    }
}
