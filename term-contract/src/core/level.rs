//! Severity of a check chain.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a [`Check`](crate::core::Check) reacts to a failing constraint.
///
/// - `Error`: the chain stops and the violation is returned as an error.
/// - `Warning`: the violation is logged and the chain continues.
/// - `Info`: the violation is logged at info level and the chain continues.
///
/// ```rust
/// use term_contract::core::Level;
///
/// assert!(Level::Error > Level::Warning);
/// assert!(Level::Error.is_blocking());
/// assert!(!Level::Warning.is_blocking());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info = 0,
    Warning = 1,
    #[default]
    Error = 2,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }

    /// Whether a failure at this level stops the chain.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Level::Error)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_default() {
        assert!(Level::Warning > Level::Info);
        assert_eq!(Level::default(), Level::Error);
        assert_eq!(Level::Info.to_string(), "info");
    }

    #[test]
    fn test_level_serde() {
        let json = serde_json::to_string(&Level::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        let level: Level = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, Level::Error);
    }
}
