//! Comparison operators shared by feed triggers and feed conditions.

use serde::{Deserialize, Serialize};

/// How a live feed reading is compared against a configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOperator {
    /// Compare `value` (left-hand side) against `threshold`.
    ///
    /// Equality uses an absolute tolerance of `f64::EPSILON` so readings that
    /// went through a text round-trip still compare equal.
    #[must_use]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        let equal = (value - threshold).abs() <= f64::EPSILON;
        match self {
            Self::Equal => equal,
            Self::NotEqual => !equal,
            Self::GreaterThan => value > threshold && !equal,
            Self::GreaterThanOrEqual => value > threshold || equal,
            Self::LessThan => value < threshold && !equal,
            Self::LessThanOrEqual => value < threshold || equal,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}
