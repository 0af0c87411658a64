//! Condition: a predicate over live state, used as a specification leaf.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::comparison::ComparisonOperator;
use crate::error::{HomeRuleError, ValidationError};
use crate::id::{ConditionId, FeedId, PremisesId};
use crate::specification::Specification;

/// Root of an automation's condition tree; leaves reference [`Condition`]s.
pub type ConditionNode = Specification<ConditionId>;

/// A tenant-scoped predicate referenced from condition trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub premises_id: PremisesId,
    pub config: ConditionConfig,
}

/// Typed configuration of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    TimeRange(TimeRangeConfig),
    Feed(FeedConditionConfig),
}

/// Holds while the current time of day lies in `[start, end)`.
///
/// `end` earlier than `start` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeConfig {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRangeConfig {
    #[must_use]
    pub fn contains(&self, at: NaiveTime) -> bool {
        crate::time::is_within_window(self.start, self.end, at)
    }
}

/// Holds while a feed's current reading satisfies `operator` against `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConditionConfig {
    pub feed_id: FeedId,
    pub operator: ComparisonOperator,
    pub threshold: f64,
}

impl FeedConditionConfig {
    #[must_use]
    pub fn holds_for(&self, current_value: f64) -> bool {
        self.operator.compare(current_value, self.threshold)
    }
}

impl ConditionConfig {
    /// Check the configuration is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Validation`] when a time range is empty
    /// (`start == end`) or a threshold is not finite.
    pub fn validate(&self) -> Result<(), HomeRuleError> {
        match self {
            Self::TimeRange(range) => {
                if range.start == range.end {
                    return Err(ValidationError::EmptyTimeRange.into());
                }
            }
            Self::Feed(feed) => {
                if !feed.threshold.is_finite() {
                    return Err(ValidationError::NonFiniteValue.into());
                }
            }
        }
        Ok(())
    }
}

impl Condition {
    #[must_use]
    pub fn new(premises_id: PremisesId, config: ConditionConfig) -> Self {
        Self {
            id: ConditionId::new(),
            premises_id,
            config,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.config {
            ConditionConfig::TimeRange(range) => write!(
                f,
                "time_range({}..{})",
                range.start.format("%H:%M"),
                range.end.format("%H:%M")
            ),
            ConditionConfig::Feed(feed) => {
                write!(f, "feed({} {} {})", feed.feed_id, feed.operator, feed.threshold)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn should_reject_time_range_with_equal_bounds() {
        let config = ConditionConfig::TimeRange(TimeRangeConfig {
            start: hm(8, 0),
            end: hm(8, 0),
        });
        assert!(matches!(
            config.validate(),
            Err(HomeRuleError::Validation(ValidationError::EmptyTimeRange))
        ));
    }

    #[test]
    fn should_reject_non_finite_threshold() {
        let config = ConditionConfig::Feed(FeedConditionConfig {
            feed_id: FeedId::new(),
            operator: ComparisonOperator::LessThan,
            threshold: f64::NAN,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_hold_inside_overnight_range() {
        let range = TimeRangeConfig {
            start: hm(22, 0),
            end: hm(6, 0),
        };
        assert!(range.contains(hm(23, 0)));
        assert!(!range.contains(hm(7, 0)));
    }

    #[test]
    fn should_compare_feed_reading_against_threshold() {
        let config = FeedConditionConfig {
            feed_id: FeedId::new(),
            operator: ComparisonOperator::LessThanOrEqual,
            threshold: 18.0,
        };
        assert!(config.holds_for(17.5));
        assert!(!config.holds_for(18.5));
    }

    #[test]
    fn should_display_time_range_condition() {
        let c = Condition::new(
            PremisesId::new(),
            ConditionConfig::TimeRange(TimeRangeConfig {
                start: hm(8, 0),
                end: hm(22, 0),
            }),
        );
        assert_eq!(c.to_string(), "time_range(08:00..22:00)");
    }

    #[test]
    fn should_deserialize_feed_condition_from_tagged_json() {
        let feed = FeedId::new();
        let json = serde_json::json!({
            "type": "feed",
            "feed_id": feed,
            "operator": "greater_than",
            "threshold": 30.0
        });
        let config: ConditionConfig = serde_json::from_value(json).unwrap();
        assert!(
            matches!(config, ConditionConfig::Feed(FeedConditionConfig { feed_id, .. }) if feed_id == feed)
        );
    }
}
