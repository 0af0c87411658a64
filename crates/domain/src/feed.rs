//! Feed: a live device value (sensor reading or actuator setpoint).
//!
//! Feeds are owned by another bounded context; automations only read their
//! current value and, through feed-control actions, write a new one.

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventType};
use crate::id::{FeedId, PremisesId};
use crate::time::Timestamp;

/// Snapshot of a feed as exposed by the feed facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub premises_id: PremisesId,
    pub name: String,
    pub current_value: f64,
    pub updated_at: Timestamp,
}

impl Feed {
    #[must_use]
    pub fn new(
        premises_id: PremisesId,
        name: impl Into<String>,
        current_value: f64,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id: FeedId::new(),
            premises_id,
            name: name.into(),
            current_value,
            updated_at,
        }
    }

    /// Record a new reading, returning the previous one.
    pub fn record(&mut self, value: f64, at: Timestamp) -> f64 {
        self.updated_at = at;
        std::mem::replace(&mut self.current_value, value)
    }

    /// The move from `previous` to the current value.
    #[must_use]
    pub fn reading(&self, previous: f64) -> FeedReading {
        FeedReading {
            feed_id: self.id,
            previous,
            value: self.current_value,
        }
    }

    /// Event announcing that the feed moved away from `previous`.
    #[must_use]
    pub fn value_changed_event(&self, previous: f64) -> Event {
        Event::new(
            EventType::FeedValueChanged,
            self.premises_id,
            serde_json::json!({
                "feed_id": self.id,
                "previous_value": previous,
                "value": self.current_value,
            }),
            self.updated_at,
        )
    }
}

/// One recorded change of a feed, as carried by `feed.value_changed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedReading {
    pub feed_id: FeedId,
    pub previous: f64,
    pub value: f64,
}

impl FeedReading {
    /// Whether the value actually moved. Writing the value a feed already
    /// holds is not a change.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_change(&self) -> bool {
        self.previous != self.value
    }

    /// Read the reading back out of a `feed.value_changed` event.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.event_type != EventType::FeedValueChanged {
            return None;
        }
        Some(Self {
            feed_id: event.data.get("feed_id")?.as_str()?.parse().ok()?,
            previous: event.data.get("previous_value")?.as_f64()?,
            value: event.data.get("value")?.as_f64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_previous_value_when_recording() {
        let mut feed = Feed::new(PremisesId::new(), "Living room temperature", 19.5, crate::time::now());
        let later = crate::time::now();
        let previous = feed.record(21.0, later);
        assert!((previous - 19.5).abs() < f64::EPSILON);
        assert!((feed.current_value - 21.0).abs() < f64::EPSILON);
        assert_eq!(feed.updated_at, later);
    }

    #[test]
    fn should_carry_both_values_in_changed_event() {
        let mut feed = Feed::new(PremisesId::new(), "Boiler setpoint", 40.0, crate::time::now());
        let previous = feed.record(55.0, crate::time::now());
        let event = feed.value_changed_event(previous);
        assert_eq!(event.event_type, EventType::FeedValueChanged);
        assert_eq!(event.data["feed_id"], serde_json::json!(feed.id));
        assert_eq!(event.data["previous_value"], 40.0);
        assert_eq!(event.data["value"], 55.0);
    }

    #[test]
    fn should_read_back_reading_from_changed_event() {
        let mut feed = Feed::new(PremisesId::new(), "Hallway", 0.0, crate::time::now());
        let previous = feed.record(1.0, crate::time::now());

        let reading = FeedReading::from_event(&feed.value_changed_event(previous));

        assert_eq!(reading, Some(feed.reading(previous)));
        assert!(reading.is_some_and(|r| r.is_change()));
    }

    #[test]
    fn should_not_read_event_with_malformed_feed_id() {
        let event = Event::new(
            EventType::FeedValueChanged,
            PremisesId::new(),
            serde_json::json!({ "feed_id": "not-a-uuid", "previous_value": 0.0, "value": 1.0 }),
            crate::time::now(),
        );

        assert_eq!(FeedReading::from_event(&event), None);
    }

    #[test]
    fn should_not_count_rewriting_the_same_value_as_change() {
        let mut feed = Feed::new(PremisesId::new(), "Porch lamp", 1.0, crate::time::now());
        let previous = feed.record(1.0, crate::time::now());
        assert!(!feed.reading(previous).is_change());
    }
}
