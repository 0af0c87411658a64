//! Event: an immutable record of something that happened.
//!
//! Commands return the events they cause alongside the new state; callers
//! publish them only after the state has been persisted.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, PremisesId};
use crate::time::Timestamp;

/// Kind of domain event; each maps to a stable publication topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FeedValueChanged,
    AutomationCreated,
    AutomationEnabled,
    AutomationDisabled,
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionCancelled,
    NotificationRequested,
}

impl EventType {
    /// Topic other bounded contexts subscribe to.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::FeedValueChanged => "feed.value-changed",
            Self::AutomationCreated => "automation.created",
            Self::AutomationEnabled => "automation.enabled",
            Self::AutomationDisabled => "automation.disabled",
            Self::ExecutionStarted => "automation.execution.started",
            Self::ExecutionCompleted => "automation.execution.completed",
            Self::ExecutionFailed => "automation.execution.failed",
            Self::ExecutionCancelled => "automation.execution.cancelled",
            Self::NotificationRequested => "notification.requested",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

/// A tenant-scoped domain event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub premises_id: PremisesId,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    #[must_use]
    pub fn new(
        event_type: EventType,
        premises_id: PremisesId,
        data: serde_json::Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            premises_id,
            data,
            timestamp,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &'static str {
        self.event_type.topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_expose_topic_of_event_type() {
        let event = Event::new(
            EventType::ExecutionFailed,
            PremisesId::new(),
            serde_json::json!({}),
            crate::time::now(),
        );
        assert_eq!(event.topic(), "automation.execution.failed");
    }

    #[test]
    fn should_serialize_event_type_as_snake_case() {
        let json = serde_json::to_string(&EventType::FeedValueChanged).unwrap();
        assert_eq!(json, "\"feed_value_changed\"");
    }
}
