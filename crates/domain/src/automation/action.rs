//! Action: one step of an automation's ordered action list.

use serde::{Deserialize, Serialize};

use crate::error::{HomeRuleError, ValidationError};
use crate::id::{ActionId, AutomationId, FeedId, PremisesId};

/// Longest wait an action may request, in minutes.
pub const MAX_WAIT_MINUTES: u32 = 60;

/// A tenant-scoped step executed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub premises_id: PremisesId,
    pub config: ActionConfig,
}

/// Typed configuration of an [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Write `value` to a feed.
    FeedControl(FeedControlConfig),
    /// Suspend the execution for a number of minutes.
    Wait(WaitConfig),
    /// Ask the notification context to deliver a message.
    Notification(NotificationConfig),
    /// Start another automation.
    AutomationTrigger(AutomationTriggerConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedControlConfig {
    pub feed_id: FeedId,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub duration_minutes: u32,
}

impl WaitConfig {
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.duration_minutes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub title: String,
    pub message: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationTriggerConfig {
    pub automation_id: AutomationId,
}

impl ActionConfig {
    /// Check the configuration is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Validation`] when a wait lies outside
    /// `0..=`[`MAX_WAIT_MINUTES`], a notification has no title or no
    /// recipients, or a feed value is not finite.
    pub fn validate(&self) -> Result<(), HomeRuleError> {
        match self {
            Self::FeedControl(control) => {
                if !control.value.is_finite() {
                    return Err(ValidationError::NonFiniteValue.into());
                }
            }
            Self::Wait(wait) => {
                if wait.duration_minutes > MAX_WAIT_MINUTES {
                    return Err(ValidationError::WaitDurationOutOfRange {
                        minutes: wait.duration_minutes,
                    }
                    .into());
                }
            }
            Self::Notification(notification) => {
                if notification.title.trim().is_empty() {
                    return Err(ValidationError::EmptyNotificationTitle.into());
                }
                if notification.recipients.is_empty() {
                    return Err(ValidationError::NoRecipients.into());
                }
            }
            Self::AutomationTrigger(_) => {}
        }
        Ok(())
    }
}

impl Action {
    #[must_use]
    pub fn new(premises_id: PremisesId, config: ActionConfig) -> Self {
        Self {
            id: ActionId::new(),
            premises_id,
            config,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.config {
            ActionConfig::FeedControl(control) => {
                write!(f, "feed_control({} = {})", control.feed_id, control.value)
            }
            ActionConfig::Wait(wait) => write!(f, "wait({}m)", wait.duration_minutes),
            ActionConfig::Notification(notification) => {
                write!(f, "notify({})", notification.title)
            }
            ActionConfig::AutomationTrigger(chain) => {
                write!(f, "run_automation({})", chain.automation_id)
            }
        }
    }
}
