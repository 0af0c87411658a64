//! Shared surface of triggers, conditions, and actions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Action, ActionConfig, Condition, ConditionConfig, Trigger, TriggerConfig};
use crate::error::HomeRuleError;
use crate::id::{ActionId, ConditionId, PremisesId, TriggerId};

/// Which of the three component families a definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Trigger,
    Condition,
    Action,
}

impl ComponentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Condition => "condition",
            Self::Action => "action",
        }
    }
}

/// Runtime type of a component's configuration variant.
///
/// Resolver strategies are registered per tag; [`ComponentTag::ALL`] is the
/// closed set the registry must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentTag {
    ScheduleTrigger,
    VoiceTrigger,
    FeedTrigger,
    TimeRangeCondition,
    FeedCondition,
    FeedControlAction,
    WaitAction,
    NotificationAction,
    AutomationTriggerAction,
}

impl ComponentTag {
    pub const ALL: [Self; 9] = [
        Self::ScheduleTrigger,
        Self::VoiceTrigger,
        Self::FeedTrigger,
        Self::TimeRangeCondition,
        Self::FeedCondition,
        Self::FeedControlAction,
        Self::WaitAction,
        Self::NotificationAction,
        Self::AutomationTriggerAction,
    ];

    #[must_use]
    pub fn kind(self) -> ComponentKind {
        match self {
            Self::ScheduleTrigger | Self::VoiceTrigger | Self::FeedTrigger => {
                ComponentKind::Trigger
            }
            Self::TimeRangeCondition | Self::FeedCondition => ComponentKind::Condition,
            Self::FeedControlAction
            | Self::WaitAction
            | Self::NotificationAction
            | Self::AutomationTriggerAction => ComponentKind::Action,
        }
    }

    /// Variant name as stored alongside the config.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduleTrigger => "schedule",
            Self::VoiceTrigger => "voice",
            Self::FeedTrigger | Self::FeedCondition => "feed",
            Self::TimeRangeCondition => "time_range",
            Self::FeedControlAction => "feed_control",
            Self::WaitAction => "wait",
            Self::NotificationAction => "notification",
            Self::AutomationTriggerAction => "automation_trigger",
        }
    }
}

impl std::fmt::Display for ComponentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_str(), self.kind().as_str())
    }
}

/// Common behaviour of [`Trigger`], [`Condition`], and [`Action`].
pub trait RuleComponent:
    Clone + Send + Sync + Serialize + DeserializeOwned + Into<Component> + 'static
{
    const KIND: ComponentKind;

    type Id: Copy
        + Eq
        + std::hash::Hash
        + std::fmt::Display
        + std::str::FromStr<Err = uuid::Error>
        + Send
        + Sync
        + 'static;
    type Config: Serialize + DeserializeOwned + Send + Sync;

    /// Reassemble a component from its stored parts.
    fn from_parts(id: Self::Id, premises_id: PremisesId, config: Self::Config) -> Self;

    fn id(&self) -> Self::Id;

    fn premises_id(&self) -> PremisesId;

    fn config(&self) -> &Self::Config;

    fn tag(&self) -> ComponentTag;

    /// Check the configuration is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Validation`] describing the first problem found.
    fn validate(&self) -> Result<(), HomeRuleError>;

    /// Canonical text of the configuration, used to detect duplicate
    /// definitions within a premises.
    fn definition_key(&self) -> String {
        serde_json::to_string(self.config()).unwrap_or_default()
    }
}

impl RuleComponent for Trigger {
    const KIND: ComponentKind = ComponentKind::Trigger;
    type Id = TriggerId;
    type Config = TriggerConfig;

    fn from_parts(id: TriggerId, premises_id: PremisesId, config: TriggerConfig) -> Self {
        Self {
            id,
            premises_id,
            config,
        }
    }

    fn id(&self) -> Self::Id {
        self.id
    }

    fn premises_id(&self) -> PremisesId {
        self.premises_id
    }

    fn config(&self) -> &TriggerConfig {
        &self.config
    }

    fn tag(&self) -> ComponentTag {
        match self.config {
            TriggerConfig::Schedule(_) => ComponentTag::ScheduleTrigger,
            TriggerConfig::Voice(_) => ComponentTag::VoiceTrigger,
            TriggerConfig::Feed(_) => ComponentTag::FeedTrigger,
        }
    }

    fn validate(&self) -> Result<(), HomeRuleError> {
        self.config.validate()
    }
}

impl RuleComponent for Condition {
    const KIND: ComponentKind = ComponentKind::Condition;
    type Id = ConditionId;
    type Config = ConditionConfig;

    fn from_parts(id: ConditionId, premises_id: PremisesId, config: ConditionConfig) -> Self {
        Self {
            id,
            premises_id,
            config,
        }
    }

    fn id(&self) -> Self::Id {
        self.id
    }

    fn premises_id(&self) -> PremisesId {
        self.premises_id
    }

    fn config(&self) -> &ConditionConfig {
        &self.config
    }

    fn tag(&self) -> ComponentTag {
        match self.config {
            ConditionConfig::TimeRange(_) => ComponentTag::TimeRangeCondition,
            ConditionConfig::Feed(_) => ComponentTag::FeedCondition,
        }
    }

    fn validate(&self) -> Result<(), HomeRuleError> {
        self.config.validate()
    }
}

impl RuleComponent for Action {
    const KIND: ComponentKind = ComponentKind::Action;
    type Id = ActionId;
    type Config = ActionConfig;

    fn from_parts(id: ActionId, premises_id: PremisesId, config: ActionConfig) -> Self {
        Self {
            id,
            premises_id,
            config,
        }
    }

    fn id(&self) -> Self::Id {
        self.id
    }

    fn premises_id(&self) -> PremisesId {
        self.premises_id
    }

    fn config(&self) -> &ActionConfig {
        &self.config
    }

    fn tag(&self) -> ComponentTag {
        match self.config {
            ActionConfig::FeedControl(_) => ComponentTag::FeedControlAction,
            ActionConfig::Wait(_) => ComponentTag::WaitAction,
            ActionConfig::Notification(_) => ComponentTag::NotificationAction,
            ActionConfig::AutomationTrigger(_) => ComponentTag::AutomationTriggerAction,
        }
    }

    fn validate(&self) -> Result<(), HomeRuleError> {
        self.config.validate()
    }
}

/// Any one component, owned. This is what the resolver registry dispatches on.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Trigger(Trigger),
    Condition(Condition),
    Action(Action),
}

impl Component {
    #[must_use]
    pub fn tag(&self) -> ComponentTag {
        match self {
            Self::Trigger(trigger) => trigger.tag(),
            Self::Condition(condition) => condition.tag(),
            Self::Action(action) => action.tag(),
        }
    }

    #[must_use]
    pub fn premises_id(&self) -> PremisesId {
        match self {
            Self::Trigger(trigger) => trigger.premises_id,
            Self::Condition(condition) => condition.premises_id,
            Self::Action(action) => action.premises_id,
        }
    }
}

impl From<Trigger> for Component {
    fn from(value: Trigger) -> Self {
        Self::Trigger(value)
    }
}

impl From<Condition> for Component {
    fn from(value: Condition) -> Self {
        Self::Condition(value)
    }
}

impl From<Action> for Component {
    fn from(value: Action) -> Self {
        Self::Action(value)
    }
}
