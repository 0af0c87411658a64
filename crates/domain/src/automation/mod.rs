//! Automation: trigger → condition → action rules.
//!
//! An [`Automation`] references its [`Trigger`]s and ordered [`Action`]s by
//! id and optionally guards them with a [`ConditionNode`] tree whose leaves
//! are [`Condition`] ids. Components are defined once per premises and shared
//! between automations.

mod action;
mod component;
mod condition;
mod trigger;

pub use action::{
    Action, ActionConfig, AutomationTriggerConfig, FeedControlConfig, MAX_WAIT_MINUTES,
    NotificationConfig, WaitConfig,
};
pub use component::{Component, ComponentKind, ComponentTag, RuleComponent};
pub use condition::{
    Condition, ConditionConfig, ConditionNode, FeedConditionConfig, TimeRangeConfig,
};
pub use trigger::{
    DayOfWeek, FeedTriggerConfig, MAX_SUN_OFFSET_MINUTES, ScheduleAt, ScheduleTick,
    ScheduleTriggerConfig, SunEvent, SunTimes, Trigger, TriggerConfig, TriggerType,
    VoiceTriggerConfig,
};

use serde::{Deserialize, Serialize};

use crate::error::{HomeRuleError, ValidationError};
use crate::event::{Event, EventType};
use crate::id::{ActionId, AutomationId, PremisesId, TriggerId};
use crate::time::Timestamp;

/// Deepest condition tree accepted at creation time.
pub const MAX_CONDITION_DEPTH: usize = 16;

/// Whether an automation reacts to its triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationState {
    #[default]
    Active,
    Inactive,
}

impl AutomationState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for AutomationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown automation state {other:?}")),
        }
    }
}

/// Admission policy when a trigger fires while a previous run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every firing starts an independent execution.
    #[default]
    Multiple,
    /// A firing is dropped while another execution is active.
    Single,
    /// A firing cancels the active execution and starts a new one.
    Replace,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Multiple => "multiple",
            Self::Single => "single",
            Self::Replace => "replace",
        }
    }

    /// Whether at most one execution may be active at a time.
    #[must_use]
    pub fn is_exclusive(self) -> bool {
        !matches!(self, Self::Multiple)
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple" => Ok(Self::Multiple),
            "single" => Ok(Self::Single),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown execution mode {other:?}")),
        }
    }
}

/// A user-defined rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub premises_id: PremisesId,
    pub name: String,
    pub trigger_ids: Vec<TriggerId>,
    pub condition: Option<ConditionNode>,
    pub action_ids: Vec<ActionId>,
    pub state: AutomationState,
    pub execution_mode: ExecutionMode,
    pub expires_on: Option<Timestamp>,
    /// Optimistic-lock version; `0` means not yet persisted.
    pub version: u64,
}

impl Automation {
    /// Create a builder for constructing an [`Automation`].
    #[must_use]
    pub fn builder() -> AutomationBuilder {
        AutomationBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `trigger_ids` is empty ([`ValidationError::NoTriggers`])
    /// - `action_ids` is empty ([`ValidationError::NoActions`])
    /// - the condition tree is deeper than [`MAX_CONDITION_DEPTH`]
    pub fn validate(&self) -> Result<(), HomeRuleError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.trigger_ids.is_empty() {
            return Err(ValidationError::NoTriggers.into());
        }
        if self.action_ids.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        if let Some(condition) = &self.condition
            && condition.depth() > MAX_CONDITION_DEPTH
        {
            return Err(ValidationError::ConditionTreeTooDeep {
                max: MAX_CONDITION_DEPTH,
            }
            .into());
        }
        Ok(())
    }

    /// Whether the automation should react to a trigger at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.state == AutomationState::Active && self.expires_on.is_none_or(|at| now < at)
    }

    /// Whether `trigger_id` is one of this automation's triggers.
    #[must_use]
    pub fn listens_to(&self, trigger_id: TriggerId) -> bool {
        self.trigger_ids.contains(&trigger_id)
    }

    /// Canonical text of the rule definition (triggers, condition, actions),
    /// used to detect duplicate automations within a premises.
    #[must_use]
    pub fn definition_key(&self) -> String {
        let mut triggers = self.trigger_ids.clone();
        triggers.sort();
        serde_json::json!({
            "triggers": triggers,
            "condition": self.condition,
            "actions": self.action_ids,
        })
        .to_string()
    }

    /// Event announcing a newly created automation.
    #[must_use]
    pub fn created_event(&self, now: Timestamp) -> Event {
        self.event(EventType::AutomationCreated, now)
    }

    /// Switch to [`AutomationState::Active`].
    ///
    /// Returns the events caused by the change; none when already active.
    pub fn enable(&mut self, now: Timestamp) -> Vec<Event> {
        self.switch(AutomationState::Active, EventType::AutomationEnabled, now)
    }

    /// Switch to [`AutomationState::Inactive`].
    ///
    /// Returns the events caused by the change; none when already inactive.
    pub fn disable(&mut self, now: Timestamp) -> Vec<Event> {
        self.switch(AutomationState::Inactive, EventType::AutomationDisabled, now)
    }

    fn switch(&mut self, state: AutomationState, event_type: EventType, now: Timestamp) -> Vec<Event> {
        if self.state == state {
            return Vec::new();
        }
        self.state = state;
        vec![self.event(event_type, now)]
    }

    fn event(&self, event_type: EventType, now: Timestamp) -> Event {
        Event::new(
            event_type,
            self.premises_id,
            serde_json::json!({
                "automation_id": self.id,
                "automation_name": self.name,
            }),
            now,
        )
    }
}

/// Step-by-step builder for [`Automation`].
#[derive(Debug, Default)]
pub struct AutomationBuilder {
    id: Option<AutomationId>,
    premises_id: Option<PremisesId>,
    name: Option<String>,
    trigger_ids: Vec<TriggerId>,
    condition: Option<ConditionNode>,
    action_ids: Vec<ActionId>,
    state: Option<AutomationState>,
    execution_mode: Option<ExecutionMode>,
    expires_on: Option<Timestamp>,
}

impl AutomationBuilder {
    #[must_use]
    pub fn id(mut self, id: AutomationId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn premises_id(mut self, premises_id: PremisesId) -> Self {
        self.premises_id = Some(premises_id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger_id: TriggerId) -> Self {
        self.trigger_ids.push(trigger_id);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: ConditionNode) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action_id: ActionId) -> Self {
        self.action_ids.push(action_id);
        self
    }

    #[must_use]
    pub fn state(mut self, state: AutomationState) -> Self {
        self.state = Some(state);
        self
    }

    #[must_use]
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn expires_on(mut self, ts: Timestamp) -> Self {
        self.expires_on = Some(ts);
        self
    }

    /// Consume the builder, validate, and return an [`Automation`].
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<Automation, HomeRuleError> {
        let automation = Automation {
            id: self.id.unwrap_or_default(),
            premises_id: self.premises_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            trigger_ids: self.trigger_ids,
            condition: self.condition,
            action_ids: self.action_ids,
            state: self.state.unwrap_or_default(),
            execution_mode: self.execution_mode.unwrap_or_default(),
            expires_on: self.expires_on,
            version: 0,
        };
        automation.validate()?;
        Ok(automation)
    }
}
