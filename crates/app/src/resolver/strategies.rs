use async_trait::async_trait;

use homerule_domain::automation::{ActionConfig, Component, ConditionConfig, TriggerConfig};
use homerule_domain::error::{ConfigurationError, HomeRuleError, ResolutionError};
use homerule_domain::id::{AutomationId, FeedId};

use super::{LiveData, ResolveStrategy, ResolvedComponent};
use crate::ports::{AutomationRepository, FeedFacade};

/// Components whose configuration is all they need.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStrategy;

#[async_trait]
impl ResolveStrategy for IdentityStrategy {
    async fn resolve(&self, component: Component) -> Result<ResolvedComponent, HomeRuleError> {
        Ok(ResolvedComponent {
            component,
            live: LiveData::None,
        })
    }
}

/// Reads the current value of the feed a component points at.
pub struct FeedValueStrategy<F> {
    feeds: F,
}

impl<F: FeedFacade> FeedValueStrategy<F> {
    pub fn new(feeds: F) -> Self {
        Self { feeds }
    }
}

fn feed_of(component: &Component) -> Option<FeedId> {
    match component {
        Component::Trigger(trigger) => match &trigger.config {
            TriggerConfig::Feed(config) => Some(config.feed_id),
            _ => None,
        },
        Component::Condition(condition) => match &condition.config {
            ConditionConfig::Feed(config) => Some(config.feed_id),
            ConditionConfig::TimeRange(_) => None,
        },
        Component::Action(action) => match &action.config {
            ActionConfig::FeedControl(config) => Some(config.feed_id),
            _ => None,
        },
    }
}

#[async_trait]
impl<F: FeedFacade> ResolveStrategy for FeedValueStrategy<F> {
    async fn resolve(&self, component: Component) -> Result<ResolvedComponent, HomeRuleError> {
        let feed_id = feed_of(&component)
            .ok_or_else(|| ConfigurationError::UnregisteredComponent(component.tag().to_string()))?;
        let feed = self
            .feeds
            .get_feed_by_id(feed_id)
            .await?
            .ok_or(ResolutionError::MissingFeed(feed_id))?;
        if feed.premises_id != component.premises_id() {
            return Err(ResolutionError::ForeignComponent {
                component: "feed",
                id: feed_id.to_string(),
            }
            .into());
        }
        Ok(ResolvedComponent {
            component,
            live: LiveData::Feed(feed),
        })
    }
}

/// Confirms the automation a chaining action targets still exists.
pub struct AutomationLookupStrategy<AR> {
    automations: AR,
}

impl<AR: AutomationRepository> AutomationLookupStrategy<AR> {
    pub fn new(automations: AR) -> Self {
        Self { automations }
    }
}

fn chain_target(component: &Component) -> Option<AutomationId> {
    match component {
        Component::Action(action) => match &action.config {
            ActionConfig::AutomationTrigger(config) => Some(config.automation_id),
            _ => None,
        },
        _ => None,
    }
}

#[async_trait]
impl<AR: AutomationRepository> ResolveStrategy for AutomationLookupStrategy<AR> {
    async fn resolve(&self, component: Component) -> Result<ResolvedComponent, HomeRuleError> {
        let target_id = chain_target(&component)
            .ok_or_else(|| ConfigurationError::UnregisteredComponent(component.tag().to_string()))?;
        let target = self
            .automations
            .get_by_id(target_id)
            .await?
            .ok_or(ResolutionError::MissingAutomation(target_id))?;
        if target.premises_id != component.premises_id() {
            return Err(ResolutionError::ForeignComponent {
                component: "automation",
                id: target_id.to_string(),
            }
            .into());
        }
        Ok(ResolvedComponent {
            component,
            live: LiveData::Automation(Box::new(target)),
        })
    }
}
