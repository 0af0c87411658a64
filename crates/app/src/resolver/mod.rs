//! Resolver strategy registry.
//!
//! Components are static definitions; some need live data before they can be
//! evaluated or executed (a feed condition needs the feed's current reading,
//! a chaining action needs the target automation). Each [`ComponentTag`] is
//! registered once with a [`ResolveStrategy`]; [`ResolverRegistryBuilder::build`]
//! refuses to produce a registry that leaves any tag uncovered, so a missing
//! strategy is a startup failure rather than a runtime surprise.

mod strategies;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use homerule_domain::automation::{Automation, Component, ComponentTag};
use homerule_domain::error::{ConfigurationError, HomeRuleError};
use homerule_domain::feed::Feed;

use crate::ports::{AutomationRepository, FeedFacade};

pub use strategies::{AutomationLookupStrategy, FeedValueStrategy, IdentityStrategy};

/// Live data attached to a component by its strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveData {
    /// The component carries everything it needs.
    None,
    Feed(Feed),
    Automation(Box<Automation>),
}

/// A component together with the live data it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedComponent {
    pub component: Component,
    pub live: LiveData,
}

impl ResolvedComponent {
    #[must_use]
    pub fn feed(&self) -> Option<&Feed> {
        match &self.live {
            LiveData::Feed(feed) => Some(feed),
            _ => None,
        }
    }

    #[must_use]
    pub fn automation(&self) -> Option<&Automation> {
        match &self.live {
            LiveData::Automation(automation) => Some(automation),
            _ => None,
        }
    }
}

/// Fetches the live data one family of components needs.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// Attach live data to `component`.
    ///
    /// Fails with a `ResolutionError` when a referenced feed or automation is
    /// gone or belongs to another premises.
    async fn resolve(&self, component: Component) -> Result<ResolvedComponent, HomeRuleError>;
}

/// Dispatches components to the strategy registered for their tag.
pub struct ResolverRegistry {
    strategies: HashMap<ComponentTag, Arc<dyn ResolveStrategy>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.strategies.keys().collect();
        tags.sort();
        f.debug_struct("ResolverRegistry").field("tags", &tags).finish()
    }
}

impl ResolverRegistry {
    #[must_use]
    pub fn builder() -> ResolverRegistryBuilder {
        ResolverRegistryBuilder::default()
    }

    /// Registry with the built-in strategies: feed-backed components read the
    /// feed facade, chaining actions look up their target automation, and
    /// everything else resolves to itself.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Configuration`] if a tag is left unregistered.
    pub fn standard<F, AR>(feeds: F, automations: AR) -> Result<Self, HomeRuleError>
    where
        F: FeedFacade + 'static,
        AR: AutomationRepository + 'static,
    {
        let feed_value: Arc<dyn ResolveStrategy> = Arc::new(FeedValueStrategy::new(feeds));
        let identity: Arc<dyn ResolveStrategy> = Arc::new(IdentityStrategy);
        Self::builder()
            .register_shared(
                &[
                    ComponentTag::FeedTrigger,
                    ComponentTag::FeedCondition,
                    ComponentTag::FeedControlAction,
                ],
                &feed_value,
            )
            .register_shared(
                &[
                    ComponentTag::ScheduleTrigger,
                    ComponentTag::VoiceTrigger,
                    ComponentTag::TimeRangeCondition,
                    ComponentTag::WaitAction,
                    ComponentTag::NotificationAction,
                ],
                &identity,
            )
            .register(
                ComponentTag::AutomationTriggerAction,
                AutomationLookupStrategy::new(automations),
            )
            .build()
            .map_err(HomeRuleError::from)
    }

    /// Resolve one component with the strategy registered for its tag.
    ///
    /// # Errors
    ///
    /// Propagates the strategy's error.
    pub async fn resolve(&self, component: Component) -> Result<ResolvedComponent, HomeRuleError> {
        let tag = component.tag();
        let strategy = self
            .strategies
            .get(&tag)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnregisteredComponent(tag.to_string()))?;
        strategy.resolve(component).await
    }

    /// Resolve independent components concurrently, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns the first error in input order once every resolution finished.
    pub async fn resolve_all(
        &self,
        components: Vec<Component>,
    ) -> Result<Vec<ResolvedComponent>, HomeRuleError> {
        let pending = components
            .into_iter()
            .map(|component| self.resolve(component));
        futures::future::join_all(pending).await.into_iter().collect()
    }
}

/// Collects strategies before validating coverage in [`build`](Self::build).
#[derive(Default)]
pub struct ResolverRegistryBuilder {
    strategies: HashMap<ComponentTag, Arc<dyn ResolveStrategy>>,
}

impl ResolverRegistryBuilder {
    #[must_use]
    pub fn register(mut self, tag: ComponentTag, strategy: impl ResolveStrategy + 'static) -> Self {
        self.strategies.insert(tag, Arc::new(strategy));
        self
    }

    /// Register one strategy instance for several tags.
    #[must_use]
    pub fn register_shared(
        mut self,
        tags: &[ComponentTag],
        strategy: &Arc<dyn ResolveStrategy>,
    ) -> Self {
        for tag in tags {
            self.strategies.insert(*tag, Arc::clone(strategy));
        }
        self
    }

    /// Finish the registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnregisteredComponent`] naming the first
    /// tag of [`ComponentTag::ALL`] without a strategy.
    pub fn build(self) -> Result<ResolverRegistry, ConfigurationError> {
        if let Some(missing) = ComponentTag::ALL
            .iter()
            .find(|tag| !self.strategies.contains_key(tag))
        {
            return Err(ConfigurationError::UnregisteredComponent(missing.to_string()));
        }
        Ok(ResolverRegistry {
            strategies: self.strategies,
        })
    }
}
