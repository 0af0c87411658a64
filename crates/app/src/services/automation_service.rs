//! Automation service: use-cases for managing automations.
//!
//! Automations are never deleted; disabling one is the way to retire it.

use std::sync::Arc;

use homerule_domain::automation::{Action, Automation, Condition, RuleComponent, Trigger};
use homerule_domain::error::{HomeRuleError, NotFoundError, ValidationError};
use homerule_domain::event::Event;
use homerule_domain::id::{AutomationId, PremisesId, UserId};
use homerule_domain::time::Timestamp;

use super::authorize;
use crate::ports::{
    AccessPolicy, AutomationRepository, Clock, ComponentRepository, EventPublisher, Operation,
    SystemClock,
};
use crate::resolver::ResolverRegistry;

/// Application service for automation definitions.
pub struct AutomationService<AR, CR, A, P> {
    automations: AR,
    components: CR,
    access: A,
    publisher: P,
    registry: Arc<ResolverRegistry>,
    clock: Arc<dyn Clock>,
}

impl<AR, CR, A, P> AutomationService<AR, CR, A, P>
where
    AR: AutomationRepository,
    CR: ComponentRepository,
    A: AccessPolicy,
    P: EventPublisher,
{
    pub fn new(
        automations: AR,
        components: CR,
        access: A,
        publisher: P,
        registry: Arc<ResolverRegistry>,
    ) -> Self {
        Self {
            automations,
            components,
            access,
            publisher,
            registry,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create a new automation after validating domain invariants and every
    /// component it references.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Forbidden`] when the policy refuses,
    /// [`HomeRuleError::Validation`] if invariants fail or a component
    /// belongs to another premises, [`HomeRuleError::NotFound`] for an
    /// unknown trigger or action, [`HomeRuleError::Resolution`] if an action
    /// already points at missing live data, [`HomeRuleError::Conflict`] for a
    /// duplicate definition, or a storage error.
    #[tracing::instrument(skip(self, automation), fields(automation_name = %automation.name, premises_id = %automation.premises_id))]
    pub async fn create_automation(
        &self,
        user_id: UserId,
        automation: Automation,
    ) -> Result<Automation, HomeRuleError> {
        authorize(
            &self.access,
            user_id,
            automation.premises_id,
            Operation::CreateAutomation,
        )
        .await?;
        automation.validate()?;

        for trigger_id in &automation.trigger_ids {
            self.owned::<Trigger>(automation.premises_id, *trigger_id)
                .await?;
        }
        if let Some(condition) = &automation.condition {
            for condition_id in condition.leaves() {
                let found = self
                    .components
                    .get_by_id::<Condition>(*condition_id)
                    .await?
                    .ok_or(ValidationError::UnknownCondition(*condition_id))?;
                check_premises(automation.premises_id, &found)?;
            }
        }
        let mut actions = Vec::with_capacity(automation.action_ids.len());
        for action_id in &automation.action_ids {
            let action = self.owned::<Action>(automation.premises_id, *action_id).await?;
            actions.push(action.into());
        }
        self.registry.resolve_all(actions).await?;

        let created = self.automations.create(automation).await?;
        tracing::info!(automation_id = %created.id, "automation created");
        self.publish(vec![created.created_event(self.clock.now())])
            .await;
        Ok(created)
    }

    /// Look up an automation by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::NotFound`] when no automation with `id`
    /// exists, [`HomeRuleError::Forbidden`], or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn get_automation(
        &self,
        user_id: UserId,
        id: AutomationId,
    ) -> Result<Automation, HomeRuleError> {
        let automation = self.load(id).await?;
        authorize(
            &self.access,
            user_id,
            automation.premises_id,
            Operation::ReadAutomation,
        )
        .await?;
        Ok(automation)
    }

    /// List the automations of a premises.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Forbidden`] or a storage error.
    pub async fn list_automations(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
    ) -> Result<Vec<Automation>, HomeRuleError> {
        authorize(&self.access, user_id, premises_id, Operation::ReadAutomation).await?;
        self.automations.find_by_premises(premises_id).await
    }

    /// Make an automation react to its triggers again.
    ///
    /// # Errors
    ///
    /// See [`disable_automation`](Self::disable_automation).
    pub async fn enable_automation(
        &self,
        user_id: UserId,
        id: AutomationId,
    ) -> Result<(Automation, Vec<Event>), HomeRuleError> {
        self.switch(user_id, id, Automation::enable).await
    }

    /// Stop an automation from reacting to its triggers. Runs already in
    /// flight are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::NotFound`], [`HomeRuleError::Forbidden`],
    /// [`HomeRuleError::Conflict`] when someone else changed the automation
    /// meanwhile, or a storage error.
    pub async fn disable_automation(
        &self,
        user_id: UserId,
        id: AutomationId,
    ) -> Result<(Automation, Vec<Event>), HomeRuleError> {
        self.switch(user_id, id, Automation::disable).await
    }

    #[tracing::instrument(skip(self, change))]
    async fn switch(
        &self,
        user_id: UserId,
        id: AutomationId,
        change: fn(&mut Automation, Timestamp) -> Vec<Event>,
    ) -> Result<(Automation, Vec<Event>), HomeRuleError> {
        let mut automation = self.load(id).await?;
        authorize(
            &self.access,
            user_id,
            automation.premises_id,
            Operation::UpdateAutomation,
        )
        .await?;
        let events = change(&mut automation, self.clock.now());
        if events.is_empty() {
            return Ok((automation, events));
        }
        let updated = self.automations.update(automation).await?;
        tracing::info!(state = updated.state.as_str(), "automation state changed");
        self.publish(events.clone()).await;
        Ok((updated, events))
    }

    async fn load(&self, id: AutomationId) -> Result<Automation, HomeRuleError> {
        self.automations.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "automation",
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn owned<C: RuleComponent>(
        &self,
        premises_id: PremisesId,
        id: C::Id,
    ) -> Result<C, HomeRuleError> {
        let component = self
            .components
            .get_by_id::<C>(id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: C::KIND.as_str(),
                id: id.to_string(),
            })?;
        check_premises(premises_id, &component)?;
        Ok(component)
    }

    async fn publish(&self, events: Vec<Event>) {
        for event in events {
            if let Err(error) = self.publisher.publish(event).await {
                tracing::warn!(%error, "failed to publish event");
            }
        }
    }
}

fn check_premises<C: RuleComponent>(
    premises_id: PremisesId,
    component: &C,
) -> Result<(), ValidationError> {
    if component.premises_id() == premises_id {
        Ok(())
    } else {
        Err(ValidationError::TenantMismatch {
            component: C::KIND.as_str(),
            id: component.id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveTime;

    use homerule_domain::automation::{
        ActionConfig, AutomationState, AutomationTriggerConfig, ConditionConfig, FeedControlConfig,
        ScheduleAt, ScheduleTriggerConfig, TimeRangeConfig, TriggerConfig, WaitConfig,
    };
    use homerule_domain::error::{ConflictError, ResolutionError};
    use homerule_domain::event::EventType;
    use homerule_domain::id::{ConditionId, FeedId, TriggerId};
    use homerule_domain::specification::Specification;

    use super::*;
    use crate::ports::AllowAll;
    use crate::services::test_support::Grants;
    use crate::testing::{InMemoryAutomations, InMemoryComponents, InMemoryFeeds, SpyPublisher};

    type TestService<A> = AutomationService<
        Arc<InMemoryAutomations>,
        Arc<InMemoryComponents>,
        A,
        Arc<SpyPublisher>,
    >;

    struct Fixture<A> {
        svc: TestService<A>,
        components: Arc<InMemoryComponents>,
        publisher: Arc<SpyPublisher>,
        premises: PremisesId,
        trigger: Trigger,
        action: Action,
    }

    fn fixture_with<A: AccessPolicy>(access: A) -> Fixture<A> {
        let premises = PremisesId::new();
        let automations = Arc::new(InMemoryAutomations::default());
        let components = Arc::new(InMemoryComponents::default());
        let feeds = Arc::new(InMemoryFeeds::default());
        let publisher = Arc::new(SpyPublisher::default());
        let registry = ResolverRegistry::standard(feeds, Arc::clone(&automations)).unwrap();

        let trigger = Trigger::new(
            premises,
            TriggerConfig::Schedule(ScheduleTriggerConfig {
                at: ScheduleAt::Time {
                    time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                },
                repeat: BTreeSet::new(),
            }),
        );
        let action = Action::new(
            premises,
            ActionConfig::Wait(WaitConfig {
                duration_minutes: 1,
            }),
        );
        components.insert(&trigger);
        components.insert(&action);

        Fixture {
            svc: AutomationService::new(
                automations,
                Arc::clone(&components),
                access,
                Arc::clone(&publisher),
                Arc::new(registry),
            ),
            components,
            publisher,
            premises,
            trigger,
            action,
        }
    }

    fn fixture() -> Fixture<AllowAll> {
        fixture_with(AllowAll)
    }

    impl<A> Fixture<A> {
        fn automation(&self) -> homerule_domain::automation::AutomationBuilder {
            Automation::builder()
                .premises_id(self.premises)
                .name("Night mode")
                .trigger(self.trigger.id)
                .action(self.action.id)
        }
    }

    #[tokio::test]
    async fn should_create_automation_and_publish_created_event() {
        let f = fixture();
        let automation = f.automation().build().unwrap();
        let id = automation.id;

        let created = f
            .svc
            .create_automation(UserId::new(), automation)
            .await
            .unwrap();

        assert_eq!(created.id, id);
        assert_eq!(created.version, 1);
        assert_eq!(f.publisher.of_type(EventType::AutomationCreated).len(), 1);
        let fetched = f.svc.get_automation(UserId::new(), id).await.unwrap();
        assert_eq!(fetched.name, "Night mode");
    }

    #[tokio::test]
    async fn should_reject_duplicate_automation_definition() {
        let f = fixture();
        f.svc
            .create_automation(UserId::new(), f.automation().build().unwrap())
            .await
            .unwrap();

        let err = f
            .svc
            .create_automation(
                UserId::new(),
                f.automation().name("Same rule, new name").build().unwrap(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HomeRuleError::Conflict(ConflictError::Duplicate { .. })
        ));
        assert_eq!(f.publisher.of_type(EventType::AutomationCreated).len(), 1);
    }

    #[tokio::test]
    async fn should_reject_unknown_trigger() {
        let f = fixture();
        let automation = f.automation().trigger(TriggerId::new()).build().unwrap();

        let err = f
            .svc
            .create_automation(UserId::new(), automation)
            .await
            .unwrap_err();

        assert!(matches!(err, HomeRuleError::NotFound(NotFoundError { entity: "trigger", .. })));
    }

    #[tokio::test]
    async fn should_reject_unknown_condition_leaf() {
        let f = fixture();
        let missing = ConditionId::new();
        let automation = f
            .automation()
            .condition(Specification::leaf(missing))
            .build()
            .unwrap();

        let err = f
            .svc
            .create_automation(UserId::new(), automation)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HomeRuleError::Validation(ValidationError::UnknownCondition(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn should_reject_component_of_another_premises() {
        let f = fixture();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let foreign = Condition::new(
            PremisesId::new(),
            ConditionConfig::TimeRange(TimeRangeConfig {
                start: noon,
                end: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            }),
        );
        f.components.insert(&foreign);
        let automation = f
            .automation()
            .condition(Specification::leaf(foreign.id))
            .build()
            .unwrap();

        let err = f
            .svc
            .create_automation(UserId::new(), automation)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HomeRuleError::Validation(ValidationError::TenantMismatch { component: "condition", .. })
        ));
    }

    #[tokio::test]
    async fn should_reject_action_pointing_at_missing_live_data() {
        let f = fixture();
        let dead_feed = Action::new(
            f.premises,
            ActionConfig::FeedControl(FeedControlConfig {
                feed_id: FeedId::new(),
                value: 1.0,
            }),
        );
        let dead_chain = Action::new(
            f.premises,
            ActionConfig::AutomationTrigger(AutomationTriggerConfig {
                automation_id: AutomationId::new(),
            }),
        );
        f.components.insert(&dead_feed);
        f.components.insert(&dead_chain);

        let feed_err = f
            .svc
            .create_automation(UserId::new(), f.automation().action(dead_feed.id).build().unwrap())
            .await
            .unwrap_err();
        let chain_err = f
            .svc
            .create_automation(UserId::new(), f.automation().action(dead_chain.id).build().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            feed_err,
            HomeRuleError::Resolution(ResolutionError::MissingFeed(_))
        ));
        assert!(matches!(
            chain_err,
            HomeRuleError::Resolution(ResolutionError::MissingAutomation(_))
        ));
    }

    #[tokio::test]
    async fn should_disable_and_enable_with_events_after_write() {
        let f = fixture();
        let created = f
            .svc
            .create_automation(UserId::new(), f.automation().build().unwrap())
            .await
            .unwrap();

        let (disabled, events) = f
            .svc
            .disable_automation(UserId::new(), created.id)
            .await
            .unwrap();
        let (again, no_events) = f
            .svc
            .disable_automation(UserId::new(), created.id)
            .await
            .unwrap();
        let (enabled, _) = f
            .svc
            .enable_automation(UserId::new(), created.id)
            .await
            .unwrap();

        assert_eq!(disabled.state, AutomationState::Inactive);
        assert_eq!(disabled.version, 2);
        assert_eq!(events.len(), 1);
        assert_eq!(again.version, 2);
        assert!(no_events.is_empty());
        assert_eq!(enabled.state, AutomationState::Active);
        assert_eq!(enabled.version, 3);
        assert_eq!(f.publisher.of_type(EventType::AutomationDisabled).len(), 1);
        assert_eq!(f.publisher.of_type(EventType::AutomationEnabled).len(), 1);
    }

    #[tokio::test]
    async fn should_refuse_when_policy_denies() {
        let f = fixture_with(Grants::only(&[Operation::ReadAutomation]));

        let err = f
            .svc
            .create_automation(UserId::new(), f.automation().build().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, HomeRuleError::Forbidden(_)));
        assert!(f.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn should_report_missing_automation() {
        let f = fixture();

        let err = f
            .svc
            .disable_automation(UserId::new(), AutomationId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, HomeRuleError::NotFound(_)));
    }
}
