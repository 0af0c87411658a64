//! Definition service: use-cases for triggers, conditions, and actions.

use homerule_domain::automation::{
    Action, ActionConfig, ComponentKind, Condition, ConditionConfig, RuleComponent, Trigger,
    TriggerConfig,
};
use homerule_domain::error::{HomeRuleError, NotFoundError};
use homerule_domain::id::{PremisesId, UserId};

use super::authorize;
use crate::ports::{AccessPolicy, ComponentRepository, Operation};

fn create_operation(kind: ComponentKind) -> Operation {
    match kind {
        ComponentKind::Trigger => Operation::CreateTrigger,
        ComponentKind::Condition => Operation::CreateCondition,
        ComponentKind::Action => Operation::CreateAction,
    }
}

/// Application service creating and reading rule components.
pub struct DefinitionService<CR, A> {
    components: CR,
    access: A,
}

impl<CR: ComponentRepository, A: AccessPolicy> DefinitionService<CR, A> {
    pub fn new(components: CR, access: A) -> Self {
        Self { components, access }
    }

    /// Store a new component after validating its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::Forbidden`] when the policy refuses,
    /// [`HomeRuleError::Validation`] for a malformed configuration, or
    /// [`HomeRuleError::Conflict`] when the premises already holds an
    /// identical definition.
    #[tracing::instrument(skip(self, component), fields(kind = C::KIND.as_str(), premises_id = %component.premises_id()))]
    pub async fn create<C: RuleComponent>(
        &self,
        user_id: UserId,
        component: C,
    ) -> Result<C, HomeRuleError> {
        authorize(
            &self.access,
            user_id,
            component.premises_id(),
            create_operation(C::KIND),
        )
        .await?;
        component.validate()?;
        let created = self.components.create(component).await?;
        tracing::info!(id = %created.id(), tag = %created.tag(), "component created");
        Ok(created)
    }

    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub async fn create_trigger(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
        config: TriggerConfig,
    ) -> Result<Trigger, HomeRuleError> {
        self.create(user_id, Trigger::new(premises_id, config)).await
    }

    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub async fn create_condition(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
        config: ConditionConfig,
    ) -> Result<Condition, HomeRuleError> {
        self.create(user_id, Condition::new(premises_id, config)).await
    }

    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub async fn create_action(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
        config: ActionConfig,
    ) -> Result<Action, HomeRuleError> {
        self.create(user_id, Action::new(premises_id, config)).await
    }

    /// Look up a component of the given premises.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::NotFound`] when the id is unknown or belongs
    /// to another premises.
    pub async fn get<C: RuleComponent>(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
        id: C::Id,
    ) -> Result<C, HomeRuleError> {
        authorize(&self.access, user_id, premises_id, Operation::ReadAutomation).await?;
        self.components
            .get_by_id::<C>(id)
            .await?
            .filter(|component| component.premises_id() == premises_id)
            .ok_or_else(|| {
                NotFoundError {
                    entity: C::KIND.as_str(),
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// # Errors
    ///
    /// Returns [`HomeRuleError::Forbidden`] or a storage error.
    pub async fn list<C: RuleComponent>(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
    ) -> Result<Vec<C>, HomeRuleError> {
        authorize(&self.access, user_id, premises_id, Operation::ReadAutomation).await?;
        self.components.find_by_premises::<C>(premises_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveTime;

    use homerule_domain::automation::{
        ScheduleAt, ScheduleTriggerConfig, TimeRangeConfig, VoiceTriggerConfig, WaitConfig,
    };
    use homerule_domain::error::{ConflictError, ValidationError};
    use homerule_domain::id::ActionId;

    use super::*;
    use crate::ports::AllowAll;
    use crate::services::test_support::Grants;
    use crate::testing::InMemoryComponents;

    fn make_service() -> DefinitionService<InMemoryComponents, AllowAll> {
        DefinitionService::new(InMemoryComponents::default(), AllowAll)
    }

    fn seven_thirty() -> TriggerConfig {
        TriggerConfig::Schedule(ScheduleTriggerConfig {
            at: ScheduleAt::Time {
                time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            },
            repeat: BTreeSet::new(),
        })
    }

    #[tokio::test]
    async fn should_create_trigger_when_valid() {
        let svc = make_service();
        let premises = PremisesId::new();

        let created = svc
            .create_trigger(UserId::new(), premises, seven_thirty())
            .await
            .unwrap();

        let fetched: Trigger = svc.get(UserId::new(), premises, created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn should_reject_duplicate_definition_in_same_premises() {
        let svc = make_service();
        let premises = PremisesId::new();
        svc.create_trigger(UserId::new(), premises, seven_thirty())
            .await
            .unwrap();

        let err = svc
            .create_trigger(UserId::new(), premises, seven_thirty())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HomeRuleError::Conflict(ConflictError::Duplicate { entity: "trigger", .. })
        ));
    }

    #[tokio::test]
    async fn should_allow_same_definition_in_another_premises() {
        let svc = make_service();
        svc.create_trigger(UserId::new(), PremisesId::new(), seven_thirty())
            .await
            .unwrap();

        let result = svc
            .create_trigger(UserId::new(), PremisesId::new(), seven_thirty())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_reject_wait_longer_than_an_hour() {
        let svc = make_service();

        let err = svc
            .create_action(
                UserId::new(),
                PremisesId::new(),
                ActionConfig::Wait(WaitConfig {
                    duration_minutes: 61,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HomeRuleError::Validation(ValidationError::WaitDurationOutOfRange { minutes: 61 })
        ));
    }

    #[tokio::test]
    async fn should_reject_empty_voice_commands_and_empty_time_range() {
        let svc = make_service();
        let premises = PremisesId::new();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let voice = svc
            .create_trigger(
                UserId::new(),
                premises,
                TriggerConfig::Voice(VoiceTriggerConfig { commands: vec![] }),
            )
            .await
            .unwrap_err();
        let range = svc
            .create_condition(
                UserId::new(),
                premises,
                ConditionConfig::TimeRange(TimeRangeConfig {
                    start: noon,
                    end: noon,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            voice,
            HomeRuleError::Validation(ValidationError::EmptyVoiceCommands)
        ));
        assert!(matches!(
            range,
            HomeRuleError::Validation(ValidationError::EmptyTimeRange)
        ));
    }

    #[tokio::test]
    async fn should_refuse_creation_when_policy_denies() {
        let svc = DefinitionService::new(
            InMemoryComponents::default(),
            Grants::only(&[Operation::CreateAction]),
        );

        let err = svc
            .create_trigger(UserId::new(), PremisesId::new(), seven_thirty())
            .await
            .unwrap_err();

        assert!(matches!(err, HomeRuleError::Forbidden(_)));
        assert!(
            svc.list::<Trigger>(UserId::new(), PremisesId::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn should_hide_components_of_other_premises() {
        let svc = make_service();
        let action = svc
            .create_action(
                UserId::new(),
                PremisesId::new(),
                ActionConfig::Wait(WaitConfig {
                    duration_minutes: 1,
                }),
            )
            .await
            .unwrap();

        let err = svc
            .get::<Action>(UserId::new(), PremisesId::new(), action.id)
            .await
            .unwrap_err();
        let unknown = svc
            .get::<Action>(UserId::new(), action.premises_id, ActionId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, HomeRuleError::NotFound(_)));
        assert!(matches!(unknown, HomeRuleError::NotFound(_)));
    }
}
