//! Execution engine: drives an automation from trigger to completion.
//!
//! A firing goes through the [`ExecutionModeArbiter`], the admitted execution
//! is started, the condition tree is evaluated with live data, and actions run
//! strictly one after another. Progress is persisted after every step, so a
//! `Wait` simply leaves the execution `WAITING` with a due time; the
//! [`ExecutionResumer`](crate::resumer::ExecutionResumer) picks it up later,
//! possibly in another process.
//!
//! Failures of an automation's own components end its execution as `FAILED`
//! with `last_error` set. Only infrastructure errors (storage, exhausted
//! retries) are returned to the caller.

use std::sync::Arc;

use futures::future::BoxFuture;

use homerule_domain::automation::{Action, ActionConfig, Automation, Condition, ConditionConfig};
use homerule_domain::error::{HomeRuleError, ResolutionError, TransitionError};
use homerule_domain::event::{Event, EventType};
use homerule_domain::execution::AutomationExecution;
use homerule_domain::id::{ActionId, ConditionId, ExecutionId, PremisesId, TriggerId};

use crate::arbiter::{Admission, ExecutionModeArbiter};
use crate::evaluator::{LeafResolver, evaluate};
use crate::ports::{
    AutomationRepository, Clock, ComponentStore, EventPublisher, ExecutionRepository, FeedFacade,
    IdGenerator, RandomIdGenerator, SystemClock,
};
use crate::resolver::ResolverRegistry;
use crate::transition::{DEFAULT_MAX_TRANSITION_ATTEMPTS, TransitionOutcome, transition_with_retry};

/// Tunables of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Attempts per state transition before reporting a conflict.
    pub max_transition_attempts: u32,
    /// Deepest chain of automations starting automations.
    pub max_chain_depth: usize,
    /// Times the arbiter re-decides after losing an admission race.
    pub admission_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_transition_attempts: DEFAULT_MAX_TRANSITION_ATTEMPTS,
            max_chain_depth: 8,
            admission_attempts: 3,
        }
    }
}

/// The ports the engine reads and writes through.
pub struct EnginePorts<AR, CR, XR, F, P> {
    pub automations: AR,
    pub components: CR,
    pub executions: XR,
    pub feeds: F,
    pub publisher: P,
}

/// What happened to one firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// An execution was admitted; this is its state once the engine stopped
    /// driving it (terminal, or `WAITING`).
    Started(AutomationExecution),
    /// `SINGLE` mode refused the firing because `active` is still in flight.
    Denied { active: ExecutionId },
}

/// What the current action asks the engine to do next.
enum Effect {
    Continue,
    Suspend(chrono::Duration),
}

pub struct ExecutionEngine<AR, CR, XR, F, P> {
    automations: AR,
    components: CR,
    executions: XR,
    feeds: F,
    publisher: P,
    registry: Arc<ResolverRegistry>,
    arbiter: ExecutionModeArbiter<XR>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    settings: EngineSettings,
}

impl<AR, CR, XR, F, P> ExecutionEngine<AR, CR, XR, F, P>
where
    AR: AutomationRepository,
    CR: ComponentStore,
    XR: ExecutionRepository + Clone,
    F: FeedFacade,
    P: EventPublisher,
{
    /// Create an engine on the system clock with random ids.
    pub fn new(
        ports: EnginePorts<AR, CR, XR, F, P>,
        registry: Arc<ResolverRegistry>,
        settings: EngineSettings,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(RandomIdGenerator);
        Self {
            arbiter: Self::arbiter_for(&ports.executions, &ids, &clock, settings),
            automations: ports.automations,
            components: ports.components,
            executions: ports.executions,
            feeds: ports.feeds,
            publisher: ports.publisher,
            registry,
            clock,
            ids,
            settings,
        }
    }

    fn arbiter_for(
        executions: &XR,
        ids: &Arc<dyn IdGenerator>,
        clock: &Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> ExecutionModeArbiter<XR> {
        ExecutionModeArbiter::new(
            executions.clone(),
            Arc::clone(ids),
            Arc::clone(clock),
            settings.admission_attempts,
            settings.max_transition_attempts,
        )
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.arbiter = Self::arbiter_for(&self.executions, &self.ids, &self.clock, self.settings);
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self.arbiter = Self::arbiter_for(&self.executions, &self.ids, &self.clock, self.settings);
        self
    }

    pub fn automations(&self) -> &AR {
        &self.automations
    }

    pub fn components(&self) -> &CR {
        &self.components
    }

    pub fn executions(&self) -> &XR {
        &self.executions
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Start a run of `automation` for a fired trigger and drive it as far as
    /// it goes without waiting.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures: storage errors, or a conflict that
    /// outlived its retries. Both are worth retrying on the next cycle.
    pub async fn fire(
        &self,
        automation: &Automation,
        trigger_id: Option<TriggerId>,
    ) -> Result<FireOutcome, HomeRuleError> {
        self.fire_at_depth(automation, trigger_id, 0).await
    }

    fn fire_at_depth<'a>(
        &'a self,
        automation: &'a Automation,
        trigger_id: Option<TriggerId>,
        depth: usize,
    ) -> BoxFuture<'a, Result<FireOutcome, HomeRuleError>> {
        Box::pin(async move {
            let execution = match self.arbiter.admit(automation, trigger_id).await? {
                Admission::Denied { active } => return Ok(FireOutcome::Denied { active }),
                Admission::Admitted {
                    execution,
                    superseded,
                } => {
                    self.publish_all(superseded).await;
                    execution
                }
            };
            let execution = self.start(automation, execution, depth).await?;
            Ok(FireOutcome::Started(execution))
        })
    }

    /// Resume a due `WAITING` execution and drive it onwards.
    ///
    /// Returns `None` when the execution was no longer resumable (not yet
    /// due, cancelled, or already resumed by someone else).
    ///
    /// # Errors
    ///
    /// Only infrastructure failures, as for [`fire`](Self::fire).
    #[tracing::instrument(skip(self, execution), fields(execution_id = %execution.id))]
    pub async fn resume(
        &self,
        execution: AutomationExecution,
    ) -> Result<Option<AutomationExecution>, HomeRuleError> {
        let now = self.clock.now();
        let execution = match self.transition(execution, |e| e.resume(now)).await? {
            TransitionOutcome::Applied { execution, .. } => execution,
            TransitionOutcome::Skipped { .. } => return Ok(None),
        };
        match self.automations.get_by_id(execution.automation_id).await? {
            Some(automation) => self.run_actions(&automation, execution, 0).await.map(Some),
            None => {
                let error = ResolutionError::MissingAutomation(execution.automation_id);
                self.finish_failed(execution, &error.into()).await.map(Some)
            }
        }
    }

    #[tracing::instrument(skip_all, fields(execution_id = %execution.id, automation_id = %automation.id, depth = depth))]
    async fn start(
        &self,
        automation: &Automation,
        execution: AutomationExecution,
        depth: usize,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let now = self.clock.now();
        let execution = match self.transition(execution, |e| e.start(now)).await? {
            TransitionOutcome::Applied { execution, .. } => execution,
            // Cancelled by a REPLACE firing before it got going.
            TransitionOutcome::Skipped { execution, .. } => return Ok(execution),
        };

        let holds = match &automation.condition {
            None => Ok(true),
            Some(condition) => {
                let leaves = ConditionLeaves {
                    components: &self.components,
                    registry: &self.registry,
                    premises_id: automation.premises_id,
                    now,
                };
                evaluate(condition, &leaves).await
            }
        };

        match holds {
            Ok(true) => self.run_actions(automation, execution, depth).await,
            Ok(false) => {
                tracing::debug!("condition does not hold, completing without actions");
                let outcome = self.transition(execution, |e| e.complete(true, now)).await?;
                Ok(outcome.into_execution())
            }
            Err(error) => self.finish_failed(execution, &error).await,
        }
    }

    /// Run actions from `current_action_index` until done, suspended, failed,
    /// or superseded.
    async fn run_actions(
        &self,
        automation: &Automation,
        mut execution: AutomationExecution,
        depth: usize,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let count = automation.action_ids.len();
        while let Some(action_id) = automation.action_ids.get(execution.current_action_index).copied() {
            let index = execution.current_action_index;
            let effect = match self.perform(automation, action_id, &execution, depth).await {
                Ok(effect) => effect,
                Err(error) => return self.finish_failed(execution, &error).await,
            };
            let now = self.clock.now();
            let outcome = match effect {
                Effect::Continue => {
                    self.transition(execution, |e| e.advance(index, count, now))
                        .await?
                }
                Effect::Suspend(duration) => {
                    let resume_at = now + duration;
                    let outcome = self
                        .transition(execution, |e| e.suspend(index, count, resume_at, now))
                        .await?;
                    tracing::debug!(%resume_at, "execution suspended");
                    return Ok(outcome.into_execution());
                }
            };
            match outcome {
                TransitionOutcome::Applied { execution: next, .. } => execution = next,
                TransitionOutcome::Skipped { execution, .. } => {
                    tracing::info!(status = %execution.status, "execution superseded mid-run");
                    return Ok(execution);
                }
            }
        }
        let now = self.clock.now();
        let outcome = self.transition(execution, |e| e.complete(false, now)).await?;
        Ok(outcome.into_execution())
    }

    /// Execute one action's side effect.
    async fn perform(
        &self,
        automation: &Automation,
        action_id: ActionId,
        execution: &AutomationExecution,
        depth: usize,
    ) -> Result<Effect, HomeRuleError> {
        let action = self
            .components
            .get_by_id::<Action>(action_id)
            .await?
            .ok_or(ResolutionError::MissingAction(action_id))?;
        if action.premises_id != automation.premises_id {
            return Err(ResolutionError::ForeignComponent {
                component: "action",
                id: action_id.to_string(),
            }
            .into());
        }
        let resolved = self.registry.resolve(action.clone().into()).await?;
        tracing::debug!(%action, index = execution.current_action_index, "performing action");

        match &action.config {
            ActionConfig::Wait(wait) if wait.duration_minutes == 0 => Ok(Effect::Continue),
            ActionConfig::Wait(wait) => Ok(Effect::Suspend(wait.duration())),
            ActionConfig::FeedControl(control) => {
                let (feed, previous) = self
                    .feeds
                    .send_value(control.feed_id, control.value, self.clock.now())
                    .await?;
                if feed.reading(previous).is_change() {
                    self.publish_all(vec![feed.value_changed_event(previous)]).await;
                } else {
                    tracing::debug!(feed_id = %feed.id, "feed already at target value");
                }
                Ok(Effect::Continue)
            }
            ActionConfig::Notification(notification) => {
                let event = Event::new(
                    EventType::NotificationRequested,
                    automation.premises_id,
                    serde_json::json!({
                        "automation_id": automation.id,
                        "execution_id": execution.id,
                        "title": notification.title,
                        "message": notification.message,
                        "recipients": notification.recipients,
                    }),
                    self.clock.now(),
                );
                self.publish_all(vec![event]).await;
                Ok(Effect::Continue)
            }
            ActionConfig::AutomationTrigger(chain) => {
                if depth >= self.settings.max_chain_depth {
                    return Err(ResolutionError::ChainTooDeep {
                        limit: self.settings.max_chain_depth,
                    }
                    .into());
                }
                let target = resolved
                    .automation()
                    .ok_or(ResolutionError::MissingAutomation(chain.automation_id))?;
                if target.is_active_at(self.clock.now()) {
                    let outcome = self.fire_at_depth(target, None, depth + 1).await?;
                    tracing::debug!(chained = %target.id, ?outcome, "chained automation fired");
                } else {
                    tracing::debug!(chained = %target.id, "chained automation inactive, skipped");
                }
                Ok(Effect::Continue)
            }
        }
    }

    async fn finish_failed(
        &self,
        execution: AutomationExecution,
        error: &HomeRuleError,
    ) -> Result<AutomationExecution, HomeRuleError> {
        tracing::warn!(
            execution_id = %execution.id,
            index = execution.current_action_index,
            %error,
            "execution failed"
        );
        let message = error.to_string();
        let now = self.clock.now();
        let outcome = self
            .transition(execution, move |e| e.fail(message.clone(), now))
            .await?;
        Ok(outcome.into_execution())
    }

    /// Persist a transition with retry and publish its events once stored.
    async fn transition<T>(
        &self,
        execution: AutomationExecution,
        apply: T,
    ) -> Result<TransitionOutcome, HomeRuleError>
    where
        T: FnMut(&mut AutomationExecution) -> Result<Vec<Event>, TransitionError> + Send,
    {
        let outcome = transition_with_retry(
            &self.executions,
            execution,
            self.settings.max_transition_attempts,
            apply,
        )
        .await?;
        if let TransitionOutcome::Applied { events, .. } = &outcome {
            self.publish_all(events.clone()).await;
        }
        Ok(outcome)
    }

    /// Publication is fire-and-forget: the state is already stored.
    async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            let topic = event.topic();
            if let Err(error) = self.publisher.publish(event).await {
                tracing::warn!(topic, %error, "failed to publish event");
            }
        }
    }
}

/// Resolves condition ids for the evaluator.
struct ConditionLeaves<'a, CR> {
    components: &'a CR,
    registry: &'a ResolverRegistry,
    premises_id: PremisesId,
    now: homerule_domain::time::Timestamp,
}

impl<CR: ComponentStore> LeafResolver<ConditionId> for ConditionLeaves<'_, CR> {
    async fn resolve_leaf(&self, leaf: &ConditionId) -> Result<bool, HomeRuleError> {
        let condition = self
            .components
            .get_by_id::<Condition>(*leaf)
            .await?
            .ok_or(ResolutionError::MissingCondition(*leaf))?;
        if condition.premises_id != self.premises_id {
            return Err(ResolutionError::ForeignComponent {
                component: "condition",
                id: leaf.to_string(),
            }
            .into());
        }
        let resolved = self.registry.resolve(condition.clone().into()).await?;
        let holds = match &condition.config {
            ConditionConfig::TimeRange(range) => range.contains(self.now.time()),
            ConditionConfig::Feed(config) => {
                let feed = resolved
                    .feed()
                    .ok_or(ResolutionError::MissingFeed(config.feed_id))?;
                config.holds_for(feed.current_value)
            }
        };
        tracing::trace!(condition_id = %leaf, holds, "condition resolved");
        Ok(holds)
    }
}
