//! Trigger dispatch: turns outside stimuli into automation firings.
//!
//! Each entry point finds the triggers a stimulus matches, looks up the
//! active automations listening to them, and fires those through the engine.
//! A failing automation is recorded in the [`FireReport`] and never stops the
//! others from firing.

use std::sync::Arc;

use futures::future::join_all;

use homerule_domain::automation::{Automation, ScheduleTick, Trigger, TriggerConfig, TriggerType};
use homerule_domain::error::HomeRuleError;
use homerule_domain::feed::FeedReading;
use homerule_domain::id::{AutomationId, ExecutionId, PremisesId, TriggerId};
use homerule_domain::time::Timestamp;

use crate::engine::{ExecutionEngine, FireOutcome};
use crate::ports::{
    AutomationRepository, ComponentStore, EventPublisher, ExecutionRepository, FeedFacade,
    SunTimesSource,
};

/// What happened to the automations a stimulus reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FireReport {
    pub started: Vec<ExecutionId>,
    pub denied: Vec<AutomationId>,
    pub errored: Vec<(AutomationId, String)>,
    /// Matched triggers whose listening automations could not be looked up.
    pub unreachable: Vec<(TriggerId, String)>,
}

impl FireReport {
    pub fn merge(&mut self, other: Self) {
        self.started.extend(other.started);
        self.denied.extend(other.denied);
        self.errored.extend(other.errored);
        self.unreachable.extend(other.unreachable);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.denied.is_empty()
            && self.errored.is_empty()
            && self.unreachable.is_empty()
    }
}

pub struct TriggerDispatcher<AR, CR, XR, F, P, S> {
    engine: Arc<ExecutionEngine<AR, CR, XR, F, P>>,
    sun: S,
}

impl<AR, CR, XR, F, P, S> TriggerDispatcher<AR, CR, XR, F, P, S>
where
    AR: AutomationRepository,
    CR: ComponentStore,
    XR: ExecutionRepository + Clone,
    F: FeedFacade,
    P: EventPublisher,
    S: SunTimesSource,
{
    pub fn new(engine: Arc<ExecutionEngine<AR, CR, XR, F, P>>, sun: S) -> Self {
        Self { engine, sun }
    }

    /// React to a feed moving from one value to another.
    ///
    /// Feed triggers are edge-triggered: only a reading that crosses into the
    /// firing side of the threshold fires. A write that leaves the value
    /// unchanged fires nothing, so an automation driving its own trigger feed
    /// settles instead of re-firing itself.
    ///
    /// # Errors
    ///
    /// Returns an error only if the trigger lookup fails.
    #[tracing::instrument(skip(self))]
    pub async fn on_feed_changed(
        &self,
        premises_id: PremisesId,
        reading: FeedReading,
    ) -> Result<FireReport, HomeRuleError> {
        if !reading.is_change() {
            return Ok(FireReport::default());
        }
        let triggers = self
            .engine
            .components()
            .find_triggers_by_feed(reading.feed_id)
            .await?;
        let matching = triggers.into_iter().filter(|trigger| {
            trigger.premises_id == premises_id
                && matches!(&trigger.config, TriggerConfig::Feed(feed) if feed.fires_on(&reading))
        });
        Ok(self.fire_all(matching).await)
    }

    /// Fire every schedule trigger due in the minute containing `at`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the trigger lookup fails. A premises whose
    /// sun times are unavailable only loses its sun-relative schedules.
    #[tracing::instrument(skip(self))]
    pub async fn on_schedule_tick(&self, at: Timestamp) -> Result<FireReport, HomeRuleError> {
        let tick = ScheduleTick::at(at);
        let triggers = self
            .engine
            .components()
            .find_triggers_by_type(None, TriggerType::Schedule)
            .await?;
        let mut due = Vec::new();
        for trigger in triggers {
            let TriggerConfig::Schedule(schedule) = &trigger.config else {
                continue;
            };
            let sun = if schedule.is_sun_relative() {
                match self.sun.sun_times(trigger.premises_id, at.date_naive()).await {
                    Ok(sun) => Some(sun),
                    Err(error) => {
                        tracing::warn!(trigger_id = %trigger.id, %error, "sun times unavailable");
                        None
                    }
                }
            } else {
                None
            };
            if schedule.is_due(&tick, sun.as_ref()) {
                due.push(trigger);
            }
        }
        Ok(self.fire_all(due).await)
    }

    /// React to a spoken command heard in a premises.
    ///
    /// # Errors
    ///
    /// Returns an error only if the trigger lookup fails.
    #[tracing::instrument(skip(self))]
    pub async fn on_voice_command(
        &self,
        premises_id: PremisesId,
        command: &str,
    ) -> Result<FireReport, HomeRuleError> {
        let triggers = self
            .engine
            .components()
            .find_triggers_by_type(Some(premises_id), TriggerType::Voice)
            .await?;
        let matching = triggers.into_iter().filter(
            |trigger| matches!(&trigger.config, TriggerConfig::Voice(voice) if voice.matches(command)),
        );
        Ok(self.fire_all(matching).await)
    }

    /// Fire every active automation of `premises_id` listening to `trigger_id`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate lookup fails.
    pub async fn fire_trigger(
        &self,
        premises_id: PremisesId,
        trigger_id: TriggerId,
    ) -> Result<FireReport, HomeRuleError> {
        let now = self.engine.clock().now();
        let candidates = self
            .engine
            .automations()
            .find_trigger_candidates(premises_id, trigger_id, now)
            .await?;
        tracing::debug!(%trigger_id, candidates = candidates.len(), "trigger fired");

        let outcomes = join_all(
            candidates
                .iter()
                .map(|automation| self.engine.fire(automation, Some(trigger_id))),
        )
        .await;

        let mut report = FireReport::default();
        for (automation, outcome) in candidates.iter().zip(outcomes) {
            record(&mut report, automation, outcome);
        }
        Ok(report)
    }

    async fn fire_all(&self, triggers: impl IntoIterator<Item = Trigger>) -> FireReport {
        let mut report = FireReport::default();
        for trigger in triggers {
            match self.fire_trigger(trigger.premises_id, trigger.id).await {
                Ok(fired) => report.merge(fired),
                Err(error) => {
                    tracing::warn!(trigger_id = %trigger.id, %error, "candidate lookup failed");
                    report.unreachable.push((trigger.id, error.to_string()));
                }
            }
        }
        report
    }
}

fn record(
    report: &mut FireReport,
    automation: &Automation,
    outcome: Result<FireOutcome, HomeRuleError>,
) {
    match outcome {
        Ok(FireOutcome::Started(execution)) => report.started.push(execution.id),
        Ok(FireOutcome::Denied { .. }) => report.denied.push(automation.id),
        Err(error) => {
            tracing::warn!(
                automation_id = %automation.id,
                %error,
                transient = error.is_transient(),
                "automation could not be fired"
            );
            report.errored.push((automation.id, error.to_string()));
        }
    }
}
