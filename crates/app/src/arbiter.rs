//! Execution-mode arbiter: admission control for overlapping runs.
//!
//! | mode       | active run exists           | no active run |
//! |------------|-----------------------------|---------------|
//! | `MULTIPLE` | admit                       | admit         |
//! | `SINGLE`   | deny                        | admit         |
//! | `REPLACE`  | cancel it, then admit       | admit         |
//!
//! The check and the insert are two steps. `SINGLE` and `REPLACE` insert
//! with [`AdmissionGuard::Exclusive`], so a competing admission that slipped
//! in between makes the insert fail; the arbiter then re-runs its whole
//! decision against the new state, a bounded number of times.

use std::sync::Arc;

use homerule_domain::automation::{Automation, ExecutionMode};
use homerule_domain::error::{ConflictError, HomeRuleError};
use homerule_domain::event::Event;
use homerule_domain::execution::AutomationExecution;
use homerule_domain::id::{ExecutionId, TriggerId};

use crate::ports::{AdmissionGuard, Clock, ExecutionRepository, IdGenerator};
use crate::transition::{TransitionOutcome, transition_with_retry};

/// Decision for one trigger firing.
#[derive(Debug)]
pub enum Admission {
    /// A new `PENDING` execution was stored. `superseded` holds the events of
    /// runs cancelled to make room for it.
    Admitted {
        execution: AutomationExecution,
        superseded: Vec<Event>,
    },
    /// `SINGLE` mode and `active` is still in flight.
    Denied { active: ExecutionId },
}

pub struct ExecutionModeArbiter<XR> {
    executions: XR,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    admission_attempts: u32,
    max_transition_attempts: u32,
}

impl<XR: ExecutionRepository> ExecutionModeArbiter<XR> {
    pub fn new(
        executions: XR,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        admission_attempts: u32,
        max_transition_attempts: u32,
    ) -> Self {
        Self {
            executions,
            ids,
            clock,
            admission_attempts,
            max_transition_attempts,
        }
    }

    /// Decide whether `automation` may start a new run.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::ActiveExecution`] when every admission attempt
    /// lost a race, or a storage error.
    #[tracing::instrument(skip(self, automation), fields(automation_id = %automation.id, mode = automation.execution_mode.as_str()))]
    pub async fn admit(
        &self,
        automation: &Automation,
        trigger_id: Option<TriggerId>,
    ) -> Result<Admission, HomeRuleError> {
        let mut superseded = Vec::new();
        for attempt in 1..=self.admission_attempts {
            let guard = match automation.execution_mode {
                ExecutionMode::Multiple => AdmissionGuard::Shared,
                ExecutionMode::Single => {
                    let active = self
                        .executions
                        .find_active_by_automation_id(automation.id)
                        .await?;
                    if let Some(running) = active.first() {
                        tracing::info!(active = %running.id, "single mode, firing dropped");
                        return Ok(Admission::Denied { active: running.id });
                    }
                    AdmissionGuard::Exclusive
                }
                ExecutionMode::Replace => {
                    superseded.extend(self.cancel_active(automation).await?);
                    AdmissionGuard::Exclusive
                }
            };

            let pending = AutomationExecution::pending(
                self.ids.next_execution_id(),
                automation.premises_id,
                automation.id,
                trigger_id,
                self.clock.now(),
            );
            match self.executions.create(pending, guard).await {
                Ok(execution) => {
                    tracing::debug!(execution_id = %execution.id, "execution admitted");
                    return Ok(Admission::Admitted {
                        execution,
                        superseded,
                    });
                }
                Err(HomeRuleError::Conflict(ConflictError::ActiveExecution { .. })) => {
                    tracing::debug!(attempt, "admission raced with another run, deciding again");
                }
                Err(err) => return Err(err),
            }
        }
        Err(ConflictError::ActiveExecution {
            automation_id: automation.id,
        }
        .into())
    }

    /// Cancel every non-terminal run of `automation`, returning the events.
    async fn cancel_active(&self, automation: &Automation) -> Result<Vec<Event>, HomeRuleError> {
        let mut events = Vec::new();
        for active in self
            .executions
            .find_active_by_automation_id(automation.id)
            .await?
        {
            let now = self.clock.now();
            let outcome = transition_with_retry(
                &self.executions,
                active,
                self.max_transition_attempts,
                |execution| execution.cancel(now),
            )
            .await?;
            if let TransitionOutcome::Applied {
                execution,
                events: cancelled,
            } = outcome
            {
                tracing::info!(cancelled = %execution.id, "replace mode, previous run cancelled");
                events.extend(cancelled);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use homerule_domain::execution::ExecutionStatus;
    use homerule_domain::id::ActionId;

    use super::*;
    use crate::ports::{ManualClock, RandomIdGenerator};
    use crate::testing::InMemoryExecutions;

    fn automation(mode: ExecutionMode) -> Automation {
        Automation::builder()
            .name("Hallway lights")
            .trigger(TriggerId::new())
            .action(ActionId::new())
            .execution_mode(mode)
            .build()
            .unwrap()
    }

    fn arbiter(executions: Arc<InMemoryExecutions>) -> ExecutionModeArbiter<Arc<InMemoryExecutions>> {
        ExecutionModeArbiter::new(
            executions,
            Arc::new(RandomIdGenerator),
            Arc::new(ManualClock::new(homerule_domain::time::now())),
            3,
            3,
        )
    }

    fn seeded(
        executions: &InMemoryExecutions,
        automation: &Automation,
        status: ExecutionStatus,
    ) -> AutomationExecution {
        let mut execution = AutomationExecution::pending(
            ExecutionId::new(),
            automation.premises_id,
            automation.id,
            Some(automation.trigger_ids[0]),
            homerule_domain::time::now(),
        );
        execution.status = status;
        executions.seed(execution)
    }

    #[tokio::test]
    async fn should_admit_every_firing_in_multiple_mode() {
        let executions = Arc::new(InMemoryExecutions::default());
        let arbiter = arbiter(Arc::clone(&executions));
        let auto = automation(ExecutionMode::Multiple);
        seeded(&executions, &auto, ExecutionStatus::Running);

        let admission = arbiter.admit(&auto, auto.trigger_ids.first().copied()).await.unwrap();

        assert!(matches!(admission, Admission::Admitted { .. }));
        assert_eq!(executions.all().len(), 2);
    }

    #[tokio::test]
    async fn should_deny_second_firing_while_first_runs_in_single_mode() {
        let executions = Arc::new(InMemoryExecutions::default());
        let arbiter = arbiter(Arc::clone(&executions));
        let auto = automation(ExecutionMode::Single);
        let first = seeded(&executions, &auto, ExecutionStatus::Running);

        let admission = arbiter.admit(&auto, None).await.unwrap();

        assert!(matches!(admission, Admission::Denied { active } if active == first.id));
        assert_eq!(executions.all().len(), 1);
    }

    #[tokio::test]
    async fn should_admit_in_single_mode_once_previous_run_finished() {
        let executions = Arc::new(InMemoryExecutions::default());
        let arbiter = arbiter(Arc::clone(&executions));
        let auto = automation(ExecutionMode::Single);
        seeded(&executions, &auto, ExecutionStatus::Completed);

        let admission = arbiter.admit(&auto, None).await.unwrap();

        assert!(matches!(admission, Admission::Admitted { .. }));
    }

    #[tokio::test]
    async fn should_cancel_waiting_run_and_admit_new_one_in_replace_mode() {
        let executions = Arc::new(InMemoryExecutions::default());
        let arbiter = arbiter(Arc::clone(&executions));
        let auto = automation(ExecutionMode::Replace);
        let first = seeded(&executions, &auto, ExecutionStatus::Waiting);

        let admission = arbiter.admit(&auto, None).await.unwrap();

        let Admission::Admitted {
            execution,
            superseded,
        } = admission
        else {
            panic!("replace mode always admits");
        };
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_ne!(execution.id, first.id);
        assert_eq!(executions.get(first.id).status, ExecutionStatus::Cancelled);
        assert_eq!(superseded.len(), 1);
        assert_eq!(
            superseded[0].event_type,
            homerule_domain::event::EventType::ExecutionCancelled
        );
    }

    #[tokio::test]
    async fn should_give_up_when_admission_keeps_losing_races() {
        // An active run that `find` cannot see stands in for a competing
        // admission landing between the check and the insert every time.
        struct HiddenActive(InMemoryExecutions);

        impl ExecutionRepository for HiddenActive {
            async fn create(
                &self,
                execution: AutomationExecution,
                guard: AdmissionGuard,
            ) -> Result<AutomationExecution, HomeRuleError> {
                self.0.create(execution, guard).await
            }

            async fn save(
                &self,
                execution: AutomationExecution,
            ) -> Result<AutomationExecution, HomeRuleError> {
                self.0.save(execution).await
            }

            async fn get_by_id(
                &self,
                id: ExecutionId,
            ) -> Result<Option<AutomationExecution>, HomeRuleError> {
                self.0.get_by_id(id).await
            }

            async fn find(
                &self,
                _query: homerule_domain::execution::ExecutionQuery,
            ) -> Result<Vec<AutomationExecution>, HomeRuleError> {
                Ok(Vec::new())
            }
        }

        let inner = InMemoryExecutions::default();
        let auto = automation(ExecutionMode::Single);
        seeded(&inner, &auto, ExecutionStatus::Running);
        let arbiter = ExecutionModeArbiter::new(
            HiddenActive(inner),
            Arc::new(RandomIdGenerator),
            Arc::new(ManualClock::new(homerule_domain::time::now())),
            2,
            3,
        );

        let err = arbiter.admit(&auto, None).await.unwrap_err();

        assert!(matches!(
            err,
            HomeRuleError::Conflict(ConflictError::ActiveExecution { automation_id }) if automation_id == auto.id
        ));
    }
}
