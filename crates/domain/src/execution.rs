//! Automation execution: one run of an automation through its state machine.
//!
//! ```text
//! PENDING  --start-->     RUNNING
//! RUNNING  --advance-->   RUNNING   (current_action_index + 1)
//! RUNNING  --suspend-->   WAITING   (current_action_index + 1, resume_at set)
//!
//! advance and suspend name the index they move from, so a stale writer
//! cannot move a record that someone else already moved.
//! WAITING  --resume-->    RUNNING   (only once resume_at has passed)
//! RUNNING  --complete-->  COMPLETED
//! RUNNING  --fail-->      FAILED    (last_error set)
//! PENDING | RUNNING | WAITING --cancel--> CANCELLED
//! ```
//!
//! Terminal states never change again. Every transition returns the events it
//! caused; the caller publishes them after the record has been persisted.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::event::{Event, EventType};
use crate::id::{AutomationId, ExecutionId, PremisesId, TriggerId};
use crate::specification::Specification;
use crate::time::Timestamp;

/// Lifecycle state of an [`AutomationExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// States that still count against `SINGLE` / `REPLACE` admission.
    pub const ACTIVE: [Self; 3] = [Self::Pending, Self::Running, Self::Waiting];

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `to`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        use ExecutionStatus::{Cancelled, Completed, Failed, Pending, Running, Waiting};
        matches!(
            (self, to),
            (Pending | Waiting, Running | Cancelled)
                | (Running, Running | Waiting | Completed | Failed | Cancelled)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "waiting" => Ok(Self::Waiting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown execution status {other:?}")),
        }
    }
}

/// A persisted, resumable run of one automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: ExecutionId,
    pub premises_id: PremisesId,
    pub automation_id: AutomationId,
    /// Trigger that started the run; `None` when started by another automation.
    pub trigger_id: Option<TriggerId>,
    pub status: ExecutionStatus,
    /// Index of the next action to run. Never exceeds the action count.
    pub current_action_index: usize,
    /// Due time of a `WAITING` execution; `None` in every other state.
    pub resume_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    /// Optimistic-lock version; `0` means not yet persisted.
    pub version: u64,
}

impl AutomationExecution {
    /// A freshly admitted execution in [`ExecutionStatus::Pending`].
    #[must_use]
    pub fn pending(
        id: ExecutionId,
        premises_id: PremisesId,
        automation_id: AutomationId,
        trigger_id: Option<TriggerId>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            premises_id,
            automation_id,
            trigger_id,
            status: ExecutionStatus::Pending,
            current_action_index: 0,
            resume_at: None,
            last_error: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
            version: 0,
        }
    }

    fn guard(&self, to: ExecutionStatus) -> Result<(), TransitionError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    /// `PENDING → RUNNING`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the execution is pending.
    pub fn start(&mut self, now: Timestamp) -> Result<Vec<Event>, TransitionError> {
        if self.status != ExecutionStatus::Pending {
            return Err(TransitionError {
                from: self.status,
                to: ExecutionStatus::Running,
            });
        }
        self.status = ExecutionStatus::Running;
        self.updated_at = now;
        Ok(vec![self.event(EventType::ExecutionStarted, now)])
    }

    /// Whether the action at `index` is the one this run is about to perform.
    fn is_at_action(&self, index: usize, action_count: usize) -> bool {
        self.current_action_index == index && index < action_count
    }

    /// Record that the action at `from_index` succeeded; stays `RUNNING`.
    ///
    /// `from_index` is the index the caller performed. A record that already
    /// moved past it (another writer advanced it first) is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless running and still at `from_index`.
    pub fn advance(
        &mut self,
        from_index: usize,
        action_count: usize,
        now: Timestamp,
    ) -> Result<Vec<Event>, TransitionError> {
        if self.status != ExecutionStatus::Running || !self.is_at_action(from_index, action_count) {
            return Err(TransitionError {
                from: self.status,
                to: ExecutionStatus::Running,
            });
        }
        self.current_action_index += 1;
        self.updated_at = now;
        Ok(Vec::new())
    }

    /// The action at `from_index` is a wait: `RUNNING → WAITING` until
    /// `resume_at`.
    ///
    /// The wait counts as done, so the run resumes at the following action.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless running and still at `from_index`.
    pub fn suspend(
        &mut self,
        from_index: usize,
        action_count: usize,
        resume_at: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<Event>, TransitionError> {
        self.guard(ExecutionStatus::Waiting)?;
        if !self.is_at_action(from_index, action_count) {
            return Err(TransitionError {
                from: self.status,
                to: ExecutionStatus::Waiting,
            });
        }
        self.status = ExecutionStatus::Waiting;
        self.current_action_index += 1;
        self.resume_at = Some(resume_at);
        self.updated_at = now;
        Ok(Vec::new())
    }

    /// Whether a waiting execution may resume at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == ExecutionStatus::Waiting && self.resume_at.is_some_and(|at| at <= now)
    }

    /// `WAITING → RUNNING`, only once `resume_at` has passed.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless waiting and due.
    pub fn resume(&mut self, now: Timestamp) -> Result<Vec<Event>, TransitionError> {
        if !self.is_due(now) {
            return Err(TransitionError {
                from: self.status,
                to: ExecutionStatus::Running,
            });
        }
        self.status = ExecutionStatus::Running;
        self.resume_at = None;
        self.updated_at = now;
        Ok(Vec::new())
    }

    /// `RUNNING → COMPLETED` after the last action, or because the
    /// condition did not hold (`skipped`).
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless running.
    pub fn complete(&mut self, skipped: bool, now: Timestamp) -> Result<Vec<Event>, TransitionError> {
        self.guard(ExecutionStatus::Completed)?;
        self.status = ExecutionStatus::Completed;
        self.finish(now);
        let mut event = self.event(EventType::ExecutionCompleted, now);
        event.data["skipped"] = serde_json::Value::Bool(skipped);
        Ok(vec![event])
    }

    /// `RUNNING → FAILED`, keeping `current_action_index` at the failed action.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless running.
    pub fn fail(&mut self, error: impl Into<String>, now: Timestamp) -> Result<Vec<Event>, TransitionError> {
        self.guard(ExecutionStatus::Failed)?;
        self.status = ExecutionStatus::Failed;
        self.last_error = Some(error.into());
        self.finish(now);
        Ok(vec![self.event(EventType::ExecutionFailed, now)])
    }

    /// `PENDING | RUNNING | WAITING → CANCELLED`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when already terminal.
    pub fn cancel(&mut self, now: Timestamp) -> Result<Vec<Event>, TransitionError> {
        self.guard(ExecutionStatus::Cancelled)?;
        self.status = ExecutionStatus::Cancelled;
        self.finish(now);
        Ok(vec![self.event(EventType::ExecutionCancelled, now)])
    }

    fn finish(&mut self, now: Timestamp) {
        self.resume_at = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    fn event(&self, event_type: EventType, now: Timestamp) -> Event {
        Event::new(
            event_type,
            self.premises_id,
            serde_json::json!({
                "execution_id": self.id,
                "automation_id": self.automation_id,
                "trigger_id": self.trigger_id,
                "status": self.status,
                "current_action_index": self.current_action_index,
                "last_error": self.last_error,
            }),
            now,
        )
    }
}

/// Leaf of an execution query; combined with the specification algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCriterion {
    Premises(PremisesId),
    Automation(AutomationId),
    Status(ExecutionStatus),
    /// `resume_at` is set and not later than the given time.
    ResumeDue(Timestamp),
}

/// Filter over executions, translated to a store query by adapters.
pub type ExecutionQuery = Specification<ExecutionCriterion>;

impl ExecutionCriterion {
    #[must_use]
    pub fn matches(&self, execution: &AutomationExecution) -> bool {
        match self {
            Self::Premises(id) => execution.premises_id == *id,
            Self::Automation(id) => execution.automation_id == *id,
            Self::Status(status) => execution.status == *status,
            Self::ResumeDue(now) => execution.resume_at.is_some_and(|at| at <= *now),
        }
    }
}

/// Any of the states that still occupy an automation's admission slot.
#[must_use]
pub fn is_active_query() -> ExecutionQuery {
    Specification::any(
        ExecutionStatus::ACTIVE
            .iter()
            .map(|status| Specification::leaf(ExecutionCriterion::Status(*status)))
            .collect(),
    )
}

/// Non-terminal executions of one automation.
#[must_use]
pub fn active_for_automation(automation_id: AutomationId) -> ExecutionQuery {
    Specification::all(vec![
        Specification::leaf(ExecutionCriterion::Automation(automation_id)),
        is_active_query(),
    ])
}

/// Waiting executions whose due time has passed at `now`.
#[must_use]
pub fn due_for_resume(now: Timestamp) -> ExecutionQuery {
    Specification::all(vec![
        Specification::leaf(ExecutionCriterion::Status(ExecutionStatus::Waiting)),
        Specification::leaf(ExecutionCriterion::ResumeDue(now)),
    ])
}

/// Evaluate `query` against an in-memory execution.
#[must_use]
pub fn query_matches(query: &ExecutionQuery, execution: &AutomationExecution) -> bool {
    query
        .evaluate(&mut |criterion: &ExecutionCriterion| {
            Ok::<_, std::convert::Infallible>(criterion.matches(execution))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> AutomationExecution {
        AutomationExecution::pending(
            ExecutionId::new(),
            PremisesId::new(),
            AutomationId::new(),
            Some(TriggerId::new()),
            crate::time::now(),
        )
    }

    fn running() -> AutomationExecution {
        let mut execution = pending();
        execution.start(crate::time::now()).unwrap();
        execution
    }

    #[test]
    fn should_start_pending_execution_and_emit_started_event() {
        let mut execution = pending();
        let events = execution.start(crate::time::now()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ExecutionStarted);
    }

    #[test]
    fn should_never_reenter_pending() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Waiting,
            ExecutionStatus::Completed,
        ] {
            assert!(!status.can_transition_to(ExecutionStatus::Pending));
        }
    }

    #[test]
    fn should_not_start_twice() {
        let mut execution = running();
        let err = execution.start(crate::time::now()).unwrap_err();
        assert_eq!(err.from, ExecutionStatus::Running);
    }

    #[test]
    fn should_advance_index_up_to_action_count() {
        let now = crate::time::now();
        let mut execution = running();
        execution.advance(0, 2, now).unwrap();
        execution.advance(1, 2, now).unwrap();
        assert_eq!(execution.current_action_index, 2);
        assert!(execution.advance(2, 2, now).is_err());
        assert_eq!(execution.current_action_index, 2);
    }

    #[test]
    fn should_refuse_advance_from_an_index_already_passed() {
        let now = crate::time::now();
        let mut execution = running();
        let stale = execution.clone();
        execution.advance(0, 3, now).unwrap();

        let mut replayed = execution.clone();
        let err = replayed.advance(stale.current_action_index, 3, now).unwrap_err();

        assert_eq!(err.from, ExecutionStatus::Running);
        assert_eq!(replayed.current_action_index, 1);
        assert!(replayed.suspend(0, 3, now, now).is_err());
        assert_eq!(replayed.status, ExecutionStatus::Running);
    }

    #[test]
    fn should_suspend_and_resume_only_when_due() {
        let now = crate::time::now();
        let resume_at = now + chrono::Duration::minutes(5);
        let mut execution = running();

        execution.suspend(0, 3, resume_at, now).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Waiting);
        assert_eq!(execution.current_action_index, 1);
        assert_eq!(execution.resume_at, Some(resume_at));

        assert!(execution.resume(now + chrono::Duration::minutes(4)).is_err());
        assert_eq!(execution.status, ExecutionStatus::Waiting);

        execution.resume(resume_at).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.resume_at.is_none());
    }

    #[test]
    fn should_keep_index_and_record_error_when_failing() {
        let now = crate::time::now();
        let mut execution = running();
        execution.advance(0, 3, now).unwrap();
        let events = execution.fail("feed gone", now).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.current_action_index, 1);
        assert_eq!(execution.last_error.as_deref(), Some("feed gone"));
        assert_eq!(execution.completed_at, Some(now));
        assert_eq!(events[0].event_type, EventType::ExecutionFailed);
        assert_eq!(events[0].data["last_error"], "feed gone");
    }

    #[test]
    fn should_mark_skipped_completion_in_event() {
        let mut execution = running();
        let events = execution.complete(true, crate::time::now()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(events[0].data["skipped"], true);
    }

    #[test]
    fn should_cancel_waiting_execution_and_clear_resume_at() {
        let now = crate::time::now();
        let mut execution = running();
        execution
            .suspend(0, 2, now + chrono::Duration::minutes(1), now)
            .unwrap();
        execution.cancel(now).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Cancelled);
        assert!(execution.resume_at.is_none());
    }

    #[test]
    fn should_freeze_terminal_states() {
        let now = crate::time::now();
        let mut execution = running();
        execution.complete(false, now).unwrap();
        assert!(execution.cancel(now).is_err());
        assert!(execution.fail("late", now).is_err());
        assert!(execution.resume(now).is_err());
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[test]
    fn should_match_active_and_due_queries_in_memory() {
        let now = crate::time::now();
        let mut execution = running();
        assert!(query_matches(&active_for_automation(execution.automation_id), &execution));
        assert!(!query_matches(&active_for_automation(AutomationId::new()), &execution));

        execution
            .suspend(0, 2, now + chrono::Duration::minutes(5), now)
            .unwrap();
        assert!(!query_matches(&due_for_resume(now), &execution));
        assert!(query_matches(
            &due_for_resume(now + chrono::Duration::minutes(5)),
            &execution
        ));

        execution.cancel(now).unwrap();
        assert!(!query_matches(&active_for_automation(execution.automation_id), &execution));
    }

    #[test]
    fn should_parse_status_from_storage_text() {
        assert_eq!("waiting".parse::<ExecutionStatus>(), Ok(ExecutionStatus::Waiting));
        assert!("paused".parse::<ExecutionStatus>().is_err());
    }
}
