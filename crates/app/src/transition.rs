//! Read-transition-write with bounded retry.
//!
//! Every execution state change in the engine, the arbiter, and the resumer
//! goes through [`transition_with_retry`]. A version conflict means another
//! writer changed the record first: the record is re-read and the same
//! transition is re-applied to the fresh copy. If the fresh copy no longer
//! allows the transition (it was cancelled, or another writer already made
//! the same move) the caller gets [`TransitionOutcome::Skipped`] instead of
//! overwriting that writer's work.

use homerule_domain::error::{ConflictError, HomeRuleError, NotFoundError, TransitionError};
use homerule_domain::event::Event;
use homerule_domain::execution::AutomationExecution;

use crate::ports::ExecutionRepository;

/// Attempts made before giving up on a contended record.
pub const DEFAULT_MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Result of [`transition_with_retry`].
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The transition was persisted; `events` are ready to publish.
    Applied {
        execution: AutomationExecution,
        events: Vec<Event>,
    },
    /// The latest stored state does not allow the transition.
    Skipped {
        execution: AutomationExecution,
        reason: TransitionError,
    },
}

impl TransitionOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// The execution as last seen, whichever way the transition went.
    #[must_use]
    pub fn into_execution(self) -> AutomationExecution {
        match self {
            Self::Applied { execution, .. } | Self::Skipped { execution, .. } => execution,
        }
    }
}

/// Apply `transition` to `current` and persist it, retrying on version conflicts.
///
/// `current` is used as-is for the first attempt; later attempts re-read the
/// record. `transition` may therefore run more than once and must only touch
/// the execution it is given.
///
/// # Errors
///
/// Returns [`ConflictError::RetriesExhausted`] after `max_attempts` lost races,
/// [`NotFoundError`] if the record vanished, or any storage error.
pub async fn transition_with_retry<XR, F>(
    executions: &XR,
    current: AutomationExecution,
    max_attempts: u32,
    mut transition: F,
) -> Result<TransitionOutcome, HomeRuleError>
where
    XR: ExecutionRepository,
    F: FnMut(&mut AutomationExecution) -> Result<Vec<Event>, TransitionError> + Send,
{
    let id = current.id;
    let mut snapshot = current;
    let mut attempt = 1;
    loop {
        let mut next = snapshot.clone();
        let events = match transition(&mut next) {
            Ok(events) => events,
            Err(reason) => {
                tracing::debug!(execution_id = %id, %reason, "transition skipped");
                return Ok(TransitionOutcome::Skipped {
                    execution: snapshot,
                    reason,
                });
            }
        };

        match executions.save(next).await {
            Ok(execution) => {
                tracing::debug!(
                    execution_id = %id,
                    status = %execution.status,
                    index = execution.current_action_index,
                    "execution transitioned"
                );
                return Ok(TransitionOutcome::Applied { execution, events });
            }
            Err(HomeRuleError::Conflict(ConflictError::VersionMismatch { .. })) => {
                if attempt >= max_attempts {
                    return Err(ConflictError::RetriesExhausted {
                        id,
                        attempts: attempt,
                    }
                    .into());
                }
                tracing::debug!(execution_id = %id, attempt, "version conflict, re-reading");
                attempt += 1;
                snapshot = executions.get_by_id(id).await?.ok_or_else(|| NotFoundError {
                    entity: "execution",
                    id: id.to_string(),
                })?;
            }
            Err(err) => return Err(err),
        }
    }
}
