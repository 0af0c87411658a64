//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`HomeRuleError`] via `#[from]`. Adapters box their own error types into
//! [`HomeRuleError::Storage`].

use crate::execution::ExecutionStatus;
use crate::id::{ActionId, AutomationId, ConditionId, ExecutionId, FeedId, PremisesId};

/// Top-level error shared by the domain, application, and adapter layers.
#[derive(Debug, thiserror::Error)]
pub enum HomeRuleError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("invalid transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("permission denied: {0}")]
    Forbidden(#[from] PermissionDenied),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

impl HomeRuleError {
    /// Whether retrying the same operation on a later cycle may succeed.
    ///
    /// Concurrency conflicts and storage failures are transient; everything
    /// else describes a problem with the data itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Storage(_))
    }
}

/// Malformed definitions rejected at creation time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("an automation needs at least one trigger")]
    NoTriggers,

    #[error("an automation needs at least one action")]
    NoActions,

    #[error("wait duration {minutes} is outside 0..=60 minutes")]
    WaitDurationOutOfRange { minutes: u32 },

    #[error("voice trigger needs at least one command")]
    EmptyVoiceCommands,

    #[error("voice command must not be blank")]
    BlankVoiceCommand,

    #[error("time range start and end must differ")]
    EmptyTimeRange,

    #[error("sun offset {minutes} is outside -180..=180 minutes")]
    SunOffsetOutOfRange { minutes: i32 },

    #[error("threshold must be a finite number")]
    NonFiniteValue,

    #[error("notification title must not be empty")]
    EmptyNotificationTitle,

    #[error("notification needs at least one recipient")]
    NoRecipients,

    #[error("{component} {id} belongs to another premises")]
    TenantMismatch { component: &'static str, id: String },

    #[error("condition tree references unknown condition {0}")]
    UnknownCondition(ConditionId),

    #[error("condition tree is deeper than {max} levels")]
    ConditionTreeTooDeep { max: usize },
}

/// A looked-up record does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Optimistic-lock and uniqueness conflicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionMismatch {
        entity: &'static str,
        id: String,
        expected: u64,
    },

    #[error("an identical {entity} already exists in premises {premises_id}")]
    Duplicate {
        entity: &'static str,
        premises_id: PremisesId,
    },

    #[error("automation {automation_id} already has an active execution")]
    ActiveExecution { automation_id: AutomationId },

    #[error("execution {id} could not be updated after {attempts} attempts")]
    RetriesExhausted { id: ExecutionId, attempts: u32 },
}

/// Live data a component depends on could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("feed {0} no longer exists")]
    MissingFeed(FeedId),

    #[error("automation {0} no longer exists")]
    MissingAutomation(AutomationId),

    #[error("condition {0} no longer exists")]
    MissingCondition(ConditionId),

    #[error("action {0} no longer exists")]
    MissingAction(ActionId),

    #[error("{component} {id} belongs to another premises")]
    ForeignComponent { component: &'static str, id: String },

    #[error("automation chain exceeded {limit} levels")]
    ChainTooDeep { limit: usize },
}

/// An execution state change that the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move execution from {from} to {to}")]
pub struct TransitionError {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// The authorization gate refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} is not allowed on premises {premises_id}")]
pub struct PermissionDenied {
    pub operation: &'static str,
    pub premises_id: PremisesId,
}

/// Startup wiring mistakes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no resolver strategy registered for {0}")]
    UnregisteredComponent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_treat_conflicts_as_transient() {
        let err: HomeRuleError = ConflictError::RetriesExhausted {
            id: ExecutionId::new(),
            attempts: 3,
        }
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn should_treat_resolution_errors_as_permanent() {
        let err: HomeRuleError = ResolutionError::MissingFeed(FeedId::new()).into();
        assert!(!err.is_transient());
    }

    #[test]
    fn should_include_source_detail_in_display() {
        let feed = FeedId::new();
        let err: HomeRuleError = ResolutionError::MissingFeed(feed).into();
        assert_eq!(
            err.to_string(),
            format!("resolution error: feed {feed} no longer exists")
        );
    }

    #[test]
    fn should_describe_invalid_transition() {
        let err = TransitionError {
            from: ExecutionStatus::Completed,
            to: ExecutionStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "cannot move execution from completed to running"
        );
    }
}
