//! Access policy port: the authorization engine reduced to a yes/no gate.

use std::future::Future;
use std::sync::Arc;

use homerule_domain::error::HomeRuleError;
use homerule_domain::id::{PremisesId, UserId};

/// Definition operations guarded by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateTrigger,
    CreateCondition,
    CreateAction,
    CreateAutomation,
    UpdateAutomation,
    ReadAutomation,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateTrigger => "create trigger",
            Self::CreateCondition => "create condition",
            Self::CreateAction => "create action",
            Self::CreateAutomation => "create automation",
            Self::UpdateAutomation => "update automation",
            Self::ReadAutomation => "read automation",
        }
    }
}

/// Decides whether a user may perform an operation on a premises.
pub trait AccessPolicy: Send + Sync {
    fn is_allowed(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
        operation: Operation,
    ) -> impl Future<Output = Result<bool, HomeRuleError>> + Send;
}

/// Policy that allows everything; used by the daemon, which has no users.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    async fn is_allowed(
        &self,
        _user_id: UserId,
        _premises_id: PremisesId,
        _operation: Operation,
    ) -> Result<bool, HomeRuleError> {
        Ok(true)
    }
}

impl<T: AccessPolicy> AccessPolicy for Arc<T> {
    fn is_allowed(
        &self,
        user_id: UserId,
        premises_id: PremisesId,
        operation: Operation,
    ) -> impl Future<Output = Result<bool, HomeRuleError>> + Send {
        (**self).is_allowed(user_id, premises_id, operation)
    }
}
