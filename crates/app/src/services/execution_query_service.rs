//! Execution query service: read-only audit of automation runs.

use homerule_domain::error::{HomeRuleError, NotFoundError};
use homerule_domain::execution::AutomationExecution;
use homerule_domain::id::{AutomationId, ExecutionId, UserId};

use super::authorize;
use crate::ports::{AccessPolicy, AutomationRepository, ExecutionRepository, Operation};

pub struct ExecutionQueryService<XR, AR, A> {
    executions: XR,
    automations: AR,
    access: A,
}

impl<XR, AR, A> ExecutionQueryService<XR, AR, A>
where
    XR: ExecutionRepository,
    AR: AutomationRepository,
    A: AccessPolicy,
{
    pub fn new(executions: XR, automations: AR, access: A) -> Self {
        Self {
            executions,
            automations,
            access,
        }
    }

    /// # Errors
    ///
    /// Returns [`HomeRuleError::NotFound`], [`HomeRuleError::Forbidden`], or
    /// a storage error.
    pub async fn get_execution(
        &self,
        user_id: UserId,
        id: ExecutionId,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let execution = self.executions.get_by_id(id).await?.ok_or_else(|| NotFoundError {
            entity: "execution",
            id: id.to_string(),
        })?;
        authorize(
            &self.access,
            user_id,
            execution.premises_id,
            Operation::ReadAutomation,
        )
        .await?;
        Ok(execution)
    }

    /// Every run of an automation, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`HomeRuleError::NotFound`] for an unknown automation,
    /// [`HomeRuleError::Forbidden`], or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn history(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
    ) -> Result<Vec<AutomationExecution>, HomeRuleError> {
        let automation = self
            .automations
            .get_by_id(automation_id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "automation",
                id: automation_id.to_string(),
            })?;
        authorize(
            &self.access,
            user_id,
            automation.premises_id,
            Operation::ReadAutomation,
        )
        .await?;
        self.executions.find_by_automation_id(automation_id).await
    }
}
