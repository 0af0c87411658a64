//! Execution repository port: persistence for automation executions.
//!
//! Executions are the only mutable shared state of the engine. Every write
//! after creation is an optimistic-lock compare-and-set on `version`.

use std::future::Future;
use std::sync::Arc;

use homerule_domain::error::HomeRuleError;
use homerule_domain::execution::{
    AutomationExecution, ExecutionCriterion, ExecutionQuery, active_for_automation, due_for_resume,
};
use homerule_domain::id::{AutomationId, ExecutionId};
use homerule_domain::specification::Specification;
use homerule_domain::time::Timestamp;

/// How [`ExecutionRepository::create`] treats other runs of the same automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionGuard {
    /// Insert unconditionally.
    Shared,
    /// Insert only while the automation has no non-terminal execution;
    /// otherwise fail with `ConflictError::ActiveExecution`.
    Exclusive,
}

/// Repository for persisting and querying [`AutomationExecution`]s.
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution, returning it with `version == 1`.
    fn create(
        &self,
        execution: AutomationExecution,
        guard: AdmissionGuard,
    ) -> impl Future<Output = Result<AutomationExecution, HomeRuleError>> + Send;

    /// Write the full record if the stored version still equals
    /// `execution.version`, returning it with the version bumped.
    ///
    /// Fails with `ConflictError::VersionMismatch` when another writer got there first.
    fn save(
        &self,
        execution: AutomationExecution,
    ) -> impl Future<Output = Result<AutomationExecution, HomeRuleError>> + Send;

    fn get_by_id(
        &self,
        id: ExecutionId,
    ) -> impl Future<Output = Result<Option<AutomationExecution>, HomeRuleError>> + Send;

    /// Executions matching `query`, oldest first.
    fn find(
        &self,
        query: ExecutionQuery,
    ) -> impl Future<Output = Result<Vec<AutomationExecution>, HomeRuleError>> + Send;

    /// `WAITING` executions whose `resume_at` is not later than `now`.
    fn find_due_for_resume(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<AutomationExecution>, HomeRuleError>> + Send {
        self.find(due_for_resume(now))
    }

    /// Every non-terminal execution of an automation, oldest first.
    fn find_active_by_automation_id(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<AutomationExecution>, HomeRuleError>> + Send {
        self.find(active_for_automation(automation_id))
    }

    /// Full history of an automation, newest first.
    fn find_by_automation_id(
        &self,
        automation_id: AutomationId,
    ) -> impl Future<Output = Result<Vec<AutomationExecution>, HomeRuleError>> + Send {
        let query = Specification::leaf(ExecutionCriterion::Automation(automation_id));
        async move {
            let mut executions = self.find(query).await?;
            executions.reverse();
            Ok(executions)
        }
    }
}

impl<T: ExecutionRepository> ExecutionRepository for Arc<T> {
    fn create(
        &self,
        execution: AutomationExecution,
        guard: AdmissionGuard,
    ) -> impl Future<Output = Result<AutomationExecution, HomeRuleError>> + Send {
        (**self).create(execution, guard)
    }

    fn save(
        &self,
        execution: AutomationExecution,
    ) -> impl Future<Output = Result<AutomationExecution, HomeRuleError>> + Send {
        (**self).save(execution)
    }

    fn get_by_id(
        &self,
        id: ExecutionId,
    ) -> impl Future<Output = Result<Option<AutomationExecution>, HomeRuleError>> + Send {
        (**self).get_by_id(id)
    }

    fn find(
        &self,
        query: ExecutionQuery,
    ) -> impl Future<Output = Result<Vec<AutomationExecution>, HomeRuleError>> + Send {
        (**self).find(query)
    }
}
