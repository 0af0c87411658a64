//! Execution resumer: wakes `WAITING` executions once they are due.
//!
//! The resumer is a periodic scan, not a sleeping task per execution, so a
//! suspension survives a process restart. Each [`tick`](ExecutionResumer::tick)
//! looks up every due execution and hands it back to the engine. A failure on
//! one execution is logged and left for the next tick.

use std::sync::Arc;

use homerule_domain::error::HomeRuleError;

use crate::engine::ExecutionEngine;
use crate::ports::{
    AutomationRepository, ComponentStore, EventPublisher, ExecutionRepository, FeedFacade,
};

/// Counts from one resumer tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// Executions moved back to `RUNNING`.
    pub resumed: usize,
    /// Due executions someone else resumed or cancelled first.
    pub skipped: usize,
    /// Executions whose resumption hit an infrastructure error.
    pub failed: usize,
}

pub struct ExecutionResumer<AR, CR, XR, F, P> {
    engine: Arc<ExecutionEngine<AR, CR, XR, F, P>>,
}

impl<AR, CR, XR, F, P> ExecutionResumer<AR, CR, XR, F, P>
where
    AR: AutomationRepository,
    CR: ComponentStore,
    XR: ExecutionRepository + Clone,
    F: FeedFacade,
    P: EventPublisher,
{
    pub fn new(engine: Arc<ExecutionEngine<AR, CR, XR, F, P>>) -> Self {
        Self { engine }
    }

    /// Resume every execution due at the engine clock's current time.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due scan itself fails.
    pub async fn tick(&self) -> Result<ResumeReport, HomeRuleError> {
        let now = self.engine.clock().now();
        let due = self.engine.executions().find_due_for_resume(now).await?;
        let mut report = ResumeReport::default();
        for execution in due {
            let id = execution.id;
            match self.engine.resume(execution).await {
                Ok(Some(_)) => report.resumed += 1,
                Ok(None) => report.skipped += 1,
                Err(error) => {
                    tracing::warn!(execution_id = %id, %error, transient = error.is_transient(), "resume failed, will retry");
                    report.failed += 1;
                }
            }
        }
        if report != ResumeReport::default() {
            tracing::info!(?report, "resumer tick");
        }
        Ok(report)
    }
}
