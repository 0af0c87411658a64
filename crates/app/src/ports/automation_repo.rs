//! Automation repository port: persistence for automations.

use std::future::Future;
use std::sync::Arc;

use homerule_domain::automation::Automation;
use homerule_domain::error::HomeRuleError;
use homerule_domain::id::{AutomationId, PremisesId, TriggerId};
use homerule_domain::time::Timestamp;

/// Repository for persisting and querying [`Automation`]s.
///
/// Automations are never deleted; they are deactivated through [`update`](Self::update).
pub trait AutomationRepository: Send + Sync {
    /// Store a new automation, returning it with `version == 1`.
    ///
    /// Fails with `ConflictError::Duplicate` when the premises already holds
    /// an automation with the same definition.
    fn create(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, HomeRuleError>> + Send;

    /// Get an automation by its unique identifier.
    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<Automation>, HomeRuleError>> + Send;

    /// All automations of a premises, ordered by name.
    fn find_by_premises(
        &self,
        premises_id: PremisesId,
    ) -> impl Future<Output = Result<Vec<Automation>, HomeRuleError>> + Send;

    /// Active, unexpired automations of `premises_id` that list `trigger_id`.
    fn find_trigger_candidates(
        &self,
        premises_id: PremisesId,
        trigger_id: TriggerId,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<Automation>, HomeRuleError>> + Send;

    /// Persist a modified automation if its stored version still equals
    /// `automation.version`, returning it with the version bumped.
    ///
    /// Fails with `ConflictError::VersionMismatch` otherwise.
    fn update(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, HomeRuleError>> + Send;
}

impl<T: AutomationRepository> AutomationRepository for Arc<T> {
    fn create(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, HomeRuleError>> + Send {
        (**self).create(automation)
    }

    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<Automation>, HomeRuleError>> + Send {
        (**self).get_by_id(id)
    }

    fn find_by_premises(
        &self,
        premises_id: PremisesId,
    ) -> impl Future<Output = Result<Vec<Automation>, HomeRuleError>> + Send {
        (**self).find_by_premises(premises_id)
    }

    fn find_trigger_candidates(
        &self,
        premises_id: PremisesId,
        trigger_id: TriggerId,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<Automation>, HomeRuleError>> + Send {
        (**self).find_trigger_candidates(premises_id, trigger_id, now)
    }

    fn update(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, HomeRuleError>> + Send {
        (**self).update(automation)
    }
}
