//! Component repository port: persistence for triggers, conditions, and actions.

use std::future::Future;
use std::sync::Arc;

use homerule_domain::automation::{RuleComponent, Trigger, TriggerType};
use homerule_domain::error::HomeRuleError;
use homerule_domain::id::{FeedId, PremisesId};

/// Repository for every [`RuleComponent`] family.
///
/// Methods are generic over the family so one store serves all three; call
/// sites name it explicitly, e.g. `get_by_id::<Action>(id)`.
pub trait ComponentRepository: Send + Sync {
    /// Store a new component.
    ///
    /// Fails with `ConflictError::Duplicate` when the premises already holds
    /// a component of the same kind with an identical configuration.
    fn create<C: RuleComponent>(
        &self,
        component: C,
    ) -> impl Future<Output = Result<C, HomeRuleError>> + Send;

    /// Get a component by its unique identifier.
    fn get_by_id<C: RuleComponent>(
        &self,
        id: C::Id,
    ) -> impl Future<Output = Result<Option<C>, HomeRuleError>> + Send;

    /// All components of one family owned by a premises.
    fn find_by_premises<C: RuleComponent>(
        &self,
        premises_id: PremisesId,
    ) -> impl Future<Output = Result<Vec<C>, HomeRuleError>> + Send;
}

/// Trigger lookups used when matching incoming events.
pub trait TriggerRepository: Send + Sync {
    /// Triggers of one type, optionally narrowed to a premises.
    fn find_triggers_by_type(
        &self,
        premises_id: Option<PremisesId>,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<Trigger>, HomeRuleError>> + Send;

    /// Feed triggers watching `feed_id`.
    fn find_triggers_by_feed(
        &self,
        feed_id: FeedId,
    ) -> impl Future<Output = Result<Vec<Trigger>, HomeRuleError>> + Send;
}

/// Everything the engine needs from component storage.
pub trait ComponentStore: ComponentRepository + TriggerRepository {}

impl<T: ComponentRepository + TriggerRepository> ComponentStore for T {}

impl<T: ComponentRepository> ComponentRepository for Arc<T> {
    fn create<C: RuleComponent>(
        &self,
        component: C,
    ) -> impl Future<Output = Result<C, HomeRuleError>> + Send {
        (**self).create(component)
    }

    fn get_by_id<C: RuleComponent>(
        &self,
        id: C::Id,
    ) -> impl Future<Output = Result<Option<C>, HomeRuleError>> + Send {
        (**self).get_by_id(id)
    }

    fn find_by_premises<C: RuleComponent>(
        &self,
        premises_id: PremisesId,
    ) -> impl Future<Output = Result<Vec<C>, HomeRuleError>> + Send {
        (**self).find_by_premises(premises_id)
    }
}

impl<T: TriggerRepository> TriggerRepository for Arc<T> {
    fn find_triggers_by_type(
        &self,
        premises_id: Option<PremisesId>,
        trigger_type: TriggerType,
    ) -> impl Future<Output = Result<Vec<Trigger>, HomeRuleError>> + Send {
        (**self).find_triggers_by_type(premises_id, trigger_type)
    }

    fn find_triggers_by_feed(
        &self,
        feed_id: FeedId,
    ) -> impl Future<Output = Result<Vec<Trigger>, HomeRuleError>> + Send {
        (**self).find_triggers_by_feed(feed_id)
    }
}
