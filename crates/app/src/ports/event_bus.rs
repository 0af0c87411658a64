//! Event bus port: publish/subscribe for domain events.

use std::future::Future;

use homerule_domain::error::HomeRuleError;
use homerule_domain::event::Event;

/// Publishes domain events to interested subscribers.
///
/// Callers publish only after the state change the event describes has been
/// persisted.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HomeRuleError>> + Send;
}

impl<T: EventPublisher> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HomeRuleError>> + Send {
        (**self).publish(event)
    }
}
