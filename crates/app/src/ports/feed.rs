//! Feed facade port: the feed bounded context as seen by automations.

use std::future::Future;
use std::sync::Arc;

use homerule_domain::error::HomeRuleError;
use homerule_domain::feed::Feed;
use homerule_domain::id::FeedId;
use homerule_domain::time::Timestamp;

/// Read and write live feed values.
pub trait FeedFacade: Send + Sync {
    /// Current snapshot of a feed; `None` once the feed has been deleted.
    fn get_feed_by_id(
        &self,
        id: FeedId,
    ) -> impl Future<Output = Result<Option<Feed>, HomeRuleError>> + Send;

    /// Write a new value, returning the updated feed and the value it replaced.
    ///
    /// Fails with `NotFound` when the feed no longer exists.
    fn send_value(
        &self,
        id: FeedId,
        value: f64,
        at: Timestamp,
    ) -> impl Future<Output = Result<(Feed, f64), HomeRuleError>> + Send;
}

impl<T: FeedFacade> FeedFacade for Arc<T> {
    fn get_feed_by_id(
        &self,
        id: FeedId,
    ) -> impl Future<Output = Result<Option<Feed>, HomeRuleError>> + Send {
        (**self).get_feed_by_id(id)
    }

    fn send_value(
        &self,
        id: FeedId,
        value: f64,
        at: Timestamp,
    ) -> impl Future<Output = Result<(Feed, f64), HomeRuleError>> + Send {
        (**self).send_value(id, value, at)
    }
}
