//! Specification evaluator: reduces a specification tree to a boolean.
//!
//! Leaves are resolved lazily through a [`LeafResolver`], one at a time and
//! left to right. `AND` stops at the first `false` child and `OR` at the first
//! `true` one, so siblings after the deciding child are never resolved.
//! An empty `AND` is `true` and an empty `OR` is `false`.

use std::future::Future;

use futures::future::BoxFuture;

use homerule_domain::error::HomeRuleError;
use homerule_domain::specification::Specification;

/// Turns one leaf into a boolean, usually by fetching live data.
pub trait LeafResolver<L>: Send + Sync {
    fn resolve_leaf(&self, leaf: &L) -> impl Future<Output = Result<bool, HomeRuleError>> + Send;
}

/// Evaluate `spec`, resolving leaves on demand.
///
/// # Errors
///
/// Propagates the first error returned by `resolver`; evaluation stops there.
pub fn evaluate<'a, L, R>(
    spec: &'a Specification<L>,
    resolver: &'a R,
) -> BoxFuture<'a, Result<bool, HomeRuleError>>
where
    L: Sync,
    R: LeafResolver<L>,
{
    Box::pin(async move {
        match spec {
            Specification::Leaf(leaf) => resolver.resolve_leaf(leaf).await,
            Specification::Group { operator, children } => {
                for child in children {
                    if let Some(decided) = operator.settle(evaluate(child, resolver).await?) {
                        return Ok(decided);
                    }
                }
                Ok(operator.identity())
            }
            Specification::Not(child) => Ok(!evaluate(child, resolver).await?),
        }
    })
}
