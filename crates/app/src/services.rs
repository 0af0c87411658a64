//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.
//! Every use-case asks the [`AccessPolicy`] first.

pub mod automation_service;
pub mod definition_service;
pub mod execution_query_service;

use homerule_domain::error::{HomeRuleError, PermissionDenied};
use homerule_domain::id::{PremisesId, UserId};

use crate::ports::{AccessPolicy, Operation};

pub use automation_service::AutomationService;
pub use definition_service::DefinitionService;
pub use execution_query_service::ExecutionQueryService;

/// Fail with [`PermissionDenied`] unless `user_id` may perform `operation`.
async fn authorize<A: AccessPolicy>(
    access: &A,
    user_id: UserId,
    premises_id: PremisesId,
    operation: Operation,
) -> Result<(), HomeRuleError> {
    if access.is_allowed(user_id, premises_id, operation).await? {
        return Ok(());
    }
    tracing::warn!(%user_id, %premises_id, operation = operation.as_str(), "access denied");
    Err(PermissionDenied {
        operation: operation.as_str(),
        premises_id,
    }
    .into())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use homerule_domain::error::HomeRuleError;
    use homerule_domain::id::{PremisesId, UserId};

    use crate::ports::{AccessPolicy, Operation};

    /// Grants only the listed operations.
    #[derive(Default)]
    pub struct Grants {
        allowed: Mutex<HashSet<Operation>>,
    }

    impl Grants {
        pub fn only(operations: &[Operation]) -> Self {
            Self {
                allowed: Mutex::new(operations.iter().copied().collect()),
            }
        }
    }

    impl AccessPolicy for Grants {
        async fn is_allowed(
            &self,
            _user_id: UserId,
            _premises_id: PremisesId,
            operation: Operation,
        ) -> Result<bool, HomeRuleError> {
            Ok(self.allowed.lock().unwrap().contains(&operation))
        }
    }
}
