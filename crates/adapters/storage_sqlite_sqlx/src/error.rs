//! Storage-specific error type wrapping sqlx errors.

use homerule_domain::error::{ConflictError, HomeRuleError};
use homerule_domain::id::PremisesId;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to serialize or deserialize a stored JSON value.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A counter does not fit the column type.
    #[error("integer out of range")]
    Overflow(#[from] std::num::TryFromIntError),
}

impl From<StorageError> for HomeRuleError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Map a failed insert to [`ConflictError::Duplicate`] when a uniqueness
/// index rejected it.
pub(crate) fn on_insert(
    err: sqlx::Error,
    entity: &'static str,
    premises_id: PremisesId,
) -> HomeRuleError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ConflictError::Duplicate {
                entity,
                premises_id,
            }
            .into()
        }
        _ => StorageError::from(err).into(),
    }
}
