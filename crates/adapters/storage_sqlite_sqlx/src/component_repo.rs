//! `SQLite` implementation of [`ComponentRepository`] and [`TriggerRepository`].
//!
//! Triggers, conditions, and actions share one table keyed by `kind`. The
//! typed configuration is stored as JSON next to its canonical definition key.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use homerule_app::ports::{ComponentRepository, TriggerRepository};
use homerule_domain::automation::{RuleComponent, Trigger, TriggerType};
use homerule_domain::error::HomeRuleError;
use homerule_domain::id::{FeedId, PremisesId};

use crate::codec::{decode_json, decode_str};
use crate::error::{StorageError, on_insert};

fn decode<C: RuleComponent>(row: &SqliteRow) -> Result<C, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let premises_id: String = row.try_get("premises_id")?;
    let config: String = row.try_get("config")?;
    Ok(C::from_parts(
        decode_str(&id)?,
        decode_str(&premises_id)?,
        decode_json(&config)?,
    ))
}

fn decode_all<C: RuleComponent>(rows: &[SqliteRow]) -> Result<Vec<C>, HomeRuleError> {
    rows.iter()
        .map(|row| decode(row).map_err(|err| HomeRuleError::from(StorageError::from(err))))
        .collect()
}

const INSERT: &str = r"
    INSERT INTO components (id, premises_id, kind, component_type, config, config_key)
    VALUES (?, ?, ?, ?, ?, ?)
";

const SELECT_BY_ID: &str = "SELECT * FROM components WHERE id = ? AND kind = ?";
const SELECT_BY_PREMISES: &str =
    "SELECT * FROM components WHERE premises_id = ? AND kind = ? ORDER BY rowid";

const SELECT_TRIGGERS_BY_TYPE: &str = r"
    SELECT * FROM components
    WHERE kind = 'trigger'
      AND component_type = ?
      AND (? IS NULL OR premises_id = ?)
    ORDER BY rowid
";

const SELECT_TRIGGERS_BY_FEED: &str = r"
    SELECT * FROM components
    WHERE kind = 'trigger'
      AND component_type = 'feed'
      AND json_extract(config, '$.feed_id') = ?
    ORDER BY rowid
";

/// `SQLite`-backed store of rule components.
#[derive(Clone)]
pub struct SqliteComponentRepository {
    pool: SqlitePool,
}

impl SqliteComponentRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ComponentRepository for SqliteComponentRepository {
    async fn create<C: RuleComponent>(&self, component: C) -> Result<C, HomeRuleError> {
        let config = serde_json::to_string(component.config()).map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(component.id().to_string())
            .bind(component.premises_id().to_string())
            .bind(C::KIND.as_str())
            .bind(component.tag().as_str())
            .bind(config)
            .bind(component.definition_key())
            .execute(&self.pool)
            .await
            .map_err(|err| on_insert(err, C::KIND.as_str(), component.premises_id()))?;

        tracing::debug!(kind = C::KIND.as_str(), id = %component.id(), "component stored");
        Ok(component)
    }

    async fn get_by_id<C: RuleComponent>(&self, id: C::Id) -> Result<Option<C>, HomeRuleError> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id.to_string())
            .bind(C::KIND.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        row.map(|row| decode(&row))
            .transpose()
            .map_err(|err| HomeRuleError::from(StorageError::from(err)))
    }

    async fn find_by_premises<C: RuleComponent>(
        &self,
        premises_id: PremisesId,
    ) -> Result<Vec<C>, HomeRuleError> {
        let rows = sqlx::query(SELECT_BY_PREMISES)
            .bind(premises_id.to_string())
            .bind(C::KIND.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        decode_all(&rows)
    }
}

impl TriggerRepository for SqliteComponentRepository {
    async fn find_triggers_by_type(
        &self,
        premises_id: Option<PremisesId>,
        trigger_type: TriggerType,
    ) -> Result<Vec<Trigger>, HomeRuleError> {
        let premises = premises_id.map(|id| id.to_string());
        let rows = sqlx::query(SELECT_TRIGGERS_BY_TYPE)
            .bind(trigger_type.as_str())
            .bind(premises.as_deref())
            .bind(premises.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        decode_all(&rows)
    }

    async fn find_triggers_by_feed(&self, feed_id: FeedId) -> Result<Vec<Trigger>, HomeRuleError> {
        let rows = sqlx::query(SELECT_TRIGGERS_BY_FEED)
            .bind(feed_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        decode_all(&rows)
    }
}
