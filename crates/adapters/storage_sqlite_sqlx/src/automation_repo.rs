//! `SQLite` implementation of [`AutomationRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use homerule_app::ports::AutomationRepository;
use homerule_domain::automation::{Automation, AutomationState};
use homerule_domain::error::{ConflictError, HomeRuleError, NotFoundError};
use homerule_domain::id::{AutomationId, PremisesId, TriggerId};
use homerule_domain::time::Timestamp;

use crate::codec::{decode_error, decode_json, decode_opt_ts, decode_str, encode_ts};
use crate::error::{StorageError, on_insert};

struct Wrapper(Automation);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Automation> {
        value.map(|w| w.0)
    }

    fn all(rows: Vec<Self>) -> Vec<Automation> {
        rows.into_iter().map(|w| w.0).collect()
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let premises_id: String = row.try_get("premises_id")?;
        let trigger_json: String = row.try_get("trigger_ids")?;
        let condition_json: Option<String> = row.try_get("condition")?;
        let action_json: String = row.try_get("action_ids")?;
        let state: String = row.try_get("state")?;
        let mode: String = row.try_get("execution_mode")?;
        let expires_on: Option<String> = row.try_get("expires_on")?;
        let version: i64 = row.try_get("version")?;

        Ok(Self(Automation {
            id: decode_str(&id)?,
            premises_id: decode_str(&premises_id)?,
            name: row.try_get("name")?,
            trigger_ids: decode_json(&trigger_json)?,
            condition: condition_json.as_deref().map(decode_json).transpose()?,
            action_ids: decode_json(&action_json)?,
            state: decode_str(&state)?,
            execution_mode: decode_str(&mode)?,
            expires_on: decode_opt_ts(expires_on)?,
            version: u64::try_from(version).map_err(decode_error)?,
        }))
    }
}

/// Column values of an automation, encoded once for insert and update.
struct Columns {
    trigger_ids: String,
    condition: Option<String>,
    action_ids: String,
    expires_on: Option<String>,
    definition_key: String,
}

impl Columns {
    fn of(automation: &Automation) -> Result<Self, StorageError> {
        Ok(Self {
            trigger_ids: serde_json::to_string(&automation.trigger_ids)?,
            condition: automation
                .condition
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            action_ids: serde_json::to_string(&automation.action_ids)?,
            expires_on: automation.expires_on.map(encode_ts),
            definition_key: automation.definition_key(),
        })
    }
}

const INSERT: &str = r"
    INSERT INTO automations (id, premises_id, name, trigger_ids, condition, action_ids,
                             state, execution_mode, expires_on, definition_key, version)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
";

const UPDATE: &str = r"
    UPDATE automations
    SET name = ?, trigger_ids = ?, condition = ?, action_ids = ?, state = ?,
        execution_mode = ?, expires_on = ?, definition_key = ?, version = version + 1
    WHERE id = ? AND version = ?
";

const SELECT_BY_ID: &str = "SELECT * FROM automations WHERE id = ?";
const SELECT_BY_PREMISES: &str = "SELECT * FROM automations WHERE premises_id = ? ORDER BY name";

// An automation listens to a trigger when the id appears in its JSON array.
const SELECT_CANDIDATES: &str = r"
    SELECT a.* FROM automations a
    WHERE a.premises_id = ?
      AND a.state = ?
      AND (a.expires_on IS NULL OR a.expires_on > ?)
      AND EXISTS (SELECT 1 FROM json_each(a.trigger_ids) t WHERE t.value = ?)
    ORDER BY a.name
";

/// `SQLite`-backed automation repository.
#[derive(Clone)]
pub struct SqliteAutomationRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AutomationRepository for SqliteAutomationRepository {
    async fn create(&self, mut automation: Automation) -> Result<Automation, HomeRuleError> {
        let columns = Columns::of(&automation)?;

        sqlx::query(INSERT)
            .bind(automation.id.to_string())
            .bind(automation.premises_id.to_string())
            .bind(&automation.name)
            .bind(&columns.trigger_ids)
            .bind(columns.condition.as_deref())
            .bind(&columns.action_ids)
            .bind(automation.state.as_str())
            .bind(automation.execution_mode.as_str())
            .bind(columns.expires_on.as_deref())
            .bind(&columns.definition_key)
            .execute(&self.pool)
            .await
            .map_err(|err| on_insert(err, "automation", automation.premises_id))?;

        automation.version = 1;
        Ok(automation)
    }

    async fn get_by_id(&self, id: AutomationId) -> Result<Option<Automation>, HomeRuleError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn find_by_premises(
        &self,
        premises_id: PremisesId,
    ) -> Result<Vec<Automation>, HomeRuleError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_PREMISES)
            .bind(premises_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::all(rows))
    }

    async fn find_trigger_candidates(
        &self,
        premises_id: PremisesId,
        trigger_id: TriggerId,
        now: Timestamp,
    ) -> Result<Vec<Automation>, HomeRuleError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_CANDIDATES)
            .bind(premises_id.to_string())
            .bind(AutomationState::Active.as_str())
            .bind(encode_ts(now))
            .bind(trigger_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::all(rows))
    }

    async fn update(&self, mut automation: Automation) -> Result<Automation, HomeRuleError> {
        let columns = Columns::of(&automation)?;
        let expected = i64::try_from(automation.version).map_err(StorageError::from)?;

        let result = sqlx::query(UPDATE)
            .bind(&automation.name)
            .bind(&columns.trigger_ids)
            .bind(columns.condition.as_deref())
            .bind(&columns.action_ids)
            .bind(automation.state.as_str())
            .bind(automation.execution_mode.as_str())
            .bind(columns.expires_on.as_deref())
            .bind(&columns.definition_key)
            .bind(automation.id.to_string())
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(|err| on_insert(err, "automation", automation.premises_id))?;

        if result.rows_affected() == 0 {
            if self.get_by_id(automation.id).await?.is_none() {
                return Err(NotFoundError {
                    entity: "automation",
                    id: automation.id.to_string(),
                }
                .into());
            }
            return Err(ConflictError::VersionMismatch {
                entity: "automation",
                id: automation.id.to_string(),
                expected: automation.version,
            }
            .into());
        }

        automation.version += 1;
        Ok(automation)
    }
}
