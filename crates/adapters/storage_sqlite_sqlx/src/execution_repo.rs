//! `SQLite` implementation of [`ExecutionRepository`].
//!
//! Execution queries are translated to a `WHERE` clause by folding the
//! specification tree; every leaf becomes one bound parameter.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use homerule_app::ports::{AdmissionGuard, ExecutionRepository};
use homerule_domain::error::{ConflictError, HomeRuleError};
use homerule_domain::execution::{
    AutomationExecution, ExecutionCriterion, ExecutionQuery, ExecutionStatus,
};
use homerule_domain::id::ExecutionId;
use homerule_domain::specification::{GroupOperator, SpecificationVisitor};

use crate::codec::{decode_error, decode_opt_ts, decode_str, decode_ts, encode_ts};
use crate::error::StorageError;

struct Wrapper(AutomationExecution);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let premises_id: String = row.try_get("premises_id")?;
        let automation_id: String = row.try_get("automation_id")?;
        let trigger_id: Option<String> = row.try_get("trigger_id")?;
        let status: String = row.try_get("status")?;
        let index: i64 = row.try_get("current_action_index")?;
        let started_at: String = row.try_get("started_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let version: i64 = row.try_get("version")?;

        Ok(Self(AutomationExecution {
            id: decode_str(&id)?,
            premises_id: decode_str(&premises_id)?,
            automation_id: decode_str(&automation_id)?,
            trigger_id: trigger_id.as_deref().map(decode_str).transpose()?,
            status: decode_str(&status)?,
            current_action_index: usize::try_from(index).map_err(decode_error)?,
            resume_at: decode_opt_ts(row.try_get("resume_at")?)?,
            last_error: row.try_get("last_error")?,
            started_at: decode_ts(&started_at)?,
            completed_at: decode_opt_ts(row.try_get("completed_at")?)?,
            updated_at: decode_ts(&updated_at)?,
            version: u64::try_from(version).map_err(decode_error)?,
        }))
    }
}

/// `WHERE` fragment plus its parameters in bind order.
#[derive(Debug, Default)]
struct SqlFilter {
    binds: Vec<String>,
}

impl SpecificationVisitor<ExecutionCriterion> for SqlFilter {
    type Output = String;

    fn leaf(&mut self, criterion: &ExecutionCriterion) -> String {
        let (clause, value) = match criterion {
            ExecutionCriterion::Premises(id) => ("premises_id = ?", id.to_string()),
            ExecutionCriterion::Automation(id) => ("automation_id = ?", id.to_string()),
            ExecutionCriterion::Status(status) => ("status = ?", status.as_str().to_string()),
            ExecutionCriterion::ResumeDue(now) => {
                ("(resume_at IS NOT NULL AND resume_at <= ?)", encode_ts(*now))
            }
        };
        self.binds.push(value);
        clause.to_string()
    }

    fn group(&mut self, operator: GroupOperator, children: Vec<String>) -> String {
        if children.is_empty() {
            return if operator.identity() { "1 = 1" } else { "1 = 0" }.to_string();
        }
        let joiner = match operator {
            GroupOperator::And => " AND ",
            GroupOperator::Or => " OR ",
        };
        format!("({})", children.join(joiner))
    }

    fn negate(&mut self, child: String) -> String {
        format!("NOT ({child})")
    }
}

fn translate(query: &ExecutionQuery) -> (String, Vec<String>) {
    let mut filter = SqlFilter::default();
    let clause = query.fold(&mut filter);
    (clause, filter.binds)
}

const INSERT: &str = r"
    INSERT INTO executions (id, premises_id, automation_id, trigger_id, status,
                            current_action_index, resume_at, last_error, started_at,
                            completed_at, updated_at, version)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
";

// Admission and insert happen in one statement so two racing triggers cannot
// both take the slot.
const INSERT_EXCLUSIVE: &str = r"
    INSERT INTO executions (id, premises_id, automation_id, trigger_id, status,
                            current_action_index, resume_at, last_error, started_at,
                            completed_at, updated_at, version)
    SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1
    WHERE NOT EXISTS (
        SELECT 1 FROM executions
        WHERE automation_id = ? AND status IN (?, ?, ?)
    )
";

const UPDATE: &str = r"
    UPDATE executions
    SET status = ?, current_action_index = ?, resume_at = ?, last_error = ?,
        completed_at = ?, updated_at = ?, version = version + 1
    WHERE id = ? AND version = ?
";

const SELECT_BY_ID: &str = "SELECT * FROM executions WHERE id = ?";

/// `SQLite`-backed execution repository.
#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ExecutionRepository for SqliteExecutionRepository {
    #[tracing::instrument(skip(self, execution), fields(id = %execution.id, automation_id = %execution.automation_id))]
    async fn create(
        &self,
        mut execution: AutomationExecution,
        guard: AdmissionGuard,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let index = i64::try_from(execution.current_action_index).map_err(StorageError::from)?;
        let sql = match guard {
            AdmissionGuard::Shared => INSERT,
            AdmissionGuard::Exclusive => INSERT_EXCLUSIVE,
        };

        let mut query = sqlx::query(sql)
            .bind(execution.id.to_string())
            .bind(execution.premises_id.to_string())
            .bind(execution.automation_id.to_string())
            .bind(execution.trigger_id.map(|id| id.to_string()))
            .bind(execution.status.as_str())
            .bind(index)
            .bind(execution.resume_at.map(encode_ts))
            .bind(execution.last_error.as_deref())
            .bind(encode_ts(execution.started_at))
            .bind(execution.completed_at.map(encode_ts))
            .bind(encode_ts(execution.updated_at));
        if guard == AdmissionGuard::Exclusive {
            query = query.bind(execution.automation_id.to_string());
            for status in ExecutionStatus::ACTIVE {
                query = query.bind(status.as_str());
            }
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            tracing::debug!("admission slot taken");
            return Err(ConflictError::ActiveExecution {
                automation_id: execution.automation_id,
            }
            .into());
        }

        execution.version = 1;
        Ok(execution)
    }

    async fn save(
        &self,
        mut execution: AutomationExecution,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let index = i64::try_from(execution.current_action_index).map_err(StorageError::from)?;
        let expected = i64::try_from(execution.version).map_err(StorageError::from)?;

        let result = sqlx::query(UPDATE)
            .bind(execution.status.as_str())
            .bind(index)
            .bind(execution.resume_at.map(encode_ts))
            .bind(execution.last_error.as_deref())
            .bind(execution.completed_at.map(encode_ts))
            .bind(encode_ts(execution.updated_at))
            .bind(execution.id.to_string())
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(ConflictError::VersionMismatch {
                entity: "execution",
                id: execution.id.to_string(),
                expected: execution.version,
            }
            .into());
        }

        execution.version += 1;
        Ok(execution)
    }

    async fn get_by_id(
        &self,
        id: ExecutionId,
    ) -> Result<Option<AutomationExecution>, HomeRuleError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn find(
        &self,
        query: ExecutionQuery,
    ) -> Result<Vec<AutomationExecution>, HomeRuleError> {
        let (clause, binds) = translate(&query);
        let sql = format!("SELECT * FROM executions WHERE {clause} ORDER BY started_at, rowid");

        let mut statement = sqlx::query_as::<_, Wrapper>(&sql);
        for value in binds {
            statement = statement.bind(value);
        }
        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}
