//! `SQLite` backing for the [`FeedFacade`] port.
//!
//! Feeds belong to another bounded context; this store only keeps the
//! latest reading of each one so the engine can read and write it.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use homerule_app::ports::FeedFacade;
use homerule_domain::error::{HomeRuleError, NotFoundError};
use homerule_domain::feed::Feed;
use homerule_domain::id::{FeedId, PremisesId};
use homerule_domain::time::Timestamp;

use crate::codec::{decode_str, decode_ts, encode_ts};
use crate::error::{StorageError, on_insert};

struct Wrapper(Feed);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let premises_id: String = row.try_get("premises_id")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self(Feed {
            id: decode_str(&id)?,
            premises_id: decode_str(&premises_id)?,
            name: row.try_get("name")?,
            current_value: row.try_get("current_value")?,
            updated_at: decode_ts(&updated_at)?,
        }))
    }
}

const SELECT_BY_ID: &str = "SELECT * FROM feeds WHERE id = ?";

/// `SQLite`-backed feed store.
#[derive(Clone)]
pub struct SqliteFeedStore {
    pool: SqlitePool,
}

impl SqliteFeedStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a feed so automations can read and control it.
    ///
    /// # Errors
    ///
    /// Returns a conflict when the id is already registered, or a storage error.
    pub async fn create_feed(&self, feed: Feed) -> Result<Feed, HomeRuleError> {
        sqlx::query(
            "INSERT INTO feeds (id, premises_id, name, current_value, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(feed.id.to_string())
        .bind(feed.premises_id.to_string())
        .bind(&feed.name)
        .bind(feed.current_value)
        .bind(encode_ts(feed.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|err| on_insert(err, "feed", feed.premises_id))?;
        Ok(feed)
    }

    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn list_feeds(&self, premises_id: PremisesId) -> Result<Vec<Feed>, HomeRuleError> {
        let rows: Vec<Wrapper> =
            sqlx::query_as("SELECT * FROM feeds WHERE premises_id = ? ORDER BY name")
                .bind(premises_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|w| w.0).collect())
    }
}

impl FeedFacade for SqliteFeedStore {
    async fn get_feed_by_id(&self, id: FeedId) -> Result<Option<Feed>, HomeRuleError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn send_value(
        &self,
        id: FeedId,
        value: f64,
        at: Timestamp,
    ) -> Result<(Feed, f64), HomeRuleError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        let Some(Wrapper(mut feed)) = row else {
            return Err(NotFoundError {
                entity: "feed",
                id: id.to_string(),
            }
            .into());
        };

        let previous = feed.record(value, at);
        sqlx::query("UPDATE feeds SET current_value = ?, updated_at = ? WHERE id = ?")
            .bind(feed.current_value)
            .bind(encode_ts(feed.updated_at))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        tx.commit().await.map_err(StorageError::from)?;

        tracing::debug!(feed_id = %id, previous, value, "feed value recorded");
        Ok((feed, previous))
    }
}
