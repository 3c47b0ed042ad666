//! Series ordering on Postgres.
//!
//! Every mutation locks the affected `series` rows with `FOR UPDATE` first, so
//! writers of one series are serialized and the tail index read inside the
//! transaction stays valid until commit. The deferred unique constraint on
//! `(series_id, "index")` is the backstop: if it still fires, the whole
//! transaction rolls back and the caller sees a retryable conflict.

use async_trait::async_trait;
use sqlx::PgConnection;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{MoveSeriesPostParams, RepoError, SeriesRepo};
use crate::domain::entities::{SeriesPosition, SeriesRecord};

use super::util::convert_count;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SeriesRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    url_slug: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SeriesRow> for SeriesRecord {
    fn from(row: SeriesRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            url_slug: row.url_slug,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    series_id: Uuid,
    post_id: Uuid,
    index: i32,
}

impl From<PositionRow> for SeriesPosition {
    fn from(row: PositionRow) -> Self {
        Self {
            series_id: row.series_id,
            post_id: row.post_id,
            index: row.index,
        }
    }
}

async fn lock_series(conn: &mut PgConnection, series_id: Uuid) -> Result<(), RepoError> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM series WHERE id = $1 FOR UPDATE")
        .bind(series_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .map(|_| ())
        .ok_or(RepoError::NotFound)
}

async fn touch_series(conn: &mut PgConnection, series_id: Uuid) -> Result<(), RepoError> {
    sqlx::query("UPDATE series SET updated_at = now() WHERE id = $1")
        .bind(series_id)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Insert at the tail. The series row must already be locked.
async fn append_locked(
    conn: &mut PgConnection,
    series_id: Uuid,
    post_id: Uuid,
) -> Result<SeriesPosition, RepoError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM series_posts WHERE series_id = $1")
        .bind(series_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    let index = convert_count(count)?;

    sqlx::query(r#"INSERT INTO series_posts (series_id, post_id, "index") VALUES ($1, $2, $3)"#)
        .bind(series_id)
        .bind(post_id)
        .bind(index)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    touch_series(conn, series_id).await?;

    Ok(SeriesPosition {
        series_id,
        post_id,
        index,
    })
}

/// Delete the entry at `index` and close the gap. The series row must already be locked.
async fn remove_locked(
    conn: &mut PgConnection,
    series_id: Uuid,
    index: i32,
) -> Result<Uuid, RepoError> {
    let removed: Option<Uuid> = sqlx::query_scalar(
        r#"DELETE FROM series_posts WHERE series_id = $1 AND "index" = $2 RETURNING post_id"#,
    )
    .bind(series_id)
    .bind(index)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    let post_id = removed.ok_or(RepoError::NotFound)?;

    let shifted = sqlx::query(
        r#"UPDATE series_posts SET "index" = "index" - 1 WHERE series_id = $1 AND "index" > $2"#,
    )
    .bind(series_id)
    .bind(index)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?
    .rows_affected();
    touch_series(conn, series_id).await?;

    debug!(
        target = "folio::infra::db::series",
        %series_id,
        index,
        shifted,
        "closed series gap"
    );
    Ok(post_id)
}

#[async_trait]
impl SeriesRepo for PostgresRepositories {
    async fn find_series(&self, id: Uuid) -> Result<Option<SeriesRecord>, RepoError> {
        let row = sqlx::query_as::<_, SeriesRow>(
            "SELECT id, user_id, name, url_slug, created_at, updated_at FROM series WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SeriesRecord::from))
    }

    async fn find_position(&self, post_id: Uuid) -> Result<Option<SeriesPosition>, RepoError> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"SELECT series_id, post_id, "index" FROM series_posts WHERE post_id = $1"#,
        )
        .bind(post_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SeriesPosition::from))
    }

    async fn list_positions(&self, series_id: Uuid) -> Result<Vec<SeriesPosition>, RepoError> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT series_id, post_id, "index"
            FROM series_posts
            WHERE series_id = $1
            ORDER BY "index" ASC
            "#,
        )
        .bind(series_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SeriesPosition::from).collect())
    }

    async fn append_post(
        &self,
        series_id: Uuid,
        post_id: Uuid,
    ) -> Result<SeriesPosition, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        lock_series(&mut tx, series_id).await?;
        let position = append_locked(&mut tx, series_id, post_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(position)
    }

    async fn remove_at(&self, series_id: Uuid, index: i32) -> Result<Uuid, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        lock_series(&mut tx, series_id).await?;
        let post_id = remove_locked(&mut tx, series_id, index).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(post_id)
    }

    async fn detach_post(&self, post_id: Uuid) -> Result<Option<SeriesPosition>, RepoError> {
        let Some(position) = self.find_position(post_id).await? else {
            return Ok(None);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        lock_series(&mut tx, position.series_id).await?;

        // Re-read under the lock; the post may have moved since the first lookup.
        let current = sqlx::query_as::<_, PositionRow>(
            r#"SELECT series_id, post_id, "index" FROM series_posts WHERE post_id = $1"#,
        )
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .map(SeriesPosition::from);

        let Some(current) = current else {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(None);
        };
        if current.series_id != position.series_id {
            return Err(RepoError::conflict(format!(
                "post `{post_id}` moved to another series during detach"
            )));
        }

        remove_locked(&mut tx, current.series_id, current.index).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(current))
    }

    async fn move_post(&self, params: MoveSeriesPostParams) -> Result<SeriesPosition, RepoError> {
        let MoveSeriesPostParams {
            old_series_id,
            old_index,
            new_series_id,
            post_id,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Lock in id order so two opposite moves cannot deadlock.
        let (first, second) = if old_series_id <= new_series_id {
            (old_series_id, new_series_id)
        } else {
            (new_series_id, old_series_id)
        };
        lock_series(&mut tx, first).await?;
        if second != first {
            lock_series(&mut tx, second).await?;
        }

        let occupant: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT post_id FROM series_posts WHERE series_id = $1 AND "index" = $2"#,
        )
        .bind(old_series_id)
        .bind(old_index)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if occupant != Some(post_id) {
            return Err(RepoError::NotFound);
        }

        remove_locked(&mut tx, old_series_id, old_index).await?;
        let position = append_locked(&mut tx, new_series_id, post_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(position)
    }
}
