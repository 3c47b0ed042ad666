use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    EngagementRepo, LikeOutcome, ReadOutcome, RecordReadParams, RepoError,
};
use crate::domain::entities::ScoreEvent;
use crate::domain::scoring::{LIKE_WEIGHT, READ_WEIGHT, dedup_cutoff, read_score_due};
use crate::domain::types::ScoreKind;

use super::util::convert_count;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ScoreEventRow {
    id: Uuid,
    post_id: Uuid,
    actor_id: Option<Uuid>,
    kind: ScoreKind,
    score: f64,
    created_at: OffsetDateTime,
}

impl From<ScoreEventRow> for ScoreEvent {
    fn from(row: ScoreEventRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            actor_id: row.actor_id,
            kind: row.kind,
            weight: row.score,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl EngagementRepo for PostgresRepositories {
    async fn add_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<LikeOutcome, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let current: Option<i32> =
            sqlx::query_scalar("SELECT likes FROM posts WHERE id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let current = current.ok_or(RepoError::NotFound)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO post_likes (post_id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (post_id, user_id) DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if inserted == 0 {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(LikeOutcome {
                changed: false,
                likes: current,
            });
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let likes = convert_count(count)?;

        sqlx::query("UPDATE posts SET likes = $2 WHERE id = $1")
            .bind(post_id)
            .bind(likes)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO post_scores (id, post_id, actor_id, kind, score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(Some(user_id))
        .bind(ScoreKind::Like)
        .bind(LIKE_WEIGHT)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(LikeOutcome {
            changed: true,
            likes,
        })
    }

    async fn remove_like(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let current: Option<i32> =
            sqlx::query_scalar("SELECT likes FROM posts WHERE id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let current = current.ok_or(RepoError::NotFound)?;

        let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        if deleted == 0 {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(LikeOutcome {
                changed: false,
                likes: current,
            });
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let likes = convert_count(count)?;

        sqlx::query("UPDATE posts SET likes = $2 WHERE id = $1")
            .bind(post_id)
            .bind(likes)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM post_scores WHERE post_id = $1 AND actor_id = $2 AND kind = $3")
            .bind(post_id)
            .bind(user_id)
            .bind(ScoreKind::Like)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(LikeOutcome {
            changed: true,
            likes,
        })
    }

    async fn record_read(&self, params: RecordReadParams) -> Result<ReadOutcome, RepoError> {
        let RecordReadParams {
            post_id,
            actor_id,
            ip_hash,
            now,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if exists.is_none() {
            return Err(RepoError::NotFound);
        }

        let seen: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM post_reads
                WHERE ip_hash = $1 AND post_id = $2 AND created_at > $3
            )
            "#,
        )
        .bind(&ip_hash)
        .bind(post_id)
        .bind(dedup_cutoff(now))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if seen {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(ReadOutcome::Deduplicated);
        }

        sqlx::query(
            r#"
            INSERT INTO post_reads (id, post_id, actor_id, ip_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(actor_id)
        .bind(&ip_hash)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let views: i32 =
            sqlx::query_scalar("UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING views")
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let scored = read_score_due(i64::from(views));
        if scored {
            sqlx::query(
                r#"
                INSERT INTO post_scores (id, post_id, actor_id, kind, score, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(post_id)
            .bind(actor_id)
            .bind(ScoreKind::Read)
            .bind(READ_WEIGHT)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ReadOutcome::Counted { views, scored })
    }

    async fn list_score_events(&self, post_id: Uuid) -> Result<Vec<ScoreEvent>, RepoError> {
        let rows = sqlx::query_as::<_, ScoreEventRow>(
            r#"
            SELECT id, post_id, actor_id, kind, score, created_at
            FROM post_scores
            WHERE post_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ScoreEvent::from).collect())
    }
}
